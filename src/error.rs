//! Error types shared across the scene, evaluator, and backends.

use crate::dataset::FitError;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlotError>;

/// Axis a range argument was intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAxis {
    /// Horizontal axis.
    X,
    /// Vertical axis.
    Y,
    /// Vertical axis of the residual panel.
    Residual,
}

impl std::fmt::Display for RangeAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
            Self::Residual => write!(f, "residual"),
        }
    }
}

/// Errors reported by plot composition and rendering.
///
/// Configuration errors never mutate state: the value that was in place
/// before the failing call is retained.
#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("{axis} range must be a minimum and maximum value: {reason}")]
    InvalidRange { axis: RangeAxis, reason: String },
    #[error("parameters must be absent, a numeric sequence, or an uncertain parameter vector")]
    UnrecognizedParameters,
    #[error("unrecognized output target '{0}'")]
    UnknownTarget(String),
    #[error("figure dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("static scale must be finite and positive, got {0}")]
    InvalidScale(f64),
    #[error("error band confidence must be finite and non-negative, got {0}")]
    InvalidConfidence(f64),
    #[error("explorer error range must be finite and positive, got {0}")]
    InvalidErrorRange(f64),
    #[error("no dataset has been attached to the scene")]
    NoDataset,
    #[error("dataset index {0} is out of bounds")]
    DatasetIndex(usize),
    #[error("interactive explorer is not live; show a linear fit first")]
    NotLive,
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error("render failed: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid configuration document: {0}")]
    Config(#[from] serde_json::Error),
}

impl PlotError {
    pub(crate) fn invalid_range(axis: RangeAxis, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            axis,
            reason: reason.into(),
        }
    }

    /// Report a configuration error through the log facade and hand it back.
    pub(crate) fn reported(self) -> Self {
        log::warn!("{self}");
        self
    }
}

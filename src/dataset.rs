//! Dataset and fitting interfaces.
//!
//! Datasets and the fitting engine live outside the plotting core. The scene
//! reads datasets through [`Dataset`] and only mutates them by fitting,
//! clearing fits, or renaming.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::curve::{ModelFn, model_fn};
use crate::uncertainty::UncertainParameters;
use crate::view::Range;

/// Failures reported by datasets and the fitting engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("dataset '{0}' has no fitting engine attached")]
    NoFitter(String),
    #[error("fit did not converge: {0}")]
    NotConverged(String),
    #[error("malformed dataset: {0}")]
    Malformed(String),
}

/// Axis name and units of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisLabel {
    /// Quantity name.
    pub name: String,
    /// Units, possibly empty.
    pub units: String,
}

impl AxisLabel {
    /// Create an axis label.
    pub fn new(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
        }
    }

    /// Axis title in the form `name [units]`.
    pub fn title(&self) -> String {
        format!("{} [{}]", self.name, self.units)
    }
}

/// Model a dataset can be fit to.
#[derive(Clone)]
pub enum FitModel {
    /// `p0 + p1 x`.
    Linear,
    /// `p0 + p1 x + ... + pn x^n`.
    Polynomial(usize),
    /// `p0 / (sqrt(2 pi) p2) exp(-(x - p1)^2 / (2 p2^2))`.
    Gaussian,
    /// `p0 exp(-p1 x)`.
    Exponential,
    /// Arbitrary model with a known parameter count.
    Custom {
        /// Display name.
        name: String,
        /// Model function.
        function: ModelFn,
        /// Number of parameters the function expects.
        parameter_count: usize,
    },
}

impl FitModel {
    /// Display name of the model.
    pub fn name(&self) -> String {
        match self {
            Self::Linear => "linear".to_string(),
            Self::Polynomial(degree) => format!("pol{degree}"),
            Self::Gaussian => "gaussian".to_string(),
            Self::Exponential => "exponential".to_string(),
            Self::Custom { name, .. } => name.clone(),
        }
    }

    /// Number of free parameters.
    pub fn parameter_count(&self) -> usize {
        match self {
            Self::Linear => 2,
            Self::Polynomial(degree) => degree + 1,
            Self::Gaussian => 3,
            Self::Exponential => 2,
            Self::Custom {
                parameter_count, ..
            } => *parameter_count,
        }
    }

    /// The model as a callable.
    pub fn function(&self) -> ModelFn {
        match self {
            Self::Linear => model_fn(|x, p| p[0] + p[1] * x),
            Self::Polynomial(_) => model_fn(|x, p| p.iter().rev().fold(0.0, |acc, c| acc * x + c)),
            Self::Gaussian => model_fn(|x, p| {
                let z = (x - p[1]) / p[2];
                p[0] / ((2.0 * std::f64::consts::PI).sqrt() * p[2]) * (-0.5 * z * z).exp()
            }),
            Self::Exponential => model_fn(|x, p| p[0] * (-p[1] * x).exp()),
            Self::Custom { function, .. } => Arc::clone(function),
        }
    }
}

impl fmt::Debug for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FitModel({})", self.name())
    }
}

/// Result of fitting a model to a dataset.
#[derive(Clone)]
pub struct FitRecord {
    /// Fitted model.
    pub function: ModelFn,
    /// Parameter estimates with uncertainties and correlations.
    pub parameters: UncertainParameters,
    /// `y - f(x)` at each data point.
    pub residuals: Vec<f64>,
    /// Display name of the fitted function.
    pub name: String,
}

impl FitRecord {
    /// Number of fitted parameters.
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Correlation between two fitted parameters.
    pub fn correlation(&self, i: usize, j: usize) -> f64 {
        self.parameters.correlation(i, j)
    }
}

impl fmt::Debug for FitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitRecord")
            .field("parameters", &self.parameters)
            .field("residuals", &self.residuals)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Raw values to be drawn as a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Raw sample values.
    pub values: Vec<f64>,
    /// Number of equal-width bins.
    pub bins: usize,
}

/// One histogram bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Left edge.
    pub left: f64,
    /// Right edge.
    pub right: f64,
    /// Bar height.
    pub height: f64,
}

impl Histogram {
    /// Count values into equal-width bins spanning their extent.
    pub fn bars(&self) -> Vec<Bar> {
        let Some(range) = Range::covering(self.values.iter().copied()) else {
            return Vec::new();
        };
        let bins = self.bins.max(1);
        let range = range.with_min_span(1.0);
        let width = range.span() / bins as f64;
        let mut counts = vec![0.0; bins];
        for value in self.values.iter().filter(|value| value.is_finite()) {
            let index = (((value - range.min) / width) as usize).min(bins - 1);
            counts[index] += 1.0;
        }
        counts
            .into_iter()
            .enumerate()
            .map(|(index, height)| Bar {
                left: range.min + width * index as f64,
                right: range.min + width * (index + 1) as f64,
                height,
            })
            .collect()
    }
}

/// Columns handed to a fitting engine.
#[derive(Debug, Clone, Copy)]
pub struct FitInput<'a> {
    /// X values.
    pub x: &'a [f64],
    /// Y values.
    pub y: &'a [f64],
    /// X uncertainties.
    pub x_err: Option<&'a [f64]>,
    /// Y uncertainties.
    pub y_err: Option<&'a [f64]>,
}

/// Fitting engine interface.
pub trait Fitter: Send + Sync {
    /// Fit `model` to `input`, restricted to x values inside `range` if given.
    fn fit(
        &self,
        input: FitInput<'_>,
        model: &FitModel,
        guess: Option<&[f64]>,
        range: Option<Range>,
    ) -> Result<FitRecord, FitError>;
}

/// XY data with optional uncertainties and a stack of fits.
pub trait Dataset: Send + Sync {
    /// Dataset name, used as the legend entry.
    fn name(&self) -> &str;
    /// Rename the dataset.
    fn set_name(&mut self, name: String);
    /// X values.
    fn x(&self) -> &[f64];
    /// Y values.
    fn y(&self) -> &[f64];
    /// X uncertainties.
    fn x_err(&self) -> Option<&[f64]>;
    /// Y uncertainties.
    fn y_err(&self) -> Option<&[f64]>;
    /// X axis name and units.
    fn x_axis(&self) -> AxisLabel;
    /// Y axis name and units.
    fn y_axis(&self) -> AxisLabel;
    /// Whether the data should be drawn as bars.
    fn is_histogram(&self) -> bool {
        false
    }
    /// Raw histogram values, when the dataset was built from them.
    fn histogram(&self) -> Option<&Histogram> {
        None
    }
    /// Fits performed so far, oldest first.
    fn fits(&self) -> &[FitRecord];
    /// Fit a model and push the result on the fit stack.
    fn fit(
        &mut self,
        model: &FitModel,
        guess: Option<&[f64]>,
        range: Option<Range>,
    ) -> Result<FitRecord, FitError>;
    /// Drop every fit.
    fn clear_fits(&mut self);

    /// Number of fits performed.
    fn fit_count(&self) -> usize {
        self.fits().len()
    }

    /// Most recent fit.
    fn last_fit(&self) -> Option<&FitRecord> {
        self.fits().last()
    }

    /// X extent including error bars, padded by `margin`.
    fn x_extent(&self, margin: f64) -> Option<Range> {
        error_extent(self.x(), self.x_err()).map(|range| range.padded_by(margin))
    }

    /// Y extent including error bars, padded by `margin`.
    fn y_extent(&self, margin: f64) -> Option<Range> {
        error_extent(self.y(), self.y_err()).map(|range| range.padded_by(margin))
    }

    /// Extent of the latest fit's residuals including y error bars.
    fn residual_extent(&self, margin: f64) -> Option<Range> {
        let fit = self.last_fit()?;
        error_extent(&fit.residuals, self.y_err()).map(|range| range.padded_by(margin))
    }
}

fn error_extent(values: &[f64], errors: Option<&[f64]>) -> Option<Range> {
    let error = |index: usize| {
        errors
            .and_then(|errors| errors.get(index))
            .map_or(0.0, |err| err.abs())
    };
    let lows = values.iter().enumerate().map(|(i, v)| v - error(i));
    let highs = values.iter().enumerate().map(|(i, v)| v + error(i));
    Range::covering(lows.chain(highs))
}

/// Dataset shared between the scene and its owner.
pub type SharedDataset = Arc<RwLock<dyn Dataset>>;

/// Wrap a dataset for attaching to a scene.
pub fn shared<D: Dataset + 'static>(dataset: D) -> SharedDataset {
    Arc::new(RwLock::new(dataset))
}

pub(crate) fn read(dataset: &SharedDataset) -> RwLockReadGuard<'_, dyn Dataset + 'static> {
    dataset.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write(dataset: &SharedDataset) -> RwLockWriteGuard<'_, dyn Dataset + 'static> {
    dataset.write().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory XY dataset that delegates fitting to a [`Fitter`].
#[derive(Clone)]
pub struct XyDataset {
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    x_err: Option<Vec<f64>>,
    y_err: Option<Vec<f64>>,
    x_axis: AxisLabel,
    y_axis: AxisLabel,
    histogram: Option<Histogram>,
    is_histogram: bool,
    fits: Vec<FitRecord>,
    fitter: Option<Arc<dyn Fitter>>,
}

impl XyDataset {
    /// Create a dataset from paired columns.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, FitError> {
        if x.len() != y.len() {
            return Err(FitError::Malformed(format!(
                "x has {} values but y has {}",
                x.len(),
                y.len()
            )));
        }
        Ok(Self {
            name: "dataset".to_string(),
            x,
            y,
            x_err: None,
            y_err: None,
            x_axis: AxisLabel::new("x", ""),
            y_axis: AxisLabel::new("y", ""),
            histogram: None,
            is_histogram: false,
            fits: Vec::new(),
            fitter: None,
        })
    }

    /// Build a bar dataset by binning raw values.
    pub fn histogram(values: Vec<f64>, bins: usize) -> Self {
        let histogram = Histogram { values, bins };
        let bars = histogram.bars();
        Self {
            name: "histogram".to_string(),
            x: bars.iter().map(|bar| 0.5 * (bar.left + bar.right)).collect(),
            y: bars.iter().map(|bar| bar.height).collect(),
            x_err: None,
            y_err: None,
            x_axis: AxisLabel::new("x", ""),
            y_axis: AxisLabel::new("counts", ""),
            histogram: Some(histogram),
            is_histogram: true,
            fits: Vec::new(),
            fitter: None,
        }
    }

    /// Attach uncertainties. Each column must match the data length.
    pub fn with_errors(
        mut self,
        x_err: Option<Vec<f64>>,
        y_err: Option<Vec<f64>>,
    ) -> Result<Self, FitError> {
        for (axis, errors) in [("x", &x_err), ("y", &y_err)] {
            if let Some(errors) = errors {
                if errors.len() != self.x.len() {
                    return Err(FitError::Malformed(format!(
                        "{axis} uncertainties have {} values for {} points",
                        errors.len(),
                        self.x.len()
                    )));
                }
            }
        }
        self.x_err = x_err;
        self.y_err = y_err;
        Ok(self)
    }

    /// Set the dataset name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the axis names and units.
    pub fn with_axes(mut self, x_axis: AxisLabel, y_axis: AxisLabel) -> Self {
        self.x_axis = x_axis;
        self.y_axis = y_axis;
        self
    }

    /// Draw the points as bars.
    pub fn as_histogram(mut self) -> Self {
        self.is_histogram = true;
        self
    }

    /// Attach the fitting engine.
    pub fn with_fitter(mut self, fitter: Arc<dyn Fitter>) -> Self {
        self.fitter = Some(fitter);
        self
    }
}

impl fmt::Debug for XyDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XyDataset")
            .field("name", &self.name)
            .field("points", &self.x.len())
            .field("fits", &self.fits.len())
            .finish_non_exhaustive()
    }
}

impl Dataset for XyDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn x(&self) -> &[f64] {
        &self.x
    }

    fn y(&self) -> &[f64] {
        &self.y
    }

    fn x_err(&self) -> Option<&[f64]> {
        self.x_err.as_deref()
    }

    fn y_err(&self) -> Option<&[f64]> {
        self.y_err.as_deref()
    }

    fn x_axis(&self) -> AxisLabel {
        self.x_axis.clone()
    }

    fn y_axis(&self) -> AxisLabel {
        self.y_axis.clone()
    }

    fn is_histogram(&self) -> bool {
        self.is_histogram
    }

    fn histogram(&self) -> Option<&Histogram> {
        self.histogram.as_ref()
    }

    fn fits(&self) -> &[FitRecord] {
        &self.fits
    }

    fn fit(
        &mut self,
        model: &FitModel,
        guess: Option<&[f64]>,
        range: Option<Range>,
    ) -> Result<FitRecord, FitError> {
        let Some(fitter) = self.fitter.as_ref() else {
            return Err(FitError::NoFitter(self.name.clone()));
        };
        let input = FitInput {
            x: &self.x,
            y: &self.y,
            x_err: self.x_err.as_deref(),
            y_err: self.y_err.as_deref(),
        };
        let record = fitter.fit(input, model, guess, range)?;
        self.fits.push(record.clone());
        Ok(record)
    }

    fn clear_fits(&mut self) {
        self.fits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extents_include_error_bars() {
        let dataset = XyDataset::new(vec![0.0, 10.0], vec![1.0, 2.0])
            .and_then(|d| d.with_errors(Some(vec![0.5, 1.0]), None))
            .expect("valid dataset");
        assert_eq!(dataset.x_extent(0.0), Some(Range::new(-0.5, 11.0)));
        assert_eq!(dataset.y_extent(0.5), Some(Range::new(0.5, 2.5)));
    }

    #[test]
    fn mismatched_columns_are_malformed() {
        assert!(matches!(
            XyDataset::new(vec![0.0], vec![]),
            Err(FitError::Malformed(_))
        ));
        let dataset = XyDataset::new(vec![0.0, 1.0], vec![0.0, 1.0]).expect("valid dataset");
        assert!(dataset.with_errors(None, Some(vec![1.0])).is_err());
    }

    #[test]
    fn fit_without_engine_fails() {
        let mut dataset = XyDataset::new(vec![0.0, 1.0], vec![0.0, 1.0]).expect("valid dataset");
        let result = dataset.fit(&FitModel::Linear, None, None);
        assert!(matches!(result, Err(FitError::NoFitter(_))));
        assert_eq!(dataset.fit_count(), 0);
    }

    #[test]
    fn histogram_bins_cover_all_values() {
        let dataset = XyDataset::histogram(vec![0.0, 0.1, 0.9, 1.0, 2.0], 2);
        assert!(dataset.is_histogram());
        let total: f64 = dataset.y().iter().sum();
        assert_eq!(total, 5.0);
        assert_eq!(dataset.y(), &[3.0, 2.0]);
    }

    #[test]
    fn polynomial_evaluates_in_ascending_powers() {
        let function = FitModel::Polynomial(2).function();
        assert_eq!(function(2.0, &[1.0, 2.0, 3.0]), 1.0 + 4.0 + 12.0);
        assert_eq!(FitModel::Polynomial(2).name(), "pol2");
    }
}

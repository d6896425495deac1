//! Display configuration for a scene.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where the legend is anchored inside the main panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendLocation {
    #[default]
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Direction legend entries are laid out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegendOrientation {
    #[default]
    Vertical,
    Horizontal,
}

/// Display configuration shared by both backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Margin added on both sides of the x extent of the data.
    pub x_margin: f64,
    /// Margin added on both sides of the y extent of the data.
    pub y_margin: f64,
    /// Figure width in pixels.
    pub width: u32,
    /// Figure height in pixels (main panel).
    pub height: u32,
    /// Pixel to physical size factor used by the static backend.
    pub static_scale: f64,
    /// Legend anchor.
    pub legend_location: LegendLocation,
    /// Legend layout direction.
    pub legend_orientation: LegendOrientation,
    /// Draw a legend at all.
    pub show_legend: bool,
    /// Error bands span `mean ± error_band_sigma * std`.
    pub error_band_sigma: f64,
    /// Draw a residual panel beneath the main panel.
    pub show_residuals: bool,
    /// Draw text boxes with fitted parameters.
    pub show_fit_results: bool,
    /// Pixel offset applied to the parameter text boxes.
    pub fit_results_offset: (f32, f32),
    /// Output path for the file target. Backends pick a default when unset.
    pub save_path: Option<PathBuf>,
}

impl SceneConfig {
    /// Load a configuration from a JSON document; missing keys keep defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            x_margin: 0.5,
            y_margin: 0.5,
            width: 600,
            height: 400,
            static_scale: 0.017,
            legend_location: LegendLocation::default(),
            legend_orientation: LegendOrientation::default(),
            show_legend: true,
            error_band_sigma: 1.0,
            show_residuals: false,
            show_fit_results: true,
            fit_results_offset: (0.0, 0.0),
            save_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = SceneConfig::from_json_str(
            r#"{ "width": 800, "legend_location": "bottom_right", "error_band_sigma": 2.0 }"#,
        )
        .expect("valid document");
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 400);
        assert_eq!(config.legend_location, LegendLocation::BottomRight);
        assert_eq!(config.error_band_sigma, 2.0);
        assert_eq!(config.x_margin, 0.5);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(SceneConfig::from_json_str("{ width: }").is_err());
    }
}

//! Range computation and per-figure layout.
//!
//! The scene owns the caller-visible ranges. Backends never see those
//! directly: they receive a [`FigureLayout`], a frozen copy that may carry
//! extra headroom for parameter text boxes.

use crate::config::{LegendLocation, LegendOrientation, SceneConfig};
use crate::dataset::{self, SharedDataset};
use crate::transform::{ScreenRect, Transform};
use crate::view::{Range, Viewport};

/// Vertical space reserved per fitted parameter when text boxes are shown.
pub const TEXT_RESERVE_PX_PER_PARAMETER: f64 = 25.0;

/// Title and axis titles of a figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    /// Figure title.
    pub title: String,
    /// X axis title.
    pub x_title: String,
    /// Y axis title.
    pub y_title: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            title: "y as a function of x".to_string(),
            x_title: "x []".to_string(),
            y_title: "y []".to_string(),
        }
    }
}

/// Union of the padded extents of every dataset.
pub fn dataset_bounds(datasets: &[SharedDataset], x_margin: f64, y_margin: f64) -> Option<Viewport> {
    let mut bounds: Option<Viewport> = None;
    for shared in datasets {
        let dataset = dataset::read(shared);
        let (Some(x), Some(y)) = (dataset.x_extent(x_margin), dataset.y_extent(y_margin)) else {
            continue;
        };
        let next = Viewport::new(x, y);
        match bounds.as_mut() {
            None => bounds = Some(next),
            Some(existing) => existing.widen_to(next),
        }
    }
    bounds
}

/// Range of the residual panel: the union over every fitted dataset of its
/// latest residuals, padded by `margin`.
pub fn residual_range(datasets: &[SharedDataset], margin: f64) -> Option<Range> {
    datasets
        .iter()
        .filter_map(|shared| dataset::read(shared).residual_extent(margin))
        .reduce(|acc, extent| Range::union(acc, extent).unwrap_or(acc))
}

/// Check whether any dataset has been fit at least once.
pub fn any_fitted(datasets: &[SharedDataset]) -> bool {
    datasets
        .iter()
        .any(|shared| dataset::read(shared).fit_count() > 0)
}

/// Pixels to reserve above the data for parameter text boxes.
pub fn text_reserve_pixels(datasets: &[SharedDataset]) -> f64 {
    datasets
        .iter()
        .filter_map(|shared| {
            dataset::read(shared)
                .last_fit()
                .map(|fit| fit.parameter_count() as f64 * TEXT_RESERVE_PX_PER_PARAMETER)
        })
        .sum()
}

/// Raise the upper bound of `viewport.y` by `pixels`, converted to data units
/// for a panel of `width × height` pixels.
pub fn inflate_for_text(viewport: Viewport, pixels: f64, width: u32, height: u32) -> Range {
    let screen = ScreenRect::from_size(width as f32, height as f32);
    let Some(transform) = Transform::new(viewport, screen) else {
        return viewport.y;
    };
    Range {
        min: viewport.y.min,
        max: viewport.y.max + transform.pixels_to_data_y(pixels),
    }
}

/// Frozen geometry and decorations handed to a backend when a figure is built.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureLayout {
    /// Figure labels.
    pub labels: Labels,
    /// X range shared by the main and residual panels.
    pub x_range: Range,
    /// Y range of the main panel, including text headroom.
    pub y_range: Range,
    /// Y range of the residual panel when one is drawn.
    pub residual_range: Option<Range>,
    /// Margin around residual extents when a residual panel is built late.
    pub y_margin: f64,
    /// Main panel width in pixels.
    pub width: u32,
    /// Main panel height in pixels.
    pub height: u32,
    /// Legend anchor.
    pub legend_location: LegendLocation,
    /// Legend layout direction.
    pub legend_orientation: LegendOrientation,
    /// Whether a legend is drawn.
    pub show_legend: bool,
    /// Pixel offset of the parameter text boxes.
    pub text_offset: (f32, f32),
    /// Pixel to physical size factor for the static backend.
    pub static_scale: f64,
}

impl FigureLayout {
    /// Freeze the layout for one figure.
    ///
    /// `viewport` is the caller-visible range pair; `text_reserve` is the
    /// pixel headroom for text boxes (zero when none are drawn).
    pub fn new(
        labels: &Labels,
        viewport: Viewport,
        residual_range: Option<Range>,
        config: &SceneConfig,
        text_reserve: f64,
    ) -> Self {
        let y_range = if text_reserve > 0.0 {
            inflate_for_text(viewport, text_reserve, config.width, config.height)
        } else {
            viewport.y
        };
        Self {
            labels: labels.clone(),
            x_range: viewport.x,
            y_range,
            residual_range,
            y_margin: config.y_margin,
            width: config.width,
            height: config.height,
            legend_location: config.legend_location,
            legend_orientation: config.legend_orientation,
            show_legend: config.show_legend,
            text_offset: config.fit_results_offset,
            static_scale: config.static_scale,
        }
    }

    /// Height of the residual panel in pixels.
    pub fn residual_height(&self) -> u32 {
        self.height / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{XyDataset, shared};
    use crate::testing;

    #[test]
    fn dataset_bounds_cover_all_datasets() {
        let a = shared(XyDataset::new(vec![0.0, 10.0], vec![0.0, 5.0]).expect("valid"));
        let b = shared(XyDataset::new(vec![-4.0, 2.0], vec![1.0, 9.0]).expect("valid"));
        let bounds = dataset_bounds(&[a, b], 0.5, 0.5).expect("bounds");
        assert_eq!(bounds.x, Range::new(-4.5, 10.5));
        assert_eq!(bounds.y, Range::new(-0.5, 9.5));
    }

    #[test]
    fn residual_range_ignores_unfitted() {
        let fitted = testing::fitted_line_dataset();
        let unfitted = shared(XyDataset::new(vec![0.0], vec![100.0]).expect("valid"));
        let range = residual_range(&[fitted.clone(), unfitted.clone()], 0.5).expect("range");
        let expected = dataset::read(&fitted).residual_extent(0.5).expect("fitted");
        assert_eq!(range, expected);
        assert!(residual_range(&[unfitted], 0.5).is_none());
    }

    #[test]
    fn inflation_scales_with_span_and_height() {
        let viewport = Viewport::new(Range::new(0.0, 1.0), Range::new(0.0, 8.0));
        let inflated = inflate_for_text(viewport, 50.0, 600, 400);
        assert_eq!(inflated.min, 0.0);
        assert!((inflated.max - 9.0).abs() < 1e-12);
    }

    #[test]
    fn layout_does_not_inflate_without_reserve() {
        let viewport = Viewport::new(Range::new(0.0, 1.0), Range::new(0.0, 8.0));
        let layout = FigureLayout::new(&Labels::default(), viewport, None, &SceneConfig::default(), 0.0);
        assert_eq!(layout.y_range, viewport.y);
        assert_eq!(layout.residual_height(), 133);
    }
}

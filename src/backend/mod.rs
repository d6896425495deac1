//! Backend renderer contract.
//!
//! A backend turns a scene into backend-native drawing. The scene owns the
//! backend and a [`FigureState`]; draw calls only ever receive a built
//! figure, so there is no implicit lazy construction inside the backends.
//!
//! [`populate`] is the single draw driver shared by every backend: datasets
//! (with their latest fit, parameter text and residuals), then user
//! functions, then [`Backend::finalize`].

pub mod canvas;
pub mod image;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::curve::{self, Band, UncertainCurve, UserFunction};
use crate::dataset::{self, Bar, Dataset, FitRecord};
use crate::error::{PlotError, Result};
use crate::layout::FigureLayout;
use crate::render::Color;
use crate::scene::AttachedDataset;
use crate::uncertainty::Propagator;

/// Vertical distance between two parameter text lines, in pixels.
pub const TEXT_LINE_PX: f32 = 18.0;
/// Extra gap between the text boxes of two datasets, in pixels.
pub const TEXT_DATASET_GAP_PX: f32 = 3.0;
/// Distance between the right edge of the text and the right edge of the panel.
pub const TEXT_RIGHT_INSET_PX: f32 = 5.0;
/// Distance between the top of the first text line and the top of the panel.
pub const TEXT_TOP_INSET_PX: f32 = 30.0;

/// Stable handle of a drawn element, used for in-place updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlyphId(pub u64);

impl fmt::Display for GlyphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "glyph#{}", self.0)
    }
}

/// Which renderer a backend is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Interactive web canvas.
    Canvas,
    /// Static image.
    Image,
}

impl BackendKind {
    /// Output path used when the configuration does not name one.
    pub fn default_save_path(&self) -> PathBuf {
        match self {
            Self::Canvas => PathBuf::from("myplot.html"),
            Self::Image => PathBuf::from("myplot.svg"),
        }
    }
}

/// Where a presented figure goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// A live, redrawable display context.
    #[default]
    Interactive,
    /// A one-shot render to a file.
    File,
}

impl FromStr for OutputTarget {
    type Err = PlotError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "interactive" | "inline" | "notebook" => Ok(Self::Interactive),
            "file" => Ok(Self::File),
            _ => Err(PlotError::UnknownTarget(name.to_string()).reported()),
        }
    }
}

/// What presenting a figure produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    /// A self-contained document for a live display context.
    Document(String),
    /// Inline markup (an SVG image) for an embedding context.
    Inline(String),
    /// Path of the written artifact.
    Saved(PathBuf),
}

impl Presentation {
    /// Document or inline markup, if the presentation carries any.
    pub fn markup(&self) -> Option<&str> {
        match self {
            Self::Document(markup) | Self::Inline(markup) => Some(markup),
            Self::Saved(_) => None,
        }
    }
}

/// Lifecycle of a backend figure.
#[derive(Debug, Default)]
pub enum FigureState<F> {
    /// No figure exists yet.
    #[default]
    Unbuilt,
    /// A figure exists and may be drawn on.
    Built(F),
}

impl<F> FigureState<F> {
    /// Check whether a figure exists.
    pub fn is_built(&self) -> bool {
        matches!(self, Self::Built(_))
    }

    /// The figure, if built.
    pub fn figure(&self) -> Option<&F> {
        match self {
            Self::Built(figure) => Some(figure),
            Self::Unbuilt => None,
        }
    }

    /// The figure, if built.
    pub fn figure_mut(&mut self) -> Option<&mut F> {
        match self {
            Self::Built(figure) => Some(figure),
            Self::Unbuilt => None,
        }
    }
}

/// Handles of a drawn curve and its error band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveHandles {
    /// The mean line.
    pub line: GlyphId,
    /// The shaded band, when the curve carries uncertainty.
    pub band: Option<GlyphId>,
}

/// One right-aligned line of parameter text, in pixels from the top-left
/// corner of the main panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    /// Text content.
    pub text: String,
    /// Right edge of the text.
    pub x: f32,
    /// Top edge of the text.
    pub y: f32,
}

/// Lay out the text box of a fit starting `offset` pixels below the first
/// line position. Returns the lines and the offset just past the last line.
pub fn parameter_text_lines(
    fit: &FitRecord,
    layout: &FigureLayout,
    offset: f32,
) -> (Vec<TextLine>, f32) {
    let (dx, dy) = layout.text_offset;
    let x = layout.width as f32 - TEXT_RIGHT_INSET_PX + dx;
    let top = TEXT_TOP_INSET_PX - dy;
    let mut next = offset;
    let lines = fit
        .parameters
        .measurements()
        .into_iter()
        .map(|measurement| {
            let line = TextLine {
                text: measurement.to_string(),
                x,
                y: top + next,
            };
            next += TEXT_LINE_PX;
            line
        })
        .collect();
    (lines, next)
}

/// A straight segment in data coordinates.
pub type Segment = [(f64, f64); 2];

/// Symmetric error bars on both axes. Points without an uncertainty on an
/// axis get no bar on that axis.
pub fn error_segments(
    x: &[f64],
    y: &[f64],
    x_err: Option<&[f64]>,
    y_err: Option<&[f64]>,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (index, (&px, &py)) in x.iter().zip(y).enumerate() {
        if let Some(&err) = x_err.and_then(|errors| errors.get(index)).filter(|e| **e != 0.0) {
            segments.push([(px - err, py), (px + err, py)]);
        }
        if let Some(&err) = y_err.and_then(|errors| errors.get(index)).filter(|e| **e != 0.0) {
            segments.push([(px, py - err), (px, py + err)]);
        }
    }
    segments
}

/// Bars of a histogram dataset.
///
/// Raw histogram values are binned directly; otherwise each point becomes a
/// bar centered on its x value, as wide as the closest spacing between points.
pub fn dataset_bars(dataset: &dyn Dataset) -> Vec<Bar> {
    if let Some(histogram) = dataset.histogram() {
        return histogram.bars();
    }
    let x = dataset.x();
    let width = x
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .filter(|gap| *gap > 0.0)
        .fold(f64::INFINITY, f64::min);
    let half = if width.is_finite() { 0.5 * width } else { 0.5 };
    x.iter()
        .zip(dataset.y())
        .map(|(&center, &height)| Bar {
            left: center - half,
            right: center + half,
            height,
        })
        .collect()
}

/// Capability interface implemented once per renderer.
pub trait Backend {
    /// Backend-native figure.
    type Figure;

    /// Which renderer this is.
    fn kind(&self) -> BackendKind;

    /// Build an empty figure with axes, labels and, when the layout asks for
    /// one, a residual panel.
    fn initialize_figure(&mut self, layout: &FigureLayout) -> Self::Figure;

    /// Draw a dataset's points, or with `residual` its latest fit residuals
    /// in the residual panel.
    fn draw_dataset(
        &mut self,
        figure: &mut Self::Figure,
        dataset: &dyn Dataset,
        color: Color,
        residual: bool,
    );

    /// Draw the mean line of a curve.
    fn draw_curve(
        &mut self,
        figure: &mut Self::Figure,
        curve: &UncertainCurve,
        color: Color,
        name: &str,
    ) -> GlyphId;

    /// Shade `mean ± confidence * std`. Curves without uncertainty draw nothing.
    fn draw_error_band(
        &mut self,
        figure: &mut Self::Figure,
        curve: &UncertainCurve,
        confidence: f64,
        color: Color,
    ) -> Option<GlyphId>;

    /// Draw the parameters of a fit as stacked text lines, starting `offset`
    /// pixels below the first line position. Returns the offset for the next
    /// text box.
    fn draw_parameter_text_box(
        &mut self,
        figure: &mut Self::Figure,
        fit: &FitRecord,
        offset: f32,
    ) -> f32;

    /// Place the legend and compose the residual panel beneath the main one.
    fn finalize(&mut self, figure: &mut Self::Figure);

    /// Display or persist the figure.
    fn present(
        &mut self,
        figure: &mut Self::Figure,
        target: OutputTarget,
        path: &Path,
    ) -> Result<Presentation>;
}

/// Backends whose figures can be updated in place after presentation.
pub trait LiveBackend: Backend {
    /// Whether the figure is shown in a display context that accepts redraws.
    fn is_live(&self, figure: &Self::Figure) -> bool;

    /// Replace the y values of a drawn curve.
    fn update_curve(
        &mut self,
        figure: &mut Self::Figure,
        id: GlyphId,
        curve: &UncertainCurve,
    ) -> Result<()>;

    /// Replace the outline of a drawn band.
    fn update_band(&mut self, figure: &mut Self::Figure, id: GlyphId, band: &Band) -> Result<()>;

    /// Push the given glyphs to the display context.
    fn redraw(&mut self, figure: &mut Self::Figure, ids: &[GlyphId]) -> Result<()>;
}

/// Everything [`populate`] draws.
pub struct DrawPlan<'a> {
    /// Datasets with their colors, in attach order.
    pub datasets: &'a [AttachedDataset],
    /// User functions, in attach order.
    pub functions: &'a [UserFunction],
    /// Grid user functions are drawn on.
    pub function_grid: &'a [f64],
    /// Error band half-width in standard deviations.
    pub confidence: f64,
    /// Draw parameter text boxes.
    pub show_fit_results: bool,
    /// Offset of the first text box, past any drawn earlier on the figure.
    pub text_offset: f32,
    /// Draw residuals into the residual panel.
    pub show_residuals: bool,
    /// Uncertainty propagation for fitted and user curves.
    pub propagator: &'a dyn Propagator,
}

/// Draw `curve` with its band beneath the line.
pub fn draw_uncertain_curve<B: Backend + ?Sized>(
    backend: &mut B,
    figure: &mut B::Figure,
    curve: &UncertainCurve,
    confidence: f64,
    color: Color,
    name: &str,
) -> CurveHandles {
    let band = backend.draw_error_band(figure, curve, confidence, color);
    let line = backend.draw_curve(figure, curve, color, name);
    CurveHandles { line, band }
}

/// Draw every element of `plan` onto `figure` and finalize it.
///
/// Returns the text offset past the last parameter text box, for the next
/// overlay on the same figure.
pub fn populate<B: Backend + ?Sized>(
    backend: &mut B,
    figure: &mut B::Figure,
    plan: &DrawPlan<'_>,
) -> Result<f32> {
    let mut text_offset = plan.text_offset;
    for attached in plan.datasets {
        let dataset = dataset::read(&attached.dataset);
        backend.draw_dataset(figure, &*dataset, attached.color, false);
        let Some(fit) = dataset.last_fit() else {
            continue;
        };
        let grid = curve::fit_grid(dataset.x());
        let fitted = curve::evaluate(
            &fit.function,
            &grid,
            &fit.parameters.clone().into(),
            plan.propagator,
        )?;
        draw_uncertain_curve(
            backend,
            figure,
            &fitted,
            plan.confidence,
            attached.color,
            &fit.name,
        );
        if plan.show_fit_results {
            text_offset = backend.draw_parameter_text_box(figure, fit, text_offset);
            text_offset += TEXT_DATASET_GAP_PX;
        }
        if plan.show_residuals {
            backend.draw_dataset(figure, &*dataset, attached.color, true);
        }
    }

    for function in plan.functions {
        let evaluated = curve::evaluate(
            &function.function,
            plan.function_grid,
            &function.params,
            plan.propagator,
        )?;
        draw_uncertain_curve(
            backend,
            figure,
            &evaluated,
            plan.confidence,
            function.color,
            &function.name,
        );
    }

    backend.finalize(figure);
    Ok(text_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use crate::layout::Labels;
    use crate::testing;
    use crate::view::{Range, Viewport};

    #[test]
    fn target_synonyms() {
        assert_eq!("inline".parse::<OutputTarget>().expect("known"), OutputTarget::Interactive);
        assert_eq!("Notebook".parse::<OutputTarget>().expect("known"), OutputTarget::Interactive);
        assert_eq!("file".parse::<OutputTarget>().expect("known"), OutputTarget::File);
        assert!(matches!(
            "printer".parse::<OutputTarget>(),
            Err(PlotError::UnknownTarget(name)) if name == "printer"
        ));
    }

    #[test]
    fn text_lines_stack_without_overlap() {
        let shared = testing::fitted_line_dataset();
        let dataset = dataset::read(&shared);
        let fit = dataset.last_fit().expect("fitted");
        let mut config = SceneConfig::default();
        config.fit_results_offset = (-10.0, 4.0);
        let viewport = Viewport::new(Range::new(0.0, 1.0), Range::new(0.0, 1.0));
        let layout = FigureLayout::new(&Labels::default(), viewport, None, &config, 0.0);

        let (first, next) = parameter_text_lines(fit, &layout, 0.0);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].x, 600.0 - 5.0 - 10.0);
        assert_eq!(first[0].y, 30.0 - 4.0);
        assert_eq!(first[1].y - first[0].y, TEXT_LINE_PX);
        assert_eq!(next, 2.0 * TEXT_LINE_PX);

        let (second, _) = parameter_text_lines(fit, &layout, next + TEXT_DATASET_GAP_PX);
        assert!(second[0].y >= first[1].y + TEXT_LINE_PX);
    }

    #[test]
    fn error_bars_on_both_axes() {
        let segments = error_segments(&[1.0, 2.0], &[3.0, 4.0], Some(&[0.5, 0.0]), Some(&[1.0, 2.0]));
        assert_eq!(
            segments,
            vec![
                [(0.5, 3.0), (1.5, 3.0)],
                [(1.0, 2.0), (1.0, 4.0)],
                [(2.0, 2.0), (2.0, 6.0)],
            ]
        );
        assert!(error_segments(&[1.0], &[1.0], None, None).is_empty());
    }

    #[test]
    fn point_bars_use_closest_spacing() {
        let dataset = crate::dataset::XyDataset::new(vec![0.0, 1.0, 3.0], vec![2.0, 4.0, 1.0])
            .expect("valid")
            .as_histogram();
        let bars = dataset_bars(&dataset);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[2].left, 2.5);
        assert_eq!(bars[2].right, 3.5);
        assert_eq!(bars[1].height, 4.0);
    }

    #[test]
    fn figure_state_lifecycle() {
        let mut state: FigureState<u32> = FigureState::default();
        assert!(!state.is_built());
        assert!(state.figure_mut().is_none());
        state = FigureState::Built(3);
        assert_eq!(state.figure(), Some(&3));
    }
}

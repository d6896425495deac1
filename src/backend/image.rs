//! Static-image backend.
//!
//! Draw calls are recorded on a [`StaticFigure`]; the SVG is produced by
//! `plotters` when the figure is presented. Writing to a file freezes the
//! figure: nothing recorded afterwards reaches the artifact.

use std::error::Error;
use std::fs;
use std::path::Path;

use plotters::coord::Shift;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::{
    BLACK, ChartBuilder, ChartContext, Circle, DrawingArea, IntoDrawingArea, IntoFont, LineSeries,
    PathElement, Polygon, RGBColor, Rectangle, SVGBackend, SeriesLabelPosition, Text, WHITE,
};
use plotters::style::Color as _;

use super::{
    Backend, BackendKind, GlyphId, LiveBackend, OutputTarget, Presentation, Segment, TextLine,
    dataset_bars, error_segments, parameter_text_lines,
};
use crate::config::LegendLocation;
use crate::curve::{Band, UncertainCurve};
use crate::dataset::{Bar, Dataset, FitRecord};
use crate::error::{PlotError, Result};
use crate::layout::FigureLayout;
use crate::render::{BAND_ALPHA, BAR_ALPHA, Color, TEXT_BOX_ALPHA};
use crate::view::Range;

/// Height of the figure with a residual panel, relative to the main height.
pub const RESIDUAL_FIGURE_SCALE: f64 = 1.33;

const FONT: &str = "sans-serif";
const TEXT_SIZE: i32 = 14;
const CHAR_WIDTH_RATIO: f32 = 0.55;

type SvgChart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;
type DrawResult<T> = std::result::Result<T, Box<dyn Error>>;

#[derive(Debug, Clone, PartialEq)]
enum Mark {
    Points {
        residual: bool,
        points: Vec<(f64, f64)>,
        error_bars: Vec<Segment>,
        color: Color,
        legend: Option<String>,
    },
    Bars {
        bars: Vec<Bar>,
        color: Color,
        legend: String,
    },
    Line {
        id: GlyphId,
        x: Vec<f64>,
        y: Vec<f64>,
        color: Color,
        legend: String,
    },
    Band {
        id: GlyphId,
        x: Vec<f64>,
        y: Vec<f64>,
        color: Color,
    },
}

/// Recorded static figure.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticFigure {
    layout: FigureLayout,
    residual_range: Option<Range>,
    marks: Vec<Mark>,
    texts: Vec<TextLine>,
    next_id: u64,
    finalized: bool,
    frozen: bool,
    snapshot: Option<String>,
}

impl StaticFigure {
    fn new(layout: &FigureLayout) -> Self {
        Self {
            layout: layout.clone(),
            residual_range: layout.residual_range,
            marks: Vec::new(),
            texts: Vec::new(),
            next_id: 0,
            finalized: false,
            frozen: false,
            snapshot: None,
        }
    }

    /// Whether the figure was written to a file.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Latest inline rendering, refreshed on every interactive redraw.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Y range of the residual panel, when one is drawn.
    pub fn residual_range(&self) -> Option<Range> {
        self.residual_range
    }

    /// Image size in pixels. The residual panel makes the image taller.
    pub fn pixel_size(&self) -> (u32, u32) {
        let height = if self.residual_range.is_some() {
            (self.layout.height as f64 * RESIDUAL_FIGURE_SCALE).round() as u32
        } else {
            self.layout.height
        };
        (self.layout.width, height)
    }

    /// Image size in physical units.
    pub fn physical_size(&self) -> (f64, f64) {
        let (width, height) = self.pixel_size();
        let scale = self.layout.static_scale;
        (width as f64 * scale, height as f64 * scale)
    }

    /// Parameter text lines in draw order.
    pub fn text_lines(&self) -> &[TextLine] {
        &self.texts
    }

    /// X and y values of a recorded line.
    pub fn line(&self, id: GlyphId) -> Option<(&[f64], &[f64])> {
        self.marks.iter().find_map(|mark| match mark {
            Mark::Line { id: line, x, y, .. } if *line == id => Some((x.as_slice(), y.as_slice())),
            _ => None,
        })
    }

    /// Outline of a recorded band.
    pub fn band(&self, id: GlyphId) -> Option<(&[f64], &[f64])> {
        self.marks.iter().find_map(|mark| match mark {
            Mark::Band { id: band, x, y, .. } if *band == id => Some((x.as_slice(), y.as_slice())),
            _ => None,
        })
    }

    fn allocate(&mut self) -> GlyphId {
        let id = GlyphId(self.next_id);
        self.next_id += 1;
        id
    }

    fn record(&mut self, mark: Mark) -> bool {
        if self.frozen {
            log::warn!("figure was written to a file; ignoring further drawing");
            return false;
        }
        self.marks.push(mark);
        true
    }

    fn guard_live(&self) -> Result<()> {
        if self.frozen {
            return Err(PlotError::NotLive.reported());
        }
        Ok(())
    }
}

/// Render a figure to an SVG document.
pub fn render_svg(figure: &StaticFigure) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, figure.pixel_size()).into_drawing_area();
        draw_figure(&root, figure).map_err(|err| PlotError::Render(err.to_string()))?;
    }
    Ok(svg)
}

fn rgb(color: Color) -> RGBColor {
    let [r, g, b] = color.rgb8_channels();
    RGBColor(r, g, b)
}

fn label_position(location: LegendLocation) -> SeriesLabelPosition {
    match location {
        LegendLocation::TopLeft => SeriesLabelPosition::UpperLeft,
        LegendLocation::TopCenter => SeriesLabelPosition::UpperMiddle,
        LegendLocation::TopRight => SeriesLabelPosition::UpperRight,
        LegendLocation::CenterLeft => SeriesLabelPosition::MiddleLeft,
        LegendLocation::Center => SeriesLabelPosition::MiddleMiddle,
        LegendLocation::CenterRight => SeriesLabelPosition::MiddleRight,
        LegendLocation::BottomLeft => SeriesLabelPosition::LowerLeft,
        LegendLocation::BottomCenter => SeriesLabelPosition::LowerMiddle,
        LegendLocation::BottomRight => SeriesLabelPosition::LowerRight,
    }
}

fn draw_figure(root: &DrawingArea<SVGBackend<'_>, Shift>, figure: &StaticFigure) -> DrawResult<()> {
    root.fill(&WHITE)?;
    let layout = &figure.layout;
    let (_, total_height) = figure.pixel_size();
    let (main_area, residual_area) = match figure.residual_range {
        Some(_) => {
            let (upper, lower) = root.split_vertically((total_height * 3 / 4) as i32);
            (upper, Some(lower))
        }
        None => (root.clone(), None),
    };

    let x = layout.x_range.with_min_span(f64::EPSILON);
    let y = layout.y_range.with_min_span(f64::EPSILON);
    let mut chart = ChartBuilder::on(&main_area)
        .caption(&layout.labels.title, (FONT, 18))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(x.min..x.max, y.min..y.max)?;
    chart
        .configure_mesh()
        .x_desc(layout.labels.x_title.as_str())
        .y_desc(layout.labels.y_title.as_str())
        .draw()?;

    let labeled = draw_marks(&mut chart, &figure.marks, false)?;
    if labeled && layout.show_legend && figure.finalized {
        chart
            .configure_series_labels()
            .position(label_position(layout.legend_location))
            .margin(10)
            .background_style(WHITE.mix(0.9))
            .border_style(BLACK.mix(0.3))
            .label_font((FONT, 13))
            .draw()?;
    }

    for line in &figure.texts {
        let width = (line.text.chars().count() as f32 * TEXT_SIZE as f32 * CHAR_WIDTH_RATIO) as i32;
        let right = line.x as i32;
        let top = line.y as i32;
        main_area.draw(&Rectangle::new(
            [(right - width - 2, top - 1), (right + 2, top + TEXT_SIZE + 3)],
            WHITE.mix(TEXT_BOX_ALPHA as f64).filled(),
        ))?;
        main_area.draw(&Text::new(
            line.text.clone(),
            (right - width, top),
            (FONT, TEXT_SIZE).into_font(),
        ))?;
    }

    if let (Some(area), Some(range)) = (residual_area, figure.residual_range) {
        let range = range.with_min_span(f64::EPSILON);
        let mut residuals = ChartBuilder::on(&area)
            .margin(10)
            .x_label_area_size(35)
            .y_label_area_size(55)
            .build_cartesian_2d(x.min..x.max, range.min..range.max)?;
        residuals
            .configure_mesh()
            .x_desc(layout.labels.x_title.as_str())
            .y_desc("Residuals")
            .draw()?;
        draw_marks(&mut residuals, &figure.marks, true)?;
    }

    root.present()?;
    Ok(())
}

/// Draw the marks of one panel. Returns whether any legend entry was added.
fn draw_marks(chart: &mut SvgChart<'_, '_>, marks: &[Mark], residual_panel: bool) -> DrawResult<bool> {
    let mut labeled = false;
    for mark in marks {
        match mark {
            Mark::Points {
                residual,
                points,
                error_bars,
                color,
                legend,
            } if *residual == residual_panel => {
                let color = rgb(*color);
                chart.draw_series(
                    error_bars
                        .iter()
                        .map(|segment| PathElement::new(segment.to_vec(), color.stroke_width(1))),
                )?;
                let series = chart.draw_series(
                    points
                        .iter()
                        .map(|&point| Circle::new(point, 3, color.filled())),
                )?;
                if let Some(legend) = legend {
                    series
                        .label(legend.as_str())
                        .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
                    labeled = true;
                }
            }
            Mark::Bars { bars, color, legend } if !residual_panel => {
                let color = rgb(*color);
                chart
                    .draw_series(bars.iter().map(|bar| {
                        Rectangle::new(
                            [(bar.left, 0.0), (bar.right, bar.height)],
                            color.mix(BAR_ALPHA as f64).filled(),
                        )
                    }))?
                    .label(legend.as_str())
                    .legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.mix(BAR_ALPHA as f64).filled())
                    });
                labeled = true;
            }
            Mark::Band { x, y, color, .. } if !residual_panel => {
                let color = rgb(*color);
                let outline: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
                chart.draw_series(std::iter::once(Polygon::new(
                    outline,
                    color.mix(BAND_ALPHA as f64).filled(),
                )))?;
            }
            Mark::Line {
                x, y, color, legend, ..
            } if !residual_panel => {
                let color = rgb(*color);
                let points = x
                    .iter()
                    .copied()
                    .zip(y.iter().copied())
                    .filter(|(x, y)| x.is_finite() && y.is_finite());
                chart
                    .draw_series(LineSeries::new(points, color.stroke_width(2)))?
                    .label(legend.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
                labeled = true;
            }
            _ => {}
        }
    }
    Ok(labeled)
}

/// Static SVG renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageBackend;

impl ImageBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for ImageBackend {
    type Figure = StaticFigure;

    fn kind(&self) -> BackendKind {
        BackendKind::Image
    }

    fn initialize_figure(&mut self, layout: &FigureLayout) -> StaticFigure {
        log::debug!(
            "building static figure '{}' ({}x{}, residuals: {})",
            layout.labels.title,
            layout.width,
            layout.height,
            layout.residual_range.is_some()
        );
        StaticFigure::new(layout)
    }

    fn draw_dataset(
        &mut self,
        figure: &mut StaticFigure,
        dataset: &dyn Dataset,
        color: Color,
        residual: bool,
    ) {
        if residual {
            let Some(fit) = dataset.last_fit() else {
                return;
            };
            if figure.residual_range.is_none() {
                figure.residual_range = Some(
                    dataset
                        .residual_extent(figure.layout.y_margin)
                        .unwrap_or_default(),
                );
            }
            figure.record(Mark::Points {
                residual: true,
                points: dataset.x().iter().copied().zip(fit.residuals.iter().copied()).collect(),
                error_bars: error_segments(dataset.x(), &fit.residuals, dataset.x_err(), dataset.y_err()),
                color,
                legend: None,
            });
            return;
        }
        if dataset.is_histogram() {
            figure.record(Mark::Bars {
                bars: dataset_bars(dataset),
                color,
                legend: dataset.name().to_string(),
            });
            return;
        }
        figure.record(Mark::Points {
            residual: false,
            points: dataset.x().iter().copied().zip(dataset.y().iter().copied()).collect(),
            error_bars: error_segments(dataset.x(), dataset.y(), dataset.x_err(), dataset.y_err()),
            color,
            legend: Some(dataset.name().to_string()),
        });
    }

    fn draw_curve(
        &mut self,
        figure: &mut StaticFigure,
        curve: &UncertainCurve,
        color: Color,
        name: &str,
    ) -> GlyphId {
        let id = figure.allocate();
        figure.record(Mark::Line {
            id,
            x: curve.x().to_vec(),
            y: curve.mean().to_vec(),
            color,
            legend: name.to_string(),
        });
        id
    }

    fn draw_error_band(
        &mut self,
        figure: &mut StaticFigure,
        curve: &UncertainCurve,
        confidence: f64,
        color: Color,
    ) -> Option<GlyphId> {
        let (x, y) = curve.band(confidence)?.outline();
        let id = figure.allocate();
        figure.record(Mark::Band { id, x, y, color });
        Some(id)
    }

    fn draw_parameter_text_box(
        &mut self,
        figure: &mut StaticFigure,
        fit: &FitRecord,
        offset: f32,
    ) -> f32 {
        let (lines, next) = parameter_text_lines(fit, &figure.layout, offset);
        if figure.frozen {
            log::warn!("figure was written to a file; ignoring parameter text");
        } else {
            figure.texts.extend(lines);
        }
        next
    }

    fn finalize(&mut self, figure: &mut StaticFigure) {
        figure.finalized = true;
    }

    fn present(
        &mut self,
        figure: &mut StaticFigure,
        target: OutputTarget,
        path: &Path,
    ) -> Result<Presentation> {
        let svg = render_svg(figure)?;
        match target {
            OutputTarget::Interactive => {
                figure.snapshot = Some(svg.clone());
                Ok(Presentation::Inline(svg))
            }
            OutputTarget::File => {
                fs::write(path, svg)?;
                figure.frozen = true;
                let (width, height) = figure.physical_size();
                log::debug!(
                    "static figure saved to {} ({width:.1} x {height:.1} in)",
                    path.display()
                );
                Ok(Presentation::Saved(path.to_path_buf()))
            }
        }
    }
}

impl LiveBackend for ImageBackend {
    fn is_live(&self, figure: &StaticFigure) -> bool {
        !figure.frozen && figure.snapshot.is_some()
    }

    fn update_curve(
        &mut self,
        figure: &mut StaticFigure,
        id: GlyphId,
        curve: &UncertainCurve,
    ) -> Result<()> {
        figure.guard_live()?;
        let line = figure.marks.iter_mut().find_map(|mark| match mark {
            Mark::Line { id: line, y, .. } if *line == id => Some(y),
            _ => None,
        });
        let Some(y) = line else {
            return Err(PlotError::Render(format!("{id} is not a line of the figure")));
        };
        *y = curve.mean().to_vec();
        Ok(())
    }

    fn update_band(&mut self, figure: &mut StaticFigure, id: GlyphId, band: &Band) -> Result<()> {
        figure.guard_live()?;
        let (outline_x, outline_y) = band.outline();
        let slot = figure.marks.iter_mut().find_map(|mark| match mark {
            Mark::Band { id: band, x, y, .. } if *band == id => Some((x, y)),
            _ => None,
        });
        let Some((x, y)) = slot else {
            return Err(PlotError::Render(format!("{id} is not a band of the figure")));
        };
        *x = outline_x;
        *y = outline_y;
        Ok(())
    }

    fn redraw(&mut self, figure: &mut StaticFigure, _ids: &[GlyphId]) -> Result<()> {
        figure.guard_live()?;
        figure.snapshot = Some(render_svg(figure)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use crate::layout::Labels;
    use crate::testing;
    use crate::view::Viewport;

    fn layout(residual: Option<Range>) -> FigureLayout {
        let viewport = Viewport::new(Range::new(0.0, 6.0), Range::new(0.0, 12.0));
        FigureLayout::new(&Labels::default(), viewport, residual, &SceneConfig::default(), 0.0)
    }

    #[test]
    fn residual_panel_makes_figure_taller() {
        let mut backend = ImageBackend::new();
        let plain = backend.initialize_figure(&layout(None));
        assert_eq!(plain.pixel_size(), (600, 400));
        let split = backend.initialize_figure(&layout(Some(Range::new(-1.0, 1.0))));
        assert_eq!(split.pixel_size(), (600, 532));
        let (width, _) = split.physical_size();
        assert!((width - 600.0 * 0.017).abs() < 1e-9);
    }

    #[test]
    fn renders_fitted_dataset_to_svg() {
        let mut backend = ImageBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        let shared = testing::fitted_line_dataset();
        let dataset = crate::dataset::read(&shared);
        backend.draw_dataset(&mut figure, &*dataset, Color::BLACK, false);
        let fit = dataset.last_fit().expect("fitted");
        let offset = backend.draw_parameter_text_box(&mut figure, fit, 0.0);
        assert_eq!(offset, 36.0);
        backend.draw_dataset(&mut figure, &*dataset, Color::BLACK, true);
        assert!(figure.residual_range().is_some());
        backend.finalize(&mut figure);

        let presented = backend
            .present(&mut figure, OutputTarget::Interactive, Path::new("unused.svg"))
            .expect("inline render");
        let svg = presented.markup().expect("inline markup");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Residuals"));
        assert!(svg.contains("offset"));
        assert_eq!(figure.snapshot(), Some(svg));
    }

    #[test]
    fn file_output_freezes_figure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("plot.svg");
        let mut backend = ImageBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        let curve = UncertainCurve::with_std(vec![0.0, 1.0], vec![1.0, 2.0], vec![0.1, 0.1]);
        let line = backend.draw_curve(&mut figure, &curve, Color::BLACK, "model");
        backend.finalize(&mut figure);

        let presented = backend
            .present(&mut figure, OutputTarget::File, &path)
            .expect("file render");
        assert_eq!(presented, Presentation::Saved(path.clone()));
        assert!(figure.is_frozen());
        let written = fs::read_to_string(&path).expect("svg written");
        assert!(written.contains("model"));

        assert!(matches!(
            backend.update_curve(&mut figure, line, &curve),
            Err(PlotError::NotLive)
        ));
        backend.draw_curve(&mut figure, &curve, Color::BLACK, "late");
        assert_eq!(figure.line(GlyphId(1)), None);
    }

    #[test]
    fn histogram_populates_bars_without_error_bars() {
        let mut scene = crate::scene::Scene::from_dataset(ImageBackend::new(), testing::histogram_dataset());
        scene
            .show(OutputTarget::Interactive, true, true)
            .expect("render");
        let figure = scene.figure().expect("built");

        let heights: Vec<Vec<f64>> = figure
            .marks
            .iter()
            .filter_map(|mark| match mark {
                Mark::Bars { bars, .. } => Some(bars.iter().map(|bar| bar.height).collect()),
                _ => None,
            })
            .collect();
        assert_eq!(heights, vec![vec![2.0, 3.0, 1.0, 2.0]]);
        assert!(!figure.marks.iter().any(|mark| matches!(mark, Mark::Points { .. })));
        assert!(figure.snapshot().is_some_and(|svg| svg.contains("counts")));
    }

    #[test]
    fn live_update_rerenders_snapshot() {
        let mut backend = ImageBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        let curve = UncertainCurve::with_std(vec![0.0, 1.0], vec![1.0, 2.0], vec![0.1, 0.1]);
        let band = backend
            .draw_error_band(&mut figure, &curve, 1.0, Color::BLACK)
            .expect("uncertain");
        let line = backend.draw_curve(&mut figure, &curve, Color::BLACK, "model");

        let moved = UncertainCurve::with_std(vec![0.0, 1.0], vec![3.0, 4.0], vec![0.0, 0.0]);
        backend.update_curve(&mut figure, line, &moved).expect("line");
        let outline = moved.band(1.0).expect("band");
        backend.update_band(&mut figure, band, &outline).expect("band");
        backend.redraw(&mut figure, &[line, band]).expect("live");

        assert_eq!(figure.line(line).map(|(_, y)| y), Some(&[3.0, 4.0][..]));
        assert_eq!(
            figure.band(band).map(|(_, y)| y),
            Some(&[3.0, 4.0, 4.0, 3.0][..])
        );
        assert!(figure.snapshot().is_some());
        assert!(backend.update_curve(&mut figure, band, &moved).is_err());
    }
}

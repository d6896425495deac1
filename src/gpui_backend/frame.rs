use crate::backend::canvas::{CanvasFigure, Glyph, GlyphKind, Panel, PanelId};
use crate::config::LegendLocation;
use crate::render::{Color, TextStyle};
use crate::transform::{ScreenPoint, ScreenRect, Transform};
use crate::view::Viewport;

const PAD_LEFT: f32 = 64.0;
const PAD_RIGHT: f32 = 12.0;
const PAD_TOP: f32 = 34.0;
const PAD_BOTTOM: f32 = 42.0;
const LEGEND_ROW_PX: f32 = 18.0;
const LEGEND_SWATCH_PX: f32 = 12.0;
const CHAR_WIDTH_RATIO: f32 = 0.55;

/// Screen-space drawing primitive.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FrameCommand {
    Clip(ScreenRect),
    ClipEnd,
    Fill {
        rect: ScreenRect,
        color: Color,
    },
    Outline {
        rect: ScreenRect,
        color: Color,
    },
    Polyline {
        points: Vec<ScreenPoint>,
        width: f32,
        color: Color,
    },
    Segments {
        segments: Vec<[ScreenPoint; 2]>,
        color: Color,
    },
    Polygon {
        points: Vec<ScreenPoint>,
        color: Color,
    },
    Rects {
        rects: Vec<ScreenRect>,
        color: Color,
    },
    Markers {
        points: Vec<ScreenPoint>,
        size: f32,
        color: Color,
    },
    Text {
        position: ScreenPoint,
        text: String,
        style: TextStyle,
        align_right: bool,
    },
}

/// Everything painted for one frame.
#[derive(Debug, Default)]
pub(crate) struct FigureFrame {
    pub(crate) commands: Vec<FrameCommand>,
}

impl FigureFrame {
    fn push(&mut self, command: FrameCommand) {
        self.commands.push(command);
    }
}

/// Lay out `figure` inside `bounds`. Panels keep their relative heights.
pub(crate) fn build_frame(figure: &CanvasFigure, bounds: ScreenRect) -> FigureFrame {
    let mut frame = FigureFrame::default();
    if !bounds.is_valid() {
        return frame;
    }
    let total = figure.total_height().max(1) as f32;
    let main_share = figure.main.height as f32 / total;
    let split = bounds.min.y + bounds.height() * main_share;
    let main_area = ScreenRect::new(bounds.min, ScreenPoint::new(bounds.max.x, split));

    frame.push(FrameCommand::Text {
        position: ScreenPoint::new(main_area.min.x + PAD_LEFT, main_area.min.y + 8.0),
        text: figure.title.clone(),
        style: TextStyle::default(),
        align_right: false,
    });

    let main_plot = plot_rect(main_area);
    panel_frame(&mut frame, figure, &figure.main, PanelId::Main, main_plot);
    labels(&mut frame, figure, main_area);
    if figure.legend.visible {
        legend(&mut frame, figure, main_plot);
    }

    if let Some(residual) = &figure.residual {
        let area = ScreenRect::new(ScreenPoint::new(bounds.min.x, split), bounds.max);
        panel_frame(&mut frame, figure, residual, PanelId::Residual, plot_rect(area));
    }
    frame
}

fn plot_rect(area: ScreenRect) -> ScreenRect {
    ScreenRect::new(
        ScreenPoint::new(area.min.x + PAD_LEFT, area.min.y + PAD_TOP),
        ScreenPoint::new(area.max.x - PAD_RIGHT, area.max.y - PAD_BOTTOM),
    )
}

fn panel_frame(
    frame: &mut FigureFrame,
    figure: &CanvasFigure,
    panel: &Panel,
    id: PanelId,
    rect: ScreenRect,
) {
    let Some(transform) = Transform::new(Viewport::new(panel.x_range, panel.y_range), rect) else {
        return;
    };
    frame.push(FrameCommand::Outline {
        rect,
        color: Color::BLACK,
    });
    frame.push(FrameCommand::Text {
        position: ScreenPoint::new(rect.max.x, rect.max.y + PAD_BOTTOM * 0.5),
        text: panel.x_label.clone(),
        style: TextStyle::default(),
        align_right: true,
    });
    frame.push(FrameCommand::Text {
        position: ScreenPoint::new(rect.min.x - PAD_LEFT + 4.0, rect.min.y - LEGEND_ROW_PX),
        text: panel.y_label.clone(),
        style: TextStyle::default(),
        align_right: false,
    });

    frame.push(FrameCommand::Clip(rect));
    for glyph in figure.glyphs.iter().filter(|glyph| glyph.panel == id) {
        if let Some(command) = glyph_command(glyph, &transform) {
            frame.push(command);
        }
    }
    frame.push(FrameCommand::ClipEnd);
}

fn points(transform: &Transform, x: &[f64], y: &[f64]) -> Vec<ScreenPoint> {
    x.iter()
        .zip(y)
        .filter_map(|(&x, &y)| transform.data_to_screen(x, y))
        .collect()
}

fn glyph_command(glyph: &Glyph, transform: &Transform) -> Option<FrameCommand> {
    let xy = || Some((glyph.column("x")?, glyph.column("y")?));
    let command = match glyph.kind {
        GlyphKind::Scatter => {
            let (x, y) = xy()?;
            FrameCommand::Markers {
                points: points(transform, x, y),
                size: glyph.size,
                color: glyph.color,
            }
        }
        GlyphKind::Line => {
            let (x, y) = xy()?;
            FrameCommand::Polyline {
                points: points(transform, x, y),
                width: glyph.size,
                color: glyph.color,
            }
        }
        GlyphKind::Patch => {
            let (x, y) = xy()?;
            FrameCommand::Polygon {
                points: points(transform, x, y),
                color: glyph.color,
            }
        }
        GlyphKind::Segments => {
            let starts = glyph.column("x0")?.iter().zip(glyph.column("y0")?);
            let ends = glyph.column("x1")?.iter().zip(glyph.column("y1")?);
            let segments = starts
                .zip(ends)
                .filter_map(|((&x0, &y0), (&x1, &y1))| {
                    Some([
                        transform.data_to_screen(x0, y0)?,
                        transform.data_to_screen(x1, y1)?,
                    ])
                })
                .collect();
            FrameCommand::Segments {
                segments,
                color: glyph.color,
            }
        }
        GlyphKind::Bars => {
            let left = glyph.column("left")?;
            let right = glyph.column("right")?;
            let top = glyph.column("top")?;
            let rects = left
                .iter()
                .zip(right)
                .zip(top)
                .filter_map(|((&left, &right), &top)| {
                    let a = transform.data_to_screen(left, 0.0)?;
                    let b = transform.data_to_screen(right, top)?;
                    Some(ScreenRect::new(
                        ScreenPoint::new(a.x.min(b.x), a.y.min(b.y)),
                        ScreenPoint::new(a.x.max(b.x), a.y.max(b.y)),
                    ))
                })
                .collect();
            FrameCommand::Rects {
                rects,
                color: glyph.color,
            }
        }
    };
    Some(command)
}

fn labels(frame: &mut FigureFrame, figure: &CanvasFigure, area: ScreenRect) {
    let scale_x = area.width() / figure.main.width.max(1) as f32;
    let scale_y = area.height() / figure.main.height.max(1) as f32;
    let style = TextStyle::default();
    for line in &figure.labels {
        let position = ScreenPoint::new(
            area.min.x + line.x * scale_x,
            area.min.y + line.y * scale_y,
        );
        let width = line.text.chars().count() as f32 * style.size * CHAR_WIDTH_RATIO;
        frame.push(FrameCommand::Fill {
            rect: ScreenRect::new(
                ScreenPoint::new(position.x - width, position.y),
                ScreenPoint::new(position.x, position.y + style.size * 1.2),
            ),
            color: figure.label_background,
        });
        frame.push(FrameCommand::Text {
            position,
            text: line.text.clone(),
            style: style.clone(),
            align_right: true,
        });
    }
}

fn legend(frame: &mut FigureFrame, figure: &CanvasFigure, plot: ScreenRect) {
    let entries: Vec<(&str, Color)> = figure
        .glyphs
        .iter()
        .filter_map(|glyph| Some((glyph.legend.as_deref()?, glyph.color)))
        .collect();
    if entries.is_empty() {
        return;
    }
    let style = TextStyle::default();
    let longest = entries
        .iter()
        .map(|(name, _)| name.chars().count())
        .max()
        .unwrap_or(0) as f32;
    let width = LEGEND_SWATCH_PX + 12.0 + longest * style.size * CHAR_WIDTH_RATIO;
    let height = entries.len() as f32 * LEGEND_ROW_PX + 6.0;
    let origin = legend_origin(figure.legend.location, plot, width, height);
    frame.push(FrameCommand::Fill {
        rect: ScreenRect::new(origin, ScreenPoint::new(origin.x + width, origin.y + height)),
        color: figure.label_background,
    });
    for (row, (name, color)) in entries.into_iter().enumerate() {
        let top = origin.y + 3.0 + row as f32 * LEGEND_ROW_PX;
        frame.push(FrameCommand::Fill {
            rect: ScreenRect::new(
                ScreenPoint::new(origin.x + 4.0, top + 3.0),
                ScreenPoint::new(origin.x + 4.0 + LEGEND_SWATCH_PX, top + 3.0 + LEGEND_SWATCH_PX),
            ),
            color,
        });
        frame.push(FrameCommand::Text {
            position: ScreenPoint::new(origin.x + LEGEND_SWATCH_PX + 8.0, top),
            text: name.to_string(),
            style: style.clone(),
            align_right: false,
        });
    }
}

fn legend_origin(location: LegendLocation, plot: ScreenRect, width: f32, height: f32) -> ScreenPoint {
    use LegendLocation::*;
    let inset = 6.0;
    let x = match location {
        TopLeft | CenterLeft | BottomLeft => plot.min.x + inset,
        TopCenter | Center | BottomCenter => plot.min.x + (plot.width() - width) * 0.5,
        TopRight | CenterRight | BottomRight => plot.max.x - width - inset,
    };
    let y = match location {
        TopLeft | TopCenter | TopRight => plot.min.y + inset,
        CenterLeft | Center | CenterRight => plot.min.y + (plot.height() - height) * 0.5,
        BottomLeft | BottomCenter | BottomRight => plot.max.y - height - inset,
    };
    ScreenPoint::new(x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::canvas::CanvasBackend;
    use crate::backend::OutputTarget;
    use crate::scene::Scene;
    use crate::testing;

    fn figure_with_residuals() -> CanvasFigure {
        let mut scene = Scene::from_dataset(CanvasBackend::new(), testing::fitted_line_dataset());
        scene.enable_residuals();
        scene
            .show(OutputTarget::Interactive, true, true)
            .expect("render");
        scene.figure().cloned().expect("built")
    }

    #[test]
    fn panels_split_by_relative_height() {
        let figure = figure_with_residuals();
        let bounds = ScreenRect::from_size(600.0, 533.0);
        let frame = build_frame(&figure, bounds);
        let clips: Vec<ScreenRect> = frame
            .commands
            .iter()
            .filter_map(|command| match command {
                FrameCommand::Clip(rect) => Some(*rect),
                _ => None,
            })
            .collect();
        assert_eq!(clips.len(), 2);
        assert!(clips[0].max.y <= clips[1].min.y);
        assert_eq!(clips[0].min.x, clips[1].min.x);
    }

    #[test]
    fn band_becomes_polygon() {
        let figure = figure_with_residuals();
        let frame = build_frame(&figure, ScreenRect::from_size(600.0, 533.0));
        assert!(frame.commands.iter().any(|command| matches!(
            command,
            FrameCommand::Polygon { points, .. } if points.len() == 2 * crate::curve::FIT_SAMPLES
        )));
        assert_eq!(
            frame
                .commands
                .iter()
                .filter(|command| matches!(command, FrameCommand::Text { align_right: true, .. }))
                .count(),
            2 + figure.labels.len()
        );
    }

    #[test]
    fn segments_drop_whole_pairs_with_missing_points() {
        use crate::backend::canvas::{Columns, Glyph};
        use crate::backend::{Backend, GlyphId};
        use crate::config::SceneConfig;
        use crate::layout::{FigureLayout, Labels};
        use crate::view::Range;

        let viewport = Viewport::new(Range::new(0.0, 10.0), Range::new(0.0, 10.0));
        let layout = FigureLayout::new(&Labels::default(), viewport, None, &SceneConfig::default(), 0.0);
        let mut figure = CanvasBackend::new().initialize_figure(&layout);
        let mut columns = Columns::new();
        columns.insert("x0".to_string(), vec![1.0, f64::NAN, 3.0]);
        columns.insert("y0".to_string(), vec![1.0, 2.0, 3.0]);
        columns.insert("x1".to_string(), vec![1.0, 2.0, 3.0]);
        columns.insert("y1".to_string(), vec![5.0, 6.0, 7.0]);
        figure.glyphs.push(Glyph {
            id: GlyphId(0),
            panel: PanelId::Main,
            kind: GlyphKind::Segments,
            color: Color::BLACK,
            size: 1.0,
            legend: None,
            columns,
        });

        let frame = build_frame(&figure, ScreenRect::from_size(600.0, 400.0));
        let segments = frame
            .commands
            .iter()
            .find_map(|command| match command {
                FrameCommand::Segments { segments, .. } => Some(segments.clone()),
                _ => None,
            })
            .expect("segments");
        assert_eq!(segments.len(), 2);
        for [start, end] in &segments {
            assert_eq!(start.x, end.x);
        }
    }

    #[test]
    fn degenerate_bounds_paint_nothing() {
        let figure = figure_with_residuals();
        assert!(build_frame(&figure, ScreenRect::from_size(0.0, 0.0)).commands.is_empty());
    }
}

use gpui::{
    App, BorderStyle, Bounds, ContentMask, Corners, Edges, PathBuilder, Pixels, TextRun, Window,
    font, point, px, quad,
};

use crate::render::{Color, TextStyle};
use crate::transform::{ScreenPoint, ScreenRect};

use super::frame::{FigureFrame, FrameCommand};

pub(crate) fn paint_frame(frame: &FigureFrame, window: &mut Window, cx: &mut App) {
    let mut clip_stack: Vec<ContentMask<Pixels>> = Vec::new();
    for command in &frame.commands {
        match command {
            FrameCommand::Clip(rect) => {
                clip_stack.push(ContentMask {
                    bounds: to_bounds(*rect),
                });
            }
            FrameCommand::ClipEnd => {
                clip_stack.pop();
            }
            FrameCommand::Fill { rect, color } => {
                with_clip(window, &clip_stack, |window| {
                    paint_rect(window, *rect, *color, None);
                });
            }
            FrameCommand::Outline { rect, color } => {
                with_clip(window, &clip_stack, |window| {
                    paint_rect(window, *rect, Color::WHITE.with_alpha(0.0), Some(*color));
                });
            }
            FrameCommand::Rects { rects, color } => {
                with_clip(window, &clip_stack, |window| {
                    for rect in rects {
                        paint_rect(window, *rect, *color, None);
                    }
                });
            }
            FrameCommand::Polyline {
                points,
                width,
                color,
            } => {
                with_clip(window, &clip_stack, |window| {
                    paint_polyline(window, points, *width, *color);
                });
            }
            FrameCommand::Segments { segments, color } => {
                with_clip(window, &clip_stack, |window| {
                    paint_segments(window, segments, *color);
                });
            }
            FrameCommand::Polygon { points, color } => {
                with_clip(window, &clip_stack, |window| {
                    paint_polygon(window, points, *color);
                });
            }
            FrameCommand::Markers {
                points,
                size,
                color,
            } => {
                with_clip(window, &clip_stack, |window| {
                    paint_markers(window, points, *size, *color);
                });
            }
            FrameCommand::Text {
                position,
                text,
                style,
                align_right,
            } => {
                with_clip(window, &clip_stack, |window| {
                    paint_text(window, cx, *position, text, style, *align_right);
                });
            }
        }
    }
}

fn paint_polyline(window: &mut Window, points: &[ScreenPoint], width: f32, color: Color) {
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    let mut builder = PathBuilder::stroke(px(width.max(0.5)));
    builder.move_to(point(px(first.x), px(first.y)));
    for pt in rest {
        builder.line_to(point(px(pt.x), px(pt.y)));
    }
    if let Ok(path) = builder.build() {
        window.paint_path(path, to_rgba(color));
    }
}

fn paint_segments(window: &mut Window, segments: &[[ScreenPoint; 2]], color: Color) {
    if segments.is_empty() {
        return;
    }
    let mut builder = PathBuilder::stroke(px(1.0));
    for [start, end] in segments {
        builder.move_to(point(px(start.x), px(start.y)));
        builder.line_to(point(px(end.x), px(end.y)));
    }
    if let Ok(path) = builder.build() {
        window.paint_path(path, to_rgba(color));
    }
}

fn paint_polygon(window: &mut Window, points: &[ScreenPoint], color: Color) {
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    let mut builder = PathBuilder::fill();
    builder.move_to(point(px(first.x), px(first.y)));
    for pt in rest {
        builder.line_to(point(px(pt.x), px(pt.y)));
    }
    builder.close();
    if let Ok(path) = builder.build() {
        window.paint_path(path, to_rgba(color));
    }
}

fn paint_markers(window: &mut Window, points: &[ScreenPoint], size: f32, color: Color) {
    let radius = size.max(2.0) * 0.5;
    for pt in points {
        let bounds = Bounds::from_corners(
            point(px(pt.x - radius), px(pt.y - radius)),
            point(px(pt.x + radius), px(pt.y + radius)),
        );
        window.paint_quad(quad(
            bounds,
            Corners::all(px(radius)),
            to_rgba(color),
            Edges::all(px(0.0)),
            to_rgba(color),
            BorderStyle::default(),
        ));
    }
}

fn paint_rect(window: &mut Window, rect: ScreenRect, fill: Color, stroke: Option<Color>) {
    let (stroke_width, stroke) = match stroke {
        Some(color) => (1.0, color),
        None => (0.0, fill),
    };
    window.paint_quad(quad(
        to_bounds(rect),
        Corners::all(px(0.0)),
        to_rgba(fill),
        Edges::all(px(stroke_width)),
        to_rgba(stroke),
        BorderStyle::default(),
    ));
}

fn paint_text(
    window: &mut Window,
    cx: &mut App,
    position: ScreenPoint,
    text: &str,
    style: &TextStyle,
    align_right: bool,
) {
    if text.is_empty() {
        return;
    }
    let run = TextRun {
        len: text.len(),
        font: font(".SystemUIFont"),
        color: to_hsla(style.color),
        background_color: None,
        underline: None,
        strikethrough: None,
    };
    let shaped = window
        .text_system()
        .shape_line(text.to_string().into(), px(style.size), &[run], None);
    let line_height = shaped.ascent + shaped.descent;
    let x = if align_right {
        position.x - f32::from(shaped.width)
    } else {
        position.x
    };
    let _ = shaped.paint(point(px(x), px(position.y)), line_height, window, cx);
}

fn to_rgba(color: Color) -> gpui::Rgba {
    gpui::Rgba {
        r: color.r,
        g: color.g,
        b: color.b,
        a: color.a,
    }
}

pub(crate) fn to_hsla(color: Color) -> gpui::Hsla {
    gpui::Hsla::from(to_rgba(color))
}

fn to_bounds(rect: ScreenRect) -> Bounds<Pixels> {
    Bounds::from_corners(
        point(px(rect.min.x), px(rect.min.y)),
        point(px(rect.max.x), px(rect.max.y)),
    )
}

fn with_clip(window: &mut Window, stack: &[ContentMask<Pixels>], f: impl FnOnce(&mut Window)) {
    if let Some(mask) = stack.last() {
        window.with_content_mask(Some(mask.clone()), f);
    } else {
        f(window);
    }
}

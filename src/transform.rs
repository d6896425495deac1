//! Coordinate transforms between data and screen space.
//!
//! Screen space follows the canvas convention: the origin is the top-left
//! corner and Y grows downwards.

use crate::view::{Range, Viewport};

const MIN_SPAN: f64 = 1e-12;

/// A point in screen space (pixel coordinates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    /// X value in screen pixels.
    pub x: f32,
    /// Y value in screen pixels.
    pub y: f32,
}

impl ScreenPoint {
    /// Create a new screen point.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A rectangle in screen space (pixel coordinates).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    /// Top-left corner.
    pub min: ScreenPoint,
    /// Bottom-right corner.
    pub max: ScreenPoint,
}

impl ScreenRect {
    /// Create a new screen rectangle from corners.
    pub fn new(min: ScreenPoint, max: ScreenPoint) -> Self {
        Self { min, max }
    }

    /// Rectangle anchored at the origin with the given size.
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(ScreenPoint::new(0.0, 0.0), ScreenPoint::new(width, height))
    }

    /// Rectangle width in pixels.
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    /// Rectangle height in pixels.
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Check whether the rectangle has positive area.
    pub fn is_valid(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }
}

/// Linear transform from data coordinates into screen coordinates.
#[derive(Debug, Clone)]
pub struct Transform {
    viewport: Viewport,
    screen: ScreenRect,
    x_axis: Range,
    y_axis: Range,
}

impl Transform {
    /// Create a transform for the given viewport and screen rectangle.
    ///
    /// Returns `None` for degenerate screens or non-finite viewports.
    pub fn new(viewport: Viewport, screen: ScreenRect) -> Option<Self> {
        if !screen.is_valid() || !viewport.x.is_finite() || !viewport.y.is_finite() {
            return None;
        }
        Some(Self {
            viewport,
            screen,
            x_axis: viewport.x.with_min_span(MIN_SPAN),
            y_axis: viewport.y.with_min_span(MIN_SPAN),
        })
    }

    /// Access the viewport.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Access the screen rectangle.
    pub fn screen(&self) -> ScreenRect {
        self.screen
    }

    /// Map a data coordinate pair into screen space.
    pub fn data_to_screen(&self, x: f64, y: f64) -> Option<ScreenPoint> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let x_norm = (x - self.x_axis.min) / self.x_axis.span();
        let y_norm = (y - self.y_axis.min) / self.y_axis.span();
        let sx = self.screen.min.x as f64 + x_norm * self.screen.width() as f64;
        let sy = self.screen.max.y as f64 - y_norm * self.screen.height() as f64;
        Some(ScreenPoint::new(sx as f32, sy as f32))
    }

    /// Map a screen point into data space.
    pub fn screen_to_data(&self, point: ScreenPoint) -> (f64, f64) {
        let x_norm = (point.x as f64 - self.screen.min.x as f64) / self.screen.width() as f64;
        let y_norm = (self.screen.max.y as f64 - point.y as f64) / self.screen.height() as f64;
        (
            self.x_axis.min + x_norm * self.x_axis.span(),
            self.y_axis.min + y_norm * self.y_axis.span(),
        )
    }

    /// Height in data units covered by a vertical pixel distance.
    pub fn pixels_to_data_y(&self, pixels: f64) -> f64 {
        pixels * self.y_axis.span() / self.screen.height() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_roundtrip() {
        let viewport = Viewport::new(Range::new(0.0, 10.0), Range::new(0.0, 10.0));
        let screen = ScreenRect::from_size(100.0, 100.0);
        let transform = Transform::new(viewport, screen).expect("valid transform");
        let screen_point = transform.data_to_screen(5.0, 7.5).expect("finite point");
        let (x, y) = transform.screen_to_data(screen_point);
        assert!((x - 5.0).abs() < 1e-6);
        assert!((y - 7.5).abs() < 1e-6);
    }

    #[test]
    fn y_axis_points_down() {
        let viewport = Viewport::new(Range::new(0.0, 1.0), Range::new(0.0, 1.0));
        let transform =
            Transform::new(viewport, ScreenRect::from_size(10.0, 10.0)).expect("valid transform");
        let top = transform.data_to_screen(0.0, 1.0).expect("finite point");
        assert_eq!(top.y, 0.0);
    }

    #[test]
    fn pixel_height_scales_with_span() {
        let viewport = Viewport::new(Range::new(0.0, 1.0), Range::new(-2.0, 2.0));
        let transform =
            Transform::new(viewport, ScreenRect::from_size(600.0, 400.0)).expect("valid transform");
        assert!((transform.pixels_to_data_y(100.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_screen_rejected() {
        let viewport = Viewport::default();
        assert!(Transform::new(viewport, ScreenRect::from_size(0.0, 10.0)).is_none());
    }
}

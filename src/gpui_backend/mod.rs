//! GPUI integration for fitplot.
//!
//! This module provides a GPUI view that paints a live
//! [`CanvasFigure`](crate::CanvasFigure) and a handle that receives the
//! canvas backend's glyph patches, so explorer updates repaint in place.

mod frame;
mod paint;
mod view;

pub use view::{LiveFigureHandle, LiveFigureView};

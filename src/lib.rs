//! fitplot composes scientific XY plots of measured data, fitted models and
//! user functions with error bands, and renders them through an interactive
//! canvas backend or a static image backend.
//!
//! A [`Scene`] holds the plot description. Showing it builds a figure on the
//! scene's backend, draws every dataset, fit and function onto it and hands
//! the result to the chosen [`OutputTarget`]. Linear fits can be explored
//! live through [`Scene::begin_interactive_linear_fit`].

#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod curve;
pub mod dataset;
pub mod error;
pub mod explorer;
pub mod layout;
pub mod palette;
pub mod render;
pub mod scene;
pub mod transform;
pub mod uncertainty;
pub mod view;

#[cfg(feature = "gpui")]
pub mod gpui_backend;

#[cfg(test)]
mod testing;

pub use backend::canvas::{CanvasBackend, CanvasFigure, GlyphPatch};
pub use backend::image::{ImageBackend, StaticFigure};
pub use backend::{
    Backend, BackendKind, CurveHandles, GlyphId, LiveBackend, OutputTarget, Presentation,
};
pub use config::{LegendLocation, LegendOrientation, SceneConfig};
pub use curve::{ModelFn, ParameterSource, UncertainCurve, UserFunction, model_fn};
pub use dataset::{AxisLabel, Dataset, FitError, FitModel, FitRecord, Fitter, SharedDataset, XyDataset};
pub use error::{PlotError, Result};
pub use explorer::{ControlEvent, ControlQueue, ControlSender, LinearControls, LinearParameters};
pub use layout::Labels;
pub use palette::Palette;
pub use render::Color;
pub use scene::{Scene, XyColumns};
pub use uncertainty::{DerivativePropagator, Measurement, PropagationMode, Propagator, UncertainParameters};
pub use view::{Range, Viewport};

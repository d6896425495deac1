//! Live exploration of a linear fit.
//!
//! After a linear fit has been drawn, the scene keeps the curve and band
//! handles and the grid they were sampled on. Each control event rebuilds
//! the offset and slope distributions, propagates them through
//! `offset + slope * x` and overwrites the retained glyphs in place.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::backend::CurveHandles;
use crate::curve::{Band, UncertainCurve};
use crate::dataset::FitRecord;
use crate::render::Color;
use crate::uncertainty::{Measurement, PropagationMode, Propagator, UncertainParameters};
use crate::view::Range;

/// Error range used for the controls until the caller asks for another one.
pub const DEFAULT_ERROR_RANGE: f64 = 2.0;
/// Number of slider steps across a parameter window.
pub const SLIDER_STEPS: f64 = 50.0;
/// Step of the correlation slider.
pub const CORRELATION_STEP: f64 = 0.05;

/// Current offset and slope distributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParameters {
    pub offset: f64,
    pub offset_std: f64,
    pub slope: f64,
    pub slope_std: f64,
    pub correlation: f64,
}

impl LinearParameters {
    /// Read the first two parameters of a fit as offset and slope.
    pub fn from_fit(fit: &FitRecord) -> Option<Self> {
        let offset = fit.parameters.measurement(0)?;
        let slope = fit.parameters.measurement(1)?;
        Some(Self {
            offset: offset.mean,
            offset_std: offset.std,
            slope: slope.mean,
            slope_std: slope.std,
            correlation: fit.correlation(0, 1),
        })
    }

    /// Offset and slope as correlated uncertain parameters.
    pub fn to_uncertain(&self) -> UncertainParameters {
        let mut params = UncertainParameters::from_measurements([
            Measurement::named(self.offset, self.offset_std, "offset"),
            Measurement::named(self.slope, self.slope_std, "slope"),
        ]);
        params.set_correlation(0, 1, self.correlation);
        params
    }

    fn apply(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Offset(value) => self.offset = value,
            ControlEvent::OffsetStd(value) => self.offset_std = value,
            ControlEvent::Slope(value) => self.slope = value,
            ControlEvent::SlopeStd(value) => self.slope_std = value,
            ControlEvent::Correlation(value) => self.correlation = value,
        }
    }
}

/// A change to one explorer control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    Offset(f64),
    OffsetStd(f64),
    Slope(f64),
    SlopeStd(f64),
    Correlation(f64),
}

impl ControlEvent {
    /// The requested value.
    pub fn value(&self) -> f64 {
        match *self {
            Self::Offset(value)
            | Self::OffsetStd(value)
            | Self::Slope(value)
            | Self::SlopeStd(value)
            | Self::Correlation(value) => value,
        }
    }

    fn with_value(self, value: f64) -> Self {
        match self {
            Self::Offset(_) => Self::Offset(value),
            Self::OffsetStd(_) => Self::OffsetStd(value),
            Self::Slope(_) => Self::Slope(value),
            Self::SlopeStd(_) => Self::SlopeStd(value),
            Self::Correlation(_) => Self::Correlation(value),
        }
    }
}

/// Bounds, step and current value of one control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slider {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

impl Slider {
    fn new(min: f64, max: f64, step: f64, value: f64) -> Self {
        let window = Range::new(min, max);
        Self {
            min: window.min,
            max: window.max,
            step,
            value: window.clamp(value),
        }
    }

    /// Clamp a requested value into the window.
    pub fn clamp(&self, value: f64) -> f64 {
        Range::new(self.min, self.max).clamp(value)
    }
}

/// The five explorer controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearControls {
    pub offset: Slider,
    pub offset_std: Slider,
    pub slope: Slider,
    pub slope_std: Slider,
    pub correlation: Slider,
}

impl LinearControls {
    /// Windows of `error_range` standard deviations around the fitted values.
    pub fn new(fitted: &LinearParameters, error_range: f64) -> Self {
        let mean_window = |mean: f64, std: f64| {
            let (min, max) = (mean - error_range * std, mean + error_range * std);
            Slider::new(min, max, (max - min) / SLIDER_STEPS, mean)
        };
        let std_window =
            |std: f64| Slider::new(0.0, error_range * std, std / SLIDER_STEPS, std);
        Self {
            offset: mean_window(fitted.offset, fitted.offset_std),
            offset_std: std_window(fitted.offset_std),
            slope: mean_window(fitted.slope, fitted.slope_std),
            slope_std: std_window(fitted.slope_std),
            correlation: Slider::new(-1.0, 1.0, CORRELATION_STEP, fitted.correlation),
        }
    }

    fn slider_mut(&mut self, event: ControlEvent) -> &mut Slider {
        match event {
            ControlEvent::Offset(_) => &mut self.offset,
            ControlEvent::OffsetStd(_) => &mut self.offset_std,
            ControlEvent::Slope(_) => &mut self.slope,
            ControlEvent::SlopeStd(_) => &mut self.slope_std,
            ControlEvent::Correlation(_) => &mut self.correlation,
        }
    }

    /// Clamp the event into its slider window and record it as the slider
    /// value. Returns the event that was applied.
    pub fn accept(&mut self, event: ControlEvent) -> ControlEvent {
        let slider = self.slider_mut(event);
        let requested = event.value();
        let value = slider.clamp(requested);
        if value != requested {
            log::warn!("{event:?} is outside [{}, {}]; using {value}", slider.min, slider.max);
        }
        slider.value = value;
        event.with_value(value)
    }
}

/// Propagate offset and slope through `offset + slope * x` on `grid`.
///
/// Always linear propagation; returns the mean curve and the band of
/// `sigma` standard deviations around it.
pub fn propagate_linear(
    params: &LinearParameters,
    grid: &[f64],
    propagator: &dyn Propagator,
    sigma: f64,
) -> (UncertainCurve, Band) {
    let line = |x: f64, p: &[f64]| p[0] + p[1] * x;
    let curve = propagator.propagate(&line, grid, &params.to_uncertain(), PropagationMode::Linear);
    let band = curve.band(sigma).unwrap_or_else(|| Band {
        x: curve.x().to_vec(),
        lower: curve.mean().to_vec(),
        upper: curve.mean().to_vec(),
    });
    (curve, band)
}

/// Retained state of a live linear fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveFit {
    /// Drawn curve and band.
    pub handles: CurveHandles,
    /// Grid the curve was sampled on.
    pub grid: Vec<f64>,
    /// Parameters as fitted.
    pub fitted: LinearParameters,
    /// Parameters currently shown.
    pub current: LinearParameters,
    /// Control windows.
    pub controls: LinearControls,
    /// Color of the fitted dataset.
    pub color: Color,
}

impl LiveFit {
    pub(crate) fn new(
        handles: CurveHandles,
        grid: Vec<f64>,
        fitted: LinearParameters,
        color: Color,
    ) -> Self {
        Self {
            handles,
            grid,
            fitted,
            current: fitted,
            controls: LinearControls::new(&fitted, DEFAULT_ERROR_RANGE),
            color,
        }
    }

    /// Apply a control event and return the parameters now shown.
    pub(crate) fn apply(&mut self, event: ControlEvent) -> LinearParameters {
        let event = self.controls.accept(event);
        self.current.apply(event);
        self.current
    }
}

/// Explorer lifecycle. There is no terminal state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExplorerState {
    /// No live parameters are bound.
    #[default]
    Static,
    /// A linear fit has been drawn and its handles are retained.
    Live(LiveFit),
}

impl ExplorerState {
    /// Check whether a live fit is bound.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// The live fit, if any.
    pub fn live(&self) -> Option<&LiveFit> {
        match self {
            Self::Live(fit) => Some(fit),
            Self::Static => None,
        }
    }
}

/// Single-consumer queue of control events.
///
/// Any thread may send through a [`ControlSender`]; the owning session
/// drains events in arrival order, so updates never interleave.
#[derive(Debug)]
pub struct ControlQueue {
    sender: Sender<ControlEvent>,
    receiver: Receiver<ControlEvent>,
}

/// Cloneable producer side of a [`ControlQueue`].
pub type ControlSender = Sender<ControlEvent>;

impl ControlQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A producer handle for another thread or UI callback.
    pub fn sender(&self) -> ControlSender {
        self.sender.clone()
    }

    /// Enqueue an event from the owning thread.
    pub fn push(&self, event: ControlEvent) {
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.sender.send(event);
    }

    /// Take every queued event in arrival order.
    pub fn drain(&self) -> Vec<ControlEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ControlQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uncertainty::DerivativePropagator;
    use std::thread;

    fn fitted() -> LinearParameters {
        LinearParameters {
            offset: 1.0,
            offset_std: 0.2,
            slope: 2.0,
            slope_std: 0.1,
            correlation: -0.8,
        }
    }

    #[test]
    fn control_windows_follow_error_range() {
        let controls = LinearControls::new(&fitted(), 5.0);
        assert!((controls.offset.min - 0.0).abs() < 1e-12);
        assert!((controls.offset.max - 2.0).abs() < 1e-12);
        assert!((controls.offset.step - 0.04).abs() < 1e-12);
        assert_eq!(controls.offset_std.min, 0.0);
        assert!((controls.offset_std.max - 1.0).abs() < 1e-12);
        assert!((controls.slope_std.step - 0.002).abs() < 1e-12);
        assert_eq!(controls.correlation.min, -1.0);
        assert_eq!(controls.correlation.max, 1.0);
        assert_eq!(controls.correlation.value, -0.8);
    }

    #[test]
    fn out_of_window_events_are_clamped() {
        let mut controls = LinearControls::new(&fitted(), 2.0);
        assert_eq!(
            controls.accept(ControlEvent::Correlation(3.0)),
            ControlEvent::Correlation(1.0)
        );
        assert_eq!(
            controls.accept(ControlEvent::OffsetStd(-1.0)),
            ControlEvent::OffsetStd(0.0)
        );
        assert_eq!(controls.correlation.value, 1.0);
    }

    #[test]
    fn zero_uncertainty_collapses_band() {
        let params = LinearParameters {
            offset_std: 0.0,
            slope_std: 0.0,
            correlation: 0.0,
            ..fitted()
        };
        let grid = [0.0, 1.0, 2.0, 3.0];
        let (curve, band) = propagate_linear(&params, &grid, &DerivativePropagator::default(), 1.0);
        assert_eq!(curve.mean(), &[1.0, 3.0, 5.0, 7.0]);
        for index in 0..grid.len() {
            assert_eq!(band.upper[index], curve.mean()[index]);
            assert_eq!(band.lower[index], curve.mean()[index]);
        }
    }

    #[test]
    fn correlation_changes_band_width() {
        let grid = [1.0];
        let propagator = DerivativePropagator::default();
        let independent = LinearParameters {
            correlation: 0.0,
            ..fitted()
        };
        let (_, wide) = propagate_linear(
            &LinearParameters {
                correlation: 1.0,
                ..fitted()
            },
            &grid,
            &propagator,
            1.0,
        );
        let (_, plain) = propagate_linear(&independent, &grid, &propagator, 1.0);
        let expected = (0.2f64 * 0.2 + 0.1 * 0.1).sqrt();
        assert!((plain.upper[0] - 3.0 - expected).abs() < 1e-6);
        assert!((wide.upper[0] - 3.0 - 0.3).abs() < 1e-6);
    }

    #[test]
    fn queue_preserves_arrival_order_across_threads() {
        let queue = ControlQueue::new();
        let sender = queue.sender();
        thread::spawn(move || {
            for step in 0..5 {
                sender
                    .send(ControlEvent::Slope(step as f64))
                    .expect("queue alive");
            }
        })
        .join()
        .expect("producer finished");
        queue.push(ControlEvent::Correlation(0.5));
        let drained = queue.drain();
        assert_eq!(drained.len(), 6);
        assert_eq!(drained[0], ControlEvent::Slope(0.0));
        assert_eq!(drained[4], ControlEvent::Slope(4.0));
        assert_eq!(drained[5], ControlEvent::Correlation(0.5));
        assert!(queue.drain().is_empty());
    }
}

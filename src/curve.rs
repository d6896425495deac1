//! Curve evaluation on sampled grids, with optional uncertainty propagation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PlotError, Result};
use crate::render::Color;
use crate::uncertainty::{Measurement, PropagationMode, Propagator, UncertainParameters};
use crate::view::Range;

/// Samples used for user functions, both for range extension and drawing.
pub const FUNCTION_SAMPLES: usize = 100;
/// Samples used for fitted model curves.
pub const FIT_SAMPLES: usize = 50;

/// A model `f(x, params)`. Functions without parameters receive an empty slice.
pub type ModelFn = Arc<dyn Fn(f64, &[f64]) -> f64 + Send + Sync>;

/// Wrap a closure as a [`ModelFn`].
pub fn model_fn(function: impl Fn(f64, &[f64]) -> f64 + Send + Sync + 'static) -> ModelFn {
    Arc::new(function)
}

/// Where a function takes its parameters from.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ParameterSource {
    /// The function takes no parameters.
    #[default]
    None,
    /// Plain numeric parameters.
    Plain(Vec<f64>),
    /// Parameters with uncertainties and correlations; produces an error band.
    Uncertain(UncertainParameters),
}

impl ParameterSource {
    /// Build a source from a loosely typed JSON value.
    ///
    /// `null` means no parameters, an array of numbers gives plain
    /// parameters, and an array of `{"mean": .., "std": .., "name": ..}`
    /// objects gives uncertain parameters. Anything else is rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::None),
            Value::Array(items) if items.iter().all(Value::is_number) => Ok(Self::Plain(
                items.iter().filter_map(Value::as_f64).collect(),
            )),
            Value::Array(items) => {
                let mut measurements = Vec::with_capacity(items.len());
                for item in items {
                    let mean = item.get("mean").and_then(Value::as_f64);
                    let std = item.get("std").and_then(Value::as_f64);
                    let (Some(mean), Some(std)) = (mean, std) else {
                        return Err(PlotError::UnrecognizedParameters.reported());
                    };
                    let mut measurement = Measurement::new(mean, std);
                    measurement.name = item.get("name").and_then(Value::as_str).map(String::from);
                    measurements.push(measurement);
                }
                Ok(Self::Uncertain(UncertainParameters::from_measurements(
                    measurements,
                )))
            }
            _ => Err(PlotError::UnrecognizedParameters.reported()),
        }
    }

    /// Check that every parameter value is usable.
    pub fn validate(&self) -> Result<()> {
        let finite = match self {
            Self::None => true,
            Self::Plain(values) => values.iter().all(|value| value.is_finite()),
            Self::Uncertain(params) => params
                .means()
                .iter()
                .chain(params.stds())
                .all(|value| value.is_finite()),
        };
        if finite {
            Ok(())
        } else {
            Err(PlotError::UnrecognizedParameters.reported())
        }
    }

    /// Total number of parameters.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Plain(values) => values.len(),
            Self::Uncertain(params) => params.len(),
        }
    }

    /// Check whether the source carries no parameters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<f64>> for ParameterSource {
    fn from(values: Vec<f64>) -> Self {
        Self::Plain(values)
    }
}

impl From<UncertainParameters> for ParameterSource {
    fn from(params: UncertainParameters) -> Self {
        Self::Uncertain(params)
    }
}

/// A user-supplied function to draw on top of the datasets.
#[derive(Clone)]
pub struct UserFunction {
    /// The function to evaluate.
    pub function: ModelFn,
    /// Parameter source.
    pub params: ParameterSource,
    /// Legend name.
    pub name: String,
    /// Line and band color.
    pub color: Color,
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("params", &self.params)
            .field("name", &self.name)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

/// Lower and upper outline of an error band.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    /// Sample positions.
    pub x: Vec<f64>,
    /// `mean - c * std` at each sample.
    pub lower: Vec<f64>,
    /// `mean + c * std` at each sample.
    pub upper: Vec<f64>,
}

impl Band {
    /// Closed outline: the upper edge left to right, then the lower edge back.
    pub fn outline(&self) -> (Vec<f64>, Vec<f64>) {
        let xs = self.x.iter().chain(self.x.iter().rev()).copied().collect();
        let ys = self
            .upper
            .iter()
            .chain(self.lower.iter().rev())
            .copied()
            .collect();
        (xs, ys)
    }
}

/// Mean values of a curve and, for uncertain parameters, their spread.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainCurve {
    x: Vec<f64>,
    mean: Vec<f64>,
    std: Option<Vec<f64>>,
}

impl UncertainCurve {
    /// Curve without uncertainty.
    pub fn exact(x: Vec<f64>, mean: Vec<f64>) -> Self {
        Self { x, mean, std: None }
    }

    /// Curve with one standard deviation per sample.
    pub fn with_std(x: Vec<f64>, mean: Vec<f64>, std: Vec<f64>) -> Self {
        Self {
            x,
            mean,
            std: Some(std),
        }
    }

    /// Sample positions.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Mean values.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Standard deviations, if the curve carries uncertainty.
    pub fn std(&self) -> Option<&[f64]> {
        self.std.as_deref()
    }

    /// Extent of the mean values.
    pub fn y_extent(&self) -> Option<Range> {
        Range::covering(self.mean.iter().copied())
    }

    /// Band spanning `mean ± confidence * std`.
    pub fn band(&self, confidence: f64) -> Option<Band> {
        let std = self.std.as_ref()?;
        let lower = self
            .mean
            .iter()
            .zip(std)
            .map(|(mean, std)| mean - confidence * std)
            .collect();
        let upper = self
            .mean
            .iter()
            .zip(std)
            .map(|(mean, std)| mean + confidence * std)
            .collect();
        Some(Band {
            x: self.x.clone(),
            lower,
            upper,
        })
    }
}

/// Evenly spaced samples including both endpoints.
pub fn sample_grid(range: Range, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![range.min],
        _ => {
            let step = range.span() / (count - 1) as f64;
            (0..count)
                .map(|index| {
                    if index == count - 1 {
                        range.max
                    } else {
                        range.min + step * index as f64
                    }
                })
                .collect()
        }
    }
}

/// Grid for user functions: the plot's x range with the margin stripped.
///
/// Falls back to the full range when stripping the margin leaves no span.
pub fn function_grid(x_range: Range, margin: f64) -> Vec<f64> {
    let inner = Range {
        min: x_range.min + margin,
        max: x_range.max - margin,
    };
    let range = if inner.is_valid() { inner } else { x_range };
    sample_grid(range, FUNCTION_SAMPLES)
}

/// Grid for a fitted model: the extent of the dataset's x values.
pub fn fit_grid(x: &[f64]) -> Vec<f64> {
    Range::covering(x.iter().copied())
        .map(|range| sample_grid(range, FIT_SAMPLES))
        .unwrap_or_default()
}

/// Evaluate `function` on `grid` with parameters from `source`.
///
/// Uncertain parameters are always propagated in
/// [`PropagationMode::Linear`], independent of any other caller's mode.
pub fn evaluate(
    function: &ModelFn,
    grid: &[f64],
    source: &ParameterSource,
    propagator: &dyn Propagator,
) -> Result<UncertainCurve> {
    source.validate()?;
    let curve = match source {
        ParameterSource::None => {
            UncertainCurve::exact(grid.to_vec(), grid.iter().map(|&x| function(x, &[])).collect())
        }
        ParameterSource::Plain(params) => UncertainCurve::exact(
            grid.to_vec(),
            grid.iter().map(|&x| function(x, params)).collect(),
        ),
        ParameterSource::Uncertain(params) => {
            propagator.propagate(function.as_ref(), grid, params, PropagationMode::Linear)
        }
    };
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uncertainty::DerivativePropagator;
    use serde_json::json;

    #[test]
    fn grid_hits_both_endpoints() {
        let grid = sample_grid(Range::new(-1.0, 1.0), 5);
        assert_eq!(grid, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert!(sample_grid(Range::new(0.0, 1.0), 0).is_empty());
    }

    #[test]
    fn function_grid_strips_margin() {
        let grid = function_grid(Range::new(-0.5, 10.5), 0.5);
        assert_eq!(grid.len(), FUNCTION_SAMPLES);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[FUNCTION_SAMPLES - 1], 10.0);
        let narrow = function_grid(Range::new(0.0, 0.5), 0.5);
        assert_eq!(narrow[0], 0.0);
    }

    #[test]
    fn band_width_scales_with_confidence() {
        let function = model_fn(|x, p| p[0] + p[1] * x);
        let params = UncertainParameters::new(&[1.0, 0.0], &[0.5, 0.0]).expect("same length");
        let curve = evaluate(
            &function,
            &[0.0, 1.0, 2.0],
            &ParameterSource::Uncertain(params),
            &DerivativePropagator::default(),
        )
        .expect("valid parameters");
        let std = curve.std().expect("uncertain curve");
        assert_eq!(std.len(), curve.mean().len());
        let band = curve.band(2.0).expect("band");
        for index in 0..3 {
            assert!((band.upper[index] - 2.0).abs() < 1e-9);
            assert!((band.lower[index] - 0.0).abs() < 1e-9);
        }
    }

    #[test]
    fn plain_parameters_have_no_band() {
        let function = model_fn(|x, p| p[0] * x);
        let curve = evaluate(
            &function,
            &[1.0, 2.0],
            &ParameterSource::Plain(vec![3.0]),
            &DerivativePropagator::default(),
        )
        .expect("valid parameters");
        assert_eq!(curve.mean(), &[3.0, 6.0]);
        assert!(curve.band(1.0).is_none());
    }

    #[test]
    fn non_finite_parameters_are_rejected() {
        let function = model_fn(|x, p| p[0] * x);
        let result = evaluate(
            &function,
            &[1.0],
            &ParameterSource::Plain(vec![f64::NAN]),
            &DerivativePropagator::default(),
        );
        assert!(matches!(result, Err(PlotError::UnrecognizedParameters)));
    }

    #[test]
    fn parameter_source_from_json() {
        assert_eq!(
            ParameterSource::from_json(&Value::Null).expect("null"),
            ParameterSource::None
        );
        assert_eq!(
            ParameterSource::from_json(&json!([1.0, 2.0])).expect("numbers"),
            ParameterSource::Plain(vec![1.0, 2.0])
        );
        let uncertain =
            ParameterSource::from_json(&json!([{ "mean": 1.0, "std": 0.1, "name": "a" }]))
                .expect("measurements");
        assert_eq!(uncertain.len(), 1);
        assert!(ParameterSource::from_json(&json!("fast")).is_err());
        assert!(ParameterSource::from_json(&json!([{ "mean": 1.0 }])).is_err());
    }

    #[test]
    fn band_outline_closes_the_polygon() {
        let band = Band {
            x: vec![0.0, 1.0],
            lower: vec![-1.0, -2.0],
            upper: vec![1.0, 2.0],
        };
        let (xs, ys) = band.outline();
        assert_eq!(xs, vec![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(ys, vec![1.0, 2.0, -2.0, -1.0]);
    }
}

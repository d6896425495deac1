//! Uncertain values and error propagation.
//!
//! The propagation engine is a collaborator of the plotting core: the core
//! only relies on the [`Propagator`] trait. [`DerivativePropagator`] is the
//! built-in first-order implementation.

use std::fmt;

use crate::curve::UncertainCurve;

/// A value with a standard deviation and an optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Central value.
    pub mean: f64,
    /// Standard deviation.
    pub std: f64,
    /// Display name.
    pub name: Option<String>,
}

impl Measurement {
    /// Create an unnamed measurement.
    pub fn new(mean: f64, std: f64) -> Self {
        Self {
            mean,
            std: std.abs(),
            name: None,
        }
    }

    /// Create a named measurement.
    pub fn named(mean: f64, std: f64, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(mean, std)
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name} = ")?;
        }
        write!(f, "{}", format_value_error(self.mean, self.std))
    }
}

/// Format `mean +/- std` with the error rounded to one significant figure
/// and the mean rounded to the same decimal place.
pub fn format_value_error(mean: f64, std: f64) -> String {
    if !std.is_finite() || std <= 0.0 || !mean.is_finite() {
        return format!("{mean} +/- {std}");
    }
    let exponent = std.log10().floor() as i32;
    let scale = 10_f64.powi(exponent);
    let std_rounded = (std / scale).round() * scale;
    let mean_rounded = (mean / scale).round() * scale;
    let decimals = (-exponent).max(0) as usize;
    format!("{mean_rounded:.decimals$} +/- {std_rounded:.decimals$}")
}

/// Vector of uncertain parameters with pairwise correlations.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainParameters {
    names: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
    /// Row-major `len × len` correlation matrix with a unit diagonal.
    correlation: Vec<f64>,
}

impl UncertainParameters {
    /// Build uncorrelated parameters from means and standard deviations.
    ///
    /// Returns `None` when the slices differ in length.
    pub fn new(means: &[f64], stds: &[f64]) -> Option<Self> {
        if means.len() != stds.len() {
            return None;
        }
        Some(Self::from_measurements(
            means
                .iter()
                .zip(stds)
                .enumerate()
                .map(|(index, (mean, std))| Measurement::named(*mean, *std, format!("par{index}"))),
        ))
    }

    /// Build uncorrelated parameters from measurements.
    pub fn from_measurements(measurements: impl IntoIterator<Item = Measurement>) -> Self {
        let mut names = Vec::new();
        let mut means = Vec::new();
        let mut stds = Vec::new();
        for (index, measurement) in measurements.into_iter().enumerate() {
            names.push(
                measurement
                    .name
                    .unwrap_or_else(|| format!("par{index}")),
            );
            means.push(measurement.mean);
            stds.push(measurement.std);
        }
        let len = means.len();
        let mut correlation = vec![0.0; len * len];
        for index in 0..len {
            correlation[index * len + index] = 1.0;
        }
        Self {
            names,
            means,
            stds,
            correlation,
        }
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// Check whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Parameter means.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Parameter standard deviations.
    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    /// Parameter `index` as a measurement.
    pub fn measurement(&self, index: usize) -> Option<Measurement> {
        Some(Measurement::named(
            *self.means.get(index)?,
            *self.stds.get(index)?,
            self.names.get(index)?.clone(),
        ))
    }

    /// All parameters as measurements.
    pub fn measurements(&self) -> Vec<Measurement> {
        (0..self.len()).filter_map(|index| self.measurement(index)).collect()
    }

    /// Correlation coefficient between two parameters.
    pub fn correlation(&self, i: usize, j: usize) -> f64 {
        let len = self.len();
        if i >= len || j >= len {
            return 0.0;
        }
        self.correlation[i * len + j]
    }

    /// Declare the correlation between two distinct parameters.
    ///
    /// The coefficient is clamped into `[-1, 1]`. Returns `false` when an
    /// index is out of range or both indices name the same parameter.
    pub fn set_correlation(&mut self, i: usize, j: usize, rho: f64) -> bool {
        let len = self.len();
        if i >= len || j >= len || i == j || !rho.is_finite() {
            return false;
        }
        let rho = rho.clamp(-1.0, 1.0);
        self.correlation[i * len + j] = rho;
        self.correlation[j * len + i] = rho;
        true
    }

    /// Covariance between two parameters.
    pub fn covariance(&self, i: usize, j: usize) -> f64 {
        if i >= self.len() || j >= self.len() {
            return 0.0;
        }
        self.correlation(i, j) * self.stds[i] * self.stds[j]
    }
}

/// How uncertainty is carried through a function.
///
/// The mode is always passed explicitly to [`Propagator::propagate`]; there
/// is no process-wide setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropagationMode {
    /// First-order propagation through the parameter covariance.
    #[default]
    Linear,
    /// Scan each parameter across `mean ± std` and take half the spread.
    /// Correlations are ignored.
    MinMax {
        /// Evaluations per parameter.
        samples: usize,
    },
}

/// Propagates uncertain parameters through a model into an uncertain curve.
pub trait Propagator {
    /// Evaluate `function` at every grid point with uncertain `params`.
    fn propagate(
        &self,
        function: &dyn Fn(f64, &[f64]) -> f64,
        grid: &[f64],
        params: &UncertainParameters,
        mode: PropagationMode,
    ) -> UncertainCurve;
}

/// First-order propagation using central finite-difference derivatives.
#[derive(Debug, Clone, Copy)]
pub struct DerivativePropagator {
    /// Relative step used for the finite differences.
    pub relative_step: f64,
}

impl Default for DerivativePropagator {
    fn default() -> Self {
        Self {
            relative_step: 1e-6,
        }
    }
}

impl DerivativePropagator {
    fn gradient(
        &self,
        function: &dyn Fn(f64, &[f64]) -> f64,
        x: f64,
        params: &UncertainParameters,
        scratch: &mut Vec<f64>,
    ) -> Vec<f64> {
        let means = params.means();
        let mut gradient = vec![0.0; means.len()];
        for (index, slot) in gradient.iter_mut().enumerate() {
            if params.stds()[index] == 0.0 {
                continue;
            }
            let step = (means[index].abs() * self.relative_step).max(self.relative_step);
            scratch.clear();
            scratch.extend_from_slice(means);
            scratch[index] = means[index] + step;
            let upper = function(x, scratch);
            scratch[index] = means[index] - step;
            let lower = function(x, scratch);
            *slot = (upper - lower) / (2.0 * step);
        }
        gradient
    }

    fn linear_std(
        &self,
        function: &dyn Fn(f64, &[f64]) -> f64,
        x: f64,
        params: &UncertainParameters,
        scratch: &mut Vec<f64>,
    ) -> f64 {
        let gradient = self.gradient(function, x, params, scratch);
        let mut variance = 0.0;
        for (i, gi) in gradient.iter().enumerate() {
            for (j, gj) in gradient.iter().enumerate() {
                variance += gi * gj * params.covariance(i, j);
            }
        }
        variance.max(0.0).sqrt()
    }

    fn min_max_std(
        function: &dyn Fn(f64, &[f64]) -> f64,
        x: f64,
        params: &UncertainParameters,
        samples: usize,
        scratch: &mut Vec<f64>,
    ) -> f64 {
        let samples = samples.max(2);
        let means = params.means();
        let mut variance = 0.0;
        for index in 0..means.len() {
            let std = params.stds()[index];
            if std == 0.0 {
                continue;
            }
            scratch.clear();
            scratch.extend_from_slice(means);
            let mut low = f64::INFINITY;
            let mut high = f64::NEG_INFINITY;
            for sample in 0..samples {
                let t = sample as f64 / (samples - 1) as f64;
                scratch[index] = means[index] - std + 2.0 * std * t;
                let value = function(x, scratch);
                low = low.min(value);
                high = high.max(value);
            }
            let half = 0.5 * (high - low);
            variance += half * half;
        }
        variance.sqrt()
    }
}

impl Propagator for DerivativePropagator {
    fn propagate(
        &self,
        function: &dyn Fn(f64, &[f64]) -> f64,
        grid: &[f64],
        params: &UncertainParameters,
        mode: PropagationMode,
    ) -> UncertainCurve {
        let mut scratch = Vec::with_capacity(params.len());
        let mut mean = Vec::with_capacity(grid.len());
        let mut std = Vec::with_capacity(grid.len());
        for &x in grid {
            mean.push(function(x, params.means()));
            std.push(match mode {
                PropagationMode::Linear => self.linear_std(function, x, params, &mut scratch),
                PropagationMode::MinMax { samples } => {
                    Self::min_max_std(function, x, params, samples, &mut scratch)
                }
            });
        }
        UncertainCurve::with_std(grid.to_vec(), mean, std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x: f64, p: &[f64]) -> f64 {
        p[0] + p[1] * x
    }

    #[test]
    fn linear_propagation_matches_closed_form() {
        let mut params = UncertainParameters::new(&[1.0, 2.0], &[0.1, 0.2]).expect("same length");
        assert!(params.set_correlation(0, 1, -0.5));
        let grid = [0.0, 1.0, 3.0];
        let curve = DerivativePropagator::default().propagate(
            &line,
            &grid,
            &params,
            PropagationMode::Linear,
        );
        let std = curve.std().expect("uncertain curve");
        for (index, x) in grid.iter().enumerate() {
            let expected =
                (0.01_f64 + x * x * 0.04 + 2.0 * x * (-0.5) * 0.1 * 0.2).sqrt();
            assert!((std[index] - expected).abs() < 1e-6);
            assert!((curve.mean()[index] - (1.0 + 2.0 * x)).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_uncertainty_gives_zero_std() {
        let mut params = UncertainParameters::new(&[1.0, 2.0], &[0.0, 0.0]).expect("same length");
        params.set_correlation(0, 1, 0.0);
        let curve = DerivativePropagator::default().propagate(
            &line,
            &[0.0, 5.0, 10.0],
            &params,
            PropagationMode::Linear,
        );
        assert!(curve.std().expect("uncertain curve").iter().all(|s| *s == 0.0));
    }

    #[test]
    fn min_max_ignores_correlation() {
        let mut params = UncertainParameters::new(&[0.0, 1.0], &[1.0, 0.0]).expect("same length");
        params.set_correlation(0, 1, 1.0);
        let curve = DerivativePropagator::default().propagate(
            &line,
            &[2.0],
            &params,
            PropagationMode::MinMax { samples: 3 },
        );
        assert!((curve.std().expect("uncertain curve")[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_is_clamped_and_symmetric() {
        let mut params = UncertainParameters::new(&[0.0, 0.0], &[1.0, 1.0]).expect("same length");
        assert!(params.set_correlation(1, 0, 3.0));
        assert_eq!(params.correlation(0, 1), 1.0);
        assert!(!params.set_correlation(0, 0, 0.5));
        assert!(!params.set_correlation(0, 2, 0.5));
    }

    #[test]
    fn measurement_display_rounds_to_error() {
        let measurement = Measurement::named(1.23456, 0.0234, "slope");
        assert_eq!(measurement.to_string(), "slope = 1.23 +/- 0.02");
        assert_eq!(format_value_error(1234.0, 56.0), "1230 +/- 60");
    }
}

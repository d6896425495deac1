//! Axis ranges and viewports.

use serde::{Deserialize, Serialize};

use crate::error::{PlotError, RangeAxis, Result};

/// Numeric range with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
}

impl Range {
    /// Create a new range, swapping bounds if needed.
    pub fn new(mut min: f64, mut max: f64) -> Self {
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        Self { min, max }
    }

    /// Validate a user-supplied `[min, max]` sequence.
    ///
    /// Anything other than two finite numbers is rejected.
    pub fn try_from_slice(axis: RangeAxis, values: &[f64]) -> Result<Self> {
        if values.len() != 2 {
            return Err(PlotError::invalid_range(
                axis,
                format!("expected 2 values, got {}", values.len()),
            ));
        }
        let range = Self::new(values[0], values[1]);
        if !range.is_finite() {
            return Err(PlotError::invalid_range(axis, "bounds must be finite"));
        }
        Ok(range)
    }

    /// Tightest range covering all finite values, if any.
    pub fn covering(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut range: Option<Self> = None;
        for value in values {
            if !value.is_finite() {
                continue;
            }
            match range.as_mut() {
                None => range = Some(Self::new(value, value)),
                Some(existing) => existing.expand_to_include(value),
            }
        }
        range
    }

    /// Span of the range.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Midpoint of the range.
    pub fn center(&self) -> f64 {
        (self.min + self.max) * 0.5
    }

    /// Check whether both bounds are finite.
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Check whether the range has positive span and finite bounds.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.span() > 0.0
    }

    /// Check whether a value lies inside the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Expand the range to include a value.
    pub fn expand_to_include(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    /// Grow this range so it also covers `other`. Never shrinks.
    pub fn widen_to(&mut self, other: Self) {
        self.expand_to_include(other.min);
        self.expand_to_include(other.max);
    }

    /// Union two ranges if both are finite.
    pub fn union(a: Self, b: Self) -> Option<Self> {
        if !a.is_finite() || !b.is_finite() {
            return None;
        }
        Some(Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        })
    }

    /// Clamp a value into the range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Add a fixed margin on both sides.
    pub fn padded_by(&self, margin: f64) -> Self {
        Self {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    /// Ensure the range has at least the given span.
    pub fn with_min_span(&self, min_span: f64) -> Self {
        let span = self.span();
        if span >= min_span {
            return *self;
        }
        let center = self.center();
        let half = min_span * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// Visible data ranges on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    /// X axis range.
    pub x: Range,
    /// Y axis range.
    pub y: Range,
}

impl Viewport {
    /// Create a viewport from X and Y ranges.
    pub fn new(x: Range, y: Range) -> Self {
        Self { x, y }
    }

    /// Check whether both axes are valid.
    pub fn is_valid(&self) -> bool {
        self.x.is_valid() && self.y.is_valid()
    }

    /// Grow both axes to cover another viewport.
    pub fn widen_to(&mut self, other: Self) {
        self.x.widen_to(other.x);
        self.y.widen_to(other.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_with_min_span_expands() {
        let range = Range::new(2.0, 2.0);
        let expanded = range.with_min_span(1.0);
        assert!(expanded.span() >= 1.0);
        assert!((expanded.center() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn widen_never_shrinks() {
        let mut range = Range::new(-1.0, 4.0);
        range.widen_to(Range::new(0.0, 2.0));
        assert_eq!(range, Range::new(-1.0, 4.0));
        range.widen_to(Range::new(-3.0, 2.0));
        assert_eq!(range, Range::new(-3.0, 4.0));
    }

    #[test]
    fn union_requires_finite_ranges() {
        let joined = Range::union(Range::new(0.0, 1.0), Range::new(-2.0, 0.5)).expect("finite");
        assert_eq!(joined, Range::new(-2.0, 1.0));
        assert!(Range::union(Range::new(0.0, f64::INFINITY), Range::new(0.0, 1.0)).is_none());
    }

    #[test]
    fn try_from_slice_rejects_bad_input() {
        assert!(Range::try_from_slice(RangeAxis::X, &[1.0]).is_err());
        assert!(Range::try_from_slice(RangeAxis::X, &[1.0, 2.0, 3.0]).is_err());
        assert!(Range::try_from_slice(RangeAxis::Y, &[f64::NAN, 2.0]).is_err());
        let range = Range::try_from_slice(RangeAxis::X, &[3.0, -1.0]).expect("valid range");
        assert_eq!(range, Range::new(-1.0, 3.0));
    }

    #[test]
    fn covering_skips_non_finite() {
        let range = Range::covering([1.0, f64::NAN, -2.0, 5.0]).expect("has values");
        assert_eq!(range, Range::new(-2.0, 5.0));
        assert!(Range::covering([f64::INFINITY]).is_none());
    }
}

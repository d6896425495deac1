//! Test doubles for the dataset and fitting collaborators.

use std::sync::Arc;

use crate::dataset::{
    AxisLabel, FitError, FitInput, FitModel, FitRecord, Fitter, SharedDataset, XyDataset, shared,
};
use crate::uncertainty::{Measurement, UncertainParameters};
use crate::view::Range;

/// Weighted linear least squares; any other model fails to converge.
pub(crate) struct LineFitter;

impl Fitter for LineFitter {
    fn fit(
        &self,
        input: FitInput<'_>,
        model: &FitModel,
        _guess: Option<&[f64]>,
        range: Option<Range>,
    ) -> Result<FitRecord, FitError> {
        if !matches!(model, FitModel::Linear) {
            return Err(FitError::NotConverged(format!(
                "{} is not supported by the test fitter",
                model.name()
            )));
        }
        let weight = |index: usize| {
            input
                .y_err
                .and_then(|errors| errors.get(index))
                .filter(|err| **err > 0.0)
                .map_or(1.0, |err| 1.0 / (err * err))
        };
        let (mut s, mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        let mut used = 0usize;
        for (index, (&x, &y)) in input.x.iter().zip(input.y).enumerate() {
            if range.is_some_and(|range| !range.contains(x)) {
                continue;
            }
            let w = weight(index);
            s += w;
            sx += w * x;
            sy += w * y;
            sxx += w * x * x;
            sxy += w * x * y;
            used += 1;
        }
        let delta = s * sxx - sx * sx;
        if used < 2 || delta.abs() < 1e-12 {
            return Err(FitError::NotConverged("degenerate x values".to_string()));
        }
        let slope = (s * sxy - sx * sy) / delta;
        let offset = (sxx * sy - sx * sxy) / delta;
        let mut params = UncertainParameters::from_measurements([
            Measurement::named(offset, (sxx / delta).sqrt(), "offset"),
            Measurement::named(slope, (s / delta).sqrt(), "slope"),
        ]);
        params.set_correlation(0, 1, -sx / (s * sxx).sqrt());
        let function = model.function();
        let residuals = input
            .x
            .iter()
            .zip(input.y)
            .map(|(&x, &y)| y - function(x, params.means()))
            .collect();
        Ok(FitRecord {
            function,
            parameters: params,
            residuals,
            name: model.name(),
        })
    }
}

/// Five points on `y = x / 2` spanning x in [0, 10] and y in [0, 5].
pub(crate) fn line_dataset() -> XyDataset {
    XyDataset::new(
        vec![0.0, 2.5, 5.0, 7.5, 10.0],
        vec![0.0, 1.25, 2.5, 3.75, 5.0],
    )
    .expect("paired columns")
    .with_name("line")
    .with_axes(AxisLabel::new("time", "s"), AxisLabel::new("distance", "m"))
    .with_fitter(Arc::new(LineFitter))
}

/// Noisy points with uncertainties, already fit once.
pub(crate) fn fitted_line_dataset() -> SharedDataset {
    let dataset = XyDataset::new(
        vec![1.0, 2.0, 3.0, 4.0, 5.0],
        vec![2.9, 5.2, 6.8, 9.1, 11.0],
    )
    .and_then(|dataset| dataset.with_errors(None, Some(vec![0.2; 5])))
    .expect("paired columns")
    .with_name("noisy")
    .with_fitter(Arc::new(LineFitter));
    let shared = shared(dataset);
    crate::dataset::write(&shared)
        .fit(&FitModel::Linear, None, None)
        .expect("linear fit");
    shared
}

/// Eight raw values binned into four unit-wide bars with heights 2, 3, 1, 2,
/// each with a count uncertainty.
pub(crate) fn histogram_dataset() -> SharedDataset {
    let dataset = XyDataset::histogram(vec![0.0, 0.5, 1.0, 1.5, 1.8, 2.5, 3.9, 4.0], 4)
        .with_errors(None, Some(vec![1.0; 4]))
        .expect("one error per bar")
        .with_name("counts");
    shared(dataset)
}

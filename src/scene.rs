//! Scene model and the show entry points.
//!
//! A [`Scene`] owns the plot description (datasets, user functions, ranges,
//! labels, display configuration), the backend chosen at construction, and
//! the backend figure once it has been built.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::canvas::CanvasBackend;
use crate::backend::image::ImageBackend;
use crate::backend::{
    self, Backend, DrawPlan, FigureState, LiveBackend, OutputTarget, Presentation,
};
use crate::config::{LegendLocation, LegendOrientation, SceneConfig};
use crate::curve::{self, ModelFn, ParameterSource, UserFunction};
use crate::dataset::{
    self, AxisLabel, FitError, FitModel, FitRecord, Fitter, SharedDataset, XyDataset,
};
use crate::error::{PlotError, RangeAxis, Result};
use crate::explorer::{
    self, ControlEvent, ControlQueue, ExplorerState, LinearControls, LinearParameters, LiveFit,
};
use crate::layout::{self, FigureLayout, Labels};
use crate::palette::{ColorCursor, Palette};
use crate::render::Color;
use crate::uncertainty::{DerivativePropagator, Propagator};
use crate::view::{Range, Viewport};

/// Lowest x value shown by [`Scene::fit_and_show_linear`].
pub const LINEAR_FIT_X_START: f64 = -0.5;

/// A dataset attached to a scene with its assigned color.
#[derive(Clone)]
pub struct AttachedDataset {
    /// The shared dataset.
    pub dataset: SharedDataset,
    /// Color of its points, fit curve and residuals.
    pub color: Color,
}

impl std::fmt::Debug for AttachedDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedDataset")
            .field("name", &dataset::read(&self.dataset).name())
            .field("color", &self.color)
            .finish()
    }
}

/// Columns and names for [`Scene::from_xy`].
#[derive(Default)]
pub struct XyColumns {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub x_err: Option<Vec<f64>>,
    pub y_err: Option<Vec<f64>>,
    pub name: Option<String>,
    pub x_axis: Option<AxisLabel>,
    pub y_axis: Option<AxisLabel>,
    pub fitter: Option<Arc<dyn Fitter>>,
}

#[derive(Debug, Clone, Default)]
struct LabelOverrides {
    title: Option<String>,
    x_title: Option<String>,
    y_title: Option<String>,
}

/// Plot description bound to one backend.
pub struct Scene<B: Backend> {
    backend: B,
    config: SceneConfig,
    derived_labels: Labels,
    overrides: LabelOverrides,
    x_range: Range,
    y_range: Range,
    residual_range: Option<Range>,
    datasets: Vec<AttachedDataset>,
    functions: Vec<UserFunction>,
    colors: ColorCursor,
    propagator: Box<dyn Propagator>,
    figure: FigureState<B::Figure>,
    figure_has_residuals: bool,
    text_offset: f32,
    explorer: ExplorerState,
}

impl Scene<CanvasBackend> {
    /// Empty scene rendered on the interactive canvas backend.
    pub fn canvas() -> Self {
        Self::from_parts(CanvasBackend::new(), SceneConfig::default())
    }
}

impl Scene<ImageBackend> {
    /// Empty scene rendered on the static image backend.
    pub fn image() -> Self {
        Self::from_parts(ImageBackend::new(), SceneConfig::default())
    }
}

impl<B: Backend> Scene<B> {
    fn from_parts(backend: B, config: SceneConfig) -> Self {
        Self {
            backend,
            config,
            derived_labels: Labels::default(),
            overrides: LabelOverrides::default(),
            x_range: Range::default(),
            y_range: Range::default(),
            residual_range: None,
            datasets: Vec::new(),
            functions: Vec::new(),
            colors: ColorCursor::default(),
            propagator: Box::new(DerivativePropagator::default()),
            figure: FigureState::Unbuilt,
            figure_has_residuals: false,
            text_offset: 0.0,
            explorer: ExplorerState::Static,
        }
    }

    /// Empty scene with an explicit backend and configuration.
    pub fn with_backend(backend: B, config: SceneConfig) -> Result<Self> {
        validate_dimensions(config.width, config.height)?;
        validate_confidence(config.error_band_sigma)?;
        Ok(Self::from_parts(backend, config))
    }

    /// Scene initialized from a first dataset.
    pub fn from_dataset(backend: B, dataset: SharedDataset) -> Self {
        let mut scene = Self::from_parts(backend, SceneConfig::default());
        scene.attach_dataset(dataset, None, None);
        scene
    }

    /// Scene initialized from raw columns.
    pub fn from_xy(backend: B, columns: XyColumns) -> Result<Self> {
        let mut data = XyDataset::new(columns.x, columns.y)?
            .with_errors(columns.x_err, columns.y_err)?
            .with_axes(
                columns.x_axis.unwrap_or_else(|| AxisLabel::new("x", "")),
                columns.y_axis.unwrap_or_else(|| AxisLabel::new("y", "")),
            );
        if let Some(name) = columns.name {
            data = data.with_name(name);
        }
        if let Some(fitter) = columns.fitter {
            data = data.with_fitter(fitter);
        }
        Ok(Self::from_dataset(backend, dataset::shared(data)))
    }

    /// Replace the uncertainty propagation used for fitted and user curves.
    pub fn with_propagator(mut self, propagator: impl Propagator + 'static) -> Self {
        self.propagator = Box::new(propagator);
        self
    }

    /// Replace the palette automatic colors are taken from.
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.colors = ColorCursor::new(palette);
        self
    }

    /// The rendering backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The rendering backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Display configuration.
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Labels as they will be drawn.
    pub fn labels(&self) -> Labels {
        Labels {
            title: pick(&self.overrides.title, &self.derived_labels.title),
            x_title: pick(&self.overrides.x_title, &self.derived_labels.x_title),
            y_title: pick(&self.overrides.y_title, &self.derived_labels.y_title),
        }
    }

    pub fn x_range(&self) -> Range {
        self.x_range
    }

    pub fn y_range(&self) -> Range {
        self.y_range
    }

    /// Current x and y ranges.
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.x_range, self.y_range)
    }

    /// Range of the residual panel, known once any dataset has been fit.
    pub fn residual_range(&self) -> Option<Range> {
        self.residual_range
    }

    /// Attached datasets in order.
    pub fn datasets(&self) -> &[AttachedDataset] {
        &self.datasets
    }

    /// Attached user functions in order.
    pub fn functions(&self) -> &[UserFunction] {
        &self.functions
    }

    /// The built figure, if any.
    pub fn figure(&self) -> Option<&B::Figure> {
        self.figure.figure()
    }

    /// State of the interactive explorer.
    pub fn explorer(&self) -> &ExplorerState {
        &self.explorer
    }

    /// Output path for the file target.
    pub fn save_path(&self) -> PathBuf {
        self.config
            .save_path
            .clone()
            .unwrap_or_else(|| self.backend.kind().default_save_path())
    }

    fn shared_datasets(&self) -> Vec<SharedDataset> {
        self.datasets
            .iter()
            .map(|attached| Arc::clone(&attached.dataset))
            .collect()
    }

    fn rebuild_residual_range(&mut self) {
        self.residual_range = layout::residual_range(&self.shared_datasets(), self.config.y_margin);
    }

    /// Attach a dataset.
    ///
    /// The first dataset sets the labels and ranges; later ones only widen
    /// the ranges. A palette color is assigned when `color` is `None`.
    pub fn attach_dataset(&mut self, dataset: SharedDataset, color: Option<Color>, name: Option<&str>) {
        if let Some(name) = name {
            dataset::write(&dataset).set_name(name.to_string());
        }
        let first = self.datasets.is_empty();
        let (x_extent, y_extent) = {
            let data = dataset::read(&dataset);
            if first {
                self.derived_labels = Labels {
                    title: data.name().to_string(),
                    x_title: data.x_axis().title(),
                    y_title: data.y_axis().title(),
                };
            }
            (
                data.x_extent(self.config.x_margin),
                data.y_extent(self.config.y_margin),
            )
        };
        let color = color.unwrap_or_else(|| self.colors.next_color());
        self.datasets.push(AttachedDataset { dataset, color });

        match (first, x_extent) {
            (true, Some(extent)) => self.x_range = extent,
            (false, Some(extent)) => self.x_range.widen_to(extent),
            (_, None) => {}
        }
        match (first, y_extent) {
            (true, Some(extent)) => self.y_range = extent,
            (false, Some(extent)) => self.y_range.widen_to(extent),
            (_, None) => {}
        }
        self.rebuild_residual_range();
    }

    /// Attach a user function drawn over the current x range.
    ///
    /// The function is sampled once now to widen the y range. On error
    /// nothing is stored.
    pub fn attach_function(
        &mut self,
        function: ModelFn,
        params: ParameterSource,
        name: Option<&str>,
        color: Option<Color>,
    ) -> Result<()> {
        let grid = curve::function_grid(self.x_range, self.config.x_margin);
        let evaluated = curve::evaluate(&function, &grid, &params, self.propagator.as_ref())?;
        if let Some(extent) = evaluated.y_extent() {
            self.y_range.widen_to(extent.padded_by(self.config.y_margin));
        }
        let name = name.map_or_else(|| format!("userf_{}", self.functions.len()), String::from);
        let color = color.unwrap_or_else(|| self.colors.next_color());
        self.functions.push(UserFunction {
            function,
            params,
            name,
            color,
        });
        Ok(())
    }

    /// Attach a user function whose parameters come from a JSON value.
    pub fn attach_function_json(
        &mut self,
        function: ModelFn,
        params: &Value,
        name: Option<&str>,
        color: Option<Color>,
    ) -> Result<()> {
        let params = ParameterSource::from_json(params)?;
        self.attach_function(function, params, name, color)
    }

    /// Override some or all labels.
    pub fn set_labels(&mut self, title: Option<&str>, x_title: Option<&str>, y_title: Option<&str>) {
        if let Some(title) = title {
            self.overrides.title = Some(title.to_string());
        }
        if let Some(x_title) = x_title {
            self.overrides.x_title = Some(x_title.to_string());
        }
        if let Some(y_title) = y_title {
            self.overrides.y_title = Some(y_title.to_string());
        }
    }

    /// Set ranges from `[min, max]` sequences.
    ///
    /// Each axis is validated on its own: a valid axis is applied even when
    /// the other one is rejected, and the first error is returned.
    pub fn set_range(&mut self, x: Option<&[f64]>, y: Option<&[f64]>) -> Result<()> {
        let x = x.map(|values| Range::try_from_slice(RangeAxis::X, values));
        let y = y.map(|values| Range::try_from_slice(RangeAxis::Y, values));
        let mut outcome = Ok(());
        for (parsed, slot) in [(x, &mut self.x_range), (y, &mut self.y_range)] {
            match parsed {
                Some(Ok(range)) => *slot = range,
                Some(Err(err)) if outcome.is_ok() => outcome = Err(err.reported()),
                Some(Err(err)) => log::warn!("{err}"),
                None => {}
            }
        }
        outcome
    }

    /// Set the x range.
    pub fn set_x_range(&mut self, range: Range) -> Result<()> {
        self.x_range = checked_range(RangeAxis::X, range)?;
        Ok(())
    }

    /// Set the y range.
    pub fn set_y_range(&mut self, range: Range) -> Result<()> {
        self.y_range = checked_range(RangeAxis::Y, range)?;
        Ok(())
    }

    /// Set the figure size in pixels and, optionally, the static scale.
    pub fn resize(&mut self, width: u32, height: u32, static_scale: Option<f64>) -> Result<()> {
        validate_dimensions(width, height)?;
        if let Some(scale) = static_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(PlotError::InvalidScale(scale).reported());
            }
            self.config.static_scale = scale;
        }
        self.config.width = width;
        self.config.height = height;
        Ok(())
    }

    /// Set the error band half-width in standard deviations.
    pub fn set_error_band_confidence(&mut self, sigma: f64) -> Result<()> {
        validate_confidence(sigma)?;
        self.config.error_band_sigma = sigma;
        Ok(())
    }

    /// Show a residual panel beneath the main panel.
    ///
    /// Only takes effect once some dataset has been fit. The residual range
    /// is recomputed either way. Returns whether residuals are now shown.
    pub fn enable_residuals(&mut self) -> bool {
        self.rebuild_residual_range();
        if layout::any_fitted(&self.shared_datasets()) {
            self.config.show_residuals = true;
        }
        self.config.show_residuals
    }

    /// Set the legend placement and visibility.
    pub fn set_legend(&mut self, location: LegendLocation, orientation: LegendOrientation, visible: bool) {
        self.config.legend_location = location;
        self.config.legend_orientation = orientation;
        self.config.show_legend = visible;
    }

    /// Toggle the parameter text boxes.
    pub fn show_fit_results(&mut self, show: bool) {
        self.config.show_fit_results = show;
    }

    /// Shift the parameter text boxes by a pixel offset.
    pub fn set_fit_results_offset(&mut self, dx: f32, dy: f32) {
        self.config.fit_results_offset = (dx, dy);
    }

    /// Set the output path for the file target.
    pub fn set_save_path(&mut self, path: impl Into<PathBuf>) {
        self.config.save_path = Some(path.into());
    }

    /// Recompute the ranges from scratch: every dataset, then every user
    /// function sampled over the new x range.
    ///
    /// Unlike the attach operations this may shrink the ranges.
    pub fn recompute_ranges(&mut self) -> Result<()> {
        let Some(bounds) = layout::dataset_bounds(
            &self.shared_datasets(),
            self.config.x_margin,
            self.config.y_margin,
        ) else {
            return Err(PlotError::NoDataset.reported());
        };
        let grid = curve::function_grid(bounds.x, self.config.x_margin);
        let mut y_range = bounds.y;
        for function in &self.functions {
            let evaluated =
                curve::evaluate(&function.function, &grid, &function.params, self.propagator.as_ref())?;
            if let Some(extent) = evaluated.y_extent() {
                y_range.widen_to(extent.padded_by(self.config.y_margin));
            }
        }
        self.x_range = bounds.x;
        self.y_range = y_range;
        self.rebuild_residual_range();
        Ok(())
    }

    fn dataset_at(&self, index: Option<usize>) -> Result<&AttachedDataset> {
        let attached = match index {
            Some(index) => self.datasets.get(index).ok_or(PlotError::DatasetIndex(index)),
            None => self.datasets.last().ok_or(PlotError::NoDataset),
        };
        attached.map_err(PlotError::reported)
    }

    /// Fit a dataset (the last one when `dataset_index` is `None`).
    ///
    /// Fitting failures are returned unchanged from the fitting engine.
    pub fn fit(
        &mut self,
        model: &FitModel,
        guess: Option<&[f64]>,
        range: Option<Range>,
        dataset_index: Option<usize>,
    ) -> Result<FitRecord> {
        let shared = Arc::clone(&self.dataset_at(dataset_index)?.dataset);
        let record = dataset::write(&shared).fit(model, guess, range)?;
        self.rebuild_residual_range();
        Ok(record)
    }

    /// Listing of the latest fit parameters of a dataset.
    pub fn fit_parameters_summary(&self, dataset_index: Option<usize>) -> Result<String> {
        let attached = self.dataset_at(dataset_index)?;
        let data = dataset::read(&attached.dataset);
        let Some(fit) = data.last_fit() else {
            return Ok("Datasets have not been fit".to_string());
        };
        let lines: Vec<String> = fit
            .parameters
            .measurements()
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(format!("Fit parameters:\n{}", lines.join("\n")))
    }

    fn figure_layout(&self, show_text: bool) -> FigureLayout {
        let datasets = self.shared_datasets();
        let reserve = if show_text {
            layout::text_reserve_pixels(&datasets)
        } else {
            0.0
        };
        let residual_range = if self.config.show_residuals {
            self.residual_range
        } else {
            None
        };
        FigureLayout::new(&self.labels(), self.viewport(), residual_range, &self.config, reserve)
    }

    fn build_figure(&mut self) {
        let layout = self.figure_layout(self.config.show_fit_results);
        self.figure_has_residuals = layout.residual_range.is_some();
        self.figure = FigureState::Built(self.backend.initialize_figure(&layout));
        self.text_offset = 0.0;
        self.explorer = ExplorerState::Static;
    }

    fn populate_figure(&mut self) -> Result<()> {
        let grid = curve::function_grid(self.x_range, self.config.x_margin);
        let plan = DrawPlan {
            datasets: &self.datasets,
            functions: &self.functions,
            function_grid: &grid,
            confidence: self.config.error_band_sigma,
            show_fit_results: self.config.show_fit_results,
            text_offset: self.text_offset,
            show_residuals: self.config.show_residuals,
            propagator: self.propagator.as_ref(),
        };
        let FigureState::Built(figure) = &mut self.figure else {
            return Err(PlotError::Render("figure has not been built".to_string()));
        };
        self.text_offset = backend::populate(&mut self.backend, figure, &plan)?;
        Ok(())
    }

    /// Display or save the scene.
    ///
    /// With `populate`, the scene is drawn onto a figure first: a new one
    /// when `refresh` is set, when none exists, or when residuals are now
    /// requested but the existing figure has no residual panel. Drawing onto
    /// an existing figure overlays the scene on what is already there, with
    /// new parameter text stacked below the earlier text. Without
    /// `populate`, the existing figure is presented as it is (and built and
    /// drawn first if there is none).
    pub fn show(&mut self, target: OutputTarget, populate: bool, refresh: bool) -> Result<Presentation> {
        if populate || !self.figure.is_built() {
            let needs_residual_panel = self.config.show_residuals
                && self.residual_range.is_some()
                && !self.figure_has_residuals;
            if refresh || !self.figure.is_built() || needs_residual_panel {
                self.build_figure();
            }
            self.populate_figure()?;
        }
        let path = self.save_path();
        let FigureState::Built(figure) = &mut self.figure else {
            return Err(PlotError::Render("figure has not been built".to_string()));
        };
        let presentation = self.backend.present(figure, target, &path)?;
        log::debug!("presented scene to {target:?}");
        Ok(presentation)
    }

    /// [`Self::show`] with the target given by name.
    pub fn show_named(&mut self, target: &str, populate: bool, refresh: bool) -> Result<Presentation> {
        let target = target.parse()?;
        self.show(target, populate, refresh)
    }

    /// Fit the last dataset to a straight line and show it with its band.
    ///
    /// Previous fits of that dataset are cleared. The x range is extended
    /// down to -0.5 so the intercept is visible. The figure is built fresh
    /// without parameter text, and the drawn line and band are retained for
    /// the interactive explorer.
    pub fn fit_and_show_linear(&mut self, target: OutputTarget) -> Result<Presentation> {
        let attached = self.dataset_at(None)?.clone();
        if self.datasets.len() > 1 {
            log::warn!("only the last attached dataset is fit; its previous fits are cleared");
        }
        let fit = {
            let mut data = dataset::write(&attached.dataset);
            data.clear_fits();
            data.fit(&FitModel::Linear, None, None)?
        };
        let fitted = LinearParameters::from_fit(&fit).ok_or_else(|| {
            FitError::Malformed(format!(
                "linear fit returned {} parameters",
                fit.parameter_count()
            ))
        })?;

        if self.x_range.min > LINEAR_FIT_X_START {
            self.x_range.min = LINEAR_FIT_X_START;
            let start = (fit.function)(LINEAR_FIT_X_START, fit.parameters.means());
            if start.is_finite() && start < self.y_range.min {
                self.y_range.min = start;
            }
        }
        self.rebuild_residual_range();

        let layout = self.figure_layout(false);
        let mut figure = self.backend.initialize_figure(&layout);
        self.backend.draw_dataset(
            &mut figure,
            &*dataset::read(&attached.dataset),
            attached.color,
            false,
        );
        let grid = curve::function_grid(self.x_range, self.config.x_margin);
        let sigma = self.config.error_band_sigma;
        let (line, _) = explorer::propagate_linear(&fitted, &grid, self.propagator.as_ref(), sigma);
        let handles = backend::draw_uncertain_curve(
            &mut self.backend,
            &mut figure,
            &line,
            sigma,
            attached.color,
            &fit.name,
        );
        self.backend.finalize(&mut figure);

        self.figure = FigureState::Built(figure);
        self.figure_has_residuals = layout.residual_range.is_some();
        self.text_offset = 0.0;
        self.explorer = ExplorerState::Static;
        let presentation = self.show(target, false, false)?;
        if target == OutputTarget::Interactive {
            self.explorer =
                ExplorerState::Live(LiveFit::new(handles, grid, fitted, attached.color));
            log::debug!("linear fit of '{}' is live", dataset::read(&attached.dataset).name());
        }
        Ok(presentation)
    }
}

impl<B: LiveBackend> Scene<B> {
    /// Bind explorer controls to the live linear fit.
    ///
    /// Runs [`Scene::fit_and_show_linear`] with the interactive target first
    /// when no linear fit is live yet, or when its figure is no longer shown
    /// in a live display context.
    pub fn begin_interactive_linear_fit(&mut self, error_range: f64) -> Result<LinearControls> {
        if !(error_range.is_finite() && error_range > 0.0) {
            return Err(PlotError::InvalidErrorRange(error_range).reported());
        }
        if !self.explorer.is_live() || !self.figure_is_live() {
            self.fit_and_show_linear(OutputTarget::Interactive)?;
        }
        let ExplorerState::Live(live) = &mut self.explorer else {
            return Err(PlotError::NotLive.reported());
        };
        live.controls = LinearControls::new(&live.fitted, error_range);
        Ok(live.controls)
    }

    /// Apply one control event and redraw the live line and band in place.
    ///
    /// Nothing is changed when the figure has left its live display context.
    pub fn apply_control(&mut self, event: ControlEvent) -> Result<()> {
        let ExplorerState::Live(live) = &mut self.explorer else {
            return Err(PlotError::NotLive.reported());
        };
        let FigureState::Built(figure) = &mut self.figure else {
            return Err(PlotError::NotLive.reported());
        };
        if !self.backend.is_live(figure) {
            return Err(PlotError::NotLive.reported());
        }
        let current = live.apply(event);
        let (line, band) = explorer::propagate_linear(
            &current,
            &live.grid,
            self.propagator.as_ref(),
            self.config.error_band_sigma,
        );
        let mut touched = vec![live.handles.line];
        self.backend.update_curve(figure, live.handles.line, &line)?;
        if let Some(band_id) = live.handles.band {
            self.backend.update_band(figure, band_id, &band)?;
            touched.push(band_id);
        }
        self.backend.redraw(figure, &touched)
    }

    fn figure_is_live(&self) -> bool {
        self.figure
            .figure()
            .is_some_and(|figure| self.backend.is_live(figure))
    }

    /// Apply every queued control event in arrival order. Returns how many
    /// were applied.
    pub fn drain_controls(&mut self, queue: &ControlQueue) -> Result<usize> {
        let events = queue.drain();
        for event in &events {
            self.apply_control(*event)?;
        }
        Ok(events.len())
    }
}

fn pick(over: &Option<String>, derived: &str) -> String {
    over.clone().unwrap_or_else(|| derived.to_string())
}

fn checked_range(axis: RangeAxis, range: Range) -> Result<Range> {
    Range::try_from_slice(axis, &[range.min, range.max]).map_err(PlotError::reported)
}

fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(PlotError::InvalidDimensions { width, height }.reported());
    }
    Ok(())
}

fn validate_confidence(sigma: f64) -> Result<()> {
    if !(sigma.is_finite() && sigma >= 0.0) {
        return Err(PlotError::InvalidConfidence(sigma).reported());
    }
    Ok(())
}

//! Interactive web-canvas backend.
//!
//! The figure is a retained document: panels, glyphs with column data,
//! screen-space labels and a legend. Presenting it produces a standalone
//! HTML page that embeds the document as JSON next to a small `<canvas>`
//! renderer. Live updates mutate glyph columns in place and emit one
//! [`GlyphPatch`] per redrawn glyph.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    Backend, BackendKind, GlyphId, LiveBackend, OutputTarget, Presentation, TextLine,
    dataset_bars, error_segments, parameter_text_lines,
};
use crate::config::{LegendLocation, LegendOrientation};
use crate::curve::{Band, UncertainCurve};
use crate::dataset::{Dataset, FitRecord};
use crate::error::{PlotError, Result};
use crate::layout::FigureLayout;
use crate::render::{BAND_ALPHA, BAR_ALPHA, Color, LineStyle, MarkerStyle, TEXT_BOX_ALPHA};
use crate::view::Range;

/// Named numeric columns of a glyph.
pub type Columns = BTreeMap<String, Vec<f64>>;

/// Tools offered by the canvas page toolbar.
const TOOLS: [&str; 5] = ["save", "pan", "box_zoom", "wheel_zoom", "reset"];

/// Panel a glyph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelId {
    Main,
    Residual,
}

/// One plotting panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel {
    /// X range, shared between the main and residual panels.
    pub x_range: Range,
    /// Y range of this panel.
    pub y_range: Range,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// X axis title.
    pub x_label: String,
    /// Y axis title.
    pub y_label: String,
}

/// Glyph geometry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlyphKind {
    /// Circles at `x`, `y`.
    Scatter,
    /// Straight segments from `x0`, `y0` to `x1`, `y1`.
    Segments,
    /// Polyline through `x`, `y`.
    Line,
    /// Filled polygon through `x`, `y`.
    Patch,
    /// Vertical bars from zero to `top`, spanning `left` to `right`.
    Bars,
}

/// A retained drawing element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Glyph {
    /// Stable handle.
    pub id: GlyphId,
    /// Panel the glyph is drawn in.
    pub panel: PanelId,
    /// Geometry type.
    pub kind: GlyphKind,
    /// Fill or stroke color.
    pub color: Color,
    /// Marker diameter or stroke width in pixels.
    pub size: f32,
    /// Legend entry, if any.
    pub legend: Option<String>,
    /// Column data.
    pub columns: Columns,
}

impl Glyph {
    /// A named column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// Legend placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Legend {
    /// Anchor inside the main panel.
    pub location: LegendLocation,
    /// Entry layout direction.
    pub orientation: LegendOrientation,
    /// Whether the legend is drawn.
    pub visible: bool,
}

/// Column replacement for one glyph, sent to the display context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphPatch {
    /// Glyph to update.
    pub id: GlyphId,
    /// Columns to overwrite.
    pub columns: Columns,
}

impl GlyphPatch {
    /// JSON message for the page's `fitplot.apply` entry point.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Retained canvas document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasFigure {
    /// Figure title, also used as the page title.
    pub title: String,
    /// Main panel.
    pub main: Panel,
    /// Residual panel stacked beneath the main panel.
    pub residual: Option<Panel>,
    /// Glyphs in draw order.
    pub glyphs: Vec<Glyph>,
    /// Parameter text lines, in main panel pixels.
    pub labels: Vec<TextLine>,
    /// Background behind parameter text.
    pub label_background: Color,
    /// Legend placement.
    pub legend: Legend,
    /// Toolbar tools.
    pub tools: Vec<String>,
    /// Whether the panels have been composed into the final column layout.
    pub stacked: bool,
    #[serde(skip)]
    layout: FigureLayout,
    #[serde(skip)]
    live: bool,
    #[serde(skip)]
    next_id: u64,
}

impl CanvasFigure {
    fn new(layout: &FigureLayout) -> Self {
        let main = Panel {
            x_range: layout.x_range,
            y_range: layout.y_range,
            width: layout.width,
            height: layout.height,
            x_label: layout.labels.x_title.clone(),
            y_label: layout.labels.y_title.clone(),
        };
        let residual = layout
            .residual_range
            .map(|range| residual_panel(layout, range));
        Self {
            title: layout.labels.title.clone(),
            main,
            residual,
            glyphs: Vec::new(),
            labels: Vec::new(),
            label_background: Color::WHITE.with_alpha(TEXT_BOX_ALPHA),
            legend: Legend {
                location: layout.legend_location,
                orientation: layout.legend_orientation,
                visible: layout.show_legend,
            },
            tools: TOOLS.iter().map(|tool| tool.to_string()).collect(),
            stacked: false,
            layout: layout.clone(),
            live: false,
            next_id: 0,
        }
    }

    /// Whether the figure has been presented to a live display context.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Total height of the page canvas.
    pub fn total_height(&self) -> u32 {
        self.main.height + self.residual.as_ref().map_or(0, |panel| panel.height)
    }

    /// Look up a glyph.
    pub fn glyph(&self, id: GlyphId) -> Option<&Glyph> {
        self.glyphs.iter().find(|glyph| glyph.id == id)
    }

    /// Overwrite glyph columns from a patch. Returns `false` for unknown glyphs.
    pub fn apply_patch(&mut self, patch: &GlyphPatch) -> bool {
        let Some(glyph) = self.glyphs.iter_mut().find(|glyph| glyph.id == patch.id) else {
            return false;
        };
        for (name, values) in &patch.columns {
            glyph.columns.insert(name.clone(), values.clone());
        }
        true
    }

    /// Standalone HTML page rendering this figure.
    pub fn to_html(&self) -> Result<String> {
        let json = serde_json::to_string(self)?.replace("</", "<\\/");
        Ok(format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n</head>\n<body>\n\
             <canvas id=\"fitplot-canvas\" width=\"{width}\" height=\"{height}\"></canvas>\n\
             <script type=\"application/json\" id=\"fitplot-figure\">{json}</script>\n\
             <script>\n{script}</script>\n</body>\n</html>\n",
            title = escape_html(&self.title),
            width = self.main.width,
            height = self.total_height(),
            script = RENDERER_JS,
        ))
    }

    fn push(
        &mut self,
        panel: PanelId,
        kind: GlyphKind,
        color: Color,
        size: f32,
        legend: Option<String>,
        columns: Columns,
    ) -> GlyphId {
        let id = GlyphId(self.next_id);
        self.next_id += 1;
        self.glyphs.push(Glyph {
            id,
            panel,
            kind,
            color,
            size,
            legend,
            columns,
        });
        id
    }

    fn glyph_mut(&mut self, id: GlyphId) -> Result<&mut Glyph> {
        self.glyphs
            .iter_mut()
            .find(|glyph| glyph.id == id)
            .ok_or_else(|| PlotError::Render(format!("{id} is not part of the figure")))
    }
}

fn residual_panel(layout: &FigureLayout, range: Range) -> Panel {
    Panel {
        x_range: layout.x_range,
        y_range: range,
        width: layout.width,
        height: layout.residual_height(),
        x_label: layout.labels.x_title.clone(),
        y_label: "Residuals".to_string(),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xy_columns(x: &[f64], y: &[f64]) -> Columns {
    let mut columns = Columns::new();
    columns.insert("x".to_string(), x.to_vec());
    columns.insert("y".to_string(), y.to_vec());
    columns
}

/// Callback receiving every emitted patch.
pub type PatchSink = Box<dyn FnMut(&GlyphPatch) + Send>;

/// Canvas renderer.
#[derive(Default)]
pub struct CanvasBackend {
    outbox: Vec<GlyphPatch>,
    sink: Option<PatchSink>,
}

impl CanvasBackend {
    /// Create a backend without a patch sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend forwarding patches to `sink`.
    pub fn with_sink(sink: impl FnMut(&GlyphPatch) + Send + 'static) -> Self {
        Self {
            outbox: Vec::new(),
            sink: Some(Box::new(sink)),
        }
    }

    /// Install or replace the patch sink.
    pub fn set_sink(&mut self, sink: impl FnMut(&GlyphPatch) + Send + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Drain patches emitted since the last call.
    pub fn take_patches(&mut self) -> Vec<GlyphPatch> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, patch: GlyphPatch) {
        if let Some(sink) = self.sink.as_mut() {
            sink(&patch);
        }
        self.outbox.push(patch);
    }
}

impl fmt::Debug for CanvasBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasBackend")
            .field("pending_patches", &self.outbox.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Backend for CanvasBackend {
    type Figure = CanvasFigure;

    fn kind(&self) -> BackendKind {
        BackendKind::Canvas
    }

    fn initialize_figure(&mut self, layout: &FigureLayout) -> CanvasFigure {
        log::debug!(
            "building canvas figure '{}' ({}x{}, residuals: {})",
            layout.labels.title,
            layout.width,
            layout.height,
            layout.residual_range.is_some()
        );
        CanvasFigure::new(layout)
    }

    fn draw_dataset(
        &mut self,
        figure: &mut CanvasFigure,
        dataset: &dyn Dataset,
        color: Color,
        residual: bool,
    ) {
        let marker = MarkerStyle::colored(color);
        if residual {
            let Some(fit) = dataset.last_fit() else {
                return;
            };
            if figure.residual.is_none() {
                let range = dataset
                    .residual_extent(figure.layout.y_margin)
                    .unwrap_or_default();
                figure.residual = Some(residual_panel(&figure.layout, range));
            }
            let x = dataset.x();
            let y = &fit.residuals;
            figure.push(
                PanelId::Residual,
                GlyphKind::Scatter,
                color,
                marker.size,
                None,
                xy_columns(x, y),
            );
            push_error_bars(figure, PanelId::Residual, x, y, dataset, color);
            return;
        }

        if dataset.is_histogram() {
            let bars = dataset_bars(dataset);
            let mut columns = Columns::new();
            columns.insert("left".to_string(), bars.iter().map(|bar| bar.left).collect());
            columns.insert("right".to_string(), bars.iter().map(|bar| bar.right).collect());
            columns.insert("top".to_string(), bars.iter().map(|bar| bar.height).collect());
            figure.push(
                PanelId::Main,
                GlyphKind::Bars,
                color.with_alpha(BAR_ALPHA),
                0.0,
                Some(dataset.name().to_string()),
                columns,
            );
            return;
        }

        let (x, y) = (dataset.x(), dataset.y());
        figure.push(
            PanelId::Main,
            GlyphKind::Scatter,
            color,
            marker.size,
            Some(dataset.name().to_string()),
            xy_columns(x, y),
        );
        push_error_bars(figure, PanelId::Main, x, y, dataset, color);
    }

    fn draw_curve(
        &mut self,
        figure: &mut CanvasFigure,
        curve: &UncertainCurve,
        color: Color,
        name: &str,
    ) -> GlyphId {
        let style = LineStyle::colored(color);
        figure.push(
            PanelId::Main,
            GlyphKind::Line,
            style.color,
            style.width,
            Some(name.to_string()),
            xy_columns(curve.x(), curve.mean()),
        )
    }

    fn draw_error_band(
        &mut self,
        figure: &mut CanvasFigure,
        curve: &UncertainCurve,
        confidence: f64,
        color: Color,
    ) -> Option<GlyphId> {
        let (x, y) = curve.band(confidence)?.outline();
        Some(figure.push(
            PanelId::Main,
            GlyphKind::Patch,
            color.with_alpha(BAND_ALPHA),
            0.0,
            None,
            xy_columns(&x, &y),
        ))
    }

    fn draw_parameter_text_box(
        &mut self,
        figure: &mut CanvasFigure,
        fit: &FitRecord,
        offset: f32,
    ) -> f32 {
        let (lines, next) = parameter_text_lines(fit, &figure.layout, offset);
        figure.labels.extend(lines);
        next
    }

    fn finalize(&mut self, figure: &mut CanvasFigure) {
        figure.legend = Legend {
            location: figure.layout.legend_location,
            orientation: figure.layout.legend_orientation,
            visible: figure.layout.show_legend,
        };
        figure.stacked = figure.residual.is_some();
    }

    fn present(
        &mut self,
        figure: &mut CanvasFigure,
        target: OutputTarget,
        path: &Path,
    ) -> Result<Presentation> {
        let html = figure.to_html()?;
        match target {
            OutputTarget::Interactive => {
                figure.live = true;
                log::debug!("canvas figure '{}' is live", figure.title);
                Ok(Presentation::Document(html))
            }
            OutputTarget::File => {
                fs::write(path, html)?;
                log::debug!("canvas figure '{}' saved to {}", figure.title, path.display());
                Ok(Presentation::Saved(path.to_path_buf()))
            }
        }
    }
}

fn push_error_bars(
    figure: &mut CanvasFigure,
    panel: PanelId,
    x: &[f64],
    y: &[f64],
    dataset: &dyn Dataset,
    color: Color,
) {
    let segments = error_segments(x, y, dataset.x_err(), dataset.y_err());
    if segments.is_empty() {
        return;
    }
    let mut columns = Columns::new();
    columns.insert("x0".to_string(), segments.iter().map(|s| s[0].0).collect());
    columns.insert("y0".to_string(), segments.iter().map(|s| s[0].1).collect());
    columns.insert("x1".to_string(), segments.iter().map(|s| s[1].0).collect());
    columns.insert("y1".to_string(), segments.iter().map(|s| s[1].1).collect());
    figure.push(panel, GlyphKind::Segments, color, 1.0, None, columns);
}

impl LiveBackend for CanvasBackend {
    fn is_live(&self, figure: &CanvasFigure) -> bool {
        figure.live
    }

    fn update_curve(
        &mut self,
        figure: &mut CanvasFigure,
        id: GlyphId,
        curve: &UncertainCurve,
    ) -> Result<()> {
        let glyph = figure.glyph_mut(id)?;
        glyph.columns.insert("y".to_string(), curve.mean().to_vec());
        Ok(())
    }

    fn update_band(&mut self, figure: &mut CanvasFigure, id: GlyphId, band: &Band) -> Result<()> {
        let (x, y) = band.outline();
        let glyph = figure.glyph_mut(id)?;
        glyph.columns = xy_columns(&x, &y);
        Ok(())
    }

    fn redraw(&mut self, figure: &mut CanvasFigure, ids: &[GlyphId]) -> Result<()> {
        if !figure.live {
            return Err(PlotError::NotLive.reported());
        }
        for &id in ids {
            let glyph = figure.glyph_mut(id)?;
            let patch = GlyphPatch {
                id,
                columns: glyph.columns.clone(),
            };
            self.emit(patch);
        }
        Ok(())
    }
}

const RENDERER_JS: &str = r##"(function () {
  const fig = JSON.parse(document.getElementById("fitplot-figure").textContent);
  const canvas = document.getElementById("fitplot-canvas");
  const ctx = canvas.getContext("2d");
  const pad = { left: 64, right: 12, top: 34, bottom: 42 };

  function rgba(c) {
    return `rgba(${Math.round(c.r * 255)},${Math.round(c.g * 255)},${Math.round(c.b * 255)},${c.a})`;
  }

  function frames() {
    const list = [{ id: "main", panel: fig.main, top: 0 }];
    if (fig.residual) list.push({ id: "residual", panel: fig.residual, top: fig.main.height });
    return list.map((entry) => {
      const p = entry.panel;
      const x0 = pad.left, x1 = p.width - pad.right;
      const y0 = entry.top + pad.top, y1 = entry.top + p.height - pad.bottom;
      const sx = (v) => x0 + ((v - p.x_range.min) / (p.x_range.max - p.x_range.min)) * (x1 - x0);
      const sy = (v) => y1 - ((v - p.y_range.min) / (p.y_range.max - p.y_range.min)) * (y1 - y0);
      return Object.assign(entry, { x0, x1, y0, y1, sx, sy });
    });
  }

  function ticks(range, count) {
    const out = [];
    for (let i = 0; i <= count; i++) out.push(range.min + ((range.max - range.min) * i) / count);
    return out;
  }

  function axes(f) {
    const p = f.panel;
    ctx.strokeStyle = "#e5e5e5";
    ctx.fillStyle = "#444";
    ctx.font = "11px sans-serif";
    ctx.lineWidth = 1;
    for (const v of ticks(p.x_range, 5)) {
      const x = f.sx(v);
      ctx.beginPath(); ctx.moveTo(x, f.y0); ctx.lineTo(x, f.y1); ctx.stroke();
      ctx.textAlign = "center"; ctx.fillText(v.toPrecision(3), x, f.y1 + 14);
    }
    for (const v of ticks(p.y_range, 5)) {
      const y = f.sy(v);
      ctx.beginPath(); ctx.moveTo(f.x0, y); ctx.lineTo(f.x1, y); ctx.stroke();
      ctx.textAlign = "right"; ctx.fillText(v.toPrecision(3), f.x0 - 4, y + 4);
    }
    ctx.strokeStyle = "#000";
    ctx.strokeRect(f.x0, f.y0, f.x1 - f.x0, f.y1 - f.y0);
    ctx.textAlign = "center";
    ctx.fillText(p.x_label, (f.x0 + f.x1) / 2, f.y1 + 32);
    ctx.save();
    ctx.translate(14, (f.y0 + f.y1) / 2);
    ctx.rotate(-Math.PI / 2);
    ctx.fillText(p.y_label, 0, 0);
    ctx.restore();
  }

  function glyph(g, f) {
    const c = g.columns;
    ctx.fillStyle = rgba(g.color);
    ctx.strokeStyle = rgba(g.color);
    ctx.lineWidth = g.size || 1;
    if (g.kind === "scatter") {
      c.x.forEach((x, i) => {
        ctx.beginPath(); ctx.arc(f.sx(x), f.sy(c.y[i]), g.size / 2, 0, 2 * Math.PI); ctx.fill();
      });
    } else if (g.kind === "segments") {
      c.x0.forEach((x, i) => {
        ctx.beginPath(); ctx.moveTo(f.sx(x), f.sy(c.y0[i])); ctx.lineTo(f.sx(c.x1[i]), f.sy(c.y1[i])); ctx.stroke();
      });
    } else if (g.kind === "line" || g.kind === "patch") {
      ctx.beginPath();
      c.x.forEach((x, i) => (i ? ctx.lineTo(f.sx(x), f.sy(c.y[i])) : ctx.moveTo(f.sx(x), f.sy(c.y[i]))));
      if (g.kind === "patch") { ctx.closePath(); ctx.fill(); } else { ctx.stroke(); }
    } else if (g.kind === "bars") {
      c.left.forEach((l, i) => {
        const x = f.sx(l), y = f.sy(c.top[i]);
        ctx.fillRect(x, y, f.sx(c.right[i]) - x, f.sy(0) - y);
      });
    }
  }

  function legend(main) {
    const entries = fig.glyphs.filter((g) => g.legend);
    if (!fig.legend.visible || entries.length === 0) return;
    ctx.font = "12px sans-serif";
    const row = 18;
    const widths = entries.map((g) => ctx.measureText(g.legend).width + 30);
    const horizontal = fig.legend.orientation === "horizontal";
    const w = horizontal ? widths.reduce((a, b) => a + b, 0) + 8 : Math.max(...widths) + 8;
    const h = horizontal ? row + 8 : entries.length * row + 8;
    const loc = fig.legend.location;
    const x = loc.endsWith("left") ? main.x0 + 8 : loc.endsWith("right") ? main.x1 - w - 8 : (main.x0 + main.x1 - w) / 2;
    const y = loc.startsWith("top") ? main.y0 + 8 : loc.startsWith("bottom") ? main.y1 - h - 8 : (main.y0 + main.y1 - h) / 2;
    ctx.fillStyle = "rgba(255,255,255,0.85)";
    ctx.fillRect(x, y, w, h);
    ctx.strokeStyle = "#aaa"; ctx.lineWidth = 1; ctx.strokeRect(x, y, w, h);
    let cx = x + 4, cy = y + 4;
    entries.forEach((g, i) => {
      ctx.fillStyle = rgba(g.color);
      ctx.fillRect(cx, cy + 6, 20, 4);
      ctx.fillStyle = "#000"; ctx.textAlign = "left";
      ctx.fillText(g.legend, cx + 26, cy + 12);
      if (horizontal) cx += widths[i]; else cy += row;
    });
  }

  function draw() {
    ctx.clearRect(0, 0, canvas.width, canvas.height);
    const fs = frames();
    ctx.fillStyle = "#000";
    ctx.font = "bold 14px sans-serif";
    ctx.textAlign = "left";
    ctx.fillText(fig.title, pad.left, 20);
    for (const f of fs) {
      axes(f);
      ctx.save();
      ctx.beginPath(); ctx.rect(f.x0, f.y0, f.x1 - f.x0, f.y1 - f.y0); ctx.clip();
      fig.glyphs.filter((g) => g.panel === f.id).forEach((g) => glyph(g, f));
      ctx.restore();
    }
    ctx.font = "14px sans-serif";
    ctx.textAlign = "right";
    ctx.textBaseline = "top";
    for (const label of fig.labels) {
      const w = ctx.measureText(label.text).width;
      ctx.fillStyle = rgba(fig.label_background);
      ctx.fillRect(label.x - w - 2, label.y - 1, w + 4, 18);
      ctx.fillStyle = "#000";
      ctx.fillText(label.text, label.x, label.y);
    }
    ctx.textBaseline = "alphabetic";
    legend(fs[0]);
  }

  window.fitplot = {
    figure: fig,
    apply(patch) {
      const g = fig.glyphs.find((item) => item.id === patch.id);
      if (!g) return false;
      Object.assign(g.columns, patch.columns);
      draw();
      return true;
    },
  };
  draw();
})();
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneConfig;
    use crate::layout::Labels;
    use crate::testing;
    use crate::view::Viewport;
    use std::sync::{Arc, Mutex};

    fn layout(residual: Option<Range>) -> FigureLayout {
        let viewport = Viewport::new(Range::new(-0.5, 10.5), Range::new(-0.5, 5.5));
        FigureLayout::new(&Labels::default(), viewport, residual, &SceneConfig::default(), 0.0)
    }

    #[test]
    fn dataset_draws_scatter_and_error_bars() {
        let mut backend = CanvasBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        let shared = testing::fitted_line_dataset();
        let dataset = crate::dataset::read(&shared);
        backend.draw_dataset(&mut figure, &*dataset, Color::BLACK, false);

        assert_eq!(figure.glyphs.len(), 2);
        assert_eq!(figure.glyphs[0].kind, GlyphKind::Scatter);
        assert_eq!(figure.glyphs[0].legend.as_deref(), Some("noisy"));
        assert_eq!(figure.glyphs[1].kind, GlyphKind::Segments);
        assert_eq!(figure.glyphs[1].column("x0").map(<[f64]>::len), Some(5));
    }

    #[test]
    fn residuals_build_missing_panel() {
        let mut backend = CanvasBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        assert!(figure.residual.is_none());
        let shared = testing::fitted_line_dataset();
        let dataset = crate::dataset::read(&shared);
        backend.draw_dataset(&mut figure, &*dataset, Color::BLACK, true);

        let panel = figure.residual.as_ref().expect("residual panel");
        assert_eq!(panel.height, 400 / 3);
        assert_eq!(panel.x_range, figure.main.x_range);
        assert!(figure.glyphs.iter().all(|glyph| glyph.panel == PanelId::Residual));
        backend.finalize(&mut figure);
        assert!(figure.stacked);
        assert_eq!(figure.total_height(), 400 + 133);
    }

    #[test]
    fn band_glyph_is_closed_outline() {
        let mut backend = CanvasBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        let curve = UncertainCurve::with_std(vec![0.0, 1.0], vec![1.0, 2.0], vec![0.5, 0.5]);
        let id = backend
            .draw_error_band(&mut figure, &curve, 2.0, Color::BLACK)
            .expect("uncertain curve");
        let glyph = figure.glyph(id).expect("retained");
        assert_eq!(glyph.column("x"), Some(&[0.0, 1.0, 1.0, 0.0][..]));
        assert_eq!(glyph.column("y"), Some(&[2.0, 3.0, 1.0, 0.0][..]));
        let exact = UncertainCurve::exact(vec![0.0], vec![1.0]);
        assert!(backend.draw_error_band(&mut figure, &exact, 1.0, Color::BLACK).is_none());
    }

    #[test]
    fn live_redraw_patches_only_requested_glyph() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let mut backend = CanvasBackend::with_sink(move |patch: &GlyphPatch| {
            sink.lock().expect("sink lock").push(patch.id);
        });
        let mut figure = backend.initialize_figure(&layout(None));
        let curve = UncertainCurve::exact(vec![0.0, 1.0], vec![0.0, 1.0]);
        let first = backend.draw_curve(&mut figure, &curve, Color::BLACK, "first");
        let second = backend.draw_curve(&mut figure, &curve, Color::BLACK, "second");

        let updated = UncertainCurve::exact(vec![0.0, 1.0], vec![5.0, 6.0]);
        backend
            .update_curve(&mut figure, second, &updated)
            .expect("known glyph");
        assert!(matches!(
            backend.redraw(&mut figure, &[second]),
            Err(PlotError::NotLive)
        ));

        backend
            .present(&mut figure, OutputTarget::Interactive, Path::new("unused.html"))
            .expect("interactive present");
        backend.redraw(&mut figure, &[second]).expect("live figure");
        let patches = backend.take_patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].id, second);
        assert_eq!(patches[0].columns["y"], vec![5.0, 6.0]);
        assert_eq!(*received.lock().expect("sink lock"), vec![second]);
        assert_eq!(figure.glyph(first).and_then(|g| g.column("y")), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn file_output_writes_standalone_page() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("plot.html");
        let mut backend = CanvasBackend::new();
        let mut labels = Labels::default();
        labels.title = "Decay </script> test".to_string();
        let viewport = Viewport::new(Range::new(0.0, 1.0), Range::new(0.0, 1.0));
        let layout = FigureLayout::new(&labels, viewport, None, &SceneConfig::default(), 0.0);
        let mut figure = backend.initialize_figure(&layout);

        let presented = backend
            .present(&mut figure, OutputTarget::File, &path)
            .expect("file present");
        assert_eq!(presented, Presentation::Saved(path.clone()));
        assert!(!figure.is_live());
        let html = fs::read_to_string(&path).expect("written page");
        assert!(html.contains("<title>Decay &lt;/script&gt; test</title>"));
        assert!(html.contains("Decay <\\/script> test"));
        assert!(html.contains("fitplot-canvas"));
    }

    #[test]
    fn histogram_populates_bars_without_error_bars() {
        let mut scene = crate::scene::Scene::from_dataset(CanvasBackend::new(), testing::histogram_dataset());
        scene
            .show(OutputTarget::Interactive, true, true)
            .expect("render");
        let figure = scene.figure().expect("built");

        let bars: Vec<&Glyph> = figure
            .glyphs
            .iter()
            .filter(|glyph| glyph.kind == GlyphKind::Bars)
            .collect();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].legend.as_deref(), Some("counts"));
        assert_eq!(bars[0].column("left"), Some(&[0.0, 1.0, 2.0, 3.0][..]));
        assert_eq!(bars[0].column("top"), Some(&[2.0, 3.0, 1.0, 2.0][..]));
        assert!(figure.glyphs.iter().all(|glyph| {
            !matches!(glyph.kind, GlyphKind::Scatter | GlyphKind::Segments)
        }));
    }

    #[test]
    fn patch_applies_to_document() {
        let mut backend = CanvasBackend::new();
        let mut figure = backend.initialize_figure(&layout(None));
        let curve = UncertainCurve::exact(vec![0.0], vec![0.0]);
        let id = backend.draw_curve(&mut figure, &curve, Color::BLACK, "line");
        let mut columns = Columns::new();
        columns.insert("y".to_string(), vec![9.0]);
        let patch = GlyphPatch { id, columns };
        assert!(patch.to_json().expect("serializable").contains("\"id\":0"));
        assert!(figure.apply_patch(&patch));
        assert_eq!(figure.glyph(id).and_then(|g| g.column("y")), Some(&[9.0][..]));
        assert!(!figure.apply_patch(&GlyphPatch {
            id: GlyphId(99),
            columns: Columns::new(),
        }));
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use gpui::prelude::*;
use gpui::{App, AsyncWindowContext, Bounds, Entity, Pixels, Timer, Window, canvas, div};

use crate::backend::canvas::{CanvasFigure, GlyphPatch};
use crate::render::Color;
use crate::transform::{ScreenPoint, ScreenRect};

use super::frame::build_frame;
use super::paint::{paint_frame, to_hsla};

const REPAINT_POLL_MS: u64 = 16;

/// A GPUI view that paints a live [`CanvasFigure`].
///
/// The figure is shared with any number of [`LiveFigureHandle`]s. Patches
/// applied through a handle are repainted once the view is watched with
/// [`LiveFigureView::watch`].
#[derive(Clone)]
pub struct LiveFigureView {
    figure: Arc<RwLock<CanvasFigure>>,
    revision: Arc<AtomicU64>,
}

impl LiveFigureView {
    /// Create a view over a built figure.
    pub fn new(figure: CanvasFigure) -> Self {
        Self {
            figure: Arc::new(RwLock::new(figure)),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a handle for patching the displayed figure.
    pub fn handle(&self) -> LiveFigureHandle {
        LiveFigureHandle {
            figure: Arc::clone(&self.figure),
            revision: Arc::clone(&self.revision),
        }
    }

    /// Repaint `view` in `window` whenever a handle applies a patch.
    ///
    /// The watcher stops once the view is released or the window closes.
    pub fn watch(view: &Entity<Self>, window: &mut Window, cx: &mut App) {
        let weak = view.downgrade();
        let revision = Arc::clone(&view.read(cx).revision);
        window
            .spawn(cx, move |cx: &mut AsyncWindowContext| {
                let mut cx = cx.clone();
                async move {
                    let mut seen = revision.load(Ordering::Acquire);
                    loop {
                        Timer::after(Duration::from_millis(REPAINT_POLL_MS)).await;
                        if weak.upgrade().is_none() {
                            break;
                        }
                        let current = revision.load(Ordering::Acquire);
                        if current == seen {
                            continue;
                        }
                        seen = current;
                        let notified =
                            cx.update(|_, cx| weak.update(cx, |_view, view_cx| view_cx.notify()));
                        if !matches!(notified, Ok(Ok(()))) {
                            break;
                        }
                    }
                }
            })
            .detach();
    }
}

impl Render for LiveFigureView {
    fn render(&mut self, _window: &mut Window, _cx: &mut Context<Self>) -> impl IntoElement {
        let figure = Arc::clone(&self.figure);
        div().size_full().bg(to_hsla(Color::WHITE)).child(
            canvas(
                move |bounds, _, _| {
                    let figure = figure.read().unwrap_or_else(PoisonError::into_inner);
                    build_frame(&figure, screen_rect(bounds))
                },
                move |_, frame, window, cx| {
                    paint_frame(&frame, window, cx);
                },
            )
            .size_full(),
        )
    }
}

/// A handle for patching a figure held inside a [`LiveFigureView`].
#[derive(Clone)]
pub struct LiveFigureHandle {
    figure: Arc<RwLock<CanvasFigure>>,
    revision: Arc<AtomicU64>,
}

impl LiveFigureHandle {
    /// Read the figure.
    ///
    /// The figure is locked for the duration of the callback.
    pub fn read<R>(&self, f: impl FnOnce(&CanvasFigure) -> R) -> R {
        let figure = self.figure.read().unwrap_or_else(PoisonError::into_inner);
        f(&figure)
    }

    /// Overwrite glyph columns and request a repaint. Returns `false` for
    /// glyphs the figure lacks.
    pub fn apply(&self, patch: &GlyphPatch) -> bool {
        let mut figure = self.figure.write().unwrap_or_else(PoisonError::into_inner);
        let applied = figure.apply_patch(patch);
        if applied {
            self.revision.fetch_add(1, Ordering::Release);
        } else {
            log::warn!("dropping patch for unknown {}", patch.id);
        }
        applied
    }

    /// Number of patches applied so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// A patch sink for [`CanvasBackend::set_sink`](crate::CanvasBackend::set_sink)
    /// that forwards every redraw to this view.
    pub fn sink(&self) -> impl FnMut(&GlyphPatch) + Send + 'static {
        let handle = self.clone();
        move |patch| {
            handle.apply(patch);
        }
    }
}

fn screen_rect(bounds: Bounds<Pixels>) -> ScreenRect {
    let min = ScreenPoint::new(f32::from(bounds.origin.x), f32::from(bounds.origin.y));
    ScreenRect::new(
        min,
        ScreenPoint::new(
            min.x + f32::from(bounds.size.width),
            min.y + f32::from(bounds.size.height),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::canvas::CanvasBackend;
    use crate::backend::{GlyphId, OutputTarget};
    use crate::explorer::ControlEvent;
    use crate::scene::Scene;
    use crate::testing;

    #[test]
    fn sink_forwards_explorer_redraws() {
        let mut scene = Scene::from_dataset(CanvasBackend::new(), testing::fitted_line_dataset());
        scene.begin_interactive_linear_fit(2.0).expect("live");
        let view = LiveFigureView::new(scene.figure().cloned().expect("built"));
        let handle = view.handle();
        scene.backend_mut().set_sink(handle.sink());

        scene
            .apply_control(ControlEvent::Slope(0.0))
            .expect("update");

        let line = scene.explorer().live().expect("live").handles.line;
        let expected = scene
            .figure()
            .and_then(|figure| figure.glyph(line))
            .and_then(|glyph| glyph.column("y"))
            .map(<[f64]>::to_vec)
            .expect("line");
        let shown = handle.read(|figure| {
            figure
                .glyph(line)
                .and_then(|glyph| glyph.column("y"))
                .map(<[f64]>::to_vec)
        });
        assert_eq!(shown, Some(expected));
        assert_eq!(handle.revision(), 2);
    }

    #[test]
    fn unknown_glyph_patch_is_dropped() {
        let mut scene = Scene::from_dataset(CanvasBackend::new(), testing::fitted_line_dataset());
        scene
            .show(OutputTarget::Interactive, true, true)
            .expect("render");
        let handle = LiveFigureView::new(scene.figure().cloned().expect("built")).handle();
        let patch = GlyphPatch {
            id: GlyphId(u64::MAX),
            columns: Default::default(),
        };
        assert!(!handle.apply(&patch));
        assert_eq!(handle.revision(), 0);
    }
}

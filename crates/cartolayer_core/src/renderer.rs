//! Layer renderer contract and drawable surfaces
//!
//! Renderers are created lazily by their layer (see
//! [`Layer::renderer`](crate::Layer::renderer)) through a [`RendererFactory`]
//! and are owned by that layer for its whole life. The frame pipeline asks a
//! renderer to [prepare](LayerRenderer::prepare_frame) and then to
//! [render](LayerRenderer::render_frame) each frame.

use crate::frame::FrameState;
use crate::layer::{Layer, LayerId};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Draws one layer
///
/// A renderer may call back into its own layer while drawing. Nested
/// `render` calls then yield `None`, a nested deferred pass is skipped, and
/// `clear_renderer` drops the renderer without calling `dispose`.
pub trait LayerRenderer {
    /// Prepare for `frame_state`; `false` means there is nothing to draw yet
    fn prepare_frame(&mut self, frame_state: &FrameState) -> bool;

    /// Draw the layer for `frame_state`
    ///
    /// `target` is the surface produced by the layer drawn just before this
    /// one. It is only a hint: renderers may draw into it (returning it again)
    /// or produce a surface of their own.
    fn render_frame(&mut self, frame_state: &FrameState, target: Option<&Surface>)
        -> Option<Surface>;

    /// Work to run after every layer of the frame has rendered
    fn render_deferred(&mut self, _frame_state: &FrameState) {}

    /// Release resources held by the renderer
    fn dispose(&mut self) {}
}

/// Renderer instance as retained by its layer
pub type SharedRenderer = Rc<RefCell<Box<dyn LayerRenderer>>>;

/// Builds the renderer for a layer kind; yields `None` when the kind has none
pub type RendererFactory = Box<dyn Fn(&Layer) -> Option<Box<dyn LayerRenderer>>>;

/// Unique identifier for a surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

impl SurfaceId {
    fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Drawable output of a layer renderer
///
/// Several layers can share one surface when they agree on class name and
/// size; `layers` records which layers drew into it, bottom first.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    pub id: SurfaceId,
    pub class_name: String,
    /// Size in pixels
    pub size: [u32; 2],
    /// Frame the surface was last drawn in
    pub frame_index: u64,
    pub layers: SmallVec<[LayerId; 4]>,
}

impl Surface {
    pub fn new(class_name: impl Into<String>, size: [u32; 2], frame_index: u64) -> Self {
        Self {
            id: SurfaceId::next(),
            class_name: class_name.into(),
            size,
            frame_index,
            layers: SmallVec::new(),
        }
    }

    /// Whether a layer with this class name and size can draw into the surface
    pub fn accepts(&self, class_name: &str, size: [u32; 2]) -> bool {
        self.class_name == class_name && self.size == size
    }

    /// Continue drawing into `target` when compatible, else start a new surface
    pub fn reuse_or_create(
        target: Option<&Surface>,
        class_name: &str,
        size: [u32; 2],
        frame_index: u64,
    ) -> Self {
        match target {
            Some(target) if target.accepts(class_name, size) => {
                let mut surface = target.clone();
                surface.frame_index = frame_index;
                surface
            }
            _ => Self::new(class_name, size, frame_index),
        }
    }

    /// Record that `layer` drew into this surface
    pub fn draw_layer(&mut self, layer: LayerId) {
        self.layers.push(layer);
    }
}

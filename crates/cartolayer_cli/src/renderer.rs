//! Outline renderer
//!
//! Stand-in renderer for the CLI: it draws nothing but records which layers
//! would have been drawn into which surface.

use cartolayer_core::{FrameState, Layer, LayerId, LayerRenderer, Surface};
use tracing::{debug, trace};

pub struct OutlineRenderer {
    layer: LayerId,
    frames_drawn: u64,
}

impl OutlineRenderer {
    pub fn new(layer: &Layer) -> Self {
        Self {
            layer: layer.id(),
            frames_drawn: 0,
        }
    }

    /// Factory for `LayerOptions::with_renderer_factory`
    pub fn factory(layer: &Layer) -> Option<Box<dyn LayerRenderer>> {
        Some(Box::new(Self::new(layer)))
    }
}

impl LayerRenderer for OutlineRenderer {
    fn prepare_frame(&mut self, frame_state: &FrameState) -> bool {
        let Some(state) = frame_state.current_layer_state() else {
            return false;
        };
        match state.extent {
            Some(extent) => extent.intersects(&frame_state.extent),
            None => true,
        }
    }

    fn render_frame(
        &mut self,
        frame_state: &FrameState,
        target: Option<&Surface>,
    ) -> Option<Surface> {
        let state = frame_state.current_layer_state()?;
        let class_name = state.layer.class_name();

        let mut surface =
            Surface::reuse_or_create(target, &class_name, frame_state.size, frame_state.index);
        surface.draw_layer(self.layer);
        self.frames_drawn += 1;

        trace!(
            layer = %self.layer,
            surface = surface.id.0,
            opacity = state.opacity,
            "outlined layer"
        );
        Some(surface)
    }

    fn dispose(&mut self) {
        debug!(layer = %self.layer, frames = self.frames_drawn, "disposed outline renderer");
    }
}

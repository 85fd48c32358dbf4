//! Per-frame render state

use crate::geom::Extent;
use crate::layer::Layer;
use crate::state::LayerState;

/// View parameters a frame is rendered for
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    /// View center in map coordinates
    pub center: [f64; 2],
    /// Map units per pixel
    pub resolution: f64,
    pub zoom: f64,
    /// Rotation in radians
    pub rotation: f64,
}

impl ViewState {
    pub fn new(center: [f64; 2], resolution: f64, zoom: f64) -> Self {
        Self {
            center,
            resolution,
            zoom,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Everything renderers need to know about the frame being produced
///
/// Built by the frame pipeline. The `layer_states` collection is appendable
/// during the precompose event so unmanaged layers can join the frame.
#[derive(Clone, Debug)]
pub struct FrameState {
    /// Monotonic frame counter
    pub index: u64,
    pub pixel_ratio: f64,
    /// Viewport size in pixels
    pub size: [u32; 2],
    /// Map extent covered by the viewport
    pub extent: Extent,
    pub view_state: ViewState,
    /// States of every layer taking part in this frame
    pub layer_states: Vec<LayerState>,
    /// Index into `layer_states` of the layer currently rendering
    pub layer_index: usize,
}

impl FrameState {
    pub fn new(index: u64, view_state: ViewState, size: [u32; 2]) -> Self {
        Self {
            index,
            pixel_ratio: 1.0,
            size,
            extent: Extent::for_view(
                view_state.center,
                view_state.resolution,
                view_state.rotation,
                size,
            ),
            view_state,
            layer_states: Vec::new(),
            layer_index: 0,
        }
    }

    pub fn with_pixel_ratio(mut self, pixel_ratio: f64) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    /// Whether `layer` already has a state in this frame
    pub fn contains_layer(&self, layer: &Layer) -> bool {
        self.layer_states.iter().any(|state| state.layer.ptr_eq(layer))
    }

    /// State of the layer currently rendering
    pub fn current_layer_state(&self) -> Option<&LayerState> {
        self.layer_states.get(self.layer_index)
    }
}

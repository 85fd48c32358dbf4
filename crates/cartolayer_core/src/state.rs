//! Layer state snapshots and visibility predicates

use crate::frame::ViewState;
use crate::geom::Extent;
use crate::layer::Layer;
use crate::source::SourceState;

/// How a layer should be treated by the frame pipeline
///
/// Computed fresh by [`Layer::layer_state`] and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerState {
    pub layer: Layer,
    /// Opacity rounded to two decimals, clamped into `0..=1`
    pub opacity: f64,
    pub source_state: SourceState,
    pub visible: bool,
    /// Whether the layer belongs to the map's layer collection
    pub managed: bool,
    pub extent: Option<Extent>,
    pub z_index: f64,
    pub min_resolution: f64,
    pub max_resolution: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

/// Whether a layer is visible at `resolution`
///
/// The lower bound is inclusive and the upper bound exclusive, so two layers
/// with touching resolution ranges never both claim the boundary value.
pub fn visible_at_resolution(layer_state: &LayerState, resolution: f64) -> bool {
    layer_state.visible
        && resolution >= layer_state.min_resolution
        && resolution < layer_state.max_resolution
}

/// Whether a layer is visible for the given view
///
/// Adds the zoom range to [`visible_at_resolution`]. The zoom bounds are the
/// other way around: exclusive below, inclusive above.
pub fn in_view(layer_state: &LayerState, view_state: &ViewState) -> bool {
    visible_at_resolution(layer_state, view_state.resolution)
        && view_state.zoom > layer_state.min_zoom
        && view_state.zoom <= layer_state.max_zoom
}

/// Stable sort by ascending z-index
pub fn sort_by_z_index(layer_states: &mut [LayerState]) {
    layer_states.sort_by(|a, b| a.z_index.total_cmp(&b.z_index));
}

//! Map-side collaborator of the layer core
//!
//! The [`Map`] here is deliberately small. It provides what layers need from
//! a map and nothing else:
//!
//! - a **precompose** event carrying the mutable [`FrameState`], through which
//!   directly attached (unmanaged) layers add themselves to a frame,
//! - a [`render`](Map::render) entry point that records a render request,
//! - a managed layer collection,
//! - [`render_frame`](Map::render_frame), a one-shot composer that builds a
//!   frame state and asks every visible layer to draw.
//!
//! Deciding *when* to call `render_frame` (animation frames, vsync, idle
//! callbacks) is up to the embedding application; `is_render_pending` tells it
//! whether anything asked for a new frame.

use crate::events::{EventTarget, ListenerHandle};
use crate::frame::{FrameState, ViewState};
use crate::layer::{Layer, LayerEvent, LayerId};
use crate::renderer::Surface;
use crate::state::{in_view, sort_by_z_index};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

struct MapInner {
    precompose: EventTarget<FrameState>,
    /// Managed layers, bottom first
    layers: RefCell<Vec<Layer>>,
    /// Change listeners on managed layers
    layer_listeners: RefCell<FxHashMap<LayerId, ListenerHandle>>,
    render_pending: Cell<bool>,
    render_requests: Cell<u64>,
    next_frame_index: Cell<u64>,
    pixel_ratio: Cell<f64>,
}

impl Drop for MapInner {
    fn drop(&mut self) {
        for (_, handle) in self.layer_listeners.get_mut().drain() {
            handle.cancel();
        }
    }
}

/// Shared map handle (cheap to clone)
#[derive(Clone)]
pub struct Map {
    inner: Rc<MapInner>,
}

/// Non-owning map handle; layers hold one of these for their attached map
#[derive(Clone, Debug)]
pub struct WeakMap {
    inner: Weak<MapInner>,
}

impl WeakMap {
    pub fn upgrade(&self) -> Option<Map> {
        self.inner.upgrade().map(|inner| Map { inner })
    }
}

/// Result of composing one frame
#[derive(Debug)]
pub struct Frame {
    pub state: FrameState,
    /// Surfaces produced this frame, bottom first
    pub surfaces: Vec<Surface>,
}

impl Frame {
    /// Number of layers that drew something
    pub fn drawn_layers(&self) -> usize {
        self.surfaces.iter().map(|surface| surface.layers.len()).sum()
    }
}

impl Map {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapInner {
                precompose: EventTarget::new(),
                layers: RefCell::new(Vec::new()),
                layer_listeners: RefCell::new(FxHashMap::default()),
                render_pending: Cell::new(false),
                render_requests: Cell::new(0),
                next_frame_index: Cell::new(0),
                pixel_ratio: Cell::new(1.0),
            }),
        }
    }

    pub fn with_pixel_ratio(self, pixel_ratio: f64) -> Self {
        self.inner.pixel_ratio.set(pixel_ratio);
        self
    }

    pub fn downgrade(&self) -> WeakMap {
        WeakMap {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Map) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Listen to the precompose event fired at the start of every frame
    #[must_use = "dropping the handle leaves the listener registered with no way to cancel it"]
    pub fn on_precompose<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&mut FrameState) + 'static,
    {
        self.inner.precompose.listen(listener)
    }

    pub fn precompose_listener_count(&self) -> usize {
        self.inner.precompose.listener_count()
    }

    /// Request a new frame
    pub fn render(&self) {
        self.inner.render_pending.set(true);
        self.inner
            .render_requests
            .set(self.inner.render_requests.get() + 1);
        trace!(requests = self.inner.render_requests.get(), "map render requested");
    }

    /// Whether a render was requested since the last composed frame
    pub fn is_render_pending(&self) -> bool {
        self.inner.render_pending.get()
    }

    /// Total number of render requests received
    pub fn render_requests(&self) -> u64 {
        self.inner.render_requests.get()
    }

    // =========================================================================
    // MANAGED LAYERS
    // =========================================================================

    /// Add a layer to the managed collection, on top of the existing ones
    ///
    /// Returns `false` if the layer is already in the collection.
    pub fn add_layer(&self, layer: &Layer) -> bool {
        if self.contains_layer(layer) {
            warn!(layer = %layer.id(), "layer already in map collection");
            return false;
        }

        let weak = self.downgrade();
        let handle = layer.watch(move |event| {
            if *event == LayerEvent::Change {
                if let Some(map) = weak.upgrade() {
                    map.render();
                }
            }
        });
        self.inner
            .layer_listeners
            .borrow_mut()
            .insert(layer.id(), handle);
        self.inner.layers.borrow_mut().push(layer.clone());

        debug!(layer = %layer.id(), "added managed layer");
        self.render();
        true
    }

    /// Remove a layer from the managed collection
    pub fn remove_layer(&self, layer: &Layer) -> bool {
        let removed = {
            let mut layers = self.inner.layers.borrow_mut();
            let before = layers.len();
            layers.retain(|l| !l.ptr_eq(layer));
            layers.len() != before
        };
        if !removed {
            return false;
        }

        let handle = self.inner.layer_listeners.borrow_mut().remove(&layer.id());
        if let Some(handle) = handle {
            handle.cancel();
        }
        layer.unrender();

        debug!(layer = %layer.id(), "removed managed layer");
        self.render();
        true
    }

    pub fn contains_layer(&self, layer: &Layer) -> bool {
        self.inner.layers.borrow().iter().any(|l| l.ptr_eq(layer))
    }

    /// Managed layers, bottom first
    pub fn layers(&self) -> Vec<Layer> {
        self.inner.layers.borrow().clone()
    }

    // =========================================================================
    // FRAME COMPOSITION
    // =========================================================================

    /// Compose one frame for `view_state`
    ///
    /// Managed layer states are collected first, then precompose listeners
    /// (unmanaged layers) append theirs, then everything is sorted by
    /// z-index. Layers out of view or with a loading/failed source are
    /// skipped and told so via [`Layer::unrender`]; the others render with
    /// the previous layer's surface as target.
    pub fn render_frame(&self, view_state: ViewState, size: [u32; 2]) -> Frame {
        let index = self.inner.next_frame_index.get();
        self.inner.next_frame_index.set(index + 1);
        self.inner.render_pending.set(false);

        let mut frame_state =
            FrameState::new(index, view_state, size).with_pixel_ratio(self.inner.pixel_ratio.get());

        let managed: Vec<_> = self
            .layers()
            .iter()
            .map(|layer| layer.layer_state(true))
            .collect();
        frame_state.layer_states = managed;
        self.inner.precompose.dispatch(&mut frame_state);
        sort_by_z_index(&mut frame_state.layer_states);

        let layers: Vec<Layer> = frame_state
            .layer_states
            .iter()
            .map(|state| state.layer.clone())
            .collect();

        let mut surfaces: Vec<Surface> = Vec::new();
        for (layer_index, layer) in layers.iter().enumerate() {
            frame_state.layer_index = layer_index;
            let state = &frame_state.layer_states[layer_index];

            if !in_view(state, &frame_state.view_state) || !state.source_state.is_renderable() {
                trace!(layer = %layer.id(), source_state = %state.source_state, "layer skipped");
                layer.unrender();
                continue;
            }

            let Some(surface) = layer.render(&frame_state, surfaces.last()) else {
                continue;
            };
            match surfaces.last_mut() {
                Some(last) if last.id == surface.id => *last = surface,
                _ => surfaces.push(surface),
            }
        }

        for layer in &layers {
            if layer.rendered() {
                layer.render_deferred(&frame_state);
            }
        }

        debug!(
            frame = index,
            layers = layers.len(),
            surfaces = surfaces.len(),
            "composed frame"
        );

        Frame {
            state: frame_state,
            surfaces,
        }
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("layers", &self.inner.layers.borrow().len())
            .field("precompose", &self.inner.precompose)
            .field("render_pending", &self.inner.render_pending.get())
            .field("render_requests", &self.inner.render_requests.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerOptions;
    use crate::properties::LayerProperties;
    use crate::renderer::LayerRenderer;
    use crate::source::{Source, SourceState};

    /// Draws into the target when compatible and logs what it drew
    struct LoggingRenderer {
        layer: LayerId,
        class_name: String,
        drawn: Rc<RefCell<Vec<LayerId>>>,
    }

    impl LayerRenderer for LoggingRenderer {
        fn prepare_frame(&mut self, _frame_state: &FrameState) -> bool {
            true
        }

        fn render_frame(
            &mut self,
            frame_state: &FrameState,
            target: Option<&Surface>,
        ) -> Option<Surface> {
            self.drawn.borrow_mut().push(self.layer);
            let mut surface = Surface::reuse_or_create(
                target,
                &self.class_name,
                frame_state.size,
                frame_state.index,
            );
            surface.draw_layer(self.layer);
            Some(surface)
        }
    }

    fn logging_layer(properties: LayerProperties, drawn: &Rc<RefCell<Vec<LayerId>>>) -> Layer {
        let drawn = drawn.clone();
        Layer::new(
            LayerOptions::new()
                .with_properties(properties)
                .with_renderer_factory(move |layer| {
                    Some(Box::new(LoggingRenderer {
                        layer: layer.id(),
                        class_name: layer.class_name(),
                        drawn: drawn.clone(),
                    }) as Box<dyn LayerRenderer>)
                }),
        )
    }

    fn view() -> ViewState {
        ViewState::new([0.0, 0.0], 1.0, 5.0)
    }

    fn count_changes(layer: &Layer) -> (Rc<Cell<u32>>, ListenerHandle) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let handle = layer.listen(move |event| {
            if *event == LayerEvent::Change {
                count_clone.set(count_clone.get() + 1);
            }
        });
        (count, handle)
    }

    #[test]
    fn test_set_map_subscribes_and_requests_render() {
        let map = Map::new();
        let layer = Layer::new(LayerOptions::new());

        layer.set_map(Some(&map));
        assert!(layer.is_attached());
        assert!(layer.map().expect("map").ptr_eq(&map));
        assert_eq!(map.precompose_listener_count(), 1);
        assert!(map.is_render_pending());
        assert_eq!(map.render_requests(), 1);

        layer.changed();
        assert_eq!(map.render_requests(), 2);
    }

    #[test]
    fn test_detach_signals_once_and_releases() {
        let map = Map::new();
        let layer = Layer::new(LayerOptions::new());
        layer.set_map(Some(&map));
        let (changes, _handle) = count_changes(&layer);
        let requests = map.render_requests();

        layer.set_map(None);
        assert_eq!(changes.get(), 1);
        assert!(!layer.is_attached());
        assert!(layer.map().is_none());
        assert_eq!(map.precompose_listener_count(), 0);
        // The detach itself still reaches the old map
        assert_eq!(map.render_requests(), requests + 1);

        layer.changed();
        assert_eq!(map.render_requests(), requests + 1);
    }

    #[test]
    fn test_detach_without_map_still_signals() {
        let layer = Layer::new(LayerOptions::new());
        let (changes, _handle) = count_changes(&layer);

        layer.set_map(None);
        layer.set_map(None);
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn test_only_latest_map_receives_events() {
        let first = Map::new();
        let second = Map::new();
        let layer = Layer::new(LayerOptions::new());

        layer.set_map(Some(&first));
        layer.set_map(None);
        layer.set_map(Some(&second));
        let first_requests = first.render_requests();
        let second_requests = second.render_requests();

        layer.changed();
        assert_eq!(first.render_requests(), first_requests);
        assert_eq!(second.render_requests(), second_requests + 1);
        assert_eq!(first.precompose_listener_count(), 0);
        assert_eq!(second.precompose_listener_count(), 1);

        let frame = first.render_frame(view(), [64, 64]);
        assert!(frame.state.layer_states.is_empty());
    }

    #[test]
    fn test_switching_maps_directly() {
        let first = Map::new();
        let second = Map::new();
        let layer = Layer::new(LayerOptions::new());

        layer.set_map(Some(&first));
        let first_requests = first.render_requests();
        layer.set_map(Some(&second));

        assert_eq!(first.render_requests(), first_requests);
        assert_eq!(first.precompose_listener_count(), 0);
        assert_eq!(second.precompose_listener_count(), 1);
    }

    #[test]
    fn test_source_change_reaches_map() {
        let map = Map::new();
        let source = Source::new(SourceState::Loading);
        let layer = Layer::new(LayerOptions::new().with_source(source.clone()).with_map(&map));
        let requests = map.render_requests();

        source.set_state(SourceState::Ready);
        assert_eq!(map.render_requests(), requests + 1);
        drop(layer);
    }

    #[test]
    fn test_unmanaged_layer_joins_frame() {
        let map = Map::new();
        let layer = Layer::new(LayerOptions::new());
        layer.set_map(Some(&map));

        let frame = map.render_frame(view(), [64, 64]);
        assert_eq!(frame.state.layer_states.len(), 1);
        let state = &frame.state.layer_states[0];
        assert_eq!(state.layer, layer);
        assert!(!state.managed);
        assert_eq!(state.z_index, f64::INFINITY);
        assert!(!map.is_render_pending());
    }

    #[test]
    fn test_duplicate_precompose_state_is_ignored() {
        let map = Map::new();
        let layer = Layer::new(LayerOptions::new());
        map.add_layer(&layer);
        layer.set_map(Some(&map));

        let frame = map.render_frame(view(), [64, 64]);
        assert_eq!(frame.state.layer_states.len(), 1);
        assert!(frame.state.layer_states[0].managed);
    }

    #[test]
    fn test_managed_layers_request_renders() {
        let map = Map::new();
        let layer = Layer::new(LayerOptions::new());

        assert!(map.add_layer(&layer));
        assert!(!map.add_layer(&layer));
        let requests = map.render_requests();

        layer.set_opacity(0.3);
        assert_eq!(map.render_requests(), requests + 1);

        assert!(map.remove_layer(&layer));
        let requests = map.render_requests();
        layer.changed();
        assert_eq!(map.render_requests(), requests);
        assert!(!map.remove_layer(&layer));
    }

    #[test]
    fn test_render_frame_orders_and_shares_surfaces() {
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let map = Map::new();
        let top = logging_layer(LayerProperties::new().with_z_index(10.0), &drawn);
        let bottom = logging_layer(LayerProperties::new(), &drawn);
        let labels = logging_layer(
            LayerProperties::new()
                .with_z_index(20.0)
                .with_class_name("labels"),
            &drawn,
        );
        map.add_layer(&top);
        map.add_layer(&labels);
        map.add_layer(&bottom);

        let frame = map.render_frame(view(), [64, 64]);
        assert_eq!(*drawn.borrow(), vec![bottom.id(), top.id(), labels.id()]);
        assert_eq!(frame.surfaces.len(), 2);
        assert_eq!(
            frame.surfaces[0].layers.as_slice(),
            &[bottom.id(), top.id()]
        );
        assert_eq!(frame.surfaces[1].class_name, "labels");
        assert_eq!(frame.drawn_layers(), 3);
    }

    #[test]
    fn test_render_frame_skips_hidden_and_loading() {
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let map = Map::new();
        let visible = logging_layer(LayerProperties::new(), &drawn);
        let hidden = logging_layer(LayerProperties::new().hidden(), &drawn);
        let out_of_range = logging_layer(
            LayerProperties::new().with_resolution_range(2.0, 4.0),
            &drawn,
        );
        let loading = logging_layer(LayerProperties::new(), &drawn);
        let source = Source::new(SourceState::Loading);
        loading.set_source(Some(source.clone()));

        for layer in [&visible, &hidden, &out_of_range, &loading] {
            map.add_layer(layer);
        }

        map.render_frame(view(), [64, 64]);
        assert_eq!(*drawn.borrow(), vec![visible.id()]);
        assert!(visible.rendered());
        assert!(!loading.rendered());
        assert!(!loading.has_renderer());

        source.set_state(SourceState::Ready);
        map.render_frame(view(), [64, 64]);
        assert_eq!(*drawn.borrow(), vec![visible.id(), visible.id(), loading.id()]);
    }

    #[test]
    fn test_skipped_layer_is_unrendered() {
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let map = Map::new();
        let layer = logging_layer(LayerProperties::new(), &drawn);
        map.add_layer(&layer);

        map.render_frame(view(), [64, 64]);
        assert!(layer.rendered());

        layer.set_visible(false);
        map.render_frame(view(), [64, 64]);
        assert!(!layer.rendered());
    }

    #[test]
    fn test_remove_layer_clears_rendered() {
        let drawn = Rc::new(RefCell::new(Vec::new()));
        let map = Map::new();
        let layer = logging_layer(LayerProperties::new(), &drawn);
        map.add_layer(&layer);

        map.render_frame(view(), [64, 64]);
        assert!(layer.rendered());

        map.remove_layer(&layer);
        assert!(!layer.rendered());
    }

    #[test]
    fn test_set_map_from_change_listener() {
        let first = Map::new();
        let second = Map::new();
        let layer = Layer::new(LayerOptions::new());
        layer.set_map(Some(&first));

        let redirected = Rc::new(Cell::new(false));
        let redirected_clone = redirected.clone();
        let weak = layer.downgrade();
        let target = second.clone();
        let _handle = layer.listen(move |event| {
            if *event == LayerEvent::Change && !redirected_clone.get() {
                redirected_clone.set(true);
                if let Some(layer) = weak.upgrade() {
                    layer.set_map(Some(&target));
                }
            }
        });

        layer.set_map(None);
        assert!(redirected.get());
        assert!(layer.is_attached());
        assert!(layer.map().expect("map").ptr_eq(&second));
        assert_eq!(first.precompose_listener_count(), 0);
        assert_eq!(second.precompose_listener_count(), 1);

        let first_requests = first.render_requests();
        let second_requests = second.render_requests();
        layer.changed();
        assert_eq!(first.render_requests(), first_requests);
        assert_eq!(second.render_requests(), second_requests + 1);
    }

    #[test]
    fn test_frame_indices_increase() {
        let map = Map::new().with_pixel_ratio(2.0);
        let first = map.render_frame(view(), [64, 64]);
        let second = map.render_frame(view(), [64, 64]);

        assert_eq!(first.state.index, 0);
        assert_eq!(second.state.index, 1);
        assert_eq!(second.state.pixel_ratio, 2.0);
    }

    #[test]
    fn test_dropping_map_releases_layer_listeners() {
        let layer = Layer::new(LayerOptions::new());
        let map = Map::new();
        map.add_layer(&layer);
        drop(map);

        let (changes, _handle) = count_changes(&layer);
        layer.changed();
        assert_eq!(changes.get(), 1);
    }
}

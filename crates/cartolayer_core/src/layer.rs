//! Map layers
//!
//! A [`Layer`] binds a data [`Source`] to something drawn on the map. It
//!
//! - relays its source's change notifications as its own change events,
//! - attaches to a [`Map`] either as a managed layer (in the map's layer
//!   collection) or directly through [`Layer::set_map`],
//! - computes a fresh [`LayerState`] snapshot whenever the frame pipeline asks,
//! - lazily creates and owns the [`LayerRenderer`] that draws it.
//!
//! Every change that should lead to a new frame ends in [`Layer::changed`],
//! which emits [`LayerEvent::Change`]. Maps listen for exactly that event to
//! schedule rendering.
//!
//! # Example
//!
//! ```rust
//! use cartolayer_core::{Layer, LayerOptions, Map, Source, SourceState};
//!
//! let map = Map::new();
//! let source = Source::new(SourceState::Loading);
//! let layer = Layer::new(LayerOptions::new().with_source(source.clone()));
//!
//! layer.set_map(Some(&map));
//! assert!(map.is_render_pending());
//!
//! source.set_state(SourceState::Ready);
//! assert_eq!(layer.source_state(), SourceState::Ready);
//! ```

use crate::events::{self, EventTarget, ListenerHandle};
use crate::frame::FrameState;
use crate::geom::Extent;
use crate::map::{Map, WeakMap};
use crate::properties::{replace_if_changed, round_opacity, LayerProperties, LayerProperty};
use crate::renderer::{LayerRenderer, RendererFactory, SharedRenderer, Surface};
use crate::source::{Source, SourceState};
use crate::state::LayerState;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers & Events
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Events emitted by a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerEvent {
    /// The layer needs to be redrawn
    Change,
    /// A typed property changed value
    PropertyChange(LayerProperty),
    /// The bound source reached `Ready` for the first time since binding
    SourceReady,
}

// ─────────────────────────────────────────────────────────────────────────────
// Construction Options
// ─────────────────────────────────────────────────────────────────────────────

/// Render function replacing the renderer-delegating path
pub type CustomRender = Box<dyn Fn(&FrameState, Option<&Surface>) -> Option<Surface>>;

/// How [`Layer::render`] produces output, chosen once at construction
#[derive(Default)]
pub enum RenderStrategy {
    /// Delegate to the lazily created [`LayerRenderer`]
    #[default]
    Default,
    /// Call the supplied function; no renderer is ever created
    Custom(CustomRender),
}

impl fmt::Debug for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStrategy::Default => f.write_str("Default"),
            RenderStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for [`Layer::new`]
#[derive(Default)]
pub struct LayerOptions {
    pub properties: LayerProperties,
    pub source: Option<Source>,
    /// Map to attach to directly (unmanaged)
    pub map: Option<Map>,
    pub render: RenderStrategy,
    /// Builds the renderer for this layer kind
    pub renderer_factory: Option<RendererFactory>,
}

impl LayerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(mut self, properties: LayerProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_map(mut self, map: &Map) -> Self {
        self.map = Some(map.clone());
        self
    }

    pub fn with_render<F>(mut self, render: F) -> Self
    where
        F: Fn(&FrameState, Option<&Surface>) -> Option<Surface> + 'static,
    {
        self.render = RenderStrategy::Custom(Box::new(render));
        self
    }

    pub fn with_renderer_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Layer) -> Option<Box<dyn LayerRenderer>> + 'static,
    {
        self.renderer_factory = Some(Box::new(factory));
        self
    }
}

impl fmt::Debug for LayerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerOptions")
            .field("properties", &self.properties)
            .field("source", &self.source)
            .field("map", &self.map)
            .field("render", &self.render)
            .field("renderer_factory", &self.renderer_factory.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layer
// ─────────────────────────────────────────────────────────────────────────────

struct LayerInner {
    id: LayerId,
    properties: RefCell<LayerProperties>,
    events: EventTarget<LayerEvent>,
    /// Crate-internal listeners (map render forwarding); never see `SourceReady`
    hooks: EventTarget<LayerEvent>,
    revision: Cell<u64>,

    source: RefCell<Option<Source>>,
    /// Zero or one live subscription to the current source
    source_change_key: RefCell<Option<ListenerHandle>>,
    /// Whether `SourceReady` was already delivered for the current source
    source_ready: Cell<bool>,

    map: RefCell<Option<WeakMap>>,
    map_precompose_key: RefCell<Option<ListenerHandle>>,
    map_render_key: RefCell<Option<ListenerHandle>>,

    render_strategy: RenderStrategy,
    renderer_factory: Option<RendererFactory>,
    renderer: RefCell<Option<SharedRenderer>>,
    rendered: Cell<bool>,
}

impl LayerInner {
    /// Drop every subscription and the renderer without emitting events
    fn teardown(&self) {
        events::unlisten(&mut self.source_change_key.borrow_mut());
        events::unlisten(&mut self.map_precompose_key.borrow_mut());
        events::unlisten(&mut self.map_render_key.borrow_mut());
        self.source.borrow_mut().take();
        self.map.borrow_mut().take();

        let renderer = self.renderer.borrow_mut().take();
        if let Some(renderer) = renderer {
            let borrowed = renderer.try_borrow_mut();
            if let Ok(mut renderer) = borrowed {
                renderer.dispose();
            }
        }
    }
}

impl Drop for LayerInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Shared handle to a map layer (cheap to clone)
#[derive(Clone)]
pub struct Layer {
    inner: Rc<LayerInner>,
}

/// Non-owning layer handle, used by listeners so they don't keep layers alive
#[derive(Clone, Debug)]
pub struct WeakLayer {
    inner: Weak<LayerInner>,
}

impl WeakLayer {
    pub fn upgrade(&self) -> Option<Layer> {
        self.inner.upgrade().map(|inner| Layer { inner })
    }
}

impl Layer {
    /// Create a layer
    ///
    /// The initial source goes through the same rebinding path as
    /// [`set_source`](Self::set_source), so a freshly built layer is already
    /// subscribed to its source. An initial map is attached unmanaged.
    pub fn new(options: LayerOptions) -> Self {
        let LayerOptions {
            properties,
            source,
            map,
            render,
            renderer_factory,
        } = options;

        let layer = Self {
            inner: Rc::new(LayerInner {
                id: LayerId(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed)),
                properties: RefCell::new(properties),
                events: EventTarget::new(),
                hooks: EventTarget::new(),
                revision: Cell::new(0),
                source: RefCell::new(None),
                source_change_key: RefCell::new(None),
                source_ready: Cell::new(false),
                map: RefCell::new(None),
                map_precompose_key: RefCell::new(None),
                map_render_key: RefCell::new(None),
                render_strategy: render,
                renderer_factory,
                renderer: RefCell::new(None),
                rendered: Cell::new(false),
            }),
        };

        layer.replace_source(source);
        if let Some(map) = map {
            layer.set_map(Some(&map));
        }
        layer
    }

    pub fn id(&self) -> LayerId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakLayer {
        WeakLayer {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same layer
    pub fn ptr_eq(&self, other: &Layer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Listen to this layer's events
    ///
    /// If the source became ready while nobody was listening (typically a
    /// layer built with a ready source), `SourceReady` is delivered right
    /// away to the first listener.
    #[must_use = "dropping the handle leaves the listener registered with no way to cancel it"]
    pub fn listen<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&LayerEvent) + 'static,
    {
        let handle = self.inner.events.listen(move |event| listener(event));
        self.check_source_ready();
        handle
    }

    /// Listen for internal bookkeeping; does not flush a pending `SourceReady`
    pub(crate) fn watch<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&LayerEvent) + 'static,
    {
        self.inner.hooks.listen(move |event| listener(event))
    }

    /// Mark the layer dirty
    ///
    /// Bumps the revision and emits [`LayerEvent::Change`].
    pub fn changed(&self) {
        self.inner.revision.set(self.inner.revision.get() + 1);
        self.emit(LayerEvent::Change);
    }

    fn emit(&self, event: LayerEvent) {
        self.inner.events.notify(event);
        self.inner.hooks.notify(event);
    }

    /// Number of change notifications emitted so far
    pub fn revision(&self) -> u64 {
        self.inner.revision.get()
    }

    // =========================================================================
    // SOURCE
    // =========================================================================

    pub fn source(&self) -> Option<Source> {
        self.inner.source.borrow().clone()
    }

    /// State of the current source, `Undefined` when there is none
    pub fn source_state(&self) -> SourceState {
        self.inner
            .source
            .borrow()
            .as_ref()
            .map(Source::state)
            .unwrap_or(SourceState::Undefined)
    }

    /// Replace the observed source
    ///
    /// Setting the source the layer already has is a no-op. Otherwise the old
    /// subscription is cancelled before the new one is made, the layer is
    /// marked dirty (also when the new source is `None`), and
    /// `PropertyChange(Source)` is emitted.
    pub fn set_source(&self, source: Option<Source>) {
        let unchanged = match (self.inner.source.borrow().as_ref(), source.as_ref()) {
            (Some(current), Some(new)) => current.ptr_eq(new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        self.replace_source(source);
        self.emit(LayerEvent::PropertyChange(LayerProperty::Source));
    }

    fn replace_source(&self, source: Option<Source>) {
        *self.inner.source.borrow_mut() = source;
        self.handle_source_property_change();
    }

    fn handle_source_property_change(&self) {
        if events::unlisten(&mut self.inner.source_change_key.borrow_mut()) {
            trace!(layer = %self.id(), "released previous source subscription");
        }
        self.inner.source_ready.set(false);

        if let Some(source) = self.source() {
            let weak = self.downgrade();
            let handle = source.listen(move |_| {
                if let Some(layer) = weak.upgrade() {
                    layer.handle_source_change();
                }
            });
            *self.inner.source_change_key.borrow_mut() = Some(handle);
            debug!(layer = %self.id(), source = %source.id(), state = %source.state(), "bound layer source");
        } else {
            debug!(layer = %self.id(), "cleared layer source");
        }

        self.changed();
        self.check_source_ready();
    }

    fn handle_source_change(&self) {
        self.changed();
        self.check_source_ready();
    }

    /// Emit `SourceReady` once per bound source, held back until someone listens
    fn check_source_ready(&self) {
        if self.inner.source_ready.get() || !self.is_source_ready() {
            return;
        }
        if !self.inner.events.has_listeners() {
            trace!(layer = %self.id(), "source ready, waiting for a listener");
            return;
        }
        self.inner.source_ready.set(true);
        self.inner.events.notify(LayerEvent::SourceReady);
    }

    /// Whether the current source is `Ready`
    pub fn is_source_ready(&self) -> bool {
        self.source_state() == SourceState::Ready
    }

    // =========================================================================
    // MAP ATTACHMENT
    // =========================================================================

    /// Attach the layer directly to `map`, or detach it with `None`
    ///
    /// A directly attached layer is unmanaged: it is not part of the map's
    /// layer collection and joins each frame by appending its state during
    /// the map's precompose event. Its change events request map renders.
    ///
    /// Detaching always marks the layer dirty, even if it was not attached.
    /// Listeners may call `set_map` again while handling that change.
    pub fn set_map(&self, map: Option<&Map>) {
        let precompose = self.inner.map_precompose_key.borrow_mut().take();
        let render = self.inner.map_render_key.borrow_mut().take();
        if let Some(handle) = precompose {
            handle.cancel();
        }
        *self.inner.map.borrow_mut() = map.map(Map::downgrade);

        let Some(map) = map else {
            // The old map still hears about the detach
            self.changed();
            if let Some(handle) = render {
                handle.cancel();
            }
            debug!(layer = %self.id(), "detached layer from map");
            return;
        };
        if let Some(handle) = render {
            handle.cancel();
        }

        let weak = self.downgrade();
        let precompose = map.on_precompose(move |frame_state| {
            if let Some(layer) = weak.upgrade() {
                layer.append_unmanaged_state(frame_state);
            }
        });
        *self.inner.map_precompose_key.borrow_mut() = Some(precompose);

        let weak_map = map.downgrade();
        let render = self.watch(move |event| {
            if *event == LayerEvent::Change {
                if let Some(map) = weak_map.upgrade() {
                    map.render();
                }
            }
        });
        *self.inner.map_render_key.borrow_mut() = Some(render);

        debug!(layer = %self.id(), "attached layer to map");
        self.changed();
    }

    /// The map this layer is directly attached to
    pub fn map(&self) -> Option<Map> {
        self.inner.map.borrow().as_ref().and_then(WeakMap::upgrade)
    }

    /// Whether the layer currently listens to a map
    pub fn is_attached(&self) -> bool {
        self.inner.map_precompose_key.borrow().is_some()
    }

    fn append_unmanaged_state(&self, frame_state: &mut FrameState) {
        if frame_state.contains_layer(self) {
            warn!(layer = %self.id(), "layer is already part of this frame; it can only be added to a map once");
            return;
        }
        frame_state.layer_states.push(self.layer_state(false));
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Snapshot of how the frame pipeline should treat this layer
    ///
    /// Unset z-indices resolve to 0 for managed layers and to `+∞` for
    /// unmanaged ones, keeping directly attached layers on top.
    pub fn layer_state(&self, managed: bool) -> LayerState {
        let source_state = self.source_state();
        let props = self.inner.properties.borrow();
        let default_z_index = if managed { 0.0 } else { f64::INFINITY };

        LayerState {
            layer: self.clone(),
            opacity: round_opacity(props.opacity),
            source_state,
            visible: props.visible,
            managed,
            extent: props.extent,
            z_index: props.z_index.unwrap_or(default_z_index),
            min_resolution: props.min_resolution,
            max_resolution: props.max_resolution,
            min_zoom: props.min_zoom,
            max_zoom: props.max_zoom,
        }
    }

    /// Copy of the current property values
    pub fn properties(&self) -> LayerProperties {
        self.inner.properties.borrow().clone()
    }

    pub fn opacity(&self) -> f64 {
        self.inner.properties.borrow().opacity
    }

    pub fn visible(&self) -> bool {
        self.inner.properties.borrow().visible
    }

    pub fn extent(&self) -> Option<Extent> {
        self.inner.properties.borrow().extent
    }

    pub fn z_index(&self) -> Option<f64> {
        self.inner.properties.borrow().z_index
    }

    pub fn min_resolution(&self) -> f64 {
        self.inner.properties.borrow().min_resolution
    }

    pub fn max_resolution(&self) -> f64 {
        self.inner.properties.borrow().max_resolution
    }

    pub fn min_zoom(&self) -> f64 {
        self.inner.properties.borrow().min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.inner.properties.borrow().max_zoom
    }

    pub fn class_name(&self) -> String {
        self.inner.properties.borrow().class_name.clone()
    }

    pub fn set_opacity(&self, opacity: f64) {
        self.update_property(LayerProperty::Opacity, |p| {
            replace_if_changed(&mut p.opacity, opacity)
        });
    }

    pub fn set_visible(&self, visible: bool) {
        self.update_property(LayerProperty::Visible, |p| {
            replace_if_changed(&mut p.visible, visible)
        });
    }

    pub fn set_extent(&self, extent: Option<Extent>) {
        self.update_property(LayerProperty::Extent, |p| {
            replace_if_changed(&mut p.extent, extent)
        });
    }

    pub fn set_z_index(&self, z_index: Option<f64>) {
        self.update_property(LayerProperty::ZIndex, |p| {
            replace_if_changed(&mut p.z_index, z_index)
        });
    }

    pub fn set_min_resolution(&self, min_resolution: f64) {
        self.update_property(LayerProperty::MinResolution, |p| {
            replace_if_changed(&mut p.min_resolution, min_resolution)
        });
    }

    pub fn set_max_resolution(&self, max_resolution: f64) {
        self.update_property(LayerProperty::MaxResolution, |p| {
            replace_if_changed(&mut p.max_resolution, max_resolution)
        });
    }

    pub fn set_min_zoom(&self, min_zoom: f64) {
        self.update_property(LayerProperty::MinZoom, |p| {
            replace_if_changed(&mut p.min_zoom, min_zoom)
        });
    }

    pub fn set_max_zoom(&self, max_zoom: f64) {
        self.update_property(LayerProperty::MaxZoom, |p| {
            replace_if_changed(&mut p.max_zoom, max_zoom)
        });
    }

    /// Apply `update`; if it reports a change, emit the property event and mark dirty
    fn update_property<F>(&self, property: LayerProperty, update: F)
    where
        F: FnOnce(&mut LayerProperties) -> bool,
    {
        let changed = update(&mut *self.inner.properties.borrow_mut());
        if changed {
            trace!(layer = %self.id(), %property, "layer property changed");
            self.emit(LayerEvent::PropertyChange(property));
            self.changed();
        }
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    /// Draw the layer for `frame_state`
    ///
    /// With the default strategy this prepares the lazily created renderer
    /// and, if it reports ready, returns what it draws. `None` means nothing
    /// to draw this frame, not a failure.
    pub fn render(&self, frame_state: &FrameState, target: Option<&Surface>) -> Option<Surface> {
        match &self.inner.render_strategy {
            RenderStrategy::Custom(render) => render(frame_state, target),
            RenderStrategy::Default => {
                let shared = self.renderer()?;
                let Ok(mut renderer) = shared.try_borrow_mut() else {
                    warn!(layer = %self.id(), "renderer is busy; nested render ignored");
                    return None;
                };
                if !renderer.prepare_frame(frame_state) {
                    trace!(layer = %self.id(), frame = frame_state.index, "renderer not ready");
                    return None;
                }
                self.inner.rendered.set(true);
                renderer.render_frame(frame_state, target)
            }
        }
    }

    /// Run the renderer's deferred pass, if a renderer exists
    pub fn render_deferred(&self, frame_state: &FrameState) {
        let renderer = self.inner.renderer.borrow().clone();
        if let Some(renderer) = renderer {
            let borrowed = renderer.try_borrow_mut();
            match borrowed {
                Ok(mut renderer) => renderer.render_deferred(frame_state),
                Err(_) => warn!(layer = %self.id(), "renderer is busy; deferred pass skipped"),
            }
        }
    }

    /// Whether the layer produced output through its renderer since the last
    /// [`unrender`](Self::unrender)
    pub fn rendered(&self) -> bool {
        self.inner.rendered.get()
    }

    /// Note that the layer was skipped for the current frame
    pub fn unrender(&self) {
        self.inner.rendered.set(false);
    }

    /// The layer's renderer, created on first request
    ///
    /// Later calls return the same instance. If the layer kind has no
    /// renderer nothing is retained and `None` is returned.
    pub fn renderer(&self) -> Option<SharedRenderer> {
        let existing = self.inner.renderer.borrow().clone();
        if existing.is_some() {
            return existing;
        }

        let shared: SharedRenderer = Rc::new(RefCell::new(self.create_renderer()?));
        *self.inner.renderer.borrow_mut() = Some(Rc::clone(&shared));
        debug!(layer = %self.id(), "created layer renderer");
        Some(shared)
    }

    /// Whether a renderer exists, without creating one
    pub fn has_renderer(&self) -> bool {
        self.inner.renderer.borrow().is_some()
    }

    /// Build a new renderer for this layer kind
    ///
    /// Layers without a renderer factory have no renderer.
    pub fn create_renderer(&self) -> Option<Box<dyn LayerRenderer>> {
        self.inner
            .renderer_factory
            .as_ref()
            .and_then(|factory| factory(self))
    }

    /// Dispose and drop the current renderer; the next request creates a new one
    pub fn clear_renderer(&self) {
        let renderer = self.inner.renderer.borrow_mut().take();
        if let Some(renderer) = renderer {
            let borrowed = renderer.try_borrow_mut();
            match borrowed {
                Ok(mut renderer) => renderer.dispose(),
                Err(_) => warn!(layer = %self.id(), "renderer is busy; dropped without dispose"),
            }
            debug!(layer = %self.id(), "cleared layer renderer");
        }
    }

    /// Release subscriptions, the source reference, and the renderer
    ///
    /// Emits no events. Also happens when the last handle is dropped.
    pub fn dispose(&self) {
        self.inner.teardown();
        self.inner.source_ready.set(false);
        self.inner.rendered.set(false);
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.inner.id)
            .field("class_name", &self.inner.properties.borrow().class_name)
            .field("source", &self.inner.source.borrow())
            .field("attached", &self.is_attached())
            .field("has_renderer", &self.has_renderer())
            .finish()
    }
}

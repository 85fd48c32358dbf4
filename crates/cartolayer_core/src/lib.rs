//! Cartolayer Core
//!
//! Per-layer lifecycle and render coordination for map rendering:
//!
//! - **Layers**: bind a data source, relay its changes, attach to a map
//! - **Layer State**: immutable per-frame snapshots and visibility predicates
//! - **Renderers**: lazily created, layer-owned drawing strategies
//! - **Map**: precompose hook, render requests, and frame composition
//! - **Scenes**: TOML scene descriptions for building maps from config
//!
//! Everything here is single-threaded: handles are `Rc`-based and listener
//! closures hold weak references, so subscriptions never keep layers or maps
//! alive.
//!
//! # Example
//!
//! ```rust
//! use cartolayer_core::{
//!     visible_at_resolution, Layer, LayerOptions, LayerProperties, Map, Source, SourceState,
//!     ViewState,
//! };
//!
//! let map = Map::new();
//! let source = Source::new(SourceState::Ready);
//! let layer = Layer::new(
//!     LayerOptions::new()
//!         .with_source(source)
//!         .with_properties(LayerProperties::new().with_resolution_range(0.0, 10.0)),
//! );
//! map.add_layer(&layer);
//!
//! let state = layer.layer_state(true);
//! assert!(visible_at_resolution(&state, 5.0));
//! assert!(!visible_at_resolution(&state, 10.0));
//!
//! let frame = map.render_frame(ViewState::new([0.0, 0.0], 5.0, 3.0), [256, 256]);
//! assert_eq!(frame.state.layer_states.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod geom;
pub mod layer;
pub mod map;
pub mod properties;
pub mod renderer;
pub mod source;
pub mod state;

pub use config::{LayerConfig, SceneConfig, SourceConfig, ViewConfig};
pub use error::{ConfigError, Result};
pub use events::{EventTarget, ListenerHandle, ListenerKey};
pub use frame::{FrameState, ViewState};
pub use geom::Extent;
pub use layer::{
    CustomRender, Layer, LayerEvent, LayerId, LayerOptions, RenderStrategy, WeakLayer,
};
pub use map::{Frame, Map, WeakMap};
pub use properties::{round_opacity, LayerProperties, LayerProperty, DEFAULT_CLASS_NAME};
pub use renderer::{LayerRenderer, RendererFactory, SharedRenderer, Surface, SurfaceId};
pub use source::{Source, SourceEvent, SourceId, SourceState};
pub use state::{in_view, sort_by_z_index, visible_at_resolution, LayerState};

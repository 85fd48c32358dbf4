//! Typed layer properties
//!
//! The observable values every layer carries. A [`Layer`](crate::Layer) keeps
//! one [`LayerProperties`] and exposes a setter per field; each setter that
//! changes a value emits `LayerEvent::PropertyChange` with the matching
//! [`LayerProperty`] and then marks the layer dirty.

use crate::geom::Extent;
use std::fmt;

/// Default class name for layer surfaces
pub const DEFAULT_CLASS_NAME: &str = "map-layer";

/// Names of the observable layer properties
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerProperty {
    Opacity,
    Visible,
    Extent,
    ZIndex,
    MinResolution,
    MaxResolution,
    MinZoom,
    MaxZoom,
    Source,
}

impl fmt::Display for LayerProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerProperty::Opacity => "opacity",
            LayerProperty::Visible => "visible",
            LayerProperty::Extent => "extent",
            LayerProperty::ZIndex => "zIndex",
            LayerProperty::MinResolution => "minResolution",
            LayerProperty::MaxResolution => "maxResolution",
            LayerProperty::MinZoom => "minZoom",
            LayerProperty::MaxZoom => "maxZoom",
            LayerProperty::Source => "source",
        };
        f.write_str(name)
    }
}

/// Visual properties common to all layers
#[derive(Clone, Debug, PartialEq)]
pub struct LayerProperties {
    /// Opacity in `0..=1`; rounded and clamped when read into a layer state
    pub opacity: f64,

    /// Visibility (the layer is skipped entirely when false)
    pub visible: bool,

    /// Bounds outside of which nothing is drawn
    pub extent: Option<Extent>,

    /// Explicit stacking order. When unset, managed layers sort at 0 and
    /// unmanaged layers on top.
    pub z_index: Option<f64>,

    /// Inclusive lower resolution bound
    pub min_resolution: f64,

    /// Exclusive upper resolution bound
    pub max_resolution: f64,

    /// Exclusive lower zoom bound
    pub min_zoom: f64,

    /// Inclusive upper zoom bound
    pub max_zoom: f64,

    /// Class name given to the surfaces this layer draws into
    pub class_name: String,
}

impl LayerProperties {
    pub fn new() -> Self {
        Self {
            opacity: 1.0,
            visible: true,
            extent: None,
            z_index: None,
            min_resolution: 0.0,
            max_resolution: f64::INFINITY,
            min_zoom: f64::NEG_INFINITY,
            max_zoom: f64::INFINITY,
            class_name: DEFAULT_CLASS_NAME.to_string(),
        }
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_z_index(mut self, z_index: f64) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn with_resolution_range(mut self, min: f64, max: f64) -> Self {
        self.min_resolution = min;
        self.max_resolution = max;
        self
    }

    pub fn with_zoom_range(mut self, min: f64, max: f64) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }
}

impl Default for LayerProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Store `value` in `slot`, reporting whether anything changed
pub(crate) fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Round opacity to two decimals and clamp it into `0..=1`
pub fn round_opacity(opacity: f64) -> f64 {
    ((opacity * 100.0).round() / 100.0).clamp(0.0, 1.0)
}

//! Scene configuration
//!
//! A scene file describes a view, a set of named sources, and the layers that
//! draw them:
//!
//! ```toml
//! [view]
//! center = [0.0, 0.0]
//! resolution = 2.0
//! zoom = 4.0
//! size = [512, 512]
//!
//! [[sources]]
//! name = "roads"
//! state = "loading"
//!
//! [[layers]]
//! source = "roads"
//! opacity = 0.8
//! max_resolution = 10.0
//! ```
//!
//! Layers are listed bottom first. Layers with `managed = false` are attached
//! directly to the map instead of joining its layer collection.

use crate::error::{ConfigError, Result};
use crate::frame::ViewState;
use crate::geom::Extent;
use crate::layer::LayerOptions;
use crate::properties::{LayerProperties, DEFAULT_CLASS_NAME};
use crate::source::{Source, SourceState};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

// =============================================================================
// Scene
// =============================================================================

/// Root of a scene file
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

impl SceneConfig {
    /// Parse and validate a scene from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SceneConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a scene file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            sources = config.sources.len(),
            layers = config.layers.len(),
            "loaded scene"
        );
        Ok(config)
    }

    /// Check cross references and value ranges
    pub fn validate(&self) -> Result<()> {
        self.view.validate()?;

        let mut names = FxHashSet::default();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
        }

        for (index, layer) in self.layers.iter().enumerate() {
            if let Some(name) = &layer.source {
                if !names.contains(name.as_str()) {
                    return Err(ConfigError::UnknownSource {
                        layer: index,
                        source_name: name.clone(),
                    });
                }
            }
            layer.validate(index)?;
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.name == name)
    }
}

// =============================================================================
// View
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
    #[serde(default)]
    pub center: [f64; 2],
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default)]
    pub zoom: f64,
    #[serde(default)]
    pub rotation: f64,
    /// Viewport size in pixels
    #[serde(default = "default_size")]
    pub size: [u32; 2],
}

fn default_resolution() -> f64 {
    1.0
}

fn default_size() -> [u32; 2] {
    [256, 256]
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            resolution: default_resolution(),
            zoom: 0.0,
            rotation: 0.0,
            size: default_size(),
        }
    }
}

impl ViewConfig {
    pub fn view_state(&self) -> ViewState {
        ViewState::new(self.center, self.resolution, self.zoom).with_rotation(self.rotation)
    }

    fn validate(&self) -> Result<()> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(ConfigError::InvalidView(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if self.size[0] == 0 || self.size[1] == 0 {
            return Err(ConfigError::InvalidView(format!(
                "size must be non-zero, got {}x{}",
                self.size[0], self.size[1]
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Sources
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub state: SourceState,
    #[serde(default)]
    pub attributions: Vec<String>,
}

impl SourceConfig {
    pub fn build(&self) -> Source {
        Source::new(self.state).with_attributions(self.attributions.iter().cloned())
    }
}

// =============================================================================
// Layers
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayerConfig {
    /// Name of the source this layer draws
    #[serde(default)]
    pub source: Option<String>,
    /// Join the map's layer collection (`true`) or attach directly
    #[serde(default = "default_true")]
    pub managed: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub extent: Option<Extent>,
    #[serde(default)]
    pub z_index: Option<f64>,
    #[serde(default)]
    pub min_resolution: f64,
    #[serde(default = "default_infinity")]
    pub max_resolution: f64,
    #[serde(default = "default_neg_infinity")]
    pub min_zoom: f64,
    #[serde(default = "default_infinity")]
    pub max_zoom: f64,
    #[serde(default = "default_class_name")]
    pub class_name: String,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

fn default_infinity() -> f64 {
    f64::INFINITY
}

fn default_neg_infinity() -> f64 {
    f64::NEG_INFINITY
}

fn default_class_name() -> String {
    DEFAULT_CLASS_NAME.to_string()
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            source: None,
            managed: true,
            opacity: default_opacity(),
            visible: true,
            extent: None,
            z_index: None,
            min_resolution: 0.0,
            max_resolution: default_infinity(),
            min_zoom: default_neg_infinity(),
            max_zoom: default_infinity(),
            class_name: default_class_name(),
        }
    }
}

impl LayerConfig {
    pub fn properties(&self) -> LayerProperties {
        LayerProperties {
            opacity: self.opacity,
            visible: self.visible,
            extent: self.extent,
            z_index: self.z_index,
            min_resolution: self.min_resolution,
            max_resolution: self.max_resolution,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            class_name: self.class_name.clone(),
        }
    }

    /// Layer options for this entry, bound to `source`
    pub fn options(&self, source: Option<Source>) -> LayerOptions {
        let options = LayerOptions::new().with_properties(self.properties());
        match source {
            Some(source) => options.with_source(source),
            None => options,
        }
    }

    fn validate(&self, layer: usize) -> Result<()> {
        let invalid = |field, value| ConfigError::InvalidValue {
            layer,
            field,
            value,
        };

        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(invalid("opacity", self.opacity));
        }
        if self.z_index.is_some_and(f64::is_nan) {
            return Err(invalid("z_index", f64::NAN));
        }
        if self.min_resolution.is_nan() || self.min_resolution > self.max_resolution {
            return Err(invalid("min_resolution", self.min_resolution));
        }
        if self.max_resolution.is_nan() {
            return Err(invalid("max_resolution", self.max_resolution));
        }
        if self.min_zoom.is_nan() || self.min_zoom > self.max_zoom {
            return Err(invalid("min_zoom", self.min_zoom));
        }
        if self.max_zoom.is_nan() {
            return Err(invalid("max_zoom", self.max_zoom));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"
        [view]
        center = [100.0, -50.0]
        resolution = 2.0
        zoom = 4.0
        size = [512, 256]

        [[sources]]
        name = "roads"
        state = "loading"
        attributions = ["© Roads"]

        [[sources]]
        name = "labels"
        state = "ready"

        [[layers]]
        source = "roads"
        opacity = 0.8
        max_resolution = 10.0
        extent = [0.0, 0.0, 1000.0, 1000.0]

        [[layers]]
        source = "labels"
        managed = false
        class_name = "labels"
        min_zoom = 2.0
    "#;

    #[test]
    fn test_parse_scene() {
        let scene = SceneConfig::from_toml_str(SCENE).unwrap();

        assert_eq!(scene.view.center, [100.0, -50.0]);
        assert_eq!(scene.view.size, [512, 256]);
        assert_eq!(scene.sources.len(), 2);
        assert_eq!(scene.sources[0].state, SourceState::Loading);
        assert_eq!(scene.sources[0].attributions, vec!["© Roads".to_string()]);
        assert_eq!(scene.source("labels").map(|s| s.state), Some(SourceState::Ready));

        let roads = &scene.layers[0];
        assert!(roads.managed);
        assert_eq!(roads.extent, Some(Extent::new(0.0, 0.0, 1000.0, 1000.0)));
        assert_eq!(roads.max_resolution, 10.0);
        assert_eq!(roads.min_zoom, f64::NEG_INFINITY);

        let labels = &scene.layers[1];
        assert!(!labels.managed);
        assert_eq!(labels.class_name, "labels");
        assert_eq!(labels.max_zoom, f64::INFINITY);
    }

    #[test]
    fn test_defaults_match_layer_properties() {
        let scene = SceneConfig::from_toml_str("[[layers]]").unwrap();
        assert_eq!(scene.layers[0].properties(), LayerProperties::new());
        assert_eq!(scene.view.resolution, 1.0);
        assert_eq!(scene.view.size, [256, 256]);
    }

    #[test]
    fn test_unknown_source() {
        let err = SceneConfig::from_toml_str(
            r#"
            [[layers]]
            source = "missing"
            "#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::UnknownSource { layer: 0, ref source_name } if source_name == "missing"
        ));
    }

    #[test]
    fn test_duplicate_source() {
        let err = SceneConfig::from_toml_str(
            r#"
            [[sources]]
            name = "a"
            [[sources]]
            name = "a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSource(name) if name == "a"));
    }

    #[test]
    fn test_invalid_ranges() {
        let opacity = SceneConfig::from_toml_str("[[layers]]\nopacity = 1.5").unwrap_err();
        assert!(matches!(
            opacity,
            ConfigError::InvalidValue { field: "opacity", .. }
        ));

        let resolution = SceneConfig::from_toml_str(
            "[[layers]]\nmin_resolution = 4.0\nmax_resolution = 2.0",
        )
        .unwrap_err();
        assert!(matches!(
            resolution,
            ConfigError::InvalidValue { field: "min_resolution", .. }
        ));

        let view = SceneConfig::from_toml_str("[view]\nresolution = 0.0").unwrap_err();
        assert!(matches!(view, ConfigError::InvalidView(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = SceneConfig::from_toml_str("[[layers]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_layer_options_bind_source() {
        let scene = SceneConfig::from_toml_str(SCENE).unwrap();
        let source = scene.sources[0].build();

        let layer = crate::Layer::new(scene.layers[0].options(Some(source.clone())));
        assert_eq!(layer.source(), Some(source.clone()));
        assert_eq!(layer.opacity(), 0.8);
        assert_eq!(source.attributions(), vec!["© Roads".to_string()]);
    }

    #[test]
    fn test_view_state() {
        let view = ViewConfig {
            rotation: 0.5,
            ..ViewConfig::default()
        };
        let state = view.view_state();
        assert_eq!(state.resolution, 1.0);
        assert_eq!(state.rotation, 0.5);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SceneConfig::load(Path::new("/nonexistent/scene.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

//! Building live maps from scene files

use crate::renderer::OutlineRenderer;
use anyhow::{Context, Result};
use cartolayer_core::{Layer, Map, SceneConfig, Source, SourceState};
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// A map with the sources and layers it was built from
pub struct Scene {
    pub map: Map,
    pub sources: FxHashMap<String, Source>,
    /// Every layer, in file order; unmanaged layers are only kept alive here
    pub layers: Vec<Layer>,
}

impl Scene {
    pub fn build(config: &SceneConfig) -> Result<Self> {
        let map = Map::new();

        let sources: FxHashMap<String, Source> = config
            .sources
            .iter()
            .map(|source| (source.name.clone(), source.build()))
            .collect();

        let mut layers = Vec::with_capacity(config.layers.len());
        for (index, layer_config) in config.layers.iter().enumerate() {
            let source = match &layer_config.source {
                Some(name) => Some(
                    sources
                        .get(name)
                        .cloned()
                        .with_context(|| format!("layer {} refers to unknown source '{}'", index, name))?,
                ),
                None => None,
            };

            let options = layer_config
                .options(source)
                .with_renderer_factory(OutlineRenderer::factory);
            let layer = Layer::new(options);

            if layer_config.managed {
                map.add_layer(&layer);
            } else {
                layer.set_map(Some(&map));
            }
            debug!(layer = %layer.id(), managed = layer_config.managed, "built layer");
            layers.push(layer);
        }

        Ok(Self {
            map,
            sources,
            layers,
        })
    }

    /// Move every loading source to ready; returns how many changed
    pub fn finish_loading(&self) -> usize {
        let mut finished = 0;
        for (name, source) in &self.sources {
            if source.state() == SourceState::Loading {
                source.set_state(SourceState::Ready);
                info!("Source '{}' is ready", name);
                finished += 1;
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"
        [[sources]]
        name = "roads"
        state = "loading"

        [[layers]]
        source = "roads"

        [[layers]]
        managed = false
    "#;

    #[test]
    fn test_build_scene() {
        let config = SceneConfig::from_toml_str(SCENE).unwrap();
        let scene = Scene::build(&config).unwrap();

        assert_eq!(scene.layers.len(), 2);
        assert_eq!(scene.map.layers().len(), 1);
        assert!(scene.layers[1].is_attached());
        assert_eq!(scene.sources["roads"].listener_count(), 1);
    }

    #[test]
    fn test_finish_loading_requests_render() {
        let config = SceneConfig::from_toml_str(SCENE).unwrap();
        let scene = Scene::build(&config).unwrap();
        let requests = scene.map.render_requests();

        assert_eq!(scene.finish_loading(), 1);
        assert_eq!(scene.finish_loading(), 0);
        assert_eq!(scene.map.render_requests(), requests + 1);
    }
}

//! Cartolayer CLI
//!
//! Compose map frames from scene files and report what every layer drew.

use anyhow::{Context, Result};
use cartolayer_core::{visible_at_resolution, SceneConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod renderer;
mod scene;

use scene::Scene;

#[derive(Parser)]
#[command(name = "cartolayer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Map layer composition tool", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose frames for a scene
    Render {
        /// Scene file
        scene: PathBuf,

        /// Number of frames to compose
        #[arg(short, long, default_value = "3")]
        frames: u64,

        /// Mark loading sources ready after this many frames
        #[arg(long)]
        ready_after: Option<u64>,
    },

    /// Validate a scene file
    Check {
        /// Scene file
        scene: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Render {
            scene,
            frames,
            ready_after,
        } => cmd_render(&scene, frames, ready_after),
        Commands::Check { scene } => cmd_check(&scene),
    }
}

fn load_scene(path: &Path) -> Result<SceneConfig> {
    SceneConfig::load(path).with_context(|| format!("Failed to load scene {}", path.display()))
}

fn cmd_render(path: &Path, frames: u64, ready_after: Option<u64>) -> Result<()> {
    let config = load_scene(path)?;
    let scene = Scene::build(&config)?;
    let view_state = config.view.view_state();

    info!(
        "Rendering {} frame(s) of {} ({} layers)",
        frames,
        path.display(),
        scene.layers.len()
    );

    for index in 0..frames {
        if ready_after == Some(index) {
            scene.finish_loading();
        }
        if index > 0 && !scene.map.is_render_pending() {
            info!("Frame {}: nothing changed, skipped", index);
            continue;
        }

        let frame = scene.map.render_frame(view_state, config.view.size);
        info!(
            "Frame {}: {} layer state(s), {} drawn into {} surface(s)",
            frame.state.index,
            frame.state.layer_states.len(),
            frame.drawn_layers(),
            frame.surfaces.len()
        );
        for surface in &frame.surfaces {
            let layers: Vec<String> = surface.layers.iter().map(ToString::to_string).collect();
            info!("  surface '{}': {}", surface.class_name, layers.join(", "));
        }
    }

    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let config = load_scene(path)?;
    let scene = Scene::build(&config)?;
    let resolution = config.view.resolution;

    info!(
        "Scene OK: {} source(s), {} layer(s)",
        config.sources.len(),
        config.layers.len()
    );
    for layer in &scene.layers {
        let state = layer.layer_state(scene.map.contains_layer(layer));
        let visible = visible_at_resolution(&state, resolution);
        info!(
            "  {} source={} managed={} visible at {}: {}",
            layer.id(),
            state.source_state,
            state.managed,
            resolution,
            visible
        );
    }

    let mut attributions: Vec<String> = scene
        .sources
        .values()
        .flat_map(|source| source.attributions())
        .collect();
    attributions.sort();
    attributions.dedup();
    if !attributions.is_empty() {
        info!("Attributions: {}", attributions.join("; "));
    }

    Ok(())
}

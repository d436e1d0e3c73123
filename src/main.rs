mod app;
mod config;
mod error;
mod image_path;
mod literal;
mod logging;
mod overlay;
mod render;
mod session;
mod store;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use eframe::egui;
use tracing::{debug, info};

use crate::config::{Settings, DEFAULT_CONFIG_FILE_PATH};

#[derive(Parser, Clone, Debug)]
#[clap(about = "View and edit JSON image annotations with bounding-box overlays")]
struct Args {
    /// JSON file (an array of objects) to open on startup
    json_file: Option<PathBuf>,

    /// Folder searched by file name when an image path does not exist
    #[clap(long)]
    image_prefix: Option<PathBuf>,

    /// The path to the settings file
    #[clap(long, short('c'), default_value_os = DEFAULT_CONFIG_FILE_PATH)]
    config: PathBuf,
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logs();

    let mut settings = Settings::load_or_default(&args.config);
    if let Some(prefix) = args.image_prefix {
        settings.image_prefix = Some(prefix);
    }
    debug!(?settings, "settings");
    info!(config = %args.config.display(), "starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([settings.window_width, settings.window_height])
            .with_title("Annotation Editor"),
        ..Default::default()
    };

    let config_path = args.config;
    let initial = args.json_file;
    eframe::run_native(
        "Annotation Editor",
        options,
        Box::new(move |_cc| Ok(Box::new(app::EditorApp::new(settings, config_path, initial)))),
    )
    .map_err(|e| anyhow!("Failed to run eframe: {e}"))
}

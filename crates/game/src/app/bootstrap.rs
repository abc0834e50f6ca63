use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;
use worldplay::{
    load_session_config, resolve_config_location, start_session, StartedSession, StartupError,
};

use super::preview_model::PreviewWorldModel;

/// Latent channel count of the bundled preview model.
const PREVIEW_LATENT_CHANNELS: usize = 4;

pub(crate) struct AppWiring {
    pub(crate) started: StartedSession<PreviewWorldModel>,
}

pub(crate) fn build_app(config_override: Option<PathBuf>) -> Result<AppWiring, StartupError> {
    init_tracing();
    info!("=== WorldPlay Game Startup ===");

    let location = resolve_config_location(config_override)?;
    let config = load_session_config(&location)?;
    info!(
        output_dir = %config.output_dir.display(),
        video_height = config.video_size[0],
        video_width = config.video_size[1],
        latent_height = config.latent_size()[0],
        latent_width = config.latent_size()[1],
        fps = config.fps,
        "session_config"
    );

    let model = PreviewWorldModel::new(PREVIEW_LATENT_CHANNELS);
    let started = start_session(&config, model)?;
    Ok(AppWiring { started })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageError;
use thiserror::Error;
use tracing::{info, warn};

mod atomic_io;
pub mod checkpoint;
pub mod session;

pub use checkpoint::{
    load_checkpoint_into, read_checkpoint, reconcile, write_checkpoint, Checkpoint,
    CheckpointEntry, CheckpointError, CheckpointLoadError, LoadOutcome, LoadReport, ParamSet,
    ParameterApplyError, ParameterStore, Tensor, TensorError, EMA_VARIANT,
};
pub use session::{
    encode_actions, load_config, load_reference_clip, parse_symbols, ActionSymbol, ArrowGlyph,
    CommandSource, ConfigError, ControlVector, GeneratedSegment, GeneratorError, LatentFrame,
    LatentState, LineCommandSource, OverlayError, ReferenceClip, ReferenceError, RoundReport,
    SegmentGenerator, Session, SessionConfig, SessionEnd, SessionError, SessionOptions,
    SessionState, StitchError, VideoBuffer,
};

pub const CONFIG_ENV_VAR: &str = "WORLDPLAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "worldplay.json";
pub const FIRST_IMAGE_FILE: &str = "first_image.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Flag,
    Env,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub origin: ConfigOrigin,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create output directory at {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: CheckpointLoadError,
    },
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("failed to save first frame to {path}: {source}")]
    FirstImage {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

/// A ready-to-run session plus what the checkpoint load did to the model.
#[derive(Debug)]
pub struct StartedSession<M> {
    pub session: Session<M>,
    pub load_report: Option<LoadReport>,
}

/// `--config` wins over `WORLDPLAY_CONFIG`, which wins over `worldplay.json`.
pub fn resolve_config_location(
    cli_override: Option<PathBuf>,
) -> Result<ConfigLocation, StartupError> {
    pick_config_location(cli_override, env::var(CONFIG_ENV_VAR))
}

fn pick_config_location(
    cli_override: Option<PathBuf>,
    env_value: Result<String, env::VarError>,
) -> Result<ConfigLocation, StartupError> {
    if let Some(path) = cli_override {
        return Ok(ConfigLocation {
            path,
            origin: ConfigOrigin::Flag,
        });
    }
    match env_value {
        Ok(value) if !value.trim().is_empty() => Ok(ConfigLocation {
            path: PathBuf::from(value),
            origin: ConfigOrigin::Env,
        }),
        Ok(_) | Err(env::VarError::NotPresent) => Ok(ConfigLocation {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            origin: ConfigOrigin::Default,
        }),
        Err(source) => Err(StartupError::EnvVar {
            var: CONFIG_ENV_VAR,
            source,
        }),
    }
}

/// Loads the config at `location`. A missing default file falls back to built-in defaults;
/// an explicitly requested file must exist.
pub fn load_session_config(location: &ConfigLocation) -> Result<SessionConfig, StartupError> {
    if location.origin == ConfigOrigin::Default && !location.path.exists() {
        info!(path = %location.path.display(), "config_defaults_used");
        return Ok(SessionConfig::default());
    }
    info!(path = %location.path.display(), origin = ?location.origin, "config_loading");
    Ok(load_config(&location.path)?)
}

/// Prepares everything a session needs before its first round: output directory,
/// checkpoint weights, the reference clip, and the saved first frame.
pub fn start_session<M>(
    config: &SessionConfig,
    mut model: M,
) -> Result<StartedSession<M>, StartupError>
where
    M: ParameterStore + SegmentGenerator,
{
    fs::create_dir_all(&config.output_dir).map_err(|source| StartupError::CreateOutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let load_report = match &config.checkpoint_path {
        Some(path) => Some(load_checkpoint_into(path, &mut model).map_err(|source| {
            StartupError::Checkpoint {
                path: path.clone(),
                source,
            }
        })?),
        None => {
            warn!("checkpoint_not_configured");
            None
        }
    };

    let clip = load_reference_clip(
        &config.annotation_path,
        &config.video_root,
        config.start_index,
        config.video_size,
    )?;
    save_first_image(&clip, &config.output_dir)?;

    let arrow_glyph = if config.arrow_overlay {
        Some(match &config.arrow_image {
            Some(path) => ArrowGlyph::load(path)?,
            None => ArrowGlyph::procedural(),
        })
    } else {
        None
    };

    let options = SessionOptions {
        output_dir: config.output_dir.clone(),
        fps: config.fps,
        max_rounds: config.max_rounds,
        arrow_glyph,
    };
    Ok(StartedSession {
        session: Session::new(model, clip, options),
        load_report,
    })
}

fn save_first_image(clip: &ReferenceClip, output_dir: &Path) -> Result<(), StartupError> {
    let path = output_dir.join(FIRST_IMAGE_FILE);
    clip.first_frame
        .save(&path)
        .map_err(|source| StartupError::FirstImage {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), "first_image_saved");
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spatial downsampling between pixel frames and latent frames.
pub const LATENT_DOWNSAMPLE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub checkpoint_path: Option<PathBuf>,
    /// Annotation JSON file, or a directory whose first `*.json` (by name) is used.
    pub annotation_path: PathBuf,
    pub video_root: PathBuf,
    pub output_dir: PathBuf,
    /// `[height, width]` of generated frames in pixels.
    pub video_size: [u32; 2],
    pub fps: u32,
    pub start_index: usize,
    pub max_rounds: Option<u32>,
    pub arrow_overlay: bool,
    pub arrow_image: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: None,
            annotation_path: PathBuf::from("languagetable/annotation/val"),
            video_root: PathBuf::from("languagetable"),
            output_dir: PathBuf::from("application/languagetable_game"),
            video_size: [288, 512],
            fps: 4,
            start_index: 0,
            max_rounds: None,
            arrow_overlay: false,
            arrow_image: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path} at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl SessionConfig {
    pub fn latent_size(&self) -> [u32; 2] {
        [
            self.video_size[0] / LATENT_DOWNSAMPLE,
            self.video_size[1] / LATENT_DOWNSAMPLE,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::Invalid {
                field: "fps",
                message: "must be at least 1".to_string(),
            });
        }
        if self
            .video_size
            .iter()
            .any(|&dim| dim == 0 || dim % LATENT_DOWNSAMPLE != 0)
        {
            return Err(ConfigError::Invalid {
                field: "video_size",
                message: format!(
                    "{:?} must be non-zero multiples of {LATENT_DOWNSAMPLE}",
                    self.video_size
                ),
            });
        }
        if self.max_rounds == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_rounds",
                message: "use null for an unbounded session".to_string(),
            });
        }
        Ok(())
    }

    /// Rebases every relative path onto `base`.
    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(path) = self.checkpoint_path.as_mut() {
            rebase(path);
        }
        rebase(&mut self.annotation_path);
        rebase(&mut self.video_root);
        rebase(&mut self.output_dir);
        if let Some(path) = self.arrow_image.as_mut() {
            rebase(path);
        }
        self
    }
}

pub fn parse_config(raw: &str, path: &Path) -> Result<SessionConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SessionConfig>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        ConfigError::Parse {
            path: path.to_path_buf(),
            field,
            source: error.into_inner(),
        }
    })
}

/// Reads, validates, and rebases a JSON config onto the directory that holds it.
pub fn load_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&raw, path)?;
    config.validate()?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(config.resolve_relative_to(base))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = parse_config("{}", Path::new("cfg.json")).expect("parse");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.fps, 4);
        assert_eq!(config.latent_size(), [36, 64]);
    }

    #[test]
    fn parse_error_names_offending_field() {
        let err = parse_config(r#"{"fps": "fast"}"#, Path::new("cfg.json")).expect_err("bad");
        match err {
            ConfigError::Parse { field, .. } => assert_eq!(field, "fps"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(parse_config(r#"{"fsp": 4}"#, Path::new("cfg.json")).is_err());
    }

    #[test]
    fn validate_rejects_non_multiple_of_eight() {
        let config = SessionConfig {
            video_size: [100, 64],
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "video_size",
                ..
            })
        ));
    }

    #[test]
    fn load_config_rebases_relative_paths() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("game.json");
        fs::write(
            &path,
            r#"{"checkpoint_path": "ckpt/model.wpck", "output_dir": "/abs/out", "max_rounds": 2}"#,
        )
        .expect("write");

        let config = load_config(&path).expect("load");

        assert_eq!(
            config.checkpoint_path,
            Some(temp.path().join("ckpt/model.wpck"))
        );
        assert_eq!(config.output_dir, PathBuf::from("/abs/out"));
        assert_eq!(config.video_root, temp.path().join("languagetable"));
        assert_eq!(config.max_rounds, Some(2));
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{ImageError, RgbImage};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::checkpoint::{read_checkpoint, CheckpointError, TensorError};

use super::latent::LatentFrame;

/// Tensor name holding the `[frames, C, h, w]` latent clip.
pub const LATENT_CLIP_KEY: &str = "obs";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Annotation {
    pub latent_video_path: PathBuf,
    pub video_path: PathBuf,
}

/// Starting point of a session: the first pixel frame and its latent.
#[derive(Debug, Clone)]
pub struct ReferenceClip {
    pub first_frame: RgbImage,
    pub first_latent: LatentFrame,
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no *.json annotation found in {dir}")]
    NoAnnotation { dir: PathBuf },
    #[error("failed to parse annotation {path}: {source}")]
    Annotation {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    LatentContainer(#[from] CheckpointError),
    #[error("latent clip {path} has no 'obs' tensor")]
    MissingLatentClip { path: PathBuf },
    #[error("latent clip {path} must be [frames, C, h, w], got {shape:?}")]
    LatentClipShape { path: PathBuf, shape: Vec<usize> },
    #[error("cannot take frame {index} of latent clip {path}: {source}")]
    LatentIndex {
        path: PathBuf,
        index: usize,
        #[source]
        source: TensorError,
    },
    #[error("failed to decode reference video {path}: {source}")]
    Video {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

/// Accepts either an annotation file or a directory of them (first by file name wins).
pub fn resolve_annotation_file(path: &Path) -> Result<PathBuf, ReferenceError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    let entries = fs::read_dir(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let candidate = entry.path();
        let is_json = candidate
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && candidate.is_file() {
            candidates.push(candidate);
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| ReferenceError::NoAnnotation {
            dir: path.to_path_buf(),
        })
}

pub fn read_annotation(path: &Path) -> Result<Annotation, ReferenceError> {
    let raw = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ReferenceError::Annotation {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_latent_frame(path: &Path, index: usize) -> Result<LatentFrame, ReferenceError> {
    let container = read_checkpoint(path)?;
    let clip = container
        .tensor(LATENT_CLIP_KEY)
        .ok_or_else(|| ReferenceError::MissingLatentClip {
            path: path.to_path_buf(),
        })?;
    if clip.shape().len() != 4 {
        return Err(ReferenceError::LatentClipShape {
            path: path.to_path_buf(),
            shape: clip.shape().to_vec(),
        });
    }
    clip.index_leading(index)
        .map(LatentFrame::new)
        .map_err(|source| ReferenceError::LatentIndex {
            path: path.to_path_buf(),
            index,
            source,
        })
}

/// Decodes the first frame of the reference video and normalizes it to `[height, width]` RGB.
pub fn load_first_frame(path: &Path, video_size: [u32; 2]) -> Result<RgbImage, ReferenceError> {
    let decoded = image::open(path).map_err(|source| ReferenceError::Video {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = decoded.to_rgb8();
    let [height, width] = video_size;
    if rgb.dimensions() == (width, height) {
        return Ok(rgb);
    }
    Ok(imageops::resize(&rgb, width, height, FilterType::Triangle))
}

pub fn load_reference_clip(
    annotation_path: &Path,
    video_root: &Path,
    start_index: usize,
    video_size: [u32; 2],
) -> Result<ReferenceClip, ReferenceError> {
    let annotation_file = resolve_annotation_file(annotation_path)?;
    info!(path = %annotation_file.display(), "annotation_reading");
    let annotation = read_annotation(&annotation_file)?;

    let latent_path = video_root.join(&annotation.latent_video_path);
    info!(path = %latent_path.display(), "latent_video_loading");
    let first_latent = load_latent_frame(&latent_path, start_index)?;

    let video_path = video_root.join(&annotation.video_path);
    info!(path = %video_path.display(), "reference_video_loading");
    let first_frame = load_first_frame(&video_path, video_size)?;

    Ok(ReferenceClip {
        first_frame,
        first_latent,
    })
}

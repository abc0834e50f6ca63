use std::path::{Path, PathBuf};

use image::{imageops, ImageError, Rgb, RgbImage};
use thiserror::Error;

use super::input::ActionSymbol;
use super::stitcher::{encode_gif, StitchError};
use crate::atomic_io::write_bytes_atomic;

pub const ARROW_ROW: u32 = 200;
pub const ARROW_COL: u32 = 240;
const DEFAULT_GLYPH_SIZE: u32 = 50;
const ARROW_RED: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("{actions} actions cannot annotate {frames} frames; counts must match")]
    LengthMismatch { actions: usize, frames: usize },
    #[error("failed to load arrow image {path}: {source}")]
    Glyph {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error(transparent)]
    Stitch(#[from] StitchError),
    #[error("failed to write arrow video {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Upward-pointing arrow; other directions are derived by flipping/rotating.
#[derive(Debug, Clone)]
pub struct ArrowGlyph {
    up: RgbImage,
}

impl ArrowGlyph {
    pub fn load(path: &Path) -> Result<Self, OverlayError> {
        let image = image::open(path).map_err(|source| OverlayError::Glyph {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            up: image.to_rgb8(),
        })
    }

    pub fn procedural() -> Self {
        let size = DEFAULT_GLYPH_SIZE;
        let mid = size / 2;
        let head_rows = size / 2;
        let shaft_half = size / 8;
        let up = RgbImage::from_fn(size, size, |x, y| {
            let inside = if y < head_rows {
                x.abs_diff(mid) <= y
            } else {
                x.abs_diff(mid) <= shaft_half
            };
            if inside {
                ARROW_RED
            } else {
                Rgb([0, 0, 0])
            }
        });
        Self { up }
    }

    /// Glyph for `symbol`, or `None` for a no-op.
    pub fn oriented(&self, symbol: ActionSymbol) -> Option<RgbImage> {
        match symbol {
            ActionSymbol::Forward => Some(self.up.clone()),
            ActionSymbol::Backward => Some(imageops::flip_vertical(&self.up)),
            ActionSymbol::Left => Some(imageops::rotate270(&self.up)),
            ActionSymbol::Right => Some(imageops::rotate90(&self.up)),
            ActionSymbol::NoOp => None,
        }
    }
}

/// Copies the glyph's non-black pixels onto `frame` at the arrow anchor, clipped to bounds.
fn stamp(frame: &mut RgbImage, glyph: &RgbImage) {
    let (width, height) = frame.dimensions();
    for (gx, gy, pixel) in glyph.enumerate_pixels() {
        if pixel.0 == [0, 0, 0] {
            continue;
        }
        let x = ARROW_COL + gx;
        let y = ARROW_ROW + gy;
        if x < width && y < height {
            frame.put_pixel(x, y, *pixel);
        }
    }
}

pub fn stamp_arrows(
    frames: &mut [RgbImage],
    symbols: &[ActionSymbol],
    glyph: &ArrowGlyph,
) -> Result<(), OverlayError> {
    if symbols.len() != frames.len() {
        return Err(OverlayError::LengthMismatch {
            actions: symbols.len(),
            frames: frames.len(),
        });
    }
    for (frame, symbol) in frames.iter_mut().zip(symbols) {
        if let Some(oriented) = glyph.oriented(*symbol) {
            stamp(frame, &oriented);
        }
    }
    Ok(())
}

pub fn arrow_video_path(output_dir: &Path, round: u32) -> PathBuf {
    output_dir.join(format!("arrows_{round}-th.gif"))
}

/// Writes a copy of `frames` annotated with one arrow per action.
pub fn write_arrow_video(
    frames: &[RgbImage],
    symbols: &[ActionSymbol],
    glyph: &ArrowGlyph,
    path: &Path,
    fps: u32,
) -> Result<(), OverlayError> {
    let mut annotated = frames.to_vec();
    stamp_arrows(&mut annotated, symbols, glyph)?;
    let bytes = encode_gif(&annotated, fps, path)?;
    write_bytes_atomic(path, &bytes).map_err(|source| OverlayError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn blank_frame() -> RgbImage {
        RgbImage::new(320, 300)
    }

    fn red_pixel_count(frame: &RgbImage) -> usize {
        frame.pixels().filter(|pixel| pixel.0 == ARROW_RED.0).count()
    }

    #[test]
    fn mismatched_lengths_are_a_validation_error() {
        let mut frames = vec![blank_frame(), blank_frame()];
        let err = stamp_arrows(
            &mut frames,
            &[ActionSymbol::Forward],
            &ArrowGlyph::procedural(),
        )
        .expect_err("must fail");
        assert!(matches!(
            err,
            OverlayError::LengthMismatch {
                actions: 1,
                frames: 2
            }
        ));
    }

    #[test]
    fn noop_leaves_frame_untouched_and_moves_are_stamped() {
        let mut frames = vec![blank_frame(), blank_frame()];
        stamp_arrows(
            &mut frames,
            &[ActionSymbol::NoOp, ActionSymbol::Right],
            &ArrowGlyph::procedural(),
        )
        .expect("stamp");

        assert_eq!(red_pixel_count(&frames[0]), 0);
        assert!(red_pixel_count(&frames[1]) > 0);
        assert_eq!(frames[1].get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn orientations_follow_symbol_direction() {
        let glyph = ArrowGlyph::procedural();
        let up = glyph.oriented(ActionSymbol::Forward).expect("up");
        let down = glyph.oriented(ActionSymbol::Backward).expect("down");
        let left = glyph.oriented(ActionSymbol::Left).expect("left");
        let right = glyph.oriented(ActionSymbol::Right).expect("right");

        // The tip is a single red pixel at the leading edge.
        assert_eq!(up.get_pixel(25, 0).0, ARROW_RED.0);
        assert_eq!(down.get_pixel(25, 49).0, ARROW_RED.0);
        assert_eq!(left.get_pixel(0, 24).0, ARROW_RED.0);
        assert_eq!(right.get_pixel(49, 25).0, ARROW_RED.0);
    }

    #[test]
    fn small_frames_clip_instead_of_panicking() {
        let mut frames = vec![RgbImage::new(280, 240)];
        stamp_arrows(
            &mut frames,
            &[ActionSymbol::Forward],
            &ArrowGlyph::procedural(),
        )
        .expect("stamp");
        assert!(red_pixel_count(&frames[0]) > 0);
    }

    #[test]
    fn arrow_video_is_written_next_to_round_videos() {
        let temp = TempDir::new().expect("temp");
        let path = arrow_video_path(temp.path(), 2);
        write_arrow_video(
            &[blank_frame()],
            &[ActionSymbol::Left],
            &ArrowGlyph::procedural(),
            &path,
            4,
        )
        .expect("write");
        assert!(path.ends_with("arrows_2-th.gif"));
        assert!(path.is_file());
    }
}

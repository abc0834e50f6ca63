use std::io;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageError, RgbImage};
use thiserror::Error;

use crate::atomic_io::write_bytes_atomic;
use crate::checkpoint::Tensor;

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("model output must be [frames, 3, height, width], got {shape:?}")]
    ModelOutputShape { shape: Vec<usize> },
    #[error("segment is empty; expected at least the seed frame")]
    EmptySegment,
    #[error("segment frame is {actual:?} but the video is {expected:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("fps must be positive")]
    ZeroFps,
    #[error("failed to encode video {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("failed to write video {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Converts decoded model output in `[-1, 1]` to 8-bit RGB frames.
pub fn frames_from_model_output(video: &Tensor) -> Result<Vec<RgbImage>, StitchError> {
    let &[frame_count, channels, height, width] = video.shape() else {
        return Err(StitchError::ModelOutputShape {
            shape: video.shape().to_vec(),
        });
    };
    if channels != 3 {
        return Err(StitchError::ModelOutputShape {
            shape: video.shape().to_vec(),
        });
    }
    let (Ok(height_px), Ok(width_px)) = (u32::try_from(height), u32::try_from(width)) else {
        return Err(StitchError::ModelOutputShape {
            shape: video.shape().to_vec(),
        });
    };

    let plane = height * width;
    let data = video.data();
    let mut frames = Vec::with_capacity(frame_count);
    for frame_idx in 0..frame_count {
        let base = frame_idx * 3 * plane;
        let frame = RgbImage::from_fn(width_px, height_px, |x, y| {
            let offset = y as usize * width + x as usize;
            image::Rgb([
                to_u8(data[base + offset]),
                to_u8(data[base + plane + offset]),
                to_u8(data[base + 2 * plane + offset]),
            ])
        });
        frames.push(frame);
    }
    Ok(frames)
}

fn to_u8(value: f32) -> u8 {
    ((value / 2.0 + 0.5).clamp(0.0, 1.0) * 255.0) as u8
}

/// Every unique frame produced so far in the session, in order.
#[derive(Debug, Clone)]
pub struct VideoBuffer {
    frames: Vec<RgbImage>,
}

impl VideoBuffer {
    pub fn new(initial: RgbImage) -> Self {
        Self {
            frames: vec![initial],
        }
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(RgbImage::dimensions)
            .unwrap_or((0, 0))
    }

    /// Drops the segment's seed frame (a duplicate of our last frame) and appends the rest.
    /// Returns the number of frames appended.
    pub fn extend_with_segment(&mut self, segment: Vec<RgbImage>) -> Result<usize, StitchError> {
        let expected = self.dimensions();
        let mut frames = segment.into_iter();
        if frames.next().is_none() {
            return Err(StitchError::EmptySegment);
        }
        let fresh = frames.collect::<Vec<_>>();
        if let Some(bad) = fresh.iter().find(|frame| frame.dimensions() != expected) {
            return Err(StitchError::FrameSizeMismatch {
                expected,
                actual: bad.dimensions(),
            });
        }
        let appended = fresh.len();
        self.frames.extend(fresh);
        Ok(appended)
    }
}

pub fn round_video_path(output_dir: &Path, round: u32) -> PathBuf {
    output_dir.join(format!("all_{round}-th.gif"))
}

/// Encodes `frames` as an endlessly looping GIF at `fps` frames per second.
pub fn encode_gif(frames: &[RgbImage], fps: u32, path: &Path) -> Result<Vec<u8>, StitchError> {
    if fps == 0 {
        return Err(StitchError::ZeroFps);
    }
    let encode_err = |source| StitchError::Encode {
        path: path.to_path_buf(),
        source,
    };
    let delay = Delay::from_numer_denom_ms(1000, fps);
    let mut bytes = Vec::<u8>::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.set_repeat(Repeat::Infinite).map_err(encode_err)?;
        for frame in frames {
            let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
            encoder
                .encode_frame(Frame::from_parts(rgba, 0, 0, delay))
                .map_err(encode_err)?;
        }
    }
    Ok(bytes)
}

/// Writes the full buffer to `path`. Existing files at other paths are never touched.
pub fn persist(buffer: &VideoBuffer, path: &Path, fps: u32) -> Result<(), StitchError> {
    let bytes = encode_gif(buffer.frames(), fps, path)?;
    write_bytes_atomic(path, &bytes).map_err(|source| StitchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use image::codecs::gif::GifDecoder;
    use image::AnimationDecoder;
    use proptest::prelude::*;
    use tempfile::TempDir;

    use super::*;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(4, 3, image::Rgb([value, value, value]))
    }

    fn segment(len: usize) -> Vec<RgbImage> {
        (0..len).map(|idx| solid(idx as u8 * 10)).collect()
    }

    #[test]
    fn five_frame_segment_onto_ten_frames_gives_fourteen() {
        let mut buffer = VideoBuffer::new(solid(0));
        buffer.extend_with_segment(segment(10)).expect("grow to 10");
        assert_eq!(buffer.len(), 10);

        let appended = buffer.extend_with_segment(segment(5)).expect("extend");
        assert_eq!(appended, 4);
        assert_eq!(buffer.len(), 14);
    }

    #[test]
    fn seed_frame_is_dropped_and_order_preserved() {
        let mut buffer = VideoBuffer::new(solid(0));
        buffer
            .extend_with_segment(vec![solid(0), solid(1), solid(2)])
            .expect("extend");

        let firsts = buffer
            .frames()
            .iter()
            .map(|frame| frame.get_pixel(0, 0)[0])
            .collect::<Vec<_>>();
        assert_eq!(firsts, vec![0, 1, 2]);
    }

    #[test]
    fn empty_and_mismatched_segments_are_rejected() {
        let mut buffer = VideoBuffer::new(solid(0));
        assert!(matches!(
            buffer.extend_with_segment(Vec::new()),
            Err(StitchError::EmptySegment)
        ));
        let wrong = vec![solid(0), RgbImage::new(8, 8)];
        assert!(matches!(
            buffer.extend_with_segment(wrong),
            Err(StitchError::FrameSizeMismatch { .. })
        ));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn model_output_maps_unit_range_to_bytes() {
        let video = Tensor::new(
            vec![1, 3, 1, 2],
            vec![-1.0, 1.0, 0.0, 2.0, -3.0, 0.5],
        )
        .expect("tensor");
        let frames = frames_from_model_output(&video).expect("frames");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get_pixel(0, 0).0, [0, 127, 0]);
        assert_eq!(frames[0].get_pixel(1, 0).0, [255, 255, 191]);
    }

    #[test]
    fn model_output_requires_three_channels() {
        let video = Tensor::zeros(vec![2, 1, 4, 4]);
        assert!(matches!(
            frames_from_model_output(&video),
            Err(StitchError::ModelOutputShape { .. })
        ));
    }

    #[test]
    fn persist_writes_every_buffered_frame() {
        let temp = TempDir::new().expect("temp");
        let mut buffer = VideoBuffer::new(solid(0));
        buffer.extend_with_segment(segment(3)).expect("extend");
        let path = round_video_path(temp.path(), 0);

        persist(&buffer, &path, 4).expect("persist");

        assert!(path.ends_with("all_0-th.gif"));
        let file = std::fs::File::open(&path).expect("open");
        let decoder = GifDecoder::new(std::io::BufReader::new(file)).expect("decoder");
        let frames = decoder.into_frames().collect_frames().expect("frames");
        assert_eq!(frames.len(), buffer.len());
        let (numer, denom) = frames[0].delay().numer_denom_ms();
        assert_eq!(numer / denom, 250);
    }

    #[test]
    fn repeated_persist_leaves_buffer_unchanged() {
        let temp = TempDir::new().expect("temp");
        let mut buffer = VideoBuffer::new(solid(0));
        buffer.extend_with_segment(segment(2)).expect("extend");
        let before = buffer.frames().to_vec();
        let path = round_video_path(temp.path(), 3);

        persist(&buffer, &path, 4).expect("first");
        persist(&buffer, &path, 4).expect("second");

        assert_eq!(buffer.frames(), before.as_slice());
    }

    proptest! {
        #[test]
        fn buffer_grows_by_segment_len_minus_one(lengths in proptest::collection::vec(1usize..6, 0..8)) {
            let mut buffer = VideoBuffer::new(solid(0));
            let mut expected = 1usize;
            for len in lengths {
                buffer.extend_with_segment(segment(len)).expect("extend");
                expected += len - 1;
                prop_assert_eq!(buffer.len(), expected);
            }
        }
    }
}

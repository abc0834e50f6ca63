use std::io;
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::generator::{GeneratorError, SegmentGenerator};
use super::input::{encode_actions, parse_symbols, CommandSource};
use super::latent::{LatentFrame, LatentState};
use super::overlay::{arrow_video_path, write_arrow_video, ArrowGlyph};
use super::reference::ReferenceClip;
use super::stitcher::{
    frames_from_model_output, persist, round_video_path, StitchError, VideoBuffer,
};

/// Where the session is within a round. `AwaitingInput` is the only resting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    Encoding,
    Generating,
    UpdatingState,
    Stitching,
    Persisting,
}

/// Why a session stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    InputClosed,
    RoundLimit,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub output_dir: PathBuf,
    pub fps: u32,
    pub max_rounds: Option<u32>,
    pub arrow_glyph: Option<ArrowGlyph>,
}

impl SessionOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fps: 4,
            max_rounds: None,
            arrow_glyph: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u32,
    pub action_count: usize,
    pub appended_frames: usize,
    pub buffer_len: usize,
    pub video_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read command input: {0}")]
    Input(#[source] io::Error),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error("generator broke its output contract: {0}")]
    GeneratorContract(String),
    #[error(transparent)]
    Stitch(#[from] StitchError),
}

/// Interactive segment-chaining loop: one command line in, one cumulative video out.
#[derive(Debug)]
pub struct Session<G> {
    generator: G,
    latent: LatentState,
    buffer: VideoBuffer,
    round: u32,
    state: SessionState,
    options: SessionOptions,
}

impl<G: SegmentGenerator> Session<G> {
    pub fn new(generator: G, clip: ReferenceClip, options: SessionOptions) -> Self {
        Self {
            generator,
            latent: LatentState::new(clip.first_latent),
            buffer: VideoBuffer::new(clip.first_frame),
            round: 0,
            state: SessionState::AwaitingInput,
            options,
        }
    }

    pub fn latent(&self) -> &LatentFrame {
        self.latent.get()
    }

    pub fn buffer(&self) -> &VideoBuffer {
        &self.buffer
    }

    /// Index of the next round to run; also the number of completed rounds.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn output_dir(&self) -> &Path {
        &self.options.output_dir
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Runs one full cycle for `line`. On error the latent and buffer are left as they were
    /// before the round unless the failure happened while persisting.
    pub fn run_round(&mut self, line: &str) -> Result<RoundReport, SessionError> {
        let round = self.round;

        self.state = SessionState::Encoding;
        let actions = encode_actions(line);
        info!(round, actions = %spaced(line), "round_actions");

        self.state = SessionState::Generating;
        let segment = self.generator.generate(self.latent.get(), &actions)?;
        let frames = frames_from_model_output(&segment.video)?;
        let mut latents = segment.latents;
        self.check_contract(&latents, &frames)?;
        debug!(round, frames = frames.len(), "segment_generated");

        self.state = SessionState::UpdatingState;
        if let Some(last) = latents.pop() {
            self.latent.set(last);
        }

        self.state = SessionState::Stitching;
        let appended_frames = self.buffer.extend_with_segment(frames)?;

        self.state = SessionState::Persisting;
        let video_path = round_video_path(&self.options.output_dir, round);
        persist(&self.buffer, &video_path, self.options.fps)?;
        info!(
            round,
            path = %video_path.display(),
            buffer_len = self.buffer.len(),
            "video_persisted"
        );
        self.write_arrow_overlay(round, line, appended_frames);

        self.round = round.saturating_add(1);
        self.state = SessionState::AwaitingInput;
        Ok(RoundReport {
            round,
            action_count: actions.len(),
            appended_frames,
            buffer_len: self.buffer.len(),
            video_path,
        })
    }

    /// Repeats rounds until the input closes or the configured round bound is reached.
    pub fn run<S: CommandSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<SessionEnd, SessionError> {
        loop {
            if self
                .options
                .max_rounds
                .is_some_and(|limit| self.round >= limit)
            {
                info!(rounds = self.round, "session_round_limit_reached");
                return Ok(SessionEnd::RoundLimit);
            }

            self.state = SessionState::AwaitingInput;
            let Some(line) = source.next_line().map_err(SessionError::Input)? else {
                info!(rounds = self.round, "session_input_closed");
                return Ok(SessionEnd::InputClosed);
            };
            if line.is_empty() {
                debug!(round = self.round, "empty_round_skipped");
                continue;
            }
            self.run_round(&line)?;
        }
    }

    fn check_contract(
        &self,
        latents: &[LatentFrame],
        frames: &[RgbImage],
    ) -> Result<(), SessionError> {
        let frame_count = frames.len();
        if frame_count == 0 {
            return Err(SessionError::GeneratorContract(
                "segment has no frames".to_string(),
            ));
        }
        if latents.len() != frame_count {
            return Err(SessionError::GeneratorContract(format!(
                "{} latents for {frame_count} frames",
                latents.len()
            )));
        }
        let seed_shape = self.latent.get().shape();
        if let Some(bad) = latents.iter().find(|latent| latent.shape() != seed_shape) {
            return Err(SessionError::GeneratorContract(format!(
                "latent shape {:?} differs from seed shape {seed_shape:?}",
                bad.shape()
            )));
        }
        let expected = self.buffer.dimensions();
        if let Some(bad) = frames.iter().find(|frame| frame.dimensions() != expected) {
            return Err(SessionError::GeneratorContract(format!(
                "frame size {:?} differs from video size {expected:?}",
                bad.dimensions()
            )));
        }
        Ok(())
    }

    fn write_arrow_overlay(&self, round: u32, line: &str, appended_frames: usize) {
        let Some(glyph) = &self.options.arrow_glyph else {
            return;
        };
        let frames = self.buffer.frames();
        let fresh = &frames[frames.len() - appended_frames..];
        let path = arrow_video_path(&self.options.output_dir, round);
        match write_arrow_video(fresh, &parse_symbols(line), glyph, &path, self.options.fps) {
            Ok(()) => info!(round, path = %path.display(), "arrow_video_persisted"),
            Err(error) => warn!(round, error = %error, "arrow_overlay_failed"),
        }
    }
}

fn spaced(line: &str) -> String {
    line.chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

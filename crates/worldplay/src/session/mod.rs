mod config;
mod generator;
mod input;
mod latent;
mod loop_runner;
mod overlay;
mod reference;
mod stitcher;

pub use config::{load_config, parse_config, ConfigError, SessionConfig, LATENT_DOWNSAMPLE};
pub use generator::{GeneratedSegment, GeneratorError, SegmentGenerator};
pub use input::{
    encode_actions, parse_symbols, ActionSymbol, CommandSource, ControlVector, LineCommandSource,
};
pub use latent::{LatentFrame, LatentState};
pub use loop_runner::{
    RoundReport, Session, SessionEnd, SessionError, SessionOptions, SessionState,
};
pub use overlay::{
    arrow_video_path, stamp_arrows, write_arrow_video, ArrowGlyph, OverlayError, ARROW_COL,
    ARROW_ROW,
};
pub use reference::{
    load_first_frame, load_latent_frame, load_reference_clip, read_annotation,
    resolve_annotation_file, Annotation, ReferenceClip, ReferenceError, LATENT_CLIP_KEY,
};
pub use stitcher::{
    encode_gif, frames_from_model_output, persist, round_video_path, StitchError, VideoBuffer,
};

use thiserror::Error;

use crate::checkpoint::Tensor;

use super::input::ControlVector;
use super::latent::LatentFrame;

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSegment {
    /// Decoded frames `[F, 3, H, W]` in `[-1, 1]`, seed frame first.
    pub video: Tensor,
    /// One latent per decoded frame, in the same order.
    pub latents: Vec<LatentFrame>,
}

#[derive(Debug, Error)]
#[error("segment generation failed: {message}")]
pub struct GeneratorError {
    pub message: String,
}

impl GeneratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Produces the next video segment from the current seed latent and the round's actions.
///
/// Implementations may be stochastic; callers must not assume repeatable output.
pub trait SegmentGenerator {
    fn generate(
        &mut self,
        seed: &LatentFrame,
        actions: &[ControlVector],
    ) -> Result<GeneratedSegment, GeneratorError>;
}

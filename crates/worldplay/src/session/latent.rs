use crate::checkpoint::Tensor;

/// Compressed `[C, h, w]` representation of one frame in the model's latent space.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentFrame(Tensor);

impl LatentFrame {
    pub fn new(tensor: Tensor) -> Self {
        Self(tensor)
    }

    pub fn tensor(&self) -> &Tensor {
        &self.0
    }

    pub fn into_tensor(self) -> Tensor {
        self.0
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

/// The single latent frame that seeds the next generation call.
///
/// Owned by the session and threaded through each round; there is no history.
#[derive(Debug)]
pub struct LatentState {
    current: LatentFrame,
}

impl LatentState {
    pub fn new(initial: LatentFrame) -> Self {
        Self { current: initial }
    }

    pub fn get(&self) -> &LatentFrame {
        &self.current
    }

    /// Replaces the held frame wholesale and hands back the previous one.
    pub fn set(&mut self, next: LatentFrame) -> LatentFrame {
        std::mem::replace(&mut self.current, next)
    }
}

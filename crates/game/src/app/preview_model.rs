use std::collections::BTreeSet;

use worldplay::session::LATENT_DOWNSAMPLE;
use worldplay::{
    ControlVector, GeneratedSegment, GeneratorError, LatentFrame, ParamSet, ParameterApplyError,
    ParameterStore, SegmentGenerator, Tensor,
};

pub(crate) const DECODER_WEIGHT: &str = "decoder.weight";
pub(crate) const DECODER_BIAS: &str = "decoder.bias";
pub(crate) const DYNAMICS_GAIN: &str = "dynamics.gain";

/// Cells moved per unit of control at gain 1.0.
const CELLS_PER_UNIT: f32 = 2.0;

/// Deterministic stand-in world model: actions translate the latent grid, and a
/// per-cell linear projection decodes it to RGB.
#[derive(Debug, Clone)]
pub(crate) struct PreviewWorldModel {
    channels: usize,
    params: ParamSet,
}

impl PreviewWorldModel {
    pub(crate) fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        let mut weight = Tensor::zeros(vec![3, channels]);
        for rgb in 0..3 {
            weight.data_mut()[rgb * channels + rgb % channels] = 1.0;
        }
        let mut gain = Tensor::zeros(vec![1]);
        gain.data_mut()[0] = 1.0;

        let mut params = ParamSet::new();
        params.insert(DECODER_WEIGHT.to_string(), weight);
        params.insert(DECODER_BIAS.to_string(), Tensor::zeros(vec![3]));
        params.insert(DYNAMICS_GAIN.to_string(), gain);
        Self { channels, params }
    }

    fn param(&self, name: &str) -> Result<&Tensor, GeneratorError> {
        self.params
            .get(name)
            .ok_or_else(|| GeneratorError::new(format!("missing parameter {name}")))
    }

    fn gain(&self) -> Result<f32, GeneratorError> {
        self.param(DYNAMICS_GAIN)?
            .data()
            .first()
            .copied()
            .ok_or_else(|| GeneratorError::new("dynamics.gain is empty"))
    }

    fn step(&self, latent: &Tensor, action: ControlVector, gain: f32) -> Tensor {
        let rows = (action.dx * gain * CELLS_PER_UNIT).round() as i64;
        let cols = (action.dy * gain * CELLS_PER_UNIT).round() as i64;
        shift_wrapping(latent, rows, cols)
    }

    fn decode(&self, latent: &Tensor, out: &mut Vec<f32>) -> Result<(), GeneratorError> {
        let weight = self.param(DECODER_WEIGHT)?.data();
        let bias = self.param(DECODER_BIAS)?.data();
        let &[channels, height, width] = latent.shape() else {
            return Err(GeneratorError::new("latent must be [C, h, w]"));
        };
        let scale = LATENT_DOWNSAMPLE as usize;
        let plane = height * width;
        let data = latent.data();
        for rgb in 0..3 {
            for y in 0..height * scale {
                for x in 0..width * scale {
                    let cell = (y / scale) * width + x / scale;
                    let mut acc = bias[rgb];
                    for channel in 0..channels {
                        acc += weight[rgb * channels + channel] * data[channel * plane + cell];
                    }
                    out.push(acc.tanh());
                }
            }
        }
        Ok(())
    }
}

fn shift_wrapping(latent: &Tensor, rows: i64, cols: i64) -> Tensor {
    let shape = latent.shape().to_vec();
    let &[channels, height, width] = shape.as_slice() else {
        return latent.clone();
    };
    if height == 0 || width == 0 {
        return latent.clone();
    }
    let mut shifted = Tensor::zeros(shape.clone());
    let source = latent.data();
    let target = shifted.data_mut();
    let plane = height * width;
    for channel in 0..channels {
        for y in 0..height {
            let ny = (y as i64 + rows).rem_euclid(height as i64) as usize;
            for x in 0..width {
                let nx = (x as i64 + cols).rem_euclid(width as i64) as usize;
                target[channel * plane + ny * width + nx] = source[channel * plane + y * width + x];
            }
        }
    }
    shifted
}

impl ParameterStore for PreviewWorldModel {
    fn parameter_names(&self) -> BTreeSet<String> {
        self.params.keys().cloned().collect()
    }

    fn apply_parameters(&mut self, params: ParamSet) -> Result<(), ParameterApplyError> {
        for (name, tensor) in &params {
            let current = self.params.get(name).ok_or_else(|| ParameterApplyError {
                name: name.clone(),
                message: "unknown parameter".to_string(),
            })?;
            if current.shape() != tensor.shape() {
                return Err(ParameterApplyError {
                    name: name.clone(),
                    message: format!(
                        "shape {:?} does not match model shape {:?}",
                        tensor.shape(),
                        current.shape()
                    ),
                });
            }
        }
        self.params.extend(params);
        Ok(())
    }
}

impl SegmentGenerator for PreviewWorldModel {
    fn generate(
        &mut self,
        seed: &LatentFrame,
        actions: &[ControlVector],
    ) -> Result<GeneratedSegment, GeneratorError> {
        let &[channels, height, width] = seed.shape() else {
            return Err(GeneratorError::new(format!(
                "seed latent must be [C, h, w], got {:?}",
                seed.shape()
            )));
        };
        if channels != self.channels {
            return Err(GeneratorError::new(format!(
                "seed latent has {channels} channels, model expects {}",
                self.channels
            )));
        }
        let gain = self.gain()?;

        let mut latents = Vec::with_capacity(actions.len() + 1);
        latents.push(seed.tensor().clone());
        for &action in actions {
            let next = match latents.last() {
                Some(previous) => self.step(previous, action, gain),
                None => seed.tensor().clone(),
            };
            latents.push(next);
        }

        let scale = LATENT_DOWNSAMPLE as usize;
        let frame_len = 3 * height * scale * width * scale;
        let mut pixels = Vec::with_capacity(latents.len() * frame_len);
        for latent in &latents {
            self.decode(latent, &mut pixels)?;
        }
        let video = Tensor::new(
            vec![latents.len(), 3, height * scale, width * scale],
            pixels,
        )
        .map_err(|err| GeneratorError::new(err.to_string()))?;

        Ok(GeneratedSegment {
            video,
            latents: latents.into_iter().map(LatentFrame::new).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> LatentFrame {
        // one hot cell at (0, 0) on a 2x3 grid, two channels
        let mut data = vec![0.0; 2 * 2 * 3];
        data[0] = 1.0;
        LatentFrame::new(Tensor::new(vec![2, 2, 3], data).expect("seed"))
    }

    fn hot_cell(latent: &LatentFrame) -> usize {
        latent.tensor().data()[..6]
            .iter()
            .position(|&value| value == 1.0)
            .expect("hot cell")
    }

    #[test]
    fn exposes_decoder_and_dynamics_parameters() {
        let model = PreviewWorldModel::new(2);
        let names = model.parameter_names();
        assert!(names.contains(DECODER_WEIGHT));
        assert!(names.contains(DECODER_BIAS));
        assert!(names.contains(DYNAMICS_GAIN));
    }

    #[test]
    fn segment_has_seed_first_and_one_frame_per_action() {
        let mut model = PreviewWorldModel::new(2);
        let actions = [ControlVector::new(0.5, 0.0), ControlVector::ZERO];

        let segment = model.generate(&seed(), &actions).expect("generate");

        assert_eq!(segment.video.shape(), &[3, 3, 16, 24]);
        assert_eq!(segment.latents.len(), 3);
        assert_eq!(segment.latents[0], seed());
        assert!(segment.video.data().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn actions_translate_the_latent_grid_with_wrap() {
        let mut model = PreviewWorldModel::new(2);
        let actions = [
            ControlVector::new(0.5, 0.0),
            ControlVector::new(0.0, -0.5),
            ControlVector::new(0.5, 0.0),
        ];

        let segment = model.generate(&seed(), &actions).expect("generate");

        // row 1 col 0, then col wraps to 2, then row wraps back to 0
        assert_eq!(hot_cell(&segment.latents[1]), 3);
        assert_eq!(hot_cell(&segment.latents[2]), 5);
        assert_eq!(hot_cell(&segment.latents[3]), 2);
    }

    #[test]
    fn checkpoint_gain_scales_motion() {
        let mut model = PreviewWorldModel::new(2);
        let mut params = ParamSet::new();
        params.insert(
            DYNAMICS_GAIN.to_string(),
            Tensor::new(vec![1], vec![0.0]).expect("gain"),
        );
        model.apply_parameters(params).expect("apply");

        let segment = model
            .generate(&seed(), &[ControlVector::new(0.5, 0.0)])
            .expect("generate");
        assert_eq!(segment.latents[1], seed());
    }

    #[test]
    fn mismatched_parameter_shape_is_rejected() {
        let mut model = PreviewWorldModel::new(2);
        let mut params = ParamSet::new();
        params.insert(DECODER_BIAS.to_string(), Tensor::zeros(vec![4]));

        let err = model.apply_parameters(params).expect_err("must fail");
        assert_eq!(err.name, DECODER_BIAS);
    }

    #[test]
    fn wrong_channel_count_fails_generation() {
        let mut model = PreviewWorldModel::new(4);
        assert!(model.generate(&seed(), &[]).is_err());
    }
}

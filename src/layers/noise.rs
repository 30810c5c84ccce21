//! Noise injection: per-call random spatial noise and the learned constant input

use candle_core::{DType, Device, Tensor};
use tracing::debug;

use crate::error::{Error, Result};
use crate::param::{Param, Trainable};
use crate::rng::SharedRng;

/// Adds `noise * gain` with fresh spatial noise on every call.
///
/// One noise map per sample, shared by all of its channels. The gain starts at
/// zero so a freshly built layer is the identity.
#[derive(Debug, Clone)]
pub struct RandomGaussianNoise {
    gain: Param,
    rng: SharedRng,
}

impl RandomGaussianNoise {
    pub fn new(device: &Device, rng: &SharedRng) -> Result<Self> {
        let gain = Param::new("gain", &Tensor::zeros(1, DType::F32, device)?)?;
        Ok(Self {
            gain,
            rng: rng.clone(),
        })
    }

    /// Reset the gain to zero
    pub fn reset_parameters(&mut self) -> Result<()> {
        self.gain.set(&self.gain.var().as_tensor().zeros_like()?)
    }

    /// `x` is (N, C, H, W)
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (n, h, w) = match x.dims() {
            &[n, _, h, w] => (n, h, w),
            dims => {
                return Err(Error::shape(format!(
                    "noise injection expects (N, C, H, W), got {dims:?}"
                )))
            }
        };
        let noise = self.rng.randn((n, 1, h, w), x.device())?.to_dtype(x.dtype())?;
        let gain = self.gain.tensor().to_dtype(x.dtype())?;
        Ok(x.broadcast_add(&noise.broadcast_mul(&gain)?)?)
    }

    pub fn gain(&self) -> &Param {
        &self.gain
    }
}

impl Trainable for RandomGaussianNoise {
    fn parameters(&self) -> Vec<Param> {
        vec![self.gain.clone()]
    }
}

/// Learned constant (1, C, S, S) broadcast to the batch size
#[derive(Debug, Clone)]
pub struct InputNoise {
    weight: Param,
    channels: usize,
    size: usize,
}

impl InputNoise {
    pub fn new(channels: usize, size: usize, device: &Device, rng: &SharedRng) -> Result<Self> {
        if channels == 0 || size == 0 {
            return Err(Error::shape(format!(
                "input noise needs non-zero channels and size, got {channels}x{size}"
            )));
        }
        let weight = Param::new("weight", &rng.randn((1, channels, size, size), device)?)?;
        debug!(channels, size, "created InputNoise");
        Ok(Self {
            weight,
            channels,
            size,
        })
    }

    /// Redraw the constant from N(0, 1)
    pub fn reset_parameters(&mut self, rng: &SharedRng) -> Result<()> {
        let current = self.weight.var().as_tensor();
        self.weight
            .set(&rng.randn(current.shape().clone(), current.device())?)
    }

    /// Broadcast view of the constant, shape (N, C, S, S)
    pub fn forward(&self, batch_size: usize) -> Result<Tensor> {
        Ok(self
            .weight
            .tensor()
            .broadcast_as((batch_size, self.channels, self.size, self.size))?)
    }

    /// Same as [`forward`](Self::forward) with the batch size taken from `x`
    pub fn forward_like(&self, x: &Tensor) -> Result<Tensor> {
        self.forward(x.dim(0)?)
    }

    pub fn weight(&self) -> &Param {
        &self.weight
    }
}

impl Trainable for InputNoise {
    fn parameters(&self) -> Vec<Param> {
        vec![self.weight.clone()]
    }
}

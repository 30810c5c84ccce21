//! Gain-corrected leaky ReLU

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Leaky ReLU applied to `x * gain`.
///
/// The default gain of √2 keeps activations at unit variance behind
/// equalized layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualLeakyReLU {
    pub negative_slope: f64,
    pub gain: f64,
}

impl Default for EqualLeakyReLU {
    fn default() -> Self {
        Self {
            negative_slope: 0.2,
            gain: std::f64::consts::SQRT_2,
        }
    }
}

impl EqualLeakyReLU {
    pub fn new(negative_slope: f64, gain: f64) -> Result<Self> {
        if !negative_slope.is_finite() || !gain.is_finite() {
            return Err(Error::config("leaky relu slope and gain must be finite"));
        }
        Ok(Self {
            negative_slope,
            gain,
        })
    }

    /// Borrows `x` and returns a new tensor
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        self.activate(x.affine(self.gain, 0.0)?)
    }

    /// Takes ownership of the caller's buffer; `x` is released once scaled
    pub fn forward_owned(&self, x: Tensor) -> Result<Tensor> {
        let scaled = x.affine(self.gain, 0.0)?;
        drop(x);
        self.activate(scaled)
    }

    fn activate(&self, x: Tensor) -> Result<Tensor> {
        let pos = x.relu()?;
        let neg = x.neg()?.relu()?.affine(self.negative_slope, 0.0)?;
        Ok((pos - neg)?)
    }
}

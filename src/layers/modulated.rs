//! Style-modulated convolution
//!
//! Every sample in a batch gets its own kernel: the shared base kernel scaled
//! along the input-channel axis by that sample's style vector, optionally
//! demodulated back to unit norm per output channel. All kernels are then
//! evaluated with a single grouped convolution.

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::equalized::{check_conv_shape, equalized_lr_init, EqualConv2dConfig, EqualizedInit};
use crate::error::{Error, Result};
use crate::param::{Param, Trainable};
use crate::rng::SharedRng;

/// Floor added to the squared kernel norm before demodulating
pub const DEMODULATION_EPS: f64 = 1e-8;

/// Options of a [`ModulatedConv2d`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulatedConv2dConfig {
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub bias: bool,
    /// Renormalize each per-sample kernel
    pub demodulate: bool,
    pub init: EqualizedInit,
}

impl Default for ModulatedConv2dConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            dilation: 1,
            bias: true,
            demodulate: true,
            init: EqualizedInit::default(),
        }
    }
}

/// Convolution whose kernel is modulated per sample by a style vector
#[derive(Debug, Clone)]
pub struct ModulatedConv2d {
    weight: Param,
    bias: Option<Param>,
    config: ModulatedConv2dConfig,
    w_mult: f64,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
}

impl ModulatedConv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        config: ModulatedConv2dConfig,
        device: &Device,
        rng: &SharedRng,
    ) -> Result<Self> {
        check_conv_shape(
            in_channels,
            out_channels,
            kernel_size,
            &EqualConv2dConfig {
                stride: config.stride,
                padding: config.padding,
                dilation: config.dilation,
                groups: 1,
                bias: config.bias,
                init: config.init,
            },
        )?;

        let weight = Param::new(
            "weight",
            &Tensor::zeros(
                (out_channels, in_channels, kernel_size, kernel_size),
                DType::F32,
                device,
            )?,
        )?;
        let bias = if config.bias {
            Some(Param::new("bias", &Tensor::zeros(out_channels, DType::F32, device)?)?)
        } else {
            None
        };
        let w_mult = equalized_lr_init(&weight, bias.as_ref(), &config.init, rng)?;
        debug!(
            in_channels,
            out_channels,
            kernel_size,
            demodulate = config.demodulate,
            w_mult,
            "created ModulatedConv2d"
        );

        Ok(Self {
            weight,
            bias,
            config,
            w_mult,
            in_channels,
            out_channels,
            kernel_size,
        })
    }

    /// Redraw the parameters and recompute the multiplier
    pub fn reset_parameters(&mut self, rng: &SharedRng) -> Result<()> {
        self.w_mult =
            equalized_lr_init(&self.weight, self.bias.as_ref(), &self.config.init, rng)?;
        Ok(())
    }

    /// Base kernel (C_out, C_in, K, K) after the equalized-lr multiplier
    pub fn effective_weight(&self) -> Result<Tensor> {
        Ok(self.weight.tensor().affine(self.w_mult, 0.0)?)
    }

    fn effective_bias(&self) -> Result<Option<Tensor>> {
        self.bias
            .as_ref()
            .map(|b| Ok(b.tensor().affine(self.config.init.lr_mult, 0.0)?))
            .transpose()
    }

    fn check_style(&self, style: &Tensor) -> Result<usize> {
        let (n, c) = match style.dims() {
            &[n, c] => (n, c),
            dims => {
                return Err(Error::shape(format!(
                    "style must be (N, C_in), got {dims:?}"
                )))
            }
        };
        if n == 0 {
            return Err(Error::shape("modulated convolution needs a non-empty batch"));
        }
        if c != self.in_channels {
            return Err(Error::shape(format!(
                "style has {c} channels, convolution expects {}",
                self.in_channels
            )));
        }
        Ok(n)
    }

    fn check_input(&self, x: &Tensor, style: &Tensor) -> Result<(usize, usize, usize)> {
        let (n, c, h, w) = match x.dims() {
            &[n, c, h, w] => (n, c, h, w),
            dims => {
                return Err(Error::shape(format!(
                    "input must be (N, C_in, H, W), got {dims:?}"
                )))
            }
        };
        if c != self.in_channels {
            return Err(Error::shape(format!(
                "input has {c} channels, convolution expects {}",
                self.in_channels
            )));
        }
        let style_n = self.check_style(style)?;
        if style_n != n {
            return Err(Error::shape(format!(
                "batch size mismatch: input {n}, style {style_n}"
            )));
        }
        Ok((n, h, w))
    }

    /// Per-sample kernels (N, C_out, C_in, K, K), demodulated if configured
    pub fn modulated_weight(&self, style: &Tensor) -> Result<Tensor> {
        let n = self.check_style(style)?;

        let w = self.effective_weight()?.unsqueeze(0)?;
        let s = style.reshape((n, 1, self.in_channels, 1, 1))?;
        let w = w.broadcast_mul(&s)?;

        if !self.config.demodulate {
            return Ok(w);
        }
        let d = w
            .sqr()?
            .sum_keepdim((2, 3, 4))?
            .affine(1.0, DEMODULATION_EPS)?
            .sqrt()?
            .recip()?;
        Ok(w.broadcast_mul(&d)?)
    }

    /// Modulated convolution of `x` (N, C_in, H, W) with `style` (N, C_in)
    pub fn forward(&self, x: &Tensor, style: &Tensor) -> Result<Tensor> {
        let (n, h, w) = self.check_input(x, style)?;
        let (c_in, c_out, k) = (self.in_channels, self.out_channels, self.kernel_size);

        let weight = self.modulated_weight(style)?.reshape((n * c_out, c_in, k, k))?;
        let x = x.reshape((1, n * c_in, h, w))?;

        let out = x.conv2d(
            &weight,
            self.config.padding,
            self.config.stride,
            self.config.dilation,
            n,
        )?;
        let (_, _, h1, w1) = out.dims4()?;
        let out = out.reshape((n, c_out, h1, w1))?;

        self.add_bias(out)
    }

    /// Reference path: one convolution per sample.
    ///
    /// Numerically equivalent to [`forward`](Self::forward), only slower.
    pub fn forward_per_sample(&self, x: &Tensor, style: &Tensor) -> Result<Tensor> {
        let (n, _, _) = self.check_input(x, style)?;
        let weight = self.modulated_weight(style)?;

        let outs = (0..n)
            .map(|i| {
                Ok(x.narrow(0, i, 1)?.conv2d(
                    &weight.get(i)?.contiguous()?,
                    self.config.padding,
                    self.config.stride,
                    self.config.dilation,
                    1,
                )?)
            })
            .collect::<Result<Vec<_>>>()?;

        self.add_bias(Tensor::cat(&outs, 0)?)
    }

    fn add_bias(&self, out: Tensor) -> Result<Tensor> {
        match self.effective_bias()? {
            Some(bias) => Ok(out.broadcast_add(&bias.reshape((1, self.out_channels, 1, 1))?)?),
            None => Ok(out),
        }
    }

    pub fn w_mult(&self) -> f64 {
        self.w_mult
    }

    pub fn config(&self) -> &ModulatedConv2dConfig {
        &self.config
    }

    /// Stored, unscaled base kernel
    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl Trainable for ModulatedConv2d {
    fn parameters(&self) -> Vec<Param> {
        std::iter::once(self.weight.clone())
            .chain(self.bias.clone())
            .collect()
    }
}

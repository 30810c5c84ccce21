//! Equalized learning rate initialization and the linear / conv layers built on it
//!
//! Parameters are stored at unit scale and multiplied by a fan-in dependent
//! constant on every forward pass, so layers of very different widths see
//! comparable effective learning rates.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, Module};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::param::{Param, Trainable};
use crate::rng::SharedRng;

/// Parameterization of an equalized layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizedInit {
    /// Apply the He constant at forward time (true) or bake it into the init (false)
    pub scale_weights: bool,
    /// Learning rate multiplier λ
    pub lr_mult: f64,
}

impl Default for EqualizedInit {
    fn default() -> Self {
        Self {
            scale_weights: true,
            lr_mult: 1.0,
        }
    }
}

impl EqualizedInit {
    /// Init with the given learning rate multiplier and forward-time scaling
    pub fn with_lr_mult(lr_mult: f64) -> Self {
        Self {
            lr_mult,
            ..Default::default()
        }
    }

    /// Check that λ is a positive finite number
    pub fn validate(&self) -> Result<()> {
        if !self.lr_mult.is_finite() || self.lr_mult <= 0.0 {
            return Err(Error::config(format!(
                "lr_mult must be positive and finite, got {}",
                self.lr_mult
            )));
        }
        Ok(())
    }
}

/// Number of inputs feeding one output unit: product of every dim but the first
pub fn fan_in(dims: &[usize]) -> Result<usize> {
    if dims.len() < 2 {
        return Err(Error::shape(format!(
            "weight needs at least 2 dims to compute fan-in, got {dims:?}"
        )));
    }
    let fan_in: usize = dims[1..].iter().product();
    if fan_in == 0 {
        return Err(Error::shape(format!("degenerate fan-in for weight shape {dims:?}")));
    }
    Ok(fan_in)
}

/// Re-initialize `weight` (and zero `bias`) and return the forward-time multiplier.
///
/// With `scale_weights` the weight is drawn from N(0, 1/λ²) and the multiplier
/// is `λ / sqrt(fan_in)`. Without it the weight is drawn from
/// N(0, 1/(λ² fan_in)) and the multiplier is λ. Either way the effective
/// weight has variance `1 / fan_in`.
pub fn equalized_lr_init(
    weight: &Param,
    bias: Option<&Param>,
    init: &EqualizedInit,
    rng: &SharedRng,
) -> Result<f64> {
    init.validate()?;

    let w = weight.var().as_tensor();
    let fan_in = fan_in(w.dims())?;
    let he_std = 1.0 / (fan_in as f64).sqrt();

    let (init_std, scale) = if init.scale_weights {
        (1.0 / init.lr_mult, he_std * init.lr_mult)
    } else {
        (he_std / init.lr_mult, init.lr_mult)
    };

    weight.set(&rng.normal(w.shape().clone(), 0.0, init_std, w.device())?)?;
    if let Some(bias) = bias {
        bias.set(&bias.var().as_tensor().zeros_like()?)?;
    }

    Ok(scale)
}

fn scaled(param: &Param, mult: f64) -> Result<Tensor> {
    Ok(param.tensor().affine(mult, 0.0)?)
}

/// Linear layer with equalized learning rate
#[derive(Debug, Clone)]
pub struct EqualLinear {
    weight: Param,
    bias: Option<Param>,
    init: EqualizedInit,
    w_mult: f64,
    in_features: usize,
    out_features: usize,
}

impl EqualLinear {
    /// Create a layer mapping `in_features` to `out_features`
    pub fn new(
        in_features: usize,
        out_features: usize,
        bias: bool,
        init: EqualizedInit,
        device: &Device,
        rng: &SharedRng,
    ) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(Error::shape(format!(
                "EqualLinear needs non-zero features, got {in_features} -> {out_features}"
            )));
        }

        let weight = Param::new(
            "weight",
            &Tensor::zeros((out_features, in_features), DType::F32, device)?,
        )?;
        let bias = if bias {
            Some(Param::new("bias", &Tensor::zeros(out_features, DType::F32, device)?)?)
        } else {
            None
        };
        let w_mult = equalized_lr_init(&weight, bias.as_ref(), &init, rng)?;
        debug!(in_features, out_features, w_mult, "created EqualLinear");

        Ok(Self {
            weight,
            bias,
            init,
            w_mult,
            in_features,
            out_features,
        })
    }

    /// Redraw the parameters and recompute the multiplier
    pub fn reset_parameters(&mut self, rng: &SharedRng) -> Result<()> {
        self.w_mult = equalized_lr_init(&self.weight, self.bias.as_ref(), &self.init, rng)?;
        Ok(())
    }

    /// Weight as seen by the forward pass
    pub fn effective_weight(&self) -> Result<Tensor> {
        scaled(&self.weight, self.w_mult)
    }

    /// Bias as seen by the forward pass
    pub fn effective_bias(&self) -> Result<Option<Tensor>> {
        self.bias
            .as_ref()
            .map(|b| scaled(b, self.init.lr_mult))
            .transpose()
    }

    /// Affine transform with the scaled operands
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let linear = Linear::new(self.effective_weight()?, self.effective_bias()?);
        Ok(linear.forward(x)?)
    }

    /// Forward-time weight multiplier
    pub fn w_mult(&self) -> f64 {
        self.w_mult
    }

    /// Learning rate multiplier applied to the bias
    pub fn lr_mult(&self) -> f64 {
        self.init.lr_mult
    }

    /// Stored, unscaled weight
    pub fn weight(&self) -> &Param {
        &self.weight
    }

    /// Stored, unscaled bias
    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

impl Trainable for EqualLinear {
    fn parameters(&self) -> Vec<Param> {
        std::iter::once(self.weight.clone())
            .chain(self.bias.clone())
            .collect()
    }
}

/// Convolution options of an [`EqualConv2d`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualConv2dConfig {
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
    /// Whether the layer has a bias
    pub bias: bool,
    pub init: EqualizedInit,
}

impl Default for EqualConv2dConfig {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            dilation: 1,
            groups: 1,
            bias: true,
            init: EqualizedInit::default(),
        }
    }
}

impl EqualConv2dConfig {
    pub(crate) fn conv_config(&self) -> Conv2dConfig {
        Conv2dConfig {
            padding: self.padding,
            stride: self.stride,
            dilation: self.dilation,
            groups: self.groups,
            ..Default::default()
        }
    }
}

/// 2D convolution with equalized learning rate
#[derive(Debug, Clone)]
pub struct EqualConv2d {
    weight: Param,
    bias: Option<Param>,
    config: EqualConv2dConfig,
    w_mult: f64,
}

impl EqualConv2d {
    /// Create a square-kernel convolution
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        config: EqualConv2dConfig,
        device: &Device,
        rng: &SharedRng,
    ) -> Result<Self> {
        check_conv_shape(in_channels, out_channels, kernel_size, &config)?;

        let weight = Param::new(
            "weight",
            &Tensor::zeros(
                (out_channels, in_channels / config.groups, kernel_size, kernel_size),
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
        debug!(in_channels, out_channels, kernel_size, w_mult, "created EqualConv2d");

        Ok(Self {
            weight,
            bias,
            config,
            w_mult,
        })
    }

    /// Redraw the parameters and recompute the multiplier
    pub fn reset_parameters(&mut self, rng: &SharedRng) -> Result<()> {
        self.w_mult =
            equalized_lr_init(&self.weight, self.bias.as_ref(), &self.config.init, rng)?;
        Ok(())
    }

    /// Kernel as seen by the forward pass
    pub fn effective_weight(&self) -> Result<Tensor> {
        scaled(&self.weight, self.w_mult)
    }

    /// Bias as seen by the forward pass
    pub fn effective_bias(&self) -> Result<Option<Tensor>> {
        self.bias
            .as_ref()
            .map(|b| scaled(b, self.config.init.lr_mult))
            .transpose()
    }

    /// Cross-correlation with the scaled operands
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let conv = Conv2d::new(
            self.effective_weight()?,
            self.effective_bias()?,
            self.config.conv_config(),
        );
        Ok(conv.forward(x)?)
    }

    pub fn w_mult(&self) -> f64 {
        self.w_mult
    }

    pub fn config(&self) -> &EqualConv2dConfig {
        &self.config
    }

    /// Stored, unscaled kernel
    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }
}

impl Trainable for EqualConv2d {
    fn parameters(&self) -> Vec<Param> {
        std::iter::once(self.weight.clone())
            .chain(self.bias.clone())
            .collect()
    }
}

pub(crate) fn check_conv_shape(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    config: &EqualConv2dConfig,
) -> Result<()> {
    if in_channels == 0 || out_channels == 0 || kernel_size == 0 {
        return Err(Error::shape(format!(
            "convolution needs non-zero sizes, got in={in_channels} out={out_channels} k={kernel_size}"
        )));
    }
    if config.stride == 0 || config.dilation == 0 || config.groups == 0 {
        return Err(Error::shape("stride, dilation and groups must be non-zero"));
    }
    if in_channels % config.groups != 0 || out_channels % config.groups != 0 {
        return Err(Error::shape(format!(
            "channels ({in_channels}, {out_channels}) not divisible by groups {}",
            config.groups
        )));
    }
    Ok(())
}

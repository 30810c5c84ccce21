//! Small generator / discriminator pair and instrumented collaborators

use std::sync::Arc;

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Tensor};
use parking_lot::Mutex;

use crate::error::Result;
use crate::layers::{
    EqualConv2d, EqualConv2dConfig, EqualLeakyReLU, EqualLinear, EqualizedInit, InputNoise,
    ModulatedConv2d, ModulatedConv2dConfig, RandomGaussianNoise,
};
use crate::param::{Param, Trainable};
use crate::rng::SharedRng;
use crate::training::optimizers::Optimizer;
use crate::training::trainer::{GeneratorNetwork, Network};

pub const LATENT_DIM: usize = 8;
pub const CHANNELS: usize = 4;
pub const RESOLUTION: usize = 4;

/// Concatenate a one-hot label onto `x`; zeros stand in for a missing label
fn condition(x: &Tensor, label: Option<&Tensor>, num_classes: usize) -> Result<Tensor> {
    if num_classes == 0 {
        return Ok(x.clone());
    }
    let label = match label {
        Some(label) => label.to_dtype(x.dtype())?,
        None => Tensor::zeros((x.dim(0)?, num_classes), x.dtype(), x.device())?,
    };
    Ok(Tensor::cat(&[x, &label], 1)?)
}

/// Mapping MLP, learned constant, one modulated conv block and a 1x1 to-RGB
pub struct TinyGenerator {
    mapping: EqualLinear,
    affine: EqualLinear,
    input: InputNoise,
    conv: ModulatedConv2d,
    noise: RandomGaussianNoise,
    to_rgb: EqualConv2d,
    act: EqualLeakyReLU,
    num_classes: usize,
    training: bool,
}

impl TinyGenerator {
    pub fn new(num_classes: usize, device: &Device, rng: &SharedRng) -> Result<Self> {
        Ok(Self {
            mapping: EqualLinear::new(
                LATENT_DIM + num_classes,
                LATENT_DIM,
                true,
                EqualizedInit::with_lr_mult(0.01),
                device,
                rng,
            )?,
            affine: EqualLinear::new(
                LATENT_DIM,
                CHANNELS,
                true,
                EqualizedInit::default(),
                device,
                rng,
            )?,
            input: InputNoise::new(CHANNELS, RESOLUTION, device, rng)?,
            conv: ModulatedConv2d::new(
                CHANNELS,
                CHANNELS,
                3,
                ModulatedConv2dConfig {
                    padding: 1,
                    ..Default::default()
                },
                device,
                rng,
            )?,
            noise: RandomGaussianNoise::new(device, rng)?,
            to_rgb: EqualConv2d::new(CHANNELS, 3, 1, EqualConv2dConfig::default(), device, rng)?,
            act: EqualLeakyReLU::default(),
            num_classes,
            training: false,
        })
    }

    /// Images (N, 3, R, R) from latents (N, LATENT_DIM)
    pub fn forward(&self, latent: &Tensor, label: Option<&Tensor>) -> Result<Tensor> {
        let z = condition(latent, label, self.num_classes)?;
        let w = self.act.forward_owned(self.mapping.forward(&z)?)?;
        let style = self.affine.forward(&w)?;

        let x = self.input.forward(latent.dim(0)?)?;
        let x = self.conv.forward(&x, &style)?;
        let x = self.act.forward_owned(self.noise.forward(&x)?)?;
        self.to_rgb.forward(&x)
    }
}

impl Trainable for TinyGenerator {
    fn parameters(&self) -> Vec<Param> {
        let mut params = self.mapping.parameters();
        params.extend(self.affine.parameters());
        params.extend(self.input.parameters());
        params.extend(self.conv.parameters());
        params.extend(self.noise.parameters());
        params.extend(self.to_rgb.parameters());
        params
    }
}

impl Network for TinyGenerator {
    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

impl GeneratorNetwork for TinyGenerator {
    fn latent_dim(&self) -> usize {
        LATENT_DIM
    }
}

/// One conv layer followed by a linear logit head
pub struct TinyDiscriminator {
    conv: EqualConv2d,
    head: EqualLinear,
    act: EqualLeakyReLU,
    num_classes: usize,
    training: bool,
}

impl TinyDiscriminator {
    pub fn new(num_classes: usize, device: &Device, rng: &SharedRng) -> Result<Self> {
        Ok(Self {
            conv: EqualConv2d::new(
                3,
                CHANNELS,
                3,
                EqualConv2dConfig {
                    padding: 1,
                    ..Default::default()
                },
                device,
                rng,
            )?,
            head: EqualLinear::new(
                CHANNELS * RESOLUTION * RESOLUTION + num_classes,
                1,
                true,
                EqualizedInit::default(),
                device,
                rng,
            )?,
            act: EqualLeakyReLU::default(),
            num_classes,
            training: false,
        })
    }

    /// Logits (N,)
    pub fn forward(&self, image: &Tensor, label: Option<&Tensor>) -> Result<Tensor> {
        let features = self.act.forward_owned(self.conv.forward(image)?)?.flatten_from(1)?;
        let features = condition(&features, label, self.num_classes)?;
        Ok(self.head.forward(&features)?.squeeze(1)?)
    }
}

impl Trainable for TinyDiscriminator {
    fn parameters(&self) -> Vec<Param> {
        let mut params = self.conv.parameters();
        params.extend(self.head.parameters());
        params
    }
}

impl Network for TinyDiscriminator {
    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

pub fn build_networks(
    num_classes: usize,
    seed: u64,
) -> Result<(TinyGenerator, TinyDiscriminator)> {
    let device = Device::Cpu;
    let rng = SharedRng::seeded(seed);
    Ok((
        TinyGenerator::new(num_classes, &device, &rng)?,
        TinyDiscriminator::new(num_classes, &device, &rng)?,
    ))
}

pub fn real_images(batch_size: usize, seed: u64) -> Result<Tensor> {
    SharedRng::seeded(seed).randn((batch_size, 3, RESOLUTION, RESOLUTION), &Device::Cpu)
}

fn softplus(x: &Tensor) -> Result<Tensor> {
    Ok(x.exp()?.affine(1.0, 1.0)?.log()?)
}

/// Non-saturating generator loss: softplus(-D(G(z)))
pub fn generator_loss(
    generator: &TinyGenerator,
    discriminator: &TinyDiscriminator,
    latent: &Tensor,
    label: Option<&Tensor>,
) -> Result<Tensor> {
    let fake = generator.forward(latent, label)?;
    softplus(&discriminator.forward(&fake, label)?.neg()?)
}

/// Logistic discriminator loss: softplus(D(G(z))) + softplus(-D(x))
pub fn discriminator_loss(
    generator: &TinyGenerator,
    discriminator: &TinyDiscriminator,
    real: &Tensor,
    latent: &Tensor,
    label: Option<&Tensor>,
) -> Result<Tensor> {
    let fake = generator.forward(latent, label)?;
    let fake_logits = discriminator.forward(&fake, label)?;
    let real_logits = discriminator.forward(real, label)?;
    Ok((softplus(&fake_logits)? + softplus(&real_logits.neg()?)?)?)
}

/// What one optimizer step saw in its gradient store
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub optimizer: &'static str,
    pub own_with_grad: usize,
    pub foreign_with_grad: usize,
}

/// Optimizer that only records which parameters received gradients
pub struct RecordingOptimizer {
    name: &'static str,
    own: Vec<Param>,
    foreign: Vec<Param>,
    log: Arc<Mutex<Vec<StepRecord>>>,
    steps: usize,
    zero_grads: usize,
}

impl RecordingOptimizer {
    pub fn new(
        name: &'static str,
        own: Vec<Param>,
        foreign: Vec<Param>,
        log: Arc<Mutex<Vec<StepRecord>>>,
    ) -> Self {
        Self {
            name,
            own,
            foreign,
            log,
            steps: 0,
            zero_grads: 0,
        }
    }
}

fn count_with_grad(params: &[Param], gradients: &GradStore) -> usize {
    params
        .iter()
        .filter(|p| gradients.get(p.var().as_tensor()).is_some())
        .count()
}

impl Optimizer for RecordingOptimizer {
    fn name(&self) -> &str {
        self.name
    }

    fn zero_grad(&mut self) -> Result<()> {
        self.zero_grads += 1;
        Ok(())
    }

    fn step(&mut self, gradients: &GradStore) -> Result<()> {
        self.steps += 1;
        self.log.lock().push(StepRecord {
            optimizer: self.name,
            own_with_grad: count_with_grad(&self.own, gradients),
            foreign_with_grad: count_with_grad(&self.foreign, gradients),
        });
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        0.0
    }

    fn set_learning_rate(&mut self, _lr: f64) {}

    fn parameter_count(&self) -> usize {
        self.own.len()
    }

    fn step_count(&self) -> usize {
        self.steps
    }
}

/// Copy every parameter's current values
pub fn snapshot(params: &[Param]) -> Result<Vec<Vec<f32>>> {
    params
        .iter()
        .map(|p| Ok(p.tensor().flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?))
        .collect()
}

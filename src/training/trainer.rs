//! Alternating adversarial training step
//!
//! One call to [`AdversarialTrainer::step`] runs the generator phase and then
//! the discriminator phase. Each phase unfreezes its own network, freezes the
//! other one, draws fresh latents (and labels), averages the injected loss,
//! backpropagates and steps the matching optimizer.

use candle_core::{DType, Device, Tensor};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::param::Trainable;
use crate::rng::SharedRng;
use crate::training::config::GanTrainingConfig;
use crate::training::loss::{DiscriminatorLoss, GeneratorLoss};
use crate::training::optimizers::{create_optimizer, Optimizer};

/// A network composed of trainable layers
pub trait Network: Trainable {
    /// Switch between training and evaluation behaviour
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;
}

/// The generator side: needs to tell the trainer its latent size
pub trait GeneratorNetwork: Network {
    fn latent_dim(&self) -> usize;
}

/// Mean losses of one training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    pub generator: f32,
    pub discriminator: f32,
}

/// Owns both networks, their optimizers and the two loss functions
pub struct AdversarialTrainer<G, D> {
    generator: G,
    discriminator: D,
    generator_loss: Box<dyn GeneratorLoss<G, D>>,
    discriminator_loss: Box<dyn DiscriminatorLoss<G, D>>,
    generator_optimizer: Box<dyn Optimizer>,
    discriminator_optimizer: Box<dyn Optimizer>,
    num_classes: Option<usize>,
    device: Device,
    rng: SharedRng,
}

impl<G, D> AdversarialTrainer<G, D>
where
    G: GeneratorNetwork,
    D: Network,
{
    /// Build a trainer whose optimizers, device and seed come from `config`
    pub fn new(
        config: &GanTrainingConfig,
        generator: G,
        discriminator: D,
        generator_loss: impl GeneratorLoss<G, D> + 'static,
        discriminator_loss: impl DiscriminatorLoss<G, D> + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let generator_optimizer =
            create_optimizer(&config.generator_optimizer, generator.parameters())?;
        let discriminator_optimizer =
            create_optimizer(&config.discriminator_optimizer, discriminator.parameters())?;

        info!(
            generator_params = generator.num_parameters(),
            discriminator_params = discriminator.num_parameters(),
            latent_dim = generator.latent_dim(),
            num_classes = ?config.class_count(),
            "initialized adversarial trainer"
        );

        Ok(Self {
            generator,
            discriminator,
            generator_loss: Box::new(generator_loss),
            discriminator_loss: Box::new(discriminator_loss),
            generator_optimizer,
            discriminator_optimizer,
            num_classes: config.class_count(),
            device: config.device.to_device()?,
            rng: SharedRng::from_seed_option(config.seed),
        })
    }

    /// Replace both optimizers
    pub fn with_optimizers(
        mut self,
        generator_optimizer: Box<dyn Optimizer>,
        discriminator_optimizer: Box<dyn Optimizer>,
    ) -> Self {
        self.generator_optimizer = generator_optimizer;
        self.discriminator_optimizer = discriminator_optimizer;
        self
    }

    /// Draw from a caller-provided generator instead of the config seed
    pub fn with_rng(mut self, rng: SharedRng) -> Self {
        self.rng = rng;
        self
    }

    /// One full iteration on a batch of real images (N, C, H, W).
    ///
    /// `label`, if given, holds one class index per image.
    #[instrument(skip_all, fields(batch_size = image.dims().first().copied()))]
    pub fn step(&mut self, image: &Tensor, label: Option<&Tensor>) -> Result<StepLosses> {
        self.generator.set_training(true);
        self.discriminator.set_training(true);

        let batch_size = image.dim(0)?;
        // reject a bad label before either network is updated
        let label = self.encode_label(label, batch_size)?;

        let generator = self.generator_phase(batch_size)?;
        let discriminator = self.run_discriminator_phase(image, label)?;

        Ok(StepLosses {
            generator,
            discriminator,
        })
    }

    /// Update the generator against a frozen discriminator
    #[instrument(skip(self))]
    pub fn generator_phase(&mut self, batch_size: usize) -> Result<f32> {
        self.generator.set_trainable(true);
        self.discriminator.set_trainable(false);
        self.generator_optimizer.zero_grad()?;

        let latent = self.sample_latent(batch_size)?;
        let fake_label = self.sample_random_label(batch_size)?;

        let loss = self
            .generator_loss
            .compute(
                &self.generator,
                &self.discriminator,
                &latent,
                fake_label.as_ref(),
            )?
            .mean_all()?;
        let gradients = loss.backward()?;
        self.generator_optimizer.step(&gradients)?;

        let loss = scalar(&loss)?;
        debug!(loss, "generator phase complete");
        Ok(loss)
    }

    /// Update the discriminator against a frozen generator
    pub fn discriminator_phase(&mut self, image: &Tensor, label: Option<&Tensor>) -> Result<f32> {
        let label = self.encode_label(label, image.dim(0)?)?;
        self.run_discriminator_phase(image, label)
    }

    /// Move a ground-truth label to the device and one-hot encode it
    fn encode_label(&self, label: Option<&Tensor>, batch_size: usize) -> Result<Option<Tensor>> {
        let Some(label) = label else {
            return Ok(None);
        };
        let Some(num_classes) = self.num_classes else {
            return Err(Error::invalid_input(
                "labels supplied to an unconditional model",
            ));
        };
        if label.dims() != [batch_size] {
            return Err(Error::shape(format!(
                "expected {batch_size} labels, got shape {:?}",
                label.dims()
            )));
        }
        Ok(Some(one_hot(&label.to_device(&self.device)?, num_classes)?))
    }

    #[instrument(skip_all)]
    fn run_discriminator_phase(&mut self, image: &Tensor, label: Option<Tensor>) -> Result<f32> {
        self.generator.set_trainable(false);
        self.discriminator.set_trainable(true);
        self.discriminator_optimizer.zero_grad()?;

        let image = image.to_device(&self.device)?;
        let batch_size = image.dim(0)?;
        let latent = self.sample_latent(batch_size)?;

        let loss = self
            .discriminator_loss
            .compute(
                &self.generator,
                &self.discriminator,
                &image,
                &latent,
                label.as_ref(),
            )?
            .mean_all()?;
        let gradients = loss.backward()?;
        self.discriminator_optimizer.step(&gradients)?;

        let loss = scalar(&loss)?;
        debug!(loss, "discriminator phase complete");
        Ok(loss)
    }

    fn sample_latent(&self, batch_size: usize) -> Result<Tensor> {
        self.rng
            .randn((batch_size, self.generator.latent_dim()), &self.device)
    }

    fn sample_random_label(&self, batch_size: usize) -> Result<Option<Tensor>> {
        let Some(num_classes) = self.num_classes else {
            return Ok(None);
        };
        let indices = self.rng.uniform_indices(batch_size, num_classes)?;
        let indices = Tensor::from_vec(indices, batch_size, &self.device)?;
        Ok(Some(one_hot(&indices, num_classes)?))
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut G {
        &mut self.generator
    }

    pub fn discriminator(&self) -> &D {
        &self.discriminator
    }

    pub fn discriminator_mut(&mut self) -> &mut D {
        &mut self.discriminator
    }

    pub fn generator_optimizer(&self) -> &dyn Optimizer {
        self.generator_optimizer.as_ref()
    }

    pub fn discriminator_optimizer(&self) -> &dyn Optimizer {
        self.discriminator_optimizer.as_ref()
    }

    /// `Some(n)` for a class-conditional model
    pub fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// Encode class indices (N,) as an f32 one-hot matrix (N, num_classes)
pub fn one_hot(labels: &Tensor, num_classes: usize) -> Result<Tensor> {
    let n = match labels.dims() {
        &[n] => n,
        dims => {
            return Err(Error::shape(format!(
                "labels must be a vector of class indices, got {dims:?}"
            )))
        }
    };

    if labels.dtype().is_float() {
        return Err(Error::invalid_input(format!(
            "labels must be integer class indices, got {:?}",
            labels.dtype()
        )));
    }

    let indices = labels.to_dtype(DType::I64)?.to_vec1::<i64>()?;
    let mut encoded = vec![0f32; n * num_classes];
    for (row, &class) in indices.iter().enumerate() {
        let class = usize::try_from(class)
            .ok()
            .filter(|&c| c < num_classes)
            .ok_or_else(|| {
                Error::invalid_input(format!("label {class} outside 0..{num_classes}"))
            })?;
        encoded[row * num_classes + class] = 1.0;
    }

    Ok(Tensor::from_vec(encoded, (n, num_classes), labels.device())?)
}

fn scalar(loss: &Tensor) -> Result<f32> {
    Ok(loss.to_dtype(DType::F32)?.to_scalar::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot() {
        let labels = Tensor::new(&[2u32, 0, 1], &Device::Cpu).unwrap();
        let encoded = one_hot(&labels, 3).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(
            encoded,
            vec![
                vec![0.0, 0.0, 1.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_one_hot_rejects_out_of_range() {
        let labels = Tensor::new(&[3i64], &Device::Cpu).unwrap();
        assert!(matches!(one_hot(&labels, 3), Err(Error::InvalidInput(_))));

        let negative = Tensor::new(&[-1i64], &Device::Cpu).unwrap();
        assert!(one_hot(&negative, 3).is_err());
    }

    #[test]
    fn test_one_hot_rejects_float_labels() {
        let labels = Tensor::new(&[2.7f32, 0.0], &Device::Cpu).unwrap();
        assert!(matches!(one_hot(&labels, 3), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_one_hot_rejects_matrix() {
        let labels = Tensor::new(&[[0u32, 1]], &Device::Cpu).unwrap();
        assert!(matches!(one_hot(&labels, 3), Err(Error::Shape(_))));
    }
}

//! Adversarial training infrastructure
//!
//! # Main Components
//!
//! - **Configuration**: optimizer, seeding, device and logging settings
//! - **Loss**: generator and discriminator objectives injected into the trainer
//! - **Optimizers**: Adam and SGD over [`Param`](crate::param::Param)s
//! - **Trainer**: the alternating generator / discriminator step
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stylegan2::training::{AdversarialTrainer, GanTrainingConfig};
//!
//! let config = GanTrainingConfig::from_file("train.yaml")?;
//! let mut trainer = AdversarialTrainer::new(
//!     &config,
//!     generator,
//!     discriminator,
//!     non_saturating_generator_loss,
//!     logistic_discriminator_loss,
//! )?;
//!
//! let losses = trainer.step(&images, None)?;
//! ```

pub mod config;
pub mod loss;
pub mod optimizers;
pub mod trainer;

#[cfg(test)]
mod tests;

pub use config::{DeviceType, GanTrainingConfig, LoggingConfig, OptimizerConfig, OptimizerType};
pub use loss::{DiscriminatorLoss, GeneratorLoss};
pub use optimizers::{create_optimizer, AdamOptimizer, Optimizer, SGDOptimizer};
pub use trainer::{one_hot, AdversarialTrainer, GeneratorNetwork, Network, StepLosses};

//! StyleGAN2 building blocks on candle
//!
//! This crate provides the equalized-learning-rate layers, the style-modulated
//! convolution and the noise injections StyleGAN2 networks are made of, plus
//! the alternating adversarial step that trains a generator against a
//! discriminator.
//!
//! ```rust,ignore
//! use stylegan2::layers::{ModulatedConv2d, ModulatedConv2dConfig};
//! use stylegan2::SharedRng;
//!
//! let rng = SharedRng::seeded(0);
//! let conv = ModulatedConv2d::new(512, 512, 3, ModulatedConv2dConfig {
//!     padding: 1,
//!     ..Default::default()
//! }, &device, &rng)?;
//! let y = conv.forward(&x, &style)?;
//! ```

#![warn(rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod layers;
pub mod logging;
pub mod param;
pub mod rng;
pub mod training;

// Re-exports
pub use error::{Error, Result};
pub use layers::{
    EqualConv2d, EqualConv2dConfig, EqualLeakyReLU, EqualLinear, EqualizedInit, InputNoise,
    ModulatedConv2d, ModulatedConv2dConfig, RandomGaussianNoise,
};
pub use logging::init_logging;
pub use param::{Param, Trainable};
pub use rng::SharedRng;
pub use training::{
    AdversarialTrainer, DiscriminatorLoss, GanTrainingConfig, GeneratorLoss, GeneratorNetwork,
    Network, StepLosses,
};

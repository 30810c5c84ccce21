//! Trainable building blocks: equalized layers, modulated convolution, noise

pub mod activation;
pub mod equalized;
pub mod modulated;
pub mod noise;

pub use activation::EqualLeakyReLU;
pub use equalized::{
    equalized_lr_init, fan_in, EqualConv2d, EqualConv2dConfig, EqualLinear, EqualizedInit,
};
pub use modulated::{ModulatedConv2d, ModulatedConv2dConfig, DEMODULATION_EPS};
pub use noise::{InputNoise, RandomGaussianNoise};

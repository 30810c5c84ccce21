//! End-to-end tests of the adversarial training step on a tiny GAN

pub mod fixtures;

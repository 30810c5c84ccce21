//! Optimizers for the generator and discriminator
//!
//! Optimizers own clones of the parameters they update. Gradients from each
//! `step` call accumulate until `zero_grad`, so a caller that skips
//! `zero_grad` gets summed gradients.

pub mod adam;
pub mod sgd;

pub use adam::AdamOptimizer;
pub use sgd::SGDOptimizer;

use candle_core::backprop::GradStore;
use candle_core::Tensor;

use crate::error::Result;
use crate::param::Param;
use crate::training::config::{OptimizerConfig, OptimizerType};

/// Trait for optimizers
pub trait Optimizer: Send {
    /// Optimizer name
    fn name(&self) -> &str;

    /// Clear accumulated gradients
    fn zero_grad(&mut self) -> Result<()>;

    /// Accumulate `gradients` and apply one update
    fn step(&mut self, gradients: &GradStore) -> Result<()>;

    /// Get current learning rate
    fn learning_rate(&self) -> f64;

    /// Set learning rate
    fn set_learning_rate(&mut self, lr: f64);

    /// Number of parameter tensors
    fn parameter_count(&self) -> usize;

    /// Number of `step` calls so far
    fn step_count(&self) -> usize;
}

/// Per-parameter gradient sums between two `zero_grad` calls
#[derive(Debug)]
pub struct GradientBuffer {
    params: Vec<Param>,
    accumulated: Vec<Option<Tensor>>,
}

impl GradientBuffer {
    pub fn new(params: Vec<Param>) -> Self {
        let accumulated = vec![None; params.len()];
        Self {
            params,
            accumulated,
        }
    }

    /// Add every gradient present in `gradients`
    pub fn accumulate(&mut self, gradients: &GradStore) -> Result<()> {
        for (param, slot) in self.params.iter().zip(self.accumulated.iter_mut()) {
            let Some(grad) = gradients.get(param.var().as_tensor()) else {
                continue;
            };
            let grad = grad.detach();
            *slot = Some(match slot.take() {
                Some(sum) => (sum + grad)?,
                None => grad,
            });
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.accumulated.iter_mut().for_each(|slot| *slot = None);
    }

    /// Parameters paired with their accumulated gradient, if any
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Param, Option<&Tensor>)> {
        self.params
            .iter()
            .zip(&self.accumulated)
            .enumerate()
            .map(|(i, (param, grad))| (i, param, grad.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Create optimizer from configuration
pub fn create_optimizer(config: &OptimizerConfig, params: Vec<Param>) -> Result<Box<dyn Optimizer>> {
    config.validate()?;

    let optimizer: Box<dyn Optimizer> = match config.optimizer_type {
        OptimizerType::Adam => Box::new(AdamOptimizer::new(
            params,
            config.learning_rate,
            config.beta1,
            config.beta2,
            config.epsilon,
            config.weight_decay,
        )),
        OptimizerType::SGD { momentum } => Box::new(SGDOptimizer::new(
            params,
            config.learning_rate,
            momentum,
            config.weight_decay,
        )),
    };

    Ok(optimizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn param(value: f32) -> Param {
        Param::new("p", &Tensor::new(&[value], &Device::Cpu).unwrap()).unwrap()
    }

    #[test]
    fn test_buffer_accumulates_until_cleared() {
        let p = param(2.0);
        let mut buffer = GradientBuffer::new(vec![p.clone()]);

        for _ in 0..2 {
            let loss = p.tensor().sqr().unwrap().sum_all().unwrap();
            buffer.accumulate(&loss.backward().unwrap()).unwrap();
        }
        let (_, _, grad) = buffer.iter().next().unwrap();
        assert_eq!(grad.unwrap().to_vec1::<f32>().unwrap(), vec![8.0]);

        buffer.clear();
        assert!(buffer.iter().all(|(_, _, g)| g.is_none()));
    }

    #[test]
    fn test_buffer_skips_missing_gradients() {
        let p = param(1.0);
        let q = param(1.0);
        let mut buffer = GradientBuffer::new(vec![p.clone(), q]);

        let loss = p.tensor().sum_all().unwrap();
        buffer.accumulate(&loss.backward().unwrap()).unwrap();

        let grads: Vec<bool> = buffer.iter().map(|(_, _, g)| g.is_some()).collect();
        assert_eq!(grads, vec![true, false]);
    }

    #[test]
    fn test_create_optimizer() {
        let params = vec![Param::new("w", &Tensor::zeros(3, DType::F32, &Device::Cpu).unwrap()).unwrap()];

        let adam = create_optimizer(&OptimizerConfig::default(), params.clone()).unwrap();
        assert_eq!(adam.name(), "adam");
        assert_eq!(adam.parameter_count(), 1);

        let sgd_config = OptimizerConfig {
            optimizer_type: OptimizerType::SGD { momentum: 0.0 },
            ..Default::default()
        };
        let sgd = create_optimizer(&sgd_config, params.clone()).unwrap();
        assert_eq!(sgd.name(), "sgd");

        let bad = OptimizerConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(create_optimizer(&bad, params).is_err());
    }
}

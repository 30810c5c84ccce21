//! SGD optimizer implementation with momentum
//!
//! This module provides the Stochastic Gradient Descent optimizer with
//! optional momentum and weight decay support.

use candle_core::backprop::GradStore;
use candle_core::Tensor;

use super::{GradientBuffer, Optimizer};
use crate::error::Result;
use crate::param::Param;

/// SGD optimizer with momentum
pub struct SGDOptimizer {
    /// Parameters and their accumulated gradients
    buffer: GradientBuffer,

    /// Learning rate
    learning_rate: f64,

    /// Momentum coefficient
    momentum: f64,

    /// Weight decay coefficient
    weight_decay: f64,

    /// Current step count
    step_count: usize,

    /// Momentum buffers
    momentum_buffers: Vec<Option<Tensor>>,
}

impl SGDOptimizer {
    /// Create a new SGD optimizer
    pub fn new(params: Vec<Param>, learning_rate: f64, momentum: f64, weight_decay: f64) -> Self {
        let n = params.len();
        Self {
            buffer: GradientBuffer::new(params),
            learning_rate,
            momentum,
            weight_decay,
            step_count: 0,
            momentum_buffers: vec![None; n],
        }
    }

    /// Apply SGD update to a parameter
    fn update_parameter(&mut self, index: usize, param: &Param, grad: &Tensor) -> Result<()> {
        let theta = param.var().as_tensor().detach();

        // Apply weight decay to gradient if specified
        let effective_grad = if self.weight_decay > 0.0 {
            (grad + theta.affine(self.weight_decay, 0.0)?)?
        } else {
            grad.clone()
        };

        let update = if self.momentum > 0.0 {
            // v_t = μ * v_{t-1} + g_t
            let velocity = match &self.momentum_buffers[index] {
                Some(v) => (v.affine(self.momentum, 0.0)? + &effective_grad)?,
                None => effective_grad,
            };
            self.momentum_buffers[index] = Some(velocity.clone());
            velocity
        } else {
            effective_grad
        };

        // θ_t = θ_{t-1} - α * update
        param.set(&(theta - update.affine(self.learning_rate, 0.0)?)?)?;
        Ok(())
    }
}

impl Optimizer for SGDOptimizer {
    fn name(&self) -> &str {
        if self.momentum > 0.0 {
            "sgd_momentum"
        } else {
            "sgd"
        }
    }

    fn zero_grad(&mut self) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn step(&mut self, gradients: &GradStore) -> Result<()> {
        self.buffer.accumulate(gradients)?;
        self.step_count += 1;

        let pending: Vec<(usize, Param, Tensor)> = self
            .buffer
            .iter()
            .filter_map(|(i, param, grad)| grad.map(|g| (i, param.clone(), g.clone())))
            .collect();

        for (index, param, grad) in pending {
            self.update_parameter(index, &param, &grad)?;
        }

        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn parameter_count(&self) -> usize {
        self.buffer.len()
    }

    fn step_count(&self) -> usize {
        self.step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn param(values: &[f32]) -> Param {
        Param::new("w", &Tensor::new(values, &Device::Cpu).unwrap()).unwrap()
    }

    #[test]
    fn test_sgd_names() {
        assert_eq!(SGDOptimizer::new(vec![], 0.01, 0.0, 0.0).name(), "sgd");
        assert_eq!(SGDOptimizer::new(vec![], 0.01, 0.9, 0.0).name(), "sgd_momentum");
    }

    #[test]
    fn test_plain_sgd_step() {
        let p = param(&[1.0, 2.0]);
        let mut optimizer = SGDOptimizer::new(vec![p.clone()], 0.1, 0.0, 0.0);

        // d/dw sum(w²) = 2w
        let loss = p.tensor().sqr().unwrap().sum_all().unwrap();
        optimizer.step(&loss.backward().unwrap()).unwrap();

        let values = p.tensor().to_vec1::<f32>().unwrap();
        assert!((values[0] - 0.8).abs() < 1e-6);
        assert!((values[1] - 1.6).abs() < 1e-6);
        assert_eq!(optimizer.step_count(), 1);
    }

    #[test]
    fn test_momentum_accelerates() {
        let p = param(&[0.0]);
        let mut optimizer = SGDOptimizer::new(vec![p.clone()], 1.0, 0.5, 0.0);

        // constant gradient of 1
        for _ in 0..2 {
            optimizer.zero_grad().unwrap();
            let loss = p.tensor().sum_all().unwrap();
            optimizer.step(&loss.backward().unwrap()).unwrap();
        }

        // -1 then -(0.5 + 1)
        let value = p.tensor().to_vec1::<f32>().unwrap()[0];
        assert!((value + 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_gradients_accumulate_without_zero_grad() {
        let p = param(&[0.0]);
        let mut optimizer = SGDOptimizer::new(vec![p.clone()], 1.0, 0.0, 0.0);

        for _ in 0..2 {
            let loss = p.tensor().sum_all().unwrap();
            optimizer.step(&loss.backward().unwrap()).unwrap();
        }

        // second step applies the summed gradient of 2
        let value = p.tensor().to_vec1::<f32>().unwrap()[0];
        assert!((value + 3.0).abs() < 1e-6);
    }
}

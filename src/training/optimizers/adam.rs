//! Adam optimizer with optional decoupled weight decay
//!
//! StyleGAN2 trains both networks with Adam at β₁ = 0, β₂ = 0.99, which is
//! the default in [`OptimizerConfig`](crate::training::OptimizerConfig).

use candle_core::backprop::GradStore;
use candle_core::Tensor;

use super::{GradientBuffer, Optimizer};
use crate::error::Result;
use crate::param::Param;

/// Adam optimizer
pub struct AdamOptimizer {
    /// Parameters and their accumulated gradients
    buffer: GradientBuffer,

    /// Learning rate
    learning_rate: f64,

    /// Beta1 parameter (momentum)
    beta1: f64,

    /// Beta2 parameter (RMSprop)
    beta2: f64,

    /// Epsilon for numerical stability
    epsilon: f64,

    /// Decoupled weight decay coefficient
    weight_decay: f64,

    /// Current step count
    step_count: usize,

    /// First moment estimates, indexed like the parameters
    momentum: Vec<Option<Tensor>>,

    /// Second moment estimates
    variance: Vec<Option<Tensor>>,
}

impl AdamOptimizer {
    /// Create a new Adam optimizer
    pub fn new(
        params: Vec<Param>,
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
        weight_decay: f64,
    ) -> Self {
        let n = params.len();
        Self {
            buffer: GradientBuffer::new(params),
            learning_rate,
            beta1,
            beta2,
            epsilon,
            weight_decay,
            step_count: 0,
            momentum: vec![None; n],
            variance: vec![None; n],
        }
    }

    /// Apply Adam update to a parameter
    fn update_parameter(&mut self, index: usize, param: &Param, grad: &Tensor) -> Result<()> {
        let theta = param.var().as_tensor().detach();

        // m_t = β₁ * m_{t-1} + (1 - β₁) * g_t
        let grad_term = grad.affine(1.0 - self.beta1, 0.0)?;
        let momentum = match &self.momentum[index] {
            Some(m) => (m.affine(self.beta1, 0.0)? + grad_term)?,
            None => grad_term,
        };

        // v_t = β₂ * v_{t-1} + (1 - β₂) * g_t²
        let sq_term = grad.sqr()?.affine(1.0 - self.beta2, 0.0)?;
        let variance = match &self.variance[index] {
            Some(v) => (v.affine(self.beta2, 0.0)? + sq_term)?,
            None => sq_term,
        };

        // Bias correction
        let t = self.step_count as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        let corrected_momentum = momentum.affine(1.0 / bias_correction1, 0.0)?;
        let denominator = variance
            .affine(1.0 / bias_correction2, 0.0)?
            .sqrt()?
            .affine(1.0, self.epsilon)?;
        let update = corrected_momentum.div(&denominator)?;

        // θ_t = θ_{t-1} - α * (m̂_t / (√v̂_t + ε) + λ * θ_{t-1})
        let mut next = (&theta - update.affine(self.learning_rate, 0.0)?)?;
        if self.weight_decay > 0.0 {
            next = (next - theta.affine(self.learning_rate * self.weight_decay, 0.0)?)?;
        }
        param.set(&next)?;

        self.momentum[index] = Some(momentum);
        self.variance[index] = Some(variance);
        Ok(())
    }
}

impl Optimizer for AdamOptimizer {
    fn name(&self) -> &str {
        "adam"
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

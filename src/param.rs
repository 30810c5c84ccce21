//! Trainable parameters and the set-trainable capability

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use candle_core::{Tensor, Var};

use crate::error::Result;

/// A gradient-tracked parameter owned by a layer
///
/// Clones share both the underlying storage and the trainable flag, so an
/// optimizer holding a clone sees every update made through the layer.
#[derive(Clone, Debug)]
pub struct Param {
    name: String,
    var: Var,
    trainable: Arc<AtomicBool>,
}

impl Param {
    /// Wrap an initial value as a trainable parameter
    pub fn new(name: impl Into<String>, init: &Tensor) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            var: Var::from_tensor(init)?,
            trainable: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Parameter name, unique within its layer
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tensor to use in a forward pass.
    ///
    /// Frozen parameters are returned detached and receive no gradient.
    pub fn tensor(&self) -> Tensor {
        if self.is_trainable() {
            self.var.as_tensor().clone()
        } else {
            self.var.as_tensor().detach()
        }
    }

    /// The tracked variable, used as the key into a `GradStore`
    pub fn var(&self) -> &Var {
        &self.var
    }

    /// Overwrite the stored values
    pub fn set(&self, value: &Tensor) -> Result<()> {
        self.var.set(value)?;
        Ok(())
    }

    /// Enable or disable gradient tracking
    pub fn set_trainable(&self, trainable: bool) {
        self.trainable.store(trainable, Ordering::Relaxed);
    }

    /// Whether gradients are tracked
    pub fn is_trainable(&self) -> bool {
        self.trainable.load(Ordering::Relaxed)
    }

    /// Number of scalar values
    pub fn elem_count(&self) -> usize {
        self.var.as_tensor().elem_count()
    }
}

/// Capability over a set of parameters
pub trait Trainable {
    /// All parameters, in a stable order
    fn parameters(&self) -> Vec<Param>;

    /// Toggle gradient tracking for every parameter
    fn set_trainable(&self, trainable: bool) {
        for param in self.parameters() {
            param.set_trainable(trainable);
        }
    }

    /// Total number of scalar parameters
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(Param::elem_count).sum()
    }
}

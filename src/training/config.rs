//! Training configuration for the adversarial loop
//!
//! Optimizer settings for both networks, class conditioning, seeding, device
//! selection and logging, loadable from JSON or YAML.

use std::path::Path;

use anyhow::Context;
use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GanTrainingConfig {
    /// Number of classes for a class-conditional model; `None` (or < 2) for unconditional
    pub num_classes: Option<usize>,

    /// Seed for latent, label and noise sampling; `None` draws from the OS
    pub seed: Option<u64>,

    /// Compute device
    pub device: DeviceType,

    /// Generator optimizer
    pub generator_optimizer: OptimizerConfig,

    /// Discriminator optimizer
    pub discriminator_optimizer: OptimizerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Optimizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Optimizer type
    pub optimizer_type: OptimizerType,

    /// Base learning rate
    pub learning_rate: f64,

    /// Beta1 parameter for Adam
    pub beta1: f64,

    /// Beta2 parameter for Adam
    pub beta2: f64,

    /// Epsilon for numerical stability
    pub epsilon: f64,

    /// Weight decay coefficient
    pub weight_decay: f64,
}

/// Optimizer types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerType {
    Adam,
    SGD { momentum: f64 },
}

/// Device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Cuda { ordinal: usize },
    Metal { ordinal: usize },
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Emit JSON lines instead of plain text
    pub json: bool,
}

impl GanTrainingConfig {
    /// Create a new training configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read configuration file")?;

        let config: Self = if is_json(path.as_ref()) {
            serde_json::from_str(&content).context("Failed to parse JSON configuration")?
        } else {
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = if is_json(path.as_ref()) {
            serde_json::to_string_pretty(self)
                .context("Failed to serialize configuration to JSON")?
        } else {
            serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")?
        };

        std::fs::write(path.as_ref(), content).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(num_classes) = self.num_classes {
            if num_classes < 2 {
                return Err(Error::config(format!(
                    "num_classes must be at least 2 when set, got {num_classes}"
                )));
            }
        }

        self.generator_optimizer
            .validate()
            .map_err(|e| Error::config(format!("generator optimizer: {e}")))?;
        self.discriminator_optimizer
            .validate()
            .map_err(|e| Error::config(format!("discriminator optimizer: {e}")))?;

        Ok(())
    }

    /// Number of classes if the model is class-conditional
    pub fn class_count(&self) -> Option<usize> {
        self.num_classes.filter(|&n| n >= 2)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

impl OptimizerConfig {
    /// Validate hyperparameters
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) {
            return Err(Error::config("Learning rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(Error::config("Adam betas must be in [0.0, 1.0)"));
        }
        if !(self.epsilon > 0.0) {
            return Err(Error::config("Epsilon must be positive"));
        }
        if !(self.weight_decay >= 0.0) {
            return Err(Error::config("Weight decay must be non-negative"));
        }
        if let OptimizerType::SGD { momentum } = self.optimizer_type {
            if !(0.0..1.0).contains(&momentum) {
                return Err(Error::config("SGD momentum must be in [0.0, 1.0)"));
            }
        }
        Ok(())
    }
}

impl DeviceType {
    /// Open the device
    pub fn to_device(&self) -> Result<Device> {
        Ok(match *self {
            DeviceType::Cpu => Device::Cpu,
            DeviceType::Cuda { ordinal } => Device::new_cuda(ordinal)?,
            DeviceType::Metal { ordinal } => Device::new_metal(ordinal)?,
        })
    }
}

impl Default for GanTrainingConfig {
    fn default() -> Self {
        Self {
            num_classes: None,
            seed: None,
            device: DeviceType::Cpu,
            generator_optimizer: OptimizerConfig::default(),
            discriminator_optimizer: OptimizerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            optimizer_type: OptimizerType::Adam,
            learning_rate: 2e-3,
            beta1: 0.0,
            beta2: 0.99,
            epsilon: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Cpu
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

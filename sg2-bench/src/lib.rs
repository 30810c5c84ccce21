//! Benchmark helpers for the StyleGAN2 layers
//!
//! Shared setup for the criterion benches: sizes to sweep and seeded inputs
//! so every run measures the same data.

use std::time::Duration;

use candle_core::{Device, Tensor};
use stylegan2::{ModulatedConv2d, ModulatedConv2dConfig, Result, SharedRng};

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Batch sizes to benchmark
    pub batch_sizes: Vec<usize>,
    /// Channel counts (in = out)
    pub channels: Vec<usize>,
    /// Spatial resolution of the feature maps
    pub resolution: usize,
    /// Measurement time per benchmark
    pub measurement_time: Duration,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            batch_sizes: vec![1, 4, 16],
            channels: vec![32, 128],
            resolution: 16,
            measurement_time: Duration::from_secs(5),
        }
    }
}

/// A 3x3 modulated conv with its input and style batch
pub struct ModulatedCase {
    pub conv: ModulatedConv2d,
    pub input: Tensor,
    pub style: Tensor,
}

impl ModulatedCase {
    pub fn new(batch_size: usize, channels: usize, resolution: usize, seed: u64) -> Result<Self> {
        let device = Device::Cpu;
        let rng = SharedRng::seeded(seed);
        let conv = ModulatedConv2d::new(
            channels,
            channels,
            3,
            ModulatedConv2dConfig {
                padding: 1,
                ..Default::default()
            },
            &device,
            &rng,
        )?;
        let input = rng.randn((batch_size, channels, resolution, resolution), &device)?;
        let style = rng.normal((batch_size, channels), 1.0, 0.2, &device)?;
        Ok(Self { conv, input, style })
    }
}

//! Loss-function interfaces of the adversarial loop
//!
//! The concrete losses (non-saturating, R1, ...) live with the network
//! topology. The trainer only needs a per-example loss tensor, which it
//! averages before backpropagating. Plain closures with the right signature
//! implement both traits.

use candle_core::Tensor;

use crate::error::Result;

/// Generator objective: `(G, D, latent, label) -> (N,)`
pub trait GeneratorLoss<G, D> {
    fn compute(
        &self,
        generator: &G,
        discriminator: &D,
        latent: &Tensor,
        label: Option<&Tensor>,
    ) -> Result<Tensor>;
}

/// Discriminator objective: `(G, D, real, latent, label) -> (N,)`
pub trait DiscriminatorLoss<G, D> {
    fn compute(
        &self,
        generator: &G,
        discriminator: &D,
        real: &Tensor,
        latent: &Tensor,
        label: Option<&Tensor>,
    ) -> Result<Tensor>;
}

impl<G, D, F> GeneratorLoss<G, D> for F
where
    F: Fn(&G, &D, &Tensor, Option<&Tensor>) -> Result<Tensor>,
{
    fn compute(
        &self,
        generator: &G,
        discriminator: &D,
        latent: &Tensor,
        label: Option<&Tensor>,
    ) -> Result<Tensor> {
        self(generator, discriminator, latent, label)
    }
}

impl<G, D, F> DiscriminatorLoss<G, D> for F
where
    F: Fn(&G, &D, &Tensor, &Tensor, Option<&Tensor>) -> Result<Tensor>,
{
    fn compute(
        &self,
        generator: &G,
        discriminator: &D,
        real: &Tensor,
        latent: &Tensor,
        label: Option<&Tensor>,
    ) -> Result<Tensor> {
        self(generator, discriminator, real, latent, label)
    }
}

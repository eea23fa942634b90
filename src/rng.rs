use super::*;
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

/// The plateau-escape PRNG of spec §4.6: a long-period generator reseeded
/// from the platform's secure entropy source every `reseed_interval`
/// draws. Dormant whenever `EngineConfig::max_random_input` is `0` (the
/// shipped default), since no caller of this draw ever happens — but
/// wired for correctness parity and future use, per spec §9.
pub struct PlateauRng {
    rng: StdRng,
    draws_since_reseed: u64,
    reseed_interval: u64,
}

impl PlateauRng {
    /// Opens the entropy source and seeds the generator. Fails the way
    /// spec §6's `init` fails: if the platform's secure random source
    /// can't be read.
    pub fn new(reseed_interval: u64) -> Result<Self, EngineError> {
        let rng = StdRng::from_seed(Self::seed_from_entropy()?);
        Ok(PlateauRng {
            rng,
            draws_since_reseed: 0,
            reseed_interval,
        })
    }

    fn seed_from_entropy() -> Result<<StdRng as SeedableRng>::Seed, EngineError> {
        let mut seed = <StdRng as SeedableRng>::Seed::default();
        OsRng.try_fill_bytes(&mut seed).map_err(|_| {
            error!(target: "gradsolve::rng", "entropy source unavailable");
            EngineError::EntropyUnavailable
        })?;
        Ok(seed)
    }

    /// Reseed if `reseed_interval` draws have elapsed since the last
    /// reseed. A reseed failure mid-run is logged and the existing
    /// generator keeps running rather than aborting a search in progress
    /// — spec §6's fatal-at-init contract applies to `init`, not to an
    /// in-flight reseed.
    fn tick(&mut self) {
        self.draws_since_reseed += 1;
        if self.draws_since_reseed >= self.reseed_interval {
            match Self::seed_from_entropy() {
                Ok(seed) => {
                    self.rng = StdRng::from_seed(seed);
                    self.draws_since_reseed = 0;
                    trace!(target: "gradsolve::rng", "reseeded plateau-escape RNG");
                }
                Err(_) => {
                    warn!(target: "gradsolve::rng", "entropy reseed failed, continuing with current RNG state");
                }
            }
        }
    }

    /// Draw a random bit position in `[0, 8)` for the plateau-escape
    /// perturbation.
    pub fn random_bit_position(&mut self) -> u8 {
        self.tick();
        self.rng.gen_range(0..8)
    }

    /// Draw a random coordinate index in `[0, n)` to perturb.
    pub fn random_index(&mut self, n: usize) -> usize {
        self.tick();
        self.rng.gen_range(0..n)
    }
}

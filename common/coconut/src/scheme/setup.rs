// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use bls12_381::{G1Affine, G2Affine, G2Prepared, G1Projective, Scalar};
use group::ff::Field;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::error::{CoconutError, Result};
use crate::utils::hash_g1;

/// System-wide public parameters of the scheme.
///
/// The group data is immutable once created; the only mutable piece is the
/// embedded RNG, which is serialised behind its own mutex and never handed
/// out by reference.
pub struct Parameters {
    g1: G1Affine,
    g2: G2Affine,
    hs: Vec<G1Projective>,
    g2_prepared_miller: G2Prepared,
    rng: Mutex<ChaCha20Rng>,
}

impl Parameters {
    pub fn new(num_attributes: u32) -> Result<Parameters> {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::new_from_seed(num_attributes, seed)
    }

    /// Deterministic variant of [`Parameters::new`]. Two instances created
    /// from the same seed draw identical randomness, which the tests rely on.
    pub fn new_from_seed(num_attributes: u32, seed: [u8; 32]) -> Result<Parameters> {
        if num_attributes == 0 {
            return Err(CoconutError::Setup(
                "tried to setup the scheme for 0 attributes".to_string(),
            ));
        }

        let hs = (0..num_attributes)
            .map(|i| hash_g1(format!("h{i}")))
            .collect();

        Ok(Parameters {
            g1: G1Affine::generator(),
            g2: G2Affine::generator(),
            hs,
            g2_prepared_miller: G2Prepared::from(G2Affine::generator()),
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        })
    }

    pub(crate) fn gen1(&self) -> &G1Affine {
        &self.g1
    }

    pub(crate) fn gen2(&self) -> &G2Affine {
        &self.g2
    }

    pub(crate) fn gen_hs(&self) -> &[G1Projective] {
        &self.hs
    }

    pub(crate) fn prepared_miller_g2(&self) -> &G2Prepared {
        &self.g2_prepared_miller
    }

    /// Maximum number of attributes a credential issued under these
    /// parameters can embed.
    pub fn max_attributes(&self) -> usize {
        self.hs.len()
    }

    pub fn random_scalar(&self) -> Scalar {
        // the lock is poisoned only if another holder panicked mid-draw;
        // at that point continuing with the same stream is still sound
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Scalar::random(&mut *rng)
    }

    pub fn n_random_scalars(&self, n: usize) -> Vec<Scalar> {
        (0..n).map(|_| self.random_scalar()).collect()
    }
}

/// Generates the public parameters required by the scheme;
/// `num_attributes` indicates the maximum number of attributes that can be
/// embedded in a credential.
pub fn setup(num_attributes: u32) -> Result<Parameters> {
    Parameters::new(num_attributes)
}

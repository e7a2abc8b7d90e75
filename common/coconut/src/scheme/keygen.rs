// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use bls12_381::{G2Projective, Scalar};
use group::Curve;

use crate::error::{CoconutError, Result};
use crate::scheme::setup::Parameters;
use crate::scheme::SignerIndex;
use crate::traits::{Base58, Bytable};
use crate::utils::{
    try_deserialize_g2_projective, try_deserialize_scalar, try_deserialize_scalar_vec, Polynomial,
};

/// Secret key of a (possibly partial) issuing authority.
#[derive(Debug, PartialEq, Eq)]
pub struct SecretKey {
    pub(crate) x: Scalar,
    pub(crate) ys: Vec<Scalar>,
}

impl SecretKey {
    /// Derives the corresponding verification key.
    pub fn verification_key(&self, params: &Parameters) -> VerificationKey {
        let g2 = params.gen2();
        VerificationKey {
            alpha: g2 * self.x,
            beta: self.ys.iter().map(|y| g2 * y).collect(),
        }
    }

    // x || ys.len() || ys
    pub fn to_bytes(&self) -> Vec<u8> {
        let ys_len = self.ys.len() as u64;
        let mut bytes = Vec::with_capacity(32 + 8 + self.ys.len() * 32);
        bytes.extend_from_slice(&self.x.to_bytes());
        bytes.extend_from_slice(&ys_len.to_le_bytes());
        for y in &self.ys {
            bytes.extend_from_slice(&y.to_bytes())
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<SecretKey> {
        if bytes.len() < 32 + 8 + 32 || (bytes.len() - 8) % 32 != 0 {
            return Err(CoconutError::DeserializationMinLength {
                min: 32 + 8 + 32,
                actual: bytes.len(),
            });
        }

        let x = try_deserialize_scalar(&bytes[..32])?;
        // safety: fixed-size subslice of a checked slice
        #[allow(clippy::unwrap_used)]
        let ys_len = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
        let ys = try_deserialize_scalar_vec(ys_len, &bytes[40..])?;

        Ok(SecretKey { x, ys })
    }
}

impl Bytable for SecretKey {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        SecretKey::from_bytes(slice)
    }
}

impl Base58 for SecretKey {}

/// Verification key matching a [`SecretKey`]; alpha = g2^x,
/// beta_i = g2^{y_i}.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    pub(crate) alpha: G2Projective,
    pub(crate) beta: Vec<G2Projective>,
}

impl VerificationKey {
    pub fn alpha(&self) -> &G2Projective {
        &self.alpha
    }

    pub fn beta(&self) -> &[G2Projective] {
        &self.beta
    }

    /// Number of attributes this key can verify.
    pub fn max_attributes(&self) -> usize {
        self.beta.len()
    }

    // alpha || beta.len() || beta
    pub fn to_bytes(&self) -> Vec<u8> {
        let beta_len = self.beta.len() as u64;
        let mut bytes = Vec::with_capacity(96 + 8 + self.beta.len() * 96);
        bytes.extend_from_slice(&self.alpha.to_affine().to_compressed());
        bytes.extend_from_slice(&beta_len.to_le_bytes());
        for beta in &self.beta {
            bytes.extend_from_slice(&beta.to_affine().to_compressed())
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<VerificationKey> {
        if bytes.len() < 96 + 8 + 96 || (bytes.len() - 8) % 96 != 0 {
            return Err(CoconutError::DeserializationMinLength {
                min: 96 + 8 + 96,
                actual: bytes.len(),
            });
        }

        // safety: we've just made the length checks
        #[allow(clippy::unwrap_used)]
        let alpha_bytes: &[u8; 96] = &bytes[..96].try_into().unwrap();
        let alpha = try_deserialize_g2_projective(alpha_bytes)?;

        #[allow(clippy::unwrap_used)]
        let beta_len = u64::from_le_bytes(bytes[96..104].try_into().unwrap());
        if bytes[104..].len() != beta_len as usize * 96 {
            return Err(CoconutError::Deserialization(format!(
                "expected {} beta elements, got {} bytes",
                beta_len,
                bytes[104..].len()
            )));
        }

        let mut beta = Vec::with_capacity(beta_len as usize);
        for i in 0..beta_len as usize {
            // safety: bound check performed above
            #[allow(clippy::unwrap_used)]
            let beta_bytes: &[u8; 96] = &bytes[104 + i * 96..104 + (i + 1) * 96].try_into().unwrap();
            beta.push(try_deserialize_g2_projective(beta_bytes)?)
        }

        Ok(VerificationKey { alpha, beta })
    }
}

impl Bytable for VerificationKey {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        VerificationKey::from_bytes(slice)
    }
}

impl Base58 for VerificationKey {}

pub struct KeyPair {
    secret_key: SecretKey,
    verification_key: VerificationKey,

    /// Index of the share in a threshold setup; `None` for a standalone key.
    pub index: Option<SignerIndex>,
}

impl KeyPair {
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn verification_key(&self) -> &VerificationKey {
        &self.verification_key
    }
}

/// Generates a single fresh keypair; x and the ys are drawn uniformly at
/// random.
pub fn keygen(params: &Parameters) -> KeyPair {
    let attributes = params.max_attributes();

    let x = params.random_scalar();
    let ys = params.n_random_scalars(attributes);
    let secret_key = SecretKey { x, ys };
    let verification_key = secret_key.verification_key(params);

    KeyPair {
        secret_key,
        verification_key,
        index: None,
    }
}

/// Trusted-dealer threshold key generation: samples `q + 1` polynomials of
/// degree `threshold - 1` and hands authority `i` their evaluations at `i`.
/// Any `threshold`-sized subset of the shares reconstructs the master key
/// via Lagrange interpolation.
pub fn ttp_keygen(
    params: &Parameters,
    threshold: u64,
    num_authorities: u64,
) -> Result<Vec<KeyPair>> {
    if threshold == 0 {
        return Err(CoconutError::Keygen(
            "tried to generate threshold keys with a 0 threshold value".to_string(),
        ));
    }

    if threshold > num_authorities {
        return Err(CoconutError::Keygen(
            "tried to generate threshold keys for threshold value being higher than number of the signing authorities".to_string(),
        ));
    }

    let attributes = params.max_attributes();

    // generate polynomials
    let v = Polynomial::new_random(params, threshold - 1);
    let ws = (0..attributes)
        .map(|_| Polynomial::new_random(params, threshold - 1))
        .collect::<Vec<_>>();

    // TODO: potentially if we had some known authority identifier we could
    // use that instead of the increasing (1, 2, 3, ...) sequence
    let polynomial_indices = (1..=num_authorities).collect::<Vec<_>>();

    // generate the secret shares
    let secret_keys = polynomial_indices
        .iter()
        .map(|&index| {
            let x = v.evaluate(&Scalar::from(index));
            let ys = ws
                .iter()
                .map(|w| w.evaluate(&Scalar::from(index)))
                .collect();
            SecretKey { x, ys }
        })
        .collect::<Vec<_>>();

    let keypairs = polynomial_indices
        .into_iter()
        .zip(secret_keys)
        .map(|(index, secret_key)| {
            let verification_key = secret_key.verification_key(params);
            KeyPair {
                secret_key,
                verification_key,
                index: Some(index),
            }
        })
        .collect();

    Ok(keypairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::setup::setup;

    #[test]
    fn secret_key_bytes_roundtrip() {
        let params = setup(3).unwrap();
        let keypair = keygen(&params);

        let bytes = keypair.secret_key().to_bytes();
        assert_eq!(
            keypair.secret_key(),
            &SecretKey::from_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn verification_key_bytes_roundtrip() {
        let params = setup(3).unwrap();
        let keypair = keygen(&params);

        let bytes = keypair.verification_key().to_bytes();
        assert_eq!(
            keypair.verification_key(),
            &VerificationKey::from_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn ttp_keygen_rejects_invalid_arguments() {
        let params = setup(2).unwrap();

        assert!(ttp_keygen(&params, 0, 3).is_err());
        assert!(ttp_keygen(&params, 4, 3).is_err());
        assert!(ttp_keygen(&params, 1, 0).is_err());
    }

    #[test]
    fn ttp_keygen_hands_out_consecutive_indices() {
        let params = setup(2).unwrap();
        let keypairs = ttp_keygen(&params, 2, 3).unwrap();

        let indices = keypairs
            .iter()
            .map(|keypair| keypair.index.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(vec![1, 2, 3], indices);
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Borrow;

use bls12_381::{G1Projective, G2Projective, Scalar};
use digest::Digest;
use group::Curve;
use sha2::Sha256;

use crate::elgamal::{EphemeralKey, PublicKey};
use crate::error::{CoconutError, Result};
use crate::scheme::keygen::VerificationKey;
use crate::scheme::setup::Parameters;
use crate::scheme::Signature;
use crate::utils::{hash_g1, try_deserialize_scalar, try_deserialize_scalar_vec};
use crate::Attribute;

type ChallengeDigest = Sha256;

/// Domain separators keeping the Fiat-Shamir challenges of the two proof
/// systems disjoint.
const CM_CS_DOMAIN: &[u8] = b"OPAL-PROOF-CM-CS-V01";
const KAPPA_NU_DOMAIN: &[u8] = b"OPAL-PROOF-KAPPA-NU-V01";

/// Generates a scalar challenge by hashing a series of byte chunks.
fn compute_challenge<D, I, B>(iter: I) -> Scalar
where
    D: Digest,
    I: Iterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut h = D::new();
    for chunk in iter {
        h.update(chunk);
    }
    let digest = h.finalize();

    let mut bytes = [0u8; 64];
    let pad_size = 64usize.saturating_sub(digest.len());
    bytes[pad_size..].copy_from_slice(&digest);

    Scalar::from_bytes_wide(&bytes)
}

fn produce_response(witness: &Scalar, challenge: &Scalar, secret: &Scalar) -> Scalar {
    witness - challenge * secret
}

// note: it's caller's responsibility to ensure witnesses.len() = secrets.len()
fn produce_responses<S>(witnesses: &[Scalar], challenge: &Scalar, secrets: &[S]) -> Vec<Scalar>
where
    S: Borrow<Scalar>,
{
    debug_assert_eq!(witnesses.len(), secrets.len());

    witnesses
        .iter()
        .zip(secrets.iter())
        .map(|(w, x)| produce_response(w, challenge, x.borrow()))
        .collect()
}

/// The issuance proof (pi_s): proves knowledge of the commitment opening,
/// the ElGamal ephemeral keys and the attributes hidden inside the
/// blind-sign request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofCmCs {
    challenge: Scalar,
    // rr
    response_opening: Scalar,
    // rk
    response_keys: Vec<Scalar>,
    // rm; private attributes followed by public ones
    response_attributes: Vec<Scalar>,
}

impl ProofCmCs {
    /// Constructs a non-interactive zero-knowledge proof of correctness of
    /// the ciphertexts and the commitment.
    pub(crate) fn construct(
        params: &Parameters,
        pub_key: &PublicKey,
        ephemeral_keys: &[EphemeralKey],
        commitment: &G1Projective,
        blinding_factor: &Scalar,
        private_attributes: &[Attribute],
        public_attributes: &[Attribute],
    ) -> Self {
        // witnesses
        let witness_blinder = params.random_scalar();
        let witness_keys = params.n_random_scalars(ephemeral_keys.len());
        let witness_attributes =
            params.n_random_scalars(private_attributes.len() + public_attributes.len());

        let h = hash_g1(commitment.to_affine().to_compressed());

        // witness commitments
        let commitment_keys1 = witness_keys
            .iter()
            .map(|wk| params.gen1() * wk)
            .collect::<Vec<_>>();
        let commitment_keys2 = witness_keys
            .iter()
            .zip(witness_attributes.iter())
            .map(|(wk, wm)| pub_key.gamma() * wk + h * wm)
            .collect::<Vec<_>>();
        let commitment_attributes = params.gen1() * witness_blinder
            + witness_attributes
                .iter()
                .zip(params.gen_hs().iter())
                .map(|(wm, hs)| hs * wm)
                .sum::<G1Projective>();

        let challenge = Self::compute_proof_challenge(
            params,
            pub_key,
            commitment,
            &h,
            &commitment_attributes,
            &commitment_keys1,
            &commitment_keys2,
        );

        // responses
        let response_opening = produce_response(&witness_blinder, &challenge, blinding_factor);
        let response_keys = produce_responses(&witness_keys, &challenge, ephemeral_keys);
        let response_attributes = produce_responses(
            &witness_attributes,
            &challenge,
            &private_attributes
                .iter()
                .chain(public_attributes.iter())
                .collect::<Vec<_>>(),
        );

        ProofCmCs {
            challenge,
            response_opening,
            response_keys,
            response_attributes,
        }
    }

    pub(crate) fn verify(
        &self,
        params: &Parameters,
        pub_key: &PublicKey,
        commitment: &G1Projective,
        attributes_ciphertexts: &[crate::elgamal::Ciphertext],
        public_attributes_len: usize,
    ) -> bool {
        if self.response_keys.len() != attributes_ciphertexts.len() {
            return false;
        }
        if self.response_attributes.len() != attributes_ciphertexts.len() + public_attributes_len {
            return false;
        }
        if self.response_attributes.len() > params.gen_hs().len() {
            return false;
        }

        let h = hash_g1(commitment.to_affine().to_compressed());

        // recompute witness commitments
        let commitment_keys1 = attributes_ciphertexts
            .iter()
            .zip(self.response_keys.iter())
            .map(|(ciphertext, rk)| ciphertext.c1() * self.challenge + params.gen1() * rk)
            .collect::<Vec<_>>();
        let commitment_keys2 = attributes_ciphertexts
            .iter()
            .zip(self.response_keys.iter().zip(self.response_attributes.iter()))
            .map(|(ciphertext, (rk, rm))| {
                ciphertext.c2() * self.challenge + pub_key.gamma() * rk + h * rm
            })
            .collect::<Vec<_>>();
        let commitment_attributes = commitment * self.challenge
            + params.gen1() * self.response_opening
            + self
                .response_attributes
                .iter()
                .zip(params.gen_hs().iter())
                .map(|(rm, hs)| hs * rm)
                .sum::<G1Projective>();

        let challenge = Self::compute_proof_challenge(
            params,
            pub_key,
            commitment,
            &h,
            &commitment_attributes,
            &commitment_keys1,
            &commitment_keys2,
        );

        challenge == self.challenge
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_proof_challenge(
        params: &Parameters,
        pub_key: &PublicKey,
        commitment: &G1Projective,
        h: &G1Projective,
        commitment_attributes: &G1Projective,
        commitment_keys1: &[G1Projective],
        commitment_keys2: &[G1Projective],
    ) -> Scalar {
        let g1_bytes = params.gen1().to_compressed();
        let gamma_bytes = pub_key.gamma().to_affine().to_compressed();
        let commitment_bytes = commitment.to_affine().to_compressed();
        let h_bytes = h.to_affine().to_compressed();
        let cm_attributes_bytes = commitment_attributes.to_affine().to_compressed();
        let hs_bytes = params
            .gen_hs()
            .iter()
            .map(|hs| hs.to_affine().to_compressed())
            .collect::<Vec<_>>();
        let keys1_bytes = commitment_keys1
            .iter()
            .map(|cm| cm.to_affine().to_compressed())
            .collect::<Vec<_>>();
        let keys2_bytes = commitment_keys2
            .iter()
            .map(|cm| cm.to_affine().to_compressed())
            .collect::<Vec<_>>();

        compute_challenge::<ChallengeDigest, _, _>(
            std::iter::once(CM_CS_DOMAIN)
                .chain(std::iter::once(g1_bytes.as_ref()))
                .chain(std::iter::once(gamma_bytes.as_ref()))
                .chain(std::iter::once(commitment_bytes.as_ref()))
                .chain(std::iter::once(h_bytes.as_ref()))
                .chain(std::iter::once(cm_attributes_bytes.as_ref()))
                .chain(hs_bytes.iter().map(|hs| hs.as_ref()))
                .chain(keys1_bytes.iter().map(|cm| cm.as_ref()))
                .chain(keys2_bytes.iter().map(|cm| cm.as_ref())),
        )
    }

    // challenge || response opening || keys len || response keys || attributes len || response attributes
    pub fn to_bytes(&self) -> Vec<u8> {
        let keys_len = self.response_keys.len() as u64;
        let attributes_len = self.response_attributes.len() as u64;

        let mut bytes = Vec::with_capacity(16 + (2 + keys_len as usize + attributes_len as usize) * 32);

        bytes.extend_from_slice(&self.challenge.to_bytes());
        bytes.extend_from_slice(&self.response_opening.to_bytes());

        bytes.extend_from_slice(&keys_len.to_le_bytes());
        for rk in &self.response_keys {
            bytes.extend_from_slice(&rk.to_bytes());
        }

        bytes.extend_from_slice(&attributes_len.to_le_bytes());
        for rm in &self.response_attributes {
            bytes.extend_from_slice(&rm.to_bytes());
        }

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // at the very minimum there must be a single attribute being proven
        if bytes.len() < 32 * 4 + 16 || (bytes.len() - 16) % 32 != 0 {
            return Err(CoconutError::DeserializationMinLength {
                min: 32 * 4 + 16,
                actual: bytes.len(),
            });
        }

        let mut idx = 0;
        let challenge = try_deserialize_scalar(&bytes[idx..idx + 32])?;
        idx += 32;
        let response_opening = try_deserialize_scalar(&bytes[idx..idx + 32])?;
        idx += 32;

        // safety: bound checks made above
        #[allow(clippy::unwrap_used)]
        let keys_len = u64::from_le_bytes(bytes[idx..idx + 8].try_into().unwrap());
        idx += 8;
        if bytes[idx..].len() < keys_len as usize * 32 + 8 {
            return Err(CoconutError::DeserializationMinLength {
                min: keys_len as usize * 32 + 8,
                actual: bytes[idx..].len(),
            });
        }
        let response_keys =
            try_deserialize_scalar_vec(keys_len, &bytes[idx..idx + keys_len as usize * 32])?;
        idx += keys_len as usize * 32;

        #[allow(clippy::unwrap_used)]
        let attributes_len = u64::from_le_bytes(bytes[idx..idx + 8].try_into().unwrap());
        idx += 8;
        let response_attributes = try_deserialize_scalar_vec(attributes_len, &bytes[idx..])?;

        Ok(ProofCmCs {
            challenge,
            response_opening,
            response_keys,
            response_attributes,
        })
    }
}

/// The showing proof (pi_v): proves knowledge of the signature blinder and
/// the private attributes consistent with kappa and nu. The tumbler variant
/// additionally binds the proof to the double-spend tag zeta and the
/// recipient address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofKappaNu {
    challenge: Scalar,
    // rt
    response_blinder: Scalar,
    // rm
    response_attributes: Vec<Scalar>,
}

#[allow(clippy::too_many_arguments)]
fn compute_show_challenge(
    params: &Parameters,
    verification_key: &VerificationKey,
    kappa: &G2Projective,
    nu: &G1Projective,
    commitment_kappa: &G2Projective,
    commitment_nu: &G1Projective,
    tumbler_part: Option<(&G1Projective, &G1Projective, &[u8])>,
) -> Scalar {
    let g1_bytes = params.gen1().to_compressed();
    let g2_bytes = params.gen2().to_compressed();
    let alpha_bytes = verification_key.alpha().to_affine().to_compressed();
    let kappa_bytes = kappa.to_affine().to_compressed();
    let nu_bytes = nu.to_affine().to_compressed();
    let commitment_kappa_bytes = commitment_kappa.to_affine().to_compressed();
    let commitment_nu_bytes = commitment_nu.to_affine().to_compressed();
    let beta_bytes = verification_key
        .beta()
        .iter()
        .map(|beta| beta.to_affine().to_compressed())
        .collect::<Vec<_>>();

    // the tumbler form additionally commits to zeta, its witness commitment
    // and the address the proof is bound to
    let (zeta_bytes, commitment_zeta_bytes, address) = match tumbler_part {
        Some((zeta, commitment_zeta, address)) => (
            zeta.to_affine().to_compressed().to_vec(),
            commitment_zeta.to_affine().to_compressed().to_vec(),
            address.to_vec(),
        ),
        None => (Vec::new(), Vec::new(), Vec::new()),
    };

    compute_challenge::<ChallengeDigest, _, _>(
        std::iter::once(KAPPA_NU_DOMAIN)
            .chain(std::iter::once(g1_bytes.as_ref()))
            .chain(std::iter::once(g2_bytes.as_ref()))
            .chain(std::iter::once(alpha_bytes.as_ref()))
            .chain(std::iter::once(kappa_bytes.as_ref()))
            .chain(std::iter::once(nu_bytes.as_ref()))
            .chain(std::iter::once(commitment_kappa_bytes.as_ref()))
            .chain(std::iter::once(commitment_nu_bytes.as_ref()))
            .chain(beta_bytes.iter().map(|beta| beta.as_ref()))
            .chain(std::iter::once(zeta_bytes.as_ref()))
            .chain(std::iter::once(commitment_zeta_bytes.as_ref()))
            .chain(std::iter::once(address.as_ref())),
    )
}

impl ProofKappaNu {
    pub(crate) fn construct(
        params: &Parameters,
        verification_key: &VerificationKey,
        signature: &Signature,
        private_attributes: &[Attribute],
        blinding_factor: &Scalar,
        kappa: &G2Projective,
        nu: &G1Projective,
    ) -> Self {
        let witness_blinder = params.random_scalar();
        let witness_attributes = params.n_random_scalars(private_attributes.len());

        // Aw = g2^wt * alpha * prod(beta_i^wm_i)
        let commitment_kappa = params.gen2() * witness_blinder
            + verification_key.alpha()
            + witness_attributes
                .iter()
                .zip(verification_key.beta().iter())
                .map(|(wm, beta)| beta * wm)
                .sum::<G2Projective>();
        // Bw = sigma1^wt
        let commitment_nu = signature.sig1() * witness_blinder;

        let challenge = compute_show_challenge(
            params,
            verification_key,
            kappa,
            nu,
            &commitment_kappa,
            &commitment_nu,
            None,
        );

        let response_blinder = produce_response(&witness_blinder, &challenge, blinding_factor);
        let response_attributes =
            produce_responses(&witness_attributes, &challenge, private_attributes);

        ProofKappaNu {
            challenge,
            response_blinder,
            response_attributes,
        }
    }

    pub(crate) fn verify(
        &self,
        params: &Parameters,
        verification_key: &VerificationKey,
        signature: &Signature,
        kappa: &G2Projective,
        nu: &G1Projective,
    ) -> bool {
        if self.response_attributes.len() > verification_key.beta().len() {
            return false;
        }

        let one_minus_c = Scalar::one() - self.challenge;

        let commitment_kappa = kappa * self.challenge
            + params.gen2() * self.response_blinder
            + verification_key.alpha() * one_minus_c
            + self
                .response_attributes
                .iter()
                .zip(verification_key.beta().iter())
                .map(|(rm, beta)| beta * rm)
                .sum::<G2Projective>();
        let commitment_nu = nu * self.challenge + signature.sig1() * self.response_blinder;

        let challenge = compute_show_challenge(
            params,
            verification_key,
            kappa,
            nu,
            &commitment_kappa,
            &commitment_nu,
            None,
        );

        challenge == self.challenge
    }

    pub(crate) fn private_attributes_len(&self) -> usize {
        self.response_attributes.len()
    }

    // challenge || response blinder || attributes len || response attributes
    pub fn to_bytes(&self) -> Vec<u8> {
        let attributes_len = self.response_attributes.len() as u64;
        let mut bytes = Vec::with_capacity(8 + (2 + attributes_len as usize) * 32);

        bytes.extend_from_slice(&self.challenge.to_bytes());
        bytes.extend_from_slice(&self.response_blinder.to_bytes());

        bytes.extend_from_slice(&attributes_len.to_le_bytes());
        for rm in &self.response_attributes {
            bytes.extend_from_slice(&rm.to_bytes());
        }

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // at the very minimum there must be a single attribute being proven
        if bytes.len() < 32 * 3 + 8 || (bytes.len() - 8) % 32 != 0 {
            return Err(CoconutError::DeserializationMinLength {
                min: 32 * 3 + 8,
                actual: bytes.len(),
            });
        }

        let challenge = try_deserialize_scalar(&bytes[..32])?;
        let response_blinder = try_deserialize_scalar(&bytes[32..64])?;

        // safety: bound checks made above
        #[allow(clippy::unwrap_used)]
        let attributes_len = u64::from_le_bytes(bytes[64..72].try_into().unwrap());
        let response_attributes = try_deserialize_scalar_vec(attributes_len, &bytes[72..])?;

        Ok(ProofKappaNu {
            challenge,
            response_blinder,
            response_attributes,
        })
    }
}

/// Tumbler-bound variant of [`ProofKappaNu`]; additionally proves that zeta
/// is formed out of the first private attribute (the sequence number) and
/// folds the recipient address into the challenge, so the showing cannot be
/// replayed towards a different recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofKappaNuZeta {
    challenge: Scalar,
    response_blinder: Scalar,
    response_attributes: Vec<Scalar>,
}

impl ProofKappaNuZeta {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn construct(
        params: &Parameters,
        verification_key: &VerificationKey,
        signature: &Signature,
        private_attributes: &[Attribute],
        blinding_factor: &Scalar,
        kappa: &G2Projective,
        nu: &G1Projective,
        zeta: &G1Projective,
        address: &[u8],
    ) -> Self {
        let witness_blinder = params.random_scalar();
        let witness_attributes = params.n_random_scalars(private_attributes.len());

        let commitment_kappa = params.gen2() * witness_blinder
            + verification_key.alpha()
            + witness_attributes
                .iter()
                .zip(verification_key.beta().iter())
                .map(|(wm, beta)| beta * wm)
                .sum::<G2Projective>();
        let commitment_nu = signature.sig1() * witness_blinder;
        // Cw = g1^wm_0; ties zeta to the sequence number embedded in kappa
        let commitment_zeta = params.gen1() * witness_attributes[0];

        let challenge = compute_show_challenge(
            params,
            verification_key,
            kappa,
            nu,
            &commitment_kappa,
            &commitment_nu,
            Some((zeta, &commitment_zeta, address)),
        );

        let response_blinder = produce_response(&witness_blinder, &challenge, blinding_factor);
        let response_attributes =
            produce_responses(&witness_attributes, &challenge, private_attributes);

        ProofKappaNuZeta {
            challenge,
            response_blinder,
            response_attributes,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn verify(
        &self,
        params: &Parameters,
        verification_key: &VerificationKey,
        signature: &Signature,
        kappa: &G2Projective,
        nu: &G1Projective,
        zeta: &G1Projective,
        address: &[u8],
    ) -> bool {
        if self.response_attributes.is_empty()
            || self.response_attributes.len() > verification_key.beta().len()
        {
            return false;
        }

        let one_minus_c = Scalar::one() - self.challenge;

        let commitment_kappa = kappa * self.challenge
            + params.gen2() * self.response_blinder
            + verification_key.alpha() * one_minus_c
            + self
                .response_attributes
                .iter()
                .zip(verification_key.beta().iter())
                .map(|(rm, beta)| beta * rm)
                .sum::<G2Projective>();
        let commitment_nu = nu * self.challenge + signature.sig1() * self.response_blinder;
        let commitment_zeta = zeta * self.challenge + params.gen1() * self.response_attributes[0];

        let challenge = compute_show_challenge(
            params,
            verification_key,
            kappa,
            nu,
            &commitment_kappa,
            &commitment_nu,
            Some((zeta, &commitment_zeta, address)),
        );

        challenge == self.challenge
    }

    pub(crate) fn private_attributes_len(&self) -> usize {
        self.response_attributes.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let attributes_len = self.response_attributes.len() as u64;
        let mut bytes = Vec::with_capacity(8 + (2 + attributes_len as usize) * 32);

        bytes.extend_from_slice(&self.challenge.to_bytes());
        bytes.extend_from_slice(&self.response_blinder.to_bytes());

        bytes.extend_from_slice(&attributes_len.to_le_bytes());
        for rm in &self.response_attributes {
            bytes.extend_from_slice(&rm.to_bytes());
        }

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 * 3 + 8 || (bytes.len() - 8) % 32 != 0 {
            return Err(CoconutError::DeserializationMinLength {
                min: 32 * 3 + 8,
                actual: bytes.len(),
            });
        }

        let challenge = try_deserialize_scalar(&bytes[..32])?;
        let response_blinder = try_deserialize_scalar(&bytes[32..64])?;

        // safety: bound checks made above
        #[allow(clippy::unwrap_used)]
        let attributes_len = u64::from_le_bytes(bytes[64..72].try_into().unwrap());
        let response_attributes = try_deserialize_scalar_vec(attributes_len, &bytes[72..])?;

        Ok(ProofKappaNuZeta {
            challenge,
            response_blinder,
            response_attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::elgamal_keygen;
    use crate::scheme::keygen::keygen;
    use crate::scheme::setup::setup;
    use crate::scheme::verification::compute_kappa;

    #[test]
    fn proof_cm_cs_bytes_roundtrip() {
        let params = setup(1).unwrap();

        let elgamal_keypair = elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(1);
        let blinding_factor = params.random_scalar();
        let commitment = params.gen1() * blinding_factor
            + params.gen_hs()[0] * private_attributes[0];
        let ephemeral_keys = params.n_random_scalars(1);

        let pi_s = ProofCmCs::construct(
            &params,
            elgamal_keypair.public_key(),
            &ephemeral_keys,
            &commitment,
            &blinding_factor,
            &private_attributes,
            &[],
        );

        let bytes = pi_s.to_bytes();
        assert_eq!(ProofCmCs::from_bytes(&bytes).unwrap(), pi_s);

        // 2 private, 2 public
        let params = setup(4).unwrap();
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = params.n_random_scalars(2);
        let ephemeral_keys = params.n_random_scalars(2);
        let blinding_factor = params.random_scalar();
        let commitment = params.gen1() * blinding_factor
            + private_attributes
                .iter()
                .chain(public_attributes.iter())
                .zip(params.gen_hs())
                .map(|(m, h)| h * m)
                .sum::<bls12_381::G1Projective>();

        let pi_s = ProofCmCs::construct(
            &params,
            elgamal_keypair.public_key(),
            &ephemeral_keys,
            &commitment,
            &blinding_factor,
            &private_attributes,
            &public_attributes,
        );

        let bytes = pi_s.to_bytes();
        assert_eq!(ProofCmCs::from_bytes(&bytes).unwrap(), pi_s);
    }

    #[test]
    fn proof_kappa_nu_bytes_roundtrip() {
        let params = setup(2).unwrap();
        let keypair = keygen(&params);

        let r = params.random_scalar();
        let s = params.random_scalar();
        let signature = Signature(params.gen1() * r, params.gen1() * s);

        let private_attributes = params.n_random_scalars(2);
        let blinding_factor = params.random_scalar();
        let kappa = compute_kappa(
            &params,
            keypair.verification_key(),
            &private_attributes,
            blinding_factor,
        );
        let nu = signature.sig1() * blinding_factor;

        let pi_v = ProofKappaNu::construct(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &blinding_factor,
            &kappa,
            &nu,
        );

        let bytes = pi_v.to_bytes();
        assert_eq!(ProofKappaNu::from_bytes(&bytes).unwrap(), pi_v);
    }

    #[test]
    fn tumbler_proof_is_bound_to_the_address() {
        let params = setup(2).unwrap();
        let keypair = keygen(&params);

        let r = params.random_scalar();
        let s = params.random_scalar();
        let signature = Signature(params.gen1() * r, params.gen1() * s);

        let private_attributes = params.n_random_scalars(2);
        let blinding_factor = params.random_scalar();
        let kappa = compute_kappa(
            &params,
            keypair.verification_key(),
            &private_attributes,
            blinding_factor,
        );
        let nu = signature.sig1() * blinding_factor;
        let zeta = params.gen1() * private_attributes[0];

        let address = [11u8; 20];
        let pi_v = ProofKappaNuZeta::construct(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &blinding_factor,
            &kappa,
            &nu,
            &zeta,
            &address,
        );

        assert!(pi_v.verify(
            &params,
            keypair.verification_key(),
            &signature,
            &kappa,
            &nu,
            &zeta,
            &address,
        ));

        let other_address = [12u8; 20];
        assert!(!pi_v.verify(
            &params,
            keypair.verification_key(),
            &signature,
            &kappa,
            &nu,
            &zeta,
            &other_address,
        ));
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use bls12_381::G1Projective;
use group::Curve;

use crate::elgamal;
use crate::elgamal::Ciphertext;
use crate::error::{CoconutError, Result};
use crate::scheme::setup::Parameters;
use crate::traits::{Base58, Bytable};
use crate::utils::try_deserialize_g1_projective;

pub mod aggregation;
pub mod issuance;
pub mod keygen;
pub mod setup;
pub mod verification;

pub type SignerIndex = u64;

/// A (possibly aggregated) credential; sigma = (h, s) in G1 x G1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub(crate) G1Projective, pub(crate) G1Projective);

impl Signature {
    pub(crate) fn sig1(&self) -> &G1Projective {
        &self.0
    }

    pub(crate) fn sig2(&self) -> &G1Projective {
        &self.1
    }

    /// Re-randomises the signature so that subsequent showings are
    /// unlinkable to each other and to the issuance.
    pub fn randomise(&self, params: &Parameters) -> Signature {
        let r = params.random_scalar();
        Signature(self.0 * r, self.1 * r)
    }

    /// Structural validity: sigma1 must not be the identity.
    pub fn validate(&self) -> bool {
        !bool::from(self.0.is_identity())
    }

    pub fn to_bytes(self) -> [u8; 96] {
        let mut bytes = [0u8; 96];
        bytes[..48].copy_from_slice(&self.0.to_affine().to_compressed());
        bytes[48..].copy_from_slice(&self.1.to_affine().to_compressed());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Signature> {
        Signature::try_from(bytes)
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = CoconutError;

    fn try_from(bytes: &[u8]) -> Result<Signature> {
        let received = bytes.len();
        if received != 96 {
            return Err(CoconutError::UnexpectedArrayLength {
                typ: "Signature".to_string(),
                received,
                expected: 96,
            });
        }

        // safety: we've just made the length check
        #[allow(clippy::unwrap_used)]
        let sig1_bytes: &[u8; 48] = &bytes[..48].try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let sig2_bytes: &[u8; 48] = &bytes[48..].try_into().unwrap();

        let sig1 = try_deserialize_g1_projective(sig1_bytes)?;
        let sig2 = try_deserialize_g1_projective(sig2_bytes)?;

        Ok(Signature(sig1, sig2))
    }
}

impl Bytable for Signature {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        Signature::try_from(slice)
    }
}

impl Base58 for Signature {}

/// A share of the credential produced by a single issuing authority,
/// tagged with its index for Lagrange interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureShare {
    signature: Signature,
    index: SignerIndex,
}

impl SignatureShare {
    pub fn new(signature: Signature, index: SignerIndex) -> SignatureShare {
        SignatureShare { signature, index }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn index(&self) -> SignerIndex {
        self.index
    }
}

/// Result of a blind signing: the commitment hash together with an ElGamal
/// encryption of the second signature element. Decrypts to a [`Signature`]
/// under the requester's ElGamal private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlindedSignature(pub(crate) G1Projective, pub(crate) Ciphertext);

impl BlindedSignature {
    /// ElGamal-decrypts the blinded element. Performs no verification;
    /// the caller decides whether the partial credential is worth keeping.
    pub fn unblind(&self, private_key: &elgamal::PrivateKey) -> Signature {
        let sig2 = private_key.decrypt(&self.1);
        Signature(self.0, sig2)
    }

    pub fn to_bytes(self) -> [u8; 144] {
        let mut bytes = [0u8; 144];
        bytes[..48].copy_from_slice(&self.0.to_affine().to_compressed());
        bytes[48..].copy_from_slice(&self.1.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BlindedSignature> {
        BlindedSignature::try_from(bytes)
    }
}

impl TryFrom<&[u8]> for BlindedSignature {
    type Error = CoconutError;

    fn try_from(bytes: &[u8]) -> Result<BlindedSignature> {
        let received = bytes.len();
        if received != 144 {
            return Err(CoconutError::UnexpectedArrayLength {
                typ: "BlindedSignature".to_string(),
                received,
                expected: 144,
            });
        }

        // safety: we've just made the length check
        #[allow(clippy::unwrap_used)]
        let h_bytes: &[u8; 48] = &bytes[..48].try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let ciphertext_bytes: &[u8; 96] = &bytes[48..].try_into().unwrap();

        let h = try_deserialize_g1_projective(h_bytes)?;
        let ciphertext = Ciphertext::from_bytes(ciphertext_bytes)?;

        Ok(BlindedSignature(h, ciphertext))
    }
}

impl Bytable for BlindedSignature {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        BlindedSignature::try_from(slice)
    }
}

impl Base58 for BlindedSignature {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::setup::setup;

    #[test]
    fn signature_bytes_roundtrip() {
        let params = setup(1).unwrap();
        let r = params.random_scalar();
        let s = params.random_scalar();
        let signature = Signature(params.gen1() * r, params.gen1() * s);

        let bytes = signature.to_bytes();
        assert_eq!(signature, Signature::try_from(bytes.as_slice()).unwrap());

        // and through base58
        assert_eq!(
            signature,
            Signature::try_from_bs58(signature.to_bs58()).unwrap()
        );
    }

    #[test]
    fn blinded_signature_bytes_roundtrip() {
        let params = setup(1).unwrap();
        let r = params.random_scalar();
        let s = params.random_scalar();
        let t = params.random_scalar();

        let blinded = BlindedSignature(
            params.gen1() * r,
            Ciphertext(params.gen1() * s, params.gen1() * t),
        );

        let bytes = blinded.to_bytes();
        assert_eq!(blinded, BlindedSignature::try_from(bytes.as_slice()).unwrap());
    }

    #[test]
    fn signature_validation_rejects_the_identity() {
        let params = setup(1).unwrap();
        let s = params.random_scalar();

        let valid = Signature(params.gen1() * s, params.gen1() * s);
        assert!(valid.validate());

        let invalid = Signature(G1Projective::identity(), params.gen1() * s);
        assert!(!invalid.validate());
    }
}

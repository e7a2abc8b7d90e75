// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use bls12_381::{G1Projective, Scalar};
use group::Curve;

use crate::error::{CoconutError, Result};
use crate::scheme::setup::Parameters;
use crate::traits::{Base58, Bytable};
use crate::utils::{try_deserialize_g1_projective, try_deserialize_scalar};

/// Randomness used during the encryption. It is returned alongside the
/// ciphertext as knowledge of it is proven inside the blind-sign request.
pub type EphemeralKey = Scalar;

/// Additive ElGamal ciphertext of a G1 element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ciphertext(pub(crate) G1Projective, pub(crate) G1Projective);

impl Ciphertext {
    pub fn c1(&self) -> &G1Projective {
        &self.0
    }

    pub fn c2(&self) -> &G1Projective {
        &self.1
    }

    pub fn to_bytes(&self) -> [u8; 96] {
        let mut bytes = [0u8; 96];
        bytes[..48].copy_from_slice(&self.0.to_affine().to_compressed());
        bytes[48..].copy_from_slice(&self.1.to_affine().to_compressed());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; 96]) -> Result<Ciphertext> {
        // safety: fixed-size subslices of a fixed-size array
        #[allow(clippy::unwrap_used)]
        let c1_bytes: &[u8; 48] = &bytes[..48].try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let c2_bytes: &[u8; 48] = &bytes[48..].try_into().unwrap();

        let c1 = try_deserialize_g1_projective(c1_bytes)?;
        let c2 = try_deserialize_g1_projective(c2_bytes)?;

        Ok(Ciphertext(c1, c2))
    }
}

impl TryFrom<&[u8]> for Ciphertext {
    type Error = CoconutError;

    fn try_from(bytes: &[u8]) -> Result<Ciphertext> {
        let received = bytes.len();
        let Ok(arr) = <[u8; 96]>::try_from(bytes) else {
            return Err(CoconutError::UnexpectedArrayLength {
                typ: "ElGamal ciphertext".to_string(),
                received,
                expected: 96,
            });
        };
        Ciphertext::from_bytes(&arr)
    }
}

impl Bytable for Ciphertext {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        Ciphertext::try_from(slice)
    }
}

impl Base58 for Ciphertext {}

#[derive(Debug)]
pub struct PrivateKey(pub(crate) Scalar);

impl PrivateKey {
    /// Decrypts the ciphertext, recovering `h^m` (not `m` itself - the
    /// discrete logarithm stays hidden, which is all the scheme needs).
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> G1Projective {
        let (c1, c2) = (&ciphertext.0, &ciphertext.1);

        // (gamma^k * h^m) / (g1^k)^d == h^m
        c2 - c1 * self.0
    }

    pub fn public_key(&self, params: &Parameters) -> PublicKey {
        PublicKey(params.gen1() * self.0)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<PrivateKey> {
        Ok(PrivateKey(try_deserialize_scalar(bytes)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub(crate) G1Projective);

impl PublicKey {
    /// Encrypts the attribute `m` over the base `h` producing the ciphertext
    /// together with the ephemeral key used.
    pub fn encrypt(
        &self,
        params: &Parameters,
        h: &G1Projective,
        msg: &Scalar,
    ) -> (Ciphertext, EphemeralKey) {
        let k = params.random_scalar();
        // c1 = g1^k
        let c1 = params.gen1() * k;
        // c2 = gamma^k * h^m
        let c2 = self.0 * k + h * msg;

        (Ciphertext(c1, c2), k)
    }

    /// Unique byte representation of the public key; doubles as the
    /// per-request identifier (gamma) in credential-request events.
    pub fn to_bytes(&self) -> [u8; 48] {
        self.0.to_affine().to_compressed()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<PublicKey> {
        let received = bytes.len();
        let Ok(arr) = <[u8; 48]>::try_from(bytes) else {
            return Err(CoconutError::UnexpectedArrayLength {
                typ: "ElGamal public key".to_string(),
                received,
                expected: 48,
            });
        };
        Ok(PublicKey(try_deserialize_g1_projective(&arr)?))
    }

    pub(crate) fn gamma(&self) -> &G1Projective {
        &self.0
    }
}

impl Bytable for PublicKey {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        PublicKey::from_bytes(slice)
    }
}

impl Base58 for PublicKey {}

pub struct ElGamalKeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl ElGamalKeyPair {
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

pub fn elgamal_keygen(params: &Parameters) -> ElGamalKeyPair {
    let private_key = params.random_scalar();
    let gamma = params.gen1() * private_key;

    ElGamalKeyPair {
        private_key: PrivateKey(private_key),
        public_key: PublicKey(gamma),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::setup::setup;

    #[test]
    fn encryption_roundtrip() {
        let params = setup(1).unwrap();
        let keypair = elgamal_keygen(&params);

        let h = crate::utils::hash_g1(b"some h".as_ref());
        let m = params.random_scalar();

        let (ciphertext, _) = keypair.public_key().encrypt(&params, &h, &m);
        let decrypted = keypair.private_key().decrypt(&ciphertext);

        assert_eq!(h * m, decrypted);
    }

    #[test]
    fn ciphertext_bytes_roundtrip() {
        let params = setup(1).unwrap();
        let keypair = elgamal_keygen(&params);

        let h = crate::utils::hash_g1(b"some h".as_ref());
        let m = params.random_scalar();

        let (ciphertext, _) = keypair.public_key().encrypt(&params, &h, &m);
        let recovered = Ciphertext::from_bytes(&ciphertext.to_bytes()).unwrap();

        assert_eq!(ciphertext, recovered);
    }

    #[test]
    fn public_key_from_private() {
        let params = setup(1).unwrap();
        let keypair = elgamal_keygen(&params);

        assert_eq!(
            keypair.public_key(),
            &keypair.private_key().public_key(&params)
        );
    }
}

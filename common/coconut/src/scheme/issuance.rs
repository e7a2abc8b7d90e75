// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use bls12_381::{G1Projective, Scalar};
use group::Curve;

use crate::elgamal::{Ciphertext, PublicKey};
use crate::error::{CoconutError, Result};
use crate::proofs::ProofCmCs;
use crate::scheme::keygen::SecretKey;
use crate::scheme::setup::Parameters;
use crate::scheme::{BlindedSignature, Signature};
use crate::traits::{Base58, Bytable};
use crate::utils::{hash_g1, try_deserialize_g1_projective};
use crate::Attribute;

/// The blind-sign request (lambda): commitment to the full attribute vector,
/// ElGamal encryptions of the private attributes and the proof tying them
/// together. Bound to the ElGamal public key it was created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlindSignRequest {
    // cm
    commitment: G1Projective,
    // c
    attributes_ciphertexts: Vec<Ciphertext>,
    // pi_s
    pi_s: ProofCmCs,
}

impl TryFrom<&[u8]> for BlindSignRequest {
    type Error = CoconutError;

    fn try_from(bytes: &[u8]) -> Result<BlindSignRequest> {
        if bytes.len() < 48 + 8 + 96 {
            return Err(CoconutError::DeserializationMinLength {
                min: 48 + 8 + 96,
                actual: bytes.len(),
            });
        }

        let mut idx = 0;

        // safety: we made the bound check and use constant offsets
        #[allow(clippy::unwrap_used)]
        let commitment_bytes: &[u8; 48] = &bytes[..48].try_into().unwrap();
        let commitment = try_deserialize_g1_projective(commitment_bytes)?;
        idx += 48;

        #[allow(clippy::unwrap_used)]
        let ciphertexts_len = u64::from_le_bytes(bytes[idx..idx + 8].try_into().unwrap());
        idx += 8;

        if bytes[idx..].len() < ciphertexts_len as usize * 96 {
            return Err(CoconutError::DeserializationMinLength {
                min: ciphertexts_len as usize * 96,
                actual: bytes[idx..].len(),
            });
        }

        let mut attributes_ciphertexts = Vec::with_capacity(ciphertexts_len as usize);
        for i in 0..ciphertexts_len as usize {
            let start = idx + i * 96;
            // safety: bound check made before the loop
            #[allow(clippy::unwrap_used)]
            let ciphertext_bytes: &[u8; 96] = &bytes[start..start + 96].try_into().unwrap();
            attributes_ciphertexts.push(Ciphertext::from_bytes(ciphertext_bytes)?);
        }
        idx += ciphertexts_len as usize * 96;

        let pi_s = ProofCmCs::from_bytes(&bytes[idx..])?;

        Ok(BlindSignRequest {
            commitment,
            attributes_ciphertexts,
            pi_s,
        })
    }
}

impl Bytable for BlindSignRequest {
    // commitment || ciphertexts len || ciphertexts || pi_s
    fn to_byte_vec(&self) -> Vec<u8> {
        let ciphertexts_len = self.attributes_ciphertexts.len() as u64;
        let proof_bytes = self.pi_s.to_bytes();

        let mut bytes =
            Vec::with_capacity(48 + 8 + ciphertexts_len as usize * 96 + proof_bytes.len());

        bytes.extend_from_slice(&self.commitment.to_affine().to_compressed());
        bytes.extend_from_slice(&ciphertexts_len.to_le_bytes());
        for ciphertext in &self.attributes_ciphertexts {
            bytes.extend_from_slice(&ciphertext.to_bytes());
        }
        bytes.extend_from_slice(&proof_bytes);

        bytes
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        BlindSignRequest::try_from(slice)
    }
}

impl Base58 for BlindSignRequest {}

impl BlindSignRequest {
    fn verify_proof(
        &self,
        params: &Parameters,
        pub_key: &PublicKey,
        public_attributes_len: usize,
    ) -> bool {
        self.pi_s.verify(
            params,
            pub_key,
            &self.commitment,
            &self.attributes_ciphertexts,
            public_attributes_len,
        )
    }

    pub fn commitment(&self) -> &G1Projective {
        &self.commitment
    }

    pub fn ciphertexts(&self) -> &[Ciphertext] {
        &self.attributes_ciphertexts
    }

    pub fn num_private_attributes(&self) -> usize {
        self.attributes_ciphertexts.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_byte_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BlindSignRequest> {
        BlindSignRequest::try_from(bytes)
    }
}

/// Builds cryptographic material required for blind signing: the commitment
/// over the full attribute vector (private attributes first), ElGamal
/// encryptions of the private attributes over the base h = H(cm) and the
/// proof of their consistency.
pub fn prepare_blind_sign(
    params: &Parameters,
    pub_key: &PublicKey,
    private_attributes: &[Attribute],
    public_attributes: &[Attribute],
) -> Result<BlindSignRequest> {
    if private_attributes.is_empty() {
        return Err(CoconutError::Issuance(
            "tried to prepare blind sign request for an empty set of private attributes"
                .to_string(),
        ));
    }

    let hs = params.gen_hs();
    if private_attributes.len() + public_attributes.len() > hs.len() {
        return Err(CoconutError::IssuanceMaxAttributes {
            max: hs.len(),
            requested: private_attributes.len() + public_attributes.len(),
        });
    }

    // draw the blinding scalar
    let blinding_factor = params.random_scalar();

    // cm = g1^r * prod(hs_i^m_i) over private attributes followed by public
    let attributes_commitment = private_attributes
        .iter()
        .chain(public_attributes.iter())
        .zip(hs.iter())
        .map(|(m, h)| h * m)
        .sum::<G1Projective>();
    let commitment = params.gen1() * blinding_factor + attributes_commitment;

    // h = H(cm); the base all the ciphertexts and the signature share
    let h = hash_g1(commitment.to_affine().to_compressed());

    let (attributes_ciphertexts, ephemeral_keys): (Vec<_>, Vec<_>) = private_attributes
        .iter()
        .map(|m| pub_key.encrypt(params, &h, m))
        .unzip();

    let pi_s = ProofCmCs::construct(
        params,
        pub_key,
        &ephemeral_keys,
        &commitment,
        &blinding_factor,
        private_attributes,
        public_attributes,
    );

    Ok(BlindSignRequest {
        commitment,
        attributes_ciphertexts,
        pi_s,
    })
}

/// Creates a blinded credential over the attributes hidden inside the
/// request. The result decrypts to a partial [`Signature`] under the
/// requester's ElGamal private key.
pub fn blind_sign(
    params: &Parameters,
    secret_key: &SecretKey,
    pub_key: &PublicKey,
    blind_sign_request: &BlindSignRequest,
    public_attributes: &[Attribute],
) -> Result<BlindedSignature> {
    let num_private = blind_sign_request.attributes_ciphertexts.len();
    let hs = params.gen_hs();

    if num_private + public_attributes.len() > hs.len() {
        return Err(CoconutError::IssuanceMaxAttributes {
            max: hs.len(),
            requested: num_private + public_attributes.len(),
        });
    }

    if !blind_sign_request.verify_proof(params, pub_key, public_attributes.len()) {
        return Err(CoconutError::Issuance(
            "failed to verify the proof of knowledge".to_string(),
        ));
    }

    let h = hash_g1(blind_sign_request.commitment.to_affine().to_compressed());

    // sign the public attributes with a single G1 multiplication:
    // h^(pub_m[0] * y[n] + ... + pub_m[k] * y[n + k]) where n is the number
    // of private attributes
    let signed_public = h * public_attributes
        .iter()
        .zip(secret_key.ys.iter().skip(num_private))
        .map(|(attr, y)| attr * y)
        .sum::<Scalar>();

    // the homomorphic part: c1' = sum(c1_j^y_j), c2' = sum(c2_j^y_j) + h^x + signed public part
    let sig_1 = blind_sign_request
        .attributes_ciphertexts
        .iter()
        .zip(secret_key.ys.iter())
        .map(|(ciphertext, y)| ciphertext.c1() * y)
        .sum();
    let sig_2 = blind_sign_request
        .attributes_ciphertexts
        .iter()
        .zip(secret_key.ys.iter())
        .map(|(ciphertext, y)| ciphertext.c2() * y)
        .chain(std::iter::once(h * secret_key.x))
        .chain(std::iter::once(signed_public))
        .sum();

    Ok(BlindedSignature(h, Ciphertext(sig_1, sig_2)))
}

/// Creates a credential under a given secret key on a set of public
/// attributes only.
pub fn sign(
    params: &Parameters,
    secret_key: &SecretKey,
    public_attributes: &[Attribute],
) -> Result<Signature> {
    if public_attributes.len() > secret_key.ys.len() {
        return Err(CoconutError::IssuanceMaxAttributes {
            max: secret_key.ys.len(),
            requested: public_attributes.len(),
        });
    }

    // h = H(m_0 || ... || m_n)
    let mut attribute_bytes = Vec::with_capacity(public_attributes.len() * 32);
    for attribute in public_attributes {
        attribute_bytes.extend_from_slice(&attribute.to_bytes());
    }
    let h = hash_g1(attribute_bytes);

    // x + m_0 * y_0 + ... + m_n * y_n
    let exponent = secret_key.x
        + public_attributes
            .iter()
            .zip(secret_key.ys.iter())
            .map(|(m, y)| m * y)
            .sum::<Scalar>();

    Ok(Signature(h, h * exponent))
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! EVM-style accounts: 20-byte addresses derived from Keccak-256 of the
//! uncompressed secp256k1 public key, recoverable 65-byte signatures over
//! Keccak-256 message digests.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::ChainError;

pub const ADDRESS_LENGTH: usize = 20;

/// Uncompressed SEC1 public key length (tag byte + two coordinates); the
/// format watcher/verifier/redeemer identities are exchanged in.
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Recoverable signature length: r || s || v.
pub const SIGNATURE_LENGTH: usize = 65;

pub fn keccak256(msg: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(msg);
    hasher.finalize().into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub fn new(bytes: [u8; ADDRESS_LENGTH]) -> Address {
        Address(bytes)
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Address, ChainError> {
        let arr = <[u8; ADDRESS_LENGTH]>::try_from(bytes)
            .map_err(|_| ChainError::MalformedAddress(bytes.len()))?;
        Ok(Address(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Last 20 bytes of Keccak-256 over the raw (tag-less) public key.
    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Address {
        let encoded = verifying_key.to_encoded_point(false);
        let digest = keccak256(&encoded.as_bytes()[1..]);
        // safety: the digest is always 32 bytes long
        #[allow(clippy::unwrap_used)]
        Address(digest[12..].try_into().unwrap())
    }

    pub fn from_signing_key(signing_key: &SigningKey) -> Address {
        Address::from_verifying_key(signing_key.verifying_key())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The uncompressed SEC1 encoding of the public key matching the signing
/// key; the identity format of watchers, verifiers and redeemers.
pub fn public_key_bytes(signing_key: &SigningKey) -> Vec<u8> {
    signing_key
        .verifying_key()
        .to_encoded_point(false)
        .as_bytes()
        .to_vec()
}

/// Signs `keccak256(msg)` producing the 65-byte recoverable form.
pub fn sign_message(signing_key: &SigningKey, msg: &[u8]) -> Result<Vec<u8>, ChainError> {
    let digest = keccak256(msg);
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&digest)
        .map_err(|err| ChainError::Signing(err.to_string()))?;

    let mut bytes = signature.to_vec();
    bytes.push(recovery_id.to_byte());
    Ok(bytes)
}

/// Recovers the signer's address from a 65-byte recoverable signature over
/// `keccak256(msg)`.
pub fn recover_address(msg: &[u8], sig: &[u8]) -> Result<Address, ChainError> {
    if sig.len() != SIGNATURE_LENGTH {
        return Err(ChainError::MalformedSignature(sig.len()));
    }

    let signature = EcdsaSignature::from_slice(&sig[..64])
        .map_err(|_| ChainError::MalformedSignature(sig.len()))?;
    let recovery_id = RecoveryId::from_byte(sig[64])
        .ok_or(ChainError::MalformedSignature(sig.len()))?;

    let digest = keccak256(msg);
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|err| ChainError::Signing(err.to_string()))?;

    Ok(Address::from_verifying_key(&verifying_key))
}

/// Verifies a signature against an explicit public key. The trailing
/// recovery byte, if present, is ignored.
pub fn verify_signature(public_key: &[u8], msg: &[u8], sig: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };

    let sig = if sig.len() > 64 { &sig[..64] } else { sig };
    let Ok(signature) = EcdsaSignature::from_slice(sig) else {
        return false;
    };

    let digest = keccak256(msg);
    verifying_key.verify_prehash(&digest, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_recover_roundtrip() {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = Address::from_signing_key(&signing_key);

        let msg = b"some signed chain message";
        let sig = sign_message(&signing_key, msg).unwrap();

        assert_eq!(address, recover_address(msg, &sig).unwrap());
    }

    #[test]
    fn recovery_of_a_tampered_message_yields_another_address() {
        let signing_key = SigningKey::random(&mut OsRng);
        let address = Address::from_signing_key(&signing_key);

        let sig = sign_message(&signing_key, b"original").unwrap();
        let recovered = recover_address(b"tampered", &sig).unwrap();

        assert_ne!(address, recovered);
    }

    #[test]
    fn explicit_key_verification() {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key = public_key_bytes(&signing_key);

        let msg = b"notification payload";
        let sig = sign_message(&signing_key, msg).unwrap();

        // both with and without the recovery byte
        assert!(verify_signature(&public_key, msg, &sig));
        assert!(verify_signature(&public_key, msg, &sig[..64]));

        assert!(!verify_signature(&public_key, b"other", &sig));

        let other_key = public_key_bytes(&SigningKey::random(&mut OsRng));
        assert!(!verify_signature(&other_key, msg, &sig));
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(Address::try_from_slice(&[0u8; 19]).is_err());
        assert!(Address::try_from_slice(&[0u8; 21]).is_err());
        assert!(Address::try_from_slice(&[0u8; 20]).is_ok());
    }
}

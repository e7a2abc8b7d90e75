// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

#![warn(clippy::expect_used)]
#![warn(clippy::unwrap_used)]

use bls12_381::Scalar;

pub use crate::traits::{Base58, Bytable};
pub use elgamal::{elgamal_keygen, ElGamalKeyPair};
pub use error::CoconutError;
pub use scheme::aggregation::{
    aggregate_signature_shares, aggregate_signatures, aggregate_verification_keys,
};
pub use scheme::issuance::{blind_sign, prepare_blind_sign, sign, BlindSignRequest};
pub use scheme::keygen::{keygen, ttp_keygen, KeyPair, SecretKey, VerificationKey};
pub use scheme::setup::{setup, Parameters};
pub use scheme::verification::{
    prove_credential, prove_credential_tumbler, verify, verify_credential,
    verify_credential_tumbler, Theta, ThetaTumbler,
};
pub use scheme::{BlindedSignature, Signature, SignatureShare, SignerIndex};
pub use utils::hash_to_scalar;

pub mod elgamal;
mod error;
pub mod proofs;
pub mod proto;
pub mod scheme;
#[cfg(test)]
mod tests;
mod traits;
mod utils;

pub type Attribute = Scalar;
pub type PrivateAttribute = Attribute;
pub type PublicAttribute = Attribute;

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// A `Result` alias where the `Err` case is `CoconutError`.
pub type Result<T> = std::result::Result<T, CoconutError>;

#[derive(Error, Debug)]
pub enum CoconutError {
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Keygen error: {0}")]
    Keygen(String),

    #[error("Issuance related error: {0}")]
    Issuance(String),

    #[error("Tried to prepare blind sign request for higher than specified number of attributes (max: {max}, requested: {requested})")]
    IssuanceMaxAttributes { max: usize, requested: usize },

    #[error("Interpolation error: {0}")]
    Interpolation(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Unblind error: {0}")]
    Unblind(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Deserialization error, expected at least {min} bytes, got {actual}")]
    DeserializationMinLength { min: usize, actual: usize },

    #[error("Tried to deserialize {typ} with bytes of invalid length. Got {received}, expected {expected}")]
    UnexpectedArrayLength {
        typ: String,
        received: usize,
        expected: usize,
    },

    #[error("failed to deserialize scalar - it was not canonically encoded")]
    ScalarDeserializationFailure,

    #[error("failed to deserialize G1 point - it was not a valid curve encoding")]
    G1ProjectiveDeserializationFailure,

    #[error("failed to deserialize G2 point - it was not a valid curve encoding")]
    G2ProjectiveDeserializationFailure,

    #[error("failed to decode base58 string: {0}")]
    Bs58DecodingError(#[from] bs58::decode::Error),
}

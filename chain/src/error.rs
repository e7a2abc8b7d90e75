// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("malformed address of length {0}")]
    MalformedAddress(usize),

    #[error("malformed signature of length {0}")]
    MalformedSignature(usize),

    #[error("signing failure: {0}")]
    Signing(String),

    #[error("invalid credential value: {0}")]
    InvalidValue(i64),

    #[error("credential material error: {0}")]
    Coconut(#[from] opal_coconut::CoconutError),

    #[error("malformed genesis document: {0}")]
    MalformedGenesis(String),
}

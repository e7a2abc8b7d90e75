// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::CoconutError;
use crate::utils::{try_deserialize_g1_projective, try_deserialize_g2_projective};
use bls12_381::{G1Projective, G2Projective, Scalar};
use group::Curve;

pub trait Bytable
where
    Self: Sized,
{
    fn to_byte_vec(&self) -> Vec<u8>;

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self, CoconutError>;
}

pub trait Base58
where
    Self: Bytable,
{
    fn try_from_bs58<S: AsRef<str>>(x: S) -> Result<Self, CoconutError> {
        let bs58_decoded = &bs58::decode(x.as_ref()).into_vec()?;
        Self::try_from_byte_slice(bs58_decoded)
    }

    fn to_bs58(&self) -> String {
        bs58::encode(self.to_byte_vec()).into_string()
    }
}

impl Bytable for Scalar {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self, CoconutError> {
        crate::utils::try_deserialize_scalar(slice)
    }
}

impl Base58 for Scalar {}

impl Bytable for G1Projective {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_affine().to_compressed().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self, CoconutError> {
        let received = slice.len();
        let Ok(bytes) = <[u8; 48]>::try_from(slice) else {
            return Err(CoconutError::UnexpectedArrayLength {
                typ: "G1Projective".to_string(),
                received,
                expected: 48,
            });
        };

        try_deserialize_g1_projective(&bytes)
    }
}

impl Base58 for G1Projective {}

impl Bytable for G2Projective {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_affine().to_compressed().to_vec()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self, CoconutError> {
        let received = slice.len();
        let Ok(bytes) = <[u8; 96]>::try_from(slice) else {
            return Err(CoconutError::UnexpectedArrayLength {
                typ: "G2Projective".to_string(),
                received,
                expected: 96,
            });
        };

        try_deserialize_g2_projective(&bytes)
    }
}

impl Base58 for G2Projective {}

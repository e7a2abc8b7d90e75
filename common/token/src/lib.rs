// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use bls12_381::Scalar;
use thiserror::Error;

use opal_coconut::{Attribute, PrivateAttribute, PublicAttribute};

/// Values a token is allowed to carry. Restricting the set prevents traffic
/// analysis based on unusual denominations.
pub const ALLOWED_VALUES: [i64; 7] = [1, 2, 5, 10, 20, 50, 100];

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("disallowed token value: {0}, allowed: {ALLOWED_VALUES:?}")]
    DisallowedValue(i64),
}

pub fn validate_value(value: i64) -> bool {
    ALLOWED_VALUES.contains(&value)
}

/// A payment token before it is turned into a credential. The sequence
/// number and the long-term secret stay private; only the value is ever
/// revealed.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    sequence_number: Scalar,
    longterm_secret: Scalar,
    value: i64,
}

impl Token {
    pub fn new(sequence_number: Scalar, longterm_secret: Scalar, value: i64) -> Result<Token, TokenError> {
        if !validate_value(value) {
            return Err(TokenError::DisallowedValue(value));
        }
        Ok(Token {
            sequence_number,
            longterm_secret,
            value,
        })
    }

    pub fn sequence_number(&self) -> &Scalar {
        &self.sequence_number
    }

    pub fn longterm_secret(&self) -> &Scalar {
        &self.longterm_secret
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Splits the token into the attribute vectors the scheme consumes.
    /// The sequence number must be the first private attribute (the
    /// double-spend tag is derived from it) and the value the first public
    /// one (the chain validates it against the requested amount).
    pub fn attribute_slices(&self) -> (Vec<PublicAttribute>, Vec<PrivateAttribute>) {
        let public_attributes = vec![Attribute::from(self.value as u64)];
        let private_attributes = vec![self.sequence_number, self.longterm_secret];

        (public_attributes, private_attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_whitelist() {
        for value in ALLOWED_VALUES {
            assert!(validate_value(value));
        }
        for value in [0, -1, 3, 42, 1000] {
            assert!(!validate_value(value));
        }
    }

    #[test]
    fn disallowed_value_is_rejected_at_construction() {
        assert!(Token::new(Scalar::from(42), Scalar::from(7), 3).is_err());
        assert!(Token::new(Scalar::from(42), Scalar::from(7), 5).is_ok());
    }

    #[test]
    fn attribute_ordering() {
        let token = Token::new(Scalar::from(42), Scalar::from(7), 5).unwrap();
        let (public_attributes, private_attributes) = token.attribute_slices();

        assert_eq!(vec![Scalar::from(5)], public_attributes);
        assert_eq!(Scalar::from(42), private_attributes[0]);
        assert_eq!(Scalar::from(7), private_attributes[1]);
    }
}

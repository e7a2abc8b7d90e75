// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use group::ff::Field;
use sha2::{Digest, Sha256};
use sha2_09::Sha256 as Sha256ForHashToCurve;

use crate::error::{CoconutError, Result};
use crate::scheme::setup::Parameters;
use crate::scheme::SignerIndex;

/// Domain separation tag for hashing arbitrary bytes onto G1.
const G1_HASH_DOMAIN: &[u8] = b"OPAL-CREDENTIAL-V01-CS01-with-BLS12381G1_XMD:SHA-256_SSWU_RO_";

pub(crate) fn hash_g1<M: AsRef<[u8]>>(msg: M) -> G1Projective {
    <G1Projective as HashToCurve<ExpandMsgXmd<Sha256ForHashToCurve>>>::hash_to_curve(
        msg,
        G1_HASH_DOMAIN,
    )
}

pub fn hash_to_scalar<M: AsRef<[u8]>>(msg: M) -> Scalar {
    let mut h = Sha256::new();
    h.update(msg);
    let digest = h.finalize();

    // pad the 32-byte digest into the 64-byte wide representation
    let mut bytes = [0u8; 64];
    bytes[32..].copy_from_slice(&digest);
    Scalar::from_bytes_wide(&bytes)
}

pub(crate) fn try_deserialize_scalar(bytes: &[u8]) -> Result<Scalar> {
    let received = bytes.len();
    let Ok(arr) = <[u8; 32]>::try_from(bytes) else {
        return Err(CoconutError::UnexpectedArrayLength {
            typ: "Scalar".to_string(),
            received,
            expected: 32,
        });
    };

    let maybe_scalar = Scalar::from_bytes(&arr);
    if maybe_scalar.is_none().into() {
        Err(CoconutError::ScalarDeserializationFailure)
    } else {
        // safety: we've just checked the element is not none
        #[allow(clippy::unwrap_used)]
        Ok(maybe_scalar.unwrap())
    }
}

pub(crate) fn try_deserialize_scalar_vec(expected_len: u64, bytes: &[u8]) -> Result<Vec<Scalar>> {
    if bytes.len() != expected_len as usize * 32 {
        return Err(CoconutError::DeserializationMinLength {
            min: expected_len as usize * 32,
            actual: bytes.len(),
        });
    }

    let mut out = Vec::with_capacity(expected_len as usize);
    for i in 0..expected_len as usize {
        out.push(try_deserialize_scalar(&bytes[i * 32..(i + 1) * 32])?)
    }

    Ok(out)
}

pub(crate) fn try_deserialize_g1_projective(bytes: &[u8; 48]) -> Result<G1Projective> {
    let maybe_g1 = G1Affine::from_compressed(bytes);
    if maybe_g1.is_none().into() {
        Err(CoconutError::G1ProjectiveDeserializationFailure)
    } else {
        // safety: we've just checked the element is not none
        #[allow(clippy::unwrap_used)]
        Ok(maybe_g1.unwrap().into())
    }
}

pub(crate) fn try_deserialize_g2_projective(bytes: &[u8; 96]) -> Result<G2Projective> {
    let maybe_g2 = G2Affine::from_compressed(bytes);
    if maybe_g2.is_none().into() {
        Err(CoconutError::G2ProjectiveDeserializationFailure)
    } else {
        // safety: we've just checked the element is not none
        #[allow(clippy::unwrap_used)]
        Ok(maybe_g2.unwrap().into())
    }
}

/// Polynomial with scalar coefficients, lowest degree first.
pub(crate) struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Samples a random polynomial of the given degree. A degree-zero
    /// polynomial is a single random constant.
    pub(crate) fn new_random(params: &Parameters, degree: u64) -> Self {
        Polynomial {
            coefficients: params.n_random_scalars((degree + 1) as usize),
        }
    }

    pub(crate) fn evaluate(&self, x: &Scalar) -> Scalar {
        if self.coefficients.is_empty() {
            Scalar::zero()
        } else if x.is_zero().into() {
            self.coefficients[0]
        } else {
            // Horner's method
            self.coefficients
                .iter()
                .rev()
                .fold(Scalar::zero(), |acc, coeff| acc * x + coeff)
        }
    }
}

/// Computes the Lagrange basis polynomials evaluated at the origin for the
/// provided signer indices.
pub(crate) fn generate_lagrangian_coefficients_at_origin(
    points: &[SignerIndex],
) -> Result<Vec<Scalar>> {
    points
        .iter()
        .enumerate()
        .map(|(i, point_i)| {
            let xi = Scalar::from(*point_i);
            let mut numerator = Scalar::one();
            let mut denominator = Scalar::one();
            for (j, point_j) in points.iter().enumerate() {
                if j != i {
                    let xj = Scalar::from(*point_j);
                    numerator *= xj;
                    denominator *= xj - xi;
                }
            }
            let inv = denominator.invert();
            if inv.is_none().into() {
                // only possible with duplicate points
                return Err(CoconutError::Interpolation(
                    "tried to interpolate over duplicate points".to_string(),
                ));
            }
            // safety: checked for none above
            #[allow(clippy::unwrap_used)]
            Ok(numerator * inv.unwrap())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_evaluation() {
        // y = 42 (it should be 42 regardless of x)
        let poly = Polynomial {
            coefficients: vec![Scalar::from(42)],
        };

        assert_eq!(Scalar::from(42), poly.evaluate(&Scalar::from(1)));
        assert_eq!(Scalar::from(42), poly.evaluate(&Scalar::from(0)));
        assert_eq!(Scalar::from(42), poly.evaluate(&Scalar::from(10)));

        // y = x + 10, at x = 2 (exp: 12)
        let poly = Polynomial {
            coefficients: vec![Scalar::from(10), Scalar::from(1)],
        };

        assert_eq!(Scalar::from(12), poly.evaluate(&Scalar::from(2)));

        // y = x^4 - 5x^2 + 2x - 3, at x = 3 (exp: 39)
        let poly = Polynomial {
            coefficients: vec![
                (-Scalar::from(3)),
                Scalar::from(2),
                (-Scalar::from(5)),
                Scalar::zero(),
                Scalar::from(1),
            ],
        };

        assert_eq!(Scalar::from(39), poly.evaluate(&Scalar::from(3)));

        // empty polynomial
        let poly = Polynomial {
            coefficients: vec![],
        };

        // should always be 0
        assert_eq!(Scalar::from(0), poly.evaluate(&Scalar::from(1)));
        assert_eq!(Scalar::from(0), poly.evaluate(&Scalar::from(0)));
        assert_eq!(Scalar::from(0), poly.evaluate(&Scalar::from(10)));
    }

    #[test]
    fn lagrange_duplicate_points_are_rejected() {
        assert!(generate_lagrangian_coefficients_at_origin(&[1, 2, 2]).is_err());
    }

    #[test]
    fn lagrange_coefficients_sum_interpolates_constant() {
        // for a degree-0 "polynomial" every evaluation equals the constant,
        // so the weighted sum of identical values must return that value
        let coeffs = generate_lagrangian_coefficients_at_origin(&[1, 2, 3]).unwrap();
        let value = Scalar::from(7);
        let interpolated: Scalar = coeffs.iter().map(|c| c * value).sum();
        assert_eq!(value, interpolated);
    }
}

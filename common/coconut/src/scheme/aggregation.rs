// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use bls12_381::{G1Projective, G2Projective};

use crate::error::{CoconutError, Result};
use crate::scheme::keygen::VerificationKey;
use crate::scheme::setup::Parameters;
use crate::scheme::{Signature, SignatureShare, SignerIndex};
use crate::utils::generate_lagrangian_coefficients_at_origin;

fn check_unique_indices(indices: &[SignerIndex]) -> Result<()> {
    if indices.is_empty() {
        return Err(CoconutError::Aggregation(
            "no signer indices provided".to_string(),
        ));
    }
    if indices.iter().any(|&index| index == 0) {
        return Err(CoconutError::Aggregation(
            "signer indices must be non-zero".to_string(),
        ));
    }

    let set = indices.iter().collect::<HashSet<_>>();
    if set.len() != indices.len() {
        return Err(CoconutError::Aggregation(
            "provided signer indices are not unique".to_string(),
        ));
    }

    Ok(())
}

/// Aggregates partial credentials into a consolidated one.
///
/// With `indices` present, the second signature elements are combined with
/// Lagrange coefficients evaluated at the origin (threshold setup); without
/// them a plain sum is used (non-threshold setup where every authority holds
/// an additive share). All shares must be issued over the same commitment
/// hash.
pub fn aggregate_signatures(
    _params: &Parameters,
    signatures: &[Signature],
    indices: Option<&[SignerIndex]>,
) -> Result<Signature> {
    if signatures.is_empty() {
        return Err(CoconutError::Aggregation(
            "tried to aggregate an empty set of signatures".to_string(),
        ));
    }

    let h = signatures[0].0;
    if signatures.iter().any(|sig| sig.0 != h) {
        return Err(CoconutError::Aggregation(
            "tried to aggregate signatures over different base elements".to_string(),
        ));
    }

    let aggregate_sig2: G1Projective = match indices {
        Some(indices) => {
            if indices.len() != signatures.len() {
                return Err(CoconutError::Aggregation(format!(
                    "inconsistent aggregation arguments - {} signatures, {} indices",
                    signatures.len(),
                    indices.len()
                )));
            }
            check_unique_indices(indices)?;
            let coefficients = generate_lagrangian_coefficients_at_origin(indices)?;
            coefficients
                .iter()
                .zip(signatures.iter())
                .map(|(coeff, sig)| sig.1 * coeff)
                .sum()
        }
        None => signatures.iter().map(|sig| sig.1).sum(),
    };

    Ok(Signature(h, aggregate_sig2))
}

pub fn aggregate_signature_shares(
    params: &Parameters,
    shares: &[SignatureShare],
) -> Result<Signature> {
    let signatures = shares
        .iter()
        .map(|share| *share.signature())
        .collect::<Vec<_>>();
    let indices = shares.iter().map(|share| share.index()).collect::<Vec<_>>();

    aggregate_signatures(params, &signatures, Some(&indices))
}

/// Aggregates partial verification keys; alpha and every beta element are
/// interpolated at the origin over the signer indices (or summed in a
/// non-threshold setup). The keys must all support the same number of
/// attributes.
pub fn aggregate_verification_keys(
    vks: &[VerificationKey],
    indices: Option<&[SignerIndex]>,
) -> Result<VerificationKey> {
    if vks.is_empty() {
        return Err(CoconutError::Aggregation(
            "tried to aggregate an empty set of verification keys".to_string(),
        ));
    }

    let beta_len = vks[0].beta.len();
    if vks.iter().any(|vk| vk.beta.len() != beta_len) {
        return Err(CoconutError::Aggregation(
            "tried to aggregate verification keys of different lengths".to_string(),
        ));
    }

    let coefficients = match indices {
        Some(indices) => {
            if indices.len() != vks.len() {
                return Err(CoconutError::Aggregation(format!(
                    "inconsistent aggregation arguments - {} keys, {} indices",
                    vks.len(),
                    indices.len()
                )));
            }
            check_unique_indices(indices)?;
            Some(generate_lagrangian_coefficients_at_origin(indices)?)
        }
        None => None,
    };

    let mut alpha = G2Projective::identity();
    let mut beta = vec![G2Projective::identity(); beta_len];

    for (i, vk) in vks.iter().enumerate() {
        match &coefficients {
            Some(coefficients) => {
                alpha += vk.alpha * coefficients[i];
                for (aggregated_beta, beta_j) in beta.iter_mut().zip(vk.beta.iter()) {
                    *aggregated_beta += beta_j * coefficients[i];
                }
            }
            None => {
                alpha += vk.alpha;
                for (aggregated_beta, beta_j) in beta.iter_mut().zip(vk.beta.iter()) {
                    *aggregated_beta += beta_j;
                }
            }
        }
    }

    Ok(VerificationKey { alpha, beta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::keygen::ttp_keygen;
    use crate::scheme::setup::setup;

    #[test]
    fn verification_key_aggregation_is_subset_independent() {
        let params = setup(2).unwrap();
        let keypairs = ttp_keygen(&params, 2, 3).unwrap();

        let vks = keypairs
            .iter()
            .map(|keypair| keypair.verification_key().clone())
            .collect::<Vec<_>>();

        let aggr_vk12 = aggregate_verification_keys(&vks[..2], Some(&[1, 2])).unwrap();
        let aggr_vk13 =
            aggregate_verification_keys(&[vks[0].clone(), vks[2].clone()], Some(&[1, 3])).unwrap();
        let aggr_vk23 = aggregate_verification_keys(&vks[1..], Some(&[2, 3])).unwrap();

        assert_eq!(aggr_vk12, aggr_vk13);
        assert_eq!(aggr_vk12, aggr_vk23);
    }

    #[test]
    fn aggregation_rejects_duplicate_indices() {
        let params = setup(2).unwrap();
        let keypairs = ttp_keygen(&params, 2, 3).unwrap();

        let vks = keypairs
            .iter()
            .map(|keypair| keypair.verification_key().clone())
            .collect::<Vec<_>>();

        assert!(aggregate_verification_keys(&vks[..2], Some(&[1, 1])).is_err());
    }

    #[test]
    fn aggregation_rejects_zero_index() {
        let params = setup(2).unwrap();
        let keypairs = ttp_keygen(&params, 2, 3).unwrap();

        let vks = keypairs
            .iter()
            .map(|keypair| keypair.verification_key().clone())
            .collect::<Vec<_>>();

        assert!(aggregate_verification_keys(&vks[..2], Some(&[0, 1])).is_err());
    }

    #[test]
    fn signature_aggregation_rejects_mismatched_base() {
        let params = setup(1).unwrap();
        let r = params.random_scalar();
        let s = params.random_scalar();

        let sig1 = Signature(params.gen1() * r, params.gen1() * s);
        let sig2 = Signature(params.gen1() * s, params.gen1() * r);

        assert!(aggregate_signatures(&params, &[sig1, sig2], Some(&[1, 2])).is_err());
    }
}

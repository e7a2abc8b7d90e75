// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use core::ops::Neg;

use bls12_381::{multi_miller_loop, G1Affine, G1Projective, G2Prepared, G2Projective, Scalar};
use group::{Curve, Group};

use crate::error::{CoconutError, Result};
use crate::proofs::{ProofKappaNu, ProofKappaNuZeta};
use crate::scheme::keygen::VerificationKey;
use crate::scheme::setup::Parameters;
use crate::scheme::Signature;
use crate::traits::{Base58, Bytable};
use crate::utils::{try_deserialize_g1_projective, try_deserialize_g2_projective};
use crate::Attribute;

/// Checks whether e(P, Q) * e(-R, S) == id
pub fn check_bilinear_pairing(p: &G1Affine, q: &G2Prepared, r: &G1Affine, s: &G2Prepared) -> bool {
    // checking e(P, Q) * e(-R, S) == id
    // is equivalent to checking e(P, Q) == e(R, S)
    // but requires only a single final exponentiation rather than two of them
    let multi_miller = multi_miller_loop(&[(p, q), (&r.neg(), s)]);
    multi_miller.final_exponentiation().is_identity().into()
}

/// kappa = g2^r * alpha * prod(beta_i^m_i); verifying against kappa reveals
/// nothing about the attributes it embeds.
pub fn compute_kappa(
    params: &Parameters,
    verification_key: &VerificationKey,
    private_attributes: &[Attribute],
    blinding_factor: Scalar,
) -> G2Projective {
    params.gen2() * blinding_factor
        + verification_key.alpha()
        + private_attributes
            .iter()
            .zip(verification_key.beta().iter())
            .map(|(priv_attr, beta_i)| beta_i * priv_attr)
            .sum::<G2Projective>()
}

/// The show-credential payload for unbound verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theta {
    // kappa
    pub(crate) kappa: G2Projective,
    // nu
    pub(crate) nu: G1Projective,
    // sigma', the randomised credential
    pub(crate) credential: Signature,
    // pi_v
    pub(crate) pi_v: ProofKappaNu,
}

impl Theta {
    fn verify_proof(&self, params: &Parameters, verification_key: &VerificationKey) -> bool {
        self.pi_v.verify(
            params,
            verification_key,
            &self.credential,
            &self.kappa,
            &self.nu,
        )
    }

    pub fn credential(&self) -> &Signature {
        &self.credential
    }

    // kappa || nu || credential || pi_v
    pub fn to_bytes(&self) -> Vec<u8> {
        let proof_bytes = self.pi_v.to_bytes();

        let mut bytes = Vec::with_capacity(96 + 48 + 96 + proof_bytes.len());
        bytes.extend_from_slice(&self.kappa.to_affine().to_compressed());
        bytes.extend_from_slice(&self.nu.to_affine().to_compressed());
        bytes.extend_from_slice(&self.credential.to_bytes());
        bytes.extend_from_slice(&proof_bytes);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Theta> {
        Theta::try_from(bytes)
    }
}

impl TryFrom<&[u8]> for Theta {
    type Error = CoconutError;

    fn try_from(bytes: &[u8]) -> Result<Theta> {
        if bytes.len() < 96 + 48 + 96 {
            return Err(CoconutError::DeserializationMinLength {
                min: 96 + 48 + 96,
                actual: bytes.len(),
            });
        }

        // safety: we've just made the length check
        #[allow(clippy::unwrap_used)]
        let kappa_bytes: &[u8; 96] = &bytes[..96].try_into().unwrap();
        let kappa = try_deserialize_g2_projective(kappa_bytes)?;

        #[allow(clippy::unwrap_used)]
        let nu_bytes: &[u8; 48] = &bytes[96..144].try_into().unwrap();
        let nu = try_deserialize_g1_projective(nu_bytes)?;

        let credential = Signature::try_from(&bytes[144..240])?;
        let pi_v = ProofKappaNu::from_bytes(&bytes[240..])?;

        Ok(Theta {
            kappa,
            nu,
            credential,
            pi_v,
        })
    }
}

impl Bytable for Theta {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        Theta::try_from(slice)
    }
}

impl Base58 for Theta {}

/// Tumbler-bound show-credential payload; zeta = g1^s (s being the sequence
/// number, the first private attribute) acts as the double-spend tag and the
/// embedded proof is bound to the recipient address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThetaTumbler {
    pub(crate) kappa: G2Projective,
    pub(crate) nu: G1Projective,
    // zeta
    pub(crate) zeta: G1Projective,
    pub(crate) credential: Signature,
    pub(crate) pi_v: ProofKappaNuZeta,
}

impl ThetaTumbler {
    fn verify_proof(
        &self,
        params: &Parameters,
        verification_key: &VerificationKey,
        address: &[u8],
    ) -> bool {
        self.pi_v.verify(
            params,
            verification_key,
            &self.credential,
            &self.kappa,
            &self.nu,
            &self.zeta,
            address,
        )
    }

    pub fn zeta(&self) -> &G1Projective {
        &self.zeta
    }

    pub fn zeta_bytes(&self) -> [u8; 48] {
        self.zeta.to_affine().to_compressed()
    }

    pub fn credential(&self) -> &Signature {
        &self.credential
    }

    // kappa || nu || zeta || credential || pi_v
    pub fn to_bytes(&self) -> Vec<u8> {
        let proof_bytes = self.pi_v.to_bytes();

        let mut bytes = Vec::with_capacity(96 + 48 + 48 + 96 + proof_bytes.len());
        bytes.extend_from_slice(&self.kappa.to_affine().to_compressed());
        bytes.extend_from_slice(&self.nu.to_affine().to_compressed());
        bytes.extend_from_slice(&self.zeta.to_affine().to_compressed());
        bytes.extend_from_slice(&self.credential.to_bytes());
        bytes.extend_from_slice(&proof_bytes);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<ThetaTumbler> {
        ThetaTumbler::try_from(bytes)
    }
}

impl TryFrom<&[u8]> for ThetaTumbler {
    type Error = CoconutError;

    fn try_from(bytes: &[u8]) -> Result<ThetaTumbler> {
        if bytes.len() < 96 + 48 + 48 + 96 {
            return Err(CoconutError::DeserializationMinLength {
                min: 96 + 48 + 48 + 96,
                actual: bytes.len(),
            });
        }

        // safety: we've just made the length check
        #[allow(clippy::unwrap_used)]
        let kappa_bytes: &[u8; 96] = &bytes[..96].try_into().unwrap();
        let kappa = try_deserialize_g2_projective(kappa_bytes)?;

        #[allow(clippy::unwrap_used)]
        let nu_bytes: &[u8; 48] = &bytes[96..144].try_into().unwrap();
        let nu = try_deserialize_g1_projective(nu_bytes)?;

        #[allow(clippy::unwrap_used)]
        let zeta_bytes: &[u8; 48] = &bytes[144..192].try_into().unwrap();
        let zeta = try_deserialize_g1_projective(zeta_bytes)?;

        let credential = Signature::try_from(&bytes[192..288])?;
        let pi_v = ProofKappaNuZeta::from_bytes(&bytes[288..])?;

        Ok(ThetaTumbler {
            kappa,
            nu,
            zeta,
            credential,
            pi_v,
        })
    }
}

impl Bytable for ThetaTumbler {
    fn to_byte_vec(&self) -> Vec<u8> {
        self.to_bytes()
    }

    fn try_from_byte_slice(slice: &[u8]) -> Result<Self> {
        ThetaTumbler::try_from(slice)
    }
}

impl Base58 for ThetaTumbler {}

/// Produces the material required to show the credential without revealing
/// the attributes it embeds.
pub fn prove_credential(
    params: &Parameters,
    verification_key: &VerificationKey,
    signature: &Signature,
    private_attributes: &[Attribute],
) -> Result<Theta> {
    if private_attributes.is_empty() {
        return Err(CoconutError::Verification(
            "tried to prove a credential with an empty set of private attributes".to_string(),
        ));
    }

    if private_attributes.len() > verification_key.beta().len() {
        return Err(CoconutError::Verification(format!(
            "tried to prove a credential for higher than supported by the provided verification key number of attributes (max: {}, requested: {})",
            verification_key.beta().len(),
            private_attributes.len()
        )));
    }

    // randomise the signature to unlink it from the issuance
    let signature_prime = signature.randomise(params);

    let blinding_factor = params.random_scalar();
    let kappa = compute_kappa(
        params,
        verification_key,
        private_attributes,
        blinding_factor,
    );
    let nu = signature_prime.sig1() * blinding_factor;

    let pi_v = ProofKappaNu::construct(
        params,
        verification_key,
        &signature_prime,
        private_attributes,
        &blinding_factor,
        &kappa,
        &nu,
    );

    Ok(Theta {
        kappa,
        nu,
        credential: signature_prime,
        pi_v,
    })
}

/// As [`prove_credential`], additionally deriving the double-spend tag
/// zeta = g1^s and binding the proof to the provided recipient address.
pub fn prove_credential_tumbler(
    params: &Parameters,
    verification_key: &VerificationKey,
    signature: &Signature,
    private_attributes: &[Attribute],
    address: &[u8],
) -> Result<ThetaTumbler> {
    if private_attributes.is_empty() {
        return Err(CoconutError::Verification(
            "tried to prove a credential with an empty set of private attributes".to_string(),
        ));
    }

    if private_attributes.len() > verification_key.beta().len() {
        return Err(CoconutError::Verification(format!(
            "tried to prove a credential for higher than supported by the provided verification key number of attributes (max: {}, requested: {})",
            verification_key.beta().len(),
            private_attributes.len()
        )));
    }

    let signature_prime = signature.randomise(params);

    let blinding_factor = params.random_scalar();
    let kappa = compute_kappa(
        params,
        verification_key,
        private_attributes,
        blinding_factor,
    );
    let nu = signature_prime.sig1() * blinding_factor;

    // the serial number is the first private attribute by convention
    let zeta = params.gen1() * private_attributes[0];

    let pi_v = ProofKappaNuZeta::construct(
        params,
        verification_key,
        &signature_prime,
        private_attributes,
        &blinding_factor,
        &kappa,
        &nu,
        &zeta,
        address,
    );

    Ok(ThetaTumbler {
        kappa,
        nu,
        zeta,
        credential: signature_prime,
        pi_v,
    })
}

fn check_credential_pairing(
    params: &Parameters,
    verification_key: &VerificationKey,
    kappa: &G2Projective,
    nu: &G1Projective,
    credential: &Signature,
    public_attributes: &[Attribute],
    private_attributes_len: usize,
) -> bool {
    if public_attributes.len() + private_attributes_len > verification_key.beta().len() {
        return false;
    }

    // fold the public attributes into kappa
    let kappa_eff = if public_attributes.is_empty() {
        *kappa
    } else {
        kappa
            + public_attributes
                .iter()
                .zip(verification_key.beta().iter().skip(private_attributes_len))
                .map(|(pub_attr, beta_i)| beta_i * pub_attr)
                .sum::<G2Projective>()
    };

    // e(sigma1', kappa) == e(sigma2' * nu, g2)
    check_bilinear_pairing(
        &credential.sig1().to_affine(),
        &G2Prepared::from(kappa_eff.to_affine()),
        &(credential.sig2() + nu).to_affine(),
        params.prepared_miller_g2(),
    ) && !bool::from(credential.sig1().is_identity())
}

/// Verifies a shown credential against the (aggregated) verification key.
pub fn verify_credential(
    params: &Parameters,
    verification_key: &VerificationKey,
    theta: &Theta,
    public_attributes: &[Attribute],
) -> bool {
    if !theta.verify_proof(params, verification_key) {
        return false;
    }

    check_credential_pairing(
        params,
        verification_key,
        &theta.kappa,
        &theta.nu,
        &theta.credential,
        public_attributes,
        theta.pi_v.private_attributes_len(),
    )
}

/// Verifies a tumbler-bound showing: the zeta-extended proof (recomputed
/// with the bound address) plus the usual pairing equation.
pub fn verify_credential_tumbler(
    params: &Parameters,
    verification_key: &VerificationKey,
    theta: &ThetaTumbler,
    public_attributes: &[Attribute],
    address: &[u8],
) -> bool {
    if bool::from(theta.zeta.is_identity()) {
        return false;
    }

    if !theta.verify_proof(params, verification_key, address) {
        return false;
    }

    check_credential_pairing(
        params,
        verification_key,
        &theta.kappa,
        &theta.nu,
        &theta.credential,
        public_attributes,
        theta.pi_v.private_attributes_len(),
    )
}

/// Verifies a credential over public attributes only.
pub fn verify(
    params: &Parameters,
    verification_key: &VerificationKey,
    public_attributes: &[Attribute],
    sig: &Signature,
) -> bool {
    let kappa = (verification_key.alpha()
        + public_attributes
            .iter()
            .zip(verification_key.beta().iter())
            .map(|(m_i, b_i)| b_i * m_i)
            .sum::<G2Projective>())
    .to_affine();

    check_bilinear_pairing(
        &sig.sig1().to_affine(),
        &G2Prepared::from(kappa),
        &sig.sig2().to_affine(),
        params.prepared_miller_g2(),
    ) && !bool::from(sig.sig1().is_identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::elgamal_keygen;
    use crate::scheme::issuance::{blind_sign, prepare_blind_sign};
    use crate::scheme::keygen::keygen;
    use crate::scheme::setup::setup;

    fn issue_credential(
        params: &Parameters,
        private_attributes: &[Attribute],
        public_attributes: &[Attribute],
    ) -> (crate::scheme::keygen::KeyPair, Signature) {
        let keypair = keygen(params);
        let elgamal_keypair = elgamal_keygen(params);

        let lambda = prepare_blind_sign(
            params,
            elgamal_keypair.public_key(),
            private_attributes,
            public_attributes,
        )
        .unwrap();
        let blinded_signature = blind_sign(
            params,
            keypair.secret_key(),
            elgamal_keypair.public_key(),
            &lambda,
            public_attributes,
        )
        .unwrap();
        let signature = blinded_signature.unblind(elgamal_keypair.private_key());

        (keypair, signature)
    }

    #[test]
    fn theta_bytes_roundtrip() {
        let params = setup(2).unwrap();
        let keypair = keygen(&params);

        let r = params.random_scalar();
        let s = params.random_scalar();
        let signature = Signature(params.gen1() * r, params.gen1() * s);
        let private_attributes = params.n_random_scalars(2);

        let theta = prove_credential(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
        )
        .unwrap();

        let bytes = theta.to_bytes();
        assert_eq!(Theta::try_from(bytes.as_slice()).unwrap(), theta);
    }

    #[test]
    fn theta_tumbler_bytes_roundtrip() {
        let params = setup(2).unwrap();
        let keypair = keygen(&params);

        let r = params.random_scalar();
        let s = params.random_scalar();
        let signature = Signature(params.gen1() * r, params.gen1() * s);
        let private_attributes = params.n_random_scalars(2);

        let theta = prove_credential_tumbler(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &[42u8; 20],
        )
        .unwrap();

        let bytes = theta.to_bytes();
        assert_eq!(ThetaTumbler::try_from(bytes.as_slice()).unwrap(), theta);
    }

    #[test]
    fn shown_credential_verifies() {
        let params = setup(3).unwrap();
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = params.n_random_scalars(1);

        let (keypair, signature) =
            issue_credential(&params, &private_attributes, &public_attributes);

        let theta = prove_credential(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
        )
        .unwrap();

        assert!(verify_credential(
            &params,
            keypair.verification_key(),
            &theta,
            &public_attributes,
        ));
    }

    #[test]
    fn shown_credential_fails_with_wrong_public_attributes() {
        let params = setup(3).unwrap();
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = params.n_random_scalars(1);

        let (keypair, signature) =
            issue_credential(&params, &private_attributes, &public_attributes);

        let theta = prove_credential(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
        )
        .unwrap();

        let other_attributes = params.n_random_scalars(1);
        assert!(!verify_credential(
            &params,
            keypair.verification_key(),
            &theta,
            &other_attributes,
        ));
    }

    #[test]
    fn randomisation_does_not_affect_verification() {
        let params = setup(1).unwrap();
        let private_attributes = params.n_random_scalars(1);

        let (keypair, signature) = issue_credential(&params, &private_attributes, &[]);
        let randomised = signature.randomise(&params);

        for sig in [signature, randomised] {
            let theta = prove_credential(
                &params,
                keypair.verification_key(),
                &sig,
                &private_attributes,
            )
            .unwrap();
            assert!(verify_credential(
                &params,
                keypair.verification_key(),
                &theta,
                &[],
            ));
        }
    }

    #[test]
    fn tumbler_showing_rejects_a_different_address() {
        let params = setup(3).unwrap();
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = params.n_random_scalars(1);

        let (keypair, signature) =
            issue_credential(&params, &private_attributes, &public_attributes);

        let address = [7u8; 20];
        let theta = prove_credential_tumbler(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &address,
        )
        .unwrap();

        assert!(verify_credential_tumbler(
            &params,
            keypair.verification_key(),
            &theta,
            &public_attributes,
            &address,
        ));

        assert!(!verify_credential_tumbler(
            &params,
            keypair.verification_key(),
            &theta,
            &public_attributes,
            &[8u8; 20],
        ));
    }

    #[test]
    fn tumbler_zeta_encodes_the_sequence_number() {
        let params = setup(2).unwrap();
        let sequence_number = Scalar::from(42);
        let private_attributes = vec![sequence_number, params.random_scalar()];

        let (keypair, signature) = issue_credential(&params, &private_attributes, &[]);

        let theta = prove_credential_tumbler(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &[1u8; 20],
        )
        .unwrap();

        assert_eq!(params.gen1() * sequence_number, theta.zeta);
    }
}

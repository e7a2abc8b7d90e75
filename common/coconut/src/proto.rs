// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire representations of the cryptographic material that travels inside
//! chain transactions and issuer commands.
//!
//! The protobuf encoding is not canonical, so everything that ends up inside
//! a signed message goes through the `one_way_to_bytes` serialisations
//! instead: fixed-order concatenation of the compressed group elements with
//! big-endian length prefixes.

use bls12_381::Scalar;
use group::Curve;
use prost::Message;

use crate::elgamal;
use crate::error::{CoconutError, Result};
use crate::scheme::issuance::BlindSignRequest;
use crate::scheme::verification::ThetaTumbler;
use crate::scheme::Signature;
use crate::utils::try_deserialize_scalar;
use crate::Attribute;

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoElGamalPublicKey {
    /// Compressed gamma; unique per credential request and reused as the
    /// lookup handle for issued credentials.
    #[prost(bytes = "vec", tag = "1")]
    pub gamma: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoCiphertext {
    #[prost(bytes = "vec", tag = "1")]
    pub c1: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub c2: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoLambda {
    #[prost(bytes = "vec", tag = "1")]
    pub commitment: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub ciphertexts: Vec<ProtoCiphertext>,
    #[prost(bytes = "vec", tag = "3")]
    pub proof: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub sig1: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub sig2: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoBlindedSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub sig1: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub c1: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub c2: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoVerificationKey {
    #[prost(bytes = "vec", tag = "1")]
    pub alpha: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub beta: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoThetaTumbler {
    #[prost(bytes = "vec", tag = "1")]
    pub kappa: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub nu: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub zeta: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub credential: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub proof: Vec<u8>,
}

/// Everything an issuing authority needs to blind-sign a credential request
/// observed on the chain.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoBlindSignMaterials {
    #[prost(message, optional, tag = "1")]
    pub lambda: Option<ProtoLambda>,
    #[prost(message, optional, tag = "2")]
    pub eg_pub: Option<ProtoElGamalPublicKey>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub pub_m: Vec<Vec<u8>>,
}

/// Everything a verifier needs to decide validity of a deposited credential.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct ProtoTumblerBlindVerifyMaterials {
    #[prost(bytes = "vec", tag = "1")]
    pub sig: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub pub_m: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "3")]
    pub theta: Option<ProtoThetaTumbler>,
}

fn append_length_prefixed(out: &mut Vec<u8>, chunk: &[u8]) {
    out.extend_from_slice(&(chunk.len() as u64).to_be_bytes());
    out.extend_from_slice(chunk);
}

impl ProtoBlindSignMaterials {
    pub fn marshal(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes)
            .map_err(|err| CoconutError::Deserialization(format!("invalid materials: {err}")))
    }

    pub fn gamma_bytes(&self) -> &[u8] {
        self.eg_pub.as_ref().map(|pk| pk.gamma.as_slice()).unwrap_or_default()
    }

    /// Deterministic serialisation fed into signed chain messages.
    pub fn one_way_to_bytes(&self) -> Result<Vec<u8>> {
        let lambda = self.lambda.as_ref().ok_or_else(|| {
            CoconutError::Deserialization("blind sign materials are missing lambda".to_string())
        })?;
        let eg_pub = self.eg_pub.as_ref().ok_or_else(|| {
            CoconutError::Deserialization(
                "blind sign materials are missing the ElGamal public key".to_string(),
            )
        })?;

        let mut bytes = Vec::new();
        append_length_prefixed(&mut bytes, &lambda.commitment);
        bytes.extend_from_slice(&(lambda.ciphertexts.len() as u64).to_be_bytes());
        for ciphertext in &lambda.ciphertexts {
            append_length_prefixed(&mut bytes, &ciphertext.c1);
            append_length_prefixed(&mut bytes, &ciphertext.c2);
        }
        append_length_prefixed(&mut bytes, &lambda.proof);
        append_length_prefixed(&mut bytes, &eg_pub.gamma);
        bytes.extend_from_slice(&(self.pub_m.len() as u64).to_be_bytes());
        for attribute in &self.pub_m {
            append_length_prefixed(&mut bytes, attribute);
        }

        Ok(bytes)
    }
}

impl ProtoTumblerBlindVerifyMaterials {
    pub fn marshal(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes)
            .map_err(|err| CoconutError::Deserialization(format!("invalid materials: {err}")))
    }

    /// The double-spend tag carried inside the showing.
    pub fn zeta_bytes(&self) -> &[u8] {
        self.theta.as_ref().map(|theta| theta.zeta.as_slice()).unwrap_or_default()
    }
}

/// Rich-typed counterpart of [`ProtoBlindSignMaterials`].
#[derive(Debug, PartialEq, Eq)]
pub struct BlindSignMaterials {
    pub lambda: BlindSignRequest,
    pub eg_pub: elgamal::PublicKey,
    pub pub_m: Vec<Attribute>,
}

impl BlindSignMaterials {
    pub fn new(
        lambda: BlindSignRequest,
        eg_pub: elgamal::PublicKey,
        pub_m: Vec<Attribute>,
    ) -> Self {
        BlindSignMaterials {
            lambda,
            eg_pub,
            pub_m,
        }
    }

    pub fn to_proto(&self) -> ProtoBlindSignMaterials {
        let ciphertexts = self
            .lambda
            .ciphertexts()
            .iter()
            .map(|ciphertext| ProtoCiphertext {
                c1: ciphertext.c1().to_affine().to_compressed().to_vec(),
                c2: ciphertext.c2().to_affine().to_compressed().to_vec(),
            })
            .collect();

        // the lambda is round-tripped through its flat encoding to avoid
        // duplicating the proof layout here
        let lambda_bytes = self.lambda.to_bytes();
        let proof_offset = 48 + 8 + self.lambda.ciphertexts().len() * 96;

        ProtoBlindSignMaterials {
            lambda: Some(ProtoLambda {
                commitment: self.lambda.commitment().to_affine().to_compressed().to_vec(),
                ciphertexts,
                proof: lambda_bytes[proof_offset..].to_vec(),
            }),
            eg_pub: Some(ProtoElGamalPublicKey {
                gamma: self.eg_pub.to_bytes().to_vec(),
            }),
            pub_m: self.pub_m.iter().map(|m| m.to_bytes().to_vec()).collect(),
        }
    }

    pub fn try_from_proto(proto: &ProtoBlindSignMaterials) -> Result<Self> {
        let proto_lambda = proto.lambda.as_ref().ok_or_else(|| {
            CoconutError::Deserialization("blind sign materials are missing lambda".to_string())
        })?;
        let proto_eg_pub = proto.eg_pub.as_ref().ok_or_else(|| {
            CoconutError::Deserialization(
                "blind sign materials are missing the ElGamal public key".to_string(),
            )
        })?;

        // reassemble the flat lambda encoding
        let mut lambda_bytes =
            Vec::with_capacity(48 + 8 + proto_lambda.ciphertexts.len() * 96 + proto_lambda.proof.len());
        lambda_bytes.extend_from_slice(&proto_lambda.commitment);
        lambda_bytes.extend_from_slice(&(proto_lambda.ciphertexts.len() as u64).to_le_bytes());
        for ciphertext in &proto_lambda.ciphertexts {
            lambda_bytes.extend_from_slice(&ciphertext.c1);
            lambda_bytes.extend_from_slice(&ciphertext.c2);
        }
        lambda_bytes.extend_from_slice(&proto_lambda.proof);

        let lambda = BlindSignRequest::from_bytes(&lambda_bytes)?;
        let eg_pub = elgamal::PublicKey::from_bytes(&proto_eg_pub.gamma)?;
        let pub_m = proto
            .pub_m
            .iter()
            .map(|m| try_deserialize_scalar(m))
            .collect::<Result<Vec<_>>>()?;

        Ok(BlindSignMaterials {
            lambda,
            eg_pub,
            pub_m,
        })
    }
}

/// Rich-typed counterpart of [`ProtoTumblerBlindVerifyMaterials`].
#[derive(Debug, PartialEq, Eq)]
pub struct TumblerBlindVerifyMaterials {
    pub signature: Signature,
    pub pub_m: Vec<Attribute>,
    pub theta: ThetaTumbler,
}

impl TumblerBlindVerifyMaterials {
    pub fn new(signature: Signature, pub_m: Vec<Attribute>, theta: ThetaTumbler) -> Self {
        TumblerBlindVerifyMaterials {
            signature,
            pub_m,
            theta,
        }
    }

    pub fn to_proto(&self) -> ProtoTumblerBlindVerifyMaterials {
        let theta_bytes = self.theta.to_bytes();

        ProtoTumblerBlindVerifyMaterials {
            sig: self.signature.to_bytes().to_vec(),
            pub_m: self.pub_m.iter().map(|m| m.to_bytes().to_vec()).collect(),
            theta: Some(ProtoThetaTumbler {
                kappa: theta_bytes[..96].to_vec(),
                nu: theta_bytes[96..144].to_vec(),
                zeta: theta_bytes[144..192].to_vec(),
                credential: theta_bytes[192..288].to_vec(),
                proof: theta_bytes[288..].to_vec(),
            }),
        }
    }

    pub fn try_from_proto(proto: &ProtoTumblerBlindVerifyMaterials) -> Result<Self> {
        let proto_theta = proto.theta.as_ref().ok_or_else(|| {
            CoconutError::Deserialization("verify materials are missing theta".to_string())
        })?;

        let mut theta_bytes = Vec::with_capacity(
            288 + proto_theta.proof.len(),
        );
        theta_bytes.extend_from_slice(&proto_theta.kappa);
        theta_bytes.extend_from_slice(&proto_theta.nu);
        theta_bytes.extend_from_slice(&proto_theta.zeta);
        theta_bytes.extend_from_slice(&proto_theta.credential);
        theta_bytes.extend_from_slice(&proto_theta.proof);

        let theta = ThetaTumbler::from_bytes(&theta_bytes)?;
        let signature = Signature::from_bytes(&proto.sig)?;
        let pub_m = proto
            .pub_m
            .iter()
            .map(|m| try_deserialize_scalar(m))
            .collect::<Result<Vec<_>>>()?;

        Ok(TumblerBlindVerifyMaterials {
            signature,
            pub_m,
            theta,
        })
    }
}

/// Decodes the first public attribute and compares it against the claimed
/// credential value.
pub fn first_public_attribute_matches_value(pub_m: &[Vec<u8>], value: u64) -> bool {
    let Some(first) = pub_m.first() else {
        return false;
    };
    match try_deserialize_scalar(first) {
        Ok(attribute) => attribute == Scalar::from(value),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elgamal::elgamal_keygen;
    use crate::scheme::issuance::prepare_blind_sign;
    use crate::scheme::keygen::keygen;
    use crate::scheme::setup::setup;
    use crate::scheme::verification::prove_credential_tumbler;

    #[test]
    fn blind_sign_materials_proto_roundtrip() {
        let params = setup(3).unwrap();
        let elgamal_keypair = elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = vec![Scalar::from(5)];

        let lambda = prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();

        let materials = BlindSignMaterials::new(
            lambda,
            *elgamal_keypair.public_key(),
            public_attributes,
        );

        let proto = materials.to_proto();
        let recovered = BlindSignMaterials::try_from_proto(&proto).unwrap();
        assert_eq!(materials, recovered);

        // and through the actual wire encoding
        let marshalled = proto.marshal();
        let unmarshalled = ProtoBlindSignMaterials::unmarshal(&marshalled).unwrap();
        assert_eq!(proto, unmarshalled);
    }

    #[test]
    fn one_way_bytes_are_deterministic() {
        let params = setup(2).unwrap();
        let elgamal_keypair = elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(1);
        let public_attributes = vec![Scalar::from(10)];

        let lambda = prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();

        let materials = BlindSignMaterials::new(
            lambda,
            *elgamal_keypair.public_key(),
            public_attributes,
        );
        let proto = materials.to_proto();

        assert_eq!(
            proto.one_way_to_bytes().unwrap(),
            proto.one_way_to_bytes().unwrap()
        );
    }

    #[test]
    fn tumbler_materials_proto_roundtrip() {
        let params = setup(3).unwrap();
        let keypair = keygen(&params);

        let r = params.random_scalar();
        let s = params.random_scalar();
        let signature = crate::scheme::Signature(params.gen1() * r, params.gen1() * s);
        let private_attributes = params.n_random_scalars(2);

        let theta = prove_credential_tumbler(
            &params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &[3u8; 20],
        )
        .unwrap();

        let materials =
            TumblerBlindVerifyMaterials::new(signature, vec![Scalar::from(2)], theta);

        let proto = materials.to_proto();
        let recovered = TumblerBlindVerifyMaterials::try_from_proto(&proto).unwrap();
        assert_eq!(materials, recovered);
    }

    #[test]
    fn first_public_attribute_value_check() {
        assert!(first_public_attribute_matches_value(
            &[Scalar::from(50).to_bytes().to_vec()],
            50
        ));
        assert!(!first_public_attribute_matches_value(
            &[Scalar::from(50).to_bytes().to_vec()],
            20
        ));
        assert!(!first_public_attribute_matches_value(&[], 20));
        assert!(!first_public_attribute_matches_value(&[vec![1, 2, 3]], 20));
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Concurrency layer for the credential scheme: a shared job queue drained
//! by worker tasks plus a facade that owns the single system-wide
//! [`Parameters`] instance so callers never handle it directly.

pub use jobqueue::{JobPacket, JobQueue, JobSender};
pub use shutdown::{ShutdownListener, ShutdownNotifier};
pub use worker::JobWorker;

pub mod jobqueue;
pub mod shutdown;
pub mod worker;

use std::sync::Arc;

use bls12_381::Scalar;
use log::warn;
use tokio::sync::oneshot;

use opal_coconut::elgamal::{self, ElGamalKeyPair};
use opal_coconut::{
    aggregate_signature_shares, aggregate_signatures, aggregate_verification_keys, blind_sign,
    prepare_blind_sign, prove_credential, prove_credential_tumbler, sign, verify,
    verify_credential, verify_credential_tumbler, Attribute, BlindSignRequest, BlindedSignature,
    CoconutError, Parameters, SecretKey, Signature, SignatureShare, SignerIndex, Theta,
    ThetaTumbler, VerificationKey,
};

/// Stateless wrappers around the scheme operations sharing one `Parameters`
/// instance. Independent sub-operations (per-authority unblinding, per-item
/// verification) are fanned out through the job queue; everything else runs
/// inline on the caller's task.
pub struct CoconutWorker {
    params: Arc<Parameters>,
    jobs: JobSender,
}

impl CoconutWorker {
    pub fn new(jobs: JobSender, params: Parameters) -> CoconutWorker {
        CoconutWorker {
            params: Arc::new(params),
            jobs,
        }
    }

    pub fn max_attributes(&self) -> usize {
        self.params.max_attributes()
    }

    pub fn random_scalar(&self) -> Scalar {
        self.params.random_scalar()
    }

    pub fn elgamal_keygen(&self) -> ElGamalKeyPair {
        elgamal::elgamal_keygen(&self.params)
    }

    pub fn sign(
        &self,
        secret_key: &SecretKey,
        public_attributes: &[Attribute],
    ) -> Result<Signature, CoconutError> {
        sign(&self.params, secret_key, public_attributes)
    }

    pub fn verify(
        &self,
        verification_key: &VerificationKey,
        public_attributes: &[Attribute],
        signature: &Signature,
    ) -> bool {
        verify(&self.params, verification_key, public_attributes, signature)
    }

    pub fn prepare_blind_sign(
        &self,
        pub_key: &elgamal::PublicKey,
        private_attributes: &[Attribute],
        public_attributes: &[Attribute],
    ) -> Result<BlindSignRequest, CoconutError> {
        prepare_blind_sign(&self.params, pub_key, private_attributes, public_attributes)
    }

    pub fn blind_sign(
        &self,
        secret_key: &SecretKey,
        pub_key: &elgamal::PublicKey,
        blind_sign_request: &BlindSignRequest,
        public_attributes: &[Attribute],
    ) -> Result<BlindedSignature, CoconutError> {
        blind_sign(
            &self.params,
            secret_key,
            pub_key,
            blind_sign_request,
            public_attributes,
        )
    }

    pub fn unblind(
        &self,
        blinded_signature: &BlindedSignature,
        private_key: &elgamal::PrivateKey,
    ) -> Signature {
        blinded_signature.unblind(private_key)
    }

    pub fn randomise(&self, signature: &Signature) -> Signature {
        signature.randomise(&self.params)
    }

    pub fn aggregate_signatures(
        &self,
        signatures: &[Signature],
        indices: Option<&[SignerIndex]>,
    ) -> Result<Signature, CoconutError> {
        aggregate_signatures(&self.params, signatures, indices)
    }

    pub fn aggregate_signature_shares(
        &self,
        shares: &[SignatureShare],
    ) -> Result<Signature, CoconutError> {
        aggregate_signature_shares(&self.params, shares)
    }

    pub fn aggregate_verification_keys(
        &self,
        verification_keys: &[VerificationKey],
        indices: Option<&[SignerIndex]>,
    ) -> Result<VerificationKey, CoconutError> {
        aggregate_verification_keys(verification_keys, indices)
    }

    pub fn prove_credential(
        &self,
        verification_key: &VerificationKey,
        signature: &Signature,
        private_attributes: &[Attribute],
    ) -> Result<Theta, CoconutError> {
        prove_credential(
            &self.params,
            verification_key,
            signature,
            private_attributes,
        )
    }

    pub fn prove_credential_tumbler(
        &self,
        verification_key: &VerificationKey,
        signature: &Signature,
        private_attributes: &[Attribute],
        address: &[u8],
    ) -> Result<ThetaTumbler, CoconutError> {
        prove_credential_tumbler(
            &self.params,
            verification_key,
            signature,
            private_attributes,
            address,
        )
    }

    pub fn verify_credential(
        &self,
        verification_key: &VerificationKey,
        theta: &Theta,
        public_attributes: &[Attribute],
    ) -> bool {
        verify_credential(&self.params, verification_key, theta, public_attributes)
    }

    pub fn verify_credential_tumbler(
        &self,
        verification_key: &VerificationKey,
        theta: &ThetaTumbler,
        public_attributes: &[Attribute],
        address: &[u8],
    ) -> bool {
        verify_credential_tumbler(
            &self.params,
            verification_key,
            theta,
            public_attributes,
            address,
        )
    }

    /// Unblinds a batch of partial credentials through the worker pool,
    /// returning the results in input order.
    pub async fn unblind_batch(
        &self,
        blinded_signatures: Vec<BlindedSignature>,
        private_key: Arc<elgamal::PrivateKey>,
    ) -> Vec<Signature> {
        let mut receivers = Vec::with_capacity(blinded_signatures.len());

        for blinded_signature in blinded_signatures {
            let (tx, rx) = oneshot::channel();
            let private_key = Arc::clone(&private_key);
            let enqueued = self
                .jobs
                .send(Box::new(move || {
                    let _ = tx.send(blinded_signature.unblind(&private_key));
                }))
                .await;
            if !enqueued {
                warn!("the job queue is gone; unblinding inline");
            }
            receivers.push((rx, blinded_signature, enqueued));
        }

        let mut out = Vec::with_capacity(receivers.len());
        for (rx, blinded_signature, enqueued) in receivers {
            if enqueued {
                match rx.await {
                    Ok(signature) => {
                        out.push(signature);
                        continue;
                    }
                    Err(_) => warn!("a job worker dropped an unblinding result"),
                }
            }
            out.push(blinded_signature.unblind(&private_key));
        }
        out
    }

    /// Verifies a batch of tumbler showings through the worker pool,
    /// preserving input order. Each item carries its own public attributes
    /// and the address the showing claims to be bound to.
    pub async fn verify_credential_tumbler_batch(
        &self,
        verification_key: Arc<VerificationKey>,
        items: Vec<(ThetaTumbler, Vec<Attribute>, Vec<u8>)>,
    ) -> Vec<bool> {
        let mut receivers = Vec::with_capacity(items.len());

        for (theta, public_attributes, address) in items {
            let (tx, rx) = oneshot::channel();
            let params = Arc::clone(&self.params);
            let verification_key = Arc::clone(&verification_key);
            let enqueued = self
                .jobs
                .send(Box::new(move || {
                    let valid = verify_credential_tumbler(
                        &params,
                        &verification_key,
                        &theta,
                        &public_attributes,
                        &address,
                    );
                    let _ = tx.send(valid);
                }))
                .await;
            receivers.push((rx, enqueued));
        }

        let mut out = Vec::with_capacity(receivers.len());
        for (rx, enqueued) in receivers {
            if !enqueued {
                out.push(false);
                continue;
            }
            match rx.await {
                Ok(valid) => out.push(valid),
                Err(_) => {
                    warn!("a job worker dropped a verification result");
                    out.push(false);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facade(queue: &JobQueue) -> CoconutWorker {
        let params = Parameters::new(3).unwrap();
        CoconutWorker::new(queue.sender(), params)
    }

    #[tokio::test]
    async fn batch_unblinding_matches_inline_unblinding() {
        let queue = JobQueue::new(64);
        let notifier = ShutdownNotifier::new();
        let _workers = (0..2)
            .map(|id| JobWorker::spawn(&queue, id, notifier.subscribe()))
            .collect::<Vec<_>>();

        let worker = facade(&queue);

        let keypairs = (0..3)
            .map(|_| {
                let params = Parameters::new(3).unwrap();
                opal_coconut::keygen(&params)
            })
            .collect::<Vec<_>>();
        let elgamal_keypair = worker.elgamal_keygen();

        let private_attributes = vec![worker.random_scalar(), worker.random_scalar()];
        let public_attributes = vec![worker.random_scalar()];

        let lambda = worker
            .prepare_blind_sign(
                elgamal_keypair.public_key(),
                &private_attributes,
                &public_attributes,
            )
            .unwrap();

        let blinded = keypairs
            .iter()
            .map(|keypair| {
                worker
                    .blind_sign(
                        keypair.secret_key(),
                        elgamal_keypair.public_key(),
                        &lambda,
                        &public_attributes,
                    )
                    .unwrap()
            })
            .collect::<Vec<_>>();

        let inline = blinded
            .iter()
            .map(|blinded_signature| worker.unblind(blinded_signature, elgamal_keypair.private_key()))
            .collect::<Vec<_>>();

        let private_key = Arc::new(
            opal_coconut::elgamal::PrivateKey::from_bytes(
                &elgamal_keypair.private_key().to_bytes(),
            )
            .unwrap(),
        );
        let batched = worker.unblind_batch(blinded, private_key).await;

        assert_eq!(inline, batched);

        notifier.signal_shutdown();
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! The internal command queue of a service: commands distilled from chain
//! events are pushed onto an mpsc channel and a pool of handler tasks
//! resolves them through the shared coconut facade.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;

use opal_comm::commands::{Command, CommandRequest, CommandResponse};
use opal_coconut::proto::{ProtoTumblerBlindVerifyMaterials, TumblerBlindVerifyMaterials};
use opal_coconut::{Bytable, SecretKey, VerificationKey};
use opal_coconut_worker::{CoconutWorker, ShutdownListener};

/// Everything a handler task may need to resolve commands. Issuers carry
/// the signing share; verifiers carry the aggregated verification key.
pub struct HandlerContext {
    pub coconut: Arc<CoconutWorker>,
    pub secret_key: Option<Arc<SecretKey>>,
    pub issuer_id: u64,
    pub verification_key: Option<Arc<VerificationKey>>,
}

/// Spawns `count` handler tasks draining a fresh command channel and
/// returns its sending half.
pub fn spawn_command_handlers(
    count: usize,
    context: Arc<HandlerContext>,
    shutdown: ShutdownListener,
) -> mpsc::Sender<CommandRequest> {
    let (tx, rx) = mpsc::channel::<CommandRequest>(64);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    for id in 0..count {
        let rx = Arc::clone(&rx);
        let context = Arc::clone(&context);
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            debug!("command handler {id}: started");
            loop {
                let request = tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    request = async { rx.lock().await.recv().await } => match request {
                        Some(request) => request,
                        None => break,
                    }
                };

                let response = handle_command(&context, &request.command);
                if request.response_tx.send(response).is_err() {
                    warn!("command handler {id}: the requester is gone");
                }
            }
            debug!("command handler {id}: exiting");
        });
    }

    tx
}

fn handle_command(context: &HandlerContext, command: &Command) -> CommandResponse {
    match command {
        Command::BlindSign(request) => handle_blind_sign(context, request),
        Command::CredentialVerification(request) => {
            handle_credential_verification(context, request)
        }
        other => CommandResponse::Error {
            message: format!("unsupported command: {:?}", other.id()),
        },
    }
}

fn handle_blind_sign(
    context: &HandlerContext,
    request: &opal_comm::commands::BlindSignRequest,
) -> CommandResponse {
    let Some(secret_key) = &context.secret_key else {
        return CommandResponse::Error {
            message: "this node holds no signing share".to_string(),
        };
    };

    // the wire request carries the flat encodings directly
    let lambda = match opal_coconut::BlindSignRequest::from_bytes(&request.lambda) {
        Ok(lambda) => lambda,
        Err(err) => {
            return CommandResponse::Error {
                message: format!("malformed lambda: {err}"),
            }
        }
    };
    let eg_pub = match opal_coconut::elgamal::PublicKey::from_bytes(&request.eg_pub) {
        Ok(eg_pub) => eg_pub,
        Err(err) => {
            return CommandResponse::Error {
                message: format!("malformed ElGamal public key: {err}"),
            }
        }
    };
    let pub_m = match request
        .pub_m
        .iter()
        .map(|m| opal_coconut::Attribute::try_from_byte_slice(m))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(pub_m) => pub_m,
        Err(err) => {
            return CommandResponse::Error {
                message: format!("malformed public attributes: {err}"),
            }
        }
    };

    match context
        .coconut
        .blind_sign(secret_key, &eg_pub, &lambda, &pub_m)
    {
        Ok(blinded_signature) => CommandResponse::BlindSign {
            blinded_signature: blinded_signature.to_bytes().to_vec(),
            issuer_id: context.issuer_id,
        },
        Err(err) => CommandResponse::Error {
            message: format!("failed to blind sign the request: {err}"),
        },
    }
}

fn handle_credential_verification(
    context: &HandlerContext,
    request: &opal_comm::commands::CredentialVerificationRequest,
) -> CommandResponse {
    let Some(verification_key) = &context.verification_key else {
        return CommandResponse::Error {
            message: "this node holds no aggregated verification key".to_string(),
        };
    };

    let proto = match ProtoTumblerBlindVerifyMaterials::unmarshal(&request.materials) {
        Ok(proto) => proto,
        Err(err) => {
            return CommandResponse::Error {
                message: format!("malformed verify materials: {err}"),
            }
        }
    };
    let materials = match TumblerBlindVerifyMaterials::try_from_proto(&proto) {
        Ok(materials) => materials,
        Err(err) => {
            return CommandResponse::Error {
                message: format!("malformed verify materials: {err}"),
            }
        }
    };

    let accepted = context.coconut.verify_credential_tumbler(
        verification_key,
        &materials.theta,
        &materials.pub_m,
        &request.bound_address,
    );

    CommandResponse::CredentialVerification { accepted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_comm::commands::BlindSignRequest as WireBlindSignRequest;
    use opal_coconut::{Bytable, Parameters};
    use opal_coconut_worker::{JobQueue, ShutdownNotifier};

    fn context_with_signing_share() -> (Arc<HandlerContext>, Parameters) {
        let params = Parameters::new(3).unwrap();
        let keypair = opal_coconut::keygen(&params);
        let secret_key =
            SecretKey::try_from_byte_slice(&keypair.secret_key().to_byte_vec()).unwrap();

        let queue = JobQueue::new(16);
        let facade = CoconutWorker::new(queue.sender(), Parameters::new(3).unwrap());

        (
            Arc::new(HandlerContext {
                coconut: Arc::new(facade),
                secret_key: Some(Arc::new(secret_key)),
                issuer_id: 3,
                verification_key: None,
            }),
            params,
        )
    }

    #[tokio::test]
    async fn blind_sign_command_produces_a_partial_credential() {
        let (context, params) = context_with_signing_share();

        let elgamal_keypair = opal_coconut::elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = vec![opal_coconut::Attribute::from(5u64)];

        let lambda = opal_coconut::prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();

        let command = Command::BlindSign(WireBlindSignRequest {
            lambda: lambda.to_bytes(),
            eg_pub: elgamal_keypair.public_key().to_bytes().to_vec(),
            pub_m: public_attributes
                .iter()
                .map(|m| m.to_byte_vec())
                .collect(),
        });

        let notifier = ShutdownNotifier::new();
        let queue_tx = spawn_command_handlers(2, context, notifier.subscribe());

        let (request, response_rx) = CommandRequest::new(command);
        queue_tx.send(request).await.unwrap();

        match response_rx.await.unwrap() {
            CommandResponse::BlindSign {
                blinded_signature,
                issuer_id,
            } => {
                assert_eq!(3, issuer_id);
                let blinded =
                    opal_coconut::BlindedSignature::from_bytes(&blinded_signature).unwrap();
                let _ = blinded.unblind(elgamal_keypair.private_key());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_blind_sign_request_is_an_error() {
        let (context, _) = context_with_signing_share();

        let notifier = ShutdownNotifier::new();
        let queue_tx = spawn_command_handlers(1, context, notifier.subscribe());

        let (request, response_rx) = CommandRequest::new(Command::BlindSign(
            WireBlindSignRequest {
                lambda: vec![1, 2, 3],
                eg_pub: vec![],
                pub_m: vec![],
            },
        ));
        queue_tx.send(request).await.unwrap();

        assert!(matches!(
            response_rx.await.unwrap(),
            CommandResponse::Error { .. }
        ));
    }
}

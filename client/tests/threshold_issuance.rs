// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end issuance against in-process issuing authorities: the client
//! fans its blind-sign request out over TCP, a threshold of authorities
//! answers, the shares are unblinded, aggregated and randomised, and the
//! resulting credential verifies under the aggregated key.

use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::net::TcpListener;

use opal_client::{Client, Config, DebugConfig};
use opal_coconut::{
    aggregate_verification_keys, blind_sign, ttp_keygen, verify, Attribute, Bytable, KeyPair,
    Parameters,
};
use opal_comm::commands::{BlindSignResponse, Command, Status};
use opal_comm::packet::Packet;

/// Serves blind-sign requests with the given share; sleeping first when
/// `delay` is set, which makes the authority effectively unreachable for
/// deadline-bound clients.
async fn spawn_authority(keypair: Arc<KeyPair>, params: Arc<Parameters>, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let keypair = Arc::clone(&keypair);
            let params = Arc::clone(&params);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                let Ok(packet) = Packet::read_from(&mut stream).await else {
                    return;
                };
                let Ok(command) = Command::from_bytes(packet.payload()) else {
                    return;
                };
                let Command::BlindSign(request) = command else {
                    return;
                };

                let lambda =
                    opal_coconut::BlindSignRequest::from_bytes(&request.lambda).unwrap();
                let eg_pub =
                    opal_coconut::elgamal::PublicKey::from_bytes(&request.eg_pub).unwrap();
                let pub_m = request
                    .pub_m
                    .iter()
                    .map(|m| Attribute::try_from_byte_slice(m).unwrap())
                    .collect::<Vec<_>>();

                let blinded =
                    blind_sign(&params, keypair.secret_key(), &eg_pub, &lambda, &pub_m).unwrap();

                let response = BlindSignResponse {
                    sig: blinded.to_bytes().to_vec(),
                    issuer_id: keypair.index.unwrap(),
                    status: Some(Status::ok()),
                };

                let _ = Packet::new(response.encode_to_vec())
                    .write_to(&mut stream)
                    .await;
            });
        }
    });

    address
}

struct Federation {
    addresses: Vec<String>,
    aggregated_vk: opal_coconut::VerificationKey,
}

async fn spawn_federation(hang_last: bool) -> Federation {
    let params = Arc::new(Parameters::new(3).unwrap());
    let keypairs = ttp_keygen(&params, 2, 3).unwrap();

    let verification_keys = keypairs
        .iter()
        .map(|keypair| keypair.verification_key().clone())
        .collect::<Vec<_>>();
    let aggregated_vk = aggregate_verification_keys(&verification_keys, Some(&[1, 2, 3])).unwrap();

    let mut addresses = Vec::new();
    let count = keypairs.len();
    for (i, keypair) in keypairs.into_iter().enumerate() {
        let delay = if hang_last && i == count - 1 {
            // effectively never answers within any reasonable deadline
            Duration::from_secs(3600)
        } else {
            Duration::ZERO
        };
        addresses.push(spawn_authority(Arc::new(keypair), Arc::clone(&params), delay).await);
    }

    Federation {
        addresses,
        aggregated_vk,
    }
}

fn client_config(addresses: Vec<String>, threshold: usize) -> Config {
    Config {
        identifier: "test-client".to_string(),
        ia_addresses: addresses,
        max_requests: -1,
        threshold,
        maximum_attributes: 3,
        debug: DebugConfig {
            num_job_workers: 2,
            connect_timeout: Duration::from_millis(2_000),
            request_timeout: Duration::from_millis(3_000),
            lookup_retries: 1,
            lookup_backoff: Duration::from_millis(10),
        },
    }
}

#[tokio::test]
async fn threshold_issuance_succeeds_with_a_hung_authority() {
    let federation = spawn_federation(true).await;
    let client = Client::new(client_config(federation.addresses, 2)).unwrap();

    let token = opal_token::Token::new(Attribute::from(42u64), Attribute::from(7u64), 5).unwrap();
    let credential = client.blind_sign_token(&token).await.unwrap();

    // priv (sequence, secret) followed by pub (value)
    let attributes = vec![
        Attribute::from(42u64),
        Attribute::from(7u64),
        Attribute::from(5u64),
    ];

    let params = Parameters::new(3).unwrap();
    assert!(verify(
        &params,
        &federation.aggregated_vk,
        &attributes,
        &credential,
    ));

    client.stop();
}

#[tokio::test]
async fn issuance_fails_below_the_threshold() {
    // all three shares required, but one authority hangs
    let federation = spawn_federation(true).await;
    let client = Client::new(client_config(federation.addresses, 3)).unwrap();

    let result = client
        .blind_sign_attributes(
            &[Attribute::from(5u64)],
            &[Attribute::from(42u64), Attribute::from(7u64)],
        )
        .await;

    assert!(matches!(
        result,
        Err(opal_client::ClientError::InsufficientResponses {
            received: 2,
            required: 3,
        })
    ));

    client.stop();
}

#[tokio::test]
async fn non_threshold_mode_requires_every_authority() {
    let federation = spawn_federation(true).await;
    let client = Client::new(client_config(federation.addresses, 0)).unwrap();

    let result = client
        .blind_sign_attributes(
            &[Attribute::from(5u64)],
            &[Attribute::from(42u64), Attribute::from(7u64)],
        )
        .await;

    assert!(matches!(
        result,
        Err(opal_client::ClientError::InsufficientResponses { .. })
    ));

    client.stop();
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! The user-facing client: issuance requests fanned out to the issuing
//! authorities with threshold collection, unblinding, aggregation and
//! randomisation, plus credential showing towards providers.

pub use config::{Config, DebugConfig};

pub mod config;

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, info, warn};
use prost::Message;
use thiserror::Error;

use opal_chain::transaction::create_new_deposit_credential_request;
use opal_chain::{Address, ChainError};
use opal_coconut::elgamal::PrivateKey as ElGamalPrivateKey;
use opal_coconut::proto::TumblerBlindVerifyMaterials;
use opal_coconut::{
    Attribute, BlindedSignature, Bytable, CoconutError, Parameters, Signature, SignerIndex,
    VerificationKey,
};
use opal_coconut_worker::{CoconutWorker, JobQueue, JobWorker, ShutdownNotifier};
use opal_comm::commands::{
    BlindSignRequest as WireBlindSignRequest, BlindSignResponse, BlindVerifyRequest,
    BlindVerifyResponse, Command, LookUpCredentialRequest, LookUpCredentialResponse, SignRequest,
    SignResponse, VerificationKeyRequest, VerificationKeyResponse,
};
use opal_comm::fanout::{send_server_requests, RequestParams, ServerResponse};
use opal_comm::packet::Packet;
use opal_comm::CommError;
use opal_token::Token;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("communication failure: {0}")]
    Comm(#[from] CommError),

    #[error("credential failure: {0}")]
    Coconut(#[from] CoconutError),

    #[error("transaction construction failure: {0}")]
    Chain(#[from] ChainError),

    #[error("received only {received} valid responses while {required} are required")]
    InsufficientResponses { received: usize, required: usize },

    #[error("received a response with error status {code}: {message}")]
    ErrorStatus { code: i32, message: String },

    #[error("no credential for the given height and gamma")]
    CredentialNotFound,
}

/// A client of the payment network. Owns its crypto facade (and the job
/// workers behind it); the chain-facing transactions it constructs are
/// broadcast by the caller.
pub struct Client {
    cfg: Config,
    coconut: Arc<CoconutWorker>,
    shutdown: ShutdownNotifier,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Client, ClientError> {
        let params = Parameters::new(cfg.maximum_attributes)?;

        let queue = JobQueue::default();
        let shutdown = ShutdownNotifier::new();
        for id in 0..cfg.debug.effective_job_workers() {
            // the workers outlive this scope and exit on shutdown
            JobWorker::spawn(&queue, id as u64, shutdown.subscribe());
        }

        let coconut = Arc::new(CoconutWorker::new(queue.sender(), params));
        info!("created client {}", cfg.identifier);

        Ok(Client {
            cfg,
            coconut,
            shutdown,
        })
    }

    pub fn coconut(&self) -> &Arc<CoconutWorker> {
        &self.coconut
    }

    /// Signals the job workers to drain and exit.
    pub fn stop(&self) {
        info!("stopping client {}", self.cfg.identifier);
        self.shutdown.signal_shutdown();
    }

    async fn fan_out(&self, command: &Command) -> Vec<ServerResponse> {
        send_server_requests(RequestParams {
            marshalled_packet: command.to_marshalled_packet(),
            max_requests: self.cfg.effective_max_requests(),
            connect_timeout: self.cfg.debug.connect_timeout,
            request_timeout: self.cfg.debug.request_timeout,
            server_addresses: self.cfg.ia_addresses.clone(),
        })
        .await
    }

    /// Drops entries with non-positive or repeated signer indices together
    /// with their companions; only meaningful in threshold mode.
    fn validate_indices<T>(items: &mut Vec<T>, indices: &mut Vec<SignerIndex>) {
        let mut seen = HashSet::new();
        let mut keep = indices
            .iter()
            .map(|&index| index > 0 && seen.insert(index))
            .collect::<Vec<_>>();

        let mut keep_items = keep.iter().copied();
        items.retain(|_| keep_items.next().unwrap_or(false));
        let mut keep_indices = keep.drain(..);
        indices.retain(|_| keep_indices.next().unwrap_or(false));
    }

    fn handle_received_signatures(
        &self,
        mut sigs: Vec<Signature>,
        mut indices: Vec<SignerIndex>,
    ) -> Result<Signature, ClientError> {
        if self.cfg.is_threshold() {
            Self::validate_indices(&mut sigs, &mut indices);
        }

        // drop structurally invalid signatures together with their indices
        let mut valid_flags = sigs.iter().map(|sig| sig.validate()).collect::<Vec<_>>();
        let mut flags = valid_flags.iter().copied();
        sigs.retain(|_| flags.next().unwrap_or(false));
        if self.cfg.is_threshold() {
            let mut flags = valid_flags.drain(..);
            indices.retain(|_| flags.next().unwrap_or(false));
        }

        if self.cfg.is_threshold() {
            if sigs.len() < self.cfg.threshold {
                return Err(ClientError::InsufficientResponses {
                    received: sigs.len(),
                    required: self.cfg.threshold,
                });
            }
            info!("number of signatures received is within the threshold");

            // only the threshold number of them is needed; they are consumed
            // in arrival order
            sigs.truncate(self.cfg.threshold);
            indices.truncate(self.cfg.threshold);

            let aggregated = self.coconut.aggregate_signatures(&sigs, Some(&indices))?;
            debug!("aggregated {} signatures", sigs.len());

            Ok(self.coconut.randomise(&aggregated))
        } else {
            if sigs.len() != self.cfg.ia_addresses.len() {
                error!(
                    "no threshold, but obtained only {} out of {} signatures",
                    sigs.len(),
                    self.cfg.ia_addresses.len()
                );
                return Err(ClientError::InsufficientResponses {
                    received: sigs.len(),
                    required: self.cfg.ia_addresses.len(),
                });
            }

            let aggregated = self.coconut.aggregate_signatures(&sigs, None)?;
            Ok(self.coconut.randomise(&aggregated))
        }
    }

    fn parse_sign_responses(
        &self,
        responses: &[ServerResponse],
    ) -> (Vec<Signature>, Vec<SignerIndex>) {
        let mut sigs = Vec::with_capacity(responses.len());
        let mut indices = Vec::with_capacity(responses.len());

        for response in responses {
            let Ok(parsed) = SignResponse::decode(response.marshalled_data.as_slice()) else {
                warn!("failed to unmarshal response from {}", response.address);
                continue;
            };
            if !parsed.status.map(|status| status.is_ok()).unwrap_or(false) {
                warn!("error response from {}", response.address);
                continue;
            }
            let Ok(sig) = Signature::from_bytes(&parsed.sig) else {
                warn!("malformed signature from {}", response.address);
                continue;
            };
            sigs.push(sig);
            indices.push(parsed.issuer_id);
        }

        (sigs, indices)
    }

    fn parse_blind_sign_responses(
        &self,
        responses: &[ServerResponse],
        private_key: &ElGamalPrivateKey,
    ) -> (Vec<Signature>, Vec<SignerIndex>) {
        let mut sigs = Vec::with_capacity(responses.len());
        let mut indices = Vec::with_capacity(responses.len());

        for response in responses {
            let Ok(parsed) = BlindSignResponse::decode(response.marshalled_data.as_slice()) else {
                warn!("failed to unmarshal response from {}", response.address);
                continue;
            };
            if !parsed.status.map(|status| status.is_ok()).unwrap_or(false) {
                warn!("error response from {}", response.address);
                continue;
            }
            let Ok(blinded) = BlindedSignature::from_bytes(&parsed.sig) else {
                warn!("malformed blinded signature from {}", response.address);
                continue;
            };
            sigs.push(blinded.unblind(private_key));
            indices.push(parsed.issuer_id);
        }

        (sigs, indices)
    }

    /// Requests a credential over public attributes only from every
    /// configured issuing authority and aggregates the shares.
    pub async fn sign_attributes(&self, pub_m: &[Attribute]) -> Result<Signature, ClientError> {
        let command = Command::Sign(SignRequest {
            pub_m: pub_m.iter().map(|m| m.to_byte_vec()).collect(),
        });

        info!(
            "going to send a sign request to {} authorities",
            self.cfg.ia_addresses.len()
        );
        let responses = self.fan_out(&command).await;
        let (sigs, indices) = self.parse_sign_responses(&responses);
        self.handle_received_signatures(sigs, indices)
    }

    /// Requests a blind credential over the provided private and public
    /// attributes: a fresh ElGamal keypair is drawn, the blind-sign request
    /// fanned out, every response unblinded, and the threshold aggregated
    /// and randomised.
    pub async fn blind_sign_attributes(
        &self,
        pub_m: &[Attribute],
        priv_m: &[Attribute],
    ) -> Result<Signature, ClientError> {
        let elgamal_keypair = self.coconut.elgamal_keygen();

        let lambda = self
            .coconut
            .prepare_blind_sign(elgamal_keypair.public_key(), priv_m, pub_m)?;

        let command = Command::BlindSign(WireBlindSignRequest {
            lambda: lambda.to_bytes(),
            eg_pub: elgamal_keypair.public_key().to_bytes().to_vec(),
            pub_m: pub_m.iter().map(|m| m.to_byte_vec()).collect(),
        });

        info!(
            "going to send a blind sign request to {} authorities",
            self.cfg.ia_addresses.len()
        );
        let responses = self.fan_out(&command).await;
        let (sigs, indices) =
            self.parse_blind_sign_responses(&responses, elgamal_keypair.private_key());
        self.handle_received_signatures(sigs, indices)
    }

    /// Requests a blind credential over the attributes of a token.
    pub async fn blind_sign_token(&self, token: &Token) -> Result<Signature, ClientError> {
        let (pub_m, priv_m) = token.attribute_slices();
        self.blind_sign_attributes(&pub_m, &priv_m).await
    }

    /// Fetches the verification keys of the issuing authorities. With
    /// `should_aggregate` the returned vector holds the single aggregated
    /// key.
    pub async fn get_verification_keys(
        &self,
        should_aggregate: bool,
    ) -> Result<Vec<VerificationKey>, ClientError> {
        let command = Command::GetVerificationKey(VerificationKeyRequest {});

        info!(
            "going to send a verification key request to {} authorities",
            self.cfg.ia_addresses.len()
        );
        let responses = self.fan_out(&command).await;

        let mut vks = Vec::with_capacity(responses.len());
        let mut indices = Vec::with_capacity(responses.len());
        for response in &responses {
            let Ok(parsed) =
                VerificationKeyResponse::decode(response.marshalled_data.as_slice())
            else {
                warn!("failed to unmarshal response from {}", response.address);
                continue;
            };
            if !parsed.status.map(|status| status.is_ok()).unwrap_or(false) {
                warn!("error response from {}", response.address);
                continue;
            }
            let Ok(vk) = VerificationKey::from_bytes(&parsed.vk) else {
                warn!("malformed verification key from {}", response.address);
                continue;
            };
            vks.push(vk);
            indices.push(parsed.issuer_id);
        }

        if self.cfg.is_threshold() {
            Self::validate_indices(&mut vks, &mut indices);
            if vks.len() < self.cfg.threshold {
                return Err(ClientError::InsufficientResponses {
                    received: vks.len(),
                    required: self.cfg.threshold,
                });
            }
            vks.truncate(self.cfg.threshold);
            indices.truncate(self.cfg.threshold);

            if should_aggregate {
                let aggregated = self
                    .coconut
                    .aggregate_verification_keys(&vks, Some(&indices))?;
                debug!("aggregated {} verification keys", self.cfg.threshold);
                return Ok(vec![aggregated]);
            }
            Ok(vks)
        } else {
            if vks.len() != self.cfg.ia_addresses.len() {
                error!(
                    "no threshold, but obtained only {} out of {} verification keys",
                    vks.len(),
                    self.cfg.ia_addresses.len()
                );
                return Err(ClientError::InsufficientResponses {
                    received: vks.len(),
                    required: self.cfg.ia_addresses.len(),
                });
            }
            if should_aggregate {
                let aggregated = self.coconut.aggregate_verification_keys(&vks, None)?;
                return Ok(vec![aggregated]);
            }
            Ok(vks)
        }
    }

    /// Wrapper for [`Client::get_verification_keys`] returning the single
    /// aggregated key.
    pub async fn get_aggregate_verification_key(&self) -> Result<VerificationKey, ClientError> {
        let mut vks = self.get_verification_keys(true).await?;
        // aggregation always returns exactly one element
        vks.pop().ok_or(ClientError::InsufficientResponses {
            received: 0,
            required: 1,
        })
    }

    /// Shows the credential to a provider for (non-tumbler) blind
    /// verification. When no verification key is supplied the aggregated
    /// one is fetched first.
    pub async fn send_credentials_for_blind_verification(
        &self,
        pub_m: &[Attribute],
        priv_m: &[Attribute],
        sig: &Signature,
        provider_address: &str,
        vk: Option<&VerificationKey>,
    ) -> Result<bool, ClientError> {
        let fetched;
        let vk = match vk {
            Some(vk) => vk,
            None => {
                fetched = self.get_aggregate_verification_key().await?;
                &fetched
            }
        };

        let theta = self.coconut.prove_credential(vk, sig, priv_m)?;

        let command = Command::BlindVerify(BlindVerifyRequest {
            theta: theta.to_bytes(),
            pub_m: pub_m.iter().map(|m| m.to_byte_vec()).collect(),
        });

        let responses = send_server_requests(RequestParams {
            marshalled_packet: command.to_marshalled_packet(),
            max_requests: 1,
            connect_timeout: self.cfg.debug.connect_timeout,
            request_timeout: self.cfg.debug.request_timeout,
            server_addresses: vec![provider_address.to_string()],
        })
        .await;

        let Some(response) = responses.into_iter().next() else {
            return Err(ClientError::InsufficientResponses {
                received: 0,
                required: 1,
            });
        };

        let parsed = BlindVerifyResponse::decode(response.marshalled_data.as_slice())
            .map_err(CommError::from)?;
        match parsed.status {
            Some(status) if status.is_ok() => Ok(parsed.is_valid),
            Some(status) => Err(ClientError::ErrorStatus {
                code: status.code,
                message: status.message,
            }),
            None => Err(ClientError::ErrorStatus {
                code: -1,
                message: "response carried no status".to_string(),
            }),
        }
    }

    /// Builds the deposit transaction spending the credential at the given
    /// provider: a tumbler-bound showing plus the marshalled materials. The
    /// returned bytes are ready for the chain.
    pub fn prepare_credential_deposit(
        &self,
        vk: &VerificationKey,
        sig: &Signature,
        token: &Token,
        provider_address: Address,
    ) -> Result<Vec<u8>, ClientError> {
        let (pub_m, priv_m) = token.attribute_slices();

        let theta = self.coconut.prove_credential_tumbler(
            vk,
            sig,
            &priv_m,
            provider_address.as_bytes(),
        )?;

        let materials = TumblerBlindVerifyMaterials::new(*sig, pub_m, theta).to_proto();

        Ok(create_new_deposit_credential_request(
            materials,
            token.value(),
            provider_address,
        ))
    }

    /// Fetches the credential issued for `(height, gamma)` from a single
    /// issuing authority, retrying with backoff - the issuer might still be
    /// processing the block.
    pub async fn lookup_issued_credential(
        &self,
        address: &str,
        height: i64,
        gamma: &[u8],
    ) -> Result<(BlindedSignature, u64), ClientError> {
        let command = Command::LookUpCredential(LookUpCredentialRequest {
            height,
            gamma: gamma.to_vec(),
        });

        for attempt in 0..self.cfg.debug.lookup_retries.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.cfg.debug.lookup_backoff).await;
            }

            let responses = send_server_requests(RequestParams {
                marshalled_packet: command.to_marshalled_packet(),
                max_requests: 1,
                connect_timeout: self.cfg.debug.connect_timeout,
                request_timeout: self.cfg.debug.request_timeout,
                server_addresses: vec![address.to_string()],
            })
            .await;

            let Some(response) = responses.into_iter().next() else {
                debug!("lookup attempt {attempt}: no response from {address}");
                continue;
            };

            let Ok(parsed) =
                LookUpCredentialResponse::decode(response.marshalled_data.as_slice())
            else {
                warn!("failed to unmarshal lookup response from {address}");
                continue;
            };
            let Some(pair) = parsed.credential_pair else {
                debug!("lookup attempt {attempt}: credential not available yet");
                continue;
            };

            let blinded = BlindedSignature::from_bytes(&pair.credential)?;
            return Ok((blinded, pair.issuer_id));
        }

        Err(ClientError::CredentialNotFound)
    }

    /// Sends a framed packet to a single server and returns the raw
    /// response payload.
    pub async fn exchange_with(
        &self,
        address: &str,
        command: &Command,
    ) -> Result<Vec<u8>, ClientError> {
        let packet_bytes = command.to_marshalled_packet();
        let mut stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(CommError::from)?;

        Packet::new(packet_bytes[4..].to_vec())
            .write_to(&mut stream)
            .await?;
        let response = Packet::read_from(&mut stream).await?;
        Ok(response.into_payload())
    }
}

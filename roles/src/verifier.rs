// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use k256::ecdsa::SigningKey;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use opal_chain::constants::REDEEM_CREDENTIAL_REQUEST_KEY_PREFIX;
use opal_chain::transaction::create_new_credential_verification_notification;
use opal_chain::{Address, Code, ADDRESS_LENGTH};
use opal_comm::commands::{
    Command, CommandRequest, CommandResponse, CredentialVerificationRequest,
};
use opal_coconut_worker::ShutdownListener;
use opal_monitor::{ChainClient, FullBlock, Monitor};

use crate::BACKOFF_DURATION;

/// A deposit event distilled from the emitted key:
/// `[PREFIX || PROVIDER || uint64(VALUE) || ZETA]` with the materials in
/// the event value.
struct DepositEvent {
    provider: Address,
    value: i64,
    zeta: Vec<u8>,
    materials: Vec<u8>,
}

fn parse_deposit_event(key: &[u8], value: &[u8]) -> Option<DepositEvent> {
    let payload = key.strip_prefix(REDEEM_CREDENTIAL_REQUEST_KEY_PREFIX)?;
    if payload.len() <= ADDRESS_LENGTH + 8 {
        return None;
    }

    let provider = Address::try_from_slice(&payload[..ADDRESS_LENGTH]).ok()?;
    let value_bytes = <[u8; 8]>::try_from(&payload[ADDRESS_LENGTH..ADDRESS_LENGTH + 8]).ok()?;
    let zeta = payload[ADDRESS_LENGTH + 8..].to_vec();

    Some(DepositEvent {
        provider,
        value: u64::from_be_bytes(value_bytes) as i64,
        zeta,
        materials: value.to_vec(),
    })
}

/// The verifier service: runs the cryptographic check over every deposited
/// credential and files the countersigned outcome back to the chain.
pub struct Verifier {
    monitor: Arc<Monitor>,
    chain: Arc<dyn ChainClient>,
    command_queue: mpsc::Sender<CommandRequest>,
    signing_key: SigningKey,
}

impl Verifier {
    pub fn new(
        monitor: Arc<Monitor>,
        chain: Arc<dyn ChainClient>,
        command_queue: mpsc::Sender<CommandRequest>,
        signing_key: SigningKey,
    ) -> Verifier {
        Verifier {
            monitor,
            chain,
            command_queue,
            signing_key,
        }
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: ShutdownListener) {
        info!("verifier: started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            let Some(block) = self.monitor.get_lowest_full_unprocessed_block() else {
                debug!("no blocks to process");
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(BACKOFF_DURATION) => continue,
                }
            };

            debug!("processing block at height {}", block.height);
            self.process_block(&block).await;
            self.monitor.finalize_height(block.height);
        }
        info!("verifier: exiting");
    }

    pub(crate) async fn process_block(&self, block: &FullBlock) {
        // batch all verification commands of the block first
        let mut pending = Vec::new();

        for (i, tx) in block.txs.iter().enumerate() {
            let Some(event) = tx.events.first() else {
                continue;
            };
            if tx.code != 0 {
                continue;
            }
            let Some(deposit) = parse_deposit_event(&event.key, &event.value) else {
                debug!(
                    "tx {i} at height {} is not a redeem credential request",
                    block.height
                );
                continue;
            };

            debug!(
                "received materials; provider: {}, value: {}",
                deposit.provider, deposit.value
            );

            let (request, response_rx) =
                CommandRequest::new(Command::CredentialVerification(
                    CredentialVerificationRequest {
                        materials: deposit.materials.clone(),
                        bound_address: deposit.provider.to_vec(),
                        value: deposit.value,
                    },
                ));

            if self.command_queue.send(request).await.is_err() {
                error!("the command queue is gone; dropping the remainder of the block");
                break;
            }
            pending.push((deposit, response_rx));
        }

        for (deposit, response_rx) in pending {
            let valid = match response_rx.await {
                Ok(CommandResponse::CredentialVerification { accepted }) => accepted,
                Ok(CommandResponse::Error { message }) => {
                    warn!("could not verify the deposited credential: {message}");
                    false
                }
                Ok(other) => {
                    error!("unexpected response for a verification command: {other:?}");
                    continue;
                }
                Err(_) => {
                    error!("the command handler dropped a verification result");
                    continue;
                }
            };

            debug!(
                "credential with zeta {:02x?} was valid: {valid}",
                deposit.zeta
            );

            if let Err(err) = self.notify_chain(&deposit, valid).await {
                // log and move on; other verifiers pick up the slack
                warn!("failed to notify the chain: {err}");
            }
        }
    }

    async fn notify_chain(
        &self,
        deposit: &DepositEvent,
        valid: bool,
    ) -> Result<(), crate::RoleError> {
        let notification = create_new_credential_verification_notification(
            &self.signing_key,
            deposit.provider,
            deposit.value,
            deposit.zeta.clone(),
            valid,
        )?;

        let result = self.chain.broadcast(notification).await?;

        if result.check_code == Code::AlreadyCommitted as u32
            || result.deliver_code == Code::AlreadyCommitted as u32
        {
            debug!("the verification threshold was already reached before");
            return Ok(());
        }
        if result.check_code != 0 || result.deliver_code != 0 {
            warn!(
                "verification notification rejected; check: {}, deliver: {}",
                result.check_code, result.deliver_code
            );
        }
        Ok(())
    }
}

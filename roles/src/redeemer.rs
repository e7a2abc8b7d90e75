// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use log::{debug, info, warn};

use opal_chain::constants::REDEEM_TOKENS_REQUEST_KEY_PREFIX;
use opal_chain::transaction::create_new_token_redemption_confirmation_notification;
use opal_chain::{Address, Code, ADDRESS_LENGTH};
use opal_coconut_worker::ShutdownListener;
use opal_monitor::{ChainClient, FullBlock, Monitor};

use crate::{RoleError, BACKOFF_DURATION};

/// The outward-facing side of a redemption: once a threshold of redeemers
/// confirmed the request, exactly one of them releases the tokens from the
/// pipe account on the external chain. The chain client itself is an
/// external collaborator.
#[async_trait]
pub trait PipeBridge: Send + Sync {
    async fn release_tokens(&self, user: Address, amount: u64) -> Result<(), RoleError>;
}

/// A redemption event distilled from the emitted key:
/// `[PREFIX || USER || uint64(AMOUNT) || NONCE]`.
struct RedemptionEvent {
    user: Address,
    amount: u64,
    nonce: Vec<u8>,
}

fn parse_redemption_event(key: &[u8]) -> Option<RedemptionEvent> {
    let payload = key.strip_prefix(REDEEM_TOKENS_REQUEST_KEY_PREFIX)?;
    if payload.len() <= ADDRESS_LENGTH + 8 {
        return None;
    }

    let user = Address::try_from_slice(&payload[..ADDRESS_LENGTH]).ok()?;
    let amount_bytes = <[u8; 8]>::try_from(&payload[ADDRESS_LENGTH..ADDRESS_LENGTH + 8]).ok()?;
    let nonce = payload[ADDRESS_LENGTH + 8..].to_vec();

    Some(RedemptionEvent {
        user,
        amount: u64::from_be_bytes(amount_bytes),
        nonce,
    })
}

/// The redeemer service: confirms observed redemption requests towards the
/// chain and performs the external transfer when elected.
pub struct Redeemer {
    monitor: Arc<Monitor>,
    chain: Arc<dyn ChainClient>,
    bridge: Arc<dyn PipeBridge>,
    signing_key: SigningKey,
}

impl Redeemer {
    pub fn new(
        monitor: Arc<Monitor>,
        chain: Arc<dyn ChainClient>,
        bridge: Arc<dyn PipeBridge>,
        signing_key: SigningKey,
    ) -> Redeemer {
        Redeemer {
            monitor,
            chain,
            bridge,
            signing_key,
        }
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: ShutdownListener) {
        info!("redeemer: started");
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
        info!("redeemer: exiting");
    }

    pub(crate) async fn process_block(&self, block: &FullBlock) {
        for (i, tx) in block.txs.iter().enumerate() {
            let Some(event) = tx.events.first() else {
                continue;
            };
            if tx.code != 0 {
                continue;
            }
            let Some(redemption) = parse_redemption_event(&event.key) else {
                debug!(
                    "tx {i} at height {} is not a redeem token request",
                    block.height
                );
                continue;
            };

            debug!(
                "received redemption; user: {}, amount: {}",
                redemption.user, redemption.amount
            );

            if let Err(err) = self.confirm_redemption(&redemption).await {
                warn!(
                    "failed to confirm the redemption for {}: {err}",
                    redemption.user
                );
            }
        }
    }

    async fn confirm_redemption(&self, redemption: &RedemptionEvent) -> Result<(), RoleError> {
        let notification = create_new_token_redemption_confirmation_notification(
            &self.signing_key,
            redemption.user,
            redemption.amount,
            redemption.nonce.clone(),
        )?;

        let result = self.chain.broadcast(notification).await?;

        if result.check_code == Code::AlreadyCommitted as u32
            || result.deliver_code == Code::AlreadyCommitted as u32
        {
            info!("the threshold was already reached; another redeemer performs the external transfer");
            return Ok(());
        }
        if result.check_code != 0 || result.deliver_code != 0 {
            warn!(
                "confirmation rejected on the chain; check: {}, deliver: {}",
                result.check_code, result.deliver_code
            );
            return Ok(());
        }

        // the response carries [threshold || count]
        if result.data.len() != 8 {
            warn!(
                "unexpected response data length {} (expecting threshold || count)",
                result.data.len()
            );
            return Ok(());
        }

        // safety: the length was just checked
        #[allow(clippy::unwrap_used)]
        let threshold = u32::from_be_bytes(result.data[..4].try_into().unwrap());
        #[allow(clippy::unwrap_used)]
        let count = u32::from_be_bytes(result.data[4..].try_into().unwrap());

        info!("threshold: {threshold}, our count: {count}");
        if threshold == count {
            // our confirmation was the threshold-th one; we are elected to
            // move the actual tokens
            info!("our notification was the threshold-th; calling the external chain");
            self.bridge
                .release_tokens(redemption.user, redemption.amount)
                .await?;
        } else {
            info!("the threshold is not ours to complete; another redeemer will call the external chain");
        }

        Ok(())
    }
}

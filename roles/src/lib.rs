// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! The three monitor-driven services of the network. Each polls its chain
//! monitor for fully populated blocks, reacts to transactions carrying its
//! event-key prefix and finalizes the height once the whole block resolved:
//!
//! * the issuer blind-signs committed credential requests and stores the
//!   partial credentials for clients to fetch,
//! * the verifier checks deposited credential showings and files
//!   countersigned verification notifications,
//! * the redeemer confirms redemption requests and, when its confirmation
//!   is the threshold-th, calls the external-chain bridge.

pub use command_handler::{spawn_command_handlers, HandlerContext};
pub use issuer::Issuer;
pub use redeemer::{PipeBridge, Redeemer};
pub use verifier::Verifier;

mod command_handler;
mod issuer;
mod redeemer;
mod verifier;

use std::time::Duration;

use thiserror::Error;

/// How long a service sleeps when the monitor has no block to hand out.
pub(crate) const BACKOFF_DURATION: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum RoleError {
    #[error("chain interaction failure: {0}")]
    Monitor(#[from] opal_monitor::MonitorError),

    #[error("transaction construction failure: {0}")]
    Chain(#[from] opal_chain::ChainError),

    #[error("credential failure: {0}")]
    Coconut(#[from] opal_coconut::CoconutError),

    #[error("the command queue is gone")]
    CommandQueueClosed,

    #[error("external chain bridge failure: {0}")]
    Bridge(String),
}

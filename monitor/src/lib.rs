// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Support for monitoring the state of the replicated chain: blocks are
//! reassembled from independently delivered header and transaction events,
//! gaps and stalls are repaired by querying the node directly, and fully
//! populated blocks are handed to the role services in height order.

pub use client::{
    BlockHeader, BlockResults, BroadcastResult, ChainClient, EventStreams, TxEvent, TxResult,
};
pub use monitor::{FullBlock, Monitor, Tx};

pub mod client;
mod monitor;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("subscription failure: {0}")]
    Subscription(String),

    #[error("chain client failure: {0}")]
    Client(String),

    #[error("the chain connection is gone")]
    Disconnected,
}

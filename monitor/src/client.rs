// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! The boundary towards the external BFT replicator. The engine itself is
//! an opaque collaborator; the monitor only relies on it delivering ordered
//! blocks, answering historical queries and accepting transactions.

use async_trait::async_trait;
use tokio::sync::mpsc;

use opal_chain::Event;

use crate::MonitorError;

/// Header of a freshly produced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: i64,
    pub num_txs: i64,
}

/// A single delivered transaction observed on the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEvent {
    pub height: i64,
    pub index: u32,
    pub code: u32,
    pub events: Vec<Event>,
}

/// Results of every transaction of one block, as returned by a historical
/// query. A missing entry means the node had no result recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResults {
    pub height: i64,
    pub results: Vec<Option<TxResult>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub code: u32,
    pub events: Vec<Event>,
}

/// Outcome of broadcasting a transaction and waiting for its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    pub check_code: u32,
    pub deliver_code: u32,
    pub data: Vec<u8>,
}

/// The two subscription channels a monitor consumes.
pub struct EventStreams {
    pub headers: mpsc::Receiver<BlockHeader>,
    pub txs: mpsc::Receiver<TxEvent>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Opens header and tx subscriptions under the given subscriber name.
    async fn subscribe(&self, subscriber: &str) -> Result<EventStreams, MonitorError>;

    async fn unsubscribe_all(&self, subscriber: &str) -> Result<(), MonitorError>;

    /// Drops the current connection and dials an alternate endpoint.
    async fn force_reconnect(&self) -> Result<(), MonitorError>;

    /// Results for the given height; `None` queries the latest block.
    async fn block_results(&self, height: Option<i64>) -> Result<BlockResults, MonitorError>;

    /// Headers for the inclusive range; the node returns at most 20 items.
    async fn blockchain_info(
        &self,
        start_height: i64,
        end_height: i64,
    ) -> Result<Vec<BlockHeader>, MonitorError>;

    /// Submits a transaction and waits until it is committed.
    async fn broadcast(&self, tx: Vec<u8>) -> Result<BroadcastResult, MonitorError>;
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use opal_coconut_worker::ShutdownListener;
use opal_store::Database;
use tokio::time::{interval, sleep, timeout};

use crate::client::{BlockHeader, BlockResults, ChainClient, EventStreams, TxEvent};
use crate::MonitorError;

/// A block not receiving all of its transactions within this interval is
/// considered stale and refetched in full; the same interval also bounds
/// silence on the event stream before a full resubscription.
const MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Bound on a single unsubscribe/resubscribe cycle.
const RESUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The node returns at most this many headers per history query.
const CATCH_UP_CHUNK: i64 = 20;

/// A transaction inside a reassembled block. A transaction whose result the
/// node never recorded surfaces with code 0 and no events; the processing
/// loops skip it based on the missing event key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub height: i64,
    pub index: u32,
    pub code: u32,
    pub events: Vec<opal_chain::Event>,
}

/// A fully populated block handed out for processing.
#[derive(Debug, Clone)]
pub struct FullBlock {
    pub height: i64,
    pub txs: Vec<Tx>,
}

#[derive(Debug)]
struct Block {
    /// Approximate creation time of this struct, not of the chain block.
    created: Instant,
    height: i64,
    /// Expected transaction count; -1 until the header arrives.
    num_txs: i64,
    received_header: bool,
    being_processed: bool,
    txs: Vec<Option<Tx>>,
}

impl Block {
    fn from_header(header: &BlockHeader) -> Block {
        Block {
            created: Instant::now(),
            height: header.height,
            num_txs: header.num_txs,
            received_header: true,
            being_processed: false,
            txs: vec![None; header.num_txs.max(0) as usize],
        }
    }

    fn is_full(&self) -> bool {
        self.received_header
            && self.txs.len() as i64 == self.num_txs
            && self.txs.iter().all(|tx| tx.is_some())
    }

    fn add_tx(&mut self, tx: Tx) {
        let index = tx.index as usize;
        if self.txs.len() < index + 1 {
            self.txs.resize(index + 1, None);
        }
        self.txs[index] = Some(tx);
    }

    fn is_stale(&self) -> bool {
        self.created.elapsed() > MAX_INTERVAL
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    /// Everything up to and including this height is already flushed.
    latest_consecutive_processed: i64,
    /// Completed but not yet flushed heights.
    processed: HashSet<i64>,
    /// Blocks still accruing headers or transactions.
    unprocessed: HashMap<i64, Block>,
}

/// The chain monitor. All bookkeeping lives behind one mutex; the worker
/// task ingesting events and the role loops polling for full blocks both
/// go through it.
pub struct Monitor {
    state: Mutex<MonitorState>,
    client: Arc<dyn ChainClient>,
    store: Arc<Database>,
    subscriber: String,
}

impl Monitor {
    /// Creates the monitor, opens the subscriptions, performs the initial
    /// resync and spawns the ingestion worker.
    pub async fn start(
        client: Arc<dyn ChainClient>,
        store: Arc<Database>,
        id: &str,
        shutdown: ShutdownListener,
    ) -> Result<Arc<Monitor>, MonitorError> {
        let subscriber = format!("monitor{id}");

        // in case the previous run didn't shut down cleanly
        if let Err(err) = client.unsubscribe_all(&subscriber).await {
            debug!("initial unsubscribe: {err}");
        }

        let streams = client.subscribe(&subscriber).await?;

        let monitor = Arc::new(Monitor {
            state: Mutex::new(MonitorState {
                latest_consecutive_processed: store.get_highest(),
                ..Default::default()
            }),
            client,
            store,
            subscriber,
        });

        monitor.resync_with_chain().await?;

        tokio::spawn(Arc::clone(&monitor).worker(streams, shutdown));
        Ok(monitor)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the lowest block that is fully populated and not yet being
    /// processed, marking it as taken. Stale partial blocks encountered on
    /// the way are refetched in the background.
    pub fn get_lowest_full_unprocessed_block(self: &Arc<Self>) -> Option<FullBlock> {
        let mut stale = Vec::new();
        let result = {
            let mut state = self.lock_state();

            let mut candidate: Option<i64> = None;
            for (&height, block) in state.unprocessed.iter() {
                if block.is_full() && !block.being_processed {
                    if candidate.map(|current| height < current).unwrap_or(true) {
                        candidate = Some(height);
                    }
                } else if !block.is_full() && block.is_stale() {
                    // it's been sitting there for a while without getting
                    // all of its txs; query for its entirety
                    stale.push(height);
                }
            }

            candidate.map(|height| {
                // the entry is guaranteed to exist, we just found it
                #[allow(clippy::unwrap_used)]
                let block = state.unprocessed.get_mut(&height).unwrap();
                block.being_processed = true;
                FullBlock {
                    height,
                    txs: block.txs.iter().flatten().cloned().collect(),
                }
            })
        };

        for height in stale {
            let monitor = Arc::clone(self);
            tokio::spawn(async move { monitor.force_update_block(height).await });
        }

        result
    }

    /// Gets called when all txs from a particular block are processed;
    /// advances the contiguous-processed watermark and flushes it.
    pub fn finalize_height(&self, height: i64) {
        debug!("finalizing height {height}");
        let mut state = self.lock_state();

        if height <= state.latest_consecutive_processed {
            // repeated finalisation is a no-op
            state.unprocessed.remove(&height);
            return;
        }

        if height == state.latest_consecutive_processed + 1 {
            state.latest_consecutive_processed = height;
            // sweep the contiguous suffix that was already processed
            let mut next = height + 1;
            while state.processed.remove(&next) {
                debug!("also finalizing {next}");
                state.latest_consecutive_processed = next;
                next += 1;
            }
            self.store
                .finalize_height(state.latest_consecutive_processed);
        } else {
            state.processed.insert(height);
        }
        state.unprocessed.remove(&height);
    }

    fn add_new_block(&self, block: Block) {
        let mut state = self.lock_state();

        match state.unprocessed.get_mut(&block.height) {
            None => {
                if block.height > state.latest_consecutive_processed
                    && !state.processed.contains(&block.height)
                {
                    state.unprocessed.insert(block.height, block);
                }
            }
            Some(existing) => {
                debug!("block at height {} already present", block.height);
                if existing.received_header {
                    // most likely the same header delivered twice; ignore
                } else {
                    // the placeholder accrued txs before the header arrived
                    let mut block = block;
                    for tx in existing.txs.iter().flatten() {
                        block.add_tx(tx.clone());
                    }
                    *existing = block;
                }
            }
        }
    }

    fn add_new_tx(&self, tx: TxEvent) {
        let mut state = self.lock_state();

        let tx = Tx {
            height: tx.height,
            index: tx.index,
            code: tx.code,
            events: tx.events,
        };

        match state.unprocessed.get_mut(&tx.height) {
            Some(block) => block.add_tx(tx),
            None => {
                // the first tx of a block whose header wasn't seen yet
                let mut block = Block {
                    created: Instant::now(),
                    height: tx.height,
                    num_txs: -1,
                    received_header: false,
                    being_processed: false,
                    txs: Vec::new(),
                };
                let height = tx.height;
                block.add_tx(tx);
                state.unprocessed.insert(height, block);
            }
        }
    }

    fn add_catch_up_block(&self, results: BlockResults, overwrite: bool) {
        let mut state = self.lock_state();

        debug!("catching up on block {}", results.height);

        if overwrite {
            // reset whatever partial state accumulated for the height
            debug!("overwriting block at height {}", results.height);
            state.unprocessed.remove(&results.height);
            state.processed.remove(&results.height);
        }

        if results.height <= state.latest_consecutive_processed
            || state.processed.contains(&results.height)
            || state.unprocessed.contains_key(&results.height)
        {
            return;
        }

        let txs = results
            .results
            .iter()
            .enumerate()
            .map(|(index, result)| match result {
                Some(result) => Some(Tx {
                    height: results.height,
                    index: index as u32,
                    code: result.code,
                    events: result.events.clone(),
                }),
                // the node had no result recorded; keep a hollow tx so the
                // block still counts as full
                None => Some(Tx {
                    height: results.height,
                    index: index as u32,
                    code: 0,
                    events: Vec::new(),
                }),
            })
            .collect::<Vec<_>>();

        state.unprocessed.insert(
            results.height,
            Block {
                created: Instant::now(),
                height: results.height,
                num_txs: txs.len() as i64,
                received_header: true,
                being_processed: false,
                txs,
            },
        );
    }

    async fn force_update_block(&self, height: i64) {
        {
            let state = self.lock_state();
            if state.latest_consecutive_processed >= height
                || state.processed.contains(&height)
            {
                debug!("forced {height} was already handled elsewhere");
                return;
            }
            if let Some(block) = state.unprocessed.get(&height) {
                if !block.is_stale() {
                    debug!("forced {height} was recently refreshed");
                    return;
                }
            }
        }

        debug!("force update height: {height}");
        match self.client.block_results(Some(height)).await {
            Ok(results) => self.add_catch_up_block(results, true),
            Err(err) => error!("could not obtain results for height {height}: {err}"),
        }
    }

    /// Scans for heights missing from both maps below the highest processed
    /// block and refetches them.
    async fn fill_block_gaps(&self) {
        debug!("filling missing blocks");

        let gaps = {
            let state = self.lock_state();
            if state.processed.is_empty() {
                return;
            }

            let mut remaining = state.processed.len();
            let mut gaps = Vec::new();
            let mut height = state.latest_consecutive_processed + 1;
            while remaining > 0 {
                if state.processed.contains(&height) {
                    remaining -= 1;
                } else if !state.unprocessed.contains_key(&height) {
                    // never received any data for it
                    debug!("found gap at height {height}, remaining: {remaining}");
                    gaps.push(height);
                }
                height += 1;
            }
            gaps
        };

        for gap in gaps {
            debug!("going to fill in the gap at height {gap}");
            self.force_update_block(gap).await;
        }
    }

    /// Fetches chain data from `start_height` to `end_height` inclusive, in
    /// chunks the node is willing to answer.
    async fn catch_up(&self, start_height: i64, end_height: i64) {
        debug!("catching up from {start_height} to {end_height}");

        let mut chunk_start = start_height;
        while chunk_start <= end_height {
            let chunk_end = end_height.min(chunk_start + CATCH_UP_CHUNK - 1);

            let headers = match self.client.blockchain_info(chunk_start, chunk_end).await {
                Ok(headers) => headers,
                Err(err) => {
                    error!("error on catchup ({chunk_start}..{chunk_end}): {err}");
                    return;
                }
            };

            for header in headers {
                if header.num_txs == 0 {
                    // nothing more to fetch for an empty block
                    self.add_new_block(Block::from_header(&header));
                } else {
                    match self.client.block_results(Some(header.height)).await {
                        Ok(results) => self.add_catch_up_block(results, false),
                        Err(err) => {
                            error!("error on catchup at height {}: {err}", header.height)
                        }
                    }
                }
            }

            chunk_start = chunk_end + 1;
        }
    }

    async fn resync_with_chain(&self) -> Result<(), MonitorError> {
        let latest_stored = self.store.get_highest();
        let latest_block = self.client.block_results(None).await?;

        debug!(
            "resyncing with the chain; latest stored: {latest_stored}, latest block: {}",
            latest_block.height
        );

        if latest_stored < latest_block.height - 1 {
            warn!(
                "monitor is behind the chain; latest stored: {latest_stored}, latest block: {}",
                latest_block.height
            );
            let latest_height = latest_block.height;
            self.add_catch_up_block(latest_block, false);
            self.catch_up(latest_stored + 1, latest_height - 1).await;
        } else {
            debug!("monitor is up to date with the chain");
        }
        Ok(())
    }

    async fn resubscribe_full(&self) -> Result<EventStreams, MonitorError> {
        debug!("resubscribing to the chain");

        let resubscription = async {
            if let Err(err) = self.client.unsubscribe_all(&self.subscriber).await {
                warn!("{err}");
            }

            match self.client.subscribe(&self.subscriber).await {
                Ok(streams) => Ok(streams),
                Err(_) => {
                    // dial an alternate endpoint and recreate the
                    // subscriptions there
                    self.client.force_reconnect().await?;
                    self.client.subscribe(&self.subscriber).await
                }
            }
        };

        timeout(RESUBSCRIBE_TIMEOUT, resubscription)
            .await
            .map_err(|_| MonitorError::Subscription("resubscription timed out".to_string()))?
    }

    async fn worker(
        self: Arc<Self>,
        mut streams: EventStreams,
        mut shutdown: ShutdownListener,
    ) {
        let mut gap_ticker = interval(MAX_INTERVAL);
        // the first tick of a tokio interval fires immediately
        gap_ticker.tick().await;

        let stall_timer = sleep(MAX_INTERVAL);
        tokio::pin!(stall_timer);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    if let Err(err) = self.client.unsubscribe_all(&self.subscriber).await {
                        warn!("{err}");
                    }
                    debug!("halting the monitor");
                    return;
                }
                maybe_header = streams.headers.recv() => match maybe_header {
                    Some(header) => {
                        debug!("received header for height {}", header.height);
                        self.add_new_block(Block::from_header(&header));
                        stall_timer.as_mut().reset(tokio::time::Instant::now() + MAX_INTERVAL);
                    }
                    None => {
                        if !self.recover_subscription(&mut streams).await {
                            return;
                        }
                        stall_timer.as_mut().reset(tokio::time::Instant::now() + MAX_INTERVAL);
                    }
                },
                maybe_tx = streams.txs.recv() => match maybe_tx {
                    Some(tx) => {
                        debug!("received tx {} at height {}", tx.index, tx.height);
                        self.add_new_tx(tx);
                        stall_timer.as_mut().reset(tokio::time::Instant::now() + MAX_INTERVAL);
                    }
                    None => {
                        if !self.recover_subscription(&mut streams).await {
                            return;
                        }
                        stall_timer.as_mut().reset(tokio::time::Instant::now() + MAX_INTERVAL);
                    }
                },
                _ = gap_ticker.tick() => {
                    self.fill_block_gaps().await;
                }
                _ = &mut stall_timer => {
                    // regular-ish block intervals are expected, with empty
                    // blocks if needed; prolonged silence means a failure
                    warn!(
                        "didn't receive any chain events in {}s",
                        MAX_INTERVAL.as_secs()
                    );
                    if !self.recover_subscription(&mut streams).await {
                        return;
                    }
                    stall_timer.as_mut().reset(tokio::time::Instant::now() + MAX_INTERVAL);
                }
            }
        }
    }

    async fn recover_subscription(&self, streams: &mut EventStreams) -> bool {
        match self.resubscribe_full().await {
            Ok(new_streams) => {
                *streams = new_streams;
                if let Err(err) = self.resync_with_chain().await {
                    // at least we're connected, so data should start
                    // flowing again
                    error!("couldn't resync with the chain: {err}");
                }
                true
            }
            Err(err) => {
                error!("couldn't resubscribe to the chain: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BroadcastResult, TxResult};
    use async_trait::async_trait;
    use opal_coconut_worker::ShutdownNotifier;
    use tokio::sync::mpsc;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeChain {
        header_tx: AsyncMutex<Option<mpsc::Sender<BlockHeader>>>,
        tx_tx: AsyncMutex<Option<mpsc::Sender<TxEvent>>>,
        results: Mutex<HashMap<i64, BlockResults>>,
        latest: Mutex<i64>,
    }

    impl FakeChain {
        fn new() -> FakeChain {
            FakeChain {
                header_tx: AsyncMutex::new(None),
                tx_tx: AsyncMutex::new(None),
                results: Mutex::new(HashMap::new()),
                latest: Mutex::new(0),
            }
        }

        async fn emit_header(&self, height: i64, num_txs: i64) {
            *self.latest.lock().unwrap() = height;
            if let Some(tx) = self.header_tx.lock().await.as_ref() {
                tx.send(BlockHeader { height, num_txs }).await.unwrap();
            }
        }

        async fn emit_tx(&self, height: i64, index: u32, events: Vec<opal_chain::Event>) {
            if let Some(tx) = self.tx_tx.lock().await.as_ref() {
                tx.send(TxEvent {
                    height,
                    index,
                    code: 0,
                    events,
                })
                .await
                .unwrap();
            }
        }

        fn set_results(&self, height: i64, results: Vec<Option<TxResult>>) {
            *self.latest.lock().unwrap() = (*self.latest.lock().unwrap()).max(height);
            self.results
                .lock()
                .unwrap()
                .insert(height, BlockResults { height, results });
        }
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn subscribe(&self, _subscriber: &str) -> Result<EventStreams, MonitorError> {
            let (header_tx, headers) = mpsc::channel(64);
            let (tx_tx, txs) = mpsc::channel(64);
            *self.header_tx.lock().await = Some(header_tx);
            *self.tx_tx.lock().await = Some(tx_tx);
            Ok(EventStreams { headers, txs })
        }

        async fn unsubscribe_all(&self, _subscriber: &str) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn force_reconnect(&self) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn block_results(&self, height: Option<i64>) -> Result<BlockResults, MonitorError> {
            let height = height.unwrap_or(*self.latest.lock().unwrap());
            self.results
                .lock()
                .unwrap()
                .get(&height)
                .cloned()
                .ok_or_else(|| MonitorError::Client(format!("no results for {height}")))
        }

        async fn blockchain_info(
            &self,
            start_height: i64,
            end_height: i64,
        ) -> Result<Vec<BlockHeader>, MonitorError> {
            let results = self.results.lock().unwrap();
            Ok((start_height..=end_height)
                .filter_map(|height| {
                    results.get(&height).map(|block| BlockHeader {
                        height,
                        num_txs: block.results.len() as i64,
                    })
                })
                .collect())
        }

        async fn broadcast(&self, _tx: Vec<u8>) -> Result<BroadcastResult, MonitorError> {
            Ok(BroadcastResult {
                check_code: 0,
                deliver_code: 0,
                data: Vec::new(),
            })
        }
    }

    async fn started_monitor() -> (Arc<FakeChain>, Arc<Monitor>, ShutdownNotifier) {
        let chain = Arc::new(FakeChain::new());
        // something must answer the initial resync query
        chain.set_results(1, vec![]);

        let store = Arc::new(Database::new());
        store.finalize_height(0);

        let notifier = ShutdownNotifier::new();
        let monitor = Monitor::start(
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            store,
            "test",
            notifier.subscribe(),
        )
        .await
        .unwrap();

        (chain, monitor, notifier)
    }

    async fn wait_for_block(monitor: &Arc<Monitor>) -> FullBlock {
        for _ in 0..100 {
            if let Some(block) = monitor.get_lowest_full_unprocessed_block() {
                return block;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no full block appeared");
    }

    #[tokio::test]
    async fn empty_block_is_full_on_header_alone() {
        let (chain, monitor, _notifier) = started_monitor().await;

        chain.emit_header(2, 0).await;

        let block = wait_for_block(&monitor).await;
        assert_eq!(2, block.height);
        assert!(block.txs.is_empty());
    }

    #[tokio::test]
    async fn txs_arriving_before_the_header_are_kept() {
        let (chain, monitor, _notifier) = started_monitor().await;

        // txs first, header afterwards
        chain.emit_tx(3, 1, vec![]).await;
        chain.emit_tx(3, 0, vec![]).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(monitor.get_lowest_full_unprocessed_block().is_none());

        chain.emit_header(3, 2).await;

        let block = wait_for_block(&monitor).await;
        assert_eq!(3, block.height);
        assert_eq!(2, block.txs.len());
        assert_eq!(0, block.txs[0].index);
        assert_eq!(1, block.txs[1].index);
    }

    #[tokio::test]
    async fn partially_received_blocks_are_not_handed_out() {
        let (chain, monitor, _notifier) = started_monitor().await;

        chain.emit_header(2, 2).await;
        chain.emit_tx(2, 0, vec![]).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(monitor.get_lowest_full_unprocessed_block().is_none());

        chain.emit_tx(2, 1, vec![]).await;
        let block = wait_for_block(&monitor).await;
        assert_eq!(2, block.height);
    }

    #[tokio::test]
    async fn lowest_full_block_is_preferred() {
        let (chain, monitor, _notifier) = started_monitor().await;

        chain.emit_header(5, 0).await;
        chain.emit_header(3, 0).await;
        chain.emit_header(4, 0).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(3, wait_for_block(&monitor).await.height);
        assert_eq!(4, wait_for_block(&monitor).await.height);
        assert_eq!(5, wait_for_block(&monitor).await.height);
    }

    #[tokio::test]
    async fn finalize_sweeps_the_contiguous_suffix() {
        let (chain, monitor, _notifier) = started_monitor().await;
        let store = Arc::clone(&monitor.store);

        chain.emit_header(1, 0).await;
        chain.emit_header(2, 0).await;
        chain.emit_header(3, 0).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // out of order completion: 2 and 3 park in the processed set
        monitor.finalize_height(2);
        monitor.finalize_height(3);
        assert_eq!(0, store.get_highest());

        // 1 completes and the whole run is flushed
        monitor.finalize_height(1);
        assert_eq!(3, store.get_highest());

        // repeated finalisation of a flushed height changes nothing
        monitor.finalize_height(3);
        assert_eq!(3, store.get_highest());
    }

    #[tokio::test]
    async fn handed_out_block_is_not_returned_twice() {
        let (chain, monitor, _notifier) = started_monitor().await;

        chain.emit_header(2, 0).await;
        let block = wait_for_block(&monitor).await;
        assert_eq!(2, block.height);

        // marked as being processed; not handed out again
        assert!(monitor.get_lowest_full_unprocessed_block().is_none());

        monitor.finalize_height(2);
        assert!(monitor.get_lowest_full_unprocessed_block().is_none());
    }
}

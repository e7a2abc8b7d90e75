// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use log::{debug, trace};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::jobqueue::{JobPacket, JobQueue};
use crate::shutdown::ShutdownListener;

/// Number of already-enqueued packets a worker is still willing to run
/// after shutdown was signalled.
const SHUTDOWN_DRAIN_LIMIT: usize = 64;

/// A single worker task draining the shared job queue. One packet is
/// executed to completion per tick.
pub struct JobWorker {
    id: u64,
    handle: JoinHandle<()>,
}

impl JobWorker {
    pub fn spawn(queue: &JobQueue, id: u64, shutdown: ShutdownListener) -> JobWorker {
        let rx = queue.receiver();
        let handle = tokio::spawn(run(rx, id, shutdown));
        JobWorker { id, handle }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the worker to exit; meaningful only after shutdown was
    /// signalled on its listener.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn run(
    rx: Arc<Mutex<mpsc::Receiver<JobPacket>>>,
    id: u64,
    mut shutdown: ShutdownListener,
) {
    debug!("jobworker {id}: started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                drain(&rx, id).await;
                break;
            }
            packet = next_packet(&rx) => match packet {
                Some(packet) => {
                    trace!("jobworker {id}: executing a packet");
                    packet();
                }
                // every sender is gone
                None => break,
            }
        }
    }
    debug!("jobworker {id}: exiting");
}

async fn next_packet(rx: &Arc<Mutex<mpsc::Receiver<JobPacket>>>) -> Option<JobPacket> {
    let mut guard = rx.lock().await;
    guard.recv().await
}

async fn drain(rx: &Arc<Mutex<mpsc::Receiver<JobPacket>>>, id: u64) {
    let mut drained = 0;
    let mut guard = rx.lock().await;
    while drained < SHUTDOWN_DRAIN_LIMIT {
        match guard.try_recv() {
            Ok(packet) => {
                packet();
                drained += 1;
            }
            Err(_) => break,
        }
    }
    if drained > 0 {
        debug!("jobworker {id}: drained {drained} packets on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn packets_are_executed() {
        let queue = JobQueue::new(8);
        let notifier = ShutdownNotifier::new();
        let worker = JobWorker::spawn(&queue, 1, notifier.subscribe());

        let (tx, rx) = oneshot::channel();
        let sent = queue
            .sender()
            .send(Box::new(move || {
                let _ = tx.send(42);
            }))
            .await;
        assert!(sent);

        assert_eq!(42, rx.await.unwrap());

        notifier.signal_shutdown();
        worker.join().await;
    }

    #[tokio::test]
    async fn results_preserve_caller_index() {
        let queue = JobQueue::new(32);
        let notifier = ShutdownNotifier::new();
        let workers = (0..4)
            .map(|id| JobWorker::spawn(&queue, id, notifier.subscribe()))
            .collect::<Vec<_>>();

        let mut receivers = Vec::new();
        for i in 0..16u64 {
            let (tx, rx) = oneshot::channel();
            queue
                .sender()
                .send(Box::new(move || {
                    let _ = tx.send(i * i);
                }))
                .await;
            receivers.push(rx);
        }

        // collecting in submission order keeps the caller's indexing intact
        for (i, rx) in receivers.into_iter().enumerate() {
            assert_eq!((i * i) as u64, rx.await.unwrap());
        }

        notifier.signal_shutdown();
        for worker in workers {
            worker.join().await;
        }
    }

    #[tokio::test]
    async fn queued_work_is_drained_on_shutdown() {
        let queue = JobQueue::new(32);
        let notifier = ShutdownNotifier::new();
        let executed = Arc::new(AtomicUsize::new(0));

        // enqueue before any worker exists
        for _ in 0..8 {
            let executed = Arc::clone(&executed);
            queue
                .sender()
                .send(Box::new(move || {
                    executed.fetch_add(1, Ordering::SeqCst);
                }))
                .await;
        }

        let worker = JobWorker::spawn(&queue, 1, notifier.subscribe());
        notifier.signal_shutdown();
        worker.join().await;

        // shutdown won the race or the packets ran normally; either way
        // nothing may be lost
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(8, executed.load(Ordering::SeqCst));
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

/// A unit of work travelling through the queue: a closure owning its inputs
/// that writes its result to a oneshot channel on completion.
pub type JobPacket = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_CAPACITY: usize = 256;

/// Bounded multi-producer queue of [`JobPacket`]s drained by a pool of
/// workers. The receiving half is shared; workers take turns pulling the
/// next packet.
pub struct JobQueue {
    tx: mpsc::Sender<JobPacket>,
    rx: Arc<Mutex<mpsc::Receiver<JobPacket>>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        JobQueue::new(DEFAULT_CAPACITY)
    }
}

impl JobQueue {
    pub fn new(capacity: usize) -> JobQueue {
        let (tx, rx) = mpsc::channel(capacity);
        JobQueue {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn sender(&self) -> JobSender {
        JobSender {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn receiver(&self) -> Arc<Mutex<mpsc::Receiver<JobPacket>>> {
        Arc::clone(&self.rx)
    }
}

/// Producer handle for the queue; cheap to clone.
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<JobPacket>,
}

impl JobSender {
    /// Enqueues a packet, waiting if the queue is at capacity. Returns false
    /// if every worker is gone.
    pub async fn send(&self, packet: JobPacket) -> bool {
        self.tx.send(packet).await.is_ok()
    }

    /// Non-async variant used from synchronous contexts; applies
    /// backpressure by blocking the current thread.
    pub fn send_blocking(&self, packet: JobPacket) -> bool {
        self.tx.blocking_send(packet).is_ok()
    }
}

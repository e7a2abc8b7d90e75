// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::watch;

/// Broadcasts a single shutdown signal to every subscribed listener.
/// Signalling is idempotent; dropping the notifier also releases the
/// listeners.
#[derive(Debug)]
pub struct ShutdownNotifier {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownNotifier {
    fn default() -> Self {
        let (tx, _) = watch::channel(false);
        ShutdownNotifier { tx }
    }
}

impl ShutdownNotifier {
    pub fn new() -> ShutdownNotifier {
        ShutdownNotifier::default()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn signal_shutdown(&self) {
        // an error means every listener is already gone
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Completes once shutdown was signalled (or the notifier was dropped).
    pub async fn recv(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::RwLock;

use log::debug;

/// A credential issued in response to an on-chain request, stored so clients
/// can fetch it later by the block height and their ElGamal gamma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub gamma: Vec<u8>,
    pub blinded_signature: Vec<u8>,
    pub issuer_id: u64,
}

/// Bookkeeping store of a monitor-driven service: the highest fully
/// processed block height plus credentials issued per `(height, gamma)`.
///
/// The persistent engine behind it is deliberately out of scope; the store
/// is an in-process map guarded by a read/write lock with the interface the
/// services program against.
#[derive(Debug, Default)]
pub struct Database {
    inner: RwLock<DatabaseInner>,
}

#[derive(Debug, Default)]
struct DatabaseInner {
    highest: i64,
    issued: HashMap<i64, Vec<IssuedCredential>>,
}

impl Database {
    pub fn new() -> Database {
        Database::default()
    }

    /// Marks everything up to (and including) `height` as durably processed.
    /// Lower heights are a no-op, so repeated finalisation is safe.
    pub fn finalize_height(&self, height: i64) {
        // a poisoned lock means a writer panicked; the stored data is plain
        // values so continuing with it is safe
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if height > inner.highest {
            debug!("finalized height {height}");
            inner.highest = height;
        }
    }

    pub fn get_highest(&self) -> i64 {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.highest
    }

    pub fn store_issued_credential(
        &self,
        height: i64,
        gamma: &[u8],
        blinded_signature: Vec<u8>,
        issuer_id: u64,
    ) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.issued.entry(height).or_default().push(IssuedCredential {
            gamma: gamma.to_vec(),
            blinded_signature,
            issuer_id,
        });
    }

    pub fn get_credential(&self, height: i64, gamma: &[u8]) -> Option<IssuedCredential> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .issued
            .get(&height)?
            .iter()
            .find(|credential| credential.gamma == gamma)
            .cloned()
    }

    pub fn get_block_credentials(&self, height: i64) -> Vec<IssuedCredential> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.issued.get(&height).cloned().unwrap_or_default()
    }
}

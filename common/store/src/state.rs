// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Versioned ordered key/value store backing the replicated state machine.
///
/// All mutation happens on a working copy; [`StateStore::commit`] freezes it
/// into a new version and returns the deterministic hash of the full state.
/// The hash covers the content only, so committing an unchanged state yields
/// an unchanged hash regardless of the version counter.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
    last_hash: [u8; 32],
}

impl StateStore {
    pub fn new() -> StateStore {
        StateStore::default()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(|value| value.as_slice())
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn delete(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    /// Freezes the working copy into the next version and returns
    /// `(hash, version)`.
    pub fn commit(&mut self) -> ([u8; 32], u64) {
        let mut hasher = Sha256::new();
        // the map is ordered, so the accumulation is deterministic
        for (key, value) in &self.entries {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key);
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value);
        }

        self.last_hash = hasher.finalize().into();
        self.version += 1;
        (self.last_hash, self.version)
    }

    pub fn root_hash(&self) -> [u8; 32] {
        self.last_hash
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_commits_to_identical_hash() {
        let mut store = StateStore::new();

        let mut key = b"account".to_vec();
        key.extend_from_slice(&[0xAA; 20]);

        store.set(key.clone(), 1000u64.to_be_bytes().to_vec());
        let (h1, v1) = store.commit();

        // overwrite with the identical value
        store.set(key, 1000u64.to_be_bytes().to_vec());
        let (h2, v2) = store.commit();

        assert_eq!(h1, h2);
        assert_eq!(v1 + 1, v2);
    }

    #[test]
    fn hash_depends_on_content() {
        let mut store = StateStore::new();
        store.set(b"k".to_vec(), b"v1".to_vec());
        let (h1, _) = store.commit();

        store.set(b"k".to_vec(), b"v2".to_vec());
        let (h2, _) = store.commit();

        assert_ne!(h1, h2);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut store1 = StateStore::new();
        store1.set(b"a".to_vec(), b"1".to_vec());
        store1.set(b"b".to_vec(), b"2".to_vec());

        let mut store2 = StateStore::new();
        store2.set(b"b".to_vec(), b"2".to_vec());
        store2.set(b"a".to_vec(), b"1".to_vec());

        assert_eq!(store1.commit().0, store2.commit().0);
    }

    #[test]
    fn get_and_has() {
        let mut store = StateStore::new();
        assert!(!store.has(b"missing"));
        assert!(store.get(b"missing").is_none());

        store.set(b"present".to_vec(), b"value".to_vec());
        assert!(store.has(b"present"));
        assert_eq!(Some(b"value".as_slice()), store.get(b"present"));
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! State-manipulation layer of the application: every read and write goes
//! through the versioned store using the byte-exact key layout of
//! [`crate::constants`].

use log::debug;

use opal_store::StateStore;

use crate::account::{Address, ADDRESS_LENGTH};
use crate::code::Code;
use crate::constants::{self, prefix_key, ZetaStatus, NONCE_LENGTH};
use crate::error::ChainError;
use crate::genesis::GenesisState;

#[derive(Debug)]
pub(crate) struct State {
    pub(crate) store: StateStore,
    pub(crate) watcher_threshold: u32,
    pub(crate) verifier_threshold: u32,
    pub(crate) redeemer_threshold: u32,
    pub(crate) pipe_account: Address,
    pub(crate) create_account_on_deposit: bool,
    pub(crate) create_account_on_pipe_transfer: bool,
}

impl State {
    pub(crate) fn from_genesis(genesis: &GenesisState) -> Result<State, ChainError> {
        genesis.validate()?;

        let mut store = StateStore::new();

        store.set(
            constants::WATCHER_THRESHOLD_KEY,
            genesis.watcher_threshold.to_be_bytes().to_vec(),
        );
        store.set(
            constants::VERIFIER_THRESHOLD_KEY,
            genesis.verifier_threshold.to_be_bytes().to_vec(),
        );
        store.set(
            constants::REDEEMER_THRESHOLD_KEY,
            genesis.redeemer_threshold.to_be_bytes().to_vec(),
        );
        store.set(constants::PIPE_CONTRACT_KEY, genesis.pipe_account.clone());

        for watcher in &genesis.watchers {
            store.set(
                prefix_key(constants::ETHEREUM_WATCHER_KEY_PREFIX, watcher),
                constants::ETHEREUM_WATCHER_KEY_PREFIX.to_vec(),
            );
        }
        for verifier in &genesis.verifiers {
            store.set(
                prefix_key(constants::CREDENTIAL_VERIFIER_KEY_PREFIX, verifier),
                constants::CREDENTIAL_VERIFIER_KEY_PREFIX.to_vec(),
            );
        }
        for redeemer in &genesis.redeemers {
            store.set(
                prefix_key(constants::TOKEN_REDEEMER_KEY_PREFIX, redeemer),
                constants::TOKEN_REDEEMER_KEY_PREFIX.to_vec(),
            );
        }

        for account in &genesis.accounts {
            store.set(
                prefix_key(constants::ACCOUNTS_PREFIX, &account.address),
                account.balance.to_be_bytes().to_vec(),
            );
        }

        let pipe_account = Address::try_from_slice(&genesis.pipe_account)?;

        Ok(State {
            store,
            watcher_threshold: genesis.watcher_threshold,
            verifier_threshold: genesis.verifier_threshold,
            redeemer_threshold: genesis.redeemer_threshold,
            pipe_account,
            create_account_on_deposit: genesis.create_account_on_deposit,
            create_account_on_pipe_transfer: genesis.create_account_on_pipe_transfer,
        })
    }

    // accounts

    pub(crate) fn set_account_balance(&mut self, address: &[u8], value: u64) {
        let entry = prefix_key(constants::ACCOUNTS_PREFIX, address);
        self.store.set(entry, value.to_be_bytes().to_vec());
        debug!("set balance of {address:02x?} to {value}");
    }

    pub(crate) fn retrieve_account_balance(&self, address: &[u8]) -> Option<u64> {
        if address.len() != ADDRESS_LENGTH {
            return None;
        }
        let entry = prefix_key(constants::ACCOUNTS_PREFIX, address);
        let raw = self.store.get(&entry)?;
        let arr = <[u8; 8]>::try_from(raw).ok()?;
        Some(u64::from_be_bytes(arr))
    }

    pub(crate) fn check_if_account_exists(&self, address: &[u8]) -> bool {
        self.retrieve_account_balance(address).is_some()
    }

    /// Creates the account with a zero starting balance; an already present
    /// account is left untouched.
    pub(crate) fn create_new_account_op(&mut self, address: &[u8]) -> bool {
        if address.len() != ADDRESS_LENGTH {
            return false;
        }
        if self.check_if_account_exists(address) {
            return true;
        }
        self.set_account_balance(address, 0);
        true
    }

    pub(crate) fn transfer_funds_op(&mut self, source: &[u8], target: &[u8], amount: u64) -> Code {
        let Some(source_balance) = self.retrieve_account_balance(source) else {
            return Code::AccountDoesNotExist;
        };
        let Some(target_balance) = self.retrieve_account_balance(target) else {
            return Code::AccountDoesNotExist;
        };
        if source_balance < amount {
            return Code::InsufficientBalance;
        }

        self.set_account_balance(source, source_balance - amount);
        self.set_account_balance(target, target_balance + amount);
        Code::Ok
    }

    pub(crate) fn decrease_balance_by(&mut self, address: &[u8], amount: u64) -> Result<(), Code> {
        let Some(balance) = self.retrieve_account_balance(address) else {
            return Err(Code::AccountDoesNotExist);
        };
        if balance < amount {
            return Err(Code::InsufficientBalance);
        }
        self.set_account_balance(address, balance - amount);
        Ok(())
    }

    // nonces

    /// Returns true if the nonce was already seen for the address (or the
    /// arguments are malformed and the tx must be rejected anyway).
    pub(crate) fn check_nonce(&self, nonce: &[u8], address: &[u8]) -> bool {
        if nonce.len() != NONCE_LENGTH || address.len() != ADDRESS_LENGTH {
            return true;
        }
        // [PREFIX || NONCE || ADDRESS]
        let key = prefix_key(constants::SEEN_NONCE_PREFIX, &prefix_key(nonce, address));
        self.store.has(&key)
    }

    pub(crate) fn set_nonce(&mut self, nonce: &[u8], address: &[u8]) {
        let key = prefix_key(constants::SEEN_NONCE_PREFIX, &prefix_key(nonce, address));
        self.store.set(key, constants::SEEN_NONCE_PREFIX.to_vec());
    }

    // trusted sets

    pub(crate) fn check_watcher_key(&self, public_key: &[u8]) -> bool {
        let entry = prefix_key(constants::ETHEREUM_WATCHER_KEY_PREFIX, public_key);
        self.store.has(&entry)
    }

    pub(crate) fn check_verifier_key(&self, public_key: &[u8]) -> bool {
        let entry = prefix_key(constants::CREDENTIAL_VERIFIER_KEY_PREFIX, public_key);
        self.store.has(&entry)
    }

    pub(crate) fn check_redeemer_key(&self, public_key: &[u8]) -> bool {
        let entry = prefix_key(constants::TOKEN_REDEEMER_KEY_PREFIX, public_key);
        self.store.has(&entry)
    }

    // watcher notifications

    fn watcher_notification_key(watcher_key: &[u8], tx_hash: &[u8]) -> Vec<u8> {
        // [PREFIX || TXHASH || WATCHER]
        prefix_key(
            constants::ETHEREUM_WATCHER_NOTIFICATION_PREFIX,
            &prefix_key(tx_hash, watcher_key),
        )
    }

    pub(crate) fn check_watcher_notification(&self, watcher_key: &[u8], tx_hash: &[u8]) -> bool {
        self.store
            .has(&Self::watcher_notification_key(watcher_key, tx_hash))
    }

    /// Records the watcher's notification and returns the new count for the
    /// transfer.
    pub(crate) fn store_watcher_notification(
        &mut self,
        watcher_key: &[u8],
        tx_hash: &[u8],
    ) -> u32 {
        self.store.set(
            Self::watcher_notification_key(watcher_key, tx_hash),
            constants::ETHEREUM_WATCHER_NOTIFICATION_PREFIX.to_vec(),
        );

        let new_count = self.get_pipe_transfer_notification_count(tx_hash) + 1;
        self.store.set(
            prefix_key(
                constants::PIPE_ACCOUNT_TRANSFER_NOTIFICATION_COUNT_KEY_PREFIX,
                tx_hash,
            ),
            new_count.to_be_bytes().to_vec(),
        );
        new_count
    }

    pub(crate) fn get_pipe_transfer_notification_count(&self, tx_hash: &[u8]) -> u32 {
        let key = prefix_key(
            constants::PIPE_ACCOUNT_TRANSFER_NOTIFICATION_COUNT_KEY_PREFIX,
            tx_hash,
        );
        read_count(&self.store, &key)
    }

    // zeta status

    /// Additional data is appended to the status byte; currently only used
    /// for the spent status to record whom the zeta was credited to.
    pub(crate) fn set_zeta_status(
        &mut self,
        zeta: &[u8],
        status: ZetaStatus,
        additional_data: &[u8],
    ) {
        let key = prefix_key(constants::ZETA_STATUS_PREFIX, zeta);
        let mut value = status.db_entry().to_vec();
        value.extend_from_slice(additional_data);
        self.store.set(key, value);
    }

    pub(crate) fn check_if_zeta_is_unspent(&self, zeta: &[u8]) -> bool {
        let key = prefix_key(constants::ZETA_STATUS_PREFIX, zeta);
        if self.store.has(&key) {
            return false;
        }
        // the deprecated standalone spent marker is honoured when ingesting
        // an old store, but never written
        let legacy_key = prefix_key(constants::SPENT_ZETA_PREFIX, zeta);
        !self.store.has(&legacy_key)
    }

    pub(crate) fn check_zeta_status(&self, zeta: &[u8]) -> ZetaStatus {
        let key = prefix_key(constants::ZETA_STATUS_PREFIX, zeta);
        match self.store.get(&key) {
            None => {
                let legacy_key = prefix_key(constants::SPENT_ZETA_PREFIX, zeta);
                if self.store.has(&legacy_key) {
                    ZetaStatus::Spent
                } else {
                    ZetaStatus::Unspent
                }
            }
            Some(value) if value.starts_with(&ZetaStatus::BeingVerified.db_entry()) => {
                ZetaStatus::BeingVerified
            }
            Some(value) if value.starts_with(&ZetaStatus::Spent.db_entry()) => ZetaStatus::Spent,
            // should never happen, but if unsure, always assume it's already
            // spent and gone
            Some(_) => ZetaStatus::Spent,
        }
    }

    /// The raw status entry: status byte plus, for a spent zeta, the
    /// credited address.
    pub(crate) fn full_zeta_status(&self, zeta: &[u8]) -> Vec<u8> {
        let key = prefix_key(constants::ZETA_STATUS_PREFIX, zeta);
        match self.store.get(&key) {
            Some(value) => value.to_vec(),
            None => ZetaStatus::Unspent.db_entry().to_vec(),
        }
    }

    // verifier notifications

    fn verifier_notification_key(verifier_key: &[u8], zeta: &[u8], value: i64) -> Vec<u8> {
        // [PREFIX || VERIFIER || ZETA || uint64(VALUE)]
        let mut payload = Vec::with_capacity(verifier_key.len() + zeta.len() + 8);
        payload.extend_from_slice(verifier_key);
        payload.extend_from_slice(zeta);
        payload.extend_from_slice(&(value as u64).to_be_bytes());
        prefix_key(constants::CREDENTIAL_VERIFIER_NOTIFICATION_PREFIX, &payload)
    }

    fn verification_count_key(zeta: &[u8], value: i64) -> Vec<u8> {
        // [PREFIX || uint64(VALUE) || ZETA]
        let mut payload = Vec::with_capacity(8 + zeta.len());
        payload.extend_from_slice(&(value as u64).to_be_bytes());
        payload.extend_from_slice(zeta);
        prefix_key(
            constants::CREDENTIAL_VERIFICATION_NOTIFICATION_COUNT_KEY_PREFIX,
            &payload,
        )
    }

    pub(crate) fn check_verifier_notification(
        &self,
        verifier_key: &[u8],
        zeta: &[u8],
        value: i64,
    ) -> bool {
        self.store
            .has(&Self::verifier_notification_key(verifier_key, zeta, value))
    }

    /// Records the verifier's vote. Only positive votes advance the count;
    /// a negative vote is remembered (the verifier cannot vote twice) but
    /// the returned count stays unchanged.
    pub(crate) fn store_verifier_notification(
        &mut self,
        verifier_key: &[u8],
        zeta: &[u8],
        value: i64,
        valid: bool,
    ) -> u32 {
        self.store.set(
            Self::verifier_notification_key(verifier_key, zeta, value),
            constants::CREDENTIAL_VERIFIER_NOTIFICATION_PREFIX.to_vec(),
        );

        let current_count = self.get_credential_verification_count(zeta, value);
        if valid {
            let new_count = current_count + 1;
            self.store.set(
                Self::verification_count_key(zeta, value),
                new_count.to_be_bytes().to_vec(),
            );
            new_count
        } else {
            current_count
        }
    }

    pub(crate) fn get_credential_verification_count(&self, zeta: &[u8], value: i64) -> u32 {
        read_count(&self.store, &Self::verification_count_key(zeta, value))
    }

    // redeemer notifications

    fn redeemer_notification_key(
        redeemer_key: &[u8],
        user_address: &[u8],
        nonce: &[u8],
        amount: u64,
    ) -> Vec<u8> {
        // [PREFIX || REDEEMER || USER || NONCE || uint64(AMOUNT)]
        let mut payload =
            Vec::with_capacity(redeemer_key.len() + user_address.len() + nonce.len() + 8);
        payload.extend_from_slice(redeemer_key);
        payload.extend_from_slice(user_address);
        payload.extend_from_slice(nonce);
        payload.extend_from_slice(&amount.to_be_bytes());
        prefix_key(constants::TOKEN_REDEEMER_NOTIFICATION_PREFIX, &payload)
    }

    fn redemption_count_key(user_address: &[u8], nonce: &[u8], amount: u64) -> Vec<u8> {
        // [PREFIX || USER || NONCE || uint64(AMOUNT)]
        let mut payload = Vec::with_capacity(user_address.len() + nonce.len() + 8);
        payload.extend_from_slice(user_address);
        payload.extend_from_slice(nonce);
        payload.extend_from_slice(&amount.to_be_bytes());
        prefix_key(
            constants::TOKEN_REDEMPTION_NOTIFICATION_COUNT_KEY_PREFIX,
            &payload,
        )
    }

    pub(crate) fn check_redeemer_notification(
        &self,
        redeemer_key: &[u8],
        user_address: &[u8],
        nonce: &[u8],
        amount: u64,
    ) -> bool {
        self.store.has(&Self::redeemer_notification_key(
            redeemer_key,
            user_address,
            nonce,
            amount,
        ))
    }

    pub(crate) fn store_redeemer_notification(
        &mut self,
        redeemer_key: &[u8],
        user_address: &[u8],
        nonce: &[u8],
        amount: u64,
    ) -> u32 {
        self.store.set(
            Self::redeemer_notification_key(redeemer_key, user_address, nonce, amount),
            constants::TOKEN_REDEEMER_NOTIFICATION_PREFIX.to_vec(),
        );

        let new_count = self.get_token_redemption_count(user_address, nonce, amount) + 1;
        self.store.set(
            Self::redemption_count_key(user_address, nonce, amount),
            new_count.to_be_bytes().to_vec(),
        );
        new_count
    }

    pub(crate) fn get_token_redemption_count(
        &self,
        user_address: &[u8],
        nonce: &[u8],
        amount: u64,
    ) -> u32 {
        read_count(
            &self.store,
            &Self::redemption_count_key(user_address, nonce, amount),
        )
    }
}

fn read_count(store: &StateStore, key: &[u8]) -> u32 {
    store
        .get(key)
        .and_then(|raw| <[u8; 4]>::try_from(raw).ok())
        .map(u32::from_be_bytes)
        .unwrap_or(0)
}

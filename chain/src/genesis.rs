// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::account::{ADDRESS_LENGTH, PUBLIC_KEY_LENGTH};
use crate::error::ChainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Vec<u8>,
    pub balance: u64,
}

/// The application state at height zero. The thresholds and the pipe
/// account address are frozen once written; the lazy account-creation
/// policies carry no default and must be stated explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisState {
    pub accounts: Vec<GenesisAccount>,
    /// Uncompressed secp256k1 public keys of the trusted watchers.
    pub watchers: Vec<Vec<u8>>,
    pub verifiers: Vec<Vec<u8>>,
    pub redeemers: Vec<Vec<u8>>,
    pub watcher_threshold: u32,
    pub verifier_threshold: u32,
    pub redeemer_threshold: u32,
    pub pipe_account: Vec<u8>,
    pub create_account_on_deposit: bool,
    pub create_account_on_pipe_transfer: bool,
}

impl GenesisState {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.pipe_account.len() != ADDRESS_LENGTH {
            return Err(ChainError::MalformedGenesis(
                "pipe account address has invalid length".to_string(),
            ));
        }

        for account in &self.accounts {
            if account.address.len() != ADDRESS_LENGTH {
                return Err(ChainError::MalformedGenesis(format!(
                    "account address of length {}",
                    account.address.len()
                )));
            }
        }

        for key in self
            .watchers
            .iter()
            .chain(self.verifiers.iter())
            .chain(self.redeemers.iter())
        {
            if key.len() != PUBLIC_KEY_LENGTH {
                return Err(ChainError::MalformedGenesis(format!(
                    "trusted public key of length {}",
                    key.len()
                )));
            }
        }

        if self.watcher_threshold == 0 || self.watcher_threshold as usize > self.watchers.len() {
            return Err(ChainError::MalformedGenesis(
                "invalid watcher threshold".to_string(),
            ));
        }
        if self.verifier_threshold == 0 || self.verifier_threshold as usize > self.verifiers.len()
        {
            return Err(ChainError::MalformedGenesis(
                "invalid verifier threshold".to_string(),
            ));
        }
        if self.redeemer_threshold == 0 || self.redeemer_threshold as usize > self.redeemers.len()
        {
            return Err(ChainError::MalformedGenesis(
                "invalid redeemer threshold".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_json(raw: &str) -> Result<GenesisState, ChainError> {
        let genesis: GenesisState = serde_json::from_str(raw)
            .map_err(|err| ChainError::MalformedGenesis(err.to_string()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        serde_json::to_string_pretty(self).map_err(|err| ChainError::MalformedGenesis(err.to_string()))
    }
}

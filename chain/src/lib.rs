// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! The deterministic replicated state machine of the payment network:
//! account balances, nonce replay protection, credential issuance and
//! deposit flow, and the threshold-notification families filed by watchers,
//! verifiers and redeemers. Driven by an external BFT replicator that
//! delivers ordered transactions and distributes the emitted events.

pub use account::{
    keccak256, public_key_bytes, recover_address, sign_message, verify_signature, Address,
    ADDRESS_LENGTH, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH,
};
pub use app::{ChainApp, DeliverResponse, Event, QueryResponse};
pub use code::Code;
pub use error::ChainError;
pub use genesis::{GenesisAccount, GenesisState};

pub mod account;
pub mod app;
pub mod code;
pub mod constants;
pub mod error;
pub mod genesis;
pub mod transaction;

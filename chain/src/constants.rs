// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! System-wide constants: database key prefixes, event key prefixes and the
//! zeta status encoding. All prefixes are byte-exact ASCII literals; state
//! keys are formed as `prefix || payload`.

/// Number of bytes used for any nonce.
pub const NONCE_LENGTH: usize = 32;

/// Compressed G1 length of a zeta inside state keys.
pub const ZETA_LENGTH: usize = 48;

/// DEPRECATED: replaced by the zeta status entry. Read-only for backward
/// migration; never written.
pub const SPENT_ZETA_PREFIX: &[u8] = b"SpentZeta";

/// Prefix for each zeta in the database to indicate its status
/// (spent, being verified, unspent).
pub const ZETA_STATUS_PREFIX: &[u8] = b"ZetaStatus";

/// Prefix for storing public keys of trusted watchers.
pub const ETHEREUM_WATCHER_KEY_PREFIX: &[u8] = b"EthereumWatcher";

/// Prefix for storing public keys of trusted verifiers.
pub const CREDENTIAL_VERIFIER_KEY_PREFIX: &[u8] = b"CredentialVerifier";

/// Prefix for storing public keys of trusted redeemers.
pub const TOKEN_REDEEMER_KEY_PREFIX: &[u8] = b"TokenRedeemer";

/// Prefix for each account in the database holding its token balance.
pub const ACCOUNTS_PREFIX: &[u8] = b"account";

/// Prefix for each seen nonce in the database.
pub const SEEN_NONCE_PREFIX: &[u8] = b"NONCE";

/// Prefix of the event key emitted on a successful credential request.
pub const CREDENTIAL_REQUEST_KEY_PREFIX: &[u8] = b"GETCREDENTIAL";

/// Prefix of the event key emitted on a successful credential deposit.
pub const REDEEM_CREDENTIAL_REQUEST_KEY_PREFIX: &[u8] = b"REDEEMCREDENTIAL";

/// Prefix of the event key emitted on a successful token redemption request.
pub const REDEEM_TOKENS_REQUEST_KEY_PREFIX: &[u8] = b"REDEEMTOKENS";

/// Prefix marking that a given watcher already notified about a transfer.
pub const ETHEREUM_WATCHER_NOTIFICATION_PREFIX: &[u8] = b"HOLDTRANSFNOTIF";

/// Prefix marking that a given verifier already notified about a credential.
pub const CREDENTIAL_VERIFIER_NOTIFICATION_PREFIX: &[u8] = b"CREDVERIFNOTIF";

/// Prefix marking that a given redeemer already confirmed a redemption.
pub const TOKEN_REDEEMER_NOTIFICATION_PREFIX: &[u8] = b"TOKENREDNOTIF";

/// Prefix of the count of watchers confirming a given transfer.
pub const PIPE_ACCOUNT_TRANSFER_NOTIFICATION_COUNT_KEY_PREFIX: &[u8] = b"COUNT HODLTRANSFNOTIF";

/// Prefix of the count of verifiers accepting a given credential.
pub const CREDENTIAL_VERIFICATION_NOTIFICATION_COUNT_KEY_PREFIX: &[u8] = b"COUNT CREDVERIFNOTIF";

/// Prefix of the count of redeemers confirming a given redemption.
pub const TOKEN_REDEMPTION_NOTIFICATION_COUNT_KEY_PREFIX: &[u8] = b"COUNT TOKENREDNOTIF";

/// Key of the watcher threshold frozen at genesis.
pub const WATCHER_THRESHOLD_KEY: &[u8] = b"WatcherThreshold";

/// Key of the verifier threshold frozen at genesis.
pub const VERIFIER_THRESHOLD_KEY: &[u8] = b"VerifierThreshold";

/// Key of the redeemer threshold frozen at genesis.
pub const REDEEMER_THRESHOLD_KEY: &[u8] = b"RedeemerThreshold";

/// Key of the pipe account address frozen at genesis.
pub const PIPE_CONTRACT_KEY: &[u8] = b"PipeContractAddress";

pub fn prefix_key(prefix: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + payload.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(payload);
    key
}

/// Lifecycle of a double-spend tag. Unspent is never explicitly written to
/// the database; it is implied by the absence of an entry. The status only
/// ever advances: Unspent -> BeingVerified -> Spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZetaStatus {
    Unspent = 0,
    /// The provider was credited for the credential value.
    Spent = 1,
    /// A deposit request was filed but the verifiers have not reached
    /// consensus on the credential validity yet.
    BeingVerified = 2,
}

impl ZetaStatus {
    pub fn db_entry(self) -> [u8; 1] {
        [self as u8]
    }
}

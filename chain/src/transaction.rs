// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Transaction payloads and their signed constructors. A transaction on the
//! wire is a single type-tag byte followed by the protobuf payload; the
//! signed portion of every request is a fixed-order concatenation hashed
//! with Keccak-256 (protobuf encodings are not canonical and never signed).

use k256::ecdsa::SigningKey;
use prost::Message;
use rand::RngCore;

use opal_coconut::proto::{ProtoBlindSignMaterials, ProtoTumblerBlindVerifyMaterials};

use crate::account::{public_key_bytes, sign_message, Address};
use crate::constants::NONCE_LENGTH;
use crate::error::ChainError;

/// Transaction to check for presence of a zeta (debug lookup).
pub const TX_LOOKUP_ZETA: u8 = 0x01;
/// Transaction to create a new account.
pub const TX_NEW_ACCOUNT: u8 = 0x02;
/// Transaction to transfer funds between two accounts (debug only).
pub const TX_TRANSFER_BETWEEN_ACCOUNTS: u8 = 0x03;
/// Transaction to deposit a credential and credit the provider.
pub const TX_DEPOSIT_CREDENTIAL: u8 = 0xa0;
/// Watcher notification of a transfer into the pipe account observed on the
/// external chain.
pub const TX_TRANSFER_TO_PIPE_ACCOUNT_NOTIFICATION: u8 = 0xa1;
/// Client request to convert part of its balance into a credential.
pub const TX_CREDENTIAL_REQUEST: u8 = 0xa2;
/// Verifier notification about validity of a deposited credential.
pub const TX_CREDENTIAL_VERIFICATION_NOTIFICATION: u8 = 0xa3;
/// Client request to convert balance back into external-chain tokens.
pub const TX_TOKEN_REDEMPTION_REQUEST: u8 = 0xa4;
/// Redeemer confirmation of a token redemption request.
pub const TX_TOKEN_REDEMPTION_CONFIRMATION_NOTIFICATION: u8 = 0xa5;
/// Debug transaction forcing a block to be produced.
pub const TX_ADVANCE_BLOCK: u8 = 0xff;

pub fn generate_nonce() -> [u8; NONCE_LENGTH] {
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn marshal_request(request: &impl Message, prefix: u8) -> Vec<u8> {
    let body = request.encode_to_vec();
    let mut bytes = Vec::with_capacity(1 + body.len());
    bytes.push(prefix);
    bytes.extend_from_slice(&body);
    bytes
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct NewAccountRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub address: Vec<u8>,
    /// Application-defined authorisation credential; validated by a
    /// pluggable hook.
    #[prost(bytes = "vec", tag = "2")]
    pub credential: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct AccountTransferRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub source_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub target_address: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub amount: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct TransferToPipeAccountNotification {
    #[prost(bytes = "vec", tag = "1")]
    pub watcher_public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub client_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub pipe_account_address: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub amount: u64,
    /// Hash of the transfer transaction on the external chain.
    #[prost(bytes = "vec", tag = "5")]
    pub tx_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct CredentialRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub client_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub pipe_account_address: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub crypto_materials: Option<ProtoBlindSignMaterials>,
    #[prost(int64, tag = "4")]
    pub value: i64,
    #[prost(bytes = "vec", tag = "5")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct DepositCoconutCredentialRequest {
    #[prost(message, optional, tag = "1")]
    pub crypto_materials: Option<ProtoTumblerBlindVerifyMaterials>,
    #[prost(int64, tag = "2")]
    pub value: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub provider_address: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct CredentialVerificationNotification {
    #[prost(bytes = "vec", tag = "1")]
    pub verifier_public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub provider_address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub value: i64,
    #[prost(bytes = "vec", tag = "4")]
    pub zeta: Vec<u8>,
    #[prost(bool, tag = "5")]
    pub credential_validity: bool,
    #[prost(bytes = "vec", tag = "6")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct TokenRedemptionRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub user_address: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub amount: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct TokenRedemptionConfirmationNotification {
    #[prost(bytes = "vec", tag = "1")]
    pub redeemer_public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub user_address: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub amount: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub sig: Vec<u8>,
}

// message layouts signed below mirror the check-side reconstruction in the
// application exactly; both sides must agree byte for byte

pub(crate) fn new_account_message(address: &[u8], credential: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(address.len() + credential.len());
    msg.extend_from_slice(address);
    msg.extend_from_slice(credential);
    msg
}

pub(crate) fn transfer_message(
    source: &[u8],
    target: &[u8],
    amount: u64,
    nonce: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(source.len() + target.len() + 8 + nonce.len());
    msg.extend_from_slice(source);
    msg.extend_from_slice(target);
    msg.extend_from_slice(&amount.to_be_bytes());
    msg.extend_from_slice(nonce);
    msg
}

pub(crate) fn pipe_notification_message(
    watcher_public_key: &[u8],
    client_address: &[u8],
    pipe_account_address: &[u8],
    amount: u64,
    tx_hash: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(watcher_public_key);
    msg.extend_from_slice(client_address);
    msg.extend_from_slice(pipe_account_address);
    msg.extend_from_slice(&amount.to_be_bytes());
    msg.extend_from_slice(tx_hash);
    msg
}

pub(crate) fn credential_request_message(
    client_address: &[u8],
    pipe_account_address: &[u8],
    materials_bytes: &[u8],
    value: i64,
    nonce: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(client_address);
    msg.extend_from_slice(pipe_account_address);
    msg.extend_from_slice(materials_bytes);
    msg.extend_from_slice(&(value as u64).to_be_bytes());
    msg.extend_from_slice(nonce);
    msg
}

pub(crate) fn verification_notification_message(
    verifier_public_key: &[u8],
    provider_address: &[u8],
    value: i64,
    zeta: &[u8],
    credential_validity: bool,
) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(verifier_public_key);
    msg.extend_from_slice(provider_address);
    msg.extend_from_slice(&(value as u64).to_be_bytes());
    msg.extend_from_slice(zeta);
    msg.push(credential_validity as u8);
    msg
}

pub(crate) fn redemption_message(user_address: &[u8], amount: u64, nonce: &[u8]) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(user_address);
    msg.extend_from_slice(&amount.to_be_bytes());
    msg.extend_from_slice(nonce);
    msg
}

pub(crate) fn redemption_confirmation_message(
    redeemer_public_key: &[u8],
    user_address: &[u8],
    amount: u64,
    nonce: &[u8],
) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(redeemer_public_key);
    msg.extend_from_slice(user_address);
    msg.extend_from_slice(&amount.to_be_bytes());
    msg.extend_from_slice(nonce);
    msg
}

/// Creates a signed new-account transaction for the key's own address.
pub fn create_new_account_request(
    signing_key: &SigningKey,
    credential: Vec<u8>,
) -> Result<Vec<u8>, ChainError> {
    let address = Address::from_signing_key(signing_key);
    let msg = new_account_message(address.as_bytes(), &credential);
    let sig = sign_message(signing_key, &msg)?;

    let request = NewAccountRequest {
        address: address.to_vec(),
        credential,
        sig,
    };
    Ok(marshal_request(&request, TX_NEW_ACCOUNT))
}

/// Creates a signed transfer between two accounts. Debug-only on the
/// application side.
pub fn create_new_transfer_request(
    source_key: &SigningKey,
    target_address: Address,
    amount: u64,
) -> Result<Vec<u8>, ChainError> {
    let nonce = generate_nonce();
    let source_address = Address::from_signing_key(source_key);

    let msg = transfer_message(
        source_address.as_bytes(),
        target_address.as_bytes(),
        amount,
        &nonce,
    );
    let sig = sign_message(source_key, &msg)?;

    let request = AccountTransferRequest {
        source_address: source_address.to_vec(),
        target_address: target_address.to_vec(),
        amount,
        nonce: nonce.to_vec(),
        sig,
    };
    Ok(marshal_request(&request, TX_TRANSFER_BETWEEN_ACCOUNTS))
}

pub fn create_new_pipe_transfer_notification(
    watcher_key: &SigningKey,
    client_address: Address,
    pipe_account_address: Address,
    amount: u64,
    tx_hash: [u8; 32],
) -> Result<Vec<u8>, ChainError> {
    let watcher_public_key = public_key_bytes(watcher_key);

    let msg = pipe_notification_message(
        &watcher_public_key,
        client_address.as_bytes(),
        pipe_account_address.as_bytes(),
        amount,
        &tx_hash,
    );
    let sig = sign_message(watcher_key, &msg)?;

    let request = TransferToPipeAccountNotification {
        watcher_public_key,
        client_address: client_address.to_vec(),
        pipe_account_address: pipe_account_address.to_vec(),
        amount,
        tx_hash: tx_hash.to_vec(),
        sig,
    };
    Ok(marshal_request(&request, TX_TRANSFER_TO_PIPE_ACCOUNT_NOTIFICATION))
}

pub fn create_new_credential_request(
    signing_key: &SigningKey,
    pipe_account_address: Address,
    crypto_materials: ProtoBlindSignMaterials,
    value: i64,
) -> Result<Vec<u8>, ChainError> {
    if value <= 0 {
        return Err(ChainError::InvalidValue(value));
    }

    let nonce = generate_nonce();
    let client_address = Address::from_signing_key(signing_key);
    let materials_bytes = crypto_materials.one_way_to_bytes()?;

    let msg = credential_request_message(
        client_address.as_bytes(),
        pipe_account_address.as_bytes(),
        &materials_bytes,
        value,
        &nonce,
    );
    let sig = sign_message(signing_key, &msg)?;

    let request = CredentialRequest {
        client_address: client_address.to_vec(),
        pipe_account_address: pipe_account_address.to_vec(),
        crypto_materials: Some(crypto_materials),
        value,
        nonce: nonce.to_vec(),
        sig,
    };
    Ok(marshal_request(&request, TX_CREDENTIAL_REQUEST))
}

/// Deposit requests are unsigned: possession of a valid showing bound to
/// the provider address is the authorisation.
pub fn create_new_deposit_credential_request(
    crypto_materials: ProtoTumblerBlindVerifyMaterials,
    value: i64,
    provider_address: Address,
) -> Vec<u8> {
    let request = DepositCoconutCredentialRequest {
        crypto_materials: Some(crypto_materials),
        value,
        provider_address: provider_address.to_vec(),
    };
    marshal_request(&request, TX_DEPOSIT_CREDENTIAL)
}

pub fn create_new_credential_verification_notification(
    verifier_key: &SigningKey,
    provider_address: Address,
    value: i64,
    zeta: Vec<u8>,
    credential_validity: bool,
) -> Result<Vec<u8>, ChainError> {
    let verifier_public_key = public_key_bytes(verifier_key);

    let msg = verification_notification_message(
        &verifier_public_key,
        provider_address.as_bytes(),
        value,
        &zeta,
        credential_validity,
    );
    let sig = sign_message(verifier_key, &msg)?;

    let request = CredentialVerificationNotification {
        verifier_public_key,
        provider_address: provider_address.to_vec(),
        value,
        zeta,
        credential_validity,
        sig,
    };
    Ok(marshal_request(&request, TX_CREDENTIAL_VERIFICATION_NOTIFICATION))
}

pub fn create_new_token_redemption_request(
    signing_key: &SigningKey,
    amount: u64,
) -> Result<Vec<u8>, ChainError> {
    let nonce = generate_nonce();
    let user_address = Address::from_signing_key(signing_key);

    let msg = redemption_message(user_address.as_bytes(), amount, &nonce);
    let sig = sign_message(signing_key, &msg)?;

    let request = TokenRedemptionRequest {
        user_address: user_address.to_vec(),
        amount,
        nonce: nonce.to_vec(),
        sig,
    };
    Ok(marshal_request(&request, TX_TOKEN_REDEMPTION_REQUEST))
}

pub fn create_new_token_redemption_confirmation_notification(
    redeemer_key: &SigningKey,
    user_address: Address,
    amount: u64,
    nonce: Vec<u8>,
) -> Result<Vec<u8>, ChainError> {
    let redeemer_public_key = public_key_bytes(redeemer_key);

    let msg = redemption_confirmation_message(
        &redeemer_public_key,
        user_address.as_bytes(),
        amount,
        &nonce,
    );
    let sig = sign_message(redeemer_key, &msg)?;

    let request = TokenRedemptionConfirmationNotification {
        redeemer_public_key,
        user_address: user_address.to_vec(),
        amount,
        nonce,
        sig,
    };
    Ok(marshal_request(
        &request,
        TX_TOKEN_REDEMPTION_CONFIRMATION_NOTIFICATION,
    ))
}

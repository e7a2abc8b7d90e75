// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-only transaction validation. Deliver re-runs these checks before
//! mutating anything, so every rule here is enforced on both paths.

use log::info;
use prost::Message;

use opal_coconut::proto::{self, BlindSignMaterials, TumblerBlindVerifyMaterials};

use crate::account::{recover_address, verify_signature, Address, ADDRESS_LENGTH};
use crate::code::Code;
use crate::constants::ZetaStatus;
use crate::transaction::{
    self, AccountTransferRequest, CredentialRequest, CredentialVerificationNotification,
    DepositCoconutCredentialRequest, NewAccountRequest, TokenRedemptionConfirmationNotification,
    TokenRedemptionRequest, TransferToPipeAccountNotification,
};

use super::ChainApp;

impl ChainApp {
    pub(super) fn validate_transfer(
        &self,
        source_address: &[u8],
        target_address: &[u8],
        amount: u64,
    ) -> Code {
        if source_address.len() != ADDRESS_LENGTH || target_address.len() != ADDRESS_LENGTH {
            return Code::MalformedAddress;
        }
        // nothing would happen on a self transfer anyway, so reject it
        if source_address == target_address {
            return Code::SelfTransfer;
        }

        let Some(source_balance) = self.state.retrieve_account_balance(source_address) else {
            return Code::AccountDoesNotExist;
        };
        if source_balance < amount {
            return Code::InsufficientBalance;
        }
        if !self.state.check_if_account_exists(target_address) {
            return Code::AccountDoesNotExist;
        }

        Code::Ok
    }

    pub(super) fn check_new_account_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = NewAccountRequest::decode(tx) else {
            info!("failed to unmarshal the request");
            return Code::InvalidTxParams;
        };

        if req.address.len() != ADDRESS_LENGTH {
            return Code::InvalidTxParams;
        }

        if !(self.verify_account_credential)(&req.credential) {
            info!("failed to verify the authorising credential");
            return Code::InvalidCredential;
        }

        let msg = transaction::new_account_message(&req.address, &req.credential);
        match recover_address(&msg, &req.sig) {
            Ok(recovered) if recovered.as_bytes() == req.address => Code::Ok,
            Ok(_) => {
                info!("failed to verify signature on the request");
                Code::InvalidSignature
            }
            Err(_) => {
                info!("could not recover the public key out of the signature");
                Code::InvalidSignature
            }
        }
    }

    pub(super) fn check_transfer_between_accounts_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = AccountTransferRequest::decode(tx) else {
            info!("failed to unmarshal the request");
            return Code::InvalidTxParams;
        };

        if self.state.check_nonce(&req.nonce, &req.source_address) {
            return Code::ReplayAttackAttempt;
        }

        let transfer_code =
            self.validate_transfer(&req.source_address, &req.target_address, req.amount);
        if !transfer_code.is_ok() {
            return transfer_code;
        }

        let msg = transaction::transfer_message(
            &req.source_address,
            &req.target_address,
            req.amount,
            &req.nonce,
        );
        match recover_address(&msg, &req.sig) {
            Ok(recovered) if recovered.as_bytes() == req.source_address => Code::Ok,
            _ => {
                info!("failed to verify signature on the request");
                Code::InvalidSignature
            }
        }
    }

    pub(super) fn check_pipe_transfer_notification_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = TransferToPipeAccountNotification::decode(tx) else {
            info!("failed to unmarshal the request");
            return Code::InvalidTxParams;
        };

        // was the threshold already reached and the transfer committed?
        if self.state.get_pipe_transfer_notification_count(&req.tx_hash)
            >= self.state.watcher_threshold
        {
            info!("already reached the required threshold");
            return Code::AlreadyCommitted;
        }

        if !self.state.check_watcher_key(&req.watcher_public_key) {
            info!("this watcher is not in the trusted set");
            return Code::EthereumWatcherDoesNotExist;
        }

        if req.client_address.len() != ADDRESS_LENGTH {
            info!("client's address is malformed");
            return Code::MalformedAddress;
        }

        if self.state.pipe_account.as_bytes() != req.pipe_account_address.as_slice() {
            info!("the specified pipe account is different from the expected one");
            return Code::InvalidPipeAccount;
        }

        let msg = transaction::pipe_notification_message(
            &req.watcher_public_key,
            &req.client_address,
            &req.pipe_account_address,
            req.amount,
            &req.tx_hash,
        );
        if !verify_signature(&req.watcher_public_key, &msg, &req.sig) {
            info!("the signature on the message is invalid");
            return Code::InvalidSignature;
        }

        if self
            .state
            .check_watcher_notification(&req.watcher_public_key, &req.tx_hash)
        {
            info!("this watcher already sent this notification before");
            return Code::AlreadyConfirmed;
        }

        Code::Ok
    }

    pub(super) fn check_credential_request_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = CredentialRequest::decode(tx) else {
            return Code::InvalidTxParams;
        };

        match self.state.retrieve_account_balance(&req.client_address) {
            Some(balance) if balance >= req.value as u64 => {}
            _ => return Code::InsufficientBalance,
        }

        if !opal_token::validate_value(req.value) {
            return Code::InvalidValue;
        }

        let Some(materials) = &req.crypto_materials else {
            return Code::InvalidTxParams;
        };

        // the first public attribute must encode the claimed value
        if !proto::first_public_attribute_matches_value(&materials.pub_m, req.value as u64) {
            return Code::InvalidTxParams;
        }

        // check that the data can actually be recovered
        if BlindSignMaterials::try_from_proto(materials).is_err() {
            return Code::InvalidTxParams;
        }

        let Ok(materials_bytes) = materials.one_way_to_bytes() else {
            return Code::InvalidTxParams;
        };

        if self.state.check_nonce(&req.nonce, &req.client_address) {
            return Code::ReplayAttackAttempt;
        }

        let msg = transaction::credential_request_message(
            &req.client_address,
            self.state.pipe_account.as_bytes(),
            &materials_bytes,
            req.value,
            &req.nonce,
        );
        match recover_address(&msg, &req.sig) {
            Ok(recovered) if recovered.as_bytes() == req.client_address => Code::Ok,
            _ => {
                info!("failed to verify signature on the request");
                Code::InvalidSignature
            }
        }
    }

    // not much can be checked before actually initiating the deposit
    pub(super) fn check_deposit_credential_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = DepositCoconutCredentialRequest::decode(tx) else {
            return Code::InvalidTxParams;
        };

        if req.provider_address.len() != ADDRESS_LENGTH {
            return Code::InvalidMerchantAddress;
        }

        if !self.state.check_if_account_exists(&req.provider_address)
            && !self.state.create_account_on_deposit
        {
            info!("provider's account does not exist");
            return Code::MerchantDoesNotExist;
        }

        let Some(materials) = &req.crypto_materials else {
            return Code::InvalidTxParams;
        };

        // a zeta that was deposited before (or is being verified right now)
        // cannot be deposited again
        if !self.state.check_if_zeta_is_unspent(materials.zeta_bytes()) {
            return Code::DoubleSpendingAttempt;
        }

        if TumblerBlindVerifyMaterials::try_from_proto(materials).is_err() {
            return Code::InvalidTxParams;
        }

        Code::Ok
    }

    pub(super) fn check_credential_verification_notification_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = CredentialVerificationNotification::decode(tx) else {
            info!("failed to unmarshal the request");
            return Code::InvalidTxParams;
        };

        if self
            .state
            .get_credential_verification_count(&req.zeta, req.value)
            >= self.state.verifier_threshold
        {
            info!("already reached the required threshold");
            return Code::AlreadyCommitted;
        }

        if !self.state.check_verifier_key(&req.verifier_public_key) {
            info!("this verifier is not in the trusted set");
            return Code::CredentialVerifierDoesNotExist;
        }

        if req.provider_address.len() != ADDRESS_LENGTH {
            info!("provider's address is malformed");
            return Code::MalformedAddress;
        }

        // being-verified implies the zeta wasn't spent before and that a
        // deposit was actually requested
        if self.state.check_zeta_status(&req.zeta) != ZetaStatus::BeingVerified {
            info!("invalid zeta status");
            return Code::InvalidZetaStatus;
        }

        let msg = transaction::verification_notification_message(
            &req.verifier_public_key,
            &req.provider_address,
            req.value,
            &req.zeta,
            req.credential_validity,
        );
        if !verify_signature(&req.verifier_public_key, &msg, &req.sig) {
            info!("the signature on the message is invalid");
            return Code::InvalidSignature;
        }

        if self
            .state
            .check_verifier_notification(&req.verifier_public_key, &req.zeta, req.value)
        {
            info!("this verifier already sent this notification before");
            return Code::AlreadyConfirmed;
        }

        Code::Ok
    }

    pub(super) fn check_token_redemption_request_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = TokenRedemptionRequest::decode(tx) else {
            info!("failed to unmarshal the request");
            return Code::InvalidTxParams;
        };

        match self.state.retrieve_account_balance(&req.user_address) {
            Some(balance) if balance >= req.amount => {}
            _ => return Code::InsufficientBalance,
        }

        if self.state.check_nonce(&req.nonce, &req.user_address) {
            return Code::ReplayAttackAttempt;
        }

        let msg = transaction::redemption_message(&req.user_address, req.amount, &req.nonce);
        match recover_address(&msg, &req.sig) {
            Ok(recovered) if recovered.as_bytes() == req.user_address => Code::Ok,
            _ => {
                info!("failed to verify signature on the request");
                Code::InvalidSignature
            }
        }
    }

    pub(super) fn check_token_redemption_confirmation_tx(&self, tx: &[u8]) -> Code {
        let Ok(req) = TokenRedemptionConfirmationNotification::decode(tx) else {
            info!("failed to unmarshal the request");
            return Code::InvalidTxParams;
        };

        if Address::try_from_slice(&req.user_address).is_err() {
            info!("user's address is malformed");
            return Code::MalformedAddress;
        }

        if self
            .state
            .get_token_redemption_count(&req.user_address, &req.nonce, req.amount)
            >= self.state.redeemer_threshold
        {
            info!("already reached the required threshold");
            return Code::AlreadyCommitted;
        }

        if !self.state.check_redeemer_key(&req.redeemer_public_key) {
            info!("this redeemer is not in the trusted set");
            return Code::TokenRedeemerDoesNotExist;
        }

        let msg = transaction::redemption_confirmation_message(
            &req.redeemer_public_key,
            &req.user_address,
            req.amount,
            &req.nonce,
        );
        if !verify_signature(&req.redeemer_public_key, &msg, &req.sig) {
            info!("the signature on the message is invalid");
            return Code::InvalidSignature;
        }

        if self.state.check_redeemer_notification(
            &req.redeemer_public_key,
            &req.user_address,
            &req.nonce,
            req.amount,
        ) {
            info!("this redeemer already sent this notification before");
            return Code::AlreadyConfirmed;
        }

        Code::Ok
    }
}

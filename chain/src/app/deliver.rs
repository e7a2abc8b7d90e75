// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! State-mutating transaction execution. Every handler re-runs the
//! corresponding check first; the mutation only happens when it passed.

use log::{debug, error, info};
use prost::Message;

use crate::account::ADDRESS_LENGTH;
use crate::code::Code;
use crate::constants::{self, prefix_key, ZetaStatus};
use crate::transaction::{
    AccountTransferRequest, CredentialRequest, CredentialVerificationNotification,
    DepositCoconutCredentialRequest, NewAccountRequest, TokenRedemptionConfirmationNotification,
    TokenRedemptionRequest, TransferToPipeAccountNotification,
};

use super::{ChainApp, DeliverResponse, Event};

impl ChainApp {
    pub(super) fn create_new_account(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = NewAccountRequest::decode(tx) else {
            info!("failed to unmarshal the request");
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_new_account_tx(tx);
        if !check_result.is_ok() {
            info!("create new account failed the check");
            return DeliverResponse::from_code(check_result);
        }

        // the check guarantees the recovered address matches the sent one
        if self.state.create_new_account_op(&req.address) {
            DeliverResponse::from_code(Code::Ok)
        } else {
            DeliverResponse::from_code(Code::Unknown)
        }
    }

    // currently, and possibly permanently, only available for setting up
    // testing scenarios
    pub(super) fn transfer_funds(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = AccountTransferRequest::decode(tx) else {
            info!("failed to unmarshal the request");
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_transfer_between_accounts_tx(tx);
        if !check_result.is_ok() {
            info!("transfer funds failed the check");
            return DeliverResponse::from_code(check_result);
        }

        let code = self
            .state
            .transfer_funds_op(&req.source_address, &req.target_address, req.amount);
        if code.is_ok() {
            self.state.set_nonce(&req.nonce, &req.source_address);
        }
        DeliverResponse::from_code(code)
    }

    pub(super) fn handle_pipe_transfer_notification(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = TransferToPipeAccountNotification::decode(tx) else {
            info!("failed to unmarshal the request");
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_pipe_transfer_notification_tx(tx);
        if !check_result.is_ok() {
            info!("pipe transfer notification failed the check");
            return DeliverResponse::from_code(check_result);
        }

        // accept the notification
        let new_count = self
            .state
            .store_watcher_notification(&req.watcher_public_key, &req.tx_hash);

        debug!(
            "reached {new_count} notifications out of required {} for {:02x?}",
            self.state.watcher_threshold, req.tx_hash
        );

        // commit the transfer once the threshold is reached exactly
        if new_count == self.state.watcher_threshold {
            let current_balance = match self.state.retrieve_account_balance(&req.client_address) {
                Some(balance) => balance,
                None => {
                    if !self.state.create_account_on_pipe_transfer {
                        info!("client's account does not exist and the system is not set to create new ones");
                        return DeliverResponse::from_code(Code::AccountDoesNotExist);
                    }
                    if !self.state.create_new_account_op(&req.client_address) {
                        error!("failed to create an account for the client");
                        return DeliverResponse::from_code(Code::Unknown);
                    }
                    0
                }
            };

            self.state
                .set_account_balance(&req.client_address, current_balance + req.amount);
        }

        DeliverResponse::from_code(Code::Ok)
    }

    /// Authorises the client to obtain a credential: burns the value from
    /// its account and emits the crypto materials for the issuers to
    /// observe and countersign.
    pub(super) fn handle_credential_request(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = CredentialRequest::decode(tx) else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_credential_request_tx(tx);
        if !check_result.is_ok() {
            info!("credential request failed the check");
            return DeliverResponse::from_code(check_result);
        }

        // the check guarantees the materials are present and well-formed
        let Some(materials) = &req.crypto_materials else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };
        let materials_bytes = materials.marshal();

        if let Err(code) = self
            .state
            .decrease_balance_by(&req.client_address, req.value as u64)
        {
            // unreachable after a successful check, but don't let an
            // inconsistency corrupt the ledger
            error!(
                "undefined behaviour when trying to decrease the client's balance: {}",
                code
            );
            return DeliverResponse::from_code(code);
        }

        self.state.set_nonce(&req.nonce, &req.client_address);

        // the key carries the client address and gamma so that a client
        // performing multiple requests per block can still index the result;
        // gamma is unique per request
        let mut key = Vec::with_capacity(
            constants::CREDENTIAL_REQUEST_KEY_PREFIX.len()
                + ADDRESS_LENGTH
                + materials.gamma_bytes().len(),
        );
        key.extend_from_slice(constants::CREDENTIAL_REQUEST_KEY_PREFIX);
        key.extend_from_slice(&req.client_address);
        key.extend_from_slice(materials.gamma_bytes());

        DeliverResponse {
            code: Code::Ok,
            data: Vec::new(),
            events: vec![Event {
                key,
                value: materials_bytes,
            }],
        }
    }

    pub(super) fn handle_deposit_credential(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = DepositCoconutCredentialRequest::decode(tx) else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_deposit_credential_tx(tx);
        if !check_result.is_ok() {
            info!("deposit credential failed the check");
            return DeliverResponse::from_code(check_result);
        }

        if !self.state.check_if_account_exists(&req.provider_address) {
            // the check only passes for a missing account when the system
            // is set to lazily create it
            if !self.state.create_new_account_op(&req.provider_address) {
                error!("could not create an account for the provider");
                return DeliverResponse::from_code(Code::InvalidMerchantAddress);
            }
            debug!("created a new account for the provider");
        }

        // the check guarantees the materials are present
        let Some(materials) = &req.crypto_materials else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };
        let zeta = materials.zeta_bytes().to_vec();
        let materials_bytes = materials.marshal();

        debug!(
            "deposit request from address {:02x?}, zeta {:02x?}",
            req.provider_address, zeta
        );

        self.state
            .set_zeta_status(&zeta, ZetaStatus::BeingVerified, &[]);

        // [PREFIX || PROVIDER || uint64(VALUE) || ZETA] - the verifiers need
        // a unique key to later confirm the status of exactly this deposit
        let mut key = Vec::with_capacity(
            constants::REDEEM_CREDENTIAL_REQUEST_KEY_PREFIX.len() + ADDRESS_LENGTH + 8 + zeta.len(),
        );
        key.extend_from_slice(constants::REDEEM_CREDENTIAL_REQUEST_KEY_PREFIX);
        key.extend_from_slice(&req.provider_address);
        key.extend_from_slice(&(req.value as u64).to_be_bytes());
        key.extend_from_slice(&zeta);

        DeliverResponse {
            code: Code::Ok,
            data: Vec::new(),
            events: vec![Event {
                key,
                value: materials_bytes,
            }],
        }
    }

    pub(super) fn handle_credential_verification_notification(
        &mut self,
        tx: &[u8],
    ) -> DeliverResponse {
        let Ok(req) = CredentialVerificationNotification::decode(tx) else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_credential_verification_notification_tx(tx);
        if !check_result.is_ok() {
            info!("credential verification notification failed the check");
            return DeliverResponse::from_code(check_result);
        }

        // accept the vote; only votes for a valid credential move the count
        let new_count = self.state.store_verifier_notification(
            &req.verifier_public_key,
            &req.zeta,
            req.value,
            req.credential_validity,
        );

        debug!(
            "reached {new_count} notifications out of required {} for zeta {:02x?} (value {})",
            self.state.verifier_threshold, req.zeta, req.value
        );

        if req.credential_validity && new_count == self.state.verifier_threshold {
            let current_balance = match self.state.retrieve_account_balance(&req.provider_address)
            {
                Some(balance) => balance,
                None => {
                    // it should exist as the provider had to request the
                    // deposit, but double check anyway
                    if !self.state.create_account_on_deposit {
                        info!("provider's account does not exist and the system is not set to create new ones");
                        return DeliverResponse::from_code(Code::AccountDoesNotExist);
                    }
                    if !self.state.create_new_account_op(&req.provider_address) {
                        error!("failed to create an account for the provider");
                        return DeliverResponse::from_code(Code::Unknown);
                    }
                    0
                }
            };

            self.state
                .set_account_balance(&req.provider_address, current_balance + req.value as u64);

            info!(
                "marking zeta {:02x?} as spent; provider {:02x?} was credited {}",
                req.zeta, req.provider_address, req.value
            );
            self.state
                .set_zeta_status(&req.zeta, ZetaStatus::Spent, &req.provider_address);
        }

        DeliverResponse::from_code(Code::Ok)
    }

    pub(super) fn handle_token_redemption(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = TokenRedemptionRequest::decode(tx) else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_token_redemption_request_tx(tx);
        if !check_result.is_ok() {
            info!("token redemption failed the check");
            return DeliverResponse::from_code(check_result);
        }

        if let Err(code) = self.state.decrease_balance_by(&req.user_address, req.amount) {
            error!(
                "undefined behaviour when trying to decrease the user's balance: {}",
                code
            );
            return DeliverResponse::from_code(code);
        }
        self.state.set_nonce(&req.nonce, &req.user_address);

        // [PREFIX || USER || uint64(AMOUNT) || NONCE] - just enough for the
        // redeemers to identify this particular request
        let mut key = Vec::with_capacity(
            constants::REDEEM_TOKENS_REQUEST_KEY_PREFIX.len()
                + ADDRESS_LENGTH
                + 8
                + req.nonce.len(),
        );
        key.extend_from_slice(constants::REDEEM_TOKENS_REQUEST_KEY_PREFIX);
        key.extend_from_slice(&req.user_address);
        key.extend_from_slice(&req.amount.to_be_bytes());
        key.extend_from_slice(&req.nonce);

        DeliverResponse {
            code: Code::Ok,
            data: Vec::new(),
            events: vec![Event {
                key,
                value: Vec::new(),
            }],
        }
    }

    pub(super) fn handle_token_redemption_confirmation(&mut self, tx: &[u8]) -> DeliverResponse {
        let Ok(req) = TokenRedemptionConfirmationNotification::decode(tx) else {
            return DeliverResponse::from_code(Code::InvalidTxParams);
        };

        let check_result = self.check_token_redemption_confirmation_tx(tx);
        if !check_result.is_ok() {
            // thrown in particular when the threshold was already reached;
            // that is fine, it only ensures a single redeemer talks to the
            // external chain
            info!("token redemption confirmation failed the check");
            return DeliverResponse::from_code(check_result);
        }

        let new_count = self.state.store_redeemer_notification(
            &req.redeemer_public_key,
            &req.user_address,
            &req.nonce,
            req.amount,
        );

        debug!(
            "reached {new_count} notifications out of required {} for user {:02x?}, amount {}",
            self.state.redeemer_threshold, req.user_address, req.amount
        );

        // the response data lets the redeemer whose notification was the
        // threshold-th elect itself to call the external chain
        let mut data = Vec::with_capacity(8);
        data.extend_from_slice(&self.state.redeemer_threshold.to_be_bytes());
        data.extend_from_slice(&new_count.to_be_bytes());

        DeliverResponse {
            code: Code::Ok,
            data,
            events: Vec::new(),
        }
    }

    /// Debug lookup of the legacy spent flag, kept for old tooling.
    pub(super) fn handle_lookup_zeta(&mut self, tx: &[u8]) -> DeliverResponse {
        if tx.len() != constants::ZETA_LENGTH {
            return DeliverResponse::from_code(Code::InvalidTxLength);
        }

        let spent = self.state.check_zeta_status(tx) == ZetaStatus::Spent;
        DeliverResponse {
            code: Code::Ok,
            data: vec![spent as u8],
            events: Vec::new(),
        }
    }

    /// Debug no-op whose only purpose is forcing the chain to produce a
    /// block.
    pub(super) fn advance_block(&mut self) -> DeliverResponse {
        // store a marker so that the state (and therefore the block hash)
        // actually changes
        let marker_key = prefix_key(b"advanceblock", &self.state.store.version().to_be_bytes());
        self.state.store.set(marker_key, vec![1]);
        DeliverResponse::from_code(Code::Ok)
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use log::debug;

use crate::code::Code;
use crate::error::ChainError;
use crate::genesis::GenesisState;
use crate::transaction::{
    TX_ADVANCE_BLOCK, TX_CREDENTIAL_REQUEST, TX_CREDENTIAL_VERIFICATION_NOTIFICATION,
    TX_DEPOSIT_CREDENTIAL, TX_LOOKUP_ZETA, TX_NEW_ACCOUNT, TX_TOKEN_REDEMPTION_CONFIRMATION_NOTIFICATION,
    TX_TOKEN_REDEMPTION_REQUEST, TX_TRANSFER_BETWEEN_ACCOUNTS,
    TX_TRANSFER_TO_PIPE_ACCOUNT_NOTIFICATION,
};

mod check;
mod deliver;
mod query;
mod state;

pub use query::{QUERY_ACCOUNT_EXISTS, QUERY_BALANCE, QUERY_FULL_ZETA_STATUS, QUERY_ZETA_STATUS};

use state::State;

/// Key/value pair attached to a delivered transaction; the way data leaves
/// the state machine towards the monitoring services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverResponse {
    pub code: Code,
    pub data: Vec<u8>,
    pub events: Vec<Event>,
}

impl DeliverResponse {
    pub fn from_code(code: Code) -> DeliverResponse {
        DeliverResponse {
            code,
            data: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub code: Code,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Hook deciding whether an account-creation credential is acceptable.
/// The current deployment accepts everything; the hook exists so a real
/// authorisation policy can be plugged in without touching the handlers.
pub type AccountCredentialHook = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// The replicated application: a deterministic transaction processor over
/// the versioned state store. The consensus engine feeds it ordered
/// transactions; emitted events reach the issuers, verifiers and redeemers
/// through their chain monitors.
pub struct ChainApp {
    pub(crate) state: State,
    pub(crate) verify_account_credential: AccountCredentialHook,
}

impl ChainApp {
    pub fn new(genesis: &GenesisState) -> Result<ChainApp, ChainError> {
        let state = State::from_genesis(genesis)?;
        Ok(ChainApp {
            state,
            verify_account_credential: Box::new(|_| true),
        })
    }

    #[must_use]
    pub fn with_account_credential_hook(mut self, hook: AccountCredentialHook) -> ChainApp {
        self.verify_account_credential = hook;
        self
    }

    /// Stateless-with-respect-to-mutation validation; used by the mempool
    /// to cheaply drop transactions that cannot possibly apply.
    pub fn check_tx(&self, tx: &[u8]) -> Code {
        let Some((&tag, payload)) = tx.split_first() else {
            return Code::InvalidTxLength;
        };

        match tag {
            TX_LOOKUP_ZETA => {
                if payload.len() == crate::constants::ZETA_LENGTH {
                    Code::Ok
                } else {
                    Code::InvalidTxLength
                }
            }
            TX_NEW_ACCOUNT => self.check_new_account_tx(payload),
            TX_TRANSFER_BETWEEN_ACCOUNTS => self.check_transfer_between_accounts_tx(payload),
            TX_DEPOSIT_CREDENTIAL => self.check_deposit_credential_tx(payload),
            TX_TRANSFER_TO_PIPE_ACCOUNT_NOTIFICATION => {
                self.check_pipe_transfer_notification_tx(payload)
            }
            TX_CREDENTIAL_REQUEST => self.check_credential_request_tx(payload),
            TX_CREDENTIAL_VERIFICATION_NOTIFICATION => {
                self.check_credential_verification_notification_tx(payload)
            }
            TX_TOKEN_REDEMPTION_REQUEST => self.check_token_redemption_request_tx(payload),
            TX_TOKEN_REDEMPTION_CONFIRMATION_NOTIFICATION => {
                self.check_token_redemption_confirmation_tx(payload)
            }
            TX_ADVANCE_BLOCK => Code::Ok,
            _ => Code::UndefinedTx,
        }
    }

    /// Executes a committed transaction against the working state.
    pub fn deliver_tx(&mut self, tx: &[u8]) -> DeliverResponse {
        let Some((&tag, payload)) = tx.split_first() else {
            return DeliverResponse::from_code(Code::InvalidTxLength);
        };

        debug!("delivering a transaction with tag {tag:#04x}");

        match tag {
            TX_LOOKUP_ZETA => self.handle_lookup_zeta(payload),
            TX_NEW_ACCOUNT => self.create_new_account(payload),
            TX_TRANSFER_BETWEEN_ACCOUNTS => self.transfer_funds(payload),
            TX_DEPOSIT_CREDENTIAL => self.handle_deposit_credential(payload),
            TX_TRANSFER_TO_PIPE_ACCOUNT_NOTIFICATION => {
                self.handle_pipe_transfer_notification(payload)
            }
            TX_CREDENTIAL_REQUEST => self.handle_credential_request(payload),
            TX_CREDENTIAL_VERIFICATION_NOTIFICATION => {
                self.handle_credential_verification_notification(payload)
            }
            TX_TOKEN_REDEMPTION_REQUEST => self.handle_token_redemption(payload),
            TX_TOKEN_REDEMPTION_CONFIRMATION_NOTIFICATION => {
                self.handle_token_redemption_confirmation(payload)
            }
            TX_ADVANCE_BLOCK => self.advance_block(),
            _ => DeliverResponse::from_code(Code::UndefinedTx),
        }
    }

    pub fn query(&self, path: &str, data: &[u8]) -> QueryResponse {
        match path {
            QUERY_BALANCE => self.query_account_balance(data),
            QUERY_ZETA_STATUS => self.query_zeta_spent(data),
            QUERY_FULL_ZETA_STATUS => self.query_full_zeta_status(data),
            QUERY_ACCOUNT_EXISTS => self.query_account_exists(data),
            _ => QueryResponse {
                code: Code::InvalidQueryParams,
                key: data.to_vec(),
                value: Vec::new(),
            },
        }
    }

    /// Freezes the working state into the next version, returning its
    /// deterministic hash and the version number.
    pub fn commit(&mut self) -> ([u8; 32], u64) {
        self.state.store.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{public_key_bytes, Address};
    use crate::constants::ZetaStatus;
    use crate::genesis::{GenesisAccount, GenesisState};
    use crate::transaction::{
        create_new_credential_verification_notification, create_new_deposit_credential_request,
        create_new_pipe_transfer_notification, create_new_token_redemption_confirmation_notification,
        create_new_token_redemption_request, create_new_transfer_request, generate_nonce,
    };
    use k256::ecdsa::SigningKey;
    use opal_coconut::proto::{ProtoThetaTumbler, ProtoTumblerBlindVerifyMaterials};
    use prost::Message;
    use rand::rngs::OsRng;

    fn dummy_tumbler_materials(params: &opal_coconut::Parameters) -> ProtoTumblerBlindVerifyMaterials {
        // structurally valid materials; the state machine itself never runs
        // the pairing checks, the verifiers do
        let keypair = opal_coconut::keygen(params);
        let elgamal_keypair = opal_coconut::elgamal_keygen(params);
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = vec![opal_coconut::Attribute::from(5u64)];

        let lambda = opal_coconut::prepare_blind_sign(
            params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();
        let blinded = opal_coconut::blind_sign(
            params,
            keypair.secret_key(),
            elgamal_keypair.public_key(),
            &lambda,
            &public_attributes,
        )
        .unwrap();
        let signature = blinded.unblind(elgamal_keypair.private_key());

        let theta = opal_coconut::prove_credential_tumbler(
            params,
            keypair.verification_key(),
            &signature,
            &private_attributes,
            &[5u8; 20],
        )
        .unwrap();

        opal_coconut::proto::TumblerBlindVerifyMaterials::new(
            signature,
            public_attributes,
            theta,
        )
        .to_proto()
    }

    struct Fixture {
        app: ChainApp,
        watcher_keys: Vec<SigningKey>,
        verifier_keys: Vec<SigningKey>,
        redeemer_keys: Vec<SigningKey>,
        client_key: SigningKey,
        client: Address,
        provider: Address,
        pipe: Address,
    }

    fn fixture() -> Fixture {
        let watcher_keys = (0..3).map(|_| SigningKey::random(&mut OsRng)).collect::<Vec<_>>();
        let verifier_keys = (0..3).map(|_| SigningKey::random(&mut OsRng)).collect::<Vec<_>>();
        let redeemer_keys = (0..2).map(|_| SigningKey::random(&mut OsRng)).collect::<Vec<_>>();

        let client_key = SigningKey::random(&mut OsRng);
        let client = Address::from_signing_key(&client_key);
        let provider = Address::new([0xBB; 20]);
        let pipe = Address::new([0xEE; 20]);

        let genesis = GenesisState {
            accounts: vec![
                GenesisAccount {
                    address: client.to_vec(),
                    balance: 1000,
                },
                GenesisAccount {
                    address: provider.to_vec(),
                    balance: 0,
                },
            ],
            watchers: watcher_keys.iter().map(public_key_bytes).collect(),
            verifiers: verifier_keys.iter().map(public_key_bytes).collect(),
            redeemers: redeemer_keys.iter().map(public_key_bytes).collect(),
            watcher_threshold: 3,
            verifier_threshold: 2,
            redeemer_threshold: 2,
            pipe_account: pipe.to_vec(),
            create_account_on_deposit: true,
            create_account_on_pipe_transfer: true,
        };

        Fixture {
            app: ChainApp::new(&genesis).unwrap(),
            watcher_keys,
            verifier_keys,
            redeemer_keys,
            client_key,
            client,
            provider,
            pipe,
        }
    }

    fn balance(app: &ChainApp, address: Address) -> u64 {
        let response = app.query(QUERY_BALANCE, address.as_bytes());
        assert_eq!(Code::Ok, response.code);
        u64::from_be_bytes(response.value.try_into().unwrap())
    }

    #[test]
    fn unknown_tag_is_undefined_tx() {
        let mut f = fixture();
        assert_eq!(Code::UndefinedTx, f.app.check_tx(&[0x77, 1, 2, 3]));
        assert_eq!(
            Code::UndefinedTx,
            f.app.deliver_tx(&[0x77, 1, 2, 3]).code
        );
    }

    #[test]
    fn empty_tx_is_invalid_length() {
        let f = fixture();
        assert_eq!(Code::InvalidTxLength, f.app.check_tx(&[]));
    }

    #[test]
    fn transfer_and_replay() {
        let mut f = fixture();
        let target = f.provider;

        let tx = create_new_transfer_request(&f.client_key, target, 1).unwrap();

        // first submission passes
        assert_eq!(Code::Ok, f.app.check_tx(&tx));
        assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);

        // an exact replay is rejected and the state stays unchanged
        assert_eq!(Code::ReplayAttackAttempt, f.app.check_tx(&tx));
        assert_eq!(Code::ReplayAttackAttempt, f.app.deliver_tx(&tx).code);

        assert_eq!(999, balance(&f.app, f.client));
        assert_eq!(1, balance(&f.app, target));
    }

    #[test]
    fn self_transfer_is_rejected() {
        let mut f = fixture();
        let tx = create_new_transfer_request(&f.client_key, f.client, 1).unwrap();
        assert_eq!(Code::SelfTransfer, f.app.deliver_tx(&tx).code);
    }

    #[test]
    fn transfer_with_insufficient_balance_is_rejected() {
        let mut f = fixture();
        let tx = create_new_transfer_request(&f.client_key, f.provider, 100000).unwrap();
        assert_eq!(Code::InsufficientBalance, f.app.deliver_tx(&tx).code);
    }

    #[test]
    fn watcher_threshold_commits_exactly_once() {
        let mut f = fixture();
        // a fresh client unknown to the chain; the account is created lazily
        let new_client = Address::new([0x42; 20]);
        let tx_hash = [9u8; 32];

        for (i, watcher_key) in f.watcher_keys.iter().enumerate() {
            let tx = create_new_pipe_transfer_notification(
                watcher_key,
                new_client,
                f.pipe,
                150,
                tx_hash,
            )
            .unwrap();

            assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code, "watcher {i}");

            if i < 2 {
                // below the threshold nothing is credited yet
                assert_eq!(
                    Code::AccountDoesNotExist,
                    f.app.query(QUERY_BALANCE, new_client.as_bytes()).code
                );
            }
        }

        assert_eq!(150, balance(&f.app, new_client));

        // a fourth notification (same watcher again) arrives after commit
        let tx = create_new_pipe_transfer_notification(
            &f.watcher_keys[0],
            new_client,
            f.pipe,
            150,
            tx_hash,
        )
        .unwrap();
        assert_eq!(Code::AlreadyCommitted, f.app.deliver_tx(&tx).code);

        // and the balance did not move again
        assert_eq!(150, balance(&f.app, new_client));
    }

    #[test]
    fn watcher_must_be_trusted_and_pipe_must_match() {
        let mut f = fixture();
        let stranger = SigningKey::random(&mut OsRng);

        let tx = create_new_pipe_transfer_notification(
            &stranger,
            f.client,
            f.pipe,
            10,
            [1u8; 32],
        )
        .unwrap();
        assert_eq!(Code::EthereumWatcherDoesNotExist, f.app.deliver_tx(&tx).code);

        let wrong_pipe = Address::new([0x99; 20]);
        let tx = create_new_pipe_transfer_notification(
            &f.watcher_keys[0],
            f.client,
            wrong_pipe,
            10,
            [1u8; 32],
        )
        .unwrap();
        assert_eq!(Code::InvalidPipeAccount, f.app.deliver_tx(&tx).code);
    }

    #[test]
    fn same_watcher_cannot_notify_twice() {
        let mut f = fixture();
        let tx_hash = [7u8; 32];

        let tx = create_new_pipe_transfer_notification(
            &f.watcher_keys[0],
            f.client,
            f.pipe,
            10,
            tx_hash,
        )
        .unwrap();
        assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);
        assert_eq!(Code::AlreadyConfirmed, f.app.deliver_tx(&tx).code);
    }

    #[test]
    fn deposit_and_double_spend() {
        let mut f = fixture();
        let params = opal_coconut::Parameters::new(3).unwrap();
        let materials = dummy_tumbler_materials(&params);
        let zeta = materials.zeta_bytes().to_vec();

        let deposit = create_new_deposit_credential_request(materials.clone(), 5, f.provider);
        assert_eq!(Code::Ok, f.app.check_tx(&deposit));
        let response = f.app.deliver_tx(&deposit);
        assert_eq!(Code::Ok, response.code);
        assert_eq!(1, response.events.len());
        assert!(response.events[0]
            .key
            .starts_with(crate::constants::REDEEM_CREDENTIAL_REQUEST_KEY_PREFIX));

        // while being verified, re-depositing the same zeta is double spend
        let other_provider = Address::new([0xCC; 20]);
        let second = create_new_deposit_credential_request(materials.clone(), 5, other_provider);
        assert_eq!(Code::DoubleSpendingAttempt, f.app.check_tx(&second));

        // verifiers accept the credential; at the threshold (2) the provider
        // is credited and the zeta becomes spent
        for (i, verifier_key) in f.verifier_keys.iter().take(2).enumerate() {
            let tx = create_new_credential_verification_notification(
                verifier_key,
                f.provider,
                5,
                zeta.clone(),
                true,
            )
            .unwrap();
            assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code, "verifier {i}");
        }

        assert_eq!(5, balance(&f.app, f.provider));

        let status = f.app.query(QUERY_FULL_ZETA_STATUS, &zeta);
        assert_eq!(ZetaStatus::Spent as u8, status.value[0]);
        assert_eq!(f.provider.as_bytes(), &status.value[1..]);

        // spent zeta - a deposit at another provider is a double spend
        assert_eq!(Code::DoubleSpendingAttempt, f.app.check_tx(&second));

        // the legacy query also reports it as spent now
        let legacy = f.app.query(QUERY_ZETA_STATUS, &zeta);
        assert_eq!(vec![1u8], legacy.value);
    }

    #[test]
    fn invalid_verifier_votes_do_not_count() {
        let mut f = fixture();
        let params = opal_coconut::Parameters::new(3).unwrap();
        let materials = dummy_tumbler_materials(&params);
        let zeta = materials.zeta_bytes().to_vec();

        let deposit = create_new_deposit_credential_request(materials, 5, f.provider);
        assert_eq!(Code::Ok, f.app.deliver_tx(&deposit).code);

        // two invalid votes, then one valid - the threshold of 2 is not met
        for verifier_key in f.verifier_keys.iter().take(2) {
            let tx = create_new_credential_verification_notification(
                verifier_key,
                f.provider,
                5,
                zeta.clone(),
                false,
            )
            .unwrap();
            assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);
        }
        let tx = create_new_credential_verification_notification(
            &f.verifier_keys[2],
            f.provider,
            5,
            zeta.clone(),
            true,
        )
        .unwrap();
        assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);

        assert_eq!(0, balance(&f.app, f.provider));
        assert_eq!(
            ZetaStatus::BeingVerified as u8,
            f.app.query(QUERY_FULL_ZETA_STATUS, &zeta).value[0]
        );
    }

    #[test]
    fn verification_notification_requires_pending_deposit() {
        let mut f = fixture();

        // no deposit was ever filed for this zeta
        let tx = create_new_credential_verification_notification(
            &f.verifier_keys[0],
            f.provider,
            5,
            vec![3u8; 48],
            true,
        )
        .unwrap();
        assert_eq!(Code::InvalidZetaStatus, f.app.deliver_tx(&tx).code);
    }

    #[test]
    fn token_redemption_flow() {
        let mut f = fixture();

        let request = create_new_token_redemption_request(&f.client_key, 100).unwrap();
        let response = f.app.deliver_tx(&request);
        assert_eq!(Code::Ok, response.code);
        assert_eq!(900, balance(&f.app, f.client));

        // recover the nonce from the emitted event key:
        // [PREFIX || USER || uint64(AMOUNT) || NONCE]
        let key = &response.events[0].key;
        let prefix_len = crate::constants::REDEEM_TOKENS_REQUEST_KEY_PREFIX.len();
        let nonce = key[prefix_len + 20 + 8..].to_vec();

        let first = create_new_token_redemption_confirmation_notification(
            &f.redeemer_keys[0],
            f.client,
            100,
            nonce.clone(),
        )
        .unwrap();
        let response = f.app.deliver_tx(&first);
        assert_eq!(Code::Ok, response.code);
        assert_eq!(2u32.to_be_bytes().to_vec(), response.data[..4].to_vec());
        assert_eq!(1u32.to_be_bytes().to_vec(), response.data[4..].to_vec());

        let second = create_new_token_redemption_confirmation_notification(
            &f.redeemer_keys[1],
            f.client,
            100,
            nonce.clone(),
        )
        .unwrap();
        let response = f.app.deliver_tx(&second);
        assert_eq!(Code::Ok, response.code);
        // count == threshold: this redeemer is elected to call the external chain
        assert_eq!(2u32.to_be_bytes().to_vec(), response.data[4..].to_vec());

        // any further confirmation is rejected
        let replay = create_new_token_redemption_confirmation_notification(
            &f.redeemer_keys[0],
            f.client,
            100,
            nonce,
        )
        .unwrap();
        assert_eq!(Code::AlreadyCommitted, f.app.deliver_tx(&replay).code);
    }

    #[test]
    fn redemption_request_replay_is_rejected() {
        let mut f = fixture();
        let nonce = generate_nonce();

        // hand-build two identical requests sharing a nonce
        let msg = crate::transaction::redemption_message(f.client.as_bytes(), 50, &nonce);
        let sig = crate::account::sign_message(&f.client_key, &msg).unwrap();
        let req = crate::transaction::TokenRedemptionRequest {
            user_address: f.client.to_vec(),
            amount: 50,
            nonce: nonce.to_vec(),
            sig,
        };
        let mut tx = vec![crate::transaction::TX_TOKEN_REDEMPTION_REQUEST];
        tx.extend_from_slice(&req.encode_to_vec());

        assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);
        assert_eq!(Code::ReplayAttackAttempt, f.app.deliver_tx(&tx).code);
        assert_eq!(950, balance(&f.app, f.client));
    }

    #[test]
    fn credential_request_burns_value_and_emits_materials() {
        let mut f = fixture();
        let params = opal_coconut::Parameters::new(3).unwrap();

        let elgamal_keypair = opal_coconut::elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = vec![opal_coconut::Attribute::from(5u64)];
        let lambda = opal_coconut::prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();
        let materials = opal_coconut::proto::BlindSignMaterials::new(
            lambda,
            *elgamal_keypair.public_key(),
            public_attributes,
        )
        .to_proto();

        let tx = crate::transaction::create_new_credential_request(
            &f.client_key,
            f.pipe,
            materials.clone(),
            5,
        )
        .unwrap();

        assert_eq!(Code::Ok, f.app.check_tx(&tx));
        let response = f.app.deliver_tx(&tx);
        assert_eq!(Code::Ok, response.code);

        // the value left the account
        assert_eq!(995, balance(&f.app, f.client));

        // the event key is [GETCREDENTIAL || CLIENT || GAMMA] and the value
        // carries the marshalled materials for the issuers
        let event = &response.events[0];
        let mut expected_key =
            crate::constants::CREDENTIAL_REQUEST_KEY_PREFIX.to_vec();
        expected_key.extend_from_slice(f.client.as_bytes());
        expected_key.extend_from_slice(materials.gamma_bytes());
        assert_eq!(expected_key, event.key);

        let recovered =
            opal_coconut::proto::ProtoBlindSignMaterials::unmarshal(&event.value).unwrap();
        assert_eq!(materials, recovered);

        // a replay of the same request is caught by the nonce
        assert_eq!(Code::ReplayAttackAttempt, f.app.deliver_tx(&tx).code);
    }

    #[test]
    fn credential_request_value_must_match_the_first_public_attribute() {
        let mut f = fixture();
        let params = opal_coconut::Parameters::new(3).unwrap();

        let elgamal_keypair = opal_coconut::elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(2);
        // the attribute encodes 10 while the request claims 5
        let public_attributes = vec![opal_coconut::Attribute::from(10u64)];
        let lambda = opal_coconut::prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();
        let materials = opal_coconut::proto::BlindSignMaterials::new(
            lambda,
            *elgamal_keypair.public_key(),
            public_attributes,
        )
        .to_proto();

        let tx = crate::transaction::create_new_credential_request(
            &f.client_key,
            f.pipe,
            materials,
            5,
        )
        .unwrap();

        assert_eq!(Code::InvalidTxParams, f.app.deliver_tx(&tx).code);
        assert_eq!(1000, balance(&f.app, f.client));
    }

    #[test]
    fn credential_request_rejects_disallowed_values() {
        let mut f = fixture();
        let params = opal_coconut::Parameters::new(3).unwrap();

        let elgamal_keypair = opal_coconut::elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = vec![opal_coconut::Attribute::from(3u64)];
        let lambda = opal_coconut::prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();
        let materials = opal_coconut::proto::BlindSignMaterials::new(
            lambda,
            *elgamal_keypair.public_key(),
            public_attributes,
        )
        .to_proto();

        // 3 is not an allowed denomination
        let tx = crate::transaction::create_new_credential_request(
            &f.client_key,
            f.pipe,
            materials,
            3,
        )
        .unwrap();

        assert_eq!(Code::InvalidValue, f.app.check_tx(&tx));
    }

    #[test]
    fn value_flow_is_conserved_across_the_whole_cycle() {
        let mut f = fixture();
        let params = opal_coconut::Parameters::new(3).unwrap();

        // 1. the watchers credit a pipe transfer of 100 to the client
        for watcher_key in &f.watcher_keys {
            let tx = create_new_pipe_transfer_notification(
                watcher_key,
                f.client,
                f.pipe,
                100,
                [3u8; 32],
            )
            .unwrap();
            assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);
        }
        assert_eq!(1100, balance(&f.app, f.client));

        // 2. the client converts 5 into a credential (burned from balance)
        let elgamal_keypair = opal_coconut::elgamal_keygen(&params);
        let private_attributes = params.n_random_scalars(2);
        let public_attributes = vec![opal_coconut::Attribute::from(5u64)];
        let lambda = opal_coconut::prepare_blind_sign(
            &params,
            elgamal_keypair.public_key(),
            &private_attributes,
            &public_attributes,
        )
        .unwrap();
        let request_materials = opal_coconut::proto::BlindSignMaterials::new(
            lambda,
            *elgamal_keypair.public_key(),
            public_attributes,
        )
        .to_proto();
        let tx = crate::transaction::create_new_credential_request(
            &f.client_key,
            f.pipe,
            request_materials,
            5,
        )
        .unwrap();
        assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);
        assert_eq!(1095, balance(&f.app, f.client));

        // 3. the provider deposits a credential of value 5 and the
        // verifiers confirm it
        let deposit_materials = dummy_tumbler_materials(&params);
        let zeta = deposit_materials.zeta_bytes().to_vec();
        let deposit = create_new_deposit_credential_request(deposit_materials, 5, f.provider);
        assert_eq!(Code::Ok, f.app.deliver_tx(&deposit).code);
        for verifier_key in f.verifier_keys.iter().take(2) {
            let tx = create_new_credential_verification_notification(
                verifier_key,
                f.provider,
                5,
                zeta.clone(),
                true,
            )
            .unwrap();
            assert_eq!(Code::Ok, f.app.deliver_tx(&tx).code);
        }
        assert_eq!(5, balance(&f.app, f.provider));

        // 4. the client redeems 95 back to the external chain
        let redemption = create_new_token_redemption_request(&f.client_key, 95).unwrap();
        assert_eq!(Code::Ok, f.app.deliver_tx(&redemption).code);
        assert_eq!(1000, balance(&f.app, f.client));

        // net ledger movement: +100 (watcher-committed inflow) - 5 (burned
        // into a credential) + 5 (credential deposited) - 95 (outflow)
        let total = balance(&f.app, f.client) + balance(&f.app, f.provider);
        assert_eq!(1000 + 100 - 5 + 5 - 95, total);
    }

    #[test]
    fn identical_state_commits_to_identical_hash() {
        let mut f = fixture();

        let (h1, v1) = f.app.commit();
        // overwrite an account with its identical balance
        f.app.state.set_account_balance(f.client.as_bytes(), 1000);
        let (h2, v2) = f.app.commit();

        assert_eq!(h1, h2);
        assert_eq!(v1 + 1, v2);
    }

    #[test]
    fn malformed_deposit_materials_are_rejected() {
        let mut f = fixture();

        let materials = ProtoTumblerBlindVerifyMaterials {
            sig: vec![1, 2, 3],
            pub_m: vec![],
            theta: Some(ProtoThetaTumbler::default()),
        };
        let deposit = create_new_deposit_credential_request(materials, 5, f.provider);
        assert_eq!(Code::InvalidTxParams, f.app.deliver_tx(&deposit).code);
    }
}

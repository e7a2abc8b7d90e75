// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use log::debug;

use crate::code::Code;
use crate::constants::ZetaStatus;

use super::{ChainApp, QueryResponse};

pub const QUERY_BALANCE: &str = "/balance";
/// DEPRECATED: use [`QUERY_FULL_ZETA_STATUS`] instead.
pub const QUERY_ZETA_STATUS: &str = "/ZetaStatus";
pub const QUERY_FULL_ZETA_STATUS: &str = "/FullZetaStatus";
pub const QUERY_ACCOUNT_EXISTS: &str = "/accountExists";

impl ChainApp {
    pub(super) fn query_account_balance(&self, data: &[u8]) -> QueryResponse {
        match self.state.retrieve_account_balance(data) {
            Some(balance) => QueryResponse {
                code: Code::Ok,
                key: data.to_vec(),
                value: balance.to_be_bytes().to_vec(),
            },
            None => QueryResponse {
                code: Code::AccountDoesNotExist,
                key: data.to_vec(),
                value: Vec::new(),
            },
        }
    }

    /// Legacy single-byte spent flag.
    pub(super) fn query_zeta_spent(&self, data: &[u8]) -> QueryResponse {
        let is_spent = self.state.check_zeta_status(data) == ZetaStatus::Spent;
        debug!("zeta {data:02x?} is spent: {is_spent}");
        QueryResponse {
            code: Code::Ok,
            key: data.to_vec(),
            value: vec![is_spent as u8],
        }
    }

    /// Status byte plus, for a spent zeta, the credited address.
    pub(super) fn query_full_zeta_status(&self, data: &[u8]) -> QueryResponse {
        let status = self.state.full_zeta_status(data);
        debug!("zeta {data:02x?} status: {status:02x?}");
        QueryResponse {
            code: Code::Ok,
            key: data.to_vec(),
            value: status,
        }
    }

    pub(super) fn query_account_exists(&self, data: &[u8]) -> QueryResponse {
        QueryResponse {
            code: Code::Ok,
            key: data.to_vec(),
            value: vec![self.state.check_if_account_exists(data) as u8],
        }
    }
}

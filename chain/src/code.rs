// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

/// Return codes of the state machine. Codes are represented as u32 with 0
/// reserved for a success, as the consensus layer requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Code {
    Ok = 0,
    Unknown = 1,
    InvalidTxLength = 2,
    InvalidTxParams = 3,
    InvalidQueryParams = 4,
    AccountDoesNotExist = 5,
    InsufficientBalance = 6,
    InvalidCredential = 7,
    InvalidSignature = 8,
    InvalidMerchantAddress = 9,
    /// Only applicable if the system is set to not create accounts for
    /// non-existent merchants.
    MerchantDoesNotExist = 10,
    IssuingAuthorityDoesNotExist = 11,
    MalformedAddress = 12,
    DoubleSpendingAttempt = 13,
    SelfTransfer = 14,
    ReplayAttackAttempt = 15,
    UndefinedTx = 16,
    EthereumWatcherDoesNotExist = 17,
    /// Some entity, like a watcher, sent the same event confirmation more
    /// than once.
    AlreadyConfirmed = 18,
    MalformedPublicKey = 19,
    /// A notification arrived after the threshold number of them was
    /// already committed.
    AlreadyCommitted = 20,
    InvalidPipeAccount = 21,
    InvalidValue = 22,
    CredentialVerifierDoesNotExist = 23,
    InvalidZetaStatus = 24,
    TokenRedeemerDoesNotExist = 25,
    CouldNotTransfer = 100,
}

impl Code {
    pub fn to_str(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Unknown => "Unknown",
            Code::InvalidTxLength => "Invalid Tx Length",
            Code::InvalidTxParams => "Invalid Tx Params",
            Code::InvalidQueryParams => "Invalid Query Params",
            Code::AccountDoesNotExist => "Account Does Not Exist",
            Code::InsufficientBalance => "Insufficient Balance",
            Code::InvalidCredential => "Invalid Credential",
            Code::InvalidSignature => "Invalid Signature",
            Code::InvalidMerchantAddress => "Invalid Merchant Address",
            Code::MerchantDoesNotExist => "Merchant Does Not Exist",
            Code::IssuingAuthorityDoesNotExist => "Issuing Authority Does Not Exist",
            Code::MalformedAddress => "Malformed Address",
            Code::DoubleSpendingAttempt => "Double Spending Attempt",
            Code::SelfTransfer => "Self Transfer",
            Code::ReplayAttackAttempt => "Replay Attack Attempt",
            Code::UndefinedTx => "Undefined Tx",
            Code::EthereumWatcherDoesNotExist => "Ethereum Watcher Does Not Exist",
            Code::AlreadyConfirmed => "Already Confirmed",
            Code::MalformedPublicKey => "Malformed Public Key",
            Code::AlreadyCommitted => "Already Committed",
            Code::InvalidPipeAccount => "Invalid Pipe Account",
            Code::InvalidValue => "Invalid Value",
            Code::CredentialVerifierDoesNotExist => "Credential Verifier Does Not Exist",
            Code::InvalidZetaStatus => "Invalid Zeta Status",
            Code::TokenRedeemerDoesNotExist => "Token Redeemer Does Not Exist",
            Code::CouldNotTransfer => "Could Not Perform Transfer",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Code::Ok
    }
}

impl From<Code> for u32 {
    fn from(code: Code) -> u32 {
        code as u32
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

//! Command types exchanged with issuing authorities and providers over the
//! framed TCP path, plus the internal command-queue request wrapper the
//! services use to feed their worker pools.

use prost::Message;
use tokio::sync::oneshot;

use crate::packet::Packet;
use crate::CommError;

/// Identifiers of the commands understood by the servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    GetVerificationKey = 100,
    Sign = 101,
    Verify = 102,
    BlindSign = 103,
    BlindVerify = 104,
    SpendCredential = 129,
    LookUpCredential = 130,
    LookUpBlockCredentials = 131,
    CredentialVerification = 132,
}

impl TryFrom<u8> for CommandId {
    type Error = CommError;

    fn try_from(id: u8) -> Result<CommandId, CommError> {
        match id {
            100 => Ok(CommandId::GetVerificationKey),
            101 => Ok(CommandId::Sign),
            102 => Ok(CommandId::Verify),
            103 => Ok(CommandId::BlindSign),
            104 => Ok(CommandId::BlindVerify),
            129 => Ok(CommandId::SpendCredential),
            130 => Ok(CommandId::LookUpCredential),
            131 => Ok(CommandId::LookUpBlockCredentials),
            132 => Ok(CommandId::CredentialVerification),
            other => Err(CommError::UnknownCommandId(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    Unknown = 1,
    InvalidCommand = 2,
    InvalidArguments = 3,
    ProcessingError = 4,
    NotImplemented = 5,
    Unavailable = 6,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl Status {
    pub fn ok() -> Status {
        Status {
            code: StatusCode::Ok as i32,
            message: String::new(),
        }
    }

    pub fn error(code: StatusCode, message: impl Into<String>) -> Status {
        Status {
            code: code as i32,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok as i32
    }
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct VerificationKeyRequest {}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct VerificationKeyResponse {
    /// Flat encoding of the verification key.
    #[prost(bytes = "vec", tag = "1")]
    pub vk: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub issuer_id: u64,
    #[prost(message, optional, tag = "3")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct SignRequest {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub pub_m: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct SignResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub sig: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub issuer_id: u64,
    #[prost(message, optional, tag = "3")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct VerifyRequest {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub pub_m: Vec<Vec<u8>>,
    #[prost(bytes = "vec", tag = "2")]
    pub sig: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct VerifyResponse {
    #[prost(bool, tag = "1")]
    pub is_valid: bool,
    #[prost(message, optional, tag = "2")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct BlindSignRequest {
    /// Flat encoding of the blind-sign request (lambda).
    #[prost(bytes = "vec", tag = "1")]
    pub lambda: Vec<u8>,
    /// Compressed ElGamal gamma.
    #[prost(bytes = "vec", tag = "2")]
    pub eg_pub: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub pub_m: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct BlindSignResponse {
    /// Flat encoding of the blinded signature.
    #[prost(bytes = "vec", tag = "1")]
    pub sig: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub issuer_id: u64,
    #[prost(message, optional, tag = "3")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct BlindVerifyRequest {
    /// Flat encoding of the showing (theta).
    #[prost(bytes = "vec", tag = "1")]
    pub theta: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub pub_m: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct BlindVerifyResponse {
    #[prost(bool, tag = "1")]
    pub is_valid: bool,
    #[prost(message, optional, tag = "2")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct CredentialPair {
    #[prost(int64, tag = "1")]
    pub height: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub gamma: Vec<u8>,
    /// Flat encoding of the issued blinded signature.
    #[prost(bytes = "vec", tag = "3")]
    pub credential: Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub issuer_id: u64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct LookUpCredentialRequest {
    #[prost(int64, tag = "1")]
    pub height: i64,
    #[prost(bytes = "vec", tag = "2")]
    pub gamma: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct LookUpCredentialResponse {
    #[prost(message, optional, tag = "1")]
    pub credential_pair: Option<CredentialPair>,
    #[prost(message, optional, tag = "2")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct LookUpBlockCredentialsRequest {
    #[prost(int64, tag = "1")]
    pub height: i64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct LookUpBlockCredentialsResponse {
    #[prost(message, repeated, tag = "1")]
    pub credentials: Vec<CredentialPair>,
    #[prost(message, optional, tag = "2")]
    pub status: Option<Status>,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct SpendCredentialRequest {
    /// Marshalled tumbler verify materials.
    #[prost(bytes = "vec", tag = "1")]
    pub materials: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub provider_address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub value: i64,
}

#[derive(Clone, PartialEq, Eq, Message)]
pub struct SpendCredentialResponse {
    #[prost(bool, tag = "1")]
    pub was_successful: bool,
    #[prost(message, optional, tag = "2")]
    pub status: Option<Status>,
}

/// Internal command of a verifier: check validity of deposited credential
/// materials and notify the chain of the outcome.
#[derive(Clone, PartialEq, Eq, Message)]
pub struct CredentialVerificationRequest {
    /// Marshalled tumbler verify materials.
    #[prost(bytes = "vec", tag = "1")]
    pub materials: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub bound_address: Vec<u8>,
    #[prost(int64, tag = "3")]
    pub value: i64,
}

/// A parsed command together with its id.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetVerificationKey(VerificationKeyRequest),
    Sign(SignRequest),
    Verify(VerifyRequest),
    BlindSign(BlindSignRequest),
    BlindVerify(BlindVerifyRequest),
    SpendCredential(SpendCredentialRequest),
    LookUpCredential(LookUpCredentialRequest),
    LookUpBlockCredentials(LookUpBlockCredentialsRequest),
    CredentialVerification(CredentialVerificationRequest),
}

impl Command {
    pub fn id(&self) -> CommandId {
        match self {
            Command::GetVerificationKey(_) => CommandId::GetVerificationKey,
            Command::Sign(_) => CommandId::Sign,
            Command::Verify(_) => CommandId::Verify,
            Command::BlindSign(_) => CommandId::BlindSign,
            Command::BlindVerify(_) => CommandId::BlindVerify,
            Command::SpendCredential(_) => CommandId::SpendCredential,
            Command::LookUpCredential(_) => CommandId::LookUpCredential,
            Command::LookUpBlockCredentials(_) => CommandId::LookUpBlockCredentials,
            Command::CredentialVerification(_) => CommandId::CredentialVerification,
        }
    }

    fn body_bytes(&self) -> Vec<u8> {
        match self {
            Command::GetVerificationKey(request) => request.encode_to_vec(),
            Command::Sign(request) => request.encode_to_vec(),
            Command::Verify(request) => request.encode_to_vec(),
            Command::BlindSign(request) => request.encode_to_vec(),
            Command::BlindVerify(request) => request.encode_to_vec(),
            Command::SpendCredential(request) => request.encode_to_vec(),
            Command::LookUpCredential(request) => request.encode_to_vec(),
            Command::LookUpBlockCredentials(request) => request.encode_to_vec(),
            Command::CredentialVerification(request) => request.encode_to_vec(),
        }
    }

    /// Serialises the command into the framed-packet bytes sent down a TCP
    /// socket: length prefix, command id, protobuf body.
    pub fn to_marshalled_packet(&self) -> Vec<u8> {
        let body = self.body_bytes();
        let mut payload = Vec::with_capacity(1 + body.len());
        payload.push(self.id() as u8);
        payload.extend_from_slice(&body);
        Packet::new(payload).to_bytes()
    }

    /// Recovers a command from a packet payload (command id byte + body).
    pub fn from_bytes(bytes: &[u8]) -> Result<Command, CommError> {
        let Some((&id, body)) = bytes.split_first() else {
            return Err(CommError::EmptyPacket);
        };

        let command = match CommandId::try_from(id)? {
            CommandId::GetVerificationKey => {
                Command::GetVerificationKey(VerificationKeyRequest::decode(body)?)
            }
            CommandId::Sign => Command::Sign(SignRequest::decode(body)?),
            CommandId::Verify => Command::Verify(VerifyRequest::decode(body)?),
            CommandId::BlindSign => Command::BlindSign(BlindSignRequest::decode(body)?),
            CommandId::BlindVerify => Command::BlindVerify(BlindVerifyRequest::decode(body)?),
            CommandId::SpendCredential => {
                Command::SpendCredential(SpendCredentialRequest::decode(body)?)
            }
            CommandId::LookUpCredential => {
                Command::LookUpCredential(LookUpCredentialRequest::decode(body)?)
            }
            CommandId::LookUpBlockCredentials => {
                Command::LookUpBlockCredentials(LookUpBlockCredentialsRequest::decode(body)?)
            }
            CommandId::CredentialVerification => {
                Command::CredentialVerification(CredentialVerificationRequest::decode(body)?)
            }
        };

        Ok(command)
    }
}

/// Outcome of an internally-queued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    BlindSign {
        blinded_signature: Vec<u8>,
        issuer_id: u64,
    },
    CredentialVerification {
        accepted: bool,
    },
    Error {
        message: String,
    },
}

/// A command placed on a service's internal queue together with the channel
/// its result is delivered on.
#[derive(Debug)]
pub struct CommandRequest {
    pub command: Command,
    pub response_tx: oneshot::Sender<CommandResponse>,
}

impl CommandRequest {
    pub fn new(command: Command) -> (CommandRequest, oneshot::Receiver<CommandResponse>) {
        let (response_tx, response_rx) = oneshot::channel();
        (
            CommandRequest {
                command,
                response_tx,
            },
            response_rx,
        )
    }
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

pub mod commands;
pub mod fanout;
pub mod packet;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("received packet of size {size} exceeding the {max} limit")]
    PacketTooLarge { size: usize, max: usize },

    #[error("received an empty packet")]
    EmptyPacket,

    #[error("unknown command id: {0}")]
    UnknownCommandId(u8),

    #[error("malformed command payload: {0}")]
    MalformedCommand(#[from] prost::DecodeError),

    #[error("received {received} valid responses while {required} are required")]
    InsufficientResponses { received: usize, required: usize },
}

// Copyright 2024 - Opal contributors
// SPDX-License-Identifier: Apache-2.0

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::CommError;

/// Upper bound on a single packet; well above any credential material yet
/// low enough to not let a broken peer allocate without limit.
pub const MAX_PACKET_SIZE: usize = 1 << 20;

/// Length-delimited frame exchanged over the legacy TCP path:
/// u32 big-endian payload length followed by the payload
/// (command id byte + protobuf body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Packet {
        Packet { payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.payload.len());
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), CommError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_from<R>(reader: &mut R) -> Result<Packet, CommError>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes).await?;
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len == 0 {
            return Err(CommError::EmptyPacket);
        }
        if len > MAX_PACKET_SIZE {
            return Err(CommError::PacketTooLarge {
                size: len,
                max: MAX_PACKET_SIZE,
            });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;

        Ok(Packet { payload })
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message framing and request/reply over TCP.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use crate::error::ConsensusError;
use crate::message::Message;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Upper bound on a single frame. Snapshot transfers are the largest
/// messages; anything bigger than this is a protocol violation.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Read one framed message.
pub async fn read_frame<R>(reader: &mut R) -> Result<Message, ConsensusError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ConsensusError::Transport(format!("read frame length: {e}")))?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(ConsensusError::Transport(format!("frame too large: {len} bytes")));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| ConsensusError::Transport(format!("read frame payload: {e}")))?;

    Ok(serde_json::from_slice(&payload)?)
}

/// Write one framed message.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<(), ConsensusError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(msg)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(ConsensusError::Transport(format!("frame too large: {len} bytes")));
    }

    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| ConsensusError::Transport(format!("write frame length: {e}")))?;
    writer
        .write_all(&payload)
        .await
        .map_err(|e| ConsensusError::Transport(format!("write frame payload: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ConsensusError::Transport(format!("flush frame: {e}")))?;
    Ok(())
}

/// Connect, send one message, and await its reply.
pub async fn request(
    addr: &str,
    msg: &Message,
    timeout: Duration,
) -> Result<Message, ConsensusError> {
    tokio::time::timeout(timeout, async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ConsensusError::Transport(format!("connect {addr}: {e}")))?;
        write_frame(&mut stream, msg).await?;
        read_frame(&mut stream).await
    })
    .await
    .map_err(|_| ConsensusError::Transport(format!("request to {addr} timed out")))?
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

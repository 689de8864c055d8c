//! Length-prefixed framing.
//!
//! A frame is a 4-byte big-endian length followed by exactly that many bytes
//! of payload. A clean EOF before the prefix is `Ok(None)`; EOF anywhere
//! inside a frame is `ProtocolError::Truncated`.

use std::io::{ErrorKind, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Largest payload accepted in either direction (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

fn prefix_for(payload: &[u8]) -> Result<[u8; PREFIX_LEN], ProtocolError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    // MAX_FRAME_LEN fits in u32
    Ok((payload.len() as u32).to_be_bytes())
}

fn payload_len(prefix: [u8; PREFIX_LEN]) -> Result<usize, ProtocolError> {
    let size = u32::from_be_bytes(prefix) as usize;
    if size > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(size)
}

/// Read until `buf` is full or EOF; returns bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(read)
}

async fn fill_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<usize, ProtocolError> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]).await? {
            0 => break,
            n => read += n,
        }
    }
    Ok(read)
}

fn check_filled(expected: usize, received: usize) -> Result<(), ProtocolError> {
    if received < expected {
        return Err(ProtocolError::Truncated { expected, received });
    }
    Ok(())
}

/// Blocking frame read.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut prefix = [0u8; PREFIX_LEN];
    match fill(reader, &mut prefix)? {
        0 => return Ok(None),
        n => check_filled(PREFIX_LEN, n)?,
    }

    let mut payload = vec![0u8; payload_len(prefix)?];
    check_filled(payload.len(), fill(reader, &mut payload)?)?;
    Ok(Some(payload))
}

/// Blocking frame write.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError> {
    let prefix = prefix_for(payload)?;
    writer.write_all(&prefix)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

pub async fn read_frame_async<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut prefix = [0u8; PREFIX_LEN];
    match fill_async(reader, &mut prefix).await? {
        0 => return Ok(None),
        n => check_filled(PREFIX_LEN, n)?,
    }

    let mut payload = vec![0u8; payload_len(prefix)?];
    check_filled(payload.len(), fill_async(reader, &mut payload).await?)?;
    Ok(Some(payload))
}

pub async fn write_frame_async<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let prefix = prefix_for(payload)?;
    writer.write_all(&prefix).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

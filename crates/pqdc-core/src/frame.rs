use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length of the frame header (big-endian payload length).
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload accepted on the wire. Sized for a certificate message that
/// carries an ML-DSA-65 delegated credential plus AEAD overhead.
pub const FRAME_MAX_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame payload of {0} bytes exceeds protocol limits")]
    PayloadTooLarge(usize),
    #[error("empty frame")]
    Empty,
    #[error("peer closed the stream")]
    Closed,
}

/// Read one length-prefixed frame. A clean EOF before the header is reported
/// as [`FrameError::Closed`] so callers can tell a hang-up from corruption.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; FRAME_HEADER_LEN];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Closed)
        }
        Err(err) => return Err(err.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > FRAME_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len();
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if len > FRAME_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge(len));
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_header_is_rejected_before_allocation() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let bogus = ((FRAME_MAX_PAYLOAD + 1) as u32).to_be_bytes();
        tx.write_all(&bogus).await.expect("write header");
        let err = read_frame(&mut rx).await.expect_err("too large");
        assert!(matches!(err, FrameError::PayloadTooLarge(len) if len == FRAME_MAX_PAYLOAD + 1));
    }

    #[tokio::test]
    async fn hang_up_before_header_reports_closed() {
        let (tx, mut rx) = tokio::io::duplex(64);
        drop(tx);
        let err = read_frame(&mut rx).await.expect_err("closed");
        assert!(matches!(err, FrameError::Closed));
    }
}

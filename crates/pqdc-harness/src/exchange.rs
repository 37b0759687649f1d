use pqdc_tls::{Role, TlsError, TlsStream};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{role} write failed: {source}")]
    Write {
        role: Role,
        #[source]
        source: TlsError,
    },
    #[error("{role} read failed after {read} bytes: {source}")]
    Read {
        role: Role,
        read: usize,
        #[source]
        source: TlsError,
    },
    #[error("{role} read = {read}, buf = {got:?}; want {want_len}, {want:?}")]
    Mismatch {
        role: Role,
        read: usize,
        got: String,
        want_len: usize,
        want: String,
    },
}

/// Sends one message in each direction over established connections and
/// checks that each side received exactly what the other wrote.
#[derive(Debug, Clone, Copy)]
pub struct MessageExchangeVerifier<'a> {
    client_message: &'a [u8],
    server_message: &'a [u8],
}

impl<'a> MessageExchangeVerifier<'a> {
    pub fn new(client_message: &'a [u8], server_message: &'a [u8]) -> Self {
        Self {
            client_message,
            server_message,
        }
    }

    pub async fn verify<C, S>(
        &self,
        client: &mut TlsStream<C>,
        server: &mut TlsStream<S>,
    ) -> Result<(), ExchangeError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let capacity = self.client_message.len().max(self.server_message.len());
        transfer(client, server, self.client_message, capacity).await?;
        transfer(server, client, self.server_message, capacity).await?;
        Ok(())
    }
}

/// Write `message` on `writer`, then read on `reader` until `message.len()`
/// bytes arrived, the peer closed, or a record overshot the length.
async fn transfer<W, R>(
    writer: &mut TlsStream<W>,
    reader: &mut TlsStream<R>,
    message: &[u8],
    capacity: usize,
) -> Result<(), ExchangeError>
where
    W: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (writer_role, reader_role) = (writer.role(), reader.role());
    writer
        .write_all(message)
        .await
        .map_err(|source| ExchangeError::Write {
            role: writer_role,
            source,
        })?;

    let mut buf = vec![0u8; capacity.max(1)];
    let mut read = 0;
    while read < message.len() {
        let n = reader
            .read(&mut buf[read..])
            .await
            .map_err(|source| ExchangeError::Read {
                role: reader_role,
                read,
                source,
            })?;
        if n == 0 {
            break;
        }
        read += n;
    }

    let got = &buf[..read];
    if got != message {
        return Err(ExchangeError::Mismatch {
            role: reader_role,
            read,
            got: String::from_utf8_lossy(got).into_owned(),
            want_len: message.len(),
            want: String::from_utf8_lossy(message).into_owned(),
        });
    }

    debug!(
        target: "pqdc::harness",
        from = %writer_role,
        to = %reader_role,
        bytes = read,
        "message delivered"
    );
    Ok(())
}

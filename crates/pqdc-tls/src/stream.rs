use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::Config;
use crate::error::TlsError;
use crate::events::Role;
use crate::handshake;
use crate::record::{CipherSuite, ContentType, RecordLayer, ALERT_CLOSE_NOTIFY, MAX_RECORD_PLAINTEXT};
use crate::scheme::SignatureScheme;
use crate::version::ProtocolVersion;

/// What the handshake negotiated, as seen from one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    /// Scheme of the CertificateVerify signature.
    pub signature_scheme: SignatureScheme,
    /// The client validated a delegated credential against the server leaf
    /// and the handshake signature under it. Always false on a server.
    pub verified_delegated_credential: bool,
    pub did_hybrid_kem: bool,
    pub peer_certificates: Vec<Vec<u8>>,
    pub handshake_complete: bool,
}

/// An established connection over any byte stream.
#[derive(Debug)]
pub struct TlsStream<S> {
    layer: RecordLayer<S>,
    role: Role,
    state: ConnectionState,
    pending: Vec<u8>,
    pending_offset: usize,
    received_close: bool,
}

impl<S> TlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run the client handshake over `io`.
    pub async fn connect(io: S, config: Arc<Config>) -> Result<Self, TlsError> {
        let mut layer = RecordLayer::new(io);
        let state = handshake::client::run(&mut layer, &config).await?;
        Ok(Self::established(layer, Role::Client, state))
    }

    /// Run the server handshake over `io`.
    pub async fn accept(io: S, config: Arc<Config>) -> Result<Self, TlsError> {
        let mut layer = RecordLayer::new(io);
        let state = handshake::server::run(&mut layer, &config).await?;
        Ok(Self::established(layer, Role::Server, state))
    }

    fn established(layer: RecordLayer<S>, role: Role, state: ConnectionState) -> Self {
        Self {
            layer,
            role,
            state,
            pending: Vec::new(),
            pending_offset: 0,
            received_close: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn connection_state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn get_ref(&self) -> &S {
        self.layer.io()
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), TlsError> {
        for chunk in data.chunks(MAX_RECORD_PLAINTEXT) {
            self.layer
                .write_record(ContentType::ApplicationData, chunk)
                .await?;
        }
        Ok(())
    }

    /// Read application data into `buf`. Returns 0 once the peer has sent
    /// close_notify; a transport hang-up without it is an error.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending_offset == self.pending.len() {
            if self.received_close {
                return Ok(0);
            }
            let (content_type, payload) = self.layer.read_record().await?;
            match content_type {
                ContentType::ApplicationData => {
                    self.pending = payload;
                    self.pending_offset = 0;
                }
                ContentType::Alert => match payload.first().copied() {
                    Some(ALERT_CLOSE_NOTIFY) => {
                        debug!(target: "pqdc::tls::stream", role = %self.role, "peer sent close_notify");
                        self.received_close = true;
                    }
                    Some(code) => return Err(TlsError::Alert(code)),
                    None => return Err(TlsError::IllegalParameter("empty alert")),
                },
                ContentType::Handshake => {
                    return Err(TlsError::UnexpectedMessage {
                        expected: "application data",
                        got: "handshake",
                    })
                }
            }
        }

        let available = &self.pending[self.pending_offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_offset += n;
        Ok(n)
    }

    /// Fill `buf` completely or fail.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TlsError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(TlsError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of {} bytes", buf.len()),
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Send close_notify and shut the transport down.
    pub async fn close(mut self) -> Result<(), TlsError> {
        self.layer
            .write_record(ContentType::Alert, &[ALERT_CLOSE_NOTIFY])
            .await?;
        self.layer.io_mut().shutdown().await?;
        Ok(())
    }
}

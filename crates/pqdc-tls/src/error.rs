use pqdc_core::{CborError, FrameError};
use thiserror::Error;

use crate::certificate::CertificateError;
use crate::credential::CredentialError;
use crate::kem::KemError;
use crate::record::RecordError;
use crate::scheme::SignatureError;
use crate::version::ProtocolVersion;

/// Failures surfaced by [`TlsStream`](crate::TlsStream) during the handshake
/// or while exchanging records.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("transport error: {0}")]
    Frame(#[from] FrameError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake encoding error: {0}")]
    Codec(#[from] CborError),
    #[error("record protection failure: {0}")]
    Record(#[from] RecordError),
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),
    #[error("invalid delegated credential: {0}")]
    InvalidDelegatedCredential(#[source] CredentialError),
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("key exchange failure: {0}")]
    Kem(#[from] KemError),
    #[error("no protocol version in common")]
    NoCommonVersion,
    #[error("negotiated {0}, but only the TLS 1.3 handshake is implemented")]
    UnsupportedVersion(ProtocolVersion),
    #[error("no cipher suite in common")]
    NoCommonCipherSuite,
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: &'static str,
    },
    #[error("illegal parameter: {0}")]
    IllegalParameter(&'static str),
    #[error("server sent a delegated credential the client did not ask for")]
    UnsolicitedDelegatedCredential,
    #[error("server has no certificate configured")]
    NoCertificate,
    #[error("finished verification failed")]
    FinishedVerification,
    #[error("key schedule failure: {0}")]
    KeySchedule(&'static str),
    #[error("operation requires a completed handshake")]
    HandshakeIncomplete,
    #[error("peer sent alert {0}")]
    Alert(u8),
}

impl TlsError {
    /// The peer went away mid-conversation without sending an alert. On a
    /// loopback run this usually means the other side failed first.
    pub fn is_peer_hang_up(&self) -> bool {
        match self {
            TlsError::Frame(FrameError::Closed) => true,
            TlsError::Frame(FrameError::Io(err)) | TlsError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

//! TLS 1.3-shaped handshake engine with delegated credentials and a hybrid
//! X25519 + ML-KEM-768 key exchange.
//!
//! The engine speaks length-framed CBOR handshake messages rather than the
//! IETF wire format; delegated credentials use the RFC 9345 encoding and
//! signature input. A [`Config`] drives both roles and [`TlsStream`] exposes
//! the negotiated [`ConnectionState`] once the handshake completes.

mod certificate;
mod config;
mod credential;
mod error;
mod events;
mod handshake;
mod kem;
mod messages;
mod record;
mod schedule;
mod scheme;
mod stream;
mod version;

pub use certificate::{
    CertificateError, CertificateInfo, CertifiedKey, TrustStore, DELEGATION_USAGE_OID,
};
pub use config::Config;
pub use credential::{
    select_delegated_credential, CredentialError, DelegatedCredential, DelegatedCredentialPair,
    MAX_TTL,
};
pub use error::TlsError;
pub use events::{
    EventFanout, HandshakeEvent, HandshakeEventSink, HandshakePhase, Role, TracingEventSink,
};
pub use kem::{KemError, KemProvider, MlKem768, X25519Share};
pub use record::{CipherSuite, RecordError, MAX_RECORD_PLAINTEXT};
pub use scheme::{SignatureError, SignatureScheme, SigningKey};
pub use stream::{ConnectionState, TlsStream};
pub use version::ProtocolVersion;

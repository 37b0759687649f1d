use std::sync::Arc;
use std::time::SystemTime;

use crate::certificate::{CertifiedKey, TrustStore};
use crate::events::{HandshakeEvent, HandshakeEventSink, HandshakePhase, Role};
use crate::record::CipherSuite;
use crate::scheme::SignatureScheme;
use crate::version::ProtocolVersion;

/// Endpoint configuration shared by clients and servers. Fields a role does
/// not use are ignored (a client never reads `certificates`).
#[derive(Debug, Clone)]
pub struct Config {
    pub min_version: ProtocolVersion,
    pub max_version: ProtocolVersion,
    pub root_certificates: TrustStore,
    pub certificates: Vec<CertifiedKey>,
    pub support_delegated_credential: bool,
    pub delegated_credential_schemes: Vec<SignatureScheme>,
    pub post_quantum: bool,
    /// Skip chain verification of the server leaf. Test use only.
    pub insecure_skip_verify: bool,
    pub cipher_suites: Vec<CipherSuite>,
    pub event_sink: Option<Arc<dyn HandshakeEventSink>>,
    /// Clock override used for certificate and credential validity checks.
    pub time: Option<SystemTime>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_version: ProtocolVersion::Tls12,
            max_version: ProtocolVersion::Tls13,
            root_certificates: TrustStore::default(),
            certificates: Vec::new(),
            support_delegated_credential: false,
            delegated_credential_schemes: vec![
                SignatureScheme::EcdsaP256Sha256,
                SignatureScheme::MlDsa65,
            ],
            post_quantum: false,
            insecure_skip_verify: false,
            cipher_suites: CipherSuite::preferred(),
            event_sink: None,
            time: None,
        }
    }
}

impl Config {
    /// Restrict negotiation to `min..=max`.
    pub fn with_versions(mut self, min: ProtocolVersion, max: ProtocolVersion) -> Self {
        self.min_version = min;
        self.max_version = max;
        self
    }

    pub fn with_root_certificates(mut self, roots: TrustStore) -> Self {
        self.root_certificates = roots;
        self
    }

    /// Add a certificate the server may present. The first entry is used.
    pub fn with_certificate(mut self, certified: CertifiedKey) -> Self {
        self.certificates.push(certified);
        self
    }

    pub fn with_delegated_credentials(mut self, enable: bool) -> Self {
        self.support_delegated_credential = enable;
        self
    }

    pub fn with_delegated_credential_schemes<I>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = SignatureScheme>,
    {
        self.delegated_credential_schemes = schemes.into_iter().collect();
        self
    }

    pub fn with_post_quantum(mut self, enable: bool) -> Self {
        self.post_quantum = enable;
        self
    }

    pub fn with_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn with_cipher_suites<I>(mut self, suites: I) -> Self
    where
        I: IntoIterator<Item = CipherSuite>,
    {
        self.cipher_suites = suites.into_iter().collect();
        self
    }

    /// Attach a sink that receives a [`HandshakeEvent`] per completed phase.
    pub fn with_event_sink(mut self, sink: Arc<dyn HandshakeEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn with_time(mut self, now: SystemTime) -> Self {
        self.time = Some(now);
        self
    }

    pub fn now(&self) -> SystemTime {
        self.time.unwrap_or_else(SystemTime::now)
    }

    pub(crate) fn emit(&self, role: Role, phase: HandshakePhase) {
        if let Some(sink) = &self.event_sink {
            sink.on_event(&HandshakeEvent {
                role,
                phase,
                at: SystemTime::now(),
            });
        }
    }
}

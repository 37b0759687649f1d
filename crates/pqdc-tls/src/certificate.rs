use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;
use x509_parser::prelude::*;

use crate::credential::DelegatedCredentialPair;
use crate::scheme::{SignatureScheme, SigningKey};

/// Marks a certificate whose key may sign delegated credentials.
pub const DELEGATION_USAGE_OID: &str = "1.3.6.1.4.1.44363.44";

const EC_PUBLIC_KEY_OID: &str = "1.2.840.10045.2.1";

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("malformed PEM input: {0}")]
    Pem(#[source] std::io::Error),
    #[error("no certificate found in PEM input")]
    MissingCertificate,
    #[error("no private key found in PEM input")]
    MissingPrivateKey,
    #[error("failed to parse X.509 certificate: {0}")]
    Parse(String),
    #[error("unsupported private key: {0}")]
    UnsupportedKey(&'static str),
    #[error("certificate {subject} has a {algorithm} key no signature scheme covers")]
    UnsupportedKeyAlgorithm { subject: String, algorithm: String },
    #[error("private key does not match the certificate public key")]
    KeyMismatch,
    #[error("peer sent an empty certificate chain")]
    EmptyChain,
    #[error("certificate {subject} is outside its validity window")]
    Expired { subject: String },
    #[error("certificate {subject} does not chain to a trusted root")]
    UnknownIssuer { subject: String },
    #[error("certificate timestamp is out of range")]
    TimeOutOfRange,
}

/// The parts of an X.509 certificate the handshake needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: SystemTime,
    pub not_after: SystemTime,
    /// SEC1-encoded subject public key.
    pub public_key: Vec<u8>,
    /// Dotted OID of the subject public key algorithm.
    pub key_algorithm: String,
    /// Scheme the leaf key signs with, when the engine supports it.
    pub key_scheme: Option<SignatureScheme>,
    /// Whether the DelegationUsage extension is present.
    pub delegation_usage: bool,
}

impl CertificateInfo {
    pub fn parse(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|err| CertificateError::Parse(err.to_string()))?;
        Self::from_x509(&cert)
    }

    fn from_x509(cert: &X509Certificate<'_>) -> Result<Self, CertificateError> {
        let validity = cert.validity();
        let spki = cert.public_key();
        let key_algorithm = spki.algorithm.algorithm.to_id_string();
        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before: system_time(validity.not_before.timestamp())?,
            not_after: system_time(validity.not_after.timestamp())?,
            public_key: spki.subject_public_key.data.to_vec(),
            key_scheme: key_scheme(&key_algorithm, &spki.subject_public_key.data),
            key_algorithm,
            delegation_usage: cert
                .extensions()
                .iter()
                .any(|ext| ext.oid.to_id_string() == DELEGATION_USAGE_OID),
        })
    }

    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// The scheme signatures by this certificate's key use.
    pub fn signature_scheme(&self) -> Result<SignatureScheme, CertificateError> {
        self.key_scheme
            .ok_or_else(|| CertificateError::UnsupportedKeyAlgorithm {
                subject: self.subject.clone(),
                algorithm: self.key_algorithm.clone(),
            })
    }
}

/// Only uncompressed or compressed P-256 points map to a scheme; other EC
/// curves share the algorithm OID but fail to decode.
fn key_scheme(algorithm: &str, public_key: &[u8]) -> Option<SignatureScheme> {
    if algorithm != EC_PUBLIC_KEY_OID {
        return None;
    }
    p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
        .ok()
        .map(|_| SignatureScheme::EcdsaP256Sha256)
}

fn system_time(timestamp: i64) -> Result<SystemTime, CertificateError> {
    let secs = u64::try_from(timestamp).map_err(|_| CertificateError::TimeOutOfRange)?;
    UNIX_EPOCH
        .checked_add(Duration::from_secs(secs))
        .ok_or(CertificateError::TimeOutOfRange)
}

/// A certificate chain together with the leaf's signing key and any delegated
/// credentials the leaf has issued.
#[derive(Debug, Clone)]
pub struct CertifiedKey {
    chain: Vec<Vec<u8>>,
    info: CertificateInfo,
    key: SigningKey,
    delegated_credentials: Vec<DelegatedCredentialPair>,
}

impl CertifiedKey {
    /// Parse PEM certificate and key text. The key may be SEC1 or PKCS#8 DER
    /// under either an `EC PRIVATE KEY` or `PRIVATE KEY` label.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, CertificateError> {
        let chain =
            rustls_pemfile::certs(&mut cert_pem.as_bytes()).map_err(CertificateError::Pem)?;
        if chain.is_empty() {
            return Err(CertificateError::MissingCertificate);
        }

        let key_der = rustls_pemfile::read_all(&mut key_pem.as_bytes())
            .map_err(CertificateError::Pem)?
            .into_iter()
            .find_map(|item| match item {
                rustls_pemfile::Item::ECKey(der) | rustls_pemfile::Item::PKCS8Key(der) => {
                    Some(der)
                }
                _ => None,
            })
            .ok_or(CertificateError::MissingPrivateKey)?;

        Self::new(chain, decode_p256_key(&key_der)?)
    }

    pub fn new(
        chain: Vec<Vec<u8>>,
        key: p256::ecdsa::SigningKey,
    ) -> Result<Self, CertificateError> {
        let leaf = chain.first().ok_or(CertificateError::MissingCertificate)?;
        let info = CertificateInfo::parse(leaf)?;
        info.signature_scheme()?;
        let certified = p256::ecdsa::VerifyingKey::from_sec1_bytes(&info.public_key)
            .map_err(|_| CertificateError::UnsupportedKey("certificate key is not P-256"))?;
        if certified != *key.verifying_key() {
            return Err(CertificateError::KeyMismatch);
        }
        debug!(
            target: "pqdc::tls::certificate",
            subject = %info.subject,
            delegation_usage = info.delegation_usage,
            "loaded certified key"
        );
        Ok(Self {
            chain,
            info,
            key: SigningKey::EcdsaP256(key),
            delegated_credentials: Vec::new(),
        })
    }

    /// Attach a delegated credential the server may present instead of
    /// signing with the leaf key.
    pub fn with_delegated_credential(mut self, pair: DelegatedCredentialPair) -> Self {
        self.delegated_credentials.push(pair);
        self
    }

    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn leaf_der(&self) -> &[u8] {
        &self.chain[0]
    }

    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn delegated_credentials(&self) -> &[DelegatedCredentialPair] {
        &self.delegated_credentials
    }
}

fn decode_p256_key(der: &[u8]) -> Result<p256::ecdsa::SigningKey, CertificateError> {
    use p256::pkcs8::DecodePrivateKey;

    let secret = p256::SecretKey::from_sec1_der(der)
        .or_else(|_| p256::SecretKey::from_pkcs8_der(der))
        .map_err(|_| CertificateError::UnsupportedKey("expected a P-256 private key"))?;
    Ok(p256::ecdsa::SigningKey::from(secret))
}

/// DER roots a client accepts for the server's leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustStore {
    roots: Vec<Vec<u8>>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, der: Vec<u8>) {
        if !self.roots.contains(&der) {
            self.roots.push(der);
        }
    }

    pub fn with_root(mut self, der: Vec<u8>) -> Self {
        self.add(der);
        self
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Verify the leaf of `chain` at `now`. A leaf is trusted when its exact
    /// DER is pinned in the store, or when a store root with a matching subject
    /// signed it.
    pub fn verify_chain(
        &self,
        chain: &[Vec<u8>],
        now: SystemTime,
    ) -> Result<CertificateInfo, CertificateError> {
        let leaf_der = chain.first().ok_or(CertificateError::EmptyChain)?;
        let (_, leaf) = X509Certificate::from_der(leaf_der)
            .map_err(|err| CertificateError::Parse(err.to_string()))?;
        let info = CertificateInfo::from_x509(&leaf)?;
        if !info.is_valid_at(now) {
            return Err(CertificateError::Expired {
                subject: info.subject,
            });
        }

        if self.roots.iter().any(|root| root == leaf_der) {
            return Ok(info);
        }

        for root_der in &self.roots {
            let Ok((_, root)) = X509Certificate::from_der(root_der) else {
                continue;
            };
            if root.subject().as_raw() != leaf.issuer().as_raw() {
                continue;
            }
            if leaf.verify_signature(Some(root.public_key())).is_ok() {
                return Ok(info);
            }
        }

        Err(CertificateError::UnknownIssuer {
            subject: info.subject,
        })
    }
}

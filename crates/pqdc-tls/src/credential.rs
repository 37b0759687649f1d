//! Delegated credentials in the RFC 9345 binary layout.
//!
//! A credential binds a fresh public key to the server's leaf certificate for
//! `valid_time` seconds measured from the leaf's not-before. The delegated key
//! is carried raw (SEC1 point or ML-DSA public key) rather than as a
//! SubjectPublicKeyInfo.

use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::certificate::{CertificateError, CertificateInfo, CertifiedKey};
use crate::scheme::{SignatureError, SignatureScheme, SigningKey};

/// Longest remaining lifetime a client accepts for a credential.
pub const MAX_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const SIGNATURE_CONTEXT: &[u8] = b"TLS, server delegated credentials";
const MAX_PUBLIC_KEY_LEN: usize = (1 << 24) - 1;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("certificate does not carry the DelegationUsage extension")]
    NotDelegable,
    #[error("validity of {0:?} does not fit a 32-bit valid_time")]
    ValidityOverflow(Duration),
    #[error("credential expired {0:?} ago")]
    Expired(Duration),
    #[error("credential remains valid for {remaining:?}, beyond the {max:?} limit")]
    TtlExceeded { remaining: Duration, max: Duration },
    #[error("credential signed with {0}, which does not match the certificate key")]
    AlgorithmMismatch(SignatureScheme),
    #[error("credential scheme {0} was not advertised")]
    SchemeNotOffered(SignatureScheme),
    #[error("malformed delegated credential encoding")]
    Malformed,
    #[error("delegated public key of {0} bytes is too large")]
    KeyTooLarge(usize),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedCredential {
    pub valid_time: u32,
    pub expected_cert_verify_algorithm: SignatureScheme,
    pub public_key: Vec<u8>,
    pub algorithm: SignatureScheme,
    pub signature: Vec<u8>,
}

/// A credential and the private key matching its public key.
#[derive(Debug, Clone)]
pub struct DelegatedCredentialPair {
    pub credential: DelegatedCredential,
    pub private_key: SigningKey,
}

impl DelegatedCredential {
    /// Issue a credential from `cert` for a fresh `scheme` key pair. The
    /// credential expires `valid_time` after the leaf's not-before; no upper
    /// bound is applied here.
    pub fn issue(
        cert: &CertifiedKey,
        scheme: SignatureScheme,
        valid_time: Duration,
    ) -> Result<DelegatedCredentialPair, CredentialError> {
        if !cert.info().delegation_usage {
            return Err(CredentialError::NotDelegable);
        }
        let seconds = u32::try_from(valid_time.as_secs())
            .map_err(|_| CredentialError::ValidityOverflow(valid_time))?;

        let (private_key, public_key) = SigningKey::generate(scheme);
        let mut credential = DelegatedCredential {
            valid_time: seconds,
            expected_cert_verify_algorithm: scheme,
            public_key,
            algorithm: cert.signing_key().scheme(),
            signature: Vec::new(),
        };
        let message = credential.signed_message(cert.leaf_der())?;
        credential.signature = cert.signing_key().sign(&message)?;

        Ok(DelegatedCredentialPair {
            credential,
            private_key,
        })
    }

    pub fn valid_time(&self) -> Duration {
        Duration::from_secs(u64::from(self.valid_time))
    }

    pub fn expiration(&self, leaf: &CertificateInfo) -> SystemTime {
        leaf.not_before + self.valid_time()
    }

    pub fn is_expired_at(&self, leaf: &CertificateInfo, now: SystemTime) -> bool {
        now >= self.expiration(leaf)
    }

    /// Client-side validation against the leaf the server presented.
    pub fn verify(
        &self,
        leaf_der: &[u8],
        leaf: &CertificateInfo,
        now: SystemTime,
        offered: &[SignatureScheme],
    ) -> Result<(), CredentialError> {
        if !leaf.delegation_usage {
            return Err(CredentialError::NotDelegable);
        }
        if self.algorithm != leaf.signature_scheme()? {
            return Err(CredentialError::AlgorithmMismatch(self.algorithm));
        }
        if !offered.contains(&self.expected_cert_verify_algorithm) {
            return Err(CredentialError::SchemeNotOffered(
                self.expected_cert_verify_algorithm,
            ));
        }

        let expiration = self.expiration(leaf);
        let remaining = expiration.duration_since(now).map_err(|err| {
            CredentialError::Expired(err.duration())
        })?;
        if remaining.is_zero() {
            return Err(CredentialError::Expired(Duration::ZERO));
        }
        if remaining > MAX_TTL {
            return Err(CredentialError::TtlExceeded {
                remaining,
                max: MAX_TTL,
            });
        }

        let message = self.signed_message(leaf_der)?;
        self.algorithm
            .verify(&leaf.public_key, &message, &self.signature)?;
        Ok(())
    }

    /// `valid_time | dc_cert_verify_algorithm | u24 public key`
    fn credential_bytes(&self) -> Result<Vec<u8>, CredentialError> {
        let key_len = self.public_key.len();
        if key_len > MAX_PUBLIC_KEY_LEN {
            return Err(CredentialError::KeyTooLarge(key_len));
        }
        let mut out = Vec::with_capacity(9 + key_len);
        out.extend_from_slice(&self.valid_time.to_be_bytes());
        out.extend_from_slice(&self.expected_cert_verify_algorithm.wire().to_be_bytes());
        out.extend_from_slice(&(key_len as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&self.public_key);
        Ok(out)
    }

    fn signed_message(&self, leaf_der: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let credential = self.credential_bytes()?;
        let mut message =
            Vec::with_capacity(64 + SIGNATURE_CONTEXT.len() + 1 + leaf_der.len() + credential.len() + 2);
        message.extend_from_slice(&[0x20; 64]);
        message.extend_from_slice(SIGNATURE_CONTEXT);
        message.push(0x00);
        message.extend_from_slice(leaf_der);
        message.extend_from_slice(&credential);
        message.extend_from_slice(&self.algorithm.wire().to_be_bytes());
        Ok(message)
    }

    pub fn marshal(&self) -> Result<Vec<u8>, CredentialError> {
        let mut out = self.credential_bytes()?;
        let sig_len = u16::try_from(self.signature.len())
            .map_err(|_| CredentialError::Malformed)?;
        out.extend_from_slice(&self.algorithm.wire().to_be_bytes());
        out.extend_from_slice(&sig_len.to_be_bytes());
        out.extend_from_slice(&self.signature);
        Ok(out)
    }

    pub fn unmarshal(bytes: &[u8]) -> Result<Self, CredentialError> {
        let mut reader = Reader { bytes };
        let valid_time = u32::from_be_bytes(reader.take_array()?);
        let expected_cert_verify_algorithm =
            SignatureScheme::from_wire(u16::from_be_bytes(reader.take_array()?))?;
        let [a, b, c] = reader.take_array()?;
        let key_len = u32::from_be_bytes([0, a, b, c]) as usize;
        let public_key = reader.take(key_len)?.to_vec();
        let algorithm = SignatureScheme::from_wire(u16::from_be_bytes(reader.take_array()?))?;
        let sig_len = u16::from_be_bytes(reader.take_array()?) as usize;
        let signature = reader.take(sig_len)?.to_vec();
        if !reader.bytes.is_empty() {
            return Err(CredentialError::Malformed);
        }
        Ok(Self {
            valid_time,
            expected_cert_verify_algorithm,
            public_key,
            algorithm,
            signature,
        })
    }
}

/// Pick the first credential the client can use: its scheme was offered and
/// it has not expired yet.
pub fn select_delegated_credential<'a>(
    pairs: &'a [DelegatedCredentialPair],
    leaf: &CertificateInfo,
    offered: &[SignatureScheme],
    now: SystemTime,
) -> Option<&'a DelegatedCredentialPair> {
    pairs.iter().find(|pair| {
        offered.contains(&pair.credential.expected_cert_verify_algorithm)
            && !pair.credential.is_expired_at(leaf, now)
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CredentialError> {
        if self.bytes.len() < len {
            return Err(CredentialError::Malformed);
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CredentialError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DelegatedCredential {
        DelegatedCredential {
            valid_time: 86_400,
            expected_cert_verify_algorithm: SignatureScheme::MlDsa65,
            public_key: vec![0xab; 1952],
            algorithm: SignatureScheme::EcdsaP256Sha256,
            signature: vec![0x30, 0x45, 0x02],
        }
    }

    #[test]
    fn wire_layout_matches_rfc_9345() {
        let encoded = sample().marshal().expect("marshal");
        assert_eq!(&encoded[..4], &86_400u32.to_be_bytes());
        assert_eq!(&encoded[4..6], &[0x09, 0x05]);
        assert_eq!(&encoded[6..9], &[0x00, 0x07, 0xa0]);
        let tail = &encoded[9 + 1952..];
        assert_eq!(tail, &[0x04, 0x03, 0x00, 0x03, 0x30, 0x45, 0x02]);
        assert_eq!(DelegatedCredential::unmarshal(&encoded).expect("unmarshal"), sample());
    }

    #[test]
    fn truncated_encoding_is_malformed() {
        let encoded = sample().marshal().expect("marshal");
        let err = DelegatedCredential::unmarshal(&encoded[..encoded.len() - 1])
            .expect_err("truncated");
        assert!(matches!(err, CredentialError::Malformed));
    }
}

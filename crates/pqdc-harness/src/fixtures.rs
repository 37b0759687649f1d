use std::fmt;
use std::time::SystemTime;

use pqdc_tls::{CertificateError, CertifiedKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// The part a certificate plays in a fixture set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixtureRole {
    /// Authority that signed the delegator. Never delegates itself.
    Root,
    /// Leaf carrying the DelegationUsage extension.
    Delegator,
}

impl fmt::Display for FixtureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureRole::Root => f.write_str("root"),
            FixtureRole::Delegator => f.write_str("delegator"),
        }
    }
}

/// PEM text for one certificate and its private key.
#[derive(Clone, PartialEq, Eq)]
pub struct FixturePem {
    pub certificate: String,
    pub private_key: String,
}

impl FixturePem {
    pub fn new(certificate: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            certificate: certificate.into(),
            private_key: private_key.into(),
        }
    }
}

impl fmt::Debug for FixturePem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixturePem")
            .field("certificate_len", &self.certificate.len())
            .finish_non_exhaustive()
    }
}

/// Source of fixture PEM material, keyed by role.
pub trait FixtureProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn pem(&self, role: FixtureRole) -> Option<FixturePem>;
}

const SELF_SIGNED_CERT: &str = include_str!("../fixtures/delegator-self-signed.crt.pem");
const SELF_SIGNED_KEY: &str = include_str!("../fixtures/delegator-self-signed.key.pem");
const DELEGATOR_CERT: &str = include_str!("../fixtures/delegator.crt.pem");
const DELEGATOR_KEY: &str = include_str!("../fixtures/delegator.key.pem");
const ROOT_CERT: &str = include_str!("../fixtures/root.crt.pem");
const ROOT_KEY: &str = include_str!("../fixtures/root.key.pem");

/// Fixture sets compiled into the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedFixtures {
    /// A single self-signed ECDSA P-256 delegator that trusts itself.
    SelfSigned,
    /// A root authority plus a separate delegator leaf.
    Rooted,
}

impl EmbeddedFixtures {
    pub fn self_signed() -> Self {
        EmbeddedFixtures::SelfSigned
    }

    pub fn rooted() -> Self {
        EmbeddedFixtures::Rooted
    }
}

impl FixtureProvider for EmbeddedFixtures {
    fn name(&self) -> &str {
        match self {
            EmbeddedFixtures::SelfSigned => "self-signed",
            EmbeddedFixtures::Rooted => "rooted",
        }
    }

    fn pem(&self, role: FixtureRole) -> Option<FixturePem> {
        match (self, role) {
            (EmbeddedFixtures::SelfSigned, FixtureRole::Delegator) => {
                Some(FixturePem::new(SELF_SIGNED_CERT, SELF_SIGNED_KEY))
            }
            (EmbeddedFixtures::SelfSigned, FixtureRole::Root) => None,
            (EmbeddedFixtures::Rooted, FixtureRole::Delegator) => {
                Some(FixturePem::new(DELEGATOR_CERT, DELEGATOR_KEY))
            }
            (EmbeddedFixtures::Rooted, FixtureRole::Root) => {
                Some(FixturePem::new(ROOT_CERT, ROOT_KEY))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("fixture set {provider} has no {role} material")]
    MissingRole { provider: String, role: FixtureRole },
    #[error("{role} fixture from {provider} is corrupt: {source}")]
    Corrupt {
        provider: String,
        role: FixtureRole,
        #[source]
        source: CertificateError,
    },
}

/// A parsed certificate and key pair.
#[derive(Debug, Clone)]
pub struct CertificateFixture {
    role: FixtureRole,
    certified: CertifiedKey,
}

impl CertificateFixture {
    pub fn parse(role: FixtureRole, pem: &FixturePem) -> Result<Self, CertificateError> {
        let certified = CertifiedKey::from_pem(&pem.certificate, &pem.private_key)?;
        Ok(Self { role, certified })
    }

    pub fn role(&self) -> FixtureRole {
        self.role
    }

    pub fn certified(&self) -> &CertifiedKey {
        &self.certified
    }

    pub fn not_before(&self) -> SystemTime {
        self.certified.info().not_before
    }

    pub fn leaf_der(&self) -> &[u8] {
        self.certified.leaf_der()
    }

    pub fn subject(&self) -> &str {
        &self.certified.info().subject
    }
}

/// Parsed fixtures for one scenario. A delegator is always present; the
/// root only when the provider supplies one.
#[derive(Debug, Clone)]
pub struct CredentialFixtureStore {
    provider: String,
    delegator: CertificateFixture,
    root: Option<CertificateFixture>,
}

impl CredentialFixtureStore {
    pub fn load(provider: &dyn FixtureProvider) -> Result<Self, FixtureError> {
        let delegator = load_role(provider, FixtureRole::Delegator)?.ok_or_else(|| {
            FixtureError::MissingRole {
                provider: provider.name().to_owned(),
                role: FixtureRole::Delegator,
            }
        })?;
        let root = load_role(provider, FixtureRole::Root)?;

        debug!(
            target: "pqdc::harness",
            provider = provider.name(),
            subject = delegator.subject(),
            has_root = root.is_some(),
            "fixtures loaded"
        );

        Ok(Self {
            provider: provider.name().to_owned(),
            delegator,
            root,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn delegator(&self) -> &CertificateFixture {
        &self.delegator
    }

    pub fn root(&self) -> Option<&CertificateFixture> {
        self.root.as_ref()
    }

    pub fn get(&self, role: FixtureRole) -> Result<&CertificateFixture, FixtureError> {
        match role {
            FixtureRole::Delegator => Ok(&self.delegator),
            FixtureRole::Root => self.root.as_ref().ok_or_else(|| FixtureError::MissingRole {
                provider: self.provider.clone(),
                role,
            }),
        }
    }
}

fn load_role(
    provider: &dyn FixtureProvider,
    role: FixtureRole,
) -> Result<Option<CertificateFixture>, FixtureError> {
    let Some(pem) = provider.pem(role) else {
        return Ok(None);
    };
    CertificateFixture::parse(role, &pem)
        .map(Some)
        .map_err(|source| FixtureError::Corrupt {
            provider: provider.name().to_owned(),
            role,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_set_has_no_root() {
        let store = CredentialFixtureStore::load(&EmbeddedFixtures::self_signed()).unwrap();
        assert!(store.root().is_none());
        assert!(store.delegator().certified().info().delegation_usage);
        assert!(matches!(
            store.get(FixtureRole::Root),
            Err(FixtureError::MissingRole {
                role: FixtureRole::Root,
                ..
            })
        ));
    }

    #[test]
    fn rooted_set_exposes_both_roles() {
        let store = CredentialFixtureStore::load(&EmbeddedFixtures::rooted()).unwrap();
        let root = store.get(FixtureRole::Root).unwrap();
        assert_eq!(root.role(), FixtureRole::Root);
        assert!(!root.certified().info().delegation_usage);
        assert_eq!(store.get(FixtureRole::Delegator).unwrap().role(), FixtureRole::Delegator);
        assert_ne!(root.leaf_der(), store.delegator().leaf_der());
    }

    #[test]
    fn not_before_comes_from_the_leaf() {
        let store = CredentialFixtureStore::load(&EmbeddedFixtures::self_signed()).unwrap();
        let not_before = store
            .delegator()
            .not_before()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(not_before.as_secs(), 1_614_384_961);
    }
}

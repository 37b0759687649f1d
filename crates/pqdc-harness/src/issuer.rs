use std::time::{Duration, SystemTime};

use pqdc_tls::{
    CredentialError, DelegatedCredential, DelegatedCredentialPair, SignatureScheme, MAX_TTL,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::fixtures::CertificateFixture;

/// Reference point the requested validity is measured from.
///
/// The credential format always counts `valid_time` from the leaf's
/// not-before. `Now` converts a lifetime measured from the moment of
/// issuance into that form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidityAnchor {
    #[default]
    LeafNotBefore,
    Now,
}

#[derive(Debug, Error)]
pub enum IssuerError {
    #[error("issuance clock precedes the certificate not-before")]
    ClockBeforeNotBefore,
    #[error("validity of {0:?} overflows the credential lifetime field")]
    Overflow(Duration),
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// A freshly issued delegated credential, ready to attach to a server
/// certificate entry.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    scheme: SignatureScheme,
    validity: Duration,
    expires_at: SystemTime,
    parent_subject: String,
    pair: DelegatedCredentialPair,
}

impl IssuedCredential {
    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    /// Lifetime as requested by the caller, before anchoring.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn parent_subject(&self) -> &str {
        &self.parent_subject
    }

    pub fn credential(&self) -> &DelegatedCredential {
        &self.pair.credential
    }

    pub fn pair(&self) -> &DelegatedCredentialPair {
        &self.pair
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Lifetime that leaves exactly [`MAX_TTL`] remaining at `now` when
/// anchored at the leaf's not-before. A clock earlier than `not_before`
/// yields `MAX_TTL`.
pub fn baseline_validity(not_before: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(not_before).unwrap_or_default() + MAX_TTL
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelegatedCredentialIssuer {
    anchor: ValidityAnchor,
    clock: Option<SystemTime>,
}

impl DelegatedCredentialIssuer {
    pub fn new(anchor: ValidityAnchor) -> Self {
        Self {
            anchor,
            clock: None,
        }
    }

    /// Fix the issuance time used by [`ValidityAnchor::Now`].
    pub fn with_clock(mut self, now: SystemTime) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn anchor(&self) -> ValidityAnchor {
        self.anchor
    }

    /// Issue a credential for a fresh `scheme` key pair signed by `leaf`.
    ///
    /// The validity is taken as given: it is neither clamped to [`MAX_TTL`]
    /// nor to the leaf's not-after. Sub-second parts are dropped by the
    /// credential encoding.
    pub fn issue(
        &self,
        leaf: &CertificateFixture,
        scheme: SignatureScheme,
        validity: Duration,
    ) -> Result<IssuedCredential, IssuerError> {
        let valid_time = match self.anchor {
            ValidityAnchor::LeafNotBefore => validity,
            ValidityAnchor::Now => {
                let now = self.clock.unwrap_or_else(SystemTime::now);
                let elapsed = now
                    .duration_since(leaf.not_before())
                    .map_err(|_| IssuerError::ClockBeforeNotBefore)?;
                elapsed
                    .checked_add(validity)
                    .ok_or(IssuerError::Overflow(validity))?
            }
        };

        let pair = match DelegatedCredential::issue(leaf.certified(), scheme, valid_time) {
            Ok(pair) => pair,
            Err(CredentialError::ValidityOverflow(_)) => {
                return Err(IssuerError::Overflow(validity))
            }
            Err(err) => return Err(err.into()),
        };
        let expires_at = pair.credential.expiration(leaf.certified().info());

        info!(
            target: "pqdc::harness",
            scheme = %scheme,
            post_quantum = scheme.is_post_quantum(),
            anchor = ?self.anchor,
            valid_time_secs = pair.credential.valid_time,
            parent = leaf.subject(),
            "issued delegated credential"
        );

        Ok(IssuedCredential {
            scheme,
            validity,
            expires_at,
            parent_subject: leaf.subject().to_owned(),
            pair,
        })
    }
}

use std::fmt;

use pqdc_tls::ConnectionState;
use serde::{Deserialize, Serialize};

/// Endpoint whose connection state decides whether a delegated credential
/// was verified. Only a client ever verifies one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObserverRole {
    #[default]
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    DelegatedCredential,
    HybridKem,
}

impl Feature {
    fn missing_text(self) -> &'static str {
        match self {
            Feature::DelegatedCredential => "no delegated credential",
            Feature::HybridKem => "no hybrid KEM",
        }
    }

    fn unexpected_text(self) -> &'static str {
        match self {
            Feature::DelegatedCredential => "unexpected delegated credential",
            Feature::HybridKem => "unexpected hybrid KEM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expectation {
    #[default]
    Ignore,
    Require,
    Forbid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequiredFeatures {
    pub delegated_credential: Expectation,
    pub hybrid_kem: Expectation,
}

impl RequiredFeatures {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_delegated_credential(mut self, expectation: Expectation) -> Self {
        self.delegated_credential = expectation;
        self
    }

    pub fn with_hybrid_kem(mut self, expectation: Expectation) -> Self {
        self.hybrid_kem = expectation;
        self
    }
}

/// The two features a scenario can assert on, plus both raw states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    pub verified_delegated_credential: bool,
    pub did_hybrid_kem: bool,
    pub client: ConnectionState,
    pub server: ConnectionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    NotNegotiated(Vec<Feature>),
    Unexpected(Vec<Feature>),
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let texts: Vec<&str> = match self {
            Verdict::Passed => return f.write_str("success"),
            Verdict::NotNegotiated(features) => {
                features.iter().map(|feature| feature.missing_text()).collect()
            }
            Verdict::Unexpected(features) => {
                features.iter().map(|feature| feature.unexpected_text()).collect()
            }
        };
        f.write_str(&texts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureAssertion {
    observer: ObserverRole,
    required: RequiredFeatures,
}

impl FeatureAssertion {
    pub fn new(observer: ObserverRole, required: RequiredFeatures) -> Self {
        Self { observer, required }
    }

    pub fn observer(&self) -> ObserverRole {
        self.observer
    }

    pub fn required(&self) -> RequiredFeatures {
        self.required
    }

    pub fn inspect(&self, client: &ConnectionState, server: &ConnectionState) -> HandshakeOutcome {
        let observed = match self.observer {
            ObserverRole::Client => client,
            ObserverRole::Server => server,
        };
        HandshakeOutcome {
            verified_delegated_credential: observed.verified_delegated_credential,
            did_hybrid_kem: client.did_hybrid_kem && server.did_hybrid_kem,
            client: client.clone(),
            server: server.clone(),
        }
    }

    /// Missing required features take precedence over forbidden ones that
    /// were negotiated.
    pub fn verdict(&self, outcome: &HandshakeOutcome) -> Verdict {
        let checks = [
            (
                Feature::DelegatedCredential,
                self.required.delegated_credential,
                outcome.verified_delegated_credential,
            ),
            (
                Feature::HybridKem,
                self.required.hybrid_kem,
                outcome.did_hybrid_kem,
            ),
        ];

        let missing: Vec<Feature> = checks
            .iter()
            .filter(|(_, expectation, present)| *expectation == Expectation::Require && !present)
            .map(|(feature, _, _)| *feature)
            .collect();
        if !missing.is_empty() {
            return Verdict::NotNegotiated(missing);
        }

        let unexpected: Vec<Feature> = checks
            .iter()
            .filter(|(_, expectation, present)| *expectation == Expectation::Forbid && *present)
            .map(|(feature, _, _)| *feature)
            .collect();
        if !unexpected.is_empty() {
            return Verdict::Unexpected(unexpected);
        }

        Verdict::Passed
    }
}

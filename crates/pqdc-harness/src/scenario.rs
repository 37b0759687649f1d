use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pqdc_tls::{
    DelegatedCredential, EventFanout, HandshakePhase, Role, SignatureScheme, TracingEventSink,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assertion::{
    Expectation, FeatureAssertion, HandshakeOutcome, ObserverRole, RequiredFeatures, Verdict,
};
use crate::endpoint::{
    ClientOptions, EndpointConfigBuilder, EndpointConfiguration, ServerOptions, TrustMode,
};
use crate::error::HarnessError;
use crate::fixtures::{CredentialFixtureStore, EmbeddedFixtures, FixtureProvider};
use crate::issuer::{
    baseline_validity, DelegatedCredentialIssuer, IssuedCredential, ValidityAnchor,
};
use crate::orchestrator::HandshakeOrchestrator;
use crate::settings::HarnessSettings;
use crate::timing::{TimingRecorder, TimingTrace};

const POST_QUANTUM_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// ECDSA delegated credential on a self-signed delegator.
    Baseline,
    /// Same server, client without delegated credential support.
    NoExtension,
    /// ML-DSA-65 credential over a hybrid X25519 + ML-KEM-768 exchange.
    PostQuantum,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::Baseline,
        ScenarioKind::NoExtension,
        ScenarioKind::PostQuantum,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::Baseline => "baseline",
            ScenarioKind::NoExtension => "no-extension",
            ScenarioKind::PostQuantum => "post-quantum",
        }
    }

    /// Fixture set the scenario is written against.
    pub fn fixtures(self) -> EmbeddedFixtures {
        match self {
            ScenarioKind::Baseline | ScenarioKind::NoExtension => EmbeddedFixtures::self_signed(),
            ScenarioKind::PostQuantum => EmbeddedFixtures::rooted(),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How long the issued credential lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// [`baseline_validity`] at issuance time.
    Baseline,
    Fixed(Duration),
}

/// Everything that distinguishes one scenario run from another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub trust: TrustMode,
    pub credential_scheme: SignatureScheme,
    pub anchor: ValidityAnchor,
    pub validity: Validity,
    pub client_delegated_credentials: bool,
    pub client_post_quantum: bool,
    pub server_post_quantum: bool,
    pub record_timing: bool,
    pub observer: ObserverRole,
    pub required: RequiredFeatures,
}

impl Scenario {
    pub fn new(kind: ScenarioKind) -> Self {
        let baseline = Self {
            kind,
            trust: TrustMode::SelfSigned,
            credential_scheme: SignatureScheme::EcdsaP256Sha256,
            anchor: ValidityAnchor::LeafNotBefore,
            validity: Validity::Baseline,
            client_delegated_credentials: true,
            client_post_quantum: false,
            server_post_quantum: false,
            record_timing: false,
            observer: ObserverRole::Client,
            required: RequiredFeatures::none().with_delegated_credential(Expectation::Require),
        };
        match kind {
            ScenarioKind::Baseline => baseline,
            ScenarioKind::NoExtension => Self {
                client_delegated_credentials: false,
                required: RequiredFeatures::none().with_delegated_credential(Expectation::Forbid),
                ..baseline
            },
            ScenarioKind::PostQuantum => Self {
                trust: TrustMode::Rooted,
                credential_scheme: SignatureScheme::MlDsa65,
                anchor: ValidityAnchor::Now,
                validity: Validity::Fixed(POST_QUANTUM_VALIDITY),
                client_post_quantum: true,
                server_post_quantum: true,
                record_timing: true,
                required: RequiredFeatures::none()
                    .with_delegated_credential(Expectation::Require)
                    .with_hybrid_kem(Expectation::Require),
                ..baseline
            },
        }
    }

    pub fn with_observer(mut self, observer: ObserverRole) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_post_quantum(mut self, client: bool, server: bool) -> Self {
        self.client_post_quantum = client;
        self.server_post_quantum = server;
        self
    }

    pub fn with_client_delegated_credentials(mut self, enable: bool) -> Self {
        self.client_delegated_credentials = enable;
        self
    }

    pub fn with_required(mut self, required: RequiredFeatures) -> Self {
        self.required = required;
        self
    }

    pub fn with_timing(mut self, enable: bool) -> Self {
        self.record_timing = enable;
        self
    }
}

impl From<ScenarioKind> for Scenario {
    fn from(kind: ScenarioKind) -> Self {
        Scenario::new(kind)
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub kind: ScenarioKind,
    pub outcome: HandshakeOutcome,
    pub verdict: Verdict,
    /// Public half of the credential the server was configured with.
    pub credential: DelegatedCredential,
    pub credential_expires_at: SystemTime,
    pub timing: Option<TimingTrace>,
    /// Expected phases absent from the timing trace. Empty when timing is
    /// not recorded.
    pub missing_phases: Vec<(Role, HandshakePhase)>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.verdict.is_passed() && self.missing_phases.is_empty()
    }
}

/// A scenario with fixtures parsed, credential issued and both endpoints
/// configured. Preparing is synchronous and touches no sockets, so every
/// fixture or issuance failure surfaces before anything is bound.
#[derive(Debug)]
pub struct PreparedScenario {
    scenario: Scenario,
    issued: IssuedCredential,
    client: EndpointConfiguration,
    server: EndpointConfiguration,
    orchestrator: HandshakeOrchestrator,
    client_message: Vec<u8>,
    server_message: Vec<u8>,
}

impl PreparedScenario {
    pub fn prepare(
        scenario: impl Into<Scenario>,
        settings: &HarnessSettings,
        provider: &dyn FixtureProvider,
    ) -> Result<Self, HarnessError> {
        let mut scenario = scenario.into();
        if let Some(observer) = settings.observer {
            scenario.observer = observer;
        }

        let fixtures = CredentialFixtureStore::load(provider)?;
        let leaf = fixtures.delegator();
        let validity = match scenario.validity {
            Validity::Baseline => baseline_validity(leaf.not_before(), SystemTime::now()),
            Validity::Fixed(duration) => duration,
        };
        let issued = DelegatedCredentialIssuer::new(scenario.anchor).issue(
            leaf,
            scenario.credential_scheme,
            validity,
        )?;

        let recorder = scenario.record_timing.then(|| Arc::new(TimingRecorder::new()));
        let mut sinks = EventFanout::new();
        if let Some(recorder) = &recorder {
            sinks = sinks.with_sink(recorder.clone());
        }
        if settings.trace_events {
            sinks = sinks.with_sink(Arc::new(TracingEventSink));
        }

        let mut server_options = ServerOptions::default()
            .with_trust(scenario.trust)
            .with_post_quantum(scenario.server_post_quantum);
        let mut client_options = ClientOptions::default()
            .with_delegated_credentials(scenario.client_delegated_credentials)
            .with_post_quantum(scenario.client_post_quantum)
            .with_insecure_skip_verify(true);
        if let Some(sink) = sinks.into_sink() {
            server_options = server_options.with_event_sink(Arc::clone(&sink));
            client_options = client_options.with_event_sink(sink);
        }

        let server =
            EndpointConfigBuilder::build_server_config(&fixtures, Some(&issued), &server_options)?;
        let client = EndpointConfigBuilder::build_client_config(&client_options);

        let mut orchestrator =
            HandshakeOrchestrator::new(FeatureAssertion::new(scenario.observer, scenario.required));
        if let Some(deadline) = settings.deadline() {
            orchestrator = orchestrator.with_deadline(deadline);
        }
        if let Some(recorder) = recorder {
            orchestrator = orchestrator.with_timing(recorder);
        }

        debug!(
            target: "pqdc::harness",
            scenario = %scenario.kind,
            fixtures = fixtures.provider(),
            "scenario prepared"
        );

        Ok(Self {
            scenario,
            issued,
            client,
            server,
            orchestrator,
            client_message: settings.client_message.as_bytes().to_vec(),
            server_message: settings.server_message.as_bytes().to_vec(),
        })
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn credential(&self) -> &IssuedCredential {
        &self.issued
    }

    pub fn client(&self) -> &EndpointConfiguration {
        &self.client
    }

    pub fn server(&self) -> &EndpointConfiguration {
        &self.server
    }

    /// Bind, handshake, exchange and judge.
    pub async fn run(self) -> Result<ScenarioReport, HarnessError> {
        let kind = self.scenario.kind;
        let run = self
            .orchestrator
            .run(
                &self.client,
                &self.server,
                &self.client_message,
                &self.server_message,
            )
            .await?;
        let verdict = self.orchestrator.assertion().verdict(&run.outcome);

        let missing_phases = match &run.timing {
            Some(trace) => [Role::Client, Role::Server]
                .into_iter()
                .flat_map(|role| {
                    let expected = HandshakePhase::expected(role, run.outcome.did_hybrid_kem);
                    trace
                        .missing(role, &expected)
                        .into_iter()
                        .map(move |phase| (role, phase))
                })
                .collect(),
            None => Vec::new(),
        };

        if verdict.is_passed() {
            info!(target: "pqdc::harness", scenario = %kind, "scenario passed");
        } else {
            warn!(target: "pqdc::harness", scenario = %kind, %verdict, "feature not negotiated");
        }
        for (role, phase) in &missing_phases {
            warn!(target: "pqdc::harness", scenario = %kind, %role, %phase, "phase never reported");
        }

        Ok(ScenarioReport {
            kind,
            outcome: run.outcome,
            verdict,
            credential: self.issued.credential().clone(),
            credential_expires_at: self.issued.expires_at(),
            timing: run.timing,
            missing_phases,
        })
    }
}

/// Run one scenario end to end: [`PreparedScenario::prepare`], then
/// [`PreparedScenario::run`].
pub async fn run_scenario(
    scenario: impl Into<Scenario>,
    settings: &HarnessSettings,
    provider: &dyn FixtureProvider,
) -> Result<ScenarioReport, HarnessError> {
    let scenario = scenario.into();
    info!(
        target: "pqdc::harness",
        scenario = %scenario.kind,
        fixtures = provider.name(),
        "running scenario"
    );
    PreparedScenario::prepare(scenario, settings, provider)?
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_extension_differs_from_baseline_only_on_the_client() {
        let baseline = Scenario::new(ScenarioKind::Baseline);
        let no_extension = Scenario::new(ScenarioKind::NoExtension);
        assert!(!no_extension.client_delegated_credentials);
        assert_eq!(no_extension.trust, baseline.trust);
        assert_eq!(no_extension.credential_scheme, baseline.credential_scheme);
        assert_eq!(
            no_extension.required.delegated_credential,
            Expectation::Forbid
        );
    }

    #[test]
    fn post_quantum_uses_rooted_fixtures_and_timing() {
        let scenario = Scenario::from(ScenarioKind::PostQuantum);
        assert_eq!(scenario.trust, TrustMode::Rooted);
        assert_eq!(scenario.credential_scheme, SignatureScheme::MlDsa65);
        assert_eq!(scenario.anchor, ValidityAnchor::Now);
        assert_eq!(scenario.validity, Validity::Fixed(POST_QUANTUM_VALIDITY));
        assert!(scenario.record_timing);
        assert_eq!(ScenarioKind::PostQuantum.fixtures(), EmbeddedFixtures::Rooted);
    }

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in ScenarioKind::ALL {
            let yaml = serde_yaml::to_string(&kind).unwrap();
            assert_eq!(yaml.trim(), kind.name());
        }
    }
}

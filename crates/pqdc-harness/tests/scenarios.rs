use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use pqdc_harness::{
    run_scenario, EmbeddedFixtures, Expectation, Feature, FixtureError, FixturePem,
    FixtureProvider, FixtureRole, HarnessError, HarnessSettings, ObserverRole, PreparedScenario,
    RequiredFeatures, Scenario, ScenarioKind, Validity, Verdict,
};
use pqdc_tls::{HandshakePhase, Role, SignatureScheme};

const SELF_SIGNED_NOT_BEFORE_SECS: u64 = 1_614_384_961;

fn settings() -> HarnessSettings {
    HarnessSettings {
        deadline_ms: Some(30_000),
        ..HarnessSettings::default()
    }
}

#[tokio::test]
async fn baseline_verifies_delegated_credential() {
    let report = run_scenario(
        ScenarioKind::Baseline,
        &settings(),
        &ScenarioKind::Baseline.fixtures(),
    )
    .await
    .expect("baseline scenario");

    assert!(report.outcome.verified_delegated_credential);
    assert!(!report.outcome.did_hybrid_kem);
    assert_eq!(report.verdict, Verdict::Passed);
    assert!(report.passed());
    assert!(report.timing.is_none());
    assert_eq!(
        report.outcome.client.signature_scheme,
        SignatureScheme::EcdsaP256Sha256
    );
    assert!(!report.outcome.server.verified_delegated_credential);
}

#[tokio::test]
async fn client_without_extension_does_not_verify() {
    let report = run_scenario(
        ScenarioKind::NoExtension,
        &settings(),
        &ScenarioKind::NoExtension.fixtures(),
    )
    .await
    .expect("no-extension scenario");

    assert!(!report.outcome.verified_delegated_credential);
    assert_eq!(report.verdict, Verdict::Passed);
}

#[tokio::test]
async fn post_quantum_negotiates_everything_and_times_every_phase() {
    let report = run_scenario(
        ScenarioKind::PostQuantum,
        &settings(),
        &ScenarioKind::PostQuantum.fixtures(),
    )
    .await
    .expect("post-quantum scenario");

    assert!(report.outcome.verified_delegated_credential);
    assert!(report.outcome.did_hybrid_kem);
    assert_eq!(report.outcome.client.signature_scheme, SignatureScheme::MlDsa65);
    assert!(report.passed(), "missing phases: {:?}", report.missing_phases);

    let trace = report.timing.expect("timing recorded");
    for role in [Role::Client, Role::Server] {
        for phase in HandshakePhase::expected(role, true) {
            assert!(
                trace.get(role, phase).is_some(),
                "{role} never reported {phase}"
            );
        }
    }
    assert!(trace
        .get(Role::Server, HandshakePhase::ReadKemCiphertext)
        .is_some());
    assert_eq!(trace.merged().len(), trace.len());
}

#[tokio::test]
async fn one_sided_post_quantum_falls_back_to_classical() {
    for (client, server) in [(true, false), (false, true)] {
        let scenario = Scenario::new(ScenarioKind::PostQuantum).with_post_quantum(client, server);
        let report = run_scenario(scenario, &settings(), &EmbeddedFixtures::rooted())
            .await
            .expect("round trip still succeeds");

        assert!(!report.outcome.did_hybrid_kem);
        assert!(report.outcome.verified_delegated_credential);
        assert_eq!(
            report.verdict,
            Verdict::NotNegotiated(vec![Feature::HybridKem])
        );
        assert!(report.missing_phases.is_empty());
    }
}

#[tokio::test]
async fn post_quantum_without_client_delegation_still_uses_hybrid() {
    let scenario =
        Scenario::new(ScenarioKind::PostQuantum).with_client_delegated_credentials(false);
    let report = run_scenario(scenario, &settings(), &EmbeddedFixtures::rooted())
        .await
        .expect("scenario runs");

    assert!(!report.outcome.verified_delegated_credential);
    assert!(report.outcome.did_hybrid_kem);
    assert_eq!(
        report.verdict,
        Verdict::NotNegotiated(vec![Feature::DelegatedCredential])
    );
}

#[tokio::test]
async fn zero_validity_credential_is_never_presented() {
    let scenario =
        Scenario::new(ScenarioKind::Baseline).with_validity(Validity::Fixed(Duration::ZERO));
    let report = run_scenario(scenario, &settings(), &EmbeddedFixtures::self_signed())
        .await
        .expect("handshake falls back to the leaf");

    assert!(!report.outcome.verified_delegated_credential);
    assert_eq!(
        report.credential_expires_at,
        SystemTime::UNIX_EPOCH + Duration::from_secs(SELF_SIGNED_NOT_BEFORE_SECS)
    );
    assert_eq!(report.verdict.to_string(), "no delegated credential");
}

#[tokio::test]
async fn server_observer_never_sees_a_verified_credential() {
    let settings = HarnessSettings {
        observer: Some(ObserverRole::Server),
        ..settings()
    };
    let report = run_scenario(
        ScenarioKind::Baseline,
        &settings,
        &EmbeddedFixtures::self_signed(),
    )
    .await
    .expect("scenario runs");

    assert!(report.outcome.client.verified_delegated_credential);
    assert!(!report.outcome.verified_delegated_credential);
    assert!(!report.passed());
}

#[tokio::test]
async fn custom_messages_are_exchanged() {
    let settings = HarnessSettings {
        client_message: "x".repeat(40_000),
        server_message: "pong".to_owned(),
        ..settings()
    };
    let scenario = Scenario::new(ScenarioKind::Baseline).with_required(
        RequiredFeatures::none().with_delegated_credential(Expectation::Ignore),
    );
    let report = run_scenario(scenario, &settings, &EmbeddedFixtures::self_signed())
        .await
        .expect("multi-record message round trip");
    assert!(report.passed());
}

#[derive(Debug)]
struct TruncatedCertificate;

impl FixtureProvider for TruncatedCertificate {
    fn name(&self) -> &str {
        "truncated"
    }

    fn pem(&self, role: FixtureRole) -> Option<FixturePem> {
        let full = EmbeddedFixtures::self_signed().pem(role)?;
        let half = full.certificate.len() / 2;
        Some(FixturePem::new(&full.certificate[..half], full.private_key))
    }
}

#[derive(Debug)]
struct RootOnly;

impl FixtureProvider for RootOnly {
    fn name(&self) -> &str {
        "root-only"
    }

    fn pem(&self, role: FixtureRole) -> Option<FixturePem> {
        match role {
            FixtureRole::Root => EmbeddedFixtures::rooted().pem(role),
            FixtureRole::Delegator => None,
        }
    }
}

#[tokio::test]
async fn corrupt_fixture_is_fatal() {
    let err = run_scenario(ScenarioKind::Baseline, &settings(), &TruncatedCertificate)
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        HarnessError::Fixture(FixtureError::Corrupt {
            role: FixtureRole::Delegator,
            ..
        })
    ));
}

/// Serves the embedded fixtures and counts every lookup.
#[derive(Debug)]
struct CountingProvider {
    inner: EmbeddedFixtures,
    lookups: AtomicUsize,
}

impl CountingProvider {
    fn new(inner: EmbeddedFixtures) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl FixtureProvider for CountingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pem(&self, role: FixtureRole) -> Option<FixturePem> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.pem(role)
    }
}

// Preparing is synchronous and needs no runtime, so a corrupt fixture is
// reported before any listener could exist.
#[test]
fn corrupt_fixture_fails_preparation() {
    let err =
        PreparedScenario::prepare(ScenarioKind::Baseline, &settings(), &TruncatedCertificate)
            .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        HarnessError::Fixture(FixtureError::Corrupt {
            role: FixtureRole::Delegator,
            ..
        })
    ));
}

#[tokio::test]
async fn fixtures_are_read_only_while_preparing() {
    let provider = CountingProvider::new(EmbeddedFixtures::self_signed());
    let prepared = PreparedScenario::prepare(ScenarioKind::Baseline, &settings(), &provider)
        .expect("prepare baseline");
    let after_prepare = provider.lookups();
    assert!(after_prepare > 0);
    assert_eq!(prepared.scenario().kind, ScenarioKind::Baseline);
    assert_eq!(
        prepared.credential().scheme(),
        SignatureScheme::EcdsaP256Sha256
    );

    let report = prepared.run().await.expect("baseline run");
    assert!(report.passed());
    assert_eq!(provider.lookups(), after_prepare);
}

#[tokio::test]
async fn traced_events_do_not_displace_timing() {
    let settings = HarnessSettings {
        trace_events: true,
        ..settings()
    };
    let report = run_scenario(
        ScenarioKind::PostQuantum,
        &settings,
        &ScenarioKind::PostQuantum.fixtures(),
    )
    .await
    .expect("post-quantum scenario");

    assert!(report.timing.is_some());
    assert!(report.missing_phases.is_empty());
    assert!(report.passed());
}

#[tokio::test]
async fn missing_delegator_is_fatal() {
    let err = run_scenario(ScenarioKind::Baseline, &settings(), &RootOnly)
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        HarnessError::Fixture(FixtureError::MissingRole {
            role: FixtureRole::Delegator,
            ..
        })
    ));
}

#[tokio::test]
async fn rooted_scenario_needs_root_material() {
    let err = run_scenario(
        ScenarioKind::PostQuantum,
        &settings(),
        &EmbeddedFixtures::self_signed(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Fixture(FixtureError::MissingRole {
            role: FixtureRole::Root,
            ..
        })
    ));
}

//! Conformance scenarios that drive a [`pqdc_tls`] client and server over a
//! loopback TCP connection and judge what they negotiated.
//!
//! A scenario loads certificate fixtures, issues a delegated credential,
//! builds both endpoint configurations, runs one handshake plus a message
//! round trip, and reports a [`Verdict`] along with optional phase timings.

mod assertion;
mod endpoint;
mod error;
mod exchange;
mod fixtures;
mod issuer;
mod orchestrator;
mod scenario;
mod settings;
mod timing;

pub use assertion::{
    Expectation, Feature, FeatureAssertion, HandshakeOutcome, ObserverRole, RequiredFeatures,
    Verdict,
};
pub use endpoint::{
    ClientOptions, EndpointConfigBuilder, EndpointConfiguration, ServerOptions, TrustMode,
    MAX_VERSION, MIN_VERSION,
};
pub use error::HarnessError;
pub use exchange::{ExchangeError, MessageExchangeVerifier};
pub use fixtures::{
    CertificateFixture, CredentialFixtureStore, EmbeddedFixtures, FixtureError, FixturePem,
    FixtureProvider, FixtureRole,
};
pub use issuer::{
    baseline_validity, DelegatedCredentialIssuer, IssuedCredential, IssuerError, ValidityAnchor,
};
pub use orchestrator::{HandshakeOrchestrator, ScenarioRun};
pub use scenario::{
    run_scenario, PreparedScenario, Scenario, ScenarioKind, ScenarioReport, Validity,
};
pub use settings::{HarnessSettings, SettingsError, DEFAULT_CLIENT_MESSAGE, DEFAULT_SERVER_MESSAGE};
pub use timing::{TimingRecorder, TimingTrace};

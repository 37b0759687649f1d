use std::sync::Arc;

use pqdc_tls::{Config, HandshakeEventSink, ProtocolVersion, Role, TrustStore};

use crate::fixtures::{CredentialFixtureStore, FixtureError, FixtureRole};
use crate::issuer::IssuedCredential;

pub const MIN_VERSION: ProtocolVersion = ProtocolVersion::Tls10;
pub const MAX_VERSION: ProtocolVersion = ProtocolVersion::Tls13;

/// Where the server's trust pool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustMode {
    /// The delegator leaf trusts itself.
    #[default]
    SelfSigned,
    /// The root fixture anchors the pool.
    Rooted,
}

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub trust: TrustMode,
    pub post_quantum: bool,
    pub event_sink: Option<Arc<dyn HandshakeEventSink>>,
}

impl ServerOptions {
    pub fn with_trust(mut self, trust: TrustMode) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_post_quantum(mut self, enable: bool) -> Self {
        self.post_quantum = enable;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn HandshakeEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub support_delegated_credential: bool,
    pub post_quantum: bool,
    /// Accept any server leaf. Test fixtures are not chained to a public
    /// root, so every scenario sets this.
    pub insecure_skip_verify: bool,
    pub trust_roots: Option<TrustStore>,
    pub event_sink: Option<Arc<dyn HandshakeEventSink>>,
}

impl ClientOptions {
    pub fn with_delegated_credentials(mut self, enable: bool) -> Self {
        self.support_delegated_credential = enable;
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

    pub fn with_trust_roots(mut self, roots: TrustStore) -> Self {
        self.trust_roots = Some(roots);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn HandshakeEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }
}

/// A finished endpoint configuration, immutable once built.
#[derive(Debug, Clone)]
pub struct EndpointConfiguration {
    role: Role,
    tls: Arc<Config>,
}

impl EndpointConfiguration {
    /// Wrap a hand-built engine configuration.
    pub fn new(role: Role, tls: Arc<Config>) -> Self {
        Self { role, tls }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tls(&self) -> &Arc<Config> {
        &self.tls
    }
}

/// Builds client and server configurations from fixtures and options.
/// Performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointConfigBuilder;

impl EndpointConfigBuilder {
    pub fn build_server_config(
        fixtures: &CredentialFixtureStore,
        credential: Option<&IssuedCredential>,
        options: &ServerOptions,
    ) -> Result<EndpointConfiguration, FixtureError> {
        let delegator = fixtures.delegator();
        let mut certified = delegator.certified().clone();
        if let Some(issued) = credential {
            certified = certified.with_delegated_credential(issued.pair().clone());
        }

        let trust_anchor = match options.trust {
            TrustMode::SelfSigned => delegator.leaf_der(),
            TrustMode::Rooted => fixtures.get(FixtureRole::Root)?.leaf_der(),
        };

        let mut config = Config::default()
            .with_versions(MIN_VERSION, MAX_VERSION)
            .with_certificate(certified)
            .with_root_certificates(TrustStore::new().with_root(trust_anchor.to_vec()))
            .with_post_quantum(options.post_quantum);
        if let Some(sink) = &options.event_sink {
            config = config.with_event_sink(Arc::clone(sink));
        }

        Ok(EndpointConfiguration {
            role: Role::Server,
            tls: Arc::new(config),
        })
    }

    pub fn build_client_config(options: &ClientOptions) -> EndpointConfiguration {
        let mut config = Config::default()
            .with_versions(MIN_VERSION, MAX_VERSION)
            .with_delegated_credentials(options.support_delegated_credential)
            .with_post_quantum(options.post_quantum)
            .with_insecure_skip_verify(options.insecure_skip_verify);
        if let Some(roots) = &options.trust_roots {
            config = config.with_root_certificates(roots.clone());
        }
        if let Some(sink) = &options.event_sink {
            config = config.with_event_sink(Arc::clone(sink));
        }

        EndpointConfiguration {
            role: Role::Client,
            tls: Arc::new(config),
        }
    }
}

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use pqdc_tls::{Config, TlsStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assertion::{FeatureAssertion, HandshakeOutcome};
use crate::endpoint::EndpointConfiguration;
use crate::error::HarnessError;
use crate::exchange::MessageExchangeVerifier;
use crate::timing::{TimingRecorder, TimingTrace};

/// What a completed handshake and exchange produced.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub server_addr: SocketAddr,
    pub outcome: HandshakeOutcome,
    pub timing: Option<TimingTrace>,
}

/// Runs one client/server handshake over loopback TCP.
///
/// The server runs on a spawned task and reports its handshake result
/// through a oneshot; the client runs on the caller's future. Without a
/// deadline a stalled peer blocks the run indefinitely.
#[derive(Debug, Clone, Default)]
pub struct HandshakeOrchestrator {
    assertion: FeatureAssertion,
    deadline: Option<Duration>,
    timing: Option<Arc<TimingRecorder>>,
}

impl HandshakeOrchestrator {
    pub fn new(assertion: FeatureAssertion) -> Self {
        Self {
            assertion,
            deadline: None,
            timing: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Snapshot `recorder` into the run result. The recorder must already be
    /// registered as the event sink of both configurations.
    pub fn with_timing(mut self, recorder: Arc<TimingRecorder>) -> Self {
        self.timing = Some(recorder);
        self
    }

    pub fn assertion(&self) -> &FeatureAssertion {
        &self.assertion
    }

    pub async fn run(
        &self,
        client: &EndpointConfiguration,
        server: &EndpointConfiguration,
        client_message: &[u8],
        server_message: &[u8],
    ) -> Result<ScenarioRun, HarnessError> {
        let drive = self.drive(client, server, client_message, server_message);
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, drive)
                .await
                .map_err(|_| HarnessError::DeadlineElapsed(deadline))?,
            None => drive.await,
        }
    }

    async fn drive(
        &self,
        client: &EndpointConfiguration,
        server: &EndpointConfiguration,
        client_message: &[u8],
        server_message: &[u8],
    ) -> Result<ScenarioRun, HarnessError> {
        let listener = Arc::new(bind_loopback().await?);
        let server_addr = listener.local_addr().map_err(HarnessError::ListenerAddr)?;
        debug!(target: "pqdc::harness", %server_addr, "listener bound");

        let (signal, done) = oneshot::channel();
        let _server_task = AbortOnDrop(tokio::spawn(serve_one(
            Arc::clone(&listener),
            Arc::clone(server.tls()),
            signal,
        )));

        let tcp = TcpStream::connect(server_addr)
            .await
            .map_err(HarnessError::Dial)?;
        let mut client_stream = match TlsStream::connect(tcp, Arc::clone(client.tls())).await {
            Ok(stream) => stream,
            // A bare hang-up means the server gave up first; its error names
            // the cause.
            Err(err) if err.is_peer_hang_up() => {
                return Err(match done.await {
                    Ok(Err(server_err)) => server_err,
                    _ => HarnessError::ClientHandshake(err),
                });
            }
            Err(err) => return Err(HarnessError::ClientHandshake(err)),
        };
        let mut server_stream = match done.await {
            Ok(result) => result?,
            Err(_) => return Err(HarnessError::ServerTaskLost),
        };
        debug!(
            target: "pqdc::harness",
            client_addr = ?client_stream.get_ref().local_addr().ok(),
            "client connected"
        );

        MessageExchangeVerifier::new(client_message, server_message)
            .verify(&mut client_stream, &mut server_stream)
            .await?;

        let outcome = self.assertion.inspect(
            client_stream.connection_state(),
            server_stream.connection_state(),
        );
        info!(
            target: "pqdc::harness",
            %server_addr,
            verified_delegated_credential = outcome.verified_delegated_credential,
            did_hybrid_kem = outcome.did_hybrid_kem,
            cipher_suite = ?outcome.client.cipher_suite,
            "handshake complete"
        );

        if let Err(err) = client_stream.close().await {
            debug!(target: "pqdc::harness", error = %err, "client close failed");
        }
        if let Err(err) = server_stream.close().await {
            debug!(target: "pqdc::harness", error = %err, "server close failed");
        }

        Ok(ScenarioRun {
            server_addr,
            outcome,
            timing: self.timing.as_ref().map(|recorder| recorder.snapshot()),
        })
    }
}

type ServerResult = Result<TlsStream<TcpStream>, HarnessError>;

async fn serve_one(
    listener: Arc<TcpListener>,
    config: Arc<Config>,
    signal: oneshot::Sender<ServerResult>,
) {
    let result = match listener.accept().await {
        Ok((tcp, peer)) => {
            debug!(target: "pqdc::harness", %peer, "accepted connection");
            TlsStream::accept(tcp, config)
                .await
                .map_err(HarnessError::ServerHandshake)
        }
        Err(err) => Err(HarnessError::Accept(err)),
    };
    if let Err(err) = &result {
        warn!(target: "pqdc::harness", error = %err, "server side failed");
    }
    // The receiver is gone once the client side has already failed.
    let _ = signal.send(result);
}

async fn bind_loopback() -> Result<TcpListener, HarnessError> {
    let v4 = match TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await {
        Ok(listener) => return Ok(listener),
        Err(err) => err,
    };
    warn!(target: "pqdc::harness", error = %v4, "ipv4 loopback unavailable, trying ipv6");
    TcpListener::bind((Ipv6Addr::LOCALHOST, 0))
        .await
        .map_err(|v6| HarnessError::Bind { v4, v6 })
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

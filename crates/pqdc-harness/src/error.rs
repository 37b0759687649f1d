use std::io;
use std::time::Duration;

use pqdc_tls::TlsError;
use thiserror::Error;

use crate::exchange::ExchangeError;
use crate::fixtures::FixtureError;
use crate::issuer::IssuerError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("fixture error: {0}")]
    Fixture(#[from] FixtureError),
    #[error("credential issuance failed: {0}")]
    Issuer(#[from] IssuerError),
    #[error("no loopback listener could be bound (127.0.0.1: {v4}; [::1]: {v6})")]
    Bind { v4: io::Error, v6: io::Error },
    #[error("listener address unavailable: {0}")]
    ListenerAddr(#[source] io::Error),
    #[error("dial failed: {0}")]
    Dial(#[source] io::Error),
    #[error("server accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("client handshake failed: {0}")]
    ClientHandshake(#[source] TlsError),
    #[error("server handshake failed: {0}")]
    ServerHandshake(#[source] TlsError),
    #[error("server task ended without reporting a result")]
    ServerTaskLost,
    #[error("message exchange failed: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("scenario did not finish within {0:?}")]
    DeadlineElapsed(Duration),
}

impl HarnessError {
    /// Errors after which no further scenario can be expected to run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Fixture(_)
                | HarnessError::Issuer(_)
                | HarnessError::Bind { .. }
                | HarnessError::ListenerAddr(_)
        )
    }
}

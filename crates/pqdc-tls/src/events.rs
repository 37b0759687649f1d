use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Which side of the handshake an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Named handshake milestones reported through [`HandshakeEventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandshakePhase {
    WriteClientHello,
    ProcessClientHello,
    WriteServerHello,
    ProcessServerHello,
    WriteEncryptedExtensions,
    ReadEncryptedExtensions,
    WriteCertificate,
    ReadCertificate,
    WriteCertificateVerify,
    ReadCertificateVerify,
    WriteKemCiphertext,
    ReadKemCiphertext,
    WriteClientFinished,
    ReadClientFinished,
    WriteServerFinished,
    ReadServerFinished,
}

impl HandshakePhase {
    pub fn name(self) -> &'static str {
        match self {
            HandshakePhase::WriteClientHello => "WriteClientHello",
            HandshakePhase::ProcessClientHello => "ProcessClientHello",
            HandshakePhase::WriteServerHello => "WriteServerHello",
            HandshakePhase::ProcessServerHello => "ProcessServerHello",
            HandshakePhase::WriteEncryptedExtensions => "WriteEncryptedExtensions",
            HandshakePhase::ReadEncryptedExtensions => "ReadEncryptedExtensions",
            HandshakePhase::WriteCertificate => "WriteCertificate",
            HandshakePhase::ReadCertificate => "ReadCertificate",
            HandshakePhase::WriteCertificateVerify => "WriteCertificateVerify",
            HandshakePhase::ReadCertificateVerify => "ReadCertificateVerify",
            HandshakePhase::WriteKemCiphertext => "WriteKEMCiphertext",
            HandshakePhase::ReadKemCiphertext => "ReadKEMCiphertext",
            HandshakePhase::WriteClientFinished => "WriteClientFinished",
            HandshakePhase::ReadClientFinished => "ReadClientFinished",
            HandshakePhase::WriteServerFinished => "WriteServerFinished",
            HandshakePhase::ReadServerFinished => "ReadServerFinished",
        }
    }

    /// Phases `role` reports during a complete handshake, in emission order.
    /// KEM ciphertext phases only occur when the hybrid exchange is used.
    pub fn expected(role: Role, hybrid: bool) -> Vec<HandshakePhase> {
        use HandshakePhase::*;

        let mut phases = Vec::with_capacity(9);
        match role {
            Role::Client => {
                phases.extend([WriteClientHello, ProcessServerHello]);
                if hybrid {
                    phases.push(ReadKemCiphertext);
                }
                phases.extend([ReadEncryptedExtensions, ReadCertificate, ReadCertificateVerify]);
                if hybrid {
                    phases.push(WriteKemCiphertext);
                }
                phases.extend([WriteClientFinished, ReadServerFinished]);
            }
            Role::Server => {
                phases.extend([ProcessClientHello, WriteServerHello]);
                if hybrid {
                    phases.push(WriteKemCiphertext);
                }
                phases.extend([WriteEncryptedExtensions, WriteCertificate, WriteCertificateVerify]);
                if hybrid {
                    phases.push(ReadKemCiphertext);
                }
                phases.extend([ReadClientFinished, WriteServerFinished]);
            }
        }
        phases
    }
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeEvent {
    pub role: Role,
    pub phase: HandshakePhase,
    pub at: SystemTime,
}

/// Receives handshake milestones as they happen. Called inline from the
/// handshake, so implementations must not block.
pub trait HandshakeEventSink: Send + Sync + fmt::Debug {
    fn on_event(&self, event: &HandshakeEvent);
}

/// Sink that forwards every milestone to the tracing subsystem.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl HandshakeEventSink for TracingEventSink {
    fn on_event(&self, event: &HandshakeEvent) {
        tracing::debug!(
            target: "pqdc::tls::events",
            role = %event.role,
            phase = %event.phase,
            at = ?event.at,
            "handshake phase"
        );
    }
}

/// Forwards every milestone to each inner sink in order. A [`Config`]
/// carries one sink; this lets timing and logging share it.
///
/// [`Config`]: crate::Config
#[derive(Debug, Default, Clone)]
pub struct EventFanout {
    sinks: Vec<Arc<dyn HandshakeEventSink>>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn HandshakeEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Collapse into the single sink a [`Config`](crate::Config) takes.
    /// `None` when empty; the sink itself when there is only one.
    pub fn into_sink(mut self) -> Option<Arc<dyn HandshakeEventSink>> {
        match self.sinks.len() {
            0 => None,
            1 => self.sinks.pop(),
            _ => Some(Arc::new(self)),
        }
    }
}

impl HandshakeEventSink for EventFanout {
    fn on_event(&self, event: &HandshakeEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}

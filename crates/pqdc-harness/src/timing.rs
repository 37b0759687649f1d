use std::collections::BTreeMap;
use std::time::SystemTime;

use parking_lot::Mutex;
use pqdc_tls::{HandshakeEvent, HandshakeEventSink, HandshakePhase, Role};

/// Latest timestamp seen per (role, phase).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingTrace {
    entries: BTreeMap<(Role, HandshakePhase), SystemTime>,
}

impl TimingTrace {
    pub fn record(&mut self, event: &HandshakeEvent) {
        self.entries.insert((event.role, event.phase), event.at);
    }

    /// `None` stands for a phase that never fired.
    pub fn get(&self, role: Role, phase: HandshakePhase) -> Option<SystemTime> {
        self.entries.get(&(role, phase)).copied()
    }

    pub fn missing(&self, role: Role, expected: &[HandshakePhase]) -> Vec<HandshakePhase> {
        expected
            .iter()
            .copied()
            .filter(|phase| !self.entries.contains_key(&(role, *phase)))
            .collect()
    }

    /// All entries ordered by timestamp.
    pub fn merged(&self) -> Vec<(Role, HandshakePhase, SystemTime)> {
        let mut merged: Vec<_> = self
            .entries
            .iter()
            .map(|(&(role, phase), &at)| (role, phase, at))
            .collect();
        merged.sort_by_key(|&(role, phase, at)| (at, role, phase));
        merged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Event sink shared by both endpoints of a scenario.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    trace: Mutex<TimingTrace>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TimingTrace {
        self.trace.lock().clone()
    }
}

impl HandshakeEventSink for TimingRecorder {
    fn on_event(&self, event: &HandshakeEvent) {
        self.trace.lock().record(event);
    }
}

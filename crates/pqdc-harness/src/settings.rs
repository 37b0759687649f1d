use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assertion::ObserverRole;
use crate::scenario::ScenarioKind;

pub const DEFAULT_CLIENT_MESSAGE: &str = "hello, server";
pub const DEFAULT_SERVER_MESSAGE: &str = "hello, client";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings {0} must end in .yaml, .yml or .json")]
    UnsupportedFormat(PathBuf),
    #[error("{0} must not be empty")]
    EmptyMessage(&'static str),
    #[error("client and server messages must differ")]
    IdenticalMessages,
}

/// Run-wide knobs for the scenario runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessSettings {
    pub scenarios: Vec<ScenarioKind>,
    pub client_message: String,
    pub server_message: String,
    /// Per-scenario deadline in milliseconds. Absent means no deadline.
    pub deadline_ms: Option<u64>,
    pub observer: Option<ObserverRole>,
    /// Forward every handshake phase to the tracing subscriber at debug.
    pub trace_events: bool,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            scenarios: ScenarioKind::ALL.to_vec(),
            client_message: DEFAULT_CLIENT_MESSAGE.to_owned(),
            server_message: DEFAULT_SERVER_MESSAGE.to_owned(),
            deadline_ms: None,
            observer: None,
            trace_events: false,
        }
    }
}

impl HarnessSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let source = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source, path)
    }

    /// Parse `source`, picking the format from `path`'s extension.
    pub fn parse(source: &str, path: &Path) -> Result<Self, SettingsError> {
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        let settings: Self = if ext.eq_ignore_ascii_case("json") {
            serde_json::from_str(source).map_err(|source| SettingsError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            serde_yaml::from_str(source).map_err(|source| SettingsError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            return Err(SettingsError::UnsupportedFormat(path.to_path_buf()));
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.client_message.is_empty() {
            return Err(SettingsError::EmptyMessage("client_message"));
        }
        if self.server_message.is_empty() {
            return Err(SettingsError::EmptyMessage("server_message"));
        }
        if self.client_message == self.server_message {
            return Err(SettingsError::IdenticalMessages);
        }
        Ok(())
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

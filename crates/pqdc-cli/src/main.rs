use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{ArgAction, Parser, ValueEnum};
use pqdc_harness::{run_scenario, HarnessSettings, ObserverRole, ScenarioKind, ScenarioReport};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pqdc",
    author,
    version,
    about = "Run delegated credential and hybrid KEM handshake scenarios over loopback"
)]
struct Cli {
    /// Increase output verbosity (-v, -vv).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Output log format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Settings file (.yaml, .yml or .json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scenario to run; repeat the flag to run several. Defaults to all.
    #[arg(short, long = "scenario", value_enum)]
    scenarios: Vec<ScenarioArg>,

    /// Message the client sends to the server.
    #[arg(long)]
    client_message: Option<String>,

    /// Message the server sends back to the client.
    #[arg(long)]
    server_message: Option<String>,

    /// Abort each scenario after this long (e.g. "5s", "250ms").
    #[arg(long, value_parser = humantime::parse_duration)]
    deadline: Option<Duration>,

    /// Endpoint whose state decides whether a delegated credential was verified.
    #[arg(long, value_enum)]
    observer: Option<ObserverArg>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ScenarioArg {
    Baseline,
    NoExtension,
    PostQuantum,
}

impl From<ScenarioArg> for ScenarioKind {
    fn from(value: ScenarioArg) -> Self {
        match value {
            ScenarioArg::Baseline => ScenarioKind::Baseline,
            ScenarioArg::NoExtension => ScenarioKind::NoExtension,
            ScenarioArg::PostQuantum => ScenarioKind::PostQuantum,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ObserverArg {
    Client,
    Server,
}

impl From<ObserverArg> for ObserverRole {
    fn from(value: ObserverArg) -> Self {
        match value {
            ObserverArg::Client => ObserverRole::Client,
            ObserverArg::Server => ObserverRole::Server,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let settings = resolve_settings(&cli)?;
    let total = settings.scenarios.len();
    let mut failures = 0usize;

    for kind in settings.scenarios.clone() {
        match run_scenario(kind, &settings, &kind.fixtures()).await {
            Ok(report) => {
                log_report(&report);
                if !report.passed() {
                    failures += 1;
                }
            }
            Err(err) if err.is_fatal() => {
                return Err(err).with_context(|| format!("scenario {kind} aborted the run"));
            }
            Err(err) => {
                error!(target: "pqdc::cli", scenario = %kind, error = %err, "scenario failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {total} scenarios failed");
    }
    info!(target: "pqdc::cli", scenarios = total, "all scenarios passed");
    Ok(())
}

/// File settings first, then command-line overrides.
fn resolve_settings(cli: &Cli) -> Result<HarnessSettings> {
    let mut settings = match &cli.config {
        Some(path) => HarnessSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => HarnessSettings::default(),
    };

    if !cli.scenarios.is_empty() {
        settings.scenarios = cli.scenarios.iter().copied().map(Into::into).collect();
    }
    if let Some(message) = &cli.client_message {
        settings.client_message = message.clone();
    }
    if let Some(message) = &cli.server_message {
        settings.server_message = message.clone();
    }
    if let Some(deadline) = cli.deadline {
        settings.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
    }
    if let Some(observer) = cli.observer {
        settings.observer = Some(observer.into());
    }
    // Handshake phases are logged at debug, which -v enables.
    if cli.verbose > 0 {
        settings.trace_events = true;
    }

    settings.validate().context("invalid harness settings")?;
    Ok(settings)
}

fn log_report(report: &ScenarioReport) {
    let outcome = &report.outcome;
    match report.credential.marshal() {
        Ok(encoded) => debug!(
            target: "pqdc::cli",
            scenario = %report.kind,
            credential = %BASE64.encode(encoded),
            "delegated credential"
        ),
        Err(err) => debug!(target: "pqdc::cli", error = %err, "credential not encodable"),
    }

    info!(
        target: "pqdc::cli",
        scenario = %report.kind,
        version = %outcome.client.version,
        cipher_suite = ?outcome.client.cipher_suite,
        signature_scheme = %outcome.client.signature_scheme,
        verified_delegated_credential = outcome.verified_delegated_credential,
        did_hybrid_kem = outcome.did_hybrid_kem,
        credential_expires_at = %timestamp(report.credential_expires_at),
        "handshake outcome"
    );

    if let Some(trace) = &report.timing {
        let merged = trace.merged();
        let start = merged.first().map(|(_, _, at)| *at);
        for (role, phase, at) in merged {
            let offset = start
                .and_then(|start| at.duration_since(start).ok())
                .unwrap_or_default();
            info!(
                target: "pqdc::cli",
                scenario = %report.kind,
                %role,
                %phase,
                at = %timestamp(at),
                offset_us = u64::try_from(offset.as_micros()).unwrap_or(u64::MAX),
                "phase"
            );
        }
    }
    for (role, phase) in &report.missing_phases {
        warn!(target: "pqdc::cli", scenario = %report.kind, %role, %phase, "phase missing from trace");
    }

    if report.verdict.is_passed() {
        info!(target: "pqdc::cli", scenario = %report.kind, verdict = %report.verdict, "scenario finished");
    } else {
        warn!(target: "pqdc::cli", scenario = %report.kind, verdict = %report.verdict, "scenario finished");
    }
}

fn timestamp(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(
            filter
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let _ = match format {
        LogFormat::Compact => subscriber.compact().try_init(),
        LogFormat::Pretty => subscriber.pretty().try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };
}

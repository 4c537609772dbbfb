use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::info;

use followup_gate::config::GateConfig;
use followup_gate::engine::{EngineInput, evaluate};
use followup_gate::lead::LeadEngagementState;
use followup_gate::orchestrator::{AuditOutcome, AuditRecord, AuditSink, JsonlAuditSink};

/// Engine input as accepted on the command line; missing fields fall back
/// to the clock and configuration.
#[derive(Debug, Deserialize)]
struct InputDocument {
    #[serde(default)]
    lead_id: Option<String>,
    current_state: LeadEngagementState,
    #[serde(default)]
    last_outbound_at: Option<DateTime<Utc>>,
    #[serde(default)]
    inbound_message_times: Vec<DateTime<Utc>>,
    #[serde(default)]
    delay_minutes: Option<i64>,
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

impl InputDocument {
    fn into_engine_input(self, config: &GateConfig, clock: DateTime<Utc>) -> EngineInput {
        EngineInput {
            current_state: self.current_state,
            last_outbound_at: self.last_outbound_at,
            inbound_message_times: self.inbound_message_times,
            delay_minutes: self.delay_minutes.unwrap_or(config.default_delay_minutes),
            now: self.now.unwrap_or(clock),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the audit record.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = GateConfig::from_env()?;

    let raw = match std::env::args().nth(1) {
        Some(path) if path != "-" => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path}"))?,
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read stdin")?;
            buf
        }
    };

    let document: InputDocument =
        serde_json::from_str(&raw).context("input is not a valid engine input document")?;
    let lead_id = document.lead_id.clone();

    // Captured once; the engine never reads the clock itself.
    let clock = Utc::now();
    let input = document.into_engine_input(&config, clock);
    let decision = evaluate(&input);

    info!(
        lead_id = lead_id.as_deref().unwrap_or("-"),
        action = %decision.action,
        rule = %decision.rule,
        "{}",
        decision.explanation
    );

    let record = AuditRecord::new(
        lead_id,
        config.engine_version.clone(),
        clock,
        decision,
        AuditOutcome::Evaluated,
    );

    if let Some(path) = &config.audit_log_path {
        JsonlAuditSink::new(path.clone())
            .append(&record)
            .await
            .with_context(|| format!("failed to append audit record to {}", path.display()))?;
    }

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

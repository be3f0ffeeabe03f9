//! PPC Insights: performance analytics for multi-platform paid campaigns.
//!
//! Reads workspace snapshots as JSON, runs the insights engine and writes the
//! resulting summaries as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use ppc_analytics::{InsightsEngine, InsightsSummary, WorkspaceData};
use ppc_core::AnalyticsConfig;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "ppc-insights")]
#[command(about = "Anomalies, budget recommendations, forecasts and pacing for paid campaigns")]
#[command(version)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true, env = "PPC_INSIGHTS_CONFIG")]
    config: Option<PathBuf>,

    /// Reference date for the analysis (overrides config), e.g. 2024-06-15
    #[arg(long, global = true, env = "PPC_INSIGHTS__TODAY")]
    today: Option<NaiveDate>,

    /// Trailing window for anomalies and budget analysis (overrides config)
    #[arg(long, global = true, env = "PPC_INSIGHTS__LOOKBACK_DAYS")]
    lookback_days: Option<u32>,

    /// Days ahead to forecast (overrides config)
    #[arg(long, global = true, env = "PPC_INSIGHTS__FORECAST_DAYS")]
    forecast_days: Option<u32>,

    /// Write output here instead of stdout
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a single workspace snapshot
    Analyze {
        /// JSON file holding one workspace: id, campaigns and daily metrics
        workspace: PathBuf,
    },
    /// Analyze a JSON array of workspaces; one failure does not stop the rest
    AnalyzeAll {
        workspaces: PathBuf,
    },
    /// Project conversions up to a target date
    ForecastConversions {
        workspace: PathBuf,
        /// Defaults to the last day of the current month
        #[arg(long)]
        target_date: Option<NaiveDate>,
    },
}

/// Per-workspace outcome of a batch run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum BatchOutcome {
    Ok { summary: Box<InsightsSummary> },
    Error { workspace_id: String, error: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ppc_insights=info,ppc_analytics=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;

    if let Some(today) = cli.today {
        config.today = Some(today);
    }
    if let Some(days) = cli.lookback_days {
        config.lookback_days = days;
    }
    if let Some(days) = cli.forecast_days {
        config.forecast_days = days;
    }
    config.validate().context("invalid configuration")?;

    let today = config.reference_date();
    info!(
        %today,
        lookback_days = config.lookback_days,
        forecast_days = config.forecast_days,
        "Configuration loaded"
    );

    let engine = Arc::new(InsightsEngine::new(config));

    let output = match cli.command {
        Command::Analyze { workspace } => {
            let data: WorkspaceData = read_json(&workspace)?;
            let summary = engine
                .generate_insights(&data, today)
                .with_context(|| format!("analysis failed for workspace {}", data.workspace_id))?;
            serde_json::to_string_pretty(&summary)?
        }
        Command::AnalyzeAll { workspaces } => {
            let batch: Vec<WorkspaceData> = read_json(&workspaces)?;
            let outcomes = analyze_all(engine, batch, today).await;
            serde_json::to_string_pretty(&outcomes)?
        }
        Command::ForecastConversions {
            workspace,
            target_date,
        } => {
            let data: WorkspaceData = read_json(&workspace)?;
            let outlook = engine.forecaster().forecast_conversions(
                &data.daily_metrics,
                today,
                target_date,
            );
            if outlook.is_none() {
                warn!(
                    workspace_id = %data.workspace_id,
                    "Not enough history to forecast conversions"
                );
            }
            serde_json::to_string_pretty(&outlook)?
        }
    };

    match cli.output {
        Some(path) => fs::write(&path, output)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{output}"),
    }
    Ok(())
}

/// Analyze every workspace on the blocking pool. Outcomes come back in input
/// order; a failed or panicked workspace yields an error entry.
async fn analyze_all(
    engine: Arc<InsightsEngine>,
    batch: Vec<WorkspaceData>,
    today: NaiveDate,
) -> Vec<BatchOutcome> {
    info!(workspaces = batch.len(), "Starting batch analysis");

    let handles: Vec<_> = batch
        .into_iter()
        .map(|data| {
            let engine = Arc::clone(&engine);
            let workspace_id = data.workspace_id.clone();
            let handle =
                tokio::task::spawn_blocking(move || engine.generate_insights(&data, today));
            (workspace_id, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (workspace_id, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(summary)) => BatchOutcome::Ok {
                summary: Box::new(summary),
            },
            Ok(Err(e)) => {
                error!(%workspace_id, error = %e, "Workspace analysis failed");
                BatchOutcome::Error {
                    workspace_id,
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(%workspace_id, error = %e, "Workspace analysis task aborted");
                BatchOutcome::Error {
                    workspace_id,
                    error: e.to_string(),
                }
            }
        };
        outcomes.push(outcome);
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, BatchOutcome::Error { .. }))
        .count();
    info!(
        workspaces = outcomes.len(),
        failed, "Batch analysis complete"
    );
    outcomes
}

/// An explicitly named config file must load; without one, a broken
/// environment falls back to defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<AnalyticsConfig> {
    match path {
        Some(path) => AnalyticsConfig::load(Some(path))
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(AnalyticsConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AnalyticsConfig::default()
        })),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppc_core::{Campaign, CampaignStatus, DailyMetricRecord};
    use tempfile::tempdir;

    fn workspace(id: &str, campaign_id: &str) -> WorkspaceData {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let daily_metrics = (0..10)
            .map(|i| DailyMetricRecord {
                campaign_id: campaign_id.into(),
                campaign_name: "Search".into(),
                provider: "google_ads".into(),
                date: today - chrono::Duration::days(i),
                impressions: 1_000,
                clicks: 50,
                spend_micros: 40_000_000,
                conversions: 2.0,
                conversion_value: 80.0,
            })
            .collect();
        WorkspaceData {
            workspace_id: id.into(),
            campaigns: vec![Campaign {
                id: "c-1".into(),
                name: "Search".into(),
                provider: "google_ads".into(),
                status: CampaignStatus::Enabled,
                daily_budget_micros: 50_000_000,
            }],
            daily_metrics,
            total_budget_constraint: None,
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_keeps_order() {
        let engine = Arc::new(InsightsEngine::default());
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let batch = vec![
            workspace("ws-a", "c-1"),
            workspace("ws-bad", ""),
            workspace("ws-c", "c-1"),
        ];

        let outcomes = analyze_all(engine, batch, today).await;
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            &outcomes[0],
            BatchOutcome::Ok { summary } if summary.workspace_id == "ws-a"
        ));
        assert!(matches!(
            &outcomes[1],
            BatchOutcome::Error { workspace_id, .. } if workspace_id == "ws-bad"
        ));
        assert!(matches!(
            &outcomes[2],
            BatchOutcome::Ok { summary } if summary.workspace_id == "ws-c"
        ));
    }

    #[test]
    fn test_workspace_json_defaults() {
        let data: WorkspaceData = serde_json::from_str(r#"{"workspace_id": "ws-1"}"#).unwrap();
        assert!(data.campaigns.is_empty());
        assert!(data.daily_metrics.is_empty());
        assert!(data.total_budget_constraint.is_none());
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::parse_from([
            "ppc-insights",
            "--today",
            "2024-06-15",
            "--lookback-days",
            "14",
            "analyze",
            "ws.json",
        ]);
        assert_eq!(cli.today, NaiveDate::from_ymd_opt(2024, 6, 15));
        assert_eq!(cli.lookback_days, Some(14));
        assert!(matches!(cli.command, Command::Analyze { .. }));
    }

    #[test]
    fn test_explicit_config_must_load() {
        let dir = tempdir().expect("tempdir");
        let broken = dir.path().join("insights.toml");
        fs::write(&broken, "lookback_days = \"a month\"\ntoday = 2024-13-40\n").unwrap();
        assert!(load_config(Some(broken.as_path())).is_err());

        let missing = dir.path().join("absent.toml");
        assert!(load_config(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_explicit_config_keeps_injected_date() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("insights.toml");
        fs::write(&path, "today = \"2024-06-15\"\n").unwrap();
        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.reference_date(), NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }
}

//! Insights orchestrator: runs every analysis over one workspace's data and
//! condenses the results into a health score and a short list of headlines.

use chrono::{Duration, NaiveDate};
use ppc_core::{AnalyticsConfig, Campaign, DailyMetricRecord, InsightsResult, Metric};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::anomaly::{Anomaly, AnomalyDetector, AnomalySeverity, AnomalySummary};
use crate::forecast::{Forecast, PerformanceForecaster, Trend};
use crate::optimizer::{BudgetOptimizer, BudgetRecommendation, CrossPlatformInsight, Priority};
use crate::pacing::{CampaignPacing, PacingStatus};

/// Upper bound on headline count.
pub const MAX_KEY_INSIGHTS: usize = 8;

const CRITICAL_PENALTY: f64 = 10.0;
const WARNING_PENALTY: f64 = 3.0;
const HIGH_PRIORITY_PENALTY: f64 = 5.0;
const PACING_PENALTY: f64 = 5.0;

/// Everything the engine needs about one workspace, as handed over by the
/// data-access layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceData {
    pub workspace_id: String,
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub daily_metrics: Vec<DailyMetricRecord>,
    /// Optional cap on the summed daily budget of optimized campaigns.
    #[serde(default)]
    pub total_budget_constraint: Option<f64>,
}

/// The complete analysis result for one workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsSummary {
    pub workspace_id: String,
    pub generated_at: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub anomalies: AnomalySummary,
    pub anomaly_details: Vec<Anomaly>,
    pub budget_recommendations: Vec<BudgetRecommendation>,
    pub forecasts: Vec<Forecast>,
    pub pacing: Vec<CampaignPacing>,
    pub cross_platform: Vec<CrossPlatformInsight>,
    pub health_score: f64,
    pub key_insights: Vec<String>,
}

/// Account health in [0, 100]: starts at 100 and loses points per finding.
pub fn health_score(
    critical_anomalies: usize,
    warning_anomalies: usize,
    high_priority_recommendations: usize,
    pacing_issues: usize,
) -> f64 {
    let score = 100.0
        - CRITICAL_PENALTY * critical_anomalies as f64
        - WARNING_PENALTY * warning_anomalies as f64
        - HIGH_PRIORITY_PENALTY * high_priority_recommendations as f64
        - PACING_PENALTY * pacing_issues as f64;
    score.clamp(0.0, 100.0)
}

/// Runs the detector, optimizer and forecaster with one shared
/// configuration. Holds no per-run state, so one engine can serve any number
/// of concurrent calls.
#[derive(Debug, Clone)]
pub struct InsightsEngine {
    config: AnalyticsConfig,
    detector: AnomalyDetector,
    optimizer: BudgetOptimizer,
    forecaster: PerformanceForecaster,
}

impl Default for InsightsEngine {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}

impl InsightsEngine {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            detector: AnomalyDetector::new(&config),
            optimizer: BudgetOptimizer::new(&config),
            forecaster: PerformanceForecaster::new(&config),
            config,
        }
    }

    pub fn forecaster(&self) -> &PerformanceForecaster {
        &self.forecaster
    }

    /// Analyze one workspace as of `today`. Fails only on structurally
    /// invalid input; missing data just shrinks the result.
    pub fn generate_insights(
        &self,
        data: &WorkspaceData,
        today: NaiveDate,
    ) -> InsightsResult<InsightsSummary> {
        for record in &data.daily_metrics {
            record.validate()?;
        }
        for campaign in &data.campaigns {
            campaign.validate()?;
        }

        info!(workspace_id = %data.workspace_id, %today, "Generating insights");
        let records = data.daily_metrics.as_slice();
        if records.is_empty() {
            warn!(workspace_id = %data.workspace_id, "Workspace has no daily metrics");
        }

        let campaigns: Vec<Campaign> = if self.config.serving_campaigns_only {
            data.campaigns
                .iter()
                .filter(|c| c.status.is_serving())
                .cloned()
                .collect()
        } else {
            data.campaigns.clone()
        };

        let analysis_date = records
            .iter()
            .map(|r| r.date)
            .filter(|d| *d <= today)
            .max();
        let anomalies = match analysis_date {
            Some(date) => self.detector.detect(records, Some(date)),
            None => Vec::new(),
        };
        let anomaly_summary = AnomalyDetector::summarize(&anomalies);

        let budget_recommendations = self.optimizer.generate_recommendations(
            &campaigns,
            records,
            today,
            data.total_budget_constraint,
        );
        let cross_platform =
            self.optimizer
                .cross_platform_insights(records, today, self.config.provider_pair());

        let forecasts = self.forecaster.generate_forecasts(records, today, None);
        let pacing = self
            .forecaster
            .calculate_pacing(&campaigns, records, today, None, None);

        let high_priority = budget_recommendations
            .iter()
            .filter(|r| r.priority == Priority::High)
            .count();
        let pacing_issues = pacing
            .iter()
            .filter(|p| p.pacing_status != PacingStatus::OnTrack)
            .count();
        let health_score = health_score(
            anomaly_summary.critical,
            anomaly_summary.warning,
            high_priority,
            pacing_issues,
        );

        let key_insights = key_insights(
            &anomalies,
            &budget_recommendations,
            &forecasts,
            &pacing,
            &cross_platform,
        );

        metrics::counter!("insights.runs").increment(1);
        metrics::counter!("insights.anomalies").increment(anomalies.len() as u64);
        metrics::counter!("insights.recommendations")
            .increment(budget_recommendations.len() as u64);
        metrics::histogram!("insights.health_score").record(health_score);

        if anomaly_summary.critical > 0 {
            warn!(
                workspace_id = %data.workspace_id,
                critical = anomaly_summary.critical,
                "Critical performance anomalies detected"
            );
        }
        info!(
            workspace_id = %data.workspace_id,
            health_score,
            anomalies = anomalies.len(),
            recommendations = budget_recommendations.len(),
            forecasts = forecasts.len(),
            "Insights generated"
        );

        Ok(InsightsSummary {
            workspace_id: data.workspace_id.clone(),
            generated_at: today,
            period_start: today - Duration::days(i64::from(self.config.lookback_days)),
            period_end: today,
            anomalies: anomaly_summary,
            anomaly_details: anomalies,
            budget_recommendations,
            forecasts,
            pacing,
            cross_platform,
            health_score,
            key_insights,
        })
    }
}

/// Headlines in fixed priority order, capped at [`MAX_KEY_INSIGHTS`].
fn key_insights(
    anomalies: &[Anomaly],
    recommendations: &[BudgetRecommendation],
    forecasts: &[Forecast],
    pacing: &[CampaignPacing],
    cross_platform: &[CrossPlatformInsight],
) -> Vec<String> {
    let mut insights = Vec::new();

    let critical: Vec<&Anomaly> = anomalies
        .iter()
        .filter(|a| a.severity == AnomalySeverity::Critical)
        .collect();
    if let Some(top) = critical.first() {
        insights.push(format!(
            "{} critical performance anomalies detected",
            critical.len()
        ));
        insights.push(format!("Top anomaly: {}", top.message));
    }

    let increases: Vec<&BudgetRecommendation> =
        recommendations.iter().filter(|r| r.change_pct > 0.0).collect();
    if !increases.is_empty() {
        let total: f64 = increases.iter().map(|r| r.change_amount).sum();
        insights.push(format!(
            "Recommended to increase budget by ${:.0}/day across {} campaigns",
            total,
            increases.len()
        ));
    }
    let decreases: Vec<&BudgetRecommendation> =
        recommendations.iter().filter(|r| r.change_pct < 0.0).collect();
    if !decreases.is_empty() {
        let total: f64 = decreases.iter().map(|r| r.change_amount).sum();
        insights.push(format!(
            "Recommended to reduce budget by ${:.0}/day across {} underperforming campaigns",
            total.abs(),
            decreases.len()
        ));
    }

    if let Some(spend) = forecasts.iter().find(|f| f.metric == Metric::Spend) {
        if spend.trend != Trend::Stable {
            let direction = if spend.trend == Trend::Up {
                "increasing"
            } else {
                "decreasing"
            };
            insights.push(format!(
                "Spend is {} {:.1}% daily",
                direction,
                spend.trend_pct.abs()
            ));
        }
    }
    if let Some(conversions) = forecasts.iter().find(|f| f.metric == Metric::Conversions) {
        insights.push(format!(
            "Projected {:.0} conversions next month ({} confidence)",
            conversions.next_period_forecast,
            conversions.confidence.as_str()
        ));
    }

    let over: Vec<&CampaignPacing> = pacing
        .iter()
        .filter(|p| p.pacing_status == PacingStatus::Overspending)
        .collect();
    if !over.is_empty() {
        let total: f64 = over.iter().map(|p| p.projected_variance).sum();
        insights.push(format!(
            "{} campaigns projected to overspend by ${:.0}",
            over.len(),
            total
        ));
    }
    let under: Vec<&CampaignPacing> = pacing
        .iter()
        .filter(|p| p.pacing_status == PacingStatus::Underspending)
        .collect();
    if !under.is_empty() {
        let total: f64 = under.iter().map(|p| p.projected_variance).sum();
        insights.push(format!(
            "${:.0} in unspent budget opportunity across {} campaigns",
            total.abs(),
            under.len()
        ));
    }

    if let Some(lead) = cross_platform.first() {
        insights.push(format!("{} leads on {}", lead.winner, lead.metric));
    }

    insights.truncate(MAX_KEY_INSIGHTS);
    insights
}

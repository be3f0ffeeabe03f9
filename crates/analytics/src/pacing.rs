//! Budget pacing: compares each campaign's spend so far in a budget period
//! against a time-prorated share of its period budget.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ppc_core::{Campaign, DailyMetricRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::forecast::{month_bounds, PerformanceForecaster};

/// Spend above this multiple of the prorated budget is overspending.
pub const OVERSPEND_RATIO: f64 = 1.10;
/// Spend below this multiple of the prorated budget is underspending.
pub const UNDERSPEND_RATIO: f64 = 0.90;

/// Days left in the period at or below which recommendations turn urgent.
const URGENT_DAYS_REMAINING: i64 = 7;

/// Describes whether a campaign is spending at the expected rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingStatus {
    OnTrack,
    Underspending,
    Overspending,
}

impl PacingStatus {
    /// Classify `spent` against `expected`. No expected spend means there is
    /// nothing to be off track from.
    pub fn classify(spent: f64, expected: f64) -> Self {
        if expected <= 0.0 {
            return Self::OnTrack;
        }
        let ratio = spent / expected;
        if ratio > OVERSPEND_RATIO {
            Self::Overspending
        } else if ratio < UNDERSPEND_RATIO {
            Self::Underspending
        } else {
            Self::OnTrack
        }
    }
}

/// Pacing of one campaign within one budget period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignPacing {
    pub campaign_id: String,
    pub campaign_name: String,
    pub provider: String,
    pub period_budget: f64,
    pub spent_to_date: f64,
    pub days_elapsed: i64,
    pub days_remaining: i64,
    pub pacing_status: PacingStatus,
    pub projected_spend: f64,
    pub projected_variance: f64,
    pub recommendation: String,
}

impl PerformanceForecaster {
    /// Pacing for every campaign over `[period_start, period_end]`, defaulting
    /// to the calendar month containing `today`. Largest |variance| first.
    pub fn calculate_pacing(
        &self,
        campaigns: &[Campaign],
        records: &[DailyMetricRecord],
        today: NaiveDate,
        period_start: Option<NaiveDate>,
        period_end: Option<NaiveDate>,
    ) -> Vec<CampaignPacing> {
        if campaigns.is_empty() || records.is_empty() {
            return Vec::new();
        }

        let (month_start, month_end) = month_bounds(today);
        let period_start = period_start.unwrap_or(month_start);
        let period_end = period_end.unwrap_or(month_end);

        let mut spend_by_campaign: BTreeMap<&str, f64> = BTreeMap::new();
        for record in records
            .iter()
            .filter(|r| r.date >= period_start && r.date <= today)
        {
            *spend_by_campaign.entry(record.campaign_id.as_str()).or_default() += record.spend();
        }

        let days_elapsed = (today - period_start).num_days() + 1;
        let days_remaining = (period_end - today).num_days();
        let total_days = (period_end - period_start).num_days() + 1;
        if total_days <= 0 {
            debug!(%period_start, %period_end, "Empty pacing period");
            return Vec::new();
        }

        let mut results: Vec<CampaignPacing> = campaigns
            .iter()
            .map(|campaign| {
                let period_budget = campaign.daily_budget() * total_days as f64;
                let spent_to_date = spend_by_campaign
                    .get(campaign.id.as_str())
                    .copied()
                    .unwrap_or(0.0);

                let expected_spend = days_elapsed as f64 / total_days as f64 * period_budget;
                let pacing_status = PacingStatus::classify(spent_to_date, expected_spend);

                let projected_spend = if days_elapsed > 0 {
                    let daily_avg = spent_to_date / days_elapsed as f64;
                    spent_to_date + daily_avg * days_remaining as f64
                } else {
                    period_budget
                };
                let projected_variance = projected_spend - period_budget;

                CampaignPacing {
                    campaign_id: campaign.id.clone(),
                    campaign_name: campaign.name.clone(),
                    provider: campaign.provider.clone(),
                    period_budget,
                    spent_to_date,
                    days_elapsed,
                    days_remaining,
                    pacing_status,
                    projected_spend,
                    projected_variance,
                    recommendation: pacing_recommendation(
                        pacing_status,
                        projected_variance,
                        days_remaining,
                    ),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.projected_variance
                .abs()
                .total_cmp(&a.projected_variance.abs())
        });
        results
    }
}

fn pacing_recommendation(status: PacingStatus, variance: f64, days_remaining: i64) -> String {
    let variance = variance.abs();
    match status {
        PacingStatus::OnTrack => "Budget pacing is healthy. Continue current strategy.".to_string(),
        PacingStatus::Overspending if days_remaining > URGENT_DAYS_REMAINING => format!(
            "Consider reducing daily spend by ${:.2} to stay on budget.",
            variance / days_remaining as f64
        ),
        PacingStatus::Overspending => {
            format!("Projected to overspend by ${variance:.2}. Review campaign efficiency.")
        }
        PacingStatus::Underspending if days_remaining > URGENT_DAYS_REMAINING => format!(
            "Opportunity to increase spend by ${:.2}/day.",
            variance / days_remaining as f64
        ),
        PacingStatus::Underspending => {
            format!("May underspend by ${variance:.2}. Consider increasing bids or budgets.")
        }
    }
}

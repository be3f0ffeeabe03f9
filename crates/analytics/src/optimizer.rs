//! Budget optimizer: scores spend efficiency across campaigns and recommends
//! bounded budget shifts toward the better performers. Also compares
//! aggregate performance between two providers.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use ppc_core::types::provider_label;
use ppc_core::{AnalyticsConfig, Campaign, Cpa, DailyMetricRecord, MetricTotals};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::stats;

/// Campaigns below either floor are left out of scoring entirely.
pub const MIN_SPEND: f64 = 10.0;
pub const MIN_CLICKS: u64 = 10;

/// Changes smaller than this are not worth acting on.
pub const MIN_CHANGE_PCT: f64 = 5.0;

/// Budget change per standard deviation of efficiency.
const PCT_PER_STD: f64 = 10.0;

const WEIGHT_CPA: f64 = 0.4;
const WEIGHT_CONVERSION_RATE: f64 = 0.3;
const WEIGHT_ROAS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn from_change_pct(change_pct: f64) -> Self {
        let magnitude = change_pct.abs();
        if magnitude >= 20.0 {
            Self::High
        } else if magnitude >= 10.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

/// A proposed daily budget change for one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRecommendation {
    pub campaign_id: String,
    pub campaign_name: String,
    pub provider: String,
    pub current_budget: f64,
    pub recommended_budget: f64,
    pub change_amount: f64,
    pub change_pct: f64,
    pub reason: String,
    pub efficiency_score: f64,
    pub priority: Priority,
    pub expected_impact: String,
}

/// A provider's value for one compared metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderValue {
    pub provider: String,
    pub value: f64,
}

/// Head-to-head comparison of two providers on one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossPlatformInsight {
    pub metric: String,
    pub values: [ProviderValue; 2],
    /// Display name of the stronger provider.
    pub winner: String,
    pub recommendation: String,
}

/// Window totals and efficiency score for one qualifying campaign.
#[derive(Debug, Clone)]
struct ScoredCampaign<'a> {
    campaign: &'a Campaign,
    totals: MetricTotals,
    efficiency_score: f64,
}

/// Efficiency-driven budget optimizer. Holds configuration only.
#[derive(Debug, Clone)]
pub struct BudgetOptimizer {
    lookback_days: u32,
    max_budget_change_pct: f64,
}

impl Default for BudgetOptimizer {
    fn default() -> Self {
        Self::new(&AnalyticsConfig::default())
    }
}

impl BudgetOptimizer {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            max_budget_change_pct: config.max_budget_change_pct,
        }
    }

    /// Recommend budget changes for campaigns with enough recent data.
    ///
    /// When `total_budget_constraint` is given, increases are scaled down so
    /// the summed recommended budget of the scored campaigns stays within it.
    /// Decreases are never deepened to make room.
    pub fn generate_recommendations(
        &self,
        campaigns: &[Campaign],
        records: &[DailyMetricRecord],
        today: NaiveDate,
        total_budget_constraint: Option<f64>,
    ) -> Vec<BudgetRecommendation> {
        if campaigns.is_empty() || records.is_empty() {
            warn!("Insufficient data for budget optimization");
            return Vec::new();
        }

        let totals = aggregate_by_campaign(records, self.window_start(today), today);
        let scored = score_campaigns(campaigns, &totals);
        if scored.is_empty() {
            debug!("No campaign met the spend and click minimums");
            return Vec::new();
        }

        let scores: Vec<f64> = scored.iter().map(|s| s.efficiency_score).collect();
        let cohort_mean = stats::mean(&scores).unwrap_or(0.0);
        let cohort_std = stats::sample_std(&scores).unwrap_or(0.0);
        let defined_cpas: Vec<f64> = scored
            .iter()
            .filter_map(|s| s.totals.cpa().value())
            .collect();
        let avg_cpa = stats::mean(&defined_cpas);

        let mut changes: Vec<f64> = scored
            .iter()
            .map(|s| {
                let z = if cohort_std > 0.0 {
                    (s.efficiency_score - cohort_mean) / cohort_std
                } else {
                    0.0
                };
                (z * PCT_PER_STD).clamp(-self.max_budget_change_pct, self.max_budget_change_pct)
            })
            .collect();

        if let Some(limit) = total_budget_constraint {
            apply_budget_constraint(&scored, &mut changes, limit);
        }

        let mut recommendations: Vec<BudgetRecommendation> = scored
            .iter()
            .zip(&changes)
            .filter(|(_, pct)| pct.abs() >= MIN_CHANGE_PCT)
            .map(|(s, &change_pct)| build_recommendation(s, change_pct, avg_cpa))
            .collect();

        recommendations.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| b.change_pct.abs().total_cmp(&a.change_pct.abs()))
        });

        info!(
            scored = scored.len(),
            recommendations = recommendations.len(),
            "Budget recommendations generated"
        );
        recommendations
    }

    /// Compare two providers' aggregate CTR, CPA and ROAS over the window.
    /// Returns nothing unless both providers have data.
    pub fn cross_platform_insights(
        &self,
        records: &[DailyMetricRecord],
        today: NaiveDate,
        providers: (&str, &str),
    ) -> Vec<CrossPlatformInsight> {
        let window_start = self.window_start(today);
        let mut by_provider: BTreeMap<&str, MetricTotals> = BTreeMap::new();
        for record in records
            .iter()
            .filter(|r| r.date >= window_start && r.date <= today)
        {
            by_provider.entry(record.provider.as_str()).or_default().add(record);
        }

        let (first, second) = providers;
        let (Some(a), Some(b)) = (by_provider.get(first), by_provider.get(second)) else {
            debug!(first, second, "Cross-platform comparison needs both providers");
            return Vec::new();
        };
        let (label_a, label_b) = (provider_label(first), provider_label(second));
        let values = |va: f64, vb: f64| {
            [
                ProviderValue {
                    provider: first.to_string(),
                    value: va,
                },
                ProviderValue {
                    provider: second.to_string(),
                    value: vb,
                },
            ]
        };

        let mut insights = Vec::new();

        let (ctr_a, ctr_b) = (a.ctr(), b.ctr());
        let winner = if ctr_a > ctr_b { &label_a } else { &label_b };
        insights.push(CrossPlatformInsight {
            metric: "Click-Through Rate".into(),
            values: values(ctr_a, ctr_b),
            winner: winner.clone(),
            recommendation: format!(
                "{} drives higher engagement ({:.2}% vs {:.2}%)",
                winner,
                ctr_a.max(ctr_b),
                ctr_a.min(ctr_b)
            ),
        });

        if let (Cpa::Value(cpa_a), Cpa::Value(cpa_b)) = (a.cpa(), b.cpa()) {
            let winner = if cpa_a < cpa_b { &label_a } else { &label_b };
            insights.push(CrossPlatformInsight {
                metric: "Cost Per Acquisition".into(),
                values: values(cpa_a, cpa_b),
                winner: winner.clone(),
                recommendation: format!(
                    "{} delivers cheaper conversions (${:.2} vs ${:.2})",
                    winner,
                    cpa_a.min(cpa_b),
                    cpa_a.max(cpa_b)
                ),
            });
        }

        let (roas_a, roas_b) = (a.roas(), b.roas());
        if roas_a > 0.0 || roas_b > 0.0 {
            let winner = if roas_a > roas_b { &label_a } else { &label_b };
            insights.push(CrossPlatformInsight {
                metric: "Return on Ad Spend".into(),
                values: values(roas_a, roas_b),
                winner: winner.clone(),
                recommendation: format!(
                    "{} provides better ROI ({:.1}x vs {:.1}x)",
                    winner,
                    roas_a.max(roas_b),
                    roas_a.min(roas_b)
                ),
            });
        }

        insights
    }

    fn window_start(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.lookback_days))
    }
}

fn aggregate_by_campaign(
    records: &[DailyMetricRecord],
    from: NaiveDate,
    to: NaiveDate,
) -> BTreeMap<&str, MetricTotals> {
    let mut totals: BTreeMap<&str, MetricTotals> = BTreeMap::new();
    for record in records.iter().filter(|r| r.date >= from && r.date <= to) {
        totals.entry(record.campaign_id.as_str()).or_default().add(record);
    }
    totals
}

/// Keep campaigns above the minimums and blend their normalized CPA,
/// conversion rate and ROAS into a score in [0, 1].
fn score_campaigns<'a>(
    campaigns: &'a [Campaign],
    totals: &BTreeMap<&str, MetricTotals>,
) -> Vec<ScoredCampaign<'a>> {
    let mut qualifying: Vec<ScoredCampaign<'a>> = campaigns
        .iter()
        .filter_map(|campaign| {
            let totals = *totals.get(campaign.id.as_str())?;
            if totals.spend < MIN_SPEND || totals.clicks < MIN_CLICKS {
                debug!(
                    campaign_id = %campaign.id,
                    spend = totals.spend,
                    clicks = totals.clicks,
                    "Campaign below optimization minimums"
                );
                return None;
            }
            Some(ScoredCampaign {
                campaign,
                totals,
                efficiency_score: 0.0,
            })
        })
        .collect();

    let max_cpa = qualifying
        .iter()
        .filter_map(|s| s.totals.cpa().value())
        .fold(0.0_f64, f64::max);
    let max_cvr = qualifying
        .iter()
        .map(|s| s.totals.conversion_rate())
        .fold(0.0_f64, f64::max);
    let max_roas = qualifying.iter().map(|s| s.totals.roas()).fold(0.0_f64, f64::max);

    for s in &mut qualifying {
        let cpa_score = match s.totals.cpa() {
            Cpa::Value(cpa) if max_cpa > 0.0 => 1.0 - cpa / max_cpa,
            _ => 0.0,
        };
        let cvr_score = if max_cvr > 0.0 {
            s.totals.conversion_rate() / max_cvr
        } else {
            0.0
        };
        let roas_score = if max_roas > 0.0 {
            s.totals.roas() / max_roas
        } else {
            0.0
        };
        s.efficiency_score =
            WEIGHT_CPA * cpa_score + WEIGHT_CONVERSION_RATE * cvr_score + WEIGHT_ROAS * roas_score;
    }

    qualifying
}

/// Scale positive changes so the recommended total fits under `limit`.
///
/// Changes below [`MIN_CHANGE_PCT`] are never emitted, so those campaigns
/// count at their current budget. When the budgets left after cuts already
/// exceed `limit`, increases are withheld and the total stays above it.
fn apply_budget_constraint(scored: &[ScoredCampaign<'_>], changes: &mut [f64], limit: f64) {
    for pct in changes.iter_mut() {
        if pct.abs() < MIN_CHANGE_PCT {
            *pct = 0.0;
        }
    }

    let mut fixed_total = 0.0;
    let mut requested_increase = 0.0;
    for (s, &pct) in scored.iter().zip(changes.iter()) {
        let current = s.campaign.daily_budget();
        if pct > 0.0 {
            fixed_total += current;
            requested_increase += current * pct / 100.0;
        } else {
            fixed_total += current * (1.0 + pct / 100.0);
        }
    }

    if requested_increase <= 0.0 || fixed_total + requested_increase <= limit {
        return;
    }

    if fixed_total >= limit {
        warn!(
            limit,
            fixed_total, "Budgets after cuts exceed the budget constraint; withholding increases"
        );
        for pct in changes.iter_mut().filter(|pct| **pct > 0.0) {
            *pct = 0.0;
        }
        return;
    }

    let factor = (limit - fixed_total) / requested_increase;
    info!(
        limit,
        requested_increase, factor, "Scaling budget increases to fit the total budget constraint"
    );
    // Dropping a scaled increase only lowers the total, so one pass suffices.
    for pct in changes.iter_mut().filter(|pct| **pct > 0.0) {
        *pct *= factor;
        if *pct < MIN_CHANGE_PCT {
            *pct = 0.0;
        }
    }
}

fn build_recommendation(
    scored: &ScoredCampaign<'_>,
    change_pct: f64,
    avg_cpa: Option<f64>,
) -> BudgetRecommendation {
    let campaign = scored.campaign;
    let current_budget = campaign.daily_budget();
    let recommended_budget = current_budget * (1.0 + change_pct / 100.0);

    BudgetRecommendation {
        campaign_id: campaign.id.clone(),
        campaign_name: campaign.name.clone(),
        provider: campaign.provider.clone(),
        current_budget,
        recommended_budget,
        change_amount: recommended_budget - current_budget,
        change_pct,
        reason: recommendation_reason(&scored.totals, change_pct, avg_cpa),
        efficiency_score: scored.efficiency_score,
        priority: Priority::from_change_pct(change_pct),
        expected_impact: expected_impact(&scored.totals, current_budget, change_pct),
    }
}

fn recommendation_reason(totals: &MetricTotals, change_pct: f64, avg_cpa: Option<f64>) -> String {
    let roas = totals.roas();
    let cvr = totals.conversion_rate();
    let cpa = totals.cpa();

    if change_pct > 0.0 {
        if roas > 2.0 {
            return format!("High ROAS ({roas:.1}x) indicates strong returns");
        }
        if let (Cpa::Value(value), Some(avg)) = (cpa, avg_cpa) {
            if value < avg {
                return format!("Below-average CPA (${value:.2}) shows efficiency");
            }
        }
        format!("Strong conversion rate ({cvr:.1}%)")
    } else if roas < 1.0 {
        format!("Low ROAS ({roas:.1}x) suggests poor returns")
    } else if cvr < 1.0 {
        format!("Low conversion rate ({cvr:.1}%)")
    } else {
        match cpa {
            Cpa::Value(value) => format!("High CPA (${value:.2}) indicates inefficiency"),
            Cpa::Undefined => format!("No conversions from ${:.2} of spend", totals.spend),
        }
    }
}

fn expected_impact(totals: &MetricTotals, current_budget: f64, change_pct: f64) -> String {
    let delta = current_budget * change_pct / 100.0;
    if change_pct > 0.0 {
        match totals.cpa() {
            Cpa::Value(cpa) if cpa > 0.0 => {
                format!("~{:.0} additional conversions/day", delta / cpa)
            }
            _ => "Monitor performance after change".to_string(),
        }
    } else {
        format!("Save ~${:.0}/day for reallocation", delta.abs())
    }
}

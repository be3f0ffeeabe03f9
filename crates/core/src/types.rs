use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{InsightsError, InsightsResult};

/// Spend and budgets are stored in millionths of a currency unit.
pub const MICROS_PER_UNIT: f64 = 1_000_000.0;

/// Convert an integer micro-amount into currency units.
pub fn micros_to_units(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_UNIT
}

/// One day of delivery for one campaign on one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetricRecord {
    pub campaign_id: String,
    pub campaign_name: String,
    pub provider: String,
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend_micros: u64,
    /// Fractional when the platform attributes partial conversions.
    pub conversions: f64,
    pub conversion_value: f64,
}

impl DailyMetricRecord {
    /// Spend in currency units.
    pub fn spend(&self) -> f64 {
        micros_to_units(self.spend_micros)
    }

    pub fn validate(&self) -> InsightsResult<()> {
        if self.campaign_id.trim().is_empty() {
            return Err(InsightsError::Validation(format!(
                "daily record on {} has an empty campaign_id",
                self.date
            )));
        }
        if !self.conversions.is_finite() || self.conversions < 0.0 {
            return Err(InsightsError::Validation(format!(
                "campaign {} on {}: conversions must be a non-negative number",
                self.campaign_id, self.date
            )));
        }
        if !self.conversion_value.is_finite() || self.conversion_value < 0.0 {
            return Err(InsightsError::Validation(format!(
                "campaign {} on {}: conversion_value must be a non-negative number",
                self.campaign_id, self.date
            )));
        }
        Ok(())
    }
}

/// Lifecycle state of a campaign, normalized across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Enabled,
    Active,
    Paused,
    Removed,
    Pending,
    Error,
}

impl CampaignStatus {
    /// Whether the campaign is currently delivering.
    pub fn is_serving(self) -> bool {
        matches!(self, Self::Enabled | Self::Active)
    }
}

/// Campaign metadata as synced from the ad platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub status: CampaignStatus,
    pub daily_budget_micros: u64,
}

impl Campaign {
    /// Daily budget in currency units.
    pub fn daily_budget(&self) -> f64 {
        micros_to_units(self.daily_budget_micros)
    }

    pub fn validate(&self) -> InsightsResult<()> {
        if self.id.trim().is_empty() {
            return Err(InsightsError::Validation(format!(
                "campaign '{}' has an empty id",
                self.name
            )));
        }
        Ok(())
    }
}

/// Human-readable name for a provider key.
pub fn provider_label(provider: &str) -> String {
    match provider {
        "google_ads" => "Google Ads".to_string(),
        "meta" | "meta_ads" => "Meta Ads".to_string(),
        "microsoft_ads" => "Microsoft Ads".to_string(),
        "tiktok_ads" => "TikTok Ads".to_string(),
        other => other.to_string(),
    }
}

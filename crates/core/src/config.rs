use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::{InsightsError, InsightsResult};

/// Environment prefix for configuration overrides, e.g.
/// `PPC_INSIGHTS__LOOKBACK_DAYS=14`.
pub const ENV_PREFIX: &str = "PPC_INSIGHTS";

/// Analysis configuration shared by every engine. Loaded from environment
/// variables with the prefix `PPC_INSIGHTS__` and an optional TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,
    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,
    #[serde(default = "default_max_budget_change_pct")]
    pub max_budget_change_pct: f64,
    /// Reference date for "today". Left unset, the wall clock is read once at
    /// the boundary by [`AnalyticsConfig::reference_date`].
    #[serde(default)]
    pub today: Option<NaiveDate>,
    /// Restrict budget optimization and pacing to enabled/active campaigns.
    #[serde(default)]
    pub serving_campaigns_only: bool,
    /// The two providers compared by the cross-platform analysis.
    #[serde(default = "default_cross_platform_providers")]
    pub cross_platform_providers: Vec<String>,
}

fn default_lookback_days() -> u32 {
    30
}
fn default_forecast_days() -> u32 {
    30
}
fn default_min_data_points() -> usize {
    7
}
fn default_max_budget_change_pct() -> f64 {
    30.0
}
fn default_cross_platform_providers() -> Vec<String> {
    vec!["google_ads".to_string(), "meta".to_string()]
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            forecast_days: default_forecast_days(),
            min_data_points: default_min_data_points(),
            max_budget_change_pct: default_max_budget_change_pct(),
            today: None,
            serving_campaigns_only: false,
            cross_platform_providers: default_cross_platform_providers(),
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables (which take precedence).
    pub fn load(path: Option<&Path>) -> InsightsResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cross_platform_providers"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(
            lookback_days = config.lookback_days,
            forecast_days = config.forecast_days,
            "Analytics configuration loaded"
        );
        Ok(config)
    }

    /// Reject settings the engines cannot work with.
    pub fn validate(&self) -> InsightsResult<()> {
        if self.lookback_days == 0 {
            return Err(InsightsError::Config("lookback_days must be positive".into()));
        }
        if self.min_data_points < 2 {
            return Err(InsightsError::Config(
                "min_data_points must be at least 2 to estimate a deviation".into(),
            ));
        }
        if !self.max_budget_change_pct.is_finite() || self.max_budget_change_pct <= 0.0 {
            return Err(InsightsError::Config(
                "max_budget_change_pct must be a positive number".into(),
            ));
        }
        if self.cross_platform_providers.len() != 2 {
            return Err(InsightsError::Config(format!(
                "cross_platform_providers must name exactly two providers, got {}",
                self.cross_platform_providers.len()
            )));
        }
        Ok(())
    }

    /// The injected reference date, falling back to the current UTC date.
    pub fn reference_date(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// The configured provider pair as `(first, second)`.
    pub fn provider_pair(&self) -> (&str, &str) {
        match self.cross_platform_providers.as_slice() {
            [a, b, ..] => (a.as_str(), b.as_str()),
            _ => ("google_ads", "meta"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.forecast_days, 30);
        assert_eq!(config.min_data_points, 7);
        assert!((config.max_budget_change_pct - 30.0).abs() < f64::EPSILON);
        assert!(config.today.is_none());
        assert_eq!(config.provider_pair(), ("google_ads", "meta"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reference_date_prefers_injected_value() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let config = AnalyticsConfig {
            today: Some(today),
            ..AnalyticsConfig::default()
        };
        assert_eq!(config.reference_date(), today);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AnalyticsConfig {
            max_budget_change_pct: -1.0,
            ..AnalyticsConfig::default()
        };
        assert!(matches!(config.validate(), Err(InsightsError::Config(_))));

        let config = AnalyticsConfig {
            cross_platform_providers: vec!["google_ads".into()],
            ..AnalyticsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml_shape() {
        let json = r#"{"lookback_days": 14, "today": "2024-06-10"}"#;
        let config: AnalyticsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.forecast_days, 30);
        assert_eq!(config.today, NaiveDate::from_ymd_opt(2024, 6, 10));
    }

    #[test]
    fn test_load_file_then_environment() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("insights.toml");
        std::fs::write(
            &path,
            "lookback_days = 14\nforecast_days = 21\ntoday = \"2024-06-10\"\n",
        )
        .unwrap();

        std::env::set_var("PPC_INSIGHTS__FORECAST_DAYS", "45");
        std::env::set_var("PPC_INSIGHTS__CROSS_PLATFORM_PROVIDERS", "meta,tiktok_ads");
        let loaded = AnalyticsConfig::load(Some(path.as_path()));
        std::env::remove_var("PPC_INSIGHTS__FORECAST_DAYS");
        std::env::remove_var("PPC_INSIGHTS__CROSS_PLATFORM_PROVIDERS");

        let config = loaded.unwrap();
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.forecast_days, 45);
        assert_eq!(config.min_data_points, 7);
        assert_eq!(config.today, NaiveDate::from_ymd_opt(2024, 6, 10));
        assert_eq!(config.provider_pair(), ("meta", "tiktok_ads"));
    }

    #[test]
    fn test_load_rejects_missing_file() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            AnalyticsConfig::load(Some(missing.as_path())),
            Err(InsightsError::Config(_))
        ));
    }
}

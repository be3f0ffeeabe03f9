//! Performance forecaster: fits a linear trend to account-wide daily totals
//! and projects it forward, plus current-month actuals and projections.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use ppc_core::{AnalyticsConfig, DailyMetricRecord, Metric, MetricTotals};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::stats;

/// Fewer distinct days than this and no trend is fitted.
pub const MIN_FORECAST_DAYS: usize = 7;

/// Metrics forecast when the caller does not pick any.
pub const DEFAULT_FORECAST_METRICS: [Metric; 5] = [
    Metric::Spend,
    Metric::Conversions,
    Metric::Clicks,
    Metric::Impressions,
    Metric::ConversionValue,
];

/// Slope relative to the series mean beyond which a trend is called.
const TREND_THRESHOLD_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn from_pct(trend_pct: f64) -> Self {
        if trend_pct > TREND_THRESHOLD_PCT {
            Self::Up
        } else if trend_pct < -TREND_THRESHOLD_PCT {
            Self::Down
        } else {
            Self::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_r_squared(r_squared: f64) -> Self {
        if r_squared > 0.7 {
            Self::High
        } else if r_squared > 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Forecast for one metric summed across all campaigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub metric: Metric,
    pub metric_name: String,
    pub current_period_actual: f64,
    pub current_period_projected: f64,
    pub next_period_forecast: f64,
    pub trend: Trend,
    pub trend_pct: f64,
    pub confidence: Confidence,
    pub forecast_dates: Vec<NaiveDate>,
    pub forecast_values: Vec<f64>,
}

/// Expected conversions by a target date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutlook {
    pub target_date: NaiveDate,
    pub forecasted_conversions: f64,
    pub current_conversions: f64,
    pub trend: Trend,
    pub trend_pct: f64,
    pub confidence: Confidence,
}

/// Human label used in forecast output.
pub fn metric_name(metric: Metric) -> &'static str {
    match metric {
        Metric::Spend => "Spend",
        Metric::Conversions => "Conversions",
        Metric::Clicks => "Clicks",
        Metric::Impressions => "Impressions",
        Metric::ConversionValue => "Revenue",
        Metric::Ctr => "Click-Through Rate",
        Metric::Cpc => "Cost Per Click",
        Metric::Cpa => "Cost Per Acquisition",
        Metric::ConversionRate => "Conversion Rate",
        Metric::Roas => "Return on Ad Spend",
    }
}

/// First and last day of the calendar month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date.with_day(1).unwrap_or(date);
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date);
    (start, end)
}

/// Linear-trend forecaster. Holds configuration only.
#[derive(Debug, Clone)]
pub struct PerformanceForecaster {
    pub(crate) forecast_days: u32,
}

impl Default for PerformanceForecaster {
    fn default() -> Self {
        Self::new(&AnalyticsConfig::default())
    }
}

impl PerformanceForecaster {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            forecast_days: config.forecast_days,
        }
    }

    /// Forecast each requested metric (defaults to
    /// [`DEFAULT_FORECAST_METRICS`]). Records after `today` are ignored.
    pub fn generate_forecasts(
        &self,
        records: &[DailyMetricRecord],
        today: NaiveDate,
        metrics: Option<&[Metric]>,
    ) -> Vec<Forecast> {
        if records.is_empty() {
            warn!("No metrics provided for forecasting");
            return Vec::new();
        }

        let mut daily: BTreeMap<NaiveDate, MetricTotals> = BTreeMap::new();
        for record in records.iter().filter(|r| r.date <= today) {
            daily.entry(record.date).or_default().add(record);
        }
        if daily.len() < MIN_FORECAST_DAYS {
            warn!(days = daily.len(), "Insufficient data points for forecasting");
            return Vec::new();
        }

        metrics
            .unwrap_or(&DEFAULT_FORECAST_METRICS)
            .iter()
            .filter_map(|&metric| self.forecast_metric(&daily, metric, today))
            .collect()
    }

    fn forecast_metric(
        &self,
        daily: &BTreeMap<NaiveDate, MetricTotals>,
        metric: Metric,
        today: NaiveDate,
    ) -> Option<Forecast> {
        let (&first_date, _) = daily.iter().next()?;
        let (&last_date, _) = daily.iter().next_back()?;

        let xs: Vec<f64> = daily
            .keys()
            .map(|d| (*d - first_date).num_days() as f64)
            .collect();
        let ys: Vec<f64> = daily.values().map(|t| t.value(metric)).collect();

        let Some(fit) = stats::linear_regression(&xs, &ys) else {
            debug!(%metric, "Trend could not be fitted");
            return None;
        };
        let confidence = Confidence::from_r_squared(fit.r_squared);

        let last_x = (last_date - first_date).num_days() as f64;
        let (forecast_dates, forecast_values): (Vec<NaiveDate>, Vec<f64>) = (1..=self.forecast_days)
            .map(|i| {
                let date = last_date + Duration::days(i64::from(i));
                let value = fit.predict(last_x + f64::from(i)).max(0.0);
                (date, value)
            })
            .unzip();

        let avg_value = stats::mean(&ys).unwrap_or(0.0);
        let trend_pct = if avg_value > 0.0 {
            fit.slope / avg_value * 100.0
        } else {
            0.0
        };

        let (month_start, month_end) = month_bounds(today);
        let days_in_month = month_end.day() as usize;
        let current_period_actual: f64 = daily
            .range(month_start..=today)
            .map(|(_, t)| t.value(metric))
            .sum();
        let days_elapsed = today.day() as f64;
        let current_period_projected = current_period_actual / days_elapsed * days_in_month as f64;
        let next_period_forecast: f64 = forecast_values.iter().take(days_in_month).sum();

        Some(Forecast {
            metric,
            metric_name: metric_name(metric).to_string(),
            current_period_actual,
            current_period_projected,
            next_period_forecast,
            trend: Trend::from_pct(trend_pct),
            trend_pct,
            confidence,
            forecast_dates,
            forecast_values,
        })
    }

    /// Conversions expected by `target_date` (default: end of the current
    /// month): this month's actuals plus forecast days up to the target.
    pub fn forecast_conversions(
        &self,
        records: &[DailyMetricRecord],
        today: NaiveDate,
        target_date: Option<NaiveDate>,
    ) -> Option<ConversionOutlook> {
        let forecast = self
            .generate_forecasts(records, today, Some(&[Metric::Conversions][..]))
            .into_iter()
            .next()?;
        let target_date = target_date.unwrap_or_else(|| month_bounds(today).1);

        let cumulative: f64 = match forecast.forecast_dates.iter().position(|d| *d >= target_date) {
            Some(idx) => forecast.forecast_values[..=idx].iter().sum(),
            None => forecast.forecast_values.iter().sum(),
        };

        Some(ConversionOutlook {
            target_date,
            forecasted_conversions: (forecast.current_period_actual + cumulative).round(),
            current_conversions: forecast.current_period_actual,
            trend: forecast.trend,
            trend_pct: forecast.trend_pct,
            confidence: forecast.confidence,
        })
    }
}

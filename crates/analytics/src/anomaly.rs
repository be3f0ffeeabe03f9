//! Anomaly detector: flags statistically abnormal daily metric values per
//! campaign by comparing the analysis day against a rolling baseline.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use ppc_core::{AnalyticsConfig, DailyMetricRecord, Metric, MetricTotals};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::stats;

/// |z| at or above this is at least a warning (~95% two-sided).
pub const WARNING_Z: f64 = 2.0;
/// |z| at or above this is critical (~99.7% two-sided).
pub const CRITICAL_Z: f64 = 3.0;

/// Anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Warning,
    Critical,
}

/// Which way the metric moved relative to its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        }
    }
}

/// A metric watched by the detector.
#[derive(Debug, Clone, Copy)]
pub struct MonitoredMetric {
    pub metric: Metric,
    pub name: &'static str,
    /// `None` for metrics where either direction can be fine (spend).
    pub good_direction: Option<Direction>,
}

pub const MONITORED_METRICS: [MonitoredMetric; 6] = [
    MonitoredMetric {
        metric: Metric::Ctr,
        name: "Click-Through Rate",
        good_direction: Some(Direction::Increase),
    },
    MonitoredMetric {
        metric: Metric::Cpc,
        name: "Cost Per Click",
        good_direction: Some(Direction::Decrease),
    },
    MonitoredMetric {
        metric: Metric::Cpa,
        name: "Cost Per Acquisition",
        good_direction: Some(Direction::Decrease),
    },
    MonitoredMetric {
        metric: Metric::ConversionRate,
        name: "Conversion Rate",
        good_direction: Some(Direction::Increase),
    },
    MonitoredMetric {
        metric: Metric::Spend,
        name: "Daily Spend",
        good_direction: None,
    },
    MonitoredMetric {
        metric: Metric::Impressions,
        name: "Impressions",
        good_direction: Some(Direction::Increase),
    },
];

/// A significant deviation of one metric for one campaign on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub campaign_id: String,
    pub campaign_name: String,
    pub provider: String,
    pub metric: Metric,
    pub current_value: f64,
    pub expected_value: f64,
    pub deviation_pct: f64,
    pub z_score: f64,
    pub severity: AnomalySeverity,
    pub direction: Direction,
    pub date: NaiveDate,
    pub message: String,
}

/// Counts and headline messages for a set of anomalies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub by_metric: BTreeMap<Metric, usize>,
    pub by_provider: BTreeMap<String, usize>,
    pub top_concerns: Vec<String>,
}

/// Map an absolute z-score to a severity band.
pub fn classify(z_score: f64) -> Option<AnomalySeverity> {
    let z = z_score.abs();
    if z >= CRITICAL_Z {
        Some(AnomalySeverity::Critical)
    } else if z >= WARNING_Z {
        Some(AnomalySeverity::Warning)
    } else {
        None
    }
}

/// Z-score based detector. Holds configuration only.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    lookback_days: u32,
    min_data_points: usize,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(&AnalyticsConfig::default())
    }
}

impl AnomalyDetector {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            min_data_points: config.min_data_points,
        }
    }

    /// Detect anomalies on `analysis_date` (defaults to the latest date in
    /// `records`). Output is critical first, then by descending |z|.
    pub fn detect(
        &self,
        records: &[DailyMetricRecord],
        analysis_date: Option<NaiveDate>,
    ) -> Vec<Anomaly> {
        let Some(analysis_date) = analysis_date.or_else(|| records.iter().map(|r| r.date).max())
        else {
            warn!("No metrics provided for anomaly detection");
            return Vec::new();
        };

        let mut anomalies = Vec::new();
        for (campaign_id, group) in group_by_campaign(records) {
            if group.days.len() < self.min_data_points {
                debug!(
                    campaign_id,
                    days = group.days.len(),
                    "Skipping campaign with too few days"
                );
                continue;
            }
            for monitored in &MONITORED_METRICS {
                if let Some(anomaly) =
                    self.check_metric(campaign_id, &group, monitored, analysis_date)
                {
                    anomalies.push(anomaly);
                }
            }
        }

        sort_anomalies(&mut anomalies);
        anomalies
    }

    fn check_metric(
        &self,
        campaign_id: &str,
        group: &CampaignSeries<'_>,
        monitored: &MonitoredMetric,
        analysis_date: NaiveDate,
    ) -> Option<Anomaly> {
        let current_value = group.days.get(&analysis_date)?.value(monitored.metric);

        let cutoff = analysis_date - Duration::days(i64::from(self.lookback_days));
        let historical: Vec<f64> = group
            .days
            .range(cutoff..analysis_date)
            .map(|(_, totals)| totals.value(monitored.metric))
            .collect();
        if historical.len() < self.min_data_points {
            return None;
        }

        let mean = stats::mean(&historical)?;
        let std = stats::sample_std(&historical)?;
        if std == 0.0 || !std.is_finite() {
            return None;
        }

        let z_score = (current_value - mean) / std;
        let severity = classify(z_score)?;
        let direction = if z_score > 0.0 {
            Direction::Increase
        } else {
            Direction::Decrease
        };
        let deviation_pct = deviation_pct(current_value, mean);

        let message = anomaly_message(
            group.campaign_name,
            monitored,
            current_value,
            mean,
            deviation_pct,
            direction,
        );

        Some(Anomaly {
            campaign_id: campaign_id.to_string(),
            campaign_name: group.campaign_name.to_string(),
            provider: group.provider.to_string(),
            metric: monitored.metric,
            current_value,
            expected_value: mean,
            deviation_pct,
            z_score,
            severity,
            direction,
            date: analysis_date,
            message,
        })
    }

    /// Summarize anomalies already in detector order.
    pub fn summarize(anomalies: &[Anomaly]) -> AnomalySummary {
        let mut summary = AnomalySummary {
            total: anomalies.len(),
            ..AnomalySummary::default()
        };
        for anomaly in anomalies {
            match anomaly.severity {
                AnomalySeverity::Critical => summary.critical += 1,
                AnomalySeverity::Warning => summary.warning += 1,
            }
            *summary.by_metric.entry(anomaly.metric).or_default() += 1;
            *summary.by_provider.entry(anomaly.provider.clone()).or_default() += 1;
        }
        summary.top_concerns = anomalies.iter().take(5).map(|a| a.message.clone()).collect();
        summary
    }
}

/// Critical before warning; within a tier, larger |z| first.
pub fn sort_anomalies(anomalies: &mut [Anomaly]) {
    anomalies.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.z_score.abs().total_cmp(&a.z_score.abs()))
    });
}

/// Percent change from `expected`; zero when there is no expected level.
fn deviation_pct(current: f64, expected: f64) -> f64 {
    if expected != 0.0 {
        (current - expected) / expected * 100.0
    } else {
        0.0
    }
}

fn anomaly_message(
    campaign_name: &str,
    monitored: &MonitoredMetric,
    current: f64,
    expected: f64,
    deviation_pct: f64,
    direction: Direction,
) -> String {
    let sentiment = match monitored.good_direction {
        Some(good) if good == direction => "improved",
        Some(_) => "degraded",
        None => "changed",
    };
    format!(
        "{}: {} {} significantly. Current: {} vs Expected: {} ({:+.1}% {})",
        campaign_name,
        monitored.name,
        sentiment,
        monitored.metric.render(current),
        monitored.metric.render(expected),
        deviation_pct,
        direction.as_str()
    )
}

/// Date-ordered daily totals for one campaign.
struct CampaignSeries<'a> {
    campaign_name: &'a str,
    provider: &'a str,
    days: BTreeMap<NaiveDate, MetricTotals>,
}

fn group_by_campaign(records: &[DailyMetricRecord]) -> BTreeMap<&str, CampaignSeries<'_>> {
    let mut groups: BTreeMap<&str, CampaignSeries<'_>> = BTreeMap::new();
    let mut latest: BTreeMap<&str, NaiveDate> = BTreeMap::new();

    for record in records {
        let group = groups
            .entry(record.campaign_id.as_str())
            .or_insert_with(|| CampaignSeries {
                campaign_name: &record.campaign_name,
                provider: &record.provider,
                days: BTreeMap::new(),
            });
        group.days.entry(record.date).or_default().add(record);

        // Name and provider come from the most recent record.
        let seen = latest.entry(record.campaign_id.as_str()).or_insert(record.date);
        if record.date >= *seen {
            *seen = record.date;
            group.campaign_name = &record.campaign_name;
            group.provider = &record.provider;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + Duration::days(i64::from(n))
    }

    fn record(
        campaign_id: &str,
        date: NaiveDate,
        impressions: u64,
        clicks: u64,
        spend: f64,
    ) -> DailyMetricRecord {
        DailyMetricRecord {
            campaign_id: campaign_id.to_string(),
            campaign_name: format!("Campaign {campaign_id}"),
            provider: "google_ads".into(),
            date,
            impressions,
            clicks,
            spend_micros: (spend * 1_000_000.0).round() as u64,
            conversions: 0.0,
            conversion_value: 0.0,
        }
    }

    /// Ten days of CTR alternating 2.9% / 3.1%, then a collapse to 1.0%.
    fn ctr_collapse(campaign_id: &str) -> Vec<DailyMetricRecord> {
        let mut records: Vec<DailyMetricRecord> = (0..10)
            .map(|i| {
                let clicks = if i % 2 == 0 { 290 } else { 310 };
                record(campaign_id, day(i), 10_000, clicks, 100.0)
            })
            .collect();
        records.push(record(campaign_id, day(10), 10_000, 100, 100.0));
        records
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(classify(1.99), None);
        assert_eq!(classify(-1.5), None);
        assert_eq!(classify(2.0), Some(AnomalySeverity::Warning));
        assert_eq!(classify(-2.99), Some(AnomalySeverity::Warning));
        assert_eq!(classify(3.0), Some(AnomalySeverity::Critical));
        assert_eq!(classify(-20.0), Some(AnomalySeverity::Critical));
    }

    #[test]
    fn test_ctr_collapse_is_one_critical_decrease() {
        let detector = AnomalyDetector::default();
        let anomalies = detector.detect(&ctr_collapse("c-1"), None);

        let ctr: Vec<&Anomaly> = anomalies.iter().filter(|a| a.metric == Metric::Ctr).collect();
        assert_eq!(ctr.len(), 1);
        let a = ctr[0];
        assert_eq!(a.severity, AnomalySeverity::Critical);
        assert_eq!(a.direction, Direction::Decrease);
        assert_eq!(a.date, day(10));
        assert!((a.current_value - 1.0).abs() < 1e-9);
        assert!((a.expected_value - 3.0).abs() < 1e-9);
        assert!(a.z_score < -15.0);
        assert!(a.message.contains("Click-Through Rate degraded significantly"));
        assert!(a.message.contains("Current: 1.00% vs Expected: 3.00%"));
    }

    #[test]
    fn test_flat_history_never_flags() {
        // Constant history, wildly different current value: std is zero.
        let mut records: Vec<DailyMetricRecord> =
            (0..10).map(|i| record("c-1", day(i), 5_000, 100, 50.0)).collect();
        records.push(record("c-1", day(10), 90_000, 3_000, 900.0));

        let anomalies = AnomalyDetector::default().detect(&records, None);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_warning_band_end_to_end() {
        // Impressions alternate 1000/1200: mean 1100, sample std ~105.4.
        let mut records: Vec<DailyMetricRecord> = (0..10)
            .map(|i| {
                let impressions = if i % 2 == 0 { 1_000 } else { 1_200 };
                record("c-1", day(i), impressions, 50, 25.0)
            })
            .collect();
        records.push(record("c-1", day(10), 1_364, 50, 25.0));

        let anomalies = AnomalyDetector::default().detect(&records, None);
        let impressions = anomalies
            .iter()
            .find(|a| a.metric == Metric::Impressions)
            .expect("impressions anomaly");
        assert_eq!(impressions.severity, AnomalySeverity::Warning);
        assert_eq!(impressions.direction, Direction::Increase);
        assert!(impressions.z_score >= 2.0 && impressions.z_score < 3.0);
        assert!(impressions.message.contains("Impressions improved significantly"));
        assert!(impressions.message.contains("Current: 1,364"));
        // Spend never moved, so it has no baseline deviation to report.
        assert!(anomalies.iter().all(|a| a.metric != Metric::Spend));
    }

    #[test]
    fn test_spend_spike_is_neutral_and_rendered_as_currency() {
        // Spend alternates $90 / $110 with flat clicks, then doubles.
        let mut records: Vec<DailyMetricRecord> = (0..10)
            .map(|i| record("c-1", day(i), 5_000, 50, if i % 2 == 0 { 90.0 } else { 110.0 }))
            .collect();
        records.push(record("c-1", day(10), 5_000, 50, 200.0));

        let anomalies = AnomalyDetector::default().detect(&records, None);
        let spend = anomalies.iter().find(|a| a.metric == Metric::Spend).unwrap();
        assert_eq!(spend.severity, AnomalySeverity::Critical);
        assert!((spend.deviation_pct - 100.0).abs() < 1e-9);
        assert_eq!(
            spend.message,
            "Campaign c-1: Daily Spend changed significantly. \
             Current: $200.00 vs Expected: $100.00 (+100.0% increase)"
        );

        // Cost per click moved with spend and reads as a degradation.
        let cpc = anomalies.iter().find(|a| a.metric == Metric::Cpc).unwrap();
        assert!(cpc.message.contains("Cost Per Click degraded significantly"));
        assert!(cpc.message.contains("Current: $4.00 vs Expected: $2.00"));
    }

    #[test]
    fn test_deviation_without_expected_level_is_zero() {
        assert_eq!(deviation_pct(3.5, 0.0), 0.0);
        assert_eq!(deviation_pct(0.0, 0.0), 0.0);
        assert!((deviation_pct(150.0, 100.0) - 50.0).abs() < 1e-12);
        assert!((deviation_pct(1.0, 3.0) + 66.666_666).abs() < 1e-3);
    }

    #[test]
    fn test_too_few_history_days() {
        let mut records: Vec<DailyMetricRecord> = (0..5)
            .map(|i| record("c-1", day(i), 10_000, if i % 2 == 0 { 290 } else { 310 }, 100.0))
            .collect();
        records.push(record("c-1", day(5), 10_000, 100, 100.0));
        assert!(AnomalyDetector::default().detect(&records, None).is_empty());
    }

    #[test]
    fn test_history_outside_lookback_is_ignored() {
        let config = AnalyticsConfig {
            lookback_days: 5,
            ..AnalyticsConfig::default()
        };
        let detector = AnomalyDetector::new(&config);
        // Ten history days exist but only five fall inside the window.
        assert!(detector.detect(&ctr_collapse("c-1"), None).is_empty());
    }

    #[test]
    fn test_missing_analysis_day_yields_nothing() {
        let detector = AnomalyDetector::default();
        let anomalies = detector.detect(&ctr_collapse("c-1"), Some(day(20)));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_ordering_critical_first_then_abs_z() {
        let mut records = ctr_collapse("c-1");
        // Second campaign with a milder CTR dip on the same day.
        records.extend((0..10).map(|i| {
            let clicks = if i % 2 == 0 { 290 } else { 310 };
            record("c-2", day(i), 10_000, clicks, 100.0)
        }));
        records.push(record("c-2", day(10), 10_000, 270, 100.0));

        let anomalies = AnomalyDetector::default().detect(&records, Some(day(10)));
        assert!(anomalies.len() >= 2);
        for pair in anomalies.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.severity >= b.severity);
            if a.severity == b.severity {
                assert!(a.z_score.abs() >= b.z_score.abs());
            }
        }
        assert_eq!(anomalies[0].severity, AnomalySeverity::Critical);
    }

    #[test]
    fn test_summary_counts() {
        let mut records = ctr_collapse("c-1");
        records.extend(ctr_collapse("c-2").into_iter().map(|mut r| {
            r.provider = "meta".into();
            r
        }));
        let anomalies = AnomalyDetector::default().detect(&records, None);
        let summary = AnomalyDetector::summarize(&anomalies);

        assert_eq!(summary.total, anomalies.len());
        assert_eq!(summary.critical + summary.warning, summary.total);
        assert_eq!(summary.by_metric.get(&Metric::Ctr), Some(&2));
        assert_eq!(summary.by_provider.get("meta"), summary.by_provider.get("google_ads"));
        assert!(summary.top_concerns.len() <= 5);
        assert_eq!(summary.top_concerns[0], anomalies[0].message);
    }

    #[test]
    fn test_empty_input() {
        let detector = AnomalyDetector::default();
        assert!(detector.detect(&[], None).is_empty());
        assert_eq!(AnomalyDetector::summarize(&[]), AnomalySummary::default());
    }
}

//! Rate metrics derived from raw delivery counts.
//!
//! Every ratio is guarded against a zero denominator. Rates default to 0.
//! Cost per acquisition is the exception: a window with spend but no
//! conversions is reported as [`Cpa::Undefined`] rather than a sentinel
//! number, so it cannot leak into arithmetic.

use serde::{Deserialize, Serialize};

use crate::types::DailyMetricRecord;

/// A metric the engines know how to read from aggregated totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Ctr,
    Cpc,
    Cpa,
    ConversionRate,
    Roas,
    Spend,
    Impressions,
    Clicks,
    Conversions,
    ConversionValue,
}

/// How a metric value is rendered in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Percent,
    Currency,
    Number,
}

impl Metric {
    /// Wire key, e.g. `conversion_rate`.
    pub fn key(self) -> &'static str {
        match self {
            Self::Ctr => "ctr",
            Self::Cpc => "cpc",
            Self::Cpa => "cpa",
            Self::ConversionRate => "conversion_rate",
            Self::Roas => "roas",
            Self::Spend => "spend",
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Conversions => "conversions",
            Self::ConversionValue => "conversion_value",
        }
    }

    pub fn format(self) -> ValueFormat {
        match self {
            Self::Ctr | Self::ConversionRate => ValueFormat::Percent,
            Self::Cpc | Self::Cpa | Self::Spend | Self::ConversionValue => ValueFormat::Currency,
            Self::Roas | Self::Impressions | Self::Clicks | Self::Conversions => {
                ValueFormat::Number
            }
        }
    }

    /// Render a value of this metric for a human reader.
    pub fn render(self, value: f64) -> String {
        match self.format() {
            ValueFormat::Percent => format!("{value:.2}%"),
            ValueFormat::Currency => format!("${value:.2}"),
            ValueFormat::Number => group_thousands(value),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Format a number rounded to an integer with thousands separators.
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

/// Cost per acquisition over an aggregate window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cpa {
    /// Spend with no conversions to show for it.
    Undefined,
    Value(f64),
}

impl Cpa {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Undefined => None,
            Self::Value(v) => Some(v),
        }
    }
}

/// The five rate metrics for a single day or window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// `clicks / impressions * 100`.
    pub ctr: f64,
    pub cpc: f64,
    /// Per-day context: 0.0 when there were no conversions.
    pub cpa: f64,
    /// `conversions / clicks * 100`.
    pub conversion_rate: f64,
    pub roas: f64,
}

/// Summed delivery counts for one record or a group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTotals {
    pub impressions: u64,
    pub clicks: u64,
    /// Currency units, already converted from micros.
    pub spend: f64,
    pub conversions: f64,
    pub conversion_value: f64,
}

impl MetricTotals {
    pub fn from_record(record: &DailyMetricRecord) -> Self {
        let mut totals = Self::default();
        totals.add(record);
        totals
    }

    pub fn add(&mut self, record: &DailyMetricRecord) {
        self.impressions += record.impressions;
        self.clicks += record.clicks;
        self.spend += record.spend();
        self.conversions += record.conversions;
        self.conversion_value += record.conversion_value;
    }

    pub fn ctr(&self) -> f64 {
        if self.impressions > 0 {
            self.clicks as f64 / self.impressions as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn cpc(&self) -> f64 {
        if self.clicks > 0 {
            self.spend / self.clicks as f64
        } else {
            0.0
        }
    }

    /// Aggregate CPA: undefined when nothing converted.
    pub fn cpa(&self) -> Cpa {
        if self.conversions > 0.0 {
            Cpa::Value(self.spend / self.conversions)
        } else {
            Cpa::Undefined
        }
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.clicks > 0 {
            self.conversions / self.clicks as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn roas(&self) -> f64 {
        if self.spend > 0.0 {
            self.conversion_value / self.spend
        } else {
            0.0
        }
    }

    /// Per-day derivation, where an undefined CPA reads as 0.
    pub fn derived(&self) -> DerivedMetrics {
        DerivedMetrics {
            ctr: self.ctr(),
            cpc: self.cpc(),
            cpa: self.cpa().value().unwrap_or(0.0),
            conversion_rate: self.conversion_rate(),
            roas: self.roas(),
        }
    }

    /// Read a metric with per-day semantics.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Ctr => self.ctr(),
            Metric::Cpc => self.cpc(),
            Metric::Cpa => self.cpa().value().unwrap_or(0.0),
            Metric::ConversionRate => self.conversion_rate(),
            Metric::Roas => self.roas(),
            Metric::Spend => self.spend,
            Metric::Impressions => self.impressions as f64,
            Metric::Clicks => self.clicks as f64,
            Metric::Conversions => self.conversions,
            Metric::ConversionValue => self.conversion_value,
        }
    }
}

impl<'a> FromIterator<&'a DailyMetricRecord> for MetricTotals {
    fn from_iter<I: IntoIterator<Item = &'a DailyMetricRecord>>(iter: I) -> Self {
        let mut totals = Self::default();
        for record in iter {
            totals.add(record);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(
        impressions: u64,
        clicks: u64,
        spend: f64,
        conversions: f64,
        value: f64,
    ) -> DailyMetricRecord {
        DailyMetricRecord {
            campaign_id: "c-1".into(),
            campaign_name: "Search".into(),
            provider: "google_ads".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            impressions,
            clicks,
            spend_micros: (spend * 1_000_000.0) as u64,
            conversions,
            conversion_value: value,
        }
    }

    #[test]
    fn test_derived_rates() {
        let totals = MetricTotals::from_record(&record(2_000, 100, 50.0, 5.0, 200.0));
        let d = totals.derived();
        assert!((d.ctr - 5.0).abs() < 1e-9);
        assert!((d.cpc - 0.5).abs() < 1e-9);
        assert!((d.cpa - 10.0).abs() < 1e-9);
        assert!((d.conversion_rate - 5.0).abs() < 1e-9);
        assert!((d.roas - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominators_default_to_zero() {
        let totals = MetricTotals::from_record(&record(0, 0, 0.0, 0.0, 0.0));
        let d = totals.derived();
        assert_eq!(d.ctr, 0.0);
        assert_eq!(d.cpc, 0.0);
        assert_eq!(d.cpa, 0.0);
        assert_eq!(d.conversion_rate, 0.0);
        assert_eq!(d.roas, 0.0);
    }

    #[test]
    fn test_aggregate_cpa_is_undefined_without_conversions() {
        let records = [
            record(1_000, 40, 30.0, 0.0, 0.0),
            record(900, 35, 25.0, 0.0, 0.0),
        ];
        let totals: MetricTotals = records.iter().collect();
        assert_eq!(totals.cpa(), Cpa::Undefined);
        // Per-day reading still degrades to zero.
        assert_eq!(totals.value(Metric::Cpa), 0.0);
        assert!((totals.spend - 55.0).abs() < 1e-9);
        assert_eq!(totals.clicks, 75);
    }

    #[test]
    fn test_render_by_format() {
        assert_eq!(Metric::Ctr.render(3.14159), "3.14%");
        assert_eq!(Metric::Cpc.render(1.5), "$1.50");
        assert_eq!(Metric::Impressions.render(1234567.4), "1,234,567");
        assert_eq!(group_thousands(-999.0), "-999");
        assert_eq!(group_thousands(1000.0), "1,000");
    }
}

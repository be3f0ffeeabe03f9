pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::AnalyticsConfig;
pub use error::{InsightsError, InsightsResult};
pub use metrics::{Cpa, DerivedMetrics, Metric, MetricTotals, ValueFormat};
pub use types::{Campaign, CampaignStatus, DailyMetricRecord};

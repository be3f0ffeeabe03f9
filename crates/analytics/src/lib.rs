//! Campaign performance analytics: anomaly detection, budget optimization,
//! cross-platform comparison, forecasting, pacing and the insights summary
//! that combines them.

pub mod anomaly;
pub mod forecast;
pub mod insights;
pub mod optimizer;
pub mod pacing;
pub mod stats;

pub use anomaly::{Anomaly, AnomalyDetector, AnomalySeverity, AnomalySummary};
pub use forecast::{ConversionOutlook, Forecast, PerformanceForecaster};
pub use insights::{health_score, InsightsEngine, InsightsSummary, WorkspaceData};
pub use optimizer::{BudgetOptimizer, BudgetRecommendation, CrossPlatformInsight, Priority};
pub use pacing::{CampaignPacing, PacingStatus};

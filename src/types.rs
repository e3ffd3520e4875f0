use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Nullable columns come back as explicit `null`; read them as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// One of the five independently-fetched entity families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Insights,
    ProcedurePerformance,
    Analytics,
    Notifications,
    Territory,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Insights,
        Collection::ProcedurePerformance,
        Collection::Analytics,
        Collection::Notifications,
        Collection::Territory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Insights => "insights",
            Collection::ProcedurePerformance => "procedure_performance",
            Collection::Analytics => "analytics",
            Collection::Notifications => "notifications",
            Collection::Territory => "territory",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Immediate,
    Urgent,
    #[default]
    Standard,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    RepAnalytics,
    RegionAnalytics,
    CallAnalysis,
    MarketIntel,
    ProcedureOpportunity,
    CompetitiveIntel,
    #[default]
    #[serde(other)]
    Other,
}

/// An AI-pipeline insight row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceInsight {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub insight_type: InsightType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_source: String,
    /// 0–100
    #[serde(default, deserialize_with = "null_as_default")]
    pub correlation_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub insight_data: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedure_tags: Vec<String>,
    #[serde(default)]
    pub territory_relevance: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Partial insight accepted by the create operation. The gateway assigns
/// `id` and `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewInsight {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight_type: Option<InsightType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_level: Option<UrgencyLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedure_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub territory_relevance: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewInsight {
    /// Materialise the full record the way the remote store would on insert.
    pub fn into_record(self, id: String, created_at: DateTime<Utc>) -> IntelligenceInsight {
        IntelligenceInsight {
            id,
            user_id: self.user_id.unwrap_or_default(),
            insight_type: self.insight_type.unwrap_or_default(),
            data_source: self.data_source.unwrap_or_else(|| "manual".to_string()),
            correlation_score: self.correlation_score.unwrap_or(0.0).clamp(0.0, 100.0),
            urgency_level: self.urgency_level.unwrap_or_default(),
            insight_data: self.insight_data.unwrap_or(Value::Null),
            procedure_tags: self.procedure_tags.unwrap_or_default(),
            territory_relevance: self.territory_relevance.unwrap_or(Value::Null),
            expires_at: self.expires_at,
            created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Procedure performance
// ---------------------------------------------------------------------------

/// Per-rep market and financial metrics for one procedure. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedurePerformance {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sphere1a_procedure_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedure_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedure_category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub market_size_millions: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub growth_percentage: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub complexity_rating: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub average_cost: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub patient_satisfaction: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub territory_multiplier: f64,
    #[serde(default)]
    pub competitive_pressure: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_performance_vs_market: Option<f64>,
}

// ---------------------------------------------------------------------------
// Unified analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsType {
    Rep,
    Region,
    Territory,
    Procedure,
    Competitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAnalytics {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub territory_id: Option<String>,
    pub analytics_type: AnalyticsType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metric_value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_value: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trend_direction: TrendDirection,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedure_correlation: Vec<String>,
    #[serde(default)]
    pub geographic_scope: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time_period: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_freshness: String,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CallTiming,
    OpportunityAlert,
    CompetitiveIntel,
    GoalProgress,
    MarketUpdate,
    ProcedureInsight,
    #[default]
    #[serde(other)]
    Other,
}

/// The only entity with a client-initiated mutation besides creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligentNotification {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notification_type: NotificationType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority_level: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub action_data: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delivery_channels: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub read_status: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Territory
// ---------------------------------------------------------------------------

/// Row of the enriched territory view. Columns beyond the code and score
/// vary by territory and are kept as an open payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_id: String,
    pub territory_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub opportunity_score: f64,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, Value>,
}

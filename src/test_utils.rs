//! Row builders and async helpers shared by the unit tests.

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::types::{
    AnalyticsType, InsightType, IntelligenceInsight, IntelligentNotification, NotificationType,
    ProcedurePerformance, TerritoryRecord, TrendDirection, UnifiedAnalytics, UrgencyLevel,
};

pub const TEST_USER: &str = "rep-1";

pub fn insight(id: &str) -> IntelligenceInsight {
    IntelligenceInsight {
        id: id.to_string(),
        user_id: TEST_USER.to_string(),
        insight_type: InsightType::MarketIntel,
        data_source: "pipeline".to_string(),
        correlation_score: 70.0,
        urgency_level: UrgencyLevel::Standard,
        insight_data: json!({ "title": format!("Insight {}", id) }),
        procedure_tags: vec![],
        territory_relevance: Value::Null,
        expires_at: None,
        created_at: Utc::now(),
    }
}

pub fn notification(id: &str, read: bool) -> IntelligentNotification {
    IntelligentNotification {
        id: id.to_string(),
        user_id: TEST_USER.to_string(),
        notification_type: NotificationType::OpportunityAlert,
        priority_level: 3,
        title: format!("Notification {}", id),
        message: String::new(),
        action_data: Value::Null,
        delivery_channels: vec!["in_app".to_string()],
        read_status: read,
        expires_at: None,
        created_at: Utc::now(),
    }
}

pub fn analytics(id: &str, analytics_type: AnalyticsType) -> UnifiedAnalytics {
    UnifiedAnalytics {
        id: id.to_string(),
        user_id: TEST_USER.to_string(),
        territory_id: None,
        analytics_type,
        metric_name: "calls_per_week".to_string(),
        metric_value: 12.0,
        benchmark_value: None,
        trend_direction: TrendDirection::Up,
        procedure_correlation: vec![],
        geographic_scope: Value::Null,
        time_period: "daily".to_string(),
        data_freshness: "live".to_string(),
    }
}

pub fn territory(id: &str, code: &str) -> TerritoryRecord {
    TerritoryRecord {
        id: id.to_string(),
        user_id: TEST_USER.to_string(),
        territory_code: code.to_string(),
        opportunity_score: 50.0,
        payload: Map::new(),
    }
}

pub fn procedure(id: &str, name: &str, category: &str, market_size: f64) -> ProcedurePerformance {
    ProcedurePerformance {
        id: id.to_string(),
        user_id: TEST_USER.to_string(),
        sphere1a_procedure_id: format!("sp-{}", id),
        procedure_name: name.to_string(),
        procedure_category: category.to_string(),
        market_size_millions: market_size,
        growth_percentage: 5.0,
        complexity_rating: "moderate".to_string(),
        average_cost: 1_000.0,
        patient_satisfaction: 4.5,
        territory_multiplier: 1.0,
        competitive_pressure: Value::Null,
        conversion_rate: None,
        rep_performance_vs_market: None,
    }
}

/// Let spawned tasks run until they park on something other than the
/// scheduler.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

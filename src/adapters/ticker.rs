// Ticker adapter: insights -> flat display rows for the live ticker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::types::{InsightType, IntelligenceInsight, UrgencyLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl From<UrgencyLevel> for TickerPriority {
    fn from(urgency: UrgencyLevel) -> Self {
        match urgency {
            UrgencyLevel::Immediate => TickerPriority::Critical,
            UrgencyLevel::Urgent => TickerPriority::High,
            UrgencyLevel::Standard => TickerPriority::Medium,
            UrgencyLevel::Low => TickerPriority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerType {
    HighValueOpportunity,
    CompetitiveThreat,
    MarketUpdate,
    ReEngagement,
    GeneralInsight,
}

impl From<InsightType> for TickerType {
    fn from(insight_type: InsightType) -> Self {
        match insight_type {
            InsightType::ProcedureOpportunity => TickerType::HighValueOpportunity,
            InsightType::CompetitiveIntel => TickerType::CompetitiveThreat,
            InsightType::MarketIntel => TickerType::MarketUpdate,
            InsightType::CallAnalysis => TickerType::ReEngagement,
            _ => TickerType::GeneralInsight,
        }
    }
}

/// One ticker row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: TickerPriority,
    #[serde(rename = "type")]
    pub ticker_type: TickerType,
    pub contact_name: String,
    pub company_name: String,
    pub expected_value: f64,
    pub confidence: f64,
    pub next_steps: String,
    pub last_updated: DateTime<Utc>,
    pub urgency_score: u8,
    pub tags: Vec<String>,
}

pub fn urgency_score(urgency: UrgencyLevel) -> u8 {
    match urgency {
        UrgencyLevel::Immediate => 95,
        UrgencyLevel::Urgent => 85,
        UrgencyLevel::Standard => 65,
        UrgencyLevel::Low => 45,
    }
}

/// Map insights to ticker rows, one per insight, order kept.
pub fn to_ticker_items(insights: &[IntelligenceInsight]) -> Vec<TickerItem> {
    insights.iter().map(ticker_item).collect()
}

fn ticker_item(insight: &IntelligenceInsight) -> TickerItem {
    let data = &insight.insight_data;
    TickerItem {
        id: insight.id.clone(),
        title: ticker_title(insight),
        description: text(data, "message").unwrap_or_else(|| "Market intelligence update".into()),
        priority: insight.urgency_level.into(),
        ticker_type: insight.insight_type.into(),
        contact_name: text(data, "contactName").unwrap_or_else(|| "Market Intelligence".into()),
        company_name: text(data, "companyName").unwrap_or_else(|| "SphereOS Analytics".into()),
        expected_value: number(data, "market_size")
            .or_else(|| number(data, "roi_estimate"))
            .unwrap_or(0.0),
        confidence: insight.correlation_score,
        next_steps: text(data, "action").unwrap_or_else(|| "Review insight details".into()),
        last_updated: insight.created_at,
        urgency_score: urgency_score(insight.urgency_level),
        tags: insight.procedure_tags.clone(),
    }
}

fn ticker_title(insight: &IntelligenceInsight) -> String {
    let data = &insight.insight_data;
    match insight.insight_type {
        InsightType::ProcedureOpportunity => {
            let procedure = text(data, "procedure").unwrap_or_else(|| "Procedure".into());
            let value = match display(data, "market_size") {
                Some(size) => format!("${}M market", size),
                None => "High Value".to_string(),
            };
            format!("🎯 {} Opportunity - {}", procedure, value)
        }
        InsightType::CompetitiveIntel => format!(
            "⚡ Competitive Alert - {}",
            text(data, "affected_procedure").unwrap_or_else(|| "Market Change".into())
        ),
        InsightType::MarketIntel => format!(
            "📈 Market Update - {} Growth",
            text(data, "procedure").unwrap_or_else(|| "Industry".into())
        ),
        _ => text(data, "title").unwrap_or_else(|| "Intelligence Update".into()),
    }
}

/// Non-empty string field.
fn text(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-zero numeric field. Numeric strings are accepted.
fn number(data: &Value, key: &str) -> Option<f64> {
    let value = data.get(key)?;
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (n != 0.0).then_some(n)
}

/// Field rendered the way it would print in a title.
fn display(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::insight;
    use serde_json::json;

    #[test]
    fn test_procedure_opportunity_row() {
        let mut row = insight("ins-1");
        row.insight_type = InsightType::ProcedureOpportunity;
        row.urgency_level = UrgencyLevel::Immediate;
        row.correlation_score = 91.0;
        row.procedure_tags = vec!["botox".into()];
        row.insight_data = json!({
            "procedure": "Botox",
            "market_size": 12.5,
            "action": "Call Dr. Lee this week"
        });

        let item = &to_ticker_items(&[row])[0];
        assert_eq!(item.title, "🎯 Botox Opportunity - $12.5M market");
        assert_eq!(item.priority, TickerPriority::Critical);
        assert_eq!(item.ticker_type, TickerType::HighValueOpportunity);
        assert_eq!(item.urgency_score, 95);
        assert_eq!(item.expected_value, 12.5);
        assert_eq!(item.confidence, 91.0);
        assert_eq!(item.next_steps, "Call Dr. Lee this week");
        assert_eq!(item.tags, vec!["botox".to_string()]);
    }

    #[test]
    fn test_missing_payload_fields_fall_back() {
        let mut row = insight("ins-2");
        row.insight_type = InsightType::Other;
        row.urgency_level = UrgencyLevel::Low;
        row.insight_data = Value::Null;

        let item = &to_ticker_items(&[row])[0];
        assert_eq!(item.title, "Intelligence Update");
        assert_eq!(item.description, "Market intelligence update");
        assert_eq!(item.contact_name, "Market Intelligence");
        assert_eq!(item.company_name, "SphereOS Analytics");
        assert_eq!(item.expected_value, 0.0);
        assert_eq!(item.next_steps, "Review insight details");
        assert_eq!(item.ticker_type, TickerType::GeneralInsight);
        assert_eq!(item.urgency_score, 45);
    }

    #[test]
    fn test_titles_per_insight_type() {
        let mut competitive = insight("c");
        competitive.insight_type = InsightType::CompetitiveIntel;
        competitive.insight_data = json!({ "affected_procedure": "Fillers" });

        let mut market = insight("m");
        market.insight_type = InsightType::MarketIntel;
        market.insight_data = json!({});

        let mut opportunity = insight("o");
        opportunity.insight_type = InsightType::ProcedureOpportunity;
        opportunity.insight_data = json!({ "roi_estimate": 40000 });

        let items = to_ticker_items(&[competitive, market, opportunity]);
        assert_eq!(items[0].title, "⚡ Competitive Alert - Fillers");
        assert_eq!(items[1].title, "📈 Market Update - Industry Growth");
        assert_eq!(items[2].title, "🎯 Procedure Opportunity - High Value");
        assert_eq!(items[2].expected_value, 40000.0);
    }

    #[test]
    fn test_serialized_shape_uses_display_names() {
        let item = &to_ticker_items(&[insight("ins-3")])[0];
        let value = serde_json::to_value(item).unwrap();
        assert_eq!(value["type"], json!("market_update"));
        assert_eq!(value["priority"], json!("medium"));
        assert_eq!(value["urgencyScore"], json!(65));
    }
}

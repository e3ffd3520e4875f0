//! PostgREST-style gateway.
//!
//! Reads map to `GET /rest/v1/{table}` with the ordering and expiry filters
//! the dashboards rely on; mark-read is a PATCH; create is an insert that
//! returns the stored row. Push subscriptions need the store's websocket
//! channel, which this transport does not carry.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use super::{EventSink, IntelligenceGateway, Subscription};
use crate::config::GatewayConfig;
use crate::error::{ConfigError, GatewayError};
use crate::types::{
    Collection, IntelligenceInsight, IntelligentNotification, NewInsight, ProcedurePerformance,
    TerritoryRecord, UnifiedAnalytics,
};

const INSIGHTS_TABLE: &str = "intelligence_engine";
const PROCEDURES_TABLE: &str = "procedure_performance_enriched";
const ANALYTICS_TABLE: &str = "unified_analytics";
const NOTIFICATIONS_TABLE: &str = "intelligent_notifications";
const TERRITORY_TABLE: &str = "territory_intelligence_enriched";

type Params = Vec<(&'static str, String)>;

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// Rows with no expiry, or an expiry still in the future.
fn not_expired(now: DateTime<Utc>) -> String {
    format!(
        "(expires_at.is.null,expires_at.gt.{})",
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

fn with_user(mut params: Params, user_id: Option<&str>) -> Params {
    if let Some(user) = user_id {
        params.push(("user_id", eq(user)));
    }
    params
}

pub(crate) fn insights_query(user_id: Option<&str>, limit: usize, now: DateTime<Utc>) -> Params {
    let mut params = with_user(vec![("select", "*".to_string())], user_id);
    params.push(("or", not_expired(now)));
    params.push(("order", "created_at.desc".to_string()));
    params.push(("limit", limit.to_string()));
    params
}

pub(crate) fn procedures_query(user_id: Option<&str>) -> Params {
    let mut params = with_user(vec![("select", "*".to_string())], user_id);
    params.push(("order", "market_size_millions.desc".to_string()));
    params
}

pub(crate) fn analytics_query(user_id: Option<&str>, time_period: &str) -> Params {
    let mut params = vec![
        ("select", "*".to_string()),
        ("time_period", eq(time_period)),
    ];
    params = with_user(params, user_id);
    params.push(("order", "created_at.desc".to_string()));
    params
}

pub(crate) fn notifications_query(user_id: Option<&str>, now: DateTime<Utc>) -> Params {
    let mut params = with_user(vec![("select", "*".to_string())], user_id);
    params.push(("or", not_expired(now)));
    params.push(("order", "priority_level.desc,created_at.desc".to_string()));
    params
}

pub(crate) fn territory_query(user_id: Option<&str>) -> Params {
    let mut params = with_user(vec![("select", "*".to_string())], user_id);
    params.push(("order", "opportunity_score.desc".to_string()));
    params
}

pub struct RestGateway {
    client: Client,
    base: Url,
    api_key: Option<String>,
    time_period: String,
}

impl RestGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let base = Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client: Client::new(),
            base,
            api_key: config.api_key.clone(),
            time_period: config.time_period.clone(),
        })
    }

    pub(crate) fn table_url(&self, table: &str, params: &[(&str, String)]) -> Result<Url, GatewayError> {
        let mut url = self
            .base
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| GatewayError::Network(format!("bad table url: {}", e)))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, GatewayError> {
        let url = self.table_url(table, params)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let rows = response.json::<Vec<T>>().await?;
        log::debug!("RestGateway: {} returned {} rows", table, rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl IntelligenceGateway for RestGateway {
    async fn get_intelligence_insights(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IntelligenceInsight>, GatewayError> {
        self.get_rows(INSIGHTS_TABLE, &insights_query(user_id, limit, Utc::now()))
            .await
    }

    async fn get_procedure_performance(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<ProcedurePerformance>, GatewayError> {
        self.get_rows(PROCEDURES_TABLE, &procedures_query(user_id)).await
    }

    async fn get_unified_analytics(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<UnifiedAnalytics>, GatewayError> {
        self.get_rows(ANALYTICS_TABLE, &analytics_query(user_id, &self.time_period))
            .await
    }

    async fn get_intelligent_notifications(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<IntelligentNotification>, GatewayError> {
        self.get_rows(NOTIFICATIONS_TABLE, &notifications_query(user_id, Utc::now()))
            .await
    }

    async fn get_territory_intelligence(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<TerritoryRecord>, GatewayError> {
        self.get_rows(TERRITORY_TABLE, &territory_query(user_id)).await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), GatewayError> {
        let url = self.table_url(NOTIFICATIONS_TABLE, &[("id", eq(notification_id))])?;
        let builder = self
            .request(Method::PATCH, url)
            .json(&serde_json::json!({ "read_status": true }));
        self.send(builder).await?;
        Ok(())
    }

    async fn create_intelligence_insight(
        &self,
        insight: &NewInsight,
    ) -> Result<IntelligenceInsight, GatewayError> {
        let url = self.table_url(INSIGHTS_TABLE, &[])?;
        let builder = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&[insight]);
        let response = self.send(builder).await?;
        let mut rows = response.json::<Vec<IntelligenceInsight>>().await?;
        if rows.is_empty() {
            return Err(GatewayError::Decode(
                "insert returned no representation".to_string(),
            ));
        }
        Ok(rows.remove(0))
    }

    fn subscribe(
        &self,
        collection: Collection,
        _user_id: Option<&str>,
        _sink: EventSink,
    ) -> Result<Subscription, GatewayError> {
        Err(GatewayError::Unsupported(format!(
            "realtime {} channel over REST",
            collection
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gateway() -> RestGateway {
        RestGateway::new(&GatewayConfig {
            base_url: "https://store.example.com/".to_string(),
            api_key: Some("anon".to_string()),
            time_period: "weekly".to_string(),
        })
        .unwrap()
    }

    fn has(params: &Params, key: &str, value: &str) -> bool {
        params.iter().any(|(k, v)| *k == key && v == value)
    }

    #[test]
    fn test_insights_query_orders_limits_and_hides_expired() {
        let now = Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap();
        let params = insights_query(Some("rep-1"), 10, now);
        assert!(has(&params, "user_id", "eq.rep-1"));
        assert!(has(&params, "order", "created_at.desc"));
        assert!(has(&params, "limit", "10"));
        assert!(has(
            &params,
            "or",
            "(expires_at.is.null,expires_at.gt.2025-07-30T12:00:00Z)"
        ));
    }

    #[test]
    fn test_unscoped_queries_omit_user_filter() {
        let params = procedures_query(None);
        assert!(!params.iter().any(|(k, _)| *k == "user_id"));
        assert!(has(&params, "order", "market_size_millions.desc"));
    }

    #[test]
    fn test_notifications_ordered_by_priority_then_recency() {
        let params = notifications_query(Some("rep-1"), Utc::now());
        assert!(has(&params, "order", "priority_level.desc,created_at.desc"));
    }

    #[test]
    fn test_analytics_filtered_by_time_period() {
        let params = analytics_query(None, "weekly");
        assert!(has(&params, "time_period", "eq.weekly"));
    }

    #[test]
    fn test_table_url_encodes_params() {
        let url = gateway()
            .table_url(TERRITORY_TABLE, &territory_query(Some("rep 1")))
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/territory_intelligence_enriched");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("user_id".to_string(), "eq.rep 1".to_string())));
    }

    #[test]
    fn test_subscribe_is_unsupported() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let result = gateway().subscribe(Collection::Insights, None, tx);
        assert!(matches!(result, Err(GatewayError::Unsupported(_))));
    }
}

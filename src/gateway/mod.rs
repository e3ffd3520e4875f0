//! Remote intelligence gateway contract.
//!
//! The sync layer never talks to the remote store directly; it is handed an
//! `Arc<dyn IntelligenceGateway>` at construction. `memory` is the scriptable
//! in-process implementation, `rest` talks to a PostgREST-style store.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::types::{
    Collection, IntelligenceInsight, IntelligentNotification, NewInsight, ProcedurePerformance,
    TerritoryRecord, UnifiedAnalytics,
};

/// Kind of row change carried by a push event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A push notification that one collection changed remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    pub collection: Collection,
    pub change: ChangeKind,
    pub record_id: Option<String>,
}

/// Messages a gateway delivers on a subscription channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    Change(RealtimeEvent),
    /// The channel stopped delivering; nothing more arrives until a new
    /// subscription is opened.
    Closed { collection: Collection, reason: String },
}

pub type EventSink = mpsc::UnboundedSender<RealtimeMessage>;

/// Handle for one open push subscription.
///
/// `unsubscribe` may be called any number of times; only the first call
/// reaches the gateway. Dropping the handle unsubscribes.
pub struct Subscription {
    collection: Collection,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(collection: Collection, cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            collection,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("collection", &self.collection)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Per-collection read, write and subscribe operations of the remote store.
///
/// `user_id = None` reads unscoped rows, matching the remote store's own
/// row-level policy.
#[async_trait]
pub trait IntelligenceGateway: Send + Sync {
    async fn get_intelligence_insights(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IntelligenceInsight>, GatewayError>;

    async fn get_procedure_performance(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<ProcedurePerformance>, GatewayError>;

    async fn get_unified_analytics(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<UnifiedAnalytics>, GatewayError>;

    async fn get_intelligent_notifications(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<IntelligentNotification>, GatewayError>;

    async fn get_territory_intelligence(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<TerritoryRecord>, GatewayError>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), GatewayError>;

    async fn create_intelligence_insight(
        &self,
        insight: &NewInsight,
    ) -> Result<IntelligenceInsight, GatewayError>;

    /// Open a push subscription for one collection. Events are delivered on
    /// `sink` until the returned handle is unsubscribed.
    fn subscribe(
        &self,
        collection: Collection,
        user_id: Option<&str>,
        sink: EventSink,
    ) -> Result<Subscription, GatewayError>;
}

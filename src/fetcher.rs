//! Collection fetchers.
//!
//! One fetch per collection: take a ticket, call the gateway, commit the
//! result. Failures are recorded on the collection and never escape.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::GatewayError;
use crate::gateway::IntelligenceGateway;
use crate::state::{AggregateStore, CollectionRecord, CommitOutcome};
use crate::types::{
    Collection, IntelligenceInsight, IntelligentNotification, ProcedurePerformance,
    TerritoryRecord, UnifiedAnalytics,
};

pub struct CollectionFetcher {
    store: Arc<AggregateStore>,
    gateway: Arc<dyn IntelligenceGateway>,
    user_id: RwLock<Option<String>>,
    insight_limit: usize,
}

impl CollectionFetcher {
    pub fn new(
        store: Arc<AggregateStore>,
        gateway: Arc<dyn IntelligenceGateway>,
        user_id: Option<String>,
        insight_limit: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            user_id: RwLock::new(user_id),
            insight_limit,
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    pub(crate) fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write() = user_id;
    }

    /// Fetch one collection and commit the result.
    pub async fn fetch(&self, collection: Collection) -> CommitOutcome {
        let user = self.user_id();
        let user = user.as_deref();
        match collection {
            Collection::Insights => {
                self.run::<IntelligenceInsight, _>(
                    self.gateway.get_intelligence_insights(user, self.insight_limit),
                )
                .await
            }
            Collection::ProcedurePerformance => {
                self.run::<ProcedurePerformance, _>(self.gateway.get_procedure_performance(user))
                    .await
            }
            Collection::Analytics => {
                self.run::<UnifiedAnalytics, _>(self.gateway.get_unified_analytics(user))
                    .await
            }
            Collection::Notifications => {
                self.run::<IntelligentNotification, _>(
                    self.gateway.get_intelligent_notifications(user),
                )
                .await
            }
            Collection::Territory => {
                self.run::<TerritoryRecord, _>(self.gateway.get_territory_intelligence(user))
                    .await
            }
        }
    }

    /// Fan out all five fetches concurrently and wait for every one.
    pub async fn refresh_all(&self) {
        if self.store.is_closed() {
            return;
        }
        tokio::join!(
            self.fetch(Collection::Insights),
            self.fetch(Collection::ProcedurePerformance),
            self.fetch(Collection::Analytics),
            self.fetch(Collection::Notifications),
            self.fetch(Collection::Territory),
        );
    }

    async fn run<T, F>(&self, load: F) -> CommitOutcome
    where
        T: CollectionRecord,
        F: Future<Output = Result<Vec<T>, GatewayError>>,
    {
        let ticket = self.store.begin::<T>();
        let result = load.await;

        if let Err(e) = &result {
            log::warn!("Fetcher: {} fetch failed: {}", T::COLLECTION, e);
        }
        let count = result.as_ref().map(Vec::len).ok();

        let outcome = self.store.commit(ticket, result);
        match outcome {
            CommitOutcome::Committed => {
                if let Some(count) = count {
                    log::debug!("Fetcher: {} committed {} rows", T::COLLECTION, count);
                }
            }
            CommitOutcome::Stale => {
                log::debug!("Fetcher: {} result superseded, discarded", T::COLLECTION);
            }
            CommitOutcome::Closed => {
                log::debug!("Fetcher: {} resolved after teardown, ignored", T::COLLECTION);
            }
        }
        outcome
    }
}

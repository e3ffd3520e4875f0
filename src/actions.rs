//! Action dispatcher: the two client-initiated writes.
//!
//! Each write is recorded as a mutation that moves from `Pending` to
//! `Confirmed` or `Failed`. A failed mark-read puts the notification back
//! the way it was; a failed create adds nothing. There is no retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::MutationError;
use crate::gateway::IntelligenceGateway;
use crate::state::AggregateStore;
use crate::types::{IntelligenceInsight, NewInsight};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationKind {
    MarkNotificationRead { notification_id: String },
    CreateInsight,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed { message: String },
}

impl MutationState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Pending)
    }
}

/// One client-initiated write and where it ended up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub id: Uuid,
    pub kind: MutationKind,
    pub state: MutationState,
    pub started_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl MutationRecord {
    fn pending(kind: MutationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: MutationState::Pending,
            started_at: Utc::now(),
            settled_at: None,
        }
    }
}

pub struct ActionDispatcher {
    store: Arc<AggregateStore>,
    gateway: Arc<dyn IntelligenceGateway>,
}

impl ActionDispatcher {
    pub fn new(store: Arc<AggregateStore>, gateway: Arc<dyn IntelligenceGateway>) -> Self {
        Self { store, gateway }
    }

    /// Mark a notification read.
    ///
    /// The local flag flips before the remote call is made, so a read of the
    /// store right after this future is first polled already sees it.
    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), MutationError> {
        if self.store.is_closed() {
            return Err(MutationError::SessionClosed);
        }

        if self.store.apply_optimistic_read(notification_id).is_none() {
            log::debug!(
                "Actions: notification {} not in snapshot, marking remotely only",
                notification_id
            );
        }
        let record = MutationRecord::pending(MutationKind::MarkNotificationRead {
            notification_id: notification_id.to_string(),
        });
        let mutation_id = record.id;
        self.store.record_mutation(record);

        match self.gateway.mark_notification_read(notification_id).await {
            Ok(()) => {
                self.store.settle_optimistic_read(notification_id, true);
                self.store
                    .settle_mutation(mutation_id, MutationState::Confirmed);
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Actions: mark-read for notification {} failed, reverting: {}",
                    notification_id,
                    e
                );
                self.store.settle_optimistic_read(notification_id, false);
                self.store.settle_mutation(
                    mutation_id,
                    MutationState::Failed {
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }

    /// Create an insight and put the stored row at the head of the local
    /// snapshot. No refetch is triggered.
    pub async fn create_insight(
        &self,
        insight: NewInsight,
    ) -> Result<IntelligenceInsight, MutationError> {
        if self.store.is_closed() {
            return Err(MutationError::SessionClosed);
        }

        let record = MutationRecord::pending(MutationKind::CreateInsight);
        let mutation_id = record.id;
        self.store.record_mutation(record);

        match self.gateway.create_intelligence_insight(&insight).await {
            Ok(created) => {
                if !self.store.prepend_insight(created.clone()) {
                    log::debug!("Actions: insight {} already in snapshot", created.id);
                }
                self.store
                    .settle_mutation(mutation_id, MutationState::Confirmed);
                log::info!("Actions: created insight {}", created.id);
                Ok(created)
            }
            Err(e) => {
                log::warn!("Actions: create insight failed: {}", e);
                self.store.settle_mutation(
                    mutation_id,
                    MutationState::Failed {
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::memory::InMemoryGateway;
    use crate::types::{InsightType, IntelligentNotification};
    use crate::test_utils::{insight, notification};

    async fn loaded(gateway: &InMemoryGateway) -> (Arc<AggregateStore>, Arc<ActionDispatcher>) {
        let store = Arc::new(AggregateStore::new());
        let gw: Arc<dyn IntelligenceGateway> = Arc::new(gateway.clone());
        let fetcher = crate::fetcher::CollectionFetcher::new(store.clone(), gw.clone(), None, 10);
        fetcher.refresh_all().await;
        (store.clone(), Arc::new(ActionDispatcher::new(store, gw)))
    }

    #[tokio::test]
    async fn test_mark_read_flips_before_gateway_resolves() {
        let gateway = InMemoryGateway::new();
        gateway.set_notifications(vec![notification("n-1", false), notification("n-2", false)]);
        let (store, actions) = loaded(&gateway).await;
        assert_eq!(store.unread_count(), 2);

        gateway.hold_mutations(true);
        let task = tokio::spawn({
            let actions = actions.clone();
            async move { actions.mark_notification_read("n-1").await }
        });
        gateway.wait_for_waiting_mutations(1).await;

        // Remote write still parked
        assert_eq!(store.unread_count(), 1);
        let pending = store.mutations();
        assert!(pending[0].state.is_pending());

        gateway.hold_mutations(false);
        task.await.unwrap().unwrap();
        assert_eq!(store.mutations()[0].state, MutationState::Confirmed);
        assert!(store.mutations()[0].settled_at.is_some());
        assert!(gateway.notification("n-1").unwrap().read_status);
    }

    #[tokio::test]
    async fn test_failed_mark_read_reverts_and_reports() {
        let gateway = InMemoryGateway::new();
        gateway.set_notifications(vec![notification("n-1", false)]);
        let (store, actions) = loaded(&gateway).await;
        gateway.fail_mark_read(Some(GatewayError::Rejected {
            status: 403,
            message: "row level security".into(),
        }));

        let result = actions.mark_notification_read("n-1").await;
        assert!(matches!(result, Err(MutationError::Gateway(_))));

        assert_eq!(store.unread_count(), 1);
        let snap = store.snapshot::<IntelligentNotification>();
        assert!(!snap.data[0].read_status);
        match &store.mutations()[0].state {
            MutationState::Failed { message } => assert!(message.contains("403")),
            other => panic!("expected failed mutation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overlapping_mark_reads_first_fails_second_confirms() {
        let gateway = InMemoryGateway::new();
        gateway.set_notifications(vec![notification("n-1", false)]);
        let (store, actions) = loaded(&gateway).await;

        gateway.hold_mutations(true);
        let first = tokio::spawn({
            let actions = actions.clone();
            async move { actions.mark_notification_read("n-1").await }
        });
        gateway.wait_for_waiting_mutations(1).await;
        let second = tokio::spawn({
            let actions = actions.clone();
            async move { actions.mark_notification_read("n-1").await }
        });
        gateway.wait_for_waiting_mutations(2).await;

        gateway.fail_mark_read(Some(GatewayError::Network("reset".into())));
        assert!(gateway.release_mutation(0));
        assert!(first.await.unwrap().is_err());
        // Second write still in flight; no revert yet
        assert_eq!(store.unread_count(), 0);

        gateway.fail_mark_read(None);
        assert!(gateway.release_mutation(1));
        second.await.unwrap().unwrap();
        assert_eq!(store.unread_count(), 0);
        assert!(gateway.notification("n-1").unwrap().read_status);
    }

    #[tokio::test]
    async fn test_mark_read_on_already_read_stays_read_after_failure() {
        let gateway = InMemoryGateway::new();
        gateway.set_notifications(vec![notification("n-1", true)]);
        let (store, actions) = loaded(&gateway).await;
        gateway.fail_mark_read(Some(GatewayError::Network("reset".into())));

        assert!(actions.mark_notification_read("n-1").await.is_err());
        assert!(store.snapshot::<IntelligentNotification>().data[0].read_status);
    }

    #[tokio::test]
    async fn test_create_prepends_without_refetch() {
        let gateway = InMemoryGateway::new();
        gateway.set_insights(vec![insight("ins-1")]);
        let (store, actions) = loaded(&gateway).await;
        let calls = gateway.calls(crate::types::Collection::Insights);

        let created = actions
            .create_insight(NewInsight {
                user_id: Some("rep-1".into()),
                insight_type: Some(InsightType::MarketIntel),
                ..Default::default()
            })
            .await
            .unwrap();

        let snap = store.snapshot::<IntelligenceInsight>();
        assert_eq!(snap.data.len(), 2);
        assert_eq!(snap.data[0].id, created.id);
        assert_eq!(gateway.calls(crate::types::Collection::Insights), calls);
    }

    #[tokio::test]
    async fn test_failed_create_adds_nothing() {
        let gateway = InMemoryGateway::new();
        gateway.set_insights(vec![insight("ins-1")]);
        let (store, actions) = loaded(&gateway).await;
        gateway.fail_create(Some(GatewayError::Network("timeout".into())));

        assert!(actions.create_insight(NewInsight::default()).await.is_err());
        assert_eq!(store.snapshot::<IntelligenceInsight>().data.len(), 1);
        assert!(matches!(
            store.mutations()[0].state,
            MutationState::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_closed_store_rejects_actions() {
        let gateway = InMemoryGateway::new();
        let (store, actions) = loaded(&gateway).await;
        store.close();

        assert_eq!(
            actions.mark_notification_read("n-1").await,
            Err(MutationError::SessionClosed)
        );
        assert!(store.mutations().is_empty());
    }
}

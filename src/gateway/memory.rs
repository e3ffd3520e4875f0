//! In-process gateway.
//!
//! Backs demo mode and the test suite. Reads can be held per collection so a
//! caller decides the order in which overlapping fetches resolve; failures
//! can be injected per operation; pushes are emitted by hand.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

use super::{
    ChangeKind, EventSink, IntelligenceGateway, RealtimeEvent, RealtimeMessage, Subscription,
};
use crate::error::GatewayError;
use crate::types::{
    Collection, IntelligenceInsight, IntelligentNotification, NewInsight, ProcedurePerformance,
    TerritoryRecord, UnifiedAnalytics,
};

#[derive(Default)]
struct Tables {
    insights: Vec<IntelligenceInsight>,
    procedures: Vec<ProcedurePerformance>,
    analytics: Vec<UnifiedAnalytics>,
    notifications: Vec<IntelligentNotification>,
    territories: Vec<TerritoryRecord>,
}

struct SinkEntry {
    collection: Collection,
    user_id: Option<String>,
    sink: EventSink,
}

#[derive(Default)]
struct Inner {
    tables: Tables,
    calls: HashMap<Collection, usize>,
    read_failures: HashMap<Collection, GatewayError>,
    held: HashSet<Collection>,
    read_gates: HashMap<Collection, Vec<Option<oneshot::Sender<()>>>>,
    hold_mutations: bool,
    mutation_gates: Vec<Option<oneshot::Sender<()>>>,
    mark_read_failure: Option<GatewayError>,
    create_failure: Option<GatewayError>,
    subscribe_failures: HashSet<Collection>,
    sinks: HashMap<u64, SinkEntry>,
    next_sink_id: u64,
}

fn user_matches(row_user: &str, filter: Option<&str>) -> bool {
    filter.map_or(true, |u| u == row_user)
}

/// Scriptable in-memory gateway. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Notify>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding ------------------------------------------------------------

    pub fn set_insights(&self, rows: Vec<IntelligenceInsight>) {
        self.inner.lock().tables.insights = rows;
    }

    pub fn set_procedures(&self, rows: Vec<ProcedurePerformance>) {
        self.inner.lock().tables.procedures = rows;
    }

    pub fn set_analytics(&self, rows: Vec<UnifiedAnalytics>) {
        self.inner.lock().tables.analytics = rows;
    }

    pub fn set_notifications(&self, rows: Vec<IntelligentNotification>) {
        self.inner.lock().tables.notifications = rows;
    }

    pub fn set_territories(&self, rows: Vec<TerritoryRecord>) {
        self.inner.lock().tables.territories = rows;
    }

    pub fn notification(&self, id: &str) -> Option<IntelligentNotification> {
        self.inner
            .lock()
            .tables
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    // -- failure injection --------------------------------------------------

    /// Make every read of `collection` fail until cleared with `None`.
    pub fn fail_reads(&self, collection: Collection, error: Option<GatewayError>) {
        let mut inner = self.inner.lock();
        match error {
            Some(e) => inner.read_failures.insert(collection, e),
            None => inner.read_failures.remove(&collection),
        };
    }

    pub fn fail_mark_read(&self, error: Option<GatewayError>) {
        self.inner.lock().mark_read_failure = error;
    }

    pub fn fail_create(&self, error: Option<GatewayError>) {
        self.inner.lock().create_failure = error;
    }

    pub fn fail_subscribe(&self, collection: Collection) {
        self.inner.lock().subscribe_failures.insert(collection);
    }

    // -- call accounting ----------------------------------------------------

    /// Number of reads issued for `collection`, held or not.
    pub fn calls(&self, collection: Collection) -> usize {
        self.inner.lock().calls.get(&collection).copied().unwrap_or(0)
    }

    // -- read gates ---------------------------------------------------------

    /// Hold subsequent reads of `collection` until released.
    pub fn hold(&self, collection: Collection) {
        self.inner.lock().held.insert(collection);
    }

    /// Stop holding `collection` and release every waiting read.
    pub fn unhold(&self, collection: Collection) {
        let mut inner = self.inner.lock();
        inner.held.remove(&collection);
        if let Some(gates) = inner.read_gates.get_mut(&collection) {
            for gate in gates.iter_mut() {
                if let Some(tx) = gate.take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    /// Reads of `collection` currently waiting on a gate.
    pub fn waiting(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .read_gates
            .get(&collection)
            .map(|g| g.iter().filter(|tx| tx.is_some()).count())
            .unwrap_or(0)
    }

    /// Release the `nth` held read of `collection` (0-based, in call order).
    /// The read returns the table contents at release time.
    pub fn release(&self, collection: Collection, nth: usize) -> bool {
        let mut inner = self.inner.lock();
        let tx = inner
            .read_gates
            .get_mut(&collection)
            .and_then(|g| g.get_mut(nth))
            .and_then(Option::take);
        match tx {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Wait until at least `count` reads of `collection` are held.
    pub async fn wait_for_waiting(&self, collection: Collection, count: usize) {
        loop {
            let notified = self.changed.notified();
            if self.waiting(collection) >= count {
                return;
            }
            notified.await;
        }
    }

    // -- mutation gates -----------------------------------------------------

    pub fn hold_mutations(&self, hold: bool) {
        let mut inner = self.inner.lock();
        inner.hold_mutations = hold;
        if !hold {
            for gate in inner.mutation_gates.iter_mut() {
                if let Some(tx) = gate.take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    pub fn waiting_mutations(&self) -> usize {
        self.inner
            .lock()
            .mutation_gates
            .iter()
            .filter(|tx| tx.is_some())
            .count()
    }

    /// Release the `nth` held mutation (0-based, in call order). Injected
    /// failures are read at release time.
    pub fn release_mutation(&self, nth: usize) -> bool {
        let tx = self
            .inner
            .lock()
            .mutation_gates
            .get_mut(nth)
            .and_then(Option::take);
        match tx {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub async fn wait_for_waiting_mutations(&self, count: usize) {
        loop {
            let notified = self.changed.notified();
            if self.waiting_mutations() >= count {
                return;
            }
            notified.await;
        }
    }

    // -- realtime -----------------------------------------------------------

    pub fn active_subscriptions(&self, collection: Collection) -> usize {
        self.inner
            .lock()
            .sinks
            .values()
            .filter(|s| s.collection == collection)
            .count()
    }

    /// Users with an open subscription on `collection`.
    pub fn subscribed_users(&self, collection: Collection) -> Vec<Option<String>> {
        self.inner
            .lock()
            .sinks
            .values()
            .filter(|s| s.collection == collection)
            .map(|s| s.user_id.clone())
            .collect()
    }

    /// Push a change to every open subscription on `collection`. Returns the
    /// number of subscribers reached.
    pub fn emit(&self, collection: Collection, change: ChangeKind, record_id: Option<&str>) -> usize {
        let event = RealtimeEvent {
            collection,
            change,
            record_id: record_id.map(str::to_string),
        };
        self.broadcast(collection, RealtimeMessage::Change(event))
    }

    /// Tell subscribers on `collection` that their channel died.
    pub fn close_channel(&self, collection: Collection, reason: &str) -> usize {
        self.broadcast(
            collection,
            RealtimeMessage::Closed {
                collection,
                reason: reason.to_string(),
            },
        )
    }

    fn broadcast(&self, collection: Collection, message: RealtimeMessage) -> usize {
        let inner = self.inner.lock();
        inner
            .sinks
            .values()
            .filter(|s| s.collection == collection)
            .filter(|s| s.sink.send(message.clone()).is_ok())
            .count()
    }

    // -- internals ----------------------------------------------------------

    /// Count the call and, if the collection is held, park until released.
    async fn enter_read(&self, collection: Collection) {
        let gate = {
            let mut inner = self.inner.lock();
            *inner.calls.entry(collection).or_default() += 1;
            if inner.held.contains(&collection) {
                let (tx, rx) = oneshot::channel();
                inner.read_gates.entry(collection).or_default().push(Some(tx));
                Some(rx)
            } else {
                None
            }
        };
        self.changed.notify_waiters();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
    }

    async fn enter_mutation(&self) {
        let gate = {
            let mut inner = self.inner.lock();
            if inner.hold_mutations {
                let (tx, rx) = oneshot::channel();
                inner.mutation_gates.push(Some(tx));
                Some(rx)
            } else {
                None
            }
        };
        self.changed.notify_waiters();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
    }

    fn read<T>(
        &self,
        collection: Collection,
        select: impl FnOnce(&Tables) -> Vec<T>,
    ) -> Result<Vec<T>, GatewayError> {
        let inner = self.inner.lock();
        if let Some(err) = inner.read_failures.get(&collection) {
            return Err(err.clone());
        }
        Ok(select(&inner.tables))
    }
}

#[async_trait]
impl IntelligenceGateway for InMemoryGateway {
    async fn get_intelligence_insights(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IntelligenceInsight>, GatewayError> {
        self.enter_read(Collection::Insights).await;
        let now = Utc::now();
        self.read(Collection::Insights, |t| {
            t.insights
                .iter()
                .filter(|i| user_matches(&i.user_id, user_id))
                .filter(|i| i.expires_at.map_or(true, |at| at > now))
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn get_procedure_performance(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<ProcedurePerformance>, GatewayError> {
        self.enter_read(Collection::ProcedurePerformance).await;
        self.read(Collection::ProcedurePerformance, |t| {
            t.procedures
                .iter()
                .filter(|p| user_matches(&p.user_id, user_id))
                .cloned()
                .collect()
        })
    }

    async fn get_unified_analytics(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<UnifiedAnalytics>, GatewayError> {
        self.enter_read(Collection::Analytics).await;
        self.read(Collection::Analytics, |t| {
            t.analytics
                .iter()
                .filter(|a| user_matches(&a.user_id, user_id))
                .cloned()
                .collect()
        })
    }

    async fn get_intelligent_notifications(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<IntelligentNotification>, GatewayError> {
        self.enter_read(Collection::Notifications).await;
        let now = Utc::now();
        self.read(Collection::Notifications, |t| {
            t.notifications
                .iter()
                .filter(|n| user_matches(&n.user_id, user_id))
                .filter(|n| n.expires_at.map_or(true, |at| at > now))
                .cloned()
                .collect()
        })
    }

    async fn get_territory_intelligence(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<TerritoryRecord>, GatewayError> {
        self.enter_read(Collection::Territory).await;
        self.read(Collection::Territory, |t| {
            t.territories
                .iter()
                .filter(|r| user_matches(&r.user_id, user_id))
                .cloned()
                .collect()
        })
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), GatewayError> {
        self.enter_mutation().await;
        let mut inner = self.inner.lock();
        if let Some(err) = inner.mark_read_failure.clone() {
            return Err(err);
        }
        match inner
            .tables
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
        {
            Some(n) => {
                n.read_status = true;
                Ok(())
            }
            None => Err(GatewayError::NotFound(notification_id.to_string())),
        }
    }

    async fn create_intelligence_insight(
        &self,
        insight: &NewInsight,
    ) -> Result<IntelligenceInsight, GatewayError> {
        self.enter_mutation().await;
        let mut inner = self.inner.lock();
        if let Some(err) = inner.create_failure.clone() {
            return Err(err);
        }
        let record = insight
            .clone()
            .into_record(Uuid::new_v4().to_string(), Utc::now());
        inner.tables.insights.insert(0, record.clone());
        Ok(record)
    }

    fn subscribe(
        &self,
        collection: Collection,
        user_id: Option<&str>,
        sink: EventSink,
    ) -> Result<Subscription, GatewayError> {
        let id = {
            let mut inner = self.inner.lock();
            if inner.subscribe_failures.contains(&collection) {
                return Err(GatewayError::Network(format!(
                    "channel for {} refused",
                    collection
                )));
            }
            let id = inner.next_sink_id;
            inner.next_sink_id += 1;
            inner.sinks.insert(
                id,
                SinkEntry {
                    collection,
                    user_id: user_id.map(str::to_string),
                    sink,
                },
            );
            id
        };

        let inner = Arc::downgrade(&self.inner);
        Ok(Subscription::new(collection, move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock().sinks.remove(&id);
            }
        }))
    }
}

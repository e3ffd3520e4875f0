//! Aggregate state store.
//!
//! Holds the latest snapshot of each collection plus the bookkeeping that
//! keeps overlapping fetches, optimistic mutations and teardown from
//! corrupting it. Only the fetcher and the action dispatcher write here;
//! everything else reads through `snapshot` / `view`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::actions::{MutationRecord, MutationState};
use crate::error::{CollectionError, GatewayError};
use crate::types::{
    Collection, IntelligenceInsight, IntelligentNotification, ProcedurePerformance,
    TerritoryRecord, UnifiedAnalytics,
};

/// Maximum number of mutation records to keep in memory
const MAX_MUTATION_HISTORY: usize = 100;

/// Per-collection slot.
///
/// `issued` counts fetches started, `committed` is the generation of the
/// last result applied. A result older than `committed` is discarded.
#[derive(Debug)]
pub struct CollectionSlot<T> {
    data: Arc<Vec<T>>,
    error: Option<CollectionError>,
    issued: u64,
    committed: u64,
}

impl<T> Default for CollectionSlot<T> {
    fn default() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            error: None,
            issued: 0,
            committed: 0,
        }
    }
}

impl<T> CollectionSlot<T> {
    /// Nothing committed yet, or a newer fetch is still outstanding.
    fn loading(&self) -> bool {
        self.committed == 0 || self.issued > self.committed
    }

    fn snapshot(&self) -> CollectionSnapshot<T> {
        CollectionSnapshot {
            data: self.data.clone(),
            loading: self.loading(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectionSlots {
    insights: CollectionSlot<IntelligenceInsight>,
    procedures: CollectionSlot<ProcedurePerformance>,
    analytics: CollectionSlot<UnifiedAnalytics>,
    notifications: CollectionSlot<IntelligentNotification>,
    territories: CollectionSlot<TerritoryRecord>,
}

impl CollectionSlots {
    fn loading(&self, collection: Collection) -> bool {
        match collection {
            Collection::Insights => self.insights.loading(),
            Collection::ProcedurePerformance => self.procedures.loading(),
            Collection::Analytics => self.analytics.loading(),
            Collection::Notifications => self.notifications.loading(),
            Collection::Territory => self.territories.loading(),
        }
    }

    fn error(&self, collection: Collection) -> Option<&CollectionError> {
        match collection {
            Collection::Insights => self.insights.error.as_ref(),
            Collection::ProcedurePerformance => self.procedures.error.as_ref(),
            Collection::Analytics => self.analytics.error.as_ref(),
            Collection::Notifications => self.notifications.error.as_ref(),
            Collection::Territory => self.territories.error.as_ref(),
        }
    }
}

/// A record type that lives in one store slot.
pub trait CollectionRecord: Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn slot(slots: &CollectionSlots) -> &CollectionSlot<Self>;
    fn slot_mut(slots: &mut CollectionSlots) -> &mut CollectionSlot<Self>;

    /// Adjust freshly fetched rows before they replace the snapshot.
    /// `read_pending` tells whether a mark-read for an id is unconfirmed.
    fn prepare(_rows: &mut [Self], _read_pending: &dyn Fn(&str) -> bool) {}
}

impl CollectionRecord for IntelligenceInsight {
    const COLLECTION: Collection = Collection::Insights;
    fn slot(slots: &CollectionSlots) -> &CollectionSlot<Self> {
        &slots.insights
    }
    fn slot_mut(slots: &mut CollectionSlots) -> &mut CollectionSlot<Self> {
        &mut slots.insights
    }
}

impl CollectionRecord for ProcedurePerformance {
    const COLLECTION: Collection = Collection::ProcedurePerformance;
    fn slot(slots: &CollectionSlots) -> &CollectionSlot<Self> {
        &slots.procedures
    }
    fn slot_mut(slots: &mut CollectionSlots) -> &mut CollectionSlot<Self> {
        &mut slots.procedures
    }
}

impl CollectionRecord for UnifiedAnalytics {
    const COLLECTION: Collection = Collection::Analytics;
    fn slot(slots: &CollectionSlots) -> &CollectionSlot<Self> {
        &slots.analytics
    }
    fn slot_mut(slots: &mut CollectionSlots) -> &mut CollectionSlot<Self> {
        &mut slots.analytics
    }
}

impl CollectionRecord for IntelligentNotification {
    const COLLECTION: Collection = Collection::Notifications;
    fn slot(slots: &CollectionSlots) -> &CollectionSlot<Self> {
        &slots.notifications
    }
    fn slot_mut(slots: &mut CollectionSlots) -> &mut CollectionSlot<Self> {
        &mut slots.notifications
    }

    /// A fetch that lands while a mark-read is unconfirmed may still carry
    /// the old flag; keep the optimistic value.
    fn prepare(rows: &mut [Self], read_pending: &dyn Fn(&str) -> bool) {
        for row in rows.iter_mut() {
            if read_pending(row.id.as_str()) {
                row.read_status = true;
            }
        }
    }
}

impl CollectionRecord for TerritoryRecord {
    const COLLECTION: Collection = Collection::Territory;
    fn slot(slots: &CollectionSlots) -> &CollectionSlot<Self> {
        &slots.territories
    }
    fn slot_mut(slots: &mut CollectionSlots) -> &mut CollectionSlot<Self> {
        &mut slots.territories
    }
}

/// Issued by `begin`, redeemed by `commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub collection: Collection,
    epoch: u64,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A newer fetch already committed, or the store was reset since.
    Stale,
    /// The store was torn down.
    Closed,
}

/// Read-only copy of one collection. `data` is shared, never partially
/// written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot<T> {
    pub data: Arc<Vec<T>>,
    pub loading: bool,
    pub error: Option<CollectionError>,
}

impl<T> Default for CollectionSnapshot<T> {
    fn default() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            loading: false,
            error: None,
        }
    }
}

/// Everything a consumer reads, taken under one lock.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntelligenceView {
    pub insights: CollectionSnapshot<IntelligenceInsight>,
    pub procedures: CollectionSnapshot<ProcedurePerformance>,
    pub analytics: CollectionSnapshot<UnifiedAnalytics>,
    pub notifications: CollectionSnapshot<IntelligentNotification>,
    pub territories: CollectionSnapshot<TerritoryRecord>,
    pub unread_count: usize,
    pub is_loading: bool,
    /// Most recent per-collection failure.
    pub error: Option<CollectionError>,
    pub errors: BTreeMap<Collection, CollectionError>,
}

impl IntelligenceView {
    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Outstanding mark-reads for one notification.
#[derive(Debug)]
struct PendingRead {
    in_flight: usize,
    /// Flag before the first optimistic flip.
    original: Option<bool>,
    confirmed: bool,
}

#[derive(Default)]
struct StoreInner {
    slots: CollectionSlots,
    epoch: u64,
    closed: bool,
    pending_reads: HashMap<String, PendingRead>,
    mutations: Vec<MutationRecord>,
}

impl StoreInner {
    fn errors(&self) -> BTreeMap<Collection, CollectionError> {
        Collection::ALL
            .iter()
            .filter_map(|c| self.slots.error(*c).map(|e| (*c, e.clone())))
            .collect()
    }

    fn unread_count(&self) -> usize {
        self.slots
            .notifications
            .data
            .iter()
            .filter(|n| !n.read_status)
            .count()
    }

    fn is_loading(&self) -> bool {
        Collection::ALL.iter().any(|c| self.slots.loading(*c))
    }
}

fn most_recent(errors: &BTreeMap<Collection, CollectionError>) -> Option<CollectionError> {
    errors.values().max_by_key(|e| e.occurred_at).cloned()
}

#[derive(Default)]
pub struct AggregateStore {
    inner: RwLock<StoreInner>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- fetch lifecycle ----------------------------------------------------

    /// Start a fetch: the collection reports loading until this or a newer
    /// fetch commits.
    pub fn begin<T: CollectionRecord>(&self) -> FetchTicket {
        let mut inner = self.inner.write();
        let epoch = inner.epoch;
        let slot = T::slot_mut(&mut inner.slots);
        slot.issued += 1;
        FetchTicket {
            collection: T::COLLECTION,
            epoch,
            generation: slot.issued,
        }
    }

    /// Apply a fetch result. Success replaces the whole snapshot and clears
    /// the collection's error; failure keeps the previous data and records
    /// the error.
    pub fn commit<T: CollectionRecord>(
        &self,
        ticket: FetchTicket,
        result: Result<Vec<T>, GatewayError>,
    ) -> CommitOutcome {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.closed {
            return CommitOutcome::Closed;
        }
        if ticket.epoch != inner.epoch {
            return CommitOutcome::Stale;
        }

        let slot = T::slot_mut(&mut inner.slots);
        if ticket.generation <= slot.committed {
            return CommitOutcome::Stale;
        }
        slot.committed = ticket.generation;

        match result {
            Ok(mut rows) => {
                let pending = &inner.pending_reads;
                T::prepare(&mut rows, &|id: &str| pending.contains_key(id));
                slot.data = Arc::new(rows);
                slot.error = None;
            }
            Err(err) => {
                slot.error = Some(CollectionError::new(T::COLLECTION, &err));
            }
        }
        CommitOutcome::Committed
    }

    // -- reads --------------------------------------------------------------

    pub fn snapshot<T: CollectionRecord>(&self) -> CollectionSnapshot<T> {
        T::slot(&self.inner.read().slots).snapshot()
    }

    pub fn view(&self) -> IntelligenceView {
        let inner = self.inner.read();
        let errors = inner.errors();
        IntelligenceView {
            insights: inner.slots.insights.snapshot(),
            procedures: inner.slots.procedures.snapshot(),
            analytics: inner.slots.analytics.snapshot(),
            notifications: inner.slots.notifications.snapshot(),
            territories: inner.slots.territories.snapshot(),
            unread_count: inner.unread_count(),
            is_loading: inner.is_loading(),
            error: most_recent(&errors),
            errors,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read().is_loading()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.read().unread_count()
    }

    pub fn errors(&self) -> BTreeMap<Collection, CollectionError> {
        self.inner.read().errors()
    }

    /// The most recently recorded per-collection error.
    pub fn error(&self) -> Option<CollectionError> {
        most_recent(&self.errors())
    }

    pub fn has_error(&self) -> bool {
        let inner = self.inner.read();
        Collection::ALL.iter().any(|c| inner.slots.error(*c).is_some())
    }

    // -- lifecycle ----------------------------------------------------------

    /// Tear down: every later write is a no-op.
    pub fn close(&self) {
        self.inner.write().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Discard every snapshot and orphan in-flight fetches (user switch).
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        inner.epoch += 1;
        inner.slots = CollectionSlots::default();
        inner.pending_reads.clear();
    }

    // -- optimistic writes --------------------------------------------------

    /// Flip a notification to read before the remote write. Returns the
    /// previous flag, or `None` if the notification is not in the snapshot.
    pub(crate) fn apply_optimistic_read(&self, notification_id: &str) -> Option<bool> {
        let mut inner = self.inner.write();
        if inner.closed {
            return None;
        }
        let data = Arc::make_mut(&mut inner.slots.notifications.data);
        let previous = data
            .iter_mut()
            .find(|n| n.id == notification_id)
            .map(|row| std::mem::replace(&mut row.read_status, true));

        inner
            .pending_reads
            .entry(notification_id.to_string())
            .and_modify(|p| p.in_flight += 1)
            .or_insert(PendingRead {
                in_flight: 1,
                original: previous,
                confirmed: false,
            });
        previous
    }

    /// Resolve one pending mark-read. The flag goes back to its original
    /// value only once every overlapping mark-read of the same id has
    /// settled and none of them was confirmed.
    pub(crate) fn settle_optimistic_read(&self, notification_id: &str, confirmed: bool) {
        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        let Some(pending) = inner.pending_reads.get_mut(notification_id) else {
            return;
        };
        pending.in_flight = pending.in_flight.saturating_sub(1);
        pending.confirmed |= confirmed;
        if pending.in_flight > 0 {
            return;
        }
        let revert = !pending.confirmed && pending.original == Some(false);
        inner.pending_reads.remove(notification_id);
        if !revert {
            return;
        }
        let data = Arc::make_mut(&mut inner.slots.notifications.data);
        if let Some(row) = data.iter_mut().find(|n| n.id == notification_id) {
            row.read_status = false;
        }
    }

    /// Put a newly created insight at the head of the snapshot.
    pub(crate) fn prepend_insight(&self, insight: IntelligenceInsight) -> bool {
        let mut inner = self.inner.write();
        if inner.closed {
            return false;
        }
        let data = Arc::make_mut(&mut inner.slots.insights.data);
        if data.iter().any(|i| i.id == insight.id) {
            return false;
        }
        data.insert(0, insight);
        true
    }

    // -- mutation log -------------------------------------------------------

    pub(crate) fn record_mutation(&self, record: MutationRecord) {
        let mut inner = self.inner.write();
        inner.mutations.insert(0, record);
        if inner.mutations.len() > MAX_MUTATION_HISTORY {
            inner.mutations.truncate(MAX_MUTATION_HISTORY);
        }
    }

    pub(crate) fn settle_mutation(&self, id: Uuid, state: MutationState) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.mutations.iter_mut().find(|m| m.id == id) {
            record.state = state;
            record.settled_at = Some(Utc::now());
        }
    }

    /// Mutation history, newest first.
    pub fn mutations(&self) -> Vec<MutationRecord> {
        self.inner.read().mutations.clone()
    }

    pub fn mutation(&self, id: Uuid) -> Option<MutationRecord> {
        self.inner
            .read()
            .mutations
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{analytics, insight, notification};
    use crate::types::AnalyticsType;

    #[test]
    fn test_new_store_is_loading_and_empty() {
        let store = AggregateStore::new();
        let view = store.view();
        assert!(view.is_loading);
        assert!(view.insights.loading);
        assert!(view.insights.data.is_empty());
        assert_eq!(view.unread_count, 0);
    }

    #[test]
    fn test_commit_replaces_snapshot_and_clears_loading() {
        let store = AggregateStore::new();

        let ticket = store.begin::<IntelligenceInsight>();
        assert!(store.snapshot::<IntelligenceInsight>().loading);
        store.commit(ticket, Ok(vec![insight("a"), insight("b")]));

        let ticket = store.begin::<IntelligenceInsight>();
        let outcome = store.commit(ticket, Ok(vec![insight("c")]));
        assert_eq!(outcome, CommitOutcome::Committed);

        let snap = store.snapshot::<IntelligenceInsight>();
        assert!(!snap.loading);
        let ids: Vec<&str> = snap.data.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_failure_leaves_loading_and_keeps_previous_data() {
        let store = AggregateStore::new();
        let ticket = store.begin::<UnifiedAnalytics>();
        store.commit(ticket, Ok(vec![analytics("a-1", AnalyticsType::Rep)]));

        let ticket = store.begin::<UnifiedAnalytics>();
        store.commit::<UnifiedAnalytics>(ticket, Err(GatewayError::Network("down".into())));

        let snap = store.snapshot::<UnifiedAnalytics>();
        assert!(!snap.loading);
        assert_eq!(snap.data.len(), 1);
        assert_eq!(
            snap.error.map(|e| e.message),
            Some("Network error: down".to_string())
        );
        assert!(store.has_error());
    }

    #[test]
    fn test_success_clears_collection_error() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligenceInsight>();
        store.commit::<IntelligenceInsight>(ticket, Err(GatewayError::Network("x".into())));
        assert!(store.has_error());

        let ticket = store.begin::<IntelligenceInsight>();
        store.commit(ticket, Ok(vec![insight("a")]));
        assert!(!store.has_error());
        assert!(store.error().is_none());
    }

    #[test]
    fn test_errors_kept_per_collection() {
        let store = AggregateStore::new();
        let t1 = store.begin::<IntelligenceInsight>();
        store.commit::<IntelligenceInsight>(t1, Err(GatewayError::Network("first".into())));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let t2 = store.begin::<TerritoryRecord>();
        store.commit::<TerritoryRecord>(t2, Err(GatewayError::Network("second".into())));

        let errors = store.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_key(&Collection::Insights));
        assert!(errors.contains_key(&Collection::Territory));
        assert_eq!(store.error().unwrap().collection, Collection::Territory);
    }

    #[test]
    fn test_older_fetch_resolving_late_is_discarded() {
        let store = AggregateStore::new();
        let first = store.begin::<IntelligenceInsight>();
        let second = store.begin::<IntelligenceInsight>();

        assert_eq!(
            store.commit(second, Ok(vec![insight("fresh")])),
            CommitOutcome::Committed
        );
        assert_eq!(
            store.commit(first, Ok(vec![insight("stale")])),
            CommitOutcome::Stale
        );

        let snap = store.snapshot::<IntelligenceInsight>();
        assert_eq!(snap.data[0].id, "fresh");
        assert!(!snap.loading);
    }

    #[test]
    fn test_loading_holds_until_newest_fetch_commits() {
        let store = AggregateStore::new();
        let first = store.begin::<IntelligenceInsight>();
        let second = store.begin::<IntelligenceInsight>();

        store.commit(first, Ok(vec![insight("early")]));
        assert!(store.snapshot::<IntelligenceInsight>().loading);

        store.commit(second, Ok(vec![insight("late")]));
        assert!(!store.snapshot::<IntelligenceInsight>().loading);
    }

    #[test]
    fn test_unread_count_tracks_snapshot() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(
            ticket,
            Ok(vec![
                notification("n-1", false),
                notification("n-2", true),
                notification("n-3", false),
            ]),
        );
        assert_eq!(store.unread_count(), 2);

        assert_eq!(store.apply_optimistic_read("n-1"), Some(false));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_pending_read_survives_refetch() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));
        store.apply_optimistic_read("n-1");

        // Remote has not applied the write yet
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));
        assert!(store.snapshot::<IntelligentNotification>().data[0].read_status);

        store.settle_optimistic_read("n-1", true);
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));
        assert!(!store.snapshot::<IntelligentNotification>().data[0].read_status);
    }

    #[test]
    fn test_failed_read_reverts_flag() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));

        assert_eq!(store.apply_optimistic_read("n-1"), Some(false));
        store.settle_optimistic_read("n-1", false);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_overlapping_reads_revert_only_when_all_fail() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));

        store.apply_optimistic_read("n-1");
        store.apply_optimistic_read("n-1");

        // First fails while the second is still in flight
        store.settle_optimistic_read("n-1", false);
        assert_eq!(store.unread_count(), 0);
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));
        assert_eq!(store.unread_count(), 0);

        store.settle_optimistic_read("n-1", false);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_overlapping_reads_keep_flag_when_one_confirms() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligentNotification>();
        store.commit(ticket, Ok(vec![notification("n-1", false)]));

        store.apply_optimistic_read("n-1");
        store.apply_optimistic_read("n-1");
        store.settle_optimistic_read("n-1", true);
        store.settle_optimistic_read("n-1", false);

        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_closed_store_ignores_writes() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligenceInsight>();
        store.close();

        assert_eq!(
            store.commit(ticket, Ok(vec![insight("late")])),
            CommitOutcome::Closed
        );
        assert!(!store.prepend_insight(insight("x")));
        assert!(store.snapshot::<IntelligenceInsight>().data.is_empty());
    }

    #[test]
    fn test_reset_orphans_in_flight_fetches() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligenceInsight>();
        store.reset();
        assert_eq!(
            store.commit(ticket, Ok(vec![insight("old-user")])),
            CommitOutcome::Stale
        );
        assert!(store.snapshot::<IntelligenceInsight>().loading);
    }

    #[test]
    fn test_prepend_skips_duplicates() {
        let store = AggregateStore::new();
        let ticket = store.begin::<IntelligenceInsight>();
        store.commit(ticket, Ok(vec![insight("a")]));

        assert!(store.prepend_insight(insight("b")));
        assert!(!store.prepend_insight(insight("a")));
        let ids: Vec<String> = store
            .snapshot::<IntelligenceInsight>()
            .data
            .iter()
            .map(|i| i.id.clone())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}

//! Intelligence session: the one object a consumer holds.
//!
//! Wires the store, fetcher, scheduler, realtime manager and action
//! dispatcher together for one user, and exposes the read surface plus the
//! three preset feeds. `IntelligenceContext` answers "is a session active?"
//! for consumers that must work without one.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::actions::ActionDispatcher;
use crate::adapters::{
    region_analytics, rep_analytics, summarize_notifications, to_ticker_items,
    top_procedures_for_goals, NotificationSummary, RegionAnalytics, TickerItem,
};
use crate::config::{IntelligenceOptions, SyncConfig};
use crate::error::MutationError;
use crate::fetcher::CollectionFetcher;
use crate::gateway::IntelligenceGateway;
use crate::realtime::SubscriptionManager;
use crate::scheduler::RefreshScheduler;
use crate::state::{
    AggregateStore, CollectionRecord, CollectionSnapshot, CommitOutcome, IntelligenceView,
};
use crate::types::{
    Collection, IntelligenceInsight, IntelligentNotification, NewInsight, ProcedurePerformance,
    TerritoryRecord, UnifiedAnalytics,
};

pub struct IntelligenceSession {
    store: Arc<AggregateStore>,
    fetcher: Arc<CollectionFetcher>,
    actions: ActionDispatcher,
    scheduler: Mutex<RefreshScheduler>,
    realtime: Mutex<SubscriptionManager>,
    options: RwLock<IntelligenceOptions>,
}

impl IntelligenceSession {
    /// Build and start a session. One refresh-all fires immediately; the
    /// timer and push channels follow `options`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        gateway: Arc<dyn IntelligenceGateway>,
        options: IntelligenceOptions,
        config: &SyncConfig,
    ) -> Arc<Self> {
        let store = Arc::new(AggregateStore::new());
        let fetcher = Arc::new(CollectionFetcher::new(
            store.clone(),
            gateway.clone(),
            options.user_id.clone(),
            config.insight_limit,
        ));
        let actions = ActionDispatcher::new(store.clone(), gateway.clone());
        let mut scheduler = RefreshScheduler::new(fetcher.clone());
        let mut realtime = SubscriptionManager::new(
            gateway,
            fetcher.clone(),
            config.realtime_collections.clone(),
        );

        log::info!(
            "Session: starting for {} (auto_refresh={}, realtime={})",
            options.user_id.as_deref().unwrap_or("all users"),
            options.auto_refresh,
            options.enable_realtime
        );

        if options.auto_refresh {
            scheduler.start(options.refresh_interval());
        } else {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                fetcher.refresh_all().await;
            });
        }

        if options.enable_realtime {
            realtime.subscribe(options.user_id.as_deref());
        }

        Arc::new(Self {
            store,
            fetcher,
            actions,
            scheduler: Mutex::new(scheduler),
            realtime: Mutex::new(realtime),
            options: RwLock::new(options),
        })
    }

    pub fn options(&self) -> IntelligenceOptions {
        self.options.read().clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.fetcher.user_id()
    }

    pub fn is_active(&self) -> bool {
        !self.store.is_closed()
    }

    // -- reads --------------------------------------------------------------

    pub fn view(&self) -> IntelligenceView {
        self.store.view()
    }

    pub fn snapshot<T: CollectionRecord>(&self) -> CollectionSnapshot<T> {
        self.store.snapshot::<T>()
    }

    pub fn insights(&self) -> CollectionSnapshot<IntelligenceInsight> {
        self.snapshot()
    }

    pub fn procedures(&self) -> CollectionSnapshot<ProcedurePerformance> {
        self.snapshot()
    }

    pub fn analytics(&self) -> CollectionSnapshot<UnifiedAnalytics> {
        self.snapshot()
    }

    pub fn notifications(&self) -> CollectionSnapshot<IntelligentNotification> {
        self.snapshot()
    }

    pub fn territories(&self) -> CollectionSnapshot<TerritoryRecord> {
        self.snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn notification_summary(&self) -> NotificationSummary {
        summarize_notifications(&self.notifications().data)
    }

    pub fn top_procedures_for_goals(&self, goals: &[&str]) -> Vec<ProcedurePerformance> {
        top_procedures_for_goals(&self.procedures().data, goals)
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    // -- refresh ------------------------------------------------------------

    /// Re-fetch all five collections and wait for every one to settle.
    pub async fn refresh_all(&self) {
        self.fetcher.refresh_all().await;
    }

    /// Re-fetch one collection, e.g. to retry the one that failed.
    pub async fn refresh(&self, collection: Collection) -> CommitOutcome {
        if self.store.is_closed() {
            return CommitOutcome::Closed;
        }
        self.fetcher.fetch(collection).await
    }

    // -- actions ------------------------------------------------------------

    pub async fn mark_notification_read(&self, notification_id: &str) -> Result<(), MutationError> {
        self.actions.mark_notification_read(notification_id).await
    }

    pub async fn create_insight(
        &self,
        insight: NewInsight,
    ) -> Result<IntelligenceInsight, MutationError> {
        self.actions.create_insight(insight).await
    }

    // -- lifecycle ----------------------------------------------------------

    /// Point the session at another user: drop every snapshot, move the push
    /// channels over and load the new user's data.
    pub async fn switch_user(&self, user_id: Option<String>) {
        if self.store.is_closed() || self.fetcher.user_id() == user_id {
            return;
        }
        log::info!(
            "Session: switching to {}",
            user_id.as_deref().unwrap_or("all users")
        );

        self.store.reset();
        self.fetcher.set_user_id(user_id.clone());
        let enable_realtime = {
            let mut options = self.options.write();
            options.user_id = user_id.clone();
            options.enable_realtime
        };
        if enable_realtime {
            self.realtime.lock().subscribe(user_id.as_deref());
        }

        self.fetcher.refresh_all().await;
    }

    /// Tear the session down. In-flight fetches may still resolve; they find
    /// a closed store and change nothing. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if self.store.is_closed() {
            return;
        }
        self.store.close();
        self.scheduler.lock().stop();
        self.realtime.lock().unsubscribe();
        log::info!("Session: shut down");
    }
}

impl Drop for IntelligenceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Preset feeds
// ---------------------------------------------------------------------------

/// Live insight ticker on the faster ticker interval.
pub struct TickerFeed {
    session: Arc<IntelligenceSession>,
}

impl TickerFeed {
    pub fn start(
        gateway: Arc<dyn IntelligenceGateway>,
        user_id: Option<String>,
        config: &SyncConfig,
    ) -> Self {
        let options = IntelligenceOptions::ticker(user_id, config);
        Self {
            session: IntelligenceSession::start(gateway, options, config),
        }
    }

    /// Ticker view over an existing session.
    pub fn over(session: Arc<IntelligenceSession>) -> Self {
        Self { session }
    }

    pub fn items(&self) -> Vec<TickerItem> {
        to_ticker_items(&self.session.insights().data)
    }

    pub fn session(&self) -> &Arc<IntelligenceSession> {
        &self.session
    }
}

pub struct RepAnalyticsFeed {
    session: Arc<IntelligenceSession>,
}

impl RepAnalyticsFeed {
    pub fn start(
        gateway: Arc<dyn IntelligenceGateway>,
        user_id: Option<String>,
        config: &SyncConfig,
    ) -> Self {
        let options = IntelligenceOptions::analytics(user_id, config);
        Self {
            session: IntelligenceSession::start(gateway, options, config),
        }
    }

    /// Rep view over an existing session; shares its store and poller.
    pub fn over(session: Arc<IntelligenceSession>) -> Self {
        Self { session }
    }

    pub fn analytics(&self) -> Vec<UnifiedAnalytics> {
        rep_analytics(&self.session.analytics().data)
    }

    pub fn session(&self) -> &Arc<IntelligenceSession> {
        &self.session
    }
}

pub struct RegionAnalyticsFeed {
    session: Arc<IntelligenceSession>,
    territory_code: Option<String>,
}

impl RegionAnalyticsFeed {
    pub fn start(
        gateway: Arc<dyn IntelligenceGateway>,
        user_id: Option<String>,
        territory_code: Option<String>,
        config: &SyncConfig,
    ) -> Self {
        let options = IntelligenceOptions::analytics(user_id, config);
        Self {
            session: IntelligenceSession::start(gateway, options, config),
            territory_code,
        }
    }

    /// Region view over an existing session; shares its store and poller.
    pub fn over(session: Arc<IntelligenceSession>, territory_code: Option<String>) -> Self {
        Self {
            session,
            territory_code,
        }
    }

    pub fn view(&self) -> RegionAnalytics {
        region_analytics(
            &self.session.analytics().data,
            &self.session.territories().data,
            self.territory_code.as_deref(),
        )
    }

    pub fn session(&self) -> &Arc<IntelligenceSession> {
        &self.session
    }
}

// ---------------------------------------------------------------------------
// Optional access
// ---------------------------------------------------------------------------

/// Result of asking whether a session is active.
#[derive(Clone)]
pub enum Availability {
    Active(Arc<IntelligenceSession>),
    Unavailable,
}

impl Availability {
    pub fn is_active(&self) -> bool {
        matches!(self, Availability::Active(_))
    }

    pub fn session(&self) -> Option<&Arc<IntelligenceSession>> {
        match self {
            Availability::Active(session) => Some(session),
            Availability::Unavailable => None,
        }
    }

    /// Live view, or an empty one with nothing loading and no error.
    pub fn view(&self) -> IntelligenceView {
        match self {
            Availability::Active(session) => session.view(),
            Availability::Unavailable => IntelligenceView::default(),
        }
    }

    pub fn unread_count(&self) -> usize {
        self.session().map_or(0, |s| s.unread_count())
    }
}

/// Slot an application installs its session into.
#[derive(Default)]
pub struct IntelligenceContext {
    session: RwLock<Option<Arc<IntelligenceSession>>>,
}

impl IntelligenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session`, returning the one it replaced.
    pub fn install(&self, session: Arc<IntelligenceSession>) -> Option<Arc<IntelligenceSession>> {
        self.session.write().replace(session)
    }

    pub fn clear(&self) -> Option<Arc<IntelligenceSession>> {
        self.session.write().take()
    }

    pub fn availability(&self) -> Availability {
        match self.session.read().as_ref() {
            Some(session) if session.is_active() => Availability::Active(session.clone()),
            _ => Availability::Unavailable,
        }
    }
}

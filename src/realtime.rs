//! Realtime subscription manager.
//!
//! Opens one push subscription per configured collection, scoped to the
//! session user. A pump task drains the shared event channel and re-fetches
//! only the collections that changed; a burst of events for the same
//! collection collapses into one fetch.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fetcher::CollectionFetcher;
use crate::gateway::{IntelligenceGateway, RealtimeMessage, Subscription};
use crate::types::Collection;

struct ActiveSubscriptions {
    user_id: Option<String>,
    subscriptions: Vec<Subscription>,
    pump: JoinHandle<()>,
}

pub struct SubscriptionManager {
    gateway: Arc<dyn IntelligenceGateway>,
    fetcher: Arc<CollectionFetcher>,
    collections: Vec<Collection>,
    active: Option<ActiveSubscriptions>,
}

impl SubscriptionManager {
    pub fn new(
        gateway: Arc<dyn IntelligenceGateway>,
        fetcher: Arc<CollectionFetcher>,
        collections: Vec<Collection>,
    ) -> Self {
        let mut collections = collections;
        collections.sort();
        collections.dedup();
        Self {
            gateway,
            fetcher,
            collections,
            active: None,
        }
    }

    /// Subscribe for `user_id`. Calling again for the same user is a no-op;
    /// a different user tears the old subscriptions down first.
    ///
    /// Returns the number of channels that opened. A channel that fails to
    /// open is logged and skipped.
    pub fn subscribe(&mut self, user_id: Option<&str>) -> usize {
        if let Some(active) = &self.active {
            if active.user_id.as_deref() == user_id {
                return active.subscriptions.len();
            }
            log::info!("Realtime: user changed, re-subscribing");
            self.unsubscribe();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscriptions = Vec::with_capacity(self.collections.len());
        for collection in &self.collections {
            match self.gateway.subscribe(*collection, user_id, tx.clone()) {
                Ok(sub) => subscriptions.push(sub),
                Err(e) => {
                    log::warn!("Realtime: {} subscription failed: {}", collection, e);
                }
            }
        }
        drop(tx);

        log::info!(
            "Realtime: {} of {} channels open",
            subscriptions.len(),
            self.collections.len()
        );

        let opened = subscriptions.len();
        let pump = tokio::spawn(run_pump(rx, self.fetcher.clone()));
        self.active = Some(ActiveSubscriptions {
            user_id: user_id.map(str::to_string),
            subscriptions,
            pump,
        });
        opened
    }

    /// Close every channel and stop reacting to queued events. Safe to call
    /// repeatedly.
    pub fn unsubscribe(&mut self) {
        if let Some(mut active) = self.active.take() {
            for sub in active.subscriptions.iter_mut() {
                sub.unsubscribe();
            }
            active.pump.abort();
            log::info!("Realtime: unsubscribed");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    /// Collections with an open channel.
    pub fn open_channels(&self) -> Vec<Collection> {
        self.active
            .as_ref()
            .map(|a| a.subscriptions.iter().map(Subscription::collection).collect())
            .unwrap_or_default()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn run_pump(
    mut rx: mpsc::UnboundedReceiver<RealtimeMessage>,
    fetcher: Arc<CollectionFetcher>,
) {
    while let Some(message) = rx.recv().await {
        let mut dirty = BTreeSet::new();
        note(message, &mut dirty);
        while let Ok(message) = rx.try_recv() {
            note(message, &mut dirty);
        }

        for collection in dirty {
            let fetcher = fetcher.clone();
            tokio::spawn(async move {
                fetcher.fetch(collection).await;
            });
        }
    }
    log::debug!("Realtime: event channel closed");
}

fn note(message: RealtimeMessage, dirty: &mut BTreeSet<Collection>) {
    match message {
        RealtimeMessage::Change(event) => {
            log::debug!(
                "Realtime: {:?} on {} ({})",
                event.change,
                event.collection,
                event.record_id.as_deref().unwrap_or("-")
            );
            dirty.insert(event.collection);
        }
        RealtimeMessage::Closed { collection, reason } => {
            log::warn!(
                "Realtime: {} channel closed ({}); no pushes until re-subscribed",
                collection,
                reason
            );
        }
    }
}

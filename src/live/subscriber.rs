//! Buffered, ordered view over a set of live collection channels.
//!
//! A [`LiveUpdateSubscriber`] owns one channel per watched collection. Every
//! change from any of them is appended to a single in-memory buffer in arrival
//! order, and an optional callback is poked so the owner can refetch.
//!
//! Teardown is generation-based: `stop` bumps the generation under the same
//! lock the buffer lives behind, and every write from a channel task checks
//! its generation first. A channel whose open was still in flight, or whose
//! task is mid-delivery, can therefore never write into a newer generation.

use crate::clock::Clock;
use crate::live::feed::{ChangeFeed, Channel};
use crate::live::models::{ChannelStatus, FeedMessage, LiveUpdate, UpdateKind};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// How per-channel statuses fold into the single "connected" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectedPolicy {
    /// Connected iff the most recently reported status, from any channel, is
    /// `Subscribed`.
    #[default]
    LastObserved,
    AnySubscribed,
    AllSubscribed,
}

impl FromStr for ConnectedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" | "last_observed" => Ok(ConnectedPolicy::LastObserved),
            "any" | "any_subscribed" => Ok(ConnectedPolicy::AnySubscribed),
            "all" | "all_subscribed" => Ok(ConnectedPolicy::AllSubscribed),
            other => Err(format!("unknown connected policy: {other}")),
        }
    }
}

#[derive(Default)]
struct State {
    generation: u64,
    updates: Vec<LiveUpdate>,
    statuses: HashMap<String, ChannelStatus>,
    last_status: Option<ChannelStatus>,
}

impl State {
    fn connected(&self, policy: ConnectedPolicy) -> bool {
        match policy {
            ConnectedPolicy::LastObserved => self.last_status == Some(ChannelStatus::Subscribed),
            ConnectedPolicy::AnySubscribed => self
                .statuses
                .values()
                .any(|s| *s == ChannelStatus::Subscribed),
            ConnectedPolicy::AllSubscribed => {
                !self.statuses.is_empty()
                    && self
                        .statuses
                        .values()
                        .all(|s| *s == ChannelStatus::Subscribed)
            }
        }
    }
}

struct Shared {
    policy: ConnectedPolicy,
    state: Mutex<State>,
    connected: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish_connected(&self, state: &State) {
        let connected = state.connected(self.policy);
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Returns false once `generation` is stale.
    fn record_status(&self, generation: u64, collection: &str, status: ChannelStatus) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.statuses.insert(collection.to_string(), status);
        state.last_status = Some(status);
        self.publish_connected(&state);
        true
    }

    fn push_update(&self, generation: u64, update: LiveUpdate) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.updates.push(update);
        true
    }

    /// Invalidates every channel of the current generation and returns the
    /// new one.
    fn advance_generation(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.statuses.clear();
        state.last_status = None;
        self.publish_connected(&state);
        state.generation
    }
}

/// The collections being watched and the tasks pumping their channels.
struct SubscriptionSet {
    collections: BTreeSet<String>,
    pumps: Vec<JoinHandle<()>>,
}

impl SubscriptionSet {
    fn release(self) {
        for pump in self.pumps {
            pump.abort();
        }
        debug!(collections = ?self.collections, "subscription set released");
    }
}

pub struct LiveUpdateSubscriber {
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    active: tokio::sync::Mutex<Option<SubscriptionSet>>,
}

impl LiveUpdateSubscriber {
    pub fn new(feed: Arc<dyn ChangeFeed>, clock: Arc<dyn Clock>, policy: ConnectedPolicy) -> Self {
        let (connected, _rx) = watch::channel(false);
        Self {
            feed,
            clock,
            shared: Arc::new(Shared {
                policy,
                state: Mutex::new(State::default()),
                connected,
            }),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Watch `collections`, replacing whatever was watched before.
    ///
    /// Starting with the set already being watched is a no-op. An empty set
    /// opens nothing and leaves the subscriber disconnected.
    pub async fn start(&self, collections: BTreeSet<String>, on_update: Option<UpdateCallback>) {
        let mut active = self.active.lock().await;

        if active
            .as_ref()
            .is_some_and(|current| current.collections == collections)
        {
            return;
        }

        let generation = self.shared.advance_generation();
        if let Some(previous) = active.take() {
            previous.release();
        }

        if collections.is_empty() {
            return;
        }

        {
            let mut state = self.shared.lock();
            if state.generation != generation {
                return;
            }
            for name in &collections {
                state
                    .statuses
                    .insert(name.clone(), ChannelStatus::Connecting);
            }
            state.last_status = Some(ChannelStatus::Connecting);
        }

        let mut pumps: Vec<JoinHandle<()>> = Vec::with_capacity(collections.len());
        for name in &collections {
            let opened = self.feed.open(name).await;

            let stale = self.shared.lock().generation != generation;
            if stale {
                debug!(collection = %name, "stopped while opening; discarding channel");
                drop(opened);
                for pump in pumps {
                    pump.abort();
                }
                return;
            }

            match opened {
                Ok(channel) => pumps.push(tokio::spawn(pump(
                    self.shared.clone(),
                    self.clock.clone(),
                    generation,
                    channel,
                    on_update.clone(),
                ))),
                Err(e) => {
                    warn!(collection = %name, "failed to open channel: {}", e);
                    self.shared
                        .record_status(generation, name, ChannelStatus::Failed);
                }
            }
        }

        *active = Some(SubscriptionSet { collections, pumps });
    }

    /// Release every open channel and drop to disconnected. Safe to call at
    /// any time, any number of times.
    pub async fn stop(&self) {
        // Bump before taking the lock so an in-flight `start` sees it.
        self.shared.advance_generation();
        if let Some(set) = self.active.lock().await.take() {
            set.release();
        }
    }

    pub fn clear_updates(&self) {
        self.shared.lock().updates.clear();
    }

    /// Snapshot of the buffer in arrival order.
    pub fn updates(&self) -> Vec<LiveUpdate> {
        self.shared.lock().updates.clone()
    }

    /// Drain the buffer.
    pub fn take_updates(&self) -> Vec<LiveUpdate> {
        std::mem::take(&mut self.shared.lock().updates)
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    pub fn connected_changes(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    pub async fn watched(&self) -> BTreeSet<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|set| set.collections.clone())
            .unwrap_or_default()
    }
}

impl Drop for LiveUpdateSubscriber {
    fn drop(&mut self) {
        self.shared.advance_generation();
        if let Some(set) = self.active.get_mut().take() {
            set.release();
        }
    }
}

async fn pump(
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    generation: u64,
    mut channel: Channel,
    on_update: Option<UpdateCallback>,
) {
    let collection = channel.collection().to_string();
    let kind = UpdateKind::from_collection(&collection);

    while let Some(message) = channel.recv().await {
        match message {
            FeedMessage::Status(status) => {
                if status == ChannelStatus::Failed {
                    warn!(collection = %collection, "channel failed");
                }
                if !shared.record_status(generation, &collection, status) {
                    break;
                }
            }
            FeedMessage::Change(change) => {
                let update = LiveUpdate {
                    kind: kind.clone(),
                    show_id: change.show_id,
                    payload: change.payload,
                    observed_at: clock.now(),
                };
                if !shared.push_update(generation, update) {
                    break;
                }
                if let Some(callback) = &on_update {
                    callback();
                }
            }
        }
    }

    debug!(collection = %collection, "channel drained");
}

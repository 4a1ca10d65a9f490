//! Reconciliation
//!
//! Status changes discovered by the cache (expiry on read, usage on settlement) are
//! published as [`StatusChangeEvent`]s. The [`Reconciler`] consumes them and writes the new
//! status into the durable store. Delivery is at-least-once, so applying an event twice
//! must leave the store as applying it once did.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{
    Mutex,
    mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};
use tracing::{debug, error, info, warn};

use coupons::coupons::{CouponId, CouponStatus};

use crate::store::{CouponStore, CouponStoreError};

/// Default topic status changes are published on.
pub const DEFAULT_TOPIC: &str = "coupon_op";

/// A batch of coupons that moved to `status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    /// New status
    pub status: CouponStatus,

    /// Coupons that changed
    pub ids: Vec<CouponId>,
}

impl StatusChangeEvent {
    /// Creates an event.
    pub fn new(status: CouponStatus, ids: Vec<CouponId>) -> Self {
        Self { status, ids }
    }
}

/// Message channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The payload could not be encoded or decoded.
    #[error("invalid event payload")]
    Payload(#[from] serde_json::Error),
}

/// Stream of raw payloads for one topic subscription.
#[derive(Debug)]
pub struct Subscription {
    receiver: UnboundedReceiver<String>,
}

impl Subscription {
    /// Wrap a payload receiver.
    pub fn new(receiver: UnboundedReceiver<String>) -> Self {
        Self { receiver }
    }

    /// The next event, or `None` once every publisher has gone.
    pub async fn next(&mut self) -> Option<Result<StatusChangeEvent, ChannelError>> {
        let payload = self.receiver.recv().await?;

        Some(serde_json::from_str(&payload).map_err(ChannelError::from))
    }
}

/// Asynchronous publish/subscribe transport.
#[automock]
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publish `event` on `topic` without waiting for consumers.
    async fn publish(&self, topic: &str, event: StatusChangeEvent) -> Result<(), ChannelError>;

    /// Subscribe to every event published on `topic` from now on.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError>;
}

/// [`MessageChannel`] delivering JSON payloads between tasks of one process.
#[derive(Debug, Default)]
pub struct InProcessChannel {
    subscribers: Mutex<FxHashMap<String, Vec<UnboundedSender<String>>>>,
}

impl InProcessChannel {
    /// Creates a channel with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageChannel for InProcessChannel {
    async fn publish(&self, topic: &str, event: StatusChangeEvent) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(&event)?;
        let mut subscribers = self.subscribers.lock().await;

        let Some(senders) = subscribers.get_mut(topic) else {
            debug!(topic, "no subscribers, dropping event");

            return Ok(());
        };

        senders.retain(|sender| sender.send(payload.clone()).is_ok());

        debug!(topic, subscribers = senders.len(), "published event");

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError> {
        let (sender, receiver) = unbounded_channel();

        self.subscribers
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(sender);

        Ok(Subscription::new(receiver))
    }
}

/// What applying one event did to the durable store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Statuses rewritten.
    Applied {
        /// Rows written
        written: u64,
    },

    /// Every coupon already had the event's status.
    Unchanged,

    /// Fewer durable records than event ids; the event was dropped.
    Mismatch {
        /// Distinct ids in the event
        expected: usize,

        /// Records found
        found: usize,
    },
}

/// Consumes status changes and persists them.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CouponStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler writing to `store`.
    pub fn new(store: Arc<dyn CouponStore>) -> Self {
        Self { store }
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable store fails. A count mismatch is not an error; it is
    /// logged and reported as [`ReconcileOutcome::Mismatch`].
    pub async fn apply(
        &self,
        event: &StatusChangeEvent,
    ) -> Result<ReconcileOutcome, CouponStoreError> {
        let ids: Vec<CouponId> = event
            .ids
            .iter()
            .copied()
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();

        if ids.is_empty() {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let records = self.store.load_by_ids(&ids).await?;

        if records.len() != ids.len() {
            error!(
                status = %event.status,
                ids = ?event.ids,
                expected = ids.len(),
                found = records.len(),
                "reconciliation mismatch, dropping event"
            );

            return Ok(ReconcileOutcome::Mismatch {
                expected: ids.len(),
                found: records.len(),
            });
        }

        let changed: Vec<_> = records
            .into_iter()
            .filter(|record| record.status != event.status)
            .map(|record| record.with_status(event.status))
            .collect();

        if changed.is_empty() {
            debug!(status = %event.status, count = ids.len(), "event already applied");

            return Ok(ReconcileOutcome::Unchanged);
        }

        let written = self.store.save(changed).await?;

        info!(status = %event.status, written, "reconciled coupon status");

        Ok(ReconcileOutcome::Applied { written })
    }

    /// Apply events from `subscription` until it closes.
    pub async fn run(self, mut subscription: Subscription) {
        while let Some(next) = subscription.next().await {
            match next {
                Ok(event) => {
                    if let Err(error) = self.apply(&event).await {
                        error!(%error, status = %event.status, ids = ?event.ids, "failed to reconcile event");
                    }
                }
                Err(error) => warn!(%error, "dropping undecodable event"),
            }
        }

        debug!("reconciliation subscription closed");
    }
}

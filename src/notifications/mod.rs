//! Web push notifications for new service-to-sales entries.
//!
//! Every entry is pushed to every stored subscription. Deliveries run
//! concurrently and independently; endpoints the push service reports as
//! gone are pruned from the store as they are found.

pub mod webpush;

pub use webpush::WebPushSender;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::api::metrics::{record_push_delivery, record_subscription_pruned};
use crate::config::PushConfig;
use crate::lead::LeadEvent;
use crate::store::{PushSubscription, StoreError, SubscriptionStore};

/// Score bands for how warm a lead is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Hot,
    Warm,
    Cool,
}

impl Urgency {
    /// 8 and up is hot, 5 and up warm; anything else, including a missing
    /// or non-numeric score, is cool.
    pub fn from_score(score: Option<&str>) -> Self {
        match score.and_then(leading_int) {
            Some(n) if n >= 8 => Urgency::Hot,
            Some(n) if n >= 5 => Urgency::Warm,
            _ => Urgency::Cool,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Urgency::Hot => "🔥 HOT",
            Urgency::Warm => "⚡ WARM",
            Urgency::Cool => "❄️ COOL",
        }
    }
}

/// Integer prefix of `s`, the way form scores like `"8"` or `"8/10"` read.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationData {
    #[serde(rename = "entryId")]
    pub entry_id: Option<String>,
    pub url: String,
}

/// What the service worker receives and shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub url: String,
    pub tag: String,
    pub data: NotificationData,
}

impl NotificationPayload {
    pub fn for_entry(entry: &LeadEvent, config: &PushConfig) -> Self {
        let customer = format!(
            "{} {}",
            entry.first_name.as_deref().unwrap_or_default(),
            entry.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string();
        let customer = if customer.is_empty() {
            "Unknown".to_string()
        } else {
            customer
        };
        let vehicle = entry.vehicle();
        let vehicle = if vehicle.is_empty() {
            "Vehicle TBD".to_string()
        } else {
            vehicle
        };
        let score = entry.eng_score.as_deref().unwrap_or("—");
        let rep = entry.submitter.as_deref().unwrap_or("Unknown");
        let outcome = entry.outcome.as_deref().unwrap_or("Logged");
        let urgency = Urgency::from_score(entry.eng_score.as_deref());

        Self {
            title: format!("New S2S Entry — {}", urgency.label()),
            body: format!("{customer} · {vehicle}\nRep: {rep} · Score: {score}/10 · {outcome}"),
            icon: config.icon_url.clone(),
            badge: config.icon_url.clone(),
            url: config.dashboard_url.clone(),
            tag: "s2s-entry".to_string(),
            data: NotificationData {
                entry_id: entry.id.clone(),
                url: config.dashboard_url.clone(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    /// The push service answered with a non-success status
    #[error("push service responded with {status}")]
    Rejected { status: u16 },
    #[error("push request failed: {0}")]
    Transport(String),
    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),
    #[error("push payload encryption failed")]
    Crypto,
    #[error("VAPID signing failed: {0}")]
    Vapid(String),
    #[error("delivery timed out")]
    Timeout,
}

impl PushError {
    /// 404 and 410 mean the subscription no longer exists
    pub fn is_gone(&self) -> bool {
        matches!(self, PushError::Rejected { status: 404 | 410 })
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver `payload` to one browser subscription (`PushSubscription.toJSON()`).
    async fn send(&self, subscription: &Value, payload: &[u8]) -> Result<(), PushError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Gone,
    Failed,
}

/// Fans a notification out to every stored subscription, at most
/// `max_concurrent_deliveries` at a time.
pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    sender: Arc<dyn PushSender>,
    config: PushConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        sender: Arc<dyn PushSender>,
        config: PushConfig,
    ) -> Self {
        Self {
            store,
            sender,
            config,
        }
    }

    /// Push `entry` to all subscribers.
    ///
    /// Only the subscription listing can fail the dispatch. Individual
    /// deliveries that fail are counted as not sent.
    pub async fn dispatch(&self, entry: &LeadEvent) -> Result<DispatchReport, StoreError> {
        let payload = NotificationPayload::for_entry(entry, &self.config);
        let payload = serde_json::to_vec(&payload)?;

        let subscriptions = self.store.list().await?;
        if subscriptions.is_empty() {
            tracing::debug!("No push subscribers");
            return Ok(DispatchReport { sent: 0, total: 0 });
        }

        let total = subscriptions.len();
        let deliveries: Vec<_> = subscriptions
            .iter()
            .map(|subscription| self.deliver(subscription, &payload))
            .collect();
        let outcomes: Vec<Delivery> = stream::iter(deliveries)
            .buffer_unordered(self.config.max_concurrent_deliveries.max(1))
            .collect()
            .await;

        let sent = outcomes.iter().filter(|o| **o == Delivery::Sent).count();
        tracing::info!(
            sent,
            total,
            gone = outcomes.iter().filter(|o| **o == Delivery::Gone).count(),
            "Push notification dispatched"
        );

        Ok(DispatchReport { sent, total })
    }

    async fn deliver(&self, subscription: &PushSubscription, payload: &[u8]) -> Delivery {
        let timeout = Duration::from_secs(self.config.delivery_timeout_secs);
        let result = tokio::time::timeout(timeout, self.sender.send(&subscription.subscription, payload))
            .await
            .unwrap_or(Err(PushError::Timeout));

        let outcome = match result {
            Ok(()) => Delivery::Sent,
            Err(e) if e.is_gone() => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    user = subscription.user_name.as_deref().unwrap_or_default(),
                    "Subscription expired, removing"
                );
                match self.store.remove_by_id(&subscription.id).await {
                    Ok(()) => record_subscription_pruned(),
                    Err(e) => tracing::warn!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Failed to remove expired subscription"
                    ),
                }
                Delivery::Gone
            }
            Err(e) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Push delivery failed"
                );
                Delivery::Failed
            }
        };

        record_push_delivery(match outcome {
            Delivery::Sent => "sent",
            Delivery::Gone => "gone",
            Delivery::Failed => "failed",
        });
        outcome
    }
}

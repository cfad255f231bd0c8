//! Offline cache worker.
//!
//! The lifecycle of the app's background page worker, with the browser
//! facilities it drives (cache storage, network, open windows) behind
//! traits. States advance `Installing -> Installed -> Active`, and end in
//! `Superseded` once a newer version takes over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::lenient;

/// Version tag; bumping it evicts every older cache on activation
pub const CACHE_NAME: &str = "servicebridge-v2";

/// Paths stored at install time and served when the network is down
pub const PRECACHE: &[&str] = &["/app.html", "/manifest.json"];

const DEFAULT_TITLE: &str = "ServiceBridge";
const DEFAULT_ICON: &str = "/icon-192.png";
const DEFAULT_TAG: &str = "servicebridge";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cache storage failed: {0}")]
    Cache(String),
    #[error("network request failed: {0}")]
    Network(String),
    #[error("invalid app URL: {0}")]
    InvalidUrl(String),
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: WorkerState,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Fetch and store every path in the named cache, creating it if needed.
    async fn add_all(&self, cache: &str, paths: &[&str]) -> Result<(), WorkerError>;
    async fn keys(&self) -> Result<Vec<String>, WorkerError>;
    async fn delete(&self, cache: &str) -> Result<bool, WorkerError>;
    /// Look a request up across all caches
    async fn lookup(&self, url: &str) -> Option<Response>;
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Response, WorkerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait WindowClients: Send + Sync {
    /// Take control of every open page
    async fn claim(&self);
    async fn windows(&self) -> Vec<WindowClient>;
    async fn focus(&self, id: &str) -> Result<(), WorkerError>;
    async fn open(&self, url: &str) -> Result<(), WorkerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Active,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; the browser performs the request itself
    Passthrough,
    FromNetwork(Response),
    FromCache(Response),
    /// Network down and nothing cached
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Options for the notification shown on a push event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub data: Value,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Default, Deserialize)]
struct PushMessage {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    body: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    icon: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    badge: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    tag: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl PushMessage {
    fn parse(data: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(data) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(_) => Self::default(),
            Err(_) => Self {
                body: Some(String::from_utf8_lossy(data).into_owned()),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    Focused(String),
    Opened(String),
}

pub struct CacheWorker<C, N, W> {
    cache: C,
    network: N,
    clients: W,
    origin: String,
    app_url: String,
    app_host: String,
    state: WorkerState,
}

impl<C, N, W> CacheWorker<C, N, W>
where
    C: CacheStorage,
    N: Network,
    W: WindowClients,
{
    /// `app_url` is where notification clicks land by default; its origin
    /// is the scope the worker serves.
    pub fn new(app_url: &str, cache: C, network: N, clients: W) -> Result<Self, WorkerError> {
        let url = url::Url::parse(app_url).map_err(|e| WorkerError::InvalidUrl(e.to_string()))?;
        let app_host = url
            .host_str()
            .ok_or_else(|| WorkerError::InvalidUrl(app_url.to_string()))?
            .to_string();

        Ok(Self {
            cache,
            network,
            clients,
            origin: url.origin().ascii_serialization(),
            app_url: app_url.to_string(),
            app_host,
            state: WorkerState::Installing,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn expect_state(&self, action: &'static str, expected: WorkerState) -> Result<(), WorkerError> {
        if self.state != expected {
            return Err(WorkerError::InvalidState {
                action,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Precache the app shell and skip waiting.
    pub async fn install(&mut self) -> Result<(), WorkerError> {
        self.expect_state("install", WorkerState::Installing)?;
        self.cache.add_all(CACHE_NAME, PRECACHE).await?;
        self.state = WorkerState::Installed;
        tracing::debug!(cache = CACHE_NAME, "Worker installed");
        Ok(())
    }

    /// Drop caches from older versions and take over open pages.
    pub async fn activate(&mut self) -> Result<(), WorkerError> {
        self.expect_state("activate", WorkerState::Installed)?;

        for key in self.cache.keys().await? {
            if key != CACHE_NAME {
                self.cache.delete(&key).await?;
                tracing::debug!(cache = %key, "Deleted stale cache");
            }
        }
        self.clients.claim().await;
        self.state = WorkerState::Active;
        Ok(())
    }

    /// Network first, falling back to the install-time cache. API calls and
    /// other origins are left alone.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let same_origin = url::Url::parse(url)
            .is_ok_and(|parsed| parsed.origin().ascii_serialization() == self.origin);
        if self.state != WorkerState::Active || url.contains("/api/") || !same_origin {
            return FetchOutcome::Passthrough;
        }

        match self.network.fetch(url).await {
            Ok(response) => FetchOutcome::FromNetwork(response),
            Err(e) => {
                tracing::debug!(url, error = %e, "Network failed, trying cache");
                match self.cache.lookup(url).await {
                    Some(response) => FetchOutcome::FromCache(response),
                    None => FetchOutcome::Miss,
                }
            }
        }
    }

    /// Notification for a push event; `None` when the push carried no data.
    pub fn push(&self, data: Option<&[u8]>) -> Option<NotificationSpec> {
        let message = PushMessage::parse(data?);

        Some(NotificationSpec {
            title: message.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: message.body.unwrap_or_default(),
            icon: message.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            badge: message.badge.unwrap_or_else(|| DEFAULT_ICON.to_string()),
            tag: message.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            data: message.data.unwrap_or_else(|| Value::Object(Default::default())),
            vibrate: vec![200, 100, 200],
            require_interaction: false,
            actions: vec![
                NotificationAction {
                    action: "view".to_string(),
                    title: "📊 View Dashboard".to_string(),
                },
                NotificationAction {
                    action: "dismiss".to_string(),
                    title: "Dismiss".to_string(),
                },
            ],
        })
    }

    pub async fn notification_click(
        &self,
        action: Option<&str>,
        data: &Value,
    ) -> Result<ClickOutcome, WorkerError> {
        if action == Some("dismiss") {
            return Ok(ClickOutcome::Dismissed);
        }

        let existing = self
            .clients
            .windows()
            .await
            .into_iter()
            .find(|w| w.url.contains(&self.app_host));
        if let Some(window) = existing {
            self.clients.focus(&window.id).await?;
            return Ok(ClickOutcome::Focused(window.id));
        }

        let target = data
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.app_url.as_str())
            .to_string();
        self.clients.open(&target).await?;
        Ok(ClickOutcome::Opened(target))
    }

    /// A worker with a different version tag has activated. Returns whether
    /// this worker stepped down.
    pub fn supersede(&mut self, version: &str) -> bool {
        if version == CACHE_NAME || self.state == WorkerState::Superseded {
            return false;
        }
        tracing::info!(from = CACHE_NAME, to = version, "Worker superseded");
        self.state = WorkerState::Superseded;
        true
    }
}

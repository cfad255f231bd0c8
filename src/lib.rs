pub mod api;
pub mod auth;
pub mod config;
pub mod lead;
pub mod mail;
pub mod notifications;
pub mod store;
pub mod utils;
pub mod worker;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::auth::SessionResolver;
use crate::mail::Mailer;
use crate::notifications::{Dispatcher, PushSender};
use crate::store::{AuthProvider, ProfileStore, SubscriptionStore};

pub struct AppState {
    pub config: Config,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub mailer: Arc<dyn Mailer>,
    pub sessions: SessionResolver,
    /// `None` until VAPID keys are configured
    pub dispatcher: Option<Dispatcher>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Config,
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let sessions = SessionResolver::new(auth, profiles, config.auth.clone());
        Self {
            config,
            subscriptions,
            mailer,
            sessions,
            dispatcher: None,
            metrics_handle: None,
        }
    }

    /// Enable web push through `sender`
    pub fn with_push(mut self, sender: Arc<dyn PushSender>) -> Self {
        self.dispatcher = Some(Dispatcher::new(
            self.subscriptions.clone(),
            sender,
            self.config.push.clone(),
        ));
        self
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

//! External data store and auth provider.
//!
//! The store speaks the PostgREST dialect (`/rest/v1/<table>` with
//! `column=op.value` filters) and the auth provider the GoTrue one
//! (`/auth/v1/user`). Both sit behind traits so handlers and the session
//! resolver can be exercised against in-memory fakes.

#[cfg(test)]
pub(crate) mod memory;
mod models;
mod rest;

pub use models::{AuthUser, NewSubscription, Profile, PushSubscription, UserMetadata};
pub use rest::{GoTrueAuth, RestStore};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Method, RequestBuilder};
use std::time::Duration;
use thiserror::Error;

use crate::config::StoreConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("more than one profile matches {field} = {value:?}")]
    Ambiguous { field: &'static str, value: String },
    #[error("unexpected store payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Profile lookups run with the signed-in user's token so row policies apply.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn by_auth_id(&self, token: &str, auth_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Exact match on `email`, ignoring case
    async fn by_email(&self, token: &str, email: &str) -> Result<Option<Profile>, StoreError>;

    /// Exact match on `full_name`, ignoring case. More than one row is
    /// [`StoreError::Ambiguous`].
    async fn by_name(&self, token: &str, name: &str) -> Result<Option<Profile>, StoreError>;

    async fn link_auth_id(
        &self,
        token: &str,
        profile_id: &str,
        auth_id: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list(&self) -> Result<Vec<PushSubscription>, StoreError>;

    /// Insert, treating an existing endpoint as success.
    async fn save(&self, subscription: &NewSubscription) -> Result<(), StoreError>;

    /// Delete by endpoint. Deleting nothing is not an error.
    async fn remove(&self, endpoint: &str) -> Result<(), StoreError>;

    async fn remove_by_id(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Owner of `token`, or `None` when the provider rejects it as
    /// invalid or expired.
    async fn get_user(&self, token: &str) -> Result<Option<AuthUser>, StoreError>;

    async fn sign_out(&self, token: &str) -> Result<(), StoreError>;
}

/// Which credential a store request carries.
#[derive(Debug, Clone, Copy)]
pub enum Bearer<'a> {
    /// Server-side service key
    Service,
    /// A signed-in user's access token
    User(&'a str),
}

/// HTTP client that stamps every store request with `apikey` and
/// `Authorization` for the chosen credential.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    anon_key: String,
}

impl RestClient {
    pub fn new(config: &StoreConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            anon_key: config.anon_key.clone(),
        }
    }

    /// Absolute URLs pass through; anything else is relative to the project.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    pub fn request(&self, method: Method, path: &str, bearer: Bearer<'_>) -> RequestBuilder {
        let (apikey, token) = match bearer {
            Bearer::Service => (self.service_key.as_str(), self.service_key.as_str()),
            Bearer::User(token) if self.anon_key.is_empty() => (self.service_key.as_str(), token),
            Bearer::User(token) => (self.anon_key.as_str(), token),
        };

        self.http
            .request(method, self.url(path))
            .header("apikey", apikey)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::new(&StoreConfig {
            url: "https://project.supabase.co/".to_string(),
            service_key: "service".to_string(),
            anon_key: "anon".to_string(),
        })
    }

    #[test]
    fn test_url_joining() {
        let client = client();
        assert_eq!(
            client.url("/rest/v1/user_profiles"),
            "https://project.supabase.co/rest/v1/user_profiles"
        );
        assert_eq!(client.url("https://other.example/x"), "https://other.example/x");
    }

    #[test]
    fn test_request_headers_for_user_token() {
        let request = client()
            .request(Method::GET, "/rest/v1/user_profiles", Bearer::User("jwt"))
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "anon");
        assert_eq!(request.headers()["authorization"], "Bearer jwt");
        assert_eq!(request.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_request_headers_for_service() {
        let request = client()
            .request(Method::DELETE, "/rest/v1/push_subscriptions", Bearer::Service)
            .build()
            .unwrap();
        assert_eq!(request.headers()["apikey"], "service");
        assert_eq!(request.headers()["authorization"], "Bearer service");
        assert_eq!(request.method(), Method::DELETE);
    }
}

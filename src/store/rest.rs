use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{
    AuthProvider, AuthUser, Bearer, NewSubscription, Profile, ProfileStore, PushSubscription,
    RestClient, StoreError, SubscriptionStore,
};

const PROFILES: &str = "/rest/v1/user_profiles";
const SUBSCRIPTIONS: &str = "/rest/v1/push_subscriptions";

/// Turn a non-success response into [`StoreError::Status`].
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Filter matching `value` exactly, ignoring case. LIKE metacharacters are
/// escaped. PostgREST turns every `*` into `%` inside `ilike`, so values
/// holding one fall back to a case-sensitive `eq`.
fn equals_ignoring_case(value: &str) -> String {
    if value.contains('*') {
        return format!("eq.{value}");
    }
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("ilike.{escaped}")
}

async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, StoreError> {
    let response = check(response).await?;
    Ok(response.json::<Vec<T>>().await?)
}

/// PostgREST-backed profile and subscription tables.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: RestClient,
}

impl RestStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    async fn profile_where(
        &self,
        token: &str,
        column: &str,
        filter: String,
        limit: usize,
    ) -> Result<Vec<Profile>, StoreError> {
        let limit = limit.to_string();
        let response = self
            .client
            .request(Method::GET, PROFILES, Bearer::User(token))
            .query(&[
                (column, filter.as_str()),
                ("select", "*"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;
        rows(response).await
    }
}

#[async_trait]
impl ProfileStore for RestStore {
    async fn by_auth_id(&self, token: &str, auth_id: &str) -> Result<Option<Profile>, StoreError> {
        let found = self
            .profile_where(token, "auth_id", format!("eq.{auth_id}"), 1)
            .await?;
        Ok(found.into_iter().next())
    }

    async fn by_email(&self, token: &str, email: &str) -> Result<Option<Profile>, StoreError> {
        let found = self
            .profile_where(token, "email", equals_ignoring_case(email), 1)
            .await?;
        Ok(found.into_iter().next())
    }

    async fn by_name(&self, token: &str, name: &str) -> Result<Option<Profile>, StoreError> {
        let mut found = self
            .profile_where(token, "full_name", equals_ignoring_case(name), 2)
            .await?;
        if found.len() > 1 {
            return Err(StoreError::Ambiguous {
                field: "full_name",
                value: name.to_string(),
            });
        }
        Ok(found.pop())
    }

    async fn link_auth_id(
        &self,
        token: &str,
        profile_id: &str,
        auth_id: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .request(Method::PATCH, PROFILES, Bearer::User(token))
            .query(&[("id", format!("eq.{profile_id}"))])
            .header("Prefer", "return=minimal")
            .json(&json!({ "auth_id": auth_id }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for RestStore {
    async fn list(&self) -> Result<Vec<PushSubscription>, StoreError> {
        let response = self
            .client
            .request(Method::GET, SUBSCRIPTIONS, Bearer::Service)
            .query(&[("select", "*")])
            .send()
            .await?;
        let body: Value = check(response).await?.json().await?;

        match body {
            Value::Array(_) => Ok(serde_json::from_value(body)?),
            other => {
                tracing::warn!(body = %other, "Subscription listing was not an array, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn save(&self, subscription: &NewSubscription) -> Result<(), StoreError> {
        let response = self
            .client
            .request(Method::POST, SUBSCRIPTIONS, Bearer::Service)
            .query(&[("on_conflict", "endpoint")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(subscription)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn remove(&self, endpoint: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .request(Method::DELETE, SUBSCRIPTIONS, Bearer::Service)
            .query(&[("endpoint", format!("eq.{endpoint}"))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn remove_by_id(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .request(Method::DELETE, SUBSCRIPTIONS, Bearer::Service)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// GoTrue-style auth endpoints.
#[derive(Debug, Clone)]
pub struct GoTrueAuth {
    client: RestClient,
}

impl GoTrueAuth {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
    async fn get_user(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        let response = self
            .client
            .request(Method::GET, "/auth/v1/user", Bearer::User(token))
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => {
                let user = check(response).await?.json::<AuthUser>().await?;
                Ok(Some(user))
            }
        }
    }

    async fn sign_out(&self, token: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .request(Method::POST, "/auth/v1/logout", Bearer::User(token))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

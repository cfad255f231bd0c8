//! In-memory store and auth provider used by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::{
    AuthProvider, AuthUser, NewSubscription, Profile, ProfileStore, PushSubscription, StoreError,
    SubscriptionStore,
};

fn unavailable() -> StoreError {
    StoreError::Status {
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub profiles: Mutex<Vec<Profile>>,
    pub subscriptions: Mutex<Vec<PushSubscription>>,
    pub links: Mutex<Vec<(String, String)>>,
    /// Lookup kinds (`auth_id`, `email`, `name`) that fail with a store error
    pub failing_lookups: Mutex<HashSet<&'static str>>,
    pub fail_list: Mutex<bool>,
    pub fail_remove: Mutex<bool>,
    /// Link attempts are still recorded in `links` but leave profiles untouched
    pub fail_link: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        let store = Self::new();
        *store.profiles.lock() = profiles;
        store
    }

    pub fn with_subscriptions(subscriptions: Vec<PushSubscription>) -> Self {
        let store = Self::new();
        *store.subscriptions.lock() = subscriptions;
        store
    }

    pub fn fail_lookup(&self, kind: &'static str) {
        self.failing_lookups.lock().insert(kind);
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .iter()
            .map(|s| s.endpoint.clone())
            .collect()
    }

    fn lookup(
        &self,
        kind: &'static str,
        matches: impl Fn(&Profile) -> bool,
    ) -> Result<Vec<Profile>, StoreError> {
        if self.failing_lookups.lock().contains(kind) {
            return Err(unavailable());
        }
        Ok(self
            .profiles
            .lock()
            .iter()
            .filter(|p| matches(p))
            .cloned()
            .collect())
    }
}

fn eq_ignore_case(field: &Option<String>, value: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|f| f.to_lowercase() == value.to_lowercase())
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn by_auth_id(&self, _token: &str, auth_id: &str) -> Result<Option<Profile>, StoreError> {
        let found = self.lookup("auth_id", |p| p.auth_id.as_deref() == Some(auth_id))?;
        Ok(found.into_iter().next())
    }

    async fn by_email(&self, _token: &str, email: &str) -> Result<Option<Profile>, StoreError> {
        let found = self.lookup("email", |p| eq_ignore_case(&p.email, email))?;
        Ok(found.into_iter().next())
    }

    async fn by_name(&self, _token: &str, name: &str) -> Result<Option<Profile>, StoreError> {
        let mut found = self.lookup("name", |p| eq_ignore_case(&p.full_name, name))?;
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
        _token: &str,
        profile_id: &str,
        auth_id: &str,
    ) -> Result<(), StoreError> {
        self.links
            .lock()
            .push((profile_id.to_string(), auth_id.to_string()));
        if *self.fail_link.lock() {
            return Err(unavailable());
        }
        for profile in self.profiles.lock().iter_mut() {
            if profile.id == profile_id {
                profile.auth_id = Some(auth_id.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn list(&self) -> Result<Vec<PushSubscription>, StoreError> {
        if *self.fail_list.lock() {
            return Err(unavailable());
        }
        Ok(self.subscriptions.lock().clone())
    }

    async fn save(&self, subscription: &NewSubscription) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions
            .iter()
            .any(|s| s.endpoint == subscription.endpoint)
        {
            return Ok(());
        }
        let id = (subscriptions.len() + 1).to_string();
        subscriptions.push(PushSubscription {
            id,
            endpoint: subscription.endpoint.clone(),
            subscription: subscription.subscription.clone(),
            user_id: subscription.user_id.clone(),
            user_name: subscription.user_name.clone(),
            created_at: Some(subscription.created_at.clone()),
        });
        Ok(())
    }

    async fn remove(&self, endpoint: &str) -> Result<(), StoreError> {
        if *self.fail_remove.lock() {
            return Err(unavailable());
        }
        self.subscriptions.lock().retain(|s| s.endpoint != endpoint);
        Ok(())
    }

    async fn remove_by_id(&self, id: &str) -> Result<(), StoreError> {
        if *self.fail_remove.lock() {
            return Err(unavailable());
        }
        self.subscriptions.lock().retain(|s| s.id != id);
        Ok(())
    }
}

/// Auth provider that knows a fixed set of tokens.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    pub users: HashMap<String, AuthUser>,
    pub signed_out: Mutex<Vec<String>>,
    pub unreachable: bool,
}

impl MemoryAuth {
    pub fn with_user(token: &str, user: AuthUser) -> Self {
        let mut users = HashMap::new();
        users.insert(token.to_string(), user);
        Self {
            users,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn get_user(&self, token: &str) -> Result<Option<AuthUser>, StoreError> {
        if self.unreachable {
            return Err(unavailable());
        }
        Ok(self.users.get(token).cloned())
    }

    async fn sign_out(&self, token: &str) -> Result<(), StoreError> {
        self.signed_out.lock().push(token.to_string());
        Ok(())
    }
}

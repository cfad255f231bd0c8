use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::lenient;

/// A row of `user_profiles`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub auth_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub avatar_color: Option<String>,
}

/// The auth provider's view of an access token's owner
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserMetadata {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub phone: Option<String>,
}

impl UserMetadata {
    /// Display name as the provider knows it
    pub fn display_name(&self) -> Option<&str> {
        self.full_name.as_deref().or(self.name.as_deref())
    }
}

/// A row of `push_subscriptions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSubscription {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    pub endpoint: String,
    /// Browser `PushSubscription.toJSON()` output, kept opaque
    pub subscription: Value,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub created_at: Option<String>,
}

/// Insert body for `push_subscriptions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSubscription {
    pub endpoint: String,
    pub subscription: Value,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub created_at: String,
}

impl NewSubscription {
    pub fn new(subscription: Value, user_id: Option<String>, user_name: Option<String>) -> Option<Self> {
        let endpoint = subscription.get("endpoint")?.as_str()?.to_string();
        Some(Self {
            endpoint,
            subscription,
            user_id,
            user_name,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_with_numeric_id() {
        let profile: Profile = serde_json::from_value(json!({
            "id": 17,
            "full_name": "John Smith",
            "role": "gsm",
            "phone": null,
            "extra_column": true
        }))
        .unwrap();
        assert_eq!(profile.id, "17");
        assert_eq!(profile.full_name.as_deref(), Some("John Smith"));
        assert_eq!(profile.phone, None);
    }

    #[test]
    fn test_auth_user_without_metadata() {
        let user: AuthUser =
            serde_json::from_value(json!({"id": "u1", "email": "a@b.com", "aud": "authenticated"}))
                .unwrap();
        assert_eq!(user.user_metadata, UserMetadata::default());
        assert_eq!(user.user_metadata.display_name(), None);
    }

    #[test]
    fn test_new_subscription_requires_endpoint() {
        let sub = NewSubscription::new(
            json!({"endpoint": "https://push.example/abc", "keys": {"p256dh": "k", "auth": "a"}}),
            Some("u1".to_string()),
            Some("Pat".to_string()),
        )
        .unwrap();
        assert_eq!(sub.endpoint, "https://push.example/abc");

        assert!(NewSubscription::new(json!({"keys": {}}), None, None).is_none());
    }
}

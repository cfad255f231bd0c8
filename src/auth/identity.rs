use serde::{Deserialize, Serialize};

use super::role::Role;
use crate::store::{AuthUser, Profile};

/// Resolved view of who is calling. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserIdentity {
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    pub first: String,
    pub role: Role,
    pub initials: String,
    pub profile_id: Option<String>,
    pub phone: String,
    pub title: String,
    pub avatar_color: Option<String>,
}

/// Session record kept by older pages in the browser's session storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub initials: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl LegacyRecord {
    pub fn is_usable(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

impl From<&UserIdentity> for LegacyRecord {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            name: identity.name.clone(),
            role: Some(identity.role.to_string()),
            initials: Some(identity.initials.clone()),
            title: Some(identity.title.clone()),
            email: Some(identity.email.clone()),
        }
    }
}

/// Two-letter badge for a display name.
///
/// One word gives its first two characters, several give the first
/// character of the first and last word. Blank names give `??`.
pub fn initials(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => "??".to_string(),
        [only] => only.chars().take(2).collect::<String>().to_uppercase(),
        [first, .., last] => {
            let mut out = String::new();
            out.extend(first.chars().next());
            out.extend(last.chars().next());
            out.to_uppercase()
        }
    }
}

fn first_word(name: &str) -> String {
    name.split(' ').next().unwrap_or_default().to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

impl UserIdentity {
    /// Merge a profile row over provider metadata over the token's own fields.
    pub fn from_auth_user(user: &AuthUser, profile: Option<&Profile>) -> Self {
        let meta = &user.user_metadata;
        let email = user.email.clone().unwrap_or_default();
        let email_local = email.split('@').next().filter(|s| !s.is_empty());

        let name = non_empty(profile.and_then(|p| p.full_name.as_deref()))
            .or_else(|| non_empty(profile.and_then(|p| p.name.as_deref())))
            .or_else(|| non_empty(meta.full_name.as_deref()))
            .or_else(|| non_empty(meta.name.as_deref()))
            .or(email_local)
            .unwrap_or("User")
            .to_string();

        let role = Role::normalize(
            non_empty(profile.and_then(|p| p.role.as_deref())).or(meta.role.as_deref()),
        );

        let phone = non_empty(profile.and_then(|p| p.phone.as_deref()))
            .or_else(|| non_empty(meta.phone.as_deref()))
            .unwrap_or_default()
            .to_string();

        Self {
            id: Some(user.id.clone()),
            email,
            first: first_word(&name),
            initials: initials(&name),
            name,
            role,
            profile_id: profile.map(|p| p.id.clone()),
            phone,
            title: profile
                .and_then(|p| p.title.clone())
                .unwrap_or_default(),
            avatar_color: profile.and_then(|p| p.avatar_color.clone()),
        }
    }

    /// Build straight from a legacy record; there is no profile lookup.
    pub fn from_legacy(record: &LegacyRecord) -> Self {
        let name = record.name.trim().to_string();
        let initials = non_empty(record.initials.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| initials(&name));

        Self {
            id: None,
            email: record.email.clone().unwrap_or_default(),
            first: first_word(&name),
            initials,
            role: Role::normalize(record.role.as_deref()),
            name,
            profile_id: None,
            phone: String::new(),
            title: record.title.clone().unwrap_or_default(),
            avatar_color: None,
        }
    }
}

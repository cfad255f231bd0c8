//! Staff role policy.
//!
//! Role strings arrive from profile rows, auth metadata and legacy session
//! records in whatever spelling the person who typed them preferred. Every one
//! of them is folded into the three roles the app actually gates on.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::identity::UserIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Admin,
    Manager,
    Sales,
}

impl Role {
    /// Fold an arbitrary role string into the closed set.
    ///
    /// Matching ignores case and surrounding whitespace. Anything unknown,
    /// including an empty or absent role, is `Sales`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Role::Sales;
        };
        match raw.trim().to_lowercase().as_str() {
            "admin" | "administrator" => Role::Admin,
            "manager" | "s2s manager" | "gsm" => Role::Manager,
            _ => Role::Sales,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manager",
            Role::Sales => "Sales",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Role::normalize(raw.as_deref()))
    }
}

/// Roles a page admits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequiredRoles {
    #[default]
    Any,
    OneOf(Vec<Role>),
}

impl RequiredRoles {
    pub fn one_of<'a>(roles: impl IntoIterator<Item = &'a str>) -> Self {
        let mut normalized: Vec<Role> = Vec::new();
        for role in roles {
            let role = Role::normalize(Some(role));
            if !normalized.contains(&role) {
                normalized.push(role);
            }
        }
        RequiredRoles::OneOf(normalized)
    }

    pub fn admits(&self, role: Role) -> bool {
        match self {
            RequiredRoles::Any => true,
            RequiredRoles::OneOf(roles) => roles.contains(&role),
        }
    }
}

impl<'de> Deserialize<'de> for RequiredRoles {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => RequiredRoles::Any,
            Some(Raw::One(role)) if role.trim().eq_ignore_ascii_case("any") => RequiredRoles::Any,
            Some(Raw::One(role)) => RequiredRoles::one_of([role.as_str()]),
            Some(Raw::Many(roles)) => RequiredRoles::one_of(roles.iter().map(String::as_str)),
        })
    }
}

/// Whether `identity` may view a page gated on `required`.
pub fn authorize(identity: &UserIdentity, required: &RequiredRoles) -> bool {
    required.admits(identity.role)
}

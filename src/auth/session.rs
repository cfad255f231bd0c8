//! Session resolution for page loads.
//!
//! A page presents whatever it has: an access token from the auth provider,
//! a legacy record left in session storage by older pages, or nothing. The
//! resolver turns that into either a [`SessionContext`] the page can work
//! with, or a [`Redirect`] it must follow without running anything else.

use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::{self, SessionCache};
use super::identity::{LegacyRecord, UserIdentity};
use super::role::{authorize, RequiredRoles};
use crate::api::metrics::record_session_resolved;
use crate::config::AuthConfig;
use crate::store::{AuthProvider, AuthUser, Bearer, Profile, ProfileStore, RestClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Provider-issued access token
    Modern,
    /// Cached record from session storage
    Legacy,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Modern => "modern",
            AuthMode::Legacy => "legacy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    Unauthenticated,
    Forbidden,
    SignedOut,
}

/// Where the page must go instead of continuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub target: String,
    pub reason: RedirectReason,
    /// The page is already at `target`; stay put, but still stop.
    pub suppressed: bool,
}

impl Redirect {
    pub fn new(target: &str, reason: RedirectReason, current_page: Option<&str>) -> Self {
        let suppressed = current_page
            .and_then(|page| page.rsplit('/').next())
            .is_some_and(|page| page == target);
        Self {
            target: target.to_string(),
            reason,
            suppressed,
        }
    }
}

/// Result of resolving a page load. Callers must match on it; there is no
/// way to reach the identity without handling the redirect.
#[must_use]
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(SessionContext),
    Redirect(Redirect),
}

/// Provider notifications delivered to a live page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedOut,
    /// Rotated access token, or `None` when the refresh failed
    TokenRefreshed(Option<String>),
}

/// Who is on the page and with which credential.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: UserIdentity,
    pub mode: AuthMode,
    access_token: Option<String>,
}

impl SessionContext {
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Store request carrying this session's token.
    ///
    /// Legacy sessions have no token to present and are sent to login.
    pub fn request(
        &self,
        client: &RestClient,
        method: Method,
        path: &str,
        pages: &AuthConfig,
    ) -> Result<RequestBuilder, Redirect> {
        match self.access_token.as_deref() {
            Some(token) => Ok(client.request(method, path, Bearer::User(token))),
            None => Err(Redirect::new(
                &pages.login_page,
                RedirectReason::Unauthenticated,
                None,
            )),
        }
    }

    /// Fold a provider event into the session.
    pub fn apply(&mut self, event: AuthEvent, pages: &AuthConfig) -> Option<Redirect> {
        match event {
            AuthEvent::TokenRefreshed(Some(token)) => {
                self.access_token = Some(token);
                None
            }
            AuthEvent::TokenRefreshed(None) => Some(Redirect::new(
                &pages.login_page,
                RedirectReason::Unauthenticated,
                None,
            )),
            AuthEvent::SignedOut => Some(Redirect::new(
                &pages.login_page,
                RedirectReason::SignedOut,
                None,
            )),
        }
    }
}

/// How a profile row was found for a token's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchedBy {
    AuthId,
    Email,
    Name,
}

/// The credential that won, already checked.
enum Credential {
    Token { token: String, user: AuthUser },
    Legacy(LegacyRecord),
}

pub struct SessionResolver {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    pages: AuthConfig,
}

impl SessionResolver {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        pages: AuthConfig,
    ) -> Self {
        Self {
            auth,
            profiles,
            pages,
        }
    }

    pub fn pages(&self) -> &AuthConfig {
        &self.pages
    }

    /// Resolve a page load into a session or a redirect.
    ///
    /// A valid token wins over a legacy record. On success the identity is
    /// written back to `cache` in the legacy format.
    pub async fn resolve(
        &self,
        access_token: Option<&str>,
        cache: &dyn SessionCache,
        required: &RequiredRoles,
        current_page: Option<&str>,
    ) -> AuthOutcome {
        let Some(credential) = self.credential(access_token, cache).await else {
            cache::clear_legacy(cache);
            return AuthOutcome::Redirect(Redirect::new(
                &self.pages.login_page,
                RedirectReason::Unauthenticated,
                current_page,
            ));
        };

        let (identity, mode, access_token) = match credential {
            Credential::Token { token, user } => {
                let profile = self.find_profile(&token, &user).await;
                let identity = UserIdentity::from_auth_user(&user, profile.as_ref());
                (identity, AuthMode::Modern, Some(token))
            }
            Credential::Legacy(record) => {
                (UserIdentity::from_legacy(&record), AuthMode::Legacy, None)
            }
        };

        if !authorize(&identity, required) {
            info!(
                user = %identity.name,
                role = %identity.role,
                "Role not permitted on this page"
            );
            return AuthOutcome::Redirect(Redirect::new(
                &self.pages.home_page,
                RedirectReason::Forbidden,
                current_page,
            ));
        }

        cache::store_legacy(cache, &LegacyRecord::from(&identity));
        record_session_resolved(mode.as_str());

        debug!(
            user = %identity.name,
            role = %identity.role,
            mode = mode.as_str(),
            "Session resolved"
        );

        AuthOutcome::Authenticated(SessionContext {
            identity,
            mode,
            access_token,
        })
    }

    /// Clear local session state, revoke the token and send the page to login.
    pub async fn sign_out(
        &self,
        access_token: Option<&str>,
        cache: &dyn SessionCache,
        current_page: Option<&str>,
    ) -> Redirect {
        cache::clear_legacy(cache);
        if let Some(token) = access_token {
            if let Err(e) = self.auth.sign_out(token).await {
                warn!(error = %e, "Token revocation failed during sign-out");
            }
        }
        Redirect::new(&self.pages.login_page, RedirectReason::SignedOut, current_page)
    }

    async fn credential(
        &self,
        access_token: Option<&str>,
        cache: &dyn SessionCache,
    ) -> Option<Credential> {
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            match self.auth.get_user(token).await {
                Ok(Some(user)) => {
                    return Some(Credential::Token {
                        token: token.to_string(),
                        user,
                    })
                }
                Ok(None) => debug!("Access token rejected by auth provider"),
                Err(e) => warn!(error = %e, "Session check failed"),
            }
        }

        cache::load_legacy(cache)
            .filter(LegacyRecord::is_usable)
            .map(Credential::Legacy)
    }

    /// Find the profile row for a token's owner, trying the linked id, then
    /// email, then display name. Each lookup failing only skips that step.
    async fn find_profile(&self, token: &str, user: &AuthUser) -> Option<Profile> {
        let (profile, matched_by) = self.lookup_profile(token, user).await?;

        if matched_by != MatchedBy::AuthId {
            let profiles = Arc::clone(&self.profiles);
            let token = token.to_string();
            let profile_id = profile.id.clone();
            let auth_id = user.id.clone();
            tokio::spawn(async move {
                if let Err(e) = profiles.link_auth_id(&token, &profile_id, &auth_id).await {
                    debug!(profile_id = %profile_id, error = %e, "Failed to link auth id to profile");
                }
            });
        }

        Some(profile)
    }

    async fn lookup_profile(&self, token: &str, user: &AuthUser) -> Option<(Profile, MatchedBy)> {
        match self.profiles.by_auth_id(token, &user.id).await {
            Ok(Some(profile)) => return Some((profile, MatchedBy::AuthId)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Profile fetch failed"),
        }

        if let Some(email) = user.email.as_deref() {
            match self.profiles.by_email(token, email).await {
                Ok(Some(profile)) => return Some((profile, MatchedBy::Email)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Email profile fallback failed"),
            }
        }

        if let Some(name) = user.user_metadata.display_name() {
            match self.profiles.by_name(token, name).await {
                Ok(Some(profile)) => return Some((profile, MatchedBy::Name)),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Name profile fallback failed"),
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cache::{MemorySessionCache, REP_KEY, SESSION_KEY};
    use crate::auth::role::Role;
    use crate::store::memory::{MemoryAuth, MemoryStore};
    use crate::store::UserMetadata;

    fn user(email: &str, full_name: Option<&str>) -> AuthUser {
        AuthUser {
            id: "auth-1".to_string(),
            email: Some(email.to_string()),
            user_metadata: UserMetadata {
                full_name: full_name.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn profile(id: &str, full_name: &str, email: &str, role: &str) -> Profile {
        Profile {
            id: id.to_string(),
            full_name: Some(full_name.to_string()),
            email: Some(email.to_string()),
            role: Some(role.to_string()),
            ..Default::default()
        }
    }

    fn resolver(auth: MemoryAuth, store: Arc<MemoryStore>) -> SessionResolver {
        SessionResolver::new(Arc::new(auth), store, AuthConfig::default())
    }

    fn authenticated(outcome: AuthOutcome) -> SessionContext {
        match outcome {
            AuthOutcome::Authenticated(ctx) => ctx,
            AuthOutcome::Redirect(r) => panic!("expected session, got redirect to {}", r.target),
        }
    }

    fn redirected(outcome: AuthOutcome) -> Redirect {
        match outcome {
            AuthOutcome::Redirect(r) => r,
            AuthOutcome::Authenticated(ctx) => {
                panic!("expected redirect, got session for {}", ctx.identity.name)
            }
        }
    }

    async fn wait_for_links(store: &MemoryStore) -> Vec<(String, String)> {
        for _ in 0..20 {
            if !store.links.lock().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        store.links.lock().clone()
    }

    #[tokio::test]
    async fn test_nothing_presented_redirects_to_login() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(MemoryAuth::default(), store);
        let cache = MemorySessionCache::new();
        cache.set(SESSION_KEY, "stale".to_string());

        let redirect = redirected(
            resolver
                .resolve(None, &cache, &RequiredRoles::Any, Some("/dashboard.html"))
                .await,
        );
        assert_eq!(redirect.target, "login.html");
        assert_eq!(redirect.reason, RedirectReason::Unauthenticated);
        assert!(!redirect.suppressed);
        assert!(cache.get(SESSION_KEY).is_none());
    }

    #[tokio::test]
    async fn test_redirect_suppressed_on_target_page() {
        let resolver = resolver(MemoryAuth::default(), Arc::new(MemoryStore::new()));
        let cache = MemorySessionCache::new();
        let redirect = redirected(
            resolver
                .resolve(None, &cache, &RequiredRoles::Any, Some("/app/login.html"))
                .await,
        );
        assert!(redirect.suppressed);
    }

    #[tokio::test]
    async fn test_linked_profile_is_used_without_relinking() {
        let mut linked = profile("p-1", "John Smith", "john@example.com", "gsm");
        linked.auth_id = Some("auth-1".to_string());
        let store = Arc::new(MemoryStore::with_profiles(vec![linked]));
        let auth = MemoryAuth::with_user("tok", user("john@example.com", None));
        let resolver = resolver(auth, store.clone());
        let cache = MemorySessionCache::new();

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.mode, AuthMode::Modern);
        assert_eq!(ctx.identity.role, Role::Manager);
        assert_eq!(ctx.identity.profile_id.as_deref(), Some("p-1"));
        assert_eq!(ctx.access_token(), Some("tok"));

        tokio::task::yield_now().await;
        assert!(store.links.lock().is_empty());
    }

    #[tokio::test]
    async fn test_email_match_links_auth_id() {
        let store = Arc::new(MemoryStore::with_profiles(vec![profile(
            "p-2",
            "Dana Lee",
            "Dana.Lee@Example.com",
            "admin",
        )]));
        let auth = MemoryAuth::with_user("tok", user("dana.lee@example.com", None));
        let resolver = resolver(auth, store.clone());
        let cache = MemorySessionCache::new();

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.identity.name, "Dana Lee");
        assert_eq!(ctx.identity.role, Role::Admin);

        let links = wait_for_links(&store).await;
        assert_eq!(links, vec![("p-2".to_string(), "auth-1".to_string())]);
    }

    #[tokio::test]
    async fn test_failed_link_still_authenticates() {
        let store = Arc::new(MemoryStore::with_profiles(vec![profile(
            "p-4",
            "Lee Chan",
            "lee@example.com",
            "admin",
        )]));
        *store.fail_link.lock() = true;
        let auth = MemoryAuth::with_user("tok", user("lee@example.com", None));
        let resolver = resolver(auth, store.clone());
        let cache = MemorySessionCache::new();

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.mode, AuthMode::Modern);
        assert_eq!(ctx.identity.profile_id.as_deref(), Some("p-4"));
        assert_eq!(ctx.identity.role, Role::Admin);

        let links = wait_for_links(&store).await;
        assert_eq!(links, vec![("p-4".to_string(), "auth-1".to_string())]);
        assert_eq!(store.profiles.lock()[0].auth_id, None);
    }

    #[tokio::test]
    async fn test_failed_lookup_does_not_abort_chain() {
        let store = Arc::new(MemoryStore::with_profiles(vec![profile(
            "p-3",
            "Sam Ortiz",
            "sam@elsewhere.com",
            "manager",
        )]));
        store.fail_lookup("auth_id");
        store.fail_lookup("email");
        let auth = MemoryAuth::with_user("tok", user("sam@example.com", Some("sam ortiz")));
        let resolver = resolver(auth, store.clone());
        let cache = MemorySessionCache::new();

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.identity.profile_id.as_deref(), Some("p-3"));
        assert_eq!(ctx.identity.role, Role::Manager);

        let links = wait_for_links(&store).await;
        assert_eq!(links.len(), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_name_is_not_a_match() {
        let store = Arc::new(MemoryStore::with_profiles(vec![
            profile("p-4", "Chris Hall", "c1@example.com", "admin"),
            profile("p-5", "Chris Hall", "c2@example.com", "sales"),
        ]));
        let auth = MemoryAuth::with_user("tok", user("chall@example.com", Some("Chris Hall")));
        let resolver = resolver(auth, store);
        let cache = MemorySessionCache::new();

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert!(ctx.identity.profile_id.is_none());
        assert_eq!(ctx.identity.name, "Chris Hall");
        assert_eq!(ctx.identity.role, Role::Sales);
    }

    #[tokio::test]
    async fn test_no_profile_uses_email_local_part() {
        let store = Arc::new(MemoryStore::new());
        let auth = MemoryAuth::with_user("tok", user("kim.park@example.com", None));
        let resolver = resolver(auth, store);
        let cache = MemorySessionCache::new();

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.identity.name, "kim.park");
        assert_eq!(ctx.identity.role, Role::Sales);
    }

    #[tokio::test]
    async fn test_rejected_token_falls_back_to_legacy() {
        let resolver = resolver(MemoryAuth::default(), Arc::new(MemoryStore::new()));
        let cache = MemorySessionCache::with_legacy(&LegacyRecord {
            name: "Pat Jones".to_string(),
            role: Some("manager".to_string()),
            initials: Some("PJ".to_string()),
            ..Default::default()
        });

        let ctx = authenticated(
            resolver
                .resolve(Some("expired"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.mode, AuthMode::Legacy);
        assert_eq!(ctx.identity.role, Role::Manager);
        assert!(ctx.identity.id.is_none());
        assert!(ctx.access_token().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_provider_falls_back_to_legacy() {
        let auth = MemoryAuth {
            unreachable: true,
            ..Default::default()
        };
        let resolver = resolver(auth, Arc::new(MemoryStore::new()));
        let cache = MemorySessionCache::with_legacy(&LegacyRecord {
            name: "Pat Jones".to_string(),
            ..Default::default()
        });

        let ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(ctx.mode, AuthMode::Legacy);
    }

    #[tokio::test]
    async fn test_legacy_record_without_name_is_unauthenticated() {
        let resolver = resolver(MemoryAuth::default(), Arc::new(MemoryStore::new()));
        let cache = MemorySessionCache::with_legacy(&LegacyRecord {
            name: "  ".to_string(),
            role: Some("admin".to_string()),
            ..Default::default()
        });

        let redirect = redirected(
            resolver
                .resolve(None, &cache, &RequiredRoles::Any, None)
                .await,
        );
        assert_eq!(redirect.reason, RedirectReason::Unauthenticated);
        assert!(cache.get(REP_KEY).is_none());
    }

    #[tokio::test]
    async fn test_role_gate_redirects_home_without_mirroring() {
        let auth = MemoryAuth::with_user("tok", user("rep@example.com", None));
        let resolver = resolver(auth, Arc::new(MemoryStore::new()));
        let cache = MemorySessionCache::new();

        let redirect = redirected(
            resolver
                .resolve(
                    Some("tok"),
                    &cache,
                    &RequiredRoles::one_of(["Manager", "Admin"]),
                    None,
                )
                .await,
        );
        assert_eq!(redirect.target, "app.html");
        assert_eq!(redirect.reason, RedirectReason::Forbidden);
        assert!(cache.get(REP_KEY).is_none());
    }

    #[tokio::test]
    async fn test_identity_mirrored_into_cache() {
        let store = Arc::new(MemoryStore::with_profiles(vec![profile(
            "p-6",
            "Alex Kim",
            "alex@example.com",
            "Administrator",
        )]));
        let auth = MemoryAuth::with_user("tok", user("alex@example.com", None));
        let resolver = resolver(auth, store);
        let cache = MemorySessionCache::new();

        let _ctx = authenticated(
            resolver
                .resolve(Some("tok"), &cache, &RequiredRoles::Any, None)
                .await,
        );
        let mirrored = cache::load_legacy(&cache).unwrap();
        assert_eq!(mirrored.name, "Alex Kim");
        assert_eq!(mirrored.role.as_deref(), Some("Admin"));
        assert_eq!(mirrored.initials.as_deref(), Some("AK"));
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache_and_revokes() {
        let auth = Arc::new(MemoryAuth::default());
        let resolver = SessionResolver::new(
            auth.clone(),
            Arc::new(MemoryStore::new()),
            AuthConfig::default(),
        );
        let cache = MemorySessionCache::with_legacy(&LegacyRecord {
            name: "Pat".to_string(),
            ..Default::default()
        });

        let redirect = resolver.sign_out(Some("tok"), &cache, None).await;
        assert_eq!(redirect.reason, RedirectReason::SignedOut);
        assert_eq!(redirect.target, "login.html");
        assert!(cache.snapshot().is_empty());
        assert_eq!(*auth.signed_out.lock(), vec!["tok".to_string()]);
    }

    #[test]
    fn test_auth_events() {
        let pages = AuthConfig::default();
        let mut ctx = SessionContext {
            identity: UserIdentity::from_legacy(&LegacyRecord {
                name: "Pat".to_string(),
                ..Default::default()
            }),
            mode: AuthMode::Modern,
            access_token: Some("old".to_string()),
        };

        assert!(ctx
            .apply(AuthEvent::TokenRefreshed(Some("new".to_string())), &pages)
            .is_none());
        assert_eq!(ctx.access_token(), Some("new"));

        let redirect = ctx.apply(AuthEvent::TokenRefreshed(None), &pages).unwrap();
        assert_eq!(redirect.target, "login.html");

        let redirect = ctx.apply(AuthEvent::SignedOut, &pages).unwrap();
        assert_eq!(redirect.reason, RedirectReason::SignedOut);
    }

    #[test]
    fn test_legacy_session_cannot_make_store_requests() {
        let pages = AuthConfig::default();
        let client = RestClient::new(&crate::config::StoreConfig::default());
        let ctx = SessionContext {
            identity: UserIdentity::from_legacy(&LegacyRecord {
                name: "Pat".to_string(),
                ..Default::default()
            }),
            mode: AuthMode::Legacy,
            access_token: None,
        };
        let err = ctx
            .request(&client, Method::GET, "/rest/v1/leads", &pages)
            .unwrap_err();
        assert_eq!(err.target, "login.html");
    }
}

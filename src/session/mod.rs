//! Session resolution, route guards and permissions.
//!
//! The identity provider owns sign-in. We only read the session it issued,
//! decide whether a path needs one, and map users to roles and permissions.

pub mod clerk;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::convert::Infallible;

use crate::config::AppConfig;
use crate::db::models::{NewUser, Role, User};
use crate::i18n::Locale;
use crate::state::AppState;

pub use clerk::ClerkSessions;

/// The signed-in user as described by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image_url: Option<String>,
}

impl SessionUser {
    /// Row to upsert on first login. Allow-listed e-mails start as admins.
    pub fn to_new_user(&self, config: &AppConfig) -> NewUser {
        let role = if config.is_admin_email(&self.email) {
            Role::Admin
        } else {
            Role::Client
        };
        NewUser {
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_url: self.image_url.clone(),
            role: role.as_str().to_string(),
            clerk_user_id: self.user_id.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `None` for anonymous requests and for any token that fails verification.
    async fn current_user(&self, headers: &HeaderMap) -> Option<SessionUser>;
}

/// Provider that returns the same answer for every request. Used when the identity
/// provider is not configured (every request is anonymous) and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedSession(pub Option<SessionUser>);

impl FixedSession {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self(Some(user))
    }
}

#[async_trait]
impl SessionProvider for FixedSession {
    async fn current_user(&self, _headers: &HeaderMap) -> Option<SessionUser> {
        self.0.clone()
    }
}

/// Admin if the e-mail is allow-listed or the stored role says so.
pub fn is_admin(config: &AppConfig, session: &SessionUser, db_user: Option<&User>) -> bool {
    config.is_admin_email(&session.email) || db_user.map(User::is_admin).unwrap_or(false)
}

// ============================================================================
// Permissions
// ============================================================================

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Permission {
    pub id: &'static str,
    pub label: &'static str,
    pub category: &'static str,
}

pub const PERMISSIONS: &[Permission] = &[
    Permission { id: "dashboard.view", label: "Voir le tableau de bord", category: "Dashboard" },
    Permission { id: "dashboard.admin", label: "Admin tableau de bord", category: "Dashboard" },
    Permission { id: "users.view", label: "Voir les utilisateurs", category: "Utilisateurs" },
    Permission { id: "users.edit", label: "Modifier les utilisateurs", category: "Utilisateurs" },
    Permission { id: "users.delete", label: "Supprimer les utilisateurs", category: "Utilisateurs" },
    Permission { id: "clusters.view", label: "Voir les clusters", category: "Clusters" },
    Permission { id: "clusters.create", label: "Créer des clusters", category: "Clusters" },
    Permission { id: "clusters.edit", label: "Modifier les clusters", category: "Clusters" },
    Permission { id: "clusters.delete", label: "Supprimer les clusters", category: "Clusters" },
    Permission { id: "billing.view", label: "Voir la facturation", category: "Facturation" },
    Permission { id: "billing.manage", label: "Gérer la facturation", category: "Facturation" },
    Permission { id: "settings.view", label: "Voir les paramètres", category: "Paramètres" },
    Permission { id: "settings.edit", label: "Modifier les paramètres", category: "Paramètres" },
];

pub fn is_known_permission(id: &str) -> bool {
    PERMISSIONS.iter().any(|p| p.id == id)
}

/// Admins hold every permission implicitly.
pub fn has_permission(user: &User, permission: &str) -> bool {
    user.is_admin() || user.permissions.iter().any(|p| p == permission)
}

// ============================================================================
// Route guards
// ============================================================================

pub const PROTECTED_ROUTES: &[&str] = &[
    "/fr/dashboard(.*)",
    "/en/dashboard(.*)",
    "/fr/profile(.*)",
    "/en/profile(.*)",
];

/// `base(.*)` matches `base` and anything under `base/`; other patterns are exact.
fn route_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("(.*)") {
        Some(base) => path == base || path.starts_with(&format!("{}/", base)),
        None => path == pattern,
    }
}

pub fn is_protected_route(path: &str) -> bool {
    PROTECTED_ROUTES.iter().any(|r| route_matches(r, path))
}

/// Locale from the first path segment, or the configured default.
pub fn locale_of(path: &str, fallback: Locale) -> Locale {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .unwrap_or(fallback)
}

/// Session attached to the request by [`resolve_session`].
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolve the session once per request and send anonymous visitors of protected
/// pages to the localized login page.
pub async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = state.sessions.current_user(request.headers()).await;
    let path = request.uri().path().to_string();

    if user.is_none() && is_protected_route(&path) {
        let locale = locale_of(&path, state.config.default_locale);
        tracing::debug!(path = %path, "Anonymous request to protected route");
        return Redirect::temporary(&locale.path("/login")).into_response();
    }

    request.extensions_mut().insert(CurrentSession(user));
    next.run(request).await
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_email_list;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(role: &str, permissions: &[&str]) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "jane@soloflow.io".to_string(),
            first_name: None,
            last_name: None,
            avatar_url: None,
            role: role.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            clerk_user_id: Some("user_1".to_string()),
            subscription_plan: "free".to_string(),
            stripe_customer_id: None,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_route_matching_convention() {
        assert!(route_matches("/fr/login(.*)", "/fr/login/factor-one"));
        assert!(!route_matches("/fr/login(.*)", "/fr/loginx"));
        assert!(route_matches("/health", "/health"));
        assert!(!route_matches("/health", "/health/ready"));

        assert!(is_protected_route("/fr/dashboard"));
        assert!(is_protected_route("/en/dashboard/admin"));
        assert!(is_protected_route("/fr/profile"));
        assert!(!is_protected_route("/fr/dashboardx"));
        assert!(!is_protected_route("/fr"));
        assert!(!is_protected_route("/api/dashboard"));
    }

    #[test]
    fn test_locale_of_path() {
        assert_eq!(locale_of("/en/dashboard", Locale::Fr), Locale::En);
        assert_eq!(locale_of("/de/dashboard", Locale::Fr), Locale::Fr);
        assert_eq!(locale_of("/", Locale::En), Locale::En);
    }

    #[test]
    fn test_has_permission() {
        assert!(has_permission(&user("admin", &[]), "users.delete"));
        assert!(has_permission(&user("client", &["billing.view"]), "billing.view"));
        assert!(!has_permission(&user("client", &["billing.view"]), "billing.manage"));
    }

    #[test]
    fn test_permission_catalogue() {
        assert_eq!(PERMISSIONS.len(), 13);
        assert!(is_known_permission("clusters.create"));
        assert!(!is_known_permission("clusters.destroy"));
    }

    #[test]
    fn test_new_user_role_from_allow_list() {
        let config = AppConfig {
            admin_emails: parse_email_list("boss@soloflow.io"),
            ..AppConfig::default()
        };
        let boss = testing::session_user("user_1", "Boss@soloflow.io");
        let other = testing::session_user("user_2", "jane@soloflow.io");
        assert_eq!(boss.to_new_user(&config).role, "admin");
        assert_eq!(other.to_new_user(&config).role, "client");
        assert!(is_admin(&config, &boss, None));
        assert!(!is_admin(&config, &other, None));
        assert!(is_admin(&config, &other, Some(&user("admin", &[]))));
    }
}

/**
 * Authentication Routes
 * Landing, sign-in/sign-up pages, provider callbacks and sign-out.
 * Credentials never reach this server; the identity provider hosts the forms.
 */
use axum::{
    extract::{Path, State},
    http::header,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};

use super::page_locale;
use crate::i18n::Locale;
use crate::session::clerk::{CLIENT_UAT_COOKIE, SESSION_COOKIE};
use crate::session::CurrentSession;
use crate::state::AppState;
use crate::views::{self, components, escape_html, Page};

/// Hosted page URL with the absolute post-sign-in callback attached.
fn hosted_url(state: &AppState, hosted: Option<&str>, locale: Locale) -> Option<String> {
    let base = hosted?;
    let callback = state.config.absolute_url(&locale.path("/sso-callback"));
    match reqwest::Url::parse_with_params(base, &[("redirect_url", callback.as_str())]) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::warn!(url = %base, error = %e, "Invalid hosted sign-in URL");
            None
        }
    }
}

fn auth_page(state: &AppState, locale: Locale, path: &str, sign_up: bool) -> Response {
    let dict = locale.dict();
    let clerk = &state.config.clerk;
    let (title, hosted) = if sign_up {
        (dict.sign_up, clerk.sign_up_url.as_deref())
    } else {
        (dict.sign_in, clerk.sign_in_url.as_deref())
    };

    let body = match hosted_url(state, hosted, locale).filter(|_| clerk.is_enabled()) {
        Some(url) => {
            let url = escape_html(&url);
            let other = if sign_up {
                format!(r#"<a href="{}">{}</a>"#, locale.path("/login"), dict.sign_in)
            } else {
                format!(r#"<a href="{}">{}</a>"#, locale.path("/register"), dict.sign_up)
            };
            components::card(
                title,
                &format!(
                    concat!(
                        r#"<p><a class="button" href="{url}">{title}</a></p>"#,
                        r#"<p><a class="button google" href="{url}">{google}</a></p>"#,
                        "<p>{other}</p>"
                    ),
                    url = url,
                    title = escape_html(title),
                    google = dict.continue_with_google,
                    other = other,
                ),
            )
        }
        None => components::error_card(title, "Authentication is not configured."),
    };

    views::render(
        Page {
            locale,
            title,
            signed_in_as: None,
            path,
        },
        &body,
    )
    .into_response()
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&state.config.default_locale.path("/"))
}

/// GET /{lang}
pub async fn landing(
    Path(lang): Path<String>,
    session: CurrentSession,
) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    let dict = locale.dict();
    let name = session.0.as_ref().map(|u| u.display_name());

    let cta = match &name {
        Some(_) => format!(r#"<a class="button" href="{}">Dashboard</a>"#, locale.path("/dashboard")),
        None => format!(
            r#"<a class="button" href="{}">{}</a> <a href="{}">{}</a>"#,
            locale.path("/login"),
            dict.sign_in,
            locale.path("/register"),
            dict.sign_up
        ),
    };
    let body = format!(
        "<h1>{}</h1><p>{}</p><p>{}</p>",
        dict.app_name, dict.tagline, cta
    );

    views::render(
        Page {
            locale,
            title: dict.app_name,
            signed_in_as: name.as_deref(),
            path: "/",
        },
        &body,
    )
    .into_response()
}

/// GET /{lang}/login
pub async fn login_page(
    State(state): State<AppState>,
    Path(lang): Path<String>,
    session: CurrentSession,
) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    if session.0.is_some() {
        return Redirect::temporary(&locale.path("/dashboard")).into_response();
    }
    auth_page(&state, locale, "/login", false)
}

/// GET /{lang}/register
pub async fn register_page(
    State(state): State<AppState>,
    Path(lang): Path<String>,
    session: CurrentSession,
) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    if session.0.is_some() {
        return Redirect::temporary(&locale.path("/dashboard")).into_response();
    }
    auth_page(&state, locale, "/register", true)
}

/// GET /{lang}/sso-callback and /{lang}/oauth/callback/google
///
/// The provider has already set the session cookie; continue to the dashboard,
/// which routes by role.
pub async fn sign_in_callback(Path(lang): Path<String>) -> Response {
    match page_locale(&lang) {
        Ok(locale) => Redirect::temporary(&locale.path("/dashboard")).into_response(),
        Err(r) => r,
    }
}

/// POST /{lang}/logout
pub async fn logout(Path(lang): Path<String>, session: CurrentSession) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    if let Some(user) = &session.0 {
        tracing::info!(user_id = %user.user_id, "User signed out");
    }

    (
        AppendHeaders([
            (
                header::SET_COOKIE,
                format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", SESSION_COOKIE),
            ),
            (
                header::SET_COOKIE,
                format!("{}=0; Path=/; Max-Age=0; SameSite=Lax", CLIENT_UAT_COOKIE),
            ),
        ]),
        Redirect::to(&locale.path("/login")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app_with, get, location, send};
    use crate::session::testing::session_user;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_root_redirects_to_default_locale() {
        let (app, _) = app_with(None);
        let (status, headers, _) = get(app, "/").await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&headers), "/fr");
    }

    #[tokio::test]
    async fn test_landing_renders_for_anonymous() {
        let (app, _) = app_with(None);
        let (status, _, body) = get(app, "/en").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Automate your content"));
        assert!(body.contains(r#"href="/en/login""#));
    }

    #[tokio::test]
    async fn test_unknown_locale_is_not_found() {
        let (app, _) = app_with(None);
        let (status, _, _) = get(app, "/de/login").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_login_redirects_signed_in_user() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, headers, _) = get(app, "/en/login").await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&headers), "/en/dashboard");
    }

    #[tokio::test]
    async fn test_login_renders_for_anonymous() {
        let (app, _) = app_with(None);
        let (status, _, body) = get(app, "/fr/login").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Se connecter"));
    }

    #[tokio::test]
    async fn test_oauth_callback_goes_to_dashboard() {
        let (app, _) = app_with(None);
        let (status, headers, _) = get(app, "/en/oauth/callback/google").await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&headers), "/en/dashboard");
    }

    #[tokio::test]
    async fn test_logout_clears_cookies() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let req = Request::post("/fr/logout").body(Body::empty()).unwrap();
        let (status, headers, _) = send(app, req).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/fr/login");
        let cookies: Vec<_> = headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("__session=;") && c.contains("Max-Age=0")));
        assert!(cookies.iter().any(|c| c.starts_with("__client_uat=0")));
    }
}

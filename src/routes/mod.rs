/**
 * Routes Module
 * Page handlers (locale-prefixed HTML) and JSON API handlers
 */

pub mod admin;
pub mod auth;
pub mod billing;
pub mod content;
pub mod dashboard;
pub mod health;
pub mod profile;
pub mod projects;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use std::str::FromStr;

use crate::db::{models::User, queries};
use crate::i18n::Locale;
use crate::session::{CurrentSession, SessionUser};
use crate::state::AppState;

/// JSON error body: `{"error": "..."}`
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, serde::Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: None,
        }),
    )
}

// ============================================================================
// Page helpers
// ============================================================================

/// Locale from the `{lang}` path segment. Unknown locales are a 404.
pub fn page_locale(lang: &str) -> Result<Locale, Response> {
    lang.parse::<Locale>().map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            Html("<!DOCTYPE html><html><body><h1>404</h1></body></html>".to_string()),
        )
            .into_response()
    })
}

/// The signed-in user, or a redirect to the localized login page.
pub fn require_session(session: CurrentSession, locale: Locale) -> Result<SessionUser, Response> {
    session
        .0
        .ok_or_else(|| Redirect::temporary(&locale.path("/login")).into_response())
}

// ============================================================================
// API helpers
// ============================================================================

pub fn require_api_session(session: CurrentSession) -> Result<SessionUser, ApiError> {
    session
        .0
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))
}

/// Database row for the session user, provisioning it on first use.
pub async fn require_api_user(state: &AppState, session: CurrentSession) -> Result<User, ApiError> {
    let session_user = require_api_session(session)?;
    queries::ensure_user(state.store(), session_user.to_new_user(&state.config))
        .await
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "User data unavailable"))
}

/// Parse an optional text-enum field, using `default` when it is absent.
pub fn parse_field<T>(value: Option<&str>, default: T) -> Result<T, ApiError>
where
    T: FromStr<Err = String>,
{
    match value {
        Some(v) => v.parse().map_err(|e: String| api_error(StatusCode::BAD_REQUEST, &e)),
        None => Ok(default),
    }
}

/**
 * Profile Routes
 * The signed-in user's account details and editable profile
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::{api_error, page_locale, require_api_user, require_session, ApiError};
use crate::db::models::{NewActivity, ProfileUpdate, User, UserProfile};
use crate::db::queries;
use crate::i18n::Locale;
use crate::session::CurrentSession;
use crate::state::AppState;
use crate::views::{self, components, escape_html, Page};

const MAX_FULL_NAME_LENGTH: usize = 120;

fn render_profile(user: &User, profile: Option<&UserProfile>, locale: Locale) -> String {
    let dict = locale.dict();
    let full_name = profile
        .and_then(|p| p.full_name.clone())
        .unwrap_or_else(|| user.display_name());
    let preferred = profile
        .and_then(|p| p.locale.as_deref())
        .unwrap_or(locale.as_str());

    let avatar = profile
        .and_then(|p| p.avatar_url.as_deref())
        .or(user.avatar_url.as_deref())
        .map(|url| format!(r#"<img class="avatar" src="{}" alt="">"#, escape_html(url)))
        .unwrap_or_default();

    let rows = [
        ("Name", escape_html(&full_name)),
        ("E-mail", escape_html(&user.email)),
        ("Role", components::badge(&user.role)),
        (dict.current_plan, escape_html(&user.subscription_plan)),
        ("Locale", escape_html(preferred)),
        ("Member since", user.created_at.format("%d/%m/%Y").to_string()),
    ]
    .iter()
    .map(|(label, value)| format!("<dt>{}</dt><dd>{}</dd>", escape_html(label), value))
    .collect::<String>();

    format!(
        "<h1>{}</h1><p>{}</p>{}",
        dict.profile_title,
        dict.profile_description,
        components::card(&full_name, &format!("{}<dl>{}</dl>", avatar, rows)),
    )
}

/// GET /{lang}/profile
pub async fn profile_page(
    State(state): State<AppState>,
    Path(lang): Path<String>,
    session: CurrentSession,
) -> Response {
    let locale = match page_locale(&lang) {
        Ok(l) => l,
        Err(r) => return r,
    };
    let session_user = match require_session(session, locale) {
        Ok(u) => u,
        Err(r) => return r,
    };
    let dict = locale.dict();
    let name = session_user.display_name();

    let store = state.store();
    let body = match queries::ensure_user(store, session_user.to_new_user(&state.config)).await {
        Some(user) => {
            let profile = queries::get_user_profile(store, user.id).await;
            render_profile(&user, profile.as_ref(), locale)
        }
        None => components::error_card(dict.load_error_title, dict.load_error_body),
    };

    views::render(
        Page {
            locale,
            title: dict.profile_title,
            signed_in_as: Some(&name),
            path: "/profile",
        },
        &body,
    )
    .into_response()
}

fn validate_profile(update: &ProfileUpdate) -> Result<(), ApiError> {
    if let Some(name) = &update.full_name {
        if name.chars().count() > MAX_FULL_NAME_LENGTH {
            return Err(api_error(StatusCode::BAD_REQUEST, "Full name is too long"));
        }
    }
    if let Some(url) = &update.avatar_url {
        reqwest::Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid avatar URL"))?;
    }
    Ok(())
}

async fn update_profile_inner(
    state: &AppState,
    session: CurrentSession,
    mut update: ProfileUpdate,
) -> Result<UserProfile, ApiError> {
    let user = require_api_user(state, session).await?;
    update.full_name = update.full_name.map(|n| n.trim().to_string());
    validate_profile(&update)?;
    update.locale = update
        .locale
        .map(|l| l.parse::<Locale>().map(|l| l.as_str().to_string()))
        .transpose()
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Unsupported locale"))?;

    let store = state.store();
    let profile = queries::upsert_user_profile(store, user.id, update)
        .await
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to update profile"))?;
    queries::log_activity(
        store,
        NewActivity::success(user.id, "profile_updated", "user", user.id),
    )
    .await;
    Ok(profile)
}

/// PATCH /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    match update_profile_inner(&state, session, update).await {
        Ok(profile) => Json(profile).into_response(),
        Err(e) => e.into_response(),
    }
}

/**
 * Content Routes
 * Content generations and their social-post publishing rows
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{api_error, parse_field, require_api_user, ApiError};
use crate::db::models::{
    ContentGeneration, NewActivity, NewContentGeneration, NewSocialPost, PostStatus, SocialPost,
    SocialPostUpdate, User,
};
use crate::db::queries;
use crate::session::CurrentSession;
use crate::state::AppState;

static PLATFORM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{1,31}$").unwrap());

const DEFAULT_GENERATION_STATUS: &str = "completed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentRequest {
    pub original_image_url: String,
    pub extracted_text: Option<String>,
    pub user_comment: Option<String>,
    pub generated_content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub platform: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub status: Option<String>,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContentDetail {
    #[serde(flatten)]
    pub generation: ContentGeneration,
    pub posts: Vec<SocialPost>,
}

async fn owned_generation(
    state: &AppState,
    user: &User,
    id: Uuid,
) -> Result<ContentGeneration, ApiError> {
    queries::get_content_generation(state.store(), id)
        .await
        .filter(|g| g.user_id == user.id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Content not found"))
}

/// GET /api/content
pub async fn list_content(State(state): State<AppState>, session: CurrentSession) -> Response {
    match require_api_user(&state, session).await {
        Ok(user) => {
            Json(queries::get_user_content_generations(state.store(), user.id).await)
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn create_content_inner(
    state: &AppState,
    session: CurrentSession,
    payload: CreateContentRequest,
) -> Result<ContentGeneration, ApiError> {
    let user = require_api_user(state, session).await?;
    let image_url = reqwest::Url::parse(payload.original_image_url.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Invalid image URL"))?;

    let store = state.store();
    let generation = queries::create_content_generation(
        store,
        NewContentGeneration {
            user_id: user.id,
            original_image_url: image_url.to_string(),
            extracted_text: payload.extracted_text,
            user_comment: payload.user_comment,
            generated_content: payload
                .generated_content
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            status: DEFAULT_GENERATION_STATUS.to_string(),
        },
    )
    .await
    .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to save content"))?;

    queries::log_activity(
        store,
        NewActivity::success(user.id, "content_generated", "content", generation.id),
    )
    .await;
    Ok(generation)
}

/// POST /api/content
pub async fn create_content(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(payload): Json<CreateContentRequest>,
) -> Response {
    match create_content_inner(&state, session, payload).await {
        Ok(generation) => (StatusCode::CREATED, Json(generation)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/content/{id} - a generation with its posts
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CurrentSession,
) -> Response {
    let user = match require_api_user(&state, session).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };
    match owned_generation(&state, &user, id).await {
        Ok(generation) => {
            let posts = queries::get_generation_posts(state.store(), generation.id).await;
            Json(ContentDetail { generation, posts }).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn create_post_inner(
    state: &AppState,
    session: CurrentSession,
    generation_id: Uuid,
    payload: CreatePostRequest,
) -> Result<SocialPost, ApiError> {
    let user = require_api_user(state, session).await?;
    let generation = owned_generation(state, &user, generation_id).await?;

    let platform = payload.platform.trim().to_lowercase();
    if !PLATFORM_RE.is_match(&platform) {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid platform"));
    }
    let status = parse_field(payload.status.as_deref(), PostStatus::Pending)?;

    queries::create_social_post(
        state.store(),
        NewSocialPost {
            content_generation_id: generation.id,
            platform,
            status: status.as_str().to_string(),
        },
    )
    .await
    .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to create post"))
}

/// POST /api/content/{id}/posts
pub async fn create_post(
    State(state): State<AppState>,
    Path(generation_id): Path<Uuid>,
    session: CurrentSession,
    Json(payload): Json<CreatePostRequest>,
) -> Response {
    match create_post_inner(&state, session, generation_id, payload).await {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_post_inner(
    state: &AppState,
    session: CurrentSession,
    id: Uuid,
    payload: UpdatePostRequest,
) -> Result<SocialPost, ApiError> {
    let user = require_api_user(state, session).await?;
    let status = payload
        .status
        .as_deref()
        .map(str::parse::<PostStatus>)
        .transpose()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, &e))?;

    let store = state.store();
    let post = queries::get_social_post(store, id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Post not found"))?;
    owned_generation(state, &user, post.content_generation_id)
        .await
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Post not found"))?;

    let published_at = match status {
        Some(PostStatus::Published) if post.published_at.is_none() => Some(Utc::now()),
        _ => None,
    };
    let update = SocialPostUpdate {
        status: status.map(|s| s.as_str().to_string()),
        platform_post_id: payload.platform_post_id,
        error_message: payload.error_message,
        published_at,
    };

    let post = queries::update_social_post(store, id, update)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Post not found"))?;
    if status == Some(PostStatus::Published) {
        tracing::info!(post_id = %post.id, platform = %post.platform, "Social post published");
    }
    Ok(post)
}

/// PATCH /api/posts/{id}
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CurrentSession,
    Json(payload): Json<UpdatePostRequest>,
) -> Response {
    match update_post_inner(&state, session, id, payload).await {
        Ok(post) => Json(post).into_response(),
        Err(e) => e.into_response(),
    }
}

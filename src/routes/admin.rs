/**
 * Admin Routes
 * User management for administrators: list, change role/permissions, delete
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{api_error, require_api_session, ApiError, SuccessResponse};
use crate::db::models::{NewActivity, Role, User, UserUpdate};
use crate::db::queries;
use crate::session::{self, CurrentSession, Permission, PERMISSIONS};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub permissions: &'static [Permission],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub permissions: Option<Vec<String>>,
}

/// The acting user, provided they are an administrator.
async fn require_admin(state: &AppState, session: CurrentSession) -> Result<User, ApiError> {
    let session_user = require_api_session(session)?;
    let actor = queries::ensure_user(state.store(), session_user.to_new_user(&state.config))
        .await
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "User data unavailable"))?;

    if !session::is_admin(&state.config, &session_user, Some(&actor)) {
        tracing::warn!(user_id = %actor.id, "Admin API access denied");
        return Err(api_error(StatusCode::FORBIDDEN, "Forbidden"));
    }
    Ok(actor)
}

fn validate_update(actor: &User, target: Uuid, req: &UpdateUserRequest) -> Result<(), ApiError> {
    if let Some(role) = &req.role {
        let role: Role = role
            .parse()
            .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, &e))?;
        if target == actor.id && role.as_str() != actor.role {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "You cannot change your own role",
            ));
        }
    }
    if let Some(permissions) = &req.permissions {
        if let Some(unknown) = permissions.iter().find(|p| !session::is_known_permission(p)) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                &format!("Unknown permission: {}", unknown),
            ));
        }
    }
    Ok(())
}

/// GET /api/admin/users
pub async fn list_users(State(state): State<AppState>, session: CurrentSession) -> Response {
    if let Err(e) = require_admin(&state, session).await {
        return e.into_response();
    }
    let users = queries::get_all_users(state.store()).await;
    (
        StatusCode::OK,
        Json(UserListResponse {
            users,
            permissions: PERMISSIONS,
        }),
    )
        .into_response()
}

/// PATCH /api/admin/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CurrentSession,
    Json(payload): Json<UpdateUserRequest>,
) -> Response {
    let actor = match require_admin(&state, session).await {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = validate_update(&actor, id, &payload) {
        return e.into_response();
    }

    let mut permissions = payload.permissions;
    if let Some(list) = permissions.as_mut() {
        list.sort();
        list.dedup();
    }
    let update = UserUpdate {
        first_name: payload.first_name,
        last_name: payload.last_name,
        role: payload.role,
        permissions,
    };

    let store = state.store();
    match queries::update_user(store, id, update).await {
        Some(user) => {
            tracing::info!(actor = %actor.id, target = %id, role = %user.role, "User updated by admin");
            queries::log_activity(store, NewActivity::success(actor.id, "user_updated", "user", id))
                .await;
            (StatusCode::OK, Json(user)).into_response()
        }
        None => api_error(StatusCode::NOT_FOUND, "User not found").into_response(),
    }
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CurrentSession,
) -> Response {
    let actor = match require_admin(&state, session).await {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };
    if actor.id == id {
        return api_error(StatusCode::BAD_REQUEST, "You cannot delete your own account")
            .into_response();
    }

    let store = state.store();
    if queries::delete_user(store, id).await {
        tracing::info!(actor = %actor.id, target = %id, "User deleted by admin");
        queries::log_activity(store, NewActivity::success(actor.id, "user_deleted", "user", id))
            .await;
        (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "User not found").into_response()
    }
}

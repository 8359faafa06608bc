/**
 * Project Routes
 * Projects and their services for the signed-in user
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{api_error, parse_field, require_api_user, ApiError};
use crate::db::models::{
    NewActivity, NewProject, NewService, Project, ProjectStatus, Service, ServiceStatus,
    ServiceType, User,
};
use crate::db::queries;
use crate::session::CurrentSession;
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub status: Option<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub status: String,
}

fn validate_name(name: &str, what: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("{} name is required", what),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("{} name is too long", what),
        ));
    }
    Ok(name.to_string())
}

/// The project, if it exists and belongs to `user`. Foreign projects read as missing.
async fn owned_project(state: &AppState, user: &User, id: Uuid) -> Result<Project, ApiError> {
    queries::get_project(state.store(), id)
        .await
        .filter(|p| p.user_id == user.id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Project not found"))
}

async fn owned_service(state: &AppState, user: &User, id: Uuid) -> Result<Service, ApiError> {
    let service = queries::get_service(state.store(), id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Service not found"))?;
    owned_project(state, user, service.project_id)
        .await
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Service not found"))?;
    Ok(service)
}

/// GET /api/projects
pub async fn list_projects(State(state): State<AppState>, session: CurrentSession) -> Response {
    match require_api_user(&state, session).await {
        Ok(user) => Json(queries::get_user_projects(state.store(), user.id).await).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_project_inner(
    state: &AppState,
    session: CurrentSession,
    payload: CreateProjectRequest,
) -> Result<Project, ApiError> {
    let user = require_api_user(state, session).await?;
    let name = validate_name(&payload.name, "Project")?;
    let status = parse_field(payload.status.as_deref(), ProjectStatus::Active)?;

    let store = state.store();
    let project = queries::create_project(
        store,
        NewProject {
            name,
            description: payload.description.filter(|d| !d.trim().is_empty()),
            status: status.as_str().to_string(),
            user_id: user.id,
        },
    )
    .await
    .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to create project"))?;

    queries::log_activity(
        store,
        NewActivity::success(user.id, "project_created", "project", project.id),
    )
    .await;
    tracing::info!(user_id = %user.id, project_id = %project.id, "Project created");
    Ok(project)
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    session: CurrentSession,
    Json(payload): Json<CreateProjectRequest>,
) -> Response {
    match create_project_inner(&state, session, payload).await {
        Ok(project) => (StatusCode::CREATED, Json(project)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_service_inner(
    state: &AppState,
    session: CurrentSession,
    project_id: Uuid,
    payload: CreateServiceRequest,
) -> Result<Service, ApiError> {
    let user = require_api_user(state, session).await?;
    let project = owned_project(state, &user, project_id).await?;
    let name = validate_name(&payload.name, "Service")?;
    let service_type: ServiceType = payload
        .service_type
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, &e))?;
    let status = parse_field(payload.status.as_deref(), ServiceStatus::Stopped)?;

    let store = state.store();
    let service = queries::create_service(
        store,
        NewService {
            project_id: project.id,
            name,
            service_type: service_type.as_str().to_string(),
            status: status.as_str().to_string(),
            config: payload
                .config
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
        },
    )
    .await
    .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Failed to create service"))?;

    queries::log_activity(
        store,
        NewActivity::success(user.id, "service_created", "service", service.id),
    )
    .await;
    Ok(service)
}

/// POST /api/projects/{id}/services
pub async fn create_service(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    session: CurrentSession,
    Json(payload): Json<CreateServiceRequest>,
) -> Response {
    match create_service_inner(&state, session, project_id, payload).await {
        Ok(service) => (StatusCode::CREATED, Json(service)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn update_service_inner(
    state: &AppState,
    session: CurrentSession,
    id: Uuid,
    payload: UpdateServiceRequest,
) -> Result<Service, ApiError> {
    let user = require_api_user(state, session).await?;
    let status: ServiceStatus = payload
        .status
        .parse()
        .map_err(|e: String| api_error(StatusCode::BAD_REQUEST, &e))?;
    owned_service(state, &user, id).await?;

    let store = state.store();
    let service = queries::update_service_status(store, id, status.as_str())
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Service not found"))?;
    queries::log_activity(
        store,
        NewActivity::success(user.id, "service_updated", "service", id),
    )
    .await;
    Ok(service)
}

/// PATCH /api/services/{id}
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: CurrentSession,
    Json(payload): Json<UpdateServiceRequest>,
) -> Response {
    match update_service_inner(&state, session, id, payload).await {
        Ok(service) => Json(service).into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::db::queries;
    use crate::routes::testing::{app_with, json_request};
    use crate::session::testing::session_user;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_project_requires_session() {
        let (app, _) = app_with(None);
        let (status, body) =
            json_request(app, "POST", "/api/projects", &json!({ "name": "Site" })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_create_project_logs_one_success_activity() {
        let (app, store) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        // Provision the user so the account_created entry is already there.
        json_request(app.clone(), "GET", "/api/projects", &json!(null)).await;
        let user = queries::get_user_by_clerk_id(store.as_ref(), "user_1")
            .await
            .unwrap();
        let before = queries::get_user_activity(store.as_ref(), user.id, 100).await;

        let (status, body) = json_request(
            app,
            "POST",
            "/api/projects",
            &json!({ "name": "  Landing page  ", "description": "Marketing" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Landing page");
        assert_eq!(body["status"], "active");

        let after = queries::get_user_activity(store.as_ref(), user.id, 100).await;
        assert_eq!(after.len(), before.len() + 1);
        let created: Vec<_> = after.iter().filter(|a| a.action == "project_created").collect();
        assert_eq!(created.len(), 1);
        let entry = created[0];
        assert_eq!(entry.status, "success");
        assert_eq!(entry.resource_id, body["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_create_project_validates_input() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, body) =
            json_request(app.clone(), "POST", "/api/projects", &json!({ "name": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Project name is required");

        let (status, _) = json_request(
            app,
            "POST",
            "/api/projects",
            &json!({ "name": "Site", "status": "deleted" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_service_lifecycle_for_owner() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (_, project) =
            json_request(app.clone(), "POST", "/api/projects", &json!({ "name": "Site" })).await;
        let project_id = project["id"].as_str().unwrap();

        let (status, service) = json_request(
            app.clone(),
            "POST",
            &format!("/api/projects/{}/services", project_id),
            &json!({ "name": "Postgres", "type": "database" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(service["type"], "database");
        assert_eq!(service["status"], "stopped");

        let (status, updated) = json_request(
            app.clone(),
            "PATCH",
            &format!("/api/services/{}", service["id"].as_str().unwrap()),
            &json!({ "status": "running" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "running");

        let (status, _) = json_request(
            app,
            "POST",
            &format!("/api/projects/{}/services", project_id),
            &json!({ "name": "Queue", "type": "kafka" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_services_are_owner_only() {
        let (owner_app, store) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (_, project) =
            json_request(owner_app, "POST", "/api/projects", &json!({ "name": "Site" })).await;
        let project_id = project["id"].as_str().unwrap().to_string();

        // Same store, different signed-in user.
        let (state, _) = crate::routes::testing::state_with(Some(session_user(
            "user_2",
            "mallory@soloflow.io",
        )));
        let state = crate::state::AppState {
            store: store.clone(),
            ..state
        };
        let other_app = crate::create_app(state);

        let (status, body) = json_request(
            other_app,
            "POST",
            &format!("/api/projects/{}/services", project_id),
            &json!({ "name": "Api", "type": "api" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Project not found");
    }
}

/**
 * Dashboard Routes
 * Role-based entry point, client dashboard, admin dashboard and the dashboard JSON API
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};

use super::{api_error, page_locale, require_api_session, require_session};
use crate::db::models::{DashboardData, Project, User};
use crate::db::queries;
use crate::i18n::{format_time_ago, Locale};
use crate::session::{self, CurrentSession};
use crate::state::AppState;
use crate::views::{self, components, escape_html, Page};

fn page<'a>(locale: Locale, title: &'a str, name: &'a str, path: &'a str) -> Page<'a> {
    Page {
        locale,
        title,
        signed_in_as: Some(name),
        path,
    }
}

fn project_row(p: &Project, locale: Locale, now: DateTime<Utc>) -> Vec<String> {
    vec![
        escape_html(&p.name),
        escape_html(p.description.as_deref().unwrap_or("")),
        components::badge(&p.status),
        format_time_ago(locale, p.created_at, now),
    ]
}

fn render_client_dashboard(data: &DashboardData, locale: Locale, name: &str) -> String {
    let dict = locale.dict();
    let now = Utc::now();
    let stats = &data.stats;

    let active_projects = data
        .recent_projects
        .iter()
        .filter(|p| p.status == "active")
        .count();

    let cards = components::stat_grid(&[
        components::stat_card(
            dict.projects,
            &stats.projects_count.to_string(),
            &format!("{} {}", active_projects, dict.active_projects),
        ),
        components::stat_card(
            dict.active_services,
            &stats.active_services.to_string(),
            &format!("{} {}", dict.of_total, data.services.len()),
        ),
        components::stat_card(
            dict.usage,
            &format!("{:.1}%", stats.total_usage as f64),
            dict.of_quota,
        ),
        components::stat_card(
            dict.last_activity,
            &stats.last_activity.format("%d/%m/%Y").to_string(),
            &stats.last_activity.format("%H:%M").to_string(),
        ),
    ]);

    let projects = components::table_or_empty(
        &["Name", "Description", "Status", "Created"],
        &data
            .recent_projects
            .iter()
            .map(|p| project_row(p, locale, now))
            .collect::<Vec<_>>(),
        dict.no_projects,
    );

    let service_rows: Vec<Vec<String>> = data
        .services
        .iter()
        .map(|s| {
            vec![
                escape_html(&s.name),
                escape_html(&s.service_type),
                components::badge(&s.status),
            ]
        })
        .collect();
    let services =
        components::table_or_empty(&["Name", "Type", "Status"], &service_rows, dict.no_services);

    let activity_rows: Vec<Vec<String>> = data
        .recent_activity
        .iter()
        .map(|a| {
            vec![
                escape_html(&a.action),
                escape_html(&a.resource_type),
                components::badge(&a.status),
                format_time_ago(locale, a.created_at, now),
            ]
        })
        .collect();
    let activity = components::table_or_empty(
        &["Action", "Resource", "Status", "When"],
        &activity_rows,
        dict.no_activity,
    );

    format!(
        "<h1>{}, {}</h1><p>{}</p>{}{}{}{}",
        dict.welcome,
        escape_html(name),
        dict.overview,
        cards,
        components::card(dict.projects, &projects),
        components::card(dict.services, &services),
        components::card(dict.recent_activity, &activity),
    )
}

/// GET /{lang}/dashboard - route by role
pub async fn dashboard_home(
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

    let db_user = queries::get_user_by_clerk_id(state.store(), &session_user.user_id).await;
    let target = if session::is_admin(&state.config, &session_user, db_user.as_ref()) {
        "/dashboard/admin"
    } else {
        "/dashboard/client"
    };
    Redirect::temporary(&locale.path(target)).into_response()
}

/// GET /{lang}/dashboard/client
pub async fn client_dashboard(
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
    let page = page(locale, dict.welcome, &name, "/dashboard/client");

    let store = state.store();
    let body = match queries::ensure_user(store, session_user.to_new_user(&state.config)).await {
        None => components::error_card(dict.load_error_title, dict.load_error_body),
        Some(_) => match queries::get_dashboard_data(store, &session_user.user_id).await {
            Some(data) => render_client_dashboard(&data, locale, &name),
            None => components::error_card(dict.load_error_title, dict.load_error_body),
        },
    };

    views::render(page, &body).into_response()
}

fn render_admin_users(users: &[User], locale: Locale) -> String {
    let dict = locale.dict();
    let now = Utc::now();
    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|u| {
            vec![
                escape_html(&u.display_name()),
                escape_html(&u.email),
                components::badge(&u.role),
                escape_html(&u.subscription_plan),
                format_time_ago(locale, u.created_at, now),
            ]
        })
        .collect();
    components::card(
        dict.users,
        &components::table_or_empty(&["Name", "E-mail", "Role", "Plan", "Joined"], &rows, "-"),
    )
}

/// GET /{lang}/dashboard/admin
pub async fn admin_dashboard(
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

    let store = state.store();
    let db_user = queries::get_user_by_clerk_id(store, &session_user.user_id).await;
    if !session::is_admin(&state.config, &session_user, db_user.as_ref()) {
        tracing::warn!(user_id = %session_user.user_id, "Non-admin requested admin dashboard");
        return Redirect::temporary(&locale.path("/dashboard/client")).into_response();
    }

    let dict = locale.dict();
    let name = session_user.display_name();
    let (system, admin, users, projects) = tokio::join!(
        queries::get_system_stats(store),
        queries::get_admin_stats(store, Utc::now()),
        queries::get_all_users(store),
        queries::get_all_projects(store),
    );

    let cards = components::stat_grid(&[
        components::stat_card(
            dict.users,
            &admin.total_users.to_string(),
            &format!("{} {}", admin.new_users_this_month, dict.new_this_month),
        ),
        components::stat_card(dict.active_users, &admin.active_users.to_string(), ""),
        components::stat_card(dict.admins, &admin.admin_users.to_string(), ""),
        components::stat_card(
            dict.projects,
            &system.total_projects.to_string(),
            "",
        ),
        components::stat_card(
            dict.total_services,
            &system.total_services.to_string(),
            &format!("{} {}", system.active_services, dict.running_services),
        ),
    ]);

    // Allow-listed admins without a row yet may see everything.
    let can_view_users = db_user
        .as_ref()
        .map(|u| session::has_permission(u, "users.view"))
        .unwrap_or(true);
    let users_section = if can_view_users {
        render_admin_users(&users, locale)
    } else {
        components::access_denied(dict)
    };

    let now = Utc::now();
    let project_rows: Vec<Vec<String>> = projects
        .iter()
        .map(|p| {
            let mut row = project_row(&p.project, locale, now);
            row.insert(1, escape_html(p.owner_email.as_deref().unwrap_or("-")));
            row
        })
        .collect();
    let projects_section = components::card(
        dict.all_projects,
        &components::table_or_empty(
            &["Name", "Owner", "Description", "Status", "Created"],
            &project_rows,
            dict.no_projects,
        ),
    );

    let body = format!(
        "<h1>{}</h1><p>{} <strong>{}</strong></p>{}{}{}",
        dict.admin_title,
        dict.signed_in_as,
        escape_html(&name),
        cards,
        users_section,
        projects_section
    );

    views::render(page(locale, dict.admin_title, &name, "/dashboard/admin"), &body).into_response()
}

/// GET /api/dashboard
pub async fn api_dashboard(State(state): State<AppState>, session: CurrentSession) -> Response {
    let session_user = match require_api_session(session) {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let store = state.store();
    if queries::ensure_user(store, session_user.to_new_user(&state.config))
        .await
        .is_none()
    {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "User data unavailable").into_response();
    }

    match queries::get_dashboard_data(store, &session_user.user_id).await {
        Some(data) => (StatusCode::OK, Json(data)).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Dashboard data not found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::db::queries;
    use crate::routes::testing::{app_with, get, json_request, location, ADMIN_EMAIL};
    use crate::session::testing::session_user;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_anonymous_dashboard_redirects_to_login() {
        let (app, _) = app_with(None);
        for path in ["/fr/dashboard", "/fr/dashboard/client", "/en/dashboard/admin"] {
            let (status, headers, _) = get(app.clone(), path).await;
            assert_eq!(status, StatusCode::TEMPORARY_REDIRECT, "{}", path);
            assert!(location(&headers).ends_with("/login"), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_dashboard_routes_by_role() {
        let (app, _) = app_with(Some(session_user("user_admin", ADMIN_EMAIL)));
        let (_, headers, _) = get(app, "/en/dashboard").await;
        assert_eq!(location(&headers), "/en/dashboard/admin");

        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (_, headers, _) = get(app, "/en/dashboard").await;
        assert_eq!(location(&headers), "/en/dashboard/client");
    }

    #[tokio::test]
    async fn test_non_admin_is_sent_to_client_dashboard() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, headers, _) = get(app, "/fr/dashboard/admin").await;
        assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&headers), "/fr/dashboard/client");
    }

    #[tokio::test]
    async fn test_first_visit_logs_account_created_once() {
        let (app, store) = app_with(Some(session_user("user_1", "jane@soloflow.io")));

        let (status, _, body) = get(app.clone(), "/fr/dashboard/client").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Bienvenue, Jane Doe"));
        let (status, _, _) = get(app, "/fr/dashboard/client").await;
        assert_eq!(status, StatusCode::OK);

        let user = queries::get_user_by_clerk_id(store.as_ref(), "user_1")
            .await
            .unwrap();
        assert_eq!(user.role, "client");
        let activity = queries::get_user_activity(store.as_ref(), user.id, 10).await;
        let created: Vec<_> = activity
            .iter()
            .filter(|a| a.action == "account_created")
            .collect();
        assert_eq!(created.len(), 1);
        assert_eq!(queries::get_all_users(store.as_ref()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_dashboard_renders_for_allow_listed_admin() {
        let (app, _) = app_with(Some(session_user("user_admin", ADMIN_EMAIL)));
        // Provision the admin row first.
        get(app.clone(), "/fr/dashboard/client").await;

        let (status, _, body) = get(app, "/fr/dashboard/admin").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Administration SoloFlow"));
        assert!(body.contains(ADMIN_EMAIL));
        assert!(!body.contains("Accès refusé"));
    }

    #[tokio::test]
    async fn test_api_dashboard_requires_session() {
        let (app, _) = app_with(None);
        let (status, body) = json_request(app, "GET", "/api/dashboard", &serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_api_dashboard_returns_data() {
        let (app, _) = app_with(Some(session_user("user_1", "jane@soloflow.io")));
        let (status, body) = json_request(app, "GET", "/api/dashboard", &serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "jane@soloflow.io");
        assert_eq!(body["stats"]["projectsCount"], 0);
        assert_eq!(body["recentActivity"].as_array().unwrap().len(), 1);
    }
}

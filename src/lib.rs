//! SoloFlow - library for app logic and testing

pub mod billing;
pub mod config;
pub mod db;
pub mod i18n;
pub mod logging;
pub mod routes;
pub mod session;
pub mod state;
pub mod upstream;
pub mod views;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use config::AppConfig;
use db::{provision, MemoryStore, PgStore, Store};
use session::{ClerkSessions, FixedSession, SessionProvider};
use state::AppState;

/// Configure CORS from `ALLOWED_ORIGINS` (comma-separated), defaulting to localhost.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect::<Vec<HeaderValue>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();

    Router::new()
        // pages
        .route("/", get(routes::auth::root))
        .route("/{lang}", get(routes::auth::landing))
        .route("/{lang}/login", get(routes::auth::login_page))
        .route("/{lang}/register", get(routes::auth::register_page))
        .route("/{lang}/sso-callback", get(routes::auth::sign_in_callback))
        .route(
            "/{lang}/oauth/callback/google",
            get(routes::auth::sign_in_callback),
        )
        .route("/{lang}/logout", post(routes::auth::logout))
        .route("/{lang}/dashboard", get(routes::dashboard::dashboard_home))
        .route(
            "/{lang}/dashboard/client",
            get(routes::dashboard::client_dashboard),
        )
        .route(
            "/{lang}/dashboard/admin",
            get(routes::dashboard::admin_dashboard),
        )
        .route(
            "/{lang}/dashboard/billing",
            get(routes::billing::billing_page),
        )
        .route(
            "/{lang}/dashboard/billing/checkout",
            post(routes::billing::checkout),
        )
        .route("/{lang}/profile", get(routes::profile::profile_page))
        // JSON API
        .route("/api/dashboard", get(routes::dashboard::api_dashboard))
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}/services",
            post(routes::projects::create_service),
        )
        .route("/api/services/{id}", patch(routes::projects::update_service))
        .route("/api/profile", patch(routes::profile::update_profile))
        .route("/api/admin/users", get(routes::admin::list_users))
        .route(
            "/api/admin/users/{id}",
            patch(routes::admin::update_user).delete(routes::admin::delete_user),
        )
        .route(
            "/api/content",
            get(routes::content::list_content).post(routes::content::create_content),
        )
        .route("/api/content/{id}", get(routes::content::get_content))
        .route("/api/content/{id}/posts", post(routes::content::create_post))
        .route("/api/posts/{id}", patch(routes::content::update_post))
        // health
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::resolve_session,
        ))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Postgres when `DATABASE_URL` is set and reachable, otherwise the in-memory store.
async fn init_store() -> Arc<dyn Store> {
    let Some(db_config) = db::DbConfig::from_env() else {
        tracing::info!("DATABASE_URL not set. Using the in-memory store.");
        return Arc::new(MemoryStore::new());
    };

    match db::init_pool(&db_config).await {
        Ok(pool) => {
            let report = provision::run_setup(&provision::PgEndpoint::new(pool.clone())).await;
            let missing = report.missing_tables();
            if !missing.is_empty() {
                tracing::error!(tables = ?missing, "Required tables are missing");
            }
            Arc::new(PgStore::new(pool))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to initialize database pool. Falling back to the in-memory store."
            );
            Arc::new(MemoryStore::new())
        }
    }
}

fn init_sessions(config: &AppConfig) -> Arc<dyn SessionProvider> {
    match ClerkSessions::from_config(&config.clerk) {
        Ok(Some(clerk)) => {
            tracing::info!("Session verification enabled");
            Arc::new(clerk)
        }
        Ok(None) => {
            tracing::warn!("Identity provider not configured. Every request is anonymous.");
            Arc::new(FixedSession::anonymous())
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid identity provider key. Every request is anonymous.");
            Arc::new(FixedSession::anonymous())
        }
    }
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    let _log_guards = logging::init();

    routes::health::init_start_time();

    let config = AppConfig::from_env();
    if config.is_production() {
        if config.admin_emails.is_empty() {
            tracing::warn!("ADMIN_EMAIL is empty. Only stored admin roles grant admin access.");
        }
        if !config.clerk.is_enabled() {
            tracing::warn!("CLERK_PUBLISHABLE_KEY is missing or a placeholder in production.");
        }
    }

    let store = init_store().await;
    let sessions = init_sessions(&config);
    let state = AppState::new(config, store, sessions);
    if state.billing.is_none() {
        tracing::info!("STRIPE_SECRET_KEY not set. Billing is disabled.");
    }

    let app = create_app(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3000);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use crate::routes::testing::{app_with, get};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (app, _) = app_with(None);
        let (status, _, _) = get(app, "/fr/nowhere/at/all").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let (app, _) = app_with(None);
        let (_, headers, _) = get(app, "/health").await;
        assert!(headers.contains_key("x-request-id"));
    }
}

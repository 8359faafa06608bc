//! Schema provisioning for the maintenance binaries and dev startup.
//!
//! Statements run one after another; a failing statement is logged and skipped.
//! There is no transaction and no rollback. Tables are probed afterwards.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::SupabaseConfig;
use crate::upstream::{self, UpstreamError, HTTP_CLIENT};

/// Tables the application reads and writes.
pub const REQUIRED_TABLES: &[&str] = &[
    "users",
    "user_profiles",
    "projects",
    "services",
    "activities",
    "content_generations",
    "social_posts",
];

/// `(name, sql)` in dependency order.
pub const SCHEMA: &[(&str, &str)] = &[
    ("pgcrypto", "CREATE EXTENSION IF NOT EXISTS pgcrypto"),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            email VARCHAR(255) UNIQUE NOT NULL,
            first_name VARCHAR(255),
            last_name VARCHAR(255),
            avatar_url TEXT,
            role VARCHAR(20) NOT NULL DEFAULT 'client'
                CHECK (role IN ('admin', 'user', 'client')),
            permissions TEXT[] NOT NULL DEFAULT '{}',
            clerk_user_id VARCHAR(255) UNIQUE,
            subscription_plan VARCHAR(50) NOT NULL DEFAULT 'free',
            stripe_customer_id VARCHAR(255),
            subscription_expires_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "user_profiles",
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            full_name VARCHAR(255),
            avatar_url TEXT,
            locale VARCHAR(10),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "projects",
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR(255) NOT NULL,
            description TEXT,
            status VARCHAR(20) NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive', 'completed', 'archived')),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "services",
        r#"
        CREATE TABLE IF NOT EXISTS services (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR(255) NOT NULL,
            type VARCHAR(20) NOT NULL CHECK (type IN ('web', 'api', 'database', 'storage')),
            status VARCHAR(50) NOT NULL DEFAULT 'stopped',
            project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            config JSONB NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "activities",
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            action VARCHAR(100) NOT NULL,
            resource_type VARCHAR(50) NOT NULL,
            resource_id VARCHAR(255) NOT NULL,
            details JSONB,
            status VARCHAR(20) NOT NULL DEFAULT 'success'
                CHECK (status IN ('success', 'error', 'pending')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "content_generations",
        r#"
        CREATE TABLE IF NOT EXISTS content_generations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            original_image_url TEXT NOT NULL,
            extracted_text TEXT,
            user_comment TEXT,
            generated_content JSONB NOT NULL,
            status VARCHAR(50) NOT NULL DEFAULT 'completed',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "social_posts",
        r#"
        CREATE TABLE IF NOT EXISTS social_posts (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            content_generation_id UUID NOT NULL
                REFERENCES content_generations(id) ON DELETE CASCADE,
            platform VARCHAR(50) NOT NULL,
            status VARCHAR(50) NOT NULL,
            platform_post_id VARCHAR(255),
            error_message TEXT,
            published_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "idx_projects_user_id",
        "CREATE INDEX IF NOT EXISTS idx_projects_user_id ON projects(user_id)",
    ),
    (
        "idx_services_project_id",
        "CREATE INDEX IF NOT EXISTS idx_services_project_id ON services(project_id)",
    ),
    (
        "idx_activities_user_created",
        "CREATE INDEX IF NOT EXISTS idx_activities_user_created ON activities(user_id, created_at DESC)",
    ),
    (
        "idx_content_generations_user_id",
        "CREATE INDEX IF NOT EXISTS idx_content_generations_user_id ON content_generations(user_id)",
    ),
    (
        "idx_social_posts_generation_id",
        "CREATE INDEX IF NOT EXISTS idx_social_posts_generation_id ON social_posts(content_generation_id)",
    ),
];

static TABLE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid table name: {0}")]
    InvalidTable(String),
}

/// Somewhere raw SQL can be sent and tables can be probed.
#[async_trait]
pub trait AdminEndpoint: Send + Sync {
    /// Human-readable target for log lines.
    fn describe(&self) -> String;

    async fn execute_sql(&self, sql: &str) -> Result<(), ProvisionError>;

    /// `select * limit 1` against a table; `Ok` means the table is readable.
    async fn probe_table(&self, table: &str) -> Result<(), ProvisionError>;
}

// ============================================================================
// Hosted database RPC endpoint
// ============================================================================

/// The hosted database's `rpc/exec_sql` function plus its REST table API.
pub struct RpcEndpoint {
    base_url: String,
    service_key: String,
}

impl RpcEndpoint {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    pub fn from_config(config: &SupabaseConfig) -> Result<Self, UpstreamError> {
        match (&config.url, &config.service_key) {
            (Some(url), Some(key)) => Ok(Self::new(url.clone(), key.clone())),
            _ => Err(UpstreamError::NotConfigured {
                service: "supabase",
            }),
        }
    }
}

#[async_trait]
impl AdminEndpoint for RpcEndpoint {
    fn describe(&self) -> String {
        format!("{}/rest/v1", self.base_url)
    }

    async fn execute_sql(&self, sql: &str) -> Result<(), ProvisionError> {
        let response = HTTP_CLIENT
            .post(format!("{}/rest/v1/rpc/exec_sql", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "sql": sql }))
            .send()
            .await
            .map_err(UpstreamError::request("supabase"))?;
        upstream::check_status("supabase", response).await?;
        Ok(())
    }

    async fn probe_table(&self, table: &str) -> Result<(), ProvisionError> {
        if !TABLE_NAME.is_match(table) {
            return Err(ProvisionError::InvalidTable(table.to_string()));
        }
        let response = HTTP_CLIENT
            .get(format!("{}/rest/v1/{}", self.base_url, table))
            .query(&[("select", "*"), ("limit", "1")])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(UpstreamError::request("supabase"))?;
        upstream::check_status("supabase", response).await?;
        Ok(())
    }
}

// ============================================================================
// Direct Postgres connection
// ============================================================================

pub struct PgEndpoint {
    pool: PgPool,
}

impl PgEndpoint {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminEndpoint for PgEndpoint {
    fn describe(&self) -> String {
        "postgres pool".to_string()
    }

    async fn execute_sql(&self, sql: &str) -> Result<(), ProvisionError> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn probe_table(&self, table: &str) -> Result<(), ProvisionError> {
        if !TABLE_NAME.is_match(table) {
            return Err(ProvisionError::InvalidTable(table.to_string()));
        }
        sqlx::query(&format!("SELECT * FROM {} LIMIT 1", table))
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}

/// Direct connection when `DATABASE_URL` is set, otherwise the hosted RPC endpoint.
pub async fn endpoint_from_env(
    supabase: &SupabaseConfig,
) -> Result<Box<dyn AdminEndpoint>, ProvisionError> {
    match super::DbConfig::from_env() {
        Some(db_config) => {
            let pool = super::init_pool(&db_config).await?;
            Ok(Box::new(PgEndpoint::new(pool)))
        }
        None => Ok(Box::new(RpcEndpoint::from_config(supabase)?)),
    }
}

// ============================================================================
// Running
// ============================================================================

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub name: String,
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub statements: Vec<StepOutcome>,
    pub tables: Vec<StepOutcome>,
}

impl ProvisionReport {
    pub fn failed_statements(&self) -> usize {
        self.statements.iter().filter(|s| !s.is_ok()).count()
    }

    pub fn missing_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.is_ok())
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// Probe each table and log the outcome.
pub async fn check_tables(endpoint: &dyn AdminEndpoint, tables: &[&str]) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(tables.len());
    for table in tables {
        let error = match endpoint.probe_table(table).await {
            Ok(()) => {
                tracing::info!(table = %table, "Table accessible");
                None
            }
            Err(e) => {
                tracing::warn!(table = %table, error = %e, "Table check failed");
                Some(e.to_string())
            }
        };
        outcomes.push(StepOutcome {
            name: table.to_string(),
            error,
        });
    }
    outcomes
}

/// Execute every schema statement, then probe the required tables.
pub async fn run_setup(endpoint: &dyn AdminEndpoint) -> ProvisionReport {
    tracing::info!(target_endpoint = %endpoint.describe(), "Provisioning database schema");

    let mut report = ProvisionReport::default();
    for (name, sql) in SCHEMA {
        let error = match endpoint.execute_sql(sql).await {
            Ok(()) => {
                tracing::info!(statement = %name, "Statement applied");
                None
            }
            Err(e) => {
                tracing::warn!(statement = %name, error = %e, "Statement failed, continuing");
                Some(e.to_string())
            }
        };
        report.statements.push(StepOutcome {
            name: name.to_string(),
            error,
        });
    }

    report.tables = check_tables(endpoint, REQUIRED_TABLES).await;

    tracing::info!(
        failed_statements = report.failed_statements(),
        missing_tables = report.missing_tables().len(),
        "Provisioning finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEndpoint {
        fail_on: Vec<&'static str>,
        missing: Vec<&'static str>,
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AdminEndpoint for FakeEndpoint {
        fn describe(&self) -> String {
            "fake".to_string()
        }

        async fn execute_sql(&self, sql: &str) -> Result<(), ProvisionError> {
            self.executed.lock().unwrap().push(sql.to_string());
            if self.fail_on.iter().any(|needle| sql.contains(needle)) {
                return Err(ProvisionError::Upstream(UpstreamError::Status {
                    service: "supabase",
                    status: 404,
                    body: "function exec_sql does not exist".to_string(),
                }));
            }
            Ok(())
        }

        async fn probe_table(&self, table: &str) -> Result<(), ProvisionError> {
            if self.missing.contains(&table) {
                return Err(ProvisionError::InvalidTable(table.to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_schema_creates_every_required_table() {
        for table in REQUIRED_TABLES {
            let needle = format!("CREATE TABLE IF NOT EXISTS {} (", table);
            assert!(
                SCHEMA.iter().any(|(_, sql)| sql.contains(&needle)),
                "missing table {}",
                table
            );
        }
    }

    #[test]
    fn test_schema_uses_clerk_user_id_column() {
        let users = SCHEMA.iter().find(|(name, _)| *name == "users").unwrap().1;
        assert!(users.contains("clerk_user_id"));
        assert!(!SCHEMA.iter().any(|(_, sql)| sql.contains("clerk_id ")));
    }

    #[tokio::test]
    async fn test_run_setup_continues_after_failure() {
        let endpoint = FakeEndpoint {
            fail_on: vec!["CREATE TABLE IF NOT EXISTS projects"],
            missing: vec!["projects"],
            ..FakeEndpoint::default()
        };

        let report = run_setup(&endpoint).await;

        assert_eq!(endpoint.executed.lock().unwrap().len(), SCHEMA.len());
        assert_eq!(report.statements.len(), SCHEMA.len());
        assert_eq!(report.failed_statements(), 1);
        assert_eq!(report.missing_tables(), vec!["projects"]);
        let failed = report.statements.iter().find(|s| !s.is_ok()).unwrap();
        assert_eq!(failed.name, "projects");
        assert!(failed.error.as_deref().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_probe_rejects_bad_table_names() {
        let endpoint = RpcEndpoint::new("http://127.0.0.1:1", "key");
        let err = endpoint.probe_table("users; drop table users").await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidTable(_)));
    }

    #[test]
    fn test_rpc_endpoint_requires_config() {
        let config = SupabaseConfig {
            url: Some("https://db.example.co/".to_string()),
            service_key: None,
        };
        assert!(RpcEndpoint::from_config(&config).is_err());

        let config = SupabaseConfig {
            service_key: Some("key".to_string()),
            ..config
        };
        let endpoint = RpcEndpoint::from_config(&config).unwrap();
        assert_eq!(endpoint.describe(), "https://db.example.co/rest/v1");
    }
}

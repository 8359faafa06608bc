//! `Store` backed by the hosted Postgres database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::models::*;
use super::{DbResult, Store};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `RETURNING *, (xmax = 0) AS inserted` row of the user upsert.
#[derive(FromRow)]
struct UpsertedUser {
    #[sqlx(flatten)]
    user: User,
    inserted: bool,
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> DbResult<Duration> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(start.elapsed())
    }

    // ------------------------------------------------------------------------
    // users
    // ------------------------------------------------------------------------

    async fn find_user_by_clerk_id(&self, clerk_user_id: &str) -> DbResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE clerk_user_id = $1")
            .bind(clerk_user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user(&self, id: Uuid) -> DbResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn upsert_user(&self, new: NewUser) -> DbResult<(User, bool)> {
        let row = sqlx::query_as::<_, UpsertedUser>(
            r#"
            INSERT INTO users (email, first_name, last_name, avatar_url, role, clerk_user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (clerk_user_id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = COALESCE(EXCLUDED.first_name, users.first_name),
                last_name = COALESCE(EXCLUDED.last_name, users.last_name),
                avatar_url = COALESCE(EXCLUDED.avatar_url, users.avatar_url),
                updated_at = now()
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.avatar_url)
        .bind(&new.role)
        .bind(&new.clerk_user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.user, row.inserted))
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> DbResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                role = COALESCE($4, role),
                permissions = COALESCE($5, permissions),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.role)
        .bind(&update.permissions)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        update: SubscriptionUpdate,
    ) -> DbResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                subscription_plan = $2,
                stripe_customer_id = COALESCE($3, stripe_customer_id),
                subscription_expires_at = $4,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.plan)
        .bind(&update.stripe_customer_id)
        .bind(update.expires_at)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_user(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users(&self) -> DbResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
    }

    async fn count_admins(&self) -> DbResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await
    }

    async fn count_users_created_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
    }

    async fn count_active_users_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        sqlx::query_scalar("SELECT COUNT(DISTINCT user_id) FROM activities WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
    }

    // ------------------------------------------------------------------------
    // profiles
    // ------------------------------------------------------------------------

    async fn find_profile(&self, user_id: Uuid) -> DbResult<Option<UserProfile>> {
        sqlx::query_as::<_, UserProfile>("SELECT * FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn upsert_profile(&self, user_id: Uuid, update: ProfileUpdate) -> DbResult<UserProfile> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (user_id, full_name, avatar_url, locale)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                full_name = COALESCE(EXCLUDED.full_name, user_profiles.full_name),
                avatar_url = COALESCE(EXCLUDED.avatar_url, user_profiles.avatar_url),
                locale = COALESCE(EXCLUDED.locale, user_profiles.locale),
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&update.full_name)
        .bind(&update.avatar_url)
        .bind(&update.locale)
        .fetch_one(&self.pool)
        .await
    }

    // ------------------------------------------------------------------------
    // projects
    // ------------------------------------------------------------------------

    async fn list_projects_for_user(&self, user_id: Uuid) -> DbResult<Vec<Project>> {
        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_projects_with_owner(&self) -> DbResult<Vec<ProjectWithOwner>> {
        sqlx::query_as::<_, ProjectWithOwner>(
            r#"
            SELECT p.*,
                   u.email AS owner_email,
                   u.first_name AS owner_first_name,
                   u.last_name AS owner_last_name
            FROM projects p
            LEFT JOIN users u ON u.id = p.user_id
            ORDER BY p.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn find_project(&self, id: Uuid) -> DbResult<Option<Project>> {
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_project(&self, new: NewProject) -> DbResult<Project> {
        sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name, description, status, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.status)
        .bind(new.user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn count_projects(&self) -> DbResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await
    }

    // ------------------------------------------------------------------------
    // services
    // ------------------------------------------------------------------------

    async fn list_services_for_project(&self, project_id: Uuid) -> DbResult<Vec<Service>> {
        sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_services_for_user(&self, user_id: Uuid) -> DbResult<Vec<Service>> {
        sqlx::query_as::<_, Service>(
            r#"
            SELECT s.*
            FROM services s
            INNER JOIN projects p ON p.id = s.project_id
            WHERE p.user_id = $1
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_service_statuses(&self) -> DbResult<Vec<String>> {
        sqlx::query_scalar("SELECT status FROM services")
            .fetch_all(&self.pool)
            .await
    }

    async fn find_service(&self, id: Uuid) -> DbResult<Option<Service>> {
        sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_service(&self, new: NewService) -> DbResult<Service> {
        sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (project_id, name, type, status, config)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.project_id)
        .bind(&new.name)
        .bind(&new.service_type)
        .bind(&new.status)
        .bind(&new.config)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_service_status(&self, id: Uuid, status: &str) -> DbResult<Option<Service>> {
        sqlx::query_as::<_, Service>(
            "UPDATE services SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
    }

    // ------------------------------------------------------------------------
    // activity
    // ------------------------------------------------------------------------

    async fn list_activities_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<Activity>> {
        sqlx::query_as::<_, Activity>(
            "SELECT * FROM activities WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn insert_activity(&self, new: NewActivity) -> DbResult<Activity> {
        sqlx::query_as::<_, Activity>(
            r#"
            INSERT INTO activities (user_id, action, resource_type, resource_id, details, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.action)
        .bind(&new.resource_type)
        .bind(&new.resource_id)
        .bind(&new.details)
        .bind(&new.status)
        .fetch_one(&self.pool)
        .await
    }

    // ------------------------------------------------------------------------
    // content automation
    // ------------------------------------------------------------------------

    async fn insert_content_generation(
        &self,
        new: NewContentGeneration,
    ) -> DbResult<ContentGeneration> {
        sqlx::query_as::<_, ContentGeneration>(
            r#"
            INSERT INTO content_generations
                (user_id, original_image_url, extracted_text, user_comment, generated_content, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.original_image_url)
        .bind(&new.extracted_text)
        .bind(&new.user_comment)
        .bind(&new.generated_content)
        .bind(&new.status)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_content_generations_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<ContentGeneration>> {
        sqlx::query_as::<_, ContentGeneration>(
            r#"
            SELECT * FROM content_generations
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_content_generation(&self, id: Uuid) -> DbResult<Option<ContentGeneration>> {
        sqlx::query_as::<_, ContentGeneration>("SELECT * FROM content_generations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn insert_social_post(&self, new: NewSocialPost) -> DbResult<SocialPost> {
        sqlx::query_as::<_, SocialPost>(
            r#"
            INSERT INTO social_posts (content_generation_id, platform, status)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(new.content_generation_id)
        .bind(&new.platform)
        .bind(&new.status)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_social_posts(&self, content_generation_id: Uuid) -> DbResult<Vec<SocialPost>> {
        sqlx::query_as::<_, SocialPost>(
            r#"
            SELECT * FROM social_posts
            WHERE content_generation_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(content_generation_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_social_post(&self, id: Uuid) -> DbResult<Option<SocialPost>> {
        sqlx::query_as::<_, SocialPost>("SELECT * FROM social_posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_social_post(
        &self,
        id: Uuid,
        update: SocialPostUpdate,
    ) -> DbResult<Option<SocialPost>> {
        sqlx::query_as::<_, SocialPost>(
            r#"
            UPDATE social_posts SET
                status = COALESCE($2, status),
                platform_post_id = COALESCE($3, platform_post_id),
                error_message = COALESCE($4, error_message),
                published_at = COALESCE($5, published_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(&update.platform_post_id)
        .bind(&update.error_message)
        .bind(update.published_at)
        .fetch_optional(&self.pool)
        .await
    }
}

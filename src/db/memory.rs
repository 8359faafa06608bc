//! In-process `Store` used when no `DATABASE_URL` is configured and by tests.
//!
//! Rows live in insertion order; listings walk them in reverse to return newest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::{DbResult, Store};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: Vec<UserProfile>,
    projects: Vec<Project>,
    services: Vec<Service>,
    activities: Vec<Activity>,
    content_generations: Vec<ContentGeneration>,
    social_posts: Vec<SocialPost>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique_violation(column: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!(
        "duplicate key value violates unique constraint on {}",
        column
    ))
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> DbResult<Duration> {
        let start = Instant::now();
        let _tables = self.tables.read().await;
        Ok(start.elapsed())
    }

    // users

    async fn find_user_by_clerk_id(&self, clerk_user_id: &str) -> DbResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.clerk_user_id.as_deref() == Some(clerk_user_id))
            .cloned())
    }

    async fn find_user(&self, id: Uuid) -> DbResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn upsert_user(&self, new: NewUser) -> DbResult<(User, bool)> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(existing) = tables
            .users
            .iter_mut()
            .find(|u| u.clerk_user_id.as_deref() == Some(new.clerk_user_id.as_str()))
        {
            existing.email = new.email;
            if new.first_name.is_some() {
                existing.first_name = new.first_name;
            }
            if new.last_name.is_some() {
                existing.last_name = new.last_name;
            }
            if new.avatar_url.is_some() {
                existing.avatar_url = new.avatar_url;
            }
            existing.updated_at = now;
            return Ok((existing.clone(), false));
        }

        if tables.users.iter().any(|u| u.email == new.email) {
            return Err(unique_violation("users.email"));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            avatar_url: new.avatar_url,
            role: new.role,
            permissions: Vec::new(),
            clerk_user_id: Some(new.clerk_user_id),
            subscription_plan: Plan::Free.as_str().to_string(),
            stripe_customer_id: None,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok((user, true))
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().rev().cloned().collect())
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> DbResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(first_name) = update.first_name {
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(permissions) = update.permissions {
            user.permissions = permissions;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn update_subscription(
        &self,
        id: Uuid,
        update: SubscriptionUpdate,
    ) -> DbResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.subscription_plan = update.plan;
        if update.stripe_customer_id.is_some() {
            user.stripe_customer_id = update.stripe_customer_id;
        }
        user.subscription_expires_at = update.expires_at;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> DbResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }

        // Mirror the ON DELETE CASCADE foreign keys.
        let project_ids: HashSet<Uuid> = tables
            .projects
            .iter()
            .filter(|p| p.user_id == id)
            .map(|p| p.id)
            .collect();
        let generation_ids: HashSet<Uuid> = tables
            .content_generations
            .iter()
            .filter(|g| g.user_id == id)
            .map(|g| g.id)
            .collect();

        tables.profiles.retain(|p| p.user_id != id);
        tables.projects.retain(|p| p.user_id != id);
        tables.services.retain(|s| !project_ids.contains(&s.project_id));
        tables.activities.retain(|a| a.user_id != id);
        tables.content_generations.retain(|g| g.user_id != id);
        tables
            .social_posts
            .retain(|p| !generation_ids.contains(&p.content_generation_id));
        Ok(true)
    }

    async fn count_users(&self) -> DbResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.users.len() as i64)
    }

    async fn count_admins(&self) -> DbResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| u.is_admin()).count() as i64)
    }

    async fn count_users_created_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| u.created_at >= since).count() as i64)
    }

    async fn count_active_users_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        let tables = self.tables.read().await;
        let active: HashSet<Uuid> = tables
            .activities
            .iter()
            .filter(|a| a.created_at >= since)
            .map(|a| a.user_id)
            .collect();
        Ok(active.len() as i64)
    }

    // profiles

    async fn find_profile(&self, user_id: Uuid) -> DbResult<Option<UserProfile>> {
        let tables = self.tables.read().await;
        Ok(tables.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn upsert_profile(&self, user_id: Uuid, update: ProfileUpdate) -> DbResult<UserProfile> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(profile) = tables.profiles.iter_mut().find(|p| p.user_id == user_id) {
            if update.full_name.is_some() {
                profile.full_name = update.full_name;
            }
            if update.avatar_url.is_some() {
                profile.avatar_url = update.avatar_url;
            }
            if update.locale.is_some() {
                profile.locale = update.locale;
            }
            profile.updated_at = now;
            return Ok(profile.clone());
        }

        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(sqlx::Error::RowNotFound);
        }

        let profile = UserProfile {
            user_id,
            full_name: update.full_name,
            avatar_url: update.avatar_url,
            locale: update.locale,
            created_at: now,
            updated_at: now,
        };
        tables.profiles.push(profile.clone());
        Ok(profile)
    }

    // projects

    async fn list_projects_for_user(&self, user_id: Uuid) -> DbResult<Vec<Project>> {
        let tables = self.tables.read().await;
        Ok(tables
            .projects
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_projects_with_owner(&self) -> DbResult<Vec<ProjectWithOwner>> {
        let tables = self.tables.read().await;
        Ok(tables
            .projects
            .iter()
            .rev()
            .map(|project| {
                let owner = tables.users.iter().find(|u| u.id == project.user_id);
                ProjectWithOwner {
                    project: project.clone(),
                    owner_email: owner.map(|u| u.email.clone()),
                    owner_first_name: owner.and_then(|u| u.first_name.clone()),
                    owner_last_name: owner.and_then(|u| u.last_name.clone()),
                }
            })
            .collect())
    }

    async fn find_project(&self, id: Uuid) -> DbResult<Option<Project>> {
        let tables = self.tables.read().await;
        Ok(tables.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_project(&self, new: NewProject) -> DbResult<Project> {
        let mut tables = self.tables.write().await;
        if !tables.users.iter().any(|u| u.id == new.user_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            status: new.status,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        };
        tables.projects.push(project.clone());
        Ok(project)
    }

    async fn count_projects(&self) -> DbResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.projects.len() as i64)
    }

    // services

    async fn list_services_for_project(&self, project_id: Uuid) -> DbResult<Vec<Service>> {
        let tables = self.tables.read().await;
        Ok(tables
            .services
            .iter()
            .rev()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn list_services_for_user(&self, user_id: Uuid) -> DbResult<Vec<Service>> {
        let tables = self.tables.read().await;
        let owned: HashSet<Uuid> = tables
            .projects
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.id)
            .collect();
        Ok(tables
            .services
            .iter()
            .rev()
            .filter(|s| owned.contains(&s.project_id))
            .cloned()
            .collect())
    }

    async fn list_service_statuses(&self) -> DbResult<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables.services.iter().map(|s| s.status.clone()).collect())
    }

    async fn find_service(&self, id: Uuid) -> DbResult<Option<Service>> {
        let tables = self.tables.read().await;
        Ok(tables.services.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_service(&self, new: NewService) -> DbResult<Service> {
        let mut tables = self.tables.write().await;
        if !tables.projects.iter().any(|p| p.id == new.project_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            name: new.name,
            service_type: new.service_type,
            status: new.status,
            project_id: new.project_id,
            config: new.config,
            created_at: now,
            updated_at: now,
        };
        tables.services.push(service.clone());
        Ok(service)
    }

    async fn update_service_status(&self, id: Uuid, status: &str) -> DbResult<Option<Service>> {
        let mut tables = self.tables.write().await;
        let Some(service) = tables.services.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        service.status = status.to_string();
        service.updated_at = Utc::now();
        Ok(Some(service.clone()))
    }

    // activity

    async fn list_activities_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<Activity>> {
        let tables = self.tables.read().await;
        Ok(tables
            .activities
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_activity(&self, new: NewActivity) -> DbResult<Activity> {
        let mut tables = self.tables.write().await;
        if !tables.users.iter().any(|u| u.id == new.user_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let activity = Activity {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            action: new.action,
            resource_type: new.resource_type,
            resource_id: new.resource_id,
            details: new.details,
            status: new.status,
            created_at: Utc::now(),
        };
        tables.activities.push(activity.clone());
        Ok(activity)
    }

    // content automation

    async fn insert_content_generation(
        &self,
        new: NewContentGeneration,
    ) -> DbResult<ContentGeneration> {
        let mut tables = self.tables.write().await;
        if !tables.users.iter().any(|u| u.id == new.user_id) {
            return Err(sqlx::Error::RowNotFound);
        }
        let now = Utc::now();
        let generation = ContentGeneration {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            original_image_url: new.original_image_url,
            extracted_text: new.extracted_text,
            user_comment: new.user_comment,
            generated_content: new.generated_content,
            status: new.status,
            created_at: now,
            updated_at: now,
        };
        tables.content_generations.push(generation.clone());
        Ok(generation)
    }

    async fn list_content_generations_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<ContentGeneration>> {
        let tables = self.tables.read().await;
        Ok(tables
            .content_generations
            .iter()
            .rev()
            .filter(|g| g.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_content_generation(&self, id: Uuid) -> DbResult<Option<ContentGeneration>> {
        let tables = self.tables.read().await;
        Ok(tables.content_generations.iter().find(|g| g.id == id).cloned())
    }

    async fn insert_social_post(&self, new: NewSocialPost) -> DbResult<SocialPost> {
        let mut tables = self.tables.write().await;
        if !tables
            .content_generations
            .iter()
            .any(|g| g.id == new.content_generation_id)
        {
            return Err(sqlx::Error::RowNotFound);
        }
        let post = SocialPost {
            id: Uuid::new_v4(),
            content_generation_id: new.content_generation_id,
            platform: new.platform,
            status: new.status,
            platform_post_id: None,
            error_message: None,
            published_at: None,
            created_at: Utc::now(),
        };
        tables.social_posts.push(post.clone());
        Ok(post)
    }

    async fn list_social_posts(&self, content_generation_id: Uuid) -> DbResult<Vec<SocialPost>> {
        let tables = self.tables.read().await;
        Ok(tables
            .social_posts
            .iter()
            .rev()
            .filter(|p| p.content_generation_id == content_generation_id)
            .cloned()
            .collect())
    }

    async fn find_social_post(&self, id: Uuid) -> DbResult<Option<SocialPost>> {
        let tables = self.tables.read().await;
        Ok(tables.social_posts.iter().find(|p| p.id == id).cloned())
    }

    async fn update_social_post(
        &self,
        id: Uuid,
        update: SocialPostUpdate,
    ) -> DbResult<Option<SocialPost>> {
        let mut tables = self.tables.write().await;
        let Some(post) = tables.social_posts.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        if let Some(status) = update.status {
            post.status = status;
        }
        if update.platform_post_id.is_some() {
            post.platform_post_id = update.platform_post_id;
        }
        if update.error_message.is_some() {
            post.error_message = update.error_message;
        }
        if update.published_at.is_some() {
            post.published_at = update.published_at;
        }
        Ok(Some(post.clone()))
    }
}

//! Data-access functions used by the page and API handlers.
//!
//! Each function wraps one `Store` call. Errors are logged with the operation name
//! and turned into `None` or an empty collection; callers never see `sqlx::Error`.

use chrono::{DateTime, Datelike, Duration, Utc};
use uuid::Uuid;

use super::models::*;
use super::Store;

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 10;
pub const CONTENT_GENERATION_LIMIT: i64 = 20;
const DASHBOARD_PROJECTS: usize = 5;
const DASHBOARD_SERVICES: usize = 10;
const ACTIVE_USER_WINDOW_DAYS: i64 = 30;

fn log_error(op: &'static str, e: &sqlx::Error) {
    tracing::error!(op, error = %e, "Database operation failed");
}

fn or_none<T>(op: &'static str, result: Result<Option<T>, sqlx::Error>) -> Option<T> {
    result.unwrap_or_else(|e| {
        log_error(op, &e);
        None
    })
}

fn or_log<T>(op: &'static str, result: Result<T, sqlx::Error>) -> Option<T> {
    result.map_err(|e| log_error(op, &e)).ok()
}

fn or_empty<T>(op: &'static str, result: Result<Vec<T>, sqlx::Error>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        log_error(op, &e);
        Vec::new()
    })
}

fn or_zero(op: &'static str, result: Result<i64, sqlx::Error>) -> i64 {
    result.unwrap_or_else(|e| {
        log_error(op, &e);
        0
    })
}

/// Usage points a service counts for against the plan quota.
pub fn service_usage(service_type: &str) -> u32 {
    match service_type {
        "database" => 25,
        "api" => 15,
        _ => 10,
    }
}

// ============================================================================
// Users
// ============================================================================

pub async fn get_user_by_clerk_id(store: &dyn Store, clerk_user_id: &str) -> Option<User> {
    or_none(
        "get_user_by_clerk_id",
        store.find_user_by_clerk_id(clerk_user_id).await,
    )
}

pub async fn get_user(store: &dyn Store, id: Uuid) -> Option<User> {
    or_none("get_user", store.find_user(id).await)
}

/// Upsert on `clerk_user_id`. The flag tells whether a new row was inserted.
pub async fn create_user(store: &dyn Store, new: NewUser) -> Option<(User, bool)> {
    or_log("create_user", store.upsert_user(new).await)
}

pub async fn get_all_users(store: &dyn Store) -> Vec<User> {
    or_empty("get_all_users", store.list_users().await)
}

pub async fn update_user(store: &dyn Store, id: Uuid, update: UserUpdate) -> Option<User> {
    or_none("update_user", store.update_user(id, update).await)
}

pub async fn update_subscription(
    store: &dyn Store,
    id: Uuid,
    update: SubscriptionUpdate,
) -> Option<User> {
    or_none("update_subscription", store.update_subscription(id, update).await)
}

pub async fn delete_user(store: &dyn Store, id: Uuid) -> bool {
    or_log("delete_user", store.delete_user(id).await).unwrap_or(false)
}

/// First-login provisioning: upsert the user and, when the row is new, create the
/// profile and record a single `account_created` activity.
pub async fn ensure_user(store: &dyn Store, new: NewUser) -> Option<User> {
    let full_name = [new.first_name.as_deref(), new.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let avatar_url = new.avatar_url.clone();

    let (user, created) = create_user(store, new).await?;
    if created {
        tracing::info!(user_id = %user.id, role = %user.role, "Created user on first login");
        upsert_user_profile(
            store,
            user.id,
            ProfileUpdate {
                full_name: Some(full_name).filter(|n| !n.is_empty()),
                avatar_url,
                locale: None,
            },
        )
        .await;
        log_activity(
            store,
            NewActivity::success(user.id, "account_created", "user", user.id),
        )
        .await;
    }
    Some(user)
}

// ============================================================================
// Profiles
// ============================================================================

pub async fn get_user_profile(store: &dyn Store, user_id: Uuid) -> Option<UserProfile> {
    or_none("get_user_profile", store.find_profile(user_id).await)
}

pub async fn upsert_user_profile(
    store: &dyn Store,
    user_id: Uuid,
    update: ProfileUpdate,
) -> Option<UserProfile> {
    or_log("upsert_user_profile", store.upsert_profile(user_id, update).await)
}

// ============================================================================
// Projects & services
// ============================================================================

pub async fn get_user_projects(store: &dyn Store, user_id: Uuid) -> Vec<Project> {
    or_empty("get_user_projects", store.list_projects_for_user(user_id).await)
}

pub async fn get_all_projects(store: &dyn Store) -> Vec<ProjectWithOwner> {
    or_empty("get_all_projects", store.list_projects_with_owner().await)
}

pub async fn get_project(store: &dyn Store, id: Uuid) -> Option<Project> {
    or_none("get_project", store.find_project(id).await)
}

pub async fn create_project(store: &dyn Store, new: NewProject) -> Option<Project> {
    or_log("create_project", store.insert_project(new).await)
}

pub async fn get_project_services(store: &dyn Store, project_id: Uuid) -> Vec<Service> {
    or_empty(
        "get_project_services",
        store.list_services_for_project(project_id).await,
    )
}

pub async fn get_user_services(store: &dyn Store, user_id: Uuid) -> Vec<Service> {
    or_empty("get_user_services", store.list_services_for_user(user_id).await)
}

pub async fn get_service(store: &dyn Store, id: Uuid) -> Option<Service> {
    or_none("get_service", store.find_service(id).await)
}

pub async fn create_service(store: &dyn Store, new: NewService) -> Option<Service> {
    or_log("create_service", store.insert_service(new).await)
}

pub async fn update_service_status(store: &dyn Store, id: Uuid, status: &str) -> Option<Service> {
    or_none(
        "update_service_status",
        store.update_service_status(id, status).await,
    )
}

// ============================================================================
// Activity
// ============================================================================

pub async fn get_user_activity(store: &dyn Store, user_id: Uuid, limit: i64) -> Vec<Activity> {
    or_empty(
        "get_user_activity",
        store.list_activities_for_user(user_id, limit).await,
    )
}

pub async fn log_activity(store: &dyn Store, new: NewActivity) -> Option<Activity> {
    or_log("log_activity", store.insert_activity(new).await)
}

// ============================================================================
// Aggregates
// ============================================================================

pub async fn get_user_stats(store: &dyn Store, user_id: Uuid) -> UserStats {
    let (projects, services, latest) = tokio::join!(
        get_user_projects(store, user_id),
        get_user_services(store, user_id),
        get_user_activity(store, user_id, 1),
    );

    UserStats {
        projects_count: projects.len(),
        active_services: services.iter().filter(|s| s.status == "running").count(),
        total_usage: services.iter().map(|s| service_usage(&s.service_type)).sum(),
        last_activity: latest
            .first()
            .map(|a| a.created_at)
            .unwrap_or_else(Utc::now),
    }
}

/// Everything the client dashboard renders. `None` when the user does not exist.
pub async fn get_dashboard_data(store: &dyn Store, clerk_user_id: &str) -> Option<DashboardData> {
    let user = get_user_by_clerk_id(store, clerk_user_id).await?;

    let (stats, mut recent_projects, recent_activity, mut services) = tokio::join!(
        get_user_stats(store, user.id),
        get_user_projects(store, user.id),
        get_user_activity(store, user.id, DEFAULT_ACTIVITY_LIMIT),
        get_user_services(store, user.id),
    );
    recent_projects.truncate(DASHBOARD_PROJECTS);
    services.truncate(DASHBOARD_SERVICES);

    Some(DashboardData {
        user,
        stats,
        recent_projects,
        recent_activity,
        services,
    })
}

pub async fn get_system_stats(store: &dyn Store) -> SystemStats {
    let (total_users, total_projects, statuses) = tokio::join!(
        store.count_users(),
        store.count_projects(),
        store.list_service_statuses(),
    );
    let statuses = or_empty("get_system_stats", statuses);

    SystemStats {
        total_users: or_zero("get_system_stats", total_users),
        total_projects: or_zero("get_system_stats", total_projects),
        total_services: statuses.len(),
        active_services: statuses.iter().filter(|s| *s == "running").count(),
    }
}

/// Start of the calendar month containing `now`, in UTC.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

pub async fn get_admin_stats(store: &dyn Store, now: DateTime<Utc>) -> AdminStats {
    let (total_users, active_users, admin_users, new_users_this_month) = tokio::join!(
        store.count_users(),
        store.count_active_users_since(now - Duration::days(ACTIVE_USER_WINDOW_DAYS)),
        store.count_admins(),
        store.count_users_created_since(month_start(now)),
    );

    AdminStats {
        total_users: or_zero("get_admin_stats", total_users),
        active_users: or_zero("get_admin_stats", active_users),
        admin_users: or_zero("get_admin_stats", admin_users),
        new_users_this_month: or_zero("get_admin_stats", new_users_this_month),
    }
}

// ============================================================================
// Content automation
// ============================================================================

pub async fn create_content_generation(
    store: &dyn Store,
    new: NewContentGeneration,
) -> Option<ContentGeneration> {
    or_log(
        "create_content_generation",
        store.insert_content_generation(new).await,
    )
}

pub async fn get_user_content_generations(
    store: &dyn Store,
    user_id: Uuid,
) -> Vec<ContentGeneration> {
    or_empty(
        "get_user_content_generations",
        store
            .list_content_generations_for_user(user_id, CONTENT_GENERATION_LIMIT)
            .await,
    )
}

pub async fn get_content_generation(store: &dyn Store, id: Uuid) -> Option<ContentGeneration> {
    or_none("get_content_generation", store.find_content_generation(id).await)
}

pub async fn create_social_post(store: &dyn Store, new: NewSocialPost) -> Option<SocialPost> {
    or_log("create_social_post", store.insert_social_post(new).await)
}

pub async fn get_generation_posts(store: &dyn Store, content_generation_id: Uuid) -> Vec<SocialPost> {
    or_empty(
        "get_generation_posts",
        store.list_social_posts(content_generation_id).await,
    )
}

pub async fn get_social_post(store: &dyn Store, id: Uuid) -> Option<SocialPost> {
    or_none("get_social_post", store.find_social_post(id).await)
}

pub async fn update_social_post(
    store: &dyn Store,
    id: Uuid,
    update: SocialPostUpdate,
) -> Option<SocialPost> {
    or_none("update_social_post", store.update_social_post(id, update).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use chrono::TimeZone;

    fn new_user(clerk_user_id: &str) -> NewUser {
        NewUser {
            email: format!("{}@soloflow.io", clerk_user_id),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            avatar_url: None,
            role: Role::Client.as_str().to_string(),
            clerk_user_id: clerk_user_id.to_string(),
        }
    }

    async fn project(store: &dyn Store, user_id: Uuid, name: &str) -> Project {
        create_project(
            store,
            NewProject {
                name: name.to_string(),
                description: None,
                status: ProjectStatus::Active.as_str().to_string(),
                user_id,
            },
        )
        .await
        .unwrap()
    }

    async fn service(store: &dyn Store, project_id: Uuid, kind: &str, status: &str) -> Service {
        create_service(
            store,
            NewService {
                project_id,
                name: format!("{}-svc", kind),
                service_type: kind.to_string(),
                status: status.to_string(),
                config: serde_json::json!({}),
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_service_usage_weights() {
        assert_eq!(service_usage("database"), 25);
        assert_eq!(service_usage("api"), 15);
        assert_eq!(service_usage("web"), 10);
        assert_eq!(service_usage("storage"), 10);
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 14, 30, 0).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_create_user_twice_is_idempotent() {
        let store = MemoryStore::new();
        let (first, created) = create_user(&store, new_user("user_1")).await.unwrap();
        assert!(created);
        let (second, created) = create_user(&store, new_user("user_1")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(get_all_users(&store).await.len(), 1);
    }

    #[tokio::test]
    async fn test_dashboard_data_missing_user_is_none() {
        let store = MemoryStore::new();
        assert!(get_dashboard_data(&store, "user_unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_ensure_user_logs_account_created_once() {
        let store = MemoryStore::new();
        let user = ensure_user(&store, new_user("user_1")).await.unwrap();
        ensure_user(&store, new_user("user_1")).await.unwrap();

        let activity = get_user_activity(&store, user.id, DEFAULT_ACTIVITY_LIMIT).await;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].action, "account_created");
        assert_eq!(activity[0].status, "success");

        let profile = get_user_profile(&store, user.id).await.unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test]
    async fn test_user_stats_and_dashboard_truncation() {
        let store = MemoryStore::new();
        let user = ensure_user(&store, new_user("user_1")).await.unwrap();

        let mut last = None;
        for i in 0..7 {
            last = Some(project(&store, user.id, &format!("p{}", i)).await);
        }
        let last = last.unwrap();
        service(&store, last.id, "database", "running").await;
        service(&store, last.id, "api", "stopped").await;
        service(&store, last.id, "web", "running").await;

        let stats = get_user_stats(&store, user.id).await;
        assert_eq!(stats.projects_count, 7);
        assert_eq!(stats.active_services, 2);
        assert_eq!(stats.total_usage, 50);

        let data = get_dashboard_data(&store, "user_1").await.unwrap();
        assert_eq!(data.recent_projects.len(), 5);
        assert_eq!(data.recent_projects[0].name, "p6");
        assert_eq!(data.services.len(), 3);
        assert_eq!(data.stats.projects_count, 7);
    }

    #[tokio::test]
    async fn test_system_and_admin_stats() {
        let store = MemoryStore::new();
        let user = ensure_user(&store, new_user("user_1")).await.unwrap();
        let mut admin = new_user("user_2");
        admin.role = Role::Admin.as_str().to_string();
        create_user(&store, admin).await.unwrap();

        let p = project(&store, user.id, "site").await;
        service(&store, p.id, "web", "running").await;
        service(&store, p.id, "api", "error").await;

        let system = get_system_stats(&store).await;
        assert_eq!(system.total_users, 2);
        assert_eq!(system.total_projects, 1);
        assert_eq!(system.total_services, 2);
        assert_eq!(system.active_services, 1);

        let admin_stats = get_admin_stats(&store, Utc::now()).await;
        assert_eq!(admin_stats.total_users, 2);
        assert_eq!(admin_stats.admin_users, 1);
        assert_eq!(admin_stats.active_users, 1);
        assert_eq!(admin_stats.new_users_this_month, 2);
    }

    #[tokio::test]
    async fn test_failed_insert_is_logged_as_none() {
        let store = MemoryStore::new();
        let created = create_project(
            &store,
            NewProject {
                name: "orphan".to_string(),
                description: None,
                status: "active".to_string(),
                user_id: Uuid::new_v4(),
            },
        )
        .await;
        assert!(created.is_none());
    }
}

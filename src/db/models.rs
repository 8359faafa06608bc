//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {}: '{}' (expected one of: {})",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Coarse access role stored in `users.role`.
    Role { Admin => "admin", User => "user", Client => "client" }
);

text_enum!(ProjectStatus {
    Active => "active",
    Inactive => "inactive",
    Completed => "completed",
    Archived => "archived",
});

text_enum!(ServiceType {
    Web => "web",
    Api => "api",
    Database => "database",
    Storage => "storage",
});

text_enum!(ServiceStatus { Running => "running", Stopped => "stopped", Error => "error" });

text_enum!(
    /// Publishing state of a social post.
    PostStatus { Pending => "pending", Published => "published", Failed => "failed" }
);

text_enum!(ActivityStatus { Success => "success", Error => "error", Pending => "pending" });

text_enum!(
    /// Subscription plans offered on the billing page.
    Plan { Free => "free", Pro => "pro", Business => "business" }
);

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
    pub clerk_user_id: Option<String>,
    pub subscription_plan: String,
    pub stripe_customer_id: Option<String>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// "First Last", falling back to the e-mail address.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

/// New user for insertion (upserted on `clerk_user_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub clerk_user_id: String,
}

/// Admin-driven user update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub plan: String,
    pub stripe_customer_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub locale: Option<String>,
}

// ============================================================================
// Projects & services
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project joined with its owner, for the admin listing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: Project,
    pub owner_email: Option<String>,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub service_type: String,
    pub status: String,
    pub project_id: Uuid,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub project_id: Uuid,
    pub name: String,
    pub service_type: String,
    pub status: String,
    pub config: serde_json::Value,
}

// ============================================================================
// Activity
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    pub user_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub status: String,
}

impl NewActivity {
    /// A successful action on a resource.
    pub fn success(user_id: Uuid, action: &str, resource_type: &str, resource_id: Uuid) -> Self {
        Self {
            user_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details: None,
            status: ActivityStatus::Success.as_str().to_string(),
        }
    }
}

// ============================================================================
// Content automation
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentGeneration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_image_url: String,
    pub extracted_text: Option<String>,
    pub user_comment: Option<String>,
    pub generated_content: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContentGeneration {
    pub user_id: Uuid,
    pub original_image_url: String,
    pub extracted_text: Option<String>,
    pub user_comment: Option<String>,
    pub generated_content: serde_json::Value,
    pub status: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub id: Uuid,
    pub content_generation_id: Uuid,
    pub platform: String,
    pub status: String,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSocialPost {
    pub content_generation_id: Uuid,
    pub platform: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPostUpdate {
    pub status: Option<String>,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub projects_count: usize,
    pub active_services: usize,
    pub total_usage: u32,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub user: User,
    pub stats: UserStats,
    pub recent_projects: Vec<Project>,
    pub recent_activity: Vec<Activity>,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub total_users: i64,
    pub total_projects: i64,
    pub total_services: usize,
    pub active_services: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub active_users: i64,
    pub admin_users: i64,
    pub new_users_this_month: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: Option<&str>, last: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "jane@soloflow.io".to_string(),
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            avatar_url: None,
            role: "client".to_string(),
            permissions: vec![],
            clerk_user_id: Some("user_1".to_string()),
            subscription_plan: "free".to_string(),
            stripe_customer_id: None,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(user(Some("Jane"), Some("Doe")).display_name(), "Jane Doe");
        assert_eq!(user(Some("Jane"), Some(" ")).display_name(), "Jane");
        assert_eq!(user(None, None).display_name(), "jane@soloflow.io");
    }

    #[test]
    fn test_role_parse_rejects_unknown() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        let err = "root".parse::<Role>().unwrap_err();
        assert!(err.contains("admin, user, client"));
    }

    #[test]
    fn test_service_serializes_type_field() {
        let now = Utc::now();
        let service = Service {
            id: Uuid::new_v4(),
            name: "api".to_string(),
            service_type: ServiceType::Api.as_str().to_string(),
            status: "running".to_string(),
            project_id: Uuid::new_v4(),
            config: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&service).unwrap();
        assert_eq!(json["type"], "api");
        assert!(json.get("serviceType").is_none());
    }
}

//! Application configuration read from the environment.
//!
//! Every value has a development fallback so the server can start with an empty
//! `.env`; production checks happen in [`crate::run`].

use crate::i18n::Locale;

/// Placeholder publishable key shipped in the sample `.env`.
const PLACEHOLDER_PUBLISHABLE_KEY: &str = "pk_test_your_key_here";

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated allow-list, dropping blanks and normalising case.
pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Identity provider settings.
#[derive(Debug, Clone)]
pub struct ClerkConfig {
    pub publishable_key: Option<String>,
    pub secret_key: Option<String>,
    /// PEM-encoded RS256 public key used for networkless session verification.
    pub jwt_key: Option<String>,
    pub api_url: String,
    pub sign_in_url: Option<String>,
    pub sign_up_url: Option<String>,
}

impl ClerkConfig {
    /// Session verification is only possible with a real publishable key and a JWT key.
    pub fn is_enabled(&self) -> bool {
        let key_ok = self
            .publishable_key
            .as_deref()
            .map(|k| !k.starts_with(PLACEHOLDER_PUBLISHABLE_KEY))
            .unwrap_or(false);
        key_ok && self.jwt_key.is_some()
    }
}

impl Default for ClerkConfig {
    fn default() -> Self {
        Self {
            publishable_key: env_opt("CLERK_PUBLISHABLE_KEY")
                .or_else(|| env_opt("NEXT_PUBLIC_CLERK_PUBLISHABLE_KEY")),
            secret_key: env_opt("CLERK_SECRET_KEY"),
            jwt_key: env_opt("CLERK_JWT_KEY").map(|k| k.replace("\\n", "\n")),
            api_url: env_or("CLERK_API_URL", "https://api.clerk.com/v1"),
            sign_in_url: env_opt("CLERK_SIGN_IN_URL"),
            sign_up_url: env_opt("CLERK_SIGN_UP_URL"),
        }
    }
}

/// Stripe price ids per plan and interval.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    pub pro_monthly: Option<String>,
    pub pro_yearly: Option<String>,
    pub business_monthly: Option<String>,
    pub business_yearly: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub secret_key: Option<String>,
    pub api_url: String,
    pub prices: PriceIds,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            secret_key: env_opt("STRIPE_SECRET_KEY").or_else(|| env_opt("STRIPE_API_KEY")),
            api_url: env_or("STRIPE_API_URL", "https://api.stripe.com/v1"),
            prices: PriceIds {
                pro_monthly: env_opt("STRIPE_PRO_MONTHLY_PRICE_ID"),
                pro_yearly: env_opt("STRIPE_PRO_YEARLY_PRICE_ID"),
                business_monthly: env_opt("STRIPE_BUSINESS_MONTHLY_PRICE_ID"),
                business_yearly: env_opt("STRIPE_BUSINESS_YEARLY_PRICE_ID"),
            },
        }
    }
}

/// Hosted database administrative endpoint, used only by the maintenance scripts.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: env_opt("SUPABASE_URL").or_else(|| env_opt("NEXT_PUBLIC_SUPABASE_URL")),
            service_key: env_opt("SUPABASE_SERVICE_ROLE_KEY")
                .or_else(|| env_opt("SUPABASE_ANON_KEY"))
                .or_else(|| env_opt("NEXT_PUBLIC_SUPABASE_ANON_KEY")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub app_url: String,
    pub default_locale: Locale,
    pub admin_emails: Vec<String>,
    pub clerk: ClerkConfig,
    pub billing: BillingConfig,
    pub supabase: SupabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Exact, case-insensitive membership in the `ADMIN_EMAIL` allow-list.
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    /// Absolute URL for an application path.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.app_url.trim_end_matches('/'), path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: env_or("ENVIRONMENT", "development"),
            app_url: env_opt("APP_URL")
                .or_else(|| env_opt("NEXT_PUBLIC_APP_URL"))
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            default_locale: env_opt("DEFAULT_LOCALE")
                .and_then(|l| l.parse().ok())
                .unwrap_or_default(),
            admin_emails: parse_email_list(&env_or("ADMIN_EMAIL", "")),
            clerk: ClerkConfig::default(),
            billing: BillingConfig::default(),
            supabase: SupabaseConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clerk(publishable: Option<&str>, jwt: Option<&str>) -> ClerkConfig {
        ClerkConfig {
            publishable_key: publishable.map(str::to_string),
            secret_key: None,
            jwt_key: jwt.map(str::to_string),
            api_url: "https://api.clerk.com/v1".to_string(),
            sign_in_url: None,
            sign_up_url: None,
        }
    }

    #[test]
    fn test_parse_email_list_trims_and_lowercases() {
        let list = parse_email_list(" Admin@SoloFlow.io, ,ops@soloflow.io ");
        assert_eq!(list, vec!["admin@soloflow.io", "ops@soloflow.io"]);
    }

    #[test]
    fn test_is_admin_email_is_exact_match() {
        let config = AppConfig {
            admin_emails: parse_email_list("admin@soloflow.io"),
            ..AppConfig::default()
        };
        assert!(config.is_admin_email("ADMIN@soloflow.io"));
        assert!(!config.is_admin_email("admin@soloflow.io.evil"));
        assert!(!config.is_admin_email(""));
    }

    #[test]
    fn test_clerk_disabled_with_placeholder_key() {
        assert!(!clerk(Some("pk_test_your_key_here_123"), Some("pem")).is_enabled());
        assert!(!clerk(Some("pk_live_abc"), None).is_enabled());
        assert!(!clerk(None, Some("pem")).is_enabled());
        assert!(clerk(Some("pk_live_abc"), Some("pem")).is_enabled());
    }

    #[test]
    fn test_absolute_url_joins_without_double_slash() {
        let config = AppConfig {
            app_url: "https://soloflow.io/".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.absolute_url("/fr/dashboard"), "https://soloflow.io/fr/dashboard");
    }
}

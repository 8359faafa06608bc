//! Locales and UI strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Fr,
    En,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::Fr, Locale::En];

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Fr => "fr",
            Locale::En => "en",
        }
    }

    pub fn dict(&self) -> &'static Dictionary {
        match self {
            Locale::Fr => &FR,
            Locale::En => &EN,
        }
    }

    /// Prefix an application path with this locale.
    pub fn path(&self, path: &str) -> String {
        if path.is_empty() || path == "/" {
            format!("/{}", self.as_str())
        } else {
            format!("/{}{}", self.as_str(), path)
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fr" => Ok(Locale::Fr),
            "en" => Ok(Locale::En),
            other => Err(format!("unsupported locale: {}", other)),
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Dictionary {
    pub app_name: &'static str,
    pub tagline: &'static str,
    pub sign_in: &'static str,
    pub sign_up: &'static str,
    pub sign_out: &'static str,
    pub continue_with_google: &'static str,
    pub welcome: &'static str,
    pub overview: &'static str,
    pub projects: &'static str,
    pub active_projects: &'static str,
    pub active_services: &'static str,
    pub of_total: &'static str,
    pub usage: &'static str,
    pub of_quota: &'static str,
    pub last_activity: &'static str,
    pub recent_activity: &'static str,
    pub services: &'static str,
    pub no_projects: &'static str,
    pub no_services: &'static str,
    pub no_activity: &'static str,
    pub new_project: &'static str,
    pub load_error_title: &'static str,
    pub load_error_body: &'static str,
    pub access_denied_title: &'static str,
    pub access_denied_body: &'static str,
    pub admin_title: &'static str,
    pub signed_in_as: &'static str,
    pub users: &'static str,
    pub active_users: &'static str,
    pub admins: &'static str,
    pub new_this_month: &'static str,
    pub total_services: &'static str,
    pub running_services: &'static str,
    pub all_projects: &'static str,
    pub billing_title: &'static str,
    pub current_plan: &'static str,
    pub upgrade: &'static str,
    pub manage_subscription: &'static str,
    pub monthly: &'static str,
    pub yearly: &'static str,
    pub billing_unavailable: &'static str,
    pub checkout_confirmed: &'static str,
    pub profile_title: &'static str,
    pub profile_description: &'static str,
    pub never: &'static str,
    pub ago_minutes: &'static str,
    pub ago_hours: &'static str,
    pub ago_days: &'static str,
}

pub static FR: Dictionary = Dictionary {
    app_name: "SoloFlow",
    tagline: "Automatisez votre contenu, publiez partout.",
    sign_in: "Se connecter",
    sign_up: "Créer un compte",
    sign_out: "Déconnexion",
    continue_with_google: "Continuer avec Google",
    welcome: "Bienvenue",
    overview: "Voici un aperçu de votre activité et de vos projets.",
    projects: "Projets",
    active_projects: "actifs",
    active_services: "Services actifs",
    of_total: "sur",
    usage: "Utilisation",
    of_quota: "de votre quota",
    last_activity: "Dernière activité",
    recent_activity: "Activité récente",
    services: "Services",
    no_projects: "Aucun projet pour le moment.",
    no_services: "Aucun service configuré.",
    no_activity: "Aucune activité récente.",
    new_project: "Nouveau projet",
    load_error_title: "Erreur de chargement",
    load_error_body: "Impossible de charger vos données. Veuillez réessayer plus tard.",
    access_denied_title: "Accès refusé",
    access_denied_body:
        "Vous n'avez pas les droits administrateur nécessaires pour accéder à cette section.",
    admin_title: "Administration SoloFlow",
    signed_in_as: "Connecté en tant que",
    users: "Utilisateurs",
    active_users: "Utilisateurs actifs (30 jours)",
    admins: "Administrateurs",
    new_this_month: "Nouveaux ce mois",
    total_services: "Services",
    running_services: "en fonctionnement",
    all_projects: "Tous les projets",
    billing_title: "Facturation",
    current_plan: "Offre actuelle",
    upgrade: "Passer à l'offre supérieure",
    manage_subscription: "Gérer l'abonnement",
    monthly: "Mensuel",
    yearly: "Annuel",
    billing_unavailable: "La facturation n'est pas configurée.",
    checkout_confirmed: "Votre abonnement est actif.",
    profile_title: "Profil utilisateur",
    profile_description: "Gérez vos informations personnelles et préférences",
    never: "Jamais",
    ago_minutes: "Il y a {n} min",
    ago_hours: "Il y a {n}h",
    ago_days: "Il y a {n}j",
};

pub static EN: Dictionary = Dictionary {
    app_name: "SoloFlow",
    tagline: "Automate your content, publish everywhere.",
    sign_in: "Sign in",
    sign_up: "Create an account",
    sign_out: "Sign out",
    continue_with_google: "Continue with Google",
    welcome: "Welcome",
    overview: "Here is an overview of your activity and projects.",
    projects: "Projects",
    active_projects: "active",
    active_services: "Active services",
    of_total: "of",
    usage: "Usage",
    of_quota: "of your quota",
    last_activity: "Last activity",
    recent_activity: "Recent activity",
    services: "Services",
    no_projects: "No projects yet.",
    no_services: "No services configured.",
    no_activity: "No recent activity.",
    new_project: "New project",
    load_error_title: "Loading error",
    load_error_body: "We could not load your data. Please try again later.",
    access_denied_title: "Access denied",
    access_denied_body: "You do not have the administrator rights required for this section.",
    admin_title: "SoloFlow administration",
    signed_in_as: "Signed in as",
    users: "Users",
    active_users: "Active users (30 days)",
    admins: "Administrators",
    new_this_month: "New this month",
    total_services: "Services",
    running_services: "running",
    all_projects: "All projects",
    billing_title: "Billing",
    current_plan: "Current plan",
    upgrade: "Upgrade",
    manage_subscription: "Manage subscription",
    monthly: "Monthly",
    yearly: "Yearly",
    billing_unavailable: "Billing is not configured.",
    checkout_confirmed: "Your subscription is active.",
    profile_title: "User profile",
    profile_description: "Manage your personal information and preferences",
    never: "Never",
    ago_minutes: "{n} min ago",
    ago_hours: "{n}h ago",
    ago_days: "{n}d ago",
};

/// Coarse relative time: minutes under an hour, hours under a day, then days.
pub fn format_time_ago(locale: Locale, at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let dict = locale.dict();
    let minutes = (now - at).num_minutes().max(0);
    let (template, n) = if minutes < 60 {
        (dict.ago_minutes, minutes)
    } else if minutes < 1440 {
        (dict.ago_hours, minutes / 60)
    } else {
        (dict.ago_days, minutes / 1440)
    };
    template.replace("{n}", &n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_locale_parse_is_case_insensitive() {
        assert_eq!("FR".parse::<Locale>().unwrap(), Locale::Fr);
        assert_eq!("en".parse::<Locale>().unwrap(), Locale::En);
        assert!("de".parse::<Locale>().is_err());
    }

    #[test]
    fn test_locale_path_prefix() {
        assert_eq!(Locale::En.path("/dashboard"), "/en/dashboard");
        assert_eq!(Locale::Fr.path("/"), "/fr");
    }

    #[test]
    fn test_format_time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(format_time_ago(Locale::Fr, now - Duration::minutes(5), now), "Il y a 5 min");
        assert_eq!(format_time_ago(Locale::Fr, now - Duration::hours(2), now), "Il y a 2h");
        assert_eq!(format_time_ago(Locale::En, now - Duration::days(3), now), "3d ago");
    }

    #[test]
    fn test_format_time_ago_future_is_zero_minutes() {
        let now = Utc::now();
        assert_eq!(format_time_ago(Locale::En, now + Duration::minutes(10), now), "0 min ago");
    }
}

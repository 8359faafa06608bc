//! Clerk session verification.
//!
//! The session JWT arrives in the `__session` cookie (browser) or as a bearer token
//! (API clients). It is verified offline with the instance's RS256 public key; the
//! full user record is then read from the backend API when a secret key is set.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::{SessionProvider, SessionUser};
use crate::config::ClerkConfig;
use crate::upstream::{self, UpstreamError, HTTP_CLIENT};

pub const SESSION_COOKIE: &str = "__session";
/// Companion cookie Clerk uses to detect sign-out across tabs.
pub const CLIENT_UAT_COOKIE: &str = "__client_uat";

const CLOCK_SKEW_SECS: u64 = 5;

/// Claims of a Clerk session token. Profile fields appear only when the
/// instance's session template adds them.
#[derive(Debug, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    id: String,
    email_address: String,
}

/// Subset of the backend API user object we read.
#[derive(Debug, Deserialize)]
struct ClerkUser {
    id: String,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    primary_email_address_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

impl ClerkUser {
    fn primary_email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .find(|e| Some(e.id.as_str()) == primary)
            .or_else(|| self.email_addresses.first())
            .map(|e| e.email_address.as_str())
    }
}

pub struct ClerkSessions {
    decoding_key: DecodingKey,
    validation: Validation,
    secret_key: Option<String>,
    api_url: String,
}

impl ClerkSessions {
    /// `Ok(None)` when the provider is not configured.
    pub fn from_config(config: &ClerkConfig) -> Result<Option<Self>, UpstreamError> {
        if !config.is_enabled() {
            return Ok(None);
        }
        let Some(pem) = config.jwt_key.as_deref() else {
            return Ok(None);
        };

        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = CLOCK_SKEW_SECS;
        validation.validate_nbf = true;
        validation.validate_aud = false;

        Ok(Some(Self {
            decoding_key,
            validation,
            secret_key: config.secret_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, UpstreamError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    async fn fetch_user(&self, secret_key: &str, user_id: &str) -> Result<ClerkUser, UpstreamError> {
        let response = HTTP_CLIENT
            .get(format!("{}/users/{}", self.api_url, user_id))
            .bearer_auth(secret_key)
            .send()
            .await
            .map_err(UpstreamError::request("clerk"))?;
        upstream::json("clerk", response).await
    }
}

/// Session token from the `__session` cookie, else from `Authorization: Bearer`.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
    })
}

#[async_trait]
impl SessionProvider for ClerkSessions {
    async fn current_user(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let token = session_token(headers)?;
        let claims = match self.verify(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session token");
                return None;
            }
        };

        if let Some(secret_key) = self.secret_key.as_deref() {
            match self.fetch_user(secret_key, &claims.sub).await {
                Ok(user) => {
                    if let Some(email) = user.primary_email().map(str::to_string) {
                        return Some(SessionUser {
                            user_id: user.id,
                            email,
                            first_name: user.first_name,
                            last_name: user.last_name,
                            image_url: user.image_url,
                        });
                    }
                    tracing::warn!(user_id = %user.id, "Identity provider user has no e-mail address");
                }
                Err(e) => {
                    tracing::warn!(user_id = %claims.sub, error = %e, "Failed to load user from identity provider");
                }
            }
        }

        // Fall back to whatever the token itself carries.
        let email = claims.email?;
        Some(SessionUser {
            user_id: claims.sub,
            email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            image_url: claims.image_url,
        })
    }
}

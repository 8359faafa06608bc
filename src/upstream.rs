//! Shared HTTP client and error type for calls to hosted providers
//! (identity, billing, database admin endpoint).

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} identifier rejected: {id}")]
    InvalidId { service: &'static str, id: String },

    #[error("invalid session token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl UpstreamError {
    pub fn request(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| UpstreamError::Request { service, source }
    }
}

/// Turn a non-2xx response into `UpstreamError::Status`, keeping the body for the logs.
pub async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(service, status = %status, "Upstream returned error");
    Err(UpstreamError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Check the status, then decode a JSON body.
pub async fn json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T, UpstreamError> {
    check_status(service, response)
        .await?
        .json::<T>()
        .await
        .map_err(|source| UpstreamError::Decode { service, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_service() {
        let err = UpstreamError::NotConfigured { service: "stripe" };
        assert_eq!(err.to_string(), "stripe is not configured");

        let err = UpstreamError::Status {
            service: "clerk",
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "clerk returned HTTP 404: not found");
    }
}

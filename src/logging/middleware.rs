use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

/// Log every request once it has been answered, with the redirect target for 3xx.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let req_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    let location = redirect_target(status, &response);

    if status.is_server_error() {
        tracing::error!(request_id = %req_id, %method, %uri, %status, duration_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(request_id = %req_id, %method, %uri, %status, duration_ms, "request rejected");
    } else if let Some(location) = location {
        tracing::info!(request_id = %req_id, %method, %uri, %status, duration_ms, location, "request redirected");
    } else {
        tracing::info!(request_id = %req_id, %method, %uri, %status, duration_ms, "request completed");
    }

    response
}

fn redirect_target(status: StatusCode, response: &Response) -> Option<&str> {
    if !status.is_redirection() {
        return None;
    }
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

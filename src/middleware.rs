use crate::key_generator::API_KEY_HEADER;
use axum::{extract::Request, middleware::Next, response::Response};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// Logs each request and its outcome, including the throttling headers.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client = client_addr(&request);
    let has_api_key = request.headers().contains_key(API_KEY_HEADER);
    let started = Instant::now();

    info!(
        target: "api_throttler::middleware",
        method = %method,
        uri = %uri,
        client = %client,
        has_api_key,
        "Incoming request"
    );

    let response = next.run(request).await;

    let wait = response
        .headers()
        .get(crate::request_admission::WAIT_TIME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    info!(
        target: "api_throttler::middleware",
        method = %method,
        uri = %uri,
        status = %response.status(),
        wait_time_millis = %wait,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

fn client_addr(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string());

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<axum::extract::ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_addr_from_forwarded_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1, 10.0.0.1"));
        assert_eq!(client_addr(&request), "192.168.1.1");
    }

    #[test]
    fn test_client_addr_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        let addr: SocketAddr = "203.0.113.1:4000".parse().unwrap();
        request.extensions_mut().insert(axum::extract::ConnectInfo(addr));
        assert_eq!(client_addr(&request), "203.0.113.1");
    }

    #[test]
    fn test_client_addr_fallback() {
        let request = Request::new(axum::body::Body::empty());
        assert_eq!(client_addr(&request), "unknown");
    }
}

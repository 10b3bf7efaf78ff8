//! Admission control for multipart file uploads.

use crate::error::ThrottlerError;
use crate::handlers::SharedState;
use crate::stats::{FileUploadStats, BYTES_PER_MB};
use crate::upload_throttler::ByteQuotaThrottler;
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, request, HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

pub const UPLOAD_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-upload-limit-limit");
pub const UPLOAD_REMAINING_HEADER: HeaderName = HeaderName::from_static("x-upload-limit-remaining");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadDecision {
    pub allowed: bool,
    pub stats: Option<FileUploadStats>,
}

pub struct UploadAdmission {
    throttler: Arc<ByteQuotaThrottler>,
    max_body_bytes: usize,
}

impl UploadAdmission {
    pub fn new(throttler: Arc<ByteQuotaThrottler>, max_body_bytes: usize) -> Self {
        Self {
            throttler,
            max_body_bytes,
        }
    }

    pub fn throttler(&self) -> &ByteQuotaThrottler {
        &self.throttler
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Only multipart POSTs can carry file parts
    pub fn applies_to(method: &Method, headers: &HeaderMap) -> bool {
        method == Method::POST
            && headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"))
                .unwrap_or(false)
    }

    /// Charge `file_bytes` to `identifier` and report the resulting quota.
    pub fn admit(&self, identifier: &str, file_bytes: u64) -> UploadDecision {
        let size_mb = file_bytes as f64 / BYTES_PER_MB;
        let allowed = self.throttler.proceed(identifier, size_mb);
        UploadDecision {
            allowed,
            stats: self.throttler.get_stats(identifier, ByteQuotaThrottler::INTERVAL),
        }
    }
}

/// Total size of the file parts in a multipart body, `None` if it has none.
pub async fn measure_file_parts(parts: &request::Parts, body: Bytes) -> Result<Option<u64>, ThrottlerError> {
    let mut probe = Request::new(Body::from(body));
    *probe.method_mut() = parts.method.clone();
    *probe.headers_mut() = parts.headers.clone();
    *probe.extensions_mut() = parts.extensions.clone();

    let mut multipart = Multipart::from_request(probe, &())
        .await
        .map_err(|e| ThrottlerError::InvalidRequest(e.body_text()))?;

    let mut total: Option<u64> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ThrottlerError::InvalidRequest(e.body_text()))?
    {
        if field.file_name().is_none() {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ThrottlerError::InvalidRequest(e.body_text()))?;
        *total.get_or_insert(0) += data.len() as u64;
    }

    Ok(total)
}

/// Gate multipart uploads on the caller's hourly upload volume.
pub async fn upload_throttle_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    if !UploadAdmission::applies_to(request.method(), request.headers()) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let max_bytes = state.upload_admission.max_body_bytes();
    let bytes = match to_bytes(body, max_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return ThrottlerError::PayloadTooLarge(format!("request body exceeds {} bytes", max_bytes))
                .into_response()
        }
    };

    let file_bytes = match measure_file_parts(&parts, bytes.clone()).await {
        Ok(file_bytes) => file_bytes,
        Err(e) => return e.into_response(),
    };
    let request = Request::from_parts(parts, Body::from(bytes));

    let Some(file_bytes) = file_bytes else {
        return next.run(request).await;
    };

    let identifier = state.key_resolver.resolve(request.headers());
    let decision = state.upload_admission.admit(&identifier, file_bytes);
    debug!(file_bytes, allowed = decision.allowed, "Upload admission");

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        ThrottlerError::UploadLimitExceeded {
            remaining_mb: decision.stats.map(|s| s.remaining_mb).unwrap_or(0.0),
        }
        .into_response()
    };

    if let Some(stats) = decision.stats {
        let headers = response.headers_mut();
        if let Ok(limit) = HeaderValue::from_str(&stats.limit_header_value()) {
            headers.insert(UPLOAD_LIMIT_HEADER, limit);
        }
        if let Ok(remaining) = HeaderValue::from_str(&stats.remaining_header_value()) {
            headers.insert(UPLOAD_REMAINING_HEADER, remaining);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit_config::UploadQuotaConfig;

    fn admission(capacity_mb: f64) -> UploadAdmission {
        let clock = Arc::new(ManualClock::new(0));
        UploadAdmission::new(
            Arc::new(ByteQuotaThrottler::with_clock(UploadQuotaConfig { capacity_mb }, clock)),
            1 << 20,
        )
    }

    fn multipart_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=XBOUNDARY"),
        );
        headers
    }

    #[test]
    fn test_applies_only_to_multipart_post() {
        let headers = multipart_headers();
        assert!(UploadAdmission::applies_to(&Method::POST, &headers));
        assert!(!UploadAdmission::applies_to(&Method::GET, &headers));
        assert!(!UploadAdmission::applies_to(&Method::PUT, &headers));

        let mut json = HeaderMap::new();
        json.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!UploadAdmission::applies_to(&Method::POST, &json));
        assert!(!UploadAdmission::applies_to(&Method::POST, &HeaderMap::new()));
    }

    #[test]
    fn test_admit_charges_megabytes() {
        let admission = admission(10.0);
        let decision = admission.admit("alice", 3 * 1_048_576);
        assert!(decision.allowed);
        let stats = decision.stats.unwrap();
        assert_eq!(stats.limit_mb, 10.0);
        assert_eq!(stats.remaining_mb, 7.0);

        let denied = admission.admit("alice", 8 * 1_048_576);
        assert!(!denied.allowed);
        assert_eq!(denied.stats.unwrap().remaining_mb, 7.0);
    }

    #[tokio::test]
    async fn test_measure_file_parts() {
        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"note\"\r\n\r\n\
            hello\r\n\
            --XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            0123456789\r\n\
            --XBOUNDARY--\r\n";
        let (mut parts, _) = Request::new(Body::empty()).into_parts();
        parts.method = Method::POST;
        parts.headers = multipart_headers();

        let size = measure_file_parts(&parts, Bytes::from(body)).await.unwrap();
        assert_eq!(size, Some(10));
    }

    #[tokio::test]
    async fn test_measure_without_file_parts() {
        let body = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"note\"\r\n\r\n\
            hello\r\n\
            --XBOUNDARY--\r\n";
        let (mut parts, _) = Request::new(Body::empty()).into_parts();
        parts.method = Method::POST;
        parts.headers = multipart_headers();

        let size = measure_file_parts(&parts, Bytes::from(body)).await.unwrap();
        assert_eq!(size, None);
    }
}

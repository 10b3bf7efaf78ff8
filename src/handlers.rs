use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::ThrottlerError;
use crate::interval::ThrottleInterval;
use crate::key_generator::{ApiKeyResolver, KeyResolver};
use crate::rate_limit_config::ThrottleSettings;
use crate::request_admission::{PathClassifier, RequestAdmission};
use crate::stats::ApiUsageStats;
use crate::throttler::Throttler;
use crate::upload_admission::UploadAdmission;
use crate::upload_throttler::ByteQuotaThrottler;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Throttlers and identity resolution shared by every request
pub struct AppState {
    pub request_admission: RequestAdmission,
    pub upload_admission: UploadAdmission,
    pub key_resolver: Arc<dyn KeyResolver>,
}

impl AppState {
    pub fn new(settings: &ThrottleSettings, classifier: PathClassifier, max_upload_bytes: usize) -> Self {
        Self::with_clock(settings, classifier, max_upload_bytes, Arc::new(SystemClock::new()))
    }

    /// Build every throttler on one clock
    pub fn with_clock(
        settings: &ThrottleSettings,
        classifier: PathClassifier,
        max_upload_bytes: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user = Throttler::with_clock("user", settings.user.clone(), clock.clone());
        let global = Throttler::with_clock("global", settings.global.clone(), clock.clone());
        let inventory = Throttler::with_clock("inventory", settings.inventory.clone(), clock.clone());
        let upload = ByteQuotaThrottler::with_clock(settings.upload, clock);

        Self {
            request_admission: RequestAdmission::new(
                Arc::new(user),
                Arc::new(global),
                Arc::new(inventory),
                classifier,
            ),
            upload_admission: UploadAdmission::new(Arc::new(upload), max_upload_bytes),
            key_resolver: Arc::new(ApiKeyResolver),
        }
    }

    pub fn with_key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = resolver;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub buckets: BucketCounts,
}

#[derive(Debug, Serialize)]
pub struct BucketCounts {
    pub user: usize,
    pub global: usize,
    pub inventory: usize,
    pub upload: usize,
}

#[derive(Debug, Serialize)]
pub struct IntervalUsage {
    pub interval: ThrottleInterval,
    #[serde(flatten)]
    pub stats: ApiUsageStats,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub domain: String,
    pub intervals: Vec<IntervalUsage>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: usize,
    pub bytes: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let admission = &state.request_admission;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        buckets: BucketCounts {
            user: admission.user().bucket_count(),
            global: admission.global().bucket_count(),
            inventory: admission.inventory().bucket_count(),
            upload: state.upload_admission.throttler().bucket_count(),
        },
    })
}

/// Caller's usage of the general API budget
pub async fn user_usage(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let identifier = state.key_resolver.resolve(&headers);
    Json(usage(state.request_admission.user(), &identifier))
}

/// Caller's usage of the inventory API budget
pub async fn inventory_usage(State(state): State<SharedState>, headers: HeaderMap) -> impl IntoResponse {
    let identifier = state.key_resolver.resolve(&headers);
    Json(usage(state.request_admission.inventory(), &identifier))
}

/// Accept a multipart upload and report what arrived
pub async fn upload_file(mut multipart: Multipart) -> Result<impl IntoResponse, ThrottlerError> {
    let mut files = 0;
    let mut bytes = 0u64;

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
        files += 1;
        bytes += data.len() as u64;
    }

    if files == 0 {
        return Err(ThrottlerError::InvalidRequest("no file part in upload".to_string()));
    }

    Ok(Json(UploadResponse { files, bytes }))
}

fn usage(throttler: &Throttler, identifier: &str) -> UsageResponse {
    let intervals = throttler
        .intervals()
        .into_iter()
        .filter_map(|interval| {
            throttler
                .get_stats(identifier, interval)
                .map(|stats| IntervalUsage { interval, stats })
        })
        .collect();

    UsageResponse {
        domain: throttler.domain().to_string(),
        intervals,
    }
}

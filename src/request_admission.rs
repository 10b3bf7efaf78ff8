//! Admission control for API requests.
//!
//! General API traffic must be admitted by both the caller's own budget and
//! the budget shared by all callers. Inventory API traffic has its own
//! hourly budget instead.

use crate::error::ThrottlerError;
use crate::handlers::SharedState;
use crate::key_generator::GLOBAL_IDENTIFIER;
use crate::stats::max_wait_millis;
use crate::throttler::Throttler;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

/// Advisory response header: milliseconds until the next request is likely
/// to be admitted
pub const WAIT_TIME_HEADER: HeaderName = HeaderName::from_static("x-rate-limit-waittimemillis");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiScope {
    General,
    Inventory,
    Unthrottled,
}

/// Sorts request paths into throttle scopes by prefix.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    api_prefix: String,
    inventory_prefix: String,
}

impl PathClassifier {
    pub fn new(api_prefix: impl Into<String>, inventory_prefix: impl Into<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
            inventory_prefix: inventory_prefix.into(),
        }
    }

    pub fn classify(&self, path: &str) -> ApiScope {
        if path.starts_with(&self.inventory_prefix) {
            ApiScope::Inventory
        } else if path.starts_with(&self.api_prefix) {
            ApiScope::General
        } else {
            ApiScope::Unthrottled
        }
    }
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new("/api/", "/api/inventory/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// Value for [`WAIT_TIME_HEADER`]; `None` when no interval has stats
    pub wait_time_millis: Option<u64>,
}

pub struct RequestAdmission {
    user: Arc<Throttler>,
    global: Arc<Throttler>,
    inventory: Arc<Throttler>,
    classifier: PathClassifier,
}

impl RequestAdmission {
    pub fn new(
        user: Arc<Throttler>,
        global: Arc<Throttler>,
        inventory: Arc<Throttler>,
        classifier: PathClassifier,
    ) -> Self {
        Self {
            user,
            global,
            inventory,
            classifier,
        }
    }

    pub fn user(&self) -> &Throttler {
        &self.user
    }

    pub fn global(&self) -> &Throttler {
        &self.global
    }

    pub fn inventory(&self) -> &Throttler {
        &self.inventory
    }

    pub fn classify(&self, path: &str) -> ApiScope {
        self.classifier.classify(path)
    }

    /// Run admission for `identifier` in `scope`.
    ///
    /// For general traffic the global budget is only charged once the
    /// caller's own budget has admitted the request.
    pub fn admit(&self, identifier: &str, scope: ApiScope) -> AdmissionDecision {
        match scope {
            ApiScope::Unthrottled => AdmissionDecision {
                allowed: true,
                wait_time_millis: None,
            },
            ApiScope::General => {
                let allowed = self.user.proceed(identifier) && self.global.proceed(GLOBAL_IDENTIFIER);
                AdmissionDecision {
                    allowed,
                    wait_time_millis: max_wait_millis(self.user.all_stats(identifier)),
                }
            }
            ApiScope::Inventory => {
                let allowed = self.inventory.proceed(identifier);
                AdmissionDecision {
                    allowed,
                    wait_time_millis: max_wait_millis(self.inventory.all_stats(identifier)),
                }
            }
        }
    }
}

/// Gate API requests on their throttle budgets and attach the wait header.
pub async fn request_throttle_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let scope = state.request_admission.classify(request.uri().path());
    if scope == ApiScope::Unthrottled {
        return next.run(request).await;
    }

    let identifier = state.key_resolver.resolve(request.headers());
    let decision = state.request_admission.admit(&identifier, scope);
    debug!(
        scope = ?scope,
        allowed = decision.allowed,
        wait_time_millis = ?decision.wait_time_millis,
        "Request admission"
    );

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        ThrottlerError::RateLimitExceeded.into_response()
    };

    if let Some(wait) = decision.wait_time_millis {
        response.headers_mut().insert(WAIT_TIME_HEADER, HeaderValue::from(wait));
    }

    response
}

//! Throttling identity resolution.

use axum::http::{HeaderMap, HeaderName};

/// Request header carrying the caller's API key (`apiKey` on the wire)
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("apikey");

/// Identifier shared by every request that arrives without an API key
pub const ANONYMOUS_IDENTIFIER: &str = "anonymousApiUser";

/// Identifier of the single bucket set in the global domain
pub const GLOBAL_IDENTIFIER: &str = "globalApiUsage";

/// Turns a request into a stable throttling key
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> String;
}

/// Keys requests by their `apiKey` header value.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyResolver;

impl KeyResolver for ApiKeyResolver {
    fn resolve(&self, headers: &HeaderMap) -> String {
        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| ANONYMOUS_IDENTIFIER.to_string())
    }
}

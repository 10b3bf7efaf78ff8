pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod interval;
pub mod key_generator;
pub mod middleware;
pub mod rate_limit_config;
pub mod request_admission;
pub mod server;
pub mod stats;
pub mod throttler;
pub mod token_bucket;
pub mod upload_admission;
pub mod upload_throttler;

pub use config::Config;
pub use error::{ThrottlerError, ThrottlerResult};
pub use handlers::{AppState, SharedState};
pub use interval::ThrottleInterval;
pub use server::create_app;
pub use stats::{ApiUsageStats, FileUploadStats};
pub use throttler::Throttler;
pub use upload_throttler::ByteQuotaThrottler;

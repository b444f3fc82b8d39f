//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! To point the client at another server, set `EXPLAINIFY_API_URL`.

/// Default API base URL (including the `/api/v1` prefix)
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Default API contract version
pub const DEFAULT_API_CONTRACT: &str = "v1";

/// Model file extensions the upload panel accepts without a warning.
/// This is a hint only; the server decides what it can load.
pub const ACCEPTED_MODEL_EXTENSIONS: [&str; 2] = [".pkl", ".h5"];

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Explainify";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get API base URL from environment or use default
pub fn get_api_url() -> String {
    std::env::var("EXPLAINIFY_API_URL")
        .unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

/// Get API contract name from environment or use default
pub fn get_api_contract() -> String {
    std::env::var("EXPLAINIFY_API_CONTRACT")
        .unwrap_or_else(|_| DEFAULT_API_CONTRACT.to_string())
}

/// Get optional request timeout (seconds). Unset means transport default.
pub fn get_timeout_secs() -> Option<u64> {
    std::env::var("EXPLAINIFY_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs| *secs > 0)
}

use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Careboard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend URL used when `CAREBOARD_API_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Timeout applied to every backend request.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default tracing filter: quiet dependencies, informative crate.
pub fn default_log_filter() -> String {
    format!("warn,{}=info", env!("CARGO_PKG_NAME"))
}

/// Backend base URL, overridable via the `CAREBOARD_API_URL` environment variable.
pub fn backend_url() -> String {
    std::env::var("CAREBOARD_API_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string())
}

/// Get the application data directory
/// ~/Careboard/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// File holding the signed-in provider's identifier between runs.
/// One key, one value — absence means unauthenticated.
pub fn session_file() -> PathBuf {
    app_data_dir().join("provider_id")
}

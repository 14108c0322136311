//! Careboard — a session-bound dashboard client for provider-owned patient
//! records.
//!
//! One provider account signs in, and the client keeps an authoritative view
//! of that provider's patients by replacing the whole list from the server
//! after every mutation. The crate splits along that contract:
//!
//! - [`models`]: patient record, lifecycle status, editable field set
//! - [`session`]: the one durable key (provider id) that survives restarts
//! - [`backend`]: typed REST client + the trait seam tests mock
//! - [`state`]: pure dashboard state and its transitions
//! - [`manager`]: the record manager tying state, session and backend together
//! - [`ui`]: thin terminal front that renders state and forwards input

pub mod backend;
pub mod config;
pub mod manager;
pub mod models;
pub mod session;
pub mod state;
pub mod ui;

use tracing_subscriber::EnvFilter;

/// Wire the full client together and run the terminal front.
pub async fn run() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("Careboard starting v{}", config::APP_VERSION);

    let backend = backend::HttpBackend::from_config();
    let store = session::SessionStore::open_default();
    let manager = manager::RecordManager::new(backend, store);

    ui::run(&manager).await
}

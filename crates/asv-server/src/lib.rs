pub mod auth;
pub mod dirs;
pub mod error;
pub mod gallery;
pub mod handlers;
pub mod sanitize;
pub mod server;
pub mod store;
pub mod upload;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::StateStore,
    /// Token issuer/verifier for the single admin credential.
    pub auth: Arc<auth::AuthGate>,
    /// Uploaded images; its directory also receives CSV uploads.
    pub gallery: gallery::Gallery,
}

pub use error::{AdminError, AdminResult};
pub use server::{read_key_file, resolve_data_dir, resolve_secret_key, run, ServerConfig};

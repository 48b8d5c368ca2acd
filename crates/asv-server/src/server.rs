use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::{require_auth, AuthGate},
    dirs::DataDirs,
    gallery::Gallery,
    handlers::{
        clear_images, delete_image, get_state, health, list_images, login, root, update_state,
        upload_any, upload_csv, upload_image,
    },
    store::StateStore,
    upload::UploadPolicy,
    AppState,
};

const DEV_SECRET: &str = "dev-insecure-secret";
const DEV_USERNAME: &str = "admin";
const DEV_PASSWORD: &str = "admin";
const MIN_SECRET_LEN: usize = 16;

/// Headroom for multipart boundaries and part headers on top of the file limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// JWT signing secret ($ASV_SECRET_KEY, or read from $ASV_SECRET_KEY_FILE).
    pub secret_key: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Allow insecure built-in credentials when the above are unset.
    pub dev_mode: bool,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("ASV_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("ASV_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            data_dir: std::env::var("ASV_DATA_DIR").ok().map(PathBuf::from),
            secret_key: std::env::var("ASV_SECRET_KEY").ok(),
            admin_username: std::env::var("ASV_ADMIN_USERNAME").ok(),
            admin_password: std::env::var("ASV_ADMIN_PASSWORD").ok(),
            dev_mode: std::env::var("ASV_DEV_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            cors_origins: std::env::var("ASV_CORS_ORIGINS").ok(),
        }
    }
}

/// The single admin credential pair plus the token signing secret.
#[derive(Clone)]
pub struct Credentials {
    pub secret_key: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Read a secret from a file, trimming surrounding whitespace.
/// Fails if the file cannot be read or is empty after trimming.
pub fn read_key_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read key file: {}", path.display()))?;
    let key = content.trim().to_string();
    if key.is_empty() {
        anyhow::bail!("key file is empty: {}", path.display());
    }
    Ok(key)
}

/// Resolve the signing secret from `ASV_SECRET_KEY_FILE` (preferred) or `ASV_SECRET_KEY`.
pub fn resolve_secret_key() -> Result<Option<String>> {
    if let Ok(path) = std::env::var("ASV_SECRET_KEY_FILE") {
        let key = read_key_file(Path::new(&path))?;
        if std::env::var("ASV_SECRET_KEY").is_ok() {
            warn!("both ASV_SECRET_KEY and ASV_SECRET_KEY_FILE are set; using file");
        }
        return Ok(Some(key));
    }
    Ok(std::env::var("ASV_SECRET_KEY").ok())
}

fn require(value: Option<&str>, var: &str, fallback: &str, dev_mode: bool) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.to_owned()),
        _ if dev_mode => {
            warn!("{var} not set; using insecure development default");
            Ok(fallback.to_owned())
        }
        _ => anyhow::bail!("{var} must be set (or run with ASV_DEV_MODE=1 for local development)"),
    }
}

impl ServerConfig {
    /// Credentials for the auth gate. Outside dev mode every value must be
    /// configured and the secret must be at least 16 bytes.
    pub fn credentials(&self) -> Result<Credentials> {
        let secret_key = require(
            self.secret_key.as_deref(),
            "ASV_SECRET_KEY",
            DEV_SECRET,
            self.dev_mode,
        )?;
        if !self.dev_mode && secret_key.len() < MIN_SECRET_LEN {
            anyhow::bail!("ASV_SECRET_KEY must be at least {MIN_SECRET_LEN} bytes");
        }
        Ok(Credentials {
            secret_key,
            username: require(
                self.admin_username.as_deref(),
                "ASV_ADMIN_USERNAME",
                DEV_USERNAME,
                self.dev_mode,
            )?,
            password: require(
                self.admin_password.as_deref(),
                "ASV_ADMIN_PASSWORD",
                DEV_PASSWORD,
                self.dev_mode,
            )?,
        })
    }
}

/// Resolve the base data directory, creating it if needed.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

/// Public and protected routes plus the static mounts. No CORS or tracing.
pub fn router(state: AppState, dirs: &DataDirs) -> Router {
    let public = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/admin/state", get(get_state))
        .route("/api/images", get(list_images));

    let protected = Router::new()
        .route("/api/admin/update", post(update_state))
        .route(
            "/api/upload/image",
            post(upload_image).layer(body_limit(&UploadPolicy::image())),
        )
        .route(
            "/api/upload/csv",
            post(upload_csv).layer(body_limit(&UploadPolicy::csv())),
        )
        .route(
            "/api/upload",
            post(upload_any).layer(body_limit(&UploadPolicy::image())),
        )
        .route("/api/images/all/clear", delete(clear_images))
        .route("/api/images/{filename}", delete(delete_image))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .nest_service("/uploads", ServeDir::new(&dirs.uploads))
        .nest_service("/assets", ServeDir::new(&dirs.assets))
        .with_state(state)
}

fn body_limit(policy: &UploadPolicy) -> DefaultBodyLimit {
    DefaultBodyLimit::max(policy.max_bytes() as usize + MULTIPART_OVERHEAD)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let credentials = cfg.credentials()?;

    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    let dirs = DataDirs::prepare(&data_dir)?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let store = StateStore::open(dirs.state_file());
    let state = AppState {
        store,
        auth: Arc::new(AuthGate::new(
            &credentials.secret_key,
            credentials.username,
            credentials.password,
        )),
        gallery: Gallery::new(&dirs.uploads),
    };

    let app = router(state, &dirs)
        .layer(build_cors(cfg.cors_origins.as_deref()))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "asv admin server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

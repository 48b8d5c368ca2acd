use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::{multipart, Client, Response};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "asv", about = "ASV dashboard admin server and client", version)]
struct Cli {
    /// Admin server URL (default: http://localhost:8000 or $ASV_SERVER)
    #[arg(long, env = "ASV_SERVER", default_value = "http://localhost:8000")]
    server: String,

    /// Bearer token from `asv login` ($ASV_TOKEN)
    #[arg(long, env = "ASV_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the admin HTTP server
    Serve {
        /// Port to listen on (default: $ASV_PORT or 8000)
        #[arg(long, env = "ASV_PORT", default_value = "8000")]
        port: u16,
        /// Host to bind (default: $ASV_HOST or 0.0.0.0)
        #[arg(long, env = "ASV_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Directory holding uploads/ and assets/ (default: $ASV_DATA_DIR or platform data dir)
        #[arg(long, env = "ASV_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Allow insecure built-in credentials when unset ($ASV_DEV_MODE)
        #[arg(long)]
        dev: bool,
    },
    /// Log in and print an access token
    Login {
        #[arg(long, env = "ASV_ADMIN_USERNAME")]
        username: String,
        #[arg(long, env = "ASV_ADMIN_PASSWORD")]
        password: String,
    },
    /// Print the current admin state
    State,
    /// Patch the admin state; omitted flags are left unchanged
    Update {
        #[arg(long, value_enum)]
        theme: Option<ThemeArg>,
        /// Default track id (1-10 alphanumeric characters)
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        red: Option<i64>,
        #[arg(long)]
        green: Option<i64>,
        #[arg(long)]
        track_count: Option<i64>,
    },
    /// List gallery images, newest first
    Images,
    /// Upload an image or CSV file
    Upload {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "image")]
        kind: UploadKind,
    },
    /// Delete one gallery image
    Delete { filename: String },
    /// Delete every gallery image
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
}

#[derive(Clone, Copy, ValueEnum)]
enum UploadKind {
    Image,
    Csv,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("ASV_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let server = cli.server.trim_end_matches('/').to_owned();

    match cli.command {
        Commands::Serve {
            port,
            host,
            data_dir,
            dev,
        } => cmd_serve(host, port, data_dir, dev).await,

        Commands::Login { username, password } => cmd_login(&server, &username, &password).await,

        Commands::State => cmd_state(&server).await,

        Commands::Update {
            theme,
            track,
            red,
            green,
            track_count,
        } => {
            let token = require_token(&cli.token)?;
            let patch = build_patch(theme, track, red, green, track_count);
            cmd_update(&server, &token, patch).await
        }

        Commands::Images => cmd_images(&server).await,

        Commands::Upload { path, kind } => {
            let token = require_token(&cli.token)?;
            cmd_upload(&server, &token, &path, kind).await
        }

        Commands::Delete { filename } => {
            let token = require_token(&cli.token)?;
            cmd_delete(&server, &token, &filename).await
        }

        Commands::Clear => {
            let token = require_token(&cli.token)?;
            cmd_clear(&server, &token).await
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16, data_dir: Option<PathBuf>, dev: bool) -> Result<()> {
    let defaults = asv_server::ServerConfig::default();
    let cfg = asv_server::ServerConfig {
        host,
        port,
        data_dir,
        secret_key: asv_server::resolve_secret_key()?,
        dev_mode: dev || defaults.dev_mode,
        ..defaults
    };

    asv_server::run(cfg).await
}

async fn cmd_login(server: &str, username: &str, password: &str) -> Result<()> {
    let resp = Client::new()
        .post(format!("{server}/api/auth/login"))
        .json(&json!({"username": username, "password": password}))
        .send()
        .await
        .context("HTTP request failed")?;

    let json = expect_success(resp).await?;
    let token = json["access_token"]
        .as_str()
        .context("response has no access_token")?;
    println!("{token}");
    if let Some(secs) = json["expires_in"].as_u64() {
        eprintln!("token expires in {}h; export ASV_TOKEN to reuse it", secs / 3600);
    }
    Ok(())
}

async fn cmd_state(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{server}/api/admin/state"))
        .send()
        .await
        .context("HTTP request failed")?;

    let json = expect_success(resp).await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn cmd_update(server: &str, token: &str, patch: Value) -> Result<()> {
    if patch.as_object().is_some_and(Map::is_empty) {
        anyhow::bail!("nothing to update: pass at least one of --theme, --track, --red, --green, --track-count");
    }

    let resp = Client::new()
        .post(format!("{server}/api/admin/update"))
        .bearer_auth(token)
        .json(&patch)
        .send()
        .await
        .context("HTTP request failed")?;

    let json = expect_success(resp).await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn cmd_images(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{server}/api/images"))
        .send()
        .await
        .context("HTTP request failed")?;

    let json = expect_success(resp).await?;
    let images = json["images"].as_array().cloned().unwrap_or_default();
    if images.is_empty() {
        println!("(no images)");
        return Ok(());
    }
    for name in images.iter().filter_map(Value::as_str) {
        println!("  {name}");
    }
    Ok(())
}

async fn cmd_upload(server: &str, token: &str, path: &Path, kind: UploadKind) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("path has no usable file name")?
        .to_owned();

    let part = multipart::Part::bytes(bytes)
        .file_name(filename)
        .mime_str(guess_content_type(path, kind))?;
    let form = multipart::Form::new().part("file", part);

    let endpoint = match kind {
        UploadKind::Image => "image",
        UploadKind::Csv => "csv",
    };
    let resp = Client::new()
        .post(format!("{server}/api/upload/{endpoint}"))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .context("HTTP request failed")?;

    let json = expect_success(resp).await?;
    println!("✓ uploaded {}", json["filename"].as_str().unwrap_or("?"));
    Ok(())
}

async fn cmd_delete(server: &str, token: &str, filename: &str) -> Result<()> {
    let resp = Client::new()
        .delete(format!("{server}/api/images/{filename}"))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    expect_success(resp).await?;
    println!("✓ deleted {filename}");
    Ok(())
}

async fn cmd_clear(server: &str, token: &str) -> Result<()> {
    let resp = Client::new()
        .delete(format!("{server}/api/images/all/clear"))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    let json = expect_success(resp).await?;
    let n = json["deleted_count"].as_u64().unwrap_or(0);
    println!("deleted {n} image(s)");
    if let Some(failed) = json["failed"].as_array().filter(|f| !f.is_empty()) {
        for name in failed.iter().filter_map(Value::as_str) {
            eprintln!("  failed: {name}");
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_token(token: &Option<String>) -> Result<String> {
    token
        .clone()
        .context("--token / ASV_TOKEN is required for this command (see `asv login`)")
}

async fn expect_success(resp: Response) -> Result<Value> {
    let status = resp.status();
    let json: Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        );
    }
    Ok(json)
}

fn build_patch(
    theme: Option<ThemeArg>,
    track: Option<String>,
    red: Option<i64>,
    green: Option<i64>,
    track_count: Option<i64>,
) -> Value {
    let mut patch = Map::new();
    if let Some(theme) = theme {
        let name = match theme {
            ThemeArg::Light => "light",
            ThemeArg::Dark => "dark",
        };
        patch.insert("theme".into(), json!(name));
    }
    if let Some(track) = track {
        patch.insert("defaultTrack".into(), json!(track));
    }

    let mut counts = Map::new();
    for (key, value) in [("red", red), ("green", green), ("track", track_count)] {
        if let Some(v) = value {
            counts.insert(key.into(), json!(v));
        }
    }
    if !counts.is_empty() {
        patch.insert("cv_counts".into(), Value::Object(counts));
    }
    Value::Object(patch)
}

fn guess_content_type(path: &Path, kind: UploadKind) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match (kind, ext.as_deref()) {
        (UploadKind::Image, Some("png")) => "image/png",
        (UploadKind::Image, Some("webp")) => "image/webp",
        (UploadKind::Image, _) => "image/jpeg",
        (UploadKind::Csv, Some("txt")) => "text/plain",
        (UploadKind::Csv, _) => "text/csv",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_carries_given_fields() {
        let patch = build_patch(None, None, Some(5), None, None);
        assert_eq!(patch, json!({"cv_counts": {"red": 5}}));

        let patch = build_patch(Some(ThemeArg::Dark), Some("b".into()), None, None, Some(2));
        assert_eq!(
            patch,
            json!({"theme": "dark", "defaultTrack": "b", "cv_counts": {"track": 2}})
        );

        assert_eq!(build_patch(None, None, None, None, None), json!({}));
    }

    #[test]
    fn content_type_from_extension() {
        assert_eq!(
            guess_content_type(Path::new("a.PNG"), UploadKind::Image),
            "image/png"
        );
        assert_eq!(
            guess_content_type(Path::new("a.jpg"), UploadKind::Image),
            "image/jpeg"
        );
        assert_eq!(
            guess_content_type(Path::new("lintasan_a.csv"), UploadKind::Csv),
            "text/csv"
        );
    }

    #[test]
    fn cli_parses_update_flags() {
        let cli = Cli::try_parse_from([
            "asv",
            "--token",
            "t",
            "update",
            "--theme",
            "dark",
            "--track-count",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Update {
                theme, track_count, ..
            } => {
                assert!(matches!(theme, Some(ThemeArg::Dark)));
                assert_eq!(track_count, Some(4));
            }
            _ => panic!("expected update"),
        }
    }
}

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    auth::{AdminIdentity, IssuedToken},
    error::{AdminError, AdminResult},
    store::{AdminState, AdminStateUpdate},
    upload::{self, UploadPolicy},
    AppState,
};

// ── Misc ──────────────────────────────────────────────────────────────────────

pub async fn root() -> impl IntoResponse {
    Json(json!({"message": "ASV Backend Ready"}))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Auth ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AdminResult<Json<IssuedToken>> {
    let Json(body) = body.map_err(|e| AdminError::ValidationError(e.body_text()))?;
    match state.auth.login(&body.username, &body.password) {
        Ok(token) => {
            info!(username = %body.username, "audit: auth.login");
            Ok(Json(token))
        }
        Err(e) => {
            warn!(username = %body.username, "audit: auth.login.failed");
            Err(e)
        }
    }
}

// ── Admin state ───────────────────────────────────────────────────────────────

pub async fn get_state(State(state): State<AppState>) -> Json<AdminState> {
    Json(state.store.get().as_ref().clone())
}

pub async fn update_state(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    body: Result<Json<AdminStateUpdate>, JsonRejection>,
) -> AdminResult<Json<AdminState>> {
    let Json(patch) = body.map_err(|e| AdminError::ValidationError(e.body_text()))?;
    let store = state.store.clone();
    let next = blocking(move || store.update(&patch)).await?;
    info!(admin = %admin.0, state = ?next, "audit: state.update");
    Ok(Json(next.as_ref().clone()))
}

// ── Uploads ───────────────────────────────────────────────────────────────────

pub async fn upload_image(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    multipart: Multipart,
) -> AdminResult<impl IntoResponse> {
    receive_upload(&state, &admin, multipart, Some(UploadPolicy::image())).await
}

pub async fn upload_csv(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    multipart: Multipart,
) -> AdminResult<impl IntoResponse> {
    receive_upload(&state, &admin, multipart, Some(UploadPolicy::csv())).await
}

#[derive(Debug, Deserialize)]
pub struct UploadKindQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Combined endpoint used by the dashboard. The kind comes from `?type=` or,
/// failing that, a `type` form field; image when neither is given.
pub async fn upload_any(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Query(query): Query<UploadKindQuery>,
    multipart: Multipart,
) -> AdminResult<impl IntoResponse> {
    let policy = query.kind.as_deref().map(UploadPolicy::for_kind);
    receive_upload(&state, &admin, multipart, policy).await
}

struct ReceivedFile {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// Pull the `file` part (and, when `policy` is still open, a `type` part)
/// out of the form, then validate and store the file.
///
/// Name and content type are checked against the part headers before the
/// body is read, so an oversized request of the wrong type is still a 415.
async fn receive_upload(
    state: &AppState,
    admin: &AdminIdentity,
    mut multipart: Multipart,
    mut policy: Option<UploadPolicy>,
) -> AdminResult<impl IntoResponse> {
    let mut received: Option<ReceivedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, policy.as_ref()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("type") if policy.is_none() => {
                let kind = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, None))?;
                policy = Some(UploadPolicy::for_kind(&kind));
            }
            Some("file") if received.is_none() => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let candidates = match &policy {
                    Some(p) => vec![p.clone()],
                    None => vec![UploadPolicy::image(), UploadPolicy::csv()],
                };
                upload::check_declared(&filename, content_type.as_deref(), &candidates)?;

                let data = read_capped(field, policy.as_ref()).await?;
                received = Some(ReceivedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            _ => continue,
        }

        if received.is_some() && policy.is_some() {
            break;
        }
    }

    let Some(file) = received else {
        return Err(AdminError::BadRequest("missing `file` field".into()));
    };
    let policy = policy.unwrap_or_else(UploadPolicy::image);
    let bytes = file.data.len();
    let dir = state.gallery.dir().to_path_buf();

    let saved = blocking(move || {
        upload::save_upload(
            &dir,
            &file.filename,
            file.content_type.as_deref(),
            &policy,
            file.data.as_slice(),
        )
    })
    .await?;

    info!(
        admin = %admin.0,
        filename = %saved,
        bytes,
        "audit: file.upload"
    );
    Ok(Json(json!({"status": "success", "filename": saved})))
}

/// Largest ceiling that can still apply: the policy's, or the image one
/// while the kind is undecided.
fn ceiling(policy: Option<&UploadPolicy>) -> UploadPolicy {
    policy.cloned().unwrap_or_else(UploadPolicy::image)
}

/// Buffer a field, stopping one chunk past the ceiling.
async fn read_capped(mut field: Field<'_>, policy: Option<&UploadPolicy>) -> AdminResult<Vec<u8>> {
    let limit = ceiling(policy).max_bytes();
    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, policy))? {
        data.extend_from_slice(&chunk);
        if data.len() as u64 > limit {
            break;
        }
    }
    Ok(data)
}

fn multipart_error(e: MultipartError, policy: Option<&UploadPolicy>) -> AdminError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AdminError::FileTooLarge {
            max_mb: ceiling(policy).max_mb,
        }
    } else {
        AdminError::BadRequest(e.body_text())
    }
}

/// Run filesystem work off the async workers.
async fn blocking<T, F>(f: F) -> AdminResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AdminResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AdminError::IoFailure(std::io::Error::other(e.to_string())))?
}

// ── Gallery ───────────────────────────────────────────────────────────────────

pub async fn list_images(State(state): State<AppState>) -> AdminResult<impl IntoResponse> {
    let gallery = state.gallery.clone();
    let images = blocking(move || gallery.list()).await?;
    Ok(Json(json!({ "images": images })))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
    Path(filename): Path<String>,
) -> AdminResult<impl IntoResponse> {
    let gallery = state.gallery.clone();
    let name = filename.clone();
    blocking(move || gallery.delete(&name)).await?;
    info!(admin = %admin.0, filename = %filename, "audit: image.delete");
    Ok(Json(json!({
        "status": "success",
        "message": format!("{filename} deleted"),
    })))
}

pub async fn clear_images(
    State(state): State<AppState>,
    Extension(admin): Extension<AdminIdentity>,
) -> AdminResult<impl IntoResponse> {
    let gallery = state.gallery.clone();
    let report = blocking(move || gallery.clear()).await?;
    info!(
        admin = %admin.0,
        deleted = report.deleted_count,
        failed = report.failed.len(),
        "audit: image.clear"
    );
    Ok(Json(json!({
        "status": "success",
        "deleted_count": report.deleted_count,
        "failed": report.failed,
    })))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every failure a request can surface. Each variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid filename")]
    InvalidFilename,
    #[error("filename exceeds {max} characters")]
    FilenameTooLong { max: usize },
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),
    #[error("file exceeds {max_mb} MB limit")]
    FileTooLarge { max_mb: u64 },
    #[error("{0}")]
    ValidationError(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token")]
    TokenInvalid,
    #[error("{0} not found")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidFilename | Self::FilenameTooLong { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IoFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::IoFailure(e) => {
                tracing::error!(error = %e, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let mut resp = (status, Json(json!({ "error": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut().insert(
                http::header::WWW_AUTHENTICATE,
                http::HeaderValue::from_static("Bearer"),
            );
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(AdminError::InvalidFilename.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AdminError::FileTooLarge { max_mb: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            AdminError::ValidationError("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AdminError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AdminError::NotFound("a.png".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unauthorized_carries_challenge_header() {
        let resp = AdminError::TokenInvalid.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[http::header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn io_failure_hides_detail() {
        let err = AdminError::from(std::io::Error::other("disk on fire"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

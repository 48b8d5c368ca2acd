use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use constant_time_eq::constant_time_eq;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AdminError, AdminResult};
use crate::AppState;

/// Tokens are valid for eight hours after login.
pub const TOKEN_TTL_SECS: u64 = 8 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
}

/// A freshly signed access token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// Subject of a verified token, attached to protected requests.
#[derive(Debug, Clone)]
pub struct AdminIdentity(pub String);

/// Issues and verifies HS256 tokens for the single admin credential.
#[derive(Clone)]
pub struct AuthGate {
    username: String,
    password: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthGate {
    pub fn new(secret: &str, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Check the credential pair and sign a token for it.
    pub fn login(&self, username: &str, password: &str) -> AdminResult<IssuedToken> {
        // Both comparisons always run.
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        if !(user_ok & pass_ok) {
            return Err(AdminError::InvalidCredentials);
        }
        self.issue_at(username, now())
    }

    fn issue_at(&self, subject: &str, issued_at: u64) -> AdminResult<IssuedToken> {
        let claims = Claims {
            sub: subject.to_owned(),
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECS,
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AdminError::IoFailure(std::io::Error::other(e.to_string())))?;
        Ok(IssuedToken {
            access_token,
            token_type: "bearer",
            expires_in: TOKEN_TTL_SECS,
        })
    }

    /// Validate signature and expiry, returning the token subject.
    pub fn verify(&self, token: &str) -> AdminResult<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AdminError::TokenExpired,
                _ => AdminError::TokenInvalid,
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(AdminError::TokenInvalid);
        }
        Ok(data.claims.sub)
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Axum middleware that validates `Authorization: Bearer <token>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim);

    let Some(token) = token else {
        return AdminError::TokenInvalid.into_response();
    };

    match state.auth.verify(token) {
        Ok(subject) => {
            debug!(subject = %subject, "authorized request");
            request.extensions_mut().insert(AdminIdentity(subject));
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            e.into_response()
        }
    }
}

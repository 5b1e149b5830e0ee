use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to fetch signing key: {0}")]
    KeyFetch(String),
    #[error("token has expired")]
    ExpiredToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("malformed claims: {0}")]
    MalformedClaims(String),
    #[error("unauthorized access")]
    Forbidden,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token endpoint rejected the request: {reason}")]
    TokenEndpoint { status: Option<u16>, reason: String },
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::MalformedClaims(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::KeyFetch(_) => "AUTH_KEY",
            AuthError::ExpiredToken => "AUTH_EXPIRED",
            AuthError::InvalidToken(_) => "AUTH_TOKEN",
            AuthError::MalformedClaims(_) => "AUTH_CLAIMS",
            AuthError::Forbidden => "AUTH_FORBIDDEN",
            AuthError::Authentication(_) => "AUTH_FAILED",
            AuthError::TokenEndpoint { .. } => "AUTH_REFRESH",
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => "AUTH_HEADER",
        }
    }

    fn challenge(&self) -> &'static str {
        match self {
            AuthError::ExpiredToken | AuthError::InvalidToken(_) => {
                r#"Bearer error="invalid_token""#
            }
            _ => "Bearer",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::ExpiredToken,
            _ => Self::InvalidToken(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("X-Error-Code", HeaderValue::from_static(code));
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static(self.challenge()));
        }
        response
    }
}

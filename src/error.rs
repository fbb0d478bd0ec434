//! Unified application error model and mapping helpers.
//! This module provides the error enum used by every service and by the HTTP
//! frontend. Each variant is a machine-distinguishable kind carrying a short
//! code and a human-readable message; `ResendThrottled` also carries the data a
//! client needs to wait and retry.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Missing, malformed, expired or revoked access credential.
    Unauthenticated { code: String, message: String },
    /// Refresh credential is valid but its session is gone from the cache.
    SessionExpired { code: String, message: String },
    /// Wrong email/password, or a refresh credential that fails verification.
    InvalidCredential { code: String, message: String },
    Forbidden { code: String, message: String },
    InvalidOrExpiredCode { code: String, message: String },
    ResendThrottled { code: String, message: String, remaining_seconds: u64, activation_token: String },
    AlreadyActivated { code: String, message: String },
    DuplicateEmail { code: String, message: String },
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::SessionExpired { code, .. }
            | AppError::InvalidCredential { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::InvalidOrExpiredCode { code, .. }
            | AppError::ResendThrottled { code, .. }
            | AppError::AlreadyActivated { code, .. }
            | AppError::DuplicateEmail { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::SessionExpired { message, .. }
            | AppError::InvalidCredential { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::InvalidOrExpiredCode { message, .. }
            | AppError::ResendThrottled { message, .. }
            | AppError::AlreadyActivated { message, .. }
            | AppError::DuplicateEmail { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    /// Stable kind name, identical to the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated { .. } => "unauthenticated",
            AppError::SessionExpired { .. } => "session_expired",
            AppError::InvalidCredential { .. } => "invalid_credential",
            AppError::Forbidden { .. } => "forbidden",
            AppError::InvalidOrExpiredCode { .. } => "invalid_or_expired_code",
            AppError::ResendThrottled { .. } => "resend_throttled",
            AppError::AlreadyActivated { .. } => "already_activated",
            AppError::DuplicateEmail { .. } => "duplicate_email",
            AppError::UserInput { .. } => "user_input",
            AppError::NotFound { .. } => "not_found",
            AppError::Io { .. } => "io",
            AppError::Internal { .. } => "internal",
        }
    }

    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self { AppError::Unauthenticated { code: "unauthenticated".into(), message: msg.into() } }
    pub fn session_expired<S: Into<String>>(msg: S) -> Self { AppError::SessionExpired { code: "session_expired".into(), message: msg.into() } }
    pub fn invalid_credential<S: Into<String>>(msg: S) -> Self { AppError::InvalidCredential { code: "invalid_credential".into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(msg: S) -> Self { AppError::Forbidden { code: "forbidden".into(), message: msg.into() } }
    pub fn invalid_code<S: Into<String>>(msg: S) -> Self { AppError::InvalidOrExpiredCode { code: "invalid_or_expired_code".into(), message: msg.into() } }
    pub fn already_activated<S: Into<String>>(msg: S) -> Self { AppError::AlreadyActivated { code: "already_activated".into(), message: msg.into() } }
    pub fn duplicate_email<S: Into<String>>(msg: S) -> Self { AppError::DuplicateEmail { code: "duplicate_email".into(), message: msg.into() } }
    pub fn throttled<S: Into<String>>(remaining_seconds: u64, activation_token: S) -> Self {
        AppError::ResendThrottled {
            code: "resend_throttled".into(),
            message: format!("A code was sent recently; retry in {} seconds", remaining_seconds),
            remaining_seconds,
            activation_token: activation_token.into(),
        }
    }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::SessionExpired { .. } => 401,
            AppError::InvalidCredential { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::InvalidOrExpiredCode { .. } => 400,
            AppError::ResendThrottled { .. } => 429,
            AppError::AlreadyActivated { .. } => 409,
            AppError::DuplicateEmail { .. } => 409,
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Server faults, as opposed to domain rejections the client caused.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, AppError::Io { .. } | AppError::Internal { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: anything untyped from plumbing is a server fault
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { code: "storage_unavailable".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal { code: "serialization_error".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_fault() {
            tracing::error!(target: "http", kind = self.kind(), "request failed: {}", self);
        }
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &self {
            AppError::ResendThrottled { remaining_seconds, .. } => HeaderValue::from_str(&remaining_seconds.to_string()).ok(),
            _ => None,
        };
        let body = match &self {
            AppError::ResendThrottled { remaining_seconds, activation_token, .. } => Json(serde_json::json!({
                "success": false,
                "remainingSeconds": remaining_seconds,
                "activationToken": activation_token,
                "error": self,
            })),
            _ => Json(serde_json::json!({ "success": false, "error": self })),
        };
        let mut resp = (status, body).into_response();
        if let Some(v) = retry_after {
            resp.headers_mut().insert("retry-after", v);
        }
        resp
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Errors a check-in can fail with.
///
/// The ack-token-not-found condition never appears here: it is recovered
/// locally by falling back to the agent's stored cursor.
#[derive(Debug)]
pub enum CheckinError {
    /// No agent record matches the presented access key, or the record does
    /// not match the agent id in the URL.
    AgentNotFound,
    /// The admission rate window is exhausted.
    RateExceeded,
    /// The ceiling on simultaneous in-flight check-ins is reached.
    CeilingExceeded,
    /// The request or the server was canceled mid-flight.
    Canceled,
    /// The request body or a metadata blob failed to decode.
    Malformed(String),
    /// A store read or write failed; the caller treats this as retriable.
    Store(StoreError),
    /// Any other failure; surfaced like a store failure.
    Internal(String),
}

impl CheckinError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::AgentNotFound => StatusCode::NOT_FOUND,
            Self::RateExceeded | Self::CeilingExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Canceled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Malformed(_) | Self::Store(_) | Self::Internal(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::RateExceeded => "RATE_EXCEEDED",
            Self::CeilingExceeded => "CEILING_EXCEEDED",
            Self::Canceled => "CANCELED",
            Self::Malformed(_) => "MALFORMED",
            Self::Store(_) => "STORE_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn to_http_response(&self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody { code: self.code().to_owned(), message: self.to_string() },
        };
        (self.http_status(), Json(body)).into_response()
    }
}

impl fmt::Display for CheckinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentNotFound => f.write_str("agent not found"),
            Self::RateExceeded => f.write_str("rate limit exceeded"),
            Self::CeilingExceeded => f.write_str("max limit exceeded"),
            Self::Canceled => f.write_str("canceled"),
            Self::Malformed(msg) => write!(f, "malformed request: {msg}"),
            Self::Store(err) => write!(f, "store failure: {err}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for CheckinError {}

impl From<StoreError> for CheckinError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response encoding with size- and threshold-gated gzip compression.

use std::io::Write;

use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::ServerConfig;
use crate::error::CheckinError;
use crate::model::CheckinResponse;

const ENCODING_GZIP: &str = "gzip";

/// Serialize a check-in response, gzipping when the payload exceeds the
/// configured threshold, compression is enabled (level != 0), and the client
/// accepts it.
pub fn write_response(
    resp: &CheckinResponse,
    request_headers: &HeaderMap,
    config: &ServerConfig,
) -> Result<Response, CheckinError> {
    let payload = serde_json::to_vec(resp)
        .map_err(|e| CheckinError::Internal(format!("encode response: {e}")))?;

    if payload.len() > config.compression_threshold
        && config.compression_level != 0
        && accepts_encoding(request_headers, ENCODING_GZIP)
    {
        let mut encoder =
            GzEncoder::new(Vec::new(), Compression::new(config.compression_level));
        encoder
            .write_all(&payload)
            .map_err(|e| CheckinError::Internal(format!("compress response: {e}")))?;
        let body = encoder
            .finish()
            .map_err(|e| CheckinError::Internal(format!("compress response: {e}")))?;

        tracing::trace!(
            data_sz = payload.len(),
            lvl = config.compression_level,
            "compressing checkin response"
        );
        Ok((
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CONTENT_ENCODING, ENCODING_GZIP),
            ],
            body,
        )
            .into_response())
    } else {
        Ok(([(header::CONTENT_TYPE, "application/json")], payload).into_response())
    }
}

/// Whether any `Accept-Encoding` header contains `encoding` as a token
/// (q-parameters ignored).
pub fn accepts_encoding(headers: &HeaderMap, encoding: &str) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.split(';').next().map(str::trim) == Some(encoding))
}

#[cfg(test)]
#[path = "encode_tests.rs"]
mod tests;

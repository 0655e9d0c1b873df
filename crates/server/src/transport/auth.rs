// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent authentication: resolve the presented access key to an agent record.

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::CheckinError;
use crate::model::Agent;
use crate::store::{AgentStore, StoreError};

/// Authorization scheme agents present their access keys under.
const API_KEY_SCHEME: &str = "ApiKey ";

/// An access key as presented on the wire: `ApiKey base64(<id>:<key>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKey {
    pub id: String,
    pub key: String,
}

/// Extract the access key from the `Authorization` header.
pub fn extract_access_key(headers: &HeaderMap) -> Result<AccessKey, CheckinError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CheckinError::Malformed("missing authorization header".to_owned()))?;

    let token = header
        .strip_prefix(API_KEY_SCHEME)
        .ok_or_else(|| CheckinError::Malformed("unsupported authorization scheme".to_owned()))?;

    let decoded = BASE64
        .decode(token.trim())
        .map_err(|e| CheckinError::Malformed(format!("access key encoding: {e}")))?;
    let text = String::from_utf8(decoded)
        .map_err(|e| CheckinError::Malformed(format!("access key encoding: {e}")))?;

    let (id, key) = text
        .split_once(':')
        .ok_or_else(|| CheckinError::Malformed("malformed access key".to_owned()))?;

    Ok(AccessKey { id: id.to_owned(), key: key.to_owned() })
}

/// Authenticate the request against the agent named in the URL.
///
/// The record is found by the access-key identifier; a URL/record id mismatch
/// is indistinguishable from an unknown agent to the caller.
pub async fn authenticate(
    headers: &HeaderMap,
    agent_id: &str,
    agents: &dyn AgentStore,
) -> Result<Agent, CheckinError> {
    let access_key = extract_access_key(headers)?;

    let agent = match agents.find_agent_by_access_key_id(&access_key.id).await {
        Ok(agent) => agent,
        Err(StoreError::NotFound) => return Err(CheckinError::AgentNotFound),
        Err(e) => return Err(e.into()),
    };

    if agent.id != agent_id {
        tracing::warn!(agent_id, key_id = %access_key.id, "access key bound to another agent");
        return Err(CheckinError::AgentNotFound);
    }

    Ok(agent)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;

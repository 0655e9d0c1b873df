// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted documents and wire types of the check-in API.
//!
//! Opaque payloads (policy bodies, action data, local metadata) ride as
//! `Box<RawValue>` so the core never re-shapes structure it does not own.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Action type tag reserved for policy-change envelopes.
pub const TYPE_POLICY_CHANGE: &str = "POLICY_CHANGE";

/// Field name of the metadata delta applied by the heartbeat writer.
pub const FIELD_LOCAL_METADATA: &str = "local_metadata";

/// A JSON object of agent-record fields to update.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A managed agent as persisted in the store.
///
/// Created by enrollment (external). The check-in core mutates it in two
/// places only: the policy materializer rotates the default output key, and
/// the heartbeat writer refreshes liveness fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,

    /// Identifier of the access key the agent authenticates with. Immutable.
    pub access_key_id: String,

    pub policy_id: String,
    pub policy_revision_idx: i64,
    pub policy_coordinator_idx: i64,

    /// Monotonic per-agent cursor over delivered actions.
    pub action_seq_no: i64,

    pub local_metadata: Box<RawValue>,

    /// Current default output API key in `<id>:<key>` form. Empty until the
    /// first policy delivery mints one.
    #[serde(default)]
    pub default_output_key: String,
    #[serde(default)]
    pub default_output_key_id: String,

    /// Content digest of the output-permissions descriptor the current
    /// default output key was minted against.
    #[serde(default)]
    pub policy_output_permissions_hash: String,

    /// Last liveness timestamp, RFC 3339. Written by the heartbeat flush.
    #[serde(default)]
    pub last_checkin: String,
}

/// An action document as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub seq_no: i64,

    /// RFC 3339 expiration; expired actions are never delivered.
    #[serde(default)]
    pub expiration: String,

    /// Target agent identifiers.
    pub agents: Vec<String>,

    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub input_type: String,

    pub data: Box<RawValue>,

    /// Creation timestamp, RFC 3339.
    pub timestamp: String,
}

/// A policy document as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    pub revision_idx: i64,
    pub coordinator_idx: i64,
    pub timestamp: String,
    pub data: Box<RawValue>,
}

/// Body of `POST /api/v1/agents/{id}/checkin`.
#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    /// High-water mark of processed actions, as returned by a previous
    /// check-in. Empty or absent on first contact.
    #[serde(default)]
    pub ack_token: String,

    /// The agent's current local metadata. Absent is treated as `null`.
    #[serde(default)]
    pub local_metadata: Option<Box<RawValue>>,
}

/// Body of a successful check-in response.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub ack_token: String,
    pub action: String,
    pub actions: Vec<ActionResp>,
}

/// One delivered action envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResp {
    pub agent_id: String,
    pub created_at: String,
    pub data: Box<RawValue>,
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub input_type: String,
}

/// Current instant as an RFC 3339 UTC timestamp, the store's time format.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

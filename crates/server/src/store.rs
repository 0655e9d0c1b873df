// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seams to the external collaborators: document store, bulk writer backend,
//! ack-token resolver, output API-key issuer, and global checkpoint.
//!
//! The check-in core only names queries; backends define their shape.

use std::fmt;

use async_trait::async_trait;

use crate::model::{Action, Agent};

/// Errors surfaced by the store-backed collaborators.
#[derive(Debug)]
pub enum StoreError {
    /// No document matched the query.
    NotFound,
    /// Backend failure; the caller may retry.
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Indexed reads and writes against agent records.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// `find-agent-by-access-key-id`
    async fn find_agent_by_access_key_id(&self, key_id: &str) -> Result<Agent, StoreError>;

    /// `find-agent-by-id`
    async fn find_agent_by_id(&self, id: &str) -> Result<Agent, StoreError>;

    /// `index-agent` — persist the full record.
    async fn index_agent(&self, agent: &Agent) -> Result<(), StoreError>;

    /// Apply a coalesced partial update to an agent record. This is the
    /// bulk-writer seam; implementations may batch further.
    async fn bulk_update_agent(
        &self,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Indexed reads against action documents.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// `find-actions-by-agent-bounded` — actions targeting `agent_id` with
    /// `seq_no < n <= max_seq_no` and `expiration > now`, ordered by
    /// sequence number ascending.
    async fn find_actions_by_agent_bounded(
        &self,
        agent_id: &str,
        seq_no: i64,
        max_seq_no: i64,
        now: &str,
    ) -> Result<Vec<Action>, StoreError>;
}

/// The store's current maximum action sequence number.
pub trait CheckpointProvider: Send + Sync {
    fn checkpoint(&self) -> i64;
}

/// Translates an opaque ack token back into a sequence number.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<i64, StoreError>;
}

/// An output API key minted for an agent.
#[derive(Debug, Clone)]
pub struct OutputKey {
    pub id: String,
    pub key: String,
}

impl OutputKey {
    /// The form handed to the agent and stored on its record.
    pub fn agent_token(&self) -> String {
        format!("{}:{}", self.id, self.key)
    }
}

/// Mints output API keys against a role descriptor.
#[async_trait]
pub trait OutputKeyIssuer: Send + Sync {
    /// Mint a key for `agent_id` scoped to `roles`, the canonical bytes of
    /// the policy's output-permissions descriptor for `output_name`.
    async fn generate(
        &self,
        agent_id: &str,
        output_name: &str,
        roles: &[u8],
    ) -> Result<OutputKey, StoreError>;
}

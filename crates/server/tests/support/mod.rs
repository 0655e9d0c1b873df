// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory backends and server plumbing for the check-in integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderValue;
use axum_test::TestServer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;

use muster::config::{CheckinLimits, ServerConfig};
use muster::model::{Action, Agent};
use muster::state::{Backends, ServerState};
use muster::store::{
    ActionStore, AgentStore, CheckpointProvider, OutputKey, OutputKeyIssuer, StoreError,
    TokenResolver,
};
use muster::transport::build_router;

/// One struct backing every collaborator seam, so tests can inspect the
/// whole store after a request.
#[derive(Default)]
pub struct MemoryStore {
    agents: Mutex<HashMap<String, Agent>>,
    actions: Mutex<Vec<Action>>,
    checkpoint: AtomicI64,
    tokens: Mutex<HashMap<String, i64>>,
    /// Bulk updates applied, in order.
    pub updates: Mutex<Vec<(String, serde_json::Value)>>,
    minted: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_agent(&self, agent: Agent) {
        self.agents.lock().expect("lock").insert(agent.id.clone(), agent);
    }

    pub fn agent(&self, id: &str) -> Option<Agent> {
        self.agents.lock().expect("lock").get(id).cloned()
    }

    pub fn put_action(&self, action: Action) {
        self.actions.lock().expect("lock").push(action);
    }

    pub fn set_checkpoint(&self, seq_no: i64) {
        self.checkpoint.store(seq_no, Ordering::Relaxed);
    }

    pub fn put_token(&self, token: &str, seq_no: i64) {
        self.tokens.lock().expect("lock").insert(token.to_owned(), seq_no);
    }

    pub fn minted_keys(&self) -> u32 {
        self.minted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_agent_by_access_key_id(&self, key_id: &str) -> Result<Agent, StoreError> {
        self.agents
            .lock()
            .expect("lock")
            .values()
            .find(|a| a.access_key_id == key_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_agent_by_id(&self, id: &str) -> Result<Agent, StoreError> {
        self.agents.lock().expect("lock").get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn index_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        self.put_agent(agent.clone());
        Ok(())
    }

    async fn bulk_update_agent(
        &self,
        id: &str,
        fields: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.updates.lock().expect("lock").push((id.to_owned(), fields));
        Ok(())
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn find_actions_by_agent_bounded(
        &self,
        agent_id: &str,
        seq_no: i64,
        max_seq_no: i64,
        now: &str,
    ) -> Result<Vec<Action>, StoreError> {
        let mut found: Vec<Action> = self
            .actions
            .lock()
            .expect("lock")
            .iter()
            .filter(|a| a.agents.iter().any(|t| t == agent_id))
            .filter(|a| a.seq_no > seq_no && a.seq_no <= max_seq_no)
            .filter(|a| a.expiration.is_empty() || a.expiration.as_str() > now)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.seq_no);
        Ok(found)
    }
}

impl CheckpointProvider for MemoryStore {
    fn checkpoint(&self) -> i64 {
        self.checkpoint.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TokenResolver for MemoryStore {
    async fn resolve(&self, token: &str) -> Result<i64, StoreError> {
        self.tokens.lock().expect("lock").get(token).copied().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl OutputKeyIssuer for MemoryStore {
    async fn generate(
        &self,
        _agent_id: &str,
        _output_name: &str,
        _roles: &[u8],
    ) -> Result<OutputKey, StoreError> {
        let n = self.minted.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(OutputKey { id: format!("key-{n}"), key: format!("secret-{n}") })
    }
}

/// Short-poll config: requests never block longer than a test can wait.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        long_poll_ms: 150,
        // Keep the liveness ticker out of the way unless a test wants it.
        checkin_timestamp_ms: 3_600_000,
        limits: CheckinLimits { interval_ms: 0, burst: 0, max_connections: 0 },
        ..ServerConfig::default()
    }
}

pub fn build_state(config: ServerConfig, store: &Arc<MemoryStore>) -> Arc<ServerState> {
    let backends = Backends {
        agents: Arc::clone(store) as Arc<dyn AgentStore>,
        actions: Arc::clone(store) as Arc<dyn ActionStore>,
        checkpoint: Arc::clone(store) as Arc<dyn CheckpointProvider>,
        token_resolver: Some(Arc::clone(store) as Arc<dyn TokenResolver>),
        key_issuer: Arc::clone(store) as Arc<dyn OutputKeyIssuer>,
    };
    Arc::new(ServerState::new(config, CancellationToken::new(), backends))
}

pub fn test_server(state: Arc<ServerState>) -> TestServer {
    TestServer::new(build_router(state)).expect("failed to create test server")
}

pub fn raw(json: &str) -> Box<RawValue> {
    RawValue::from_string(json.to_owned()).expect("raw json")
}

pub fn agent(id: &str, access_key_id: &str, action_seq_no: i64) -> Agent {
    Agent {
        id: id.to_owned(),
        access_key_id: access_key_id.to_owned(),
        policy_id: "p1".to_owned(),
        policy_revision_idx: 2,
        policy_coordinator_idx: 0,
        action_seq_no,
        local_metadata: raw(r#"{"host":"edge-1"}"#),
        default_output_key: String::new(),
        default_output_key_id: String::new(),
        policy_output_permissions_hash: String::new(),
        last_checkin: String::new(),
    }
}

pub fn action(id: &str, seq_no: i64, agents: &[&str]) -> Action {
    Action {
        action_id: id.to_owned(),
        seq_no,
        expiration: String::new(),
        agents: agents.iter().map(|a| (*a).to_owned()).collect(),
        action_type: "UPGRADE".to_owned(),
        input_type: String::new(),
        data: raw(r#"{"version":"9.1.0"}"#),
        timestamp: "2026-01-01T00:00:00Z".to_owned(),
    }
}

pub fn auth_header(access_key_id: &str) -> HeaderValue {
    let token = BASE64.encode(format!("{access_key_id}:secret"));
    HeaderValue::from_str(&format!("ApiKey {token}")).expect("header")
}

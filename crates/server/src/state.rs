// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bulk::HeartbeatWriter;
use crate::config::ServerConfig;
use crate::dispatch::ActionDispatcher;
use crate::limit::CheckinLimiter;
use crate::policy::monitor::PolicyMonitor;
use crate::store::{ActionStore, AgentStore, CheckpointProvider, OutputKeyIssuer, TokenResolver};

/// External collaborators the check-in core is built on. The embedder wires
/// real backends; tests wire in-memory fakes.
pub struct Backends {
    pub agents: Arc<dyn AgentStore>,
    pub actions: Arc<dyn ActionStore>,
    pub checkpoint: Arc<dyn CheckpointProvider>,
    /// Absent when ack tokens are not in use; cursors then always come from
    /// the agent record.
    pub token_resolver: Option<Arc<dyn TokenResolver>>,
    pub key_issuer: Arc<dyn OutputKeyIssuer>,
}

/// Shared server state.
pub struct ServerState {
    pub config: ServerConfig,
    pub shutdown: CancellationToken,

    pub agents: Arc<dyn AgentStore>,
    pub actions: Arc<dyn ActionStore>,
    pub checkpoint: Arc<dyn CheckpointProvider>,
    pub token_resolver: Option<Arc<dyn TokenResolver>>,
    pub key_issuer: Arc<dyn OutputKeyIssuer>,

    pub dispatcher: Arc<ActionDispatcher>,
    pub policy_monitor: Arc<PolicyMonitor>,
    pub heartbeats: Arc<HeartbeatWriter>,
    pub limiter: CheckinLimiter,
}

impl ServerState {
    pub fn new(config: ServerConfig, shutdown: CancellationToken, backends: Backends) -> Self {
        tracing::info!(
            limits = ?config.limits,
            long_poll_ms = config.long_poll_ms,
            checkin_timestamp_ms = config.checkin_timestamp_ms,
            "check-in limits installed"
        );

        let limiter = CheckinLimiter::new(&config.limits);

        Self {
            config,
            shutdown,
            agents: backends.agents,
            actions: backends.actions,
            checkpoint: backends.checkpoint,
            token_resolver: backends.token_resolver,
            key_issuer: backends.key_issuer,
            dispatcher: Arc::new(ActionDispatcher::new()),
            policy_monitor: Arc::new(PolicyMonitor::new()),
            heartbeats: Arc::new(HeartbeatWriter::new()),
            limiter,
        }
    }
}

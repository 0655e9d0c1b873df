// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat coalescer: liveness and metadata updates are merged per agent
//! and flushed in batches so check-ins never wait on a store write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::model::{now_rfc3339, Fields};
use crate::store::AgentStore;

/// One pending heartbeat for an agent, merged across check-in calls within
/// the flush window.
#[derive(Debug)]
struct PendingBeat {
    fields: Option<Fields>,
    seq_no: i64,
}

/// Accepts concurrent heartbeat enqueues; flushing is serialized by the
/// background loop.
pub struct HeartbeatWriter {
    pending: Mutex<HashMap<String, PendingBeat>>,
}

impl HeartbeatWriter {
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingBeat>> {
        self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record a liveness heartbeat. `fields` carries a metadata delta or is
    /// `None` for a liveness-only tick; the newest cursor always wins.
    pub fn check_in(&self, agent_id: &str, fields: Option<Fields>, seq_no: i64) {
        let mut pending = self.lock();
        let beat = pending
            .entry(agent_id.to_owned())
            .or_insert(PendingBeat { fields: None, seq_no });
        beat.seq_no = seq_no;
        if fields.is_some() {
            beat.fields = fields;
        }
    }

    /// Drain pending beats and write one update per agent. Failures are
    /// logged and never surface to a client.
    pub async fn flush(&self, agents: &dyn AgentStore) {
        let drained: Vec<(String, PendingBeat)> = self.lock().drain().collect();
        if drained.is_empty() {
            return;
        }

        let now = now_rfc3339();
        for (agent_id, beat) in drained {
            let mut fields = beat.fields.unwrap_or_default();
            fields.insert("last_checkin".to_owned(), serde_json::Value::String(now.clone()));
            fields.insert("action_seq_no".to_owned(), serde_json::Value::from(beat.seq_no));

            if let Err(e) = agents.bulk_update_agent(&agent_id, serde_json::Value::Object(fields)).await
            {
                tracing::warn!(agent_id = %agent_id, err = %e, "heartbeat flush failed");
            }
        }
    }

    /// Spawn the background flush loop. A final flush runs on shutdown.
    pub fn spawn_flush_loop(
        self: Arc<Self>,
        agents: Arc<dyn AgentStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.flush(agents.as_ref()).await;
                        break;
                    }
                    _ = tick.tick() => {}
                }
                self.flush(agents.as_ref()).await;
            }
        });
    }
}

impl Default for HeartbeatWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bulk_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action dispatcher: routes newly-stored action documents to the check-in
//! currently polling for each target agent.
//!
//! One subscription per agent at a time — the dispatcher is the single writer
//! per agent, and a fresh subscribe replaces (and closes) the previous one so
//! the superseded check-in terminates and its client reconnects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::model::Action;

/// Capacity of one undelivered batch per subscription. A subscriber that has
/// not drained the previous batch when the next arrives is dropped rather
/// than silently skipped.
const SUB_CHANNEL_CAP: usize = 1;

struct SubEntry {
    token: u64,
    seq_no: i64,
    tx: mpsc::Sender<Vec<Action>>,
}

/// Routes dispatched action batches to per-agent subscribers.
pub struct ActionDispatcher {
    subs: Mutex<HashMap<String, SubEntry>>,
    next_token: AtomicU64,
}

/// A live subscription for one agent. Deregisters on drop.
pub struct ActionSub {
    dispatcher: Arc<ActionDispatcher>,
    agent_id: String,
    token: u64,
    rx: mpsc::Receiver<Vec<Action>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self { subs: Mutex::new(HashMap::new()), next_token: AtomicU64::new(1) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SubEntry>> {
        self.subs.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe for actions targeting `agent_id` with sequence numbers above
    /// `seq_no`. Replaces any existing subscription for the agent.
    pub fn subscribe(self: &Arc<Self>, agent_id: &str, seq_no: i64) -> ActionSub {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUB_CHANNEL_CAP);

        let replaced = self
            .lock()
            .insert(agent_id.to_owned(), SubEntry { token, seq_no, tx });
        if replaced.is_some() {
            tracing::debug!(agent_id, "replacing existing action subscription");
        }

        ActionSub { dispatcher: Arc::clone(self), agent_id: agent_id.to_owned(), token, rx }
    }

    /// Route a batch of freshly-stored action documents. Per subscribed
    /// agent, documents above the subscription cursor are delivered in
    /// arrival order; a full downstream channel drops the subscription.
    pub fn dispatch(&self, actions: &[Action]) {
        let mut grouped: HashMap<&str, Vec<Action>> = HashMap::new();
        {
            let subs = self.lock();
            for action in actions {
                for agent_id in &action.agents {
                    if let Some(entry) = subs.get(agent_id.as_str()) {
                        if action.seq_no > entry.seq_no {
                            grouped.entry(agent_id.as_str()).or_default().push(action.clone());
                        }
                    }
                }
            }
        }

        for (agent_id, batch) in grouped {
            let max_seq = batch.iter().map(|a| a.seq_no).max().unwrap_or(i64::MIN);
            let mut subs = self.lock();
            let Some(entry) = subs.get_mut(agent_id) else { continue };
            match entry.tx.try_send(batch) {
                Ok(()) => {
                    // Keep consecutive batches monotonic in seq-no.
                    entry.seq_no = entry.seq_no.max(max_seq);
                }
                Err(e) => {
                    tracing::debug!(agent_id, err = %e, "action subscriber not drained, dropping");
                    subs.remove(agent_id);
                }
            }
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn unsubscribe(&self, agent_id: &str, token: u64) {
        let mut subs = self.lock();
        if subs.get(agent_id).is_some_and(|entry| entry.token == token) {
            subs.remove(agent_id);
        }
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSub {
    /// Receive the next action batch. `None` means the dispatcher dropped
    /// this subscription (undrained channel or replacement).
    pub async fn recv(&mut self) -> Option<Vec<Action>> {
        self.rx.recv().await
    }

    /// Deregister. Idempotent; a replacement subscription is left alone.
    pub fn unsubscribe(&self) {
        self.dispatcher.unsubscribe(&self.agent_id, self.token);
    }
}

impl Drop for ActionSub {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

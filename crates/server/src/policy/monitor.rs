// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy monitor: notifies polling check-ins when a strictly-newer revision
//! of their assigned policy becomes known.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::model::Policy;
use crate::policy::PolicyRevision;

struct SubEntry {
    agent_id: String,
    policy_id: String,
    revision_idx: i64,
    coordinator_idx: i64,
    tx: mpsc::Sender<Policy>,
}

/// Fans revision announcements out to per-request subscriptions and keeps
/// the newest known revision per policy so late subscribers catch up.
pub struct PolicyMonitor {
    subs: Mutex<HashMap<u64, SubEntry>>,
    latest: Mutex<HashMap<String, Policy>>,
    next_id: AtomicU64,
}

/// A live policy subscription for one check-in. Deregisters on drop.
pub struct PolicySub {
    monitor: Arc<PolicyMonitor>,
    id: u64,
    rx: mpsc::Receiver<Policy>,
}

impl PolicyMonitor {
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(HashMap::new()),
            latest: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_subs(&self) -> MutexGuard<'_, HashMap<u64, SubEntry>> {
        self.subs.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_latest(&self) -> MutexGuard<'_, HashMap<String, Policy>> {
        self.latest.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Subscribe for revisions of `policy_id` strictly newer than the
    /// agent's current `(revision_idx, coordinator_idx)`. A newer revision
    /// already known to the monitor is delivered immediately.
    pub fn subscribe(
        self: &Arc<Self>,
        agent_id: &str,
        policy_id: &str,
        revision_idx: i64,
        coordinator_idx: i64,
    ) -> PolicySub {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);

        if let Some(known) = self.lock_latest().get(policy_id) {
            if PolicyRevision::from_policy(known).newer_than(revision_idx, coordinator_idx) {
                let _ = tx.try_send(known.clone());
            }
        }

        self.lock_subs().insert(
            id,
            SubEntry {
                agent_id: agent_id.to_owned(),
                policy_id: policy_id.to_owned(),
                revision_idx,
                coordinator_idx,
                tx,
            },
        );

        PolicySub { monitor: Arc::clone(self), id, rx }
    }

    /// Announce a policy revision. Strictly-newer revisions update the
    /// per-policy cache and are pushed to matching subscriptions; stale
    /// announcements are ignored.
    pub fn on_revision(&self, policy: Policy) {
        let rev = PolicyRevision::from_policy(&policy);

        {
            let mut latest = self.lock_latest();
            let stale = latest
                .get(&policy.policy_id)
                .is_some_and(|known| !rev.newer_than(known.revision_idx, known.coordinator_idx));
            if stale {
                tracing::debug!(
                    policy_id = %policy.policy_id,
                    revision = %rev,
                    "stale policy revision ignored"
                );
                return;
            }
            latest.insert(policy.policy_id.clone(), policy.clone());
        }

        let subs = self.lock_subs();
        for entry in subs.values() {
            if entry.policy_id != policy.policy_id {
                continue;
            }
            if !rev.newer_than(entry.revision_idx, entry.coordinator_idx) {
                continue;
            }
            if entry.tx.try_send(policy.clone()).is_err() {
                // At most one pending document per subscription; a request
                // that has not consumed the previous one needs nothing newer.
                tracing::debug!(agent_id = %entry.agent_id, "policy subscriber already notified");
            }
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subs().len()
    }

    fn unsubscribe(&self, id: u64) {
        self.lock_subs().remove(&id);
    }
}

impl Default for PolicyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicySub {
    /// Receive the next newer policy document. `None` means the monitor is
    /// gone (shutdown).
    pub async fn recv(&mut self) -> Option<Policy> {
        self.rx.recv().await
    }

    /// Deregister. Idempotent.
    pub fn unsubscribe(&self) {
        self.monitor.unsubscribe(self.id);
    }
}

impl Drop for PolicySub {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;

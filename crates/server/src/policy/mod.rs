// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy delivery: revision ordering, the change monitor, and the
//! materializer that injects per-agent output API keys.

pub mod materialize;
pub mod monitor;

use std::fmt;

use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

use crate::error::CheckinError;
use crate::model::Policy;

/// Property of the policy body holding the output-permissions descriptor.
pub const OUTPUT_PERMISSIONS_PROPERTY: &str = "output_permissions";

/// Property of the policy body holding the outputs mapping.
pub const OUTPUTS_PROPERTY: &str = "outputs";

/// Name of the output whose API key the materializer manages.
pub const DEFAULT_OUTPUT_NAME: &str = "default";

/// The two-dimensional version of a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyRevision {
    pub revision_idx: i64,
    pub coordinator_idx: i64,
}

impl PolicyRevision {
    pub fn from_policy(policy: &Policy) -> Self {
        Self { revision_idx: policy.revision_idx, coordinator_idx: policy.coordinator_idx }
    }

    /// Lexicographic compare on `(revision_idx, coordinator_idx)`.
    pub fn newer_than(&self, revision_idx: i64, coordinator_idx: i64) -> bool {
        (self.revision_idx, self.coordinator_idx) > (revision_idx, coordinator_idx)
    }
}

impl fmt::Display for PolicyRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.revision_idx, self.coordinator_idx)
    }
}

/// Content digest and canonical bytes of an output-permissions descriptor.
///
/// Parsing and re-serializing sorts object keys, so byte layout of the stored
/// policy does not affect the digest.
pub fn role_descriptors(raw: &RawValue) -> Result<(String, Vec<u8>), CheckinError> {
    let value: serde_json::Value = serde_json::from_str(raw.get())
        .map_err(|e| CheckinError::Malformed(format!("output permissions: {e}")))?;
    let canonical = serde_json::to_vec(&value)
        .map_err(|e| CheckinError::Internal(format!("output permissions: {e}")))?;
    let hash = hex::encode(Sha256::digest(&canonical));
    Ok((hash, canonical))
}

/// Digest the descriptor and report whether it differs from the hash stored
/// on the agent record; equal hashes mean no key rotation is needed.
pub fn output_permissions_changed(
    stored_hash: &str,
    raw: &RawValue,
) -> Result<(String, Vec<u8>, bool), CheckinError> {
    let (hash, roles) = role_descriptors(raw)?;
    let changed = hash != stored_hash;
    Ok((hash, roles, changed))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turns a policy revision into a deliverable policy-change envelope,
//! minting and injecting the agent's default output API key on the way.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::CheckinError;
use crate::model::{ActionResp, Policy, TYPE_POLICY_CHANGE};
use crate::policy::{
    output_permissions_changed, role_descriptors, PolicyRevision, DEFAULT_OUTPUT_NAME,
    OUTPUTS_PROPERTY, OUTPUT_PERMISSIONS_PROPERTY,
};
use crate::store::{AgentStore, OutputKeyIssuer};

/// The wrapped payload of a policy-change envelope.
#[derive(Serialize)]
struct PolicyData<'a> {
    policy: &'a HashMap<String, Box<RawValue>>,
}

/// Materialize `policy` for `agent_id`.
///
/// The agent record is re-read from the store rather than trusted from the
/// request: a parallel check-in on the same agent may have rotated its key
/// after this request authenticated. If the record needs a fresh output key
/// it is minted and the whole record persisted before the envelope is built;
/// a persistence failure aborts this delivery (the subscription re-fires on
/// the next revision).
pub async fn materialize(
    agents: &dyn AgentStore,
    issuer: &dyn OutputKeyIssuer,
    agent_id: &str,
    policy: &Policy,
) -> Result<ActionResp, CheckinError> {
    let mut doc: HashMap<String, Box<RawValue>> = serde_json::from_str(policy.data.get())
        .map_err(|e| CheckinError::Malformed(format!("policy data: {e}")))?;

    let mut agent = agents.find_agent_by_id(agent_id).await?;

    let permissions = doc
        .get(OUTPUT_PERMISSIONS_PROPERTY)
        .ok_or_else(|| CheckinError::Malformed("policy has no output permissions".to_owned()))?;

    let (hash, roles, need_key) = if agent.default_output_key.is_empty() {
        tracing::debug!(agent_id, "agent has no default output key");
        let (hash, roles) = role_descriptors(permissions)?;
        (hash, roles, true)
    } else {
        let changed =
            output_permissions_changed(&agent.policy_output_permissions_hash, permissions)?;
        if changed.2 {
            tracing::debug!(agent_id, "policy output permissions changed");
        }
        changed
    };

    if need_key {
        let key = issuer.generate(&agent.id, DEFAULT_OUTPUT_NAME, &roles).await?;
        agent.default_output_key = key.agent_token();
        agent.default_output_key_id = key.id;
        agent.policy_output_permissions_hash = hash;

        tracing::info!(agent_id, "rewriting agent record to pick up new output key");
        agents.index_agent(&agent).await?;
    }

    if let Some(raw_outputs) = doc.get(OUTPUTS_PROPERTY) {
        let mut outputs: serde_json::Value = serde_json::from_str(raw_outputs.get())
            .map_err(|e| CheckinError::Malformed(format!("policy outputs: {e}")))?;

        let injected = set_map_key(
            &mut outputs,
            serde_json::Value::String(agent.default_output_key.clone()),
            &[DEFAULT_OUTPUT_NAME, "api_key"],
        );
        if injected {
            let raw = serde_json::to_string(&outputs)
                .and_then(RawValue::from_string)
                .map_err(|e| CheckinError::Internal(format!("policy outputs: {e}")))?;
            doc.insert(OUTPUTS_PROPERTY.to_owned(), raw);
        } else {
            // Deliver unmodified; the policy may legitimately have no
            // default output.
            tracing::debug!(agent_id, "cannot inject api_key into policy outputs");
        }
    }

    let data = serde_json::to_string(&PolicyData { policy: &doc })
        .and_then(RawValue::from_string)
        .map_err(|e| CheckinError::Internal(format!("policy envelope: {e}")))?;

    let rev = PolicyRevision::from_policy(policy);
    Ok(ActionResp {
        agent_id: agent.id,
        created_at: policy.timestamp.clone(),
        data,
        id: rev.to_string(),
        action_type: TYPE_POLICY_CHANGE.to_owned(),
        input_type: String::new(),
    })
}

/// Set `obj[keys[0]]...[keys[n-1]] = val`, creating nothing: every segment
/// but the last must already exist and be an object.
fn set_map_key(obj: &mut serde_json::Value, val: serde_json::Value, keys: &[&str]) -> bool {
    let Some((last, path)) = keys.split_last() else {
        return false;
    };

    let mut cursor = obj;
    for key in path {
        match cursor.get_mut(key) {
            Some(next) if next.is_object() => cursor = next,
            _ => return false,
        }
    }

    match cursor.as_object_mut() {
        Some(map) => {
            map.insert((*last).to_owned(), val);
            true
        }
        None => false,
    }
}

#[cfg(test)]
#[path = "materialize_tests.rs"]
mod tests;

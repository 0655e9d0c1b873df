// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The check-in orchestrator: one linear task per request binding admission,
//! authentication, cursor resolution, subscriptions, heartbeats, and the
//! long-poll multiplex.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;

use crate::error::CheckinError;
use crate::model::{
    now_rfc3339, Action, ActionResp, Agent, CheckinRequest, CheckinResponse, Fields,
    FIELD_LOCAL_METADATA,
};
use crate::policy::materialize::materialize;
use crate::state::ServerState;
use crate::store::{StoreError, TokenResolver};
use crate::transport::{auth, encode};

/// `POST /api/v1/agents/{id}/checkin`
pub async fn checkin(
    State(s): State<Arc<ServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_checkin(&s, &id, &headers, &body).await {
        Ok(resp) => resp,
        Err(err) => {
            let code = err.http_status();
            match &err {
                CheckinError::AgentNotFound | CheckinError::CeilingExceeded => {
                    tracing::warn!(agent_id = %id, code = %code, err = %err, "fail checkin");
                }
                CheckinError::RateExceeded | CheckinError::Canceled => {
                    tracing::debug!(agent_id = %id, code = %code, err = %err, "fail checkin");
                }
                _ => {
                    tracing::info!(agent_id = %id, code = %code, err = %err, "fail checkin");
                }
            }
            err.to_http_response()
        }
    }
}

async fn handle_checkin(
    s: &Arc<ServerState>,
    id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, CheckinError> {
    // Declared first so Rust's reverse drop order releases the permit after
    // the subscriptions below have deregistered.
    let _permit = s.limiter.acquire()?;

    let agent = auth::authenticate(headers, id, s.agents.as_ref()).await?;

    let req: CheckinRequest = serde_json::from_slice(body)
        .map_err(|e| CheckinError::Malformed(format!("request body: {e}")))?;

    // Compare local_metadata content and update if different.
    let fields = parse_meta(&agent, &req)?;

    // Resolve the ack token, falling back on the agent record.
    let seq_no = resolve_seq_no(s.token_resolver.as_deref(), &req, &agent).await?;

    let mut action_sub = s.dispatcher.subscribe(&agent.id, seq_no);
    let mut policy_sub = s.policy_monitor.subscribe(
        &agent.id,
        &agent.policy_id,
        agent.policy_revision_idx,
        agent.policy_coordinator_idx,
    );

    // Both tickers start only after the subscriptions are installed.
    let period = s.config.checkin_timestamp_interval();
    let mut beat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    beat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let long_poll = tokio::time::sleep(s.config.long_poll_interval());
    tokio::pin!(long_poll);

    // Initial heartbeat, carrying any metadata delta.
    s.heartbeats.check_in(&agent.id, fields, seq_no);

    // Check pending actions first; an empty set arms the long poll.
    let pending = fetch_pending_actions(s, seq_no, &agent.id).await?;
    let mut actions = convert_actions(&agent.id, pending);

    if actions.is_empty() {
        loop {
            tokio::select! {
                _ = s.shutdown.cancelled() => {
                    return Err(CheckinError::Canceled);
                }
                batch = action_sub.recv() => {
                    let Some(docs) = batch else {
                        tracing::debug!(agent_id = %agent.id, "action subscription dropped");
                        return Err(CheckinError::Canceled);
                    };
                    actions.extend(convert_actions(&agent.id, docs));
                    break;
                }
                doc = policy_sub.recv() => {
                    let Some(policy) = doc else {
                        return Err(CheckinError::Canceled);
                    };
                    let envelope =
                        materialize(s.agents.as_ref(), s.key_issuer.as_ref(), &agent.id, &policy)
                            .await?;
                    actions.push(envelope);
                    break;
                }
                _ = &mut long_poll => {
                    tracing::trace!(agent_id = %agent.id, "fire long poll");
                    break;
                }
                _ = beat.tick() => {
                    s.heartbeats.check_in(&agent.id, None, seq_no);
                }
            }
        }
    }

    let ack_token = actions.last().map(|a| a.id.clone()).unwrap_or_default();
    let resp = CheckinResponse { ack_token, action: "checkin".to_owned(), actions };

    encode::write_response(&resp, headers, &s.config)
}

/// Compare the request and stored local metadata; return the fields delta to
/// persist, or `None` when nothing changed.
fn parse_meta(agent: &Agent, req: &CheckinRequest) -> Result<Option<Fields>, CheckinError> {
    let req_meta = req.local_metadata.as_deref().map_or("null", |raw| raw.get());

    // Quick verbatim comparison first.
    if req_meta == agent.local_metadata.get() {
        tracing::trace!(agent_id = %agent.id, "local metadata verbatim-equal");
        return Ok(None);
    }

    let req_value: serde_json::Value = serde_json::from_str(req_meta)
        .map_err(|e| CheckinError::Malformed(format!("request local_metadata: {e}")))?;
    let agent_value: serde_json::Value = serde_json::from_str(agent.local_metadata.get())
        .map_err(|e| CheckinError::Malformed(format!("stored local_metadata: {e}")))?;

    if !req_value.is_null() && req_value != agent_value {
        tracing::info!(agent_id = %agent.id, "applying new local metadata");
        let mut fields = Fields::new();
        fields.insert(FIELD_LOCAL_METADATA.to_owned(), req_value);
        return Ok(Some(fields));
    }

    Ok(None)
}

/// Translate the request ack token into a cursor. A token unknown to the
/// resolver falls back to the agent's stored cursor without error — agents
/// may have been migrated or the token space rotated.
async fn resolve_seq_no(
    resolver: Option<&dyn TokenResolver>,
    req: &CheckinRequest,
    agent: &Agent,
) -> Result<i64, CheckinError> {
    let mut seq_no = agent.action_seq_no;

    if let Some(resolver) = resolver {
        if !req.ack_token.is_empty() {
            match resolver.resolve(&req.ack_token).await {
                Ok(resolved) => seq_no = resolved,
                Err(StoreError::NotFound) => {
                    tracing::debug!(
                        token = %req.ack_token,
                        agent_id = %agent.id,
                        "ack token not found, using stored cursor"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(seq_no)
}

/// One-shot, non-blocking read of undelivered actions in
/// `(seq_no, checkpoint]`, bounded by expiration.
async fn fetch_pending_actions(
    s: &ServerState,
    seq_no: i64,
    agent_id: &str,
) -> Result<Vec<Action>, CheckinError> {
    let now = now_rfc3339();
    s.actions
        .find_actions_by_agent_bounded(agent_id, seq_no, s.checkpoint.checkpoint(), &now)
        .await
        .map_err(Into::into)
}

/// Convert stored action documents into response envelopes, preserving order.
fn convert_actions(agent_id: &str, actions: Vec<Action>) -> Vec<ActionResp> {
    actions
        .into_iter()
        .map(|action| ActionResp {
            agent_id: agent_id.to_owned(),
            created_at: action.timestamp,
            data: action.data,
            id: action.action_id,
            action_type: action.action_type,
            input_type: action.input_type,
        })
        .collect()
}

#[cfg(test)]
#[path = "checkin_tests.rs"]
mod tests;

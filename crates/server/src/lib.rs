// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Muster: agent check-in core for a fleet management server.
//!
//! Multiplexes long-lived HTTP poll requests from managed edge agents into a
//! reactive stream of policy changes and action dispatches sourced from a
//! backing document store. The store, bulk writer, key issuer, checkpoint
//! provider, and token resolver are external collaborators supplied as trait
//! objects via [`state::Backends`].

pub mod bulk;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod limit;
pub mod model;
pub mod policy;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::state::{Backends, ServerState};
use crate::transport::build_router;

/// Run the check-in server until shutdown.
pub async fn run(config: ServerConfig, backends: Backends) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let state = Arc::new(ServerState::new(config, shutdown.clone(), backends));

    // Background coalescing of heartbeat writes.
    Arc::clone(&state.heartbeats).spawn_flush_loop(
        Arc::clone(&state.agents),
        state.config.bulk_flush_interval(),
        shutdown.clone(),
    );

    tracing::info!("muster listening on {addr}");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::Deserialize;

/// Configuration for the check-in server.
///
/// Loading (file/env/flags) is the embedder's concern; this struct only
/// carries the knobs the check-in core consumes, with serde defaults so a
/// partial document deserializes into a working configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind on.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Admission limits for concurrent check-ins.
    pub limits: CheckinLimits,

    /// Max time a check-in blocks awaiting events before responding empty,
    /// in milliseconds.
    pub long_poll_ms: u64,

    /// Interval between liveness heartbeats issued while a check-in is
    /// blocked in the poll phase, in milliseconds.
    pub checkin_timestamp_ms: u64,

    /// Coalescing window of the heartbeat writer, in milliseconds.
    pub bulk_flush_ms: u64,

    /// Gzip compression level for check-in responses. 0 disables compression.
    pub compression_level: u32,

    /// Minimum payload size in bytes before compression is considered.
    pub compression_threshold: usize,
}

/// Admission limits: a token-bucket rate window and a hard ceiling on
/// simultaneous in-flight check-ins. A zero disables the respective gate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckinLimits {
    /// Token refill period in milliseconds.
    pub interval_ms: u64,

    /// Burst size of the rate window.
    pub burst: u32,

    /// Hard maximum of simultaneous in-flight check-ins.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8220,
            limits: CheckinLimits::default(),
            long_poll_ms: 300_000,
            checkin_timestamp_ms: 30_000,
            bulk_flush_ms: 10_000,
            compression_level: 1,
            compression_threshold: 1024,
        }
    }
}

impl Default for CheckinLimits {
    fn default() -> Self {
        Self { interval_ms: 1, burst: 1000, max_connections: 0 }
    }
}

impl ServerConfig {
    pub fn long_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.long_poll_ms)
    }

    pub fn checkin_timestamp_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.checkin_timestamp_ms)
    }

    pub fn bulk_flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.bulk_flush_ms)
    }
}

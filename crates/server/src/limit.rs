// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission control for check-ins: a token-bucket rate window and a hard
//! ceiling on simultaneous in-flight requests, gated independently.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::CheckinLimits;
use crate::error::CheckinError;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Bounds concurrent check-ins. Either gate is disabled by a zero in config.
pub struct CheckinLimiter {
    rate: Option<DirectRateLimiter>,
    ceiling: Option<Arc<Semaphore>>,
}

/// Release handle for one admitted check-in. Dropping it returns the ceiling
/// slot, so release happens on every exit path including task drop.
#[derive(Debug)]
pub struct CheckinPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl CheckinLimiter {
    pub fn new(limits: &CheckinLimits) -> Self {
        let rate = NonZeroU32::new(limits.burst).and_then(|burst| {
            let quota = Quota::with_period(Duration::from_millis(limits.interval_ms))?;
            Some(RateLimiter::direct(quota.allow_burst(burst)))
        });

        let ceiling = if limits.max_connections > 0 {
            Some(Arc::new(Semaphore::new(limits.max_connections)))
        } else {
            None
        };

        Self { rate, ceiling }
    }

    /// Admit one check-in. The rate window is consumed before the ceiling is
    /// tried, and the two failures are distinguished to the caller.
    pub fn acquire(&self) -> Result<CheckinPermit, CheckinError> {
        if let Some(rate) = &self.rate {
            rate.check().map_err(|_| CheckinError::RateExceeded)?;
        }

        let permit = match &self.ceiling {
            Some(sem) => Some(
                Arc::clone(sem)
                    .try_acquire_owned()
                    .map_err(|_| CheckinError::CeilingExceeded)?,
            ),
            None => None,
        };

        Ok(CheckinPermit { _permit: permit })
    }

    /// Remaining ceiling slots, or `None` when the ceiling is disabled.
    pub fn available(&self) -> Option<usize> {
        self.ceiling.as_ref().map(|sem| sem.available_permits())
    }
}

#[cfg(test)]
#[path = "limit_tests.rs"]
mod tests;

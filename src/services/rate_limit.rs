//! Sliding-window rate limiting per user
//!
//! An owned, injected service holding its own per-user windows; admission
//! runs before the QA pipeline and denied requests never reach it. For one
//! user, prune-count-append is a single critical section under that user's
//! mutex, so concurrent requests from the same user cannot admit more than
//! the configured limit. Windows for different users are independent: the
//! outer map lock is held only long enough to fetch the user's entry.

use crate::config::RateLimitConfig;
use crate::error::{LecternError, Result};
use crate::types::{RateLimitDecision, UserId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-user sliding-window admission control
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<UserId, Arc<Mutex<VecDeque<Instant>>>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn unlimited_decision(&self) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining_requests: self.config.max_requests,
            reset_seconds: 0,
            limit: self.config.max_requests,
        }
    }

    fn window_for(&self, user_id: UserId) -> Arc<Mutex<VecDeque<Instant>>> {
        let mut windows = self.windows.lock().expect("rate limit map poisoned");
        windows.entry(user_id).or_default().clone()
    }

    /// Seconds until the oldest recorded request leaves the window
    fn reset_seconds(&self, timestamps: &VecDeque<Instant>, now: Instant) -> u64 {
        match timestamps.front() {
            Some(oldest) => {
                let elapsed = now.duration_since(*oldest);
                self.config.window.saturating_sub(elapsed).as_secs()
            }
            None => 0,
        }
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.config.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit or reject a request from this user, recording it if admitted
    pub fn check_and_record(&self, user_id: UserId) -> RateLimitDecision {
        self.check_and_record_at(user_id, Instant::now())
    }

    fn check_and_record_at(&self, user_id: UserId, now: Instant) -> RateLimitDecision {
        if !self.config.enabled {
            debug!("rate limiting is disabled");
            return self.unlimited_decision();
        }

        let window = self.window_for(user_id);
        let mut timestamps = window.lock().expect("rate limit window poisoned");

        self.prune(&mut timestamps, now);

        let count = timestamps.len() as u32;
        let limit = self.config.max_requests;
        let reset_seconds = self.reset_seconds(&timestamps, now);

        if count >= limit {
            warn!("rate limit exceeded for user {user_id}: {count} requests in window");
            return RateLimitDecision {
                allowed: false,
                remaining_requests: 0,
                reset_seconds,
                limit,
            };
        }

        timestamps.push_back(now);
        debug!(
            "rate limit check for user {user_id}: {}/{limit} requests used",
            count + 1
        );

        RateLimitDecision {
            allowed: true,
            remaining_requests: limit - count - 1,
            reset_seconds,
            limit,
        }
    }

    /// Current admission state for this user without recording a request
    pub fn status(&self, user_id: UserId) -> RateLimitDecision {
        self.status_at(user_id, Instant::now())
    }

    fn status_at(&self, user_id: UserId, now: Instant) -> RateLimitDecision {
        if !self.config.enabled {
            return self.unlimited_decision();
        }

        let window = self.window_for(user_id);
        let mut timestamps = window.lock().expect("rate limit window poisoned");
        self.prune(&mut timestamps, now);

        let count = timestamps.len() as u32;
        let limit = self.config.max_requests;

        RateLimitDecision {
            allowed: count < limit,
            remaining_requests: limit.saturating_sub(count),
            reset_seconds: self.reset_seconds(&timestamps, now),
            limit,
        }
    }

    /// Admit or reject, converting denial into a `RateLimited` error
    pub fn admit(&self, user_id: UserId) -> Result<RateLimitDecision> {
        let decision = self.check_and_record(user_id);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(LecternError::RateLimited {
                retry_after_secs: decision.reset_seconds,
            })
        }
    }

    /// Forget this user's window
    pub fn reset(&self, user_id: UserId) {
        let mut windows = self.windows.lock().expect("rate limit map poisoned");
        windows.remove(&user_id);
        info!("reset rate limit for user {user_id}");
    }

    /// Forget every window
    pub fn clear_all(&self) {
        let mut windows = self.windows.lock().expect("rate limit map poisoned");
        windows.clear();
        info!("cleared all rate limit data");
    }
}

//! Per-client weighted rate limiter
//!
//! Each client identity accumulates request weight inside a fixed window.
//! Crossing the threshold blocks the client for a penalty period, and every
//! further offence while blocked pushes the end of the block out again, so
//! clients that retry in a tight loop stay blocked for longer.
//!
//! All client state lives in one map behind a single mutex. Admission
//! decisions read and write the state under the same lock acquisition, so a
//! stale read can never admit a client that a concurrent request just blocked.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::LimitsConfig;

/// Class of request, which determines how much budget it consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Upload of a new original
    Write,
    /// View or resize that reaches storage or the pipeline
    Read,
}

/// Rate limiting settings
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub window: Duration,
    pub threshold: u32,
    pub penalty: Duration,
    pub read_weight: u32,
    pub write_weight: u32,
}

impl RateLimitPolicy {
    pub fn weight(&self, class: RequestClass) -> u32 {
        match class {
            RequestClass::Write => self.write_weight,
            RequestClass::Read => self.read_weight,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for RateLimitPolicy {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            enabled: config.rate_limiting,
            window: config.window,
            threshold: config.threshold,
            penalty: config.penalty,
            read_weight: config.read_weight,
            write_weight: config.write_weight,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny { blocked_remaining: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// Budget tracking for one client identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub window_start: Instant,
    pub weighted_count: u32,
    pub blocked_until: Option<Instant>,
}

impl ClientState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            weighted_count: 0,
            blocked_until: None,
        }
    }

    fn blocked_remaining(&self, now: Instant) -> Option<Duration> {
        self.blocked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.weighted_count = 0;
        self.blocked_until = None;
    }
}

/// Weighted sliding-window limiter keyed by client identity
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    clients: Mutex<HashMap<String, ClientState>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Charge `class` against the client's budget and decide admission
    pub fn admit(&self, client: &str, class: RequestClass) -> Admission {
        self.admit_weight_at(client, self.policy.weight(class), Instant::now())
    }

    /// Charge an explicit weight at a given instant.
    ///
    /// Never blocks beyond the map lock.
    pub fn admit_weight_at(&self, client: &str, weight: u32, now: Instant) -> Admission {
        if !self.policy.enabled {
            return Admission::Allow;
        }

        let mut clients = self.lock();
        let state = clients
            .entry(client.to_string())
            .or_insert_with(|| ClientState::new(now));

        let window_elapsed = now.saturating_duration_since(state.window_start) > self.policy.window;
        match state.blocked_until {
            None if window_elapsed => state.reset(now),
            Some(until) if until <= now => {
                debug!(client = %client, "Rate limit block expired");
                state.reset(now);
            }
            _ => {}
        }

        state.weighted_count = state.weighted_count.saturating_add(weight);

        if state.weighted_count > self.policy.threshold {
            let base = state.blocked_until.unwrap_or(now);
            let until = base + self.policy.penalty;
            if state.blocked_until.is_none() {
                info!(
                    client = %client,
                    weighted_count = state.weighted_count,
                    "Client exceeded request budget, blocking"
                );
            } else {
                debug!(
                    client = %client,
                    weighted_count = state.weighted_count,
                    "Blocked client retried, extending block"
                );
            }
            state.blocked_until = Some(until);
        }

        match state.blocked_remaining(now) {
            Some(blocked_remaining) => Admission::Deny { blocked_remaining },
            None => Admission::Allow,
        }
    }

    /// Read-only probe, used before admission so blocked clients are denied
    /// even when their request would be served from cache.
    pub fn is_blocked(&self, client: &str) -> bool {
        self.blocked_remaining(client).is_some()
    }

    /// Remaining block time for a client without charging it anything
    pub fn blocked_remaining(&self, client: &str) -> Option<Duration> {
        self.blocked_remaining_at(client, Instant::now())
    }

    pub fn blocked_remaining_at(&self, client: &str, now: Instant) -> Option<Duration> {
        if !self.policy.enabled {
            return None;
        }
        self.lock()
            .get(client)
            .and_then(|state| state.blocked_remaining(now))
    }

    /// Snapshot of a client's state
    pub fn client_state(&self, client: &str) -> Option<ClientState> {
        self.lock().get(client).cloned()
    }

    /// Number of client identities seen so far
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientState>> {
        // The map holds plain counters, so a panic elsewhere cannot leave it torn.
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Sliding-window rate limiting per identity and action class.
//!
//! State is in-memory only and is lost on restart; the store enforces the
//! same limits on its side.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Class of mutating action with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionClass {
    QueueItem,
    PartyCreate,
    ImageUpload,
}

impl ActionClass {
    /// Stable key used when attempts are persisted.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueItem => "queueItem",
            Self::PartyCreate => "partyCreate",
            Self::ImageUpload => "imageUpload",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QueueItem => "queue item",
            Self::PartyCreate => "party creation",
            Self::ImageUpload => "image upload",
        })
    }
}

/// `max_attempts` actions per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_attempts: u32, window_secs: u64) -> Self {
        Self {
            max_attempts,
            window_secs,
        }
    }

    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Attempts at or before this instant have left the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - to_chrono(self.window())
    }

    /// Decide on a new attempt given earlier ones, oldest first.
    ///
    /// Attempts outside the window are ignored.
    pub fn decide(&self, attempts: &[DateTime<Utc>], now: DateTime<Utc>) -> RateLimitDecision {
        let cutoff = self.cutoff(now);
        let live: Vec<DateTime<Utc>> = attempts
            .iter()
            .copied()
            .filter(|at| *at > cutoff)
            .collect();
        if live.len() < self.max_attempts as usize {
            return RateLimitDecision::ALLOWED;
        }

        let oldest = live.first().copied().unwrap_or(now);
        let retry_after = (to_chrono(self.window()) - (now - oldest))
            .to_std()
            .unwrap_or(Duration::ZERO);
        RateLimitDecision {
            allowed: false,
            retry_after,
        }
    }
}

/// Per-class policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub queue_item: RateLimitPolicy,
    pub party_create: RateLimitPolicy,
    pub image_upload: RateLimitPolicy,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            queue_item: RateLimitPolicy::new(10, 60),
            party_create: RateLimitPolicy::new(3, 60 * 60),
            image_upload: RateLimitPolicy::new(5, 60),
        }
    }
}

impl RateLimits {
    pub const fn policy(&self, action: ActionClass) -> RateLimitPolicy {
        match action {
            ActionClass::QueueItem => self.queue_item,
            ActionClass::PartyCreate => self.party_create,
            ActionClass::ImageUpload => self.image_upload,
        }
    }
}

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Zero when allowed
    pub retry_after: Duration,
}

impl RateLimitDecision {
    const ALLOWED: Self = Self {
        allowed: true,
        retry_after: Duration::ZERO,
    };
}

/// Sliding-window counter keyed by `(action class, identity)`.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    limits: RateLimits,
    windows: HashMap<(ActionClass, String), VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: HashMap::new(),
        }
    }

    pub const fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Check without committing an attempt.
    pub fn check(&mut self, action: ActionClass, identity: &str) -> RateLimitDecision {
        self.check_at(action, identity, Utc::now())
    }

    /// Record one attempt now.
    pub fn record(&mut self, action: ActionClass, identity: &str) {
        self.record_at(action, identity, Utc::now());
    }

    pub fn check_at(
        &mut self,
        action: ActionClass,
        identity: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let policy = self.limits.policy(action);
        let Some(attempts) = self.windows.get_mut(&(action, identity.to_string())) else {
            return RateLimitDecision::ALLOWED;
        };

        let cutoff = policy.cutoff(now);
        while attempts.front().is_some_and(|oldest| *oldest <= cutoff) {
            attempts.pop_front();
        }
        policy.decide(attempts.make_contiguous(), now)
    }

    pub fn record_at(&mut self, action: ActionClass, identity: &str, now: DateTime<Utc>) {
        let max_attempts = self.limits.policy(action).max_attempts as usize;
        let attempts = self
            .windows
            .entry((action, identity.to_string()))
            .or_default();
        attempts.push_back(now);
        // Older entries beyond the budget can never affect a decision.
        while attempts.len() > max_attempts.max(1) {
            attempts.pop_front();
        }
    }

    /// Forget all recorded attempts.
    pub fn reset(&mut self) {
        self.windows.clear();
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}

//! Velocity Tracking
//!
//! Per-actor action counters with fixed windows, plus the per-user daily
//! reward-amount cap. Counters are count-then-compare: concurrent actions
//! from the same actor may disagree by at most one window, which is
//! acceptable for rate decisions. The daily amount cap is the exception -
//! its check+increment is serialized per key through the map entry lock so
//! rapid concurrent submissions cannot slip past it.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Action kinds the gate distinguishes. Each carries its own
/// threshold/window pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Contribution,
    Rewards,
    Withdrawal,
    Login,
}

impl ActionKind {
    /// (max actions, window) for this kind.
    pub fn threshold(&self) -> (u32, Duration) {
        match self {
            ActionKind::Contribution => (10, Duration::from_secs(3600)),
            ActionKind::Rewards => (20, Duration::from_secs(3600)),
            ActionKind::Withdrawal => (5, Duration::from_secs(3600)),
            ActionKind::Login => (5, Duration::from_secs(900)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Contribution => "contribution",
            ActionKind::Rewards => "rewards",
            ActionKind::Withdrawal => "withdrawal",
            ActionKind::Login => "login",
        }
    }
}

/// Outcome of recording one action against the velocity table.
#[derive(Debug, Clone, Copy)]
pub struct VelocityCheck {
    /// Count within the current window, including this action.
    pub count: u32,
    pub limit: u32,
    /// Seconds until the current window resets.
    pub reset_after_secs: u64,
}

impl VelocityCheck {
    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }
}

/// Tracks `(actor, kind)` counters and `(user, day)` reward amounts.
pub struct VelocityTracker {
    /// (actor:kind) -> (count, window start)
    counters: DashMap<String, (u32, Instant)>,
    /// (user:day) -> (amount paid, window start)
    daily_amounts: DashMap<String, (u64, Instant)>,
}

const DAY: Duration = Duration::from_secs(86_400);

impl VelocityTracker {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            daily_amounts: DashMap::new(),
        }
    }

    /// Record one action and return the counter state for the window.
    pub fn record(&self, actor_id: &str, kind: ActionKind) -> VelocityCheck {
        let (limit, window) = kind.threshold();
        let key = format!("{}:{}", actor_id, kind.as_str());
        let now = Instant::now();

        let mut entry = self.counters.entry(key).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= window {
            *count = 0;
            *window_start = now;
        }
        *count += 1;

        let reset_after_secs = window
            .checked_sub(now.duration_since(*window_start))
            .map(|d| d.as_secs())
            .unwrap_or(0);

        VelocityCheck {
            count: *count,
            limit,
            reset_after_secs,
        }
    }

    /// Add `amount` to the user's daily total if the cap allows it.
    ///
    /// Check and increment happen under the entry lock, so concurrent
    /// submissions for the same user serialize here. Returns the new daily
    /// total, or Err(current total) when the cap would be exceeded.
    pub fn try_add_daily_amount(
        &self,
        user_id: &str,
        amount: u64,
        daily_cap: u64,
    ) -> Result<u64, u64> {
        let key = format!("{}:rewards:day", user_id);
        let now = Instant::now();

        let mut entry = self.daily_amounts.entry(key).or_insert((0, now));
        let (total, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= DAY {
            *total = 0;
            *window_start = now;
        }

        match total.checked_add(amount) {
            Some(new_total) if new_total <= daily_cap => {
                *total = new_total;
                Ok(new_total)
            }
            _ => Err(*total),
        }
    }

    /// Release a previously reserved daily amount, used when a payout is
    /// rejected after the cap reservation.
    pub fn release_daily_amount(&self, user_id: &str, amount: u64) {
        let key = format!("{}:rewards:day", user_id);
        if let Some(mut entry) = self.daily_amounts.get_mut(&key) {
            entry.value_mut().0 = entry.value().0.saturating_sub(amount);
        }
    }

    /// Drop expired windows. Call periodically.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.counters
            .retain(|_, (_, start)| now.duration_since(*start) < Duration::from_secs(7_200));
        self.daily_amounts
            .retain(|_, (_, start)| now.duration_since(*start) < DAY * 2);
    }
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new()
    }
}

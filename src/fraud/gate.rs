//! Rate/Fraud Gate
//!
//! Policy evaluator that runs before any irreversible ledger side effect.
//! Combines velocity counters with caller-supplied device/IP/behavior/
//! geography signals into a risk score in [0, 1], and enforces the hard
//! per-user daily reward-amount cap. High-risk assessments are logged as
//! security events whether or not the action is ultimately allowed.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fraud::velocity::{ActionKind, VelocityTracker};

/// Risk contributed by a velocity breach.
const VELOCITY_RISK: f64 = 0.8;

/// Signal weights: IP 0.3, device 0.2, behavior 0.3, geography 0.2.
const IP_WEIGHT: f64 = 0.3;
const DEVICE_WEIGHT: f64 = 0.2;
const BEHAVIOR_WEIGHT: f64 = 0.3;
const GEOGRAPHY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct FraudConfig {
    /// Risk at or above which payouts are denied (and alerts raised).
    pub alert_threshold: f64,
    /// Hard per-user daily reward-amount cap in T4G units.
    pub daily_amount_cap: u64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 0.7,
            daily_amount_cap: 1000,
        }
    }
}

/// Anomaly categories the gate can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Velocity,
    Device,
    Behavior,
    Timing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Ephemeral gate output; logged, never persisted as an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyPattern {
    pub anomaly: AnomalyType,
    pub severity: Severity,
    pub confidence: f64,
}

/// Caller-supplied per-request risk signals, each in [0, 1]. The session
/// layer computes these; the gate only weighs them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionSignals {
    #[serde(default)]
    pub ip_risk: f64,
    #[serde(default)]
    pub device_risk: f64,
    #[serde(default)]
    pub behavior_risk: f64,
    #[serde(default)]
    pub geography_risk: f64,
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub allowed: bool,
    pub risk_score: f64,
    pub patterns: Vec<AnomalyPattern>,
    /// Present when a velocity or daily-cap denial suggests when to retry.
    pub retry_after_secs: Option<u64>,
    /// True when the daily amount cap (not the risk score) caused denial.
    pub daily_cap_exceeded: bool,
}

/// Stateless-per-call policy evaluator over shared velocity counters.
pub struct FraudGate {
    velocity: VelocityTracker,
    config: FraudConfig,
}

impl FraudGate {
    pub fn new(config: FraudConfig) -> Self {
        Self {
            velocity: VelocityTracker::new(),
            config,
        }
    }

    /// Assess one action. `amount` engages the daily reward-amount cap and
    /// is reserved against it on success; callers that subsequently fail to
    /// submit must release it via [`release_amount`](Self::release_amount).
    pub fn assess(
        &self,
        actor_id: &str,
        kind: ActionKind,
        signals: &ActionSignals,
        amount: Option<u64>,
    ) -> RiskAssessment {
        let mut risk_score = 0.0;
        let mut patterns = Vec::new();
        let mut retry_after_secs = None;

        let check = self.velocity.record(actor_id, kind);
        if check.exceeded() {
            patterns.push(AnomalyPattern {
                anomaly: AnomalyType::Velocity,
                severity: Severity::High,
                confidence: 0.9,
            });
            risk_score += VELOCITY_RISK;
            retry_after_secs = Some(check.reset_after_secs);
        }

        risk_score += IP_WEIGHT * signals.ip_risk.clamp(0.0, 1.0)
            + DEVICE_WEIGHT * signals.device_risk.clamp(0.0, 1.0)
            + BEHAVIOR_WEIGHT * signals.behavior_risk.clamp(0.0, 1.0)
            + GEOGRAPHY_WEIGHT * signals.geography_risk.clamp(0.0, 1.0);
        risk_score = risk_score.min(1.0);

        if signals.ip_risk.max(signals.device_risk) > 0.5 {
            patterns.push(signal_pattern(
                AnomalyType::Device,
                signals.ip_risk.max(signals.device_risk),
            ));
        }
        if signals.behavior_risk > 0.5 {
            patterns.push(signal_pattern(AnomalyType::Behavior, signals.behavior_risk));
        }
        if signals.geography_risk > 0.5 {
            patterns.push(signal_pattern(AnomalyType::Timing, signals.geography_risk));
        }

        let mut daily_cap_exceeded = false;
        if let Some(amount) = amount {
            if let Err(spent) =
                self.velocity
                    .try_add_daily_amount(actor_id, amount, self.config.daily_amount_cap)
            {
                daily_cap_exceeded = true;
                retry_after_secs.get_or_insert(86_400);
                warn!(
                    actor_id = %actor_id,
                    amount,
                    spent_today = spent,
                    daily_cap = self.config.daily_amount_cap,
                    "Daily reward amount cap exceeded"
                );
            }
        }

        let allowed = risk_score < self.config.alert_threshold && !daily_cap_exceeded;

        if risk_score > self.config.alert_threshold {
            warn!(
                actor_id = %actor_id,
                kind = kind.as_str(),
                risk_score,
                patterns = patterns.len(),
                allowed,
                "Security alert: high-risk action"
            );
        } else {
            debug!(
                actor_id = %actor_id,
                kind = kind.as_str(),
                risk_score,
                allowed,
                "Gate assessment"
            );
        }

        RiskAssessment {
            allowed,
            risk_score,
            patterns,
            retry_after_secs,
            daily_cap_exceeded,
        }
    }

    /// Release an amount reserved by an allowed assessment whose payout was
    /// never submitted.
    pub fn release_amount(&self, actor_id: &str, amount: u64) {
        self.velocity.release_daily_amount(actor_id, amount);
    }

    pub fn cleanup(&self) {
        self.velocity.cleanup();
    }
}

fn signal_pattern(anomaly: AnomalyType, confidence: f64) -> AnomalyPattern {
    let severity = if confidence > 0.8 {
        Severity::High
    } else {
        Severity::Medium
    };
    AnomalyPattern {
        anomaly,
        severity,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_action_allowed() {
        let gate = FraudGate::new(FraudConfig::default());
        let assessment = gate.assess("alice", ActionKind::Contribution, &ActionSignals::default(), None);
        assert!(assessment.allowed);
        assert!(assessment.risk_score < 0.1);
        assert!(assessment.patterns.is_empty());
    }

    #[test]
    fn test_eleventh_contribution_denied_with_velocity_pattern() {
        let gate = FraudGate::new(FraudConfig::default());
        for _ in 0..10 {
            assert!(gate
                .assess("alice", ActionKind::Contribution, &ActionSignals::default(), None)
                .allowed);
        }
        let eleventh =
            gate.assess("alice", ActionKind::Contribution, &ActionSignals::default(), None);
        assert!(!eleventh.allowed);
        assert!(eleventh
            .patterns
            .iter()
            .any(|p| p.anomaly == AnomalyType::Velocity && p.severity == Severity::High));
        assert!(eleventh.retry_after_secs.is_some());
    }

    #[test]
    fn test_signal_weights() {
        let gate = FraudGate::new(FraudConfig::default());
        let signals = ActionSignals {
            ip_risk: 1.0,
            device_risk: 1.0,
            behavior_risk: 0.0,
            geography_risk: 0.0,
        };
        let assessment = gate.assess("alice", ActionKind::Rewards, &signals, None);
        // 0.3 + 0.2 = 0.5, below the 0.7 threshold
        assert!((assessment.risk_score - 0.5).abs() < 1e-9);
        assert!(assessment.allowed);

        let all = ActionSignals {
            ip_risk: 1.0,
            device_risk: 1.0,
            behavior_risk: 1.0,
            geography_risk: 1.0,
        };
        let assessment = gate.assess("bob", ActionKind::Rewards, &all, None);
        assert!((assessment.risk_score - 1.0).abs() < 1e-9);
        assert!(!assessment.allowed);
    }

    #[test]
    fn test_daily_cap_hard_deny_despite_low_risk() {
        let gate = FraudGate::new(FraudConfig {
            alert_threshold: 0.7,
            daily_amount_cap: 500,
        });
        let ok = gate.assess("alice", ActionKind::Rewards, &ActionSignals::default(), Some(400));
        assert!(ok.allowed);

        let over = gate.assess("alice", ActionKind::Rewards, &ActionSignals::default(), Some(200));
        assert!(!over.allowed);
        assert!(over.daily_cap_exceeded);
        assert!(over.risk_score < 0.7);
    }

    #[test]
    fn test_release_amount_frees_cap() {
        let gate = FraudGate::new(FraudConfig {
            alert_threshold: 0.7,
            daily_amount_cap: 500,
        });
        assert!(gate
            .assess("alice", ActionKind::Rewards, &ActionSignals::default(), Some(500))
            .allowed);
        gate.release_amount("alice", 500);
        assert!(gate
            .assess("alice", ActionKind::Rewards, &ActionSignals::default(), Some(500))
            .allowed);
    }
}

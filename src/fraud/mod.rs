//! Anti-fraud gating: velocity counters and multi-signal risk assessment.

pub mod gate;
pub mod velocity;

pub use gate::{
    ActionSignals, AnomalyPattern, AnomalyType, FraudConfig, FraudGate, RiskAssessment, Severity,
};
pub use velocity::{ActionKind, VelocityCheck, VelocityTracker};

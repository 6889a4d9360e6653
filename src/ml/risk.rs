use crate::models::RiskLevel;

/// Lower bound of the High tier (inclusive)
pub const HIGH_RISK_THRESHOLD: f64 = 0.70;

/// Lower bound of the Medium tier (inclusive)
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.40;

/// Map a dropout probability to a risk tier.
///
/// Total over f64: anything that is not `>= 0.40` (including NaN) is Low.
pub fn classify_risk(dropout_probability: f64) -> RiskLevel {
    if dropout_probability >= HIGH_RISK_THRESHOLD {
        RiskLevel::High
    } else if dropout_probability >= MEDIUM_RISK_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

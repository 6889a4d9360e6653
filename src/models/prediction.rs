use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Discretized dropout risk
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];
}

/// Urgency of a recommended intervention
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Predicted class of the binary classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum Outcome {
    Graduate,
    Dropout,
}

/// Area an intervention targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum RecommendationCategory {
    Attendance,
    Academic,
    Behavioral,
    #[serde(rename = "Support Services")]
    #[strum(serialize = "Support Services")]
    Socioeconomic,
    Engagement,
    #[serde(rename = "Study Skills")]
    #[strum(serialize = "Study Skills")]
    StudyHabits,
    Monitoring,
}

/// A single intervention recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub priority: Priority,
    /// What staff should do
    pub action: String,
    /// Why the rule fired
    pub rationale: String,
}

impl Recommendation {
    pub fn new(
        category: RecommendationCategory,
        priority: Priority,
        action: impl Into<String>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            category,
            priority,
            action: action.into(),
            rationale: rationale.into(),
        }
    }
}

/// Non-fatal signal raised while encoding a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformWarning {
    /// Category label absent from the fitted table; the fallback code was used
    UnseenCategory {
        column: String,
        value: String,
        fallback_code: usize,
    },
    /// Column had zero variance at fit time; only the mean was removed
    DegenerateScale { column: String },
}

/// Full outcome of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: Outcome,
    pub dropout_probability: f64,
    pub graduate_probability: f64,
    pub risk_level: RiskLevel,
    /// In rule-evaluation order, not sorted by priority
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<TransformWarning>,
}

impl PredictionResult {
    /// First `n` recommendation actions in evaluation order
    pub fn top_actions(&self, n: usize) -> Vec<String> {
        self.recommendations
            .iter()
            .take(n)
            .map(|r| r.action.clone())
            .collect()
    }
}

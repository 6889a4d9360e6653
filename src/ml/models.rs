use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Tolerance for the graduate + dropout = 1 invariant
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Classifier family that produced a model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelType {
    LogisticRegression,
    SupportVector,
    RandomForest,
    GradientBoosting,
}

/// Offline evaluation scores recorded by the training job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roc_auc: Option<f64>,
}

/// Descriptive metadata carried inside a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Human-readable name, e.g. "XGBoost"
    pub name: String,
    pub version: String,
    pub model_type: ModelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub n_training_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_metrics: Option<ModelMetrics>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            version: "1.0".to_string(),
            model_type,
            trained_at: None,
            n_training_samples: 0,
            test_metrics: None,
        }
    }
}

/// Well-formed two-class probability distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassProbabilities {
    graduate: f64,
    dropout: f64,
}

impl ClassProbabilities {
    /// Build from the dropout probability alone
    pub fn from_dropout(dropout: f64) -> Result<Self> {
        if !dropout.is_finite() {
            return Err(AppError::Internal(format!(
                "model produced non-finite probability {}",
                dropout
            )));
        }
        let dropout = dropout.clamp(0.0, 1.0);
        Ok(Self {
            graduate: 1.0 - dropout,
            dropout,
        })
    }

    pub fn graduate(&self) -> f64 {
        self.graduate
    }

    pub fn dropout(&self) -> f64 {
        self.dropout
    }
}

/// Inference and recommendation engine
///
/// - Feature transform fitted at training time and replayed at inference
/// - Classifier artifacts exposing a `predict_proba` contract
/// - Risk tiers over the dropout probability
/// - Rule-based intervention recommendations
/// - Prediction service composing the above, single and batch

pub mod classifier;
pub mod features;
pub mod models;
pub mod recommendations;
pub mod risk;
pub mod service;

pub use classifier::{Classifier, DecisionTree, Estimator, ModelArtifact, TreeNode};
pub use features::{CategoryEncoder, ColumnScale, EncodedFeatures, FittedTransform};
pub use models::{ClassProbabilities, ModelMetadata, ModelMetrics, ModelType};
pub use recommendations::{recommend, sorted_by_priority};
pub use risk::{classify_risk, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD};
pub use service::{ModelInfo, PredictionService, RecordError};

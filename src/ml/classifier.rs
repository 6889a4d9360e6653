use crate::error::{AppError, Result};
use crate::ml::models::{ClassProbabilities, ModelMetadata, ModelType};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const ARTIFACT: &str = "model";

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Predict class probabilities for one encoded feature vector
    fn predict_proba(&self, features: &Array1<f64>) -> Result<ClassProbabilities>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Feature order the model was trained on
    fn feature_names(&self) -> &[String];

    fn n_features(&self) -> usize {
        self.feature_names().len()
    }

    /// Check the fitted parameters are usable before serving
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// One node of a fitted binary decision tree.
///
/// Children are stored by index and must point forward, which keeps every
/// traversal acyclic and bounded by the node count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Flattened decision tree, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk from the root to a leaf; `x[feature] <= threshold` goes left.
    ///
    /// Out-of-range node or feature indices and walks longer than the node count
    /// are reported as internal errors.
    pub fn evaluate(&self, features: ArrayView1<f64>) -> Result<f64> {
        let mut index = 0;
        for _ in 0..self.nodes.len() {
            let node = self.nodes.get(index).ok_or_else(|| {
                AppError::Internal(format!("tree node {} out of range", index))
            })?;
            match node {
                TreeNode::Leaf { value } => return Ok(*value),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = features.get(*feature).ok_or_else(|| {
                        AppError::Internal(format!(
                            "tree splits on feature {} of {}",
                            feature,
                            features.len()
                        ))
                    })?;
                    index = if *x <= *threshold { *left } else { *right };
                }
            }
        }
        Err(AppError::Internal("tree walk did not reach a leaf".to_string()))
    }

    fn validate(&self, n_features: usize, leaf_range: Option<(f64, f64)>) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(AppError::artifact_load(ARTIFACT, "empty decision tree"));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(AppError::artifact_load(
                            ARTIFACT,
                            format!("node {} splits on feature {} of {}", i, feature, n_features),
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(AppError::artifact_load(
                            ARTIFACT,
                            format!("node {} has a non-finite threshold", i),
                        ));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(AppError::artifact_load(
                                ARTIFACT,
                                format!("node {} has invalid child index {}", i, child),
                            ));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    let in_range = match leaf_range {
                        Some((lo, hi)) => *value >= lo && *value <= hi,
                        None => true,
                    };
                    if !value.is_finite() || !in_range {
                        return Err(AppError::artifact_load(
                            ARTIFACT,
                            format!("node {} has invalid leaf value {}", i, value),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Fitted parameters of one supported classifier family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Estimator {
    /// p = sigmoid(w·x + b)
    LogisticRegression { coefficients: Vec<f64>, intercept: f64 },
    /// Linear SVM decision function calibrated with Platt scaling:
    /// p = 1 / (1 + exp(A·f + B)), f = w·x + b
    SupportVector {
        coefficients: Vec<f64>,
        intercept: f64,
        platt_a: f64,
        platt_b: f64,
    },
    /// Mean of per-tree leaf dropout probabilities
    RandomForest { trees: Vec<DecisionTree> },
    /// p = sigmoid(base_score + learning_rate · Σ leaf)
    GradientBoosting {
        base_score: f64,
        learning_rate: f64,
        trees: Vec<DecisionTree>,
    },
}

impl Estimator {
    pub fn model_type(&self) -> ModelType {
        match self {
            Estimator::LogisticRegression { .. } => ModelType::LogisticRegression,
            Estimator::SupportVector { .. } => ModelType::SupportVector,
            Estimator::RandomForest { .. } => ModelType::RandomForest,
            Estimator::GradientBoosting { .. } => ModelType::GradientBoosting,
        }
    }

    fn dropout_probability(&self, features: ArrayView1<f64>) -> Result<f64> {
        let linear = |coefficients: &[f64], intercept: f64| -> Result<f64> {
            if coefficients.len() != features.len() {
                return Err(AppError::Internal(format!(
                    "{} coefficients for {} features",
                    coefficients.len(),
                    features.len()
                )));
            }
            Ok(ArrayView1::from(coefficients).dot(&features) + intercept)
        };

        match self {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => Ok(sigmoid(linear(coefficients, *intercept)?)),
            Estimator::SupportVector {
                coefficients,
                intercept,
                platt_a,
                platt_b,
            } => {
                let decision = linear(coefficients, *intercept)?;
                Ok(sigmoid(-(platt_a * decision + platt_b)))
            }
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(AppError::Internal("forest has no trees".to_string()));
                }
                let mut total = 0.0;
                for tree in trees {
                    total += tree.evaluate(features)?;
                }
                Ok(total / trees.len() as f64)
            }
            Estimator::GradientBoosting {
                base_score,
                learning_rate,
                trees,
            } => {
                let mut margin = 0.0;
                for tree in trees {
                    margin += tree.evaluate(features)?;
                }
                Ok(sigmoid(base_score + learning_rate * margin))
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        let check_linear = |coefficients: &[f64], scalars: &[f64]| -> Result<()> {
            if coefficients.len() != n_features {
                return Err(AppError::artifact_load(
                    ARTIFACT,
                    format!(
                        "{} coefficients for {} features",
                        coefficients.len(),
                        n_features
                    ),
                ));
            }
            if coefficients.iter().chain(scalars).any(|v| !v.is_finite()) {
                return Err(AppError::artifact_load(
                    ARTIFACT,
                    "non-finite model parameter",
                ));
            }
            Ok(())
        };

        match self {
            Estimator::LogisticRegression {
                coefficients,
                intercept,
            } => check_linear(coefficients, &[*intercept]),
            Estimator::SupportVector {
                coefficients,
                intercept,
                platt_a,
                platt_b,
            } => check_linear(coefficients, &[*intercept, *platt_a, *platt_b]),
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(AppError::artifact_load(ARTIFACT, "forest has no trees"));
                }
                trees
                    .iter()
                    .try_for_each(|t| t.validate(n_features, Some((0.0, 1.0))))
            }
            Estimator::GradientBoosting {
                base_score,
                learning_rate,
                trees,
            } => {
                if !base_score.is_finite() || !learning_rate.is_finite() {
                    return Err(AppError::artifact_load(
                        ARTIFACT,
                        "non-finite model parameter",
                    ));
                }
                trees.iter().try_for_each(|t| t.validate(n_features, None))
            }
        }
    }
}

/// Persisted classifier: metadata, expected feature order, fitted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
}

impl ModelArtifact {
    /// Assemble and validate an artifact
    pub fn new(
        metadata: ModelMetadata,
        feature_names: Vec<String>,
        estimator: Estimator,
    ) -> Result<Self> {
        let artifact = Self {
            metadata,
            feature_names,
            estimator,
        };
        Classifier::validate(&artifact)?;
        Ok(artifact)
    }

    /// Load a persisted model.
    ///
    /// A path that does not resolve is `ModelNotFound`; anything that resolves but
    /// cannot be parsed or validated is an artifact load failure.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AppError::ModelNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::artifact_load(ARTIFACT, format!("{}: {}", path.display(), e))
        })?;
        let artifact: Self = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::artifact_load(ARTIFACT, format!("{}: {}", path.display(), e))
        })?;
        Classifier::validate(&artifact)?;

        info!(
            path = %path.display(),
            name = %artifact.metadata.name,
            model_type = %artifact.metadata.model_type,
            n_features = artifact.feature_names.len(),
            "Model loaded"
        );

        Ok(artifact)
    }

    /// Persist as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

impl Classifier for ModelArtifact {
    fn predict_proba(&self, features: &Array1<f64>) -> Result<ClassProbabilities> {
        if features.len() != self.feature_names.len() {
            return Err(AppError::SchemaMismatch(format!(
                "model expects {} features, got {}",
                self.feature_names.len(),
                features.len()
            )));
        }
        ClassProbabilities::from_dropout(self.estimator.dropout_probability(features.view())?)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(AppError::artifact_load(ARTIFACT, "no feature names"));
        }
        if self.estimator.model_type() != self.metadata.model_type {
            return Err(AppError::artifact_load(
                ARTIFACT,
                format!(
                    "metadata declares {} but estimator is {}",
                    self.metadata.model_type,
                    self.estimator.model_type()
                ),
            ));
        }
        self.estimator.validate(self.feature_names.len())
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

use crate::config::ArtifactConfig;
use crate::error::{AppError, Result};
use crate::metrics::{PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS, PREDICTION_ERRORS_TOTAL};
use crate::ml::classifier::{Classifier, ModelArtifact};
use crate::ml::features::FittedTransform;
use crate::ml::models::{ModelMetadata, ModelMetrics, ModelType};
use crate::ml::recommendations::recommend;
use crate::ml::risk::classify_risk;
use crate::models::{Outcome, PredictionResult, StudentId, StudentRecord};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default cadence of batch progress logging
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

/// Failure captured for one slot of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// Position of the record in the input
    pub index: usize,
    pub student_id: StudentId,
    pub code: String,
    pub message: String,
}

impl RecordError {
    pub fn new(index: usize, student_id: StudentId, error: &AppError) -> Self {
        Self {
            index,
            student_id,
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Public description of the loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub model_type: ModelType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    pub n_training_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_metrics: Option<ModelMetrics>,
    pub feature_names: Vec<String>,
}

/// Prediction service
///
/// Owns the fitted transform and the classifier for the lifetime of the process.
/// Both are immutable after construction, so a single instance is shared across
/// request handlers and batch workers without locking.
#[derive(Clone)]
pub struct PredictionService {
    transform: Arc<FittedTransform>,
    model: Arc<dyn Classifier>,
    progress_interval: usize,
}

impl PredictionService {
    /// Pair a transform with a classifier.
    ///
    /// Both artifacts are validated here, whatever way they were built, and must agree
    /// on the feature order.
    pub fn new(transform: FittedTransform, model: Arc<dyn Classifier>) -> Result<Self> {
        transform.validate()?;
        model.validate()?;
        if transform.feature_names() != model.feature_names() {
            return Err(AppError::artifact_load(
                "model",
                format!(
                    "model features {:?} do not match transform features {:?}",
                    model.feature_names(),
                    transform.feature_names()
                ),
            ));
        }

        Ok(Self {
            transform: Arc::new(transform),
            model,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        })
    }

    /// Load both artifacts from the configured paths
    pub fn load(config: &ArtifactConfig) -> Result<Self> {
        let transform = FittedTransform::load(&config.transform_path)?;
        let model = ModelArtifact::load(&config.model_path)?;
        let service = Self::new(transform, Arc::new(model))?;

        info!(
            model = %service.model.metadata().name,
            n_features = service.transform.n_features(),
            "Prediction service ready"
        );

        Ok(service)
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn transform(&self) -> &FittedTransform {
        &self.transform
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.model.metadata()
    }

    pub fn model_info(&self) -> ModelInfo {
        let metadata = self.model.metadata();
        ModelInfo {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            model_type: metadata.model_type,
            trained_at: metadata.trained_at,
            n_training_samples: metadata.n_training_samples,
            test_metrics: metadata.test_metrics.clone(),
            feature_names: self.model.feature_names().to_vec(),
        }
    }

    /// Predict dropout risk and recommendations for one record
    pub fn predict_one(&self, record: &StudentRecord) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = self.run_pipeline(record);
        PREDICTION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(prediction) => {
                let level = prediction.risk_level.to_string();
                PREDICTIONS_TOTAL.with_label_values(&[level.as_str()]).inc();
            }
            Err(e) => {
                PREDICTION_ERRORS_TOTAL
                    .with_label_values(&[e.error_code()])
                    .inc();
            }
        }

        result
    }

    fn run_pipeline(&self, record: &StudentRecord) -> Result<PredictionResult> {
        let encoded = self.transform.encode(record)?;
        let probabilities = self.model.predict_proba(&encoded.values)?;
        let dropout_probability = probabilities.dropout();

        let predicted_class = if dropout_probability > 0.5 {
            Outcome::Dropout
        } else {
            Outcome::Graduate
        };
        let risk_level = classify_risk(dropout_probability);
        let recommendations = recommend(record, dropout_probability);

        debug!(
            dropout_probability,
            risk_level = %risk_level,
            n_recommendations = recommendations.len(),
            "Prediction complete"
        );

        Ok(PredictionResult {
            predicted_class,
            dropout_probability,
            graduate_probability: probabilities.graduate(),
            risk_level,
            recommendations,
            warnings: encoded.warnings,
        })
    }

    /// Predict each record independently, one slot per input in input order
    pub fn predict_many(
        &self,
        records: &[StudentRecord],
    ) -> Vec<std::result::Result<PredictionResult, RecordError>> {
        let total = records.len();
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let outcome = self.predict_slot(index, record);
                if (index + 1) % self.progress_interval == 0 {
                    info!(processed = index + 1, total, "Batch progress");
                }
                outcome
            })
            .collect()
    }

    /// Same contract as [`predict_many`](Self::predict_many), spread over the rayon pool
    pub fn predict_many_parallel(
        &self,
        records: &[StudentRecord],
    ) -> Vec<std::result::Result<PredictionResult, RecordError>> {
        records
            .par_iter()
            .enumerate()
            .map(|(index, record)| self.predict_slot(index, record))
            .collect()
    }

    fn predict_slot(
        &self,
        index: usize,
        record: &StudentRecord,
    ) -> std::result::Result<PredictionResult, RecordError> {
        self.predict_one(record).map_err(|e| {
            let student_id = record
                .student_id
                .clone()
                .unwrap_or_else(|| StudentId::from(index));
            warn!(index, student_id = %student_id, error = %e, "Record failed");
            RecordError::new(index, student_id, &e)
        })
    }
}

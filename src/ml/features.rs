use crate::error::{AppError, Result};
use crate::metrics::UNSEEN_CATEGORIES_TOTAL;
use crate::models::{
    column_kind, ColumnKind, FieldValue, StudentRecord, TransformWarning, FEATURE_COLUMNS,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

const ARTIFACT: &str = "transform";

/// Label encoder for a single categorical column
///
/// A category's code is its index in `classes`. Labels that were never seen at fit
/// time map to `fallback_code`, which is the code of the first known class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    classes: Vec<String>,
    #[serde(default)]
    fallback_code: usize,
}

impl CategoryEncoder {
    /// Fit on observed labels; classes end up sorted and unique
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self::from_classes(classes.into_iter().map(str::to_string).collect())
    }

    /// Rebuild an encoder from a persisted class list, keeping its order
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            return Err(AppError::Validation(
                "category encoder needs at least one class".to_string(),
            ));
        }
        let unique: HashSet<&String> = classes.iter().collect();
        if unique.len() != classes.len() {
            return Err(AppError::Validation(
                "category encoder classes must be unique".to_string(),
            ));
        }
        Ok(Self {
            classes,
            fallback_code: 0,
        })
    }

    /// Code of a known label
    pub fn code(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn fallback_code(&self) -> usize {
        self.fallback_code
    }

    fn validate(&self, column: &str) -> Result<()> {
        if self.classes.is_empty() {
            return Err(AppError::artifact_load(
                ARTIFACT,
                format!("encoder for '{}' has no classes", column),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.classes.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(AppError::artifact_load(
                ARTIFACT,
                format!("encoder for '{}' repeats class '{}'", column, duplicate),
            ));
        }
        if self.fallback_code >= self.classes.len() {
            return Err(AppError::artifact_load(
                ARTIFACT,
                format!(
                    "encoder for '{}' has fallback code {} outside {} classes",
                    column,
                    self.fallback_code,
                    self.classes.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Standardization parameters for one feature column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub mean: f64,
    pub std_dev: f64,
}

impl ColumnScale {
    /// Fit mean and population standard deviation
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }

    /// Zero-variance columns pass through with only the mean removed
    pub fn is_degenerate(&self) -> bool {
        self.std_dev == 0.0
    }

    pub fn apply(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            value - self.mean
        } else {
            (value - self.mean) / self.std_dev
        }
    }
}

/// Feature vector produced for one record, with any non-fatal signals raised on the way
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatures {
    pub values: Array1<f64>,
    pub warnings: Vec<TransformWarning>,
}

/// Preprocessing pipeline fitted at training time and replayed unchanged at inference
///
/// Categorical columns are label-encoded, then every column (encoded or numeric) is
/// standardized with the parameters recorded at fit time, in `feature_names` order.
/// Instances are immutable; the only constructors are [`FittedTransform::fit`],
/// [`FittedTransform::load`] and [`FittedTransform::from_parts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    feature_names: Vec<String>,
    encoders: BTreeMap<String, CategoryEncoder>,
    scales: Vec<ColumnScale>,
}

impl FittedTransform {
    /// Assemble and validate a transform from its parts
    pub fn from_parts(
        feature_names: Vec<String>,
        encoders: BTreeMap<String, CategoryEncoder>,
        scales: Vec<ColumnScale>,
    ) -> Result<Self> {
        let transform = Self {
            feature_names,
            encoders,
            scales,
        };
        transform.validate()?;
        Ok(transform)
    }

    /// Fit on training records over the full student schema.
    ///
    /// Missing numeric values are filled with the column median, missing labels with
    /// the column mode, before encoders and scales are fitted.
    pub fn fit(records: &[StudentRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(AppError::Validation(
                "cannot fit a transform on zero records".to_string(),
            ));
        }

        let mut encoders = BTreeMap::new();
        let mut scales = Vec::with_capacity(FEATURE_COLUMNS.len());

        for column in FEATURE_COLUMNS {
            match column_kind(column) {
                Some(ColumnKind::Categorical) => {
                    let observed: Vec<&str> = records
                        .iter()
                        .filter_map(|r| match r.field(column) {
                            Some(FieldValue::Categorical(v)) => Some(v),
                            _ => None,
                        })
                        .collect();
                    let fill = mode(&observed).ok_or_else(|| {
                        AppError::Validation(format!("column '{}' has no values", column))
                    })?;
                    let filled: Vec<&str> = records
                        .iter()
                        .map(|r| match r.field(column) {
                            Some(FieldValue::Categorical(v)) => v,
                            _ => fill,
                        })
                        .collect();

                    let encoder = CategoryEncoder::fit(filled.iter().copied())?;
                    let codes: Vec<f64> = filled
                        .iter()
                        .filter_map(|label| encoder.code(label))
                        .map(|code| code as f64)
                        .collect();
                    scales.push(ColumnScale::fit(&codes));
                    encoders.insert(column.to_string(), encoder);
                }
                _ => {
                    let observed: Vec<f64> = records
                        .iter()
                        .filter_map(|r| match r.field(column) {
                            Some(FieldValue::Numeric(v)) => Some(v),
                            _ => None,
                        })
                        .collect();
                    let fill = median(&observed).ok_or_else(|| {
                        AppError::Validation(format!("column '{}' has no values", column))
                    })?;
                    let filled: Vec<f64> = records
                        .iter()
                        .map(|r| match r.field(column) {
                            Some(FieldValue::Numeric(v)) => v,
                            _ => fill,
                        })
                        .collect();
                    scales.push(ColumnScale::fit(&filled));
                }
            }
        }

        let transform = Self::from_parts(
            FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            encoders,
            scales,
        )?;

        info!(
            n_records = records.len(),
            n_features = transform.n_features(),
            "Fitted feature transform"
        );

        Ok(transform)
    }

    /// Load a persisted transform
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::artifact_load(ARTIFACT, format!("{}: {}", path.display(), e))
        })?;
        let transform: Self = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::artifact_load(ARTIFACT, format!("{}: {}", path.display(), e))
        })?;
        transform.validate()?;

        info!(
            path = %path.display(),
            n_features = transform.n_features(),
            "Feature transform loaded"
        );
        debug!(features = ?transform.feature_names, "Expected features");

        Ok(transform)
    }

    /// Persist as JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "Feature transform saved");
        Ok(())
    }

    /// Encode a raw record into the feature vector the model was trained on
    pub fn encode(&self, record: &StudentRecord) -> Result<EncodedFeatures> {
        let mut values = Vec::with_capacity(self.feature_names.len());
        let mut warnings = Vec::new();
        let mut missing = Vec::new();

        for (name, scale) in self.feature_names.iter().zip(&self.scales) {
            let raw = match (self.encoders.get(name), record.field(name)) {
                (Some(encoder), Some(FieldValue::Categorical(label))) => {
                    match encoder.code(label) {
                        Some(code) => code as f64,
                        None => {
                            let fallback = encoder.fallback_code();
                            warn!(
                                column = %name,
                                value = %label,
                                fallback_code = fallback,
                                "Unseen category, using fallback code"
                            );
                            UNSEEN_CATEGORIES_TOTAL
                                .with_label_values(&[name.as_str()])
                                .inc();
                            warnings.push(TransformWarning::UnseenCategory {
                                column: name.clone(),
                                value: label.to_string(),
                                fallback_code: fallback,
                            });
                            fallback as f64
                        }
                    }
                }
                (None, Some(FieldValue::Numeric(value))) => value,
                (_, Some(other)) => {
                    return Err(AppError::SchemaMismatch(format!(
                        "feature '{}' has a {} value where the transform expects {}",
                        name,
                        other.kind(),
                        if self.encoders.contains_key(name) {
                            ColumnKind::Categorical
                        } else {
                            ColumnKind::Numeric
                        }
                    )));
                }
                (_, None) => {
                    missing.push(name.as_str());
                    continue;
                }
            };

            if scale.is_degenerate() {
                debug!(column = %name, "Zero-variance column, removing mean only");
                warnings.push(TransformWarning::DegenerateScale {
                    column: name.clone(),
                });
            }
            values.push(scale.apply(raw));
        }

        if !missing.is_empty() {
            return Err(AppError::SchemaMismatch(format!(
                "missing required features: {}",
                missing.join(", ")
            )));
        }

        Ok(EncodedFeatures {
            values: Array1::from(values),
            warnings,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn encoder(&self, column: &str) -> Option<&CategoryEncoder> {
        self.encoders.get(column)
    }

    pub fn scale(&self, column: &str) -> Option<&ColumnScale> {
        self.feature_names
            .iter()
            .position(|n| n == column)
            .and_then(|i| self.scales.get(i))
    }

    /// Check the parts agree with each other and with the student schema
    pub(crate) fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(AppError::artifact_load(ARTIFACT, "no feature names"));
        }
        if self.scales.len() != self.feature_names.len() {
            return Err(AppError::artifact_load(
                ARTIFACT,
                format!(
                    "{} scale entries for {} features",
                    self.scales.len(),
                    self.feature_names.len()
                ),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.feature_names {
            if !seen.insert(name.as_str()) {
                return Err(AppError::artifact_load(
                    ARTIFACT,
                    format!("duplicate feature '{}'", name),
                ));
            }
            let expected = column_kind(name).ok_or_else(|| {
                AppError::artifact_load(ARTIFACT, format!("unknown feature '{}'", name))
            })?;
            let encoded = self.encoders.contains_key(name);
            if encoded != (expected == ColumnKind::Categorical) {
                return Err(AppError::artifact_load(
                    ARTIFACT,
                    format!("feature '{}' is {} but encoder presence disagrees", name, expected),
                ));
            }
        }

        for (column, encoder) in &self.encoders {
            if !seen.contains(column.as_str()) {
                return Err(AppError::artifact_load(
                    ARTIFACT,
                    format!("encoder for '{}' which is not a feature", column),
                ));
            }
            encoder.validate(column)?;
        }

        for (name, scale) in self.feature_names.iter().zip(&self.scales) {
            if !scale.mean.is_finite() || !scale.std_dev.is_finite() || scale.std_dev < 0.0 {
                return Err(AppError::artifact_load(
                    ARTIFACT,
                    format!("invalid scale for '{}': {:?}", name, scale),
                ));
            }
        }

        Ok(())
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent label; ties resolve to the lexicographically smallest
fn mode<'a>(values: &[&'a str]) -> Option<&'a str> {
    let mut counts: BTreeMap<&'a str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(*value).or_insert(0) += 1;
    }
    let best = counts.values().copied().max()?;
    counts
        .into_iter()
        .find(|(_, count)| *count == best)
        .map(|(label, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(gender: &str, income: &str, gpa: f64, absences: f64) -> StudentRecord {
        StudentRecord {
            age: Some(15.0 + gpa),
            gender: Some(gender.to_string()),
            attendance_rate: Some(1.0 - absences / 100.0),
            gpa_semester1: Some(gpa),
            gpa_semester2: Some(gpa + 0.2),
            parent_education: Some(if gpa > 2.7 { "Master" } else { "Bachelor" }.to_string()),
            family_income: Some(income.to_string()),
            extracurricular: Some(absences / 2.0),
            study_hours_weekly: Some(gpa * 5.0),
            absences: Some(absences),
            behavioral_issues: Some(absences / 3.0),
            previous_failures: Some(if gpa < 2.6 { 1.0 } else { 0.0 }),
            ..Default::default()
        }
    }

    fn training_set() -> Vec<StudentRecord> {
        vec![
            student("Male", "Low", 2.0, 10.0),
            student("Female", "High", 3.5, 2.0),
            student("Female", "Medium", 3.0, 4.0),
            student("Male", "Medium", 2.5, 8.0),
        ]
    }

    #[test]
    fn test_encoder_classes_are_sorted() {
        let encoder = CategoryEncoder::fit(["Medium", "Low", "High", "Low"]).unwrap();
        assert_eq!(encoder.classes(), &["High", "Low", "Medium"]);
        assert_eq!(encoder.code("Low"), Some(1));
        assert_eq!(encoder.code("Unknown"), None);
        assert_eq!(encoder.fallback_code(), 0);
    }

    #[test]
    fn test_encoder_rejects_duplicates() {
        let result = CategoryEncoder::from_classes(vec!["A".to_string(), "A".to_string()]);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_scale_apply() {
        let scale = ColumnScale::fit(&[1.0, 3.0]);
        assert_eq!(scale.mean, 2.0);
        assert_eq!(scale.std_dev, 1.0);
        assert_eq!(scale.apply(4.0), 2.0);
    }

    #[test]
    fn test_zero_variance_passthrough() {
        let scale = ColumnScale::fit(&[5.0, 5.0, 5.0]);
        assert!(scale.is_degenerate());
        assert_eq!(scale.apply(7.5), 2.5);
    }

    #[test]
    fn test_fit_produces_schema_order() {
        let transform = FittedTransform::fit(&training_set()).unwrap();
        let expected: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
        assert_eq!(transform.feature_names(), expected.as_slice());
        assert!(transform.encoder("gender").is_some());
        assert!(transform.encoder("age").is_none());
    }

    #[test]
    fn test_fit_rejects_empty_input() {
        assert!(matches!(
            FittedTransform::fit(&[]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_fit_fills_missing_with_median() {
        let mut records = training_set();
        records[0].absences = None;
        let transform = FittedTransform::fit(&records).unwrap();

        // observed absences 2, 4, 8 -> median 4; filled column 4, 2, 4, 8
        let scale = transform.scale("absences").unwrap();
        assert!((scale.mean - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let transform = FittedTransform::fit(&training_set()).unwrap();
        let record = student("Female", "Low", 2.8, 6.0);

        let first = transform.encode(&record).unwrap();
        let second = transform.encode(&record).unwrap();
        assert_eq!(first.values, second.values);
        assert_eq!(first.values.len(), transform.n_features());
        assert!(first.warnings.is_empty());
    }

    #[test]
    fn test_unseen_category_uses_fallback() {
        let transform = FittedTransform::fit(&training_set()).unwrap();
        let known = transform.encode(&student("Female", "Low", 2.8, 6.0)).unwrap();
        let unseen = transform.encode(&student("Nonbinary", "Low", 2.8, 6.0)).unwrap();

        // "Female" is the first sorted class, so it shares the fallback code
        assert_eq!(known.values, unseen.values);
        assert_eq!(
            unseen.warnings,
            vec![TransformWarning::UnseenCategory {
                column: "gender".to_string(),
                value: "Nonbinary".to_string(),
                fallback_code: 0,
            }]
        );
    }

    #[test]
    fn test_missing_features_are_schema_mismatch() {
        let transform = FittedTransform::fit(&training_set()).unwrap();
        let mut record = student("Male", "Low", 2.0, 3.0);
        record.gpa_semester2 = None;
        record.gender = None;

        match transform.encode(&record) {
            Err(AppError::SchemaMismatch(message)) => {
                assert!(message.contains("gender"));
                assert!(message.contains("gpa_semester2"));
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_column_warns() {
        let mut records = training_set();
        for record in &mut records {
            record.previous_failures = Some(1.0);
        }
        let transform = FittedTransform::fit(&records).unwrap();
        let mut record = student("Male", "Low", 2.0, 3.0);
        record.previous_failures = Some(3.0);
        let encoded = transform.encode(&record).unwrap();

        let position = transform
            .feature_names()
            .iter()
            .position(|n| n == "previous_failures")
            .unwrap();
        assert_eq!(encoded.values[position], 2.0);
        assert!(encoded.warnings.contains(&TransformWarning::DegenerateScale {
            column: "previous_failures".to_string()
        }));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("preprocessor.json");

        let transform = FittedTransform::fit(&training_set()).unwrap();
        transform.save(&path).unwrap();

        let loaded = FittedTransform::load(&path).unwrap();
        assert_eq!(loaded, transform);
    }

    #[test]
    fn test_load_missing_file_is_artifact_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = FittedTransform::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(AppError::ArtifactLoad { .. })));
    }

    #[test]
    fn test_validation_rejects_mismatched_parts() {
        let result = FittedTransform::from_parts(
            vec!["age".to_string(), "age".to_string()],
            BTreeMap::new(),
            vec![ColumnScale::fit(&[1.0]), ColumnScale::fit(&[1.0])],
        );
        assert!(matches!(result, Err(AppError::ArtifactLoad { .. })));

        let result = FittedTransform::from_parts(
            vec!["gender".to_string()],
            BTreeMap::new(),
            vec![ColumnScale::fit(&[0.0, 1.0])],
        );
        assert!(matches!(result, Err(AppError::ArtifactLoad { .. })));

        let result = FittedTransform::from_parts(
            vec!["age".to_string()],
            BTreeMap::new(),
            vec![],
        );
        assert!(matches!(result, Err(AppError::ArtifactLoad { .. })));
    }

    #[test]
    fn test_deserialized_parts_are_not_trusted() {
        let short: FittedTransform = serde_json::from_value(serde_json::json!({
            "feature_names": ["age", "absences"],
            "encoders": {},
            "scales": [{"mean": 16.0, "std_dev": 1.0}]
        }))
        .unwrap();

        assert_eq!(short.scale("age").map(|s| s.mean), Some(16.0));
        assert_eq!(short.scale("absences"), None);
        assert!(matches!(short.validate(), Err(AppError::ArtifactLoad { .. })));
    }

    #[test]
    fn test_load_rejects_repeated_classes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessor.json");

        let mut json = serde_json::to_value(FittedTransform::fit(&training_set()).unwrap()).unwrap();
        json["encoders"]["gender"]["classes"] = serde_json::json!(["Male", "Male"]);
        std::fs::write(&path, json.to_string()).unwrap();

        let err = FittedTransform::load(&path).unwrap_err();
        assert!(matches!(err, AppError::ArtifactLoad { .. }));
        assert!(err.to_string().contains("gender"));
    }
}

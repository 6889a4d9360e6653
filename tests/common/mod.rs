//! Common test utilities
//!
//! Builds a small cohort, fits a transform on it and writes matching model and
//! transform artifacts into a temporary directory.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use student_risk_engine::{
    config::ArtifactConfig,
    ml::{Estimator, FittedTransform, ModelArtifact, ModelMetadata, ModelType, PredictionService},
    models::{StudentId, StudentRecord, FEATURE_COLUMNS},
};
use tempfile::TempDir;

/// A fully populated record; risk grows with absences and falls with GPA
pub fn student(id: i64, gpa: f64, absences: f64, income: &str) -> StudentRecord {
    StudentRecord {
        student_id: Some(StudentId::Number(id)),
        age: Some(15.0 + (id % 4) as f64),
        gender: Some(if id % 2 == 0 { "Female" } else { "Male" }.to_string()),
        attendance_rate: Some(1.0 - absences / 60.0),
        gpa_semester1: Some(gpa),
        gpa_semester2: Some(gpa + 0.1),
        parent_education: Some(if gpa > 3.0 { "Master" } else { "High School" }.to_string()),
        family_income: Some(income.to_string()),
        extracurricular: Some((4.0 - absences / 5.0).max(0.0)),
        study_hours_weekly: Some(gpa * 5.0),
        absences: Some(absences),
        behavioral_issues: Some((absences / 4.0).floor()),
        previous_failures: Some(if gpa < 2.5 { 1.0 } else { 0.0 }),
    }
}

pub fn training_cohort() -> Vec<StudentRecord> {
    vec![
        student(0, 1.8, 16.0, "Low"),
        student(1, 2.2, 12.0, "Low"),
        student(2, 2.7, 8.0, "Medium"),
        student(3, 3.0, 5.0, "Medium"),
        student(4, 3.4, 3.0, "High"),
        student(5, 3.8, 1.0, "High"),
    ]
}

pub fn feature_names() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Logistic model leaning on GPA and absences
pub fn logistic_model() -> ModelArtifact {
    let weights: HashMap<&str, f64> = [
        ("gpa_semester1", -1.2),
        ("gpa_semester2", -1.2),
        ("absences", 1.8),
        ("previous_failures", 0.4),
    ]
    .into_iter()
    .collect();
    let coefficients = FEATURE_COLUMNS
        .iter()
        .map(|c| weights.get(c).copied().unwrap_or(0.0))
        .collect();

    ModelArtifact::new(
        ModelMetadata::new("Logistic Regression", ModelType::LogisticRegression),
        feature_names(),
        Estimator::LogisticRegression {
            coefficients,
            intercept: 0.0,
        },
    )
    .unwrap()
}

pub fn fitted_transform() -> FittedTransform {
    FittedTransform::fit(&training_cohort()).unwrap()
}

pub fn prediction_service() -> PredictionService {
    PredictionService::new(fitted_transform(), Arc::new(logistic_model())).unwrap()
}

/// Persist both artifacts under `dir` and return the matching configuration
pub fn write_artifacts(dir: &Path) -> ArtifactConfig {
    let config = ArtifactConfig {
        model_path: dir.join("models").join("final_model.json"),
        transform_path: dir.join("models").join("preprocessor.json"),
    };
    logistic_model().save(&config.model_path).unwrap();
    fitted_transform().save(&config.transform_path).unwrap();
    config
}

pub fn artifact_dir() -> (TempDir, ArtifactConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = write_artifacts(dir.path());
    (dir, config)
}

/// Header plus one CSV line per record, in schema order
pub fn cohort_csv(records: &[StudentRecord]) -> String {
    let mut out = String::from("student_id,");
    out.push_str(&FEATURE_COLUMNS.join(","));
    out.push('\n');
    for r in records {
        let num = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let id = r.student_id.as_ref().map(|s| s.to_string()).unwrap_or_default();
        let fields = [
            id,
            num(r.age),
            text(&r.gender),
            num(r.attendance_rate),
            num(r.gpa_semester1),
            num(r.gpa_semester2),
            text(&r.parent_education),
            text(&r.family_income),
            num(r.extracurricular),
            num(r.study_hours_weekly),
            num(r.absences),
            num(r.behavioral_issues),
            num(r.previous_failures),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Parse Prometheus exposition text into metric name -> sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics.entry(current_metric.clone()).or_insert_with(Vec::new);
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Value of a sample line, e.g. `name{a="1"} 42.5` -> 42.5
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}

//! Cohort batch processing
//!
//! Reads student rows from CSV, predicts each one independently and persists the
//! entries as both pretty JSON and CSV. Failed rows are kept in place with their
//! error so the output lines up with the input row for row.

use crate::error::{AppError, Result};
use crate::metrics::BATCH_RECORDS_TOTAL;
use crate::ml::{PredictionService, RecordError};
use crate::models::{PredictionResult, RiskLevel, StudentId, StudentRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Separator used when flattening recommendation actions into one CSV cell
pub const ACTION_SEPARATOR: &str = "; ";

/// One decoded input row
#[derive(Debug)]
pub struct BatchRow {
    /// Zero-based position in the input
    pub index: usize,
    pub record: Result<StudentRecord>,
}

/// Output for one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Success {
        student_id: StudentId,
        risk_level: RiskLevel,
        dropout_probability: f64,
        graduate_probability: f64,
        top_recommendations: Vec<String>,
    },
    Failure {
        student_id: StudentId,
        error: String,
    },
}

impl BatchEntry {
    pub fn success(student_id: StudentId, result: &PredictionResult, top_n: usize) -> Self {
        BatchEntry::Success {
            student_id,
            risk_level: result.risk_level,
            dropout_probability: result.dropout_probability,
            graduate_probability: result.graduate_probability,
            top_recommendations: result.top_actions(top_n),
        }
    }

    pub fn failure(error: &RecordError) -> Self {
        BatchEntry::Failure {
            student_id: error.student_id.clone(),
            error: error.message.clone(),
        }
    }

    pub fn student_id(&self) -> &StudentId {
        match self {
            BatchEntry::Success { student_id, .. } | BatchEntry::Failure { student_id, .. } => {
                student_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchEntry::Success { .. })
    }
}

/// Flat CSV shape of a [`BatchEntry`]
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    student_id: &'a StudentId,
    risk_level: Option<RiskLevel>,
    dropout_probability: Option<f64>,
    graduate_probability: Option<f64>,
    top_recommendations: String,
    error: Option<&'a str>,
}

impl<'a> From<&'a BatchEntry> for CsvRow<'a> {
    fn from(entry: &'a BatchEntry) -> Self {
        match entry {
            BatchEntry::Success {
                student_id,
                risk_level,
                dropout_probability,
                graduate_probability,
                top_recommendations,
            } => CsvRow {
                student_id,
                risk_level: Some(*risk_level),
                dropout_probability: Some(*dropout_probability),
                graduate_probability: Some(*graduate_probability),
                top_recommendations: top_recommendations.join(ACTION_SEPARATOR),
                error: None,
            },
            BatchEntry::Failure { student_id, error } => CsvRow {
                student_id,
                risk_level: None,
                dropout_probability: None,
                graduate_probability: None,
                top_recommendations: String::new(),
                error: Some(error.as_str()),
            },
        }
    }
}

/// Cohort statistics over the successfully processed rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub errors: usize,
    pub risk_distribution: BTreeMap<RiskLevel, usize>,
    /// `None` when no row succeeded
    pub mean_dropout_probability: Option<f64>,
    /// Share of successful rows in the High tier, 0 - 100
    pub high_risk_percentage: f64,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut risk_distribution: BTreeMap<RiskLevel, usize> =
            RiskLevel::ALL.iter().map(|level| (*level, 0)).collect();
        let mut probability_sum = 0.0;
        let mut succeeded = 0;

        for entry in entries {
            if let BatchEntry::Success {
                risk_level,
                dropout_probability,
                ..
            } = entry
            {
                *risk_distribution.entry(*risk_level).or_insert(0) += 1;
                probability_sum += dropout_probability;
                succeeded += 1;
            }
        }

        let (mean_dropout_probability, high_risk_percentage) = if succeeded == 0 {
            (None, 0.0)
        } else {
            let high = risk_distribution.get(&RiskLevel::High).copied().unwrap_or(0);
            (
                Some(probability_sum / succeeded as f64),
                high as f64 / succeeded as f64 * 100.0,
            )
        };

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            total: entries.len(),
            succeeded,
            errors: entries.len() - succeeded,
            risk_distribution,
            mean_dropout_probability,
            high_risk_percentage,
        }
    }

    /// Emit the summary through the log
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            total = self.total,
            succeeded = self.succeeded,
            errors = self.errors,
            "Batch complete"
        );
        for (level, count) in &self.risk_distribution {
            let percentage = if self.succeeded == 0 {
                0.0
            } else {
                *count as f64 / self.succeeded as f64 * 100.0
            };
            info!(
                risk_level = %level,
                count,
                percentage = %format!("{:.1}", percentage),
                "Risk distribution"
            );
        }
        if let Some(mean) = self.mean_dropout_probability {
            info!(
                mean_dropout_probability = %format!("{:.2}%", mean * 100.0),
                high_risk_percentage = %format!("{:.1}", self.high_risk_percentage),
                "Cohort risk"
            );
        }
    }
}

/// Entries plus their summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<BatchEntry>,
    pub summary: BatchSummary,
}

/// Decode every row of a CSV file independently.
///
/// Rows without a `student_id` get their zero-based index as id. A row that fails
/// to decode becomes an `Err` slot; only an unreadable file or header fails the call.
pub fn read_rows(path: &Path) -> Result<Vec<BatchRow>> {
    let file = std::fs::File::open(path)?;
    read_rows_from(file)
}

pub fn read_rows_from<R: std::io::Read>(reader: R) -> Result<Vec<BatchRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    reader.headers()?;

    let rows: Vec<BatchRow> = reader
        .deserialize::<StudentRecord>()
        .enumerate()
        .map(|(index, decoded)| {
            let record = decoded.map_err(AppError::from).map(|mut record| {
                record.student_id.get_or_insert_with(|| StudentId::from(index));
                record
            });
            BatchRow { index, record }
        })
        .collect();

    info!(rows = rows.len(), "Loaded student rows");
    Ok(rows)
}

/// Predict every row, keeping failures in place.
///
/// Entries follow the order of `rows`, one per row, whatever `index` values the
/// rows carry; `index` only supplies the fallback id of a row that failed to decode.
pub fn process_rows(
    service: &PredictionService,
    rows: Vec<BatchRow>,
    top_n: usize,
    parallel: bool,
) -> BatchReport {
    let total = rows.len();
    let mut entries: Vec<Option<BatchEntry>> = vec![None; total];
    let mut positions = Vec::with_capacity(total);
    let mut records = Vec::with_capacity(total);

    for (position, row) in rows.into_iter().enumerate() {
        match row.record {
            Ok(record) => {
                positions.push(position);
                records.push(record);
            }
            Err(e) => {
                warn!(index = row.index, error = %e, "Row could not be decoded");
                let error = RecordError::new(position, StudentId::from(row.index), &e);
                entries[position] = Some(BatchEntry::failure(&error));
            }
        }
    }

    let outcomes = if parallel {
        service.predict_many_parallel(&records)
    } else {
        service.predict_many(&records)
    };

    for ((position, record), outcome) in positions.into_iter().zip(&records).zip(outcomes) {
        let student_id = record
            .student_id
            .clone()
            .unwrap_or_else(|| StudentId::from(position));
        entries[position] = Some(match outcome {
            Ok(result) => BatchEntry::success(student_id, &result, top_n),
            Err(mut error) => {
                error.index = position;
                BatchEntry::failure(&error)
            }
        });
    }

    let entries: Vec<BatchEntry> = entries.into_iter().flatten().collect();
    for entry in &entries {
        let outcome = if entry.is_success() { "success" } else { "error" };
        BATCH_RECORDS_TOTAL.with_label_values(&[outcome]).inc();
    }

    let summary = BatchSummary::from_entries(&entries);
    BatchReport {
        results: entries,
        summary,
    }
}

/// Write entries as pretty JSON, creating parent directories
pub fn write_json(path: &Path, entries: &[BatchEntry]) -> Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, serde_json::to_vec_pretty(entries)?)?;
    info!(path = %path.display(), "Results saved");
    Ok(())
}

/// Write entries as CSV, creating parent directories
pub fn write_csv(path: &Path, entries: &[BatchEntry]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for entry in entries {
        writer.serialize(CsvRow::from(entry))?;
    }
    writer.flush()?;
    info!(path = %path.display(), "Results saved");
    Ok(())
}

/// Persist both forms
pub fn save_results(json_path: &Path, csv_path: &Path, entries: &[BatchEntry]) -> Result<()> {
    write_csv(csv_path, entries)?;
    write_json(json_path, entries)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

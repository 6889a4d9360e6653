mod common;

use common::*;
use student_risk_engine::{
    batch::{self, BatchEntry},
    config::Config,
    models::{RiskLevel, StudentId},
    AppError,
};

#[test]
fn test_batch_from_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut cohort = vec![
        student(1, 1.8, 16.0, "Low"),
        student(2, 3.8, 1.0, "High"),
        student(3, 2.9, 6.0, "Medium"),
    ];
    cohort[1].student_id = None;
    let input = dir.path().join("students.csv");
    std::fs::write(&input, cohort_csv(&cohort)).unwrap();

    let service = prediction_service();
    let rows = batch::read_rows(&input).unwrap();
    let report = batch::process_rows(&service, rows, 3, false);

    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(BatchEntry::is_success));
    assert_eq!(report.results[0].student_id(), &StudentId::Number(1));
    // Row without an id falls back to its index
    assert_eq!(report.results[1].student_id(), &StudentId::Number(1));
    assert_eq!(report.results[2].student_id(), &StudentId::Number(3));

    match &report.results[0] {
        BatchEntry::Success {
            risk_level,
            top_recommendations,
            ..
        } => {
            assert_eq!(*risk_level, RiskLevel::High);
            assert_eq!(top_recommendations.len(), 3);
            assert_eq!(
                top_recommendations[0],
                "Implement attendance monitoring and family outreach program"
            );
        }
        other => panic!("unexpected entry {:?}", other),
    }
}

#[test]
fn test_bad_rows_are_embedded_not_fatal() {
    let mut cohort = vec![
        student(1, 1.8, 16.0, "Low"),
        student(2, 3.8, 1.0, "High"),
        student(3, 2.9, 6.0, "Medium"),
    ];
    cohort[1].gpa_semester2 = None;
    let mut csv = cohort_csv(&cohort);
    csv.push_str("4,sixteen,Male,0.9,3.0,3.1,Master,High,3,15,2,0,0\n");

    let service = prediction_service();
    let rows = batch::read_rows_from(csv.as_bytes()).unwrap();
    let report = batch::process_rows(&service, rows, 3, true);

    assert_eq!(report.results.len(), 4);
    assert!(report.results[0].is_success());
    assert!(report.results[2].is_success());

    match &report.results[1] {
        BatchEntry::Failure { student_id, error } => {
            assert_eq!(student_id, &StudentId::Number(2));
            assert!(error.contains("gpa_semester2"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    match &report.results[3] {
        BatchEntry::Failure { student_id, .. } => {
            assert_eq!(student_id, &StudentId::Number(3));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let summary = &report.summary;
    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.errors, 2);
    assert_eq!(summary.risk_distribution.values().sum::<usize>(), 2);
}

#[test]
fn test_entries_follow_row_order_not_row_index() {
    let service = prediction_service();
    let rows = vec![
        batch::BatchRow {
            index: 7,
            record: Ok(student(1, 1.8, 16.0, "Low")),
        },
        batch::BatchRow {
            index: 7,
            record: Err(AppError::Serialization("bad row".to_string())),
        },
        batch::BatchRow {
            index: 0,
            record: Ok(student(3, 3.8, 1.0, "High")),
        },
    ];

    let report = batch::process_rows(&service, rows, 3, false);

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.results[0].student_id(), &StudentId::Number(1));
    assert_eq!(report.results[1].student_id(), &StudentId::Number(7));
    assert!(!report.results[1].is_success());
    assert_eq!(report.results[2].student_id(), &StudentId::Number(3));
    assert_eq!(report.summary.total, 3);
}

#[test]
fn test_summary_over_successful_rows() {
    let cohort: Vec<_> = (0..10)
        .map(|i| student(i, 1.8 + i as f64 * 0.2, 16.0 - i as f64 * 1.5, "Medium"))
        .collect();
    let service = prediction_service();
    let rows = batch::read_rows_from(cohort_csv(&cohort).as_bytes()).unwrap();
    let report = batch::process_rows(&service, rows, 3, false);

    let probabilities: Vec<f64> = report
        .results
        .iter()
        .map(|e| match e {
            BatchEntry::Success {
                dropout_probability,
                ..
            } => *dropout_probability,
            BatchEntry::Failure { error, .. } => panic!("unexpected failure: {}", error),
        })
        .collect();
    let mean = probabilities.iter().sum::<f64>() / probabilities.len() as f64;
    let high = probabilities.iter().filter(|p| **p >= 0.70).count();

    let summary = &report.summary;
    assert!((summary.mean_dropout_probability.unwrap() - mean).abs() < 1e-12);
    assert_eq!(summary.risk_distribution[&RiskLevel::High], high);
    assert!((summary.high_risk_percentage - high as f64 * 10.0).abs() < 1e-9);
}

#[test]
fn test_results_written_next_to_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.batch.output_path = dir.path().join("results").join("batch_predictions.json");

    let service = prediction_service();
    let rows = batch::read_rows_from(cohort_csv(&training_cohort()).as_bytes()).unwrap();
    let report = batch::process_rows(&service, rows, config.batch.top_recommendations, false);

    let csv_path = config.batch_csv_path();
    batch::save_results(&config.batch.output_path, &csv_path, &report.results).unwrap();
    assert_eq!(csv_path, dir.path().join("results").join("batch_predictions.csv"));
    assert!(config.batch.output_path.exists());

    let mut reader = csv::Reader::from_path(&csv_path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.get(0), Some("student_id"));
    assert_eq!(headers.get(5), Some("error"));
    assert_eq!(reader.records().count(), training_cohort().len());
}

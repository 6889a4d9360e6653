//! Rule-based intervention recommendations
//!
//! Rules are evaluated in a fixed order over the raw record. Absent attributes take a
//! permissive default so a missing value never triggers a rule on its own.

use crate::models::{Priority, Recommendation, RecommendationCategory, StudentRecord};

pub const ATTENDANCE_THRESHOLD: f64 = 0.85;
pub const GPA_HIGH_CONCERN: f64 = 2.5;
pub const GPA_MEDIUM_CONCERN: f64 = 3.0;
pub const BEHAVIORAL_THRESHOLD: f64 = 3.0;
pub const LOW_INCOME_LABEL: &str = "Low";
pub const EXTRACURRICULAR_THRESHOLD: f64 = 2.0;
pub const STUDY_HOURS_THRESHOLD: f64 = 10.0;
/// Below this probability a record with no triggered rule gets monitoring actions
pub const FALLBACK_PROBABILITY: f64 = 0.30;

const DEFAULT_ATTENDANCE: f64 = 1.0;
const DEFAULT_GPA: f64 = 4.0;
const DEFAULT_BEHAVIORAL_ISSUES: f64 = 0.0;
const DEFAULT_FAMILY_INCOME: &str = "High";
const DEFAULT_EXTRACURRICULAR: f64 = 5.0;
const DEFAULT_STUDY_HOURS: f64 = 20.0;

/// Produce recommendations in rule-evaluation order
pub fn recommend(record: &StudentRecord, dropout_probability: f64) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if record.numeric_or("attendance_rate", DEFAULT_ATTENDANCE) < ATTENDANCE_THRESHOLD {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Attendance,
            Priority::High,
            "Implement attendance monitoring and family outreach program",
            "Low attendance is a strong predictor of dropout risk",
        ));
    }

    let avg_gpa = (record.numeric_or("gpa_semester1", DEFAULT_GPA)
        + record.numeric_or("gpa_semester2", DEFAULT_GPA))
        / 2.0;
    if avg_gpa < GPA_HIGH_CONCERN {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Academic,
            Priority::High,
            "Provide intensive academic tutoring and mentorship support",
            "Student is struggling academically and needs immediate intervention",
        ));
    } else if avg_gpa < GPA_MEDIUM_CONCERN {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Academic,
            Priority::Medium,
            "Offer supplemental instruction and study skills workshops",
            "Student could benefit from additional academic support",
        ));
    }

    if record.numeric_or("behavioral_issues", DEFAULT_BEHAVIORAL_ISSUES) > BEHAVIORAL_THRESHOLD {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Behavioral,
            Priority::High,
            "Refer to counseling services and behavioral intervention program",
            "Behavioral issues may indicate underlying challenges",
        ));
    }

    if record.categorical_or("family_income", DEFAULT_FAMILY_INCOME) == LOW_INCOME_LABEL {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Socioeconomic,
            Priority::Medium,
            "Connect family with financial aid and community resources",
            "Financial stress can impact student success",
        ));
    }

    if record.numeric_or("extracurricular", DEFAULT_EXTRACURRICULAR) < EXTRACURRICULAR_THRESHOLD {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Engagement,
            Priority::Medium,
            "Encourage participation in extracurricular activities",
            "School engagement is protective against dropout",
        ));
    }

    if record.numeric_or("study_hours_weekly", DEFAULT_STUDY_HOURS) < STUDY_HOURS_THRESHOLD {
        recommendations.push(Recommendation::new(
            RecommendationCategory::StudyHabits,
            Priority::Medium,
            "Provide time management and study skills training",
            "Insufficient study time may lead to academic struggles",
        ));
    }

    if recommendations.is_empty() && dropout_probability < FALLBACK_PROBABILITY {
        recommendations.push(Recommendation::new(
            RecommendationCategory::Monitoring,
            Priority::Low,
            "Continue regular progress monitoring",
            "Student is on track but should be monitored",
        ));
        recommendations.push(Recommendation::new(
            RecommendationCategory::Engagement,
            Priority::Low,
            "Maintain regular communication with family",
            "Keep family engaged in student success",
        ));
    }

    recommendations
}

/// Stable sort, highest priority first. Ties keep evaluation order.
pub fn sorted_by_priority(mut recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};

/// Feature columns of the student schema, in the order the training pipeline emits them
pub const FEATURE_COLUMNS: [&str; 12] = [
    "age",
    "gender",
    "attendance_rate",
    "gpa_semester1",
    "gpa_semester2",
    "parent_education",
    "family_income",
    "extracurricular",
    "study_hours_weekly",
    "absences",
    "behavioral_issues",
    "previous_failures",
];

/// Whether a schema column carries numbers or category labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Kind of a known schema column, `None` for names outside the schema
pub fn column_kind(name: &str) -> Option<ColumnKind> {
    match name {
        "gender" | "parent_education" | "family_income" => Some(ColumnKind::Categorical),
        "age" | "attendance_rate" | "gpa_semester1" | "gpa_semester2" | "extracurricular"
        | "study_hours_weekly" | "absences" | "behavioral_issues" | "previous_failures" => {
            Some(ColumnKind::Numeric)
        }
        _ => None,
    }
}

/// Student identifier as it appears in the input: numeric row ids or free-form codes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum StudentId {
    Number(i64),
    Text(String),
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentId::Number(n) => write!(f, "{}", n),
            StudentId::Text(s) => f.write_str(s),
        }
    }
}

impl From<usize> for StudentId {
    fn from(index: usize) -> Self {
        StudentId::Number(index as i64)
    }
}

impl From<&str> for StudentId {
    fn from(value: &str) -> Self {
        StudentId::Text(value.to_string())
    }
}

struct StudentIdVisitor;

impl<'de> Visitor<'de> for StudentIdVisitor {
    type Value = StudentId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or string student id")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<StudentId, E> {
        Ok(StudentId::Number(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<StudentId, E> {
        i64::try_from(v)
            .map(StudentId::Number)
            .or_else(|_| Ok(StudentId::Text(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<StudentId, E> {
        // CSV readers hand integral ids back as floats once a column holds a blank
        if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            Ok(StudentId::Number(v as i64))
        } else {
            Ok(StudentId::Text(v.to_string()))
        }
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<StudentId, E> {
        // CSV cells reading "true" or "false" surface as booleans
        Ok(StudentId::Text(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<StudentId, E> {
        Ok(StudentId::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<StudentId, E> {
        Ok(StudentId::Text(v))
    }
}

impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StudentIdVisitor)
    }
}

/// A raw student record
///
/// Every attribute is optional: the feature transform demands the columns it was
/// fitted on, while the recommendation rules fall back to permissive defaults.
/// Unknown extra attributes are ignored on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
    pub age: Option<f64>,
    pub gender: Option<String>,
    /// Fraction of sessions attended, 0.0 - 1.0
    pub attendance_rate: Option<f64>,
    pub gpa_semester1: Option<f64>,
    pub gpa_semester2: Option<f64>,
    pub parent_education: Option<String>,
    /// Income band label, e.g. `Low`, `Medium`, `High`
    pub family_income: Option<String>,
    /// Number of extracurricular activities
    pub extracurricular: Option<f64>,
    pub study_hours_weekly: Option<f64>,
    pub absences: Option<f64>,
    pub behavioral_issues: Option<f64>,
    pub previous_failures: Option<f64>,
}

/// Borrowed view of a single attribute value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Numeric(f64),
    Categorical(&'a str),
}

impl FieldValue<'_> {
    pub fn kind(&self) -> ColumnKind {
        match self {
            FieldValue::Numeric(_) => ColumnKind::Numeric,
            FieldValue::Categorical(_) => ColumnKind::Categorical,
        }
    }
}

impl StudentRecord {
    /// Look up an attribute by column name.
    ///
    /// Non-finite numbers and blank labels read as absent.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        fn numeric(v: Option<f64>) -> Option<FieldValue<'static>> {
            v.filter(|x| x.is_finite()).map(FieldValue::Numeric)
        }

        fn categorical(v: &Option<String>) -> Option<FieldValue<'_>> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(FieldValue::Categorical)
        }

        match name {
            "age" => numeric(self.age),
            "gender" => categorical(&self.gender),
            "attendance_rate" => numeric(self.attendance_rate),
            "gpa_semester1" => numeric(self.gpa_semester1),
            "gpa_semester2" => numeric(self.gpa_semester2),
            "parent_education" => categorical(&self.parent_education),
            "family_income" => categorical(&self.family_income),
            "extracurricular" => numeric(self.extracurricular),
            "study_hours_weekly" => numeric(self.study_hours_weekly),
            "absences" => numeric(self.absences),
            "behavioral_issues" => numeric(self.behavioral_issues),
            "previous_failures" => numeric(self.previous_failures),
            _ => None,
        }
    }

    /// Numeric attribute, or `default` when absent
    pub fn numeric_or(&self, name: &str, default: f64) -> f64 {
        match self.field(name) {
            Some(FieldValue::Numeric(v)) => v,
            _ => default,
        }
    }

    /// Categorical attribute, or `default` when absent
    pub fn categorical_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.field(name) {
            Some(FieldValue::Categorical(v)) => v,
            _ => default,
        }
    }
}

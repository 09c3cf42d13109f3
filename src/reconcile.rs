//! Per-student academic summaries rebuilt from a bundle's raw collections.
//!
//! Everything here is pure and total. Irregular input (absent collections,
//! unparseable dates, missing totals) degrades to placeholder values
//! instead of failing, because older bundles predate newer fields.

use crate::model::{Assessment, AttendanceRecord, RawBundle, Student, StudentRemark};
use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Shown for a rate or average that has no denominator.
pub const PLACEHOLDER: &str = "-";
/// Shown when a student has no remark.
pub const NO_REMARK: &str = "N/A";

/// Derived, display-only summary. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSnapshot {
    pub student: Student,
    pub present_days: usize,
    pub total_days: usize,
    pub attendance_rate: String,
    pub avg_score: String,
    pub remark: String,
}

/// Computes an assessment total when the record carries none.
pub trait AssessmentScorer: Send + Sync {
    fn score(&self, assessment: &Value) -> f64;
}

/// Sums every numeric field whose key ends in `Score`
/// (`classScore`, `examScore`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentScorer;

impl AssessmentScorer for ComponentScorer {
    fn score(&self, assessment: &Value) -> f64 {
        let Some(fields) = assessment.as_object() else {
            return 0.0;
        };
        fields
            .iter()
            .filter(|(k, _)| k.ends_with("Score"))
            .filter_map(|(_, v)| v.as_f64())
            .filter(|v| v.is_finite())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreTotals {
    pub sum: f64,
    pub count: usize,
}

/// Multimap of class id to the sessions recorded for it. Records without a
/// class id group under the empty string like any other literal value.
pub fn group_attendance_by_class(
    records: &[AttendanceRecord],
) -> HashMap<&str, Vec<&AttendanceRecord>> {
    let mut grouped: HashMap<&str, Vec<&AttendanceRecord>> = HashMap::new();
    for record in records {
        grouped
            .entry(record.class_id.as_str())
            .or_default()
            .push(record);
    }
    grouped
}

/// `(present, total)` sessions for one student.
///
/// The denominator is every session recorded for the class, regardless of
/// when the student enrolled.
pub fn attendance_counts(
    student: &Student,
    by_class: &HashMap<&str, Vec<&AttendanceRecord>>,
) -> (usize, usize) {
    let sessions = by_class
        .get(student.class_id.as_str())
        .map(|v| v.as_slice())
        .unwrap_or(&[]);
    let present = sessions
        .iter()
        .filter(|r| r.present_student_ids.iter().any(|id| *id == student.id))
        .count();
    (present, sessions.len())
}

pub fn resolve_total(assessment: &Assessment, scorer: &dyn AssessmentScorer) -> f64 {
    match assessment.total {
        Some(t) if t.is_finite() => t,
        _ => scorer.score(&assessment.fields),
    }
}

pub fn aggregate_assessment_totals<'a>(
    assessments: &'a [Assessment],
    scorer: &dyn AssessmentScorer,
) -> HashMap<&'a str, ScoreTotals> {
    let mut totals: HashMap<&str, ScoreTotals> = HashMap::new();
    for assessment in assessments {
        let entry = totals.entry(assessment.student_id.as_str()).or_default();
        entry.sum += resolve_total(assessment, scorer);
        entry.count += 1;
    }
    totals
}

/// Parses `dateCreated` into epoch milliseconds.
///
/// Accepts epoch millis (number, or a numeric string of at least ten
/// digits), RFC 3339, naive `YYYY-MM-DDTHH:MM:SS`, plain `YYYY-MM-DD`, a
/// bare `YYYY` (January 1st of that year), and store timestamp objects
/// `{seconds, nanoseconds}` (optionally underscore-prefixed).
pub fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(|v| v.as_i64())?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            seconds
                .checked_mul(1000)
                .and_then(|ms| ms.checked_add(nanos / 1_000_000))
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return match s.len() {
            4 => s
                .parse::<i32>()
                .ok()
                .and_then(|year| chrono::NaiveDate::from_ymd_opt(year, 1, 1))
                .map(|d| d.and_time(chrono::NaiveTime::default()).and_utc().timestamp_millis()),
            n if n >= 10 => s.parse::<i64>().ok(),
            _ => None,
        };
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp_millis());
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(chrono::NaiveTime::default()).and_utc().timestamp_millis())
}

/// Latest remark for a student.
///
/// A candidate replaces the running best when its date is greater than or
/// equal to the best's, so among same-instant remarks the last one
/// iterated wins. An unparseable date never compares greater: such a
/// remark is only kept when it comes first and no dated remark follows.
pub fn latest_remark<'a>(remarks: &'a [StudentRemark], student_id: &str) -> Option<&'a str> {
    let mut best: Option<(&StudentRemark, Option<i64>)> = None;
    for remark in remarks.iter().filter(|r| r.student_id == student_id) {
        let candidate_ts = parse_timestamp_ms(&remark.date_created);
        let replace = match (&best, candidate_ts) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((_, None)), Some(_)) => true,
            (Some((_, Some(best_ts))), Some(ts)) => ts >= *best_ts,
        };
        if replace {
            best = Some((remark, candidate_ts));
        }
    }
    best.map(|(r, _)| r.remark.as_str())
}

/// Half-up rounding to a whole number.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Half-up 1-decimal rounding: `Int(10*x + 0.5) / 10`.
fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn format_rate(present: usize, total: usize) -> String {
    if total == 0 {
        return PLACEHOLDER.to_string();
    }
    let pct = round_half_up(present as f64 / total as f64 * 100.0);
    format!("{}%", pct as i64)
}

pub fn format_average(totals: Option<&ScoreTotals>) -> String {
    match totals {
        Some(t) if t.count > 0 => {
            format!("{:.1}", round_off_1_decimal(t.sum / t.count as f64))
        }
        _ => PLACEHOLDER.to_string(),
    }
}

/// One snapshot per student, in the students collection's order.
pub fn reconcile(raw: &RawBundle, scorer: &dyn AssessmentScorer) -> Vec<StudentSnapshot> {
    let by_class = group_attendance_by_class(&raw.attendance_records);
    let totals = aggregate_assessment_totals(&raw.assessments, scorer);

    raw.students
        .iter()
        .map(|student| {
            let (present_days, total_days) = attendance_counts(student, &by_class);
            StudentSnapshot {
                student: student.clone(),
                present_days,
                total_days,
                attendance_rate: format_rate(present_days, total_days),
                avg_score: format_average(totals.get(student.id.as_str())),
                remark: latest_remark(&raw.student_remarks, &student.id)
                    .unwrap_or(NO_REMARK)
                    .to_string(),
            }
        })
        .collect()
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    #[serde(rename = "Term 1")]
    Term1,
    #[serde(rename = "Term 2")]
    Term2,
    #[serde(rename = "Term 3")]
    Term3,
}

impl Term {
    pub fn as_str(self) -> &'static str {
        match self {
            Term::Term1 => "Term 1",
            Term::Term2 => "Term 2",
            Term::Term3 => "Term 3",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Term 1" => Ok(Term::Term1),
            "Term 2" => Ok(Term::Term2),
            "Term 3" => Ok(Term::Term3),
            other => Err(format!("unknown term: {other}")),
        }
    }
}

/// A captured, point-in-time export of one school's term data.
///
/// `data` is absent for metadata-only records. The payload is kept as raw
/// JSON so that exports reproduce it exactly; use [`RawBundle::from_value`]
/// to read the collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub school_id: String,
    pub term: Term,
    pub academic_year: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub class_id: String,
    pub present_student_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub student_id: String,
    pub total: Option<f64>,
    /// The full record, handed to the scorer when `total` is missing.
    pub fields: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRemark {
    pub student_id: String,
    pub remark: String,
    pub date_created: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubjectMapping {
    pub class_id: String,
    pub subjects: Vec<String>,
}

pub const COLLECTION_STUDENTS: &str = "students";
pub const COLLECTION_ATTENDANCE: &str = "attendanceRecords";
pub const COLLECTION_ASSESSMENTS: &str = "assessments";
pub const COLLECTION_REMARKS: &str = "studentRemarks";
pub const COLLECTION_CLASS_SUBJECTS: &str = "classSubjects";
pub const COLLECTION_USERS: &str = "users";

/// Collections carried by a bundle that are counted but never reconciled.
pub const PASS_THROUGH_COLLECTIONS: [&str; 7] = [
    "timetables",
    "notices",
    "adminNotifications",
    "activityLogs",
    "payments",
    "studentSkills",
    "adminRemarks",
];

/// Settings snapshot keys, highest precedence first.
pub const SETTINGS_KEYS: [&str; 2] = ["schoolSettings", "schoolConfig"];

/// Typed view over a bundle payload.
///
/// Reading never fails: collections that are absent or not arrays read as
/// empty and missing fields read as empty strings, so older bundles that
/// lack newer fields still reconcile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBundle {
    pub students: Vec<Student>,
    pub attendance_records: Vec<AttendanceRecord>,
    pub assessments: Vec<Assessment>,
    pub student_remarks: Vec<StudentRemark>,
    pub class_subjects: Vec<ClassSubjectMapping>,
    pub users: Vec<Value>,
    pub pass_through: Vec<(&'static str, usize)>,
    pub school_settings: Option<Value>,
}

impl RawBundle {
    pub fn from_value(data: &Value) -> Self {
        let students = records(data, COLLECTION_STUDENTS)
            .map(|r| Student {
                id: str_field(r, "id"),
                name: str_field(r, "name"),
                gender: str_field(r, "gender"),
                class_id: str_field(r, "classId"),
            })
            .collect();
        let attendance_records = records(data, COLLECTION_ATTENDANCE)
            .map(|r| AttendanceRecord {
                class_id: str_field(r, "classId"),
                present_student_ids: str_list(r, "presentStudentIds"),
            })
            .collect();
        let assessments = records(data, COLLECTION_ASSESSMENTS)
            .map(|r| Assessment {
                student_id: str_field(r, "studentId"),
                total: r.get("total").and_then(|v| v.as_f64()),
                fields: r.clone(),
            })
            .collect();
        let student_remarks = records(data, COLLECTION_REMARKS)
            .map(|r| StudentRemark {
                student_id: str_field(r, "studentId"),
                remark: str_field(r, "remark"),
                date_created: r.get("dateCreated").cloned().unwrap_or(Value::Null),
            })
            .collect();
        let class_subjects = records(data, COLLECTION_CLASS_SUBJECTS)
            .map(|r| ClassSubjectMapping {
                class_id: str_field(r, "classId"),
                subjects: str_list(r, "subjects"),
            })
            .collect();
        let users = records(data, COLLECTION_USERS).cloned().collect();
        let pass_through = PASS_THROUGH_COLLECTIONS
            .iter()
            .map(|name| (*name, records(data, name).count()))
            .collect();

        RawBundle {
            students,
            attendance_records,
            assessments,
            student_remarks,
            class_subjects,
            users,
            pass_through,
            school_settings: first_defined(data, &SETTINGS_KEYS).cloned(),
        }
    }

    /// Record counts for every known collection, in a fixed order.
    pub fn collection_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts = vec![
            (COLLECTION_STUDENTS, self.students.len()),
            (COLLECTION_ATTENDANCE, self.attendance_records.len()),
            (COLLECTION_ASSESSMENTS, self.assessments.len()),
            (COLLECTION_REMARKS, self.student_remarks.len()),
            (COLLECTION_CLASS_SUBJECTS, self.class_subjects.len()),
            (COLLECTION_USERS, self.users.len()),
        ];
        counts.extend(self.pass_through.iter().copied());
        counts
    }

    /// Subjects mapped to a class; the first mapping for the class wins.
    pub fn subjects_for(&self, class_id: &str) -> &[String] {
        self.class_subjects
            .iter()
            .find(|m| m.class_id == class_id)
            .map(|m| m.subjects.as_slice())
            .unwrap_or(&[])
    }
}

/// Returns the value under the first key that is present and not null.
pub fn first_defined<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| data.get(*k))
        .find(|v| !v.is_null())
}

fn records<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.as_slice())
        .unwrap_or(&[])
        .iter()
}

fn scalar_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field(record: &Value, key: &str) -> String {
    record.get(key).and_then(scalar_str).unwrap_or_default()
}

fn str_list(record: &Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(scalar_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn term_parses_display_labels() {
        assert_eq!("Term 2".parse::<Term>(), Ok(Term::Term2));
        assert!("Term 4".parse::<Term>().is_err());
        assert_eq!(Term::Term3.to_string(), "Term 3");
    }

    #[test]
    fn missing_and_malformed_collections_read_as_empty() {
        let raw = RawBundle::from_value(&json!({
            "students": [{ "id": "s1" }],
            "attendanceRecords": "not-an-array",
            "assessments": null
        }));
        assert_eq!(raw.students.len(), 1);
        assert_eq!(raw.students[0].class_id, "");
        assert!(raw.attendance_records.is_empty());
        assert!(raw.assessments.is_empty());
        assert!(raw.student_remarks.is_empty());
        assert_eq!(raw.school_settings, None);
    }

    #[test]
    fn school_settings_take_precedence_over_config() {
        let both = RawBundle::from_value(&json!({
            "schoolSettings": { "name": "settings" },
            "schoolConfig": { "name": "config" }
        }));
        assert_eq!(both.school_settings, Some(json!({ "name": "settings" })));

        let config_only = RawBundle::from_value(&json!({
            "schoolSettings": null,
            "schoolConfig": { "name": "config" }
        }));
        assert_eq!(config_only.school_settings, Some(json!({ "name": "config" })));
    }

    #[test]
    fn pass_through_collections_are_counted() {
        let raw = RawBundle::from_value(&json!({
            "notices": [{}, {}],
            "payments": [{}],
            "classSubjects": [
                { "classId": "c_p1", "subjects": ["Maths", "English"] },
                { "classId": "c_p1", "subjects": ["Ignored"] }
            ]
        }));
        let counts = raw.collection_counts();
        assert!(counts.contains(&("notices", 2)));
        assert!(counts.contains(&("payments", 1)));
        assert!(counts.contains(&("timetables", 0)));
        assert_eq!(raw.subjects_for("c_p1"), ["Maths", "English"]);
        assert!(raw.subjects_for("c_p2").is_empty());
    }

    #[test]
    fn numeric_ids_read_as_strings_everywhere() {
        let raw = RawBundle::from_value(&json!({
            "students": [{ "id": 5, "classId": "c_p1" }],
            "attendanceRecords": [{ "classId": "c_p1", "presentStudentIds": [5, "6", null] }]
        }));
        assert_eq!(raw.students[0].id, "5");
        assert_eq!(raw.attendance_records[0].present_student_ids, vec!["5", "6"]);
    }
}

use crate::model::{Bundle, Term};
use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Criteria chosen in the dashboard filter bar. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFilter {
    pub school_id: Option<String>,
    pub term: Option<Term>,
    pub academic_year: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SchoolId,
    Term,
    AcademicYear,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Field::SchoolId => "school_id",
            Field::Term => "term",
            Field::AcademicYear => "academic_year",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Equals { field: Field, value: String },
    /// Half-open `[start_ms, end_ms)` window on the capture timestamp.
    TimestampRange { start_ms: i64, end_ms: i64 },
}

impl Constraint {
    pub fn matches(&self, bundle: &Bundle) -> bool {
        match self {
            Constraint::Equals { field, value } => {
                let actual = match field {
                    Field::SchoolId => bundle.school_id.as_str(),
                    Field::Term => bundle.term.as_str(),
                    Field::AcademicYear => bundle.academic_year.as_str(),
                };
                actual == value
            }
            Constraint::TimestampRange { start_ms, end_ms } => {
                bundle.timestamp >= *start_ms && bundle.timestamp < *end_ms
            }
        }
    }
}

/// AND-only conjunction of constraints. Empty means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub constraints: Vec<Constraint>,
}

impl Predicate {
    pub fn is_unconstrained(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn matches(&self, bundle: &Bundle) -> bool {
        self.constraints.iter().all(|c| c.matches(bundle))
    }
}

/// Builds the store predicate for a filter. Blank strings impose no
/// constraint; `date` covers that calendar day in the given offset.
pub fn build_predicate(filter: &BackupFilter, offset: FixedOffset) -> Predicate {
    let mut constraints = Vec::new();
    if let Some(v) = non_blank(filter.school_id.as_deref()) {
        constraints.push(Constraint::Equals {
            field: Field::SchoolId,
            value: v.to_string(),
        });
    }
    if let Some(term) = filter.term {
        constraints.push(Constraint::Equals {
            field: Field::Term,
            value: term.as_str().to_string(),
        });
    }
    if let Some(v) = non_blank(filter.academic_year.as_deref()) {
        constraints.push(Constraint::Equals {
            field: Field::AcademicYear,
            value: v.to_string(),
        });
    }
    if let Some(date) = filter.date {
        let (start_ms, end_ms) = day_window(date, offset);
        constraints.push(Constraint::TimestampRange { start_ms, end_ms });
    }
    Predicate { constraints }
}

/// Epoch-millisecond bounds of `[00:00:00.000, 24:00:00.000)` for `date`.
pub fn day_window(date: NaiveDate, offset: FixedOffset) -> (i64, i64) {
    let midnight_utc = date.and_time(NaiveTime::default()).and_utc().timestamp_millis();
    let start = midnight_utc - i64::from(offset.local_minus_utc()) * 1000;
    (start, start + Duration::days(1).num_milliseconds())
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

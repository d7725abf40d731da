use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::models::{AttendanceRow, AttendanceSummary, AttendanceTable};
use crate::recover::RecoveredRecord;

/// Status codes counted as present. Any finite number also counts as present,
/// which is a rule of the source registers rather than a general convention.
/// "Finite" is deliberate: `"1e3"` and `"+5"` are present, while `"Infinity"`,
/// `"inf"` and `"NaN"` are absent even though a JavaScript `isNaN` check would
/// accept `"Infinity"`.
pub const PRESENT_CODES: &[&str] = &["P", "Present", "L"];

const NESTED_DAY_KEYS: &[&str] = &["attendance", "days", "attendanceRecords", "dayStatuses"];
const NAME_KEYS: &[&str] = &["name", "studentName", "student", "fullName"];
const IDENTITY_KEYS: &[&str] = &[
    "name",
    "studentName",
    "student",
    "fullName",
    "id",
    "studentId",
    "rollNo",
    "rollNumber",
    "email",
    "class",
    "section",
    "grade",
    "remarks",
    "totalPresent",
    "totalAbsent",
    "attendancePercent",
];

pub fn is_present(status: &str) -> bool {
    if PRESENT_CODES.contains(&status) {
        return true;
    }
    let trimmed = status.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Present/absent counts and percentage over one participant's statuses.
/// An empty input yields the no-data summary, never zeros.
pub fn summarize<I, S>(statuses: I) -> AttendanceSummary
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut present: u32 = 0;
    let mut absent: u32 = 0;

    for status in statuses {
        if is_present(status.as_ref()) {
            present += 1;
        } else {
            absent += 1;
        }
    }

    let total = present + absent;
    if total == 0 {
        return AttendanceSummary::no_data();
    }

    AttendanceSummary {
        total_present: Some(present),
        total_absent: Some(absent),
        attendance_percent: Some(round_2_decimals(present as f64 / total as f64 * 100.0)),
    }
}

/// Summarizes a JSON day map such as `{"1": "P", "2": "A"}`.
pub fn summarize_day_map(days: &Map<String, Value>) -> AttendanceSummary {
    summarize(days.values().map(status_text))
}

pub fn status_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Nested(&'static str),
    Flat,
}

fn detect_layout(entry: &Map<String, Value>) -> Layout {
    NESTED_DAY_KEYS
        .iter()
        .copied()
        .find(|key| entry.get(*key).is_some_and(Value::is_object))
        .map(Layout::Nested)
        .unwrap_or(Layout::Flat)
}

fn day_statuses(entry: &Map<String, Value>) -> Vec<(String, String)> {
    match detect_layout(entry) {
        Layout::Nested(key) => entry
            .get(key)
            .and_then(Value::as_object)
            .map(|days| {
                days.iter()
                    .map(|(day, status)| (day.clone(), status_text(status)))
                    .collect()
            })
            .unwrap_or_default(),
        Layout::Flat => entry
            .iter()
            .filter(|(key, _)| !IDENTITY_KEYS.contains(&key.as_str()))
            .filter(|(_, value)| matches!(value, Value::String(_) | Value::Number(_) | Value::Null))
            .map(|(day, status)| (day.clone(), status_text(status)))
            .collect(),
    }
}

fn entry_name(entry: &Map<String, Value>, index: usize) -> String {
    NAME_KEYS
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(|name| name.trim().to_string())
        .or_else(|| entry.get("id").map(status_text).filter(|id| !id.is_empty()))
        .unwrap_or_else(|| format!("Entry {}", index + 1))
}

// numbers by value first, then text (ISO dates sort correctly as text)
fn compare_days(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Flattens a recovered attendance register into one summarized row per entry.
pub fn flatten(record: &RecoveredRecord) -> AttendanceTable {
    let mut parsed: Vec<(String, Vec<(String, String)>)> = Vec::new();

    for (index, entry) in record.list().iter().enumerate() {
        let Some(fields) = entry.as_object() else {
            log::warn!("skipping attendance entry {index}: expected an object, got {entry}");
            continue;
        };
        parsed.push((entry_name(fields, index), day_statuses(fields)));
    }

    let labels: BTreeSet<&str> = parsed
        .iter()
        .flat_map(|(_, statuses)| statuses.iter().map(|(day, _)| day.as_str()))
        .collect();
    let mut days: Vec<String> = labels.into_iter().map(str::to_string).collect();
    days.sort_by(|a, b| compare_days(a, b));

    let rows = parsed
        .into_iter()
        .map(|(name, statuses)| {
            let aligned = days
                .iter()
                .map(|day| {
                    statuses
                        .iter()
                        .find(|(label, _)| label == day)
                        .map(|(_, status)| status.clone())
                })
                .collect();
            AttendanceRow {
                name,
                statuses: aligned,
                summary: summarize(statuses.iter().map(|(_, status)| status)),
            }
        })
        .collect();

    AttendanceTable { days, rows }
}

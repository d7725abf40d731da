use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Caller-assigned task identity. Numbers and strings are both accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Number(i64),
    Text(String),
}

impl TaskId {
    pub fn generate() -> Self {
        TaskId::Text(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskId::Number(n) => write!(f, "{n}"),
            TaskId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ScheduleTaskInput")]
pub struct ScheduleTask {
    pub id: TaskId,
    pub name: String,
    pub duration_days: i64,
    /// Written only by the recalculator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Caller fields carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Incoming task shape. `durationDays` wins over `duration`; neither, or an
/// unreadable value, means one day.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleTaskInput {
    id: TaskId,
    name: String,
    #[serde(default)]
    duration_days: Option<Value>,
    #[serde(default)]
    duration: Option<Value>,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<ScheduleTaskInput> for ScheduleTask {
    fn from(input: ScheduleTaskInput) -> Self {
        let duration_days = input
            .duration_days
            .or(input.duration)
            .map(|value| crate::schedule::duration_from_value(&value))
            .unwrap_or(1);
        Self {
            id: input.id,
            name: input.name,
            duration_days,
            start_date: input.start_date,
            end_date: input.end_date,
            extra: input.extra,
        }
    }
}

impl ScheduleTask {
    pub fn new(id: TaskId, name: impl Into<String>, duration_days: i64) -> Self {
        Self {
            id,
            name: name.into(),
            duration_days,
            start_date: None,
            end_date: None,
            extra: Map::new(),
        }
    }
}

/// `None` in any field is the no-data marker, distinct from a recorded zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_present: Option<u32>,
    pub total_absent: Option<u32>,
    pub attendance_percent: Option<f64>,
}

impl AttendanceSummary {
    pub fn no_data() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        self.attendance_percent.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRow {
    pub name: String,
    /// Statuses aligned with `AttendanceTable::days`; `None` where the day is absent from the entry.
    pub statuses: Vec<Option<String>>,
    pub summary: AttendanceSummary,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AttendanceTable {
    pub days: Vec<String>,
    pub rows: Vec<AttendanceRow>,
}

use std::io::Read;
use std::sync::OnceLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{ScheduleTask, TaskId};
use crate::recover::RecoveredRecord;

const NAME_KEYS: &[&str] = &["name", "title", "task", "taskName"];
const DURATION_KEYS: &[&str] = &["durationDays", "duration", "days", "estimatedDuration"];

/// Lays tasks out back to back from `project_start`, in list order.
///
/// Durations below one day are clamped to one. Dates supplied by the caller
/// are overwritten; nothing else about a task changes.
pub fn recalculate(tasks: &[ScheduleTask], project_start: NaiveDate) -> Vec<ScheduleTask> {
    let mut cursor = project_start;

    tasks
        .iter()
        .map(|task| {
            let days = task.duration_days.max(1);
            let end = cursor
                .checked_add_days(Days::new((days - 1) as u64))
                .unwrap_or(NaiveDate::MAX);

            let mut scheduled = task.clone();
            scheduled.duration_days = days;
            scheduled.start_date = Some(cursor);
            scheduled.end_date = Some(end);

            cursor = end.succ_opt().unwrap_or(NaiveDate::MAX);
            scheduled
        })
        .collect()
}

pub fn project_end(tasks: &[ScheduleTask]) -> Option<NaiveDate> {
    tasks.last().and_then(|task| task.end_date)
}

fn leading_duration() -> &'static Regex {
    static LEADING: OnceLock<Regex> = OnceLock::new();
    LEADING.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*([A-Za-z]+)?").expect("leading duration pattern is valid")
    })
}

fn any_integer() -> &'static Regex {
    static INTEGER: OnceLock<Regex> = OnceLock::new();
    INTEGER.get_or_init(|| Regex::new(r"\d+").expect("integer pattern is valid"))
}

/// Converts free-text durations such as "2 weeks" or "3 days" into days.
pub fn normalize_duration(text: &str) -> i64 {
    if let Some(caps) = leading_duration().captures(text) {
        let unit = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        if let Ok(count) = caps[1].parse::<i64>() {
            if unit.contains("week") {
                return count.saturating_mul(7);
            }
            if unit.contains("day") {
                return count;
            }
        }
    }

    any_integer()
        .find(text)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(1)
}

/// Numbers are taken as days (fractions truncated), strings go through
/// [`normalize_duration`], anything else is one day.
pub fn duration_from_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(1),
        Value::String(s) => normalize_duration(s),
        _ => 1,
    }
}

fn task_id_from_value(value: Option<&Value>) -> TaskId {
    match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) => TaskId::Number(id),
            None => TaskId::Text(n.to_string()),
        },
        Some(Value::String(s)) if !s.trim().is_empty() => TaskId::Text(s.trim().to_string()),
        _ => TaskId::generate(),
    }
}

fn first_present<'a>(entry: &'a Map<String, Value>, keys: &[&str]) -> Option<(&'a str, &'a Value)> {
    keys.iter()
        .find_map(|key| entry.get_key_value(*key))
        .map(|(k, v)| (k.as_str(), v))
}

/// Builds tasks from a recovered project plan. Entries may be objects or bare
/// task names; other entries are skipped.
pub fn tasks_from_record(record: &RecoveredRecord) -> Vec<ScheduleTask> {
    let mut tasks = Vec::new();

    for (index, entry) in record.list().iter().enumerate() {
        match entry {
            Value::Object(fields) => {
                let name_field = first_present(fields, NAME_KEYS);
                let duration_field = first_present(fields, DURATION_KEYS);

                let name = name_field
                    .and_then(|(_, v)| v.as_str())
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|| format!("Task {}", index + 1));
                let duration_days = duration_field.map(|(_, v)| duration_from_value(v)).unwrap_or(1);

                let consumed: Vec<&str> = ["id", "startDate", "endDate"]
                    .into_iter()
                    .chain(name_field.map(|(k, _)| k))
                    .chain(duration_field.map(|(k, _)| k))
                    .collect();
                let extra: Map<String, Value> = fields
                    .iter()
                    .filter(|(k, _)| !consumed.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();

                let mut task = ScheduleTask::new(task_id_from_value(fields.get("id")), name, duration_days);
                task.extra = extra;
                tasks.push(task);
            }
            Value::String(name) => {
                tasks.push(ScheduleTask::new(TaskId::generate(), name.trim(), 1));
            }
            other => {
                log::warn!("skipping task entry {index} that is neither an object nor a name: {other}");
            }
        }
    }

    tasks
}

pub fn tasks_from_csv<R: Read>(reader: R) -> anyhow::Result<Vec<ScheduleTask>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        name: String,
        duration: String,
        #[serde(default)]
        id: Option<String>,
    }

    let mut reader = csv::Reader::from_reader(reader);
    let mut tasks = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let id = match row.id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<i64>()
                .map(TaskId::Number)
                .unwrap_or_else(|_| TaskId::Text(raw.to_string())),
            _ => TaskId::generate(),
        };
        tasks.push(ScheduleTask::new(id, row.name.trim(), normalize_duration(&row.duration)));
    }

    Ok(tasks)
}

pub fn add_task(
    mut tasks: Vec<ScheduleTask>,
    task: ScheduleTask,
    project_start: NaiveDate,
) -> Vec<ScheduleTask> {
    tasks.push(task);
    recalculate(&tasks, project_start)
}

pub fn remove_task(
    mut tasks: Vec<ScheduleTask>,
    id: &TaskId,
    project_start: NaiveDate,
) -> Vec<ScheduleTask> {
    tasks.retain(|task| &task.id != id);
    recalculate(&tasks, project_start)
}

pub fn set_duration(
    mut tasks: Vec<ScheduleTask>,
    id: &TaskId,
    duration_days: i64,
    project_start: NaiveDate,
) -> Vec<ScheduleTask> {
    match tasks.iter_mut().find(|task| &task.id == id) {
        Some(task) => task.duration_days = duration_days,
        None => log::debug!("no task {id} to update"),
    }
    recalculate(&tasks, project_start)
}

pub fn rename_task(
    mut tasks: Vec<ScheduleTask>,
    id: &TaskId,
    name: &str,
    project_start: NaiveDate,
) -> Vec<ScheduleTask> {
    match tasks.iter_mut().find(|task| &task.id == id) {
        Some(task) => task.name = name.to_string(),
        None => log::debug!("no task {id} to rename"),
    }
    recalculate(&tasks, project_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recover::recover_default;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_tasks() -> Vec<ScheduleTask> {
        vec![
            ScheduleTask::new(TaskId::Number(1), "Research", 3),
            ScheduleTask::new(TaskId::Number(2), "Prototype", 0),
            ScheduleTask::new(TaskId::Text("t3".to_string()), "Present", -4),
            ScheduleTask::new(TaskId::Number(4), "Reflect", 7),
        ]
    }

    #[test]
    fn tasks_are_laid_out_back_to_back() {
        let start = date(2026, 2, 27);
        let scheduled = recalculate(&sample_tasks(), start);

        assert_eq!(scheduled[0].start_date, Some(start));
        assert_eq!(scheduled[0].end_date, Some(date(2026, 3, 1)));
        for pair in scheduled.windows(2) {
            let prev_end = pair[0].end_date.unwrap();
            assert_eq!(pair[1].start_date, prev_end.succ_opt());
        }
        assert_eq!(project_end(&scheduled), Some(date(2026, 3, 10)));
    }

    #[test]
    fn durations_are_clamped_to_one_day() {
        let tasks = sample_tasks();
        let scheduled = recalculate(&tasks, date(2026, 1, 5));
        for (input, output) in tasks.iter().zip(&scheduled) {
            let span = (output.end_date.unwrap() - output.start_date.unwrap()).num_days() + 1;
            assert_eq!(span, input.duration_days.max(1));
            assert_eq!(output.duration_days, input.duration_days.max(1));
            assert_eq!(output.id, input.id);
        }
    }

    #[test]
    fn recalculation_is_deterministic_and_ignores_stale_dates() {
        let start = date(2026, 9, 1);
        let once = recalculate(&sample_tasks(), start);
        let twice = recalculate(&once, start);
        assert_eq!(once, recalculate(&sample_tasks(), start));
        assert_eq!(once, twice);

        let moved = recalculate(&once, date(2026, 9, 8));
        assert_eq!(moved[0].start_date, Some(date(2026, 9, 8)));
    }

    #[test]
    fn empty_list_stays_empty() {
        assert!(recalculate(&[], date(2026, 1, 1)).is_empty());
        assert_eq!(project_end(&[]), None);
    }

    #[test]
    fn duration_text_is_normalized() {
        assert_eq!(normalize_duration("3 weeks"), 21);
        assert_eq!(normalize_duration("10 days"), 10);
        assert_eq!(normalize_duration("approximately 4"), 4);
        assert_eq!(normalize_duration("tbd"), 1);
        assert_eq!(normalize_duration("2 Weeks"), 14);
        assert_eq!(normalize_duration("1 week 2 days"), 7);
        assert_eq!(normalize_duration("6 months"), 6);
        assert_eq!(normalize_duration(""), 1);
    }

    #[test]
    fn normalization_is_idempotent_on_numbers() {
        for days in [1, 5, 21, 365] {
            let once = normalize_duration(&days.to_string());
            assert_eq!(once, days);
            assert_eq!(normalize_duration(&once.to_string()), once);
        }
        assert_eq!(duration_from_value(&serde_json::json!(12)), 12);
        assert_eq!(duration_from_value(&serde_json::json!(2.9)), 2);
        assert_eq!(duration_from_value(&serde_json::json!(null)), 1);
    }

    #[test]
    fn tasks_are_built_from_recovered_plans() {
        let text = r#"Plan below
```json
{"tasks": [
  {"id": 7, "title": "Interview a local expert", "duration": "1 week", "owner": "Sam"},
  {"name": "Build a model", "durationDays": 4},
  "Share findings",
  42
]}
```"#;
        let record = recover_default(text).unwrap();
        let tasks = tasks_from_record(&record);

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, TaskId::Number(7));
        assert_eq!(tasks[0].name, "Interview a local expert");
        assert_eq!(tasks[0].duration_days, 7);
        assert_eq!(tasks[0].extra.get("owner"), Some(&serde_json::json!("Sam")));
        assert!(!tasks[0].extra.contains_key("title"));
        assert_eq!(tasks[1].duration_days, 4);
        assert!(matches!(tasks[1].id, TaskId::Text(_)));
        assert_eq!(tasks[2].name, "Share findings");
        assert_eq!(tasks[2].duration_days, 1);
    }

    #[test]
    fn tasks_are_read_from_csv() {
        let data = "name,duration,id\nResearch,2 weeks,1\nPresent,3 days,\nReflect,tbd,wrap-up\n";
        let tasks = tasks_from_csv(data.as_bytes()).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, TaskId::Number(1));
        assert_eq!(tasks[0].duration_days, 14);
        assert_eq!(tasks[1].duration_days, 3);
        assert_eq!(tasks[2].id, TaskId::Text("wrap-up".to_string()));
        assert_eq!(tasks[2].duration_days, 1);
    }

    #[test]
    fn edits_always_return_fresh_dates() {
        let start = date(2026, 4, 6);
        let tasks = recalculate(&sample_tasks(), start);

        let tasks = set_duration(tasks, &TaskId::Number(1), 5, start);
        assert_eq!(tasks[0].end_date, Some(date(2026, 4, 10)));
        assert_eq!(tasks[1].start_date, Some(date(2026, 4, 11)));

        let tasks = remove_task(tasks, &TaskId::Number(1), start);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].name, "Prototype");
        assert_eq!(tasks[0].start_date, Some(start));

        let tasks = add_task(tasks, ScheduleTask::new(TaskId::Number(9), "Exhibit", 2), start);
        assert_eq!(tasks.last().unwrap().end_date, Some(date(2026, 4, 16)));

        let tasks = rename_task(tasks, &TaskId::Number(9), "Gallery walk", start);
        assert_eq!(tasks.last().unwrap().name, "Gallery walk");

        let unchanged = set_duration(tasks.clone(), &TaskId::Number(404), 10, start);
        assert_eq!(unchanged, tasks);
    }

    #[test]
    fn serialized_tasks_accept_free_text_durations() {
        let task: ScheduleTask = serde_json::from_str(
            r#"{"id": "a", "name": "Draft", "duration": "2 weeks", "room": 12}"#,
        )
        .unwrap();
        assert_eq!(task.duration_days, 14);
        assert_eq!(task.extra.get("room"), Some(&serde_json::json!(12)));

        let scheduled = recalculate(&[task], date(2026, 1, 1));
        let json = serde_json::to_value(&scheduled[0]).unwrap();
        assert_eq!(json["startDate"], "2026-01-01");
        assert_eq!(json["endDate"], "2026-01-14");
        assert_eq!(json["durationDays"], 14);
    }

    #[test]
    fn serialized_tasks_without_usable_durations_default_to_one_day() {
        let missing: ScheduleTask = serde_json::from_str(r#"{"id": 1, "name": "Draft"}"#).unwrap();
        assert_eq!(missing.duration_days, 1);

        let blank: ScheduleTask =
            serde_json::from_str(r#"{"id": 2, "name": "Draft", "durationDays": ""}"#).unwrap();
        assert_eq!(blank.duration_days, 1);

        let both: ScheduleTask = serde_json::from_str(
            r#"{"id": 3, "name": "Draft", "duration": "2 weeks", "durationDays": 3}"#,
        )
        .unwrap();
        assert_eq!(both.duration_days, 3);
        assert!(both.extra.is_empty());

        let only_text: ScheduleTask =
            serde_json::from_str(r#"{"id": 4, "name": "Draft", "duration": "1 week"}"#).unwrap();
        assert_eq!(only_text.duration_days, 7);
    }
}

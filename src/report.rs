use std::cmp::Ordering;
use std::fmt::Write as _;
use std::io;

use chrono::NaiveDate;

use crate::models::{AttendanceRow, AttendanceSummary, AttendanceTable, ScheduleTask};
use crate::schedule;

fn format_percent(summary: &AttendanceSummary) -> String {
    summary
        .attendance_percent
        .map(|p| format!("{p:.2}"))
        .unwrap_or_default()
}

fn format_count(count: Option<u32>) -> String {
    count.map(|c| c.to_string()).unwrap_or_default()
}

pub fn build_schedule_report(title: Option<&str>, start: NaiveDate, tasks: &[ScheduleTask]) -> String {
    let mut output = String::new();
    let title = title.unwrap_or("Project plan");

    let _ = writeln!(output, "# {title}");
    let _ = writeln!(output, "Starts {start}");
    let _ = writeln!(output);

    if tasks.is_empty() {
        let _ = writeln!(output, "No tasks planned yet.");
        return output;
    }

    let _ = writeln!(output, "| # | Task | Days | Start | End |");
    let _ = writeln!(output, "|---|------|------|-------|-----|");
    for (index, task) in tasks.iter().enumerate() {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            index + 1,
            task.name,
            task.duration_days,
            task.start_date.map(|d| d.to_string()).unwrap_or_default(),
            task.end_date.map(|d| d.to_string()).unwrap_or_default(),
        );
    }

    let total_days: i64 = tasks.iter().map(|task| task.duration_days.max(1)).sum();
    let _ = writeln!(output);
    match schedule::project_end(tasks) {
        Some(end) => {
            let _ = writeln!(output, "Finishes {end} after {total_days} days.");
        }
        None => {
            let _ = writeln!(output, "Planned length {total_days} days.");
        }
    }

    output
}

/// Lowest attendance first; rows without data go last.
fn rank_rows(rows: &[AttendanceRow]) -> Vec<&AttendanceRow> {
    let mut ranked: Vec<&AttendanceRow> = rows.iter().collect();
    ranked.sort_by(|a, b| {
        let by_percent = match (a.summary.attendance_percent, b.summary.attendance_percent) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_percent.then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

pub fn build_attendance_report(table: &AttendanceTable) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Summary");
    let _ = writeln!(
        output,
        "{} participants across {} recorded days",
        table.rows.len(),
        table.days.len()
    );
    let _ = writeln!(output);

    if table.rows.is_empty() {
        let _ = writeln!(output, "No attendance entries found.");
        return output;
    }

    for row in rank_rows(&table.rows) {
        let summary = &row.summary;
        match (summary.total_present, summary.total_absent, summary.attendance_percent) {
            (Some(present), Some(absent), Some(percent)) => {
                let _ = writeln!(
                    output,
                    "- {}: {present} present, {absent} absent ({percent:.2}%)",
                    row.name
                );
            }
            _ => {
                let _ = writeln!(output, "- {}: no attendance recorded", row.name);
            }
        }
    }

    output
}

/// One CSV row per participant; no-data summaries leave their cells empty.
pub fn write_attendance_csv<W: io::Write>(writer: W, table: &AttendanceTable) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["name".to_string()];
    header.extend(table.days.iter().cloned());
    header.extend(["totalPresent", "totalAbsent", "attendancePercent"].map(String::from));
    csv.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.name.clone()];
        record.extend(row.statuses.iter().map(|status| status.clone().unwrap_or_default()));
        record.push(format_count(row.summary.total_present));
        record.push(format_count(row.summary.total_absent));
        record.push(format_percent(&row.summary));
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::summarize;
    use crate::models::TaskId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(name: &str, statuses: &[Option<&str>]) -> AttendanceRow {
        AttendanceRow {
            name: name.to_string(),
            statuses: statuses.iter().map(|s| s.map(str::to_string)).collect(),
            summary: summarize(statuses.iter().flatten()),
        }
    }

    fn sample_table() -> AttendanceTable {
        AttendanceTable {
            days: vec!["1".to_string(), "2".to_string()],
            rows: vec![
                row("Sam", &[Some("P"), Some("P")]),
                row("Ana", &[Some("A"), Some("P")]),
                row("Kai", &[None, None]),
            ],
        }
    }

    #[test]
    fn schedule_report_lists_tasks_and_end_date() {
        let start = date(2026, 5, 4);
        let tasks = schedule::recalculate(
            &[
                ScheduleTask::new(TaskId::Number(1), "Research", 2),
                ScheduleTask::new(TaskId::Number(2), "Build", 3),
            ],
            start,
        );
        let report = build_schedule_report(Some("Bridge project"), start, &tasks);

        assert!(report.starts_with("# Bridge project\n"));
        assert!(report.contains("| 1 | Research | 2 | 2026-05-04 | 2026-05-05 |"));
        assert!(report.contains("| 2 | Build | 3 | 2026-05-06 | 2026-05-08 |"));
        assert!(report.contains("Finishes 2026-05-08 after 5 days."));
    }

    #[test]
    fn empty_schedule_report_says_so() {
        let report = build_schedule_report(None, date(2026, 1, 1), &[]);
        assert!(report.contains("# Project plan"));
        assert!(report.contains("No tasks planned yet."));
    }

    #[test]
    fn attendance_report_ranks_lowest_first_and_no_data_last() {
        let report = build_attendance_report(&sample_table());
        let ana = report.find("- Ana: 1 present, 1 absent (50.00%)").unwrap();
        let sam = report.find("- Sam: 2 present, 0 absent (100.00%)").unwrap();
        let kai = report.find("- Kai: no attendance recorded").unwrap();
        assert!(ana < sam && sam < kai);
    }

    #[test]
    fn csv_export_leaves_no_data_cells_empty() {
        let mut buffer = Vec::new();
        write_attendance_csv(&mut buffer, &sample_table()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "name,1,2,totalPresent,totalAbsent,attendancePercent");
        assert_eq!(lines[1], "Sam,P,P,2,0,100.00");
        assert_eq!(lines[2], "Ana,A,P,1,1,50.00");
        assert_eq!(lines[3], "Kai,,,,,");
    }
}

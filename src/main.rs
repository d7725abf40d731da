use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};

use groupscholar_project_planner::config::PlannerConfig;
use groupscholar_project_planner::retry::{self, RetryPolicy};
use groupscholar_project_planner::{attendance, curriculum, recover, report, schedule};

#[derive(Parser)]
#[command(name = "project-planner")]
#[command(about = "Recover model output, schedule project tasks and summarize attendance", long_about = None)]
struct Cli {
    /// Recognized list keys (comma separated or repeated); overrides PLANNER_RECOGNIZED_KEYS
    #[arg(long = "key", global = true)]
    keys: Vec<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and repair the JSON payload in raw model output
    Recover {
        /// File holding the raw response; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Summarize an attendance register recovered from model output
    Attendance {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Write the flattened register as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Lay out project tasks back to back from a start date
    Schedule {
        /// Raw model output or JSON plan; `.csv` files are read as name,duration[,id]
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        title: Option<String>,
        /// Write a markdown report instead of printing JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Normalize a free-text duration such as "2 weeks" to days
    Duration { text: String },
    /// Edit a curriculum document at a dotted path
    #[command(group(
        ArgGroup::new("edit")
            .args(["set", "remove"])
            .required(true)
            .multiple(false)
    ))]
    CurriculumEdit {
        #[arg(long)]
        doc: PathBuf,
        #[arg(long)]
        path: String,
        /// New value as JSON; bare text is stored as a string
        #[arg(long)]
        set: Option<String>,
        #[arg(long)]
        remove: bool,
        /// Defaults to rewriting the document in place
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

async fn read_input(input: Option<&Path>, policy: &RetryPolicy) -> anyhow::Result<String> {
    match input {
        Some(path) => retry::retry_with_backoff_if(
            policy,
            |_| tokio::fs::read_to_string(path),
            retry::is_transient_io,
        )
        .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = PlannerConfig::from_env()?.with_keys(&cli.keys);
    log::debug!("recognized keys: {:?}", config.recognized_keys);

    match cli.command {
        Commands::Recover { input } => {
            let text = read_input(input.as_deref(), &config.read_retry).await?;
            let record = recover::recover(&text, &config.recognized_keys)
                .context("could not extract data from the response")?;
            println!("{}", serde_json::to_string_pretty(&record.into_value())?);
        }
        Commands::Attendance { input, csv } => {
            let text = read_input(input.as_deref(), &config.read_retry).await?;
            let record = recover::recover(&text, &config.recognized_keys)
                .context("could not extract attendance data from the response")?;
            let table = attendance::flatten(&record);

            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_attendance_csv(file, &table)?;
                log::info!("wrote {} attendance rows to {}", table.rows.len(), path.display());
            }
            print!("{}", report::build_attendance_report(&table));
        }
        Commands::Schedule {
            input,
            start,
            title,
            out,
        } => {
            let is_csv = input
                .as_deref()
                .and_then(Path::extension)
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            let text = read_input(input.as_deref(), &config.read_retry).await?;
            let tasks = if is_csv {
                schedule::tasks_from_csv(text.as_bytes()).context("failed to read task CSV")?
            } else {
                let record = recover::recover(&text, &config.recognized_keys)
                    .context("could not extract a task plan from the response")?;
                schedule::tasks_from_record(&record)
            };
            let tasks = schedule::recalculate(&tasks, start);

            match out {
                Some(path) => {
                    let report = report::build_schedule_report(title.as_deref(), start, &tasks);
                    std::fs::write(&path, report)?;
                    println!("Schedule written to {}.", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&tasks)?),
            }
        }
        Commands::Duration { text } => {
            println!("{}", schedule::normalize_duration(&text));
        }
        Commands::CurriculumEdit {
            doc,
            path,
            set,
            remove,
            out,
        } => {
            let raw = read_input(Some(doc.as_path()), &config.read_retry).await?;
            let document: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", doc.display()))?;
            let segments = curriculum::parse_path(&path);

            let edited = match (set, remove) {
                (Some(value), false) => {
                    let value = serde_json::from_str(&value)
                        .unwrap_or(serde_json::Value::String(value));
                    curriculum::set_at(&document, &segments, value)?
                }
                _ => curriculum::remove_at(&document, &segments)?,
            };

            let target = out.unwrap_or(doc);
            std::fs::write(&target, serde_json::to_string_pretty(&edited)?)?;
            println!("Updated {} at `{path}`.", target.display());
        }
    }

    Ok(())
}

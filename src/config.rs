use std::time::Duration;

use anyhow::Context;

use crate::retry::RetryPolicy;

/// Top-level list keys accepted from model output when none are configured.
pub const DEFAULT_RECOGNIZED_KEYS: &[&str] = &[
    "entries", "records", "items", "students", "rows", "tasks", "projects",
];

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub recognized_keys: Vec<String>,
    pub read_retry: RetryPolicy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            recognized_keys: DEFAULT_RECOGNIZED_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            read_retry: RetryPolicy::default(),
        }
    }
}

impl PlannerConfig {
    /// Reads `PLANNER_RECOGNIZED_KEYS` (comma separated), `PLANNER_READ_ATTEMPTS`
    /// and `PLANNER_RETRY_DELAY_MS`, falling back to defaults for unset variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("PLANNER_RECOGNIZED_KEYS") {
            let keys = split_keys(&raw);
            if !keys.is_empty() {
                config.recognized_keys = keys;
            }
        }

        if let Some(raw) = lookup("PLANNER_READ_ATTEMPTS") {
            let attempts: u32 = raw
                .trim()
                .parse()
                .context("PLANNER_READ_ATTEMPTS must be a positive integer")?;
            config.read_retry.max_attempts = attempts.max(1);
        }

        if let Some(raw) = lookup("PLANNER_RETRY_DELAY_MS") {
            let millis: u64 = raw
                .trim()
                .parse()
                .context("PLANNER_RETRY_DELAY_MS must be a whole number of milliseconds")?;
            config.read_retry.initial_delay = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// CLI `--key` flags replace the configured whitelist when given.
    pub fn with_keys(mut self, keys: &[String]) -> Self {
        let keys: Vec<String> = keys.iter().flat_map(|k| split_keys(k)).collect();
        if !keys.is_empty() {
            self.recognized_keys = keys;
        }
        self
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub mod attendance;
pub mod config;
pub mod curriculum;
pub mod models;
pub mod recover;
pub mod report;
pub mod retry;
pub mod schedule;

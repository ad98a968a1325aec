//! Scheduled measurement jobs.
//!
//! A run picks the targets configured for the weekday, walks each one to its
//! volume depth, measures what it finds and bulk indexes the resulting
//! documents, one job after the other.

mod runner;
mod schedule;

pub use runner::{collect_records, CollectStats, JobRunner, RunSummary};
pub use schedule::{plan, DayPlan};

//! Day-of-week job selection.

use chrono::Weekday;

use crate::config::{parse_weekday, Config, Target};

/// What a given weekday asks for.
#[derive(Debug, PartialEq)]
pub enum DayPlan<'a> {
    /// The weekday is listed in `skipDays`.
    Skipped,
    /// No job entry matches the weekday.
    NoJobs,
    /// Targets to run, in configuration order.
    Run(Vec<&'a Target>),
}

/// Select the targets for `weekday`.
///
/// `Everyday` entries and entries naming the weekday both contribute, in the
/// order they appear in the file.
#[must_use]
pub fn plan(config: &Config, weekday: Weekday) -> DayPlan<'_> {
    if config
        .skip_days
        .iter()
        .any(|day| parse_weekday(day) == Some(weekday))
    {
        return DayPlan::Skipped;
    }

    let targets: Vec<&Target> = config
        .jobs
        .iter()
        .filter(|day| day.matches(weekday))
        .flat_map(|day| day.targets.iter())
        .collect();

    if targets.is_empty() {
        DayPlan::NoJobs
    } else {
        DayPlan::Run(targets)
    }
}

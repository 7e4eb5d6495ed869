// src/dag/calendar.rs

//! Planned dates for template tasks.
//!
//! A task without incoming edges starts on the project start date. A task
//! with edges starts on the latest per-edge candidate:
//!
//! - `FS` (and `FF`/`SF`, which are scheduled like `FS`): predecessor end
//!   stepped forward by the lag.
//! - `SS`: predecessor start stepped forward by the lag.
//!
//! The end date is the start stepped forward by `estimated_days`. All
//! stepping goes through [`add_work_days`].

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use tracing::debug;

use crate::dag::graph::TemplateGraph;
use crate::errors::{Result, WorkflowError};
use crate::model::ProjectTemplate;
use crate::types::DependencyType;

/// Advance `date` by `n` days.
///
/// With `skip_weekends`, Saturdays and Sundays do not count towards `n` and
/// are never landed on by a step. `n <= 0` returns `date` unchanged.
pub fn add_work_days(date: NaiveDate, n: i64, skip_weekends: bool) -> NaiveDate {
    let mut current = date;
    let mut remaining = n;

    while remaining > 0 {
        current = match current.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return current,
        };
        if skip_weekends && is_weekend(current) {
            continue;
        }
        remaining -= 1;
    }

    current
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Planned start/end of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Memoising calculator over one template.
#[derive(Debug)]
pub struct CalendarCalculator<'a> {
    graph: TemplateGraph,
    estimates: HashMap<&'a str, u32>,
    project_start: NaiveDate,
    skip_weekends: bool,
    starts: HashMap<String, NaiveDate>,
    /// Codes whose start is currently being computed; re-entering one means
    /// the edges form a cycle.
    visiting: HashSet<String>,
}

impl<'a> CalendarCalculator<'a> {
    pub fn new(template: &'a ProjectTemplate, project_start: NaiveDate, skip_weekends: bool) -> Self {
        let estimates = template
            .tasks
            .iter()
            .map(|t| (t.code.as_str(), t.estimated_days))
            .collect();

        Self {
            graph: TemplateGraph::from_template(template),
            estimates,
            project_start,
            skip_weekends,
            starts: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// Planned start of `code`.
    pub fn start_of(&mut self, code: &str) -> Result<NaiveDate> {
        if let Some(start) = self.starts.get(code) {
            return Ok(*start);
        }
        if !self.graph.contains(code) {
            return Err(WorkflowError::ConfigError(format!(
                "calendar: unknown task code '{code}'"
            )));
        }
        if !self.visiting.insert(code.to_string()) {
            return Err(WorkflowError::DagCycle(format!(
                "cycle detected while scheduling task '{code}'"
            )));
        }

        let deps = self.graph.dependencies_of(code).to_vec();
        let mut start: Option<NaiveDate> = None;

        for dep in deps {
            let lag = i64::from(dep.lag_days);
            let candidate = match dep.dep_type {
                DependencyType::StartToStart => {
                    let pred_start = self.start_of(&dep.depends_on_code)?;
                    add_work_days(pred_start, lag, self.skip_weekends)
                }
                DependencyType::FinishToStart
                | DependencyType::FinishToFinish
                | DependencyType::StartToFinish => {
                    let pred_end = self.end_of(&dep.depends_on_code)?;
                    add_work_days(pred_end, lag, self.skip_weekends)
                }
            };
            start = Some(start.map_or(candidate, |s| s.max(candidate)));
        }

        let start = start.unwrap_or(self.project_start);
        self.visiting.remove(code);
        self.starts.insert(code.to_string(), start);
        debug!(task = %code, %start, "calendar: computed start");
        Ok(start)
    }

    /// Planned end of `code`.
    pub fn end_of(&mut self, code: &str) -> Result<NaiveDate> {
        let start = self.start_of(code)?;
        let days = self.estimates.get(code).copied().unwrap_or(0);
        Ok(add_work_days(start, i64::from(days), self.skip_weekends))
    }

    /// Windows for every task of the template, keyed by code.
    pub fn compute(mut self) -> Result<BTreeMap<String, TaskWindow>> {
        let codes: Vec<String> = self.graph.tasks().map(str::to_string).collect();
        let mut windows = BTreeMap::new();

        for code in codes {
            let start = self.start_of(&code)?;
            let end = self.end_of(&code)?;
            windows.insert(code, TaskWindow { start, end });
        }

        Ok(windows)
    }
}

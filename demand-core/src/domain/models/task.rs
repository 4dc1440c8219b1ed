use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use strum::{Display, EnumString};
use time::Date;

use crate::domain::DemandError;

time::serde::format_description!(pub(crate) iso_date, Date, "[year]-[month]-[day]");

/// Status of a Build-phase task. Also the only key used to color task bars.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum TaskStatus {
    #[strum(to_string = "Planned", serialize = "todo")]
    Planned,
    #[serde(rename = "In Progress", alias = "InProgress", alias = "in_progress")]
    #[strum(
        to_string = "In Progress",
        serialize = "InProgress",
        serialize = "in_progress",
        serialize = "in-progress"
    )]
    InProgress,
    #[strum(to_string = "Completed", serialize = "done")]
    Completed,
    #[strum(to_string = "Blocked")]
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Completed,
        TaskStatus::InProgress,
        TaskStatus::Planned,
        TaskStatus::Blocked,
    ];
}

/// A schedulable unit of work within the Build phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub task_id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub assigned_to: String,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub progress: u8,
    pub dependencies: Vec<String>,
}

/// What [`Task::normalize`] had to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskAdjustments {
    pub clamped_end_date: bool,
    pub forced_progress: bool,
}

impl TaskAdjustments {
    pub fn any(&self) -> bool {
        self.clamped_end_date || self.forced_progress
    }
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        name: impl Into<String>,
        start: Date,
        end: Date,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: String::new(),
            status: TaskStatus::Planned,
            assigned_to: String::new(),
            start_date: start,
            end_date: end,
            progress: 0,
            dependencies: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_assignee(mut self, assigned_to: impl Into<String>) -> Self {
        self.assigned_to = assigned_to.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Whole days between start and end; never negative after [`Task::normalize`].
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).whole_days()
    }

    /// Enforce `end_date >= start_date` and `Completed => progress == 100`.
    pub fn normalize(&mut self) -> TaskAdjustments {
        let mut adjustments = TaskAdjustments::default();
        if self.end_date < self.start_date {
            self.end_date = self.start_date;
            adjustments.clamped_end_date = true;
        }
        if self.progress > 100 {
            self.progress = 100;
        }
        if self.status == TaskStatus::Completed && self.progress != 100 {
            self.progress = 100;
            adjustments.forced_progress = true;
        }
        adjustments
    }

    /// Canonical stored form, including the derived `duration_days`.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("duration_days".to_string(), Value::from(self.duration_days()));
        }
        value
    }

    /// Parse a stored task record leniently.
    ///
    /// Ids may be strings or numbers, dates may carry a time suffix, an
    /// unknown status falls back to `Planned`, and a missing end date means
    /// a same-day task. The stored `duration_days` is ignored. Invariants are
    /// not enforced here; call [`Task::normalize`].
    pub fn from_value(value: &Value) -> Result<Self, DemandError> {
        let record = value
            .as_object()
            .ok_or_else(|| DemandError::validation("task record is not an object"))?;

        let task_id = record
            .get("task_id")
            .and_then(scalar_to_string)
            .ok_or_else(|| DemandError::validation("task record has no task_id"))?;

        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };

        let status = match record.get("status").and_then(Value::as_str) {
            Some(raw) => TaskStatus::from_str(raw.trim()).unwrap_or_else(|_| {
                tracing::warn!(
                    task_id = %task_id,
                    status = raw,
                    "unknown task status, using Planned"
                );
                TaskStatus::Planned
            }),
            None => TaskStatus::Planned,
        };

        let start_date = match record.get("start_date").and_then(Value::as_str) {
            Some(raw) => parse_date(raw).ok_or_else(|| {
                DemandError::validation(format!("task {task_id}: bad start_date {raw:?}"))
            })?,
            None => {
                return Err(DemandError::validation(format!(
                    "task {task_id}: missing start_date"
                )))
            }
        };
        let end_date = match record.get("end_date").and_then(Value::as_str) {
            Some(raw) if !raw.trim().is_empty() => parse_date(raw).ok_or_else(|| {
                DemandError::validation(format!("task {task_id}: bad end_date {raw:?}"))
            })?,
            _ => start_date,
        };

        let progress = record
            .get("progress")
            .and_then(Value::as_f64)
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        let dependencies = match record.get("dependencies") {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
            Some(Value::String(list)) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            task_id,
            name: text("name"),
            description: text("description"),
            status,
            assigned_to: text("assigned_to"),
            start_date,
            end_date,
            progress,
            dependencies,
        })
    }
}

/// Whether a stored record exposes a usable task identifier.
pub fn has_task_id(value: &Value) -> bool {
    record_task_id(value).is_some()
}

/// The `task_id` of a stored record, numbers rendered as text.
pub fn record_task_id(value: &Value) -> Option<String> {
    value.get("task_id").and_then(scalar_to_string)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component.
pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    let day = raw.get(..10)?;
    Date::parse(day, &time::macros::format_description!("[year]-[month]-[day]")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    #[test]
    fn parses_canonical_record() {
        let task = Task::from_value(&json!({
            "task_id": "T2",
            "name": "API",
            "status": "In Progress",
            "assigned_to": "Platform",
            "start_date": "2024-11-20",
            "end_date": "2024-12-05",
            "duration_days": 999,
            "progress": 60,
            "dependencies": ["T1"]
        }))
        .unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.start_date, date!(2024 - 11 - 20));
        assert_eq!(task.duration_days(), 15);
        assert_eq!(task.dependencies, vec!["T1".to_string()]);
    }

    #[test]
    fn lenient_fields() {
        let task = Task::from_value(&json!({
            "task_id": 7,
            "status": "Someday",
            "start_date": "2024-11-20T08:00:00",
            "dependencies": "3, 4"
        }))
        .unwrap();
        assert_eq!(task.task_id, "7");
        assert_eq!(task.status, TaskStatus::Planned);
        assert_eq!(task.end_date, task.start_date);
        assert_eq!(task.dependencies, vec!["3", "4"]);
    }

    #[test]
    fn rejects_unusable_records() {
        assert!(Task::from_value(&json!("Write docs")).is_err());
        assert!(Task::from_value(&json!({"name": "no id"})).is_err());
        assert!(Task::from_value(&json!({"task_id": "T1", "start_date": "soon"})).is_err());
    }

    #[test]
    fn normalize_clamps_and_completes() {
        let mut task = Task::new("T1", "Late", date!(2024 - 11 - 10), date!(2024 - 11 - 01))
            .with_status(TaskStatus::Completed)
            .with_progress(40);
        let adjustments = task.normalize();
        assert!(adjustments.clamped_end_date && adjustments.forced_progress);
        assert_eq!(task.duration_days(), 0);
        assert_eq!(task.progress, 100);
    }

    #[test]
    fn stored_form_carries_derived_duration() {
        let task = Task::new("T1", "Setup", date!(2024 - 11 - 15), date!(2024 - 11 - 22));
        let value = task.to_value();
        assert_eq!(value["duration_days"], json!(7));
        assert_eq!(value["start_date"], json!("2024-11-15"));
        assert_eq!(value["status"], json!("Planned"));
        assert_eq!(Task::from_value(&value).unwrap(), task);
    }

    #[test]
    fn status_display_matches_stored_spelling() {
        assert_eq!(TaskStatus::InProgress.to_string(), "In Progress");
        assert_eq!(TaskStatus::from_str("in-progress").unwrap(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::from_str("BLOCKED").unwrap(), TaskStatus::Blocked);
    }
}

//! Timeline (Gantt) derivation.
//!
//! Turns the Build task list into ordered, colored, dependency-aware bars,
//! or falls back to one bar per lifecycle phase when no detailed tasks
//! exist. Pure: the demand is only read.

use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use time::{Date, Duration};

use crate::config::TimelineSettings;
use crate::domain::models::{iso_date, record_task_id, Demand, Phase, Task, TaskStatus};
use crate::domain::progress::CompletionTable;

/// Bar color for a task status. Owner and team names never affect color.
pub fn status_color(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "#10b981",
        TaskStatus::InProgress => "#f59e0b",
        TaskStatus::Planned => "#3b82f6",
        TaskStatus::Blocked => "#ef4444",
    }
}

pub fn phase_color(phase: Phase) -> &'static str {
    match phase {
        Phase::Ideation => "#FFE5CC",
        Phase::Requirements => "#CCE5FF",
        Phase::Assessment => "#E5CCFF",
        Phase::Design => "#FFCCF2",
        Phase::Build => "#CCFFCC",
        Phase::Validation => "#FFFFCC",
        Phase::Deployment => "#FFD9CC",
        Phase::Implementation => "#CCFFFF",
        Phase::Closing => "#E6E6E6",
    }
}

pub const MILESTONE_COLOR: &str = "#8b0000";

/// Longest phase bar, in days. Longer overrides are clamped.
pub const MAX_PHASE_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timeline {
    /// Nothing to draw yet: no tasks, no phase content, no overrides, no milestones.
    Empty,
    Scheduled(Schedule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineMode {
    Detailed,
    Phases,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schedule {
    pub mode: TimelineMode,
    #[serde(with = "iso_date::option")]
    pub start: Option<Date>,
    #[serde(with = "iso_date::option")]
    pub end: Option<Date>,
    pub total_days: i64,
    pub bars: Vec<ScheduleBar>,
    pub links: Vec<DependencyLink>,
    pub milestones: Vec<MilestoneMarker>,
    /// Task counts and average progress; detailed mode only.
    pub stats: Option<TaskStats>,
    /// Task records that could not be drawn.
    pub rejected: Vec<RejectedTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleBar {
    pub key: String,
    pub label: String,
    pub description: String,
    #[serde(with = "iso_date")]
    pub start: Date,
    #[serde(with = "iso_date")]
    pub end: Date,
    pub duration_days: i64,
    pub color: &'static str,
    pub progress: u8,
    pub status: Option<TaskStatus>,
    pub phase: Option<Phase>,
    pub assigned_to: Option<String>,
    /// Length of the longest chain of resolved predecessors.
    pub depth: usize,
    /// The stored end date preceded the start date and was clamped.
    pub clamped: bool,
}

/// Precedence marker from the end of `from` to the start of `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyLink {
    pub from: String,
    pub to: String,
    #[serde(with = "iso_date")]
    pub from_date: Date,
    #[serde(with = "iso_date")]
    pub to_date: Date,
    /// The predecessor ends after the dependent task starts.
    pub violated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneMarker {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub label: String,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub planned: usize,
    pub blocked: usize,
    pub average_progress: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedTask {
    /// Position in the stored task list.
    pub index: usize,
    pub task_id: Option<String>,
    pub reason: String,
}

/// Derive the schedule for a demand.
pub fn derive(demand: &Demand, settings: &TimelineSettings, table: &CompletionTable) -> Timeline {
    let detailed = demand.has_detailed_tasks();
    if !detailed
        && !demand.phases.has_content()
        && demand.schedule.is_empty()
        && demand.milestones.is_empty()
    {
        return Timeline::Empty;
    }

    let mut schedule = if detailed {
        derive_detailed(demand)
    } else {
        derive_phases(demand, settings, table)
    };
    schedule.milestones = milestone_markers(demand);
    schedule.fill_span();
    Timeline::Scheduled(schedule)
}

fn derive_detailed(demand: &Demand) -> Schedule {
    let mut tasks: Vec<(Task, bool)> = Vec::new();
    let mut rejected = Vec::new();
    let mut seen = HashSet::new();

    for (index, record) in demand.task_records().iter().enumerate() {
        let mut task = match Task::from_value(record) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(demand = %demand.id, index, "skipping task: {e}");
                rejected.push(RejectedTask {
                    index,
                    task_id: record_task_id(record),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !seen.insert(task.task_id.clone()) {
            rejected.push(RejectedTask {
                index,
                task_id: Some(task.task_id.clone()),
                reason: "duplicate task_id".to_string(),
            });
            continue;
        }

        let adjustments = task.normalize();
        if adjustments.clamped_end_date {
            tracing::warn!(
                demand = %demand.id,
                task_id = %task.task_id,
                "task ends before it starts, drawing a zero-length bar"
            );
        }
        tasks.push((task, adjustments.clamped_end_date));
    }

    tasks.sort_by(|(a, _), (b, _)| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });

    let by_id: HashMap<&str, &Task> = tasks
        .iter()
        .map(|(task, _)| (task.task_id.as_str(), task))
        .collect();

    // Resolved predecessors per task; unknown ids and self references dropped.
    let predecessors: HashMap<&str, Vec<&str>> = tasks
        .iter()
        .map(|(task, _)| {
            let deps = task
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|dep| *dep != task.task_id && by_id.contains_key(dep))
                .unique()
                .collect();
            (task.task_id.as_str(), deps)
        })
        .collect();

    let mut links = Vec::new();
    for (task, _) in &tasks {
        for dep in &predecessors[task.task_id.as_str()] {
            let pred = by_id[dep];
            links.push(DependencyLink {
                from: pred.task_id.clone(),
                to: task.task_id.clone(),
                from_date: pred.end_date,
                to_date: task.start_date,
                violated: pred.end_date > task.start_date,
            });
        }
    }

    let mut depths = HashMap::new();
    let bars = tasks
        .iter()
        .map(|(task, clamped)| {
            let depth = chain_depth(
                task.task_id.as_str(),
                &predecessors,
                &mut depths,
                &mut HashSet::new(),
            );
            ScheduleBar {
                key: task.task_id.clone(),
                label: if task.name.is_empty() {
                    task.task_id.clone()
                } else {
                    task.name.clone()
                },
                description: task.description.clone(),
                start: task.start_date,
                end: task.end_date,
                duration_days: task.duration_days(),
                color: status_color(task.status),
                progress: task.progress,
                status: Some(task.status),
                phase: Some(Phase::Build),
                assigned_to: Some(task.assigned_to.clone()).filter(|a| !a.is_empty()),
                depth,
                clamped: *clamped,
            }
        })
        .collect();

    let stats = task_stats(tasks.iter().map(|(task, _)| task));

    Schedule {
        mode: TimelineMode::Detailed,
        start: None,
        end: None,
        total_days: 0,
        bars,
        links,
        milestones: Vec::new(),
        stats: Some(stats),
        rejected,
    }
}

/// Longest predecessor chain ending at `id`. A task already on the current
/// path contributes nothing, so cycles terminate.
fn chain_depth<'a>(
    id: &'a str,
    predecessors: &HashMap<&'a str, Vec<&'a str>>,
    memo: &mut HashMap<&'a str, usize>,
    on_path: &mut HashSet<&'a str>,
) -> usize {
    if let Some(depth) = memo.get(id) {
        return *depth;
    }
    if !on_path.insert(id) {
        return 0;
    }
    let depth = predecessors
        .get(id)
        .map(|preds| {
            preds
                .iter()
                .map(|pred| chain_depth(*pred, predecessors, memo, on_path) + 1)
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    on_path.remove(id);
    memo.insert(id, depth);
    depth
}

fn task_stats<'a>(tasks: impl Iterator<Item = &'a Task> + Clone) -> TaskStats {
    let counts = tasks.clone().map(|task| task.status).counts();
    let count = |status| counts.get(&status).copied().unwrap_or(0);
    let total: usize = counts.values().sum();
    let average_progress = if total == 0 {
        0.0
    } else {
        tasks.map(|task| f64::from(task.progress)).sum::<f64>() / total as f64
    };
    TaskStats {
        total,
        completed: count(TaskStatus::Completed),
        in_progress: count(TaskStatus::InProgress),
        planned: count(TaskStatus::Planned),
        blocked: count(TaskStatus::Blocked),
        average_progress,
    }
}

fn derive_phases(
    demand: &Demand,
    settings: &TimelineSettings,
    table: &CompletionTable,
) -> Schedule {
    let details = table.details(demand);
    let mut cursor = demand
        .schedule
        .start_date
        .unwrap_or_else(|| demand.created_at.date());

    let bars = details
        .iter()
        .map(|completion| {
            let phase = completion.phase;
            let requested = demand
                .schedule
                .phase_days
                .get(&phase)
                .copied()
                .unwrap_or_else(|| settings.days_for(phase))
                .max(1);
            let days = requested.min(MAX_PHASE_DAYS);
            let start = cursor;
            let end = start
                .checked_add(Duration::days(i64::from(days)))
                .unwrap_or(Date::MAX);
            let clamped = days != requested || (end - start).whole_days() != i64::from(days);
            if clamped {
                tracing::warn!(demand = %demand.id, %phase, requested, "phase duration clamped");
            }
            cursor = end;
            ScheduleBar {
                key: phase.to_string(),
                label: phase.title().to_string(),
                description: format!("{} phase", phase.title()),
                start,
                end,
                duration_days: (end - start).whole_days(),
                color: phase_color(phase),
                progress: if completion.complete {
                    100
                } else {
                    completion.percentage.round() as u8
                },
                status: None,
                phase: Some(phase),
                assigned_to: None,
                depth: 0,
                clamped,
            }
        })
        .collect();

    Schedule {
        mode: TimelineMode::Phases,
        start: None,
        end: None,
        total_days: 0,
        bars,
        links: Vec::new(),
        milestones: Vec::new(),
        stats: None,
        rejected: Vec::new(),
    }
}

fn milestone_markers(demand: &Demand) -> Vec<MilestoneMarker> {
    demand
        .milestones
        .iter()
        .map(|m| MilestoneMarker {
            date: m.date,
            label: m.label.clone(),
            color: MILESTONE_COLOR,
        })
        .sorted_by(|a, b| a.date.cmp(&b.date).then_with(|| a.label.cmp(&b.label)))
        .collect()
}

impl Schedule {
    fn fill_span(&mut self) {
        let starts = self
            .bars
            .iter()
            .map(|b| b.start)
            .chain(self.milestones.iter().map(|m| m.date));
        let ends = self
            .bars
            .iter()
            .map(|b| b.end)
            .chain(self.milestones.iter().map(|m| m.date));
        self.start = starts.min();
        self.end = ends.max();
        self.total_days = match (self.start, self.end) {
            (Some(start), Some(end)) => (end - start).whole_days(),
            _ => 0,
        };
    }

    pub fn bar(&self, key: &str) -> Option<&ScheduleBar> {
        self.bars.iter().find(|bar| bar.key == key)
    }
}

//! Plain-text rendering for terminal output.

use std::fmt::Write as _;

use demand_core::domain::models::{Demand, DemandStatistics, DemandSummary};
use demand_core::domain::progress::PhaseCompletion;
use demand_core::domain::session::SessionStatus;
use demand_core::domain::timeline::{Schedule, Timeline, TimelineMode};
use serde_json::Value;

const GANTT_WIDTH: usize = 48;

pub fn summaries(entries: &[DemandSummary], active: Option<&str>) -> String {
    if entries.is_empty() {
        return "No demands stored yet.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let marker = if Some(entry.id.as_str()) == active { "*" } else { " " };
        let _ = writeln!(
            out,
            "{marker} {:<18} {:<13} {:>3}%  {}",
            entry.id.as_str(),
            entry.status.to_string(),
            entry.progress,
            entry.title.as_deref().unwrap_or("(untitled)")
        );
    }
    out
}

pub fn statistics(stats: &DemandStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total demands:    {}", stats.total_demands);
    let _ = writeln!(out, "Average progress: {:.1}%", stats.average_progress);
    for (status, count) in &stats.by_status {
        let _ = writeln!(out, "  {:<13} {count}", status.to_string());
    }
    if let Some(recent) = &stats.most_recent {
        let _ = writeln!(
            out,
            "Most recent:      {} {}",
            recent.id,
            recent.title.as_deref().unwrap_or("(untitled)")
        );
    }
    out
}

pub fn demand(demand: &Demand) -> String {
    let mut out = String::new();
    let title = demand.title().unwrap_or_else(|| "(untitled)".into());
    let _ = writeln!(out, "{}  {title}", demand.id);
    if let Some(number) = &demand.number {
        let _ = writeln!(out, "Number:   {number}");
    }
    let _ = writeln!(out, "Status:   {}", demand.status);
    let _ = writeln!(out, "Progress: {}%", demand.progress);
    let _ = writeln!(out, "Created:  {}", demand.created_at.date());
    let _ = writeln!(out, "Modified: {}", demand.last_modified);

    for (phase, data) in demand.phases.iter() {
        let fields: Vec<_> = data.occupied_fields().collect();
        let attachments = demand.attachments_for(phase);
        if fields.is_empty() && attachments.map_or(true, |a| a.is_empty()) {
            continue;
        }
        let _ = writeln!(out, "\n[{}]", phase.title());
        for (field, value) in fields {
            let _ = writeln!(out, "  {field}: {}", short(value));
        }
        if let Some(attachments) = attachments {
            for file in &attachments.files {
                let _ = writeln!(out, "  file: {} ({} bytes)", file.name, file.size);
            }
            for link in &attachments.urls {
                let _ = writeln!(out, "  link: {}", link.url);
            }
        }
    }

    if !demand.milestones.is_empty() {
        let _ = writeln!(out, "\nMilestones:");
        for (index, milestone) in demand.milestones.iter().enumerate() {
            let _ = writeln!(out, "  {index}. {} {}", milestone.date, milestone.label);
        }
    }

    let _ = writeln!(out, "\nAudit entries: {}", demand.audit_log.len());
    for entry in demand.audit_log.entries().iter().rev().take(5) {
        let _ = writeln!(out, "  {} {} {}", entry.timestamp.date(), entry.user, entry.action);
    }
    out
}

fn short(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.lines().next().unwrap_or_default().to_string(),
        Value::Array(items) => format!("{} item(s)", items.len()),
        Value::Object(map) => format!("{} entr(ies)", map.len()),
        other => other.to_string(),
    };
    if text.chars().count() > 72 {
        format!("{}…", text.chars().take(71).collect::<String>())
    } else {
        text
    }
}

pub fn completion(details: &[PhaseCompletion], overall: u8) -> String {
    let mut out = String::new();
    for detail in details {
        let _ = writeln!(
            out,
            "{} {:<15} {}/{} fields",
            if detail.complete { "[x]" } else { "[ ]" },
            detail.phase.title(),
            detail.filled_fields,
            detail.total_fields
        );
    }
    let _ = writeln!(out, "Overall: {overall}%");
    out
}

pub fn session(status: SessionStatus) -> String {
    match status {
        SessionStatus::Active { remaining } => {
            format!("Session active, {} minutes left\n", remaining.whole_minutes())
        }
        SessionStatus::NearingExpiry { remaining } => format!(
            "Session expires in {} minutes, run `demand session reset` to extend\n",
            remaining.whole_minutes()
        ),
        SessionStatus::Expired => {
            "Session expired, run `demand session reset` to continue\n".to_string()
        }
    }
}

pub fn timeline(timeline: &Timeline) -> String {
    match timeline {
        Timeline::Empty => "Nothing to schedule yet: add tasks or phase content.\n".to_string(),
        Timeline::Scheduled(schedule) => gantt(schedule),
    }
}

fn gantt(schedule: &Schedule) -> String {
    let mut out = String::new();
    let (Some(start), Some(end)) = (schedule.start, schedule.end) else {
        let _ = writeln!(out, "No drawable tasks.");
        rejected(&mut out, schedule);
        return out;
    };
    let _ = writeln!(
        out,
        "{} schedule {start} .. {end} ({} days)",
        match schedule.mode {
            TimelineMode::Detailed => "Task",
            TimelineMode::Phases => "Phase",
        },
        schedule.total_days
    );

    let span = schedule.total_days.max(1) as f64;
    let column = |date: time::Date| {
        ((date - start).whole_days() as f64 / span * GANTT_WIDTH as f64).round() as usize
    };

    for bar in &schedule.bars {
        let from = column(bar.start).min(GANTT_WIDTH);
        let to = column(bar.end).clamp(from + 1, GANTT_WIDTH.max(from + 1));
        let _ = writeln!(
            out,
            "{:<14} {}{}{} {:>3}% {}",
            truncate(&bar.label, 14),
            " ".repeat(from),
            "#".repeat(to - from),
            " ".repeat(GANTT_WIDTH.saturating_sub(to)),
            bar.progress,
            bar.status.map(|s| s.to_string()).unwrap_or_default()
        );
    }

    for milestone in &schedule.milestones {
        let at = column(milestone.date).min(GANTT_WIDTH);
        let _ = writeln!(
            out,
            "{:<14} {}◆ {} {}",
            "milestone",
            " ".repeat(at),
            milestone.date,
            milestone.label
        );
    }

    for link in schedule.links.iter().filter(|l| l.violated) {
        let _ = writeln!(
            out,
            "! {} ends {} after {} starts {}",
            link.from, link.from_date, link.to, link.to_date
        );
    }

    if let Some(stats) = &schedule.stats {
        let _ = writeln!(
            out,
            "{} tasks: {} completed, {} in progress, {} planned, {} blocked; \
             average progress {:.1}%",
            stats.total,
            stats.completed,
            stats.in_progress,
            stats.planned,
            stats.blocked,
            stats.average_progress
        );
    }
    rejected(&mut out, schedule);
    out
}

fn rejected(out: &mut String, schedule: &Schedule) {
    for task in &schedule.rejected {
        let _ = writeln!(
            out,
            "skipped task #{} ({}): {}",
            task.index,
            task.task_id.as_deref().unwrap_or("no id"),
            task.reason
        );
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        format!("{}…", text.chars().take(width - 1).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use demand_core::config::TimelineSettings;
    use demand_core::domain::models::{DemandId, Task, TaskStatus};
    use demand_core::domain::progress::CompletionTable;
    use demand_core::domain::timeline;
    use time::macros::{date, datetime};

    fn demand_with_tasks() -> Demand {
        let mut demand = Demand::with_id(
            DemandId::parse("LOG-2024-0000A1B2").unwrap(),
            datetime!(2024-11-01 08:00 UTC),
        );
        demand.set_tasks(&[
            Task::new("T1", "Setup", date!(2024 - 11 - 15), date!(2024 - 11 - 22))
                .with_status(TaskStatus::Completed)
                .with_progress(100),
            Task::new("T2", "Integrate", date!(2024 - 11 - 20), date!(2024 - 12 - 05))
                .with_status(TaskStatus::InProgress)
                .with_progress(60)
                .with_dependencies(["T1"]),
        ]);
        demand
    }

    #[test]
    fn gantt_rows_span_the_chart() {
        let demand = demand_with_tasks();
        let timeline =
            timeline::derive(&demand, &TimelineSettings::default(), &CompletionTable::default());
        let text = super::timeline(&timeline);

        let rows: Vec<&str> = text.lines().collect();
        assert!(rows[0].starts_with("Task schedule 2024-11-15 .. 2024-12-05 (20 days)"));
        assert!(rows[1].starts_with(&format!("{:<14} #", "Setup")));
        assert!(rows[2].trim_end().ends_with("60% In Progress"));
        assert!(text.contains("! T1 ends 2024-11-22 after T2 starts 2024-11-20"));
        assert!(text.contains("average progress 80.0%"));
    }

    #[test]
    fn empty_timeline_has_a_hint() {
        assert!(super::timeline(&Timeline::Empty).contains("Nothing to schedule"));
    }

    #[test]
    fn active_demand_is_marked() {
        let demand = demand_with_tasks();
        let mut summary = DemandSummary::from(&demand);
        summary.title = Some("Setup".into());
        let text = summaries(&[summary], Some("LOG-2024-0000A1B2"));
        assert!(text.starts_with("* LOG-2024-0000A1B2"));
    }
}

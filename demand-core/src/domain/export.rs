//! Human-readable and machine-readable exports of a single demand.

use serde_json::Value;
use std::fmt::Write as _;
use time::format_description::well_known::Rfc3339;

use crate::domain::models::{is_metadata_key, Demand, Phase, TASKS_FIELD};
use crate::domain::progress::CompletionTable;
use crate::domain::DemandError;

const NOT_PROVIDED: &str = "Not provided";

/// Markdown report: header, one section per phase, task table, audit count.
pub fn export_markdown(demand: &Demand, table: &CompletionTable) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Demand Report: {}", demand.id);
    let _ = writeln!(md);
    if let Some(title) = demand.title() {
        let _ = writeln!(md, "**Name:** {title}  ");
    }
    if let Some(number) = &demand.number {
        let _ = writeln!(md, "**Number:** {number}  ");
    }
    let _ = writeln!(md, "**Created:** {}  ", timestamp(demand.created_at));
    let _ = writeln!(md, "**Last modified:** {}  ", timestamp(demand.last_modified));
    let _ = writeln!(md, "**Status:** {}  ", demand.status);
    let _ = writeln!(md, "**Progress:** {}%", table.calculate(demand));

    for (phase, data) in demand.phases.iter() {
        let _ = writeln!(md, "\n---\n\n## {}. {}\n", phase.ordinal(), phase.title());
        let complete = if table.is_phase_complete(demand, phase) { "complete" } else { "open" };
        let _ = writeln!(md, "_Phase {complete}_\n");

        let mut fields = data
            .occupied_fields()
            .filter(|(field, _)| {
                !(phase == Phase::Build
                    && field.as_str() == TASKS_FIELD
                    && demand.has_detailed_tasks())
            })
            .peekable();
        if fields.peek().is_none() && !(phase == Phase::Build && demand.has_detailed_tasks()) {
            let _ = writeln!(md, "{NOT_PROVIDED}");
            continue;
        }
        for (field, value) in fields {
            let _ = writeln!(md, "### {}\n", heading(field));
            render_value(&mut md, value);
            let _ = writeln!(md);
        }

        if phase == Phase::Build && demand.has_detailed_tasks() {
            render_tasks(&mut md, demand);
        }
    }

    if !demand.milestones.is_empty() {
        let _ = writeln!(md, "\n---\n\n## Milestones\n");
        for milestone in &demand.milestones {
            let _ = writeln!(md, "- {}: {}", milestone.date, milestone.label);
        }
    }

    let _ = writeln!(md, "\n---\n\n**Audit entries:** {}", demand.audit_log.len());
    md
}

/// Pretty JSON, the same document the repository stores.
pub fn export_json(demand: &Demand) -> Result<String, DemandError> {
    serde_json::to_string_pretty(demand)
        .map_err(|e| DemandError::storage(Some(&demand.id), format!("failed to serialize: {e}")))
}

fn render_tasks(md: &mut String, demand: &Demand) {
    let _ = writeln!(md, "### Tasks\n");
    let _ = writeln!(md, "| ID | Task | Status | Owner | Start | End | Progress |");
    let _ = writeln!(md, "|----|------|--------|-------|-------|-----|----------|");
    for task in demand.tasks().into_iter().flatten() {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {}% |",
            task.task_id,
            cell(&task.name),
            task.status,
            cell(&task.assigned_to),
            task.start_date,
            task.end_date,
            task.progress
        );
    }
}

fn render_value(md: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                let _ = writeln!(md, "- {}", inline(item));
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter().filter(|(k, _)| !is_metadata_key(k)) {
                let _ = writeln!(md, "- {}: {}", key, inline(item));
            }
        }
        Value::Bool(true) => {
            let _ = writeln!(md, "Yes");
        }
        Value::Bool(false) => {
            let _ = writeln!(md, "No");
        }
        Value::String(s) => {
            let _ = writeln!(md, "{}", s.trim());
        }
        other => {
            let _ = writeln!(md, "{other}");
        }
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", inline(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(items) => items.iter().map(inline).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn heading(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn timestamp(at: time::OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DemandId, Task, TaskStatus};
    use serde_json::json;
    use time::macros::{date, datetime};

    fn demand() -> Demand {
        let mut d = Demand::with_id(
            DemandId::parse("LOG-2025-0000E0E0").unwrap(),
            datetime!(2025-03-01 09:00 UTC),
        );
        d.name = Some("Invoice automation".into());
        d
    }

    #[test]
    fn empty_phases_say_not_provided() {
        let md = export_markdown(&demand(), &CompletionTable::default());
        assert!(md.starts_with("# Demand Report: LOG-2025-0000E0E0"));
        assert!(md.contains("**Name:** Invoice automation"));
        assert!(md.contains("**Progress:** 0%"));
        assert_eq!(md.matches(NOT_PROVIDED).count(), 9);
    }

    #[test]
    fn renders_generic_values_and_task_table() {
        let mut d = demand();
        d.phases.requirements.set("stakeholders", json!([{"name": "CFO", "role": "Sponsor"}]));
        d.phases.validation.set("qa_sign_off", true);
        d.phases.implementation.set("success_metrics", json!({"uptime": 99.9}));
        d.set_tasks(&[Task::new("T1", "Setup | infra", date!(2024 - 11 - 15), date!(2024 - 11 - 22))
            .with_status(TaskStatus::InProgress)]);

        let md = export_markdown(&d, &CompletionTable::default());
        assert!(md.contains("### Stakeholders\n\n- name: CFO, role: Sponsor"));
        assert!(md.contains("### Qa Sign Off\n\nYes"));
        assert!(md.contains("- uptime: 99.9"));
        assert!(md.contains(
            "| T1 | Setup \\| infra | In Progress |  | 2024-11-15 | 2024-11-22 | 0% |"
        ));
        assert!(!md.contains("### Tasks\n\n- "));
    }

    #[test]
    fn json_export_matches_stored_document() {
        let d = demand();
        let exported = export_json(&d).unwrap();
        let back: Demand = serde_json::from_str(&exported).unwrap();
        assert_eq!(back, d);
    }
}

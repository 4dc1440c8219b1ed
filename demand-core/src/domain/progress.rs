//! Phase-granular completion scoring.
//!
//! A phase contributes one ninth of the score once its completion rule holds.
//! Filling more fields in an already complete phase never changes the score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::models::{Demand, Phase, PhaseData};

/// What it takes for one phase to count as complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionRule {
    /// Fields whose occupancy is counted. Empty means every non-metadata field.
    pub key_fields: Vec<String>,
    /// Minimum number of occupied key fields.
    pub min_filled: usize,
    /// Fields that must be occupied regardless of the count.
    pub required: Vec<String>,
}

impl Default for CompletionRule {
    fn default() -> Self {
        Self {
            key_fields: Vec::new(),
            min_filled: 1,
            required: Vec::new(),
        }
    }
}

impl CompletionRule {
    pub fn new(key_fields: &[&str], min_filled: usize, required: &[&str]) -> Self {
        Self {
            key_fields: key_fields.iter().map(|f| f.to_string()).collect(),
            min_filled,
            required: required.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// (occupied, counted) fields of `data` under this rule.
    pub fn filled(&self, data: &PhaseData) -> (usize, usize) {
        if self.key_fields.is_empty() {
            (data.occupied_fields().count(), data.content_fields().count())
        } else {
            let filled = self
                .key_fields
                .iter()
                .filter(|field| data.is_occupied(field))
                .count();
            (filled, self.key_fields.len())
        }
    }

    pub fn is_satisfied(&self, data: &PhaseData) -> bool {
        // An untouched phase is never complete, whatever the thresholds say.
        if !data.has_content() {
            return false;
        }
        if !self.required.iter().all(|field| data.is_occupied(field)) {
            return false;
        }
        self.filled(data).0 >= self.min_filled
    }
}

/// Per-phase completion rules. Phases missing from a configured table use
/// the built-in rule for that phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionTable(BTreeMap<Phase, CompletionRule>);

impl Default for CompletionTable {
    fn default() -> Self {
        Self(Phase::ALL.into_iter().map(|p| (p, default_rule(p))).collect())
    }
}

fn default_rule(phase: Phase) -> CompletionRule {
    match phase {
        Phase::Ideation => CompletionRule::new(
            &["problem_statement", "goals", "background", "constraints"],
            2,
            &["problem_statement"],
        ),
        Phase::Requirements => CompletionRule::new(
            &[
                "stakeholders",
                "user_stories",
                "features",
                "acceptance_criteria",
                "vision_document",
                "non_functional_requirements",
            ],
            3,
            &["stakeholders"],
        ),
        Phase::Assessment => CompletionRule::new(
            &[
                "business_case",
                "roi_percentage",
                "estimated_cost",
                "estimated_duration_weeks",
                "risks",
                "dependencies",
                "assumptions",
            ],
            3,
            &["business_case"],
        ),
        Phase::Design => CompletionRule::new(
            &[
                "architecture_overview",
                "technical_stack",
                "wireframes_paths",
                "data_model",
                "integration_points",
                "security_considerations",
            ],
            3,
            &["architecture_overview"],
        ),
        Phase::Build => CompletionRule::new(
            &[
                "tasks",
                "sprint_plan",
                "sprint_start_date",
                "sprint_end_date",
                "jira_epic_id",
                "jira_story_ids",
                "repository_url",
                "branch_name",
            ],
            2,
            &["tasks"],
        ),
        Phase::Validation => CompletionRule::new(
            &[
                "test_cases",
                "test_results",
                "bug_log",
                "qa_sign_off",
                "automated_test_coverage",
                "manual_test_status",
            ],
            2,
            &["test_cases"],
        ),
        Phase::Deployment => CompletionRule::new(
            &[
                "deployment_schedule",
                "rollout_plan",
                "environment_config",
                "rollback_plan",
                "training_materials",
                "communication_plan",
                "deployment_checklist",
            ],
            3,
            &["rollout_plan"],
        ),
        Phase::Implementation => CompletionRule::new(
            &[
                "success_metrics",
                "issue_log",
                "user_feedback",
                "performance_data",
                "uptime_percentage",
                "adoption_rate",
            ],
            3,
            &[],
        ),
        Phase::Closing => CompletionRule::new(
            &[
                "retrospective",
                "lessons_learned",
                "sign_offs",
                "final_costs",
                "final_roi",
                "archive_location",
                "knowledge_transfer",
            ],
            3,
            &["lessons_learned"],
        ),
    }
}

impl CompletionTable {
    pub fn rule(&self, phase: Phase) -> CompletionRule {
        self.0.get(&phase).cloned().unwrap_or_else(|| default_rule(phase))
    }

    pub fn with_rule(mut self, phase: Phase, rule: CompletionRule) -> Self {
        self.0.insert(phase, rule);
        self
    }

    pub fn is_phase_complete(&self, demand: &Demand, phase: Phase) -> bool {
        self.rule(phase).is_satisfied(demand.phases.get(phase))
    }

    /// Overall completion, `round(100 * complete_phases / 9)`.
    pub fn calculate(&self, demand: &Demand) -> u8 {
        let complete = Phase::ALL
            .into_iter()
            .filter(|phase| self.is_phase_complete(demand, *phase))
            .count();
        ((complete * 100) as f64 / Phase::ALL.len() as f64).round() as u8
    }

    pub fn details(&self, demand: &Demand) -> Vec<PhaseCompletion> {
        Phase::ALL
            .into_iter()
            .map(|phase| {
                let rule = self.rule(phase);
                let data = demand.phases.get(phase);
                let (filled, total) = rule.filled(data);
                let percentage = if total == 0 {
                    0.0
                } else {
                    (filled as f64 * 1000.0 / total as f64).round() / 10.0
                };
                PhaseCompletion {
                    phase,
                    filled_fields: filled,
                    total_fields: total,
                    percentage,
                    complete: rule.is_satisfied(data),
                }
            })
            .collect()
    }
}

/// Completion breakdown of a single phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseCompletion {
    pub phase: Phase,
    pub filled_fields: usize,
    pub total_fields: usize,
    /// Share of counted fields filled, one decimal.
    pub percentage: f64,
    pub complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DemandId, Task};
    use serde_json::json;
    use time::macros::{date, datetime};

    fn demand() -> Demand {
        Demand::with_id(
            DemandId::parse("LOG-2025-0000CAFE").unwrap(),
            datetime!(2025-03-01 09:00 UTC),
        )
    }

    fn fill_everything(d: &mut Demand) {
        let p = &mut d.phases;
        p.ideation.set("problem_statement", "Slow invoicing");
        p.ideation.set("goals", "Halve cycle time");
        p.requirements.set("stakeholders", json!([{"name": "CFO", "role": "Sponsor"}]));
        p.requirements.set("user_stories", "As a clerk ...");
        p.requirements.set("acceptance_criteria", "Given ...");
        p.assessment.set("business_case", "Saves 2 FTE");
        p.assessment.set("roi_percentage", 140.0);
        p.assessment.set("risks", "Vendor lock-in");
        p.design.set("architecture_overview", "Event driven");
        p.design.set("technical_stack", "Rust");
        p.design.set("data_model", "Invoices, lines");
        d.set_tasks(&[Task::new("T1", "Build", date!(2025 - 01 - 01), date!(2025 - 01 - 10))]);
        let p = &mut d.phases;
        p.build.set("sprint_plan", "2 sprints");
        p.validation.set("test_cases", "TC-1 ...");
        p.validation.set("qa_sign_off", true);
        p.deployment.set("rollout_plan", "Big bang");
        p.deployment.set("rollback_plan", "Restore");
        p.deployment.set("communication_plan", "Newsletter");
        p.implementation.set("success_metrics", json!({"cycle_time_days": 2.0}));
        p.implementation.set("user_feedback", "Happy");
        p.implementation.set("adoption_rate", 87.5);
        p.closing.set("retrospective", "Went well");
        p.closing.set("lessons_learned", "Start earlier");
        p.closing.set("sign_offs", json!({"CFO": true}));
    }

    #[test]
    fn new_demand_scores_zero() {
        assert_eq!(CompletionTable::default().calculate(&demand()), 0);
    }

    #[test]
    fn name_only_scores_zero() {
        let mut d = demand();
        d.name = Some("X".into());
        assert_eq!(CompletionTable::default().calculate(&d), 0);
    }

    #[test]
    fn all_phases_complete_scores_hundred() {
        let mut d = demand();
        fill_everything(&mut d);
        let table = CompletionTable::default();
        assert!(table.details(&d).iter().all(|c| c.complete));
        assert_eq!(table.calculate(&d), 100);

        // More depth beyond the threshold changes nothing.
        d.phases.ideation.set("background", "History");
        assert_eq!(table.calculate(&d), 100);
    }

    #[test]
    fn score_is_phase_count_based() {
        let mut d = demand();
        d.phases.ideation.set("problem_statement", "Slow invoicing");
        d.phases.ideation.set("goals", "Halve cycle time");
        let table = CompletionTable::default();
        assert_eq!(table.calculate(&d), 11);

        d.phases.design.set("architecture_overview", "Event driven");
        d.phases.design.set("technical_stack", "Rust");
        d.phases.design.set("data_model", "ER");
        assert_eq!(table.calculate(&d), 22);
    }

    #[test]
    fn required_field_gates_completion() {
        let mut d = demand();
        d.phases.requirements.set("user_stories", "As a ...");
        d.phases.requirements.set("features", json!(["a", "b"]));
        d.phases.requirements.set("acceptance_criteria", "Given ...");
        let table = CompletionTable::default();
        assert!(!table.is_phase_complete(&d, Phase::Requirements));

        d.phases.requirements.set("stakeholders", json!([{"name": "Ops"}]));
        assert!(table.is_phase_complete(&d, Phase::Requirements));
    }

    #[test]
    fn configured_rule_overrides_default() {
        let mut d = demand();
        d.phases.closing.set("lessons_learned", "Plenty");
        let table = CompletionTable::default()
            .with_rule(Phase::Closing, CompletionRule::new(&[], 1, &["lessons_learned"]));
        assert!(table.is_phase_complete(&d, Phase::Closing));
    }

    #[test]
    fn lenient_rule_still_needs_content() {
        let d = demand();
        let table = CompletionTable::default()
            .with_rule(Phase::Ideation, CompletionRule::new(&[], 0, &[]));
        assert!(!table.is_phase_complete(&d, Phase::Ideation));
    }

    #[test]
    fn details_report_field_counts() {
        let mut d = demand();
        d.phases.ideation.set("problem_statement", "Slow");
        d.phases.ideation.set("goals", "");
        let details = CompletionTable::default().details(&d);
        let ideation = &details[0];
        assert_eq!(ideation.phase, Phase::Ideation);
        assert_eq!((ideation.filled_fields, ideation.total_fields), (1, 4));
        assert_eq!(ideation.percentage, 25.0);
        assert!(!ideation.complete);
    }

    #[test]
    fn progress_is_bounded() {
        let mut d = demand();
        fill_everything(&mut d);
        let table = CompletionTable::default();
        for phase in Phase::ALL {
            let mut partial = d.clone();
            *partial.phases.get_mut(phase) = PhaseData::new();
            let score = table.calculate(&partial);
            assert!(score < 100);
            assert_eq!(score, 89);
        }
    }
}

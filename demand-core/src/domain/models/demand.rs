use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use time::{Date, OffsetDateTime};

use super::compat;
use super::task::{has_task_id, iso_date};
use super::{AuditLog, DemandId, Phase, Phases, Task};
use crate::domain::DemandError;

/// Field of the Build phase holding task records.
pub const TASKS_FIELD: &str = "tasks";

/// Lifecycle status of a demand as a whole.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
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
pub enum DemandStatus {
    #[default]
    Draft,
    #[serde(rename = "In Progress", alias = "InProgress")]
    #[strum(to_string = "In Progress", serialize = "InProgress", serialize = "in_progress")]
    InProgress,
    #[serde(rename = "Under Review", alias = "UnderReview")]
    #[strum(to_string = "Under Review", serialize = "UnderReview", serialize = "under_review")]
    UnderReview,
    Approved,
    Rejected,
    #[serde(rename = "On Hold", alias = "OnHold")]
    #[strum(to_string = "On Hold", serialize = "OnHold", serialize = "on_hold")]
    OnHold,
    Completed,
    Cancelled,
}

/// Metadata of an uploaded file. The bytes live in the attachment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    /// Attachment store key.
    pub path: String,
    pub size: u64,
    #[serde(with = "compat::timestamp")]
    pub uploaded_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRef {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "compat::timestamp")]
    pub added_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseAttachments {
    pub files: Vec<FileRef>,
    pub urls: Vec<UrlRef>,
}

impl PhaseAttachments {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.urls.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(alias = "content")]
    pub text: String,
    #[serde(with = "compat::timestamp")]
    pub timestamp: OffsetDateTime,
}

/// A dated marker drawn on top of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(alias = "description")]
    pub label: String,
}

/// User overrides for the phase-level schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOverrides {
    #[serde(with = "iso_date::option", skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Date>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub phase_days: BTreeMap<Phase, u32>,
}

impl ScheduleOverrides {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.phase_days.is_empty()
    }
}

/// The root work-item aggregate: nine phases plus attachments, audit trail
/// and chat history, all owned by the demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Demand {
    #[serde(alias = "demand_id")]
    pub id: DemandId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, alias = "demand_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: DemandStatus,
    #[serde(with = "compat::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "compat::timestamp")]
    pub last_modified: OffsetDateTime,
    #[serde(flatten)]
    pub phases: Phases,
    /// Last derived completion score, kept for the index.
    #[serde(default, alias = "progress_percentage", with = "compat::percent")]
    pub progress: u8,
    #[serde(default)]
    pub attachments: BTreeMap<Phase, PhaseAttachments>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub schedule: ScheduleOverrides,
    #[serde(default)]
    pub audit_log: AuditLog,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

impl Demand {
    /// A fresh Draft demand with every phase empty.
    pub fn new(id_prefix: &str, now: OffsetDateTime) -> Self {
        Self::with_id(DemandId::generate(id_prefix, now.year()), now)
    }

    pub fn with_id(id: DemandId, now: OffsetDateTime) -> Self {
        Self {
            id,
            number: None,
            name: None,
            status: DemandStatus::Draft,
            created_at: now,
            last_modified: now,
            phases: Phases::default(),
            progress: 0,
            attachments: BTreeMap::new(),
            milestones: Vec::new(),
            schedule: ScheduleOverrides::default(),
            audit_log: AuditLog::default(),
            chat_history: Vec::new(),
        }
    }

    /// Whether this demand holds anything a user entered.
    ///
    /// A demand with only its generated id and timestamps is empty and must
    /// never be written to storage. Evaluated fresh on every call.
    pub fn has_meaningful_content(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
            || self.phases.has_content()
            || !self.task_records().is_empty()
            || !self.audit_log.is_empty()
            || !self.chat_history.is_empty()
    }

    /// Human-facing title: the name, else the Ideation `title`, else the
    /// first line of the problem statement.
    pub fn title(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        let ideation = &self.phases.ideation;
        ["title", "problem_statement"].iter().find_map(|field| {
            ideation
                .get_str(field)
                .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()))
                .map(str::to_string)
        })
    }

    /// Raw entries of the Build phase's task list.
    pub fn task_records(&self) -> &[Value] {
        match self.phases.build.get(TASKS_FIELD) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }

    /// Whether the Build task list can drive a task-level timeline.
    pub fn has_detailed_tasks(&self) -> bool {
        let records = self.task_records();
        !records.is_empty() && records.iter().all(has_task_id)
    }

    /// Parsed tasks; records that fail to parse are returned as errors in place.
    pub fn tasks(&self) -> Vec<Result<Task, DemandError>> {
        self.task_records().iter().map(Task::from_value).collect()
    }

    /// Replace the Build task list with canonical records.
    pub fn set_tasks(&mut self, tasks: &[Task]) {
        let records: Vec<Value> = tasks.iter().map(Task::to_value).collect();
        self.phases.build.set(TASKS_FIELD, Value::Array(records));
    }

    pub fn attachments_for(&self, phase: Phase) -> Option<&PhaseAttachments> {
        self.attachments.get(&phase)
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.last_modified = now;
    }
}

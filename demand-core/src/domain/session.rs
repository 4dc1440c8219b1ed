//! The editing session: one active demand, a lifetime, and the repository.
//!
//! Every mutation goes through the session so that validity is checked,
//! an audit entry is appended and the stored progress is refreshed in one
//! place.

use serde_json::Value;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};

use crate::config::{SessionSettings, Settings};
use crate::domain::assist::GeneratedContent;
use crate::domain::models::{
    is_metadata_key, record_task_id, ChatMessage, ChatRole, Demand, DemandId, DemandStatus, FileRef,
    Milestone, Phase, Task, UrlRef, TASKS_FIELD,
};
use crate::domain::ports::outbound::{AttachmentStore, DemandRepository, SaveOutcome};
use crate::domain::progress::PhaseCompletion;
use crate::domain::timeline::{self, Timeline, MAX_PHASE_DAYS};
use crate::domain::DemandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active { remaining: Duration },
    NearingExpiry { remaining: Duration },
    Expired,
}

impl SessionStatus {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Session lifetime measured from `started_at`. Demand timestamps never
/// feed into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionClock {
    started_at: OffsetDateTime,
    ttl: Duration,
    warn_after: Duration,
}

impl SessionClock {
    pub fn new(started_at: OffsetDateTime, settings: &SessionSettings) -> Self {
        let ttl = Duration::minutes(settings.ttl_minutes.max(1));
        Self {
            started_at,
            ttl,
            warn_after: ttl * settings.warning_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn status_at(&self, now: OffsetDateTime) -> SessionStatus {
        let elapsed = (now - self.started_at).max(Duration::ZERO);
        if elapsed >= self.ttl {
            SessionStatus::Expired
        } else if elapsed >= self.warn_after {
            SessionStatus::NearingExpiry {
                remaining: self.ttl - elapsed,
            }
        } else {
            SessionStatus::Active {
                remaining: self.ttl - elapsed,
            }
        }
    }
}

pub struct Session<R> {
    repo: R,
    settings: Settings,
    clock: SessionClock,
    /// Set once expiry is observed; cleared only by [`Session::reset`].
    expired: bool,
    active: Demand,
}

impl<R: DemandRepository> Session<R> {
    /// Begin a fresh session with a new, empty demand.
    pub fn start(repo: R, settings: Settings) -> Self {
        let now = OffsetDateTime::now_utc();
        let active = Demand::new(&settings.demand.id_prefix, now);
        Self {
            repo,
            clock: SessionClock::new(now, &settings.session),
            settings,
            expired: false,
            active,
        }
    }

    /// Continue a session that began at `started_at`, reopening `active_id`
    /// when it still exists.
    pub fn resume(
        repo: R,
        settings: Settings,
        started_at: OffsetDateTime,
        active_id: Option<&DemandId>,
    ) -> Result<Self, DemandError> {
        let active = match active_id {
            Some(id) => match repo.load(id) {
                Ok(demand) => demand,
                Err(DemandError::NotFound(_)) => {
                    warn!(demand = %id, "active demand no longer exists, starting a new one");
                    Demand::new(&settings.demand.id_prefix, OffsetDateTime::now_utc())
                }
                Err(e) => return Err(e),
            },
            None => Demand::new(&settings.demand.id_prefix, OffsetDateTime::now_utc()),
        };

        let mut session = Self {
            repo,
            clock: SessionClock::new(started_at, &settings.session),
            settings,
            expired: false,
            active,
        };
        session.refresh_progress();
        Ok(session)
    }

    pub fn active(&self) -> &Demand {
        &self.active
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.clock.started_at()
    }

    pub fn status(&self) -> SessionStatus {
        self.status_at(OffsetDateTime::now_utc())
    }

    pub fn status_at(&self, now: OffsetDateTime) -> SessionStatus {
        if self.expired {
            SessionStatus::Expired
        } else {
            self.clock.status_at(now)
        }
    }

    /// Restart the session lifetime. The active demand is kept.
    pub fn reset(&mut self) {
        self.clock = SessionClock::new(OffsetDateTime::now_utc(), &self.settings.session);
        self.expired = false;
        info!(demand = %self.active.id, "session reset");
    }

    fn guard(&mut self) -> Result<(), DemandError> {
        match self.status() {
            SessionStatus::Expired => {
                if !self.expired {
                    warn!(ttl_minutes = self.settings.session.ttl_minutes, "session expired");
                    self.expired = true;
                }
                Err(DemandError::SessionExpired {
                    ttl_minutes: self.settings.session.ttl_minutes,
                })
            }
            SessionStatus::NearingExpiry { remaining } => {
                warn!(remaining_minutes = remaining.whole_minutes(), "session nearing expiry");
                Ok(())
            }
            SessionStatus::Active { .. } => Ok(()),
        }
    }

    fn refresh_progress(&mut self) {
        self.active.progress = self.settings.progress.calculate(&self.active);
    }

    /// Apply an audited change to the active demand.
    fn edit<T>(
        &mut self,
        action: impl Into<String>,
        phase: Option<Phase>,
        field: Option<&str>,
        apply: impl FnOnce(&mut Demand) -> Result<T, DemandError>,
    ) -> Result<T, DemandError> {
        self.guard()?;
        let out = apply(&mut self.active)?;
        let now = OffsetDateTime::now_utc();
        self.active.audit_log.record(
            &self.active.id,
            &self.settings.session.user,
            action,
            phase,
            field,
            now,
        );
        self.active.touch(now);
        self.refresh_progress();
        Ok(out)
    }

    /// Persist the active demand with a final audit entry, if it has content.
    ///
    /// The entry is only kept in memory once the write succeeded.
    fn persist_active(&mut self, action: &str) -> Result<SaveOutcome, DemandError> {
        if !self.active.has_meaningful_content() {
            debug!(demand = %self.active.id, "nothing entered, not saving");
            return Ok(SaveOutcome::SkippedEmpty);
        }

        let now = OffsetDateTime::now_utc();
        let mut candidate = self.active.clone();
        candidate.audit_log.record(
            &self.active.id,
            &self.settings.session.user,
            action,
            None,
            None,
            now,
        );
        candidate.touch(now);
        candidate.progress = self.settings.progress.calculate(&candidate);

        let outcome = self.repo.save(&candidate).inspect_err(|e| {
            error!(demand = %candidate.id, "failed to save demand: {e}");
        })?;
        self.active = candidate;
        Ok(outcome)
    }

    pub fn save(&mut self) -> Result<SaveOutcome, DemandError> {
        self.guard()?;
        let outcome = self.persist_active("Saved demand")?;
        if outcome == SaveOutcome::Saved {
            info!(demand = %self.active.id, progress = self.active.progress, "saved demand");
        }
        Ok(outcome)
    }

    /// Write the active demand as it is. Edits carry their own audit
    /// entries, so no save entry is added.
    pub fn flush(&mut self) -> Result<SaveOutcome, DemandError> {
        self.guard()?;
        if !self.active.has_meaningful_content() {
            return Ok(SaveOutcome::SkippedEmpty);
        }
        self.repo.save(&self.active).inspect_err(|e| {
            error!(demand = %self.active.id, "failed to write demand: {e}");
        })
    }

    /// Make `id` the active demand.
    ///
    /// The target is loaded before anything else happens, so an unknown id
    /// leaves the session untouched. The outgoing demand is saved first if
    /// it has content; if that fails it stays active.
    pub fn switch_to(&mut self, id: &DemandId) -> Result<&Demand, DemandError> {
        self.guard()?;
        if self.active.id == *id {
            return Ok(&self.active);
        }

        let target = self.repo.load(id)?;
        self.persist_active(&format!("Switched to demand {id}"))?;
        info!(from = %self.active.id, to = %id, "switched demand");
        self.active = target;
        self.refresh_progress();
        Ok(&self.active)
    }

    /// Save the outgoing demand if it has content and start a blank one.
    pub fn create_new(&mut self) -> Result<&Demand, DemandError> {
        self.guard()?;
        self.persist_active("Started new demand")?;
        self.active = Demand::new(&self.settings.demand.id_prefix, OffsetDateTime::now_utc());
        info!(demand = %self.active.id, "started new demand");
        Ok(&self.active)
    }

    /// Remove a stored demand with its audit trail. Deleting the active
    /// demand leaves a blank one in its place.
    pub fn delete(&mut self, id: &DemandId) -> Result<(), DemandError> {
        self.guard()?;
        self.repo.delete(id)?;
        if self.active.id == *id {
            self.active = Demand::new(&self.settings.demand.id_prefix, OffsetDateTime::now_utc());
        }
        info!(demand = %id, "deleted demand");
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), DemandError> {
        let name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        self.edit("Updated demand name", None, Some("name"), |demand| {
            demand.name = name;
            Ok(())
        })
    }

    pub fn set_number(&mut self, number: &str) -> Result<(), DemandError> {
        let number = Some(number.trim().to_string()).filter(|n| !n.is_empty());
        self.edit("Updated demand number", None, Some("number"), |demand| {
            demand.number = number;
            Ok(())
        })
    }

    pub fn set_status(&mut self, status: DemandStatus) -> Result<(), DemandError> {
        self.edit(format!("Changed status to {status}"), None, Some("status"), |demand| {
            demand.status = status;
            Ok(())
        })
    }

    /// Store a value under `field` of `phase`. Metadata fields (leading `_`)
    /// are stored without an audit entry.
    pub fn set_field(
        &mut self,
        phase: Phase,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), DemandError> {
        let field = field.trim();
        if field.is_empty() {
            return Err(DemandError::validation("field name must not be empty"));
        }
        let value = value.into();

        if is_metadata_key(field) {
            self.guard()?;
            self.active.phases.get_mut(phase).set(field, value);
            return Ok(());
        }

        self.edit(format!("Updated {field}"), Some(phase), Some(field), |demand| {
            demand.phases.get_mut(phase).set(field, value);
            Ok(())
        })
    }

    /// Returns whether the field existed.
    pub fn clear_field(&mut self, phase: Phase, field: &str) -> Result<bool, DemandError> {
        self.guard()?;
        if self.active.phases.get(phase).get(field).is_none() {
            return Ok(false);
        }
        self.edit(format!("Cleared {field}"), Some(phase), Some(field), |demand| {
            demand.phases.get_mut(phase).remove(field);
            Ok(true)
        })
    }

    /// Replace the whole Build task list.
    pub fn set_tasks(&mut self, mut tasks: Vec<Task>) -> Result<(), DemandError> {
        let mut seen = std::collections::HashSet::new();
        for task in &mut tasks {
            if !seen.insert(task.task_id.clone()) {
                return Err(DemandError::validation(format!(
                    "duplicate task_id {}",
                    task.task_id
                )));
            }
            normalize_logged(task);
        }
        self.edit("Updated tasks", Some(Phase::Build), Some(TASKS_FIELD), |demand| {
            demand.set_tasks(&tasks);
            Ok(())
        })
    }

    /// Add a task, or replace the stored record with the same `task_id`.
    /// Other records, including ones that do not parse, are left as they are.
    pub fn upsert_task(&mut self, mut task: Task) -> Result<(), DemandError> {
        if task.task_id.trim().is_empty() {
            return Err(DemandError::validation("task_id must not be empty"));
        }
        normalize_logged(&mut task);
        let mut records = self.task_list()?;
        let action = match records
            .iter()
            .position(|r| record_task_id(r).as_deref() == Some(task.task_id.as_str()))
        {
            Some(index) => {
                records[index] = task.to_value();
                format!("Updated task {}", task.task_id)
            }
            None => {
                records.push(task.to_value());
                format!("Added task {}", task.task_id)
            }
        };
        self.edit(action, Some(Phase::Build), Some(TASKS_FIELD), |demand| {
            demand.phases.build.set(TASKS_FIELD, Value::Array(records));
            Ok(())
        })
    }

    pub fn remove_task(&mut self, task_id: &str) -> Result<(), DemandError> {
        let mut records = self.task_list()?;
        let index = records
            .iter()
            .position(|r| record_task_id(r).as_deref() == Some(task_id))
            .ok_or_else(|| DemandError::validation(format!("no task {task_id}")))?;
        records.remove(index);
        self.edit(
            format!("Removed task {task_id}"),
            Some(Phase::Build),
            Some(TASKS_FIELD),
            |demand| {
                demand.phases.build.set(TASKS_FIELD, Value::Array(records));
                Ok(())
            },
        )
    }

    fn task_list(&self) -> Result<Vec<Value>, DemandError> {
        match self.active.phases.build.get(TASKS_FIELD) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(value) if crate::domain::models::is_occupied(value) => Err(DemandError::validation(
                "build tasks hold free text, replace them with a task list first",
            )),
            _ => Ok(Vec::new()),
        }
    }

    pub fn add_milestone(&mut self, date: Date, label: &str) -> Result<(), DemandError> {
        let label = label.trim().to_string();
        if label.is_empty() {
            return Err(DemandError::validation("milestone needs a description"));
        }
        self.edit(format!("Added milestone {label}"), None, Some("milestones"), |demand| {
            demand.milestones.push(Milestone { date, label });
            Ok(())
        })
    }

    pub fn remove_milestone(&mut self, index: usize) -> Result<Milestone, DemandError> {
        if index >= self.active.milestones.len() {
            return Err(DemandError::validation(format!("no milestone at position {index}")));
        }
        self.edit("Removed milestone", None, Some("milestones"), |demand| {
            Ok(demand.milestones.remove(index))
        })
    }

    /// Start date of the phase-level schedule; `None` falls back to the
    /// demand's creation date.
    pub fn set_schedule_start(&mut self, start: Option<Date>) -> Result<(), DemandError> {
        self.edit("Updated schedule start", None, Some("schedule"), |demand| {
            demand.schedule.start_date = start;
            Ok(())
        })
    }

    pub fn set_phase_duration(
        &mut self,
        phase: Phase,
        days: Option<u32>,
    ) -> Result<(), DemandError> {
        match days {
            Some(0) => {
                return Err(DemandError::validation("phase duration must be at least one day"))
            }
            Some(days) if days > MAX_PHASE_DAYS => {
                return Err(DemandError::validation(format!(
                    "phase duration cannot exceed {MAX_PHASE_DAYS} days"
                )))
            }
            _ => {}
        }
        self.edit("Updated phase duration", Some(phase), Some("schedule"), |demand| {
            match days {
                Some(days) => demand.schedule.phase_days.insert(phase, days),
                None => demand.schedule.phase_days.remove(&phase),
            };
            Ok(())
        })
    }

    pub fn attach_file(&mut self, phase: Phase, file: FileRef) -> Result<(), DemandError> {
        self.edit(format!("Attached file {}", file.name), Some(phase), None, |demand| {
            demand.attachments.entry(phase).or_default().files.push(file);
            Ok(())
        })
    }

    /// Store the bytes and attach the resulting reference.
    pub fn upload<S: AttachmentStore>(
        &mut self,
        store: &S,
        phase: Phase,
        filename: &str,
        bytes: &[u8],
    ) -> Result<FileRef, DemandError> {
        self.guard()?;
        let file = store.put(&self.active.id, phase, bytes, filename)?;
        self.attach_file(phase, file.clone())?;
        Ok(file)
    }

    pub fn attach_url(&mut self, phase: Phase, link: UrlRef) -> Result<(), DemandError> {
        let url = link.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DemandError::validation(format!("not a web link: {url}")));
        }
        self.edit(format!("Added link {url}"), Some(phase), None, |demand| {
            demand.attachments.entry(phase).or_default().urls.push(link);
            Ok(())
        })
    }

    /// Append to the chat history. Chat turns are content, not audited actions.
    pub fn record_chat(&mut self, role: ChatRole, text: &str) -> Result<(), DemandError> {
        self.guard()?;
        let now = OffsetDateTime::now_utc();
        self.active.chat_history.push(ChatMessage {
            role,
            text: text.to_string(),
            timestamp: now,
        });
        self.active.touch(now);
        Ok(())
    }

    /// Store assistant output under `field` of `phase`.
    pub fn insert_generated(
        &mut self,
        phase: Phase,
        field: &str,
        content: GeneratedContent,
    ) -> Result<(), DemandError> {
        let field = field.trim();
        if field.is_empty() || is_metadata_key(field) {
            return Err(DemandError::validation(format!(
                "cannot store generated content in {field:?}"
            )));
        }
        self.edit(
            format!("AI generated content inserted into {field}"),
            Some(phase),
            Some(field),
            |demand| {
                demand.phases.get_mut(phase).set(field, content.into_value());
                Ok(())
            },
        )
    }

    pub fn progress(&self) -> u8 {
        self.settings.progress.calculate(&self.active)
    }

    pub fn completion(&self) -> Vec<PhaseCompletion> {
        self.settings.progress.details(&self.active)
    }

    pub fn timeline(&self) -> Timeline {
        timeline::derive(&self.active, &self.settings.timeline, &self.settings.progress)
    }
}

fn normalize_logged(task: &mut Task) {
    let adjustments = task.normalize();
    if adjustments.clamped_end_date {
        warn!(task_id = %task.task_id, "end date before start date, clamped");
    }
    if adjustments.forced_progress {
        debug!(task_id = %task.task_id, "completed task progress set to 100");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::InMemoryDemandRepository;
    use crate::domain::models::{DemandSummary, TaskStatus};
    use crate::domain::timeline::TimelineMode;
    use time::macros::date;

    fn settings() -> Settings {
        Settings::default()
    }

    fn stored(repo: &InMemoryDemandRepository, name: &str, created_at: OffsetDateTime) -> DemandId {
        let mut demand = Demand::new("LOG", created_at);
        demand.name = Some(name.to_string());
        repo.save(&demand).unwrap();
        demand.id
    }

    /// Loads succeed, saves fail.
    struct ReadOnlyRepository(InMemoryDemandRepository);

    impl DemandRepository for ReadOnlyRepository {
        fn save(&self, demand: &Demand) -> Result<SaveOutcome, DemandError> {
            Err(DemandError::storage(Some(&demand.id), "disk full"))
        }

        fn load(&self, id: &DemandId) -> Result<Demand, DemandError> {
            self.0.load(id)
        }

        fn list_summaries(&self) -> Result<Vec<DemandSummary>, DemandError> {
            self.0.list_summaries()
        }

        fn delete(&self, id: &DemandId) -> Result<(), DemandError> {
            self.0.delete(id)
        }
    }

    #[test]
    fn clock_thresholds() {
        let t0 = OffsetDateTime::now_utc();
        let clock = SessionClock::new(t0, &SessionSettings::default());
        assert!(matches!(
            clock.status_at(t0 + Duration::minutes(10)),
            SessionStatus::Active { .. }
        ));
        assert_eq!(
            clock.status_at(t0 + Duration::minutes(50)),
            SessionStatus::NearingExpiry {
                remaining: Duration::minutes(10)
            }
        );
        assert!(clock.status_at(t0 + Duration::minutes(60)).is_expired());
        assert!(matches!(clock.status_at(t0 - Duration::minutes(5)), SessionStatus::Active { .. }));
    }

    #[test]
    fn opening_an_old_demand_keeps_the_session_valid() {
        let repo = InMemoryDemandRepository::new();
        let old = stored(&repo, "Legacy", OffsetDateTime::now_utc() - Duration::days(400));
        let mut session = Session::start(&repo, settings());

        session.switch_to(&old).unwrap();
        assert!(matches!(session.status(), SessionStatus::Active { .. }));
        session.set_field(Phase::Ideation, "goals", "Still relevant").unwrap();
        assert_eq!(session.active().id, old);
    }

    #[test]
    fn switching_away_from_an_empty_demand_writes_nothing() {
        let repo = InMemoryDemandRepository::new();
        let target = stored(&repo, "Target", OffsetDateTime::now_utc());
        let mut session = Session::start(&repo, settings());
        let blank = session.active().id.clone();

        session.switch_to(&target).unwrap();
        assert_eq!(repo.len(), 1);
        assert!(matches!(repo.load(&blank), Err(DemandError::NotFound(_))));
        assert!(repo.load(&target).unwrap().audit_log.is_empty());
    }

    #[test]
    fn a_name_alone_is_enough_to_persist_on_switch() {
        let repo = InMemoryDemandRepository::new();
        let target = stored(&repo, "Target", OffsetDateTime::now_utc());
        let mut session = Session::start(&repo, settings());
        let outgoing = session.active().id.clone();
        session.set_name("X").unwrap();

        session.switch_to(&target).unwrap();
        let saved = repo.load(&outgoing).unwrap();
        assert_eq!(saved.name.as_deref(), Some("X"));
        let last = saved.audit_log.last().unwrap();
        assert_eq!(last.action, format!("Switched to demand {target}"));
        assert_eq!(last.trace_id, outgoing.as_str());
    }

    #[test]
    fn unknown_target_leaves_the_session_untouched() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        session.set_name("Keep me").unwrap();
        let before = session.active().clone();

        let missing = DemandId::parse("LOG-2025-FFFFFFFF").unwrap();
        assert!(matches!(session.switch_to(&missing), Err(DemandError::NotFound(_))));
        assert_eq!(session.active(), &before);
        assert!(repo.is_empty());
    }

    #[test]
    fn failed_save_keeps_the_outgoing_demand_active() {
        let inner = InMemoryDemandRepository::new();
        let target = stored(&inner, "Target", OffsetDateTime::now_utc());
        let mut session = Session::start(ReadOnlyRepository(inner), settings());
        session.set_name("Unsaved work").unwrap();
        let outgoing = session.active().clone();

        match session.switch_to(&target) {
            Err(DemandError::Storage { id, .. }) => {
                assert_eq!(id.as_deref(), Some(outgoing.id.as_str()))
            }
            other => panic!("expected storage failure, got {other:?}"),
        }
        assert_eq!(session.active(), &outgoing);
    }

    #[test]
    fn saving_an_empty_demand_is_skipped() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        assert_eq!(session.save().unwrap(), SaveOutcome::SkippedEmpty);
        assert!(repo.is_empty());
        assert!(session.active().audit_log.is_empty());
    }

    #[test]
    fn flush_writes_without_a_save_entry() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        assert_eq!(session.flush().unwrap(), SaveOutcome::SkippedEmpty);

        session.set_status(DemandStatus::Approved).unwrap();
        assert_eq!(session.flush().unwrap(), SaveOutcome::Saved);
        let stored = repo.load(&session.active().id).unwrap();
        assert_eq!(stored.status, DemandStatus::Approved);
        assert_eq!(stored.audit_log.len(), 1);
        assert_eq!(stored.audit_log.last().unwrap().action, "Changed status to Approved");
    }

    #[test]
    fn expired_session_rejects_mutations_until_reset() {
        let repo = InMemoryDemandRepository::new();
        let started = OffsetDateTime::now_utc() - Duration::minutes(61);
        let mut session = Session::resume(&repo, settings(), started, None).unwrap();

        assert!(matches!(
            session.set_name("Too late"),
            Err(DemandError::SessionExpired { ttl_minutes: 60 })
        ));
        assert!(session.status().is_expired());
        assert!(session.active().name.is_none());

        session.reset();
        session.set_name("Back again").unwrap();
        assert_eq!(session.save().unwrap(), SaveOutcome::Saved);
    }

    #[test]
    fn resume_reopens_the_active_demand() {
        let repo = InMemoryDemandRepository::new();
        let id = stored(&repo, "Ongoing", OffsetDateTime::now_utc());
        let session =
            Session::resume(&repo, settings(), OffsetDateTime::now_utc(), Some(&id)).unwrap();
        assert_eq!(session.active().id, id);

        let gone = DemandId::parse("LOG-2025-DEADBEEF").unwrap();
        let session =
            Session::resume(&repo, settings(), OffsetDateTime::now_utc(), Some(&gone)).unwrap();
        assert_ne!(session.active().id, gone);
    }

    #[test]
    fn edits_are_audited_and_rescored() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        session.set_field(Phase::Ideation, "problem_statement", "Slow invoicing").unwrap();
        session.set_field(Phase::Ideation, "goals", "Halve cycle time").unwrap();

        let demand = session.active();
        let last = demand.audit_log.last().unwrap();
        assert_eq!(last.tab_name.as_deref(), Some("ideation"));
        assert_eq!(last.field_name.as_deref(), Some("goals"));
        assert_eq!(last.trace_id, demand.id.as_str());
        assert_eq!(last.user, "local-user");
        assert_eq!(demand.progress, 11);
        assert_eq!(session.progress(), 11);
    }

    #[test]
    fn metadata_fields_are_not_audited() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        session.set_field(Phase::Design, "_active_tab", "design").unwrap();
        assert!(session.active().audit_log.is_empty());
        assert_eq!(session.save().unwrap(), SaveOutcome::SkippedEmpty);
    }

    #[test]
    fn upsert_and_remove_tasks() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        let task = Task::new("T1", "Setup", date!(2024 - 11 - 15), date!(2024 - 11 - 22));
        session.upsert_task(task.clone()).unwrap();
        session
            .upsert_task(task.with_status(TaskStatus::Completed).with_progress(20))
            .unwrap();

        let tasks = session.active().tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].as_ref().unwrap().progress, 100);
        assert!(matches!(
            session.timeline(),
            Timeline::Scheduled(s) if s.mode == TimelineMode::Detailed
        ));

        assert!(matches!(session.remove_task("T2"), Err(DemandError::Validation(_))));
        session.remove_task("T1").unwrap();
        assert!(session.active().task_records().is_empty());
    }

    #[test]
    fn duplicate_task_ids_are_rejected() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        let a = Task::new("T1", "A", date!(2024 - 11 - 01), date!(2024 - 11 - 02));
        let b = Task::new("T1", "B", date!(2024 - 11 - 03), date!(2024 - 11 - 04));
        assert!(matches!(session.set_tasks(vec![a, b]), Err(DemandError::Validation(_))));
    }

    #[test]
    fn schedule_and_milestone_edits() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        assert!(session.set_phase_duration(Phase::Build, Some(0)).is_err());
        session.set_phase_duration(Phase::Build, Some(30)).unwrap();
        session.set_schedule_start(Some(date!(2025 - 01 - 06))).unwrap();
        session.add_milestone(date!(2025 - 02 - 01), "Steering committee").unwrap();
        assert!(session.add_milestone(date!(2025 - 02 - 01), "  ").is_err());

        let removed = session.remove_milestone(0).unwrap();
        assert_eq!(removed.label, "Steering committee");
        assert!(session.remove_milestone(0).is_err());
        assert_eq!(session.active().schedule.phase_days[&Phase::Build], 30);
    }

    #[test]
    fn oversized_phase_duration_is_rejected() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        let audit_before = session.active().audit_log.len();

        let result = session.set_phase_duration(Phase::Build, Some(MAX_PHASE_DAYS + 1));
        assert!(matches!(result, Err(DemandError::Validation(_))));
        assert!(session.active().schedule.phase_days.is_empty());
        assert_eq!(session.active().audit_log.len(), audit_before);

        session.set_phase_duration(Phase::Build, Some(MAX_PHASE_DAYS)).unwrap();
        assert!(matches!(session.timeline(), Timeline::Scheduled(_)));
    }

    #[test]
    fn deleting_the_active_demand_starts_a_blank_one() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        session.set_name("Short lived").unwrap();
        session.save().unwrap();
        let id = session.active().id.clone();

        session.delete(&id).unwrap();
        assert!(repo.is_empty());
        assert_ne!(session.active().id, id);
        assert!(!session.active().has_meaningful_content());
    }

    #[test]
    fn generated_lists_are_stored_as_arrays() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        session
            .insert_generated(
                Phase::Requirements,
                "user_stories",
                GeneratedContent::List(vec!["As a clerk".into(), "As a CFO".into()]),
            )
            .unwrap();
        let data = &session.active().phases.requirements;
        assert_eq!(data.get("user_stories").unwrap().as_array().unwrap().len(), 2);
        assert!(session
            .active()
            .audit_log
            .last()
            .unwrap()
            .action
            .starts_with("AI generated content"));
    }

    #[test]
    fn create_new_saves_outgoing_work() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        session.record_chat(ChatRole::User, "Draft me a vision").unwrap();
        let first = session.active().id.clone();

        let fresh = session.create_new().unwrap().id.clone();
        assert_ne!(fresh, first);
        assert_eq!(repo.load(&first).unwrap().chat_history.len(), 1);
    }

    #[test]
    fn links_must_be_web_urls() {
        let repo = InMemoryDemandRepository::new();
        let mut session = Session::start(&repo, settings());
        let link = |url: &str| UrlRef {
            title: "Wiki".into(),
            url: url.into(),
            description: String::new(),
            added_at: OffsetDateTime::now_utc(),
        };
        assert!(session.attach_url(Phase::Design, link("file:///etc/passwd")).is_err());
        session.attach_url(Phase::Design, link("https://wiki.example/arch")).unwrap();
        assert_eq!(session.active().attachments_for(Phase::Design).unwrap().urls.len(), 1);
    }
}

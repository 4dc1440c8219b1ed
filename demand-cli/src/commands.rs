use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use demand_core::adapters::outbound::{FsAttachmentStore, JsonFileRepository};
use demand_core::domain::assist::{self, PlainTextExtractor};
use demand_core::domain::export::{export_json, export_markdown};
use demand_core::domain::models::{parse_date, DemandStatus, Task, TaskStatus, UrlRef};
use demand_core::domain::ports::outbound::{DemandRepository, SaveOutcome};
use demand_core::{DemandId, Phase, Session, Settings};
use serde_json::Value;
use time::{Date, OffsetDateTime};

use crate::assistant::CommandAssistant;
use crate::cli::{
    Cli, Commands, ExportFormat, MilestoneCommand, ScheduleCommand, SessionCommand, TaskCommand,
};
use crate::render;
use crate::session_store::{SessionFile, SessionStore};

pub fn run(cli: Cli, settings: Settings) -> Result<()> {
    if let Commands::ConfigPath = cli.command {
        return config_path(cli.config.as_deref());
    }

    let data_dir = settings.storage.data_dir.clone();
    let repo = JsonFileRepository::open(&data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    let attachments = FsAttachmentStore::new(settings.storage.attachments_dir());
    let store = SessionStore::in_data_dir(&data_dir);

    let mut session = match store.load()? {
        Some(file) => Session::resume(&repo, settings, file.started_at, file.active_demand.as_ref())
            .context("Failed to resume session")?,
        None => Session::start(&repo, settings),
    };

    let result = dispatch(cli.command, &mut session, &repo, &attachments);

    store.save(&SessionFile {
        started_at: session.started_at(),
        active_demand: Some(session.active().id.clone()),
    })?;
    result
}

fn dispatch(
    command: Commands,
    session: &mut Session<&JsonFileRepository>,
    repo: &JsonFileRepository,
    attachments: &FsAttachmentStore,
) -> Result<()> {
    match command {
        Commands::New => {
            let id = session.create_new()?.id.clone();
            println!("Started {id}");
        }
        Commands::Open { id } => {
            let id = demand_id(&id)?;
            let demand = session.switch_to(&id)?;
            println!("Opened {}", demand.id);
        }
        Commands::List => {
            let entries = repo.list_summaries()?;
            print!("{}", render::summaries(&entries, Some(session.active().id.as_str())));
        }
        Commands::Search { query } => {
            let entries = repo.search(&query)?;
            print!("{}", render::summaries(&entries, Some(session.active().id.as_str())));
        }
        Commands::Stats => print!("{}", render::statistics(&repo.statistics()?)),
        Commands::Show { json } => {
            if json {
                println!("{}", export_json(session.active())?);
            } else {
                print!("{}", render::demand(session.active()));
            }
        }
        Commands::Set { phase, field, value } => {
            session.set_field(phase_arg(&phase)?, &field, field_value(value))?;
            flush(session)?;
        }
        Commands::Unset { phase, field } => {
            if session.clear_field(phase_arg(&phase)?, &field)? {
                flush(session)?;
            } else {
                println!("{field} is not set");
            }
        }
        Commands::Rename { name } => {
            session.set_name(&name)?;
            flush(session)?;
        }
        Commands::Number { number } => {
            session.set_number(&number)?;
            flush(session)?;
        }
        Commands::Status { status } => {
            let status = DemandStatus::from_str(&status)
                .map_err(|_| anyhow::anyhow!("unknown status {status:?}"))?;
            session.set_status(status)?;
            flush(session)?;
        }
        Commands::Task(command) => {
            match command {
                TaskCommand::Add {
                    id,
                    name,
                    start,
                    end,
                    status,
                    assignee,
                    progress,
                    depends_on,
                    description,
                } => {
                    let start = date_arg(&start)?;
                    let end = end.as_deref().map(date_arg).transpose()?.unwrap_or(start);
                    let status = TaskStatus::from_str(&status)
                        .map_err(|_| anyhow::anyhow!("unknown task status {status:?}"))?;
                    let mut task = Task::new(id, name, start, end)
                        .with_status(status)
                        .with_progress(progress.min(100))
                        .with_dependencies(depends_on);
                    if let Some(assignee) = assignee {
                        task = task.with_assignee(assignee);
                    }
                    if let Some(description) = description {
                        task.description = description;
                    }
                    session.upsert_task(task)?;
                }
                TaskCommand::Remove { id } => session.remove_task(&id)?,
            }
            flush(session)?;
        }
        Commands::Milestone(command) => {
            match command {
                MilestoneCommand::Add { date, description } => {
                    session.add_milestone(date_arg(&date)?, &description)?
                }
                MilestoneCommand::Remove { index } => {
                    let removed = session.remove_milestone(index)?;
                    println!("Removed milestone {} {}", removed.date, removed.label);
                }
            }
            flush(session)?;
        }
        Commands::Schedule(command) => {
            match command {
                ScheduleCommand::Start { date } => {
                    session.set_schedule_start(date.as_deref().map(date_arg).transpose()?)?
                }
                ScheduleCommand::Phase { phase, days } => {
                    session.set_phase_duration(phase_arg(&phase)?, days)?
                }
            }
            flush(session)?;
        }
        Commands::Attach { phase, file } => {
            let phase = phase_arg(&phase)?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("Attachment path has no file name")?;
            let stored = session.upload(attachments, phase, &filename, &bytes)?;
            flush(session)?;
            println!("Attached {} ({} bytes)", stored.name, stored.size);
        }
        Commands::Link {
            phase,
            url,
            title,
            description,
        } => {
            session.attach_url(
                phase_arg(&phase)?,
                UrlRef {
                    title,
                    url,
                    description,
                    added_at: OffsetDateTime::now_utc(),
                },
            )?;
            flush(session)?;
        }
        Commands::Save => match session.save()? {
            SaveOutcome::Saved => println!("Saved {}", session.active().id),
            SaveOutcome::SkippedEmpty => println!("Nothing to save yet"),
        },
        Commands::Progress => print!(
            "{}",
            render::completion(&session.completion(), session.progress())
        ),
        Commands::Timeline { json } => {
            let timeline = session.timeline();
            if json {
                println!("{}", serde_json::to_string_pretty(&timeline)?);
            } else {
                print!("{}", render::timeline(&timeline));
            }
        }
        Commands::Export { format, output } => {
            let text = match format {
                ExportFormat::Markdown => {
                    export_markdown(session.active(), &session.settings().progress)
                }
                ExportFormat::Json => export_json(session.active())?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported {} to {}", session.active().id, path.display());
                }
                None => print!("{text}"),
            }
        }
        Commands::Prompt { phase, instruction } => {
            let phase = phase_arg(&phase)?;
            let extracts = assist::extract_attachments(
                attachments,
                &PlainTextExtractor,
                session.active(),
                phase,
            );
            println!("{}", assist::build_prompt(session.active(), phase, &instruction, &extracts));
        }
        Commands::Ask {
            phase,
            field,
            instruction,
            list,
        } => {
            let Some(command) = session.settings().assistant.command.clone() else {
                bail!("No assistant configured; set assistant.command or use `demand prompt`");
            };
            let phase = phase_arg(&phase)?;
            let extracts = assist::extract_attachments(
                attachments,
                &PlainTextExtractor,
                session.active(),
                phase,
            );
            let content = assist::generate(
                &CommandAssistant::new(command),
                session.active(),
                phase,
                &instruction,
                &extracts,
                list,
            )?;
            session.insert_generated(phase, &field, content)?;
            flush(session)?;
            println!("Stored reply in {phase}.{field}");
        }
        Commands::Delete { id } => {
            let id = demand_id(&id)?;
            session.delete(&id)?;
            attachments.purge(&id)?;
            println!("Deleted {id}");
        }
        Commands::RebuildIndex => {
            let count = repo.rebuild_index()?;
            println!("Indexed {count} demand(s)");
        }
        Commands::Session(SessionCommand::Status) => {
            print!("{}", render::session(session.status()));
            println!("Active demand: {}", session.active().id);
        }
        Commands::Session(SessionCommand::Reset) => {
            session.reset();
            print!("{}", render::session(session.status()));
        }
        Commands::ConfigPath => unreachable!("handled before the session is opened"),
    }
    Ok(())
}

fn flush<R: DemandRepository>(session: &mut Session<R>) -> Result<()> {
    session
        .flush()
        .with_context(|| format!("Failed to write {}", session.active().id))?;
    Ok(())
}

fn config_path(custom: Option<&Path>) -> Result<()> {
    let path = match custom {
        Some(path) => path.to_path_buf(),
        None => Settings::config_path().context("Cannot determine config directory")?,
    };
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(&Settings::default())
            .context("Failed to render default config")?;
        std::fs::write(&path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    println!("{}", path.display());
    Ok(())
}

fn phase_arg(raw: &str) -> Result<Phase> {
    Phase::from_str(raw.trim()).map_err(|_| {
        let names: Vec<String> = Phase::ALL.iter().map(ToString::to_string).collect();
        anyhow::anyhow!("unknown phase {raw:?}, expected one of {}", names.join(", "))
    })
}

fn demand_id(raw: &str) -> Result<DemandId> {
    DemandId::parse(raw.trim()).with_context(|| format!("{raw:?} is not a demand id"))
}

fn date_arg(raw: &str) -> Result<Date> {
    parse_date(raw).with_context(|| format!("{raw:?} is not a YYYY-MM-DD date"))
}

/// JSON when the text parses as JSON, the raw text otherwise.
fn field_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.storage.data_dir = dir.to_path_buf();
        settings
    }

    fn demand(dir: &Path, args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(std::iter::once("demand").chain(args.iter().copied()))?;
        run(cli, settings_in(dir))
    }

    #[test]
    fn values_parse_as_json_when_possible() {
        assert_eq!(field_value("42".into()), json!(42));
        assert_eq!(field_value("[\"a\"]".into()), json!(["a"]));
        assert_eq!(field_value("plain words".into()), json!("plain words"));
    }

    #[test]
    fn edits_persist_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        demand(dir.path(), &["rename", "Invoice automation"]).unwrap();
        demand(dir.path(), &["set", "ideation", "goals", "Halve cycle time"]).unwrap();
        demand(
            dir.path(),
            &["task", "add", "T1", "Setup", "--start", "2024-11-15", "--end", "2024-11-22"],
        )
        .unwrap();

        let repo = JsonFileRepository::open(dir.path()).unwrap();
        let summaries = repo.list_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        let stored = repo.load(&summaries[0].id).unwrap();
        assert_eq!(stored.name.as_deref(), Some("Invoice automation"));
        assert_eq!(stored.phases.ideation.get_str("goals"), Some("Halve cycle time"));
        assert!(stored.has_detailed_tasks());
        assert_eq!(stored.audit_log.len(), 3);
    }

    #[test]
    fn new_demand_leaves_previous_work_stored() {
        let dir = tempfile::tempdir().unwrap();
        demand(dir.path(), &["rename", "First"]).unwrap();
        demand(dir.path(), &["new"]).unwrap();
        demand(dir.path(), &["new"]).unwrap();

        let repo = JsonFileRepository::open(dir.path()).unwrap();
        assert_eq!(repo.list_summaries().unwrap().len(), 1);
    }

    #[test]
    fn bad_arguments_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(demand(dir.path(), &["set", "retro", "x", "y"]).is_err());
        assert!(demand(dir.path(), &["open", "not-an-id"]).is_err());
        assert!(demand(dir.path(), &["milestone", "add", "tomorrow", "Go-live"]).is_err());
        assert!(
            demand(dir.path(), &["ask", "design", "architecture_overview", "Propose one"]).is_err()
        );
    }

    #[test]
    fn delete_removes_document_and_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("notes.txt");
        std::fs::write(&upload, "kickoff notes").unwrap();
        let upload = upload.to_string_lossy().into_owned();

        demand(dir.path(), &["attach", "ideation", &upload]).unwrap();
        let repo = JsonFileRepository::open(dir.path()).unwrap();
        let id = repo.list_summaries().unwrap()[0].id.clone();
        assert!(dir.path().join("attachments").join(id.as_str()).exists());

        demand(dir.path(), &["delete", id.as_str()]).unwrap();
        assert!(repo.list_summaries().unwrap().is_empty());
        assert!(!dir.path().join("attachments").join(id.as_str()).exists());
    }

    #[test]
    fn session_reset_replaces_a_stale_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::in_data_dir(dir.path());
        let stale = OffsetDateTime::now_utc() - time::Duration::days(1);
        store
            .save(&SessionFile {
                started_at: stale,
                active_demand: None,
            })
            .unwrap();

        assert!(demand(dir.path(), &["rename", "Too late"]).is_err());
        demand(dir.path(), &["session", "reset"]).unwrap();

        let refreshed = store.load().unwrap().unwrap();
        assert!(refreshed.started_at > stale + time::Duration::hours(23));
        demand(dir.path(), &["rename", "Fresh start"]).unwrap();
    }

    #[test]
    fn config_path_writes_a_loadable_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        config_path(Some(&path)).unwrap();
        let settings = demand_core::read_config(Some(&path)).unwrap();
        assert_eq!(settings.session.ttl_minutes, 60);
        assert_eq!(settings.progress, Settings::default().progress);
    }
}

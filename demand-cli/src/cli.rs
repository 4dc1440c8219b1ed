use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "demand")]
#[command(about = "Track IT demands through their nine-phase lifecycle")]
pub struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Save the active demand if it has content and start a new one
    New,
    /// Make a stored demand the active one
    Open { id: String },
    /// List stored demands, most recently modified first
    List,
    /// Search stored demands by id, number, name or title
    Search { query: String },
    /// Portfolio statistics
    Stats,
    /// Show the active demand
    Show {
        /// Print the full JSON document
        #[arg(long)]
        json: bool,
    },
    /// Set a phase field; the value is parsed as JSON when possible
    Set {
        phase: String,
        field: String,
        value: String,
    },
    /// Remove a phase field
    Unset { phase: String, field: String },
    /// Set the demand name
    Rename { name: String },
    /// Set the demand number
    Number { number: String },
    /// Set the demand status
    Status { status: String },
    /// Edit Build tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Edit timeline milestones
    #[command(subcommand)]
    Milestone(MilestoneCommand),
    /// Adjust the phase-level schedule
    #[command(subcommand)]
    Schedule(ScheduleCommand),
    /// Upload a file to a phase
    Attach { phase: String, file: PathBuf },
    /// Add a web link to a phase
    Link {
        phase: String,
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Save the active demand
    Save,
    /// Completion per phase and overall
    Progress,
    /// Print the timeline
    Timeline {
        /// Print the derived schedule as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the active demand
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the assistant prompt for a phase
    Prompt {
        phase: String,
        instruction: String,
    },
    /// Ask the configured assistant and store the reply in a phase field
    Ask {
        phase: String,
        field: String,
        instruction: String,
        /// Store the reply as a list of items
        #[arg(long)]
        list: bool,
    },
    /// Delete a stored demand and its attachments
    Delete { id: String },
    /// Rebuild the index from the stored documents
    RebuildIndex,
    /// Inspect or reset the editing session
    #[command(subcommand)]
    Session(SessionCommand),
    /// Print config path and create default file if missing
    ConfigPath,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Add a task or replace the one with the same id
    Add {
        id: String,
        name: String,
        /// YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// YYYY-MM-DD; defaults to the start date
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value = "Planned")]
        status: String,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, default_value_t = 0)]
        progress: u8,
        /// Comma separated task ids this task waits for
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Remove { id: String },
}

#[derive(Debug, Subcommand)]
pub enum MilestoneCommand {
    Add { date: String, description: String },
    /// Remove by position as shown in `demand show`
    Remove { index: usize },
}

#[derive(Debug, Subcommand)]
pub enum ScheduleCommand {
    /// Start date of the phase schedule; omit to use the creation date
    Start { date: Option<String> },
    /// Length of a phase in days; omit to use the configured default
    Phase { phase: String, days: Option<u32> },
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    Status,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Markdown,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_task_command() {
        let cli = Cli::try_parse_from([
            "demand",
            "task",
            "add",
            "T2",
            "Integrate",
            "--start",
            "2024-11-20",
            "--end",
            "2024-12-05",
            "--status",
            "In Progress",
            "--depends-on",
            "T1,T0",
        ])
        .unwrap();
        match cli.command {
            Commands::Task(TaskCommand::Add { id, depends_on, end, .. }) => {
                assert_eq!(id, "T2");
                assert_eq!(depends_on, ["T1", "T0"]);
                assert_eq!(end.as_deref(), Some("2024-12-05"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn export_defaults_to_markdown() {
        let cli = Cli::try_parse_from(["demand", "export"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                format: ExportFormat::Markdown,
                output: None
            }
        ));
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["demand", "list", "--config", "/tmp/demand.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/demand.toml")));
    }
}

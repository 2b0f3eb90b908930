use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// File-backed task trees for events.
/// Each event's tasks live in `<dir>/<event>_tasks.json`, or at a path given via --db.
#[derive(Parser)]
#[command(name = "evt", version, about = "Event task tree manager")]
pub struct Cli {
    /// Data directory holding one task file per event.
    #[arg(long, global = true, env = "EVT_HOME")]
    pub dir: Option<PathBuf>,

    /// Event to work on. Defaults to the most recently changed one.
    #[arg(short, long, global = true, conflicts_with = "db")]
    pub event: Option<String>,

    /// Path to a task file, bypassing event lookup.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log debug output to stderr. A non-empty RUST_LOG takes precedence.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_tree_overrides() {
        let cli = Cli::try_parse_from(["evt", "tree", "--expand", "3", "--expand", "4", "--collapse", "1"])
            .unwrap();
        match cli.command {
            Commands::Tree { expand, collapse, .. } => {
                assert_eq!(expand, vec![3, 4]);
                assert_eq!(collapse, vec![1]);
            }
            _ => panic!("expected tree"),
        }
    }

    #[test]
    fn status_accepts_wire_names() {
        let cli = Cli::try_parse_from(["evt", "-e", "party", "status", "5", "in_progress"]).unwrap();
        assert_eq!(cli.event.as_deref(), Some("party"));
        assert!(matches!(
            cli.command,
            Commands::Status { id: 5, status: crate::fields::Status::InProgress }
        ));
    }

    #[test]
    fn event_and_db_conflict() {
        assert!(Cli::try_parse_from(["evt", "--db", "x.json", "-e", "p", "list"]).is_err());
    }
}

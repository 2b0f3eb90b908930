//! # evt - Event Task Trees
//!
//! A command-line task manager for events. Each event owns a flat list of
//! tasks; tasks may name a parent task, and the list is shown as a sorted,
//! collapsible tree with an optional terminal user interface (TUI).
//!
//! ## Key Features
//!
//! - **Forgiving parent references**: `parent_id`, `ParentId`, `parentId` and
//!   `parent-id`, numbers or numeric strings, are all understood
//! - **Always a tree**: parent loops are cut and tasks whose parent is missing
//!   are listed under their own heading instead of disappearing
//! - **Completion rule**: a task can only be completed once every subtask is
//! - **Multi-Event Support**: one JSON file per event in `~/.evt/`
//!
//! ## Quick Start
//!
//! ```bash
//! # Create an event and add tasks
//! evt new-event "Summer Party"
//! evt -e summer_party add "Book venue"
//! evt -e summer_party add "Pay deposit" --parent 1
//!
//! # Show the tree, opening task 1 regardless of its default
//! evt -e summer_party tree --expand 1
//!
//! # Load tasks fetched from the service
//! evt -e summer_party import tasks.json
//!
//! # Browse interactively
//! evt ui
//! ```
//!
//! Pass `-v` (or set `RUST_LOG=evt=debug`) to see repaired parent references
//! on stderr. A non-empty `RUST_LOG` takes precedence over `-v`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod cmd;
pub mod db;
pub mod error;
pub mod event;
pub mod fields;
pub mod hierarchy;
pub mod rules;
pub mod task;
pub mod tui {
    pub mod app;
    pub mod colors;
    pub mod enums;
    pub mod run;
    pub mod utils;
}

use cli::Cli;
use cmd::*;
use db::TaskList;
use error::Result;
use event::{most_recent_event, Event};

/// Filter enabling debug output for this crate's own targets.
const VERBOSE_DIRECTIVE: &str = concat!(env!("CARGO_CRATE_NAME"), "=debug");

/// Log filter: a valid, non-empty `RUST_LOG` wins; otherwise `-v` turns on
/// debug output for this crate and everything else stays at `warn`.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    if verbose {
        EnvFilter::new(VERBOSE_DIRECTIVE)
    } else {
        EnvFilter::new("warn")
    }
}

fn init_tracing(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Data directory: `--dir`/`EVT_HOME`, else `$HOME/.evt`.
fn data_dir(cli: &Cli) -> PathBuf {
    if let Some(dir) = &cli.dir {
        return dir.clone();
    }
    if let Some(db) = &cli.db {
        return db
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".evt")
}

/// Task file for commands that work on a single event.
/// `--db` wins, then `--event`, then the most recently changed event; with
/// no events at all a `default` event is created.
fn resolve_task_file(cli: &Cli, dir: &Path) -> Result<PathBuf> {
    if let Some(db) = &cli.db {
        return Ok(db.clone());
    }
    if let Some(name) = &cli.event {
        return Ok(Event::new(name, dir).file_path);
    }
    if let Some(event) = most_recent_event(dir)? {
        debug!(event = %event.name, "using most recent event");
        return Ok(event.file_path);
    }
    std::fs::create_dir_all(dir)?;
    let event = Event::new("default", dir);
    event.create_if_not_exists()?;
    Ok(event.file_path)
}

fn run(cli: Cli) -> Result<()> {
    let dir = data_dir(&cli);

    // Commands that span every event.
    match &cli.command {
        Commands::Events => return cmd_events(&dir),
        Commands::NewEvent { name } => {
            std::fs::create_dir_all(&dir)?;
            return cmd_new_event(&dir, name);
        }
        Commands::Mine { user } => return cmd_mine(&dir, *user),
        Commands::Completions { shell } => return cmd_completions(*shell),
        _ => {}
    }

    let db_path = resolve_task_file(&cli, &dir)?;
    debug!(path = %db_path.display(), "task file");
    let mut list = TaskList::load(&db_path)?;

    match cli.command {
        Commands::Ui => cmd_ui(&db_path),

        Commands::Tree { expand, collapse, format } => cmd_tree(&list, expand, collapse, format),

        Commands::List { status } => cmd_list(&list, status),

        Commands::View { id, children, parents } => cmd_view(&list, id, children, parents),

        Commands::Add { title, desc, parent, assignee, priority, points } =>
            cmd_add(&mut list, &db_path, title, desc, parent, assignee, priority, points),

        Commands::Update { id, title, desc, parent, clear_parent, assignee, priority, points } =>
            cmd_update(&mut list, &db_path, id, title, desc, parent, clear_parent, assignee, priority, points),

        Commands::Status { id, status } => cmd_status(&mut list, &db_path, id, status),

        Commands::Next { id } => cmd_next(&mut list, &db_path, id),

        Commands::Reopen { id } => cmd_reopen(&mut list, &db_path, id),

        Commands::Delete { id, cascade } => cmd_delete(&mut list, &db_path, id, cascade),

        Commands::Import { input, no_backup } => cmd_import(&mut list, &db_path, &input, no_backup),

        Commands::Events
        | Commands::NewEvent { .. }
        | Commands::Mine { .. }
        | Commands::Completions { .. } => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "command failed");
            if e.is_rejection() {
                eprintln!("Refused: {e}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::prelude::*;

    fn debug_enabled(filter: EnvFilter, target: &str) -> bool {
        let subscriber = tracing_subscriber::registry().with(filter);
        tracing::subscriber::with_default(subscriber, || match target {
            "evt::hierarchy" => tracing::enabled!(target: "evt::hierarchy", Level::DEBUG),
            _ => tracing::enabled!(target: "other_crate", Level::DEBUG),
        })
    }

    #[test]
    fn verbose_enables_crate_debug_logs() {
        assert_eq!(VERBOSE_DIRECTIVE, "evt=debug");
        assert!(debug_enabled(log_filter(true, None), "evt::hierarchy"));
        assert!(!debug_enabled(log_filter(true, None), "other_crate"));
    }

    #[test]
    fn quiet_by_default() {
        assert!(!debug_enabled(log_filter(false, None), "evt::hierarchy"));
        assert!(!debug_enabled(log_filter(false, Some("  ")), "evt::hierarchy"));
    }

    #[test]
    fn rust_log_takes_precedence_over_verbose() {
        assert!(!debug_enabled(log_filter(true, Some("warn")), "evt::hierarchy"));
        assert!(debug_enabled(log_filter(false, Some("evt=debug")), "evt::hierarchy"));
    }
}

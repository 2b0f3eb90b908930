//! Command implementations for the CLI interface.
//!
//! Every handler works on the flat task list of one event. Writes go through
//! `TaskList` and are followed by a fresh rebuild of the forest; nothing
//! patches a tree in place.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};
use tracing::info;

use crate::db::*;
use crate::error::{EvtError, Result};
use crate::event::{create_event, discover_events, tasks_for_assignee};
use crate::fields::*;
use crate::hierarchy::{build_hierarchy, ExpansionState, Forest};
use crate::task::{parse_feed, TaskRecord};
use crate::tui::run::run_tui;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive tree view.
    Ui,

    /// Print the task tree of the event.
    Tree {
        /// Show this task's children regardless of the default. May be repeated.
        #[arg(long)]
        expand: Vec<u64>,
        /// Hide this task's children regardless of the default. May be repeated.
        #[arg(long)]
        collapse: Vec<u64>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List tasks as a flat table.
    List {
        /// Filter by status.
        #[arg(long, value_enum)]
        status: Option<Status>,
    },

    /// View a single task.
    View {
        id: u64,
        /// Show child subtree.
        #[arg(long)]
        children: bool,
        /// Show ancestor chain.
        #[arg(long)]
        parents: bool,
    },

    /// Add a new task (status pending).
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Parent task ID.
        #[arg(long)]
        parent: Option<u64>,
        /// Assignee user ID.
        #[arg(long)]
        assignee: Option<u64>,
        /// Priority label, e.g. low | medium | high.
        #[arg(long)]
        priority: Option<String>,
        /// Story points.
        #[arg(long)]
        points: Option<u32>,
    },

    /// Update fields on a task.
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        /// Parent task ID.
        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<u64>,
        /// Detach from the parent.
        #[arg(long)]
        clear_parent: bool,
        #[arg(long)]
        assignee: Option<u64>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        points: Option<u32>,
    },

    /// Set a task's status. Completion requires every subtask to be completed.
    Status {
        id: u64,
        #[arg(value_enum)]
        status: Status,
    },

    /// Advance a task to its next status (pending, in progress, completed).
    Next { id: u64 },

    /// Reopen a task (status pending).
    Reopen { id: u64 },

    /// Delete a task.
    Delete {
        id: u64,
        /// Also delete everything below it.
        #[arg(long)]
        cascade: bool,
    },

    /// Replace the event's tasks with a task list fetched from the service.
    Import {
        /// JSON file: `{"tasks": [...], "total": n}` or a bare array.
        input: PathBuf,
        /// Skip the backup of the current task file.
        #[arg(long)]
        no_backup: bool,
    },

    /// List known events.
    Events,

    /// Create a new, empty event.
    NewEvent {
        /// Display name of the event.
        name: String,
    },

    /// Show tasks assigned to a user across every event.
    Mine {
        /// User ID.
        user: u64,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Launch the terminal user interface.
pub fn cmd_ui(db_path: &Path) -> Result<()> {
    run_tui(db_path)
}

/// Build the forest with the requested expansion overrides applied.
pub fn forest_with_overrides(list: &TaskList, expand: &[u64], collapse: &[u64]) -> Forest {
    let mut forest = list.forest();
    let mut state = ExpansionState::new();
    for &id in expand {
        state.expand(id);
    }
    for &id in collapse {
        state.collapse(id);
    }
    state.retain_known(&forest);
    state.apply(&mut forest);
    forest
}

/// Print the event's task tree.
pub fn cmd_tree(list: &TaskList, expand: Vec<u64>, collapse: Vec<u64>, format: OutputFormat) -> Result<()> {
    let forest = forest_with_overrides(list, &expand, &collapse);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&forest.to_nested())?);
        }
        OutputFormat::Text => {
            if forest.is_empty() {
                println!("No tasks.");
            }
            for line in render_forest(&forest) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// List tasks as a flat table ordered by id.
pub fn cmd_list(list: &TaskList, status: Option<Status>) -> Result<()> {
    let mut rows: Vec<&TaskRecord> = list
        .tasks
        .iter()
        .filter(|t| status.map_or(true, |s| t.status == s))
        .collect();
    rows.sort_by_key(|t| t.id);
    print_table(&rows);
    if status.is_none() && !rows.is_empty() {
        let counts: Vec<String> = Status::ALL
            .iter()
            .map(|s| {
                let n = rows.iter().filter(|t| t.status == *s).count();
                format!("{}: {n}", format_status(*s))
            })
            .collect();
        println!("\n{}", counts.join(", "));
    }
    Ok(())
}

/// View detailed information about a specific task.
pub fn cmd_view(list: &TaskList, id: u64, children: bool, parents: bool) -> Result<()> {
    let task = list.require(id)?;
    let forest = list.forest();
    let node = forest.get(id).ok_or(EvtError::TaskNotFound { id })?;
    let stats = forest.child_stats(id);

    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Status:       {}", format_status(task.status));
    println!("Priority:     {}", task.priority.as_deref().unwrap_or("-"));
    println!("Points:       {}", task.story_points.map(|p| p.to_string()).unwrap_or_else(|| "-".into()));
    println!("Assignee:     {}", task.assigned_to.map(|a| a.to_string()).unwrap_or_else(|| "-".into()));
    let parent = match node.parent_id {
        Some(p) if p == id => "- (self reference)".into(),
        Some(p) if forest.is_orphan(id) => format!("{p} (missing)"),
        Some(p) => p.to_string(),
        None if task.parent_id().is_some() => "- (loop broken)".into(),
        None => match task.raw_parent() {
            Some(raw) if !raw.is_null() && raw.as_u64() != Some(0) => format!("- (ignored {raw})"),
            _ => "-".into(),
        },
    };
    println!("Parent:       {parent}");
    println!("Created:      {}", format_created(task.created_at));
    if stats.total > 0 {
        println!("Subtasks:     {}/{} completed ({}%)", stats.completed, stats.total, stats.percent);
    }
    println!("Description:\n{}\n", task.description.as_deref().unwrap_or("-"));

    if parents {
        let chain = forest.ancestors(id);
        if chain.is_empty() {
            println!("Ancestors: -");
        } else {
            println!(
                "Ancestors (closest first): {}",
                chain.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" -> ")
            );
        }
    }

    if children {
        println!("Children:");
        let subtree = forest.subtree(id);
        if subtree.is_empty() {
            println!("  -");
        }
        for (depth, n) in subtree {
            println!(
                "{}- {} [{}] (#{})",
                "  ".repeat(depth),
                n.task.title,
                format_status(n.status()),
                n.id()
            );
        }
    }
    Ok(())
}

/// Add a new task to the event.
#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    list: &mut TaskList,
    db_path: &Path,
    title: String,
    desc: Option<String>,
    parent: Option<u64>,
    assignee: Option<u64>,
    priority: Option<String>,
    points: Option<u32>,
) -> Result<()> {
    if title.trim().is_empty() {
        return Err(EvtError::invalid_input("title cannot be empty"));
    }
    let id = list.next_id();
    let mut task = TaskRecord::new(id, title.trim());
    task.description = desc.filter(|d| !d.trim().is_empty());
    task.assigned_to = assignee;
    task.priority = priority.filter(|p| !p.trim().is_empty());
    task.story_points = points;
    task.created_at = Some(Utc::now());
    task.set_parent(None);
    list.tasks.push(task);
    if parent.is_some() {
        if let Err(e) = list.reparent(id, parent) {
            list.tasks.pop();
            return Err(e);
        }
    }
    list.save(db_path)?;
    println!("Added task {id}");
    Ok(())
}

/// Update an existing task's fields.
#[allow(clippy::too_many_arguments)]
pub fn cmd_update(
    list: &mut TaskList,
    db_path: &Path,
    id: u64,
    title: Option<String>,
    desc: Option<String>,
    parent: Option<u64>,
    clear_parent: bool,
    assignee: Option<u64>,
    priority: Option<String>,
    points: Option<u32>,
) -> Result<()> {
    if clear_parent {
        list.reparent(id, None)?;
    } else if parent.is_some() {
        list.reparent(id, parent)?;
    }
    let t = list.require_mut(id)?;
    if let Some(s) = title {
        if s.trim().is_empty() {
            return Err(EvtError::invalid_input("title cannot be empty"));
        }
        t.title = s.trim().to_string();
    }
    if let Some(d) = desc {
        t.description = if d.is_empty() { None } else { Some(d) };
    }
    if let Some(a) = assignee {
        t.assigned_to = Some(a);
    }
    if let Some(p) = priority {
        t.priority = if p.trim().is_empty() { None } else { Some(p) };
    }
    if let Some(p) = points {
        t.story_points = Some(p);
    }
    list.save(db_path)?;
    println!("Updated task {id}");
    Ok(())
}

/// Set a task's status, refusing completion while subtasks are open.
pub fn cmd_status(list: &mut TaskList, db_path: &Path, id: u64, status: Status) -> Result<()> {
    list.change_status(id, status)?;
    list.save(db_path)?;
    println!("Task {id} is now {}", format_status(status));
    Ok(())
}

/// Advance a task along the one-click status cycle.
pub fn cmd_next(list: &mut TaskList, db_path: &Path, id: u64) -> Result<()> {
    let next = list.require(id)?.status.next();
    cmd_status(list, db_path, id, next)
}

/// Reopen a task by setting its status to pending.
pub fn cmd_reopen(list: &mut TaskList, db_path: &Path, id: u64) -> Result<()> {
    list.change_status(id, Status::Pending)?;
    list.save(db_path)?;
    println!("Reopened {id}");
    Ok(())
}

/// Delete a task, optionally with its subtree.
pub fn cmd_delete(list: &mut TaskList, db_path: &Path, id: u64, cascade: bool) -> Result<()> {
    let removed = list.delete(id, cascade)?;
    list.save(db_path)?;
    println!("Deleted {} task(s)", removed.len());
    let orphaned = list.forest().orphans().count();
    if orphaned > 0 {
        println!("{orphaned} task(s) in this event have a missing parent");
    }
    Ok(())
}

/// Create a timestamped backup of the task file.
pub fn create_backup(db_path: &Path) -> Result<PathBuf> {
    if !db_path.exists() {
        return Err(EvtError::invalid_input(format!(
            "{} does not exist",
            db_path.display()
        )));
    }
    let parent_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = parent_dir.join("backup");
    fs::create_dir_all(&backup_dir)?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let file_name = db_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tasks.json");
    let backup_path = backup_dir.join(format!("{timestamp}_{file_name}"));
    fs::copy(db_path, &backup_path)?;
    Ok(backup_path)
}

/// Replace the event's tasks with a fetched task list.
pub fn cmd_import(list: &mut TaskList, db_path: &Path, input: &Path, no_backup: bool) -> Result<()> {
    let raw = fs::read_to_string(input)?;
    let tasks = parse_feed(&raw)?;

    if !no_backup && db_path.exists() {
        let backup = create_backup(db_path)?;
        println!("Created backup: {}", backup.display());
    }

    list.tasks = tasks;
    list.save(db_path)?;
    let forest = list.forest();
    info!(tasks = forest.len(), orphans = forest.orphans().count(), "imported");
    println!(
        "Imported {} task(s), {} top-level, {} with a missing parent",
        forest.len(),
        forest.roots().count(),
        forest.orphans().count()
    );
    Ok(())
}

/// List every event with its task count.
pub fn cmd_events(dir: &Path) -> Result<()> {
    let events = discover_events(dir)?;
    if events.is_empty() {
        println!("No events in {}", dir.display());
    }
    for event in events {
        let list = event.load_tasks()?;
        let done = list.tasks.iter().filter(|t| t.status == Status::Completed).count();
        println!(
            "{:<30} {:>4} task(s), {:>4} completed",
            truncate(&event.display_name, 30),
            list.tasks.len(),
            done
        );
    }
    Ok(())
}

/// Create an empty event.
pub fn cmd_new_event(dir: &Path, name: &str) -> Result<()> {
    let event = create_event(name, dir)?;
    println!("Created event '{}' at {}", event.display_name, event.file_path.display());
    Ok(())
}

/// Print the tasks assigned to `user`, one tree per event.
pub fn cmd_mine(dir: &Path, user: u64) -> Result<()> {
    let groups = tasks_for_assignee(dir, user)?;
    if groups.is_empty() {
        println!("No tasks assigned to user {user}.");
    }
    for (event, tasks) in groups {
        println!("== {} ==", event.display_name);
        for line in render_forest(&build_hierarchy(&tasks)) {
            println!("{line}");
        }
        println!();
    }
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) -> Result<()> {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, TaskList) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("party_tasks.json");
        let list = TaskList {
            tasks: vec![
                TaskRecord::new(1, "Parent"),
                TaskRecord::new(2, "Open").with_parent(1),
                TaskRecord::new(3, "Done").with_parent(1).with_status(Status::Completed),
            ],
        };
        list.save(&path).unwrap();
        (dir, path, list)
    }

    #[test]
    fn status_refusal_writes_nothing() {
        let (_dir, path, mut list) = setup();
        let err = cmd_status(&mut list, &path, 1, Status::Completed).unwrap_err();
        assert!(err.is_rejection());
        let on_disk = TaskList::load(&path).unwrap();
        assert_eq!(on_disk.get(1).unwrap().status, Status::Pending);

        cmd_status(&mut list, &path, 2, Status::Completed).unwrap();
        cmd_status(&mut list, &path, 1, Status::Completed).unwrap();
        let on_disk = TaskList::load(&path).unwrap();
        assert_eq!(on_disk.get(1).unwrap().status, Status::Completed);
    }

    #[test]
    fn next_walks_the_click_cycle() {
        let (_dir, path, mut list) = setup();
        cmd_next(&mut list, &path, 2).unwrap();
        assert_eq!(list.get(2).unwrap().status, Status::InProgress);
        cmd_next(&mut list, &path, 2).unwrap();
        assert_eq!(list.get(2).unwrap().status, Status::Completed);
        cmd_next(&mut list, &path, 2).unwrap();
        assert_eq!(list.get(2).unwrap().status, Status::Pending);
    }

    #[test]
    fn add_validates_parent_and_rolls_back() {
        let (_dir, path, mut list) = setup();
        cmd_add(&mut list, &path, "Child".into(), None, Some(2), Some(7), None, Some(3)).unwrap();
        let added = list.get(4).unwrap();
        assert_eq!(added.parent_id(), Some(2));
        assert_eq!(added.status, Status::Pending);
        assert!(added.created_at.is_some());

        assert!(cmd_add(&mut list, &path, "Bad".into(), None, Some(99), None, None, None).is_err());
        assert_eq!(list.tasks.len(), 4);
        assert!(cmd_add(&mut list, &path, "  ".into(), None, None, None, None, None).is_err());
    }

    #[test]
    fn update_moves_and_detaches() {
        let (_dir, path, mut list) = setup();
        cmd_update(&mut list, &path, 3, Some("Renamed".into()), None, Some(2), false, None, None, None).unwrap();
        assert_eq!(list.get(3).unwrap().parent_id(), Some(2));
        assert_eq!(list.get(3).unwrap().title, "Renamed");

        assert!(cmd_update(&mut list, &path, 1, None, None, Some(3), false, None, None, None).is_err());

        cmd_update(&mut list, &path, 3, None, None, None, true, None, None, None).unwrap();
        assert_eq!(TaskList::load(&path).unwrap().get(3).unwrap().parent_id(), None);
    }

    #[test]
    fn import_normalizes_aliases_and_backs_up() {
        let (dir, path, mut list) = setup();
        let feed = dir.path().join("feed.json");
        fs::write(
            &feed,
            r#"{"tasks":[{"id":10,"title":"A","status":"pending","parent_id":"0"},
                        {"id":11,"title":"B","status":"in_progress","parentId":"10"},
                        {"id":12,"title":"C","status":"pending","parent-id":999}],"total":3}"#,
        )
        .unwrap();
        cmd_import(&mut list, &path, &feed, false).unwrap();

        let stored = fs::read_to_string(&path).unwrap();
        assert!(!stored.contains("parentId"));
        assert!(!stored.contains("parent-id"));
        let loaded = TaskList::load(&path).unwrap();
        assert_eq!(loaded.get(11).unwrap().parent_id(), Some(10));
        assert!(loaded.forest().is_orphan(12));
        assert_eq!(fs::read_dir(dir.path().join("backup")).unwrap().count(), 1);
    }

    #[test]
    fn overrides_apply_over_defaults() {
        let (_dir, _path, list) = setup();
        // Task 1 has a completed child and opens by default.
        assert!(list.forest().get(1).unwrap().is_expanded);
        let forest = forest_with_overrides(&list, &[], &[1]);
        assert!(!forest.get(1).unwrap().is_expanded);
        let forest = forest_with_overrides(&list, &[2, 404], &[]);
        assert!(forest.get(2).unwrap().is_expanded);
    }
}

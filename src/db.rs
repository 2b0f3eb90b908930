//! Task list storage and display helpers.
//!
//! This module provides the `TaskList` struct, the flat list of tasks for one
//! event as kept on disk, along with formatting utilities used to print lists
//! and forests on the terminal.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EvtError, Result};
use crate::fields::*;
use crate::hierarchy::{build_hierarchy, Forest};
use crate::rules::check_status_change;
use crate::task::TaskRecord;

/// Flat task list for one event.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<TaskRecord>,
}

impl TaskList {
    /// Load a task list from a JSON file. A missing file is an empty list.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no task file yet");
            return Ok(TaskList::default());
        }
        let buf = fs::read_to_string(path)?;
        let list: TaskList = serde_json::from_str(&buf).map_err(|e| EvtError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), tasks = list.tasks.len(), "loaded task list");
        Ok(list)
    }

    /// Save the list using an atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        let mut f = File::create(&tmp)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), tasks = self.tasks.len(), "saved task list");
        Ok(())
    }

    /// Generate the next available task ID.
    pub fn next_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn get(&self, id: u64) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Look up a task or fail with `TaskNotFound`.
    pub fn require(&self, id: u64) -> Result<&TaskRecord> {
        self.get(id).ok_or(EvtError::TaskNotFound { id })
    }

    pub fn require_mut(&mut self, id: u64) -> Result<&mut TaskRecord> {
        self.get_mut(id).ok_or(EvtError::TaskNotFound { id })
    }

    /// Remove tasks by id. Tasks pointing at a removed parent keep the
    /// reference and show up as orphans.
    pub fn remove_ids(&mut self, ids: &HashSet<u64>) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !ids.contains(&t.id));
        before - self.tasks.len()
    }

    /// Move task `id` to `status` if the completion rule allows it.
    /// Returns the previous status. A refused change leaves the list untouched.
    pub fn change_status(&mut self, id: u64, status: Status) -> Result<Status> {
        check_status_change(&self.tasks, id, status)?;
        let task = self.require_mut(id)?;
        let previous = std::mem::replace(&mut task.status, status);
        info!(task = id, from = previous.as_str(), to = status.as_str(), "status changed");
        Ok(previous)
    }

    /// Point task `id` at a new parent, or detach it with `None`.
    ///
    /// Refuses self-parenting, unknown parents and assignments that would put
    /// the task above itself.
    pub fn reparent(&mut self, id: u64, parent: Option<u64>) -> Result<()> {
        self.require(id)?;
        if let Some(pid) = parent {
            if pid == id {
                return Err(EvtError::invalid_parent(id, "a task cannot be its own parent"));
            }
            if self.get(pid).is_none() {
                return Err(EvtError::invalid_parent(id, format!("task {pid} does not exist")));
            }
            if self.forest().ancestors(pid).contains(&id) {
                return Err(EvtError::invalid_parent(
                    id,
                    format!("task {pid} is below it, this would create a cycle"),
                ));
            }
        }
        self.require_mut(id)?.set_parent(parent);
        Ok(())
    }

    /// Delete a task, and with `cascade` everything below it.
    /// Returns the removed ids.
    pub fn delete(&mut self, id: u64, cascade: bool) -> Result<Vec<u64>> {
        self.require(id)?;
        let mut ids = vec![id];
        if cascade {
            ids.extend(self.descendants_of(id));
        }
        let set: HashSet<u64> = ids.iter().copied().collect();
        self.remove_ids(&set);
        info!(task = id, removed = ids.len(), "deleted");
        Ok(ids)
    }

    /// Ids of every task below `id` in the rebuilt tree.
    pub fn descendants_of(&self, id: u64) -> Vec<u64> {
        self.forest().descendants(id)
    }

    /// Fresh forest for the current list.
    pub fn forest(&self) -> Forest {
        build_hierarchy(&self.tasks)
    }
}

/// Format a task status for display.
pub fn format_status(s: Status) -> &'static str {
    match s {
        Status::Pending => "Pending",
        Status::InProgress => "In progress",
        Status::Completed => "Completed",
        Status::Cancelled => "Cancelled",
    }
}

/// Short status marker used in tree output.
pub fn status_glyph(s: Status) -> &'static str {
    match s {
        Status::Pending => "[ ]",
        Status::InProgress => "[~]",
        Status::Completed => "[x]",
        Status::Cancelled => "[-]",
    }
}

/// Format a creation timestamp in local time.
pub fn format_created(created: Option<DateTime<Utc>>) -> String {
    match created {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "-".into(),
    }
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out = String::new();
        for (i, ch) in s.chars().enumerate() {
            if i + 1 >= width {
                out.push('…');
                break;
            }
            out.push(ch);
        }
        out
    }
}

/// Render the visible part of a forest as indented text lines.
///
/// Collapsed nodes get a `+` marker and a count of hidden children; orphaned
/// tasks are listed under their own heading after the genuine roots.
pub fn render_forest(forest: &Forest) -> Vec<String> {
    let mut lines = Vec::new();
    let mut in_orphans = false;
    for (depth, node) in forest.visible() {
        if depth == 0 && !in_orphans && forest.is_orphan(node.id()) {
            in_orphans = true;
            lines.push("-- parent missing --".to_string());
        }
        let marker = match (node.has_children(), node.is_expanded) {
            (false, _) => " ",
            (true, true) => "-",
            (true, false) => "+",
        };
        let mut line = format!(
            "{}{} {} #{} {}",
            "  ".repeat(depth),
            marker,
            status_glyph(node.status()),
            node.id(),
            node.task.title
        );
        if node.has_children() {
            let stats = forest.child_stats(node.id());
            line.push_str(&format!("  ({}/{} done", stats.completed, stats.total));
            if node.status() != Status::Completed && stats.percent < 100 {
                line.push_str(&format!(", {}%", stats.percent));
            }
            line.push(')');
            if !node.is_expanded {
                line.push_str(&format!(" [{} hidden]", stats.total));
            }
        }
        lines.push(line);
    }
    lines
}

/// Print tasks as a flat table.
pub fn print_table(tasks: &[&TaskRecord]) {
    println!(
        "{:<5} {:<12} {:<7} {:<8} {:<6} {}",
        "ID", "Status", "Parent", "Assignee", "Pts", "Title"
    );
    for t in tasks {
        println!(
            "{:<5} {:<12} {:<7} {:<8} {:<6} {}",
            t.id,
            format_status(t.status),
            t.parent_id().map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            t.assigned_to.map(|a| a.to_string()).unwrap_or_else(|| "-".into()),
            t.story_points.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            truncate(&t.title, 60)
        );
    }
}

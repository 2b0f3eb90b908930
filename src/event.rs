//! Event discovery for multi-event task boards.
//!
//! Every event keeps its flat task list in its own JSON file inside the data
//! directory, named `<event_name>_tasks.json`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::db::TaskList;
use crate::error::{EvtError, Result};
use crate::task::TaskRecord;

const FILE_SUFFIX: &str = "_tasks";

/// An event with its display name and task file.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub display_name: String,
    pub file_path: PathBuf,
}

impl Event {
    /// Create an event handle for the given display name.
    pub fn new(display_name: &str, dir: &Path) -> Self {
        let name = sanitize_event_name(display_name);
        let file_path = dir.join(format!("{name}{FILE_SUFFIX}.json"));
        Event {
            name,
            display_name: display_name.trim().to_string(),
            file_path,
        }
    }

    /// Recognise an event from an existing task file.
    pub fn from_file(file_path: PathBuf) -> Option<Self> {
        if file_path.extension()? != "json" {
            return None;
        }
        let stem = file_path.file_stem()?.to_str()?;
        let name = stem.strip_suffix(FILE_SUFFIX)?;
        if name.is_empty() {
            return None;
        }
        Some(Event {
            name: name.to_string(),
            display_name: name.replace('_', " "),
            file_path,
        })
    }

    /// Create the task file for this event if it doesn't exist.
    pub fn create_if_not_exists(&self) -> Result<()> {
        if !self.file_path.exists() {
            TaskList::default().save(&self.file_path)?;
        }
        Ok(())
    }

    pub fn load_tasks(&self) -> Result<TaskList> {
        TaskList::load(&self.file_path)
    }
}

/// Convert a display name to a safe file name component.
/// Lowercases and collapses every run of non-alphanumerics into one underscore.
pub fn sanitize_event_name(display_name: &str) -> String {
    display_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// All events in the data directory, sorted by name.
pub fn discover_events(dir: &Path) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    if !dir.exists() {
        return Ok(events);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(event) = Event::from_file(path) {
                events.push(event);
            }
        }
    }
    events.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(dir = %dir.display(), count = events.len(), "discovered events");
    Ok(events)
}

/// The event whose task file changed last.
pub fn most_recent_event(dir: &Path) -> Result<Option<Event>> {
    let mut newest: Option<(Event, std::time::SystemTime)> = None;
    for event in discover_events(dir)? {
        let Ok(modified) = fs::metadata(&event.file_path).and_then(|m| m.modified()) else {
            continue;
        };
        if newest.as_ref().map_or(true, |(_, t)| modified > *t) {
            newest = Some((event, modified));
        }
    }
    Ok(newest.map(|(event, _)| event))
}

/// Create a new, empty event.
pub fn create_event(display_name: &str, dir: &Path) -> Result<Event> {
    let event = Event::new(display_name, dir);
    if event.name.is_empty() {
        return Err(EvtError::invalid_input("event name cannot be empty"));
    }
    if event.file_path.exists() {
        return Err(EvtError::invalid_input(format!(
            "event '{}' already exists",
            event.display_name
        )));
    }
    event.create_if_not_exists()?;
    Ok(event)
}

/// Tasks assigned to `user` in every event, grouped per event. Events with no
/// matching task are left out.
pub fn tasks_for_assignee(dir: &Path, user: u64) -> Result<Vec<(Event, Vec<TaskRecord>)>> {
    let mut out = Vec::new();
    for event in discover_events(dir)? {
        let mine: Vec<TaskRecord> = event
            .load_tasks()?
            .tasks
            .into_iter()
            .filter(|t| t.assigned_to == Some(user))
            .collect();
        if !mine.is_empty() {
            out.push((event, mine));
        }
    }
    Ok(out)
}

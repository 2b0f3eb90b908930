//! Interactive task tree.
//!
//! `TreeApp` keeps the flat task list as the only source of truth. The forest
//! is rebuilt from it after every change and the user's expand/collapse
//! choices are reapplied on top of the computed defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use tracing::debug;

use crate::db::{format_status, truncate, TaskList};
use crate::error::Result;
use crate::fields::Status;
use crate::hierarchy::{ExpansionState, Forest};
use crate::tui::{
    colors::{status_style, DARK_GREEN, DARK_PURPLE, DARK_RED},
    enums::AppState,
    utils::centered_rect,
};

/// One visible line of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub id: u64,
    pub depth: usize,
    pub orphan: bool,
}

pub struct TreeApp {
    state: AppState,
    list: TaskList,
    db_path: PathBuf,
    forest: Forest,
    expansion: ExpansionState,
    rows: Vec<VisibleRow>,
    table_state: TableState,
    selected: Option<u64>,
    status_message: String,
    message_is_warning: bool,
    pending_delete: Option<u64>,
}

impl TreeApp {
    /// Load the task file and build the initial tree.
    pub fn new(db_path: &Path) -> Result<Self> {
        let list = TaskList::load(db_path)?;
        let mut app = TreeApp {
            state: AppState::Tree,
            list,
            db_path: db_path.to_path_buf(),
            forest: Forest::default(),
            expansion: ExpansionState::new(),
            rows: Vec::new(),
            table_state: TableState::default(),
            selected: None,
            status_message: String::new(),
            message_is_warning: false,
            pending_delete: None,
        };
        app.rebuild();
        Ok(app)
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn selected(&self) -> Option<u64> {
        self.selected
    }

    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Rebuild the forest from the list and reapply user expansion choices.
    /// The selection follows its id; if that task is gone it stays at the
    /// same row position.
    fn rebuild(&mut self) {
        let previous_row = self.table_state.selected();
        let mut forest = self.list.forest();
        self.expansion.retain_known(&forest);
        self.expansion.apply(&mut forest);
        self.forest = forest;
        self.refresh_rows();

        let row = self
            .selected
            .and_then(|id| self.rows.iter().position(|r| r.id == id))
            .or_else(|| {
                previous_row
                    .or(Some(0))
                    .filter(|_| !self.rows.is_empty())
                    .map(|r| r.min(self.rows.len() - 1))
            });
        self.select_row(row);
    }

    fn refresh_rows(&mut self) {
        self.rows = self
            .forest
            .visible()
            .into_iter()
            .map(|(depth, node)| VisibleRow {
                id: node.id(),
                depth,
                orphan: depth == 0 && self.forest.is_orphan(node.id()),
            })
            .collect();
    }

    fn select_row(&mut self, row: Option<usize>) {
        self.table_state.select(row);
        self.selected = row.and_then(|r| self.rows.get(r)).map(|r| r.id);
    }

    /// Re-read the task file from disk.
    fn reload(&mut self) -> Result<()> {
        self.list = TaskList::load(&self.db_path)?;
        self.rebuild();
        Ok(())
    }

    fn set_status_message(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
        self.message_is_warning = false;
    }

    fn set_warning(&mut self, msg: impl Into<String>) {
        self.status_message = msg.into();
        self.message_is_warning = true;
    }

    fn clear_status_message(&mut self) {
        self.status_message.clear();
        self.message_is_warning = false;
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            self.select_row(None);
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as isize;
        let last = self.rows.len() as isize - 1;
        let next = (current + delta).clamp(0, last) as usize;
        self.select_row(Some(next));
    }

    /// Flip the selected node. Leaves have nothing to show or hide.
    pub fn toggle_selected(&mut self) {
        let Some(id) = self.selected else { return };
        if !self.forest.get(id).is_some_and(|n| n.has_children()) {
            return;
        }
        if let Some(expanded) = self.expansion.toggle(&mut self.forest, id) {
            debug!(task = id, expanded, "toggled");
            self.refresh_rows();
            let row = self.rows.iter().position(|r| r.id == id);
            self.select_row(row);
        }
    }

    /// Apply a status change to the selected task. A refused change leaves
    /// the file untouched and shows the reason in the status bar.
    pub fn set_selected_status(&mut self, status: Status) -> Result<()> {
        let Some(id) = self.selected else { return Ok(()) };
        match self.list.change_status(id, status) {
            Ok(previous) if previous == status => {
                self.set_status_message(format!("Task {id} is already {}", format_status(status)));
                Ok(())
            }
            Ok(previous) => {
                if let Err(e) = self.list.save(&self.db_path) {
                    // Keep the view in step with the file.
                    self.list.require_mut(id)?.status = previous;
                    self.rebuild();
                    return Err(e);
                }
                if status == Status::Completed {
                    self.expand_parent_of(id);
                }
                self.reload()?;
                self.set_status_message(format!("Task {id} is now {}", format_status(status)));
                Ok(())
            }
            Err(e) if e.is_rejection() => {
                self.set_warning(e.to_string());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn advance_selected(&mut self) -> Result<()> {
        let Some(task) = self.selected.and_then(|id| self.list.get(id)) else {
            return Ok(());
        };
        let next = task.status.next();
        self.set_selected_status(next)
    }

    fn expand_parent_of(&mut self, id: u64) {
        let parent = self
            .forest
            .get(id)
            .and_then(|n| n.parent_id)
            .filter(|&p| p != id && self.forest.get(p).is_some());
        if let Some(parent) = parent {
            self.expansion.expand(parent);
        }
    }

    /// Ask for confirmation before deleting the selected task.
    pub fn request_delete(&mut self) {
        if let Some(id) = self.selected {
            self.pending_delete = Some(id);
            self.state = AppState::Confirm;
        }
    }

    /// Delete the task awaiting confirmation. Its subtasks stay and show up
    /// under the missing-parent heading.
    pub fn confirm_delete(&mut self) -> Result<()> {
        self.state = AppState::Tree;
        let Some(id) = self.pending_delete.take() else {
            return Ok(());
        };
        self.expand_parent_of(id);
        let removed = self.list.delete(id, false)?;
        self.list.save(&self.db_path)?;
        self.reload()?;
        self.set_status_message(format!("Deleted {} task(s)", removed.len()));
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
        self.state = AppState::Tree;
    }

    fn handle_tree_key(&mut self, key: KeyCode) -> Result<bool> {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-10),
            KeyCode::PageDown => self.move_selection(10),
            KeyCode::Home => self.select_row((!self.rows.is_empty()).then_some(0)),
            KeyCode::End => self.select_row(self.rows.len().checked_sub(1)),
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right => {
                self.toggle_selected()
            }
            KeyCode::Char('s') => self.advance_selected()?,
            KeyCode::Char('c') => self.set_selected_status(Status::Completed)?,
            KeyCode::Char('p') => self.set_selected_status(Status::InProgress)?,
            KeyCode::Char('x') => self.set_selected_status(Status::Cancelled)?,
            KeyCode::Char('r') => self.set_selected_status(Status::Pending)?,
            KeyCode::Char('d') => self.request_delete(),
            KeyCode::Char('R') => {
                self.reload()?;
                self.set_status_message("Reloaded");
            }
            KeyCode::Char('?') | KeyCode::F(1) => self.state = AppState::Help,
            _ => {}
        }
        Ok(false)
    }

    /// Dispatch one key press. Returns true if the application should quit.
    pub fn handle_key(&mut self, key: KeyCode) -> Result<bool> {
        match self.state {
            AppState::Tree => {
                self.clear_status_message();
                self.handle_tree_key(key)
            }
            AppState::Help => {
                self.state = AppState::Tree;
                Ok(false)
            }
            AppState::Confirm => {
                match key {
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                        if let Err(e) = self.confirm_delete() {
                            self.set_warning(format!("Error deleting task: {e}"));
                        }
                    }
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.cancel_delete(),
                    _ => {}
                }
                Ok(false)
            }
        }
    }

    fn handle_input(&mut self) -> Result<bool> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(false);
                }
                return match self.handle_key(key.code) {
                    Ok(quit) => Ok(quit),
                    Err(e) => {
                        self.set_warning(format!("Error: {e}"));
                        Ok(false)
                    }
                };
            }
        }
        Ok(false)
    }

    fn tree_cell(&self, row: &VisibleRow) -> String {
        let Some(node) = self.forest.get(row.id) else {
            return String::new();
        };
        let marker = match (node.has_children(), node.is_expanded) {
            (false, _) => "  ",
            (true, true) => "▾ ",
            (true, false) => "▸ ",
        };
        let mut cell = format!("{}{}{}", "  ".repeat(row.depth), marker, node.task.title);
        if node.has_children() {
            let stats = self.forest.child_stats(row.id);
            cell.push_str(&format!("  ({}/{})", stats.completed, stats.total));
        }
        cell
    }

    fn render_tree(&mut self, f: &mut Frame, area: Rect) {
        let event_name = self
            .db_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.trim_end_matches("_tasks").replace('_', " "))
            .unwrap_or_default();

        let header = Row::new(
            ["ID", "Task", "Status", "Progress", "Assignee"]
                .iter()
                .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD))),
        )
        .style(Style::default().bg(DARK_PURPLE).fg(Color::White))
        .height(1);

        let rows: Vec<Row> = self
            .rows
            .iter()
            .filter_map(|row| {
                let node = self.forest.get(row.id)?;
                let stats = self.forest.child_stats(row.id);
                let progress = if stats.total == 0 {
                    String::new()
                } else {
                    format!("{}%", stats.percent)
                };
                let id_cell = if row.orphan {
                    format!("?{}", row.id)
                } else {
                    row.id.to_string()
                };
                Some(
                    Row::new(vec![
                        Cell::from(id_cell),
                        Cell::from(truncate(&self.tree_cell(row), 80)),
                        Cell::from(format_status(node.status())),
                        Cell::from(progress),
                        Cell::from(node.task.assigned_to.map(|a| a.to_string()).unwrap_or_default()),
                    ])
                    .style(status_style(node.status())),
                )
            })
            .collect();

        let orphans = self.forest.orphans().count();
        let mut title = format!("{} ({} tasks)", event_name, self.forest.len());
        if orphans > 0 {
            title.push_str(&format!(" | {orphans} with missing parent (marked ?)"));
        }

        let widths = [
            Constraint::Length(6),
            Constraint::Min(30),
            Constraint::Length(12),
            Constraint::Length(9),
            Constraint::Length(9),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(title))
            .row_highlight_style(Style::default().bg(Color::Gray).fg(Color::Black))
            .highlight_symbol(">> ");

        f.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn render_help(&mut self, f: &mut Frame, area: Rect) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let help_text = vec![
            Line::from(vec![Span::styled("Task Tree Help", bold)]),
            Line::from(""),
            Line::from("  ↑/↓, k/j        Move selection"),
            Line::from("  Enter/Space/←/→ Expand or collapse"),
            Line::from("  s               Next status (pending, in progress, completed)"),
            Line::from("  c               Complete (all subtasks must be completed)"),
            Line::from("  p               Mark in progress"),
            Line::from("  x               Cancel"),
            Line::from("  r               Reopen"),
            Line::from("  d               Delete selected task"),
            Line::from("  R               Reload from disk"),
            Line::from("  ?/F1            Show this help"),
            Line::from("  q/Esc           Quit"),
        ];
        let paragraph = Paragraph::new(help_text)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Help - Press any key to return"),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(paragraph, area);
    }

    fn render_confirm(&mut self, f: &mut Frame, area: Rect) {
        let block = Block::default()
            .title("Confirm Action")
            .borders(Borders::ALL)
            .style(Style::default().bg(DARK_RED));

        let area = centered_rect(50, 25, area);
        f.render_widget(Clear, area);

        let target = self
            .pending_delete
            .and_then(|id| self.forest.get(id))
            .map(|n| format!("Delete #{} {}", n.id(), n.task.title))
            .unwrap_or_default();
        let subtasks = self
            .pending_delete
            .map_or(0, |id| self.forest.child_stats(id).total);

        let mut text = vec![
            Line::from(""),
            Line::from(vec![Span::styled(
                "Are you sure you want to:",
                Style::default().add_modifier(Modifier::BOLD),
            )]),
            Line::from(target),
        ];
        if subtasks > 0 {
            text.push(Line::from(format!(
                "Its {subtasks} subtask(s) will be listed as missing a parent."
            )));
        }
        text.push(Line::from(""));
        text.push(Line::from("Press 'y' to confirm, 'n' to cancel"));

        let paragraph = Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
    }

    fn render_status_bar(&mut self, f: &mut Frame, area: Rect) {
        let (text, bg) = if !self.status_message.is_empty() {
            let bg = if self.message_is_warning { DARK_RED } else { DARK_GREEN };
            (self.status_message.clone(), bg)
        } else {
            match self.state {
                AppState::Tree => (
                    format!("Tasks: {} shown | Press '?' for help", self.rows.len()),
                    DARK_PURPLE,
                ),
                AppState::Help => ("Help".to_string(), DARK_PURPLE),
                AppState::Confirm => ("Confirm Action".to_string(), DARK_PURPLE),
            }
        };
        let status = Paragraph::new(text)
            .style(Style::default().bg(bg).fg(Color::White))
            .alignment(Alignment::Left);
        f.render_widget(status, area);
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(f.area());

        match self.state {
            AppState::Tree => self.render_tree(f, chunks[0]),
            AppState::Help => self.render_help(f, chunks[0]),
            AppState::Confirm => {
                self.render_tree(f, chunks[0]);
                self.render_confirm(f, chunks[0]);
            }
        }
        self.render_status_bar(f, chunks[1]);
    }

    /// Main event loop. Runs until the user quits.
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;
            if self.handle_input()? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRecord;

    fn app_with(tasks: Vec<TaskRecord>) -> (tempfile::TempDir, TreeApp) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gala_tasks.json");
        TaskList { tasks }.save(&path).unwrap();
        let app = TreeApp::new(&path).unwrap();
        (dir, app)
    }

    fn sample() -> Vec<TaskRecord> {
        vec![
            TaskRecord::new(1, "Venue"),
            TaskRecord::new(2, "Book hall").with_parent(1),
            TaskRecord::new(3, "Pay deposit").with_parent(1),
            TaskRecord::new(4, "Music"),
        ]
    }

    fn visible_ids(app: &TreeApp) -> Vec<u64> {
        app.rows().iter().map(|r| r.id).collect()
    }

    fn select(app: &mut TreeApp, id: u64) {
        let row = app.rows().iter().position(|r| r.id == id);
        app.select_row(row);
    }

    #[test]
    fn starts_with_defaults_and_first_row_selected() {
        let (_dir, app) = app_with(sample());
        // Task 1 only has pending children, so it starts collapsed.
        assert_eq!(visible_ids(&app), vec![4, 1]);
        assert_eq!(app.selected(), Some(4));
        assert_eq!(app.state(), AppState::Tree);
    }

    #[test]
    fn navigation_and_toggle() {
        let (_dir, mut app) = app_with(sample());
        app.handle_key(KeyCode::Char('j')).unwrap();
        assert_eq!(app.selected(), Some(1));
        app.handle_key(KeyCode::Down).unwrap();
        assert_eq!(app.selected(), Some(1));

        app.handle_key(KeyCode::Enter).unwrap();
        assert_eq!(visible_ids(&app), vec![4, 1, 2, 3]);
        assert_eq!(app.selected(), Some(1));

        app.handle_key(KeyCode::Char(' ')).unwrap();
        assert_eq!(visible_ids(&app), vec![4, 1]);
    }

    #[test]
    fn refused_completion_warns_and_writes_nothing() {
        let (dir, mut app) = app_with(sample());
        select(&mut app, 1);
        app.handle_key(KeyCode::Char('c')).unwrap();
        assert!(app.status_message().contains("#2, #3"));
        let on_disk = TaskList::load(&dir.path().join("gala_tasks.json")).unwrap();
        assert_eq!(on_disk.get(1).unwrap().status, Status::Pending);
    }

    #[test]
    fn completing_a_child_expands_its_parent() {
        let (dir, mut app) = app_with(sample());
        select(&mut app, 1);
        app.toggle_selected();
        // Collapse again so only the auto-expansion can reopen it.
        select(&mut app, 1);
        app.toggle_selected();
        assert!(!app.forest().get(1).unwrap().is_expanded);

        app.list.change_status(2, Status::InProgress).unwrap();
        app.list.save(&dir.path().join("gala_tasks.json")).unwrap();
        app.reload().unwrap();
        // The user's collapse wins over the new default.
        assert!(!app.forest().get(1).unwrap().is_expanded);

        app.selected = Some(2);
        app.set_selected_status(Status::Completed).unwrap();
        assert!(app.forest().get(1).unwrap().is_expanded);
        assert_eq!(app.list.get(2).unwrap().status, Status::Completed);
    }

    #[test]
    fn status_keys_cycle_and_persist() {
        let (dir, mut app) = app_with(sample());
        select(&mut app, 4);
        app.handle_key(KeyCode::Char('s')).unwrap();
        app.handle_key(KeyCode::Char('s')).unwrap();
        let on_disk = TaskList::load(&dir.path().join("gala_tasks.json")).unwrap();
        assert_eq!(on_disk.get(4).unwrap().status, Status::Completed);

        app.handle_key(KeyCode::Char('r')).unwrap();
        assert_eq!(app.list.get(4).unwrap().status, Status::Pending);
        app.handle_key(KeyCode::Char('x')).unwrap();
        assert_eq!(app.list.get(4).unwrap().status, Status::Cancelled);
        assert_eq!(app.selected(), Some(4));
    }

    #[test]
    fn failed_save_keeps_the_previous_status() {
        let (dir, mut app) = app_with(sample());
        let path = dir.path().join("gala_tasks.json");
        // A directory in place of the file makes the final rename fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), "x").unwrap();

        select(&mut app, 4);
        assert!(app.set_selected_status(Status::InProgress).is_err());
        assert_eq!(app.list.get(4).unwrap().status, Status::Pending);
        assert_eq!(app.forest().get(4).unwrap().status(), Status::Pending);
        assert_eq!(app.selected(), Some(4));
    }

    #[test]
    fn delete_requires_confirmation_and_orphans_children() {
        let (_dir, mut app) = app_with(sample());
        select(&mut app, 1);
        app.handle_key(KeyCode::Char('d')).unwrap();
        assert_eq!(app.state(), AppState::Confirm);
        app.handle_key(KeyCode::Char('n')).unwrap();
        assert_eq!(app.state(), AppState::Tree);
        assert_eq!(app.forest().len(), 4);

        app.handle_key(KeyCode::Char('d')).unwrap();
        app.handle_key(KeyCode::Char('y')).unwrap();
        assert_eq!(app.forest().len(), 3);
        assert!(app.forest().is_orphan(2));
        assert!(app.rows().iter().any(|r| r.id == 3 && r.orphan));
        assert_eq!(app.status_message(), "Deleted 1 task(s)");
    }

    #[test]
    fn overrides_for_deleted_tasks_are_dropped() {
        let (_dir, mut app) = app_with(sample());
        select(&mut app, 1);
        app.toggle_selected();
        assert!(app.expansion.is_overridden(1));
        app.request_delete();
        app.confirm_delete().unwrap();
        assert!(!app.expansion.is_overridden(1));
    }

    #[test]
    fn help_and_quit() {
        let (_dir, mut app) = app_with(sample());
        app.handle_key(KeyCode::Char('?')).unwrap();
        assert_eq!(app.state(), AppState::Help);
        assert!(!app.handle_key(KeyCode::Char('q')).unwrap());
        assert_eq!(app.state(), AppState::Tree);
        assert!(app.handle_key(KeyCode::Char('q')).unwrap());
    }

    #[test]
    fn empty_list_has_no_selection() {
        let (_dir, mut app) = app_with(Vec::new());
        assert_eq!(app.selected(), None);
        app.handle_key(KeyCode::Down).unwrap();
        app.handle_key(KeyCode::Char('c')).unwrap();
        assert_eq!(app.selected(), None);
    }
}

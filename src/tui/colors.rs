//! Color constants for the terminal user interface.

use ratatui::style::{Color, Modifier, Style};

use crate::fields::Status;

pub const DARK_GREEN: Color = Color::Rgb(0, 80, 0);
pub const GOLD: Color = Color::Rgb(255, 215, 0);
/// Confirm dialogs and refused changes.
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
/// Header and status bar background.
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);

/// Row style for a task with the given status.
pub fn status_style(status: Status) -> Style {
    match status {
        Status::Pending => Style::default().fg(Color::White),
        Status::InProgress => Style::default().fg(GOLD).add_modifier(Modifier::BOLD),
        Status::Completed => Style::default().fg(Color::DarkGray),
        Status::Cancelled => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT),
    }
}

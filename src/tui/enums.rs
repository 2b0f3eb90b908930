//! Enumerations for TUI state management.

/// Screen the tree view is currently showing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AppState {
    Tree,
    Help,
    Confirm,
}

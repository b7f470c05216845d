//! Application state management

use std::path::PathBuf;

use crate::tree::Selection;

/// Which widget receives key input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    Tree,
    Location,
    Input,
}

/// Main application state
pub struct AppState {
    /// Root directory path
    pub root: PathBuf,
    /// Currently selected node path, threaded through the sync engine
    pub selection: Selection,
    /// Status message shown in the command line
    pub status: Option<String>,
    /// Modal popup text, shown over everything while set
    pub popup: Option<String>,
    /// Command input buffer
    pub input: String,
    /// Location line edit buffer
    pub location_input: String,
    /// Focused widget
    pub focus: Focus,
    /// Armed mode, awaiting its second keystroke
    pub pending_mode: Option<String>,
    /// Top of the tree viewport (scroll position)
    pub viewport_top: usize,
    /// Exit flag
    pub should_quit: bool,
}

impl AppState {
    /// Create new application state rooted at a directory
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            selection: Selection::new(),
            status: None,
            popup: None,
            input: String::new(),
            location_input: String::new(),
            focus: Focus::Tree,
            pending_mode: None,
            viewport_top: 0,
            should_quit: false,
        }
    }

    /// Set the status message
    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    /// Clear the status message
    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Adjust viewport so the focused row stays visible
    pub fn adjust_viewport(&mut self, focus_index: usize, visible_height: usize) {
        if focus_index < self.viewport_top {
            self.viewport_top = focus_index;
        } else if visible_height > 0 && focus_index >= self.viewport_top + visible_height {
            self.viewport_top = focus_index.saturating_sub(visible_height) + 1;
        }
    }
}

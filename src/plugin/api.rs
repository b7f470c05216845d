//! UI pass-through commands for plugins
//!
//! Host functions exposed to plugins (popup, refreshTree, focus*) carry no
//! logic of their own; they queue a command that the UI thread drains and
//! applies after the hook returns.

use std::cell::RefCell;
use std::rc::Rc;

/// A request a plugin made of the surrounding UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Show a modal popup with the given text
    Popup(String),
    /// Re-sync the tree from the root
    RefreshTree,
    /// Move focus to the tree widget
    FocusTree,
    /// Move focus to the location line
    FocusLocation,
    /// Move focus to the command input
    FocusInput,
}

/// Shared queue of pending UI commands.
///
/// Cloning is cheap; all clones feed the same queue. Everything stays on
/// the UI thread, so no locking is involved.
#[derive(Default, Clone)]
pub struct CommandQueue {
    commands: Rc<RefCell<Vec<UiCommand>>>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command for the UI thread
    pub fn push(&self, command: UiCommand) {
        self.commands.borrow_mut().push(command);
    }

    /// Take all pending commands
    pub fn take(&self) -> Vec<UiCommand> {
        std::mem::take(&mut self.commands.borrow_mut())
    }

    /// Whether any commands are pending
    pub fn has_pending(&self) -> bool {
        !self.commands.borrow().is_empty()
    }
}

//! Main event loop for the application
//!
//! One thread owns all state. Plugin systems are brought up at startup
//! with their narration routed through a channel the UI drains into the
//! startup popup; after every load batch the hook snapshot is rebuilt
//! wholesale and passed by reference into the edict pipeline and the tree
//! sync engine.

use std::cell::Cell;
use std::io::Stdout;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::prelude::*;
use tracing::warn;

use super::config::{ConfigFile, Mode, Shortcut};
use super::render;
use super::state::{AppState, Focus};
use crate::edict::{EdictContext, Pipeline};
use crate::error::Result;
use crate::plugin::{
    load_all, CommandQueue, HookSnapshot, LuaSystem, SystemRegistry, UiCommand,
};
use crate::tree::{sync_node, TreeNode};

/// The running application
pub struct App {
    pub state: AppState,
    config: ConfigFile,
    registry: SystemRegistry,
    snapshot: HookSnapshot,
    pipeline: Pipeline,
    queue: CommandQueue,
    root_node: TreeNode,
    needs_refresh: bool,
    quit: Rc<Cell<bool>>,
    fold: Rc<Cell<bool>>,
}

impl App {
    /// Create the application rooted at a directory
    pub fn new(root: PathBuf, config: ConfigFile) -> Result<Self> {
        let root = std::path::absolute(root)?;
        let mut pipeline = Pipeline::new(
            config.actions.post_edict.clone(),
            config.general.max_chain_depth,
        );

        let quit = Rc::new(Cell::new(false));
        let fold = Rc::new(Cell::new(false));
        {
            let flag = Rc::clone(&quit);
            pipeline.register(
                "quit",
                Rc::new(move |ctx: EdictContext| {
                    flag.set(true);
                    ctx.ok("bye")
                }),
            );
        }
        {
            let flag = Rc::clone(&fold);
            pipeline.register(
                "fold-all",
                Rc::new(move |ctx: EdictContext| {
                    flag.set(true);
                    ctx.ok("folded")
                }),
            );
        }

        Ok(Self {
            state: AppState::new(root),
            config,
            registry: SystemRegistry::new(),
            snapshot: HookSnapshot::default(),
            pipeline,
            queue: CommandQueue::new(),
            root_node: TreeNode::new(),
            needs_refresh: false,
            quit,
            fold,
        })
    }

    /// Whether mouse capture should be enabled
    pub fn use_mouse(&self) -> bool {
        self.config.general.use_mouse
    }

    /// Bring up the scripting systems, load their plugins, rebuild the
    /// hook snapshot, and perform the initial tree sync.
    pub fn startup(&mut self) {
        let (tx, rx) = mpsc::channel::<String>();

        if self.config.systems.lua_plugins {
            if let Err(e) = self.registry.register(Box::new(LuaSystem::new())) {
                warn!(error = %e, "failed to register lua system");
            }
        }

        let queue = self.queue.clone();
        let total = Instant::now();
        let _ = tx.send("SYSTEMS".to_string());
        for system in self.registry.systems_mut() {
            let started = Instant::now();
            let _ = tx.send(format!("  {}", system.name()));
            if let Err(e) = system.init(queue.clone()) {
                let _ = tx.send(format!("    init... {e}"));
                continue;
            }
            if let Err(e) = system.populate_plugins() {
                // A failing populate takes down this system only.
                let _ = tx.send(format!("    plugins... {e}"));
                if let Err(e) = system.deinit() {
                    warn!(system = system.name(), error = %e, "deinit failed");
                }
                continue;
            }
            load_all(system.as_mut(), &mut |line| {
                let _ = tx.send(line);
            });
            let _ = tx.send(format!("    ({}ms)", started.elapsed().as_millis()));
        }
        let _ = tx.send(format!("{}ms TOTAL", total.elapsed().as_millis()));
        drop(tx);

        let mut log = Vec::new();
        while let Ok(line) = rx.recv() {
            log.push(line);
        }
        self.state.popup = Some(log.join("\n"));

        self.snapshot = self.registry.snapshot();
        // Plugin-declared binds join the global bind table.
        self.config.binds.extend(self.snapshot.binds.iter().cloned());

        self.refresh_root();
        self.drain_ui_commands();
        self.select_first();
    }

    /// Run the event loop until quit
    pub fn run(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        while !self.state.should_quit {
            let focus_index = self.focus_index();
            let visible_height = terminal.size()?.height.saturating_sub(2) as usize;
            self.state.adjust_viewport(focus_index, visible_height);
            terminal.draw(|frame| {
                render::render(frame, &self.state, &self.root_node, focus_index)
            })?;

            if event::poll(Duration::from_millis(100))? {
                match event::read()? {
                    Event::Key(key) if key.kind != KeyEventKind::Release => {
                        self.handle_key(key)
                    }
                    Event::Mouse(mouse) => self.handle_mouse(mouse),
                    _ => {}
                }
            }

            self.drain_ui_commands();
            if self.needs_refresh {
                self.needs_refresh = false;
                self.refresh_root();
            }
            if self.quit.get() {
                self.state.should_quit = true;
            }
        }
        self.registry.deinit_all();
        Ok(())
    }

    /// Run one edict against the current selection and refresh afterwards
    pub fn run_edict(&mut self, name: &str, arguments: Vec<String>) {
        let selected = match self.state.selection.current() {
            Some(p) => p.to_path_buf(),
            None => self.state.root.clone(),
        };
        let ctx =
            EdictContext::new(self.state.root.clone(), selected).with_arguments(arguments);
        match self.pipeline.run(name, ctx, &self.snapshot.edicts) {
            Ok(result) => {
                match &result.err {
                    Some(err) => self.state.set_status(format!("error: {err}")),
                    None => self.state.set_status(format!("{name} {}", result.msg)),
                }
                if result.err.is_none() && result.selected.exists() {
                    self.state.selection.select(result.selected.clone());
                }
            }
            Err(e) => self.state.set_status(format!("error: {e}")),
        }
        if self.fold.take() {
            self.root_node.collapse_all();
            self.root_node.expanded = true;
        }
        self.drain_ui_commands();
        self.refresh_root();
    }

    /// Re-run the tree-refresh hooks and sync the whole tree
    pub fn refresh_root(&mut self) {
        for hook in &self.snapshot.tree_refresh {
            if let Err(e) = hook() {
                self.state.status = Some(e.to_string());
            }
        }
        let root = self.state.root.clone();
        if let Err(e) = sync_node(
            &mut self.root_node,
            &root,
            true,
            &self.snapshot,
            &mut self.state.selection,
        ) {
            self.state.set_status(format!("error: {e}"));
        }
    }

    fn drain_ui_commands(&mut self) {
        for command in self.queue.take() {
            match command {
                UiCommand::Popup(text) => self.state.popup = Some(text),
                UiCommand::RefreshTree => self.needs_refresh = true,
                UiCommand::FocusTree => self.state.focus = Focus::Tree,
                UiCommand::FocusLocation => {
                    self.state.focus = Focus::Location;
                    self.state.location_input = self.state.root.display().to_string();
                }
                UiCommand::FocusInput => self.state.focus = Focus::Input,
            }
        }
    }

    fn select_first(&mut self) {
        if self.state.selection.current().is_some() {
            return;
        }
        let first = self
            .root_node
            .visible_entries()
            .first()
            .and_then(|(node, _)| node.path().map(Path::to_path_buf));
        if let Some(path) = first {
            self.state.selection.select(path);
        }
    }

    fn focus_index(&self) -> usize {
        let Some(selected) = self.state.selection.current() else {
            return 0;
        };
        self.root_node
            .visible_entries()
            .iter()
            .position(|(node, _)| node.path() == Some(selected))
            .unwrap_or(0)
    }

    fn move_focus(&mut self, delta: isize) {
        let paths: Vec<PathBuf> = self
            .root_node
            .visible_entries()
            .iter()
            .filter_map(|(node, _)| node.path().map(Path::to_path_buf))
            .collect();
        if paths.is_empty() {
            return;
        }
        let current = self
            .state
            .selection
            .current()
            .and_then(|sel| paths.iter().position(|p| p == sel))
            .unwrap_or(0);
        let next = current
            .saturating_add_signed(delta)
            .min(paths.len() - 1);
        self.state.selection.select(paths[next].clone());
    }

    fn activate_selected(&mut self) {
        let Some(path) = self.state.selection.current().map(Path::to_path_buf) else {
            return;
        };
        let is_dir = self
            .root_node
            .find_mut(&path)
            .and_then(|node| node.reference.as_ref())
            .map(|reference| reference.is_dir);
        match is_dir {
            Some(true) => {
                if let Some(node) = self.root_node.find_mut(&path) {
                    let expand = !node.expanded;
                    if let Err(e) =
                        sync_node(node, &path, expand, &self.snapshot, &mut self.state.selection)
                    {
                        self.state.status = Some(format!("error: {e}"));
                    }
                }
            }
            Some(false) => {
                let edict = self.config.actions.enter.clone();
                if !edict.is_empty() {
                    self.run_edict(&edict, Vec::new());
                }
            }
            None => {}
        }
    }

    /// Change the root directory
    pub fn set_root(&mut self, dir: PathBuf) {
        let Ok(abs) = std::path::absolute(&dir) else {
            return;
        };
        if self.state.root != abs {
            self.state.root = abs;
            self.root_node = TreeNode::new();
            self.state.selection.clear();
        }
        self.refresh_root();
        self.select_first();
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.state.popup.is_some() {
            return;
        }
        match mouse.kind {
            MouseEventKind::ScrollUp => self.move_focus(-1),
            MouseEventKind::ScrollDown => self.move_focus(1),
            MouseEventKind::Down(MouseButton::Left) => {
                if mouse.row == 0 {
                    self.state.focus = Focus::Location;
                    self.state.location_input = self.state.root.display().to_string();
                    return;
                }
                self.state.focus = Focus::Tree;
                // Row 0 is the location line.
                let index = self.state.viewport_top + mouse.row as usize - 1;
                let clicked = self
                    .root_node
                    .visible_entries()
                    .get(index)
                    .and_then(|(node, _)| node.path().map(Path::to_path_buf));
                let Some(path) = clicked else {
                    return;
                };
                if self.state.selection.current() == Some(path.as_path()) {
                    // Second click activates; a click on a file runs the
                    // configured click edict rather than the enter one.
                    let is_file = self
                        .root_node
                        .find_mut(&path)
                        .and_then(|node| node.reference.as_ref())
                        .is_some_and(|reference| !reference.is_dir);
                    if is_file {
                        let edict = self.config.actions.click.clone();
                        if !edict.is_empty() {
                            self.run_edict(&edict, Vec::new());
                        }
                    } else {
                        self.activate_selected();
                    }
                } else {
                    self.state.selection.select(path);
                }
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.state.popup.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Tab | KeyCode::Enter) {
                self.state.popup = None;
            }
            return;
        }
        match self.state.focus {
            Focus::Input => self.handle_input_key(key),
            Focus::Location => self.handle_location_key(key),
            Focus::Tree => self.handle_tree_key(key),
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.state.input.clear();
                self.state.focus = Focus::Tree;
            }
            KeyCode::BackTab => self.state.focus = Focus::Tree,
            KeyCode::Backspace => {
                self.state.input.pop();
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.state.input);
                self.state.focus = Focus::Tree;
                if let Some((edict, arguments)) = parse_command(&line, &self.config.shortcuts) {
                    self.run_edict(&edict, arguments);
                }
            }
            KeyCode::Char(c) => self.state.input.push(c),
            _ => {}
        }
    }

    fn handle_location_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.state.location_input = self.state.root.display().to_string();
            }
            KeyCode::Tab => self.state.focus = Focus::Tree,
            KeyCode::Backspace => {
                self.state.location_input.pop();
            }
            KeyCode::Enter => {
                let target = PathBuf::from(self.state.location_input.clone());
                if target.is_dir() {
                    self.set_root(target);
                } else {
                    self.state.location_input = self.state.root.display().to_string();
                }
                self.state.focus = Focus::Tree;
            }
            KeyCode::Char(c) => self.state.location_input.push(c),
            _ => {}
        }
    }

    fn handle_tree_key(&mut self, key: KeyEvent) {
        // An armed mode consumes the next keystroke.
        if let Some(mode_name) = self.state.pending_mode.take() {
            if let KeyCode::Char(c) = key.code {
                let bind = self
                    .config
                    .modes
                    .get(&mode_name)
                    .and_then(|mode| mode.get_bind(c))
                    .cloned();
                if let Some(bind) = bind {
                    self.run_edict(&bind.edict, bind.arguments);
                    return;
                }
            }
            self.state.clear_status();
            return;
        }
        match key.code {
            KeyCode::Tab => self.state.focus = Focus::Input,
            KeyCode::BackTab => {
                self.state.focus = Focus::Location;
                self.state.location_input = self.state.root.display().to_string();
            }
            KeyCode::Up => self.move_focus(-1),
            KeyCode::Down => self.move_focus(1),
            KeyCode::Enter => self.activate_selected(),
            KeyCode::F(5) => self.refresh_root(),
            KeyCode::Char(':') => {
                self.state.focus = Focus::Input;
                self.state.clear_status();
            }
            KeyCode::Char(c) => {
                let armed = self
                    .config
                    .modes
                    .iter()
                    .find(|(_, mode)| mode.rune == c)
                    .map(|(name, mode)| (name.clone(), describe_mode(mode)));
                if let Some((name, description)) = armed {
                    self.state.set_status(format!("MODE: {name} > {description}"));
                    self.state.pending_mode = Some(name);
                    return;
                }
                let bind = self
                    .config
                    .binds
                    .iter()
                    .find(|b| b.rune == Some(c))
                    .cloned();
                if let Some(bind) = bind {
                    self.run_edict(&bind.edict, bind.arguments);
                }
            }
            _ => {}
        }
    }
}

/// Split a command line into an edict name and arguments, expanding a
/// configured shortcut alias on the first token.
pub fn parse_command(line: &str, shortcuts: &[Shortcut]) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let mut edict = first.to_string();
    let mut arguments: Vec<String> = Vec::new();
    for shortcut in shortcuts {
        if shortcut.keyword == first {
            edict = shortcut.edict.clone();
            arguments.extend(shortcut.arguments.iter().cloned());
            break;
        }
    }
    arguments.extend(parts.map(str::to_string));
    Some((edict, arguments))
}

fn describe_mode(mode: &Mode) -> String {
    mode.binds
        .iter()
        .map(|bind| {
            let rune = bind.rune.map(String::from).unwrap_or_default();
            if bind.arguments.is_empty() {
                format!("{rune} {}", bind.edict)
            } else {
                format!("{rune} {} {}", bind.edict, bind.arguments.join(" "))
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortcuts() -> Vec<Shortcut> {
        vec![Shortcut {
            keyword: "e".to_string(),
            edict: "edit".to_string(),
            arguments: vec![],
        }]
    }

    #[test]
    fn test_parse_plain_command() {
        let (edict, arguments) = parse_command("rename a.txt b.txt", &shortcuts()).unwrap();
        assert_eq!(edict, "rename");
        assert_eq!(arguments, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn test_parse_shortcut_expansion() {
        let (edict, arguments) = parse_command("e notes.md", &shortcuts()).unwrap();
        assert_eq!(edict, "edit");
        assert_eq!(arguments, vec!["notes.md".to_string()]);
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(parse_command("   ", &shortcuts()).is_none());
    }

    #[test]
    fn test_shortcut_arguments_come_first() {
        let shortcuts = vec![Shortcut {
            keyword: "gs".to_string(),
            edict: "git".to_string(),
            arguments: vec!["status".to_string()],
        }];
        let (edict, arguments) = parse_command("gs --short", &shortcuts).unwrap();
        assert_eq!(edict, "git");
        assert_eq!(
            arguments,
            vec!["status".to_string(), "--short".to_string()]
        );
    }
}

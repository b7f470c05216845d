//! larch - a plugin-extensible file tree browser for terminal emulators

use std::io::stdout;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use larch::app::{App, ConfigFile};

fn main() -> ExitCode {
    init_logging();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if !root.is_dir() {
        eprintln!("Error: {} is not a directory", root.display());
        return ExitCode::FAILURE;
    }

    let config = match ConfigFile::ensure() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(root, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(root: PathBuf, config: ConfigFile) -> anyhow::Result<()> {
    let mut app = App::new(root, config)?;
    let use_mouse = app.use_mouse();

    terminal::enable_raw_mode()?;
    execute!(stdout(), EnterAlternateScreen)?;
    if use_mouse {
        execute!(stdout(), EnableMouseCapture)?;
    }

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    app.startup();
    let result = app.run(&mut terminal);

    if use_mouse {
        execute!(stdout(), DisableMouseCapture)?;
    }
    execute!(stdout(), LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;

    result?;
    Ok(())
}

/// Log to a file under the state directory; the terminal belongs to the UI
fn init_logging() {
    let Some(dir) = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|d| d.join("larch"))
    else {
        return;
    };
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::File::create(dir.join("larch.log")) else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init();
}

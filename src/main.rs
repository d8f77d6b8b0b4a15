mod shared;
mod tui;
mod audio_api;
mod audio;
mod pipeline;
mod session;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pipeline::settings;
use session::Session;
use shared::InputEvent;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", error_report(&e));
        std::process::exit(1);
    }
}

// the terminal is in raw mode, so logs go to a file in the project dir
fn init_logging(project_dir: &Path) -> anyhow::Result<()> {
    let path = settings::log_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run() -> anyhow::Result<()> {
    let project_dir: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    init_logging(&project_dir)?;

    let mut settings = settings::load_settings(&project_dir);
    let audio = audio::start_audio(&settings, &project_dir)?;
    let mut session = Session::new(&settings, audio.sample_rate());
    info!(project = %project_dir.display(), sample_rate = audio.sample_rate(), "started");

    terminal::enable_raw_mode()?;
    // Enable keyboard enhancement for real press/release detection.
    // Falls back to press-only if the terminal doesn't support it.
    let release_events = terminal::supports_keyboard_enhancement().unwrap_or(false);
    if release_events {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PushKeyboardEnhancementFlags(
                crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        );
    } else {
        warn!("terminal can't report key releases, notes play out until space");
    }
    let _guard = RawModeGuard { release_events }; // auto drops when out of scope

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let tick_rate = std::time::Duration::from_millis(16); // ~60fps
    let blink_start = Instant::now();
    let mut tui_state = tui::mode::TuiState {
        release_events,
        ..Default::default()
    };

    loop {
        let blink_on = (blink_start.elapsed().as_millis() / 250) % 2 == 0;

        // capture hand-backs and retired buffers from the engine
        while let Some(event) = audio.poll_event() {
            session.on_engine_event(event);
        }
        session.note_dropped_events(audio.dropped_events());

        let ds = session.display_state(audio.active_voices());
        tui_state.sync_mode(ds.mode);

        term.draw(|frame| {
            let area = frame.area();
            tui::view::render(frame, area, &ds, blink_on);
        })?;

        let events = tui::input::poll_input(tick_rate, &mut tui_state)?;
        for event in events {
            if event == InputEvent::Quit {
                settings.monitor_input = session.monitor_input();
                if let Err(e) = settings::save_settings(&project_dir, &settings) {
                    warn!(error = %e, "could not save settings");
                }
                info!("quit");
                drop(term);
                drop(audio);
                return Ok(());
            }
            for cmd in session.handle_input(event) {
                audio.send(cmd);
            }
        }
    }
}

// whole context chain on one line
fn error_report(e: &anyhow::Error) -> String {
    format!("Error: {:#}", e)
}

struct RawModeGuard {
    release_events: bool,
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.release_events {
            let _ = crossterm::execute!(
                std::io::stdout(),
                crossterm::event::PopKeyboardEnhancementFlags
            );
        }
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn error_report_includes_causes() {
        let err = std::fs::read("/definitely/not/here.wav")
            .context("could not load input file")
            .unwrap_err();
        let report = error_report(&err);
        assert!(report.starts_with("Error: could not load input file: "));
        assert!(report.len() > "Error: could not load input file: ".len());
    }
}

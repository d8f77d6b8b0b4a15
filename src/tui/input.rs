use std::time::Duration;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crate::shared::{InputEvent, SessionKind, TRIM_STEP};
use super::mode::TuiState;

// poll for input from tui, tracks held piano keys in tuistate,
// resolves keys to input events for the session based on the current mode
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        return Ok(handle_key(key.code, key.kind, ts));
    }
    Ok(vec![])
}

fn handle_key(code: KeyCode, kind: KeyEventKind, ts: &mut TuiState) -> Vec<InputEvent> {
    if kind == KeyEventKind::Repeat {
        return vec![];
    }
    let pressed = kind == KeyEventKind::Press;

    // releases only matter for the piano keys
    if !pressed {
        return match (ts.mode, code) {
            (SessionKind::Sampling, KeyCode::Char(c)) => match char_to_key(c) {
                Some(k) if ts.held_keys[k as usize] => {
                    ts.held_keys[k as usize] = false;
                    vec![InputEvent::KeyUp(k)]
                }
                _ => vec![],
            },
            _ => vec![],
        };
    }

    match code {
        KeyCode::Esc => return vec![InputEvent::Quit],
        KeyCode::Char('m') => return vec![InputEvent::ToggleMonitor],
        _ => {}
    }

    match ts.mode {
        SessionKind::Recording => resolve_recording(code),
        SessionKind::Trimming => resolve_trimming(code),
        SessionKind::Sampling => resolve_sampling(code, ts),
    }
}

fn resolve_recording(code: KeyCode) -> Vec<InputEvent> {
    match code {
        KeyCode::Char(c @ '1'..='9') => vec![InputEvent::SelectDuration(c as usize - '1' as usize)],
        _ => vec![],
    }
}

fn resolve_trimming(code: KeyCode) -> Vec<InputEvent> {
    match code {
        KeyCode::Char('[') => vec![InputEvent::NudgeStart(-TRIM_STEP)],
        KeyCode::Char(']') => vec![InputEvent::NudgeStart(TRIM_STEP)],
        KeyCode::Char('-') => vec![InputEvent::NudgeEnd(-TRIM_STEP)],
        KeyCode::Char('=') => vec![InputEvent::NudgeEnd(TRIM_STEP)],
        KeyCode::Char('p') => vec![InputEvent::Preview],
        KeyCode::Char('o') => vec![InputEvent::StopPreview],
        KeyCode::Char('k') => vec![InputEvent::DetectPitch],
        KeyCode::Enter => vec![InputEvent::StopPreview, InputEvent::Done],
        _ => vec![],
    }
}

fn resolve_sampling(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    match code {
        KeyCode::Char(' ') => {
            ts.held_keys = Default::default();
            vec![InputEvent::AllNotesOff]
        }
        KeyCode::Char(c) => match char_to_key(c) {
            // a second press without a release in between is autorepeat
            Some(k) if ts.release_events && ts.held_keys[k as usize] => vec![],
            Some(k) => {
                ts.held_keys[k as usize] = true;
                vec![InputEvent::KeyDown(k)]
            }
            None => vec![],
        },
        _ => vec![],
    }
}

// convert char to piano key index, 0 = base note
pub fn char_to_key(c: char) -> Option<u8> {
    let idx = match c {
        'a' => 0, 'w' => 1, 's' => 2, 'e' => 3,
        'd' => 4, 'f' => 5, 't' => 6, 'g' => 7,
        'y' => 8, 'h' => 9, 'u' => 10, 'j' => 11,
        'k' => 12, 'o' => 13, 'l' => 14, 'p' => 15,
        _ => return None,
    };
    Some(idx)
}

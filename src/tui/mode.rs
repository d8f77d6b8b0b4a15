use crate::shared::{SessionKind, NUM_KEYS};

// state local to tui, decides what a key means right now
// mode is synced from DisplayState per loop
#[derive(Clone, Debug)]
pub struct TuiState {
    pub mode: SessionKind,
    // piano keys currently down, so repeats don't retrigger
    pub held_keys: [bool; NUM_KEYS],
    // false when the terminal can't report key releases; notes then play out
    // or stop on AllNotesOff
    pub release_events: bool,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            mode: SessionKind::Recording,
            held_keys: [false; NUM_KEYS],
            release_events: false,
        }
    }
}

impl TuiState {
    pub fn sync_mode(&mut self, mode: SessionKind) {
        if mode != self.mode {
            self.held_keys = [false; NUM_KEYS];
            self.mode = mode;
        }
    }
}

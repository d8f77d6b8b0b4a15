// The current input plan:
//
// Recording:
//   1 2 3         //  SelectDuration(0 | 1 | 2), one per duration preset
//
// Trimming:
//   [ / ]         //  NudgeStart(-TRIM_STEP / TRIM_STEP)
//   - / =         //  NudgeEnd(-TRIM_STEP / TRIM_STEP)
//   p             //  Preview (also runs pitch detection)
//   o             //  StopPreview
//   k             //  DetectPitch
//   Enter         //  Done
//
// Sampling, a one-and-a-bit octave keyboard starting at `base_note`:
//    w e   t y u   o p
//   a s d f g h j k l      //  KeyDown(0..16) / KeyUp(0..16)
//   Space         //  AllNotesOff
//
// Anywhere:
//   m             //  ToggleMonitor
//   Esc           //  Quit
//
// Same split as before: the session owns all of the state and the TUI just
// renders the `DisplayState` it hands back every frame.

pub const NUM_KEYS: usize = 16;
pub const TRIM_STEP: f32 = 0.01;
pub const WAVEFORM_COLUMNS: usize = 120;

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    // recording
    SelectDuration(usize), // index into the duration presets

    // trimming
    NudgeStart(f32),
    NudgeEnd(f32),
    Preview,
    StopPreview,
    DetectPitch,
    Done,

    // sampling
    KeyDown(u8), // index 0-15 from the left of the keyboard
    KeyUp(u8),
    AllNotesOff,

    ToggleMonitor,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    Recording,
    Trimming,
    Sampling,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            SessionKind::Recording => "RECORDING",
            SessionKind::Trimming => "TRIMMING",
            SessionKind::Sampling => "SAMPLER",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub mode: SessionKind,
    pub duration_presets: Vec<f32>, // seconds, in key order
    pub buffer_duration: f32,
    pub capturing: bool, // waiting for the engine to hand the capture back
    pub start_position: f32, // normalized trim bounds
    pub end_position: f32,
    pub previewing: bool,
    pub detected_note: String, // current histogram winner, e.g. "A3"
    pub analyzed_chunks: u32,
    pub root_note: String, // root of the playable sample
    pub sample_seconds: f32,
    pub waveform: Vec<f32>, // peak per column, 0.0 to 1.0
    pub keys_lit: [bool; NUM_KEYS],
    pub base_note: u8,
    pub active_voices: usize,
    pub monitor_input: bool,
    pub dropped_events: usize, // engine events lost to a full channel
}

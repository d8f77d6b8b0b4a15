// The control-side state machine: Recording -> Trimming -> Sampling.
//
// Nothing here runs on the audio thread. Every change the engine has to see
// goes out as an `AudioCommand`, with any buffer it needs already built.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::histogram::{PitchHistogram, ANALYSIS_CHUNK};
use crate::audio::pitch::{note_name, PitchEstimator, NUM_PITCHES};
use crate::audio_api::{AudioCommand, EngineEvent, PlayableSample, PreviewParams, SampleBuffer};
use crate::pipeline::settings::Settings;
use crate::shared::{DisplayState, InputEvent, SessionKind, WAVEFORM_COLUMNS};

pub const MIN_TRIM_SEPARATION: f32 = 0.01;
pub const DEFAULT_ROOT_PITCH: u8 = 60; // C4

pub struct TrimState {
    buffer: Arc<SampleBuffer>,
    capturing: bool,
    start: f32,
    end: f32,
    histogram: PitchHistogram,
    previewing: bool,
    waveform: Vec<f32>, // computed once per capture
}

impl TrimState {
    // [round(start * N), round(end * N)) in frames
    fn frame_range(&self) -> (usize, usize) {
        let n = self.buffer.len();
        let start = ((self.start as f64 * n as f64).round() as usize).min(n);
        let end = ((self.end as f64 * n as f64).round() as usize).clamp(start, n);
        (start, end)
    }
}

pub struct SamplingState {
    sample: Arc<PlayableSample>,
}

pub enum Mode {
    Recording,
    Trimming(TrimState),
    Sampling(SamplingState),
}

pub struct Session {
    mode: Mode,
    settings: Settings,
    sample_rate: u32,
    max_frames: usize,
    buffer_duration: f32,
    estimator: PitchEstimator,
    mode_pitch: u8,
    held: [bool; NUM_PITCHES],
    monitor_input: bool,
    dropped_events: usize,
}

impl Session {
    pub fn new(settings: &Settings, sample_rate: u32) -> Self {
        let max_frames =
            (sample_rate as f64 * settings.max_record_seconds as f64).round() as usize;
        Self {
            mode: Mode::Recording,
            settings: settings.clone(),
            sample_rate,
            max_frames,
            buffer_duration: settings.max_record_seconds,
            estimator: PitchEstimator::new(sample_rate, ANALYSIS_CHUNK),
            mode_pitch: DEFAULT_ROOT_PITCH,
            held: [false; NUM_PITCHES],
            monitor_input: settings.monitor_input,
            dropped_events: 0,
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self.mode {
            Mode::Recording => SessionKind::Recording,
            Mode::Trimming(_) => SessionKind::Trimming,
            Mode::Sampling(_) => SessionKind::Sampling,
        }
    }

    pub fn monitor_input(&self) -> bool {
        self.monitor_input
    }

    pub fn buffer_duration(&self) -> f32 {
        self.buffer_duration
    }

    pub fn trim_bounds(&self) -> Option<(f32, f32)> {
        match &self.mode {
            Mode::Trimming(trim) => Some((trim.start, trim.end)),
            _ => None,
        }
    }

    // DEFAULT_ROOT_PITCH until some analysis finds a pitch
    pub fn mode_pitch(&self) -> u8 {
        self.mode_pitch
    }

    #[cfg(test)]
    pub fn playable_sample(&self) -> Option<&Arc<PlayableSample>> {
        match &self.mode {
            Mode::Sampling(s) => Some(&s.sample),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn trimmed_buffer(&self) -> Option<&Arc<SampleBuffer>> {
        match &self.mode {
            Mode::Trimming(trim) => Some(&trim.buffer),
            _ => None,
        }
    }

    // while recording this moves straight on to trimming
    pub fn set_buffer_duration(&mut self, seconds: f32) -> Vec<AudioCommand> {
        if !(seconds > 0.0) {
            warn!(seconds, "ignoring non-positive buffer duration");
            return vec![];
        }
        self.buffer_duration = seconds.min(self.settings.max_record_seconds);
        info!(seconds = self.buffer_duration, "buffer duration selected");
        self.enter_trim_mode()
    }

    pub fn enter_trim_mode(&mut self) -> Vec<AudioCommand> {
        if !matches!(self.mode, Mode::Recording) {
            debug!(mode = ?self.kind(), "trim mode only follows recording");
            return vec![];
        }

        let total = (self.buffer_duration as f64 * self.sample_rate as f64).round() as usize;
        let total = total.min(self.max_frames);
        let dest = SampleBuffer::silent(self.settings.input_channels as usize, total);

        self.mode = Mode::Trimming(TrimState {
            buffer: Arc::new(SampleBuffer::default()),
            capturing: true,
            start: 0.0,
            end: 1.0,
            histogram: PitchHistogram::new(self.mode_pitch),
            previewing: false,
            waveform: vec![],
        });
        info!(frames = total, "entering trim mode");
        vec![AudioCommand::Capture { dest }]
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Captured(buffer) => {
                let Mode::Trimming(trim) = &mut self.mode else {
                    warn!("capture arrived outside trim mode, dropping it");
                    return;
                };
                if !trim.capturing {
                    warn!("unexpected second capture, dropping it");
                    return;
                }
                info!(frames = buffer.len(), channels = buffer.num_channels(), "capture ready");
                trim.waveform = peak_overview(&buffer, WAVEFORM_COLUMNS);
                trim.buffer = Arc::new(buffer);
                trim.capturing = false;
            }
            EngineEvent::Retired(item) => {
                debug!(?item, "releasing buffer retired by the engine");
            }
        }
    }

    pub fn set_start_position(&mut self, pos: f32) {
        let Mode::Trimming(trim) = &mut self.mode else {
            return;
        };
        if !pos.is_finite() {
            return;
        }
        let wanted = pos.clamp(0.0, 1.0);
        trim.start = wanted.min(trim.end - MIN_TRIM_SEPARATION).max(0.0);
        if trim.start != wanted {
            debug!(wanted, start = trim.start, "start position clamped");
        }
    }

    pub fn set_end_position(&mut self, pos: f32) {
        let Mode::Trimming(trim) = &mut self.mode else {
            return;
        };
        if !pos.is_finite() {
            return;
        }
        let wanted = pos.clamp(0.0, 1.0);
        trim.end = wanted.max(trim.start + MIN_TRIM_SEPARATION).min(1.0);
        if trim.end != wanted {
            debug!(wanted, end = trim.end, "end position clamped");
        }
    }

    // counts accumulate until the next capture
    pub fn detect_pitch(&mut self) -> Option<u8> {
        let Mode::Trimming(trim) = &mut self.mode else {
            return None;
        };
        if trim.capturing {
            debug!("capture not back yet, skipping analysis");
            return None;
        }
        if trim.buffer.is_empty() {
            return Some(self.mode_pitch);
        }
        let (start, end) = trim.frame_range();
        let (mode, counted) = trim.histogram.analyze(&mut self.estimator, &trim.buffer, start, end);
        self.mode_pitch = mode;
        info!(
            pitch = mode,
            note = %note_name(mode),
            counted,
            total = trim.histogram.total(),
            "pitch analysis finished"
        );
        Some(mode)
    }

    pub fn preview_trimmed_sample(&mut self) -> Vec<AudioCommand> {
        match &self.mode {
            Mode::Trimming(trim) if trim.capturing => {
                debug!("capture not back yet, no preview");
                return vec![];
            }
            Mode::Trimming(_) => {}
            _ => return vec![],
        }
        self.detect_pitch();

        let Mode::Trimming(trim) = &mut self.mode else {
            return vec![];
        };
        let (start, end) = trim.frame_range();
        trim.previewing = true;
        debug!(start, end, "preview started");
        vec![AudioCommand::StartPreview(PreviewParams {
            buffer: Arc::clone(&trim.buffer),
            start,
            end,
        })]
    }

    pub fn stop_preview(&mut self) -> Vec<AudioCommand> {
        if let Mode::Trimming(trim) = &mut self.mode {
            trim.previewing = false;
        }
        vec![AudioCommand::StopPreview]
    }

    pub fn enter_sampler_mode(&mut self) -> Vec<AudioCommand> {
        let Mode::Trimming(trim) = &self.mode else {
            debug!(mode = ?self.kind(), "sampler mode only follows trimming");
            return vec![];
        };
        if trim.capturing {
            debug!("capture not back yet, staying in trim mode");
            return vec![];
        }
        let (start, end) = trim.frame_range();
        let root = trim.histogram.mode();
        let sample = Arc::new(PlayableSample::new(trim.buffer.slice(start, end), root));

        info!(
            frames = sample.len(),
            root,
            note = %note_name(root),
            "entering sampler mode"
        );
        self.mode_pitch = root;
        self.mode = Mode::Sampling(SamplingState { sample: Arc::clone(&sample) });
        vec![AudioCommand::InstallSample(sample)]
    }

    pub fn note_on(&mut self, pitch: u8, velocity: f32) -> Vec<AudioCommand> {
        if !matches!(self.mode, Mode::Sampling(_)) || pitch as usize >= NUM_PITCHES {
            return vec![];
        }
        self.held[pitch as usize] = true;
        debug!(pitch, velocity, "note on");
        vec![AudioCommand::NoteOn { pitch, velocity }]
    }

    pub fn note_off(&mut self, pitch: u8, allow_release: bool) -> Vec<AudioCommand> {
        if !matches!(self.mode, Mode::Sampling(_)) || pitch as usize >= NUM_PITCHES {
            return vec![];
        }
        self.held[pitch as usize] = false;
        debug!(pitch, allow_release, "note off");
        vec![AudioCommand::NoteOff { pitch, allow_release }]
    }

    pub fn all_notes_off(&mut self) -> Vec<AudioCommand> {
        self.held = [false; NUM_PITCHES];
        vec![AudioCommand::AllNotesOff { allow_release: self.settings.release_on_key_up }]
    }

    pub fn waveform_overview(&self) -> &[f32] {
        match &self.mode {
            Mode::Trimming(trim) => &trim.waveform,
            _ => &[],
        }
    }

    // Takes the engine's running count of lost events, warns when it grows
    pub fn note_dropped_events(&mut self, count: usize) {
        if count > self.dropped_events {
            warn!(lost = count - self.dropped_events, total = count, "engine events dropped");
            self.dropped_events = count;
        }
    }

    fn key_to_pitch(&self, key: u8) -> Option<u8> {
        let pitch = self.settings.base_note as usize + key as usize;
        (pitch < NUM_PITCHES).then_some(pitch as u8)
    }

    pub fn handle_input(&mut self, event: InputEvent) -> Vec<AudioCommand> {
        match event {
            InputEvent::SelectDuration(i) => match self.settings.duration_presets.get(i) {
                Some(&seconds) if matches!(self.mode, Mode::Recording) => {
                    self.set_buffer_duration(seconds)
                }
                _ => vec![],
            },
            InputEvent::NudgeStart(delta) => {
                if let Some((start, _)) = self.trim_bounds() {
                    self.set_start_position(start + delta);
                }
                vec![]
            }
            InputEvent::NudgeEnd(delta) => {
                if let Some((_, end)) = self.trim_bounds() {
                    self.set_end_position(end + delta);
                }
                vec![]
            }
            InputEvent::Preview => self.preview_trimmed_sample(),
            InputEvent::StopPreview => self.stop_preview(),
            InputEvent::DetectPitch => {
                self.detect_pitch();
                vec![]
            }
            InputEvent::Done => self.enter_sampler_mode(),
            InputEvent::KeyDown(key) => match self.key_to_pitch(key) {
                Some(pitch) => self.note_on(pitch, self.settings.velocity),
                None => vec![],
            },
            InputEvent::KeyUp(key) => match self.key_to_pitch(key) {
                Some(pitch) => self.note_off(pitch, self.settings.release_on_key_up),
                None => vec![],
            },
            InputEvent::AllNotesOff => self.all_notes_off(),
            InputEvent::ToggleMonitor => {
                self.monitor_input = !self.monitor_input;
                info!(on = self.monitor_input, "input monitoring toggled");
                vec![AudioCommand::SetMonitor(self.monitor_input)]
            }
            InputEvent::Quit => vec![],
        }
    }

    pub fn display_state(&self, active_voices: usize) -> DisplayState {
        let (capturing, start, end, previewing, analyzed) = match &self.mode {
            Mode::Trimming(t) => (t.capturing, t.start, t.end, t.previewing, t.histogram.total()),
            _ => (false, 0.0, 1.0, false, 0),
        };
        let (root_note, sample_seconds) = match &self.mode {
            Mode::Sampling(s) => (
                note_name(s.sample.root_pitch()),
                s.sample.len() as f32 / self.sample_rate as f32,
            ),
            _ => (String::new(), 0.0),
        };
        let keys_lit = std::array::from_fn(|k| {
            self.key_to_pitch(k as u8)
                .is_some_and(|p| self.held[p as usize])
        });

        DisplayState {
            mode: self.kind(),
            duration_presets: self.settings.duration_presets.clone(),
            buffer_duration: self.buffer_duration(),
            capturing,
            start_position: start,
            end_position: end,
            previewing,
            detected_note: note_name(self.mode_pitch()),
            analyzed_chunks: analyzed,
            root_note,
            sample_seconds,
            waveform: self.waveform_overview().to_vec(),
            keys_lit,
            base_note: self.settings.base_note,
            active_voices,
            monitor_input: self.monitor_input,
            dropped_events: self.dropped_events,
        }
    }
}

// Peak magnitude of the first channel per column, 0.0 to 1.0
fn peak_overview(buffer: &SampleBuffer, columns: usize) -> Vec<f32> {
    let data = buffer.channel(0);
    if data.is_empty() || columns == 0 {
        return vec![0.0; columns];
    }
    (0..columns)
        .map(|c| {
            let from = c * data.len() / columns;
            let to = ((c + 1) * data.len() / columns).max(from + 1).min(data.len());
            data[from..to]
                .iter()
                .fold(0.0f32, |peak, x| peak.max(x.abs()))
                .min(1.0)
        })
        .collect()
}

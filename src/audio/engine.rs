use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::Sender;

use crate::audio_api::{AudioCommand, EngineEvent, PreviewParams, Retired};

use super::frame::StereoFrame;
use super::recorder::CircularRecorder;
use super::sample_buffer::SampleBuffer;
use super::voice::{PlayableSample, PlaybackVoice};

pub const MAX_VOICES: usize = 16; // hard cap so we wont malloc in audio callback

// Looping playback of the trimmed range, mixed over the input
struct Preview {
    buffer: Arc<SampleBuffer>,
    start: usize,
    end: usize,
    pos: usize,
}

impl Preview {
    fn new(params: PreviewParams) -> Self {
        let end = params.end.min(params.buffer.len());
        let start = params.start.min(end);
        Self {
            buffer: params.buffer,
            start,
            end,
            pos: start,
        }
    }

    fn mix_into(&mut self, out: &mut [StereoFrame]) {
        if self.end <= self.start {
            return;
        }
        for frame in out.iter_mut() {
            frame.add_scaled(self.buffer.frame(self.pos), 1.0);
            self.pos += 1;
            if self.pos >= self.end {
                self.pos = self.start;
            }
        }
    }
}

enum EngineMode {
    Recording,
    Trimming { preview: Option<Preview> },
    Sampling { sample: Arc<PlayableSample> },
}

#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineModeKind {
    Recording,
    Trimming,
    Sampling,
}

// Everything the audio callback touches. The control side talks to it only
// through `AudioCommand`s.
pub struct Engine {
    mode: EngineMode,
    recorder: CircularRecorder,
    voices: [PlaybackVoice; MAX_VOICES], // fixed pool of voices
    voice_started: [u64; MAX_VOICES],
    triggers: u64,
    monitor_input: bool,
    event_tx: Option<Sender<EngineEvent>>,
    active_voices: Arc<AtomicUsize>,
    dropped_events: Arc<AtomicUsize>, // events lost to a full channel
}

impl Engine {
    pub fn new(recorder: CircularRecorder) -> Self {
        Self {
            mode: EngineMode::Recording,
            recorder,
            voices: std::array::from_fn(|_| PlaybackVoice::new()),
            voice_started: [0; MAX_VOICES],
            triggers: 0,
            monitor_input: true,
            event_tx: None,
            active_voices: Arc::new(AtomicUsize::new(0)),
            dropped_events: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_event_tx(&mut self, tx: Sender<EngineEvent>) {
        self.event_tx = Some(tx);
    }

    pub fn set_monitor_input(&mut self, on: bool) {
        self.monitor_input = on;
    }

    pub fn active_voices_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_voices)
    }

    pub fn dropped_events_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.dropped_events)
    }

    #[cfg(test)]
    pub fn mode(&self) -> EngineModeKind {
        match self.mode {
            EngineMode::Recording => EngineModeKind::Recording,
            EngineMode::Trimming { .. } => EngineModeKind::Trimming,
            EngineMode::Sampling { .. } => EngineModeKind::Sampling,
        }
    }

    #[cfg(test)]
    pub fn is_previewing(&self) -> bool {
        matches!(self.mode, EngineMode::Trimming { preview: Some(_) })
    }

    #[cfg(test)]
    pub fn recorder(&self) -> &CircularRecorder {
        &self.recorder
    }

    #[cfg(test)]
    pub fn voices(&self) -> &[PlaybackVoice] {
        &self.voices
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Capture { dest } => self.capture(dest),
            AudioCommand::StartPreview(params) => self.start_preview(params),
            AudioCommand::StopPreview => self.stop_preview(),
            AudioCommand::InstallSample(sample) => self.install_sample(sample),
            AudioCommand::NoteOn { pitch, velocity } => self.note_on(pitch, velocity),
            AudioCommand::NoteOff { pitch, allow_release } => {
                for v in self.voices.iter_mut().filter(|v| !v.is_idle() && v.note() == pitch) {
                    v.stop(allow_release);
                }
            }
            AudioCommand::AllNotesOff { allow_release } => {
                for v in self.voices.iter_mut() {
                    v.stop(allow_release);
                }
            }
            AudioCommand::SetMonitor(on) => self.monitor_input = on,
        }
    }

    // A full channel hands the event back and it gets dropped right here, so
    // it is counted for the control side to report.
    fn send_event(&self, event: EngineEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.try_send(event).is_err() {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn retire(&self, item: Retired) {
        self.send_event(EngineEvent::Retired(item));
    }

    fn capture(&mut self, mut dest: SampleBuffer) {
        if !matches!(self.mode, EngineMode::Recording) {
            self.retire(Retired::Buffer(dest));
            return;
        }
        let len = dest.len();
        self.recorder.copy_window(&mut dest, 0, len);
        self.mode = EngineMode::Trimming { preview: None };
        self.send_event(EngineEvent::Captured(dest));
    }

    fn start_preview(&mut self, params: PreviewParams) {
        let EngineMode::Trimming { preview } = &mut self.mode else {
            self.retire(Retired::Shared(params.buffer));
            return;
        };
        let old = preview.replace(Preview::new(params));
        if let Some(old) = old {
            self.retire(Retired::Shared(old.buffer));
        }
    }

    fn stop_preview(&mut self) {
        if let EngineMode::Trimming { preview } = &mut self.mode {
            if let Some(old) = preview.take() {
                self.retire(Retired::Shared(old.buffer));
            }
        }
    }

    fn install_sample(&mut self, sample: Arc<PlayableSample>) {
        for v in self.voices.iter_mut() {
            v.clear();
        }
        let previous = std::mem::replace(&mut self.mode, EngineMode::Sampling { sample });
        match previous {
            EngineMode::Trimming { preview: Some(p) } => self.retire(Retired::Shared(p.buffer)),
            EngineMode::Sampling { sample } => self.retire(Retired::Sample(sample)),
            _ => {}
        }
    }

    fn note_on(&mut self, pitch: u8, velocity: f32) {
        let EngineMode::Sampling { sample } = &self.mode else {
            return;
        };
        let sample = Arc::clone(sample);

        // retrigger the same note, else a free voice, else steal the oldest
        let slot = self
            .voices
            .iter()
            .position(|v| !v.is_idle() && v.note() == pitch)
            .or_else(|| self.voices.iter().position(PlaybackVoice::is_idle))
            .unwrap_or_else(|| {
                (0..MAX_VOICES)
                    .min_by_key(|&i| self.voice_started[i])
                    .unwrap_or(0)
            });

        self.triggers += 1;
        self.voice_started[slot] = self.triggers;
        self.voices[slot].start(pitch, velocity, sample);
    }

    // `input` may be shorter than `output` when the device fell behind; the
    // missing frames are silence.
    pub fn render_block(&mut self, input: &[StereoFrame], output: &mut [StereoFrame]) {
        match &mut self.mode {
            EngineMode::Recording => {
                self.recorder.write(input);
                pass_through(input, output, self.monitor_input);
            }
            EngineMode::Trimming { preview } => {
                pass_through(input, output, self.monitor_input);
                if let Some(p) = preview {
                    p.mix_into(output);
                }
            }
            EngineMode::Sampling { .. } => {
                output.fill(StereoFrame::zero());
                for v in self.voices.iter_mut() {
                    v.render_into(output);
                }
            }
        }

        let sounding = self.voices.iter().filter(|v| !v.is_idle()).count();
        self.active_voices.store(sounding, Ordering::Relaxed);
    }
}

fn pass_through(input: &[StereoFrame], output: &mut [StereoFrame], monitor: bool) {
    let copied = if monitor { input.len().min(output.len()) } else { 0 };
    output[..copied].copy_from_slice(&input[..copied]);
    output[copied..].fill(StereoFrame::zero());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice::{VoiceState, VOICE_GAIN};

    fn frames(values: &[f32]) -> Vec<StereoFrame> {
        values.iter().copied().map(StereoFrame::mono).collect()
    }

    fn engine_with_events(capacity: usize) -> (Engine, crossbeam_channel::Receiver<EngineEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(64);
        let mut engine = Engine::new(CircularRecorder::new(2, capacity));
        engine.set_event_tx(tx);
        (engine, rx)
    }

    fn captured(rx: &crossbeam_channel::Receiver<EngineEvent>) -> SampleBuffer {
        loop {
            match rx.try_recv().expect("no capture event") {
                EngineEvent::Captured(buf) => return buf,
                EngineEvent::Retired(_) => continue,
            }
        }
    }

    fn sampling_engine(data: Vec<f32>, root: u8) -> Engine {
        let mut engine = Engine::new(CircularRecorder::new(1, 16));
        let sample = PlayableSample::new(SampleBuffer::from_channels(vec![data]), root);
        engine.handle_cmd(AudioCommand::InstallSample(Arc::new(sample)));
        engine
    }

    #[test]
    fn recording_writes_and_passes_through() {
        let (mut engine, _rx) = engine_with_events(8);
        let input = frames(&[0.1, 0.2, 0.3]);
        let mut out = vec![StereoFrame::mono(9.0); 4];
        engine.render_block(&input, &mut out);

        assert_eq!(&out[..3], input.as_slice());
        assert_eq!(out[3], StereoFrame::zero());
        assert_eq!(engine.recorder().write_position(), 3);
    }

    #[test]
    fn monitor_off_outputs_silence() {
        let (mut engine, _rx) = engine_with_events(8);
        engine.handle_cmd(AudioCommand::SetMonitor(false));
        let mut out = vec![StereoFrame::mono(9.0); 2];
        engine.render_block(&frames(&[0.5, 0.5]), &mut out);
        assert!(out.iter().all(|f| *f == StereoFrame::zero()));
        assert_eq!(engine.recorder().write_position(), 2);
    }

    #[test]
    fn capture_returns_most_recent_frames_and_stops_recording() {
        let (mut engine, rx) = engine_with_events(8);
        let mut out = vec![StereoFrame::zero(); 6];
        engine.render_block(&frames(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), &mut out);

        engine.handle_cmd(AudioCommand::Capture { dest: SampleBuffer::silent(2, 4) });
        assert_eq!(engine.mode(), EngineModeKind::Trimming);
        let buf = captured(&rx);
        assert_eq!(buf.channel(0), &[3.0, 4.0, 5.0, 6.0]);

        // trimming no longer records
        engine.render_block(&frames(&[7.0]), &mut out[..1]);
        assert_eq!(engine.recorder().write_position(), 6);
    }

    #[test]
    fn preview_loops_over_range_on_top_of_input() {
        let (mut engine, _rx) = engine_with_events(8);
        engine.handle_cmd(AudioCommand::Capture { dest: SampleBuffer::silent(1, 4) });

        let buffer = Arc::new(SampleBuffer::from_channels(vec![vec![0.0, 1.0, 2.0, 3.0]]));
        engine.handle_cmd(AudioCommand::StartPreview(PreviewParams { buffer, start: 1, end: 3 }));
        assert!(engine.is_previewing());

        let input = frames(&[0.5; 5]);
        let mut out = vec![StereoFrame::zero(); 5];
        engine.render_block(&input, &mut out);
        let left: Vec<f32> = out.iter().map(|f| f.left).collect();
        assert_eq!(left, vec![1.5, 2.5, 1.5, 2.5, 1.5]);

        engine.handle_cmd(AudioCommand::StopPreview);
        assert!(!engine.is_previewing());
        engine.render_block(&input, &mut out);
        assert!(out.iter().all(|f| f.left == 0.5));
    }

    #[test]
    fn empty_preview_range_is_silent() {
        let (mut engine, _rx) = engine_with_events(8);
        engine.handle_cmd(AudioCommand::Capture { dest: SampleBuffer::silent(1, 4) });
        let buffer = Arc::new(SampleBuffer::from_channels(vec![vec![1.0; 4]]));
        engine.handle_cmd(AudioCommand::StartPreview(PreviewParams { buffer, start: 2, end: 2 }));
        engine.set_monitor_input(false);

        let mut out = vec![StereoFrame::zero(); 3];
        engine.render_block(&[], &mut out);
        assert!(out.iter().all(|f| *f == StereoFrame::zero()));
    }

    #[test]
    fn sampling_ignores_input_and_renders_voices() {
        let mut engine = sampling_engine(vec![1.0; 32], 60);
        let mut out = vec![StereoFrame::mono(0.7); 4];

        engine.render_block(&frames(&[0.9; 4]), &mut out);
        assert!(out.iter().all(|f| *f == StereoFrame::zero()));

        engine.handle_cmd(AudioCommand::NoteOn { pitch: 60, velocity: 1.0 });
        engine.render_block(&frames(&[0.9; 4]), &mut out);
        assert!(out.iter().all(|f| (f.left - VOICE_GAIN).abs() < 1e-6));
        assert_eq!(engine.active_voices_handle().load(Ordering::Relaxed), 1);
    }

    #[test]
    fn note_on_outside_sampling_is_ignored() {
        let (mut engine, _rx) = engine_with_events(8);
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 60, velocity: 1.0 });
        assert!(engine.voices().iter().all(PlaybackVoice::is_idle));
    }

    #[test]
    fn same_note_retriggers_one_voice() {
        let mut engine = sampling_engine(vec![1.0; 32], 60);
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 64, velocity: 1.0 });
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 64, velocity: 1.0 });
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 67, velocity: 1.0 });
        let sounding = engine.voices().iter().filter(|v| !v.is_idle()).count();
        assert_eq!(sounding, 2);
    }

    #[test]
    fn full_pool_steals_oldest() {
        let mut engine = sampling_engine(vec![1.0; 32], 60);
        for pitch in 40..40 + MAX_VOICES as u8 {
            engine.handle_cmd(AudioCommand::NoteOn { pitch, velocity: 1.0 });
        }
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 100, velocity: 1.0 });

        let notes: Vec<u8> = engine.voices().iter().map(PlaybackVoice::note).collect();
        assert!(notes.contains(&100));
        assert!(!notes.contains(&40));
        assert!(engine.voices().iter().all(|v| !v.is_idle()));
    }

    #[test]
    fn note_off_honors_release() {
        let mut engine = sampling_engine(vec![1.0; 10_000], 60);
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 60, velocity: 1.0 });
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 62, velocity: 1.0 });

        engine.handle_cmd(AudioCommand::NoteOff { pitch: 60, allow_release: true });
        engine.handle_cmd(AudioCommand::NoteOff { pitch: 62, allow_release: false });

        let states: Vec<_> = engine.voices()[..2].iter().map(PlaybackVoice::state).collect();
        assert_eq!(states, vec![VoiceState::Releasing, VoiceState::Idle]);
    }

    #[test]
    fn replacing_the_sample_retires_the_old_one() {
        let (mut engine, rx) = engine_with_events(8);
        let first = Arc::new(PlayableSample::new(SampleBuffer::silent(1, 4), 60));
        engine.handle_cmd(AudioCommand::InstallSample(Arc::clone(&first)));
        engine.handle_cmd(AudioCommand::NoteOn { pitch: 60, velocity: 1.0 });

        let second = Arc::new(PlayableSample::new(SampleBuffer::silent(1, 4), 62));
        engine.handle_cmd(AudioCommand::InstallSample(second));
        assert!(engine.voices().iter().all(PlaybackVoice::is_idle));

        match rx.try_recv() {
            Ok(EngineEvent::Retired(Retired::Sample(s))) => assert!(Arc::ptr_eq(&s, &first)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn full_event_channel_counts_lost_events() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut engine = Engine::new(CircularRecorder::new(1, 8));
        engine.set_event_tx(tx);
        let dropped = engine.dropped_events_handle();

        engine.handle_cmd(AudioCommand::Capture { dest: SampleBuffer::silent(1, 4) });
        assert_eq!(dropped.load(Ordering::Relaxed), 0);

        // channel is full, the retired preview buffer can't go back
        let buffer = Arc::new(SampleBuffer::silent(1, 4));
        engine.handle_cmd(AudioCommand::StartPreview(PreviewParams { buffer, start: 0, end: 4 }));
        engine.handle_cmd(AudioCommand::StopPreview);
        assert_eq!(dropped.load(Ordering::Relaxed), 1);

        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Captured(_))));
        engine.handle_cmd(AudioCommand::Capture { dest: SampleBuffer::silent(1, 4) });
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Retired(Retired::Buffer(_)))));
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }
}

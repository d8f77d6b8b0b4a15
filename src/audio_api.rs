use std::fmt;
use std::sync::Arc;

pub use crate::audio::{PlayableSample, SampleBuffer};

#[derive(Clone, Debug)]
pub struct PreviewParams {
    pub buffer: Arc<SampleBuffer>,
    pub start: usize, // first frame of the loop
    pub end: usize,   // one past the last frame
}

#[derive(Debug)]
pub enum AudioCommand {
    // The engine can't allocate (interrupts thread), so the session sends a
    // silent buffer already sized for the capture; the engine fills it from
    // the recorder and hands it back as `EngineEvent::Captured`.
    Capture { dest: SampleBuffer },

    StartPreview(PreviewParams),
    StopPreview,

    // Finished sample for note playback, built off the audio thread
    InstallSample(Arc<PlayableSample>),

    NoteOn { pitch: u8, velocity: f32 },
    NoteOff { pitch: u8, allow_release: bool },
    AllNotesOff { allow_release: bool },

    SetMonitor(bool),
}

// Buffers the engine let go of; dropped on the receiving side, never in the
// audio callback.
pub enum Retired {
    Buffer(SampleBuffer),
    Shared(Arc<SampleBuffer>),
    Sample(Arc<PlayableSample>),
}

// Shape only, the sample data would flood the log
impl fmt::Debug for Retired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, buffer) = match self {
            Retired::Buffer(b) => ("Buffer", b),
            Retired::Shared(b) => ("Shared", b.as_ref()),
            Retired::Sample(s) => ("Sample", s.buffer()),
        };
        f.debug_struct(kind)
            .field("frames", &buffer.len())
            .field("channels", &buffer.num_channels())
            .finish()
    }
}


#[derive(Debug)]
pub enum EngineEvent {
    Captured(SampleBuffer),
    Retired(Retired),
}

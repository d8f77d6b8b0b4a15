use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, warn};

use crate::audio_api::{AudioCommand, EngineEvent};
use crate::pipeline::settings::Settings;

pub mod engine;
pub mod frame;
pub mod histogram;
pub mod pitch;
pub mod recorder;
pub mod sample_buffer;
pub mod voice;

pub use frame::StereoFrame;
pub use sample_buffer::SampleBuffer;
pub use voice::PlayableSample;

use engine::Engine;
use recorder::CircularRecorder;

// frames of input handed to the engine per render call
const SCRATCH_FRAMES: usize = 8192;
// about a second of slack between the input and output callbacks
const INPUT_QUEUE_FRAMES: usize = 48000;

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    events_rx: Receiver<EngineEvent>,
    active_voices: Arc<AtomicUsize>,
    dropped_events: Arc<AtomicUsize>,
    sample_rate: u32,
    _output_stream: cpal::Stream,
    _input_stream: Option<cpal::Stream>, // None when no mic available
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) {
        if self.tx.try_send(cmd).is_err() {
            warn!("audio command queue full, command dropped");
        }
    }

    pub fn poll_event(&self) -> Option<EngineEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    // engine events lost because the control side fell behind
    pub fn dropped_events(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

// Where the engine's input frames come from on each block
enum InputFeed {
    Device(HeapCons<StereoFrame>),
    File { buffer: SampleBuffer, pos: usize },
    Silent,
}

impl InputFeed {
    // returns how many frames of `dest` hold input
    fn fill(&mut self, dest: &mut [StereoFrame]) -> usize {
        match self {
            InputFeed::Device(cons) => cons.pop_slice(dest),
            InputFeed::File { buffer, pos } => {
                if buffer.is_empty() {
                    dest.fill(StereoFrame::zero());
                    return dest.len();
                }
                for f in dest.iter_mut() {
                    *f = buffer.frame(*pos);
                    *pos = (*pos + 1) % buffer.len();
                }
                dest.len()
            }
            InputFeed::Silent => {
                dest.fill(StereoFrame::zero());
                dest.len()
            }
        }
    }
}

pub fn start_audio(settings: &Settings, project_dir: &Path) -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);
    let (events_tx, events_rx) = crossbeam_channel::bounded::<EngineEvent>(64);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;
    if channels != 2 {
        anyhow::bail!("only stereo output devices are supported (device has {channels} channels)");
    }
    info!(sample_rate, channels, "output device ready");

    let recorder = CircularRecorder::with_duration(
        settings.input_channels as usize,
        sample_rate,
        settings.max_record_seconds,
    );
    let mut engine = Engine::new(recorder);
    engine.set_event_tx(events_tx);
    engine.set_monitor_input(settings.monitor_input);
    let active_voices = engine.active_voices_handle();
    let dropped_events = engine.dropped_events_handle();

    let (feed, input_stream) = match &settings.input_wav {
        Some(path) => {
            let path = project_dir.join(path);
            let buffer = SampleBuffer::load_wav(&path, sample_rate)?;
            info!(path = %path.display(), frames = buffer.len(), "looping file as input");
            (InputFeed::File { buffer, pos: 0 }, None)
        }
        None => {
            let (prod, cons) = HeapRb::<StereoFrame>::new(INPUT_QUEUE_FRAMES).split();
            match try_build_input_stream(&host, sample_rate, prod) {
                Some(stream) => (InputFeed::Device(cons), Some(stream)),
                None => (InputFeed::Silent, None),
            }
        }
    };

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream =
                build_output_stream_f32(&device, &config.into(), rx, engine, feed, channels)?;
            output_stream.play().context("failed to play output stream")?;

            Ok(AudioHandle {
                tx,
                events_rx,
                active_voices,
                dropped_events,
                sample_rate,
                _output_stream: output_stream,
                _input_stream: input_stream,
            })
        }
        _ => anyhow::bail!("unsupported sample format (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    mut feed: InputFeed,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut scratch = vec![StereoFrame::zero(); SCRATCH_FRAMES];

    let err_fn = |err| error!("audio output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() { // commands land between blocks
                engine.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels;
            let frames: &mut [StereoFrame] = unsafe { // casting raw floats to StereoFrames
                std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut StereoFrame, n_frames)
            };
            for chunk in frames.chunks_mut(SCRATCH_FRAMES) {
                let got = feed.fill(&mut scratch[..chunk.len()]);
                engine.render_block(&scratch[..got], chunk);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn try_build_input_stream(
    host: &cpal::Host,
    target_sample_rate: cpal::SampleRate,
    mut prod: HeapProd<StereoFrame>,
) -> Option<cpal::Stream> {
    let device = match host.default_input_device() {
        Some(d) => d,
        None => {
            warn!("no default input device, recording disabled");
            return None;
        }
    };

    let supported = device.default_input_config().ok()?;
    let mut stream_config: cpal::StreamConfig = supported.into();
    stream_config.sample_rate = target_sample_rate;

    let in_channels = (stream_config.channels as usize).max(1);

    let err_fn = |err| error!("audio input stream error: {err}");

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                // a full queue drops input rather than blocking
                for c in data.chunks_exact(in_channels) {
                    let frame = StereoFrame {
                        left: c[0],
                        right: if c.len() > 1 { c[1] } else { c[0] },
                    };
                    if prod.try_push(frame).is_err() {
                        break;
                    }
                }
            },
            err_fn,
            None,
        )
        .ok()?;

    if let Err(e) = stream.play() {
        warn!("could not start input stream: {e}");
        return None;
    }

    info!(channels = in_channels, "input stream ready");
    Some(stream)
}

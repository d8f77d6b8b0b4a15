use std::sync::Arc;

use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;

pub const VOICE_GAIN: f32 = 0.15; // level per unit of velocity
pub const RELEASE_DECAY: f64 = 0.99; // per sample while releasing
pub const RELEASE_FLOOR: f64 = 0.005;
// four octaves either way of the root
pub const MIN_RATE: f64 = 1.0 / 16.0;
pub const MAX_RATE: f64 = 16.0;

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

pub fn playback_rate(pitch: u8, root_pitch: u8) -> f64 {
    let semis = pitch as f64 - root_pitch as f64;
    2.0f64.powf(semis / 12.0).clamp(MIN_RATE, MAX_RATE)
}

// finished sample plus the pitch it sounds at unshifted
#[derive(Debug)]
pub struct PlayableSample {
    buffer: SampleBuffer,
    root_pitch: u8,
}

impl PlayableSample {
    pub fn new(buffer: SampleBuffer, root_pitch: u8) -> Self {
        Self { buffer, root_pitch }
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn root_pitch(&self) -> u8 {
        self.root_pitch
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Active,
    Releasing,
}

// One triggered note reading through a shared sample at some rate.
#[derive(Clone, Debug, Default)]
pub struct PlaybackVoice {
    sample: Option<Arc<PlayableSample>>,
    note: u8,
    pos: f64,
    rate: f64,
    level: f32,
    tail_off: f64, // 0 = sustaining, >0 = releasing
}

impl PlaybackVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> VoiceState {
        match (&self.sample, self.tail_off > 0.0) {
            (None, _) => VoiceState::Idle,
            (Some(_), false) => VoiceState::Active,
            (Some(_), true) => VoiceState::Releasing,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.sample.is_none()
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    #[cfg(test)]
    pub fn rate(&self) -> f64 {
        self.rate
    }

    #[cfg(test)]
    pub fn effective_level(&self) -> f32 {
        match self.state() {
            VoiceState::Idle => 0.0,
            VoiceState::Active => self.level,
            VoiceState::Releasing => self.level * self.tail_off as f32,
        }
    }

    pub fn start(&mut self, pitch: u8, velocity: f32, sample: Arc<PlayableSample>) {
        self.rate = playback_rate(pitch, sample.root_pitch());
        self.note = pitch;
        self.pos = 0.0;
        self.level = velocity.clamp(0.0, 1.0) * VOICE_GAIN;
        self.tail_off = 0.0;
        self.sample = Some(sample);
    }

    // With `allow_release` an active voice starts fading; a voice that is
    // already fading keeps its current coefficient. Without it the voice is
    // cut immediately.
    pub fn stop(&mut self, allow_release: bool) {
        if !allow_release {
            self.clear();
        } else if self.state() == VoiceState::Active {
            self.tail_off = 1.0;
        }
    }

    pub fn clear(&mut self) {
        self.sample = None;
        self.level = 0.0;
        self.tail_off = 0.0;
    }

    // additive; idle past the last frame or once the release fades out
    pub fn render_into(&mut self, out: &mut [StereoFrame]) {
        let Some(sample) = self.sample.as_ref() else {
            return;
        };
        let data = sample.buffer();
        if data.is_empty() {
            self.clear();
            return;
        }
        let last = data.len() - 1;

        let mut finished = false;
        for frame in out.iter_mut() {
            // read sample at current position
            let i = self.pos as usize;
            if i > last {
                finished = true;
                break;
            }
            let frac = (self.pos - i as f64) as f32;
            let s0 = data.frame(i);
            let s1 = data.frame((i + 1).min(last));
            let value = StereoFrame {
                left: lerp(s0.left, s1.left, frac),
                right: lerp(s0.right, s1.right, frac),
            };

            let mut gain = self.level;
            if self.tail_off > 0.0 {
                gain *= self.tail_off as f32;
                self.tail_off *= RELEASE_DECAY;
                if self.tail_off <= RELEASE_FLOOR {
                    finished = true;
                    break;
                }
            }

            frame.add_scaled(value, gain);

            // advance position
            self.pos += self.rate;
        }

        if finished {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(data: Vec<f32>, root: u8) -> Arc<PlayableSample> {
        Arc::new(PlayableSample::new(SampleBuffer::from_channels(vec![data]), root))
    }

    fn render(voice: &mut PlaybackVoice, n: usize) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::zero(); n];
        voice.render_into(&mut out);
        out
    }

    #[test]
    fn rate_law() {
        let s = sample(vec![0.0; 4], 60);
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, s.clone());
        assert_eq!(v.rate(), 1.0);
        v.start(72, 1.0, s.clone());
        assert_eq!(v.rate(), 2.0);
        v.start(48, 1.0, s);
        assert_eq!(v.rate(), 0.5);
    }

    #[test]
    fn extreme_intervals_are_clamped() {
        assert_eq!(playback_rate(127, 0), MAX_RATE);
        assert_eq!(playback_rate(0, 127), MIN_RATE);
    }

    #[test]
    fn unit_rate_reproduces_source() {
        let src = vec![0.1, -0.2, 0.3, -0.4, 0.5];
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, sample(src.clone(), 60));

        let out = render(&mut v, 8);
        for (i, &x) in src.iter().enumerate() {
            assert_eq!(out[i].left, x * VOICE_GAIN);
            assert_eq!(out[i].right, x * VOICE_GAIN);
        }
        // ran off the end, rest of the block untouched
        assert!(out[5..].iter().all(|f| *f == StereoFrame::zero()));
        assert!(v.is_idle());
    }

    #[test]
    fn half_rate_interpolates() {
        let mut v = PlaybackVoice::new();
        v.start(48, 1.0, sample(vec![0.0, 1.0, 0.0], 60));

        let out = render(&mut v, 6);
        let expected = [0.0, 0.5, 1.0, 0.5, 0.0, 0.0];
        for (f, e) in out.iter().zip(expected) {
            assert!((f.left - e * VOICE_GAIN).abs() < 1e-6);
        }
        // 0.0, 0.5, ... 2.5 are all inside the sample; 3.0 is not
        assert!(!v.is_idle());
        render(&mut v, 1);
        assert!(v.is_idle());
    }

    #[test]
    fn last_frame_is_held_not_wrapped() {
        let mut v = PlaybackVoice::new();
        v.start(48, 1.0, sample(vec![1.0, 0.25], 60));

        let out = render(&mut v, 4);
        // position 1.5 reads index 1 against itself
        assert!((out[3].left - 0.25 * VOICE_GAIN).abs() < 1e-6);
    }

    #[test]
    fn boundary_lengths_terminate() {
        for len in [0usize, 1, 7] {
            for pitch in [48u8, 60, 79] {
                let mut v = PlaybackVoice::new();
                v.start(pitch, 1.0, sample(vec![1.0; len], 60));
                let out = render(&mut v, 64);
                assert!(v.is_idle(), "len {len} pitch {pitch} still playing");
                assert!(out.iter().all(|f| f.left.is_finite()));
            }
        }
    }

    #[test]
    fn empty_sample_renders_silence() {
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, sample(vec![], 60));
        let out = render(&mut v, 16);
        assert!(out.iter().all(|f| *f == StereoFrame::zero()));
        assert_eq!(v.state(), VoiceState::Idle);
    }

    #[test]
    fn output_is_mixed_additively() {
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, sample(vec![1.0; 4], 60));
        let mut out = vec![StereoFrame::mono(0.5); 2];
        v.render_into(&mut out);
        assert!((out[0].left - (0.5 + VOICE_GAIN)).abs() < 1e-6);
    }

    #[test]
    fn stereo_sources_keep_sides() {
        let buf = SampleBuffer::from_channels(vec![vec![1.0; 4], vec![-1.0; 4]]);
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, Arc::new(PlayableSample::new(buf, 60)));
        let out = render(&mut v, 1);
        assert_eq!(out[0].left, VOICE_GAIN);
        assert_eq!(out[0].right, -VOICE_GAIN);
    }

    #[test]
    fn velocity_scales_level() {
        let mut v = PlaybackVoice::new();
        v.start(60, 0.5, sample(vec![1.0; 4], 60));
        assert_eq!(v.effective_level(), 0.5 * VOICE_GAIN);
    }

    #[test]
    fn release_decays_monotonically_to_idle() {
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, sample(vec![1.0; 100_000], 60));
        render(&mut v, 32);
        v.stop(true);
        assert_eq!(v.state(), VoiceState::Releasing);

        let mut last = v.effective_level();
        let mut blocks = 0;
        while !v.is_idle() {
            render(&mut v, 32);
            let level = v.effective_level();
            assert!(level < last);
            assert_ne!(v.state(), VoiceState::Active);
            last = level;
            blocks += 1;
            assert!(blocks < 100, "release never finished");
        }
        // 0.99^n <= 0.005 after ~528 samples
        assert!(blocks >= 16);
    }

    #[test]
    fn second_release_does_not_restart_fade() {
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, sample(vec![1.0; 10_000], 60));
        v.stop(true);
        render(&mut v, 50);
        let level = v.effective_level();
        v.stop(true);
        assert_eq!(v.effective_level(), level);
    }

    #[test]
    fn hard_stop_goes_idle() {
        let mut v = PlaybackVoice::new();
        v.start(60, 1.0, sample(vec![1.0; 100], 60));
        v.stop(false);
        assert!(v.is_idle());
        let out = render(&mut v, 4);
        assert!(out.iter().all(|f| *f == StereoFrame::zero()));
    }
}

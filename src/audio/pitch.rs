// YIN pitch detection. A4 = 440 Hz = pitch 69, twelve steps per octave.

pub const YIN_THRESHOLD: f32 = 0.1;
pub const NUM_PITCHES: usize = 128;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

pub struct PitchEstimator {
    sample_rate: f32,
    yin: Vec<f32>, // allocated once, half the frame size
}

impl PitchEstimator {
    pub fn new(sample_rate: u32, frame_size: usize) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            yin: vec![0.0; frame_size / 2],
        }
    }

    // Hz, or 0.0 when no lag passes the threshold. Short frames use half
    // their own length as the lag range.
    pub fn estimate(&mut self, frame: &[f32]) -> f32 {
        let half = self.yin.len().min(frame.len() / 2);
        if half < 3 {
            return 0.0;
        }
        let yin = &mut self.yin[..half];

        // difference function
        for tau in 0..half {
            let mut acc = 0.0f32;
            for j in 0..half {
                let delta = frame[j] - frame[j + tau];
                acc += delta * delta;
            }
            yin[tau] = acc;
        }

        // cumulative mean normalized difference
        yin[0] = 1.0;
        let mut running = 0.0f32;
        for tau in 1..half {
            running += yin[tau];
            yin[tau] = if running > 0.0 {
                yin[tau] * tau as f32 / running
            } else {
                1.0 // silent frame, nothing to normalize against
            };
        }

        // first local minimum under the threshold, refined with a parabola
        for tau in 2..half - 1 {
            let (prev, cur, next) = (yin[tau - 1], yin[tau], yin[tau + 1]);
            if cur < YIN_THRESHOLD && cur < prev && cur < next {
                let denom = prev - 2.0 * cur + next;
                let shift = if denom.abs() > f32::EPSILON {
                    0.5 * (prev - next) / denom
                } else {
                    0.0
                };
                return self.sample_rate / (tau as f32 + shift);
            }
        }

        0.0
    }
}

/// Nearest discrete pitch, `None` for non-positive or non-finite input.
/// Not clamped to 0..128.
pub fn pitch_from_frequency(freq: f32) -> Option<i32> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    Some((12.0 * (freq / 440.0).log2() + 69.0).round() as i32)
}

#[cfg(test)]
pub fn frequency_from_pitch(pitch: u8) -> f32 {
    440.0 * 2.0f32.powf((pitch as f32 - 69.0) / 12.0)
}

// 60 = "C4"
pub fn note_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

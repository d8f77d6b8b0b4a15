use super::pitch::{pitch_from_frequency, PitchEstimator, NUM_PITCHES};
use super::sample_buffer::SampleBuffer;

pub const ANALYSIS_CHUNK: usize = 2048; // a trailing partial chunk is skipped

#[derive(Clone, Debug)]
pub struct PitchHistogram {
    counts: [u32; NUM_PITCHES],
    mode: u8,
}

impl PitchHistogram {
    pub fn new(initial_mode: u8) -> Self {
        Self {
            counts: [0; NUM_PITCHES],
            mode: initial_mode.min((NUM_PITCHES - 1) as u8),
        }
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    #[cfg(test)]
    pub fn count(&self, pitch: u8) -> u32 {
        self.counts.get(pitch as usize).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    // false for the invalid sentinel and anything outside 0..128
    pub fn record(&mut self, pitch: Option<i32>) -> bool {
        match pitch {
            Some(p) if (0..NUM_PITCHES as i32).contains(&p) => {
                self.counts[p as usize] += 1;
                true
            }
            _ => false,
        }
    }

    // ties go to the lowest pitch; no counts at all keeps the previous mode
    pub fn update_mode(&mut self) -> u8 {
        let mut best = 0;
        for (pitch, &count) in self.counts.iter().enumerate() {
            if count > best {
                best = count;
                self.mode = pitch as u8;
            }
        }
        self.mode
    }

    /// Estimates every whole chunk of `[start, end)` on the first channel.
    /// Returns the updated mode and how many chunks were counted.
    pub fn analyze(
        &mut self,
        estimator: &mut PitchEstimator,
        buffer: &SampleBuffer,
        start: usize,
        end: usize,
    ) -> (u8, usize) {
        let data = buffer.channel(0);
        let end = end.min(data.len());
        let start = start.min(end);

        let mut counted = 0;
        for chunk in data[start..end].chunks_exact(ANALYSIS_CHUNK) {
            let freq = estimator.estimate(chunk);
            if self.record(pitch_from_frequency(freq)) {
                counted += 1;
            }
        }
        (self.update_mode(), counted)
    }
}

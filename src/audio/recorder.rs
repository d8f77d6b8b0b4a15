use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;

// Holds the most recent `capacity` frames. Only `new` allocates; write and
// copy_window run in the audio callback.
pub struct CircularRecorder {
    channels: Vec<Box<[f32]>>,
    write_pos: usize,
    capacity: usize,
}

impl CircularRecorder {
    // mono keeps the left side only
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        let num_channels = num_channels.clamp(1, 2);
        let capacity = capacity.max(1);
        Self {
            channels: (0..num_channels)
                .map(|_| vec![0.0; capacity].into_boxed_slice())
                .collect(),
            write_pos: 0,
            capacity,
        }
    }

    pub fn with_duration(num_channels: usize, sample_rate: u32, seconds: f32) -> Self {
        let capacity = (sample_rate as f64 * seconds.max(0.0) as f64).round() as usize;
        Self::new(num_channels, capacity)
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    #[cfg(test)]
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    pub fn write(&mut self, frames: &[StereoFrame]) {
        let cap = self.capacity;
        for (ch, data) in self.channels.iter_mut().enumerate() {
            let mut pos = self.write_pos;
            for f in frames {
                data[pos] = if ch == 0 { f.left } else { f.right };
                pos += 1;
                if pos == cap {
                    pos = 0;
                }
            }
        }
        self.write_pos = (self.write_pos + frames.len() % cap) % cap;
    }

    /// Copies `[start, end)` of the window made of the most recent `end`
    /// frames, so the copy always ends at the latest write. A mono recording
    /// fills every channel of `dest`.
    pub fn copy_window(&self, dest: &mut SampleBuffer, start: usize, end: usize) {
        let count = end
            .saturating_sub(start)
            .min(self.capacity)
            .min(dest.len());
        if count == 0 {
            return;
        }

        let cap = self.capacity as isize;
        let read_start = (self.write_pos as isize - count as isize).rem_euclid(cap) as usize;

        for ch in 0..dest.num_channels() {
            let src = &self.channels[ch.min(self.channels.len() - 1)];
            let out = dest.channel_mut(ch);
            let first = count.min(self.capacity - read_start);
            out[..first].copy_from_slice(&src[read_start..read_start + first]);
            out[first..count].copy_from_slice(&src[..count - first]);
        }
    }
}

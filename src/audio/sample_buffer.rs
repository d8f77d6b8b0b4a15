use std::path::Path;

use anyhow::Context;

use super::frame::StereoFrame;

// Planar audio: one Vec per channel, always 1 (mono) or 2 (stereo) channels
// of equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    pub fn silent(num_channels: usize, len: usize) -> Self {
        let num_channels = num_channels.clamp(1, 2);
        Self {
            channels: vec![vec![0.0; len]; num_channels],
        }
    }

    // Extra channels past stereo are dropped, and every channel is cut to the
    // shortest one so the frame count is well defined.
    pub fn from_channels(mut channels: Vec<Vec<f32>>) -> Self {
        channels.truncate(2);
        let len = channels.iter().map(Vec::len).min().unwrap_or(0);
        for ch in channels.iter_mut() {
            ch.truncate(len);
        }
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        self.channels.get(ch).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        self.channels.get_mut(ch).map(Vec::as_mut_slice).unwrap_or(&mut [])
    }

    // Mono data is duplicated to both sides; out of range reads are silence.
    #[inline]
    pub fn frame(&self, i: usize) -> StereoFrame {
        match self.channels.as_slice() {
            [mono] => mono.get(i).copied().map_or(StereoFrame::zero(), StereoFrame::mono),
            [left, right] => match (left.get(i), right.get(i)) {
                (Some(&l), Some(&r)) => StereoFrame { left: l, right: r },
                _ => StereoFrame::zero(),
            },
            _ => StereoFrame::zero(),
        }
    }

    // Copies frames [start, end) into a new buffer. Bounds are clamped to the
    // buffer, so a collapsed or inverted range gives an empty buffer.
    pub fn slice(&self, start: usize, end: usize) -> SampleBuffer {
        let end = end.min(self.len());
        let start = start.min(end);
        Self {
            channels: self.channels.iter().map(|ch| ch[start..end].to_vec()).collect(),
        }
    }

    // Load a WAV file from disk. The file must already be at the device rate.
    pub fn load_wav(path: &Path, target_rate: u32) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let spec = reader.spec();

        if spec.sample_rate != target_rate {
            anyhow::bail!(
                "{} is {} Hz but the device runs at {} Hz",
                path.display(),
                spec.sample_rate,
                target_rate
            );
        }

        // Read the samples from the WAV file
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader // float, just pass it through
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => { // int, convert to float
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let file_channels = spec.channels.max(1) as usize;
        let kept = file_channels.min(2);
        let mut channels = vec![Vec::with_capacity(samples.len() / file_channels); kept];
        for frame in samples.chunks_exact(file_channels) {
            for (ch, out) in channels.iter_mut().enumerate() {
                out.push(frame[ch]);
            }
        }

        Ok(Self::from_channels(channels))
    }
}

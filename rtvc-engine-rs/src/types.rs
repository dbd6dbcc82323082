use crate::error::{VcError, VcResult};

/// Borrowed mono audio at a known sample rate.
#[derive(Debug, Clone, Copy)]
pub struct Waveform<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
}

impl<'a> Waveform<'a> {
    pub fn new(samples: &'a [f32], sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Per-frame feature vectors, stored frame-major: `data[t * width + d]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    data: Vec<f32>,
    width: usize,
}

impl FrameSequence {
    /// Wrap frame-major data. `data.len()` must be a multiple of `width`.
    pub fn new(data: Vec<f32>, width: usize) -> VcResult<Self> {
        if width == 0 {
            return Err(VcError::invalid("feature width must be positive"));
        }
        if data.len() % width != 0 {
            return Err(VcError::invalid(format!(
                "{} values do not divide into frames of width {}",
                data.len(),
                width
            )));
        }
        Ok(Self { data, width })
    }

    /// Build from channel-major data `[width, num_frames]` (model tensor layout).
    pub fn from_channel_major(data: &[f32], width: usize, num_frames: usize) -> VcResult<Self> {
        if data.len() != width * num_frames {
            return Err(VcError::invalid(format!(
                "expected {}x{} values, got {}",
                width,
                num_frames,
                data.len()
            )));
        }
        let mut frames = vec![0.0f32; data.len()];
        for d in 0..width {
            for t in 0..num_frames {
                frames[t * width + d] = data[d * num_frames + t];
            }
        }
        Self::new(frames, width)
    }

    /// Channel-major copy `[width, num_frames]` for feeding a model.
    pub fn to_channel_major(&self) -> Vec<f32> {
        let n = self.len();
        let mut out = vec![0.0f32; self.data.len()];
        for (t, frame) in self.iter().enumerate() {
            for (d, &v) in frame.iter().enumerate() {
                out[d * n + t] = v;
            }
        }
        out
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame(&self, t: usize) -> &[f32] {
        &self.data[t * self.width..(t + 1) * self.width]
    }

    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.width)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Keep every `stride`-th frame, starting with the first.
    pub fn subsample(&self, stride: usize) -> Self {
        let data = self
            .iter()
            .step_by(stride.max(1))
            .flatten()
            .copied()
            .collect();
        Self {
            data,
            width: self.width,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_major_layout() {
        // width 2, 3 frames: channel 0 = [1,2,3], channel 1 = [4,5,6]
        let cm = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let seq = FrameSequence::from_channel_major(&cm, 2, 3).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.frame(0), &[1.0, 4.0]);
        assert_eq!(seq.frame(2), &[3.0, 6.0]);
        assert_eq!(seq.to_channel_major(), cm.to_vec());
    }

    #[test]
    fn test_subsample_keeps_first_frame() {
        let seq = FrameSequence::new((0..10).map(|v| v as f32).collect(), 1).unwrap();
        let sub = seq.subsample(4);
        assert_eq!(sub.as_slice(), &[0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_rejects_ragged_data() {
        assert!(FrameSequence::new(vec![0.0; 5], 2).is_err());
        assert!(FrameSequence::new(vec![], 0).is_err());
    }
}

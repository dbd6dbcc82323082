//! k-nearest-neighbour style transfer over content frames.
//!
//! Distance is cosine distance `1 - <a, b> / (|a| |b|)`; a zero vector has
//! similarity 0 to everything. Ties are broken by bank index, lowest first.

use crate::error::{VcError, VcResult};
use crate::types::FrameSequence;

/// Content frames of a reference speaker, the matching target.
///
/// Immutable once built. Share it between streams behind an `Arc` and swap
/// the `Arc` between calls to change the active style.
#[derive(Debug, Clone)]
pub struct StyleBank {
    frames: FrameSequence,
    norms: Vec<f32>,
}

impl StyleBank {
    pub fn new(frames: FrameSequence) -> Self {
        let norms = frames.iter().map(l2_norm).collect();
        Self { frames, norms }
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    /// Number of frames in the bank.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Feature width of each frame.
    pub fn width(&self) -> usize {
        self.frames.width()
    }
}

/// Reusable kNN matcher; keeps its candidate scratch between calls.
#[derive(Default)]
pub struct FeatureMatcher {
    candidates: Vec<(f32, usize)>,
}

impl FeatureMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every source frame by `alpha * z + (1 - alpha) * mean(kNN(z))`.
    ///
    /// `k` is clamped to the bank size. `alpha = 1` returns the source
    /// unchanged; `alpha = 0` returns pure neighbour means.
    pub fn apply(
        &mut self,
        source: &FrameSequence,
        bank: &StyleBank,
        k: usize,
        alpha: f32,
    ) -> VcResult<FrameSequence> {
        if bank.is_empty() {
            return Err(VcError::invalid("style bank is empty"));
        }
        if k == 0 {
            return Err(VcError::invalid("k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(VcError::invalid(format!("alpha {} outside [0, 1]", alpha)));
        }
        if source.width() != bank.width() {
            return Err(VcError::invalid(format!(
                "content width {} does not match style bank width {}",
                source.width(),
                bank.width()
            )));
        }
        if alpha == 1.0 {
            return Ok(source.clone());
        }

        let k = k.min(bank.len());
        let width = source.width();
        let mut out = Vec::with_capacity(source.as_slice().len());
        let mut mean = vec![0.0f32; width];

        for frame in source.iter() {
            self.nearest(frame, bank, k);

            mean.fill(0.0);
            for &(_, idx) in &self.candidates[..k] {
                for (m, &v) in mean.iter_mut().zip(bank.frames.frame(idx)) {
                    *m += v;
                }
            }
            let kf = k as f32;

            if alpha == 0.0 {
                out.extend(mean.iter().map(|&m| m / kf));
            } else {
                out.extend(
                    frame
                        .iter()
                        .zip(&mean)
                        .map(|(&z, &m)| alpha * z + (1.0 - alpha) * (m / kf)),
                );
            }
        }

        FrameSequence::new(out, width)
    }

    /// Leave the `k` nearest bank frames, in (distance, index) order, at the
    /// front of `self.candidates`.
    fn nearest(&mut self, frame: &[f32], bank: &StyleBank, k: usize) {
        let norm = l2_norm(frame);
        self.candidates.clear();
        self.candidates.extend(
            bank.frames
                .iter()
                .zip(&bank.norms)
                .enumerate()
                .map(|(idx, (target, &target_norm))| {
                    (cosine_distance(frame, norm, target, target_norm), idx)
                }),
        );

        let order = |a: &(f32, usize), b: &(f32, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < self.candidates.len() {
            self.candidates.select_nth_unstable_by(k - 1, order);
        }
        self.candidates[..k].sort_by(order);
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|&x| x * x).sum::<f32>().sqrt()
}

fn cosine_distance(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    let denom = a_norm * b_norm;
    if denom <= f32::MIN_POSITIVE {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(&x, &y)| x * y).sum();
    1.0 - dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(rows: &[[f32; 2]]) -> FrameSequence {
        FrameSequence::new(rows.iter().flatten().copied().collect(), 2).unwrap()
    }

    fn bank() -> StyleBank {
        StyleBank::new(seq(&[[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.7, 0.7]]))
    }

    #[test]
    fn test_alpha_one_is_identity() {
        let source = seq(&[[0.3, -2.0], [5.0, 1.0e-3]]);
        let out = FeatureMatcher::new().apply(&source, &bank(), 2, 1.0).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_k1_picks_nearest_by_angle() {
        // magnitude is irrelevant under cosine distance
        let source = seq(&[[10.0, 0.5], [0.1, 3.0], [-0.2, -0.01]]);
        let out = FeatureMatcher::new().apply(&source, &bank(), 1, 0.0).unwrap();
        assert_eq!(out.frame(0), &[1.0, 0.0]);
        assert_eq!(out.frame(1), &[0.0, 1.0]);
        assert_eq!(out.frame(2), &[-1.0, 0.0]);
    }

    #[test]
    fn test_alpha_zero_is_mean_of_neighbours() {
        let source = seq(&[[0.9, 1.0]]);
        let out = FeatureMatcher::new().apply(&source, &bank(), 2, 0.0).unwrap();
        // nearest: [0.7, 0.7] then [0.0, 1.0]
        assert!((out.frame(0)[0] - 0.35).abs() < 1e-6);
        assert!((out.frame(0)[1] - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_blend() {
        let source = seq(&[[2.0, 0.0]]);
        let out = FeatureMatcher::new().apply(&source, &bank(), 1, 0.25).unwrap();
        assert!((out.frame(0)[0] - (0.25 * 2.0 + 0.75 * 1.0)).abs() < 1e-6);
        assert_eq!(out.frame(0)[1], 0.0);
    }

    #[test]
    fn test_k_clamped_to_bank_size() {
        let source = seq(&[[0.0, 0.0]]);
        let out = FeatureMatcher::new().apply(&source, &bank(), 100, 0.0).unwrap();
        // mean of all four bank frames
        assert!((out.frame(0)[0] - 0.175).abs() < 1e-6);
        assert!((out.frame(0)[1] - 0.425).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_index() {
        let tied = StyleBank::new(seq(&[[2.0, 0.0], [1.0, 0.0], [3.0, 0.0]]));
        let source = seq(&[[1.0, 0.0]]);
        let out = FeatureMatcher::new().apply(&source, &tied, 2, 0.0).unwrap();
        // all three are at distance 0; indices 0 and 1 win
        assert_eq!(out.frame(0), &[1.5, 0.0]);
    }

    #[test]
    fn test_output_stays_in_bank_hull() {
        let frames: Vec<f32> = (0..64).map(|i| ((i * 37) % 11) as f32 - 5.0).collect();
        let bank = StyleBank::new(FrameSequence::new(frames, 4).unwrap());
        let source = FrameSequence::new((0..40).map(|i| (i as f32 * 0.37).sin()).collect(), 4).unwrap();

        let out = FeatureMatcher::new().apply(&source, &bank, 3, 0.0).unwrap();
        let (lo, hi) = bank.frames().as_slice().iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
        assert_eq!(out.len(), source.len());
        assert!(out.as_slice().iter().all(|&v| v >= lo && v <= hi));
    }

    #[test]
    fn test_invalid_arguments() {
        let source = seq(&[[1.0, 0.0]]);
        let mut m = FeatureMatcher::new();
        let empty = StyleBank::new(FrameSequence::new(vec![], 2).unwrap());
        assert!(matches!(m.apply(&source, &empty, 1, 0.0), Err(VcError::InvalidInput(_))));
        assert!(matches!(m.apply(&source, &bank(), 0, 0.0), Err(VcError::InvalidInput(_))));
        assert!(matches!(m.apply(&source, &bank(), 1, 1.5), Err(VcError::InvalidInput(_))));
        assert!(matches!(m.apply(&source, &bank(), 1, f32::NAN), Err(VcError::InvalidInput(_))));
        let wide = FrameSequence::new(vec![0.0; 3], 3).unwrap();
        assert!(matches!(m.apply(&wide, &bank(), 1, 0.0), Err(VcError::InvalidInput(_))));
    }
}

//! Maps a frame index to the chunk indices it combines.
//!
//! Frames `0..chunk_count` are the plain chunks in order. Every later frame is a
//! parity frame: its degree is drawn from a robust soliton distribution over the
//! chunk count and that many distinct chunks are picked uniformly. The RNG is a
//! ChaCha8 stream seeded from the frame index alone, so a given index always
//! names the same combination and frames can be re-shown safely.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Robust soliton `c` parameter.
pub const SOLITON_C: f64 = 0.1;
/// Robust soliton failure bound `delta`.
pub const SOLITON_DELTA: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct Scheduler {
    chunk_count: usize,
    frame_count: usize,
    // -- degree_cdf[d - 1] = P(degree <= d)
    degree_cdf: Vec<f64>,
}

impl Scheduler {
    pub fn new(chunk_count: usize, redundancy_factor: f64) -> Self {
        let frame_count = ((redundancy_factor * chunk_count as f64).ceil() as usize).max(chunk_count);
        Self {
            chunk_count,
            frame_count,
            degree_cdf: robust_soliton_cdf(chunk_count),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Frames per display cycle: `ceil(redundancy_factor * chunk_count)`.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Sorted, distinct chunk indices combined into frame `frame_index`.
    pub fn indices(&self, frame_index: u64) -> Vec<usize> {
        if self.chunk_count == 0 {
            return Vec::new();
        }
        if frame_index < self.chunk_count as u64 {
            return vec![frame_index as usize];
        }

        let mut rng = ChaCha8Rng::seed_from_u64(frame_seed(frame_index));
        let degree = self.sample_degree(&mut rng);
        let mut picked = index::sample(&mut rng, self.chunk_count, degree).into_vec();
        picked.sort_unstable();
        picked
    }

    fn sample_degree(&self, rng: &mut impl Rng) -> usize {
        let u: f64 = rng.gen();
        let degree = self.degree_cdf.partition_point(|&p| p < u) + 1;
        degree.min(self.chunk_count)
    }
}

/// SplitMix64 finaliser, spreads neighbouring indices over the seed space.
fn frame_seed(frame_index: u64) -> u64 {
    let mut z = frame_index.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Cumulative robust soliton distribution over degrees `1..=k`.
fn robust_soliton_cdf(k: usize) -> Vec<f64> {
    if k == 0 {
        return Vec::new();
    }
    let kf = k as f64;
    let r = SOLITON_C * (kf / SOLITON_DELTA).ln() * kf.sqrt();
    let spike = if r > 0.0 {
        ((kf / r).floor() as usize).clamp(1, k)
    } else {
        k
    };

    let weights: Vec<f64> = (1..=k)
        .map(|d| {
            let df = d as f64;
            let rho = if d == 1 { 1.0 / kf } else { 1.0 / (df * (df - 1.0)) };
            let tau = if d < spike {
                r / (df * kf)
            } else if d == spike {
                (r * (r / SOLITON_DELTA).ln() / kf).max(0.0)
            } else {
                0.0
            };
            rho + tau
        })
        .collect();

    let total: f64 = weights.iter().sum();
    let mut acc = 0.0;
    let mut cdf: Vec<f64> = weights
        .iter()
        .map(|w| {
            acc += w / total;
            acc
        })
        .collect();
    if let Some(last) = cdf.last_mut() {
        *last = 1.0;
    }
    cdf
}

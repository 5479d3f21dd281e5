//! Similarity search between the target block and candidate windows
//!
//! The search slides a window-sized candidate across the search block and
//! scores each offset with an energy-normalized cross-correlation against
//! the target (a cosine-squared, so every score lands in [0, 1]), then
//! weights scores toward the projected center offset. The candidate
//! energies slide in O(1) per offset; the quadratic cost lives in the dot
//! products.

use super::buffer::PlanarBlock;

/// Guard against division blowups on near-silent blocks.
const EPSILON: f32 = f32::MIN_POSITIVE;

/// Reusable state for the per-hop optimal-offset search.
///
/// Owns the candidate-energy scratch (`channels * num_candidate_blocks`) so
/// the hot path allocates nothing.
#[derive(Debug)]
pub(crate) struct OptimalSearch {
    channels: usize,
    block_size: usize,
    num_candidate_blocks: usize,
    candidate_energies: Vec<f32>,
    target_energies: Vec<f32>,
}

impl OptimalSearch {
    pub fn new(channels: usize, block_size: usize, num_candidate_blocks: usize) -> Self {
        Self {
            channels,
            block_size,
            num_candidate_blocks,
            candidate_energies: vec![0.0; channels * num_candidate_blocks],
            target_energies: vec![0.0; channels],
        }
    }

    /// Find the candidate offset in `[0, num_candidate_blocks)` whose window
    /// inside `search` best matches `target`.
    ///
    /// Per channel, a candidate scores the squared correlation with the
    /// target normalized by both energies; anticorrelated candidates score
    /// zero rather than letting the square erase the sign. Channel scores
    /// are summed, then weighted by a linear preference that peaks at
    /// `k_center`, the offset the output timeline projects as the seamless
    /// continuation, so equally-similar offsets resolve to the expected one.
    /// Ties resolve to the smallest offset.
    ///
    /// If every candidate is essentially silent there is nothing to match;
    /// the projected center is returned unchanged.
    pub fn find(&mut self, target: &PlanarBlock, search: &PlanarBlock, k_center: usize) -> usize {
        debug_assert_eq!(target.num_frames(), self.block_size);
        debug_assert!(search.num_frames() >= self.num_candidate_blocks + self.block_size - 1);
        debug_assert!(k_center < self.num_candidate_blocks);

        self.compute_target_energies(target);
        self.compute_candidate_energies(search);

        if self.peak_candidate_energy() < EPSILON {
            return k_center;
        }

        let n = self.block_size;
        let mut best_offset = 0;
        let mut best_score = -1.0f32;

        for k in 0..self.num_candidate_blocks {
            let mut score = 0.0f32;
            for channel in 0..self.channels {
                let reference = target.plane(channel);
                let candidate = &search.plane(channel)[k..k + n];

                let mut dot = 0.0f32;
                for (t, c) in reference.iter().zip(candidate) {
                    dot += t * c;
                }
                if dot <= 0.0 {
                    continue;
                }

                let energy = self.candidate_energies[channel * self.num_candidate_blocks + k];
                score += dot * dot / (self.target_energies[channel] * energy + EPSILON);
            }

            let distance = k.abs_diff(k_center) as f32;
            let weighted = score * (1.0 - distance / self.num_candidate_blocks as f32);
            if weighted > best_score {
                best_score = weighted;
                best_offset = k;
            }
        }

        best_offset
    }

    /// Cache the target's per-channel energies.
    fn compute_target_energies(&mut self, target: &PlanarBlock) {
        for channel in 0..self.channels {
            let plane = target.plane(channel);
            self.target_energies[channel] = plane.iter().map(|&s| s * s).sum();
        }
    }

    /// Fill the candidate-energy scratch: per channel, the energy of every
    /// block-sized window of the search block.
    ///
    /// Only the first window is summed in full; each following energy is the
    /// previous one minus the leaving sample's square plus the entering
    /// sample's square. The running sum is kept in f64 so the slide does not
    /// drift over long search intervals.
    pub(super) fn compute_candidate_energies(&mut self, search: &PlanarBlock) {
        let n = self.block_size;
        for channel in 0..self.channels {
            let plane = search.plane(channel);
            let row = &mut self.candidate_energies
                [channel * self.num_candidate_blocks..(channel + 1) * self.num_candidate_blocks];

            let mut energy: f64 = plane[..n].iter().map(|&s| (s as f64) * (s as f64)).sum();
            row[0] = energy as f32;
            for k in 1..self.num_candidate_blocks {
                let leaving = plane[k - 1] as f64;
                let entering = plane[k - 1 + n] as f64;
                energy += entering * entering - leaving * leaving;
                row[k] = energy as f32;
            }
        }
    }

    /// Largest across-channel candidate energy of the last computed sweep.
    fn peak_candidate_energy(&self) -> f32 {
        let mut peak = 0.0f32;
        for k in 0..self.num_candidate_blocks {
            let mut total = 0.0f32;
            for channel in 0..self.channels {
                total += self.candidate_energies[channel * self.num_candidate_blocks + k];
            }
            peak = peak.max(total);
        }
        peak
    }
}

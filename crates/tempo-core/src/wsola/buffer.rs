//! Planar sample storage
//!
//! Audio moves through the stretcher as planar 32-bit float frames: one
//! contiguous plane per channel, equal lengths across planes. Two shapes are
//! used internally: [`PlanarBlock`], a fixed-size scratch block, and
//! [`PlanarBuffer`], the growable pending-input queue with head eviction and
//! out-of-range-tolerant peeks.

/// Fixed-size planar block of audio frames.
#[derive(Debug, Clone)]
pub(crate) struct PlanarBlock {
    planes: Vec<Vec<f32>>,
    num_frames: usize,
}

impl PlanarBlock {
    /// Allocate a zero-filled block of `num_frames` frames per channel.
    pub fn new(channels: usize, num_frames: usize) -> Self {
        Self { planes: vec![vec![0.0; num_frames]; channels], num_frames }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn plane(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    pub fn plane_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.planes[channel]
    }

    /// Zero every sample.
    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.fill(0.0);
        }
    }
}

/// Growable planar queue of pending input frames.
///
/// The head of the queue is input-coordinate zero for all block extraction;
/// peeks tolerate indices outside `[0, frames())` by reading zeros, so cold
/// starts and end-of-stream tails produce silence instead of garbage.
#[derive(Debug)]
pub(crate) struct PlanarBuffer {
    planes: Vec<Vec<f32>>,
}

impl PlanarBuffer {
    pub fn new(channels: usize) -> Self {
        Self { planes: vec![Vec::new(); channels] }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Number of valid frames currently queued.
    pub fn frames(&self) -> usize {
        self.planes[0].len()
    }

    /// Drop all queued frames.
    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.clear();
        }
    }

    /// Append `frames` frames from the caller's planes onto the tail.
    pub fn append(&mut self, planes: &[&[f32]], frames: usize) {
        debug_assert_eq!(planes.len(), self.planes.len());
        for (dst, src) in self.planes.iter_mut().zip(planes) {
            dst.extend_from_slice(&src[..frames]);
        }
    }

    /// Append `frames` frames of silence onto the tail.
    pub fn append_silence(&mut self, frames: usize) {
        for plane in &mut self.planes {
            let len = plane.len();
            plane.resize(len + frames, 0.0);
        }
    }

    /// Remove `count` frames from the head, shifting the remainder down.
    ///
    /// Clamped to the valid length; zero or negative-effective counts are
    /// no-ops.
    pub fn evict(&mut self, count: usize) {
        let count = count.min(self.frames());
        if count == 0 {
            return;
        }
        for plane in &mut self.planes {
            let len = plane.len();
            plane.copy_within(count.., 0);
            plane.truncate(len - count);
        }
    }

    /// Copy `dst.num_frames()` frames starting at (possibly negative)
    /// `start` into `dst`. Positions outside `[0, frames())` read as zero.
    pub fn peek_with_zero_prepend(&self, start: isize, dst: &mut PlanarBlock) {
        debug_assert_eq!(dst.channels(), self.planes.len());
        let frames = self.frames() as isize;
        let len = dst.num_frames() as isize;

        let copy_begin = start.clamp(0, frames);
        let copy_end = (start + len).clamp(0, frames);

        for (channel, src) in self.planes.iter().enumerate() {
            let plane = dst.plane_mut(channel);
            plane.fill(0.0);
            if copy_end > copy_begin {
                let offset = (copy_begin - start) as usize;
                let count = (copy_end - copy_begin) as usize;
                plane[offset..offset + count]
                    .copy_from_slice(&src[copy_begin as usize..copy_end as usize]);
            }
        }
    }

    /// Fractional-index variant of [`peek_with_zero_prepend`]: each output
    /// sample linearly interpolates between the floor and ceil source
    /// frames, both read under the zero-prepend rule.
    ///
    /// [`peek_with_zero_prepend`]: PlanarBuffer::peek_with_zero_prepend
    pub fn peek_interpolated(&self, start: f64, dst: &mut PlanarBlock) {
        debug_assert_eq!(dst.channels(), self.planes.len());
        let base = start.floor();
        let frac = (start - base) as f32;
        let base = base as isize;

        if frac == 0.0 {
            self.peek_with_zero_prepend(base, dst);
            return;
        }

        let frames = self.frames() as isize;
        for (channel, src) in self.planes.iter().enumerate() {
            let plane = dst.plane_mut(channel);
            for (i, out) in plane.iter_mut().enumerate() {
                let pos = base + i as isize;
                let s0 = if pos >= 0 && pos < frames { src[pos as usize] } else { 0.0 };
                let next = pos + 1;
                let s1 = if next >= 0 && next < frames { src[next as usize] } else { 0.0 };
                *out = s0 + (s1 - s0) * frac;
            }
        }
    }
}

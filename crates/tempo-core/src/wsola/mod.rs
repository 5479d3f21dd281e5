//! Waveform Similarity Overlap-Add (WSOLA) time-scale modification
//!
//! [`WsolaStretcher`] changes the playback speed of a planar float stream by
//! an arbitrary, time-varying rate without altering pitch. Input frames are
//! queued; each iteration extracts a search region around the virtual play
//! position, finds the candidate window most similar to the natural
//! continuation of what was already emitted, cross-fades the two, and
//! overlap-adds the result under a Hann window. One iteration always yields
//! half a window of finished output.
//!
//! The engine is synchronous and single-threaded: every call returns
//! immediately, and `&mut self` serializes access. Rates outside the
//! configured band are not an error; the engine renders silence while
//! skipping input at the requested speed so the play position stays honest.

mod buffer;
mod search;
mod window;

#[cfg(test)]
pub mod tests;

use tracing::{debug, trace};

use crate::error::{Result, StretchError};
use crate::types::{StretcherConfig, MAX_CHANNELS};

use buffer::{PlanarBlock, PlanarBuffer};
use search::OptimalSearch;

/// Streaming pitch-preserving playback-rate adjuster.
///
/// Created once per (config, channels, sample_rate) triple. Callers push
/// decoded audio with [`fill_input_buffer`](Self::fill_input_buffer) and
/// pull rate-adjusted audio with [`fill_buffer`](Self::fill_buffer); the
/// output timeline is the input timeline scaled by `1 / playback_rate`.
#[derive(Debug)]
pub struct WsolaStretcher {
    config: StretcherConfig,
    channels: usize,
    sample_rate: u32,

    // Geometry derived from the config at construction, in frames.
    ola_window_size: usize,
    ola_hop_size: usize,
    num_candidate_blocks: usize,
    search_block_center_offset: usize,
    search_block_size: usize,

    ola_window: Vec<f32>,
    transition_window: Vec<f32>,

    input_buffer: PlanarBuffer,
    target_block: PlanarBlock,
    search_block: PlanarBlock,
    optimal_block: PlanarBlock,
    wsola_output: PlanarBlock,
    search: OptimalSearch,

    /// Virtual center of the next search block, in input frames.
    output_time: f64,
    search_block_index: isize,
    target_block_index: isize,
    /// Finalized frames at the head of `wsola_output`; the half window after
    /// them holds the in-progress overlap state.
    num_complete_frames: usize,
    wsola_output_started: bool,

    /// Remaining flush-silence allowance after the stream is marked final.
    input_buffer_final_frames: usize,
    input_buffer_added_silence: usize,
    /// Fractional input frame carried between muted-band renders.
    muted_partial_frame: f64,
}

impl WsolaStretcher {
    /// Create a stretcher for a planar float stream.
    ///
    /// # Errors
    ///
    /// Returns an error when `channels` is outside `1..=MAX_CHANNELS`,
    /// `sample_rate` is zero, or the configuration fails validation
    /// (including window/search sizes that round to nothing at this sample
    /// rate).
    pub fn new(config: StretcherConfig, channels: usize, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        if channels < 1 || channels > MAX_CHANNELS {
            return Err(StretchError::InvalidChannelCount { channels, supported_max: MAX_CHANNELS });
        }
        if sample_rate == 0 {
            return Err(StretchError::InvalidSampleRate { rate: sample_rate });
        }

        let frames_per_ms = sample_rate as f64 / 1000.0;
        let mut ola_window_size = (config.ola_window_size_ms * frames_per_ms).round() as usize;
        // The overlap-add layout needs an even window; round down.
        ola_window_size -= ola_window_size & 1;
        if ola_window_size < 2 {
            return Err(StretchError::invalid_config(
                "ola_window_size_ms rounds below 2 frames at this sample rate",
            ));
        }
        let ola_hop_size = ola_window_size / 2;

        let num_candidate_blocks =
            (config.wsola_search_interval_ms * frames_per_ms).round() as usize;
        if num_candidate_blocks < 1 {
            return Err(StretchError::invalid_config(
                "wsola_search_interval_ms rounds below 1 frame at this sample rate",
            ));
        }

        let search_block_center_offset = num_candidate_blocks / 2 + (ola_window_size / 2 - 1);
        let search_block_size = num_candidate_blocks + ola_window_size - 1;

        let stretcher = Self {
            config,
            channels,
            sample_rate,
            ola_window_size,
            ola_hop_size,
            num_candidate_blocks,
            search_block_center_offset,
            search_block_size,
            ola_window: window::build_ola_window(ola_window_size),
            transition_window: window::build_transition_window(ola_window_size),
            input_buffer: PlanarBuffer::new(channels),
            target_block: PlanarBlock::new(channels, ola_window_size),
            search_block: PlanarBlock::new(channels, search_block_size),
            optimal_block: PlanarBlock::new(channels, ola_window_size),
            wsola_output: PlanarBlock::new(channels, 2 * ola_window_size),
            search: OptimalSearch::new(channels, ola_window_size, num_candidate_blocks),
            output_time: 0.0,
            search_block_index: -(search_block_center_offset as isize),
            target_block_index: 0,
            num_complete_frames: 0,
            wsola_output_started: false,
            input_buffer_final_frames: 0,
            input_buffer_added_silence: 0,
            muted_partial_frame: 0.0,
        };

        debug!(
            "created WSOLA stretcher: {} ch @ {} Hz, window {} frames, {} candidate offsets",
            channels, sample_rate, ola_window_size, num_candidate_blocks
        );
        Ok(stretcher)
    }

    /// Number of channels in the stream.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample rate of the stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The configuration this stretcher was built with.
    pub fn config(&self) -> &StretcherConfig {
        &self.config
    }

    /// Overlap-add window length in frames at this sample rate.
    pub fn ola_window_size(&self) -> usize {
        self.ola_window_size
    }

    /// Discard all queued input, in-progress synthesis, and stream position.
    ///
    /// After a reset the instance behaves exactly like a freshly created
    /// one.
    pub fn reset(&mut self) {
        self.input_buffer.clear();
        self.target_block.clear();
        self.search_block.clear();
        self.optimal_block.clear();
        self.wsola_output.clear();
        self.output_time = 0.0;
        self.search_block_index = -(self.search_block_center_offset as isize);
        self.target_block_index = 0;
        self.num_complete_frames = 0;
        self.wsola_output_started = false;
        self.input_buffer_final_frames = 0;
        self.input_buffer_added_silence = 0;
        self.muted_partial_frame = 0.0;
        debug!("stretcher reset");
    }

    /// Queue decoded input frames.
    ///
    /// Returns the number of frames accepted, which may be less than offered
    /// (zero once enough input is buffered to sustain several hops at
    /// `playback_rate`, or after [`set_final`](Self::set_final)). Callers
    /// should retry unaccepted frames after draining output.
    ///
    /// # Errors
    ///
    /// Returns an error when the plane count does not match the stream or
    /// the planes disagree on length.
    pub fn fill_input_buffer(&mut self, planes: &[&[f32]], playback_rate: f64) -> Result<usize> {
        let frames = Self::validate_planes(self.channels, planes)?;
        if frames == 0 {
            return Ok(0);
        }
        if self.is_final() {
            trace!("rejecting {frames} input frames after end of stream");
            return Ok(0);
        }

        let wanted = self.target_queue_frames(playback_rate);
        let buffered = self.input_buffer.frames();
        if buffered >= wanted {
            return Ok(0);
        }

        let accepted = frames.min(wanted - buffered);
        self.input_buffer.append(planes, accepted);
        trace!("queued {accepted} input frames ({} buffered)", self.input_buffer.frames());
        Ok(accepted)
    }

    /// Mark the stream finite.
    ///
    /// Grants the engine a bounded allowance of trailing silence so the
    /// buffered tail can be flushed through the search and overlap-add
    /// machinery. Further input is rejected. Idempotent.
    pub fn set_final(&mut self) {
        if self.is_final() {
            return;
        }
        self.input_buffer_final_frames = self.ola_window_size + self.search_block_size;
        debug!(
            "end of stream marked; up to {} frames of flush silence",
            self.input_buffer_final_frames
        );
    }

    /// Produce rate-adjusted output into the caller's planes.
    ///
    /// Fills up to `dest[ch].len()` frames per channel and returns the
    /// number produced, which is smaller when the engine starves (more input
    /// needed, or the final tail is fully drained). Outside the configured
    /// rate band the output is silence while input is consumed at
    /// `playback_rate` (the muted band described in the crate docs).
    ///
    /// # Errors
    ///
    /// Returns an error when the plane count does not match the stream or
    /// the planes disagree on length.
    pub fn fill_buffer(&mut self, dest: &mut [&mut [f32]], playback_rate: f64) -> Result<usize> {
        let dest_frames = Self::validate_planes(self.channels, dest)?;
        if dest_frames == 0 {
            return Ok(0);
        }

        if !self.config.is_rate_in_band(playback_rate) {
            return Ok(self.render_muted(dest, dest_frames, playback_rate));
        }

        let mut written = 0;
        while written < dest_frames {
            if self.num_complete_frames == 0 && !self.run_one_iteration(playback_rate) {
                break;
            }
            let take = (dest_frames - written).min(self.num_complete_frames);
            self.drain_completed(dest, written, take);
            written += take;
        }
        Ok(written)
    }

    /// Whether a call to [`fill_buffer`](Self::fill_buffer) could make
    /// progress right now: finished frames are pending, or one full hop is
    /// feasible with the buffered input (counting any remaining flush
    /// silence). In the muted band, progress means input left to skip.
    pub fn frames_available(&self, playback_rate: f64) -> bool {
        if !self.config.is_rate_in_band(playback_rate) {
            return self.input_buffer.frames() > 0;
        }
        if self.num_complete_frames > 0 {
            return true;
        }
        self.frames_needed_for_iteration()
            <= self.input_buffer.frames() + self.input_buffer_final_frames
    }

    /// Delay, in frames, between the last queued input frame and the next
    /// frame that will be emitted. Fractional because the play position is.
    pub fn latency(&self, _playback_rate: f64) -> f64 {
        self.input_buffer.frames() as f64 - (self.output_time - self.target_block_index as f64)
            + self.num_complete_frames as f64
    }

    /// Whether [`set_final`](Self::set_final) has been called.
    fn is_final(&self) -> bool {
        self.input_buffer_final_frames > 0 || self.input_buffer_added_silence > 0
    }

    /// Queue depth that triggers input backpressure: one iteration's working
    /// set plus a few hops of headroom at the requested rate.
    fn target_queue_frames(&self, playback_rate: f64) -> usize {
        let rate =
            playback_rate.clamp(self.config.min_playback_rate, self.config.max_playback_rate);
        self.search_block_size
            + self.ola_window_size
            + (4.0 * self.ola_hop_size as f64 * rate).ceil() as usize
    }

    /// Input frames one iteration needs, measured from the buffer head.
    ///
    /// Both the target and the search block must fit below the valid end;
    /// their left edges may hang below zero, where the peek reads silence.
    fn frames_needed_for_iteration(&self) -> usize {
        let anchor = self.output_time.floor() as isize;
        let search_end = anchor - self.search_block_center_offset as isize
            + self.search_block_size as isize;
        let target_start = if self.wsola_output_started {
            self.target_block_index
        } else {
            anchor - self.ola_hop_size as isize
        };
        let target_end = target_start + self.ola_window_size as isize;
        search_end.max(target_end).max(0) as usize
    }

    /// Top up the input buffer with flush silence when the stream is final
    /// and the next iteration would otherwise starve. Returns whether the
    /// iteration can go ahead.
    fn ensure_input_for_iteration(&mut self) -> bool {
        let needed = self.frames_needed_for_iteration();
        let buffered = self.input_buffer.frames();
        if needed <= buffered {
            return true;
        }
        let deficit = needed - buffered;
        if deficit > self.input_buffer_final_frames {
            return false;
        }
        self.input_buffer.append_silence(deficit);
        self.input_buffer_final_frames -= deficit;
        self.input_buffer_added_silence += deficit;
        trace!("injected {deficit} frames of flush silence");
        true
    }

    /// Run one WSOLA iteration, appending `ola_hop_size` finished frames to
    /// `wsola_output`. Returns false when starved.
    fn run_one_iteration(&mut self, playback_rate: f64) -> bool {
        if !self.ensure_input_for_iteration() {
            return false;
        }

        let n = self.ola_window_size;
        let hop = self.ola_hop_size;
        let anchor = self.output_time.floor() as isize;

        self.search_block_index = anchor - self.search_block_center_offset as isize;

        debug_assert!(self.num_complete_frames + n <= self.wsola_output.num_frames());

        self.input_buffer.peek_with_zero_prepend(self.search_block_index, &mut self.search_block);

        // The target is the natural continuation of what was already
        // emitted: the last chosen block advanced by one hop. Its first half
        // is bit-identical to the raw half window pending in `wsola_output`,
        // so a candidate matching the target overlap-adds without a seam.
        if self.wsola_output_started {
            self.input_buffer.peek_with_zero_prepend(self.target_block_index, &mut self.target_block);
        } else {
            // Nothing emitted yet: the continuation target is the input
            // window centered on the play position itself.
            self.target_block_index = anchor - hop as isize;
            self.input_buffer
                .peek_interpolated(self.output_time - hop as f64, &mut self.target_block);
        }

        // Offset inside the search block that continues the output timeline
        // with no adaptive shift.
        let projected =
            self.output_time - self.search_block_index as f64 - (hop as f64 - 1.0);
        let k_center = (projected.round() as isize)
            .clamp(0, self.num_candidate_blocks as isize - 1) as usize;

        let optimal_offset = self.search.find(&self.target_block, &self.search_block, k_center);
        let optimal_index = self.search_block_index + optimal_offset as isize;

        for channel in 0..self.channels {
            let source = &self.search_block.plane(channel)[optimal_offset..optimal_offset + n];
            self.optimal_block.plane_mut(channel).copy_from_slice(source);
        }

        // Cross-fade from the target into the optimal block so the adaptive
        // shift cannot introduce a seam: the hop starts as the continuation
        // of prior output and ends as pure search material.
        for channel in 0..self.channels {
            let optimal = self.optimal_block.plane_mut(channel);
            let target = self.target_block.plane(channel);
            for i in 0..n {
                optimal[i] = optimal[i] * self.transition_window[i]
                    + target[i] * self.transition_window[n + i];
            }
        }

        // Overlap-add. The first half finalizes against the raw half left by
        // the previous hop; the second half is stored raw and windowed when
        // the next hop lands on it.
        let base = self.num_complete_frames;
        for channel in 0..self.channels {
            let optimal = self.optimal_block.plane(channel);
            let output = self.wsola_output.plane_mut(channel);
            for i in 0..hop {
                output[base + i] = output[base + i] * self.ola_window[hop + i]
                    + optimal[i] * self.ola_window[i];
            }
            output[base + hop..base + n].copy_from_slice(&optimal[hop..n]);
        }

        // The block just copied continues one hop further in the input; that
        // continuation is what the next hop must match.
        self.target_block_index = optimal_index + hop as isize;

        self.num_complete_frames += hop;
        self.wsola_output_started = true;
        self.output_time += hop as f64 * playback_rate;
        self.search_block_index =
            self.output_time.floor() as isize - self.search_block_center_offset as isize;

        trace!(
            "hop complete: offset {} (center {}), output_time {:.2}",
            optimal_offset, k_center, self.output_time
        );

        self.remove_consumed_input();
        true
    }

    /// Evict input below the earliest index any future block can touch,
    /// shifting the whole coordinate system down with it.
    fn remove_consumed_input(&mut self) {
        let consumed = self
            .target_block_index
            .min(self.search_block_index)
            .min(self.input_buffer.frames() as isize);
        if consumed <= 0 {
            return;
        }
        self.input_buffer.evict(consumed as usize);
        self.output_time -= consumed as f64;
        self.search_block_index -= consumed;
        self.target_block_index -= consumed;
        trace!("evicted {consumed} consumed input frames");
    }

    /// Copy `take` finished frames out of `wsola_output` and shift the rest
    /// (including the in-progress half window) to the head.
    fn drain_completed(&mut self, dest: &mut [&mut [f32]], offset: usize, take: usize) {
        debug_assert!(take <= self.num_complete_frames);
        let valid = self.num_complete_frames
            + if self.wsola_output_started { self.ola_hop_size } else { 0 };
        for (channel, plane) in dest.iter_mut().enumerate() {
            let output = self.wsola_output.plane_mut(channel);
            plane[offset..offset + take].copy_from_slice(&output[..take]);
            output.copy_within(take..valid, 0);
        }
        self.num_complete_frames -= take;
    }

    /// Outside the rate band: emit silence and skip input at the requested
    /// speed so an eventual return to the band resumes at the right spot.
    /// The fractional frame of each skip carries over to the next call.
    fn render_muted(
        &mut self,
        dest: &mut [&mut [f32]],
        dest_frames: usize,
        playback_rate: f64,
    ) -> usize {
        let buffered = self.input_buffer.frames();
        let renderable = if playback_rate > 0.0 {
            ((buffered as f64) / playback_rate).floor() as usize
        } else {
            dest_frames
        };
        let rendered = dest_frames.min(renderable);

        for plane in dest.iter_mut() {
            plane[..rendered].fill(0.0);
        }

        self.muted_partial_frame += rendered as f64 * playback_rate.max(0.0);
        let skip = (self.muted_partial_frame.floor() as usize).min(buffered);
        self.muted_partial_frame -= skip as f64;
        if skip > 0 {
            self.input_buffer.evict(skip);
            trace!("muted render: {rendered} zero frames, skipped {skip} input frames");
        }
        rendered
    }

    /// Check a caller-supplied plane set against the stream shape and return
    /// its frame count.
    fn validate_planes<T: AsRef<[f32]>>(channels: usize, planes: &[T]) -> Result<usize> {
        if planes.len() != channels {
            return Err(StretchError::InvalidPlaneCount {
                expected: channels,
                actual: planes.len(),
            });
        }
        let frames = planes[0].as_ref().len();
        for plane in planes {
            if plane.as_ref().len() != frames {
                return Err(StretchError::PlaneLengthMismatch {
                    expected: frames,
                    actual: plane.as_ref().len(),
                });
            }
        }
        Ok(frames)
    }
}

//! # Tempo-Core: Streaming Time-Scale Modification
//!
//! A streaming implementation of Waveform Similarity Overlap-Add (WSOLA)
//! for planar 32-bit float audio: change playback speed by an arbitrary,
//! time-varying factor without altering pitch. Built for embedding in a
//! media pipeline that pulls decoded audio and feeds a fixed-rate sink
//! while the user scrubs playback speed.
//!
//! ## Features
//!
//! - **Pitch-preserving**: similarity-searched overlap-add, not resampling
//! - **Streaming**: push decoded frames in, pull adjusted frames out, with
//!   built-in backpressure and end-of-stream flushing
//! - **Time-varying rate**: the rate is a per-call argument, so scrubbing
//!   needs no reconfiguration
//! - **Muted band**: rates outside the configured band render silence while
//!   the play position keeps skipping input at the requested speed
//! - **Multi-channel**: 1 to 8 planar channels, any positive sample rate
//!
//! ## Usage
//!
//! ```rust
//! use tempo_core::{StretcherConfig, WsolaStretcher};
//!
//! let mut stretcher = WsolaStretcher::new(StretcherConfig::default(), 2, 44100)?;
//!
//! // Push decoded audio (planar: one slice per channel).
//! let left = vec![0.0f32; 4410];
//! let right = vec![0.0f32; 4410];
//! let accepted = stretcher.fill_input_buffer(&[&left, &right], 1.25)?;
//! assert!(accepted > 0);
//!
//! // Pull speed-adjusted audio at 1.25x; pitch is unchanged.
//! let mut out_left = vec![0.0f32; 1024];
//! let mut out_right = vec![0.0f32; 1024];
//! let produced =
//!     stretcher.fill_buffer(&mut [&mut out_left, &mut out_right], 1.25)?;
//! # let _ = produced;
//! # Ok::<(), tempo_core::StretchError>(())
//! ```
//!
//! A starved pull is not an error: `fill_buffer` returns however many frames
//! it could finish, and `frames_available` tells whether another pull can
//! make progress. Call `set_final` when the source is exhausted to flush the
//! buffered tail.
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result`] with [`StretchError`] describing
//! configuration and plane-shape problems. Rate excursions, starvation, and
//! end-of-stream are ordinary return values, not errors.

pub mod error;
pub mod types;
pub mod wsola;

pub use error::{Result, StretchError};
pub use types::{StretcherConfig, MAX_CHANNELS};
pub use wsola::WsolaStretcher;

//! Engine-level tests for the WSOLA stretcher
//!
//! These drive the full push/pull surface the way a media pipeline would:
//! feed planar input under backpressure, pull output in sink-sized chunks,
//! and flush through end of stream. Signal-level checks (delayed-copy
//! identity, pitch, amplitude) use generous but honest tolerances, since
//! WSOLA is an approximation by construction.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::WsolaStretcher;
use crate::error::StretchError;
use crate::types::StretcherConfig;

/// Route engine diagnostics through the test harness; honors `RUST_LOG`.
/// Safe to call from every test, the first registration wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn stretcher(channels: usize, sample_rate: u32) -> WsolaStretcher {
    init_tracing();
    WsolaStretcher::new(StretcherConfig::default(), channels, sample_rate).unwrap()
}

fn sine(len: usize, sample_rate: u32, frequency: f32, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * amplitude
        })
        .collect()
}

fn white_noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

/// Push all of `input` through `stretcher` at `rate`, draining in chunks,
/// then mark final and flush. Returns everything produced per channel.
fn process_to_end(
    stretcher: &mut WsolaStretcher,
    input: &[Vec<f32>],
    rate: f64,
) -> Vec<Vec<f32>> {
    let channels = input.len();
    let total = input[0].len();
    let mut fed = 0;
    let mut produced_planes: Vec<Vec<f32>> = vec![Vec::new(); channels];

    for _guard in 0..100_000 {
        if fed < total {
            let planes: Vec<&[f32]> = input.iter().map(|p| &p[fed..]).collect();
            fed += stretcher.fill_input_buffer(&planes, rate).unwrap();
            if fed == total {
                stretcher.set_final();
            }
        }

        let mut chunks: Vec<Vec<f32>> = vec![vec![0.0; 512]; channels];
        let mut refs: Vec<&mut [f32]> = chunks.iter_mut().map(|c| c.as_mut_slice()).collect();
        let produced = stretcher.fill_buffer(&mut refs, rate).unwrap();
        for (out, chunk) in produced_planes.iter_mut().zip(&chunks) {
            out.extend_from_slice(&chunk[..produced]);
        }

        if produced == 0 && fed == total {
            return produced_planes;
        }
    }
    panic!("stretcher failed to drain");
}

fn pull(stretcher: &mut WsolaStretcher, frames: usize, rate: f64) -> Vec<Vec<f32>> {
    let channels = stretcher.channels();
    let mut chunks: Vec<Vec<f32>> = vec![vec![0.0; frames]; channels];
    let mut refs: Vec<&mut [f32]> = chunks.iter_mut().map(|c| c.as_mut_slice()).collect();
    let produced = stretcher.fill_buffer(&mut refs, rate).unwrap();
    for chunk in &mut chunks {
        chunk.truncate(produced);
    }
    chunks
}

/// Normalized cross-correlation of two equal-length zero-mean segments.
fn normalized_correlation(a: &[f32], b: &[f32]) -> f64 {
    assert_eq!(a.len(), b.len());
    let mut dot = 0.0f64;
    let mut energy_a = 0.0f64;
    let mut energy_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        energy_a += x as f64 * x as f64;
        energy_b += y as f64 * y as f64;
    }
    dot / (energy_a * energy_b).sqrt().max(1e-30)
}

/// Best normalized correlation of `output` against `reference` over a lag
/// range, comparing `window` frames starting `skip` frames in.
fn best_lag_correlation(
    output: &[f32],
    reference: &[f32],
    skip: usize,
    window: usize,
    max_lag: usize,
) -> (usize, f64) {
    let mut best = (0, f64::MIN);
    for lag in 0..=max_lag {
        let out_end = skip + lag + window;
        if out_end > output.len() || skip + window > reference.len() {
            break;
        }
        let corr = normalized_correlation(
            &output[skip + lag..out_end],
            &reference[skip..skip + window],
        );
        if corr > best.1 {
            best = (lag, corr);
        }
    }
    best
}

/// Dominant period of a segment via autocorrelation over a lag range.
fn dominant_period(signal: &[f32], min_lag: usize, max_lag: usize) -> usize {
    let mut best = (min_lag, f64::MIN);
    for lag in min_lag..=max_lag {
        let corr =
            normalized_correlation(&signal[..signal.len() - lag], &signal[lag..]);
        if corr > best.1 {
            best = (lag, corr);
        }
    }
    best.0
}

#[test]
fn identity_at_unity_rate_is_a_delayed_copy() {
    let mut st = stretcher(2, 44100);
    let n = st.ola_window_size();
    let left = sine(3000, 44100, 440.0, 0.5);
    let right = sine(3000, 44100, 330.0, 0.5);

    let output = process_to_end(&mut st, &[left.clone(), right.clone()], 1.0);
    assert!(output[0].len() >= 3000 - 2 * n, "produced only {}", output[0].len());

    let (lag, corr) = best_lag_correlation(&output[0], &left, n, 1500, 1200);
    assert!(corr >= 0.99, "left correlation {corr} at lag {lag}");

    // The channels share one time base: the right channel must line up at
    // the very same lag.
    let right_corr = normalized_correlation(&output[1][n + lag..n + lag + 1500], &right[n..n + 1500]);
    assert!(right_corr >= 0.98, "right correlation {right_corr} at lag {lag}");
}

#[test]
fn length_law_at_double_speed() {
    let mut st = stretcher(1, 44100);
    let n = st.ola_window_size();
    let input = white_noise(8000, 0.8, 42);

    let output = process_to_end(&mut st, &[input], 2.0);
    let produced = output[0].len();
    let expected = 8000 / 2;

    // The flush allowance lets the tail run a bounded amount past the exact
    // length; starvation bounds it from below.
    assert!(produced >= expected - n, "produced {produced}");
    assert!(produced <= expected + 3 * n, "produced {produced}");
}

#[test]
fn pitch_is_preserved_when_speeding_up() {
    let mut st = stretcher(1, 44100);
    // 441 Hz at 44.1 kHz: exactly 100 frames per period.
    let input = sine(8000, 44100, 441.0, 0.8);

    let output = process_to_end(&mut st, &[input], 2.0);
    assert!(output[0].len() > 3000);

    let period = dominant_period(&output[0][1000..3000], 80, 120);
    assert!((98..=102).contains(&period), "period drifted to {period}");
}

#[test]
fn pitch_is_preserved_when_slowing_down() {
    let mut st = stretcher(1, 44100);
    let input = sine(4000, 44100, 441.0, 0.8);

    let output = process_to_end(&mut st, &[input], 0.5);
    assert!(output[0].len() > 4000);

    let period = dominant_period(&output[0][1000..4000], 80, 120);
    assert!((98..=102).contains(&period), "period drifted to {period}");
}

#[test]
fn constant_input_passes_through_at_half_speed() {
    init_tracing();
    let mut st = WsolaStretcher::new(StretcherConfig::default(), 1, 48000).unwrap();
    let n = st.ola_window_size();
    let input = vec![1.0f32; 4000];

    let output = process_to_end(&mut st, &[input], 0.5);
    let produced = output[0].len();
    assert!(produced >= 8000 - n as usize, "produced {produced}");

    // Steady state: the Hann overlap partition keeps a constant at unity.
    for (i, &v) in output[0][n..7000].iter().enumerate() {
        assert!((0.99..=1.01).contains(&v), "sample {} out of range: {v}", i + n);
    }
}

#[test]
fn rates_above_the_band_mute_and_skip() {
    let mut st = stretcher(1, 44100);
    let input = white_noise(1000, 0.9, 7);
    assert_eq!(st.fill_input_buffer(&[&input], 10.0).unwrap(), 1000);

    let output = pull(&mut st, 500, 10.0);
    // Only 1000 input frames were available: at 10x that is 100 output
    // frames, all silent.
    assert_eq!(output[0].len(), 100);
    assert!(output[0].iter().all(|&v| v == 0.0));

    // Everything was skipped; the engine is empty now.
    assert!(!st.frames_available(10.0));
    assert_eq!(pull(&mut st, 500, 10.0)[0].len(), 0);
}

#[test]
fn rates_below_the_band_mute_and_skip_slowly() {
    let mut st = stretcher(1, 44100);
    let input = white_noise(1000, 0.9, 8);
    assert_eq!(st.fill_input_buffer(&[&input], 0.1).unwrap(), 1000);

    let output = pull(&mut st, 400, 0.1);
    assert_eq!(output[0].len(), 400);
    assert!(output[0].iter().all(|&v| v == 0.0));

    // 400 output frames at 0.1x consumed 40 input frames.
    assert_eq!(st.input_buffer.frames(), 960);
    assert!(st.frames_available(0.1));
}

#[test]
fn reset_matches_a_fresh_instance() {
    let input = white_noise(2000, 0.7, 99);

    let mut fresh = stretcher(1, 44100);
    assert_eq!(fresh.fill_input_buffer(&[&input], 1.5).unwrap(), 2000);
    let fresh_pulls: Vec<_> = (0..4).map(|_| pull(&mut fresh, 300, 1.5)).collect();

    let mut reused = stretcher(1, 44100);
    assert_eq!(reused.fill_input_buffer(&[&input], 1.5).unwrap(), 2000);
    let _ = pull(&mut reused, 300, 1.5);
    let _ = pull(&mut reused, 300, 1.5);
    reused.reset();

    assert_eq!(reused.fill_input_buffer(&[&input], 1.5).unwrap(), 2000);
    for fresh_chunk in &fresh_pulls {
        let reused_chunk = pull(&mut reused, 300, 1.5);
        assert_eq!(&reused_chunk, fresh_chunk);
    }
}

#[test]
fn search_index_tracks_output_time() {
    let mut st = stretcher(1, 44100);
    let offset = st.search_block_center_offset as isize;

    assert_eq!(st.search_block_index, -offset);
    assert_eq!(st.ola_window_size, 2 * st.ola_hop_size);

    let input = white_noise(4000, 0.8, 3);
    st.fill_input_buffer(&[&input], 1.3).unwrap();

    for _ in 0..5 {
        let _ = pull(&mut st, 256, 1.3);
        assert_eq!(st.search_block_index, st.output_time.floor() as isize - offset);
        // The target can run at most half the search interval ahead of the
        // projected continuation.
        assert!(
            st.target_block_index
                <= st.search_block_index + offset + st.num_candidate_blocks as isize / 2 + 1
        );
        assert!(
            st.output_time
                >= st.target_block_index as f64
                    - 0.5 * (st.ola_window_size + st.num_candidate_blocks) as f64
        );
    }
}

#[test]
fn latency_stays_within_bounds() {
    let mut st = stretcher(1, 44100);
    let n = st.ola_window_size();
    assert_eq!(st.latency(1.0), 0.0);

    let input = white_noise(3000, 0.8, 12);
    st.fill_input_buffer(&[&input], 1.0).unwrap();
    assert_eq!(st.latency(1.0), 3000.0);

    for _ in 0..4 {
        let _ = pull(&mut st, 512, 1.0);
        let latency = st.latency(1.0);
        assert!(latency >= 0.0, "negative latency {latency}");
        assert!(
            latency <= (st.input_buffer.frames() + n) as f64,
            "latency {latency} exceeds buffer+window"
        );
    }
}

#[test]
fn availability_follows_input_level() {
    let mut st = stretcher(1, 44100);
    assert!(!st.frames_available(1.0));

    let input = white_noise(500, 0.5, 21);
    st.fill_input_buffer(&[&input], 1.0).unwrap();
    assert!(!st.frames_available(1.0), "not enough yet for the first search block");

    let more = white_noise(1500, 0.5, 22);
    st.fill_input_buffer(&[&more], 1.0).unwrap();
    assert!(st.frames_available(1.0));
}

#[test]
fn end_of_stream_drains_then_stops() {
    let mut st = stretcher(1, 44100);
    let input = sine(3000, 44100, 220.0, 0.5);
    st.fill_input_buffer(&[&input], 1.0).unwrap();
    st.set_final();

    // Late input is rejected once the stream is final.
    assert_eq!(st.fill_input_buffer(&[&input], 1.0).unwrap(), 0);

    let mut total = 0;
    for _ in 0..1000 {
        let produced = pull(&mut st, 512, 1.0)[0].len();
        if produced == 0 {
            break;
        }
        total += produced;
    }

    assert!(total >= 3000 - 2 * st.ola_window_size());
    assert!(!st.frames_available(1.0));
    assert_eq!(pull(&mut st, 512, 1.0)[0].len(), 0);
}

#[test]
fn input_backpressure_caps_the_queue() {
    let mut st = stretcher(1, 44100);
    let input = white_noise(20_000, 0.5, 33);

    let accepted = st.fill_input_buffer(&[&input], 1.0).unwrap();
    assert!(accepted > 0);
    assert!(accepted < 20_000, "queue accepted everything");

    // Saturated: nothing more goes in until output is drained.
    assert_eq!(st.fill_input_buffer(&[&input], 1.0).unwrap(), 0);

    let _ = pull(&mut st, 2048, 1.0);
    assert!(st.fill_input_buffer(&[&input], 1.0).unwrap() > 0);
}

#[test]
fn construction_validates_stream_shape() {
    let config = StretcherConfig::default();
    assert!(matches!(
        WsolaStretcher::new(config, 0, 44100),
        Err(StretchError::InvalidChannelCount { channels: 0, .. })
    ));
    assert!(matches!(
        WsolaStretcher::new(config, 9, 44100),
        Err(StretchError::InvalidChannelCount { channels: 9, .. })
    ));
    assert!(matches!(
        WsolaStretcher::new(config, 2, 0),
        Err(StretchError::InvalidSampleRate { rate: 0 })
    ));
    assert!(matches!(
        WsolaStretcher::new(config.with_ola_window_size_ms(-1.0), 2, 44100),
        Err(StretchError::InvalidConfig { .. })
    ));
}

#[test]
fn plane_shape_mismatches_are_rejected() {
    let mut st = stretcher(2, 44100);
    let mono = vec![0.0f32; 128];
    assert!(matches!(
        st.fill_input_buffer(&[&mono], 1.0),
        Err(StretchError::InvalidPlaneCount { expected: 2, actual: 1 })
    ));

    let short = vec![0.0f32; 64];
    assert!(matches!(
        st.fill_input_buffer(&[&mono, &short], 1.0),
        Err(StretchError::PlaneLengthMismatch { expected: 128, actual: 64 })
    ));

    let mut a = vec![0.0f32; 128];
    let mut b = vec![0.0f32; 64];
    assert!(st.fill_buffer(&mut [&mut a, &mut b], 1.0).is_err());
}

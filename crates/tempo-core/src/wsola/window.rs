//! Window tables for overlap-add synthesis
//!
//! Both tables are computed once at stretcher construction and never
//! mutated afterwards.

/// Build the symmetric Hann window used for overlap-add.
///
/// Two copies of this window, offset by half its length, sum to
/// approximately one across the overlap, so blind overlap-add preserves
/// amplitude.
pub(crate) fn build_ola_window(size: usize) -> Vec<f32> {
    debug_assert!(size >= 2);
    apodize::hanning_iter(size).map(|v| v as f32).collect()
}

/// Build the transition window used to cross-blend the target and optimal
/// blocks before overlap-add.
///
/// The table is twice the OLA window length: a linear ramp rising 0 to 1
/// over the first half and falling back over the second half, clamped into
/// [0, 1].
pub(crate) fn build_transition_window(ola_window_size: usize) -> Vec<f32> {
    debug_assert!(ola_window_size >= 2);
    let n = ola_window_size;
    let scale = 1.0 / (n - 1) as f64;
    (0..2 * n)
        .map(|i| {
            let t = if i < n { i as f64 * scale } else { 2.0 - i as f64 * scale };
            t.clamp(0.0, 1.0) as f32
        })
        .collect()
}

//! Core types for the time-scale modification library

use crate::error::{Result, StretchError};

/// Maximum number of audio channels the stretcher accepts.
pub const MAX_CHANNELS: usize = 8;

/// Configuration for a [`WsolaStretcher`](crate::wsola::WsolaStretcher)
///
/// The rate band bounds the playback rates the engine renders adaptively;
/// outside the band it falls back to muted output (see the crate docs).
/// Window and search sizes are given in milliseconds and converted to frames
/// against the stream's sample rate at construction time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretcherConfig {
    /// Lowest playback rate rendered with WSOLA (exclusive lower rates mute)
    pub min_playback_rate: f64,
    /// Highest playback rate rendered with WSOLA (exclusive higher rates mute)
    pub max_playback_rate: f64,
    /// Overlap-add window length in milliseconds
    pub ola_window_size_ms: f64,
    /// Width of the similarity search interval in milliseconds
    pub wsola_search_interval_ms: f64,
}

impl Default for StretcherConfig {
    fn default() -> Self {
        Self {
            min_playback_rate: 0.25,
            max_playback_rate: 4.0,
            ola_window_size_ms: 20.0,
            wsola_search_interval_ms: 30.0,
        }
    }
}

impl StretcherConfig {
    /// Create a configuration with the default tuning
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the adaptive playback-rate band
    pub fn with_rate_band(mut self, min: f64, max: f64) -> Self {
        self.min_playback_rate = min;
        self.max_playback_rate = max;
        self
    }

    /// Set the overlap-add window length in milliseconds
    pub fn with_ola_window_size_ms(mut self, ms: f64) -> Self {
        self.ola_window_size_ms = ms;
        self
    }

    /// Set the similarity search interval in milliseconds
    pub fn with_search_interval_ms(mut self, ms: f64) -> Self {
        self.wsola_search_interval_ms = ms;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`StretchError::InvalidConfig`] if the rate band or the
    /// window/search sizes are not positive finite values, or if the band is
    /// empty.
    pub fn validate(&self) -> Result<()> {
        if !self.min_playback_rate.is_finite() || self.min_playback_rate <= 0.0 {
            return Err(StretchError::invalid_config(
                "min_playback_rate must be positive and finite",
            ));
        }
        if !self.max_playback_rate.is_finite() || self.max_playback_rate < self.min_playback_rate {
            return Err(StretchError::invalid_config(
                "max_playback_rate must be finite and >= min_playback_rate",
            ));
        }
        if !self.ola_window_size_ms.is_finite() || self.ola_window_size_ms <= 0.0 {
            return Err(StretchError::invalid_config("ola_window_size_ms must be positive"));
        }
        if !self.wsola_search_interval_ms.is_finite() || self.wsola_search_interval_ms <= 0.0 {
            return Err(StretchError::invalid_config("wsola_search_interval_ms must be positive"));
        }
        Ok(())
    }

    /// Whether `rate` falls inside the adaptive band
    pub fn is_rate_in_band(&self, rate: f64) -> bool {
        rate >= self.min_playback_rate && rate <= self.max_playback_rate
    }
}

//! Minimum spacing between generation starts.

use std::time::{Duration, Instant};

use crate::error::{MicaError, Result};

/// Rejects a generation that would start less than `min_interval` after the
/// previous one.
#[derive(Debug, Clone)]
pub struct GenerationThrottle {
    min_interval: Duration,
    last_start: Option<Instant>,
}

impl GenerationThrottle {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: None,
        }
    }

    /// Check without recording.
    ///
    /// # Errors
    ///
    /// Returns [`MicaError::RateLimited`] with the remaining wait.
    pub fn check(&self) -> Result<()> {
        self.check_at(Instant::now())
    }

    /// Record a generation start.
    pub fn mark_started(&mut self) {
        self.last_start = Some(Instant::now());
    }

    fn check_at(&self, now: Instant) -> Result<()> {
        let Some(last) = self.last_start else {
            return Ok(());
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.min_interval {
            return Ok(());
        }
        let wait = self.min_interval - elapsed;
        Err(MicaError::RateLimited(format!(
            "Please wait {:.1}s before sending another message",
            wait.as_secs_f64()
        )))
    }
}

use crate::error::{Result, XdfError};
use std::time::{Duration, Instant};

/// Wall-clock pacer for replaying chunks at a chosen speed.
///
/// A rate of 1.0 delivers one step per `step_dur` seconds, 2.0 twice as fast.
/// Delays are computed against the start time rather than the previous step,
/// so a slow consumer catches up instead of drifting.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    step: Duration,
    start: Instant,
    step_count: u32,
}

impl PlaybackClock {
    pub fn new(rate: f64, step_dur: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(XdfError::InvalidParameter(format!(
                "playback rate must be positive, got {}",
                rate
            )));
        }
        if !step_dur.is_finite() || step_dur <= 0.0 {
            return Err(XdfError::InvalidParameter(format!(
                "step duration must be positive, got {}",
                step_dur
            )));
        }

        Ok(Self {
            step: Duration::from_secs_f64(step_dur / rate),
            start: Instant::now(),
            step_count: 0,
        })
    }

    /// Wall-clock length of one step
    pub fn step_duration(&self) -> Duration {
        self.step
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.step_count = 0;
    }

    /// How long to wait before delivering the next step. Advances the count.
    pub fn next_delay(&mut self) -> Duration {
        // Elapsed time is biased by half a step so waits land mid-step.
        let elapsed = self.start.elapsed() + self.step / 2;
        let target = self.step * self.step_count;
        self.step_count += 1;
        target.saturating_sub(elapsed)
    }

    /// Block the current thread until the next step is due
    pub fn step(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    pub async fn astep(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

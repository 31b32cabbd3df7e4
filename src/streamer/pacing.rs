use crate::format::ts::types::ticks_to_duration;
use std::time::Duration;
use tokio::time::Instant;

/// Longest sleep accepted for a single PCR step. Anything larger is treated
/// as a clock discontinuity.
pub const MAX_PACING_SLEEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// First sample after start or after a discontinuity.
    Baseline,
    Sleep(Duration),
    /// PCR went backwards or jumped too far ahead. Bookkeeping was reset.
    Discontinuity,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    pcr: u64,
    time: Instant,
}

/// Converts PCR progress into wall-clock sleeps.
///
/// Each sample is compared with the previous one: the sleep is the PCR delta
/// minus the wall time already elapsed. The reference time advances by the
/// sleep granted so drift does not accumulate.
#[derive(Debug)]
pub struct PcrPacer {
    max_sleep: Duration,
    first: Option<Sample>,
    last: Option<Sample>,
}

impl Default for PcrPacer {
    fn default() -> Self {
        Self::new(MAX_PACING_SLEEP)
    }
}

impl PcrPacer {
    pub fn new(max_sleep: Duration) -> Self {
        Self {
            max_sleep,
            first: None,
            last: None,
        }
    }

    pub fn sample(&mut self, pcr: u64, now: Instant) -> Pacing {
        let Some(last) = self.last else {
            let sample = Sample { pcr, time: now };
            self.first = Some(sample);
            self.last = Some(sample);
            return Pacing::Baseline;
        };

        if pcr <= last.pcr {
            self.reset();
            return Pacing::Discontinuity;
        }

        let stream_elapsed = ticks_to_duration(pcr - last.pcr);
        let wall_elapsed = now.saturating_duration_since(last.time);
        let sleep = stream_elapsed.saturating_sub(wall_elapsed);
        if sleep > self.max_sleep {
            self.reset();
            return Pacing::Discontinuity;
        }

        self.last = Some(Sample {
            pcr,
            time: now + sleep,
        });
        Pacing::Sleep(sleep)
    }

    /// Stream time covered since the baseline sample.
    pub fn stream_elapsed(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => ticks_to_duration(last.pcr - first.pcr),
            _ => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.first = None;
        self.last = None;
    }
}

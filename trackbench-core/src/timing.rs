//! Timing Recorder
//!
//! Wall-clock measurement of the timed region. A [`Stopwatch`] is acquired
//! right before the workload and records into its [`TimingLog`] on every exit
//! path, including early returns and unwinding.
//!
//! Start timestamps come from the system clock; the end timestamp is derived
//! from the monotonic elapsed time so that `ended_at - started_at == duration`
//! holds exactly.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::{Duration, Instant};

/// One measurement of the timed region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingRecord {
    /// What was measured
    pub label: String,
    /// Wall-clock time the workload started
    pub started_at: DateTime<Utc>,
    /// `started_at + duration`
    pub ended_at: DateTime<Utc>,
    /// Monotonic elapsed time
    pub duration: Duration,
}

impl TimingRecord {
    fn from_span(label: String, started_at: DateTime<Utc>, duration: Duration) -> Self {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        let ended_at = started_at
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            label,
            started_at,
            ended_at,
            duration,
        }
    }

    /// Duration in fractional seconds, as persisted in result rows
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Ordered measurements taken by this process
#[derive(Debug, Default)]
pub struct TimingLog {
    records: Vec<TimingRecord>,
}

impl TimingLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Start measuring; the record is appended when the stopwatch stops or drops
    pub fn start(&mut self, label: impl Into<String>) -> Stopwatch<'_> {
        Stopwatch {
            log: self,
            label: Some(label.into()),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Time a fallible workload.
    ///
    /// The record is captured before the result is handed back, so a failing
    /// workload still contributes its time-to-failure.
    pub fn measure<T, E>(
        &mut self,
        label: impl Into<String>,
        workload: impl FnOnce() -> Result<T, E>,
    ) -> (TimingRecord, Result<T, E>) {
        let stopwatch = self.start(label);
        let result = workload();
        (stopwatch.stop(), result)
    }

    /// All records, oldest first
    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    /// Most recent record
    pub fn last(&self) -> Option<&TimingRecord> {
        self.records.last()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been measured yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take every record out of the log
    pub fn drain(&mut self) -> Vec<TimingRecord> {
        std::mem::take(&mut self.records)
    }
}

/// Scoped measurement guard borrowed from a [`TimingLog`]
pub struct Stopwatch<'a> {
    log: &'a mut TimingLog,
    label: Option<String>,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl Stopwatch<'_> {
    /// Stop, record, and return a copy of the record
    pub fn stop(mut self) -> TimingRecord {
        self.record()
    }

    fn record(&mut self) -> TimingRecord {
        let duration = self.start.elapsed();
        let label = self.label.take().unwrap_or_default();
        let record = TimingRecord::from_span(label, self.started_at, duration);
        self.log.records.push(record.clone());
        record
    }
}

impl Drop for Stopwatch<'_> {
    fn drop(&mut self) {
        if self.label.is_some() {
            self.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_records_success() {
        let mut log = TimingLog::new();
        let (record, result) = log.measure("sleep", || {
            std::thread::sleep(Duration::from_millis(5));
            Ok::<_, ()>(42)
        });

        assert_eq!(result, Ok(42));
        assert_eq!(log.len(), 1);
        assert_eq!(log.last(), Some(&record));
        assert!(record.duration >= Duration::from_millis(5));
        assert_eq!(record.label, "sleep");
    }

    #[test]
    fn test_measure_records_failure_before_propagating() {
        let mut log = TimingLog::new();
        let (record, result) = log.measure("fails", || {
            std::thread::sleep(Duration::from_millis(2));
            Err::<(), _>("backend down")
        });

        assert_eq!(result, Err("backend down"));
        assert_eq!(log.len(), 1);
        assert!(record.duration >= Duration::from_millis(2));
    }

    #[test]
    fn test_record_end_matches_duration() {
        let mut log = TimingLog::new();
        let record = log.start("span").stop();

        assert!(record.ended_at >= record.started_at);
        let span = (record.ended_at - record.started_at).to_std().unwrap();
        assert_eq!(span, record.duration);
    }

    #[test]
    fn test_dropped_stopwatch_still_records() {
        let mut log = TimingLog::new();
        {
            let _stopwatch = log.start("early-return");
        }
        assert_eq!(log.len(), 1);
        assert_eq!(log.records()[0].label, "early-return");
    }

    #[test]
    fn test_unwinding_records() {
        let mut log = TimingLog::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _stopwatch = log.start("panics");
            panic!("adapter blew up");
        }));

        assert!(outcome.is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_one_record_per_invocation_and_drain() {
        let mut log = TimingLog::new();
        for i in 0..3 {
            let _ = log.measure(format!("run-{}", i), || Ok::<_, ()>(()));
        }
        assert_eq!(log.len(), 3);

        let drained = log.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[2].label, "run-2");
        assert!(log.is_empty());
    }
}

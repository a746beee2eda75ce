//! Run-time execution protocol types.
//!
//! Construction errors are structural faults; run-stage outcomes are
//! carried as [`StageCompletion`] values so the external session executor
//! can decide retry/skip/abort policy without unwinding the use-case tree.

use crate::error::{TychoError, TychoResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Execution mode of a use case. `Undef` splits exactly once into
/// `DryRun` or `Run`; both end in `Dead`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    Undef,
    DryRun,
    Run,
    Dead,
}

/// Run-stage ladder driven by the five execution operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunStage {
    #[default]
    Ready,
    Preparing,
    Prepared,
    UpRunning,
    UpDone,
    WorkRunning,
    WorkDone,
    DownRunning,
    DownDone,
    Terminating,
    Terminated,
}

/// How a run stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunTermination {
    /// The stage ran to its natural end
    Normal,
    /// The stage was cut short by a cooperative stop request
    Anticipated,
    /// The stage hook reported an error
    Error,
}

/// Outcome record returned by each execution operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCompletion {
    pub timestamp: DateTime<Utc>,
    pub termination: RunTermination,
    pub stage: RunStage,
    pub error_message: Option<String>,
}

impl StageCompletion {
    pub fn normal(stage: RunStage) -> Self {
        StageCompletion {
            timestamp: Utc::now(),
            termination: RunTermination::Normal,
            stage,
            error_message: None,
        }
    }

    pub fn anticipated(stage: RunStage) -> Self {
        StageCompletion {
            timestamp: Utc::now(),
            termination: RunTermination::Anticipated,
            stage,
            error_message: None,
        }
    }

    pub fn error(stage: RunStage, message: impl Into<String>) -> Self {
        StageCompletion {
            timestamp: Utc::now(),
            termination: RunTermination::Error,
            stage,
            error_message: Some(message.into()),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.termination == RunTermination::Normal
    }

    pub fn is_error(&self) -> bool {
        self.termination == RunTermination::Error
    }
}

/// Verdict of one work-loop iteration hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkLoopStatus {
    Continue,
    Stop,
}

/// Cooperative run control shared between a running use case and the
/// external session executor.
#[derive(Debug, Default)]
pub struct RunControl {
    stop_requested: AtomicBool,
    work_loop_count: AtomicU64,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the work loop to stop at its next iteration boundary.
    pub fn stop_request(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn work_loop_count(&self) -> u64 {
        self.work_loop_count.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_work_loop(&self) {
        self.work_loop_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Optional per-stage duration bookkeeping used by dry-run time
/// constraint computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageDurations {
    up_max: Option<Duration>,
    work_min: Option<Duration>,
    work_max: Option<Duration>,
    down_max: Option<Duration>,
}

impl StageDurations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_up_max(&mut self, d: Duration) -> TychoResult<()> {
        Self::check_positive("up max duration", d)?;
        self.up_max = Some(d);
        Ok(())
    }

    pub fn set_work_min(&mut self, d: Duration) -> TychoResult<()> {
        Self::check_positive("work min duration", d)?;
        if let Some(max) = self.work_max {
            if d > max {
                return Err(TychoError::invalid_input(
                    "Work min duration exceeds work max duration",
                ));
            }
        }
        self.work_min = Some(d);
        Ok(())
    }

    pub fn set_work_max(&mut self, d: Duration) -> TychoResult<()> {
        Self::check_positive("work max duration", d)?;
        if let Some(min) = self.work_min {
            if d < min {
                return Err(TychoError::invalid_input(
                    "Work max duration is below work min duration",
                ));
            }
        }
        self.work_max = Some(d);
        Ok(())
    }

    pub fn set_down_max(&mut self, d: Duration) -> TychoResult<()> {
        Self::check_positive("down max duration", d)?;
        self.down_max = Some(d);
        Ok(())
    }

    pub fn up_max(&self) -> Option<Duration> {
        self.up_max
    }

    pub fn work_min(&self) -> Option<Duration> {
        self.work_min
    }

    pub fn work_max(&self) -> Option<Duration> {
        self.work_max
    }

    pub fn down_max(&self) -> Option<Duration> {
        self.down_max
    }

    /// Lower bound on the total run time (work only; up/down have no
    /// declared minimum).
    pub fn total_min_duration(&self) -> Duration {
        self.work_min.unwrap_or_else(Duration::zero)
    }

    /// Upper bound on the total run time; `None` when any bounded stage
    /// lacks a declared maximum.
    pub fn total_max_duration(&self) -> Option<Duration> {
        match (self.up_max, self.work_max, self.down_max) {
            (Some(up), Some(work), Some(down)) => Some(up + work + down),
            _ => None,
        }
    }

    fn check_positive(label: &str, d: Duration) -> TychoResult<()> {
        if d <= Duration::zero() {
            return Err(TychoError::invalid_input(format!(
                "Invalid non-positive {}",
                label
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_control_flags() {
        let ctrl = RunControl::new();
        assert!(!ctrl.stop_requested());
        assert_eq!(ctrl.work_loop_count(), 0);
        ctrl.increment_work_loop();
        ctrl.increment_work_loop();
        ctrl.stop_request();
        assert!(ctrl.stop_requested());
        assert_eq!(ctrl.work_loop_count(), 2);
    }

    #[test]
    fn test_stage_durations_ranges() {
        let mut d = StageDurations::new();
        assert!(d.set_up_max(Duration::seconds(-1)).is_err());
        d.set_work_min(Duration::seconds(10)).unwrap();
        assert!(d.set_work_max(Duration::seconds(5)).is_err());
        d.set_work_max(Duration::seconds(30)).unwrap();
        assert!(d.set_work_min(Duration::seconds(40)).is_err());

        assert_eq!(d.total_min_duration(), Duration::seconds(10));
        assert_eq!(d.total_max_duration(), None);
        d.set_up_max(Duration::seconds(2)).unwrap();
        d.set_down_max(Duration::seconds(3)).unwrap();
        assert_eq!(d.total_max_duration(), Some(Duration::seconds(35)));
    }

    #[test]
    fn test_stage_order() {
        assert!(RunStage::Ready < RunStage::Preparing);
        assert!(RunStage::WorkRunning < RunStage::Terminated);
    }
}

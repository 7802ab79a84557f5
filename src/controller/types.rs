use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config;
use crate::gateway::{GatewayError, PostRunAction, TimeslotDuration};
use crate::trend_data::UnmappedMeasurement;

/// Result type for controller operations
pub type PcResult<T> = Result<T, PcError>;

/// Error types for controller operations
#[derive(Debug, thiserror::Error)]
pub enum PcError {
    /// A user-supplied id is not a non-negative integer
    #[error("invalid {field} '{value}': expected a non-negative integer")]
    InvalidId { field: &'static str, value: String },

    /// Automatic instance creation needs at least one test set
    #[error("there is no test set available in the project; create one before running with an automatic test instance")]
    NoTestSet,

    /// The test has no trend report to publish into
    #[error("no trend report is associated with test {test_id}; turn automatic trending on for the test or pass an explicit trend report id")]
    MissingTrendReport { test_id: u32 },

    /// Trend report publication never settled
    #[error("publishing run {run_id} on trend report {trend_report_id} did not settle after {polls} polls, aborting")]
    PublishTimeout {
        run_id: u32,
        trend_report_id: String,
        polls: u32,
    },

    #[error("failed to download trend report {trend_report_id}: {reason}")]
    TrendReportDownload {
        trend_report_id: String,
        reason: String,
    },

    #[error(transparent)]
    UnmappedMeasurement(#[from] UnmappedMeasurement),

    /// The report archive could not be unpacked
    #[error("report archive error: {0}")]
    Archive(String),

    /// The reserved timeslot does not fit in a minute count
    #[error("timeslot of {0} is too long")]
    InvalidTimeslot(TimeslotDuration),

    /// A wait was cancelled by the host environment
    #[error("interrupted while waiting")]
    Interrupted,

    #[error("login to {0} failed")]
    LoginFailed(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for PcError {
    fn from(err: zip::result::ZipError) -> Self {
        PcError::Archive(err.to_string())
    }
}

/// Parse a user-supplied numeric id
pub(crate) fn parse_id(field: &'static str, value: &str) -> PcResult<u32> {
    value.trim().parse().map_err(|_| PcError::InvalidId {
        field,
        value: value.to_string(),
    })
}

/// Longest accepted pause between start attempts
pub const MAX_RETRY_DELAY_SECS: u64 = 24 * 60 * 60;

/// How a failed run start is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub enabled: bool,
    /// Pause before each retry
    pub delay: Duration,
    /// Retries after the first attempt
    pub max_occurrences: u32,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            delay: Duration::from_secs(config::DEFAULT_RETRY_DELAY),
            max_occurrences: config::DEFAULT_RETRY_OCCURRENCES,
        }
    }

    pub fn new(delay_secs: u64, max_occurrences: u32) -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs(delay_secs),
            max_occurrences,
        }
    }

    /// Build a policy from raw user input.
    ///
    /// Each value must be a positive integer no larger than its bound (one day
    /// of delay, `u32::MAX` occurrences); anything else is replaced by the
    /// default (5 seconds, 3 occurrences) and the substitution is logged.
    pub fn resolve(enabled: bool, delay: &str, occurrences: &str) -> Self {
        let delay = positive_or_default(
            "retryDelay",
            delay,
            config::DEFAULT_RETRY_DELAY,
            MAX_RETRY_DELAY_SECS,
        );
        let occurrences = positive_or_default(
            "retryOccurrences",
            occurrences,
            config::DEFAULT_RETRY_OCCURRENCES,
            u32::MAX,
        );
        Self {
            enabled,
            delay: Duration::from_secs(delay),
            max_occurrences: occurrences,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

fn positive_or_default<T>(attribute: &str, supplied: &str, default: T, max: T) -> T
where
    T: Copy + fmt::Display + TryFrom<i64>,
    i64: TryFrom<T>,
{
    let max_value = i64::try_from(max).unwrap_or(i64::MAX);
    match supplied.trim().parse::<i64>() {
        Ok(value) if value > max_value => {
            warn!(
                "attribute {} greater than {}, using default value {}",
                attribute, max, default
            );
            default
        }
        Ok(value) if value > 0 => T::try_from(value).unwrap_or(default),
        Ok(_) => {
            warn!(
                "attribute {} not greater than zero, using default value {}",
                attribute, default
            );
            default
        }
        Err(_) => {
            warn!(
                "attribute {} not a number, using default value {}",
                attribute, default
            );
            default
        }
    }
}

/// Which test instance a run targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestInstanceSelection {
    /// Reuse the last listed instance of the test, or create one
    Auto,
    /// A user-supplied id, parsed when the instance is resolved
    Explicit(String),
}

impl FromStr for TestInstanceSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(TestInstanceSelection::Auto)
        } else {
            Ok(TestInstanceSelection::Explicit(s.trim().to_string()))
        }
    }
}

/// Which trend report, if any, a completed run is published to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrendReportSelection {
    #[default]
    None,
    /// The trend report configured on the test itself
    Associated,
    Explicit(String),
}

impl FromStr for TrendReportSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "" | "none" => TrendReportSelection::None,
            "associated" => TrendReportSelection::Associated,
            _ => TrendReportSelection::Explicit(trimmed.to_string()),
        })
    }
}

/// Everything needed to drive one run end to end
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub test_id: u32,
    pub instance: TestInstanceSelection,
    pub timeslot: TimeslotDuration,
    pub post_run_action: PostRunAction,
    pub vuds_mode: bool,
    pub retry: RetryPolicy,
    pub trend_report: TrendReportSelection,
    pub poll_interval: Duration,
    /// Reports are unpacked under `<report_dir>/<run id>`
    pub report_dir: PathBuf,
    pub download_trend_pdf: bool,
}

impl RunPlan {
    pub fn new(test_id: u32, instance: TestInstanceSelection) -> Self {
        Self {
            test_id,
            instance,
            timeslot: TimeslotDuration::default(),
            post_run_action: PostRunAction::CollateAndAnalyze,
            vuds_mode: false,
            retry: RetryPolicy::disabled(),
            trend_report: TrendReportSelection::None,
            poll_interval: Duration::from_millis(config::DEFAULT_POLL_INTERVAL_MS),
            report_dir: PathBuf::from(config::DEFAULT_REPORT_DIR),
            download_trend_pdf: false,
        }
    }
}

/// A wait was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sleep interrupted")]
pub struct Interrupted;

/// Every pause the controller takes goes through a sleeper
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Sleeps on the current thread, optionally watching a cancel flag
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    cancel: Option<Arc<AtomicBool>>,
}

impl ThreadSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort any sleep once `flag` is set
    pub fn with_cancel_flag(flag: Arc<AtomicBool>) -> Self {
        Self { cancel: Some(flag) }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        // None: the deadline is beyond what Instant can hold, so only a cancel ends it
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.cancelled() {
                return Err(Interrupted);
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    SLEEP_SLICE.min(deadline - now)
                }
                None => SLEEP_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

/// Records requested pauses without blocking
///
/// Optionally reports an interruption once a number of sleeps have been taken.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    interrupt_after: Option<usize>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt every sleep after the first `count`
    pub fn interrupt_after(count: usize) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            interrupt_after: Some(count),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count_of(&self, duration: Duration) -> usize {
        self.sleeps().iter().filter(|d| **d == duration).count()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let mut sleeps = self
            .sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(limit) = self.interrupt_after {
            if sleeps.len() >= limit {
                return Err(Interrupted);
            }
        }
        sleeps.push(duration);
        Ok(())
    }
}

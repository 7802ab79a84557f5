// Core entity types exchanged with the performance-testing service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for gateway operations
///
/// Every variant carries owned text so scripted gateways can replay the same
/// failure more than once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced an HTTP response (DNS, connect, TLS, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status
    #[error("server returned {status}: {message}")]
    Protocol { status: u16, message: String },

    /// The response body could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The request could not be encoded for the service
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Local I/O failure while streaming a payload
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::Protocol {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// Remote progression of a run.
///
/// States form a closed set with an explicit rank. "Has the run progressed at
/// least as far as X" is always `state.rank() >= x.rank()`. Failure states
/// rank above `Finished` so that any of them ends a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunState {
    #[default]
    Undefined,
    Initializing,
    Running,
    BeforeCollatingResults,
    CollatingResults,
    BeforeCreatingAnalysisData,
    CreatingAnalysisData,
    Finished,
    FailedCollatingResults,
    FailedCreatingAnalysisData,
    RunFailure,
    Canceled,
}

impl RunState {
    /// Position in the progression order
    pub fn rank(self) -> u8 {
        match self {
            RunState::Undefined => 0,
            RunState::Initializing => 1,
            RunState::Running => 2,
            RunState::BeforeCollatingResults => 3,
            RunState::CollatingResults => 4,
            RunState::BeforeCreatingAnalysisData => 5,
            RunState::CreatingAnalysisData => 6,
            RunState::Finished => 7,
            RunState::FailedCollatingResults => 8,
            RunState::FailedCreatingAnalysisData => 9,
            RunState::RunFailure => 10,
            RunState::Canceled => 11,
        }
    }

    /// Whether the run has progressed at least as far as `other`
    pub fn reached(self, other: RunState) -> bool {
        self.rank() >= other.rank()
    }

    /// States in which the service parks a run before post-processing
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            RunState::BeforeCollatingResults | RunState::BeforeCreatingAnalysisData
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RunState::FailedCollatingResults
                | RunState::FailedCreatingAnalysisData
                | RunState::RunFailure
                | RunState::Canceled
        )
    }

    /// Label used by the service
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Undefined => "N/A",
            RunState::Initializing => "Initializing",
            RunState::Running => "Running",
            RunState::BeforeCollatingResults => "Before Collating Results",
            RunState::CollatingResults => "Collating Results",
            RunState::BeforeCreatingAnalysisData => "Before Creating Analysis Data",
            RunState::CreatingAnalysisData => "Creating Analysis Data",
            RunState::Finished => "Finished",
            RunState::FailedCollatingResults => "Failed Collating Results",
            RunState::FailedCreatingAnalysisData => "Failed Creating Analysis Data",
            RunState::RunFailure => "Run Failure",
            RunState::Canceled => "Canceled",
        }
    }

    /// Parse a service label; anything unrecognised is `Undefined`
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "initializing" => RunState::Initializing,
            "running" => RunState::Running,
            "beforecollatingresults" => RunState::BeforeCollatingResults,
            "collatingresults" => RunState::CollatingResults,
            "beforecreatinganalysisdata" => RunState::BeforeCreatingAnalysisData,
            "creatinganalysisdata" => RunState::CreatingAnalysisData,
            "finished" => RunState::Finished,
            "failedcollatingresults" => RunState::FailedCollatingResults,
            "failedcreatinganalysisdata" => RunState::FailedCreatingAnalysisData,
            "runfailure" => RunState::RunFailure,
            "canceled" | "cancelled" => RunState::Canceled,
            _ => RunState::Undefined,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RunState {
    fn from(label: String) -> Self {
        RunState::from_label(&label)
    }
}

impl From<RunState> for String {
    fn from(state: RunState) -> Self {
        state.as_str().to_string()
    }
}

/// Depth of post-processing the service performs once the load phase ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostRunAction {
    #[serde(rename = "Do Not Collate")]
    DoNothing,
    #[serde(rename = "Collate Results")]
    Collate,
    #[serde(rename = "Collate And Analyze")]
    CollateAndAnalyze,
}

impl PostRunAction {
    /// The state at which a run is considered complete for this action
    pub fn target_state(self) -> RunState {
        match self {
            PostRunAction::DoNothing => RunState::BeforeCollatingResults,
            PostRunAction::Collate => RunState::BeforeCreatingAnalysisData,
            PostRunAction::CollateAndAnalyze => RunState::Finished,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PostRunAction::DoNothing => "Do Not Collate",
            PostRunAction::Collate => "Collate Results",
            PostRunAction::CollateAndAnalyze => "Collate And Analyze",
        }
    }
}

impl fmt::Display for PostRunAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostRunAction {
    type Err = String;

    /// Accepts the service label or a short form (`do-nothing`, `collate`, `collate-and-analyze`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "donothing" | "donotcollate" => Ok(PostRunAction::DoNothing),
            "collate" | "collateresults" => Ok(PostRunAction::Collate),
            "collateandanalyze" => Ok(PostRunAction::CollateAndAnalyze),
            _ => Err(format!(
                "unknown post-run action '{}': use do-nothing, collate or collate-and-analyze",
                s
            )),
        }
    }
}

/// Reserved execution window for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeslotDuration {
    pub hours: u32,
    pub minutes: u32,
}

impl TimeslotDuration {
    pub fn new(hours: u32, minutes: u32) -> Self {
        Self { hours, minutes }
    }

    /// Length in minutes, or `None` when it does not fit in a `u32`
    pub fn total_minutes(&self) -> Option<u32> {
        self.hours.checked_mul(60)?.checked_add(self.minutes)
    }
}

impl Default for TimeslotDuration {
    fn default() -> Self {
        Self::new(0, 30)
    }
}

impl fmt::Display for TimeslotDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02} (h:mm)", self.hours, self.minutes)
    }
}

/// Parameters of a run launch. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub test_id: u32,
    pub test_instance_id: u32,
    pub timeslot_duration: TimeslotDuration,
    pub post_run_action: PostRunAction,
    pub vuds_mode: bool,
}

/// Wire body for a start-run call
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StartRunBody {
    #[serde(rename = "TestID")]
    pub test_id: u32,
    #[serde(rename = "TestInstanceID")]
    pub test_instance_id: u32,
    #[serde(rename = "TimeslotDuration")]
    pub timeslot_minutes: u32,
    #[serde(rename = "PostRunAction")]
    pub post_run_action: PostRunAction,
    #[serde(rename = "VudsMode")]
    pub vuds_mode: bool,
}

impl TryFrom<&RunRequest> for StartRunBody {
    type Error = GatewayError;

    fn try_from(request: &RunRequest) -> Result<Self, Self::Error> {
        let timeslot_minutes = request.timeslot_duration.total_minutes().ok_or_else(|| {
            GatewayError::InvalidRequest(format!(
                "timeslot of {} is too long",
                request.timeslot_duration
            ))
        })?;
        Ok(Self {
            test_id: request.test_id,
            test_instance_id: request.test_instance_id,
            timeslot_minutes,
            post_run_action: request.post_run_action,
            vuds_mode: request.vuds_mode,
        })
    }
}

/// Service view of a run, returned on start and refreshed by each poll
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "TestID", default)]
    pub test_id: u32,
    #[serde(rename = "TestInstanceID", default)]
    pub test_instance_id: u32,
    #[serde(rename = "TimeslotID", default)]
    pub timeslot_id: u32,
    #[serde(rename = "RunState", default)]
    pub run_state: RunState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInstance {
    #[serde(rename = "TestInstanceID")]
    pub instance_id: u32,
    #[serde(rename = "TestID", default)]
    pub test_id: u32,
    #[serde(rename = "TestSetID", default)]
    pub test_set_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSet {
    #[serde(rename = "TestSetID")]
    pub test_set_id: u32,
    #[serde(rename = "TestSetName", default)]
    pub name: String,
}

/// Test definition metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestData {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name", default)]
    pub name: String,
    /// Associated trend report, `-1` when none
    #[serde(rename = "TrendReportId", default = "no_trend_report")]
    pub trend_report_id: i64,
}

fn no_trend_report() -> i64 {
    -1
}

impl TestData {
    pub fn associated_trend_report(&self) -> Option<u32> {
        u32::try_from(self.trend_report_id).ok()
    }
}

/// A result artifact attached to a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub result_type: String,
    #[serde(rename = "RunID", default)]
    pub run_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogRecord {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Type", default)]
    pub event_type: String,
    #[serde(rename = "Time", default)]
    pub time: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Responsible", default)]
    pub responsible: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventLogRecord>,
}

/// Body of a trend report update: attach a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendReportRequest {
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "RunId")]
    pub run_id: u32,
}

/// Publication status of a run inside a trend report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrendStatus {
    Pending,
    Trended,
    Error,
}

impl TrendStatus {
    /// Whether the service has finished processing the run
    pub fn is_settled(self) -> bool {
        matches!(self, TrendStatus::Trended | TrendStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrendStatus::Pending => "Pending",
            TrendStatus::Trended => "Trended",
            TrendStatus::Error => "Error",
        }
    }
}

impl fmt::Display for TrendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TrendStatus {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "trended" => TrendStatus::Trended,
            "error" => TrendStatus::Error,
            _ => TrendStatus::Pending,
        }
    }
}

impl From<TrendStatus> for String {
    fn from(status: TrendStatus) -> Self {
        status.as_str().to_string()
    }
}

/// One entry of a trend report's metadata listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendedRun {
    #[serde(rename = "RunID")]
    pub run_id: u32,
    #[serde(rename = "State")]
    pub state: TrendStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_run_action_parsing() {
        assert_eq!("collate-and-analyze".parse::<PostRunAction>(), Ok(PostRunAction::CollateAndAnalyze));
        assert_eq!("Collate Results".parse::<PostRunAction>(), Ok(PostRunAction::Collate));
        assert_eq!("do_nothing".parse::<PostRunAction>(), Ok(PostRunAction::DoNothing));
        assert!("analyze".parse::<PostRunAction>().is_err());
    }

    #[test]
    fn test_run_state_rank_order() {
        let order = [
            RunState::Undefined,
            RunState::Initializing,
            RunState::Running,
            RunState::BeforeCollatingResults,
            RunState::CollatingResults,
            RunState::BeforeCreatingAnalysisData,
            RunState::CreatingAnalysisData,
            RunState::Finished,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank(), "{} !< {}", pair[0], pair[1]);
        }
        assert!(RunState::RunFailure.reached(RunState::Finished));
        assert!(!RunState::Running.reached(RunState::BeforeCollatingResults));
    }

    #[test]
    fn test_run_state_labels() {
        assert_eq!(RunState::from_label("Before Collating Results"), RunState::BeforeCollatingResults);
        assert_eq!(RunState::from_label("BEFORE_CREATING_ANALYSIS_DATA"), RunState::BeforeCreatingAnalysisData);
        assert_eq!(RunState::from_label("Run Failure"), RunState::RunFailure);
        assert_eq!(RunState::from_label("Pending Magic"), RunState::Undefined);
        assert_eq!(RunState::from_label(""), RunState::Undefined);
    }

    #[test]
    fn test_post_run_action_targets() {
        assert_eq!(PostRunAction::DoNothing.target_state(), RunState::BeforeCollatingResults);
        assert_eq!(PostRunAction::Collate.target_state(), RunState::BeforeCreatingAnalysisData);
        assert_eq!(PostRunAction::CollateAndAnalyze.target_state(), RunState::Finished);
    }

    #[test]
    fn test_run_response_from_json() {
        let json = r#"{"ID": 42, "TestID": 7, "TimeslotID": 1001, "RunState": "Running"}"#;
        let response: RunResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.id, 42);
        assert_eq!(response.test_instance_id, 0);
        assert_eq!(response.run_state, RunState::Running);
    }

    #[test]
    fn test_test_data_without_trend_report() {
        let data: TestData = serde_json::from_str(r#"{"ID": 3, "Name": "checkout"}"#).unwrap();
        assert_eq!(data.associated_trend_report(), None);

        let data: TestData =
            serde_json::from_str(r#"{"ID": 3, "Name": "checkout", "TrendReportId": 12}"#).unwrap();
        assert_eq!(data.associated_trend_report(), Some(12));
    }

    #[test]
    fn test_trend_status_parsing() {
        assert_eq!(TrendStatus::from("Trended".to_string()), TrendStatus::Trended);
        assert_eq!(TrendStatus::from("ERROR".to_string()), TrendStatus::Error);
        assert_eq!(TrendStatus::from("In Progress".to_string()), TrendStatus::Pending);
        assert!(!TrendStatus::Pending.is_settled());
        assert!(TrendStatus::Error.is_settled());
    }

    #[test]
    fn test_timeslot_total_minutes() {
        assert_eq!(TimeslotDuration::new(1, 30).total_minutes(), Some(90));
        assert_eq!(TimeslotDuration::default().total_minutes(), Some(30));
        assert_eq!(TimeslotDuration::new(80_000_000, 0).total_minutes(), None);
        assert_eq!(TimeslotDuration::new(0, u32::MAX).total_minutes(), Some(u32::MAX));
        assert_eq!(TimeslotDuration::new(1, u32::MAX).total_minutes(), None);
    }

    #[test]
    fn test_start_body_rejects_oversized_timeslot() {
        let request = RunRequest {
            test_id: 5,
            test_instance_id: 7,
            timeslot_duration: TimeslotDuration::new(80_000_000, 0),
            post_run_action: PostRunAction::Collate,
            vuds_mode: false,
        };
        let err = StartRunBody::try_from(&request).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }
}

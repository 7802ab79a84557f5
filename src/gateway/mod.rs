pub mod backend;
pub mod rest;
pub mod types;

pub use backend::{MockGateway, PcGateway};
pub use rest::RestGateway;
pub use types::{
    EventLog, EventLogRecord, GatewayError, GatewayResult, PostRunAction, RunRequest, RunResponse,
    RunResult, RunState, TestData, TestInstance, TestSet, TimeslotDuration, TrendReportRequest,
    TrendStatus, TrendedRun,
};

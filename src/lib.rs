//! PC Runner - Remote load-test lifecycle control.
//!
//! This crate provides:
//! - Session management against a performance-testing service
//! - Test instance resolution, including automatic instance creation
//! - Run launch with bounded retries
//! - Run state polling with stall detection and re-authentication
//! - Trend report publication, PDF download and measurement extraction
//! - HTML report retrieval
//! - MockGateway for testing without a live service
//!
//! # Example
//!
//! ```rust,no_run
//! use pc_runner::{
//!     Credentials, PcClient, RestGateway, RunPlan, ServerSettings, Session,
//!     TestInstanceSelection,
//! };
//! use std::time::Duration;
//!
//! let settings = ServerSettings::new("pc.example.com:8080", "DEFAULT", "perf");
//! let gateway = RestGateway::new(&settings, Duration::from_secs(30)).unwrap();
//! let session = Session::new(settings, Credentials::new("ci", "secret"));
//!
//! let mut client = PcClient::new(gateway, session);
//! let summary = client
//!     .execute(&RunPlan::new(12, TestInstanceSelection::Auto))
//!     .unwrap();
//! println!("run {} ended in {}", summary.run_id, summary.final_state);
//! ```

pub mod config;
pub mod controller;
pub mod gateway;
pub mod runner;
pub mod session;
pub mod trend_data;

// Re-export runner types
pub use runner::{Outcome, RunSummary};

// Re-export controller types
pub use controller::{
    Interrupted, PcClient, PcError, PcResult, RecordingSleeper, RetryPolicy, RunPlan, Sleeper,
    TestInstanceSelection, ThreadSleeper, TrendReportSelection,
};

// Re-export gateway types and backends
pub use gateway::{
    GatewayError, GatewayResult, MockGateway, PcGateway, PostRunAction, RestGateway, RunRequest,
    RunResponse, RunState, TimeslotDuration, TrendStatus,
};

// Re-export session management
pub use session::{Credentials, ProxySettings, ServerSettings, Session};

// Re-export trend data extraction
pub use trend_data::{DataType, Measurement, PctType, TrendMeasurements, extract_measurements};

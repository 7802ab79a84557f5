pub mod client;
pub mod instance;
pub mod launch;
pub mod poller;
pub mod results;
pub mod trend;
pub mod types;

pub use client::PcClient;
pub use types::{
    Interrupted, PcError, PcResult, RecordingSleeper, RetryPolicy, RunPlan, Sleeper,
    TestInstanceSelection, ThreadSleeper, TrendReportSelection,
};

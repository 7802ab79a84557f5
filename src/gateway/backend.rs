//! Gateway abstraction over the performance-testing service.
//!
//! This module provides a single interface for every remote call the
//! lifecycle controller makes:
//! - `RestGateway` speaks to a live service over HTTP
//! - `MockGateway` replays scripted answers for tests and offline rehearsal

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Mutex;

use super::types::{
    EventLog, GatewayError, GatewayResult, RunRequest, RunResponse, RunResult, TestData,
    TestInstance, TestSet, TrendReportRequest, TrendedRun,
};
use crate::trend_data::TrendReportData;

/// Trait for service gateways
///
/// Gateways are stateless from the caller's point of view: authentication
/// state lives in the `Session`, and any transport-level session token is an
/// implementation detail of the gateway.
pub trait PcGateway: Send + Sync {
    fn authenticate(&self, user: &str, password: &str) -> GatewayResult<bool>;

    fn logout(&self) -> GatewayResult<bool>;

    fn start_run(&self, request: &RunRequest) -> GatewayResult<RunResponse>;

    fn stop_run(&self, run_id: u32, reason: &str) -> GatewayResult<bool>;

    /// Current view of a run, including its state
    fn run_data(&self, run_id: u32) -> GatewayResult<RunResponse>;

    /// Instances of a test, in the order the service lists them
    fn test_instances_by_test_id(&self, test_id: u32) -> GatewayResult<Vec<TestInstance>>;

    /// All test sets of the project, in the order the service lists them
    fn all_test_sets(&self) -> GatewayResult<Vec<TestSet>>;

    /// Create an instance of `test_id` under `test_set_id`, returning its id
    fn create_test_instance(&self, test_id: u32, test_set_id: u32) -> GatewayResult<u32>;

    fn test_data(&self, test_id: u32) -> GatewayResult<TestData>;

    fn run_results(&self, run_id: u32) -> GatewayResult<Vec<RunResult>>;

    /// Download a result payload to `destination`
    fn run_result_data(&self, run_id: u32, result_id: u32, destination: &Path) -> GatewayResult<()>;

    fn run_event_log(&self, run_id: u32) -> GatewayResult<EventLog>;

    fn update_trend_report(
        &self,
        trend_report_id: &str,
        request: &TrendReportRequest,
    ) -> GatewayResult<()>;

    fn trend_report_metadata(&self, trend_report_id: &str) -> GatewayResult<Vec<TrendedRun>>;

    /// PDF rendering of a trend report as a byte stream
    fn trending_pdf(&self, trend_report_id: &str) -> GatewayResult<Box<dyn Read + Send>>;

    fn trend_report_transactions(
        &self,
        trend_report_id: &str,
        run_id: u32,
    ) -> GatewayResult<TrendReportData>;
}

/// A queue of scripted answers.
///
/// Answers are consumed front to back; the last one repeats forever so a
/// script of one entry behaves like a fixed answer.
#[derive(Debug)]
struct Script<T> {
    answers: VecDeque<GatewayResult<T>>,
    exhausted: &'static str,
}

impl<T: Clone> Script<T> {
    fn new(exhausted: &'static str) -> Self {
        Self {
            answers: VecDeque::new(),
            exhausted,
        }
    }

    fn fixed(answer: GatewayResult<T>, exhausted: &'static str) -> Self {
        let mut script = Self::new(exhausted);
        script.answers.push_back(answer);
        script
    }

    fn replace(&mut self, answers: impl IntoIterator<Item = GatewayResult<T>>) {
        self.answers = answers.into_iter().collect();
    }

    fn next(&mut self) -> GatewayResult<T> {
        if self.answers.len() > 1 {
            if let Some(answer) = self.answers.pop_front() {
                return answer;
            }
        }
        self.answers
            .front()
            .cloned()
            .unwrap_or_else(|| Err(GatewayError::InvalidResponse(self.exhausted.to_string())))
    }
}

#[derive(Debug)]
struct MockState {
    auth: Script<bool>,
    logout: Script<bool>,
    start: Script<RunResponse>,
    stop: Script<bool>,
    run_data: Script<RunResponse>,
    instances: Script<Vec<TestInstance>>,
    test_sets: Script<Vec<TestSet>>,
    next_instance_id: u32,
    created_instances: Vec<TestInstance>,
    tests: HashMap<u32, TestData>,
    results: Script<Vec<RunResult>>,
    payloads: HashMap<u32, Vec<u8>>,
    event_log: Script<EventLog>,
    trend_updates: Vec<(String, TrendReportRequest)>,
    trend_update_result: Script<()>,
    trend_metadata: Script<Vec<TrendedRun>>,
    pdf: Script<Vec<u8>>,
    trend_data: Script<TrendReportData>,
    calls: Vec<&'static str>,
}

/// An in-memory gateway with scripted answers
///
/// Provides a builder API for assembling a fake service:
/// - `with_*` methods set the answers for one operation
/// - `calls()` / `call_count()` report what the controller asked for
/// - `created_instances()` and `trend_updates()` expose side effects
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    /// A gateway that accepts any login and knows nothing else
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                auth: Script::fixed(Ok(true), "no scripted authentication"),
                logout: Script::fixed(Ok(true), "no scripted logout"),
                start: Script::new("no scripted run start"),
                stop: Script::fixed(Ok(true), "no scripted stop"),
                run_data: Script::new("no scripted run data"),
                instances: Script::fixed(Ok(Vec::new()), "no scripted instances"),
                test_sets: Script::fixed(Ok(Vec::new()), "no scripted test sets"),
                next_instance_id: 1000,
                created_instances: Vec::new(),
                tests: HashMap::new(),
                results: Script::fixed(Ok(Vec::new()), "no scripted results"),
                payloads: HashMap::new(),
                event_log: Script::fixed(Ok(EventLog::default()), "no scripted event log"),
                trend_updates: Vec::new(),
                trend_update_result: Script::fixed(Ok(()), "no scripted trend update"),
                trend_metadata: Script::fixed(Ok(Vec::new()), "no scripted trend metadata"),
                pdf: Script::new("no scripted trend pdf"),
                trend_data: Script::fixed(Ok(TrendReportData::default()), "no scripted trend data"),
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: &'static str) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    pub fn with_auth_results(self, answers: impl IntoIterator<Item = GatewayResult<bool>>) -> Self {
        self.lock().auth.replace(answers);
        self
    }

    pub fn with_logout_results(self, answers: impl IntoIterator<Item = GatewayResult<bool>>) -> Self {
        self.lock().logout.replace(answers);
        self
    }

    pub fn with_start_results(
        self,
        answers: impl IntoIterator<Item = GatewayResult<RunResponse>>,
    ) -> Self {
        self.lock().start.replace(answers);
        self
    }

    pub fn with_stop_results(self, answers: impl IntoIterator<Item = GatewayResult<bool>>) -> Self {
        self.lock().stop.replace(answers);
        self
    }

    pub fn with_run_data(
        self,
        answers: impl IntoIterator<Item = GatewayResult<RunResponse>>,
    ) -> Self {
        self.lock().run_data.replace(answers);
        self
    }

    pub fn with_test_instances(self, instances: Vec<TestInstance>) -> Self {
        self.lock().instances.replace([Ok(instances)]);
        self
    }

    pub fn with_test_sets(self, test_sets: Vec<TestSet>) -> Self {
        self.lock().test_sets.replace([Ok(test_sets)]);
        self
    }

    /// Id handed out by the next `create_test_instance` call
    pub fn with_next_instance_id(self, id: u32) -> Self {
        self.lock().next_instance_id = id;
        self
    }

    pub fn with_test(self, test: TestData) -> Self {
        self.lock().tests.insert(test.id, test);
        self
    }

    pub fn with_run_results(self, results: Vec<RunResult>) -> Self {
        self.lock().results.replace([Ok(results)]);
        self
    }

    /// Bytes written by `run_result_data` for `result_id`
    pub fn with_result_payload(self, result_id: u32, payload: Vec<u8>) -> Self {
        self.lock().payloads.insert(result_id, payload);
        self
    }

    pub fn with_event_log(self, answer: GatewayResult<EventLog>) -> Self {
        self.lock().event_log.replace([answer]);
        self
    }

    pub fn with_trend_update_result(self, answer: GatewayResult<()>) -> Self {
        self.lock().trend_update_result.replace([answer]);
        self
    }

    pub fn with_trend_metadata(
        self,
        answers: impl IntoIterator<Item = GatewayResult<Vec<TrendedRun>>>,
    ) -> Self {
        self.lock().trend_metadata.replace(answers);
        self
    }

    pub fn with_trending_pdf(self, answer: GatewayResult<Vec<u8>>) -> Self {
        self.lock().pdf.replace([answer]);
        self
    }

    pub fn with_trend_data(self, answer: GatewayResult<TrendReportData>) -> Self {
        self.lock().trend_data.replace([answer]);
        self
    }

    /// Every operation invoked so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == operation).count()
    }

    /// `(test_id, test_set_id)` of each instance created
    pub fn created_instances(&self) -> Vec<(u32, u32)> {
        self.lock()
            .created_instances
            .iter()
            .map(|i| (i.test_id, i.test_set_id))
            .collect()
    }

    pub fn trend_updates(&self) -> Vec<(String, TrendReportRequest)> {
        self.lock().trend_updates.clone()
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PcGateway for MockGateway {
    fn authenticate(&self, _user: &str, _password: &str) -> GatewayResult<bool> {
        self.record("authenticate").auth.next()
    }

    fn logout(&self) -> GatewayResult<bool> {
        self.record("logout").logout.next()
    }

    fn start_run(&self, _request: &RunRequest) -> GatewayResult<RunResponse> {
        self.record("start_run").start.next()
    }

    fn stop_run(&self, _run_id: u32, _reason: &str) -> GatewayResult<bool> {
        self.record("stop_run").stop.next()
    }

    fn run_data(&self, _run_id: u32) -> GatewayResult<RunResponse> {
        self.record("run_data").run_data.next()
    }

    fn test_instances_by_test_id(&self, test_id: u32) -> GatewayResult<Vec<TestInstance>> {
        let mut state = self.record("test_instances_by_test_id");
        let mut listed = state.instances.next()?;
        listed.extend(
            state
                .created_instances
                .iter()
                .filter(|i| i.test_id == test_id)
                .cloned(),
        );
        Ok(listed)
    }

    fn all_test_sets(&self) -> GatewayResult<Vec<TestSet>> {
        self.record("all_test_sets").test_sets.next()
    }

    fn create_test_instance(&self, test_id: u32, test_set_id: u32) -> GatewayResult<u32> {
        let mut state = self.record("create_test_instance");
        let id = state.next_instance_id;
        state.next_instance_id += 1;
        state.created_instances.push(TestInstance {
            instance_id: id,
            test_id,
            test_set_id,
        });
        Ok(id)
    }

    fn test_data(&self, test_id: u32) -> GatewayResult<TestData> {
        self.record("test_data")
            .tests
            .get(&test_id)
            .cloned()
            .ok_or_else(|| GatewayError::Protocol {
                status: 404,
                message: format!("test {} not found", test_id),
            })
    }

    fn run_results(&self, _run_id: u32) -> GatewayResult<Vec<RunResult>> {
        self.record("run_results").results.next()
    }

    fn run_result_data(&self, _run_id: u32, result_id: u32, destination: &Path) -> GatewayResult<()> {
        let payload = self
            .record("run_result_data")
            .payloads
            .get(&result_id)
            .cloned()
            .ok_or_else(|| GatewayError::Protocol {
                status: 404,
                message: format!("result {} has no data", result_id),
            })?;
        std::fs::write(destination, payload)?;
        Ok(())
    }

    fn run_event_log(&self, _run_id: u32) -> GatewayResult<EventLog> {
        self.record("run_event_log").event_log.next()
    }

    fn update_trend_report(
        &self,
        trend_report_id: &str,
        request: &TrendReportRequest,
    ) -> GatewayResult<()> {
        let mut state = self.record("update_trend_report");
        state
            .trend_updates
            .push((trend_report_id.to_string(), request.clone()));
        state.trend_update_result.next()
    }

    fn trend_report_metadata(&self, _trend_report_id: &str) -> GatewayResult<Vec<TrendedRun>> {
        self.record("trend_report_metadata").trend_metadata.next()
    }

    fn trending_pdf(&self, _trend_report_id: &str) -> GatewayResult<Box<dyn Read + Send>> {
        let bytes = self.record("trending_pdf").pdf.next()?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn trend_report_transactions(
        &self,
        _trend_report_id: &str,
        _run_id: u32,
    ) -> GatewayResult<TrendReportData> {
        self.record("trend_report_transactions").trend_data.next()
    }
}

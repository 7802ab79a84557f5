use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use super::types::{
    PcError, PcResult, RetryPolicy, RunPlan, Sleeper, TestInstanceSelection, ThreadSleeper,
    TrendReportSelection,
};
use super::{instance, launch, poller, results, trend};
use crate::config;
use crate::gateway::{
    EventLog, PcGateway, PostRunAction, RunRequest, RunResponse, TrendStatus,
};
use crate::runner::{Outcome, RunSummary};
use crate::session::Session;
use crate::trend_data::{DataType, Measurement, PctType, TrendMeasurements};

/// Reason sent with a stop request
const STOP_REASON: &str = "stop";

/// Drives the lifecycle of runs against one service session.
///
/// Owns the gateway, the session and the sleeper used for every pause. The
/// session is the only mutable state; it is re-authenticated by the poller
/// after failed fetches.
pub struct PcClient<G: PcGateway, S: Sleeper = ThreadSleeper> {
    gateway: G,
    session: Session,
    sleeper: S,
}

impl<G: PcGateway> PcClient<G, ThreadSleeper> {
    pub fn new(gateway: G, session: Session) -> Self {
        Self::with_sleeper(gateway, session, ThreadSleeper::new())
    }
}

impl<G: PcGateway, S: Sleeper> PcClient<G, S> {
    pub fn with_sleeper(gateway: G, session: Session, sleeper: S) -> Self {
        Self {
            gateway,
            session,
            sleeper,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn login(&mut self) -> bool {
        self.session.login(&self.gateway)
    }

    pub fn logout(&mut self) -> bool {
        self.session.logout(&self.gateway)
    }

    pub fn resolve_test_instance(
        &self,
        test_id: u32,
        selection: &TestInstanceSelection,
    ) -> PcResult<u32> {
        instance::resolve_test_instance(&self.gateway, test_id, selection)
    }

    pub fn resolve_trend_report_id(
        &self,
        test_id: u32,
        selection: &TrendReportSelection,
        post_run_action: PostRunAction,
    ) -> PcResult<Option<String>> {
        instance::resolve_trend_report_id(&self.gateway, test_id, selection, post_run_action)
    }

    pub fn start_run(&self, request: &RunRequest, retry: &RetryPolicy) -> Outcome<RunResponse> {
        launch::start_run(&self.gateway, request, retry, &self.sleeper)
    }

    /// Poll until the run reaches the state implied by `post_run_action`
    pub fn wait_for_run_completion(
        &mut self,
        run_id: u32,
        post_run_action: PostRunAction,
    ) -> Outcome<RunResponse> {
        self.wait_for_run_completion_with_interval(
            run_id,
            post_run_action,
            Duration::from_millis(config::DEFAULT_POLL_INTERVAL_MS),
        )
    }

    pub fn wait_for_run_completion_with_interval(
        &mut self,
        run_id: u32,
        post_run_action: PostRunAction,
        interval: Duration,
    ) -> Outcome<RunResponse> {
        poller::wait_for_run_state(
            &self.gateway,
            &mut self.session,
            run_id,
            post_run_action.target_state(),
            interval,
            &self.sleeper,
        )
    }

    /// Ask the service to stop a run. Failures are logged.
    pub fn stop_run(&self, run_id: u32) -> bool {
        info!(run_id, "Stopping run");
        match self.gateway.stop_run(run_id, STOP_REASON) {
            Ok(stopped) => {
                info!(run_id, "Stop run {}", if stopped { "succeeded" } else { "failed" });
                stopped
            }
            Err(e) => {
                warn!(run_id, error = %e, "Stop run request failed");
                false
            }
        }
    }

    /// Event log of a run; `None` when it could not be fetched
    pub fn run_event_log(&self, run_id: u32) -> Option<EventLog> {
        match self.gateway.run_event_log(run_id) {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(run_id, error = %e, "Failed to fetch run event log");
                None
            }
        }
    }

    pub fn test_name(&self, test_id: u32) -> PcResult<String> {
        Ok(self.gateway.test_data(test_id)?.name)
    }

    pub fn publish_run_report(&self, run_id: u32, dir: &Path) -> PcResult<Option<PathBuf>> {
        results::publish_run_report(&self.gateway, run_id, dir)
    }

    pub fn add_run_to_trend_report(&self, run_id: u32, trend_report_id: &str) -> bool {
        trend::add_run_to_trend_report(
            &self.gateway,
            &self.session.settings.project,
            run_id,
            trend_report_id,
        )
    }

    pub fn wait_for_run_to_publish_on_trend_report(
        &self,
        run_id: u32,
        trend_report_id: &str,
    ) -> PcResult<Option<TrendStatus>> {
        trend::wait_for_run_to_publish_on_trend_report(
            &self.gateway,
            run_id,
            trend_report_id,
            &self.sleeper,
        )
    }

    pub fn download_trend_report_as_pdf(
        &self,
        trend_report_id: &str,
        dir: &Path,
    ) -> PcResult<PathBuf> {
        trend::download_trend_report_as_pdf(&self.gateway, trend_report_id, dir)
    }

    pub fn trend_report_measurements(
        &self,
        trend_report_id: &str,
        run_id: u32,
        data_type: DataType,
        pct_type: PctType,
        measurement: Measurement,
    ) -> PcResult<TrendMeasurements> {
        trend::trend_report_measurements(
            &self.gateway,
            trend_report_id,
            run_id,
            data_type,
            pct_type,
            measurement,
        )
    }

    /// Run a plan end to end: login, resolve, launch, poll, report, trend, logout.
    ///
    /// Errors before the run is launched (login, id resolution) are returned
    /// as `Err`. Once a run exists, failures are recorded in the summary so the
    /// run id is never lost.
    pub fn execute(&mut self, plan: &RunPlan) -> PcResult<RunSummary> {
        if !self.login() {
            return Err(PcError::LoginFailed(self.session.settings.base_url()));
        }
        let result = self.execute_logged_in(plan);
        self.logout();
        result
    }

    fn execute_logged_in(&mut self, plan: &RunPlan) -> PcResult<RunSummary> {
        if plan.timeslot.total_minutes().is_none() {
            return Err(PcError::InvalidTimeslot(plan.timeslot));
        }
        let test_instance_id = self.resolve_test_instance(plan.test_id, &plan.instance)?;
        let trend_report_id =
            self.resolve_trend_report_id(plan.test_id, &plan.trend_report, plan.post_run_action)?;

        let request = RunRequest {
            test_id: plan.test_id,
            test_instance_id,
            timeslot_duration: plan.timeslot,
            post_run_action: plan.post_run_action,
            vuds_mode: plan.vuds_mode,
        };
        let test_name = match self.test_name(plan.test_id) {
            Ok(name) => Some(name),
            Err(e) => {
                warn!(test_id = plan.test_id, error = %e, "Could not read the test name");
                None
            }
        };
        info!(
            test_id = plan.test_id,
            test_name = test_name.as_deref().unwrap_or(""),
            test_instance_id,
            "Preparing run"
        );
        let mut summary = RunSummary {
            test_instance_id,
            test_name,
            ..Default::default()
        };

        let run = match self.start_run(&request, &plan.retry) {
            Outcome::Ok(run) | Outcome::Degraded { value: run, .. } => run,
            Outcome::Fatal(reason) => {
                error!("Run could not be started: {}", reason);
                summary.error = Some(reason);
                summary.finished_at = Some(Utc::now());
                return Ok(summary);
            }
        };
        summary.run_id = run.id;
        summary.started_at = Some(Utc::now());

        let polled =
            self.wait_for_run_completion_with_interval(run.id, plan.post_run_action, plan.poll_interval);
        summary.final_state = polled.run_state();
        summary.degraded = polled.reason().map(str::to_string);
        summary.success = polled.is_ok() && !summary.final_state.is_failure();
        if polled.is_ok() && summary.final_state.is_failure() {
            summary.error = Some(format!("run ended in state {}", summary.final_state));
        }

        if summary.success {
            if let Err(e) = self.post_process(plan, run.id, trend_report_id, &mut summary) {
                error!(run_id = run.id, error = %e, "Post-run processing failed");
                summary.success = false;
                summary.error = Some(e.to_string());
            }
        }

        summary.finished_at = Some(Utc::now());
        info!(
            run_id = summary.run_id,
            state = %summary.final_state,
            success = summary.success,
            "Run lifecycle complete"
        );
        Ok(summary)
    }

    fn post_process(
        &self,
        plan: &RunPlan,
        run_id: u32,
        trend_report_id: Option<String>,
        summary: &mut RunSummary,
    ) -> PcResult<()> {
        if plan.post_run_action == PostRunAction::CollateAndAnalyze {
            let dir = plan.report_dir.join(run_id.to_string());
            summary.report_path = self.publish_run_report(run_id, &dir)?;
        }

        let Some(trend_report_id) = trend_report_id else {
            return Ok(());
        };
        summary.trend_report_id = Some(trend_report_id.clone());
        if !self.add_run_to_trend_report(run_id, &trend_report_id) {
            summary.degraded = Some(format!(
                "run could not be added to trend report {}",
                trend_report_id
            ));
            return Ok(());
        }

        summary.trend_status =
            self.wait_for_run_to_publish_on_trend_report(run_id, &trend_report_id)?;
        if plan.download_trend_pdf {
            summary.trend_pdf_path =
                Some(self.download_trend_report_as_pdf(&trend_report_id, &plan.report_dir)?);
        }
        Ok(())
    }
}

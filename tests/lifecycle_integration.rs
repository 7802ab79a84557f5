//! Integration tests for the full run lifecycle against a scripted gateway

use std::fs;
use std::io::{Cursor, Write};
use std::time::Duration;

use pc_runner::controller::poller::{RELOGIN_PAUSE, WAITING_POLL_INTERVAL};
use pc_runner::controller::trend::PUBLISH_POLL_INTERVAL;
use pc_runner::gateway::{
    GatewayError, MockGateway, PostRunAction, RunResponse, RunResult, RunState, TestData,
    TestSet, TrendStatus, TrendedRun,
};
use pc_runner::{
    Credentials, PcClient, RecordingSleeper, RetryPolicy, RunPlan, ServerSettings, Session,
    TestInstanceSelection, TrendReportSelection,
};

const POLL: Duration = Duration::from_millis(5000);

fn client(gateway: MockGateway) -> PcClient<MockGateway, RecordingSleeper> {
    PcClient::with_sleeper(
        gateway,
        Session::new(
            ServerSettings::new("pc.local:8080", "DEFAULT", "perf"),
            Credentials::new("ci", "secret"),
        ),
        RecordingSleeper::new(),
    )
}

fn at(state: RunState) -> Result<RunResponse, GatewayError> {
    Ok(RunResponse {
        id: 42,
        test_id: 5,
        run_state: state,
        ..Default::default()
    })
}

fn report_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("Report.html", zip::write::FileOptions::default())
        .expect("Failed to start zip entry");
    writer
        .write_all(b"<html>run 42</html>")
        .expect("Failed to write zip entry");
    writer.finish().expect("Failed to finish zip").into_inner()
}

fn refused() -> Result<RunResponse, GatewayError> {
    Err(GatewayError::Protocol {
        status: 500,
        message: "no free timeslot".to_string(),
    })
}

#[test]
fn test_full_lifecycle_with_auto_instance_and_trending() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let gateway = MockGateway::new()
        .with_test_sets(vec![
            TestSet { test_set_id: 1, name: "smoke".into() },
            TestSet { test_set_id: 2, name: "nightly".into() },
        ])
        .with_next_instance_id(300)
        .with_test(TestData { id: 5, name: "checkout".into(), trend_report_id: 12 })
        .with_start_results(vec![at(RunState::Initializing)])
        .with_run_data(vec![
            at(RunState::Running),
            at(RunState::BeforeCollatingResults),
            at(RunState::CollatingResults),
            at(RunState::CreatingAnalysisData),
            at(RunState::Finished),
        ])
        .with_run_results(vec![RunResult {
            id: 8,
            name: "Reports.zip".into(),
            result_type: "HTML REPORT".into(),
            run_id: 42,
        }])
        .with_result_payload(8, report_zip())
        .with_trend_metadata(vec![
            Ok(vec![TrendedRun { run_id: 42, state: TrendStatus::Pending }]),
            Ok(vec![TrendedRun { run_id: 42, state: TrendStatus::Trended }]),
        ])
        .with_trending_pdf(Ok(b"%PDF-1.4 trend".to_vec()));

    let mut plan = RunPlan::new(5, TestInstanceSelection::Auto);
    plan.post_run_action = PostRunAction::CollateAndAnalyze;
    plan.trend_report = TrendReportSelection::Associated;
    plan.download_trend_pdf = true;
    plan.poll_interval = POLL;
    plan.report_dir = dir.path().to_path_buf();

    let mut client = client(gateway);
    let summary = client.execute(&plan).expect("Lifecycle failed");

    assert!(summary.success, "summary: {:?}", summary);
    assert_eq!(summary.run_id, 42);
    assert_eq!(summary.test_instance_id, 300);
    assert_eq!(summary.final_state, RunState::Finished);
    assert_eq!(summary.trend_report_id.as_deref(), Some("12"));
    assert_eq!(summary.trend_status, Some(TrendStatus::Trended));

    let report = summary.report_path.expect("Report path missing");
    assert_eq!(report, dir.path().join("42").join("Report.html"));
    assert_eq!(fs::read_to_string(&report).unwrap(), "<html>run 42</html>");
    assert!(!dir.path().join("42").join("Reports.zip").exists());

    let pdf = summary.trend_pdf_path.expect("PDF path missing");
    assert_eq!(pdf, dir.path().join("trendReport12.pdf"));
    assert_eq!(fs::read(&pdf).unwrap(), b"%PDF-1.4 trend");

    let gateway = client.gateway();
    assert_eq!(gateway.created_instances(), vec![(5, 2)]);
    let updates = gateway.trend_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.project, "perf");
    assert_eq!(updates[0].1.run_id, 42);

    let calls = gateway.calls();
    assert_eq!(calls.first(), Some(&"authenticate"));
    assert_eq!(calls.last(), Some(&"logout"));

    let sleeps = client.sleeper().sleeps();
    assert_eq!(
        sleeps,
        vec![POLL, WAITING_POLL_INTERVAL, POLL, POLL, PUBLISH_POLL_INTERVAL]
    );
}

#[test]
fn test_start_retries_then_succeeds() {
    let gateway = MockGateway::new()
        .with_start_results(vec![refused(), refused(), at(RunState::Initializing)])
        .with_run_data(vec![at(RunState::BeforeCollatingResults)]);

    let mut plan = RunPlan::new(5, TestInstanceSelection::Explicit("7".into()));
    plan.post_run_action = PostRunAction::DoNothing;
    plan.retry = RetryPolicy::resolve(true, "1", "2");

    let mut client = client(gateway);
    let summary = client.execute(&plan).expect("Lifecycle failed");

    assert!(summary.success);
    assert_eq!(summary.run_id, 42);
    assert_eq!(client.gateway().call_count("start_run"), 3);
    assert_eq!(
        client.sleeper().sleeps(),
        vec![Duration::from_secs(1), Duration::from_secs(1)]
    );
}

#[test]
fn test_start_refused_without_retry() {
    let gateway = MockGateway::new().with_start_results(vec![refused(), at(RunState::Initializing)]);

    let mut plan = RunPlan::new(5, TestInstanceSelection::Explicit("7".into()));
    plan.retry = RetryPolicy::resolve(false, "1", "2");

    let mut client = client(gateway);
    let summary = client.execute(&plan).expect("Lifecycle failed");

    assert!(!summary.success);
    assert_eq!(summary.run_id, 0);
    assert!(summary.started_at.is_none());
    assert_eq!(client.gateway().call_count("start_run"), 1);
    assert_eq!(client.gateway().call_count("run_data"), 0);
    assert_eq!(client.gateway().call_count("logout"), 1);
}

#[test]
fn test_stalled_run_skips_post_processing() {
    let gateway = MockGateway::new()
        .with_start_results(vec![at(RunState::Initializing)])
        .with_run_data(vec![at(RunState::Running), at(RunState::BeforeCreatingAnalysisData)]);

    let mut plan = RunPlan::new(5, TestInstanceSelection::Explicit("7".into()));
    plan.post_run_action = PostRunAction::CollateAndAnalyze;
    plan.trend_report = TrendReportSelection::Explicit("12".into());

    let mut client = client(gateway);
    let summary = client.execute(&plan).expect("Lifecycle failed");

    assert!(!summary.success);
    assert_eq!(summary.final_state, RunState::BeforeCreatingAnalysisData);
    assert!(summary.degraded.is_some());
    assert_eq!(client.gateway().call_count("run_data"), 62);
    assert_eq!(client.gateway().call_count("run_results"), 0);
    assert!(client.gateway().trend_updates().is_empty());
}

#[test]
fn test_poll_recovers_after_relogin() {
    let gateway = MockGateway::new()
        .with_start_results(vec![at(RunState::Initializing)])
        .with_run_data(vec![
            at(RunState::Running),
            Err(GatewayError::Transport("connection reset".into())),
            Err(GatewayError::Protocol { status: 401, message: "session expired".into() }),
            at(RunState::BeforeCreatingAnalysisData),
        ]);

    let mut plan = RunPlan::new(5, TestInstanceSelection::Explicit("7".into()));
    plan.post_run_action = PostRunAction::Collate;

    let mut client = client(gateway);
    let summary = client.execute(&plan).expect("Lifecycle failed");

    assert!(summary.success);
    assert_eq!(summary.final_state, RunState::BeforeCreatingAnalysisData);
    // initial login plus one per failed fetch
    assert_eq!(client.gateway().call_count("authenticate"), 3);
    assert_eq!(client.sleeper().count_of(RELOGIN_PAUSE), 2);
}

#[test]
fn test_trend_publish_timeout_is_reported() {
    let gateway = MockGateway::new()
        .with_start_results(vec![at(RunState::Initializing)])
        .with_run_data(vec![at(RunState::BeforeCreatingAnalysisData)])
        .with_trend_metadata(vec![Ok(vec![TrendedRun { run_id: 42, state: TrendStatus::Pending }])]);

    let mut plan = RunPlan::new(5, TestInstanceSelection::Explicit("7".into()));
    plan.post_run_action = PostRunAction::Collate;
    plan.trend_report = TrendReportSelection::Explicit("12".into());

    let mut client = client(gateway);
    let summary = client.execute(&plan).expect("Lifecycle failed");

    assert!(!summary.success);
    assert_eq!(summary.run_id, 42);
    assert!(summary.error.unwrap().contains("did not settle"));
    assert_eq!(client.gateway().call_count("trend_report_metadata"), 120);
    assert_eq!(client.gateway().call_count("logout"), 1);
}

#[test]
fn test_invalid_instance_id_aborts_before_launch() {
    let gateway = MockGateway::new();
    let plan = RunPlan::new(5, TestInstanceSelection::Explicit("seven".into()));

    let mut client = client(gateway);
    let err = client.execute(&plan).unwrap_err();

    assert!(err.to_string().contains("seven"));
    assert_eq!(client.gateway().call_count("start_run"), 0);
    assert_eq!(client.gateway().call_count("logout"), 1);
}

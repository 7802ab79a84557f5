//! Trend report publication and queries.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::types::{PcError, PcResult, Sleeper};
use crate::gateway::{PcGateway, TrendReportRequest, TrendStatus};
use crate::trend_data::{self, DataType, Measurement, PctType, TrendMeasurements};

/// Pause between publication status checks
pub const PUBLISH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Status checks before publication is considered stuck
pub const MAX_PUBLISH_POLLS: u32 = 120;

/// Ask the service to add a run to a trend report. Failures are logged.
pub fn add_run_to_trend_report<G: PcGateway + ?Sized>(
    gateway: &G,
    project: &str,
    run_id: u32,
    trend_report_id: &str,
) -> bool {
    let request = TrendReportRequest {
        project: project.to_string(),
        run_id,
    };
    match gateway.update_trend_report(trend_report_id, &request) {
        Ok(()) => {
            info!(run_id, trend_report_id, "Publishing run on trend report");
            true
        }
        Err(e) => {
            warn!(run_id, trend_report_id, error = %e, "Failed to add run to trend report");
            false
        }
    }
}

/// Wait until the service settles publication of `run_id`.
///
/// Returns the settled status (`Trended` or `Error`), or `None` when the trend
/// report lists no runs at all.
pub fn wait_for_run_to_publish_on_trend_report<G, S>(
    gateway: &G,
    run_id: u32,
    trend_report_id: &str,
    sleeper: &S,
) -> PcResult<Option<TrendStatus>>
where
    G: PcGateway + ?Sized,
    S: Sleeper + ?Sized,
{
    for poll in 1..=MAX_PUBLISH_POLLS {
        let runs = gateway.trend_report_metadata(trend_report_id)?;
        if runs.is_empty() {
            info!(trend_report_id, "Trend report lists no runs, nothing to wait for");
            return Ok(None);
        }

        if let Some(run) = runs
            .iter()
            .find(|r| r.run_id == run_id && r.state.is_settled())
        {
            info!("Run: {} publishing status: {}", run_id, run.state);
            return Ok(Some(run.state));
        }

        debug!(run_id, trend_report_id, poll, "Run not yet published");
        sleeper
            .sleep(PUBLISH_POLL_INTERVAL)
            .map_err(|_| PcError::Interrupted)?;
    }

    Err(PcError::PublishTimeout {
        run_id,
        trend_report_id: trend_report_id.to_string(),
        polls: MAX_PUBLISH_POLLS,
    })
}

/// File name of a downloaded trend report
pub fn trend_pdf_file_name(trend_report_id: &str) -> String {
    format!("trendReport{}.pdf", trend_report_id)
}

/// Save the PDF rendering of a trend report into `dir`
pub fn download_trend_report_as_pdf<G: PcGateway + ?Sized>(
    gateway: &G,
    trend_report_id: &str,
    dir: &Path,
) -> PcResult<PathBuf> {
    let download = || -> PcResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(trend_pdf_file_name(trend_report_id));
        let mut pdf = gateway.trending_pdf(trend_report_id)?;
        let mut file = File::create(&path)?;
        io::copy(&mut pdf, &mut file)?;
        Ok(path)
    };

    match download() {
        Ok(path) => {
            info!(trend_report_id, path = %path.display(), "Trend report downloaded");
            Ok(path)
        }
        Err(e) => Err(PcError::TrendReportDownload {
            trend_report_id: trend_report_id.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// One measurement slice of a trended run
pub fn trend_report_measurements<G: PcGateway + ?Sized>(
    gateway: &G,
    trend_report_id: &str,
    run_id: u32,
    data_type: DataType,
    pct_type: PctType,
    measurement: Measurement,
) -> PcResult<TrendMeasurements> {
    let data = gateway.trend_report_transactions(trend_report_id, run_id)?;
    let measurements = trend_data::extract_measurements(&data, run_id, data_type, pct_type, measurement)?;
    debug!(
        trend_report_id,
        run_id,
        entries = measurements.len(),
        "Extracted trend measurements"
    );
    Ok(measurements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::types::RecordingSleeper;
    use crate::gateway::{GatewayError, MockGateway, TrendedRun};
    use crate::trend_data::{TransactionDataRow, TrendReportData};

    fn listed(entries: &[(u32, TrendStatus)]) -> Result<Vec<TrendedRun>, GatewayError> {
        Ok(entries
            .iter()
            .map(|(run_id, state)| TrendedRun {
                run_id: *run_id,
                state: *state,
            })
            .collect())
    }

    #[test]
    fn test_add_run_records_request() {
        let gateway = MockGateway::new();
        assert!(add_run_to_trend_report(&gateway, "perf", 42, "12"));

        let updates = gateway.trend_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "12");
        assert_eq!(updates[0].1.run_id, 42);
        assert_eq!(updates[0].1.project, "perf");
    }

    #[test]
    fn test_add_run_failure_is_reported() {
        let gateway = MockGateway::new()
            .with_trend_update_result(Err(GatewayError::Transport("refused".into())));
        assert!(!add_run_to_trend_report(&gateway, "perf", 42, "12"));
    }

    #[test]
    fn test_wait_settles_on_trended() {
        let gateway = MockGateway::new().with_trend_metadata(vec![
            listed(&[(41, TrendStatus::Trended), (42, TrendStatus::Pending)]),
            listed(&[(41, TrendStatus::Trended), (42, TrendStatus::Trended)]),
        ]);
        let sleeper = RecordingSleeper::new();

        let status = wait_for_run_to_publish_on_trend_report(&gateway, 42, "12", &sleeper).unwrap();
        assert_eq!(status, Some(TrendStatus::Trended));
        assert_eq!(sleeper.sleeps(), vec![PUBLISH_POLL_INTERVAL]);
    }

    #[test]
    fn test_wait_settles_on_error() {
        let gateway = MockGateway::new().with_trend_metadata(vec![listed(&[(42, TrendStatus::Error)])]);
        let sleeper = RecordingSleeper::new();

        let status = wait_for_run_to_publish_on_trend_report(&gateway, 42, "12", &sleeper).unwrap();
        assert_eq!(status, Some(TrendStatus::Error));
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn test_wait_on_empty_report_returns_immediately() {
        let gateway = MockGateway::new();
        let sleeper = RecordingSleeper::new();

        let status = wait_for_run_to_publish_on_trend_report(&gateway, 42, "12", &sleeper).unwrap();
        assert_eq!(status, None);
        assert_eq!(gateway.call_count("trend_report_metadata"), 1);
    }

    #[test]
    fn test_wait_times_out() {
        let gateway = MockGateway::new().with_trend_metadata(vec![listed(&[(42, TrendStatus::Pending)])]);
        let sleeper = RecordingSleeper::new();

        let err = wait_for_run_to_publish_on_trend_report(&gateway, 42, "12", &sleeper).unwrap_err();
        assert!(matches!(err, PcError::PublishTimeout { run_id: 42, polls: 120, .. }));
        assert_eq!(gateway.call_count("trend_report_metadata"), 120);
        assert_eq!(sleeper.sleeps().len(), 120);
    }

    #[test]
    fn test_wait_interrupted() {
        let gateway = MockGateway::new().with_trend_metadata(vec![listed(&[(42, TrendStatus::Pending)])]);
        let sleeper = RecordingSleeper::interrupt_after(2);

        let err = wait_for_run_to_publish_on_trend_report(&gateway, 42, "12", &sleeper).unwrap_err();
        assert!(matches!(err, PcError::Interrupted));
        assert_eq!(gateway.call_count("trend_report_metadata"), 3);
    }

    #[test]
    fn test_pdf_download() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MockGateway::new().with_trending_pdf(Ok(b"%PDF-1.4".to_vec()));

        let path = download_trend_report_as_pdf(&gateway, "12", &dir.path().join("trend")).unwrap();
        assert_eq!(path, dir.path().join("trend").join("trendReport12.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_pdf_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MockGateway::new();

        let err = download_trend_report_as_pdf(&gateway, "12", dir.path()).unwrap_err();
        assert!(matches!(err, PcError::TrendReportDownload { ref trend_report_id, .. } if trend_report_id == "12"));
    }

    #[test]
    fn test_measurements_from_gateway() {
        let data = TrendReportData {
            transactions: vec![TransactionDataRow {
                pct_type: "TRT".into(),
                pct_name: "login".into(),
                average: Some(1.5),
                ..Default::default()
            }],
            ..Default::default()
        };
        let gateway = MockGateway::new().with_trend_data(Ok(data));

        let measurements = trend_report_measurements(
            &gateway,
            "12",
            42,
            DataType::Transaction,
            PctType::Trt,
            Measurement::Average,
        )
        .unwrap();
        assert_eq!(measurements.get("RunId"), Some("_42_"));
        assert_eq!(measurements.get("login"), Some("1.5"));
    }

    #[test]
    fn test_unmapped_measurement_is_an_error() {
        let gateway = MockGateway::new();
        let err = trend_report_measurements(
            &gateway,
            "12",
            42,
            DataType::Monitor,
            PctType::Trt,
            Measurement::Percentile90,
        )
        .unwrap_err();
        assert!(matches!(err, PcError::UnmappedMeasurement(_)));
    }
}

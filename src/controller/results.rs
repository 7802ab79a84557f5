//! Run result retrieval.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::types::PcResult;
use crate::gateway::PcGateway;

/// Result artifact holding the zipped HTML report
pub const REPORT_ARCHIVE_NAME: &str = "Reports.zip";

/// Entry page inside the unpacked report
pub const REPORT_FILE_NAME: &str = "Report.html";

/// Download and unpack the HTML report of a run into `dir`.
///
/// Returns the path of the report page, or `None` when the run has no report
/// archive. The downloaded archive is removed whether or not it unpacked.
pub fn publish_run_report<G: PcGateway + ?Sized>(
    gateway: &G,
    run_id: u32,
    dir: &Path,
) -> PcResult<Option<PathBuf>> {
    let results = gateway.run_results(run_id)?;
    let Some(archive) = results.iter().find(|r| r.name == REPORT_ARCHIVE_NAME) else {
        info!(run_id, "No HTML report found for the run");
        return Ok(None);
    };

    fs::create_dir_all(dir)?;
    let archive_path = dir.join(REPORT_ARCHIVE_NAME);
    info!(run_id, result_id = archive.id, path = %archive_path.display(), "Downloading report archive");
    gateway.run_result_data(run_id, archive.id, &archive_path)?;

    let unpacked = unpack(&archive_path, dir);
    let removed = fs::remove_file(&archive_path);
    unpacked?;
    removed?;

    let report = dir.join(REPORT_FILE_NAME);
    if report.is_file() {
        info!(run_id, path = %report.display(), "HTML report available");
        Ok(Some(report))
    } else {
        warn!(run_id, "Report archive did not contain {}", REPORT_FILE_NAME);
        Ok(None)
    }
}

fn unpack(archive: &Path, into: &Path) -> PcResult<()> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    zip.extract(into)?;
    Ok(())
}

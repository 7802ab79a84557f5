//! Test instance and trend report resolution.
//!
//! Instances are picked by the last-listed rule: when a test already has
//! instances, the last one the service lists is reused. When it has none, a
//! new instance is created under the last-listed test set of the project.

use tracing::{info, warn};

use super::types::{PcError, PcResult, TestInstanceSelection, TrendReportSelection, parse_id};
use crate::gateway::{PcGateway, PostRunAction};

/// Resolve the concrete test instance a run will use
pub fn resolve_test_instance<G: PcGateway + ?Sized>(
    gateway: &G,
    test_id: u32,
    selection: &TestInstanceSelection,
) -> PcResult<u32> {
    match selection {
        TestInstanceSelection::Explicit(raw) => {
            let id = parse_id("test instance id", raw)?;
            info!(test_instance_id = id, "Running with manual test instance selection");
            Ok(id)
        }
        TestInstanceSelection::Auto => {
            info!(test_id, "Searching for available test instance");
            let instances = gateway.test_instances_by_test_id(test_id)?;
            if let Some(existing) = instances.last() {
                info!(
                    test_instance_id = existing.instance_id,
                    "Found existing test instance"
                );
                return Ok(existing.instance_id);
            }

            info!(test_id, "No instances found, creating a new one");
            let test_sets = gateway.all_test_sets()?;
            let test_set = test_sets.last().ok_or(PcError::NoTestSet)?;
            let id = gateway.create_test_instance(test_id, test_set.test_set_id)?;
            info!(
                test_instance_id = id,
                test_set_id = test_set.test_set_id,
                "Created test instance"
            );
            Ok(id)
        }
    }
}

/// Resolve the trend report a finished run should be published to.
///
/// Returns `None` when trending is off. Trending only makes sense when results
/// are collated, so with `DoNothing` any selection is ignored.
pub fn resolve_trend_report_id<G: PcGateway + ?Sized>(
    gateway: &G,
    test_id: u32,
    selection: &TrendReportSelection,
    post_run_action: PostRunAction,
) -> PcResult<Option<String>> {
    if post_run_action == PostRunAction::DoNothing {
        if *selection != TrendReportSelection::None {
            warn!("Trending requires collated results, ignoring trend report selection");
        }
        return Ok(None);
    }

    match selection {
        TrendReportSelection::None => Ok(None),
        TrendReportSelection::Explicit(raw) => {
            let id = parse_id("trend report id", raw)?;
            Ok(Some(id.to_string()))
        }
        TrendReportSelection::Associated => {
            let test = gateway.test_data(test_id)?;
            match test.associated_trend_report() {
                Some(id) => {
                    info!(test_id, trend_report_id = id, "Using associated trend report");
                    Ok(Some(id.to_string()))
                }
                None => Err(PcError::MissingTrendReport { test_id }),
            }
        }
    }
}

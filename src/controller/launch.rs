//! Run launch with bounded retries.

use tracing::{info, warn};

use super::types::{RetryPolicy, Sleeper};
use crate::gateway::{PcGateway, RunRequest, RunResponse};
use crate::runner::Outcome;

fn attempt<G: PcGateway + ?Sized>(gateway: &G, request: &RunRequest) -> Result<RunResponse, String> {
    match gateway.start_run(request) {
        Ok(response) if response.id > 0 => Ok(response),
        Ok(_) => Err("service returned run id 0".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Start a run, retrying per `retry` when the service refuses.
///
/// Makes at most `1 + max_occurrences` start calls with a pause of
/// `retry.delay` before each retry. A response carrying run id 0 counts as a
/// failure. Only `Ok` and `Fatal` are produced.
pub fn start_run<G, S>(
    gateway: &G,
    request: &RunRequest,
    retry: &RetryPolicy,
    sleeper: &S,
) -> Outcome<RunResponse>
where
    G: PcGateway + ?Sized,
    S: Sleeper + ?Sized,
{
    info!(
        test_id = request.test_id,
        test_instance_id = request.test_instance_id,
        timeslot = %request.timeslot_duration,
        post_run_action = %request.post_run_action,
        vuds_mode = request.vuds_mode,
        "Executing load test"
    );

    let mut last_reason = match attempt(gateway, request) {
        Ok(response) => {
            info!(run_id = response.id, "Run started");
            return Outcome::Ok(response);
        }
        Err(reason) => {
            warn!("StartRun failed. Error: {}", reason);
            reason
        }
    };

    if !retry.enabled {
        return Outcome::fatal(last_reason);
    }

    for retry_number in 1..=retry.max_occurrences {
        let remaining = retry.max_occurrences - retry_number + 1;
        info!(
            "Failed to start run. Attempting to start again in {}s. {} attempt(s) remaining.",
            retry.delay.as_secs(),
            remaining
        );
        if sleeper.sleep(retry.delay).is_err() {
            warn!("Interrupted while waiting to retry the run start");
            return Outcome::fatal("interrupted while waiting to retry");
        }

        match attempt(gateway, request) {
            Ok(response) => {
                info!(run_id = response.id, retry = retry_number, "Run started");
                return Outcome::Ok(response);
            }
            Err(reason) => {
                warn!("StartRun retry failed. Error: {}", reason);
                last_reason = reason;
            }
        }
    }

    Outcome::fatal(format!(
        "run could not be started after {} attempt(s): {}",
        u64::from(retry.max_occurrences) + 1,
        last_reason
    ))
}

//! Run state polling.
//!
//! The observed state only ever moves forward: a fetch reporting an earlier
//! state than one already seen is ignored. Polling ends when the observed
//! state reaches the target, when the run sits in a "before collating" or
//! "before creating analysis" state for too long, or after three consecutive
//! failed fetches.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::types::Sleeper;
use crate::gateway::{PcGateway, RunResponse, RunState};
use crate::runner::Outcome;
use crate::session::Session;

/// Poll interval while the run sits in a waiting state
pub const WAITING_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive waiting observations tolerated before giving up
pub const MAX_WAITING_OBSERVATIONS: u32 = 60;

/// Consecutive fetch failures tolerated
pub const MAX_FETCH_FAILURES: u32 = 3;

/// Pause before re-authenticating after a failed fetch
pub const RELOGIN_PAUSE: Duration = Duration::from_secs(2);

/// What the poll loop should do after an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    TargetReached,
    /// The run stayed in a waiting state past the limit
    Stalled,
    Wait(Duration),
}

/// Pure bookkeeping of one poll
#[derive(Debug, Clone)]
pub struct PollState {
    target: RunState,
    last_observed: RunState,
    waiting_count: u32,
    strikes_left: u32,
}

impl PollState {
    pub fn new(target: RunState) -> Self {
        Self {
            target,
            last_observed: RunState::Undefined,
            waiting_count: 0,
            strikes_left: MAX_FETCH_FAILURES,
        }
    }

    pub fn last_observed(&self) -> RunState {
        self.last_observed
    }

    pub fn waiting_count(&self) -> u32 {
        self.waiting_count
    }

    pub fn strikes_left(&self) -> u32 {
        self.strikes_left
    }

    /// Record a successful fetch
    pub fn observe(&mut self, current: RunState, interval: Duration) -> PollStep {
        self.strikes_left = MAX_FETCH_FAILURES;
        if current.rank() > self.last_observed.rank() {
            self.last_observed = current;
        }

        if current.is_waiting() {
            self.waiting_count += 1;
        } else {
            self.waiting_count = 0;
        }

        if self.last_observed.reached(self.target) {
            PollStep::TargetReached
        } else if current.is_waiting() {
            if self.waiting_count > MAX_WAITING_OBSERVATIONS {
                PollStep::Stalled
            } else {
                PollStep::Wait(WAITING_POLL_INTERVAL)
            }
        } else {
            PollStep::Wait(interval)
        }
    }

    /// Record a failed fetch; true once no strikes remain
    pub fn record_failure(&mut self) -> bool {
        self.strikes_left = self.strikes_left.saturating_sub(1);
        self.strikes_left == 0
    }
}

fn cut_short(last: Option<RunResponse>, reason: String) -> Outcome<RunResponse> {
    match last {
        Some(response) => Outcome::degraded(response, reason),
        None => Outcome::fatal(reason),
    }
}

/// Poll a run until it reaches `target` or polling gives up.
///
/// Returns `Ok` with the response that reached the target, `Degraded` with the
/// last successful response when polling stopped early, or `Fatal` when no
/// fetch ever succeeded.
pub fn wait_for_run_state<G, S>(
    gateway: &G,
    session: &mut Session,
    run_id: u32,
    target: RunState,
    interval: Duration,
    sleeper: &S,
) -> Outcome<RunResponse>
where
    G: PcGateway + ?Sized,
    S: Sleeper + ?Sized,
{
    let mut poll = PollState::new(target);
    let mut last: Option<RunResponse> = None;
    info!(run_id, target = %target, "Waiting for run to reach state");

    loop {
        if poll.strikes_left() < MAX_FETCH_FAILURES {
            let failures = MAX_FETCH_FAILURES - poll.strikes_left();
            warn!(
                run_id,
                "Cannot get response about the state of the run {} time(s) consecutively",
                failures
            );
            if poll.strikes_left() == 0 {
                warn!(run_id, "Stopping monitoring of the run");
                return cut_short(
                    last,
                    format!("run state unavailable after {} consecutive failures", failures),
                );
            }
            if sleeper.sleep(RELOGIN_PAUSE).is_err() {
                return cut_short(last, "interrupted while polling".to_string());
            }
            session.login(gateway);
        }

        let current = match gateway.run_data(run_id) {
            Ok(current) => current,
            Err(e) => {
                debug!(run_id, error = %e, "Run state fetch failed");
                poll.record_failure();
                continue;
            }
        };

        let previous = poll.last_observed();
        let step = poll.observe(current.run_state, interval);
        if poll.last_observed() != previous {
            info!("RunID: {} - State = {}", run_id, current.run_state);
        }

        match step {
            PollStep::TargetReached => return Outcome::Ok(current),
            PollStep::Stalled => {
                warn!(
                    run_id,
                    "Stopped from service side with state = {}",
                    poll.last_observed()
                );
                return Outcome::degraded(
                    current,
                    format!(
                        "run stayed in a waiting state for more than {} polls",
                        MAX_WAITING_OBSERVATIONS
                    ),
                );
            }
            PollStep::Wait(duration) => {
                last = Some(current);
                if sleeper.sleep(duration).is_err() {
                    return cut_short(last, "interrupted while polling".to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::types::RecordingSleeper;
    use crate::gateway::{GatewayError, MockGateway};
    use crate::session::{Credentials, ServerSettings};

    const INTERVAL: Duration = Duration::from_millis(5000);

    fn session() -> Session {
        Session::new(
            ServerSettings::new("pc.local", "DEFAULT", "perf"),
            Credentials::new("ci", "secret"),
        )
    }

    fn at(state: RunState) -> Result<RunResponse, GatewayError> {
        Ok(RunResponse {
            id: 42,
            run_state: state,
            ..Default::default()
        })
    }

    fn down() -> Result<RunResponse, GatewayError> {
        Err(GatewayError::Transport("connection reset".into()))
    }

    #[test]
    fn test_observe_counts_waiting_and_resets() {
        let mut poll = PollState::new(RunState::Finished);
        assert_eq!(poll.observe(RunState::Running, INTERVAL), PollStep::Wait(INTERVAL));
        assert_eq!(
            poll.observe(RunState::BeforeCollatingResults, INTERVAL),
            PollStep::Wait(WAITING_POLL_INTERVAL)
        );
        assert_eq!(
            poll.observe(RunState::BeforeCollatingResults, INTERVAL),
            PollStep::Wait(WAITING_POLL_INTERVAL)
        );
        assert_eq!(poll.waiting_count(), 2);
        assert_eq!(poll.observe(RunState::Finished, INTERVAL), PollStep::TargetReached);
        assert_eq!(poll.waiting_count(), 0);
    }

    #[test]
    fn test_observe_ignores_regression() {
        let mut poll = PollState::new(RunState::Finished);
        poll.observe(RunState::CollatingResults, INTERVAL);
        poll.observe(RunState::Running, INTERVAL);
        assert_eq!(poll.last_observed(), RunState::CollatingResults);
    }

    #[test]
    fn test_observe_failure_states_end_polling() {
        let mut poll = PollState::new(RunState::Finished);
        assert_eq!(poll.observe(RunState::RunFailure, INTERVAL), PollStep::TargetReached);
    }

    #[test]
    fn test_observe_stalls_after_limit() {
        let mut poll = PollState::new(RunState::Finished);
        for _ in 0..MAX_WAITING_OBSERVATIONS {
            assert_eq!(
                poll.observe(RunState::BeforeCreatingAnalysisData, INTERVAL),
                PollStep::Wait(WAITING_POLL_INTERVAL)
            );
        }
        assert_eq!(
            poll.observe(RunState::BeforeCreatingAnalysisData, INTERVAL),
            PollStep::Stalled
        );
    }

    #[test]
    fn test_waiting_state_as_target() {
        let mut poll = PollState::new(RunState::BeforeCollatingResults);
        assert_eq!(
            poll.observe(RunState::BeforeCollatingResults, INTERVAL),
            PollStep::TargetReached
        );
    }

    #[test]
    fn test_poll_sequence_reaches_finished() {
        let gateway = MockGateway::new().with_run_data(vec![
            at(RunState::Running),
            at(RunState::BeforeCollatingResults),
            at(RunState::BeforeCollatingResults),
            at(RunState::Finished),
        ]);
        let sleeper = RecordingSleeper::new();
        let mut session = session();

        let outcome = wait_for_run_state(&gateway, &mut session, 42, RunState::Finished, INTERVAL, &sleeper);
        assert!(outcome.is_ok());
        assert_eq!(outcome.run_state(), RunState::Finished);
        assert_eq!(gateway.call_count("run_data"), 4);
        assert_eq!(
            sleeper.sleeps(),
            vec![INTERVAL, WAITING_POLL_INTERVAL, WAITING_POLL_INTERVAL]
        );
    }

    #[test]
    fn test_stall_returns_degraded() {
        let gateway = MockGateway::new().with_run_data(vec![at(RunState::BeforeCollatingResults)]);
        let sleeper = RecordingSleeper::new();
        let mut session = session();

        let outcome = wait_for_run_state(&gateway, &mut session, 42, RunState::Finished, INTERVAL, &sleeper);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.run_state(), RunState::BeforeCollatingResults);
        assert_eq!(gateway.call_count("run_data"), 61);
        assert_eq!(sleeper.sleeps().len(), 60);
    }

    #[test]
    fn test_three_failures_return_last_response() {
        let gateway = MockGateway::new().with_run_data(vec![at(RunState::Running), down()]);
        let sleeper = RecordingSleeper::new();
        let mut session = session();

        let outcome = wait_for_run_state(&gateway, &mut session, 42, RunState::Finished, INTERVAL, &sleeper);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.run_state(), RunState::Running);
        assert_eq!(gateway.call_count("run_data"), 4);
        assert_eq!(gateway.call_count("authenticate"), 2);
        assert_eq!(sleeper.count_of(RELOGIN_PAUSE), 2);
    }

    #[test]
    fn test_failures_without_any_response_are_fatal() {
        let gateway = MockGateway::new().with_run_data(vec![down()]);
        let sleeper = RecordingSleeper::new();
        let mut session = session();

        let outcome = wait_for_run_state(&gateway, &mut session, 42, RunState::Finished, INTERVAL, &sleeper);
        assert!(outcome.is_fatal());
        assert_eq!(outcome.run_id(), 0);
        assert_eq!(gateway.call_count("run_data"), 3);
    }

    #[test]
    fn test_recovery_resets_strikes() {
        let gateway = MockGateway::new().with_run_data(vec![
            down(),
            down(),
            at(RunState::Running),
            down(),
            down(),
            at(RunState::Finished),
        ]);
        let sleeper = RecordingSleeper::new();
        let mut session = session();

        let outcome = wait_for_run_state(&gateway, &mut session, 42, RunState::Finished, INTERVAL, &sleeper);
        assert!(outcome.is_ok());
        assert_eq!(gateway.call_count("authenticate"), 4);
    }
}

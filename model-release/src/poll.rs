use std::time::Duration;

use crate::databricks::models::{RunHandle, RunState};
use crate::error::Error;

/// Fixed-interval, bounded status polling. No backoff and no jitter.
///
/// With the defaults the run gets at most 180 status checks spaced 30 seconds
/// apart, i.e. a hard budget of 179 * 30s, roughly 90 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_polls: 180,
        }
    }
}

impl PollPolicy {
    /// Upper bound on the time spent sleeping between polls.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_polls.saturating_sub(1)
    }
}

/// Anything that can report the current state of a job run.
#[allow(async_fn_in_trait)]
pub trait RunStatusSource {
    async fn run_state(&self, run: &RunHandle) -> Result<RunState, Error>;
}

enum Polling {
    Pending,
    Done(RunState),
}

fn classify(state: RunState) -> Polling {
    if state.life_cycle_state.is_terminal() {
        Polling::Done(state)
    } else {
        Polling::Pending
    }
}

/// Polls `run` until it reaches a terminal life cycle state. A terminal state
/// whose result is anything but `SUCCESS` fails with [`Error::JobFailed`];
/// running out of polls fails with [`Error::PollTimeout`].
pub async fn poll_until_terminal<S: RunStatusSource>(
    source: &S,
    run: &RunHandle,
    policy: &PollPolicy,
) -> Result<RunState, Error> {
    for poll in 1..=policy.max_polls {
        let state = source.run_state(run).await?;
        log::info!("run {} poll {}/{}: {}", run.run_id, poll, policy.max_polls, state);
        if let Polling::Done(state) = classify(state) {
            if state.is_success() {
                log::info!("run ok");
                return Ok(state);
            }
            return Err(Error::JobFailed {
                life_cycle_state: state.life_cycle_state.to_string(),
                result_state: state
                    .result_state
                    .map_or_else(|| "none".to_string(), |r| r.to_string()),
            });
        }
        if poll < policy.max_polls {
            tokio::time::sleep(policy.interval).await;
        }
    }
    log::error!(
        "time out occurred after {} polls ({} minutes)",
        policy.max_polls,
        policy.budget().as_secs() / 60
    );
    Err(Error::PollTimeout {
        polls: policy.max_polls,
    })
}

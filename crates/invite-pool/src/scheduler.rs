//! Scheduler and worker pool
//!
//! A semaphore with `width` permits bounds how many submission tasks talk to
//! the endpoint at once; `2 * width` tasks are kept outstanding so a queued
//! task is always ready when a running one finishes. All completions come back
//! through one `JoinSet` and are handled one at a time by `Scheduler::run`,
//! which is the only writer of the aggregator and the ledger. Each task id maps
//! back to its token, so a task that panics still has its claim released.
//!
//! Stopping (credential rejected or external cancellation) means:
//! - no new dispatch
//! - the semaphore is closed, so queued tasks return without submitting
//! - tasks already talking to the endpoint finish on their own; their
//!   outcomes are still counted and recorded

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::Token;
use invite_client::Submitter;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, Summary};
use crate::claims::ClaimStore;
use crate::error::{Error, Result};
use crate::generator::Generate;
use crate::ledger::Ledger;
use crate::outcome::Outcome;
use crate::retry::RetryPolicy;
use crate::task::{WorkItem, run_submission};

/// Default bound on generate-and-claim rounds for one dispatch.
pub const DEFAULT_MAX_CLAIM_ATTEMPTS: u32 = 10_000;

/// Pool tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent submissions (W)
    pub width: usize,
    /// Global pause after each handled completion
    pub delay: Duration,
    pub retry: RetryPolicy,
    /// Give up dispatching after this many consecutive claim collisions
    pub max_claim_attempts: u32,
}

/// What the scheduler does with a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Credential rejected: release the token and stop the run
    Halt,
    /// Keep the claim, record success
    Keep,
    /// Exclude the token forever, record invalid
    Exclude,
    /// Give the claim back
    Release,
    /// Nothing was dispatched
    Drop,
}

impl Disposition {
    /// Whether a replacement token should be dispatched.
    pub fn replaces(&self) -> bool {
        matches!(
            self,
            Disposition::Keep | Disposition::Exclude | Disposition::Release
        )
    }
}

/// Map an outcome to its disposition. Pure: no I/O.
pub fn disposition(outcome: Outcome) -> Disposition {
    match outcome {
        Outcome::AuthError => Disposition::Halt,
        Outcome::Success => Disposition::Keep,
        Outcome::InvalidCode => Disposition::Exclude,
        Outcome::RateLimitedExhausted
        | Outcome::ServerErrorExhausted
        | Outcome::TransportErrorExhausted
        | Outcome::UnexpectedErrorExhausted
        | Outcome::WorkerError => Disposition::Release,
        Outcome::Duplicate => Disposition::Drop,
    }
}

/// A finished pool task. `outcome` is `None` if the task was stopped before
/// it acquired a permit.
#[derive(Debug)]
struct Completion {
    token: Token,
    outcome: Option<Outcome>,
}

/// Outstanding pool tasks and the token each one owns.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<Option<Outcome>>,
    tokens: HashMap<task::Id, Token>,
}

impl InFlight {
    fn spawn<F>(&mut self, token: Token, submission: F)
    where
        F: Future<Output = Option<Outcome>> + Send + 'static,
    {
        let id = self.tasks.spawn(submission).id();
        self.tokens.insert(id, token);
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Next finished task. A task that panicked comes back as `WorkerError`.
    /// Cancel safe.
    async fn join_next(&mut self) -> Option<Completion> {
        loop {
            let (id, outcome) = match self.tasks.join_next_with_id().await? {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    error!(error = %e, "submission task crashed");
                    (e.id(), Some(Outcome::WorkerError))
                }
            };
            match self.tokens.remove(&id) {
                Some(token) => return Some(Completion { token, outcome }),
                None => error!(task = %id, "finished task has no token"),
            }
        }
    }
}

/// Run-wide stop state.
#[derive(Debug, Default)]
struct RunState {
    /// A 401 was seen
    fatal: bool,
    /// Fatal or cancelled: semaphore closed, draining
    stopping: bool,
    /// Still allowed to dispatch (false once stopping or out of tokens)
    dispatching: bool,
}

/// Bounded worker pool over a `Submitter`.
pub struct Scheduler {
    config: SchedulerConfig,
    claims: Arc<ClaimStore>,
    ledger: Ledger,
    submitter: Arc<dyn Submitter>,
    generator: Box<dyn Generate>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        claims: Arc<ClaimStore>,
        ledger: Ledger,
        submitter: Arc<dyn Submitter>,
        generator: Box<dyn Generate>,
    ) -> Result<Self> {
        if config.width == 0 {
            return Err(Error::InvalidConfig("width must be greater than 0".into()));
        }
        if config.max_claim_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_claim_attempts must be greater than 0".into(),
            ));
        }
        Ok(Self {
            config,
            claims,
            ledger,
            submitter,
            generator,
        })
    }

    /// Run until `shutdown` is cancelled, the credential is rejected, or no
    /// unclaimed token can be generated; then drain and summarize.
    pub async fn run(mut self, shutdown: CancellationToken) -> Summary {
        let permits = Arc::new(Semaphore::new(self.config.width));
        let mut tasks = InFlight::default();
        let mut aggregator = Aggregator::new(self.ledger.paths().clone());
        let mut state = RunState {
            dispatching: true,
            ..RunState::default()
        };

        info!(
            submitter = self.submitter.id(),
            width = self.config.width,
            delay_ms = self.config.delay.as_millis() as u64,
            max_retries = self.config.retry.max_retries(),
            retry_delay_ms = self.config.retry.retry_delay().as_millis() as u64,
            "starting submission pool"
        );

        for _ in 0..self.config.width * 2 {
            if !self.dispatch_fresh(&mut tasks, &permits, &mut aggregator).await {
                state.dispatching = false;
                break;
            }
        }
        info!(dispatched = tasks.len(), "initial batch dispatched");

        loop {
            let joined = tokio::select! {
                biased;
                _ = shutdown.cancelled(), if !state.stopping => {
                    info!(in_flight = tasks.len(), "shutdown requested, draining in-flight submissions");
                    stop(&mut state, &permits);
                    continue;
                }
                joined = tasks.join_next() => joined,
            };

            let Some(completion) = joined else {
                break;
            };

            let replace = self
                .complete(completion, &mut aggregator, &mut state, &permits)
                .await;

            if let Some(success) = aggregator.take_milestone() {
                let claims = self.claims.sizes().await;
                info!(
                    success,
                    processed = aggregator.counters().processed,
                    in_flight = tasks.len(),
                    known_used = claims.used,
                    known_invalid = claims.invalid,
                    elapsed_secs = aggregator.elapsed().as_secs_f64(),
                    "progress"
                );
            }

            if replace
                && state.dispatching
                && !shutdown.is_cancelled()
                && !self.dispatch_fresh(&mut tasks, &permits, &mut aggregator).await
            {
                state.dispatching = false;
            }

            if !state.stopping && !self.config.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.delay) => {}
                    _ = shutdown.cancelled() => {}
                }
            }
        }

        let summary = aggregator.finish(self.claims.sizes().await, state.fatal);
        info!(
            success = summary.counters.success,
            processed = summary.counters.processed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            halted_on_auth = summary.halted_on_auth,
            "submission pool stopped"
        );
        summary
    }

    /// Apply one completion. Returns whether a replacement is wanted.
    async fn complete(
        &mut self,
        completion: Completion,
        aggregator: &mut Aggregator,
        state: &mut RunState,
        permits: &Semaphore,
    ) -> bool {
        let Completion { token, outcome } = completion;
        let Some(outcome) = outcome else {
            debug!(token = %token, "queued submission never started, releasing claim");
            self.claims.release(&token).await;
            return false;
        };

        aggregator.record(outcome);

        let action = disposition(outcome);
        match action {
            Disposition::Halt => {
                self.claims.release(&token).await;
                if !state.fatal {
                    error!(
                        token = %token,
                        "FATAL: credential rejected, stopping all dispatch; update the auth token"
                    );
                }
                state.fatal = true;
                stop(state, permits);
            }
            Disposition::Keep => {
                if let Err(e) = self.ledger.record_success(&token).await {
                    warn!(token = %token, error = %e, "failed to persist success record");
                }
            }
            Disposition::Exclude => {
                self.claims.mark_invalid(&token).await;
                if let Err(e) = self.ledger.record_invalid(&token).await {
                    warn!(token = %token, error = %e, "failed to persist invalid record");
                }
                info!(token = %token, "invalid token recorded");
            }
            Disposition::Release => {
                self.claims.release(&token).await;
                info!(token = %token, outcome = %outcome, "abandoning token");
            }
            Disposition::Drop => {}
        }

        action.replaces() && !state.stopping
    }

    /// Claim a fresh token and hand it to the pool. Returns false when no
    /// unclaimed token could be found.
    async fn dispatch_fresh(
        &mut self,
        tasks: &mut InFlight,
        permits: &Arc<Semaphore>,
        aggregator: &mut Aggregator,
    ) -> bool {
        match self.claim_fresh(aggregator).await {
            Some(token) => {
                aggregator.record_dispatch();
                self.spawn_submission(tasks, permits, token);
                true
            }
            None => {
                error!(
                    attempts = self.config.max_claim_attempts,
                    "could not generate an unclaimed token, no further dispatch"
                );
                false
            }
        }
    }

    /// Generate until a claim succeeds, counting each collision.
    async fn claim_fresh(&mut self, aggregator: &mut Aggregator) -> Option<Token> {
        for _ in 0..self.config.max_claim_attempts {
            let token = self.generator.generate();
            if self.claims.try_claim(&token).await {
                return Some(token);
            }
            debug!(token = %token, "token already used or invalid, regenerating");
            aggregator.record(Outcome::Duplicate);
        }
        None
    }

    fn spawn_submission(
        &self,
        tasks: &mut InFlight,
        permits: &Arc<Semaphore>,
        token: Token,
    ) {
        let permits = Arc::clone(permits);
        let submitter = Arc::clone(&self.submitter);
        let policy = self.config.retry;

        let work = WorkItem::new(token.clone());
        tasks.spawn(token, async move {
            // Closed semaphore: the run is stopping and this task never started
            let Ok(_permit) = permits.acquire_owned().await else {
                return None;
            };

            debug!(token = %work.token, "submission started");
            Some(run_submission(submitter.as_ref(), &policy, work).await)
        });
    }
}

fn stop(state: &mut RunState, permits: &Semaphore) {
    state.stopping = true;
    state.dispatching = false;
    permits.close();
}

//! Outcome counters, progress reporting, final summary

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::claims::ClaimSizes;
use crate::ledger::RecordPaths;
use crate::outcome::Outcome;

/// A progress milestone is raised every time the success count reaches a new
/// multiple of this.
pub const PROGRESS_EVERY: u64 = 10;

/// One named counter per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub success: u64,
    pub auth_error: u64,
    pub invalid_code: u64,
    pub rate_limited_exhausted: u64,
    pub server_error_exhausted: u64,
    pub transport_error_exhausted: u64,
    pub unexpected_error_exhausted: u64,
    pub worker_error: u64,
    /// Claim collisions during generation
    pub duplicate: u64,
    /// Submission tasks that reached an outcome (duplicates excluded)
    pub processed: u64,
    /// Submission tasks handed to the pool
    pub dispatched: u64,
}

impl Counters {
    fn bump(&mut self, outcome: Outcome) {
        let slot = match outcome {
            Outcome::Success => &mut self.success,
            Outcome::AuthError => &mut self.auth_error,
            Outcome::InvalidCode => &mut self.invalid_code,
            Outcome::RateLimitedExhausted => &mut self.rate_limited_exhausted,
            Outcome::ServerErrorExhausted => &mut self.server_error_exhausted,
            Outcome::TransportErrorExhausted => &mut self.transport_error_exhausted,
            Outcome::UnexpectedErrorExhausted => &mut self.unexpected_error_exhausted,
            Outcome::WorkerError => &mut self.worker_error,
            Outcome::Duplicate => &mut self.duplicate,
        };
        *slot += 1;
    }

    /// Tokens given up on without a verdict.
    pub fn abandoned(&self) -> u64 {
        self.rate_limited_exhausted
            + self.server_error_exhausted
            + self.transport_error_exhausted
            + self.unexpected_error_exhausted
            + self.worker_error
    }
}

/// Owned by the scheduler loop, which is the only writer.
#[derive(Debug)]
pub struct Aggregator {
    counters: Counters,
    last_milestone: u64,
    pending_milestone: Option<u64>,
    started: Instant,
    paths: RecordPaths,
}

impl Aggregator {
    pub fn new(paths: RecordPaths) -> Self {
        Self {
            counters: Counters::default(),
            last_milestone: 0,
            pending_milestone: None,
            started: Instant::now(),
            paths,
        }
    }

    /// Count one outcome.
    ///
    /// Raises a milestone when this record pushed the success count onto a
    /// multiple of `PROGRESS_EVERY` for the first time.
    pub fn record(&mut self, outcome: Outcome) {
        self.counters.bump(outcome);
        if outcome != Outcome::Duplicate {
            self.counters.processed += 1;
        }
        metrics::counter!("invite_outcomes_total", "outcome" => outcome.label()).increment(1);

        let success = self.counters.success;
        if outcome == Outcome::Success
            && success % PROGRESS_EVERY == 0
            && success != self.last_milestone
        {
            self.last_milestone = success;
            self.pending_milestone = Some(success);
        }
    }

    /// The milestone raised since the last call, if any.
    pub fn take_milestone(&mut self) -> Option<u64> {
        self.pending_milestone.take()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_dispatch(&mut self) {
        self.counters.dispatched += 1;
        metrics::counter!("invite_dispatched_total").increment(1);
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Close out the run.
    pub fn finish(self, claims: ClaimSizes, halted_on_auth: bool) -> Summary {
        Summary {
            elapsed: self.started.elapsed(),
            counters: self.counters,
            claims,
            paths: self.paths,
            halted_on_auth,
        }
    }
}

/// Final report of a run.
#[derive(Debug, Clone)]
pub struct Summary {
    pub elapsed: Duration,
    pub counters: Counters,
    pub claims: ClaimSizes,
    pub paths: RecordPaths,
    /// The run stopped because the credential was rejected
    pub halted_on_auth: bool,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        writeln!(f, "====== Run stopped ======")?;
        if self.halted_on_auth {
            writeln!(f, "Stopped early: credential rejected (401), update the auth token")?;
        }
        writeln!(f, "Total runtime: {:.2} seconds", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "Success: {}, Invalid: {}, Duplicate: {}, Auth errors: {}",
            c.success, c.invalid_code, c.duplicate, c.auth_error
        )?;
        writeln!(
            f,
            "Gave up: {} (rate limited {}, server errors {}, request errors {}, unexpected errors {}, worker errors {})",
            c.abandoned(),
            c.rate_limited_exhausted,
            c.server_error_exhausted,
            c.transport_error_exhausted,
            c.unexpected_error_exhausted,
            c.worker_error
        )?;
        writeln!(
            f,
            "Total processed: {} (dispatched {})",
            c.processed, c.dispatched
        )?;
        writeln!(
            f,
            "Known used: {}, known invalid: {}",
            self.claims.used, self.claims.invalid
        )?;
        write!(
            f,
            "Success tokens saved to: {}, used tokens saved to: {}, invalid tokens saved to: {}",
            self.paths.success.display(),
            self.paths.used.display(),
            self.paths.invalid.display()
        )
    }
}

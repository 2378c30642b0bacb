use crate::executor::Executor;
use crate::input::Input;
use crate::mutator::MutatorSet;
use crate::oracle::{CrashRecord, Oracle};
use crate::scheduler::{Scheduler, SchedulerError};
use log::{debug, error, info, warn};
use rand_core::RngCore;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Progress is logged this many times over a run.
const PROGRESS_REPORTS_PER_RUN: u64 = 10;

#[derive(Error, Debug)]
pub enum FuzzError {
    #[error("Mutator set is empty, nothing to fuzz with")]
    NoMutators,
    #[error("Scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzerState {
    Running,
    Done,
}

#[derive(Debug, Clone)]
pub struct FuzzerOptions {
    /// Trials to run before the loop reaches `Done`. Zero starts it `Done`.
    pub iterations: u64,
    /// Executor failures in a row before the run is abandoned.
    pub max_consecutive_spawn_failures: u32,
}

impl Default for FuzzerOptions {
    fn default() -> Self {
        Self {
            iterations: crate::config::default_iterations(),
            max_consecutive_spawn_failures: crate::config::default_max_consecutive_spawn_failures(),
        }
    }
}

/// What happened to the trial input of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The target survived; the trial input is the new seed.
    Adopted,
    /// The target crashed or timed out; the seed is unchanged.
    Crashed,
    /// The target could not be run; the seed is unchanged.
    ExecutionFailed,
}

#[derive(Debug, Clone)]
pub struct StepOutcome<I: Input> {
    /// Zero-based index of the iteration that just ran.
    pub iteration: u64,
    /// Name of the mutator whose candidate the scheduler picked.
    pub mutator: &'static str,
    /// The input that was fed to the target.
    pub trial_input: I,
    pub verdict: Verdict,
}

/// Final result of a run.
#[derive(Debug)]
pub struct FuzzReport<I: Input> {
    /// Trials actually run, which is less than requested after an abort.
    pub iterations: u64,
    /// Crashes, timeouts and execution failures, in the order they happened.
    pub crashes: Vec<CrashRecord<I>>,
    /// Set when the run stopped early because the target kept failing to run.
    pub aborted: Option<String>,
    /// The seed the loop ended on.
    pub final_seed: I,
    /// Wall time from `Fuzzer::new` to `Fuzzer::finish`.
    pub elapsed: Duration,
}

impl<I: Input> FuzzReport<I> {
    pub fn has_crashes(&self) -> bool {
        !self.crashes.is_empty()
    }

    /// True only when every iteration ran and none of them crashed.
    pub fn is_success(&self) -> bool {
        !self.has_crashes() && self.aborted.is_none()
    }
}

/// The mutation-and-feedback loop.
///
/// Each step applies every mutator to the current seed, lets the scheduler
/// pick one candidate, runs it and asks the oracle about the result. A
/// surviving candidate replaces the seed; a crashing one is recorded and the
/// seed stays. There is exactly one seed at any time.
pub struct Fuzzer<I, E, O, S, R>
where
    I: Input,
    E: Executor<I>,
    O: Oracle<I>,
    S: Scheduler,
    R: RngCore,
{
    mutators: MutatorSet<I>,
    executor: E,
    oracle: O,
    scheduler: S,
    rng: R,
    options: FuzzerOptions,
    seed: I,
    state: FuzzerState,
    completed: u64,
    crashes: Vec<CrashRecord<I>>,
    consecutive_failures: u32,
    aborted: Option<String>,
    start_time: Instant,
}

impl<I, E, O, S, R> Fuzzer<I, E, O, S, R>
where
    I: Input,
    E: Executor<I>,
    O: Oracle<I>,
    S: Scheduler,
    R: RngCore,
{
    pub fn new(
        mutators: MutatorSet<I>,
        executor: E,
        oracle: O,
        scheduler: S,
        rng: R,
        seed: I,
        options: FuzzerOptions,
    ) -> Result<Self, FuzzError> {
        if mutators.is_empty() {
            return Err(FuzzError::NoMutators);
        }
        let state = if options.iterations == 0 {
            FuzzerState::Done
        } else {
            FuzzerState::Running
        };
        Ok(Self {
            mutators,
            executor,
            oracle,
            scheduler,
            rng,
            options,
            seed,
            state,
            completed: 0,
            crashes: Vec::new(),
            consecutive_failures: 0,
            aborted: None,
            start_time: Instant::now(),
        })
    }

    pub fn state(&self) -> FuzzerState {
        self.state
    }

    pub fn seed(&self) -> &I {
        &self.seed
    }

    pub fn crashes(&self) -> &[CrashRecord<I>] {
        &self.crashes
    }

    pub fn iterations_completed(&self) -> u64 {
        self.completed
    }

    /// Runs one iteration: mutate, pick, execute, examine.
    ///
    /// # Returns
    /// `Result<Option<StepOutcome<I>>, FuzzError>`:
    ///   - `Ok(Some(outcome))`: What happened to this iteration's trial input.
    ///     A crash is also pushed onto [`Fuzzer::crashes`].
    ///   - `Ok(None)`: The run is done. Further calls keep returning `None`.
    ///   - `Err(error)`: The scheduler could not pick a candidate.
    pub fn step(&mut self) -> Result<Option<StepOutcome<I>>, FuzzError> {
        if self.state == FuzzerState::Done {
            return Ok(None);
        }
        let iteration = self.completed;

        let mut candidates = self.mutators.mutate_all(&self.seed, &mut self.rng);
        let chosen = self.scheduler.next(candidates.len(), &mut self.rng)?;
        let candidate = candidates.swap_remove(chosen);
        debug!(
            "Iteration {iteration}: {} produced {} bytes",
            candidate.mutator,
            candidate.input.len()
        );

        let verdict = match self.executor.execute_sync(&candidate.input) {
            Ok(result) => {
                self.consecutive_failures = 0;
                debug!(
                    "Iteration {iteration}: exit {:?} after {:.2?}",
                    result.exit_status(),
                    result.elapsed
                );
                match self.oracle.examine(&candidate.input, &result) {
                    Some(record) => {
                        warn!(
                            "Crash at iteration {iteration} via {}: {}",
                            candidate.mutator, record.kind
                        );
                        self.crashes.push(record);
                        Verdict::Crashed
                    }
                    None => {
                        self.seed = candidate.input.clone();
                        Verdict::Adopted
                    }
                }
            }
            Err(e) => {
                warn!("Trial {iteration} could not run: {e}");
                self.crashes
                    .push(CrashRecord::from_execution_error(candidate.input.clone(), &e));
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.options.max_consecutive_spawn_failures {
                    let reason = format!(
                        "{} consecutive execution failures, last: {e}",
                        self.consecutive_failures
                    );
                    error!("Aborting run: {reason}");
                    self.aborted = Some(reason);
                    self.state = FuzzerState::Done;
                }
                Verdict::ExecutionFailed
            }
        };

        self.completed += 1;
        if self.completed >= self.options.iterations {
            self.state = FuzzerState::Done;
        }
        self.log_progress();

        Ok(Some(StepOutcome {
            iteration,
            mutator: candidate.mutator,
            trial_input: candidate.input,
            verdict,
        }))
    }

    /// Consumes the fuzzer and returns whatever has been collected so far.
    pub fn finish(self) -> FuzzReport<I> {
        let elapsed = self.start_time.elapsed();
        info!(
            "Fuzz loop finished in {elapsed:.2?}: {} iterations, {} crashes",
            self.completed,
            self.crashes.len()
        );
        FuzzReport {
            iterations: self.completed,
            crashes: self.crashes,
            aborted: self.aborted,
            final_seed: self.seed,
            elapsed,
        }
    }

    fn log_progress(&self) {
        let interval = (self.options.iterations / PROGRESS_REPORTS_PER_RUN).max(1);
        if self.completed % interval != 0 && self.state != FuzzerState::Done {
            return;
        }
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let exec_per_sec = if elapsed > 0.0 {
            self.completed as f32 / elapsed
        } else {
            0.0
        };
        info!(
            "Iter: {}/{}, Crashes: {}, Seed: {} bytes, Execs/sec: {:.2}",
            self.completed,
            self.options.iterations,
            self.crashes.len(),
            self.seed.len(),
            exec_per_sec
        );
    }
}

use rand::Rng;
use rand_core::RngCore;
use thiserror::Error;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// No candidates were produced this iteration, so there is nothing to pick.
    #[error("No candidates to schedule")]
    NoCandidates,
}

/// A `Scheduler` picks which of this iteration's mutated candidates is
/// actually executed.
///
/// Swapping the scheduler changes the selection policy without touching the
/// fuzzing loop or the mutators.
pub trait Scheduler {
    /// Returns the index of the chosen candidate.
    ///
    /// # Arguments
    /// * `candidates`: Number of candidates on offer, indexed `0..candidates`.
    /// * `rng`: Random source for schedulers whose policy involves chance.
    fn next(&mut self, candidates: usize, rng: &mut dyn RngCore) -> Result<usize, SchedulerError>;
}

/// Picks one candidate uniformly at random.
#[derive(Default, Debug)]
pub struct RandomScheduler;

impl RandomScheduler {
    pub fn new() -> Self {
        RandomScheduler
    }
}

impl Scheduler for RandomScheduler {
    fn next(&mut self, candidates: usize, rng: &mut dyn RngCore) -> Result<usize, SchedulerError> {
        if candidates == 0 {
            return Err(SchedulerError::NoCandidates);
        }
        Ok(rng.random_range(0..candidates))
    }
}

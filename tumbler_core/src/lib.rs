pub mod config;
pub mod executor;
pub mod fuzzer;
pub mod input;
pub mod mutator;
pub mod oracle;
pub mod platform;
pub mod scheduler;

pub use config::{ConfigError, TumblerConfig};
pub use executor::{
    CommandExecutor, CommandExecutorConfig, ExecutionError, ExecutionStatus, Executor,
    TrialResult,
};
pub use fuzzer::{FuzzError, FuzzReport, Fuzzer, FuzzerOptions, FuzzerState, StepOutcome, Verdict};
pub use input::Input;
pub use mutator::{Candidate, MALFORMED_TAGS, Mutator, MutatorSet};
pub use oracle::{CrashKind, CrashOracle, CrashRecord, Oracle, is_crash};
pub use platform::{Platform, PlatformSetting};
pub use scheduler::{RandomScheduler, Scheduler, SchedulerError};

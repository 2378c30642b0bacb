use crate::executor::{ExecutionError, ExecutionStatus, TrialResult};
use crate::input::Input;
use crate::platform::Platform;
use std::fmt;

/// Exit statuses above this (up to `UNIX_SIGNAL_STATUS_MAX`) follow the
/// shell's "128 + signal" convention: 134 abort, 136 FPE, 139 segfault.
const UNIX_SIGNAL_STATUS_MIN: i64 = 128;
const UNIX_SIGNAL_STATUS_MAX: i64 = 255;
/// Lower bound of the NTSTATUS error range on Windows.
const WINDOWS_NTSTATUS_ERROR: i64 = 0xC000_0000;

/// Decides whether a normalised exit status means the target crashed.
///
/// Any deliberate exit in the 129..=255 range on Unix (say `exit(200)`) is
/// also reported as a crash. Whether such codes are signals cannot be told
/// apart from the status alone.
pub fn is_crash(exit_status: i64, platform: Platform) -> bool {
    if exit_status < 0 {
        return true;
    }
    match platform {
        Platform::Windows => exit_status > WINDOWS_NTSTATUS_ERROR,
        Platform::Unix => {
            exit_status > UNIX_SIGNAL_STATUS_MIN && exit_status <= UNIX_SIGNAL_STATUS_MAX
        }
    }
}

/// Why a trial was recorded as a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashKind {
    /// The target exited with a status the classifier flags.
    AbnormalExit(i64),
    /// The target ran past its time budget and was killed.
    Timeout,
    /// The harness could not run the target at all for this trial.
    ExecutionFailure(String),
}

impl CrashKind {
    pub fn exit_status(&self) -> Option<i64> {
        match self {
            CrashKind::AbnormalExit(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for CrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrashKind::AbnormalExit(code) => write!(f, "abnormal exit (status {code})"),
            CrashKind::Timeout => write!(f, "timeout"),
            CrashKind::ExecutionFailure(reason) => write!(f, "execution failure: {reason}"),
        }
    }
}

/// A trial that ended in a crash, kept for the final report.
#[derive(Debug, Clone)]
pub struct CrashRecord<I: Input> {
    /// The input that triggered the crash.
    pub input: I,
    /// Abnormal exit status, timeout, or why the target could not run.
    pub kind: CrashKind,
    /// Combined stdout/stderr of the trial. Empty when the target never ran.
    pub output: Vec<u8>,
    /// MD5 of the input in lowercase hex, for telling reports apart.
    pub input_hash: String,
}

impl<I: Input> CrashRecord<I> {
    pub fn new(input: I, kind: CrashKind, output: Vec<u8>) -> Self {
        let input_hash = format!("{:x}", md5::compute(input.as_bytes()));
        Self {
            input,
            kind,
            output,
            input_hash,
        }
    }

    /// Records a trial the executor could not complete.
    pub fn from_execution_error(input: I, error: &ExecutionError) -> Self {
        Self::new(input, CrashKind::ExecutionFailure(error.to_string()), Vec::new())
    }
}

/// An `Oracle` looks at the outcome of a trial and decides whether it is a bug.
pub trait Oracle<I: Input> {
    /// Judges one trial.
    ///
    /// # Arguments
    /// * `input`: The input the target was run with. Cloned into the record.
    /// * `result`: Status and merged output of that run.
    ///
    /// # Returns
    /// `Option<CrashRecord<I>>`:
    ///   - `Some(record)`: The trial crashed or timed out.
    ///   - `None`: The target survived and the input may become the next seed.
    fn examine(&self, input: &I, result: &TrialResult) -> Option<CrashRecord<I>>;
}

/// Flags abnormal exits per [`is_crash`] and every timeout.
#[derive(Debug, Clone, Copy)]
pub struct CrashOracle {
    platform: Platform,
}

impl CrashOracle {
    pub fn new(platform: Platform) -> Self {
        CrashOracle { platform }
    }
}

impl<I: Input> Oracle<I> for CrashOracle {
    fn examine(&self, input: &I, result: &TrialResult) -> Option<CrashRecord<I>> {
        let kind = match result.status {
            ExecutionStatus::Exited(code) if is_crash(code, self.platform) => {
                CrashKind::AbnormalExit(code)
            }
            ExecutionStatus::Exited(_) => return None,
            ExecutionStatus::Timeout => CrashKind::Timeout,
        };
        Some(CrashRecord::new(input.clone(), kind, result.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn trial(status: ExecutionStatus, output: &[u8]) -> TrialResult {
        TrialResult {
            status,
            output: output.to_vec(),
            input_delivered: true,
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn unix_classification() {
        let unix = Platform::Unix;
        assert!(is_crash(134, unix));
        assert!(is_crash(136, unix));
        assert!(is_crash(139, unix));
        assert!(is_crash(-1, unix));
        assert!(is_crash(255, unix));
        assert!(!is_crash(0, unix));
        assert!(!is_crash(1, unix));
        assert!(!is_crash(128, unix));
        assert!(!is_crash(256, unix));
    }

    #[test]
    fn windows_classification() {
        let windows = Platform::Windows;
        assert!(is_crash(0xC000_0001, windows));
        assert!(is_crash(0xC000_0005, windows));
        assert!(is_crash(-1, windows));
        assert!(!is_crash(0xC000_0000, windows));
        assert!(!is_crash(0, windows));
        assert!(!is_crash(139, windows));
    }

    #[test]
    fn crash_oracle_reports_abnormal_exit() {
        let oracle = CrashOracle::new(Platform::Unix);
        let input: Vec<u8> = b"<tag attr=>".to_vec();
        let report = oracle
            .examine(&input, &trial(ExecutionStatus::Exited(139), b"Segmentation fault"))
            .expect("139 is a crash on unix");
        assert_eq!(report.input, input);
        assert_eq!(report.kind, CrashKind::AbnormalExit(139));
        assert_eq!(report.kind.exit_status(), Some(139));
        assert_eq!(report.output, b"Segmentation fault");
        assert_eq!(report.input_hash, format!("{:x}", md5::compute(&input)));
    }

    #[test]
    fn crash_oracle_ignores_clean_and_error_exits() {
        let oracle = CrashOracle::new(Platform::Unix);
        let input: Vec<u8> = b"ok".to_vec();
        let ok: Option<CrashRecord<Vec<u8>>> =
            oracle.examine(&input, &trial(ExecutionStatus::Exited(0), b""));
        let failed: Option<CrashRecord<Vec<u8>>> =
            oracle.examine(&input, &trial(ExecutionStatus::Exited(1), b"parse error"));
        assert!(ok.is_none());
        assert!(failed.is_none());
    }

    #[test]
    fn crash_oracle_reports_timeout() {
        let oracle = CrashOracle::new(Platform::Windows);
        let input: Vec<u8> = b"<<tag>>".to_vec();
        let report = oracle
            .examine(&input, &trial(ExecutionStatus::Timeout, b"partial"))
            .expect("timeouts are crash-equivalent");
        assert_eq!(report.kind, CrashKind::Timeout);
        assert_eq!(report.kind.exit_status(), None);
    }

    #[test]
    fn execution_failure_record_has_no_output() {
        let error = ExecutionError::Wait(std::io::Error::from(std::io::ErrorKind::Interrupted));
        let record = CrashRecord::from_execution_error(b"x".to_vec(), &error);
        assert!(record.output.is_empty());
        assert!(matches!(record.kind, CrashKind::ExecutionFailure(ref msg) if msg.contains("waiting")));
    }
}

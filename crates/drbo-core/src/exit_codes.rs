//! Exit codes for the `drbo` CLI.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: user errors (fix the arguments or the config)
//! - 20-29: run failures (numerical breakdown, disk, bugs)

use drbo_common::{Error, ErrorCategory};
use drbo_config::ValidationError;

/// Exit codes for drbo commands. Stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed.
    Clean = 0,

    /// Invalid arguments or input shapes.
    ArgsError = 10,

    /// Config file missing, unparsable or semantically invalid.
    ConfigError = 11,

    /// Stored run not found.
    RunNotFound = 12,

    /// Numerical failure inside the run (e.g. non-positive-definite covariance).
    NumericalError = 20,

    /// I/O or serialization error.
    IoError = 21,

    /// Internal error (bug - please report).
    InternalError = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Codes 10-19: resolvable by changing inputs.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::RunNotFound => "ERR_RUN_NOT_FOUND",
            ExitCode::NumericalError => "ERR_NUMERICAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Input => ExitCode::ArgsError,
            ErrorCategory::Numerical => ExitCode::NumericalError,
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Store => ExitCode::RunNotFound,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<&ValidationError> for ExitCode {
    fn from(_: &ValidationError) -> Self {
        ExitCode::ConfigError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(!ExitCode::Clean.is_error());
        assert!(ExitCode::ConfigError.is_user_error());
        assert!(ExitCode::RunNotFound.is_user_error());
        assert!(!ExitCode::NumericalError.is_user_error());
        assert!(ExitCode::InternalError.is_error());
    }

    #[test]
    fn test_from_error() {
        let e = Error::NumericalInstability("cholesky".into());
        assert_eq!(ExitCode::from(&e), ExitCode::NumericalError);
        let e = Error::shape("x", 2, 3);
        assert_eq!(ExitCode::from(&e), ExitCode::ArgsError);
        let e = Error::RunNotFound { run_id: "x".into() };
        assert_eq!(ExitCode::from(&e).as_i32(), 12);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::IoError.to_string(), "ERR_IO (21)");
    }
}

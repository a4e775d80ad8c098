//! Exit codes for the driftwatch CLI.
//!
//! Schedulers only distinguish success from failure, so every failure
//! (configuration or pipeline) shares one code.

/// Exit codes for driftwatch commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed; its result was printed to stdout.
    Clean = 0,

    /// Configuration validation or any pipeline stage failed.
    Failed = 1,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl<T, E> From<&Result<T, E>> for ExitCode {
    fn from(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            ExitCode::Clean
        } else {
            ExitCode::Failed
        }
    }
}

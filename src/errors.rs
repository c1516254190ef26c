//! Domain error kinds. Every fallible boundary a caller must branch on
//! (exit-code mapping, `--on-error`, `ListResult.errors`) returns one of
//! these rather than an opaque `anyhow::Error`; application glue above the
//! engine still uses `anyhow::Result` for ergonomic `?`-propagation with
//! added context.

use thiserror::Error;

/// Maximum combined stdout+stderr length kept verbatim in a formatted
/// `ProcessError`; longer output is elided in the middle.
const MAX_PROCESS_OUTPUT_CHARS: usize = 8000;
const PROCESS_OUTPUT_HEAD_TAIL_CHARS: usize = 4000;

fn format_process_output(stdout: &str, stderr: &str) -> String {
    let combined = format!("{stdout}\n{stderr}");
    if combined.chars().count() <= MAX_PROCESS_OUTPUT_CHARS {
        combined
    } else {
        let chars: Vec<char> = combined.chars().collect();
        let head: String = chars[..PROCESS_OUTPUT_HEAD_TAIL_CHARS].iter().collect();
        let tail: String = chars[chars.len() - PROCESS_OUTPUT_HEAD_TAIL_CHARS..]
            .iter()
            .collect();
        format!("{head}\n... OUTPUT TRUNCATED ...\n{tail}")
    }
}

#[derive(Debug, Error)]
pub enum MngError {
    #[error("{0}")]
    UserInput(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("provider error ({provider}): {message}")]
    ProviderError { provider: String, message: String },

    #[error("command failed with exit code {returncode:?}. command=`{}`\noutput:\n{}",
        command.join(" "), format_process_output(stdout, stderr))]
    ProcessError {
        command: Vec<String>,
        stdout: String,
        stderr: String,
        returncode: Option<i32>,
    },

    #[error("command timed out. command=`{}`", command.join(" "))]
    ProcessTimeout { command: Vec<String> },

    #[error("command failed to start: {command}")]
    ProcessSetup { command: String, source: String },

    #[error("{0} error(s) occurred: {1:?}")]
    ConcurrencyExceptionGroup(usize, Vec<String>),

    #[error("plugin '{plugin}' error: {message}")]
    Plugin { plugin: String, message: String },

    #[error("required binary '{binary}' is not installed. {hint}")]
    BinaryNotInstalled { binary: String, hint: String },

    #[error("operation requires the host lock, which is not held")]
    LockNotHeld,

    #[error(transparent)]
    DialogDetected(#[from] crate::agent::readiness::DialogDetectedError),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MngError {
    /// Maps this error to the process exit code the CLI entrypoint should
    /// return (0 success handled by callers, 1 general error, 2 bad CLI
    /// usage, 130 cancellation).
    pub fn exit_code(&self) -> i32 {
        match self {
            MngError::UserInput(_) => 2,
            MngError::Cancelled => 130,
            _ => 1,
        }
    }
}

pub type MngResult<T> = Result<T, MngError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_maps_to_exit_2() {
        let e = MngError::UserInput("bad flag".into());
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn process_error_truncates_long_output() {
        let stdout = "a".repeat(10_000);
        let e = MngError::ProcessError {
            command: vec!["rsync".into()],
            stdout,
            stderr: String::new(),
            returncode: Some(1),
        };
        let msg = e.to_string();
        assert!(msg.contains("OUTPUT TRUNCATED"));
    }

    #[test]
    fn process_error_keeps_short_output_verbatim() {
        let e = MngError::ProcessError {
            command: vec!["git".into(), "status".into()],
            stdout: "clean".into(),
            stderr: String::new(),
            returncode: Some(0),
        };
        assert!(!e.to_string().contains("TRUNCATED"));
        assert!(e.to_string().contains("clean"));
    }
}

//! `run_process_to_completion`: spawn a child process registered with a
//! concurrency group, so group cancellation kills the child too.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::concurrency::ConcurrencyGroup;
use crate::errors::MngError;

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `command` to completion inside `group`: the child is killed if the
/// group is cancelled or the call times out. Raises `ProcessError` with
/// captured stdout/stderr on a non-zero exit (unless `is_checked_after` is
/// false), `ProcessTimeout` on timeout, `ProcessSetup` if spawn fails.
pub async fn run_process_to_completion(
    group: &ConcurrencyGroup,
    command: &[&str],
    timeout: Duration,
    cwd: Option<&Path>,
    env: Option<&[(&str, &str)]>,
    is_checked_after: bool,
) -> Result<ProcessOutput, MngError> {
    let Some((program, args)) = command.split_first() else {
        return Err(MngError::UserInput("empty command".into()));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    if let Some(env) = env {
        for (k, v) in env {
            cmd.env(k, v);
        }
    }

    let mut child = cmd.spawn().map_err(|e| MngError::ProcessSetup {
        command: command.join(" "),
        source: e.to_string(),
    })?;

    let cancelled = group.handle();
    let wait = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            let _ = out.read_to_string(&mut stdout).await;
        }
        if let Some(mut err) = child.stderr.take() {
            let _ = err.read_to_string(&mut stderr).await;
        }
        let status = child.wait().await;
        (status, stdout, stderr)
    };

    let outcome = tokio::select! {
        result = tokio::time::timeout(timeout, wait) => result,
        () = cancelled.token.cancelled() => {
            let _ = child.start_kill();
            return Err(MngError::Cancelled);
        }
    };

    let Ok((status, stdout, stderr)) = outcome else {
        return Err(MngError::ProcessTimeout {
            command: command.iter().map(|s| s.to_string()).collect(),
        });
    };

    let status = status.map_err(|e| MngError::ProcessSetup {
        command: command.join(" "),
        source: e.to_string(),
    })?;

    let returncode = status.code().unwrap_or(-1);

    if is_checked_after && returncode != 0 {
        return Err(MngError::ProcessError {
            command: command.iter().map(|s| s.to_string()).collect(),
            stdout,
            stderr,
            returncode: Some(returncode),
        });
    }

    Ok(ProcessOutput {
        returncode,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        let out = run_process_to_completion(
            &group,
            &["echo", "hello"],
            Duration::from_secs(5),
            None,
            None,
            true,
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.returncode, 0);
    }

    #[tokio::test]
    async fn nonzero_exit_raises_process_error_when_checked() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        let result = run_process_to_completion(
            &group,
            &["sh", "-c", "exit 3"],
            Duration::from_secs(5),
            None,
            None,
            true,
        )
        .await;
        assert!(matches!(result, Err(MngError::ProcessError { returncode: Some(3), .. })));
    }

    #[tokio::test]
    async fn nonzero_exit_is_ok_when_unchecked() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        let result = run_process_to_completion(
            &group,
            &["sh", "-c", "exit 3"],
            Duration::from_secs(5),
            None,
            None,
            false,
        )
        .await
        .unwrap();
        assert_eq!(result.returncode, 3);
    }

    #[tokio::test]
    async fn timeout_raises_process_timeout() {
        let group = ConcurrencyGroup::make("test", Duration::from_secs(5));
        let result = run_process_to_completion(
            &group,
            &["sleep", "5"],
            Duration::from_millis(50),
            None,
            None,
            true,
        )
        .await;
        assert!(matches!(result, Err(MngError::ProcessTimeout { .. })));
    }
}

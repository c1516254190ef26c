//! Readiness and dialog detection: agent-type plugins supply pattern sets
//! describing what "ready for input" and "blocked on a confirmation
//! dialog" look like in a captured tmux pane — these markers live in
//! plugin data, never hardcoded here. The polling loop itself
//! (`wait_for`) is generic over any condition.

use std::time::Duration;

use regex::RegexSet;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::errors::MngError;

/// A compiled set of regexes an agent-type plugin uses to recognize
/// readiness and blocking-dialog states in captured pane content.
#[derive(Debug, Clone)]
pub struct ReadinessCondition {
    ready_patterns: RegexSet,
    dialog_patterns: RegexSet,
}

impl ReadinessCondition {
    pub fn new<I, J>(ready_patterns: I, dialog_patterns: J) -> Result<Self, regex::Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Ok(Self {
            ready_patterns: RegexSet::new(ready_patterns)?,
            dialog_patterns: RegexSet::new(dialog_patterns)?,
        })
    }

    pub fn is_ready(&self, pane_content: &str) -> bool {
        let tail = last_lines(pane_content, 10);
        self.ready_patterns.is_match(&tail)
    }

    pub fn is_dialog(&self, pane_content: &str) -> bool {
        let tail = last_lines(pane_content, 10);
        self.dialog_patterns.is_match(&tail)
    }
}

fn last_lines(content: &str, n: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[derive(Debug, Error)]
pub enum DialogDetectedError {
    #[error("agent pane shows a blocking confirmation dialog, refusing to send a message")]
    Blocked,
}

/// Poll `check` (typically a tmux pane capture + pattern match) on a
/// backoff schedule until it returns `true`, the timeout elapses, or the
/// concurrency group's token is cancelled.
pub async fn wait_for<F, Fut>(
    mut check: F,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), MngError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(MngError::PreconditionFailed(
                "timed out waiting for readiness condition".into(),
            ));
        }
        tokio::select! {
            () = tokio::time::sleep(poll_interval) => {}
            () = cancel.cancelled() => return Err(MngError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_condition() -> ReadinessCondition {
        ReadinessCondition::new(
            [r"^>\s*$", r"^Human:\s*$"],
            [r"(?i)do you want to proceed", r"(?i)allow this (tool|command)"],
        )
        .unwrap()
    }

    #[test]
    fn detects_ready_prompt_in_tail() {
        let cond = sample_condition();
        assert!(cond.is_ready("some output\nmore output\n> "));
        assert!(!cond.is_ready("still thinking...\n"));
    }

    #[test]
    fn detects_confirmation_dialog() {
        let cond = sample_condition();
        assert!(cond.is_dialog("Do you want to proceed? [y/n]"));
        assert!(!cond.is_dialog("all good here"));
    }

    #[tokio::test]
    async fn wait_for_resolves_once_condition_true() {
        let token = CancellationToken::new();
        let mut calls = 0;
        let result = wait_for(
            || {
                calls += 1;
                let ready = calls >= 3;
                async move { ready }
            },
            Duration::from_secs(1),
            Duration::from_millis(1),
            &token,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_for_times_out() {
        let token = CancellationToken::new();
        let result = wait_for(
            || async { false },
            Duration::from_millis(20),
            Duration::from_millis(5),
            &token,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wait_for_respects_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = wait_for(
            || async { false },
            Duration::from_secs(5),
            Duration::from_millis(5),
            &token,
        )
        .await;
        assert!(matches!(result, Err(MngError::Cancelled)));
    }
}

//! Test doubles for exercising the stack lifecycle without docker.
//!
//! Enabled with the `test-utils` feature.

use crate::compose::{CommandRunner, ComposeAction, ComposeCommand, ExitOutcome};
use crate::readiness::HealthCheck;
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

/// Command runner that records every command and returns scripted exit codes.
#[derive(Debug)]
pub struct ScriptedRunner {
    up_code: Option<i32>,
    down_code: Option<i32>,
    spawn_fails: bool,
    calls: Mutex<Vec<ComposeCommand>>,
}

impl ScriptedRunner {
    /// Every command exits 0.
    pub fn succeeding() -> Self {
        Self::with_codes(Some(0), Some(0))
    }

    /// `up` exits with `code`; `down` exits 0.
    pub fn failing_up(code: i32) -> Self {
        Self::with_codes(Some(code), Some(0))
    }

    /// `up` exits 0; `down` exits with `code`.
    pub fn failing_down(code: i32) -> Self {
        Self::with_codes(Some(0), Some(code))
    }

    /// No command can be spawned.
    pub fn unspawnable() -> Self {
        Self {
            spawn_fails: true,
            ..Self::succeeding()
        }
    }

    /// Exit codes per action; `None` simulates termination by a signal.
    pub fn with_codes(up_code: Option<i32>, down_code: Option<i32>) -> Self {
        Self {
            up_code,
            down_code,
            spawn_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// All commands run so far, in order.
    pub fn calls(&self) -> Vec<ComposeCommand> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of commands run for `action`.
    pub fn count(&self, action: ComposeAction) -> usize {
        self.calls()
            .iter()
            .filter(|cmd| cmd.action() == action)
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &ComposeCommand) -> io::Result<ExitOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command.clone());

        if self.spawn_fails {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: command not found", command.program()),
            ));
        }

        let code = match command.action() {
            ComposeAction::Up => self.up_code,
            ComposeAction::Down => self.down_code,
        };
        Ok(ExitOutcome { code })
    }
}

/// Health check that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct ScriptedHealthCheck {
    target: String,
    failures_before_ready: Option<usize>,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
}

impl ScriptedHealthCheck {
    /// Not ready for the first `failures` attempts, ready afterwards.
    pub fn ready_after(target: impl Into<String>, failures: usize) -> Self {
        Self::new(target, Some(failures))
    }

    /// Never ready.
    pub fn never_ready(target: impl Into<String>) -> Self {
        Self::new(target, None)
    }

    fn new(target: impl Into<String>, failures_before_ready: Option<usize>) -> Self {
        Self {
            target: target.into(),
            failures_before_ready,
            attempts: AtomicUsize::new(0),
            attempt_times: Mutex::new(Vec::new()),
        }
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Instant of each attempt, on the tokio clock.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl HealthCheck for ScriptedHealthCheck {
    fn target(&self) -> &str {
        &self.target
    }

    async fn is_ready(&self) -> bool {
        self.attempt_times
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Instant::now());
        let previous = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.failures_before_ready
            .is_some_and(|failures| previous >= failures)
    }
}

//! Stack lifecycle fixture.
//!
//! `ComposeStack` owns a running compose stack for the duration of a test
//! session. It is created by starting the stack and waiting for the health
//! endpoint, hands out a `StackHandle` to dependent tests, and tears the
//! stack down exactly once: through `shutdown`, or from `Drop` if the guard
//! goes out of scope first.

use crate::compose::{CommandRunner, ComposeCommand, ExitOutcome};
use crate::config::{ConfigError, StackConfig};
use crate::project::find_project_root;
use crate::readiness::{wait_for_ready, HealthCheck, HttpHealthCheck, ReadinessError};
use std::any::Any;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Stack lifecycle errors. All of them are fatal to the session.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Docker Compose failed with return code {}", describe_code(.code))]
    StartFailed { code: Option<i32> },

    #[error("Docker Compose teardown failed with return code {}", describe_code(.code))]
    TeardownFailed { code: Option<i32> },

    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("No directory containing {marker} found above {}", .start.display())]
    ProjectRootNotFound { start: PathBuf, marker: String },

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error("{readiness}; teardown also failed: {teardown}")]
    ReadinessAndTeardown {
        readiness: ReadinessError,
        teardown: Box<StackError>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    Task(String),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Connection descriptor for a running stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackHandle {
    port: u16,
}

impl StackHandle {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Host port the application is reachable on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Health endpoint polled for readiness.
    pub fn health_url(&self) -> String {
        format!("http://localhost:{}/health/", self.port)
    }

    /// Application base URL for dependent tests.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }
}

/// Locate the project root by walking upward from `start` to the directory
/// holding the base compose file.
pub fn locate_project_root(config: &StackConfig, start: &Path) -> Result<PathBuf, StackError> {
    let marker = &config.compose_files.base;
    find_project_root(start, marker).ok_or_else(|| StackError::ProjectRootNotFound {
        start: start.to_path_buf(),
        marker: marker.clone(),
    })
}

/// Guard over a started stack.
pub struct ComposeStack {
    handle: Arc<StackHandle>,
    down: ComposeCommand,
    runner: Arc<dyn CommandRunner>,
    torn_down: bool,
}

impl ComposeStack {
    /// Start the stack and block until its health endpoint reports ready.
    ///
    /// Fails without tearing anything down if `up` itself fails. If the stack
    /// starts but never becomes ready, it is torn down before returning.
    pub async fn start(
        config: &StackConfig,
        project_root: &Path,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, StackError> {
        let health_url = StackHandle::new(config.port).health_url();
        let check = HttpHealthCheck::new(health_url, &config.readiness)?;
        Self::start_with_check(config, project_root, runner, &check).await
    }

    /// Start the stack, using `check` as the readiness check.
    pub async fn start_with_check<P>(
        config: &StackConfig,
        project_root: &Path,
        runner: Arc<dyn CommandRunner>,
        check: &P,
    ) -> Result<Self, StackError>
    where
        P: HealthCheck + ?Sized,
    {
        let up = ComposeCommand::up(&config.compose_bin, &config.compose_files, project_root);
        tracing::info!(command = %up, "Starting Docker Compose");

        let outcome = run_blocking(Arc::clone(&runner), up).await?;
        if !outcome.success() {
            tracing::error!(code = ?outcome.code, "Docker Compose failed to start the stack");
            return Err(StackError::StartFailed { code: outcome.code });
        }

        let mut stack = Self {
            handle: Arc::new(StackHandle::new(config.port)),
            down: ComposeCommand::down(&config.compose_bin, &config.compose_files, project_root),
            runner,
            torn_down: false,
        };

        if let Err(readiness) = wait_for_ready(check, &config.readiness).await {
            return Err(match stack.teardown().await {
                Ok(()) => readiness.into(),
                Err(teardown) => {
                    tracing::error!(error = %teardown, "Teardown after failed readiness check also failed");
                    StackError::ReadinessAndTeardown {
                        readiness,
                        teardown: Box::new(teardown),
                    }
                }
            });
        }

        tracing::info!(port = stack.handle.port(), "Stack is ready");
        Ok(stack)
    }

    /// Shared handle for dependent tests.
    pub fn handle(&self) -> Arc<StackHandle> {
        Arc::clone(&self.handle)
    }

    /// Run `body` against the stack, then tear the stack down regardless of
    /// how `body` ended.
    ///
    /// A panic in `body` is resumed after teardown. A teardown failure is
    /// returned when `body` completed; when `body` panicked, the teardown
    /// failure is appended to the resumed panic message.
    pub async fn run<F, Fut, T>(self, body: F) -> Result<T, StackError>
    where
        F: FnOnce(Arc<StackHandle>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let outcome = tokio::spawn(body(self.handle())).await;
        let teardown = self.shutdown().await;

        match outcome {
            Ok(value) => {
                teardown?;
                Ok(value)
            }
            Err(join_error) if join_error.is_panic() => {
                let payload = join_error.into_panic();
                match teardown {
                    Ok(()) => std::panic::resume_unwind(payload),
                    Err(e) => {
                        tracing::error!(error = %e, "Teardown failed after session body panicked");
                        let message = format!(
                            "{}; teardown also failed: {}",
                            panic_message(payload.as_ref()),
                            e
                        );
                        std::panic::resume_unwind(Box::new(message))
                    }
                }
            }
            Err(join_error) => {
                let message = match teardown {
                    Ok(()) => join_error.to_string(),
                    Err(e) => format!("{}; teardown also failed: {}", join_error, e),
                };
                Err(StackError::Task(message))
            }
        }
    }

    /// Tear the stack down, surfacing a non-zero exit as an error.
    pub async fn shutdown(mut self) -> Result<(), StackError> {
        self.teardown().await
    }

    async fn teardown(&mut self) -> Result<(), StackError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        tracing::info!(command = %self.down, "Cleaning up Docker Compose stack");
        let outcome = run_blocking(Arc::clone(&self.runner), self.down.clone()).await?;
        check_teardown(outcome)
    }
}

/// Fallback teardown. `down` runs synchronously here, so async callers
/// should prefer `shutdown` or `run`; on a multi-thread runtime the call is
/// moved off the worker with `block_in_place`, on a current-thread runtime it
/// blocks the runtime until `down` exits.
impl Drop for ComposeStack {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        tracing::warn!(command = %self.down, "Stack dropped without shutdown, tearing down synchronously");
        let run_down = || self.runner.run(&self.down);
        let on_worker = Handle::try_current()
            .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        let result = if on_worker {
            tokio::task::block_in_place(run_down)
        } else {
            run_down()
        };

        let result = result
            .map_err(|source| StackError::Spawn {
                command: self.down.to_string(),
                source,
            })
            .and_then(check_teardown);

        if let Err(e) = result {
            tracing::error!(error = %e, "Teardown from drop failed");
        }
    }
}

/// Text of a panic payload, for `panic!` with a literal or a formatted message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "session body panicked".to_string()
    }
}

fn check_teardown(outcome: ExitOutcome) -> Result<(), StackError> {
    if outcome.success() {
        Ok(())
    } else {
        Err(StackError::TeardownFailed { code: outcome.code })
    }
}

async fn run_blocking(
    runner: Arc<dyn CommandRunner>,
    command: ComposeCommand,
) -> Result<ExitOutcome, StackError> {
    let rendered = command.to_string();
    tokio::task::spawn_blocking(move || runner.run(&command))
        .await
        .map_err(|e| StackError::Task(e.to_string()))?
        .map_err(|source| StackError::Spawn {
            command: rendered,
            source,
        })
}

/// Start a stack, run `body` with its handle, and tear the stack down.
///
/// This is the whole session lifecycle: start, wait for readiness, body,
/// unconditional teardown.
pub async fn run_session<F, Fut, T>(
    config: &StackConfig,
    project_root: &Path,
    runner: Arc<dyn CommandRunner>,
    body: F,
) -> Result<T, StackError>
where
    F: FnOnce(Arc<StackHandle>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    ComposeStack::start(config, project_root, runner)
        .await?
        .run(body)
        .await
}

//! Compose command construction and execution.
//!
//! `ComposeCommand` describes one invocation of the orchestration tool.
//! `CommandRunner` executes it; `ProcessRunner` is the real implementation
//! that streams the child's output line by line as it arrives.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

use crate::config::{DEFAULT_COMPOSE_FILE_BASE, DEFAULT_COMPOSE_FILE_OVERRIDE};

/// Base and override stack definitions, applied in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeFiles {
    pub base: String,
    pub override_file: String,
}

impl ComposeFiles {
    pub fn new(base: impl Into<String>, override_file: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            override_file: override_file.into(),
        }
    }

    /// `-f <base> -f <override>` arguments.
    fn file_args(&self) -> Vec<String> {
        vec![
            "-f".to_string(),
            self.base.clone(),
            "-f".to_string(),
            self.override_file.clone(),
        ]
    }
}

impl Default for ComposeFiles {
    fn default() -> Self {
        Self::new(DEFAULT_COMPOSE_FILE_BASE, DEFAULT_COMPOSE_FILE_OVERRIDE)
    }
}

/// Lifecycle action a compose command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    /// `up --build --wait`
    Up,
    /// `down`
    Down,
}

/// A single orchestration invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    action: ComposeAction,
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl ComposeCommand {
    /// Build and start all services, blocking until compose reports them healthy.
    pub fn up(program: &str, files: &ComposeFiles, working_dir: &Path) -> Self {
        Self::new(
            ComposeAction::Up,
            program,
            files,
            &["up", "--build", "--wait"],
            working_dir,
        )
    }

    /// Stop and remove all services.
    pub fn down(program: &str, files: &ComposeFiles, working_dir: &Path) -> Self {
        Self::new(ComposeAction::Down, program, files, &["down"], working_dir)
    }

    fn new(
        action: ComposeAction,
        program: &str,
        files: &ComposeFiles,
        subcommand: &[&str],
        working_dir: &Path,
    ) -> Self {
        let mut args = vec!["compose".to_string()];
        args.extend(files.file_args());
        args.extend(subcommand.iter().map(|s| s.to_string()));

        Self {
            action,
            program: program.to_string(),
            args,
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn action(&self) -> ComposeAction {
        self.action
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Executes compose commands to completion.
///
/// Implementations block the calling thread. Async callers go through
/// `tokio::task::spawn_blocking`.
pub trait CommandRunner: Send + Sync {
    /// Run `command`, returning its exit status.
    ///
    /// `Err` means the process could not be run at all; a non-zero exit is
    /// reported through `ExitOutcome`.
    fn run(&self, command: &ComposeCommand) -> io::Result<ExitOutcome>;
}

/// Runs commands as child processes, logging their output as it arrives.
///
/// stdout and stderr are merged into one stream: each pipe has a reader
/// thread feeding a shared channel, and lines are logged in the order they
/// reach it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &ComposeCommand) -> io::Result<ExitOutcome> {
        run_with_output(command, |line| {
            tracing::info!(target: "stack_fixture::compose::output", "{}", line);
        })
    }
}

/// Run `command` to completion, passing each output line to `on_line`.
fn run_with_output<F>(command: &ComposeCommand, mut on_line: F) -> io::Result<ExitOutcome>
where
    F: FnMut(&str),
{
    tracing::info!(command = %command, cwd = %command.working_dir().display(), "Running compose command");

    let mut child = Command::new(command.program())
        .args(command.args())
        .current_dir(command.working_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        readers.push(thread::spawn(move || forward_lines(stdout, &tx)));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        readers.push(thread::spawn(move || forward_lines(stderr, &tx)));
    }
    // Channel closes once both readers hit EOF
    drop(tx);

    for line in rx {
        on_line(&line);
    }

    for reader in readers {
        if reader.join().is_err() {
            tracing::warn!(command = %command, "Output reader thread panicked");
        }
    }

    let outcome = ExitOutcome::from(child.wait()?);
    tracing::info!(command = %command, code = ?outcome.code, "Compose command finished");
    Ok(outcome)
}

/// Send each non-empty line of `reader` until EOF. Invalid UTF-8 is replaced, not fatal.
fn forward_lines<R: Read>(reader: R, tx: &Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim().to_string();
                if !line.is_empty() && tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read compose output");
                break;
            }
        }
    }
}

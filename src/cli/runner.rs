// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Subprocess execution runner for the batch-mode CAD application
//!
//! One call to [`Runner::run`] launches the application once against one
//! design file, bounded by a timeout, inside a private scratch directory.
//! The outcome is returned as data; nothing here interprets the output.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::process::{CancelToken, ProcessGuard, POLL_INTERVAL};

/// Grace period between SIGTERM and SIGKILL
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How long to wait for pipe readers once the child has exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// File name used for `{output}` inside the scratch directory
const OUTPUT_FILE: &str = "result.json";

/// Result of one external invocation
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Exit status 0; raw bytes of the output file, or stdout if none was written
    Success(Vec<u8>),
    /// Ran to completion but signalled failure (`code` is `None` when killed by a signal)
    NonZeroExit { code: Option<i32>, stderr: String },
    /// Exceeded the deadline; the process tree was terminated
    Timeout(Duration),
    /// Could not be started
    LaunchFailure(String),
    /// The suite was cancelled while the process ran
    Cancelled(Duration),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    /// Human-readable description of a non-success outcome
    pub fn describe(&self) -> String {
        match self {
            RunOutcome::Success(bytes) => format!("completed ({} bytes of output)", bytes.len()),
            RunOutcome::NonZeroExit { code, stderr } => {
                let status = match code {
                    Some(code) => format!("exited with status {}", code),
                    None => "terminated by signal".to_string(),
                };
                let tail = stderr_tail(stderr, 5);
                if tail.is_empty() {
                    status
                } else {
                    format!("{}: {}", status, tail)
                }
            }
            RunOutcome::Timeout(elapsed) => {
                format!("timed out after {:.1}s", elapsed.as_secs_f64())
            }
            RunOutcome::LaunchFailure(reason) => format!("launch failure: {}", reason),
            RunOutcome::Cancelled(elapsed) => {
                format!("cancelled after {:.1}s", elapsed.as_secs_f64())
            }
        }
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let all: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join(" | ")
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("command template must reference `{{input}}`")]
    MissingInput,
    #[error("command template contains unknown placeholder in `{0}`")]
    UnknownPlaceholder(String),
}

/// Argument template for the CAD invocation.
///
/// Placeholders: `{macro}`, `{input}`, `{output}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CommandTemplate {
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if !args.iter().any(|a| a.contains("{input}")) {
            return Err(TemplateError::MissingInput);
        }
        for arg in &args {
            let stripped = arg
                .replace("{macro}", "")
                .replace("{input}", "")
                .replace("{output}", "");
            if stripped.contains('{') && stripped.contains('}') {
                return Err(TemplateError::UnknownPlaceholder(arg.clone()));
            }
        }
        Ok(Self { args })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn render(&self, macro_path: &Path, input: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{macro}", &macro_path.to_string_lossy())
                    .replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            args: ["--script", "{macro}", "{input}", "--out", "{output}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TryFrom<Vec<String>> for CommandTemplate {
    type Error = TemplateError;

    fn try_from(args: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(args)
    }
}

impl From<CommandTemplate> for Vec<String> {
    fn from(template: CommandTemplate) -> Self {
        template.args
    }
}

/// Executable or macro unusable before any case runs
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("CAD executable `{0}` not found")]
    ExecutableNotFound(PathBuf),
    #[error("CAD executable `{0}` is not an executable file")]
    NotExecutable(PathBuf),
    #[error("extraction macro `{path}` is not readable: {source}")]
    MacroUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("extraction macro `{0}` is not a file")]
    MacroNotAFile(PathBuf),
}

/// Runner for the external CAD application
#[derive(Debug, Clone)]
pub struct Runner {
    executable: PathBuf,
    macro_path: PathBuf,
    timeout: Duration,
    template: CommandTemplate,
    cancel: CancelToken,
}

impl Runner {
    pub fn new(
        executable: impl Into<PathBuf>,
        macro_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            executable: executable.into(),
            macro_path: macro_path.into(),
            timeout,
            template: CommandTemplate::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_template(mut self, template: CommandTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn macro_path(&self) -> &Path {
        &self.macro_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check executable and macro once before a suite starts.
    ///
    /// Returns the resolved executable path.
    pub fn preflight(&self) -> Result<PathBuf, PreflightError> {
        let resolved = resolve_executable(&self.executable)?;
        self.check_macro()?;
        Ok(resolved)
    }

    /// The macro must be a readable regular file
    fn check_macro(&self) -> Result<(), PreflightError> {
        let unreadable = |source| PreflightError::MacroUnreadable {
            path: self.macro_path.clone(),
            source,
        };
        let meta = fs::metadata(&self.macro_path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(PreflightError::MacroNotAFile(self.macro_path.clone()));
        }
        fs::File::open(&self.macro_path).map_err(unreadable)?;
        Ok(())
    }

    /// Run the application against `target`
    pub fn run(&self, target: &Path) -> RunOutcome {
        let start = Instant::now();

        if let Err(e) = self.check_macro() {
            return RunOutcome::LaunchFailure(e.to_string());
        }

        let scratch = match tempfile::Builder::new().prefix("cad-regress-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return RunOutcome::LaunchFailure(format!("cannot create scratch directory: {}", e))
            }
        };
        let output_path = scratch.path().join(OUTPUT_FILE);
        let args = self.template.render(&self.macro_path, target, &output_path);

        let mut command = Command::new(&self.executable);
        command
            .args(&args)
            .current_dir(scratch.path())
            .env("TMPDIR", scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        debug!(executable = %self.executable.display(), ?args, "spawning");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return RunOutcome::LaunchFailure(describe_spawn_error(&self.executable, &e)),
        };

        let (tx, rx) = mpsc::channel();
        let pumps = [
            child.stdout.take().map(|s| spawn_pump(Stream::Stdout, s, tx.clone())),
            child.stderr.take().map(|s| spawn_pump(Stream::Stderr, s, tx.clone())),
        ];
        drop(tx);
        let expected = pumps.iter().flatten().count();

        let mut guard = ProcessGuard::new(child);
        let status = loop {
            match guard.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    guard.terminate(TERMINATE_GRACE);
                    return RunOutcome::LaunchFailure(format!("failed to wait for child: {}", e));
                }
            }
            if self.cancel.is_cancelled() {
                guard.terminate(TERMINATE_GRACE);
                return RunOutcome::Cancelled(start.elapsed());
            }
            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                warn!(
                    fixture = %target.display(),
                    timeout_s = self.timeout.as_secs_f64(),
                    "timed out, terminating"
                );
                guard.terminate(TERMINATE_GRACE);
                return RunOutcome::Timeout(start.elapsed());
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Helpers forked into the background must not outlive the call.
        guard.kill_group();
        let (stdout, stderr) = drain(&rx, expected);
        finish(status, &output_path, stdout, stderr)
    }
}

/// Convenience wrapper around [`Runner::run`] with the default template
pub fn run(executable: &Path, macro_path: &Path, target: &Path, timeout: Duration) -> RunOutcome {
    Runner::new(executable, macro_path, timeout).run(target)
}

fn finish(
    status: std::process::ExitStatus,
    output_path: &Path,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
) -> RunOutcome {
    if !status.success() {
        return RunOutcome::NonZeroExit {
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        };
    }
    match fs::read(output_path) {
        Ok(bytes) => RunOutcome::Success(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => RunOutcome::Success(stdout),
        Err(e) => RunOutcome::LaunchFailure(format!(
            "cannot read output file {}: {}",
            output_path.display(),
            e
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_pump<R>(
    stream: Stream,
    mut reader: R,
    tx: mpsc::Sender<(Stream, Vec<u8>)>,
) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    })
}

/// Collect pipe contents; a grandchild holding a pipe open cannot stall us
/// past the drain deadline
fn drain(rx: &mpsc::Receiver<(Stream, Vec<u8>)>, expected: usize) -> (Vec<u8>, Vec<u8>) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for _ in 0..expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, buf)) => stdout = buf,
            Ok((Stream::Stderr, buf)) => stderr = buf,
            Err(_) => break,
        }
    }
    (stdout, stderr)
}

fn describe_spawn_error(executable: &Path, e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::NotFound => format!("executable not found: {}", executable.display()),
        io::ErrorKind::PermissionDenied => {
            format!("permission denied: {}", executable.display())
        }
        _ => format!("failed to spawn {}: {}", executable.display(), e),
    }
}

/// Resolve `executable` the way a shell would: paths are taken as given,
/// bare names are searched on `PATH`
fn resolve_executable(executable: &Path) -> Result<PathBuf, PreflightError> {
    if executable.components().count() > 1 || executable.is_absolute() {
        return check_executable(executable);
    }
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(executable);
        if candidate.is_file() {
            return check_executable(&candidate);
        }
    }
    Err(PreflightError::ExecutableNotFound(executable.to_path_buf()))
}

fn check_executable(path: &Path) -> Result<PathBuf, PreflightError> {
    let meta =
        fs::metadata(path).map_err(|_| PreflightError::ExecutableNotFound(path.to_path_buf()))?;
    if !meta.is_file() {
        return Err(PreflightError::NotExecutable(path.to_path_buf()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(PreflightError::NotExecutable(path.to_path_buf()));
        }
    }
    Ok(path.to_path_buf())
}

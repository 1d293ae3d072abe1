//! External command execution.
//!
//! Every provisioning stage talks to the host through a [`CommandExecutor`]:
//! `ip`, `bridge`, `debootstrap`, `chroot`, `virsh` and the privileged file
//! writes used to populate a root-owned rootfs. The system implementation
//! escalates through `sudo` when not already running as root.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

use crate::{LabError, LabResult};

/// Trailing stderr bytes kept for error messages in capture mode.
const MAX_STDERR_BYTES: usize = 1024;

/// Trailing output lines kept for error messages in streaming mode.
const STREAM_TAIL_LINES: usize = 20;

/// Description of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Text fed to the child's standard input.
    pub stdin: Option<String>,
    /// Run with elevated privileges.
    pub privileged: bool,
    /// Treat a non-zero exit as an error.
    pub check: bool,
    /// Forward output line by line to the log instead of capturing it.
    pub stream: bool,
}

impl CommandSpec {
    /// Create a checked, unprivileged command.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            privileged: false,
            check: true,
            stream: false,
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    #[must_use]
    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feed `input` to the child's standard input.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Run with elevated privileges.
    #[must_use]
    pub const fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Do not fail on a non-zero exit status.
    #[must_use]
    pub const fn unchecked(mut self) -> Self {
        self.check = false;
        self
    }

    /// Stream output to the log.
    #[must_use]
    pub const fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// The full command line, arguments joined by spaces.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains('\n') {
                write!(f, " <{}-line script>", arg.lines().count())?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited successfully.
    pub success: bool,
    /// Exit code, if the command was not killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output (empty in streaming mode).
    pub stdout: String,
    /// Captured standard error, or the output tail in streaming mode.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful, silent result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    /// Convert a failed output into an error when the command is checked.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::CommandFailed`] if `spec.check` is set and the
    /// command did not succeed.
    pub fn checked(self, spec: &CommandSpec) -> LabResult<Self> {
        if self.success || !spec.check {
            return Ok(self);
        }
        let status = self
            .code
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status: {c}"));
        Err(LabError::CommandFailed {
            command: spec.to_string(),
            status,
            stderr: self.stderr,
        })
    }
}

/// Runs external commands on behalf of the provisioning stages.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be started, or exits unsuccessfully while
    /// `spec.check` is set.
    async fn run(&self, spec: &CommandSpec) -> LabResult<CommandOutput>;
}

/// Executor backed by real processes.
///
/// Children are killed when the future driving them is dropped, so
/// cancelling a stage terminates its in-flight command.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    sudo: bool,
}

impl SystemExecutor {
    /// Escalate privileged commands with `sudo` unless already root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sudo: !rustix::process::geteuid().is_root(),
        }
    }

    /// Never prefix commands with `sudo`.
    #[must_use]
    pub const fn without_sudo() -> Self {
        Self { sudo: false }
    }

    /// Whether privileged commands go through `sudo`.
    #[must_use]
    pub const fn uses_sudo(&self) -> bool {
        self.sudo
    }

    fn command(&self, spec: &CommandSpec) -> tokio::process::Command {
        let mut cmd = if spec.privileged && self.sudo {
            let mut cmd = tokio::process::Command::new("sudo");
            if !spec.env.is_empty() {
                cmd.arg("-E");
            }
            cmd.arg(&spec.program);
            cmd
        } else {
            tokio::process::Command::new(&spec.program)
        };
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, spec: &CommandSpec) -> LabResult<CommandOutput> {
        tracing::debug!(command = %spec, privileged = spec.privileged, "exec");

        let mut child = self.command(spec).spawn().map_err(|e| LabError::Spawn {
            command: spec.program.clone(),
            source: e,
        })?;

        let mut stdin = child.stdin.take();
        let input = spec.stdin.as_deref();
        let feed = async move {
            if let (Some(pipe), Some(text)) = (stdin.as_mut(), input) {
                pipe.write_all(text.as_bytes()).await?;
            }
            // Closing the pipe signals EOF to the child.
            drop(stdin);
            Ok::<(), std::io::Error>(())
        };

        let output = if spec.stream {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let (fed, out_tail, err_tail, status) = tokio::join!(
                feed,
                forward_lines(stdout, &spec.program),
                forward_lines(stderr, &spec.program),
                child.wait()
            );
            ignore_broken_pipe(fed)?;
            let status = status?;
            CommandOutput {
                success: status.success(),
                code: status.code(),
                stdout: String::new(),
                stderr: if err_tail.is_empty() { out_tail } else { err_tail },
            }
        } else {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            let output = output?;
            ignore_broken_pipe(fed)?;
            CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), MAX_STDERR_BYTES)
                    .to_string(),
            }
        };

        if !output.success {
            tracing::debug!(command = %spec, code = ?output.code, "command exited unsuccessfully");
        }
        output.checked(spec)
    }
}

/// A child that exits without reading its input breaks the pipe; its exit
/// status is what matters then.
fn ignore_broken_pipe(fed: std::io::Result<()>) -> std::io::Result<()> {
    match fed {
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Log each line of `reader` and return the last few lines.
async fn forward_lines<R>(reader: Option<R>, program: &str) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    // Bytes, not lines: tool output is not always UTF-8 and the pipe must
    // be drained to EOF.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut last = VecDeque::with_capacity(STREAM_TAIL_LINES);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(program, error = %e, "Stopped reading command output");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        tracing::info!(target: "lxlab::exec", program, "{line}");
        if last.len() == STREAM_TAIL_LINES {
            last.pop_front();
        }
        last.push_back(line);
    }
    Vec::from(last).join("\n")
}

/// The trailing `max` bytes of `s`, cut at a character boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Executor that logs commands instead of running them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl CommandExecutor for DryRunExecutor {
    async fn run(&self, spec: &CommandSpec) -> LabResult<CommandOutput> {
        let sudo = if spec.privileged { "sudo " } else { "" };
        tracing::info!("[dry-run] {sudo}{spec}");
        Ok(CommandOutput::ok())
    }
}

/// Write `contents` to `path` with privileges and set its mode.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns the first failing command's error.
pub async fn write_file(
    executor: &dyn CommandExecutor,
    path: &Path,
    contents: &str,
    mode: u32,
) -> LabResult<()> {
    if let Some(parent) = path.parent() {
        executor
            .run(&CommandSpec::new("mkdir").arg("-p").path(parent).privileged())
            .await?;
    }
    executor
        .run(&CommandSpec::new("tee").path(path).stdin(contents).privileged())
        .await?;
    executor
        .run(
            &CommandSpec::new("chmod")
                .arg(format!("{mode:o}"))
                .path(path)
                .privileged(),
        )
        .await?;
    tracing::debug!(path = %path.display(), mode = format!("{mode:o}"), "Wrote file");
    Ok(())
}

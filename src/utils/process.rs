//! Process helpers
//!
//! Spawns external commands for fixtures and command tests. Both output
//! streams are drained into the log while the caller waits for exit, so a
//! chatty child never blocks on a full pipe.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// A command line plus its working directory and extra environment
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Exit status and captured stdout of a command
#[derive(Clone, Debug)]
pub struct CallOutput {
    pub status: ExitStatus,
    pub stdout: String,
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start process runtime")
}

/// Run a command to completion, logging its output at debug level
pub fn log_call(spec: &CommandSpec) -> Result<ExitStatus> {
    let output = runtime()?.block_on(call_async(spec, false))?;
    Ok(output.status)
}

/// Like [`log_call`], but also keeps stdout for the caller
pub fn log_call_capture(spec: &CommandSpec) -> Result<CallOutput> {
    runtime()?.block_on(call_async(spec, true))
}

/// Async body of [`log_call`] and [`log_call_capture`]
pub async fn call_async(spec: &CommandSpec, keep_stdout: bool) -> Result<CallOutput> {
    let (program, args) = spec.argv.split_first().context("Empty command line")?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    debug!("Executing command: {}", spec);
    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn `{spec}`"))?;

    let stdout = child.stdout.take().context("stdout was not captured")?;
    let stderr = child.stderr.take().context("stderr was not captured")?;

    let (status, stdout, _) = tokio::try_join!(
        async { child.wait().await.context("Failed to wait for process") },
        drain(stdout, program, "stdout", keep_stdout),
        drain(stderr, program, "stderr", false),
    )?;

    debug!("`{}` finished with {}", spec, status);
    Ok(CallOutput { status, stdout })
}

/// Forward every line of a stream to the log, optionally keeping it
async fn drain<R>(reader: R, program: &str, stream: &str, keep: bool) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut kept = String::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .with_context(|| format!("Failed to read {stream} of {program}"))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        debug!("[{} {}] {}", program, stream, line.trim_end());
        if keep {
            kept.push_str(&line);
        }
    }

    Ok(kept)
}

//! Thin wrapper around the tmux command-line interface.
//!
//! The whole cluster lives inside one tmux server, and this module exposes
//! the handful of primitives the controller needs (session lifecycle, pane
//! splitting, key injection, output capture) behind a `Multiplexer` trait so
//! the lifecycle logic can be exercised against a recording fake in tests.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for tmux subprocess calls.
const CMD_TIMEOUT: Duration = Duration::from_secs(2);

/// Longer timeout for pane capture (output can be large).
const CMD_TIMEOUT_LONG: Duration = Duration::from_secs(5);

/// Run a command with a timeout, returning its output.
pub async fn run_cmd_timeout(cmd: &mut Command) -> Result<std::process::Output> {
    match tokio::time::timeout(CMD_TIMEOUT, cmd.output()).await {
        Ok(result) => result.context("subprocess failed to execute"),
        Err(_) => bail!("subprocess timed out after {}s", CMD_TIMEOUT.as_secs()),
    }
}

/// Run a command with a timeout, returning its exit status.
pub async fn run_status_timeout(cmd: &mut Command) -> Result<std::process::ExitStatus> {
    match tokio::time::timeout(CMD_TIMEOUT, cmd.status()).await {
        Ok(result) => result.context("subprocess failed to execute"),
        Err(_) => bail!("subprocess timed out after {}s", CMD_TIMEOUT.as_secs()),
    }
}

/// Split direction for `split-window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitAxis {
    Horizontal,
    Vertical,
}

impl SplitAxis {
    fn flag(self) -> &'static str {
        match self {
            SplitAxis::Horizontal => "-h",
            SplitAxis::Vertical => "-v",
        }
    }
}

/// The multiplexer operations the cluster controller depends on.
///
/// The contract is textual: success/failure via process exit code, output
/// via captured pane text. Nothing here reads the tool's configuration.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Whether a session with this name exists.
    async fn has_session(&self, session: &str) -> bool;
    /// Create a new detached session with a single named window.
    async fn new_session(&self, session: &str, window: &str) -> Result<()>;
    /// Split the target pane along the given axis.
    async fn split_window(&self, axis: SplitAxis, target: &str) -> Result<()>;
    /// Inject keys into the target pane.
    async fn send_keys(&self, target: &str, keys: &[&str]) -> Result<()>;
    /// Capture the visible text of the target pane.
    async fn capture_pane(&self, target: &str) -> Result<String>;
    /// Destroy a session.
    async fn kill_session(&self, session: &str) -> Result<()>;
    /// Toggle global mouse support.
    async fn set_mouse(&self, on: bool) -> Result<()>;
    /// Attach the foreground terminal to the session (blocks until detach).
    async fn attach(&self, session: &str) -> Result<()>;
    /// Pids of the shells running in the session's panes.
    async fn pane_pids(&self, session: &str) -> Result<Vec<u32>>;
}

/// Production implementation shelling out to the tmux CLI.
pub struct Tmux;

impl Tmux {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Tmux {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Multiplexer for Tmux {
    async fn has_session(&self, session: &str) -> bool {
        run_status_timeout(Command::new("tmux").args(["has-session", "-t", session]))
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn new_session(&self, session: &str, window: &str) -> Result<()> {
        let output = run_cmd_timeout(
            Command::new("tmux").args(["new-session", "-d", "-s", session, "-n", window]),
        )
        .await
        .with_context(|| format!("failed to create tmux session '{session}'"))?;
        if !output.status.success() {
            bail!(
                "tmux new-session failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        debug!(session = %session, "tmux session created");
        Ok(())
    }

    async fn split_window(&self, axis: SplitAxis, target: &str) -> Result<()> {
        let output =
            run_cmd_timeout(Command::new("tmux").args(["split-window", axis.flag(), "-t", target]))
                .await
                .with_context(|| format!("failed to split pane '{target}'"))?;
        if !output.status.success() {
            bail!(
                "tmux split-window failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }

    async fn send_keys(&self, target: &str, keys: &[&str]) -> Result<()> {
        let mut cmd = Command::new("tmux");
        cmd.args(["send-keys", "-t", target]);
        cmd.args(keys);
        let output = run_cmd_timeout(&mut cmd)
            .await
            .with_context(|| format!("failed to send keys to '{target}'"))?;
        if !output.status.success() {
            bail!(
                "tmux send-keys failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        debug!(pane = %target, ?keys, "sent keys");
        Ok(())
    }

    async fn capture_pane(&self, target: &str) -> Result<String> {
        let output = match tokio::time::timeout(
            CMD_TIMEOUT_LONG,
            Command::new("tmux")
                .args(["capture-pane", "-t", target, "-p"])
                .output(),
        )
        .await
        {
            Ok(result) => result.context("failed to capture tmux pane")?,
            Err(_) => bail!(
                "capture-pane timed out after {}s",
                CMD_TIMEOUT_LONG.as_secs()
            ),
        };

        if !output.status.success() {
            // Pane gone between calls; callers treat empty text as "pending".
            debug!(pane = %target, "capture-pane target not available");
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn kill_session(&self, session: &str) -> Result<()> {
        let output = run_cmd_timeout(Command::new("tmux").args(["kill-session", "-t", session]))
            .await
            .with_context(|| format!("failed to kill tmux session '{session}'"))?;
        if !output.status.success() {
            bail!(
                "tmux kill-session failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        debug!(session = %session, "tmux session killed");
        Ok(())
    }

    async fn set_mouse(&self, on: bool) -> Result<()> {
        let value = if on { "on" } else { "off" };
        let status =
            run_status_timeout(Command::new("tmux").args(["set-option", "-g", "mouse", value]))
                .await
                .context("failed to toggle tmux mouse mode")?;
        if !status.success() {
            bail!("tmux set-option mouse {value} failed");
        }
        Ok(())
    }

    async fn attach(&self, session: &str) -> Result<()> {
        // Interactive: inherits the terminal, so no timeout here.
        let status = Command::new("tmux")
            .args(["attach-session", "-t", session])
            .status()
            .await
            .with_context(|| format!("failed to attach to tmux session '{session}'"))?;
        if !status.success() {
            bail!("tmux attach exited with non-zero status");
        }
        Ok(())
    }

    async fn pane_pids(&self, session: &str) -> Result<Vec<u32>> {
        let output = run_cmd_timeout(Command::new("tmux").args([
            "list-panes",
            "-s",
            "-t",
            session,
            "-F",
            "#{pane_pid}",
        ]))
        .await
        .with_context(|| format!("failed to list panes for session '{session}'"))?;
        if !output.status.success() {
            bail!(
                "tmux list-panes failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse().ok())
            .collect())
    }
}

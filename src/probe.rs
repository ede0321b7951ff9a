//! Environment probing and presentation of the running cluster.
//!
//! Startup checks that tmux exists (fatal if not) and picks how the session
//! is shown to the operator: attach-in-place for constrained environments
//! like WSL, a spawned terminal window where a supported emulator is on PATH,
//! or headless with manual attach instructions.

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::tmux::run_cmd_timeout;

/// How the running cluster is exposed to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationMode {
    /// Constrained environment: the operator attaches from another terminal.
    AttachInPlace,
    /// Spawn the named terminal emulator attached to the session.
    SpawnWindow(String),
    /// No emulator found; print attach instructions.
    Headless,
}

/// Supported terminal emulators, in priority order. First match wins, no
/// retries.
const TERMINAL_PRIORITY: &[&str] = &["alacritty", "gnome-terminal"];

/// Check that tmux is installed and reachable.
pub async fn check_tmux() -> Result<String> {
    let output = run_cmd_timeout(Command::new("tmux").arg("-V"))
        .await
        .context("tmux not found — install tmux (e.g. `apt install tmux` or `brew install tmux`)")?;
    if !output.status.success() {
        bail!(
            "tmux -V failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(version = %version, "tmux found");
    Ok(version)
}

/// Detect the presentation mode for this host. Fails only when tmux itself
/// is missing.
pub async fn probe() -> Result<PresentationMode> {
    check_tmux().await?;
    let proc_version = std::fs::read_to_string("/proc/version").unwrap_or_default();
    Ok(select_mode(&proc_version, binary_on_path))
}

/// Pick a presentation mode from the kernel banner and a PATH lookup.
pub fn select_mode(proc_version: &str, which: impl Fn(&str) -> bool) -> PresentationMode {
    if is_wsl(proc_version) {
        return PresentationMode::AttachInPlace;
    }
    for term in TERMINAL_PRIORITY {
        if which(term) {
            return PresentationMode::SpawnWindow((*term).to_string());
        }
    }
    PresentationMode::Headless
}

/// WSL lacks direct GUI terminal spawning; detect it from the kernel banner.
pub fn is_wsl(proc_version: &str) -> bool {
    let banner = proc_version.to_lowercase();
    banner.contains("microsoft") || banner.contains("wsl")
}

fn binary_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
}

/// Expose the session to the operator according to the probed mode.
pub fn open_view(mode: &PresentationMode, session: &str) {
    match mode {
        PresentationMode::AttachInPlace => {
            println!(
                "Constrained environment detected. Run `tmux attach-session -t {session}` in another terminal to view the cluster."
            );
        }
        PresentationMode::SpawnWindow(term) => {
            if let Err(err) = spawn_terminal(term, session) {
                warn!(terminal = %term, "could not spawn terminal: {err:#}");
                println!("View the cluster with: tmux attach-session -t {session}");
            }
        }
        PresentationMode::Headless => {
            println!("No supported terminal emulator found.");
            println!("View the cluster with: tmux attach-session -t {session}");
        }
    }
}

// Fire-and-forget: the emulator window outlives the control prompt and is
// reaped in the background.
fn spawn_terminal(term: &str, session: &str) -> Result<()> {
    let mut cmd = Command::new(term);
    match term {
        "gnome-terminal" => {
            cmd.args(["--", "tmux", "attach-session", "-t", session]);
        }
        _ => {
            cmd.args(["-e", "tmux", "attach-session", "-t", session]);
        }
    }
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {term}"))?;
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wsl_banner_is_detected_case_insensitively() {
        assert!(is_wsl("Linux version 5.15.90.1-Microsoft-standard-WSL2"));
        assert!(is_wsl("linux version 4.4 microsoft"));
        assert!(!is_wsl("Linux version 6.1.0-generic (gcc ...)"));
        assert!(!is_wsl(""));
    }

    #[test]
    fn wsl_wins_over_any_available_emulator() {
        let mode = select_mode("microsoft wsl kernel", |_| true);
        assert_eq!(mode, PresentationMode::AttachInPlace);
    }

    #[test]
    fn first_emulator_in_priority_order_wins() {
        let mode = select_mode("linux", |_| true);
        assert_eq!(mode, PresentationMode::SpawnWindow("alacritty".to_string()));

        let mode = select_mode("linux", |term| term == "gnome-terminal");
        assert_eq!(
            mode,
            PresentationMode::SpawnWindow("gnome-terminal".to_string())
        );
    }

    #[test]
    fn no_emulator_means_headless() {
        let mode = select_mode("linux", |_| false);
        assert_eq!(mode, PresentationMode::Headless);
    }
}

//! Cluster lifecycle control.
//!
//! The controller owns the only mutable `ClusterState` and exposes the
//! operations the command loop dispatches to: `launch`, `interrupt`,
//! `restart`, `kill_all`, and `attach`. Destructive multiplexer calls favor
//! idempotent convergence over error propagation — a target that is already
//! gone counts as success.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterState, Phase};
use crate::config::ClusterConfig;
use crate::launcher::{launch_roles, run_build_gate, GateOutcome, GatePolicy};
use crate::layout::{build_layout, Geometry};
use crate::matcher::OutputMatcher;
use crate::probe::{open_view, PresentationMode};
use crate::tmux::Multiplexer;

const WINDOW_NAME: &str = "cluster";

pub struct Controller {
    mux: Arc<dyn Multiplexer>,
    config: ClusterConfig,
    matcher: OutputMatcher,
    geometry: Geometry,
    mode: PresentationMode,
    state: ClusterState,
}

impl Controller {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        config: ClusterConfig,
        mode: PresentationMode,
    ) -> Result<Self> {
        let matcher = OutputMatcher::literal(&config.success_marker, &config.failure_marker)?;
        let geometry = config.geometry();
        let roles = config.roles()?;
        Ok(Self {
            mux,
            matcher,
            geometry,
            mode,
            state: ClusterState::new(roles),
            config,
        })
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn session_name(&self) -> &str {
        &self.config.session
    }

    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    /// Bring the whole cluster up: layout (rebuilt from scratch when coming
    /// from `Uninitialized`/`Terminated`, reused otherwise), the presentation
    /// view, the build gate, and finally the role start commands.
    ///
    /// A build failure or timeout aborts before any role starts and leaves
    /// the cluster `Terminated`; the returned error carries the report.
    pub async fn launch(&mut self) -> Result<()> {
        let rebuild = matches!(
            self.state.phase,
            Phase::Uninitialized | Phase::Terminated
        ) || !self.state.has_layout();

        if rebuild {
            self.state.sessions = build_layout(
                self.mux.as_ref(),
                &self.config.session,
                WINDOW_NAME,
                &self.geometry,
            )
            .await?;
            self.state.phase = Phase::LayoutReady;
            if let Err(err) = self.mux.set_mouse(true).await {
                warn!("mouse mode not enabled: {err:#}");
            }
            open_view(&self.mode, &self.config.session);
        } else {
            self.state.clear_occupants();
            self.state.phase = Phase::LayoutReady;
        }

        self.state.phase = Phase::BuildPending;
        let gates = self.state.gate_targets();
        let policy = GatePolicy {
            poll_interval: self.config.poll_interval,
            timeout: self.config.build_timeout,
        };
        let outcome = run_build_gate(
            self.mux.as_ref(),
            &gates,
            &self.config.build_command,
            &self.matcher,
            policy,
        )
        .await;

        match outcome {
            GateOutcome::Ready => {
                launch_roles(self.mux.as_ref(), &self.state.roles, &mut self.state.sessions)
                    .await;
                self.state.phase = Phase::Running;
                info!(
                    replicas = self.config.replicas.count,
                    clients = self.config.clients.count,
                    "cluster is running"
                );
                Ok(())
            }
            GateOutcome::Failed { target } => {
                self.state.phase = Phase::Terminated;
                Err(anyhow!(
                    "build failed in pane {target}; no roles were started"
                ))
            }
            GateOutcome::TimedOut => {
                self.state.phase = Phase::Terminated;
                Err(anyhow!(
                    "build did not finish within the configured timeout; no roles were started"
                ))
            }
        }
    }

    /// Soft-stop every occupied pane with two interrupt keys. The double
    /// send matters: one interrupt may only reach a wrapping supervisor
    /// process, not the leaf. Side effect only — nothing verifies the
    /// target actually stopped.
    pub async fn interrupt(&mut self) {
        if !self.state.has_layout() {
            debug!("no sessions to interrupt");
            return;
        }
        info!("interrupting all running processes");
        for session in &self.state.sessions {
            if session.occupant.is_none() {
                continue;
            }
            if let Err(err) = self.mux.send_keys(&session.target, &["C-c", "C-c"]).await {
                // Target gone already: that is the outcome we wanted.
                info!(pane = %session.target, "interrupt target absent: {err:#}");
            }
        }
        if self.config.interrupt_process_group {
            self.signal_process_groups().await;
        }
        if self.state.phase == Phase::Running {
            self.state.phase = Phase::Interrupted;
        }
    }

    /// Interrupt, pause, relaunch. The existing layout is reused unless the
    /// cluster was torn down, in which case `launch` rebuilds it.
    pub async fn restart(&mut self) -> Result<()> {
        self.interrupt().await;
        sleep(self.config.pause).await;
        self.launch().await
    }

    /// Tear the whole session down. Idempotent: an already-gone session is
    /// success, and calling this twice is fine.
    pub async fn kill_all(&mut self) {
        if self.mux.has_session(&self.config.session).await {
            if let Err(err) = self.mux.kill_session(&self.config.session).await {
                warn!("kill-session failed: {err:#}");
            } else {
                info!(session = %self.config.session, "session terminated");
            }
        } else {
            info!(session = %self.config.session, "session already gone");
        }
        self.state.sessions.clear();
        self.state.phase = Phase::Terminated;
    }

    /// Hand the foreground terminal to the multiplexer's attach view.
    /// Returns control to the command loop afterwards without changing
    /// phase. No-op once the cluster is terminated.
    pub async fn attach(&mut self) {
        if self.state.phase == Phase::Terminated {
            println!("cluster is terminated; nothing to attach to");
            return;
        }
        if let Err(err) = self.mux.attach(&self.config.session).await {
            warn!("attach failed: {err:#}");
        } else {
            println!("returned to control prompt; the cluster keeps running");
        }
    }

    async fn signal_process_groups(&self) {
        match self.mux.pane_pids(&self.config.session).await {
            Ok(pids) => {
                for pid in pids {
                    send_sigint_group(pid);
                }
            }
            Err(err) => warn!("could not resolve pane pids: {err:#}"),
        }
    }
}

#[cfg(unix)]
fn send_sigint_group(pid: u32) {
    unsafe {
        let pid = pid as i32;
        let _ = libc::kill(-pid, libc::SIGINT);
        let _ = libc::kill(pid, libc::SIGINT);
    }
}

#[cfg(not(unix))]
fn send_sigint_group(_pid: u32) {}

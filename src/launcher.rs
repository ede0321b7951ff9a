//! Process startup: the build gate and role launch.
//!
//! The build command is dispatched into every designated gate pane, then the
//! gate polls the captured pane text until every pane shows the success
//! marker, any pane shows the failure marker, or the deadline passes. Only a
//! satisfied gate lets role startup proceed. Role startup itself is
//! fire-and-forget: commands are injected into the panes and never awaited —
//! confirming the processes came up is the operator's job via `attach`.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::cluster::{Role, Session};
use crate::matcher::{OutputMatcher, Verdict};
use crate::tmux::Multiplexer;

/// Result of waiting on the build gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Every gate pane showed the success marker.
    Ready,
    /// A gate pane showed the failure marker; polling stopped immediately.
    Failed { target: String },
    /// The deadline passed before every pane reported.
    TimedOut,
}

/// Polling cadence and deadline for the build gate.
#[derive(Debug, Clone, Copy)]
pub struct GatePolicy {
    pub poll_interval: Duration,
    /// `None` polls without bound.
    pub timeout: Option<Duration>,
}

/// Dispatch the build command into every gate pane and poll until the gate
/// resolves. All multiplexer failures along the way are best-effort: a send
/// or capture error leaves the pane "pending" and the gate converges via the
/// failure marker or the deadline.
pub async fn run_build_gate(
    mux: &dyn Multiplexer,
    gates: &[String],
    command: &str,
    matcher: &OutputMatcher,
    policy: GatePolicy,
) -> GateOutcome {
    if gates.is_empty() {
        debug!("no build-gate panes configured, skipping build");
        return GateOutcome::Ready;
    }

    for target in gates {
        if let Err(err) = mux.send_keys(target, &[command, "Enter"]).await {
            warn!(pane = %target, "could not dispatch build command: {err:#}");
        }
    }
    info!(panes = gates.len(), command = %command, "waiting for build to finish");

    let deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
    loop {
        let mut all_ok = true;
        for target in gates {
            let captured = mux.capture_pane(target).await.unwrap_or_default();
            match matcher.classify(&captured) {
                Verdict::Failure => {
                    warn!(pane = %target, "failure marker seen in build pane");
                    return GateOutcome::Failed {
                        target: target.clone(),
                    };
                }
                Verdict::Success => {}
                Verdict::Pending => all_ok = false,
            }
        }
        if all_ok {
            info!("build finished in every gate pane");
            return GateOutcome::Ready;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                warn!("build gate deadline passed");
                return GateOutcome::TimedOut;
            }
        }
        sleep(policy.poll_interval).await;
    }
}

/// Send the start commands: replicas before clients, ascending index within
/// kind (the role set is constructed in exactly that order). Each pane gets
/// a clear, a label banner, and the role's command line.
pub async fn launch_roles(mux: &dyn Multiplexer, roles: &[Role], sessions: &mut [Session]) {
    for (position, role) in roles.iter().enumerate() {
        let Some(session) = sessions.get_mut(position) else {
            warn!(role = %role.label(), "no pane assigned, skipping");
            continue;
        };
        let target = session.target.clone();
        let banner = format!("echo \"{}\"", role.label());
        for keys in [
            &["clear", "Enter"][..],
            &[banner.as_str(), "Enter"][..],
            &[role.command.as_str(), "Enter"][..],
        ] {
            if let Err(err) = mux.send_keys(&target, keys).await {
                warn!(pane = %target, "start command not delivered: {err:#}");
            }
        }
        session.occupant = Some(position);
        debug!(pane = %target, role = %role.label(), id = role.id, "start command sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::RoleKind;
    use crate::tmux::fake::FakeMux;

    fn matcher() -> OutputMatcher {
        OutputMatcher::literal("BUILD SUCCESS", "ERROR").unwrap()
    }

    fn fast_policy() -> GatePolicy {
        GatePolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(2)),
        }
    }

    fn gate_targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t:0.{i}")).collect()
    }

    #[tokio::test]
    async fn gate_is_ready_when_every_pane_succeeds() {
        let mux = FakeMux::new();
        let gates = gate_targets(3);
        for target in &gates {
            mux.set_captures(target, &["[INFO] BUILD SUCCESS"]);
        }

        let outcome = run_build_gate(&mux, &gates, "mvn clean install", &matcher(), fast_policy()).await;
        assert_eq!(outcome, GateOutcome::Ready);

        // The build command reached every gate pane.
        let sent = mux.sent_lines();
        for target in &gates {
            assert!(sent
                .iter()
                .any(|(t, line)| t == target && line.contains("mvn clean install")));
        }
    }

    #[tokio::test]
    async fn gate_waits_until_the_last_pane_reports() {
        let mux = FakeMux::new();
        let gates = gate_targets(2);
        mux.set_captures(&gates[0], &["BUILD SUCCESS"]);
        // Second pane needs two polls before the marker shows up.
        mux.set_captures(&gates[1], &["compiling", "compiling", "BUILD SUCCESS"]);

        let outcome = run_build_gate(&mux, &gates, "make", &matcher(), fast_policy()).await;
        assert_eq!(outcome, GateOutcome::Ready);
    }

    #[tokio::test]
    async fn one_failing_pane_short_circuits_the_gate() {
        let mux = FakeMux::new();
        let gates = gate_targets(3);
        mux.set_captures(&gates[0], &["BUILD SUCCESS"]);
        mux.set_captures(&gates[1], &["[ERROR] compilation failure"]);
        mux.set_captures(&gates[2], &["still compiling"]);

        let outcome = run_build_gate(&mux, &gates, "make", &matcher(), fast_policy()).await;
        assert_eq!(
            outcome,
            GateOutcome::Failed {
                target: gates[1].clone()
            }
        );
    }

    #[tokio::test]
    async fn a_silent_pane_times_the_gate_out() {
        let mux = FakeMux::new();
        let gates = gate_targets(1);
        mux.set_captures(&gates[0], &["still compiling"]);

        let policy = GatePolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_millis(40)),
        };
        let outcome = run_build_gate(&mux, &gates, "make", &matcher(), policy).await;
        assert_eq!(outcome, GateOutcome::TimedOut);
    }

    #[tokio::test]
    async fn no_gate_panes_means_no_build_step() {
        let mux = FakeMux::new();
        let outcome = run_build_gate(&mux, &[], "make", &matcher(), fast_policy()).await;
        assert_eq!(outcome, GateOutcome::Ready);
        assert!(mux.sent_lines().is_empty());
    }

    fn role(kind: RoleKind, index: usize, id: usize) -> Role {
        Role {
            kind,
            index,
            id,
            port: 8000 + id as u16,
            command: format!("run-{} {id}", kind.label().to_lowercase()),
            build_gate: kind == RoleKind::Client,
        }
    }

    #[tokio::test]
    async fn roles_start_in_order_into_distinct_unoccupied_panes() {
        let mux = FakeMux::new();
        let roles = vec![
            role(RoleKind::Replica, 1, 1),
            role(RoleKind::Replica, 2, 2),
            role(RoleKind::Client, 1, 3),
        ];
        let mut sessions: Vec<Session> = (0..3)
            .map(|i| Session::new(format!("t:0.{i}")))
            .collect();
        assert!(sessions.iter().all(|s| s.occupant.is_none()));

        launch_roles(&mux, &roles, &mut sessions).await;

        let sent = mux.sent_lines();
        // Three sends per role: clear, banner, command.
        assert_eq!(sent.len(), 9);
        let command_lines: Vec<&(String, String)> = sent
            .iter()
            .filter(|(_, line)| line.starts_with("run-"))
            .collect();
        assert_eq!(command_lines.len(), 3);
        assert_eq!(command_lines[0].0, "t:0.0");
        assert!(command_lines[0].1.starts_with("run-replica 1"));
        assert_eq!(command_lines[1].0, "t:0.1");
        assert!(command_lines[1].1.starts_with("run-replica 2"));
        assert_eq!(command_lines[2].0, "t:0.2");
        assert!(command_lines[2].1.starts_with("run-client 3"));

        // Every pane is now occupied by its own role.
        assert_eq!(sessions[0].occupant, Some(0));
        assert_eq!(sessions[1].occupant, Some(1));
        assert_eq!(sessions[2].occupant, Some(2));
    }

    #[tokio::test]
    async fn banner_precedes_the_command_in_each_pane() {
        let mux = FakeMux::new();
        let roles = vec![role(RoleKind::Replica, 1, 1)];
        let mut sessions = vec![Session::new("t:0.0".to_string())];

        launch_roles(&mux, &roles, &mut sessions).await;

        let sent = mux.sent_lines();
        assert_eq!(sent[0].1, "clear Enter");
        assert!(sent[1].1.contains("Replica 1 (port 8001)"));
        assert!(sent[2].1.starts_with("run-replica 1"));
    }
}

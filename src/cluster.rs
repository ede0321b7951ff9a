//! Data structures for tracking cluster state.
//!
//! This module defines the immutable role set (`Role`), the pane each role
//! runs in (`Session`), and the full cluster state (`ClusterState`) with its
//! lifecycle phase. State is mutated only by the lifecycle controller.

use std::fmt;

/// Which kind of cluster member a role is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Replica,
    Client,
}

impl RoleKind {
    pub fn label(self) -> &'static str {
        match self {
            RoleKind::Replica => "Replica",
            RoleKind::Client => "Client",
        }
    }
}

/// A logical cluster member. Immutable once created; the full set is fixed
/// at startup from configuration.
#[derive(Debug, Clone)]
pub struct Role {
    pub kind: RoleKind,
    /// 1-based index within the kind.
    pub index: usize,
    /// Cluster-wide numeric identity (replicas first, then clients).
    pub id: usize,
    /// Network port handed to the external process.
    pub port: u16,
    /// Fully-formed command line for the external process.
    pub command: String,
    /// Whether the build step runs in this role's pane before startup.
    pub build_gate: bool,
}

impl Role {
    /// Human-readable banner echoed into the pane before the command.
    pub fn label(&self) -> String {
        format!("{} {} (port {})", self.kind.label(), self.index, self.port)
    }
}

/// An addressable pane inside the multiplexer session.
#[derive(Debug, Clone)]
pub struct Session {
    /// tmux pane address, e.g. `muster:0.3`.
    pub target: String,
    /// Position of the occupying role, set once its start command is sent.
    pub occupant: Option<usize>,
}

impl Session {
    pub fn new(target: String) -> Self {
        Self {
            target,
            occupant: None,
        }
    }
}

/// Lifecycle phase of the whole cluster.
///
/// Transitions are monotonic except `Interrupted -> Running` (restart) and
/// `Terminated -> LayoutReady` (fresh launch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    LayoutReady,
    BuildPending,
    Running,
    Interrupted,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::LayoutReady => "layout ready",
            Phase::BuildPending => "build pending",
            Phase::Running => "running",
            Phase::Interrupted => "interrupted",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Process-wide cluster state: the role set, the pane each role maps to,
/// and the current phase. Once the layout exists, `sessions.len()` equals
/// `roles.len()` and role position `i` occupies session position `i`.
#[derive(Debug)]
pub struct ClusterState {
    pub roles: Vec<Role>,
    pub sessions: Vec<Session>,
    pub phase: Phase,
}

impl ClusterState {
    pub fn new(roles: Vec<Role>) -> Self {
        Self {
            roles,
            sessions: Vec::new(),
            phase: Phase::Uninitialized,
        }
    }

    pub fn has_layout(&self) -> bool {
        !self.sessions.is_empty()
    }

    pub fn clear_occupants(&mut self) {
        for session in &mut self.sessions {
            session.occupant = None;
        }
    }

    /// Pane addresses that host the build gate, in role order.
    pub fn gate_targets(&self) -> Vec<String> {
        self.roles
            .iter()
            .zip(&self.sessions)
            .filter(|(role, _)| role.build_gate)
            .map(|(_, session)| session.target.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(kind: RoleKind, index: usize, build_gate: bool) -> Role {
        Role {
            kind,
            index,
            id: index,
            port: 8000 + index as u16,
            command: format!("run {index}"),
            build_gate,
        }
    }

    #[test]
    fn role_label_names_kind_index_and_port() {
        let r = role(RoleKind::Replica, 2, false);
        assert_eq!(r.label(), "Replica 2 (port 8002)");
    }

    #[test]
    fn gate_targets_follow_the_build_gate_flag() {
        let roles = vec![
            role(RoleKind::Replica, 1, false),
            role(RoleKind::Client, 1, true),
            role(RoleKind::Client, 2, true),
        ];
        let mut state = ClusterState::new(roles);
        state.sessions = (0..3)
            .map(|i| Session::new(format!("t:0.{i}")))
            .collect();
        assert_eq!(state.gate_targets(), vec!["t:0.1", "t:0.2"]);
    }

    #[test]
    fn new_state_is_uninitialized_without_layout() {
        let state = ClusterState::new(Vec::new());
        assert_eq!(state.phase, Phase::Uninitialized);
        assert!(!state.has_layout());
    }
}

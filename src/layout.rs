//! Pane layout construction.
//!
//! A cluster is one tmux session split into one pane per role. The split
//! sequence is declarative data: pane indices are assigned in split order,
//! which is what makes the pane-to-role mapping reproducible without ever
//! querying the layout back from the tool.

use anyhow::{bail, Result};
use serde::Deserialize;
use tracing::info;

use crate::cluster::Session;
use crate::tmux::{Multiplexer, SplitAxis};

/// One pane split: which existing pane to split, along which axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SplitOp {
    pub axis: SplitAxis,
    pub target: usize,
}

/// Declarative split sequence producing `splits.len() + 1` panes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    splits: Vec<SplitOp>,
}

impl Geometry {
    pub fn new(splits: Vec<SplitOp>) -> Self {
        Self { splits }
    }

    /// Default layout: replicas stacked top to bottom, then a bottom row of
    /// clients side by side. Every op targets the highest existing pane
    /// index, so each new pane is appended and pane index equals creation
    /// order — replica `i` lands in pane `i-1`, client `j` in pane
    /// `replicas + j - 1`.
    pub fn stacked(replicas: usize, clients: usize) -> Self {
        let mut splits = Vec::new();
        for i in 1..replicas {
            splits.push(SplitOp {
                axis: SplitAxis::Vertical,
                target: i - 1,
            });
        }
        if clients > 0 && replicas > 0 {
            splits.push(SplitOp {
                axis: SplitAxis::Vertical,
                target: replicas - 1,
            });
        }
        for j in 1..clients {
            splits.push(SplitOp {
                axis: SplitAxis::Horizontal,
                target: replicas + j - 1,
            });
        }
        Self { splits }
    }

    pub fn pane_count(&self) -> usize {
        self.splits.len() + 1
    }

    pub fn splits(&self) -> &[SplitOp] {
        &self.splits
    }

    /// Check a (possibly hand-written) sequence: it must produce exactly
    /// `roles` panes and every op must target a pane that already exists at
    /// that point in the sequence.
    pub fn validate(&self, roles: usize) -> Result<()> {
        if self.pane_count() != roles {
            bail!(
                "layout produces {} panes but {} roles are configured",
                self.pane_count(),
                roles
            );
        }
        for (step, op) in self.splits.iter().enumerate() {
            if op.target > step {
                bail!(
                    "split {} targets pane {} which does not exist yet",
                    step,
                    op.target
                );
            }
        }
        Ok(())
    }
}

/// tmux pane address for pane `index` of the cluster session.
pub fn pane_target(session: &str, index: usize) -> String {
    format!("{session}:0.{index}")
}

/// tmux target parsing treats ':' and '.' as window/pane separators, so
/// session names must avoid punctuation.
pub fn sanitize_session_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Create the cluster session with one pane per role.
///
/// Idempotent: any stale session with the same name is destroyed first, so
/// repeated launches never accumulate panes from a previous run.
pub async fn build_layout(
    mux: &dyn Multiplexer,
    session: &str,
    window: &str,
    geometry: &Geometry,
) -> Result<Vec<Session>> {
    if mux.has_session(session).await {
        info!(session = %session, "stale session found, recreating");
        mux.kill_session(session).await?;
    }
    mux.new_session(session, window).await?;
    for op in geometry.splits() {
        mux.split_window(op.axis, &pane_target(session, op.target))
            .await?;
    }
    Ok((0..geometry.pane_count())
        .map(|index| Session::new(pane_target(session, index)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::fake::FakeMux;

    #[test]
    fn stacked_4_3_produces_the_canonical_sequence() {
        let geometry = Geometry::stacked(4, 3);
        assert_eq!(geometry.pane_count(), 7);
        let expected = vec![
            SplitOp { axis: SplitAxis::Vertical, target: 0 },
            SplitOp { axis: SplitAxis::Vertical, target: 1 },
            SplitOp { axis: SplitAxis::Vertical, target: 2 },
            SplitOp { axis: SplitAxis::Vertical, target: 3 },
            SplitOp { axis: SplitAxis::Horizontal, target: 4 },
            SplitOp { axis: SplitAxis::Horizontal, target: 5 },
        ];
        assert_eq!(geometry.splits(), expected.as_slice());
    }

    #[test]
    fn stacked_handles_degenerate_counts() {
        assert_eq!(Geometry::stacked(1, 0).pane_count(), 1);
        assert_eq!(Geometry::stacked(0, 3).pane_count(), 3);
        assert_eq!(Geometry::stacked(2, 1).pane_count(), 3);
    }

    #[test]
    fn stacked_is_deterministic() {
        assert_eq!(Geometry::stacked(4, 3), Geometry::stacked(4, 3));
    }

    #[test]
    fn validate_rejects_wrong_pane_count() {
        let geometry = Geometry::stacked(2, 2);
        assert!(geometry.validate(4).is_ok());
        assert!(geometry.validate(5).is_err());
    }

    #[test]
    fn validate_rejects_forward_targets() {
        let geometry = Geometry::new(vec![SplitOp {
            axis: SplitAxis::Vertical,
            target: 1,
        }]);
        let err = geometry.validate(2).unwrap_err();
        assert!(err.to_string().contains("does not exist yet"));
    }

    #[test]
    fn sanitize_session_name_replaces_punctuation() {
        assert_eq!(sanitize_session_name("dev.cluster:1"), "dev-cluster-1");
        assert_eq!(sanitize_session_name("muster_2"), "muster_2");
    }

    #[tokio::test]
    async fn build_layout_creates_one_session_per_role() {
        let mux = FakeMux::new();
        let geometry = Geometry::stacked(4, 3);
        let sessions = build_layout(&mux, "t", "cluster", &geometry).await.unwrap();

        assert_eq!(sessions.len(), 7);
        assert_eq!(sessions[0].target, "t:0.0");
        assert_eq!(sessions[6].target, "t:0.6");
        assert!(sessions.iter().all(|s| s.occupant.is_none()));

        let state = mux.state.lock().unwrap();
        assert_eq!(state.new_sessions, 1);
        assert_eq!(state.splits.len(), 6);
    }

    #[tokio::test]
    async fn build_layout_destroys_a_stale_session_first() {
        let mux = FakeMux::new();
        mux.state
            .lock()
            .unwrap()
            .sessions
            .insert("t".to_string());

        build_layout(&mux, "t", "cluster", &Geometry::stacked(2, 0))
            .await
            .unwrap();

        let state = mux.state.lock().unwrap();
        assert_eq!(state.kills, vec!["t"]);
        assert_eq!(state.new_sessions, 1);
        assert!(state.sessions.contains("t"));
    }
}

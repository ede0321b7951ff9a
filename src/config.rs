//! Configuration management for muster.
//!
//! This module defines the structure of the `muster.toml` configuration file,
//! loads and parses it, and resolves it (together with CLI overrides) into the
//! immutable `ClusterConfig` value the controller runs from. The controller
//! itself holds the only mutable state.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::cluster::{Role, RoleKind};
use crate::layout::{sanitize_session_name, Geometry, SplitOp};

const DEFAULT_SESSION: &str = "muster";
const DEFAULT_BUILD_COMMAND: &str = "mvn clean install";
const DEFAULT_SUCCESS_MARKER: &str = "BUILD SUCCESS";
const DEFAULT_FAILURE_MARKER: &str = "ERROR";
const DEFAULT_POLL_MS: u64 = 1_000;
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;
const DEFAULT_PAUSE_MS: u64 = 1_000;
const DEFAULT_REPLICA_COUNT: usize = 4;
const DEFAULT_REPLICA_BASE_PORT: u16 = 8001;
const DEFAULT_CLIENT_COUNT: usize = 3;
const DEFAULT_CLIENT_BASE_PORT: u16 = 9001;

/// Top-level structure corresponding to `muster.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// tmux session name for the cluster.
    pub session: Option<String>,
    /// Pause between interrupt and relaunch during a restart (milliseconds).
    pub pause_ms: Option<u64>,
    /// Build-gate settings.
    pub build: Option<BuildSection>,
    /// Replica role settings.
    pub replicas: Option<RoleSection>,
    /// Client role settings.
    pub clients: Option<RoleSection>,
    /// Interrupt delivery settings.
    pub interrupt: Option<InterruptSection>,
    /// Optional hand-written pane layout.
    pub layout: Option<LayoutSection>,
}

/// Build-gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    /// Command dispatched into every build-gate pane.
    pub command: Option<String>,
    /// Literal marker that signals build success.
    pub success: Option<String>,
    /// Literal marker that signals build failure.
    pub failure: Option<String>,
    /// Polling interval while waiting for the markers (milliseconds).
    pub poll_ms: Option<u64>,
    /// Give up waiting after this many seconds; 0 disables the timeout.
    pub timeout_secs: Option<u64>,
}

/// Configuration for one role kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleSection {
    /// How many of this role to run.
    pub count: Option<usize>,
    /// Port of the first role; subsequent roles count upward.
    pub base_port: Option<u16>,
    /// Command template; `{id}` and `{port}` are substituted per role.
    pub command: Option<String>,
    /// Whether the build step runs in this kind's panes.
    pub build_gate: Option<bool>,
}

/// Interrupt delivery configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterruptSection {
    /// Also SIGINT the OS process group behind each pane, in addition to
    /// injecting interrupt keys.
    pub process_group: Option<bool>,
}

/// Optional declarative layout override.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutSection {
    #[serde(rename = "split")]
    pub splits: Option<Vec<SplitOp>>,
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// CLI overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub session: Option<String>,
    pub replicas: Option<usize>,
    pub clients: Option<usize>,
}

/// One resolved role kind.
#[derive(Debug, Clone)]
pub struct RoleGroup {
    pub count: usize,
    pub base_port: u16,
    pub command: String,
    pub build_gate: bool,
}

/// Immutable runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub session: String,
    pub pause: Duration,
    pub poll_interval: Duration,
    pub build_command: String,
    pub success_marker: String,
    pub failure_marker: String,
    /// `None` disables the build-gate timeout.
    pub build_timeout: Option<Duration>,
    pub replicas: RoleGroup,
    pub clients: RoleGroup,
    pub interrupt_process_group: bool,
    splits: Option<Vec<SplitOp>>,
}

impl ClusterConfig {
    /// Merge the config file and CLI overrides into a resolved value.
    pub fn resolve(file: ConfigFile, overrides: &Overrides) -> Result<Self> {
        let session = sanitize_session_name(
            overrides
                .session
                .as_deref()
                .or(file.session.as_deref())
                .unwrap_or(DEFAULT_SESSION),
        );
        if session.is_empty() {
            bail!("session name is empty");
        }

        let build = file.build.unwrap_or_default();
        let replicas_section = file.replicas.unwrap_or_default();
        let clients_section = file.clients.unwrap_or_default();

        let replicas = resolve_group(
            RoleKind::Replica,
            &replicas_section,
            overrides.replicas,
            DEFAULT_REPLICA_COUNT,
            DEFAULT_REPLICA_BASE_PORT,
            false,
        )?;
        let clients = resolve_group(
            RoleKind::Client,
            &clients_section,
            overrides.clients,
            DEFAULT_CLIENT_COUNT,
            DEFAULT_CLIENT_BASE_PORT,
            true,
        )?;
        if replicas.count + clients.count == 0 {
            bail!("no roles configured (set [replicas].count / [clients].count)");
        }

        let timeout_secs = build.timeout_secs.unwrap_or(DEFAULT_BUILD_TIMEOUT_SECS);
        let config = Self {
            session,
            pause: Duration::from_millis(file.pause_ms.unwrap_or(DEFAULT_PAUSE_MS)),
            poll_interval: Duration::from_millis(build.poll_ms.unwrap_or(DEFAULT_POLL_MS)),
            build_command: build
                .command
                .unwrap_or_else(|| DEFAULT_BUILD_COMMAND.to_string()),
            success_marker: build
                .success
                .unwrap_or_else(|| DEFAULT_SUCCESS_MARKER.to_string()),
            failure_marker: build
                .failure
                .unwrap_or_else(|| DEFAULT_FAILURE_MARKER.to_string()),
            build_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            replicas,
            clients,
            interrupt_process_group: file
                .interrupt
                .unwrap_or_default()
                .process_group
                .unwrap_or(false),
            splits: file.layout.unwrap_or_default().splits,
        };
        config
            .geometry()
            .validate(config.replicas.count + config.clients.count)?;
        Ok(config)
    }

    /// The pane layout: the configured split sequence, or the generated
    /// default for the configured counts.
    pub fn geometry(&self) -> Geometry {
        match &self.splits {
            Some(splits) => Geometry::new(splits.clone()),
            None => Geometry::stacked(self.replicas.count, self.clients.count),
        }
    }

    /// Build the fixed role set: replicas first, then clients, ascending
    /// index within kind. Client identities continue after the replicas.
    pub fn roles(&self) -> Result<Vec<Role>> {
        let mut roles = Vec::with_capacity(self.replicas.count + self.clients.count);
        for index in 1..=self.replicas.count {
            roles.push(self.role(RoleKind::Replica, &self.replicas, index, index)?);
        }
        for index in 1..=self.clients.count {
            let id = self.replicas.count + index;
            roles.push(self.role(RoleKind::Client, &self.clients, index, id)?);
        }
        Ok(roles)
    }

    fn role(&self, kind: RoleKind, group: &RoleGroup, index: usize, id: usize) -> Result<Role> {
        let port = group.base_port + (index as u16) - 1;
        let command = render_command(&group.command, id, port);
        let parts = shell_words::split(&command)
            .with_context(|| format!("failed to parse command for {} {index}", kind.label()))?;
        if parts.is_empty() {
            bail!("empty command for {} {index}", kind.label());
        }
        Ok(Role {
            kind,
            index,
            id,
            port,
            command,
            build_gate: group.build_gate,
        })
    }
}

fn resolve_group(
    kind: RoleKind,
    section: &RoleSection,
    count_override: Option<usize>,
    default_count: usize,
    default_base_port: u16,
    default_build_gate: bool,
) -> Result<RoleGroup> {
    let count = count_override.or(section.count).unwrap_or(default_count);
    let command = match &section.command {
        Some(command) => command.clone(),
        None if count == 0 => String::new(),
        None => {
            return Err(anyhow!(
                "no command configured for {}s (set [{}s].command in muster.toml)",
                kind.label().to_lowercase(),
                kind.label().to_lowercase(),
            ))
        }
    };
    Ok(RoleGroup {
        count,
        base_port: section.base_port.unwrap_or(default_base_port),
        command,
        build_gate: section.build_gate.unwrap_or(default_build_gate),
    })
}

/// Substitute the per-role placeholders into a command template.
fn render_command(template: &str, id: usize, port: u16) -> String {
    template
        .replace("{id}", &id.to_string())
        .replace("{port}", &port.to_string())
}

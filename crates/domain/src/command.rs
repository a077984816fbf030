//! Command — a traceable, provenance-carrying request to change actuator state.
//!
//! Every state change in the control plane is expressed as a [`Command`]. A
//! command's origin is either a terminal [`CommandSource`] rank or another
//! command, forming a singly-linked causality chain: scheduler tick → automatic
//! rule → actuator command. Chains are expected to stay shallow (≤5 hops);
//! no length bound is enforced.
//!
//! The human-readable [`reason_trace`](Command::reason_trace) exists purely for
//! diagnostics. It must never gate behavior — only the terminal rank does,
//! through [`is_force_action`](Command::is_force_action) and
//! [`is_initial`](Command::is_initial).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::block::{BlockExpiry, CollisionSolving};
use crate::id::ActuatorId;
use crate::time::Timestamp;

/// Rank classifying who or what initiated a command.
///
/// The ranks carry a *partial* priority order:
/// `Unknown < Initial < Automatic < Api < Manual ≈ Force`. `Api` is ranked
/// above `Automatic` because API calls may be manually triggered, and at/below
/// `Manual`/`Force` for force-action purposes. The rank is used only to
/// classify — it is never compared numerically beyond the force predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    Unknown,
    /// Startup snapshot replay; see [`Command::is_initial`].
    Initial,
    /// Scheduled or rule-driven control.
    Automatic,
    /// External API call, possibly manually triggered.
    Api,
    Manual,
    Force,
}

impl CommandSource {
    /// Whether commands rooted in this rank bypass automatic blocks.
    #[must_use]
    pub fn is_forcing(self) -> bool {
        matches!(self, Self::Api | Self::Manual | Self::Force)
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Initial => "initial",
            Self::Automatic => "automatic",
            Self::Api => "api",
            Self::Manual => "manual",
            Self::Force => "force",
        };
        f.write_str(name)
    }
}

/// Where a command came from: a terminal rank or a parent command.
#[derive(Debug, Clone)]
pub enum CommandOrigin {
    Rank(CommandSource),
    Parent(Arc<Command>),
}

impl From<CommandSource> for CommandOrigin {
    fn from(rank: CommandSource) -> Self {
        Self::Rank(rank)
    }
}

impl From<Arc<Command>> for CommandOrigin {
    fn from(parent: Arc<Command>) -> Self {
        Self::Parent(parent)
    }
}

impl From<&Arc<Command>> for CommandOrigin {
    fn from(parent: &Arc<Command>) -> Self {
        Self::Parent(Arc::clone(parent))
    }
}

/// Discriminated payload identifying the concrete command variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Switch an on/off actuator.
    SetActuatorState { actuator_id: ActuatorId, on: bool },
    /// Invert an on/off actuator.
    ToggleActuator { actuator_id: ActuatorId },
    /// Move a shutter to an absolute level (0=closed..100=open).
    SetShutterLevel { actuator_id: ActuatorId, level: u8 },
    /// Re-apply the level the automatic logic currently dictates.
    RestoreDesiredPosition { actuator_id: ActuatorId },
    /// Suppress automatic control of an actuator for a while.
    DisableAutomatic {
        actuator_id: ActuatorId,
        expiry: BlockExpiry,
        policy: CollisionSolving,
        revert_on_lift: bool,
    },
    /// Remove an active suppression window early.
    LiftAutomaticBlock { actuator_id: ActuatorId },
    /// Fan out a level to every shutter of one floor (or the whole house).
    SetAllShuttersOfFloor { level: u8, floor: Option<String> },
    /// Root of a scheduler-issued chain; carries the trigger name.
    TimeTriggerFired { trigger: String },
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetActuatorState { actuator_id, on } => {
                write!(f, "set_actuator_state({actuator_id}, on={on})")
            }
            Self::ToggleActuator { actuator_id } => write!(f, "toggle_actuator({actuator_id})"),
            Self::SetShutterLevel { actuator_id, level } => {
                write!(f, "set_shutter_level({actuator_id}, {level})")
            }
            Self::RestoreDesiredPosition { actuator_id } => {
                write!(f, "restore_desired_position({actuator_id})")
            }
            Self::DisableAutomatic { actuator_id, .. } => {
                write!(f, "disable_automatic({actuator_id})")
            }
            Self::LiftAutomaticBlock { actuator_id } => {
                write!(f, "lift_automatic_block({actuator_id})")
            }
            Self::SetAllShuttersOfFloor { level, floor } => match floor {
                Some(floor) => write!(f, "set_all_shutters_of_floor({level}, {floor})"),
                None => write!(f, "set_all_shutters_of_floor({level})"),
            },
            Self::TimeTriggerFired { trigger } => write!(f, "time_trigger_fired({trigger})"),
        }
    }
}

/// A provenance-carrying state-change request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Command {
    origin: CommandOrigin,
    reason: Option<String>,
    timestamp: Timestamp,
    kind: CommandKind,
}

impl Command {
    /// Construct a command; the timestamp is assigned here.
    #[must_use]
    pub fn new(origin: impl Into<CommandOrigin>, kind: CommandKind) -> Self {
        Self {
            origin: origin.into(),
            reason: None,
            timestamp: crate::time::now(),
            kind,
        }
    }

    /// Attach a free-text reason for diagnostics.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Derive a child command continuing this chain.
    #[must_use]
    pub fn derive(self: &Arc<Self>, kind: CommandKind) -> Self {
        Self::new(self, kind)
    }

    // Factory constructors, one per kind.

    #[must_use]
    pub fn set_actuator_state(
        origin: impl Into<CommandOrigin>,
        actuator_id: ActuatorId,
        on: bool,
    ) -> Self {
        Self::new(origin, CommandKind::SetActuatorState { actuator_id, on })
    }

    #[must_use]
    pub fn toggle_actuator(origin: impl Into<CommandOrigin>, actuator_id: ActuatorId) -> Self {
        Self::new(origin, CommandKind::ToggleActuator { actuator_id })
    }

    #[must_use]
    pub fn set_shutter_level(
        origin: impl Into<CommandOrigin>,
        actuator_id: ActuatorId,
        level: u8,
    ) -> Self {
        Self::new(origin, CommandKind::SetShutterLevel { actuator_id, level })
    }

    #[must_use]
    pub fn restore_desired_position(
        origin: impl Into<CommandOrigin>,
        actuator_id: ActuatorId,
    ) -> Self {
        Self::new(origin, CommandKind::RestoreDesiredPosition { actuator_id })
    }

    #[must_use]
    pub fn disable_automatic(
        origin: impl Into<CommandOrigin>,
        actuator_id: ActuatorId,
        expiry: BlockExpiry,
        policy: CollisionSolving,
        revert_on_lift: bool,
    ) -> Self {
        Self::new(
            origin,
            CommandKind::DisableAutomatic {
                actuator_id,
                expiry,
                policy,
                revert_on_lift,
            },
        )
    }

    #[must_use]
    pub fn lift_automatic_block(
        origin: impl Into<CommandOrigin>,
        actuator_id: ActuatorId,
    ) -> Self {
        Self::new(origin, CommandKind::LiftAutomaticBlock { actuator_id })
    }

    #[must_use]
    pub fn set_all_shutters_of_floor(
        origin: impl Into<CommandOrigin>,
        level: u8,
        floor: Option<String>,
    ) -> Self {
        Self::new(origin, CommandKind::SetAllShuttersOfFloor { level, floor })
    }

    #[must_use]
    pub fn time_trigger_fired(origin: impl Into<CommandOrigin>, trigger: impl Into<String>) -> Self {
        Self::new(
            origin,
            CommandKind::TimeTriggerFired {
                trigger: trigger.into(),
            },
        )
    }

    // Accessors.

    #[must_use]
    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The rank at the root of the causality chain, O(chain length).
    #[must_use]
    pub fn terminal_rank(&self) -> CommandSource {
        let mut current = self;
        loop {
            match &current.origin {
                CommandOrigin::Rank(rank) => return *rank,
                CommandOrigin::Parent(parent) => current = parent,
            }
        }
    }

    /// True when the chain is rooted in a Manual/Api/Force rank, regardless of
    /// depth. Checked instead of rank comparison so a manual command nested
    /// inside automatic machinery still wins.
    #[must_use]
    pub fn is_force_action(&self) -> bool {
        self.terminal_rank().is_forcing()
    }

    /// True when the chain is rooted in a startup snapshot replay.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.terminal_rank() == CommandSource::Initial
    }

    /// Concatenated ancestor reasons, most distant first. Diagnostics only.
    #[must_use]
    pub fn reason_trace(&self) -> String {
        let mut reasons: Vec<String> = Vec::new();
        let mut current = self;
        loop {
            reasons.push(match &current.reason {
                Some(reason) => reason.clone(),
                None => current.kind.to_string(),
            });
            match &current.origin {
                CommandOrigin::Rank(_) => break,
                CommandOrigin::Parent(parent) => current = parent,
            }
        }
        reasons.reverse();
        reasons.join(" -> ")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.kind, self.terminal_rank())
    }
}

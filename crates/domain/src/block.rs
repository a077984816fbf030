//! Automatic block — a temporary suppression window over one actuator.
//!
//! While a block is active, automatic-rank commands must not change the
//! actuator's state; manual, API, and force commands always pass. The
//! [`CollisionSolving`] policy decides what happens when a new block request
//! arrives while one is already active for the same actuator.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::id::ActuatorId;
use crate::time::Timestamp;

/// Policy deciding how a new block request interacts with an existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionSolving {
    /// Replace the active block only if the new expiry is later.
    #[default]
    OverrideIfGreaterDuration,
    /// Replace the active block unconditionally.
    AlwaysOverride,
    /// Leave the active block untouched; the new request is a no-op.
    NeverOverrideWhileActive,
}

/// When a block should end: relative duration or absolute date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockExpiry {
    In(Duration),
    Until(Timestamp),
}

impl BlockExpiry {
    /// Resolve to an absolute expiry instant.
    #[must_use]
    pub fn resolve(self, now: Timestamp) -> Timestamp {
        match self {
            Self::In(duration) => now + duration,
            Self::Until(instant) => instant,
        }
    }
}

/// A suppression window preventing automatic commands from altering an actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomaticBlock {
    pub actuator_id: ActuatorId,
    pub expires_at: Timestamp,
    pub policy: CollisionSolving,
    /// Re-apply the automatic desired state once the block is lifted.
    pub revert_on_lift: bool,
    pub created_at: Timestamp,
}

impl AutomaticBlock {
    /// Build a block from a request.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveDuration`] when the resolved
    /// expiry is not in the future.
    pub fn new(
        actuator_id: ActuatorId,
        expiry: BlockExpiry,
        policy: CollisionSolving,
        revert_on_lift: bool,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let expires_at = expiry.resolve(now);
        if expires_at <= now {
            return Err(ValidationError::NonPositiveDuration);
        }
        Ok(Self {
            actuator_id,
            expires_at,
            policy,
            revert_on_lift,
            created_at: now,
        })
    }

    /// Whether the window has already passed.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }
}

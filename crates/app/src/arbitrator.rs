//! Automatic-block arbitrator — per-actuator suppression windows.
//!
//! Holds at most one active [`AutomaticBlock`] per actuator. While a block is
//! active, automatic-rank commands are refused; commands whose provenance
//! chain is rooted in Manual/Api/Force bypass the block entirely (checked via
//! [`Command::is_force_action`], not by rank comparison, so a manual command
//! nested inside automatic machinery still wins).
//!
//! The arbitrator is side-effect free: lifting or expiring a block reports a
//! [`LiftOutcome`] and the dispatch loop turns `revert` into a
//! restore-desired-position command.

use std::collections::HashMap;

use hestia_domain::block::{AutomaticBlock, CollisionSolving};
use hestia_domain::command::Command;
use hestia_domain::id::ActuatorId;
use hestia_domain::time::Timestamp;

use crate::timer::{TimerHandle, TimerKey, TimerQueue};

/// What `request_block` did with the incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRequestOutcome {
    /// No block was active; the new one is installed.
    Installed,
    /// An active block was replaced per the incoming request's policy.
    Replaced,
    /// The active block won the collision; the request was dropped.
    KeptExisting,
}

/// Result of removing a block (early lift or expiry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiftOutcome {
    /// The actuator should re-apply its automatic desired state.
    pub revert: bool,
}

#[derive(Debug)]
struct ActiveBlock {
    block: AutomaticBlock,
    timer: TimerHandle,
}

/// Per-actuator suppression windows with deterministic collision resolution.
#[derive(Debug, Default)]
pub struct BlockArbitrator {
    blocks: HashMap<ActuatorId, ActiveBlock>,
}

impl BlockArbitrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or collide a suppression window; arms the expiry timer.
    ///
    /// The *incoming* request's [`CollisionSolving`] decides the collision.
    /// An active-but-expired block whose timer has not surfaced yet counts as
    /// absent.
    pub fn request_block(
        &mut self,
        timers: &mut TimerQueue,
        block: AutomaticBlock,
        now: Timestamp,
    ) -> BlockRequestOutcome {
        let actuator_id = block.actuator_id;
        let replacing = match self.blocks.get(&actuator_id) {
            None => None,
            Some(active) if active.block.is_expired(now) => Some(active.timer),
            Some(active) => match block.policy {
                CollisionSolving::AlwaysOverride => Some(active.timer),
                CollisionSolving::OverrideIfGreaterDuration => {
                    if block.expires_at > active.block.expires_at {
                        Some(active.timer)
                    } else {
                        tracing::debug!(
                            actuator_id = %actuator_id,
                            active_until = %active.block.expires_at,
                            requested_until = %block.expires_at,
                            "block request loses on duration, keeping active block"
                        );
                        return BlockRequestOutcome::KeptExisting;
                    }
                }
                CollisionSolving::NeverOverrideWhileActive => {
                    tracing::debug!(
                        actuator_id = %actuator_id,
                        "active block may not be overridden, dropping request"
                    );
                    return BlockRequestOutcome::KeptExisting;
                }
            },
        };

        let outcome = match replacing {
            Some(old_timer) => {
                timers.cancel(old_timer);
                BlockRequestOutcome::Replaced
            }
            None => BlockRequestOutcome::Installed,
        };

        let timer = timers.arm(block.expires_at, TimerKey::BlockExpiry(actuator_id));
        tracing::info!(
            actuator_id = %actuator_id,
            until = %block.expires_at,
            revert = block.revert_on_lift,
            "automatic control suppressed"
        );
        self.blocks.insert(actuator_id, ActiveBlock { block, timer });
        outcome
    }

    /// Whether `command` may change the actuator's state right now.
    ///
    /// True when no block exists, when the command is a force action, or when
    /// the block has already expired. A refused command is skipped by the
    /// caller, never queued.
    #[must_use]
    pub fn check_allowed(&self, actuator_id: ActuatorId, command: &Command, now: Timestamp) -> bool {
        match self.blocks.get(&actuator_id) {
            None => true,
            Some(active) => {
                command.is_force_action() || active.block.is_expired(now)
            }
        }
    }

    /// Lift a block early. Idempotent: a second lift returns `None`.
    pub fn lift(&mut self, timers: &mut TimerQueue, actuator_id: ActuatorId) -> Option<LiftOutcome> {
        let active = self.blocks.remove(&actuator_id)?;
        timers.cancel(active.timer);
        tracing::info!(actuator_id = %actuator_id, "automatic block lifted");
        Some(LiftOutcome {
            revert: active.block.revert_on_lift,
        })
    }

    /// Handle an expiry timer surfacing for the actuator's block.
    ///
    /// Returns `None` when the block was already lifted or replaced (the
    /// replacement cancelled this timer, so a surviving fire means the stored
    /// block really ended).
    pub fn on_expiry(&mut self, actuator_id: ActuatorId, now: Timestamp) -> Option<LiftOutcome> {
        let expired = self
            .blocks
            .get(&actuator_id)
            .is_some_and(|active| active.block.is_expired(now));
        if !expired {
            return None;
        }
        let active = self.blocks.remove(&actuator_id)?;
        tracing::info!(actuator_id = %actuator_id, "automatic block expired");
        Some(LiftOutcome {
            revert: active.block.revert_on_lift,
        })
    }

    /// The active block for an actuator, if any.
    #[must_use]
    pub fn active_block(&self, actuator_id: ActuatorId) -> Option<&AutomaticBlock> {
        self.blocks.get(&actuator_id).map(|active| &active.block)
    }
}

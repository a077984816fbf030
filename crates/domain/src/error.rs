//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! Note that two failure classes from the control plane's taxonomy are *not*
//! errors: invalid transitions (unsupported intermediate level on an
//! uncalibrated shutter) and safety refusals (closing over an open window)
//! are decisions — logged and dropped, never propagated.

/// Top-level error for the hestia workspace.
#[derive(Debug, thiserror::Error)]
pub enum HestiaError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("device gateway error")]
    Gateway(#[from] GatewayError),
}

/// A domain invariant was violated during construction or mutation.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("shutter level {0} is out of range (0..=100)")]
    LevelOutOfRange(u8),

    #[error("clock time {hour}:{minute:02} is not a valid time of day")]
    InvalidClockTime { hour: u32, minute: u32 },

    #[error("block duration must be positive")]
    NonPositiveDuration,
}

/// A referenced entity does not exist.
#[derive(Debug, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// A device write could not be dispatched.
///
/// Surfaced to callers but never retried inside the core; retry and
/// reconnection are the gateway's concern.
#[derive(Debug, thiserror::Error)]
#[error("device write to `{point_id}` failed: {message}")]
pub struct GatewayError {
    pub point_id: String,
    pub message: String,
}

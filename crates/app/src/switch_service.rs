//! Per-switch command handling for on/off actuators.
//!
//! Much simpler than shutters: no safety overrides, no calibration. The
//! service keeps the last commanded state, the desired state recorded while
//! automatic control is suppressed, and the live flag guarding against late
//! startup snapshots.

use hestia_domain::id::ActuatorId;
use hestia_domain::time::Timestamp;

use crate::ports::gateway::{DeviceGateway, PointValue};

/// Outcome of arbitrating an on/off request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    Dispatched { on: bool },
    NoChange,
    DiscardedLateInitial,
}

pub struct SwitchService<G> {
    actuator_id: ActuatorId,
    name: String,
    state_point: String,
    gateway: G,
    on: bool,
    desired_on: Option<bool>,
    live: bool,
}

impl<G: DeviceGateway> SwitchService<G> {
    pub fn new(
        actuator_id: ActuatorId,
        name: impl Into<String>,
        state_point: impl Into<String>,
        gateway: G,
    ) -> Self {
        Self {
            actuator_id,
            name: name.into(),
            state_point: state_point.into(),
            gateway,
            on: false,
            desired_on: None,
            live: false,
        }
    }

    #[must_use]
    pub fn actuator_id(&self) -> ActuatorId {
        self.actuator_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Arbitrate and, when it changes anything, dispatch an on/off write.
    #[tracing::instrument(skip(self), fields(switch = %self.name))]
    pub async fn set_on(&mut self, on: bool, is_initial: bool, _now: Timestamp) -> SwitchDecision {
        if is_initial {
            if self.live {
                tracing::debug!(on, "late startup snapshot discarded");
                return SwitchDecision::DiscardedLateInitial;
            }
        } else {
            self.live = true;
        }

        if on == self.on {
            return SwitchDecision::NoChange;
        }

        if let Err(err) = self
            .gateway
            .set_state(&self.state_point, PointValue::OnOff(on))
            .await
        {
            tracing::warn!(error = %err, "switch dispatch failed");
        }
        self.on = on;
        self.desired_on = Some(on);
        SwitchDecision::Dispatched { on }
    }

    /// Invert the current state.
    pub async fn toggle(&mut self, now: Timestamp) -> SwitchDecision {
        let target = !self.on;
        self.set_on(target, false, now).await
    }

    /// Record the state automatic logic currently wants, without switching.
    pub fn record_desired(&mut self, on: bool) {
        self.desired_on = Some(on);
    }

    #[must_use]
    pub fn desired_on(&self) -> Option<bool> {
        self.desired_on
    }

    /// Ingest an on/off reading from telemetry.
    pub fn observe_on(&mut self, on: bool) {
        self.on = on;
    }
}

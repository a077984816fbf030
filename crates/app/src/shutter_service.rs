//! Per-shutter command handling: arbitration, gateway dispatch, telemetry
//! intake, and calibration milestones.
//!
//! The service wraps the pure [`ShutterState`] decision logic with the side
//! effects it implies: device writes through the gateway, operator
//! notifications for safety refusals and learned travel times.

use hestia_domain::id::ActuatorId;
use hestia_domain::shutter::{
    HandleState, LevelDecision, MovementOutcome, MovementSignal, ShutterState,
};
use hestia_domain::time::Timestamp;

use crate::ports::gateway::{DeviceGateway, PointValue};
use crate::ports::notify::NotificationSink;

/// Safety refusals are spoken as well as sent, at a moderate volume.
const SAFETY_WARNING_VOLUME: u8 = 40;

pub struct ShutterService<G, N> {
    actuator_id: ActuatorId,
    name: String,
    level_point: String,
    gateway: G,
    notifier: N,
    state: ShutterState,
}

impl<G: DeviceGateway, N: NotificationSink> ShutterService<G, N> {
    pub fn new(
        actuator_id: ActuatorId,
        name: impl Into<String>,
        level_point: impl Into<String>,
        gateway: G,
        notifier: N,
    ) -> Self {
        Self {
            actuator_id,
            name: name.into(),
            level_point: level_point.into(),
            gateway,
            notifier,
            state: ShutterState::new(),
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

    /// Seed travel times persisted from a previous run.
    pub fn restore_calibration(&mut self, ms_open: Option<u64>, ms_close: Option<u64>) {
        self.state.restore_calibration(ms_open, ms_close);
    }

    /// Arbitrate and, when allowed, dispatch a level change.
    ///
    /// Gateway failures are logged, never propagated: the write is
    /// fire-and-forget and telemetry is the source of truth for its effect.
    #[tracing::instrument(skip(self), fields(shutter = %self.name))]
    pub async fn set_level(
        &mut self,
        requested: u8,
        is_initial: bool,
        skip_safety_warning: bool,
        now: Timestamp,
    ) -> LevelDecision {
        let decision = self.state.decide_set_level(requested, is_initial);
        match decision {
            LevelDecision::Dispatch { level } => {
                if let Err(err) = self
                    .gateway
                    .set_state(&self.level_point, PointValue::Level(level))
                    .await
                {
                    tracing::warn!(error = %err, "shutter level dispatch failed");
                }
                self.state.note_dispatch(level, now);
            }
            LevelDecision::NoChange => {}
            LevelDecision::DiscardedLateInitial => {
                tracing::debug!(requested, "late startup snapshot discarded");
            }
            LevelDecision::RefusedOpenHandle => {
                // Remember the intent so closing the handle can restore it.
                self.state.set_desired(requested);
                tracing::info!(requested, "refused to close over an open window handle");
                if !skip_safety_warning {
                    let message = format!(
                        "Not closing shutter '{}': a window handle is open.",
                        self.name
                    );
                    self.notifier.inform(&message).await;
                    self.notifier.speak(&message, SAFETY_WARNING_VOLUME).await;
                }
            }
            LevelDecision::UnsupportedUncalibrated { level } => {
                tracing::warn!(level, "intermediate level needs calibration, dropped");
            }
        }
        decision
    }

    /// Record the level automatic logic currently wants, without moving.
    pub fn record_desired(&mut self, level: u8) {
        self.state.set_desired(level);
    }

    #[must_use]
    pub fn desired_level(&self) -> Option<u8> {
        self.state.desired_level()
    }

    #[must_use]
    pub fn effective_level(&self, now: Timestamp) -> u8 {
        self.state.effective_level(now)
    }

    #[must_use]
    pub fn any_handle_open(&self) -> bool {
        self.state.any_handle_open()
    }

    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.state.is_moving()
    }

    #[must_use]
    pub fn calibration(&self) -> (Option<u64>, Option<u64>) {
        (self.state.ms_to_fully_open(), self.state.ms_to_fully_close())
    }

    /// Ingest an absolute level reading.
    pub fn observe_level(&mut self, level: u8) {
        self.state.observe_level(level);
    }

    /// Ingest a window-handle reading; returns the previous open-state so the
    /// caller can react to open -> closed transitions.
    pub fn observe_handle(&mut self, sensor: &str, handle: HandleState) -> bool {
        let was_open = self.state.any_handle_open();
        self.state.set_handle(sensor, handle);
        was_open
    }

    /// Ingest a movement-signal transition; announces calibration milestones.
    pub async fn observe_movement(
        &mut self,
        signal: MovementSignal,
        now: Timestamp,
    ) -> Option<MovementOutcome> {
        let outcome = self.state.apply_movement(signal, now)?;
        match outcome {
            MovementOutcome::LearnedOpenTime { ms } => {
                tracing::info!(ms, "learned full opening travel time");
                self.notifier
                    .inform(&format!(
                        "Shutter '{}' calibrated: opens fully in {:.1}s.",
                        self.name,
                        ms as f64 / 1000.0
                    ))
                    .await;
            }
            MovementOutcome::LearnedCloseTime { ms } => {
                tracing::info!(ms, "learned full closing travel time");
                self.notifier
                    .inform(&format!(
                        "Shutter '{}' calibrated: closes fully in {:.1}s.",
                        self.name,
                        ms as f64 / 1000.0
                    ))
                    .await;
            }
            MovementOutcome::EstimatedLevel { level } => {
                tracing::debug!(level, "estimated level from partial run");
            }
        }
        Some(outcome)
    }

    /// Drop a measurement run whose stop signal never arrived.
    pub fn abandon_measurement(&mut self) {
        if self.state.abandon_measurement() {
            tracing::warn!(shutter = %self.name, "movement measurement abandoned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SpyGateway, SpyNotifier};
    use chrono::{TimeDelta, TimeZone, Utc};
    use std::sync::Arc;

    fn at_ms(ms: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn service(
        gateway: &Arc<SpyGateway>,
        notifier: &Arc<SpyNotifier>,
    ) -> ShutterService<Arc<SpyGateway>, Arc<SpyNotifier>> {
        ShutterService::new(
            ActuatorId::new(),
            "living room",
            "point-level",
            Arc::clone(gateway),
            Arc::clone(notifier),
        )
    }

    #[tokio::test]
    async fn should_dispatch_allowed_level_to_gateway() {
        let gateway = Arc::new(SpyGateway::default());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);

        let decision = shutter.set_level(100, false, false, at_ms(0)).await;
        assert_eq!(decision, LevelDecision::Dispatch { level: 100 });
        assert_eq!(
            gateway.writes(),
            vec![("point-level".to_string(), PointValue::Level(100))]
        );
        assert_eq!(shutter.effective_level(at_ms(1_000)), 100);
    }

    #[tokio::test]
    async fn should_swallow_gateway_failure() {
        let gateway = Arc::new(SpyGateway::failing());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);

        let decision = shutter.set_level(100, false, false, at_ms(0)).await;
        assert_eq!(decision, LevelDecision::Dispatch { level: 100 });
    }

    #[tokio::test]
    async fn should_notify_when_refusing_over_open_handle() {
        let gateway = Arc::new(SpyGateway::default());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);
        shutter.observe_level(100);
        shutter.observe_handle("left", HandleState::Open);

        let decision = shutter.set_level(0, false, false, at_ms(0)).await;
        assert_eq!(decision, LevelDecision::RefusedOpenHandle);
        assert!(gateway.writes().is_empty());
        assert_eq!(notifier.informed().len(), 1);
        assert_eq!(notifier.spoken().len(), 1);
        // The refused intent is remembered for a later restore.
        assert_eq!(shutter.desired_level(), Some(0));
    }

    #[tokio::test]
    async fn should_skip_safety_warning_when_asked() {
        let gateway = Arc::new(SpyGateway::default());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);
        shutter.observe_level(100);
        shutter.observe_handle("left", HandleState::Open);

        shutter.set_level(0, false, true, at_ms(0)).await;
        assert!(notifier.informed().is_empty());
        assert!(notifier.spoken().is_empty());
    }

    #[tokio::test]
    async fn should_report_handle_open_to_closed_transition() {
        let gateway = Arc::new(SpyGateway::default());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);

        assert!(!shutter.observe_handle("left", HandleState::Open));
        assert!(shutter.observe_handle("left", HandleState::Closed));
        assert!(!shutter.any_handle_open());
    }

    #[tokio::test]
    async fn should_announce_learned_travel_time() {
        let gateway = Arc::new(SpyGateway::default());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);
        shutter.observe_level(0);

        shutter.set_level(100, false, false, at_ms(0)).await;
        shutter.observe_movement(MovementSignal::Up, at_ms(0)).await;
        let outcome = shutter
            .observe_movement(MovementSignal::Stopped, at_ms(25_000))
            .await;

        assert_eq!(outcome, Some(MovementOutcome::LearnedOpenTime { ms: 25_000 }));
        assert_eq!(notifier.informed().len(), 1);
        assert!(notifier.informed()[0].contains("25.0s"));
    }

    #[tokio::test]
    async fn should_seed_restored_calibration() {
        let gateway = Arc::new(SpyGateway::default());
        let notifier = Arc::new(SpyNotifier::default());
        let mut shutter = service(&gateway, &notifier);
        shutter.restore_calibration(Some(25_000), Some(20_000));

        let decision = shutter.set_level(30, false, false, at_ms(0)).await;
        assert_eq!(decision, LevelDecision::Dispatch { level: 30 });
    }
}

//! Shutter state — position arbitration, safety flags, and travel-time
//! self-calibration.
//!
//! Level convention: `0` is fully closed, `100` is fully open.
//!
//! Many roller-shutter actuators report only a coarse tri-state movement
//! signal (up / down / stopped) instead of an absolute position. This module
//! learns the full travel time from observed clean end-to-end runs and then
//! estimates absolute positions for partial runs by linear interpolation.

use std::collections::HashMap;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Telemetry is noisy and delayed right after a command; inside this window a
/// pending commanded value wins over a disagreeing raw reading.
const SETTLE_WINDOW_MS: i64 = 20_000;

/// State of a window handle attached to the shutter's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    Closed,
    Tilted,
    Open,
}

/// Coarse movement signal reported by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSignal {
    Up,
    Down,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveDirection {
    Up,
    Down,
}

/// The last commanded value, kept until telemetry confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSet {
    pub level: u8,
    pub at: Timestamp,
}

#[derive(Debug, Clone, Copy)]
struct MovementRun {
    direction: MoveDirection,
    started_at: Timestamp,
    start_level: u8,
    /// The extreme the outstanding command asked for, if any.
    requested: Option<u8>,
}

/// Outcome of arbitrating a requested level against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelDecision {
    /// Send the (possibly clamped) level to the device.
    Dispatch { level: u8 },
    /// Requested level equals the current one.
    NoChange,
    /// A startup snapshot arrived after real commands; dropped.
    DiscardedLateInitial,
    /// A handle is fully open; the shutter must not seal the window.
    RefusedOpenHandle,
    /// Intermediate target on an uncalibrated actuator; dropped.
    UnsupportedUncalibrated { level: u8 },
}

/// Noteworthy result of a movement-signal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementOutcome {
    /// A clean full upward traversal was measured.
    LearnedOpenTime { ms: u64 },
    /// A clean full downward traversal was measured.
    LearnedCloseTime { ms: u64 },
    /// A partial run was interpolated into an absolute level.
    EstimatedLevel { level: u8 },
}

/// Position and calibration state of one shutter actuator.
#[derive(Debug, Clone, Default)]
pub struct ShutterState {
    current_level: u8,
    desired_level: Option<u8>,
    pending: Option<PendingSet>,
    ms_to_fully_open: Option<u64>,
    ms_to_fully_close: Option<u64>,
    handles: HashMap<String, HandleState>,
    run: Option<MovementRun>,
    live: bool,
}

impl ShutterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arbitrate a requested level against safety overrides and calibration.
    ///
    /// The first non-initial request marks the actuator live; initial
    /// (startup-snapshot) requests arriving after that point are discarded so
    /// a late snapshot cannot undo a real user command.
    pub fn decide_set_level(&mut self, requested: u8, is_initial: bool) -> LevelDecision {
        if is_initial {
            if self.live {
                return LevelDecision::DiscardedLateInitial;
            }
        } else {
            self.live = true;
        }

        if requested == self.current_level {
            return LevelDecision::NoChange;
        }

        if self.any_handle_open() && requested < 100 {
            return LevelDecision::RefusedOpenHandle;
        }

        let level = if self.any_handle_tilted() && requested < 50 {
            50
        } else {
            requested
        };
        if level == self.current_level {
            return LevelDecision::NoChange;
        }

        if !self.is_calibrated() && !matches!(level, 0 | 50 | 100) {
            return LevelDecision::UnsupportedUncalibrated { level };
        }

        LevelDecision::Dispatch { level }
    }

    /// Record a dispatched device write.
    pub fn note_dispatch(&mut self, level: u8, now: Timestamp) {
        self.pending = Some(PendingSet { level, at: now });
        self.desired_level = Some(level);
    }

    /// Record the level the automatic logic currently wants, without moving.
    pub fn set_desired(&mut self, level: u8) {
        self.desired_level = Some(level);
    }

    #[must_use]
    pub fn desired_level(&self) -> Option<u8> {
        self.desired_level
    }

    /// The authoritative current level.
    ///
    /// Inside the settle window a disagreeing pending value wins; afterwards
    /// raw telemetry is authoritative again.
    #[must_use]
    pub fn effective_level(&self, now: Timestamp) -> u8 {
        match self.pending {
            Some(pending)
                if pending.level != self.current_level
                    && (now - pending.at) <= TimeDelta::milliseconds(SETTLE_WINDOW_MS) =>
            {
                pending.level
            }
            _ => self.current_level,
        }
    }

    /// Ingest an absolute level reading from telemetry.
    pub fn observe_level(&mut self, level: u8) {
        self.current_level = level.min(100);
        if self.pending.is_some_and(|p| p.level == self.current_level) {
            self.pending = None;
        }
    }

    /// Ingest a handle sensor reading.
    pub fn set_handle(&mut self, sensor: impl Into<String>, state: HandleState) {
        self.handles.insert(sensor.into(), state);
    }

    #[must_use]
    pub fn any_handle_open(&self) -> bool {
        self.handles.values().any(|h| *h == HandleState::Open)
    }

    #[must_use]
    pub fn any_handle_tilted(&self) -> bool {
        self.handles.values().any(|h| *h == HandleState::Tilted)
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.ms_to_fully_open.is_some() && self.ms_to_fully_close.is_some()
    }

    #[must_use]
    pub fn ms_to_fully_open(&self) -> Option<u64> {
        self.ms_to_fully_open
    }

    #[must_use]
    pub fn ms_to_fully_close(&self) -> Option<u64> {
        self.ms_to_fully_close
    }

    /// Whether a movement run is currently being measured.
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.run.is_some()
    }

    /// Ingest a tri-state movement signal transition.
    ///
    /// Starting to move records a measurement run; stopping either learns a
    /// calibration duration (clean full traversal) or, once calibrated,
    /// interpolates the partial run into an estimated absolute level.
    pub fn apply_movement(
        &mut self,
        signal: MovementSignal,
        now: Timestamp,
    ) -> Option<MovementOutcome> {
        match signal {
            MovementSignal::Up | MovementSignal::Down => {
                let direction = if signal == MovementSignal::Up {
                    MoveDirection::Up
                } else {
                    MoveDirection::Down
                };
                if self.run.is_some_and(|run| run.direction == direction) {
                    // Repeated signal, not a transition.
                    return None;
                }
                self.run = Some(MovementRun {
                    direction,
                    started_at: now,
                    start_level: self.current_level,
                    requested: self.pending.map(|p| p.level),
                });
                None
            }
            MovementSignal::Stopped => {
                let run = self.run.take()?;
                let elapsed_ms = u64::try_from((now - run.started_at).num_milliseconds())
                    .unwrap_or_default();

                match run.direction {
                    MoveDirection::Up if run.start_level == 0 && run.requested == Some(100) => {
                        self.ms_to_fully_open = Some(elapsed_ms);
                        self.settle_at(100);
                        Some(MovementOutcome::LearnedOpenTime { ms: elapsed_ms })
                    }
                    MoveDirection::Down if run.start_level == 100 && run.requested == Some(0) => {
                        self.ms_to_fully_close = Some(elapsed_ms);
                        self.settle_at(0);
                        Some(MovementOutcome::LearnedCloseTime { ms: elapsed_ms })
                    }
                    MoveDirection::Up => self.ms_to_fully_open.map(|full| {
                        let level = interpolate(run.start_level, elapsed_ms, full, true);
                        self.settle_at(level);
                        MovementOutcome::EstimatedLevel { level }
                    }),
                    MoveDirection::Down => self.ms_to_fully_close.map(|full| {
                        let level = interpolate(run.start_level, elapsed_ms, full, false);
                        self.settle_at(level);
                        MovementOutcome::EstimatedLevel { level }
                    }),
                }
            }
        }
    }

    /// Seed travel times learned in a previous run.
    pub fn restore_calibration(
        &mut self,
        ms_to_fully_open: Option<u64>,
        ms_to_fully_close: Option<u64>,
    ) {
        if ms_to_fully_open.is_some() {
            self.ms_to_fully_open = ms_to_fully_open;
        }
        if ms_to_fully_close.is_some() {
            self.ms_to_fully_close = ms_to_fully_close;
        }
    }

    /// Drop an in-flight measurement whose stop signal never arrived.
    ///
    /// Returns whether there was anything to abandon.
    pub fn abandon_measurement(&mut self) -> bool {
        self.run.take().is_some()
    }

    fn settle_at(&mut self, level: u8) {
        self.current_level = level;
        self.pending = None;
    }
}

/// Linear interpolation of elapsed time against the calibrated full travel.
fn interpolate(start_level: u8, elapsed_ms: u64, full_ms: u64, upward: bool) -> u8 {
    if full_ms == 0 {
        return start_level;
    }
    let delta = ((elapsed_ms as f64 / full_ms as f64) * 100.0).round() as i32;
    let level = if upward {
        i32::from(start_level) + delta
    } else {
        i32::from(start_level) - delta
    };
    level.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at_ms(ms: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn calibrated_shutter() -> ShutterState {
        let mut shutter = ShutterState::new();
        // Full close: 100 -> 0 in 20s.
        shutter.observe_level(100);
        shutter.note_dispatch(0, at_ms(0));
        shutter.apply_movement(MovementSignal::Down, at_ms(0));
        shutter.apply_movement(MovementSignal::Stopped, at_ms(20_000));
        // Full open: 0 -> 100 in 25s.
        shutter.note_dispatch(100, at_ms(30_000));
        shutter.apply_movement(MovementSignal::Up, at_ms(30_000));
        shutter.apply_movement(MovementSignal::Stopped, at_ms(55_000));
        assert!(shutter.is_calibrated());
        shutter
    }

    #[test]
    fn should_refuse_closing_when_any_handle_is_open() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(100);
        shutter.set_handle("left", HandleState::Open);

        let decision = shutter.decide_set_level(0, false);
        assert_eq!(decision, LevelDecision::RefusedOpenHandle);
        assert_eq!(shutter.effective_level(at_ms(0)), 100);
    }

    #[test]
    fn should_clamp_to_half_open_when_any_handle_is_tilted() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(100);
        shutter.set_handle("left", HandleState::Tilted);

        let decision = shutter.decide_set_level(0, false);
        assert_eq!(decision, LevelDecision::Dispatch { level: 50 });
    }

    #[test]
    fn should_allow_full_open_even_with_open_handle() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(30);
        shutter.set_handle("left", HandleState::Open);

        let decision = shutter.decide_set_level(100, false);
        assert_eq!(decision, LevelDecision::Dispatch { level: 100 });
    }

    #[test]
    fn should_be_noop_when_level_equals_current() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(50);
        assert_eq!(shutter.decide_set_level(50, false), LevelDecision::NoChange);
    }

    #[test]
    fn should_discard_initial_command_after_going_live() {
        let mut shutter = ShutterState::new();
        assert_eq!(
            shutter.decide_set_level(100, true),
            LevelDecision::Dispatch { level: 100 }
        );
        shutter.observe_level(100);
        // A real command arrives; the actuator is live now.
        assert_eq!(
            shutter.decide_set_level(0, false),
            LevelDecision::Dispatch { level: 0 }
        );
        // A late startup snapshot must not undo it.
        assert_eq!(
            shutter.decide_set_level(100, true),
            LevelDecision::DiscardedLateInitial
        );
    }

    #[test]
    fn should_reject_intermediate_levels_before_calibration() {
        let mut shutter = ShutterState::new();
        assert_eq!(
            shutter.decide_set_level(30, false),
            LevelDecision::UnsupportedUncalibrated { level: 30 }
        );
        assert_eq!(
            shutter.decide_set_level(50, false),
            LevelDecision::Dispatch { level: 50 }
        );
    }

    #[test]
    fn should_accept_intermediate_levels_once_calibrated() {
        let mut shutter = calibrated_shutter();
        assert_eq!(
            shutter.decide_set_level(30, false),
            LevelDecision::Dispatch { level: 30 }
        );
    }

    #[test]
    fn should_prefer_pending_value_inside_settle_window() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(0);
        shutter.note_dispatch(100, at_ms(0));

        // Noisy reading shortly after the command.
        assert_eq!(shutter.effective_level(at_ms(5_000)), 100);
        // After the settle window raw telemetry is authoritative again.
        assert_eq!(shutter.effective_level(at_ms(60_000)), 0);
    }

    #[test]
    fn should_clear_pending_when_telemetry_confirms() {
        let mut shutter = ShutterState::new();
        shutter.note_dispatch(100, at_ms(0));
        shutter.observe_level(100);
        assert_eq!(shutter.effective_level(at_ms(60_000)), 100);
    }

    #[test]
    fn should_learn_open_time_from_clean_full_upward_traversal() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(0);
        shutter.note_dispatch(100, at_ms(0));

        shutter.apply_movement(MovementSignal::Up, at_ms(0));
        let outcome = shutter.apply_movement(MovementSignal::Stopped, at_ms(25_000));

        assert_eq!(outcome, Some(MovementOutcome::LearnedOpenTime { ms: 25_000 }));
        assert_eq!(shutter.ms_to_fully_open(), Some(25_000));
        assert_eq!(shutter.effective_level(at_ms(26_000)), 100);
    }

    #[test]
    fn should_estimate_intermediate_level_after_calibration() {
        let mut shutter = calibrated_shutter();
        // Shutter is at 100; close for 10s out of the 20s full close.
        shutter.note_dispatch(50, at_ms(100_000));
        shutter.apply_movement(MovementSignal::Down, at_ms(100_000));
        let outcome = shutter.apply_movement(MovementSignal::Stopped, at_ms(110_000));

        assert_eq!(outcome, Some(MovementOutcome::EstimatedLevel { level: 50 }));
        let level = shutter.effective_level(at_ms(120_000));
        assert!(level > 0 && level < 100);
    }

    #[test]
    fn should_not_learn_from_partial_traversal() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(40);
        shutter.note_dispatch(100, at_ms(0));

        shutter.apply_movement(MovementSignal::Up, at_ms(0));
        let outcome = shutter.apply_movement(MovementSignal::Stopped, at_ms(12_000));

        // Start level was not 0, so nothing can be learned or estimated.
        assert_eq!(outcome, None);
        assert_eq!(shutter.ms_to_fully_open(), None);
    }

    #[test]
    fn should_ignore_repeated_movement_signal() {
        let mut shutter = ShutterState::new();
        shutter.observe_level(0);
        shutter.note_dispatch(100, at_ms(0));

        shutter.apply_movement(MovementSignal::Up, at_ms(0));
        // Duplicate signal must not restart the measurement clock.
        shutter.apply_movement(MovementSignal::Up, at_ms(10_000));
        let outcome = shutter.apply_movement(MovementSignal::Stopped, at_ms(25_000));
        assert_eq!(outcome, Some(MovementOutcome::LearnedOpenTime { ms: 25_000 }));
    }

    #[test]
    fn should_abandon_measurement_on_request() {
        let mut shutter = ShutterState::new();
        shutter.apply_movement(MovementSignal::Up, at_ms(0));
        assert!(shutter.is_moving());
        assert!(shutter.abandon_measurement());
        assert!(!shutter.abandon_measurement());
        assert!(!shutter.is_moving());
    }

    #[test]
    fn should_ignore_stop_without_preceding_movement() {
        let mut shutter = ShutterState::new();
        assert_eq!(shutter.apply_movement(MovementSignal::Stopped, at_ms(0)), None);
    }
}

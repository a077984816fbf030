//! Engine — the single-threaded cooperative dispatch loop.
//!
//! All mutable control-plane state (registry, services, arbitrator, scheduler,
//! timer queue) lives inside the engine task; no locks are involved. The loop
//! alternates between two sources: the unbounded inbox of [`Input`]s and the
//! earliest due timer. Every entry point is a guard boundary — a failing
//! command or telemetry reading is logged and dropped, never allowed to
//! disturb the loop's bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone};
use tokio::sync::mpsc;

use hestia_domain::block::{AutomaticBlock, BlockExpiry, CollisionSolving};
use hestia_domain::command::{Command, CommandKind, CommandSource};
use hestia_domain::error::ValidationError;
use hestia_domain::id::ActuatorId;
use hestia_domain::shutter::{HandleState, MovementOutcome, MovementSignal};
use hestia_domain::time::{self, Timestamp};

use crate::arbitrator::{BlockArbitrator, BlockRequestOutcome};
use crate::ports::gateway::DeviceGateway;
use crate::ports::notify::NotificationSink;
use crate::ports::store::StateStore;
use crate::registry::{PointBinding, Registry};
use crate::scheduler::TriggerScheduler;
use crate::shutter_service::ShutterService;
use crate::switch_service::SwitchService;
use crate::timer::{TimerHandle, TimerKey, TimerQueue};

/// A movement run whose stop signal never arrives is abandoned after this.
const CALIBRATION_TIMEOUT_SECS: i64 = 120;

/// Value carried by one telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryValue {
    Level(u8),
    Movement(MovementSignal),
    Handle(HandleState),
    OnOff(bool),
    /// Cloud cover in octas (0 clear .. 8 overcast).
    CloudCover { octas: u8 },
}

/// One reading from the device-telemetry gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub point_id: String,
    pub value: TelemetryValue,
}

/// Everything the engine inbox accepts.
#[derive(Debug)]
pub enum Input {
    Command(Command),
    Telemetry(TelemetryReading),
    Shutdown,
}

/// Cloneable sender half of the engine inbox.
///
/// Sends never block; once the engine has shut down they are logged and
/// dropped.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl EngineHandle {
    /// Create the inbox; the receiver goes into [`Engine::new`].
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Input>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send_command(&self, command: Command) {
        if self.tx.send(Input::Command(command)).is_err() {
            tracing::warn!("engine inbox closed, command dropped");
        }
    }

    pub fn send_telemetry(&self, reading: TelemetryReading) {
        if self.tx.send(Input::Telemetry(reading)).is_err() {
            tracing::warn!("engine inbox closed, telemetry dropped");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Input::Shutdown);
    }
}

pub struct Engine<G, N, S, Tz: TimeZone> {
    registry: Registry,
    shutters: HashMap<ActuatorId, ShutterService<G, N>>,
    switches: HashMap<ActuatorId, SwitchService<G>>,
    arbitrator: BlockArbitrator,
    scheduler: TriggerScheduler<Tz>,
    timers: TimerQueue,
    calibration_timers: HashMap<ActuatorId, TimerHandle>,
    store: S,
    notifier: N,
    inbox: mpsc::UnboundedReceiver<Input>,
    tick: Duration,
}

impl<G, N, S, Tz> Engine<G, N, S, Tz>
where
    G: DeviceGateway,
    N: NotificationSink,
    S: StateStore,
    Tz: TimeZone,
{
    pub fn new(
        registry: Registry,
        scheduler: TriggerScheduler<Tz>,
        store: S,
        notifier: N,
        inbox: mpsc::UnboundedReceiver<Input>,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            shutters: HashMap::new(),
            switches: HashMap::new(),
            arbitrator: BlockArbitrator::new(),
            scheduler,
            timers: TimerQueue::new(),
            calibration_timers: HashMap::new(),
            store,
            notifier,
            inbox,
            tick,
        }
    }

    pub fn add_shutter(&mut self, service: ShutterService<G, N>) {
        self.shutters.insert(service.actuator_id(), service);
    }

    pub fn add_switch(&mut self, service: SwitchService<G>) {
        self.switches.insert(service.actuator_id(), service);
    }

    /// Run the dispatch loop until a [`Input::Shutdown`] arrives or every
    /// [`EngineHandle`] is dropped.
    pub async fn run(mut self) {
        self.timers.arm(time::now() + self.tick, TimerKey::SchedulerTick);
        tracing::info!(
            actuators = self.registry.actuator_count(),
            "engine dispatch loop started"
        );

        loop {
            let sleep_for = match self.timers.next_due() {
                Some(due) => (due - time::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO),
                // No timers armed; wake up eventually anyway.
                None => std::time::Duration::from_secs(3600),
            };

            tokio::select! {
                input = self.inbox.recv() => match input {
                    None | Some(Input::Shutdown) => break,
                    Some(Input::Command(command)) => self.handle_command(command).await,
                    Some(Input::Telemetry(reading)) => self.handle_telemetry(reading).await,
                },
                () = tokio::time::sleep(sleep_for) => {}
            }

            let now = time::now();
            while let Some(key) = self.timers.pop_due(now) {
                self.handle_timer(key, now).await;
            }
        }

        tracing::info!("engine dispatch loop stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let now = time::now();
        let command = Arc::new(command);
        tracing::debug!(command = %command, trace = %command.reason_trace(), "handling command");

        match command.kind().clone() {
            CommandKind::SetShutterLevel { actuator_id, level } => {
                self.apply_shutter_level(&command, actuator_id, level, now)
                    .await;
            }
            CommandKind::SetActuatorState { actuator_id, on } => {
                self.apply_switch_state(&command, actuator_id, on, now).await;
            }
            CommandKind::ToggleActuator { actuator_id } => {
                self.apply_toggle(&command, actuator_id, now).await;
            }
            CommandKind::RestoreDesiredPosition { actuator_id } => {
                self.apply_restore(&command, actuator_id, now).await;
            }
            CommandKind::DisableAutomatic {
                actuator_id,
                expiry,
                policy,
                revert_on_lift,
            } => {
                self.install_block(actuator_id, expiry, policy, revert_on_lift, now)
                    .await;
            }
            CommandKind::LiftAutomaticBlock { actuator_id } => {
                let Some(outcome) = self.arbitrator.lift(&mut self.timers, actuator_id) else {
                    tracing::debug!(actuator_id = %actuator_id, "no active block to lift");
                    return;
                };
                if outcome.revert {
                    let restore = Arc::new(
                        command.derive(CommandKind::RestoreDesiredPosition { actuator_id }),
                    );
                    self.apply_restore(&restore, actuator_id, now).await;
                }
            }
            CommandKind::SetAllShuttersOfFloor { level, floor } => {
                let ids = self.registry.shutters_on_floor(floor.as_deref());
                tracing::info!(
                    level,
                    floor = floor.as_deref().unwrap_or("all"),
                    count = ids.len(),
                    "fanning out shutter level"
                );
                for actuator_id in ids {
                    let child =
                        Arc::new(command.derive(CommandKind::SetShutterLevel { actuator_id, level }));
                    self.apply_shutter_level(&child, actuator_id, level, now)
                        .await;
                }
            }
            CommandKind::TimeTriggerFired { trigger } => {
                // Trigger roots exist as provenance anchors only.
                tracing::debug!(trigger = %trigger, "trigger root command, nothing to dispatch");
            }
        }
    }

    async fn apply_shutter_level(
        &mut self,
        command: &Arc<Command>,
        actuator_id: ActuatorId,
        level: u8,
        now: Timestamp,
    ) {
        if level > 100 {
            tracing::warn!(
                actuator_id = %actuator_id,
                error = %ValidationError::LevelOutOfRange(level),
                "command dropped"
            );
            return;
        }
        if !self.arbitrator.check_allowed(actuator_id, command, now) {
            if let Some(shutter) = self.shutters.get_mut(&actuator_id) {
                shutter.record_desired(level);
            }
            tracing::info!(
                actuator_id = %actuator_id,
                level,
                "level command refused by active block, desired value recorded"
            );
            return;
        }
        match self.shutters.get_mut(&actuator_id) {
            Some(shutter) => {
                shutter
                    .set_level(level, command.is_initial(), false, now)
                    .await;
            }
            None => tracing::warn!(actuator_id = %actuator_id, "unknown shutter, command ignored"),
        }
    }

    async fn apply_switch_state(
        &mut self,
        command: &Arc<Command>,
        actuator_id: ActuatorId,
        on: bool,
        now: Timestamp,
    ) {
        if !self.arbitrator.check_allowed(actuator_id, command, now) {
            if let Some(switch) = self.switches.get_mut(&actuator_id) {
                switch.record_desired(on);
            }
            tracing::info!(
                actuator_id = %actuator_id,
                on,
                "switch command refused by active block, desired value recorded"
            );
            return;
        }
        match self.switches.get_mut(&actuator_id) {
            Some(switch) => {
                switch.set_on(on, command.is_initial(), now).await;
            }
            None => tracing::warn!(actuator_id = %actuator_id, "unknown switch, command ignored"),
        }
    }

    async fn apply_toggle(
        &mut self,
        command: &Arc<Command>,
        actuator_id: ActuatorId,
        now: Timestamp,
    ) {
        if !self.arbitrator.check_allowed(actuator_id, command, now) {
            tracing::info!(actuator_id = %actuator_id, "toggle refused by active block");
            return;
        }
        match self.switches.get_mut(&actuator_id) {
            Some(switch) => {
                switch.toggle(now).await;
            }
            None => tracing::warn!(actuator_id = %actuator_id, "unknown switch, toggle ignored"),
        }
    }

    /// Re-apply the recorded automatic intent, if any.
    async fn apply_restore(
        &mut self,
        command: &Arc<Command>,
        actuator_id: ActuatorId,
        now: Timestamp,
    ) {
        if !self.arbitrator.check_allowed(actuator_id, command, now) {
            tracing::debug!(actuator_id = %actuator_id, "restore refused by active block");
            return;
        }
        if let Some(shutter) = self.shutters.get_mut(&actuator_id) {
            if let Some(level) = shutter.desired_level() {
                tracing::info!(
                    actuator_id = %actuator_id,
                    level,
                    trace = %command.reason_trace(),
                    "restoring desired shutter level"
                );
                // Restores re-assert known intent; no second safety warning.
                shutter
                    .set_level(level, command.is_initial(), true, now)
                    .await;
            }
        } else if let Some(switch) = self.switches.get_mut(&actuator_id) {
            if let Some(on) = switch.desired_on() {
                tracing::info!(actuator_id = %actuator_id, on, "restoring desired switch state");
                switch.set_on(on, command.is_initial(), now).await;
            }
        } else {
            tracing::warn!(actuator_id = %actuator_id, "unknown actuator, restore ignored");
        }
    }

    async fn install_block(
        &mut self,
        actuator_id: ActuatorId,
        expiry: BlockExpiry,
        policy: CollisionSolving,
        revert_on_lift: bool,
        now: Timestamp,
    ) {
        let name = match self.registry.actuator(actuator_id) {
            Ok(info) => info.name.clone(),
            Err(err) => {
                tracing::warn!(error = %err, "block request for unknown actuator ignored");
                return;
            }
        };
        let block = match AutomaticBlock::new(actuator_id, expiry, policy, revert_on_lift, now) {
            Ok(block) => block,
            Err(err) => {
                tracing::warn!(actuator_id = %actuator_id, error = %err, "invalid block request");
                return;
            }
        };

        let stored = block.clone();
        match self.arbitrator.request_block(&mut self.timers, block, now) {
            BlockRequestOutcome::KeptExisting => {
                self.notifier
                    .inform(&format!(
                        "Keeping the existing automation pause for '{name}'."
                    ))
                    .await;
            }
            BlockRequestOutcome::Replaced => {
                self.notifier
                    .inform(&format!(
                        "Replaced the automation pause for '{name}' (now until {}).",
                        stored.expires_at
                    ))
                    .await;
                self.store.persist_block(&stored).await;
            }
            BlockRequestOutcome::Installed => {
                self.store.persist_block(&stored).await;
            }
        }
    }

    async fn handle_telemetry(&mut self, reading: TelemetryReading) {
        let now = time::now();
        let Some(binding) = self.registry.resolve_point(&reading.point_id).cloned() else {
            tracing::debug!(point_id = %reading.point_id, "unmapped telemetry point");
            return;
        };

        match (binding, reading.value) {
            (PointBinding::ShutterLevel(actuator_id), TelemetryValue::Level(level)) => {
                if let Some(shutter) = self.shutters.get_mut(&actuator_id) {
                    shutter.observe_level(level);
                }
            }
            (PointBinding::ShutterMovement(actuator_id), TelemetryValue::Movement(signal)) => {
                self.observe_movement(actuator_id, signal, now).await;
            }
            (
                PointBinding::WindowHandle {
                    actuator_id,
                    sensor,
                },
                TelemetryValue::Handle(state),
            ) => {
                let Some(shutter) = self.shutters.get_mut(&actuator_id) else {
                    return;
                };
                let was_open = shutter.observe_handle(&sensor, state);
                if was_open && !shutter.any_handle_open() {
                    // The safety override is gone; re-assert automatic intent.
                    let restore = Arc::new(
                        Command::restore_desired_position(CommandSource::Automatic, actuator_id)
                            .with_reason("window handle closed"),
                    );
                    self.apply_restore(&restore, actuator_id, now).await;
                }
            }
            (PointBinding::SwitchState(actuator_id), TelemetryValue::OnOff(on)) => {
                if let Some(switch) = self.switches.get_mut(&actuator_id) {
                    switch.observe_on(on);
                }
            }
            (PointBinding::Cloudiness, TelemetryValue::CloudCover { octas }) => {
                self.scheduler.update_cloudiness_octas(octas);
            }
            (binding, value) => {
                tracing::warn!(
                    point_id = %reading.point_id,
                    ?binding,
                    ?value,
                    "telemetry value does not match the point binding"
                );
            }
        }
    }

    async fn observe_movement(
        &mut self,
        actuator_id: ActuatorId,
        signal: MovementSignal,
        now: Timestamp,
    ) {
        let Some(shutter) = self.shutters.get_mut(&actuator_id) else {
            tracing::warn!(actuator_id = %actuator_id, "movement signal for unknown shutter");
            return;
        };

        match signal {
            MovementSignal::Up | MovementSignal::Down => {
                if !shutter.is_moving() {
                    let handle = self.timers.arm(
                        now + Duration::seconds(CALIBRATION_TIMEOUT_SECS),
                        TimerKey::CalibrationTimeout(actuator_id),
                    );
                    if let Some(old) = self.calibration_timers.insert(actuator_id, handle) {
                        self.timers.cancel(old);
                    }
                }
            }
            MovementSignal::Stopped => {
                if let Some(handle) = self.calibration_timers.remove(&actuator_id) {
                    self.timers.cancel(handle);
                }
            }
        }

        let outcome = shutter.observe_movement(signal, now).await;
        if matches!(
            outcome,
            Some(MovementOutcome::LearnedOpenTime { .. } | MovementOutcome::LearnedCloseTime { .. })
        ) {
            let (ms_open, ms_close) = shutter.calibration();
            self.store
                .persist_calibration(actuator_id, ms_open, ms_close)
                .await;
        }
    }

    async fn handle_timer(&mut self, key: TimerKey, now: Timestamp) {
        match key {
            TimerKey::SchedulerTick => {
                self.scheduler.perform_check(now);
                self.timers.arm(now + self.tick, TimerKey::SchedulerTick);
            }
            TimerKey::BlockExpiry(actuator_id) => {
                if let Some(outcome) = self.arbitrator.on_expiry(actuator_id, now) {
                    if outcome.revert {
                        let restore = Arc::new(
                            Command::restore_desired_position(
                                CommandSource::Automatic,
                                actuator_id,
                            )
                            .with_reason("block expired"),
                        );
                        self.apply_restore(&restore, actuator_id, now).await;
                    }
                }
            }
            TimerKey::CalibrationTimeout(actuator_id) => {
                self.calibration_timers.remove(&actuator_id);
                if let Some(shutter) = self.shutters.get_mut(&actuator_id) {
                    shutter.abandon_measurement();
                }
            }
        }
    }
}

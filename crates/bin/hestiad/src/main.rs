//! # hestiad — hestia daemon
//!
//! Composition root that wires the engine, scheduler, and adapters together.
//!
//! ## Responsibilities
//! - Load configuration (`hestia.toml` + env overrides)
//! - Build the registry (rooms, actuators, telemetry point index)
//! - Construct per-actuator services and the trigger scheduler
//! - Run the engine dispatch loop on a current-thread runtime
//! - Handle graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Local};

use hestia_adapter_virtual::{VirtualGateway, VirtualNotifier};
use hestia_app::engine::{Engine, EngineHandle};
use hestia_app::ports::store::NoopStore;
use hestia_app::registry::{ActuatorInfo, ActuatorKind, PointBinding, Registry};
use hestia_app::scheduler::TriggerScheduler;
use hestia_app::shutter_service::ShutterService;
use hestia_app::switch_service::SwitchService;
use hestia_domain::command::CommandKind;
use hestia_domain::id::{ActuatorId, RoomId};
use hestia_domain::room::Room;
use hestia_domain::trigger::{SunTimeClamp, TimeTrigger, TriggerKind};

use crate::config::{ActionConfig, Config, TriggerConfig, TriggerKindConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.filter.as_str())
        .init();

    if !config.integrations.virtual_enabled {
        anyhow::bail!("no device integration enabled; set integrations.virtual_enabled = true");
    }

    let (handle, inbox) = EngineHandle::channel();
    let gateway = Arc::new(VirtualGateway::new(handle.clone()));
    let notifier = VirtualNotifier;

    let mut registry = Registry::new();
    let rooms = add_rooms(&mut registry, &config);
    let shutters = build_shutters(&mut registry, &config, &rooms, &gateway, notifier);
    let switches = build_switches(&mut registry, &config, &rooms, &gateway);

    let mut scheduler = TriggerScheduler::new(Local, config.location.geo());
    register_triggers(&mut scheduler, &config, &handle)?;

    let tick = Duration::seconds(i64::try_from(config.scheduler.tick_seconds)?);
    let mut engine = Engine::new(registry, scheduler, NoopStore, notifier, inbox, tick);
    for shutter in shutters {
        engine.add_shutter(shutter);
    }
    for switch in switches {
        engine.add_switch(switch);
    }

    tracing::info!("hestiad starting");
    tokio::select! {
        () = engine.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("shutdown signal received");
            handle.shutdown();
        }
    }
    Ok(())
}

fn add_rooms(registry: &mut Registry, config: &Config) -> HashMap<String, RoomId> {
    let mut rooms = HashMap::new();
    for room_config in &config.rooms {
        match Room::builder()
            .name(&room_config.name)
            .floor(&room_config.floor)
            .build()
        {
            Ok(room) => {
                rooms.insert(room_config.name.clone(), room.id);
                registry.add_room(room);
            }
            Err(err) => tracing::warn!(room = %room_config.name, error = %err, "room skipped"),
        }
    }
    rooms
}

fn build_shutters(
    registry: &mut Registry,
    config: &Config,
    rooms: &HashMap<String, RoomId>,
    gateway: &Arc<VirtualGateway>,
    notifier: VirtualNotifier,
) -> Vec<ShutterService<Arc<VirtualGateway>, VirtualNotifier>> {
    let mut services = Vec::new();
    for shutter in &config.shutters {
        let id = ActuatorId::new();
        registry.add_actuator(ActuatorInfo {
            id,
            name: shutter.name.clone(),
            kind: ActuatorKind::Shutter,
            room_id: resolve_room(rooms, shutter.room.as_deref(), &shutter.name),
        });
        registry.bind_point(shutter.level_point.clone(), PointBinding::ShutterLevel(id));
        if let Some(movement_point) = &shutter.movement_point {
            registry.bind_point(movement_point.clone(), PointBinding::ShutterMovement(id));
        }
        for handle_point in &shutter.handle_points {
            registry.bind_point(
                handle_point.point.clone(),
                PointBinding::WindowHandle {
                    actuator_id: id,
                    sensor: handle_point.sensor.clone(),
                },
            );
        }

        let mut service = ShutterService::new(
            id,
            shutter.name.clone(),
            shutter.level_point.clone(),
            Arc::clone(gateway),
            notifier,
        );
        service.restore_calibration(shutter.ms_to_fully_open, shutter.ms_to_fully_close);
        services.push(service);
    }
    services
}

fn build_switches(
    registry: &mut Registry,
    config: &Config,
    rooms: &HashMap<String, RoomId>,
    gateway: &Arc<VirtualGateway>,
) -> Vec<SwitchService<Arc<VirtualGateway>>> {
    let mut services = Vec::new();
    for switch in &config.switches {
        let id = ActuatorId::new();
        registry.add_actuator(ActuatorInfo {
            id,
            name: switch.name.clone(),
            kind: ActuatorKind::Switch,
            room_id: resolve_room(rooms, switch.room.as_deref(), &switch.name),
        });
        registry.bind_point(switch.state_point.clone(), PointBinding::SwitchState(id));
        services.push(SwitchService::new(
            id,
            switch.name.clone(),
            switch.state_point.clone(),
            Arc::clone(gateway),
        ));
    }
    services
}

fn resolve_room(
    rooms: &HashMap<String, RoomId>,
    room: Option<&str>,
    actuator: &str,
) -> Option<RoomId> {
    let name = room?;
    let id = rooms.get(name).copied();
    if id.is_none() {
        tracing::warn!(actuator, room = name, "unknown room, actuator left roomless");
    }
    id
}

fn register_triggers(
    scheduler: &mut TriggerScheduler<Local>,
    config: &Config,
    handle: &EngineHandle,
) -> anyhow::Result<()> {
    for trigger_config in &config.triggers {
        let kind = match trigger_config.kind {
            TriggerKindConfig::FixedTime => TriggerKind::FixedTime {
                hour: trigger_config.hour.unwrap_or_default(),
                minute: trigger_config.minute.unwrap_or_default(),
            },
            TriggerKindConfig::Sunrise => TriggerKind::SunriseRelative,
            TriggerKindConfig::Sunset => TriggerKind::SunsetRelative,
        };

        let mut builder = TimeTrigger::builder()
            .name(&trigger_config.name)
            .kind(kind)
            .minute_offset(trigger_config.offset_minutes);
        if let Some(cloud_minutes) = trigger_config.cloud_minutes {
            builder = builder.cloud_minutes(cloud_minutes);
        }
        let clamp = SunTimeClamp {
            earliest_sunrise: trigger_config
                .earliest
                .as_deref()
                .map(TriggerConfig::parse_clamp)
                .transpose()?,
            latest_sunset: trigger_config
                .latest
                .as_deref()
                .map(TriggerConfig::parse_clamp)
                .transpose()?,
        };
        let trigger = builder.clamp(clamp).build()?;

        let action = trigger_config.action.clone();
        let handle = handle.clone();
        scheduler.register(
            trigger,
            Box::new(move |root| {
                let ActionConfig::SetAllShutters { level, ref floor } = action;
                handle.send_command(root.derive(CommandKind::SetAllShuttersOfFloor {
                    level,
                    floor: floor.clone(),
                }));
                Ok(())
            }),
        );
    }
    Ok(())
}

//! Registry — rooms, actuators, and the telemetry point index.
//!
//! Built once at startup from configuration and handed to the engine; there
//! are no global lookup tables. The point index is the single place that maps
//! raw gateway point ids onto actuators and semantic channels.

use std::collections::HashMap;

use hestia_domain::error::NotFoundError;
use hestia_domain::id::{ActuatorId, RoomId};
use hestia_domain::room::Room;

/// What kind of device an actuator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorKind {
    Shutter,
    Switch,
}

/// Static metadata of one actuator.
#[derive(Debug, Clone)]
pub struct ActuatorInfo {
    pub id: ActuatorId,
    pub name: String,
    pub kind: ActuatorKind,
    pub room_id: Option<RoomId>,
}

/// Semantic meaning of one telemetry point id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointBinding {
    /// Absolute shutter level reports.
    ShutterLevel(ActuatorId),
    /// Tri-state movement signal reports.
    ShutterMovement(ActuatorId),
    /// A window-handle sensor attached to a shutter's window.
    WindowHandle {
        actuator_id: ActuatorId,
        sensor: String,
    },
    /// On/off state reports of a switch.
    SwitchState(ActuatorId),
    /// Cloud cover reports in octas, feeding solar trigger drift.
    Cloudiness,
}

#[derive(Debug, Default)]
pub struct Registry {
    rooms: HashMap<RoomId, Room>,
    actuators: HashMap<ActuatorId, ActuatorInfo>,
    points: HashMap<String, PointBinding>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&mut self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn add_actuator(&mut self, info: ActuatorInfo) {
        self.actuators.insert(info.id, info);
    }

    /// Bind a raw telemetry point id to its semantic channel.
    pub fn bind_point(&mut self, point_id: impl Into<String>, binding: PointBinding) {
        self.points.insert(point_id.into(), binding);
    }

    #[must_use]
    pub fn resolve_point(&self, point_id: &str) -> Option<&PointBinding> {
        self.points.get(point_id)
    }

    /// Look up an actuator, producing the typed not-found error.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] when the id is not registered.
    pub fn actuator(&self, id: ActuatorId) -> Result<&ActuatorInfo, NotFoundError> {
        self.actuators.get(&id).ok_or_else(|| NotFoundError {
            entity: "Actuator",
            id: id.to_string(),
        })
    }

    /// All shutter actuators on the given floor; `None` means every floor.
    ///
    /// A shutter in no room or in an unknown room never matches a named floor.
    #[must_use]
    pub fn shutters_on_floor(&self, floor: Option<&str>) -> Vec<ActuatorId> {
        let mut ids: Vec<ActuatorId> = self
            .actuators
            .values()
            .filter(|info| info.kind == ActuatorKind::Shutter)
            .filter(|info| match floor {
                None => true,
                Some(floor) => info
                    .room_id
                    .and_then(|room_id| self.rooms.get(&room_id))
                    .is_some_and(|room| room.floor == floor),
            })
            .map(|info| info.id)
            .collect();
        // Deterministic fan-out order.
        ids.sort_unstable_by_key(|id| self.actuators[id].name.clone());
        ids
    }

    #[must_use]
    pub fn actuator_count(&self) -> usize {
        self.actuators.len()
    }
}

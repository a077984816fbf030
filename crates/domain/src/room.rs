//! Room — a logical grouping of actuators on a floor.

use serde::{Deserialize, Serialize};

use crate::error::{HestiaError, ValidationError};
use crate::id::RoomId;

/// A room; `floor` is a free string (`"ground"`, `"upper"`, …) used by
/// floor-wide fan-out commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub floor: String,
}

impl Room {
    /// Create a builder for constructing a [`Room`].
    #[must_use]
    pub fn builder() -> RoomBuilder {
        RoomBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HestiaError::Validation`] when `name` is empty.
    pub fn validate(&self) -> Result<(), HestiaError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Room`].
#[derive(Debug, Default)]
pub struct RoomBuilder {
    id: Option<RoomId>,
    name: Option<String>,
    floor: Option<String>,
}

impl RoomBuilder {
    #[must_use]
    pub fn id(mut self, id: RoomId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn floor(mut self, floor: impl Into<String>) -> Self {
        self.floor = Some(floor.into());
        self
    }

    /// Consume the builder, validate, and return a [`Room`].
    ///
    /// # Errors
    ///
    /// Returns [`HestiaError::Validation`] if `name` is missing or empty.
    pub fn build(self) -> Result<Room, HestiaError> {
        let room = Room {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            floor: self.floor.unwrap_or_else(|| "ground".to_string()),
        };
        room.validate()?;
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_valid_room_when_name_provided() {
        let room = Room::builder().name("Living Room").build().unwrap();
        assert_eq!(room.name, "Living Room");
        assert_eq!(room.floor, "ground");
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Room::builder().build();
        assert!(matches!(
            result,
            Err(HestiaError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_build_room_on_named_floor() {
        let room = Room::builder()
            .name("Bedroom")
            .floor("upper")
            .build()
            .unwrap();
        assert_eq!(room.floor, "upper");
    }

    #[test]
    fn should_roundtrip_through_serde_json() {
        let room = Room::builder().name("Kitchen").build().unwrap();
        let json = serde_json::to_string(&room).unwrap();
        let parsed: Room = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, room.id);
        assert_eq!(parsed.name, room.name);
    }
}

use std::collections::HashMap;

use serde::Deserialize;

/// Thermal properties of a building element. A missing U-value means the
/// element takes part in no conductive exchange (e.g. the floor slab).
#[derive(Debug, Clone, Deserialize)]
pub struct ConstructionType {
    pub u_value: Option<f64>,
    #[serde(default)]
    pub u_offset: f64,
    pub capacity: f64,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    South,
    West,
    #[default]
    Other,
}

/// What is on the other side of a wall or transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    Outside,
    Room(String),
}

impl Boundary {
    pub fn bound_room(&self) -> Option<&str> {
        match self {
            Boundary::Outside => None,
            Boundary::Room(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Wall {
    pub area: f64,
    pub construction: ConstructionType,
    pub orientation: Orientation,
    pub bound: Boundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Window,
    Door,
}

/// A window or door. Windows may carry a contact sensor, a shutter position
/// reference and a radiation-exposed glass area for solar gain.
#[derive(Debug, Clone)]
pub struct Transition {
    pub kind: TransitionKind,
    pub area: f64,
    pub construction: ConstructionType,
    pub orientation: Orientation,
    pub bound: Boundary,
    pub contact: Option<String>,
    pub shutter: Option<String>,
    pub radiation_area: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Room {
    name: String,
    volume: f64,
    heating_volume: Option<f64>,
    walls: Vec<Wall>,
    transitions: Vec<Transition>,
}

impl Room {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Liters of water in the floor-heating circuit, None if the room has no
    /// floor heating.
    pub fn heating_volume(&self) -> Option<f64> {
        self.heating_volume
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum GeometryError {
    #[display("no rooms configured")]
    NoRooms,
    #[display("no room has a heating circuit configured")]
    NoHeatingCircuit,
    #[display("room '{room}' references unknown construction type '{construction}'")]
    UnknownConstruction { room: String, construction: String },
    #[display("room '{room}' is bound to unknown room '{bound}'")]
    UnknownBoundRoom { room: String, bound: String },
}

/// Static house geometry, validated and frozen at startup.
#[derive(Debug)]
pub struct House {
    rooms: Vec<Room>,
    total_volume: f64,
    total_heating_volume: f64,
}

impl House {
    pub fn new(config: &HouseConfig) -> Result<Self, GeometryError> {
        if config.rooms.is_empty() {
            return Err(GeometryError::NoRooms);
        }

        let room_names: Vec<&str> = config.rooms.iter().map(|r| r.name.as_str()).collect();

        let mut rooms = Vec::with_capacity(config.rooms.len());
        for room in &config.rooms {
            let mut walls = Vec::with_capacity(room.walls.len());
            for wall in &room.walls {
                walls.push(Wall {
                    area: wall.area,
                    construction: resolve_construction(config, &room.name, &wall.construction)?,
                    orientation: wall.orientation,
                    bound: resolve_bound(&room_names, &room.name, wall.bound.as_deref())?,
                });
            }

            let mut transitions = Vec::with_capacity(room.transitions.len());
            for transition in &room.transitions {
                transitions.push(Transition {
                    kind: transition.kind,
                    area: transition.area,
                    construction: resolve_construction(config, &room.name, &transition.construction)?,
                    orientation: transition.orientation,
                    bound: resolve_bound(&room_names, &room.name, transition.bound.as_deref())?,
                    contact: transition.contact.clone(),
                    shutter: transition.shutter.clone(),
                    radiation_area: transition.radiation_area,
                });
            }

            rooms.push(Room {
                name: room.name.clone(),
                volume: room.volume,
                heating_volume: room.heating_volume,
                walls,
                transitions,
            });
        }

        let total_volume = rooms.iter().map(|r| r.volume).sum();
        let total_heating_volume: f64 = rooms.iter().filter_map(|r| r.heating_volume).sum();
        if total_heating_volume <= 0.0 {
            return Err(GeometryError::NoHeatingCircuit);
        }

        Ok(Self {
            rooms,
            total_volume,
            total_heating_volume,
        })
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.name == name)
    }

    pub fn heated_rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(|r| r.heating_volume.is_some())
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    pub fn total_heating_volume(&self) -> f64 {
        self.total_heating_volume
    }
}

fn resolve_construction(
    config: &HouseConfig,
    room: &str,
    name: &str,
) -> Result<ConstructionType, GeometryError> {
    config
        .construction_types
        .get(name)
        .cloned()
        .ok_or_else(|| GeometryError::UnknownConstruction {
            room: room.to_owned(),
            construction: name.to_owned(),
        })
}

fn resolve_bound(
    room_names: &[&str],
    room: &str,
    bound: Option<&str>,
) -> Result<Boundary, GeometryError> {
    match bound {
        None => Ok(Boundary::Outside),
        Some(name) if room_names.contains(&name) => Ok(Boundary::Room(name.to_owned())),
        Some(name) => Err(GeometryError::UnknownBoundRoom {
            room: room.to_owned(),
            bound: name.to_owned(),
        }),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HouseConfig {
    pub construction_types: HashMap<String, ConstructionType>,
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    pub volume: f64,
    #[serde(default)]
    pub heating_volume: Option<f64>,
    #[serde(default)]
    pub walls: Vec<WallConfig>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WallConfig {
    pub area: f64,
    pub construction: String,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub bound: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionConfig {
    pub kind: TransitionKind,
    pub area: f64,
    pub construction: String,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub bound: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub shutter: Option<String>,
    #[serde(default)]
    pub radiation_area: Option<f64>,
}

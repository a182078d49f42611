//! Game-state vocabulary shared by the tracker and the orchestrator

use serde::{Deserialize, Serialize};

/// The single discrete situation the player is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DiscreteState {
    /// Not in game, or no telemetry
    #[default]
    None,
    /// In game but waiting for the next evaluation
    StandBy,
    Ambient,
    Mounted,
    Battle,
    Competitive,
    Defeated,
}

impl DiscreteState {
    /// States in which no music plays
    pub fn is_silent(self) -> bool {
        matches!(self, Self::None | Self::StandBy)
    }

    /// States that can be interrupted and later resumed
    pub fn is_calm(self) -> bool {
        matches!(self, Self::Ambient | Self::Mounted | Self::Competitive)
    }

    /// States whose entry snapshots the calm track for later resume
    pub fn is_interruptive(self) -> bool {
        matches!(self, Self::Battle | Self::Defeated)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::StandBy => "StandBy",
            Self::Ambient => "Ambient",
            Self::Mounted => "Mounted",
            Self::Battle => "Battle",
            Self::Competitive => "Competitive",
            Self::Defeated => "Defeated",
        }
    }
}

impl std::fmt::Display for DiscreteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of map the player is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MapKind {
    /// Open world
    Public,
    /// Story and dungeon instances
    Instance,
    /// Structured PvP
    PvP,
    /// World vs World
    WvW,
    /// Smaller public maps (activities, lobbies)
    PublicMini,
    /// Guild halls and other private instances
    GuildHall,
    #[default]
    Unknown,
}

/// Guild-hall map ids on which mounting is allowed
pub const MOUNT_WHITELIST: [u32; 23] = [
    1068, 1069, 1071, 1076, 1101, 1104, 1107, 1108, 1121, 1124, 1125, 1144, 1214, 1215, 1224,
    1232, 1243, 1250, 1419, 1426, 1435, 1444, 1462,
];

impl MapKind {
    /// Maps where combat exit is debounced with the long timer
    pub fn uses_long_combat_exit(self) -> bool {
        matches!(self, Self::Instance | Self::WvW | Self::PublicMini)
    }

    pub fn is_competitive(self) -> bool {
        matches!(self, Self::PvP | Self::WvW)
    }

    /// Whether music for mounts may play on this map
    pub fn allows_mount(self, map_id: u32) -> bool {
        matches!(self, Self::Public | Self::PublicMini) || MOUNT_WHITELIST.contains(&map_id)
    }
}

/// Mount the player can have equipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MountType {
    Raptor,
    Springer,
    Skimmer,
    Jackal,
    Griffon,
    RollerBeetle,
    Warclaw,
    Skyscale,
    Skiff,
    SiegeTurtle,
}

impl MountType {
    /// Stable name used as playlist key
    pub fn name(self) -> &'static str {
        match self {
            Self::Raptor => "Raptor",
            Self::Springer => "Springer",
            Self::Skimmer => "Skimmer",
            Self::Jackal => "Jackal",
            Self::Griffon => "Griffon",
            Self::RollerBeetle => "RollerBeetle",
            Self::Warclaw => "Warclaw",
            Self::Skyscale => "Skyscale",
            Self::Skiff => "Skiff",
            Self::SiegeTurtle => "SiegeTurtle",
        }
    }
}

/// One read of the game's telemetry feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub process_running: bool,
    /// Character loaded and controllable
    pub in_game: bool,
    pub focused: bool,
    pub in_combat: bool,
    pub mount: Option<MountType>,
    pub map_id: u32,
    pub map_kind: MapKind,
    /// Camera height relative to the water surface
    pub camera_z: f32,
    /// Host process id, used for ducking
    pub process_id: Option<u32>,
}

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            process_running: false,
            in_game: false,
            focused: false,
            in_combat: false,
            mount: None,
            map_id: 0,
            map_kind: MapKind::Unknown,
            camera_z: 1.0,
            process_id: None,
        }
    }
}

impl TelemetrySample {
    pub fn is_submerged(&self) -> bool {
        self.camera_z <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classes() {
        assert!(DiscreteState::None.is_silent());
        assert!(DiscreteState::StandBy.is_silent());
        assert!(DiscreteState::Mounted.is_calm());
        assert!(DiscreteState::Defeated.is_interruptive());
        assert!(!DiscreteState::Battle.is_calm());
    }

    #[test]
    fn test_mount_eligibility() {
        assert!(MapKind::Public.allows_mount(15));
        assert!(MapKind::GuildHall.allows_mount(1068));
        assert!(!MapKind::GuildHall.allows_mount(9999));
        assert!(!MapKind::Instance.allows_mount(1));
    }

    #[test]
    fn test_submerged_at_surface() {
        let mut sample = TelemetrySample::default();
        assert!(!sample.is_submerged());
        sample.camera_z = 0.0;
        assert!(sample.is_submerged());
    }
}

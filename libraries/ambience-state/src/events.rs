/// Tracker events
use ambience_core::types::{DiscreteState, MapKind, MountType, TimeOfDay};
use serde::{Deserialize, Serialize};

/// Published on the tracker's broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TrackerEvent {
    StateChanged {
        from: DiscreteState,
        to: DiscreteState,
    },
    SubmergedChanged {
        submerged: bool,
    },
    DayCycleChanged {
        time_of_day: TimeOfDay,
    },
}

/// Everything the orchestrator reads from the tracker each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub state: DiscreteState,
    pub submerged: bool,
    pub time_of_day: TimeOfDay,
    pub mount: Option<MountType>,
    pub map_kind: MapKind,
    pub camera_z: f32,
    pub focused: bool,
    pub process_id: Option<u32>,
}

impl Default for TrackerSnapshot {
    fn default() -> Self {
        Self {
            state: DiscreteState::None,
            submerged: false,
            time_of_day: TimeOfDay::default(),
            mount: None,
            map_kind: MapKind::Unknown,
            camera_z: 1.0,
            focused: false,
            process_id: None,
        }
    }
}

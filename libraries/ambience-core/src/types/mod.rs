//! Domain types for Ambience

mod day_cycle;
mod playlist;
mod state;
mod track;

pub use day_cycle::{DayCycle, TimeOfDay};
pub use playlist::{ContextKey, Playlist, PlaylistRecord};
pub use state::{DiscreteState, MapKind, MountType, TelemetrySample, MOUNT_WHITELIST};
pub use track::{ResolvedMetadata, Track};

/// Playlist domain types
use crate::types::{DiscreteState, MountType, TimeOfDay, Track};
use serde::{Deserialize, Serialize};

/// Game context a playlist is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKey {
    State(DiscreteState),
    Mount(MountType),
    Defeated,
}

impl ContextKey {
    /// Playlist key for a state, taking the equipped mount into account
    pub fn for_state(state: DiscreteState, mount: Option<MountType>) -> Option<Self> {
        match (state, mount) {
            (s, _) if s.is_silent() => None,
            (DiscreteState::Mounted, Some(m)) => Some(Self::Mount(m)),
            (DiscreteState::Mounted, None) => None,
            (DiscreteState::Defeated, _) => Some(Self::Defeated),
            (s, _) => Some(Self::State(s)),
        }
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::State(s) => write!(f, "{s}"),
            Self::Mount(m) => write!(f, "Mount:{}", m.name()),
            Self::Defeated => f.write_str("Defeated"),
        }
    }
}

/// Stored form: tracks referenced by external id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub key: ContextKey,
    pub enabled: bool,
    pub track_ids: Vec<String>,
}

/// Loaded form with referenced tracks expanded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub key: ContextKey,
    pub enabled: bool,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Tracks eligible at `time`, excluding ids rejected by `skip`
    pub fn eligible<'a>(
        &'a self,
        time: TimeOfDay,
        skip: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Track> + 'a {
        self.tracks
            .iter()
            .filter(move |t| t.day_cycles.allows(time) && !skip(&t.external_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DayCycle;
    use std::time::Duration;

    #[test]
    fn test_context_key_for_state() {
        assert_eq!(ContextKey::for_state(DiscreteState::None, None), None);
        assert_eq!(ContextKey::for_state(DiscreteState::StandBy, None), None);
        assert_eq!(
            ContextKey::for_state(DiscreteState::Mounted, Some(MountType::Griffon)),
            Some(ContextKey::Mount(MountType::Griffon))
        );
        assert_eq!(
            ContextKey::for_state(DiscreteState::Defeated, Some(MountType::Griffon)),
            Some(ContextKey::Defeated)
        );
        assert_eq!(
            ContextKey::for_state(DiscreteState::Battle, None),
            Some(ContextKey::State(DiscreteState::Battle))
        );
    }

    #[test]
    fn test_eligible_filters_cycle_and_skips() {
        let mut day = Track::new("a", "A", "https://x/a", Duration::from_secs(1));
        day.day_cycles = DayCycle::DAY;
        let mut night = Track::new("b", "B", "https://x/b", Duration::from_secs(1));
        night.day_cycles = DayCycle::NIGHT;
        let playlist = Playlist {
            key: ContextKey::State(DiscreteState::Ambient),
            enabled: true,
            tracks: vec![day, night],
        };

        let ids: Vec<_> = playlist
            .eligible(TimeOfDay::Day, |_| false)
            .map(|t| t.external_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a"]);

        let ids: Vec<_> = playlist
            .eligible(TimeOfDay::Night, |id| id == "b")
            .collect::<Vec<_>>();
        assert!(ids.is_empty());
    }
}

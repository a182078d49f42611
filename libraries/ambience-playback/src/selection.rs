//! Track selection
//!
//! Uniform random choice among the playlist tracks allowed at the current
//! time of day, minus anything skipped this session.

use ambience_core::types::{Playlist, TimeOfDay, Track};
use rand::seq::IteratorRandom;
use rand::{thread_rng, Rng};
use std::collections::HashSet;

/// Pick a track from `playlist` using `rng`
pub fn choose_with<R: Rng + ?Sized>(
    playlist: &Playlist,
    time: TimeOfDay,
    excluded: &HashSet<String>,
    rng: &mut R,
) -> Option<Track> {
    if !playlist.enabled {
        return None;
    }
    playlist
        .eligible(time, |id| excluded.contains(id))
        .choose(rng)
        .cloned()
}

/// Pick a track from `playlist` using the thread-local RNG
pub fn choose(playlist: &Playlist, time: TimeOfDay, excluded: &HashSet<String>) -> Option<Track> {
    choose_with(playlist, time, excluded, &mut thread_rng())
}

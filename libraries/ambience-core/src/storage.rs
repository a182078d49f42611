//! In-memory persistence store
//!
//! Readers share a `tokio::sync::RwLock`; writers are exclusive.

use crate::error::Result;
use crate::traits::PersistenceStore;
use crate::types::{ContextKey, Playlist, PlaylistRecord, Track};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    tracks: HashMap<String, Track>,
    playlists: HashMap<ContextKey, PlaylistRecord>,
}

/// `PersistenceStore` backed by hash maps
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a playlist together with its tracks
    pub async fn insert_playlist(&self, key: ContextKey, tracks: Vec<Track>) {
        let mut tables = self.tables.write().await;
        let track_ids = tracks.iter().map(|t| t.external_id.clone()).collect();
        for track in tracks {
            tables.tracks.insert(track.external_id.clone(), track);
        }
        tables.playlists.insert(
            key,
            PlaylistRecord {
                key,
                enabled: true,
                track_ids,
            },
        );
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn get_track(&self, external_id: &str) -> Result<Option<Track>> {
        Ok(self.tables.read().await.tracks.get(external_id).cloned())
    }

    async fn upsert_track(&self, track: Track) -> Result<()> {
        track.validate()?;
        self.tables
            .write()
            .await
            .tracks
            .insert(track.external_id.clone(), track);
        Ok(())
    }

    async fn remove_track(&self, external_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.tracks.remove(external_id);
        for playlist in tables.playlists.values_mut() {
            playlist.track_ids.retain(|id| id != external_id);
        }
        Ok(())
    }

    async fn get_playlist(&self, key: ContextKey) -> Result<Option<Playlist>> {
        let tables = self.tables.read().await;
        Ok(tables.playlists.get(&key).map(|record| Playlist {
            key: record.key,
            enabled: record.enabled,
            tracks: record
                .track_ids
                .iter()
                .filter_map(|id| tables.tracks.get(id).cloned())
                .collect(),
        }))
    }

    async fn upsert_playlist(&self, playlist: PlaylistRecord) -> Result<()> {
        self.tables
            .write()
            .await
            .playlists
            .insert(playlist.key, playlist);
        Ok(())
    }

    async fn remove_playlist(&self, key: ContextKey) -> Result<()> {
        self.tables.write().await.playlists.remove(&key);
        Ok(())
    }

    async fn clear_resolved_urls(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        for track in tables.tracks.values_mut() {
            track.resolved_stream_url = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscreteState;
    use std::time::Duration;

    fn track(id: &str) -> Track {
        Track::new(id, id, format!("https://example.com/{id}"), Duration::from_secs(60))
    }

    const AMBIENT: ContextKey = ContextKey::State(DiscreteState::Ambient);

    #[tokio::test]
    async fn test_playlist_expands_tracks() {
        let store = InMemoryStore::new();
        store
            .insert_playlist(AMBIENT, vec![track("a"), track("b")])
            .await;

        let playlist = store.get_playlist(AMBIENT).await.unwrap().unwrap();
        assert!(playlist.enabled);
        assert_eq!(playlist.tracks.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let store = InMemoryStore::new();
        let mut t = track("a");
        store.upsert_track(t.clone()).await.unwrap();
        t.title = "renamed".into();
        store.upsert_track(t).await.unwrap();

        let stored = store.get_track("a").await.unwrap().unwrap();
        assert_eq!(stored.title, "renamed");
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_track() {
        let store = InMemoryStore::new();
        let mut t = track("a");
        t.page_url = "not a url".into();
        assert!(store.upsert_track(t).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_track_drops_from_playlists() {
        let store = InMemoryStore::new();
        store
            .insert_playlist(AMBIENT, vec![track("a"), track("b")])
            .await;
        store.remove_track("a").await.unwrap();

        let playlist = store.get_playlist(AMBIENT).await.unwrap().unwrap();
        let ids: Vec<_> = playlist.tracks.iter().map(|t| t.external_id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_clear_resolved_urls() {
        let store = InMemoryStore::new();
        let mut t = track("a");
        t.resolved_stream_url = Some("https://cdn/a".into());
        store.upsert_track(t).await.unwrap();
        store.clear_resolved_urls().await.unwrap();

        assert!(!store.get_track("a").await.unwrap().unwrap().is_resolved());
    }
}

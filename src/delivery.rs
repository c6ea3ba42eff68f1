//! Streams a finished playlist to its owner one track at a time.
//!
//! The owner's position is kept in the progress store, so delivery survives
//! restarts. Each time the listener is ready for the next track, the previous
//! messages are removed and the next track is posted.

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::database::Database;
use crate::discord::{DiscordNotifier, track_message};
use crate::materialize::read_document;
use crate::models::Progress;
use crate::registry::OwnerId;

/// What a delivery call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Track `index` (0-based) was posted.
    Sent { index: usize, total: usize },
    /// Every track was already delivered; progress was reset.
    Finished,
    /// The owner has no playlist in progress.
    NoPlaylist,
}

#[derive(Clone)]
pub struct TrackFeed {
    database: Database,
    notifier: DiscordNotifier,
}

impl TrackFeed {
    pub fn new(database: Database, notifier: DiscordNotifier) -> Self {
        Self { database, notifier }
    }

    /// Start delivering the playlist stored at `json_file` from its first track.
    pub async fn start(&self, owner: OwnerId, total: usize, json_file: &Path) -> Result<Delivery> {
        self.database
            .update_progress(
                owner,
                &Progress {
                    current_index: 0,
                    total_tracks: i64::try_from(total)?,
                    json_file: json_file.display().to_string(),
                },
            )
            .await?;
        self.send_track(owner, 0).await
    }

    /// Post track `index` and advance the owner's position past it.
    pub async fn send_track(&self, owner: OwnerId, index: usize) -> Result<Delivery> {
        let Some(progress) = self.database.get_progress(owner).await? else {
            return Ok(Delivery::NoPlaylist);
        };

        let total = usize::try_from(progress.total_tracks)?;
        if index >= total {
            self.notifier
                .send_text("🎉 Playlist finished! Every track has been sent.")
                .await?;
            self.database.reset_progress(owner).await?;
            info!(owner, "playlist delivery finished");
            return Ok(Delivery::Finished);
        }

        let document = read_document(Path::new(&progress.json_file)).await?;
        let Some(track) = document.tracks.get(index) else {
            warn!(owner, index, file = %progress.json_file, "playlist file shorter than recorded total");
            self.database.reset_progress(owner).await?;
            return Ok(Delivery::Finished);
        };

        if let Some(message_id) = self
            .notifier
            .send_text(&track_message(index, total, track))
            .await?
        {
            self.database.save_message(owner, &message_id).await?;
        }

        self.database
            .update_progress(
                owner,
                &Progress {
                    current_index: i64::try_from(index + 1)?,
                    ..progress
                },
            )
            .await?;

        info!(owner, track = index + 1, total, "track sent");
        Ok(Delivery::Sent { index, total })
    }

    /// The listener consumed the last track: clear old messages and send the next one.
    pub async fn advance(&self, owner: OwnerId) -> Result<Delivery> {
        let Some(progress) = self.database.get_progress(owner).await? else {
            return Ok(Delivery::NoPlaylist);
        };

        if progress.is_finished() {
            return self.send_track(owner, usize::try_from(progress.current_index)?).await;
        }

        self.clear_previous(owner).await?;
        self.send_track(owner, usize::try_from(progress.current_index)?).await
    }

    /// Delete every message previously posted for `owner`.
    pub async fn clear_previous(&self, owner: OwnerId) -> Result<()> {
        let message_ids = self.database.messages(owner).await?;
        for message_id in &message_ids {
            // Already-deleted messages are expected here.
            if let Err(e) = self.notifier.delete_message(message_id).await {
                warn!(owner, message_id = %message_id, error = %e, "failed to delete previous message");
            }
        }
        self.database.clear_messages(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::write_document;
    use crate::models::{ExtractionResult, NormalizedItem};

    async fn feed() -> TrackFeed {
        let database = Database::connect("sqlite::memory:").await.unwrap();
        TrackFeed::new(database, DiscordNotifier::new(None))
    }

    async fn playlist(dir: &Path, tracks: &[&str]) -> std::path::PathBuf {
        let result = ExtractionResult {
            source_url: "https://example.test/p".to_string(),
            total_count: tracks.len(),
            items: tracks
                .iter()
                .map(|t| NormalizedItem::from_clean((*t).to_string()))
                .collect(),
        };
        let path = dir.join("playlist_tracks_3.json");
        write_document(&path, &result).await.unwrap();
        path
    }

    #[tokio::test]
    async fn walks_through_every_track_then_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = playlist(dir.path(), &["a x", "b y"]).await;
        let feed = feed().await;

        assert_eq!(
            feed.start(3, 2, &path).await.unwrap(),
            Delivery::Sent { index: 0, total: 2 }
        );
        assert_eq!(
            feed.advance(3).await.unwrap(),
            Delivery::Sent { index: 1, total: 2 }
        );
        assert_eq!(feed.advance(3).await.unwrap(), Delivery::Finished);
        assert_eq!(feed.advance(3).await.unwrap(), Delivery::NoPlaylist);
    }

    #[tokio::test]
    async fn empty_playlist_finishes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = playlist(dir.path(), &[]).await;
        let feed = feed().await;

        assert_eq!(feed.start(3, 0, &path).await.unwrap(), Delivery::Finished);
        assert_eq!(feed.database.get_progress(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_owner_has_no_playlist() {
        assert_eq!(feed().await.advance(99).await.unwrap(), Delivery::NoPlaylist);
    }
}

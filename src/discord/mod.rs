//! # Discord Webhook Delivery
//!
//! Posts extraction results to a Discord channel through a webhook and streams
//! tracks to the listener one message at a time.
//!
//! ## Message Kinds
//!
//! - **Status**: plain text notices (extraction started, cancelled, failed)
//! - **Playlist Ready**: an embed with the playlist link and track count
//! - **Track**: ``Track i of N`` followed by an `@song <track>` line the
//!   listener hands to a song-lookup bot
//!
//! Every post is sent with `?wait=true` so Discord returns the created
//! message, whose id is kept for later deletion.
//!
//! ## Environment Configuration
//!
//! Set `DISCORD_WEBHOOK_URL` to the channel's webhook URL. If it is not set,
//! delivery is disabled: posts are skipped and logged, and no message ids are
//! recorded.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::models::{DiscordEmbed, DiscordField, DiscordMessage, ExtractionResult};

/// Discord blue.
const EMBED_COLOR: u32 = 0x0058_65F2;

/// Discord caps message content at 2000 characters.
const MAX_CONTENT_CHARS: usize = 2000;

/// Webhook client for status notices and track delivery.
///
/// `Clone` is cheap: `reqwest::Client` shares its connection pool between clones.
pub struct DiscordNotifier {
    client: Client,

    /// `None` disables delivery.
    webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

impl DiscordNotifier {
    /// Creates a notifier posting to `webhook_url`, or a disabled one for `None`.
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - Discord delivery will be disabled");
        }

        Self {
            client: Client::new(),
            webhook_url,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Posts a plain text message and returns its id.
    ///
    /// Returns `Ok(None)` when delivery is disabled or Discord rejected the post
    /// (the rejection is logged, not propagated).
    ///
    /// # Errors
    /// - Network failures and undecodable responses
    pub async fn send_text(&self, content: &str) -> Result<Option<String>> {
        self.post(&DiscordMessage {
            content: Some(truncate(content, MAX_CONTENT_CHARS)),
            embeds: Vec::new(),
        })
        .await
    }

    /// Posts the "playlist ready" embed for a finished extraction.
    pub async fn send_playlist_ready(&self, result: &ExtractionResult) -> Result<Option<String>> {
        self.post(&DiscordMessage {
            content: None,
            embeds: vec![playlist_ready_embed(result)],
        })
        .await
    }

    /// Deletes a message previously posted through this webhook.
    ///
    /// A message that is already gone is not an error.
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        let Some(webhook_url) = &self.webhook_url else {
            return Ok(());
        };

        let url = format!("{}/messages/{message_id}", webhook_url.trim_end_matches('/'));
        let response = self.client.delete(&url).send().await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            debug!(message_id, "Discord message deleted");
        } else {
            warn!(message_id, %status, "Failed to delete Discord message");
        }

        Ok(())
    }

    async fn post(&self, message: &DiscordMessage) -> Result<Option<String>> {
        let Some(webhook_url) = &self.webhook_url else {
            debug!("Discord delivery disabled, skipping message");
            return Ok(None);
        };

        let response = self
            .client
            .post(webhook_url)
            .query(&[("wait", "true")])
            .json(message)
            .send()
            .await?;

        if !response.status().is_success() {
            error!("Failed to send Discord message: {}", response.status());
            return Ok(None);
        }

        let created: CreatedMessage = response
            .json()
            .await
            .context("unexpected Discord webhook response")?;
        info!(message_id = %created.id, "Discord message sent");
        Ok(Some(created.id))
    }
}

impl Clone for DiscordNotifier {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            webhook_url: self.webhook_url.clone(),
        }
    }
}

/// Text of the message carrying track `index` (0-based) of `total`.
pub fn track_message(index: usize, total: usize, track: &str) -> String {
    format!("Track {} of {total}\n\n`@song {track}`", index + 1)
}

/// Embed announcing a finished extraction.
pub fn playlist_ready_embed(result: &ExtractionResult) -> DiscordEmbed {
    DiscordEmbed {
        title: "🎵 Playlist ready!".to_string(),
        description: format!(
            "Collected {} unique tracks. A low count may mean the page loaded slower \
             than the scroll patience allowed.",
            result.total_count
        ),
        url: result.source_url.clone(),
        color: EMBED_COLOR,
        timestamp: Utc::now().to_rfc3339(),
        fields: vec![
            DiscordField {
                name: "Tracks".to_string(),
                value: result.total_count.to_string(),
                inline: true,
            },
            DiscordField {
                name: "Link".to_string(),
                value: format!("[Open playlist]({})", result.source_url),
                inline: true,
            },
        ],
    }
}

fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => content[..cut].to_string(),
        None => content.to_string(),
    }
}

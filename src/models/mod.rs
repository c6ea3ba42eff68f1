//! Data models for extracted tracks and their interchange forms

use serde::{Deserialize, Serialize};
use std::fmt;

/// A track as read from the markup, before any cleaning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub subtitle: String,
}

impl RawItem {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
        }
    }
}

/// Cleaned `"<title> <artists>"` string; the deduplication key for one track.
///
/// Ordering is plain lexicographic order over the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedItem(String);

impl NormalizedItem {
    pub(crate) fn from_clean(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// View an already-normalized item as raw input again (title only).
    pub fn as_raw(&self) -> RawItem {
        RawItem::new(self.0.clone(), "")
    }
}

impl fmt::Display for NormalizedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of merging one batch into the accumulated set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    pub new_added: usize,
}

impl StepOutcome {
    pub fn made_progress(self) -> bool {
        self.new_added > 0
    }
}

/// Final, sorted output of a converged session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub source_url: String,
    pub total_count: usize,
    pub items: Vec<NormalizedItem>,
}

/// Structured interchange form written to disk and read back by delivery.
///
/// `complite_download` belongs to the caller: extraction always writes 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDocument {
    pub playlist_url: String,
    pub total_tracks: usize,
    pub complite_download: usize,
    pub tracks: Vec<String>,
}

impl From<&ExtractionResult> for PlaylistDocument {
    fn from(result: &ExtractionResult) -> Self {
        Self {
            playlist_url: result.source_url.clone(),
            total_tracks: result.total_count,
            complite_download: 0,
            tracks: result
                .items
                .iter()
                .map(|item| item.as_str().to_string())
                .collect(),
        }
    }
}

/// Per-owner delivery position stored between chat interactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current_index: i64,
    pub total_tracks: i64,
    pub json_file: String,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.current_index >= self.total_tracks
    }
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub timestamp: String,
    pub fields: Vec<DiscordField>,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<DiscordEmbed>,
}

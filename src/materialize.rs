//! Result materialization and on-disk export formats.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::engine::ExtractionSession;
use crate::models::{ExtractionResult, PlaylistDocument};

/// Largest file handed to chat delivery.
pub const MAX_DELIVERY_BYTES: u64 = 50 * 1024 * 1024;

/// Freeze a converged session into its sorted result.
///
/// Output order is lexicographic, independent of discovery order.
pub fn materialize(session: &ExtractionSession) -> ExtractionResult {
    let mut items: Vec<_> = session.items().cloned().collect();
    items.sort();

    ExtractionResult {
        source_url: session.source_url().to_string(),
        total_count: items.len(),
        items,
    }
}

/// One line per track, `"<n>. <track>"`, 1-based.
pub fn numbered_lines(result: &ExtractionResult) -> String {
    let mut text = String::new();
    for (index, item) in result.items.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", index + 1, item);
    }
    text
}

/// Pretty JSON of the structured form.
pub fn structured_json(result: &ExtractionResult) -> Result<String> {
    serde_json::to_string_pretty(&PlaylistDocument::from(result))
        .context("failed to serialize playlist document")
}

/// File formats offered for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Structured document with URL and counts.
    Json,
    /// Banner plus numbered list.
    Txt,
    /// Bare sorted track array.
    SimpleJson,
}

impl ExportFormat {
    pub const ALL: [Self; 3] = [Self::Json, Self::Txt, Self::SimpleJson];

    pub fn key(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Txt => "txt",
            Self::SimpleJson => "simple_json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Json => "JSON (full)",
            Self::Txt => "TXT (list)",
            Self::SimpleJson => "JSON (tracks only)",
        }
    }

    /// Parse a selection key; `"all"` selects every format.
    pub fn parse_selection(key: &str) -> Option<Vec<Self>> {
        match key {
            "all" => Some(Self::ALL.to_vec()),
            other => Self::ALL
                .into_iter()
                .find(|format| format.key() == other)
                .map(|format| vec![format]),
        }
    }
}

/// The three export files written for one finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBundle {
    pub json: PathBuf,
    pub txt: PathBuf,
    pub simple_json: PathBuf,
}

impl ExportBundle {
    /// Write every export format for `owner` into `dir`.
    ///
    /// # Errors
    /// - If `dir` cannot be created or a file cannot be written
    pub async fn write(
        dir: &Path,
        owner: i64,
        result: &ExtractionResult,
        now: NaiveDateTime,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;

        let base = format!("playlist_{owner}_{}", now.format("%Y%m%d_%H%M%S"));
        let bundle = Self {
            json: dir.join(format!("{base}_original.json")),
            txt: dir.join(format!("{base}.txt")),
            simple_json: dir.join(format!("{base}_simple.json")),
        };

        let tracks: Vec<&str> = result.items.iter().map(|item| item.as_str()).collect();

        let written = async {
            write_file(&bundle.json, structured_json(result)?).await?;
            write_file(&bundle.txt, banner_text(result, now)).await?;
            write_file(&bundle.simple_json, serde_json::to_string_pretty(&tracks)?).await
        }
        .await;
        if let Err(e) = written {
            bundle.remove().await;
            return Err(e);
        }

        debug!(owner, base = %base, "export bundle written");
        Ok(bundle)
    }

    pub fn path(&self, format: ExportFormat) -> &Path {
        match format {
            ExportFormat::Json => &self.json,
            ExportFormat::Txt => &self.txt,
            ExportFormat::SimpleJson => &self.simple_json,
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.json, &self.txt, &self.simple_json]
    }

    /// Remove every file of the bundle; missing files are ignored.
    pub async fn remove(&self) {
        for path in self.paths() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "removed export file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove export file"),
            }
        }
    }
}

/// Write the structured document used by track delivery.
pub async fn write_document(path: &Path, result: &ExtractionResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_file(path, structured_json(result)?).await
}

/// Read a structured document back.
pub async fn read_document(path: &Path) -> Result<PlaylistDocument> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed playlist file {}", path.display()))
}

fn banner_text(result: &ExtractionResult, now: NaiveDateTime) -> String {
    let rule = "=".repeat(50);
    let mut text = String::new();
    let _ = writeln!(text, "{rule}");
    let _ = writeln!(text, "Playlist export");
    let _ = writeln!(text, "URL: {}", result.source_url);
    let _ = writeln!(text, "Total tracks: {}", result.total_count);
    let _ = writeln!(text, "Exported at: {}", now.format("%d.%m.%Y %H:%M:%S"));
    let _ = writeln!(text, "{rule}");
    text.push('\n');
    text.push_str(&numbered_lines(result));
    text
}

async fn write_file(path: &Path, contents: String) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}

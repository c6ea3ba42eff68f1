//! Dispatch layer: validates playlist links, runs one extraction session per
//! owner in the background, then exports and delivers the result.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Local;
use regex::{Regex, RegexBuilder};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::database::Database;
use crate::delivery::{Delivery, TrackFeed};
use crate::discord::DiscordNotifier;
use crate::engine::PlaylistExtractor;
use crate::error::ExtractionError;
use crate::materialize::{ExportBundle, ExportFormat, MAX_DELIVERY_BYTES, write_document};
use crate::models::ExtractionResult;
use crate::registry::{ExportLedger, OwnerId, SessionRegistry, SessionTicket};
use crate::traits::SurfaceLauncher;

const PLAYLIST_LINK: &str = r"^https?://music\.yandex\.(ru|com)/playlists/(?:lk\.[a-f0-9\-]+|[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12})(?:\?.*)?$";

/// Recognises playlist links this harvester can extract.
#[derive(Debug, Clone)]
pub struct PlaylistLinkMatcher {
    pattern: Regex,
}

impl PlaylistLinkMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(PLAYLIST_LINK)
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    /// Whether `text`, ignoring surrounding whitespace, is a playlist link.
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text.trim())
    }
}

/// How a spawned session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Delivered { total: usize, document: PathBuf },
    Cancelled,
    Failed(String),
}

/// Ties sessions, exports and chat delivery together for many owners.
#[derive(Clone)]
pub struct Harvester {
    links: PlaylistLinkMatcher,
    launcher: Arc<dyn SurfaceLauncher>,
    extractor: Arc<PlaylistExtractor>,
    sessions: SessionRegistry,
    exports: ExportLedger,
    feed: TrackFeed,
    notifier: DiscordNotifier,
    output_dir: PathBuf,
}

impl Harvester {
    pub fn new(
        config: &AppConfig,
        launcher: Arc<dyn SurfaceLauncher>,
        database: Database,
        notifier: DiscordNotifier,
    ) -> Result<Self> {
        Ok(Self {
            links: PlaylistLinkMatcher::new()?,
            launcher,
            extractor: Arc::new(PlaylistExtractor::new(&config.session)?),
            sessions: SessionRegistry::new(),
            exports: ExportLedger::new(),
            feed: TrackFeed::new(database, notifier.clone()),
            notifier,
            output_dir: config.output_dir.clone(),
        })
    }

    /// Start extracting `url` for `owner`, replacing any session already running for them.
    pub async fn start(&self, owner: OwnerId, url: &str) -> Result<JoinHandle<SessionOutcome>> {
        let url = url.trim().to_string();
        if !self.is_playlist_link(&url) {
            bail!("not a playlist link: {url}");
        }

        let (ticket, replaced) = self.sessions.begin(owner).await;
        if replaced {
            self.notify("⏳ Previous extraction cancelled. Starting a new one...")
                .await;
        }
        self.notify("🔄 Extracting playlist...\nThis can take 1-5 minutes.")
            .await;

        info!(owner, url = %url, "extraction session started");
        let harvester = self.clone();
        Ok(tokio::spawn(async move {
            let outcome = harvester.run_session(&ticket, &url).await;
            harvester.sessions.finish(&ticket).await;
            outcome
        }))
    }

    pub fn is_playlist_link(&self, text: &str) -> bool {
        self.links.matches(text)
    }

    /// Cancel the owner's running session.
    pub async fn cancel(&self, owner: OwnerId) -> bool {
        self.sessions.cancel(owner).await
    }

    pub async fn is_running(&self, owner: OwnerId) -> bool {
        self.sessions.is_active(owner).await
    }

    /// The listener is ready for the next track.
    pub async fn advance(&self, owner: OwnerId) -> Result<Delivery> {
        self.feed.advance(owner).await
    }

    /// Export files for `selection` (`json`, `txt`, `simple_json` or `all`).
    ///
    /// Files too large for chat delivery are skipped with a warning.
    pub async fn export_paths(&self, owner: OwnerId, selection: &str) -> Result<Vec<PathBuf>> {
        let Some(formats) = ExportFormat::parse_selection(selection) else {
            bail!("unknown export format: {selection}");
        };
        let Some(bundle) = self.exports.get(owner).await else {
            bail!("no export files for owner {owner}; run an extraction first");
        };

        let mut paths = Vec::new();
        for format in formats {
            let path = bundle.path(format);
            let size = match tokio::fs::metadata(path).await {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "export file missing");
                    continue;
                }
            };
            if size > MAX_DELIVERY_BYTES {
                warn!(path = %path.display(), size, format = format.label(), "export file too large to deliver");
                continue;
            }
            paths.push(path.to_path_buf());
        }
        Ok(paths)
    }

    /// Delivery of the owner's export files is done; remove them.
    pub async fn finish_export(&self, owner: OwnerId) -> bool {
        self.exports.discard(owner).await
    }

    /// Cancel every running session and remove all pending export files.
    pub async fn shutdown(&self) {
        let cancelled = self.sessions.cancel_all().await;
        if cancelled > 0 {
            info!(cancelled, "cancelled running sessions");
        }
        self.exports.discard_all().await;
    }

    async fn run_session(&self, ticket: &SessionTicket, url: &str) -> SessionOutcome {
        let owner = ticket.owner;

        if let Err(e) = self.feed.clear_previous(owner).await {
            warn!(owner, error = %e, "failed to clear previous messages");
        }

        let result = match self
            .extractor
            .extract(self.launcher.as_ref(), url, &ticket.cancel)
            .await
        {
            Ok(result) => result,
            Err(ExtractionError::Cancelled) => {
                info!(owner, "extraction cancelled by owner");
                self.notify("❌ Extraction cancelled.").await;
                return SessionOutcome::Cancelled;
            }
            Err(e) => {
                error!(owner, error = %e, structural = e.is_structural(), "extraction failed");
                self.notify(&format!("❌ Extraction failed: {e}")).await;
                return SessionOutcome::Failed(e.to_string());
            }
        };

        // Cancelled or replaced after the surface converged.
        if ticket.cancel.is_cancelled() {
            info!(owner, "extraction cancelled before delivery");
            self.notify("❌ Extraction cancelled.").await;
            return SessionOutcome::Cancelled;
        }

        match self.deliver(owner, &result).await {
            Ok(document) => SessionOutcome::Delivered {
                total: result.total_count,
                document,
            },
            Err(e) => {
                error!(owner, error = %e, "failed to deliver playlist");
                self.notify(&format!("❌ Failed to save the playlist: {e}")).await;
                SessionOutcome::Failed(e.to_string())
            }
        }
    }

    async fn deliver(&self, owner: OwnerId, result: &ExtractionResult) -> Result<PathBuf> {
        let document = self.output_dir.join(format!("playlist_tracks_{owner}.json"));
        write_document(&document, result).await?;

        let bundle =
            ExportBundle::write(&self.output_dir, owner, result, Local::now().naive_local()).await?;
        self.exports.record(owner, bundle).await;

        self.notifier.send_playlist_ready(result).await?;
        self.feed.start(owner, result.total_count, &document).await?;

        info!(owner, total = result.total_count, "playlist ready for delivery");
        Ok(document)
    }

    async fn notify(&self, text: &str) {
        if let Err(e) = self.notifier.send_text(text).await {
            error!("Failed to send Discord notice: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionConfig, PageConfig, SessionConfig};
    use crate::engine::testing::{OneShotLauncher, ScriptedSurface};
    use std::time::Duration;
    use tokio::sync::Notify;

    const LINK: &str = "https://music.yandex.ru/playlists/lk.0a1b2c3d-aaaa";

    fn app_config(output_dir: PathBuf) -> AppConfig {
        AppConfig {
            session: SessionConfig {
                extraction: ExtractionConfig::new(900, 0.0, 2).unwrap(),
                page: PageConfig {
                    settle: Duration::ZERO,
                    prepare_pause: Duration::ZERO,
                    ..PageConfig::default()
                },
                ..SessionConfig::default()
            },
            output_dir,
            database_url: "sqlite::memory:".to_string(),
            webhook_url: None,
            chrome_path: None,
            headful: false,
        }
    }

    async fn harvester(output_dir: PathBuf, surface: ScriptedSurface) -> (Harvester, Database) {
        let config = app_config(output_dir);
        let database = Database::connect(&config.database_url).await.unwrap();
        let harvester = Harvester::new(
            &config,
            Arc::new(OneShotLauncher::new(surface)),
            database.clone(),
            DiscordNotifier::new(None),
        )
        .unwrap();
        (harvester, database)
    }

    #[test]
    fn recognises_playlist_links() {
        let links = PlaylistLinkMatcher::new().unwrap();
        let is_playlist_link = |text: &str| links.matches(text);

        assert!(is_playlist_link(LINK));
        assert!(is_playlist_link(
            "  HTTPS://music.yandex.com/playlists/05a74673-8b71-4f78-99ec-ee2640e26886?utm=x "
        ));
        assert!(!is_playlist_link("https://music.yandex.ru/album/123"));
        assert!(!is_playlist_link("see https://music.yandex.ru/playlists/lk.abc"));
        assert!(!is_playlist_link("https://example.com/playlists/lk.abc"));
    }

    #[tokio::test]
    async fn session_exports_and_starts_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let surface = ScriptedSurface::new(
            &[("Beta", "Two")],
            &[&[("Alpha", "One"), ("Beta", "Two")], &[("Gamma-Ray", "Three")]],
        );
        let (harvester, database) = harvester(dir.path().to_path_buf(), surface).await;

        let outcome = harvester.start(11, LINK).await.unwrap().await.unwrap();

        let expected_document = dir.path().join("playlist_tracks_11.json");
        assert_eq!(
            outcome,
            SessionOutcome::Delivered {
                total: 3,
                document: expected_document.clone(),
            }
        );
        assert!(!harvester.is_running(11).await);

        let progress = database.get_progress(11).await.unwrap().unwrap();
        assert_eq!(progress.current_index, 1);
        assert_eq!(progress.total_tracks, 3);

        let paths = harvester.export_paths(11, "all").await.unwrap();
        assert_eq!(paths.len(), 3);
        let txt = harvester.export_paths(11, "txt").await.unwrap();
        let listing = std::fs::read_to_string(&txt[0]).unwrap();
        assert!(listing.contains("1. Alpha One\n2. Beta Two\n3. GammaRay Three\n"));

        assert!(harvester.finish_export(11).await);
        assert!(paths.iter().all(|p| !p.exists()));
        assert!(harvester.export_paths(11, "json").await.is_err());
    }

    #[tokio::test]
    async fn rejects_foreign_links_without_starting() {
        let dir = tempfile::tempdir().unwrap();
        let (harvester, _) =
            harvester(dir.path().to_path_buf(), ScriptedSurface::new(&[], &[])).await;

        assert!(harvester.start(1, "https://example.com/list").await.is_err());
        assert!(!harvester.is_running(1).await);
    }

    #[tokio::test]
    async fn cancelled_session_produces_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let surface = ScriptedSurface::new(&[("A", "1")], &[&[("B", "2")]]);
        let probe = surface.probe();
        let (harvester, database) = harvester(dir.path().to_path_buf(), surface).await;

        let handle = harvester.start(4, LINK).await.unwrap();
        assert!(harvester.cancel(4).await);

        assert_eq!(handle.await.unwrap(), SessionOutcome::Cancelled);
        assert!(probe.closed.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(database.get_progress(4).await.unwrap(), None);
        assert!(harvester.export_paths(4, "all").await.is_err());
    }

    #[tokio::test]
    async fn cancellation_after_convergence_delivers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let surface = ScriptedSurface::new(&[("A", "1")], &[])
            .hold_close(Arc::clone(&entered), Arc::clone(&release));
        let (harvester, database) = harvester(dir.path().to_path_buf(), surface).await;

        let handle = harvester.start(4, LINK).await.unwrap();
        entered.notified().await;
        assert!(harvester.cancel(4).await);
        release.notify_one();

        assert_eq!(handle.await.unwrap(), SessionOutcome::Cancelled);
        assert_eq!(database.get_progress(4).await.unwrap(), None);
        assert!(harvester.export_paths(4, "all").await.is_err());
        assert!(!dir.path().join("playlist_tracks_4.json").exists());
    }

    #[tokio::test]
    async fn structural_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let surface = ScriptedSurface::new(&[("A", "1")], &[]).container_missing_at(1);
        let (harvester, _) = harvester(dir.path().to_path_buf(), surface).await;

        let outcome = harvester.start(2, LINK).await.unwrap().await.unwrap();

        assert!(matches!(outcome, SessionOutcome::Failed(message) if message.contains("scroll container")));
    }
}

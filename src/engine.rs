//! # Convergence Engine
//!
//! Drives a virtualized playlist through repeated scroll steps and merges the
//! tracks mounted after each step into one deduplicated set.
//!
//! A session moves through four states:
//!
//! - **Bootstrapping**: items rendered before any scrolling seed the set.
//! - **Stepping**: scroll, pause, extract, merge. Each step that adds nothing
//!   bumps the no-progress counter; any novel item resets it.
//! - **Converged**: the counter reached `max_consecutive_no_progress`.
//! - **Aborted**: the scroll container vanished, the surface failed, or the
//!   owner cancelled. Nothing is returned and the partial set is dropped.
//!
//! Convergence is a heuristic. A page that takes longer than
//! `pause × max_consecutive_no_progress` to mount its next items ends the
//! session early without any error, so a small result may be incomplete.
//!
//! Cancellation is only observed between steps (and once before
//! bootstrapping), never inside a scroll/pause/extract triplet.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ExtractionConfig, PageConfig, SessionConfig};
use crate::error::ExtractionError;
use crate::extractor::ClassPatternExtractor;
use crate::materialize::materialize;
use crate::models::{ExtractionResult, NormalizedItem, StepOutcome};
use crate::normalizer::Normalizer;
use crate::scroll::{ScrollDriver, ScrollResult};
use crate::traits::{ItemExtractor, RenderSurface, SurfaceLauncher};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Bootstrapping,
    Stepping,
    Converged,
    Aborted,
}

/// State of one extraction call. Never persisted or shared.
#[derive(Debug)]
pub struct ExtractionSession {
    source_url: String,
    config: ExtractionConfig,
    accumulated: HashSet<NormalizedItem>,
    consecutive_no_progress: u32,
    step_count: u32,
    state: SessionState,
}

impl ExtractionSession {
    pub fn new(source_url: impl Into<String>, config: ExtractionConfig) -> Self {
        Self {
            source_url: source_url.into(),
            config,
            accumulated: HashSet::new(),
            consecutive_no_progress: 0,
            step_count: 0,
            state: SessionState::Bootstrapping,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn consecutive_no_progress(&self) -> u32 {
        self.consecutive_no_progress
    }

    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    pub fn contains(&self, item: &NormalizedItem) -> bool {
        self.accumulated.contains(item)
    }

    pub fn items(&self) -> impl Iterator<Item = &NormalizedItem> {
        self.accumulated.iter()
    }

    /// Seed the set with the pre-scroll batch and start stepping.
    pub fn bootstrap<I>(&mut self, batch: I) -> StepOutcome
    where
        I: IntoIterator<Item = NormalizedItem>,
    {
        debug_assert_eq!(self.state, SessionState::Bootstrapping);
        let outcome = self.merge(batch);
        self.state = SessionState::Stepping;
        outcome
    }

    /// Insert a batch, counting only items not seen before.
    pub fn merge<I>(&mut self, batch: I) -> StepOutcome
    where
        I: IntoIterator<Item = NormalizedItem>,
    {
        let new_added = batch
            .into_iter()
            .filter(|item| self.accumulated.insert(item.clone()))
            .count();
        StepOutcome { new_added }
    }

    /// Account for one finished step and decide whether the session converged.
    pub fn record_step(&mut self, outcome: StepOutcome) -> SessionState {
        self.step_count += 1;

        if outcome.made_progress() {
            self.consecutive_no_progress = 0;
        } else {
            self.consecutive_no_progress += 1;
        }

        if self.consecutive_no_progress >= self.config.max_consecutive_no_progress {
            self.state = SessionState::Converged;
        }
        self.state
    }

    /// Merge one stepping batch and record it.
    pub fn step<I>(&mut self, batch: I) -> (StepOutcome, SessionState)
    where
        I: IntoIterator<Item = NormalizedItem>,
    {
        let outcome = self.merge(batch);
        (outcome, self.record_step(outcome))
    }

    fn abort(&mut self) {
        self.state = SessionState::Aborted;
        self.accumulated.clear();
    }
}

/// The scroll → pause → extract → merge loop over one render surface.
pub struct ConvergenceEngine {
    scroll: ScrollDriver,
    extractor: Arc<dyn ItemExtractor>,
    normalizer: Normalizer,
    config: ExtractionConfig,
}

impl ConvergenceEngine {
    pub fn new(
        scroll: ScrollDriver,
        extractor: Arc<dyn ItemExtractor>,
        normalizer: Normalizer,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            scroll,
            extractor,
            normalizer,
            config,
        }
    }

    /// Run a session against an already navigated surface.
    ///
    /// Returns the converged session; every other exit drops the partial set.
    ///
    /// # Errors
    /// - `ContainerNotFound` if the scroll container is missing at any step
    /// - `Cancelled` if `cancel` fires before bootstrapping or between steps
    /// - `Surface` if the surface fails to evaluate a script or return markup
    pub async fn run(
        &self,
        surface: &mut dyn RenderSurface,
        source_url: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractionSession, ExtractionError> {
        let mut session = ExtractionSession::new(source_url, self.config.clone());
        match self.drive(&mut session, surface, cancel).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.abort();
                warn!(
                    url = source_url,
                    steps = session.step_count(),
                    error = %e,
                    "extraction session aborted"
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut ExtractionSession,
        surface: &mut dyn RenderSurface,
        cancel: &CancellationToken,
    ) -> Result<(), ExtractionError> {
        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }

        let initial = self.visible_items(surface).await?;
        let seeded = session.bootstrap(initial);
        info!(count = seeded.new_added, "collected initially rendered tracks");

        info!(
            step_size = self.config.step_size_px,
            pause_secs = self.config.pause.as_secs_f64(),
            "starting scroll loop"
        );

        while session.state() == SessionState::Stepping {
            if cancel.is_cancelled() {
                return Err(ExtractionError::Cancelled);
            }

            let step = session.step_count() + 1;
            debug!(step, "scrolling by {}px", self.config.step_size_px);

            match self.scroll.advance(surface, self.config.step_size_px).await? {
                ScrollResult::ContainerNotFound => {
                    return Err(ExtractionError::ContainerNotFound {
                        step,
                        selector: self.scroll.container_selector().to_string(),
                    });
                }
                ScrollResult::Advanced(height) => debug!(step, height, "container advanced"),
            }

            if !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }

            let batch = self.visible_items(surface).await?;
            let (outcome, _) = session.step(batch);

            if outcome.made_progress() {
                info!(
                    step,
                    new_added = outcome.new_added,
                    total = session.len(),
                    "added new tracks"
                );
            } else {
                info!(
                    step,
                    stalled = session.consecutive_no_progress(),
                    patience = self.config.max_consecutive_no_progress,
                    "no new tracks"
                );
            }
        }

        info!(
            total = session.len(),
            steps = session.step_count(),
            "extraction converged"
        );
        Ok(())
    }

    async fn visible_items(
        &self,
        surface: &mut dyn RenderSurface,
    ) -> Result<Vec<NormalizedItem>, ExtractionError> {
        let markup = surface.current_markup().await?;
        Ok(self
            .extractor
            .extract_visible(&markup)
            .iter()
            .map(|raw| self.normalizer.normalize(raw))
            .collect())
    }
}

/// Full session: open a surface, load and prepare the page, converge, release.
pub struct PlaylistExtractor {
    engine: ConvergenceEngine,
    page: PageConfig,
}

impl PlaylistExtractor {
    /// Build an extractor from a session configuration.
    ///
    /// # Errors
    /// - If the extractor's class patterns do not compile
    pub fn new(config: &SessionConfig) -> anyhow::Result<Self> {
        let extractor = ClassPatternExtractor::new(&config.extractor)?;
        Ok(Self::with_extractor(config, Arc::new(extractor)))
    }

    pub fn with_extractor(config: &SessionConfig, extractor: Arc<dyn ItemExtractor>) -> Self {
        Self {
            engine: ConvergenceEngine::new(
                ScrollDriver::new(config.scroll.clone()),
                extractor,
                Normalizer::new(config.denylist.clone()),
                config.extraction.clone(),
            ),
            page: config.page.clone(),
        }
    }

    /// Extract `url` on a fresh surface from `launcher`.
    pub async fn extract(
        &self,
        launcher: &dyn SurfaceLauncher,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractionError> {
        let surface = launcher
            .open()
            .await
            .context("failed to open render surface")?;
        self.extract_on(surface, url, cancel).await
    }

    /// Extract `url` on `surface`, which is closed on every exit path.
    pub async fn extract_on(
        &self,
        mut surface: Box<dyn RenderSurface>,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, ExtractionError> {
        let outcome = self.load_and_converge(surface.as_mut(), url, cancel).await;

        if let Err(e) = surface.close().await {
            warn!(url, error = %e, "failed to release render surface");
        }

        outcome.map(|session| {
            let result = materialize(&session);
            info!(url, total = result.total_count, "playlist extracted");
            result
        })
    }

    async fn load_and_converge(
        &self,
        surface: &mut dyn RenderSurface,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ExtractionSession, ExtractionError> {
        info!(url, "opening playlist");
        surface.navigate(url).await?;
        pause(self.page.settle).await;

        if let Some(script) = &self.page.prepare_script {
            debug!("removing page overlays");
            surface
                .run_script(script)
                .await
                .context("page preparation script failed")?;
            pause(self.page.prepare_pause).await;
        }

        self.engine.run(surface, url, cancel).await
    }
}

async fn pause(duration: std::time::Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

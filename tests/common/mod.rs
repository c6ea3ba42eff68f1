//! Integration testing helpers: a render surface replaying scripted renderings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use playlist_harvester::{RenderSurface, SessionConfig};
use serde_json::Value;

/// Session configuration without any real waiting around the scroll loop.
pub fn quick_config(step_size: u32, pause_secs: f64, patience: u32) -> SessionConfig {
    let mut config = SessionConfig::default();
    config.extraction =
        playlist_harvester::ExtractionConfig::new(step_size, pause_secs, patience).unwrap();
    config.page.settle = std::time::Duration::ZERO;
    config.page.prepare_pause = std::time::Duration::ZERO;
    config
}

/// Markup of a playlist page with the given `(title, artists)` rows mounted.
pub fn page(rows: &[(&str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(title, artists)| {
            format!(
                r#"<div class="CommonTrack_root__a"><a class="Meta_albumLink__b" href="/album"><span class="Meta_title__c">{title}</span></a><div class="Meta_artists__d"><span class="Meta_subtitle__e">{artists}</span></div></div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div data-virtuoso-scroller="true">{rows}</div></body></html>"#)
}

#[derive(Default)]
pub struct Counters {
    pub scrolls: AtomicUsize,
    pub closed: AtomicBool,
}

impl Counters {
    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Returns `initial` until the first scroll, then one rendering per scroll;
/// once the script runs out the final rendering stays mounted.
pub struct ReplaySurface {
    current: String,
    queue: VecDeque<String>,
    counters: Arc<Counters>,
}

impl ReplaySurface {
    pub fn new(initial: &[(&str, &str)], steps: &[&[(&str, &str)]]) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let surface = Self {
            current: page(initial),
            queue: steps.iter().map(|rows| page(rows)).collect(),
            counters: Arc::clone(&counters),
        };
        (surface, counters)
    }
}

#[async_trait]
impl RenderSurface for ReplaySurface {
    async fn navigate(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<Value> {
        if !script.contains("scrollTop") {
            return Ok(Value::Null);
        }
        self.counters.scrolls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queue.pop_front() {
            self.current = next;
        }
        Ok(serde_json::json!(4_800))
    }

    async fn current_markup(&mut self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

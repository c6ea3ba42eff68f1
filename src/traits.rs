//! Seams between the extraction core and the browser it drives

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RawItem;

/// A controllable page-rendering session (one browser tab).
///
/// A surface renders one page at a time and is owned by exactly one
/// extraction session for that session's whole lifetime.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Load `url` in this surface.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluate a script in the page and return its JSON value
    /// (`Value::Null` for `null`/`undefined`).
    async fn run_script(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Markup of the current rendering.
    async fn current_markup(&mut self) -> Result<String>;

    /// Release the surface. Called exactly once, on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Hands out independent render surfaces, one per session.
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSurface>>;
}

/// Parses the currently mounted item nodes out of rendered markup.
pub trait ItemExtractor: Send + Sync {
    /// Items in document order. Malformed nodes are skipped, never reported.
    fn extract_visible(&self, markup: &str) -> Vec<RawItem>;
}

//! Chromium-backed render surfaces.
//!
//! One browser process is shared by the launcher; every session gets its own
//! tab, so two sessions never render on the same page.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::traits::{RenderSurface, SurfaceLauncher};

/// Launch options for the shared browser.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Explicit browser executable; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Show the browser window instead of running headless.
    pub headful: bool,
}

/// Owns the browser process and opens one tab per session.
pub struct ChromiumLauncher {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumLauncher {
    /// Launch the browser.
    ///
    /// # Errors
    /// - If the browser configuration is rejected or the process fails to start
    pub async fn launch(options: &BrowserOptions) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .window_size(1920, 1080);
        if let Some(path) = &options.executable {
            builder = builder.chrome_executable(path);
        }
        if options.headful {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        info!(headful = options.headful, "browser launched");
        Ok(Self { browser, handler })
    }

    /// Close the browser process.
    pub async fn shutdown(mut self) -> Result<()> {
        self.browser.close().await.context("failed to close browser")?;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "browser did not exit cleanly");
        }
        self.handler.abort();
        Ok(())
    }
}

#[async_trait]
impl SurfaceLauncher for ChromiumLauncher {
    async fn open(&self) -> Result<Box<dyn RenderSurface>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to open a new tab")?;
        Ok(Box::new(ChromiumSurface { page }))
    }
}

/// A single browser tab.
pub struct ChromiumSurface {
    page: Page,
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn run_script(&mut self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn current_markup(&mut self) -> Result<String> {
        self.page.content().await.context("failed to read page markup")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close tab")
    }
}

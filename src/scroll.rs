//! Scroll driver for the virtualized list container.

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::config::ScrollConfig;
use crate::traits::RenderSurface;

/// Outcome of one scroll step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollResult {
    /// The container moved; carries its reported scroll height.
    Advanced(f64),
    /// No element matches the container selector in the current rendering.
    ContainerNotFound,
}

/// Issues one incremental scroll command per step.
#[derive(Debug, Clone)]
pub struct ScrollDriver {
    config: ScrollConfig,
}

impl ScrollDriver {
    pub fn new(config: ScrollConfig) -> Self {
        Self { config }
    }

    pub fn container_selector(&self) -> &str {
        &self.config.container_selector
    }

    /// Scroll the container by `step_px`, snapping to the end once the tail is
    /// within the lookahead margin.
    ///
    /// # Errors
    /// - If the surface fails to evaluate the script
    pub async fn advance(
        &self,
        surface: &mut dyn RenderSurface,
        step_px: u32,
    ) -> Result<ScrollResult> {
        let value = surface.run_script(&self.step_script(step_px)).await?;
        let result = interpret(&value);
        debug!(?result, step_px, "scroll step issued");
        Ok(result)
    }

    /// Script returning the container's `scrollHeight`, or `null` when absent.
    pub fn step_script(&self, step_px: u32) -> String {
        // The selector is embedded as a JSON string literal so quotes survive.
        let selector = Value::String(self.config.container_selector.clone());
        format!(
            r"(() => {{
    const container = document.querySelector({selector});
    if (!container) return null;
    container.scrollTop += {step_px};
    if (container.scrollTop + container.clientHeight + {margin} >= container.scrollHeight) {{
        container.scrollTop = container.scrollHeight;
    }}
    return container.scrollHeight;
}})()",
            margin = self.config.lookahead_margin_px,
        )
    }
}

/// Anything other than a number means the container was not found; the
/// reported height itself is informational only.
fn interpret(value: &Value) -> ScrollResult {
    value
        .as_f64()
        .map_or(ScrollResult::ContainerNotFound, ScrollResult::Advanced)
}

//! Configuration for extraction sessions and the surrounding application.
//!
//! Values come from the environment (optionally loaded from a `.env` file by
//! the binary). Every variable has a default matching the playlist page the
//! harvester was built for.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Tuning knobs for one extraction session.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Pixels added to the container's scroll offset per step.
    pub step_size_px: u32,
    /// Fixed wait after each scroll step so lazily mounted items can render.
    pub pause: Duration,
    /// Consecutive steps without a new item before the session converges.
    pub max_consecutive_no_progress: u32,
}

impl ExtractionConfig {
    /// Build a validated configuration.
    ///
    /// # Errors
    /// - `step_size_px` is zero
    /// - `pause_secs` is negative, NaN or infinite
    /// - `max_consecutive_no_progress` is zero
    pub fn new(
        step_size_px: u32,
        pause_secs: f64,
        max_consecutive_no_progress: u32,
    ) -> Result<Self, ConfigError> {
        if step_size_px == 0 {
            return Err(ConfigError::ZeroStepSize);
        }
        let pause = Duration::try_from_secs_f64(pause_secs)
            .map_err(|_| ConfigError::InvalidPause(pause_secs))?;
        if max_consecutive_no_progress == 0 {
            return Err(ConfigError::ZeroPatience);
        }

        Ok(Self {
            step_size_px,
            pause,
            max_consecutive_no_progress,
        })
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            step_size_px: 900,
            pause: Duration::from_secs(5),
            max_consecutive_no_progress: 2,
        }
    }
}

/// Where the virtualized list lives and how far ahead of the end the tail is forced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollConfig {
    pub container_selector: String,
    pub lookahead_margin_px: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            container_selector: r#"[data-virtuoso-scroller="true"]"#.to_string(),
            lookahead_margin_px: 500,
        }
    }
}

/// Class patterns identifying track nodes in the rendered markup.
///
/// Patterns are case-insensitive regular expressions matched against each
/// individual class of an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    /// Anchor element wrapping one track.
    pub item_class: String,
    /// Title `span` inside the item anchor.
    pub title_class: String,
    /// First `span` after the item anchor carrying the artists.
    pub subtitle_class: String,
    /// Used when no subtitle node follows the item.
    pub subtitle_placeholder: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            item_class: "Meta_albumLink__".to_string(),
            title_class: "Meta_title__".to_string(),
            subtitle_class: "Meta_subtitle__|artist".to_string(),
            subtitle_placeholder: "Unknown Artist".to_string(),
        }
    }
}

/// Page-level behaviour around the scroll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PageConfig {
    /// Wait after navigation before anything is read from the page.
    pub settle: Duration,
    /// Script run once before bootstrapping, removing overlays that shrink the list viewport.
    pub prepare_script: Option<String>,
    /// Wait after the preparation script.
    pub prepare_pause: Duration,
}

const REMOVE_OVERLAYS_JS: &str = r#"(() => {
    const sidebar = document.querySelector('aside[class*="Navbar_root"]');
    if (sidebar) sidebar.remove();
    const banner = document.querySelector('section[class*="SideAdvertBanner_root"]');
    if (banner) banner.remove();
    return true;
})()"#;

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(8),
            prepare_script: Some(REMOVE_OVERLAYS_JS.to_string()),
            prepare_pause: Duration::from_secs(1),
        }
    }
}

/// Everything one session needs besides the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub extraction: ExtractionConfig,
    pub scroll: ScrollConfig,
    pub extractor: ExtractorConfig,
    pub page: PageConfig,
    /// Characters stripped from titles and artists before deduplication.
    pub denylist: Vec<char>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            scroll: ScrollConfig::default(),
            extractor: ExtractorConfig::default(),
            page: PageConfig::default(),
            denylist: vec!['-'],
        }
    }
}

/// Application-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub output_dir: PathBuf,
    pub database_url: String,
    pub webhook_url: Option<String>,
    pub chrome_path: Option<PathBuf>,
    pub headful: bool,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let step_size = parse_var(&lookup, "HARVEST_STEP_SIZE", 900_u32)?;
        let pause_secs = parse_var(&lookup, "HARVEST_PAUSE_SECS", 5.0_f64)?;
        let patience = parse_var(&lookup, "HARVEST_MAX_NO_PROGRESS", 2_u32)?;
        let settle_secs = parse_var(&lookup, "HARVEST_SETTLE_SECS", 8.0_f64)?;
        let settle =
            Duration::try_from_secs_f64(settle_secs).map_err(|_| ConfigError::InvalidVar {
                key: "HARVEST_SETTLE_SECS".to_string(),
                value: settle_secs.to_string(),
            })?;

        let session = SessionConfig {
            extraction: ExtractionConfig::new(step_size, pause_secs, patience)?,
            page: PageConfig {
                settle,
                ..PageConfig::default()
            },
            ..SessionConfig::default()
        };

        Ok(Self {
            session,
            output_dir: lookup("HARVEST_OUTPUT_DIR")
                .map_or_else(|| PathBuf::from("exports"), PathBuf::from),
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:database/progress.db".to_string()),
            webhook_url: lookup("DISCORD_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),
            chrome_path: lookup("CHROME_PATH").map(PathBuf::from),
            headful: parse_var(&lookup, "HARVEST_HEADFUL", false)?,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidVar {
            key: key.to_string(),
            value,
        }),
    }
}

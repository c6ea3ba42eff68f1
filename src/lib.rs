//! Progressive scroll-and-scrape extraction of virtualized playlist pages.
//!
//! [`engine::PlaylistExtractor`] drives a render surface through repeated
//! scroll steps, merges the tracks mounted after each step into a
//! deduplicated set and stops once several consecutive steps add nothing.
//! The surrounding modules export the result and stream it to a chat channel.

pub mod config;
pub mod database;
pub mod delivery;
pub mod discord;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod harvester;
pub mod materialize;
pub mod models;
pub mod normalizer;
pub mod registry;
pub mod scroll;
pub mod surface;
pub mod traits;

pub use config::{AppConfig, ExtractionConfig, SessionConfig};
pub use engine::{ConvergenceEngine, ExtractionSession, PlaylistExtractor, SessionState};
pub use error::{ConfigError, ExtractionError};
pub use harvester::{Harvester, SessionOutcome};
pub use models::{ExtractionResult, NormalizedItem, RawItem};
pub use traits::{ItemExtractor, RenderSurface, SurfaceLauncher};

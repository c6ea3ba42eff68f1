use std::sync::Arc;

use anyhow::{Context, Result, bail};
use playlist_harvester::database::Database;
use playlist_harvester::discord::DiscordNotifier;
use playlist_harvester::surface::{BrowserOptions, ChromiumLauncher};
use playlist_harvester::{AppConfig, Harvester, SessionOutcome};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: playlist-harvester <playlist-url> [owner-id]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        bail!(USAGE);
    };
    let owner = match args.next() {
        Some(raw) => raw.parse::<i64>().with_context(|| format!("invalid owner id: {raw}"))?,
        None => 0,
    };

    info!("Starting playlist harvester");

    let config = AppConfig::from_env()?;
    let database = Database::connect(&config.database_url).await?;
    let notifier = DiscordNotifier::new(config.webhook_url.clone());

    let launcher = Arc::new(
        ChromiumLauncher::launch(&BrowserOptions {
            executable: config.chrome_path.clone(),
            headful: config.headful,
        })
        .await?,
    );

    let harvester = Harvester::new(&config, launcher.clone(), database, notifier)?;
    let mut session = harvester.start(owner, &url).await?;

    let outcome = tokio::select! {
        joined = &mut session => joined.context("extraction task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling extraction");
            harvester.cancel(owner).await;
            session.await.context("extraction task panicked")?
        }
    };

    match &outcome {
        SessionOutcome::Delivered { total, document } => {
            info!("Collected {} unique tracks into {}", total, document.display());
            for path in harvester.export_paths(owner, "all").await? {
                info!("Exported {}", path.display());
            }
            info!("A slow page can end extraction early; raise HARVEST_PAUSE_SECS or HARVEST_MAX_NO_PROGRESS if tracks are missing");
        }
        SessionOutcome::Cancelled => warn!("Extraction cancelled"),
        SessionOutcome::Failed(message) => error!("Extraction failed: {}", message),
    }

    drop(harvester);
    match Arc::try_unwrap(launcher) {
        Ok(launcher) => launcher.shutdown().await?,
        Err(_) => warn!("Browser still in use, leaving it to exit with the process"),
    }

    if let SessionOutcome::Failed(message) = outcome {
        bail!("extraction failed: {message}");
    }
    Ok(())
}

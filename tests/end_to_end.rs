mod common;

use common::{ReplaySurface, quick_config};
use playlist_harvester::materialize::{numbered_lines, structured_json};
use playlist_harvester::{ExtractionError, PlaylistExtractor};
use tokio_util::sync::CancellationToken;

const URL: &str = "https://music.yandex.ru/playlists/lk.1234abcd";

#[tokio::test]
async fn scripted_playlist_converges_to_sorted_unique_tracks() {
    let (surface, counters) = ReplaySurface::new(
        &[("A", "x")],
        &[&[("A", "x"), ("B", "y")], &[("B", "y"), ("C", "z")], &[], &[]],
    );
    let extractor = PlaylistExtractor::new(&quick_config(900, 0.0, 2)).unwrap();

    let result = extractor
        .extract_on(Box::new(surface), URL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(counters.scrolls(), 4);
    assert!(counters.closed());
    assert_eq!(result.total_count, 3);
    assert_eq!(numbered_lines(&result), "1. A x\n2. B y\n3. C z\n");

    let document: serde_json::Value =
        serde_json::from_str(&structured_json(&result).unwrap()).unwrap();
    assert_eq!(
        document,
        serde_json::json!({
            "playlist_url": URL,
            "total_tracks": 3,
            "complite_download": 0,
            "tracks": ["A x", "B y", "C z"],
        })
    );
}

#[tokio::test(start_paused = true)]
async fn step_count_does_not_depend_on_step_size_or_pause() {
    for (step_size, pause) in [(100, 0.0), (900, 5.0), (5_000, 30.0)] {
        let (surface, counters) = ReplaySurface::new(
            &[],
            &[&[("One", "a")], &[("One", "a"), ("Two", "b")]],
        );
        let extractor = PlaylistExtractor::new(&quick_config(step_size, pause, 3)).unwrap();

        let result = extractor
            .extract_on(Box::new(surface), URL, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_count, 2);
        assert_eq!(counters.scrolls(), 2 + 3, "step {step_size}, pause {pause}");
    }
}

#[tokio::test]
async fn hyphenated_renderings_deduplicate() {
    let (surface, _) = ReplaySurface::new(
        &[("Re-Wind", "Artist-Name")],
        &[&[("ReWind", "ArtistName"), (" Re-Wind ", "Artist-Name ")]],
    );
    let extractor = PlaylistExtractor::new(&quick_config(900, 0.0, 1)).unwrap();

    let result = extractor
        .extract_on(Box::new(surface), URL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.total_count, 1);
    assert_eq!(result.items[0].as_str(), "ReWind ArtistName");
}

#[tokio::test]
async fn page_without_scroll_container_is_a_structural_error() {
    struct NoContainer;

    #[async_trait::async_trait]
    impl playlist_harvester::RenderSurface for NoContainer {
        async fn navigate(&mut self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn run_script(&mut self, _script: &str) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn current_markup(&mut self) -> anyhow::Result<String> {
            Ok(common::page(&[("Only", "Me")]))
        }
        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let extractor = PlaylistExtractor::new(&quick_config(900, 0.0, 2)).unwrap();
    let err = extractor
        .extract_on(Box::new(NoContainer), URL, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExtractionError::ContainerNotFound { step: 1, .. }));
}

//! Media stage tests against the fake job runner.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vcap_media::testing::{progressive_mp4, FakeJobRunner, JobKind};
use vcap_media::{
    AcquisitionPolicy, CaptionPredictor, DurationProbe, FeatureExtractor, MediaAcquirer,
    MediaError,
};
use vcap_models::{ArtifactLayout, ContentId, FeatureStream, MediaArtifact, Modality};

fn id() -> ContentId {
    ContentId::parse("abc123").unwrap()
}

fn fast_policy() -> AcquisitionPolicy {
    AcquisitionPolicy {
        retry_base_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

fn acquirer(runner: &Arc<FakeJobRunner>, layout: &ArtifactLayout) -> MediaAcquirer {
    MediaAcquirer::new(runner.clone(), layout.clone(), fast_policy())
}

async fn staged_media(layout: &ArtifactLayout) -> MediaArtifact {
    tokio::fs::create_dir_all(&layout.media_root).await.unwrap();
    let path = layout.media_path(&id());
    tokio::fs::write(&path, b"mp4").await.unwrap();
    MediaArtifact {
        content_id: id(),
        path,
        container: "mp4".into(),
        encoding: None,
        size_bytes: 3,
    }
}

/// Leftover hidden staging entries in a root.
async fn staging_entries(root: &std::path::Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut dir) = tokio::fs::read_dir(root).await else {
        return names;
    };
    while let Some(entry) = dir.next_entry().await.unwrap() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            names.push(name);
        }
    }
    names
}

#[tokio::test]
async fn test_acquire_publishes_selected_encoding() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let runner = Arc::new(FakeJobRunner::new().with_encodings(vec![
        progressive_mp4("18", 360, 30.0),
        progressive_mp4("22", 720, 30.0),
    ]));

    let media = acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap();

    assert_eq!(media.path, layout.media_path(&id()));
    assert_eq!(media.encoding.unwrap().format_id, "18");
    assert!(media.size_bytes > 0);
    assert_eq!(runner.calls(JobKind::Fetch), 1);
    assert!(staging_entries(&layout.media_root).await.is_empty());
}

#[tokio::test]
async fn test_acquire_reuses_existing_artifact() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    staged_media(&layout).await;
    let runner = Arc::new(FakeJobRunner::new());

    let media = acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap();

    assert!(media.encoding.is_none());
    assert_eq!(runner.total_calls(), 0);
}

#[tokio::test]
async fn test_acquire_recovers_from_transient_failure() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let runner = Arc::new(FakeJobRunner::new().failing_fetch(2));

    acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap();

    assert_eq!(runner.calls(JobKind::Fetch), 3);
    assert!(layout.media_path(&id()).exists());
}

#[tokio::test]
async fn test_acquire_gives_up_after_retries() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let runner = Arc::new(FakeJobRunner::new().failing_fetch(u32::MAX));

    let err = acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap_err();

    assert!(matches!(err, MediaError::AcquisitionFailed { attempts: 3, .. }));
    assert_eq!(runner.calls(JobKind::Fetch), 3);
    assert!(!layout.media_path(&id()).exists());
    assert!(staging_entries(&layout.media_root).await.is_empty());
}

#[tokio::test]
async fn test_acquire_does_not_retry_unavailable_media() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let runner = Arc::new(
        FakeJobRunner::new().failing_fetch_with(u32::MAX, "ERROR: [youtube] abc123: Video unavailable"),
    );

    let err = acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap_err();

    assert!(matches!(err, MediaError::AcquisitionFailed { attempts: 1, .. }));
    assert!(err.to_string().contains("Video unavailable"));
    assert_eq!(runner.calls(JobKind::Fetch), 1);
    assert!(staging_entries(&layout.media_root).await.is_empty());
}

#[tokio::test]
async fn test_acquire_listing_failure_is_acquisition_failure() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let runner = Arc::new(FakeJobRunner::new().failing_listing());

    let err = acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap_err();

    assert_eq!(err.reason(), Some("AcquisitionFailedError"));
    assert_eq!(runner.calls(JobKind::Fetch), 0);
}

#[tokio::test]
async fn test_acquire_unsupported_format_skips_fetch() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let runner =
        Arc::new(FakeJobRunner::new().with_encodings(vec![progressive_mp4("22", 1080, 60.0)]));

    let err = acquirer(&runner, &layout).acquire("abc123", &id()).await.unwrap_err();

    assert!(matches!(err, MediaError::UnsupportedFormat(_)));
    assert_eq!(runner.calls(JobKind::Fetch), 0);
}

#[tokio::test]
async fn test_extract_all_publishes_every_stream() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let media = staged_media(&layout).await;
    let runner = Arc::new(FakeJobRunner::new());

    let features = FeatureExtractor::new(runner.clone(), layout.clone())
        .extract_all(&media, &id())
        .await
        .unwrap();

    for stream in [FeatureStream::Rgb, FeatureStream::Flow, FeatureStream::Vggish] {
        let path = features.path(stream).unwrap();
        assert_eq!(path, layout.feature_path(&id(), stream));
        assert!(path.exists());
    }
    assert_eq!(runner.calls(JobKind::Extract(Modality::Visual)), 1);
    assert_eq!(runner.calls(JobKind::Extract(Modality::Audio)), 1);
    assert!(staging_entries(&layout.feature_root).await.is_empty());
}

#[tokio::test]
async fn test_extract_reports_visual_failure_first() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let media = staged_media(&layout).await;
    let runner = Arc::new(
        FakeJobRunner::new()
            .failing_extraction(Modality::Visual, 1)
            .failing_extraction(Modality::Audio, 2),
    );

    let err = FeatureExtractor::new(runner, layout)
        .extract_all(&media, &id())
        .await
        .unwrap_err();

    assert_eq!(err.modality(), Some(Modality::Visual));
    assert_eq!(err.exit_status(), Some(1));
}

#[tokio::test]
async fn test_extract_zero_exit_without_output_fails() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let media = staged_media(&layout).await;
    let runner = Arc::new(FakeJobRunner::new().missing_feature_output(Modality::Audio));

    let err = FeatureExtractor::new(runner, layout.clone())
        .extract_all(&media, &id())
        .await
        .unwrap_err();

    assert_eq!(err.modality(), Some(Modality::Audio));
    assert_eq!(err.exit_status(), Some(0));
    assert!(!layout.feature_path(&id(), FeatureStream::Vggish).exists());
}

#[tokio::test]
async fn test_extract_reuses_complete_modality() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let media = staged_media(&layout).await;
    tokio::fs::create_dir_all(&layout.feature_root).await.unwrap();
    tokio::fs::write(layout.feature_path(&id(), FeatureStream::Vggish), b"npy")
        .await
        .unwrap();
    let runner = Arc::new(FakeJobRunner::new());

    FeatureExtractor::new(runner.clone(), layout)
        .extract_all(&media, &id())
        .await
        .unwrap();

    assert_eq!(runner.calls(JobKind::Extract(Modality::Audio)), 0);
    assert_eq!(runner.calls(JobKind::Extract(Modality::Visual)), 1);
}

#[tokio::test]
async fn test_probe_parses_duration() {
    let dir = TempDir::new().unwrap();
    let media = staged_media(&ArtifactLayout::under(dir.path())).await;

    let ok = DurationProbe::new(Arc::new(FakeJobRunner::new()));
    assert_eq!(ok.probe(&media).await.unwrap(), 42.5);

    let bad = DurationProbe::new(Arc::new(FakeJobRunner::new().with_probe_output("N/A")));
    let err = bad.probe(&media).await.unwrap_err();
    assert_eq!(err.reason(), Some("ProbeFailedError"));
}

async fn extracted(layout: &ArtifactLayout) -> vcap_models::FeatureSet {
    let media = staged_media(layout).await;
    FeatureExtractor::new(Arc::new(FakeJobRunner::new()), layout.clone())
        .extract_all(&media, &id())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_predict_returns_caption_and_cleans_staging() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let features = extracted(&layout).await;

    let caption = CaptionPredictor::new(Arc::new(FakeJobRunner::new()), layout.clone())
        .predict(42.5, &features, &id())
        .await
        .unwrap();

    assert_eq!(caption.payload(), &serde_json::json!({"caption": "a person walks"}));
    assert!(staging_entries(&layout.caption_root).await.is_empty());
    assert!(!layout.caption_path(&id()).exists());
}

#[tokio::test]
async fn test_predict_failure_modes() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let features = extracted(&layout).await;

    let failing = CaptionPredictor::new(
        Arc::new(FakeJobRunner::new().failing_prediction(137)),
        layout.clone(),
    );
    let err = failing.predict(42.5, &features, &id()).await.unwrap_err();
    assert_eq!(err.reason(), Some("PredictionFailedError"));
    assert_eq!(err.exit_status(), Some(137));

    let garbled = CaptionPredictor::new(
        Arc::new(FakeJobRunner::new().with_caption_output("{not json")),
        layout.clone(),
    );
    let err = garbled.predict(42.5, &features, &id()).await.unwrap_err();
    assert!(matches!(err, MediaError::MalformedOutput(_)));

    let silent = CaptionPredictor::new(
        Arc::new(FakeJobRunner::new().without_caption_output()),
        layout.clone(),
    );
    let err = silent.predict(42.5, &features, &id()).await.unwrap_err();
    assert_eq!(err.reason(), Some("MalformedOutputError"));
    assert!(staging_entries(&layout.caption_root).await.is_empty());
}

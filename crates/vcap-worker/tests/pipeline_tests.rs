//! End-to-end pipeline tests with a fake job runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use vcap_media::testing::{FakeJobRunner, JobKind};
use vcap_media::AcquisitionPolicy;
use vcap_models::{
    ArtifactLayout, CaptionArtifact, ContentId, FeatureStream, Modality, PipelineRequest,
    PipelineStage,
};
use vcap_storage::{FsResultCache, ResultCache, StorageError, StorageResult};
use vcap_worker::{CaptionPipeline, PipelineConfig};

struct Harness {
    _dir: TempDir,
    layout: ArtifactLayout,
    runner: Arc<FakeJobRunner>,
    cache: Arc<FsResultCache>,
    pipeline: CaptionPipeline,
}

fn harness(runner: FakeJobRunner) -> Harness {
    harness_with(runner, true)
}

fn harness_with(runner: FakeJobRunner, single_flight: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let config = PipelineConfig {
        layout: layout.clone(),
        acquisition: AcquisitionPolicy {
            retry_base_delay: Duration::from_millis(1),
            ..Default::default()
        },
        single_flight,
        ..Default::default()
    };
    let runner = Arc::new(runner);
    let cache = Arc::new(FsResultCache::new(layout.clone()));
    let pipeline = CaptionPipeline::new(&config, runner.clone(), cache.clone());

    Harness {
        _dir: dir,
        layout,
        runner,
        cache,
        pipeline,
    }
}

fn id(s: &str) -> ContentId {
    ContentId::parse(s).unwrap()
}

#[tokio::test]
async fn test_fresh_reference_runs_every_stage_and_caches() {
    let h = harness(FakeJobRunner::new());

    let output = h.pipeline.run_reference("abc123").await.unwrap();

    assert_eq!(output.content_id, id("abc123"));
    assert!(!output.cache_hit);
    assert_eq!(output.caption.payload(), &json!({"caption": "a person walks"}));

    assert_eq!(h.runner.calls(JobKind::Fetch), 1);
    assert_eq!(h.runner.calls(JobKind::Extract(Modality::Visual)), 1);
    assert_eq!(h.runner.calls(JobKind::Extract(Modality::Audio)), 1);
    assert_eq!(h.runner.calls(JobKind::Probe), 1);
    assert_eq!(h.runner.calls(JobKind::Predict), 1);

    assert_eq!(h.cache.lookup(&id("abc123")).await.unwrap(), Some(output.caption));
    assert!(h.layout.media_path(&id("abc123")).exists());
    assert!(h.layout.feature_path(&id("abc123"), FeatureStream::Flow).exists());
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let h = harness(FakeJobRunner::new());

    let first = h.pipeline.run_reference("abc123").await.unwrap();
    let calls_after_first = h.runner.total_calls();
    let second = h.pipeline.run_reference("abc123").await.unwrap();

    assert!(second.cache_hit);
    assert_eq!(first.caption, second.caption);
    assert_eq!(h.runner.total_calls(), calls_after_first);
}

#[tokio::test]
async fn test_url_and_bare_id_share_cache_entry() {
    let h = harness(FakeJobRunner::new());

    h.pipeline
        .run_reference("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await
        .unwrap();
    let again = h.pipeline.run_reference("https://youtu.be/dQw4w9WgXcQ").await.unwrap();

    assert!(again.cache_hit);
    assert_eq!(again.content_id, id("dQw4w9WgXcQ"));
}

#[tokio::test]
async fn test_malformed_reference_fails_in_identifier_extractor() {
    let h = harness(FakeJobRunner::new());

    for reference in ["", "   ", "https://vimeo.com/12345", "not a valid/ref"] {
        let err = h.pipeline.run_reference(reference).await.unwrap_err();
        let payload = serde_json::to_value(err.to_payload()).unwrap();

        assert_eq!(payload["success"], false, "reference {:?}", reference);
        assert_eq!(payload["stage"], "IdentifierExtractor");
        assert_eq!(payload["reason"], "InvalidReferenceError");
    }
    assert_eq!(h.runner.total_calls(), 0);
}

#[tokio::test]
async fn test_exhausted_fetch_retries_fail_in_media_acquirer() {
    let h = harness(FakeJobRunner::new().failing_fetch(u32::MAX));

    let err = h.pipeline.run_reference("abc123").await.unwrap_err();
    let payload = err.to_payload();

    assert_eq!(payload.stage, PipelineStage::MediaAcquirer);
    assert_eq!(payload.reason, "AcquisitionFailedError");
    assert_eq!(h.runner.calls(JobKind::Fetch), 3);
    assert!(!h.layout.media_path(&id("abc123")).exists());
    assert_eq!(h.runner.calls(JobKind::Extract(Modality::Visual)), 0);
    assert!(h.cache.lookup(&id("abc123")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unsupported_format_stops_before_fetch() {
    let h = harness(
        FakeJobRunner::new()
            .with_encodings(vec![vcap_media::testing::progressive_mp4("22", 720, 30.0)]),
    );

    let err = h.pipeline.run_reference("abc123").await.unwrap_err();

    assert_eq!(err.failed_stage(), PipelineStage::MediaAcquirer);
    assert_eq!(err.reason(), "UnsupportedFormatError");
    assert_eq!(h.runner.calls(JobKind::Fetch), 0);
}

#[tokio::test]
async fn test_visual_failure_is_reported_whatever_audio_does() {
    for audio_fails in [false, true] {
        let mut runner = FakeJobRunner::new().failing_extraction(Modality::Visual, 1);
        if audio_fails {
            runner = runner.failing_extraction(Modality::Audio, 1);
        }
        let h = harness(runner);

        let err = h.pipeline.run_reference("abc123").await.unwrap_err();
        let payload = err.to_payload();

        assert_eq!(payload.stage, PipelineStage::FeatureExtractor);
        assert_eq!(payload.reason, "ExtractionFailedError");
        assert_eq!(payload.modality, Some(Modality::Visual));
        assert_eq!(h.runner.calls(JobKind::Probe), 0);
        assert_eq!(h.runner.calls(JobKind::Predict), 0);
    }
}

#[tokio::test]
async fn test_probe_failure_stops_before_prediction() {
    let h = harness(FakeJobRunner::new().with_probe_output("N/A\n"));

    let err = h.pipeline.run_reference("abc123").await.unwrap_err();

    assert_eq!(err.failed_stage(), PipelineStage::DurationProbe);
    assert_eq!(err.reason(), "ProbeFailedError");
    assert_eq!(h.runner.calls(JobKind::Predict), 0);
}

#[tokio::test]
async fn test_prediction_failure_leaves_no_cache_entry() {
    let h = harness(FakeJobRunner::new().failing_prediction(1));

    let err = h.pipeline.run_reference("abc123").await.unwrap_err();

    assert_eq!(err.failed_stage(), PipelineStage::CaptionPredictor);
    assert_eq!(err.reason(), "PredictionFailedError");
    assert!(h.cache.lookup(&id("abc123")).await.unwrap().is_none());
    assert!(!h.cache.exists(&id("abc123")).await);
}

#[tokio::test]
async fn test_malformed_caption_output_is_not_cached() {
    let h = harness(FakeJobRunner::new().with_caption_output("<html>"));

    let err = h.pipeline.run_reference("abc123").await.unwrap_err();

    assert_eq!(err.failed_stage(), PipelineStage::CaptionPredictor);
    assert_eq!(err.reason(), "MalformedOutputError");
    assert!(!h.cache.exists(&id("abc123")).await);
}

#[tokio::test]
async fn test_retry_after_failure_reuses_artifacts() {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::under(dir.path());
    let config = PipelineConfig {
        layout: layout.clone(),
        ..Default::default()
    };
    let cache = Arc::new(FsResultCache::new(layout.clone()));

    let failing = Arc::new(FakeJobRunner::new().failing_prediction(1));
    CaptionPipeline::new(&config, failing, cache.clone())
        .run_reference("abc123")
        .await
        .unwrap_err();

    let healthy = Arc::new(FakeJobRunner::new());
    let output = CaptionPipeline::new(&config, healthy.clone(), cache)
        .run_reference("abc123")
        .await
        .unwrap();

    assert!(!output.cache_hit);
    assert_eq!(healthy.calls(JobKind::Fetch), 0);
    assert_eq!(healthy.calls(JobKind::Extract(Modality::Visual)), 0);
    assert_eq!(healthy.calls(JobKind::Extract(Modality::Audio)), 0);
    assert_eq!(healthy.calls(JobKind::Predict), 1);
}

/// Cache that never holds entries and rejects every write.
struct UnwritableCache;

#[async_trait]
impl ResultCache for UnwritableCache {
    async fn lookup(&self, _id: &ContentId) -> StorageResult<Option<CaptionArtifact>> {
        Ok(None)
    }

    async fn exists(&self, _id: &ContentId) -> bool {
        false
    }

    async fn store(&self, id: &ContentId, _artifact: &CaptionArtifact) -> StorageResult<()> {
        Err(StorageError::write_failed(
            format!("{}_captions.json", id),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
        ))
    }
}

#[tokio::test]
async fn test_cache_store_failure_fails_in_result_cache() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        layout: ArtifactLayout::under(dir.path()),
        ..Default::default()
    };
    let runner = Arc::new(FakeJobRunner::new());

    let err = CaptionPipeline::new(&config, runner.clone(), Arc::new(UnwritableCache))
        .run_reference("abc123")
        .await
        .unwrap_err();

    let payload = err.to_payload();
    assert_eq!(payload.stage, PipelineStage::ResultCache);
    assert_eq!(payload.reason, "CacheIOError");
    assert_eq!(runner.calls(JobKind::Predict), 1);
}

#[tokio::test]
async fn test_concurrent_requests_run_pipeline_once() {
    let h = Arc::new(harness(
        FakeJobRunner::new().with_fetch_delay(Duration::from_millis(50)),
    ));

    let runs = (0..3).map(|_| {
        let h = h.clone();
        async move { h.pipeline.run_reference("abc123").await }
    });
    let results = futures::future::join_all(runs).await;

    let outputs: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(outputs.iter().filter(|o| !o.cache_hit).count(), 1);
    assert!(outputs.windows(2).all(|w| w[0].caption == w[1].caption));
    assert_eq!(h.runner.calls(JobKind::Fetch), 1);
    assert_eq!(h.runner.calls(JobKind::Predict), 1);
}

#[tokio::test]
async fn test_without_single_flight_concurrent_runs_are_independent() {
    let h = Arc::new(harness_with(
        FakeJobRunner::new().with_fetch_delay(Duration::from_millis(20)),
        false,
    ));

    let (a, b) = tokio::join!(
        h.pipeline.run_reference("abc123"),
        h.pipeline.run_reference("abc123")
    );

    assert_eq!(a.unwrap().caption, b.unwrap().caption);
    assert_eq!(h.runner.calls(JobKind::Fetch), 2);
}

#[tokio::test]
async fn test_run_past_deadline_fails_in_current_stage() {
    let h = harness(FakeJobRunner::new().with_fetch_delay(Duration::from_millis(500)));
    let request = PipelineRequest::new("abc123");

    let err = h
        .pipeline
        .run_with_timeout(&request, Duration::from_millis(50))
        .await
        .unwrap_err();
    let payload = err.to_payload();

    assert_eq!(payload.stage, PipelineStage::MediaAcquirer);
    assert_eq!(payload.reason, "AcquisitionFailedError");
    assert!(payload.detail.contains("Timed out"));
    assert!(!h.cache.exists(&id("abc123")).await);
    assert_eq!(h.runner.calls(JobKind::Predict), 0);
}

#[tokio::test]
async fn test_run_within_deadline_completes() {
    let h = harness(FakeJobRunner::new());
    let request = PipelineRequest::new("abc123");

    let output = h
        .pipeline
        .run_with_timeout(&request, Duration::from_secs(30))
        .await
        .unwrap();

    assert!(!output.cache_hit);
    assert_eq!(output.caption.payload(), &json!({"caption": "a person walks"}));
}

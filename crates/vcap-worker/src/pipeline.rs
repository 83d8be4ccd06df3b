//! Caption pipeline orchestrator.
//!
//! Sequences identifier extraction, the result cache and the media stages
//! for one request. The first failing stage ends the run; nothing is
//! retried here and nothing is cached for a failed run.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use vcap_media::{
    CaptionPredictor, DurationProbe, ExternalJobRunner, FeatureExtractor, MediaAcquirer,
    MediaError, MediaResult, ProcessJobRunner,
};
use vcap_models::{extract_content_id, CaptionArtifact, ContentId, PipelineRequest, PipelineStage};
use vcap_storage::{FsResultCache, ResultCache};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::PipelineLogger;
use crate::metrics;
use crate::single_flight::SingleFlight;
use crate::state::PipelineState;

/// Successful pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub content_id: ContentId,
    pub caption: CaptionArtifact,
    /// Served from the result cache without running any stage
    pub cache_hit: bool,
}

/// Time budget for one run.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: tokio::time::Instant,
    limit: Duration,
}

impl Deadline {
    fn after(limit: Duration) -> Self {
        Self {
            at: tokio::time::Instant::now() + limit,
            limit,
        }
    }

    /// Await `work`, failing with `Timeout` once the budget is spent.
    async fn bound<T>(
        deadline: Option<Self>,
        work: impl Future<Output = MediaResult<T>>,
    ) -> MediaResult<T> {
        match deadline {
            Some(d) => tokio::time::timeout_at(d.at, work)
                .await
                .unwrap_or_else(|_| Err(MediaError::Timeout(d.limit.as_secs()))),
            None => work.await,
        }
    }
}

/// Runs the caption pipeline.
pub struct CaptionPipeline {
    cache: Arc<dyn ResultCache>,
    acquirer: MediaAcquirer,
    extractor: FeatureExtractor,
    probe: DurationProbe,
    predictor: CaptionPredictor,
    single_flight: Option<SingleFlight>,
}

impl CaptionPipeline {
    /// Build a pipeline over the given runner and cache.
    pub fn new(
        config: &PipelineConfig,
        runner: Arc<dyn ExternalJobRunner>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            cache,
            acquirer: MediaAcquirer::new(
                runner.clone(),
                config.layout.clone(),
                config.acquisition.clone(),
            ),
            extractor: FeatureExtractor::new(runner.clone(), config.layout.clone()),
            probe: DurationProbe::new(runner.clone()),
            predictor: CaptionPredictor::new(runner, config.layout.clone()),
            single_flight: config.single_flight.then(SingleFlight::new),
        }
    }

    /// Production pipeline: external processes and the filesystem cache.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let runner = Arc::new(ProcessJobRunner::new(config.toolchain.clone()));
        let cache = Arc::new(FsResultCache::new(config.layout.clone()));
        Self::new(config, runner, cache)
    }

    /// Run the pipeline for one request.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineResult<PipelineOutput> {
        self.run_until(request, None).await
    }

    /// Run the pipeline, failing in the stage in progress once `limit` elapses.
    ///
    /// Time spent waiting on a concurrent run for the same id counts
    /// against the acquisition stage.
    pub async fn run_with_timeout(
        &self,
        request: &PipelineRequest,
        limit: Duration,
    ) -> PipelineResult<PipelineOutput> {
        self.run_until(request, Some(Deadline::after(limit))).await
    }

    async fn run_until(
        &self,
        request: &PipelineRequest,
        deadline: Option<Deadline>,
    ) -> PipelineResult<PipelineOutput> {
        let mut logger = PipelineLogger::new(&request.request_id);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(&request.reference);
            logger.log_transition(PipelineState::Start);

            let result = self.execute(&request.reference, deadline, &mut logger).await;
            let elapsed = started.elapsed();

            match &result {
                Ok(output) => {
                    logger.log_transition(PipelineState::Done);
                    logger.log_completion(output.cache_hit, elapsed);
                    let outcome = if output.cache_hit { "hit" } else { "generated" };
                    metrics::record_run(outcome, None, elapsed.as_secs_f64());
                }
                Err(err) => {
                    logger.log_transition(PipelineState::Failed(err.failed_stage()));
                    logger.log_failure(err);
                    metrics::record_run("failed", Some(err.failed_stage()), elapsed.as_secs_f64());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Convenience wrapper for a bare reference.
    pub async fn run_reference(&self, reference: &str) -> PipelineResult<PipelineOutput> {
        self.run(&PipelineRequest::new(reference)).await
    }

    async fn execute(
        &self,
        reference: &str,
        deadline: Option<Deadline>,
        logger: &mut PipelineLogger,
    ) -> PipelineResult<PipelineOutput> {
        let id = extract_content_id(reference)?;
        logger.set_content_id(&id);
        logger.log_transition(PipelineState::IdentifierResolved);

        if let Some(caption) = self.lookup(&id, logger).await? {
            return Ok(hit(id, caption));
        }

        let _flight = match &self.single_flight {
            Some(flights) => {
                let guard = Deadline::bound(deadline, async {
                    Ok(flights.acquire(id.as_str()).await)
                })
                .await
                .map_err(|e| PipelineError::in_stage(PipelineStage::MediaAcquirer, e))?;
                if guard.waited() {
                    metrics::record_single_flight_wait();
                }
                // A run that held the key may have finished the work.
                if let Some(caption) = self.lookup(&id, logger).await? {
                    return Ok(hit(id, caption));
                }
                Some(guard)
            }
            None => None,
        };

        self.generate(reference, &id, deadline, logger).await
    }

    async fn lookup(
        &self,
        id: &ContentId,
        logger: &PipelineLogger,
    ) -> PipelineResult<Option<CaptionArtifact>> {
        let cached = self.cache.lookup(id).await?;
        logger.log_transition(PipelineState::CacheChecked);
        metrics::record_cache_lookup(cached.is_some());
        logger.log_transition(if cached.is_some() {
            PipelineState::CacheHit
        } else {
            PipelineState::CacheMiss
        });
        Ok(cached)
    }

    async fn generate(
        &self,
        reference: &str,
        id: &ContentId,
        deadline: Option<Deadline>,
        logger: &PipelineLogger,
    ) -> PipelineResult<PipelineOutput> {
        logger.log_transition(PipelineState::Acquiring);
        let media = stage(
            PipelineStage::MediaAcquirer,
            logger,
            deadline,
            self.acquirer.acquire(reference, id),
        )
        .await?;

        logger.log_transition(PipelineState::FeaturesExtracting);
        let features = stage(
            PipelineStage::FeatureExtractor,
            logger,
            deadline,
            self.extractor.extract_all(&media, id),
        )
        .await?;

        let duration = stage(
            PipelineStage::DurationProbe,
            logger,
            deadline,
            self.probe.probe(&media),
        )
        .await?;
        logger.log_transition(PipelineState::DurationProbed);

        logger.log_transition(PipelineState::Predicting);
        let caption = stage(
            PipelineStage::CaptionPredictor,
            logger,
            deadline,
            self.predictor.predict(duration, &features, id),
        )
        .await?;

        self.cache.store(id, &caption).await?;
        logger.log_transition(PipelineState::Cached);

        Ok(PipelineOutput {
            content_id: id.clone(),
            caption,
            cache_hit: false,
        })
    }
}

fn hit(content_id: ContentId, caption: CaptionArtifact) -> PipelineOutput {
    PipelineOutput {
        content_id,
        caption,
        cache_hit: true,
    }
}

/// Await one media stage, timing it and attributing any error to it.
async fn stage<T>(
    stage: PipelineStage,
    logger: &PipelineLogger,
    deadline: Option<Deadline>,
    work: impl Future<Output = MediaResult<T>>,
) -> PipelineResult<T> {
    let started = Instant::now();
    let result = Deadline::bound(deadline, work).await;
    let elapsed = started.elapsed();
    metrics::record_stage_duration(stage, elapsed.as_secs_f64());

    match result {
        Ok(value) => {
            logger.log_stage_complete(stage, elapsed);
            Ok(value)
        }
        Err(e) => Err(PipelineError::in_stage(stage, e)),
    }
}

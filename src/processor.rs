//! Interactive refinement session
//!
//! [`RefinementSession`] owns the per-image cache and drives the pipeline:
//!
//! ```text
//! bytes ─decode─▶ PixelBuffer ─segment─▶ ProbabilityMap ─refine─▶ AlphaChannel ─composite─▶ CompositeResult
//!                 └──────────────── cached per image ─────────┘
//! ```
//!
//! Loading an image runs every stage; changing the refinement parameter only
//! re-runs refine and composite against the cached map. Every request takes
//! a generation id and only the newest one commits; older requests notice at
//! their next stage boundary and resolve to `Ok(None)`.

use crate::{
    compositor::Compositor,
    config::SessionConfig,
    error::{BgRemovalError, ErrorKind, Result},
    refine::MaskRefiner,
    segmenter::Segmenter,
    services::{
        ImageIOService, NoOpProgressReporter, PixelSource, ProcessingStage, ProgressReporter,
        ProgressUpdate,
    },
    state::PipelineState,
    types::{
        CompositeResult, PixelBuffer, ProbabilityMap, ProcessingMetadata, ProcessingTimings,
        RefinementParameter,
    },
};
use instant::Instant;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, span, warn, Level};

/// Everything derived from one source image that parameter changes reuse
#[derive(Debug)]
pub struct CachedImage {
    source: PixelBuffer,
    map: Arc<ProbabilityMap>,
    upsampled: OnceLock<Arc<ProbabilityMap>>,
    segmenter: String,
}

impl CachedImage {
    fn new(source: PixelBuffer, map: ProbabilityMap, segmenter: String) -> Self {
        Self {
            source,
            map: Arc::new(map),
            upsampled: OnceLock::new(),
            segmenter,
        }
    }

    #[must_use]
    pub fn source(&self) -> &PixelBuffer {
        &self.source
    }

    #[must_use]
    pub fn map(&self) -> &Arc<ProbabilityMap> {
        &self.map
    }

    /// Map resampled to the source resolution, computed on first use
    fn upsampled(&self, refiner: &MaskRefiner) -> Result<Arc<ProbabilityMap>> {
        if let Some(upsampled) = self.upsampled.get() {
            return Ok(Arc::clone(upsampled));
        }
        let upsampled = Arc::new(refiner.upsample(&self.map, self.source.dimensions())?);
        // a concurrent render may have won; both values are identical
        let _ = self.upsampled.set(Arc::clone(&upsampled));
        Ok(upsampled)
    }
}

/// Last failure seen by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: ProcessingStage,
}

#[derive(Debug)]
struct Inner {
    state: PipelineState,
    image: Option<Arc<CachedImage>>,
    /// Generation of the load in flight, if any
    loading: Option<u64>,
    parameter: RefinementParameter,
    /// Bumped by every `reprocess` call; the newest caller owns `parameter`
    parameter_seq: u64,
    result: Option<Arc<CompositeResult>>,
    last_error: Option<SessionError>,
}

/// State shared with the blocking pool
struct Shared {
    refiner: MaskRefiner,
    compositor: Compositor,
    reporter: Arc<dyn ProgressReporter>,
    generation: AtomicU64,
    inner: Mutex<Inner>,
    /// Signalled whenever a load stops being in flight
    load_settled: Notify,
}

enum Commit {
    Done(Arc<CompositeResult>),
    /// The parameter changed while a load was rendering
    Rerender,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn superseded(generation: u64) -> BgRemovalError {
        BgRemovalError::cancelled(format!("request {} superseded", generation))
    }

    fn transition(inner: &mut Inner, next: PipelineState) {
        if !inner.state.can_transition_to(next) {
            warn!(from = %inner.state, to = %next, "Unexpected pipeline transition");
        }
        debug!(from = %inner.state, to = %next, "Pipeline transition");
        inner.state = next;
    }

    /// Move to `stage` if `generation` is still the newest request
    fn enter_stage(
        &self,
        generation: u64,
        state: PipelineState,
        stage: ProcessingStage,
        start: Instant,
    ) -> Result<()> {
        let mut inner = self.lock();
        if !self.is_current(generation) {
            return Err(Self::superseded(generation));
        }
        Self::transition(&mut inner, state);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, start, generation));
        Ok(())
    }

    /// Refine and composite `cached` with `parameter`
    fn render(
        &self,
        generation: u64,
        cached: &CachedImage,
        parameter: RefinementParameter,
        mut timings: ProcessingTimings,
        start: Instant,
    ) -> Result<CompositeResult> {
        self.enter_stage(generation, PipelineState::Refining, ProcessingStage::Refining, start)?;
        let alpha = {
            let _span = span!(Level::DEBUG, "refine", parameter = %parameter).entered();
            let refine_start = Instant::now();
            let upsampled = cached.upsampled(&self.refiner)?;
            let alpha = self.refiner.refine_upsampled(&upsampled, parameter)?;
            timings.refine_ms = refine_start.elapsed().as_millis() as u64;
            alpha
        };

        self.enter_stage(
            generation,
            PipelineState::Compositing,
            ProcessingStage::Compositing,
            start,
        )?;
        let _span = span!(Level::DEBUG, "composite").entered();
        let composite_start = Instant::now();
        let mut metadata = ProcessingMetadata::new(cached.segmenter.clone(), parameter);
        metadata.map_dimensions = cached.map.dimensions();
        let mut result = self
            .compositor
            .composite(&cached.source, &alpha, metadata)?;
        timings.composite_ms = composite_start.elapsed().as_millis() as u64;
        timings.total_ms = start.elapsed().as_millis() as u64;
        result.metadata.timings = timings;
        Ok(result)
    }

    /// Publish `result` if `generation` is still the newest request
    ///
    /// `image` is the freshly loaded cache entry for load requests; it
    /// replaces the previous image only here, so a failed load leaves the
    /// previous one usable.
    fn commit(
        &self,
        generation: u64,
        result: CompositeResult,
        image: Option<&Arc<CachedImage>>,
        start: Instant,
    ) -> Result<Commit> {
        let mut inner = self.lock();
        if !self.is_current(generation) {
            return Err(Self::superseded(generation));
        }
        if image.is_some() && inner.parameter != result.parameter() {
            return Ok(Commit::Rerender);
        }

        if let Some(image) = image {
            inner.image = Some(Arc::clone(image));
            inner.loading = None;
            self.load_settled.notify_waiters();
        }
        let timings = result.metadata.timings.clone();
        let result = Arc::new(result);
        inner.result = Some(Arc::clone(&result));
        inner.last_error = None;
        Self::transition(&mut inner, PipelineState::Ready);

        self.reporter.report_progress(ProgressUpdate::new(
            ProcessingStage::Completed,
            start,
            generation,
        ));
        self.reporter.report_completion(timings);
        Ok(Commit::Done(result))
    }

    /// Record a failure of `generation`; superseded requests are dropped silently
    fn fail(&self, generation: u64, error: &BgRemovalError) {
        if error.is_cancelled() {
            return;
        }
        let mut inner = self.lock();
        if !self.is_current(generation) {
            debug!(generation, %error, "Ignoring failure of superseded request");
            return;
        }

        let stage = stage_of(inner.state);
        warn!(generation, kind = %error.kind(), %error, "Pipeline stage failed");
        self.reporter.report_error(stage, &error.to_string());

        Self::transition(&mut inner, PipelineState::Error);
        inner.last_error = Some(SessionError {
            kind: error.kind(),
            message: error.to_string(),
            stage,
        });
        let settled = Self::settled_state(&inner);
        Self::transition(&mut inner, settled);
        if inner.loading == Some(generation) {
            inner.loading = None;
            self.load_settled.notify_waiters();
        }
    }

    /// Release a load whose future was dropped before it finished
    ///
    /// Bumps the generation so blocking work still running for the load
    /// cannot commit, then settles the state as a failure would.
    fn abandon_load(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.loading != Some(generation) {
            return;
        }
        inner.loading = None;
        if self.is_current(generation) {
            self.generation.fetch_add(1, Ordering::SeqCst);
            debug!(generation, "Load dropped before it finished");
            let settled = Self::settled_state(&inner);
            Self::transition(&mut inner, settled);
        }
        self.load_settled.notify_waiters();
    }

    fn settled_state(inner: &Inner) -> PipelineState {
        if inner.result.is_some() {
            PipelineState::Ready
        } else {
            PipelineState::Idle
        }
    }
}

/// Abandons its load when dropped; a no-op once the load committed or failed
struct LoadGuard<'a> {
    shared: &'a Shared,
    generation: u64,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.shared.abandon_load(self.generation);
    }
}

fn stage_of(state: PipelineState) -> ProcessingStage {
    match state {
        PipelineState::Segmenting => ProcessingStage::Segmenting,
        PipelineState::Refining => ProcessingStage::Refining,
        PipelineState::Compositing => ProcessingStage::Compositing,
        PipelineState::Ready => ProcessingStage::Completed,
        PipelineState::Idle | PipelineState::Loading | PipelineState::Error => {
            ProcessingStage::Loading
        },
    }
}

/// Run a CPU-bound closure on the blocking pool
async fn blocking<T, F>(what: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BgRemovalError::stage_error(what, &e.to_string()))?
}

enum LoadInput {
    Encoded { bytes: Vec<u8>, mime: String },
    Decoded(PixelBuffer),
}

/// Interactive background-removal session
///
/// # Examples
/// ```rust,no_run
/// use bg_refine::{backends::SourceAlphaSegmenter, RefinementParameter, RefinementSession, SessionConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> bg_refine::Result<()> {
/// let session = RefinementSession::new(SessionConfig::default(), Arc::new(SourceAlphaSegmenter))?;
/// let bytes = std::fs::read("cutout.png")?;
/// if let Some(result) = session.process_new_image(bytes, "image/png").await? {
///     println!("first render: {}", result.content_hash);
/// }
/// // only refine and composite run again
/// session.reprocess(RefinementParameter::new(-4)).await?;
/// # Ok(())
/// # }
/// ```
pub struct RefinementSession {
    config: SessionConfig,
    segmenter: Arc<dyn Segmenter>,
    source: Arc<dyn PixelSource>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RefinementSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefinementSession")
            .field("segmenter", &self.segmenter.name())
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl RefinementSession {
    /// Create a session with the default decoder and no progress output
    ///
    /// # Errors
    /// - `InvalidConfig` when `config` does not validate
    pub fn new(config: SessionConfig, segmenter: Arc<dyn Segmenter>) -> Result<Self> {
        Self::builder(segmenter).config(config).build()
    }

    #[must_use]
    pub fn builder(segmenter: Arc<dyn Segmenter>) -> RefinementSessionBuilder {
        RefinementSessionBuilder::new(segmenter)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current pipeline state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.shared.lock().state
    }

    /// Last committed result
    #[must_use]
    pub fn current_result(&self) -> Option<Arc<CompositeResult>> {
        self.shared.lock().result.clone()
    }

    /// Most recent failure since the last successful commit
    #[must_use]
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared.lock().last_error.clone()
    }

    /// Parameter the next render will use
    #[must_use]
    pub fn parameter(&self) -> RefinementParameter {
        self.shared.lock().parameter
    }

    /// Cached data of the current image
    #[must_use]
    pub fn cached_image(&self) -> Option<Arc<CachedImage>> {
        self.shared.lock().image.clone()
    }

    /// Newest generation issued
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Decode, segment and render a new image
    ///
    /// Returns `Ok(None)` when a newer request superseded this one.
    ///
    /// # Errors
    /// - `UnsupportedFormat` for non-image MIME types or undecodable bytes
    /// - `Segmentation` when the segmenter fails or times out
    /// - `MaskShape` when the map does not fit the image
    pub async fn process_new_image(
        &self,
        bytes: Vec<u8>,
        declared_mime: &str,
    ) -> Result<Option<Arc<CompositeResult>>> {
        self.load(LoadInput::Encoded {
            bytes,
            mime: declared_mime.to_string(),
        })
        .await
    }

    /// Segment and render already decoded pixels
    pub async fn process_image(&self, image: PixelBuffer) -> Result<Option<Arc<CompositeResult>>> {
        self.load(LoadInput::Decoded(image)).await
    }

    /// Read an image file and process it as a new image
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<Option<Arc<CompositeResult>>> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            BgRemovalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read '{}': {}", path.display(), e),
            ))
        })?;
        let mime = ImageIOService::mime_for_path(path).unwrap_or("application/octet-stream");
        self.process_new_image(bytes, mime).await
    }

    /// Re-render the current image with `parameter`
    ///
    /// The segmenter is not called again. While an image is still loading the
    /// parameter is handed to that load and this call waits for it: it
    /// resolves to the load's result, or re-renders the previous image when
    /// the load fails or is dropped. Returns `Ok(None)` when a newer
    /// `reprocess` or render superseded this one.
    ///
    /// # Errors
    /// - `InvalidState` when no image has been submitted, or the only load
    ///   in flight did not succeed
    #[instrument(skip_all, fields(parameter = %parameter, generation))]
    pub async fn reprocess(
        &self,
        parameter: RefinementParameter,
    ) -> Result<Option<Arc<CompositeResult>>> {
        let start = Instant::now();
        let ticket = {
            let mut inner = self.shared.lock();
            inner.parameter = parameter;
            inner.parameter_seq += 1;
            inner.parameter_seq
        };

        let mut waited = false;
        let (generation, cached) = loop {
            let settled = self.shared.load_settled.notified();
            tokio::pin!(settled);
            // register before looking at `loading` so a settle in between is not missed
            settled.as_mut().enable();
            {
                let inner = self.shared.lock();
                if inner.parameter_seq != ticket {
                    debug!("Parameter superseded while waiting");
                    return Ok(None);
                }
                if let Some(loading) = inner.loading {
                    debug!(loading, "Image still loading, waiting for it with the new parameter");
                } else {
                    let Some(cached) = inner.image.clone() else {
                        return Err(BgRemovalError::invalid_state(
                            "reprocess requires an image to be submitted first",
                        ));
                    };
                    if waited {
                        if let Some(result) =
                            inner.result.as_ref().filter(|r| r.parameter() == parameter)
                        {
                            return Ok(Some(Arc::clone(result)));
                        }
                    }
                    let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    break (generation, cached);
                }
            }
            settled.await;
            waited = true;
        };
        tracing::Span::current().record("generation", generation);
        // parameter changes queued behind this one supersede it before any work starts
        tokio::task::yield_now().await;

        let shared = Arc::clone(&self.shared);
        let outcome = blocking("render", move || {
            let result =
                shared.render(generation, &cached, parameter, ProcessingTimings::default(), start)?;
            shared.commit(generation, result, None, start)
        })
        .await;

        match outcome {
            Ok(Commit::Done(result)) => {
                debug!(hash = %result.content_hash, "Reprocess committed");
                Ok(Some(result))
            },
            Ok(Commit::Rerender) => Err(BgRemovalError::internal(
                "reprocess asked to re-render without an image load",
            )),
            Err(error) => self.settle(generation, error),
        }
    }

    /// Map a request failure to the public return value
    fn settle(&self, generation: u64, error: BgRemovalError) -> Result<Option<Arc<CompositeResult>>> {
        if error.is_cancelled() || !self.shared.is_current(generation) {
            debug!(generation, "Request superseded");
            return Ok(None);
        }
        self.shared.fail(generation, &error);
        Err(error)
    }

    #[instrument(skip_all, fields(segmenter = %self.segmenter.name(), generation))]
    async fn load(&self, input: LoadInput) -> Result<Option<Arc<CompositeResult>>> {
        let start = Instant::now();
        let generation = {
            let mut inner = self.shared.lock();
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.loading = Some(generation);
            Shared::transition(&mut inner, PipelineState::Loading);
            self.shared.reporter.report_progress(ProgressUpdate::new(
                ProcessingStage::Loading,
                start,
                generation,
            ));
            generation
        };
        tracing::Span::current().record("generation", generation);
        let _guard = LoadGuard {
            shared: &self.shared,
            generation,
        };

        match self.run_load(generation, input, start).await {
            Ok(result) => {
                info!(
                    hash = %result.content_hash,
                    timings = %result.timing_summary(),
                    "Image processed"
                );
                Ok(Some(result))
            },
            Err(error) => self.settle(generation, error),
        }
    }

    async fn run_load(
        &self,
        generation: u64,
        input: LoadInput,
        start: Instant,
    ) -> Result<Arc<CompositeResult>> {
        let mut timings = ProcessingTimings::default();

        let decode_start = Instant::now();
        let pixels = match input {
            LoadInput::Encoded { bytes, mime } => {
                let source = Arc::clone(&self.source);
                blocking("decode", move || source.decode(&bytes, &mime)).await?
            },
            LoadInput::Decoded(pixels) => pixels,
        };
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;
        debug!(
            width = pixels.width(),
            height = pixels.height(),
            decode_ms = timings.decode_ms,
            "Image decoded"
        );

        self.shared.enter_stage(
            generation,
            PipelineState::Segmenting,
            ProcessingStage::Segmenting,
            start,
        )?;
        let segment_start = Instant::now();
        let map = self.segment(&pixels).await?;
        timings.segmentation_ms = segment_start.elapsed().as_millis() as u64;
        if !self.shared.is_current(generation) {
            return Err(Shared::superseded(generation));
        }

        let cached = Arc::new(CachedImage::new(
            pixels,
            map,
            self.segmenter.name().to_string(),
        ));
        loop {
            let parameter = self.shared.lock().parameter;
            let shared = Arc::clone(&self.shared);
            let image = Arc::clone(&cached);
            let timings = timings.clone();
            let commit = blocking("render", move || {
                let result = shared.render(generation, &image, parameter, timings, start)?;
                shared.commit(generation, result, Some(&image), start)
            })
            .await?;

            match commit {
                Commit::Done(result) => return Ok(result),
                Commit::Rerender => debug!("Parameter changed during load, rendering again"),
            }
        }
    }

    /// Call the segmenter under the configured timeout
    async fn segment(&self, pixels: &PixelBuffer) -> Result<ProbabilityMap> {
        let timeout = self.config.segmentation_timeout();
        match tokio::time::timeout(timeout, self.segmenter.segment(pixels)).await {
            Ok(Ok(map)) => {
                debug!(
                    width = map.width(),
                    height = map.height(),
                    "Probability map received"
                );
                Ok(map)
            },
            Ok(Err(error @ BgRemovalError::Segmentation(_))) => Err(error),
            Ok(Err(error)) => Err(BgRemovalError::segmentation(format!(
                "{} failed: {}",
                self.segmenter.name(),
                error
            ))),
            Err(_) => Err(BgRemovalError::segmentation(format!(
                "{} timed out after {}ms",
                self.segmenter.name(),
                timeout.as_millis()
            ))),
        }
    }
}

/// Builder for [`RefinementSession`]
pub struct RefinementSessionBuilder {
    config: SessionConfig,
    segmenter: Arc<dyn Segmenter>,
    source: Arc<dyn PixelSource>,
    reporter: Arc<dyn ProgressReporter>,
}

impl RefinementSessionBuilder {
    #[must_use]
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self {
            config: SessionConfig::default(),
            segmenter,
            source: Arc::new(ImageIOService),
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn pixel_source(mut self, source: Arc<dyn PixelSource>) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the session
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn build(self) -> Result<RefinementSession> {
        self.config.validate()?;
        let shared = Shared {
            refiner: MaskRefiner::new(self.config.refiner.clone()),
            compositor: Compositor::new(self.config.compositor.clone()),
            reporter: self.reporter,
            generation: AtomicU64::new(0),
            load_settled: Notify::new(),
            inner: Mutex::new(Inner {
                state: PipelineState::Idle,
                image: None,
                loading: None,
                parameter: self.config.initial_parameter,
                parameter_seq: 0,
                result: None,
                last_error: None,
            }),
        };
        Ok(RefinementSession {
            config: self.config,
            segmenter: self.segmenter,
            source: self.source,
            shared: Arc::new(shared),
        })
    }
}

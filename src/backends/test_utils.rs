//! Deterministic fake segmenters for tests and benchmarks
//!
//! These stand in for a real segmentation model: they return known maps,
//! can be slowed down or made to fail, and count how often they were called
//! so tests can check that a session segments each image only once.

use crate::{
    error::{BgRemovalError, Result},
    segmenter::Segmenter,
    types::{PixelBuffer, ProbabilityMap},
};
use async_trait::async_trait;
use instant::Duration;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Map of `width x height` that is 1.0 inside the centred half-size square
/// and 0.0 elsewhere
#[must_use]
pub fn centered_square_map(width: u32, height: u32) -> ProbabilityMap {
    let (x0, x1) = (width / 4, width / 4 + width / 2);
    let (y0, y1) = (height / 4, height / 4 + height / 2);
    ProbabilityMap::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            1.0
        } else {
            0.0
        }
    })
}

#[derive(Debug, Clone)]
enum MapSource {
    Fixed(ProbabilityMap),
    /// Centred square at `1 / scale` of the image resolution
    CenteredSquare { scale: u32 },
}

/// Configurable fake segmenter
///
/// Clones share their call counters, so a test can keep one handle while the
/// session owns another.
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    source: MapSource,
    delay: Option<Duration>,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
    call_history: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl MockSegmenter {
    /// Always return `map`, whatever the image
    #[must_use]
    pub fn fixed(map: ProbabilityMap) -> Self {
        Self::with_source(MapSource::Fixed(map))
    }

    /// Centred square at the image resolution divided by `scale`
    #[must_use]
    pub fn centered_square(scale: u32) -> Self {
        Self::with_source(MapSource::CenteredSquare {
            scale: scale.max(1),
        })
    }

    /// Fail every call with a segmentation error
    #[must_use]
    pub fn new_failing() -> Self {
        let mut segmenter = Self::centered_square(1);
        segmenter.should_fail = true;
        segmenter
    }

    fn with_source(source: MapSource) -> Self {
        Self {
            source,
            delay: None,
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep for `delay` before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `segment` calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Image dimensions of every call, in order
    #[must_use]
    pub fn call_history(&self) -> Vec<(u32, u32)> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn record_call(&self, image: &PixelBuffer) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut history) = self.call_history.lock() {
            history.push(image.dimensions());
        }
    }
}

#[async_trait]
impl Segmenter for MockSegmenter {
    async fn segment(&self, image: &PixelBuffer) -> Result<ProbabilityMap> {
        self.record_call(image);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(BgRemovalError::segmentation("Mock segmenter failure"));
        }

        Ok(match &self.source {
            MapSource::Fixed(map) => map.clone(),
            MapSource::CenteredSquare { scale } => centered_square_map(
                (image.width() / scale).max(1),
                (image.height() / scale).max(1),
            ),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

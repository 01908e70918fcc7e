//! Progress reporting service
//!
//! Keeps progress reporting out of the pipeline itself so each frontend can
//! render stage updates its own way.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Pipeline stages reported at their boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Decoding the uploaded image
    Loading,
    /// Waiting on the segmenter
    Segmenting,
    /// Upsampling and shaping the mask edge
    Refining,
    /// Writing the RGBA output
    Compositing,
    /// Result committed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Loading => "Loading image",
            ProcessingStage::Segmenting => "Detecting foreground",
            ProcessingStage::Refining => "Refining mask edges",
            ProcessingStage::Compositing => "Compositing transparent result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Progress percentage reported when the stage starts
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Loading => 10,
            ProcessingStage::Segmenting => 30,
            ProcessingStage::Refining => 50,
            ProcessingStage::Compositing => 90,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since the request started (milliseconds)
    pub elapsed_ms: u64,
    /// Generation of the request that produced this update
    pub generation: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant, generation: u64) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            generation,
            stage,
        }
    }
}

/// Receives stage updates from a refinement session
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report completion with final timings
    fn report_completion(&self, timings: ProcessingTimings);

    /// Report a failure during `stage`
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Discards all progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Logs progress through the `log` facade
#[derive(Debug, Clone, Copy)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to show elapsed time and per-stage timings
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: ProcessingTimings) {
        log::info!("✅ Background removed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Decode: {}ms", timings.decode_ms);
            log::info!("    • Segmentation: {}ms", timings.segmentation_ms);
            log::info!("    • Refine: {}ms", timings.refine_ms);
            log::info!("    • Composite: {}ms", timings.composite_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Publishes the latest update on a `tokio::sync::watch` channel
///
/// Observers that only care about the current stage (a progress bar, a UI
/// binding) subscribe and read the most recent value.
#[derive(Debug)]
pub struct ChannelProgressReporter {
    sender: watch::Sender<Option<ProgressUpdate>>,
}

impl ChannelProgressReporter {
    /// Create a reporter and the receiver observing it
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<Option<ProgressUpdate>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }

    /// Subscribe another observer
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        // no receivers is fine
        let _ = self.sender.send(Some(update));
    }

    fn report_completion(&self, _timings: ProcessingTimings) {}

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::debug!("Progress channel saw error during {:?}: {}", stage, error);
    }
}

/// Event captured by [`RecordingProgressReporter`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress(ProcessingStage, u8),
    Completed,
    Error(ProcessingStage, String),
}

/// Keeps every reported event in memory, in order
#[derive(Debug, Clone, Default)]
pub struct RecordingProgressReporter {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Percentages of the progress events, in order
    #[must_use]
    pub fn percentages(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress(_, progress) => Some(progress),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ProgressReporter for RecordingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.push(ProgressEvent::Progress(update.stage, update.progress));
    }

    fn report_completion(&self, _timings: ProcessingTimings) {
        self.push(ProgressEvent::Completed);
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.push(ProgressEvent::Error(stage, error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_ascend() {
        let stages = [
            (ProcessingStage::Loading, 10),
            (ProcessingStage::Segmenting, 30),
            (ProcessingStage::Refining, 50),
            (ProcessingStage::Compositing, 90),
            (ProcessingStage::Completed, 100),
        ];
        for (i, (stage, expected)) in stages.iter().enumerate() {
            assert_eq!(stage.progress_percentage(), *expected);
            assert!(!stage.description().is_empty());
            if i > 0 {
                assert!(*expected > stages[i - 1].1);
            }
        }
    }

    #[test]
    fn test_progress_update_copies_stage_details() {
        let update = ProgressUpdate::new(ProcessingStage::Refining, Instant::now(), 7);
        assert_eq!(update.progress, 50);
        assert_eq!(update.description, "Refining mask edges");
        assert_eq!(update.generation, 7);
        assert!(update.elapsed_ms < 1000);
    }

    #[test]
    fn test_channel_reporter_publishes_latest() {
        let (reporter, receiver) = ChannelProgressReporter::new();
        assert!(receiver.borrow().is_none());

        reporter.report_progress(ProgressUpdate::new(ProcessingStage::Loading, Instant::now(), 1));
        reporter.report_progress(ProgressUpdate::new(
            ProcessingStage::Segmenting,
            Instant::now(),
            1,
        ));

        let latest = receiver.borrow().clone().unwrap();
        assert_eq!(latest.stage, ProcessingStage::Segmenting);
        assert_eq!(latest.progress, 30);
    }

    #[test]
    fn test_recording_reporter_keeps_order() {
        let reporter = RecordingProgressReporter::new();
        reporter.report_progress(ProgressUpdate::new(ProcessingStage::Refining, Instant::now(), 1));
        reporter.report_error(ProcessingStage::Compositing, "boom");
        reporter.report_completion(ProcessingTimings::default());

        assert_eq!(
            reporter.events(),
            vec![
                ProgressEvent::Progress(ProcessingStage::Refining, 50),
                ProgressEvent::Error(ProcessingStage::Compositing, "boom".to_string()),
                ProgressEvent::Completed,
            ]
        );
        assert_eq!(reporter.percentages(), vec![50]);
    }

    #[test]
    fn test_no_op_and_console_reporters_accept_everything() {
        let update = ProgressUpdate::new(ProcessingStage::Completed, Instant::now(), 1);
        NoOpProgressReporter.report_progress(update.clone());
        NoOpProgressReporter.report_error(ProcessingStage::Loading, "ignored");

        let console = ConsoleProgressReporter::new(true);
        console.report_progress(update);
        console.report_completion(ProcessingTimings::default());
        console.report_error(ProcessingStage::Segmenting, "logged");
    }
}

//! Boundary services: decoding, encoding and progress reporting

pub mod format;
pub mod io;
pub mod progress;

pub use format::{ImageOutputEncoder, OutputEncoder};
pub use io::{ImageIOService, PixelSource};
pub use progress::{
    ChannelProgressReporter, ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage,
    ProgressEvent, ProgressReporter, ProgressUpdate, RecordingProgressReporter,
};

//! Pipeline state machine for interactive sessions

use serde::{Deserialize, Serialize};

/// Observable state of a refinement session
///
/// ```text
/// Idle → Loading → Segmenting → Refining → Compositing → Ready
///                                   ↑                      │
///                                   └──── parameter change ┘
/// ```
///
/// Any working state may fail into `Error`, which settles back to `Ready`
/// when a previous result is still displayed or to `Idle` otherwise. A
/// working state whose load was dropped by its caller settles the same way
/// without passing through `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Loading,
    Segmenting,
    Refining,
    Compositing,
    Ready,
    Error,
}

impl PipelineState {
    /// Whether the session is doing work in this state
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Loading | Self::Segmenting | Self::Refining | Self::Compositing
        )
    }

    /// Whether `self → next` is a legal transition
    ///
    /// A new image may be loaded from any state; a working state may also be
    /// re-entered when a newer request supersedes the running one.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use PipelineState::{Compositing, Error, Idle, Loading, Ready, Refining, Segmenting};

        match (self, next) {
            (_, Loading) => true,
            (Loading, Segmenting) => true,
            (Segmenting | Compositing | Ready, Refining) => true,
            // a reprocess superseding a running refine
            (Refining, Refining) => true,
            (Refining, Compositing) => true,
            (Compositing, Ready) => true,
            (from, Error) => from.is_busy(),
            (Error, Ready | Idle) => true,
            // abandoned load
            (from, Ready | Idle) => from.is_busy(),
            _ => false,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Segmenting => "segmenting",
            Self::Refining => "refining",
            Self::Compositing => "compositing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

//! Core state for a visual-regression diff session: ignored regions over a
//! baseline/latest screenshot pair, coordinate-space conversion, compare
//! engine configuration, and the minimal override config derived from user
//! interaction. Pixel comparison itself is an external capability behind
//! [`compare::CompareEngine`]; a file-backed reference adapter lives in
//! [`engine`].

use thiserror::Error;

pub mod coalesce;
pub mod compare;
pub mod config;
pub mod engine;
pub mod geometry;
pub mod regions;
pub mod selection;
pub mod session;

pub use coalesce::{Poll, ResizeCoalescer, ResizeOrigin};
pub use compare::{
    CompareCompletion, CompareController, CompareEngine, CompareRequest, CompletionOutcome,
    HighlightColor, IgnoreLevel, OutputMode, OutputSettings, Rgb, Tolerances, Transparency,
};
pub use config::{DiffConfig, DiffOptions, DiffResult, UiState};
pub use geometry::{Bounds, Rect, ScaleTransform};
pub use regions::{IgnoredRegionStore, RectPatch, Region};
pub use selection::{ClickOutcome, SelectionController};
pub use session::Session;

/// Errors scoped to a single comparison session. None are fatal to the
/// process; the caller decides whether to surface or retry.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Region coordinates were rejected instead of being coerced to zero.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// An ignore level, output mode, or tolerance channel was not recognized.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Image dimensions are not available yet, comparison is blocked.
    #[error("comparison not ready: {0}")]
    NotReady(String),
    #[error("no region with id {0}")]
    UnknownRegion(u64),
}

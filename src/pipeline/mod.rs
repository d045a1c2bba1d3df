pub mod align;
pub mod analyzer;
pub mod error;
pub mod gate;
pub mod janitor;
pub mod orchestrator;
pub mod types;

pub use analyzer::{AnalysisContext, BatchAnalyzer};
pub use error::{classify, ErrorKind, PipelineError};
pub use gate::{ConcurrencyGate, GateStats, LanePermit};
pub use janitor::{Janitor, SweepStats};
pub use orchestrator::{Orchestrator, TaskCounts};
pub use types::{
    AnalyzeMediaRequest, ErrorDetail, FrameLevel, FrameRef, MediaAnalysis, SegmentTagging,
    TaggingResult, Task, TaskKind, TaskStatus, TranscriptSegment,
};

#[cfg(test)]
mod tests;

//! Core streaming pipeline for Coursegen.
//!
//! Fragments of a generator's response flow through normalization,
//! marker classification and structured-data extraction. Extracted edits
//! mutate the shared course tree, and todo tasks follow the tree.

pub mod capture;
mod classifier;
mod error;
mod extractor;
mod normalizer;
mod pipeline;
mod sections;
mod stream;
mod tasks;
pub mod tree;

pub use capture::{CaptureConfig, CaptureSession};
pub use classifier::{classify, Classification, MARKERS};
pub use error::CoursegenError;
pub use extractor::{extract, DataBlock, Extraction, ModificationExtractor, SeenKeys};
pub use normalizer::{displayable_text, strip_framing};
pub use pipeline::{
    BeginResponse, ChunkOutcome, CoursePipeline, ResponseSummary, DEFAULT_EVENT_BUFFER,
    DEFAULT_RETAINED_RESPONSES,
};
pub use sections::SectionAccumulator;
pub use stream::{FragmentOutput, ResponseStream};
pub use tasks::{derive_tasks, reconcile, TaskTracker};
pub use tree::{MutationOutcome, MutationResult, RejectReason};

/// Result type for Coursegen operations.
pub type Result<T> = std::result::Result<T, CoursegenError>;

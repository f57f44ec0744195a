//! rf-pipeline: the per-workflow stage coordinators.
//!
//! Each coordinator owns a small state machine over its stages, captures a
//! parameter snapshot at launch time, drives one process worker per stage,
//! feeds completed output through the probe parsers, and decides whether
//! to auto-advance to a dependent stage. The two coordinators are fully
//! independent; within one, stages are strictly sequential.

mod drive;

pub mod extraction;
pub mod transcode;

pub use extraction::{ExtractionCoordinator, PathRequest};
pub use transcode::TranscodeCoordinator;

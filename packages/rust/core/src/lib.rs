//! Core pipeline orchestration for buildwatch.
//!
//! Ties the CI client, log client, report writer, and notifier into the
//! end-to-end run: locate → inspect → fetch → persist → notify.

pub mod pipeline;

pub use pipeline::{ProgressReporter, RunOutcome, RunReport, SilentProgress, run};

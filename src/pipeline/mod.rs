//! Enrichment pipeline: classification, stage execution, dedup, assembly,
//! scoring, and orchestration.
//!
//! Records flow dedup → classify → stages (per plan) → assemble →
//! persist → index handoff, with per-stage failure isolation throughout.

pub mod assemble;
pub mod citation;
pub mod classify;
pub mod court;
pub mod dedup;
pub mod executor;
pub mod judge;
pub mod keyword;
pub mod orchestrator;
pub mod report;
pub mod reporter;
pub mod score;
pub mod stage;
pub mod structure;

pub use orchestrator::{PipelineBuilder, PipelineOrchestrator, PipelineSettings};

//! commtask: turns simulated-office communications into an organized,
//! durable TODO list.
//!
//! The crate is a library with three cooperating stages wired together by
//! [`pipeline::AnalysisPipeline`]:
//!
//! - **Classification** ([`classifier`]): a rule chain (overrides, then
//!   participant lookup, then keyword matching) assigns each communication
//!   a project tag, backed by a durable cache so re-runs are cheap.
//! - **Deduplication** ([`dedup`]): extraction heuristics may propose
//!   several TODO candidates per message; exactly one canonical record
//!   survives, chosen deterministically.
//! - **Calendar mapping** ([`calendar`]): simulation ticks become
//!   business-day dates so batches are analyzed in day order.
//!
//! Persistence lives in [`db`] on SQLite, with schema migrations in
//! [`migrations`]. Candidate extraction itself is pluggable via
//! [`pipeline::TodoExtractor`].

pub mod calendar;
pub mod classifier;
pub mod config;
pub mod db;
pub mod dedup;
pub mod directory;
pub mod error;
pub mod migrations;
pub mod pipeline;
pub mod types;

pub use calendar::{CalendarConfig, VirtualCalendarMapper, VirtualDayIndex};
pub use classifier::{
    Classification, ClassifyRule, OverrideEntry, OverrideField, ProjectTagClassifier, RuleMatch,
};
pub use config::PipelineConfig;
pub use db::{DbError, PipelineDb, TodoFilter};
pub use dedup::{TodoDeduplicator, TypePriority};
pub use directory::{ProjectDirectory, ProjectEntry};
pub use error::PipelineError;
pub use pipeline::{AnalysisPipeline, BatchOptions, BatchSummary, TodoExtractor};
pub use types::{
    Channel, Communication, ProjectTag, Todo, TodoCandidate, TodoStatus, TodoType, UNKNOWN_CODE,
};

//! Quantloop Runner: sweeps, shards, aggregation, artifacts, task orchestration.
//!
//! This crate builds on `quantloop-core` to provide:
//! - Run configs, TOML sweep files and environment control limits
//! - Grid expansion and striped shard partitioning
//! - Shard runner with per-config failure capture and an appended soft grid
//! - Order-independent aggregation, top-K and best-parameter selection
//! - CSV/JSON artifacts and per-task JSONL attempt logs
//! - A bounded task orchestrator with pluggable collaborators

pub mod aggregate;
pub mod attempt_log;
pub mod collaborators;
pub mod config;
pub mod export;
pub mod grid;
pub mod loader;
pub mod notify;
pub mod orchestrator;
pub mod proposal;
pub mod shard;
pub mod sweep;
pub mod task_sources;
pub mod tasks;

pub use aggregate::{aggregate, check_coverage, select_best, Aggregate, AggregateError, BestFilter, BestPick, Objective};
pub use attempt_log::{AttemptLog, AttemptOutcome, AttemptRecord};
pub use collaborators::{CommandGenerator, CommandVerifier, GitWorkingTree, DEFAULT_VERIFY};
pub use config::{ConfigLoadError, ControlConfig, DataSettings, RunConfig, RunId, SourceKind, SweepConfig};
pub use export::{BestParams, ResultRow, RESULT_COLUMNS};
pub use grid::{ParamGrid, StrategyKind};
pub use loader::{load_series, LoadedSeries};
pub use notify::{deliver, LogNotifier, NotificationSummary, Notifier};
pub use orchestrator::{
    ApplyConflict, ChangeGenerator, Clock, CollaboratorError, Collaborators, FileSentinel,
    HaltReason, LoopState, Orchestrator, OrchestratorError, Phase, RepoContext, RunSummary,
    StopSentinel, SystemClock, Verification, Verifier, WorkingTree,
};
pub use proposal::{validate, ChangeProposal, ProposalError};
pub use shard::{partition, ShardError, ShardSpec};
pub use sweep::{run_all_shards, RunOutcome, RunRecord, ShardReport, ShardRunner};
pub use task_sources::{junit_failures, load_junit, scan_code_markers, CodeMarker, FailureKind, TestFailure};
pub use tasks::{backtest_alerts, Task, TaskList, TaskStatus};

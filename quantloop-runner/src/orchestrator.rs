//! Task orchestrator: a bounded propose/validate/apply/verify loop.
//!
//! ```text
//! Idle → SelectingTask → AwaitingChange → ValidatingChange → Applying → Verifying
//!                             ↑                 │               │           │
//!                             └── RetryChange ←─┴───────────────┴───────────┤
//!                                                                           ↓
//!                         Idle ← Aborted (iteration limit)      TaskDone → Idle | Halted
//! ```
//!
//! Safety limits:
//! - at most `max_iterations` attempts per task;
//! - at most `tasks_per_run` completed tasks per run;
//! - a stop sentinel and a wall-clock budget, checked in `Idle`,
//!   `SelectingTask` and before every proposal request, never mid-step.
//!
//! Collaborators (generator, working tree, verifier, clock, sentinel) are
//! traits so the loop can be driven by real commands or by test fakes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::attempt_log::{AttemptLog, AttemptOutcome, AttemptRecord};
use crate::config::ControlConfig;
use crate::proposal::{validate, ChangeProposal};
use crate::tasks::{Task, TaskFileError, TaskList, TaskStatus};

// ─── Collaborator seams ──────────────────────────────────────────────

/// Failure of an external collaborator (process spawn, exit status, I/O).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Other(String),
}

/// A validated proposal that could not be applied to the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("change does not apply: {reason}")]
pub struct ApplyConflict {
    pub reason: String,
}

/// Result of a verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub passed: bool,
    pub diagnostics: String,
}

impl Verification {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostics: String::new(),
        }
    }

    pub fn fail(diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// What the generator is told besides the task itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoContext {
    /// 1-based attempt number for the task.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Why the previous attempt for this task was rejected.
    pub previous_failure: Option<String>,
}

pub trait ChangeGenerator {
    /// Produce raw diff text for `task`.
    fn propose(&mut self, task: &Task, context: &RepoContext) -> Result<String, CollaboratorError>;
}

pub trait WorkingTree {
    fn apply(&mut self, proposal: &ChangeProposal) -> Result<(), ApplyConflict>;

    /// Undo a previously applied proposal.
    fn revert(&mut self, proposal: &ChangeProposal) -> Result<(), CollaboratorError>;
}

pub trait Verifier {
    fn verify(&mut self) -> Verification;
}

pub trait Clock {
    /// Wall time since the run started.
    fn elapsed(&self) -> Duration;
}

pub trait StopSentinel {
    fn is_set(&self) -> bool;
}

/// Monotonic clock started at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Stop requested when a marker file exists.
#[derive(Debug, Clone)]
pub struct FileSentinel {
    path: PathBuf,
}

impl FileSentinel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StopSentinel for FileSentinel {
    fn is_set(&self) -> bool {
        self.path.exists()
    }
}

impl StopSentinel for AtomicBool {
    fn is_set(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

// ─── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    StopRequested,
    BudgetExhausted,
    TaskCapReached,
    NoPendingTasks,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HaltReason::StopRequested => "stop_requested",
            HaltReason::BudgetExhausted => "budget_exhausted",
            HaltReason::TaskCapReached => "task_cap_reached",
            HaltReason::NoPendingTasks => "no_pending_tasks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SelectingTask,
    AwaitingChange,
    ValidatingChange { raw: String },
    Applying { proposal: ChangeProposal },
    Verifying { proposal: ChangeProposal },
    TaskDone,
    RetryChange,
    Aborted,
    Halted(HaltReason),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::SelectingTask => "selecting_task",
            Phase::AwaitingChange => "awaiting_change",
            Phase::ValidatingChange { .. } => "validating_change",
            Phase::Applying { .. } => "applying",
            Phase::Verifying { .. } => "verifying",
            Phase::TaskDone => "task_done",
            Phase::RetryChange => "retry_change",
            Phase::Aborted => "aborted",
            Phase::Halted(_) => "halted",
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Phase::Halted(_))
    }
}

/// Loop bookkeeping threaded through [`Orchestrator::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    pub phase: Phase,
    pub current_task: Option<Task>,
    /// Failed attempts for the current task.
    pub iteration: u32,
    pub completed: u32,
    pub failed: u32,
    /// Proposal requests made this run, across tasks.
    pub attempts: u32,
    pub last_failure: Option<String>,
    pub stop_requested: bool,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            current_task: None,
            iteration: 0,
            completed: 0,
            failed: 0,
            attempts: 0,
            last_failure: None,
            stop_requested: false,
        }
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub halt_reason: HaltReason,
    pub completed: u32,
    pub failed: u32,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    TaskFile(#[from] TaskFileError),

    #[error("failed to append attempt log: {0}")]
    AttemptLog(#[source] std::io::Error),

    #[error("failed to revert rejected change, working tree needs attention: {0}")]
    Revert(#[source] CollaboratorError),
}

/// The collaborators one run talks to.
pub struct Collaborators<'a> {
    pub generator: &'a mut dyn ChangeGenerator,
    pub tree: &'a mut dyn WorkingTree,
    pub verifier: &'a mut dyn Verifier,
    pub clock: &'a dyn Clock,
    pub sentinel: &'a dyn StopSentinel,
}

pub struct Orchestrator<'a> {
    control: ControlConfig,
    tasks: TaskList,
    tasks_path: Option<PathBuf>,
    log: Option<AttemptLog>,
    io: Collaborators<'a>,
    state: LoopState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(control: ControlConfig, tasks: TaskList, io: Collaborators<'a>) -> Self {
        Self {
            control,
            tasks,
            tasks_path: None,
            log: None,
            io,
            state: LoopState::default(),
        }
    }

    /// Persist the task list to `path` after every status change.
    pub fn with_task_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tasks_path = Some(path.into());
        self
    }

    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    fn halt_check(&mut self) -> Option<HaltReason> {
        if self.io.sentinel.is_set() {
            self.state.stop_requested = true;
            return Some(HaltReason::StopRequested);
        }
        match self.control.time_budget() {
            Some(budget) if self.io.clock.elapsed() >= budget => Some(HaltReason::BudgetExhausted),
            _ => None,
        }
    }

    fn persist(&self) -> Result<(), OrchestratorError> {
        if let Some(path) = &self.tasks_path {
            self.tasks.save(path)?;
        }
        Ok(())
    }

    fn record(&self, outcome: AttemptOutcome) -> Result<(), OrchestratorError> {
        let Some(task) = &self.state.current_task else {
            return Ok(());
        };
        let rec = AttemptRecord {
            task_id: task.id,
            task: task.text.clone(),
            iteration: self.state.iteration + 1,
            at: Utc::now(),
            outcome,
        };
        if let Some(log) = &self.log {
            log.append(&rec).map_err(OrchestratorError::AttemptLog)?;
        }
        Ok(())
    }

    /// Count a rejected attempt and choose between retry and abort.
    fn reject(&mut self, outcome: AttemptOutcome, reason: String) -> Result<Phase, OrchestratorError> {
        self.record(outcome)?;
        self.state.iteration += 1;
        warn!(
            task = self.state.current_task.as_ref().map(|t| t.id),
            iteration = self.state.iteration,
            max = self.control.max_iterations,
            reason = %reason,
            "attempt rejected"
        );
        self.state.last_failure = Some(reason);
        if self.state.iteration < self.control.max_iterations {
            Ok(Phase::RetryChange)
        } else {
            Ok(Phase::Aborted)
        }
    }

    fn current_task_id(&self) -> Option<usize> {
        self.state.current_task.as_ref().map(|t| t.id)
    }

    /// Execute the current phase and move to the next one.
    pub fn step(&mut self) -> Result<&Phase, OrchestratorError> {
        let phase = std::mem::replace(&mut self.state.phase, Phase::Idle);
        let next = match phase {
            Phase::Idle => match self.halt_check() {
                Some(reason) => Phase::Halted(reason),
                None => Phase::SelectingTask,
            },

            Phase::SelectingTask => {
                if let Some(reason) = self.halt_check() {
                    Phase::Halted(reason)
                } else if self.state.completed >= self.control.tasks_per_run {
                    Phase::Halted(HaltReason::TaskCapReached)
                } else {
                    match self.tasks.next_pending().cloned() {
                        Some(task) => {
                            info!(task = task.id, text = %task.text, "task selected");
                            self.state.current_task = Some(task);
                            self.state.iteration = 0;
                            self.state.last_failure = None;
                            Phase::AwaitingChange
                        }
                        None => Phase::Halted(HaltReason::NoPendingTasks),
                    }
                }
            }

            Phase::AwaitingChange => match (self.halt_check(), self.state.current_task.clone()) {
                (Some(reason), _) => Phase::Halted(reason),
                (None, None) => Phase::Idle,
                (None, Some(task)) => {
                    self.state.attempts += 1;
                    let context = RepoContext {
                        attempt: self.state.iteration + 1,
                        max_attempts: self.control.max_iterations,
                        previous_failure: self.state.last_failure.clone(),
                    };
                    match self.io.generator.propose(&task, &context) {
                        Ok(raw) => Phase::ValidatingChange { raw },
                        Err(e) => {
                            let reason = e.to_string();
                            self.reject(
                                AttemptOutcome::GeneratorError {
                                    reason: reason.clone(),
                                },
                                reason,
                            )?
                        }
                    }
                }
            },

            Phase::ValidatingChange { raw } => match validate(&raw) {
                Ok(proposal) => Phase::Applying { proposal },
                Err(e) => {
                    let reason = e.to_string();
                    self.reject(
                        AttemptOutcome::InvalidDiff {
                            reason: reason.clone(),
                        },
                        reason,
                    )?
                }
            },

            Phase::Applying { proposal } => match self.io.tree.apply(&proposal) {
                Ok(()) => Phase::Verifying { proposal },
                Err(conflict) => self.reject(
                    AttemptOutcome::ApplyConflict {
                        reason: conflict.reason.clone(),
                    },
                    conflict.to_string(),
                )?,
            },

            Phase::Verifying { proposal } => {
                let verification = self.io.verifier.verify();
                if verification.passed {
                    self.record(AttemptOutcome::Accepted)?;
                    Phase::TaskDone
                } else {
                    self.io
                        .tree
                        .revert(&proposal)
                        .map_err(OrchestratorError::Revert)?;
                    let reason = format!("verification failed: {}", verification.diagnostics);
                    self.reject(
                        AttemptOutcome::VerificationFailed {
                            diagnostics: verification.diagnostics,
                        },
                        reason,
                    )?
                }
            }

            Phase::TaskDone => {
                if let Some(id) = self.current_task_id() {
                    self.tasks.mark(id, TaskStatus::Done)?;
                    self.persist()?;
                }
                self.state.completed += 1;
                info!(
                    task = self.current_task_id(),
                    completed = self.state.completed,
                    "task done"
                );
                self.state.current_task = None;
                if self.state.completed >= self.control.tasks_per_run {
                    Phase::Halted(HaltReason::TaskCapReached)
                } else {
                    Phase::Idle
                }
            }

            Phase::RetryChange => Phase::AwaitingChange,

            Phase::Aborted => {
                if let Some(id) = self.current_task_id() {
                    self.tasks.mark(id, TaskStatus::Failed)?;
                    self.persist()?;
                }
                self.state.failed += 1;
                warn!(
                    task = self.current_task_id(),
                    attempts = self.state.iteration,
                    last_failure = self.state.last_failure.as_deref().unwrap_or(""),
                    "task aborted"
                );
                self.state.current_task = None;
                Phase::Idle
            }

            Phase::Halted(reason) => Phase::Halted(reason),
        };

        debug!(phase = next.name(), "step");
        self.state.phase = next;
        Ok(&self.state.phase)
    }

    /// Step until halted.
    pub fn run(&mut self) -> Result<RunSummary, OrchestratorError> {
        while !self.state.phase.is_halted() {
            self.step()?;
        }
        let halt_reason = match self.state.phase {
            Phase::Halted(reason) => reason,
            _ => HaltReason::StopRequested,
        };
        let summary = RunSummary {
            halt_reason,
            completed: self.state.completed,
            failed: self.state.failed,
            attempts: self.state.attempts,
            elapsed_ms: u64::try_from(self.io.clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            reason = ?summary.halt_reason,
            completed = summary.completed,
            failed = summary.failed,
            attempts = summary.attempts,
            "orchestrator halted"
        );
        Ok(summary)
    }
}

//! Task orchestrator integration tests with scripted collaborators.
//!
//! Covers: retry bound, stop sentinel, per-run cap, wall-clock budget,
//! recovery after malformed proposals, revert on failed verification, and
//! the loop invariants under random collaborator behaviour.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use quantloop_runner::attempt_log::{AttemptLog, AttemptOutcome};
use quantloop_runner::config::ControlConfig;
use quantloop_runner::orchestrator::{
    ApplyConflict, ChangeGenerator, Clock, CollaboratorError, Collaborators, HaltReason,
    Orchestrator, Phase, RepoContext, RunSummary, Verification, Verifier, WorkingTree,
};
use quantloop_runner::proposal::ChangeProposal;
use quantloop_runner::tasks::{Task, TaskList, TaskStatus};

const GOOD_DIFF: &str = "--- a/strategy.toml\n+++ b/strategy.toml\n@@ -1 +1 @@\n-cooldown = 3\n+cooldown = 5\n";
const PROSE: &str = "Sure! Increase the cooldown to 5 bars.";

// ─── Fakes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Reply {
    Diff(&'static str),
    Fail(&'static str),
}

struct ScriptedGenerator {
    script: VecDeque<Reply>,
    fallback: Reply,
    contexts: Vec<RepoContext>,
    on_call: Option<Box<dyn Fn()>>,
}

impl ScriptedGenerator {
    fn always(reply: Reply) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: reply,
            contexts: Vec::new(),
            on_call: None,
        }
    }

    fn then(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: script.into(),
            ..Self::always(fallback)
        }
    }
}

impl ChangeGenerator for ScriptedGenerator {
    fn propose(&mut self, _task: &Task, context: &RepoContext) -> Result<String, CollaboratorError> {
        self.contexts.push(context.clone());
        if let Some(hook) = &self.on_call {
            hook();
        }
        match self.script.pop_front().unwrap_or_else(|| self.fallback.clone()) {
            Reply::Diff(d) => Ok(d.to_string()),
            Reply::Fail(msg) => Err(CollaboratorError::Other(msg.to_string())),
        }
    }
}

#[derive(Default)]
struct FakeTree {
    conflict: bool,
    applied: usize,
    reverted: usize,
}

impl WorkingTree for FakeTree {
    fn apply(&mut self, _proposal: &ChangeProposal) -> Result<(), ApplyConflict> {
        if self.conflict {
            return Err(ApplyConflict {
                reason: "patch does not apply".into(),
            });
        }
        self.applied += 1;
        Ok(())
    }

    fn revert(&mut self, _proposal: &ChangeProposal) -> Result<(), CollaboratorError> {
        self.reverted += 1;
        Ok(())
    }
}

struct ScriptedVerifier {
    script: VecDeque<bool>,
    fallback: bool,
    calls: usize,
}

impl ScriptedVerifier {
    fn always(pass: bool) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: pass,
            calls: 0,
        }
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&mut self) -> Verification {
        self.calls += 1;
        if self.script.pop_front().unwrap_or(self.fallback) {
            Verification::pass()
        } else {
            Verification::fail("2 tests failed")
        }
    }
}

#[derive(Clone, Default)]
struct ManualClock(Rc<Cell<Duration>>);

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.0.get()
    }
}

fn control(max_iterations: u32, tasks_per_run: u32) -> ControlConfig {
    ControlConfig {
        max_iterations,
        tasks_per_run,
        ..ControlConfig::default()
    }
}

const TWO_TASKS: &str = "# Backlog\n- [ ] raise cooldown\n- [ ] add ATR floor\n";

struct Outcome {
    summary: RunSummary,
    tasks: TaskList,
}

fn run(
    control: ControlConfig,
    tasks: &str,
    generator: &mut ScriptedGenerator,
    tree: &mut FakeTree,
    verifier: &mut ScriptedVerifier,
    clock: &ManualClock,
    stop: &AtomicBool,
    log: Option<AttemptLog>,
) -> Outcome {
    let io = Collaborators {
        generator,
        tree,
        verifier,
        clock,
        sentinel: stop,
    };
    let mut orch = Orchestrator::new(control, TaskList::parse(tasks), io);
    if let Some(log) = log {
        orch = orch.with_attempt_log(log);
    }
    let summary = orch.run().unwrap();
    Outcome {
        summary,
        tasks: orch.tasks().clone(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[test]
fn always_malformed_generator_aborts_after_exactly_max_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let log = AttemptLog::new(dir.path());
    let mut gen = ScriptedGenerator::always(Reply::Diff(PROSE));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);

    let out = run(
        control(3, 1),
        "- [ ] raise cooldown\n",
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(false),
        Some(log.clone()),
    );

    assert_eq!(gen.contexts.len(), 3);
    assert_eq!(out.summary.attempts, 3);
    assert_eq!(out.summary.failed, 1);
    assert_eq!(out.summary.completed, 0);
    assert_eq!(out.summary.halt_reason, HaltReason::NoPendingTasks);
    assert_eq!(out.tasks.tasks()[0].status, TaskStatus::Failed);
    assert_eq!(tree.applied, 0);
    assert_eq!(ver.calls, 0);

    let attempts = log.read(0).unwrap();
    let iterations: Vec<u32> = attempts.iter().map(|a| a.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3]);
    assert!(attempts
        .iter()
        .all(|a| matches!(a.outcome, AttemptOutcome::InvalidDiff { .. })));
}

#[test]
fn stop_sentinel_present_processes_nothing() {
    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);
    let out = run(
        control(3, 5),
        TWO_TASKS,
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(true),
        None,
    );
    assert_eq!(out.summary.halt_reason, HaltReason::StopRequested);
    assert_eq!(out.summary.attempts, 0);
    assert_eq!(out.summary.completed + out.summary.failed, 0);
    assert!(gen.contexts.is_empty());
    assert_eq!(out.tasks.count(TaskStatus::Pending), 2);
}

#[test]
fn stop_file_sentinel() {
    use quantloop_runner::orchestrator::{FileSentinel, StopSentinel};
    let dir = tempfile::tempdir().unwrap();
    let sentinel = FileSentinel::new(dir.path().join("STOP"));
    assert!(!sentinel.is_set());
    std::fs::write(sentinel.path(), "").unwrap();
    assert!(sentinel.is_set());
}

#[test]
fn sentinel_raised_mid_task_halts_before_next_proposal() {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let mut gen = ScriptedGenerator::always(Reply::Diff(PROSE));
    gen.on_call = Some(Box::new(move || flag.store(true, Ordering::Relaxed)));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);

    let out = run(
        control(3, 1),
        TWO_TASKS,
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &stop,
        None,
    );
    assert_eq!(out.summary.halt_reason, HaltReason::StopRequested);
    assert_eq!(out.summary.attempts, 1);
    // Interrupted task is neither done nor failed.
    assert_eq!(out.tasks.count(TaskStatus::Pending), 2);
}

#[test]
fn per_run_cap_halts_after_first_task() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("TODO.md");
    std::fs::write(&path, TWO_TASKS).unwrap();

    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);
    let clock = ManualClock::default();
    let stop = AtomicBool::new(false);
    let io = Collaborators {
        generator: &mut gen,
        tree: &mut tree,
        verifier: &mut ver,
        clock: &clock,
        sentinel: &stop,
    };
    let mut orch = Orchestrator::new(control(3, 1), TaskList::load(&path).unwrap(), io)
        .with_task_file(&path);
    let summary = orch.run().unwrap();

    assert_eq!(summary.halt_reason, HaltReason::TaskCapReached);
    assert_eq!(summary.completed, 1);
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, "# Backlog\n- [x] raise cooldown\n- [ ] add ATR floor\n");
}

#[test]
fn cap_of_two_completes_two_of_three() {
    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);
    let out = run(
        control(3, 2),
        "- [ ] a\n- [ ] b\n- [ ] c\n",
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(false),
        None,
    );
    assert_eq!(out.summary.completed, 2);
    assert_eq!(out.summary.halt_reason, HaltReason::TaskCapReached);
    assert_eq!(out.tasks.next_pending().map(|t| t.text.as_str()), Some("c"));
    assert_eq!(tree.applied, 2);
}

#[test]
fn recovers_after_malformed_proposals() {
    let mut gen = ScriptedGenerator::then(
        vec![Reply::Diff(PROSE), Reply::Fail("model timeout")],
        Reply::Diff(GOOD_DIFF),
    );
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);
    let out = run(
        control(3, 1),
        TWO_TASKS,
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(false),
        None,
    );
    assert_eq!(out.summary.completed, 1);
    assert_eq!(out.summary.failed, 0);
    assert_eq!(out.summary.attempts, 3);

    let attempts: Vec<u32> = gen.contexts.iter().map(|c| c.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(gen.contexts[0].previous_failure.is_none());
    assert!(gen.contexts[2]
        .previous_failure
        .as_deref()
        .is_some_and(|f| f.contains("model timeout")));
}

#[test]
fn failed_verification_reverts_then_retries() {
    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier {
        script: VecDeque::from(vec![false]),
        fallback: true,
        calls: 0,
    };
    let out = run(
        control(3, 1),
        TWO_TASKS,
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(false),
        None,
    );
    assert_eq!(out.summary.completed, 1);
    assert_eq!(tree.applied, 2);
    assert_eq!(tree.reverted, 1);
    assert_eq!(ver.calls, 2);
}

#[test]
fn apply_conflicts_count_against_the_limit() {
    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree {
        conflict: true,
        ..FakeTree::default()
    };
    let mut ver = ScriptedVerifier::always(true);
    let out = run(
        control(2, 1),
        TWO_TASKS,
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(false),
        None,
    );
    // Both tasks exhaust their attempts; aborted tasks do not count toward the cap.
    assert_eq!(out.summary.failed, 2);
    assert_eq!(out.summary.attempts, 4);
    assert_eq!(out.summary.halt_reason, HaltReason::NoPendingTasks);
    assert_eq!(ver.calls, 0);
}

#[test]
fn budget_exhaustion_halts_between_proposals() {
    let clock = ManualClock::default();
    let ticking = clock.clone();
    let mut gen = ScriptedGenerator::always(Reply::Diff(PROSE));
    gen.on_call = Some(Box::new(move || ticking.0.set(ticking.0.get() + Duration::from_secs(600))));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);

    let out = run(
        ControlConfig {
            max_iterations: 5,
            tasks_per_run: 1,
            time_budget_min: 15,
            ..ControlConfig::default()
        },
        TWO_TASKS,
        &mut gen,
        &mut tree,
        &mut ver,
        &clock,
        &AtomicBool::new(false),
        None,
    );
    assert_eq!(out.summary.halt_reason, HaltReason::BudgetExhausted);
    assert_eq!(out.summary.attempts, 2);
    assert_eq!(out.tasks.count(TaskStatus::Pending), 2);
}

#[test]
fn empty_backlog_halts_immediately() {
    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);
    let out = run(
        control(3, 1),
        "# nothing\n- [x] shipped\n",
        &mut gen,
        &mut tree,
        &mut ver,
        &ManualClock::default(),
        &AtomicBool::new(false),
        None,
    );
    assert_eq!(out.summary.halt_reason, HaltReason::NoPendingTasks);
    assert_eq!(out.summary.attempts, 0);
}

#[test]
fn halted_is_absorbing() {
    let mut gen = ScriptedGenerator::always(Reply::Diff(GOOD_DIFF));
    let mut tree = FakeTree::default();
    let mut ver = ScriptedVerifier::always(true);
    let clock = ManualClock::default();
    let stop = AtomicBool::new(true);
    let io = Collaborators {
        generator: &mut gen,
        tree: &mut tree,
        verifier: &mut ver,
        clock: &clock,
        sentinel: &stop,
    };
    let mut orch = Orchestrator::new(control(3, 1), TaskList::parse(TWO_TASKS), io);
    assert_eq!(orch.step().unwrap(), &Phase::Halted(HaltReason::StopRequested));
    assert_eq!(orch.step().unwrap(), &Phase::Halted(HaltReason::StopRequested));
    assert!(orch.state().stop_requested);
}

// ─── Invariants under random collaborators ──────────────────────────

fn arb_reply() -> impl Strategy<Value = Reply> {
    prop_oneof![
        3 => Just(Reply::Diff(GOOD_DIFF)),
        2 => Just(Reply::Diff(PROSE)),
        1 => Just(Reply::Fail("generator crashed")),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn loop_invariants_hold(
        replies in prop::collection::vec(arb_reply(), 0..40),
        verdicts in prop::collection::vec(any::<bool>(), 0..40),
        max_iterations in 1u32..5,
        tasks_per_run in 1u32..4,
        n_tasks in 0usize..5,
    ) {
        let backlog: String = (0..n_tasks).map(|i| format!("- [ ] task {i}\n")).collect();
        let mut gen = ScriptedGenerator::then(replies, Reply::Diff(PROSE));
        let mut tree = FakeTree::default();
        let mut ver = ScriptedVerifier { script: verdicts.into(), fallback: false, calls: 0 };
        let clock = ManualClock::default();
        let stop = AtomicBool::new(false);
        let io = Collaborators {
            generator: &mut gen,
            tree: &mut tree,
            verifier: &mut ver,
            clock: &clock,
            sentinel: &stop,
        };
        let ctl = control(max_iterations, tasks_per_run);
        let mut orch = Orchestrator::new(ctl, TaskList::parse(&backlog), io);

        let mut steps = 0;
        while !orch.state().phase.is_halted() {
            orch.step().unwrap();
            steps += 1;
            prop_assert!(orch.state().iteration <= max_iterations);
            prop_assert!(orch.state().completed <= tasks_per_run);
            prop_assert!(steps < 10_000);
        }
        let s = orch.state().clone();
        prop_assert!((s.completed + s.failed) as usize <= n_tasks);
        prop_assert!(s.attempts <= (n_tasks as u32) * max_iterations);
        prop_assert_eq!(orch.tasks().count(TaskStatus::Done) as u32, s.completed);
        prop_assert_eq!(orch.tasks().count(TaskStatus::Failed) as u32, s.failed);
    }
}

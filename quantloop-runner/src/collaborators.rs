//! Process-backed orchestrator collaborators.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::orchestrator::{
    ApplyConflict, ChangeGenerator, CollaboratorError, RepoContext, Verification, Verifier,
    WorkingTree,
};
use crate::proposal::ChangeProposal;
use crate::tasks::Task;

/// Keep diagnostics readable in logs.
const DIAGNOSTIC_TAIL: usize = 4_000;

/// Verification command used when none is configured.
pub const DEFAULT_VERIFY: [&str; 4] = ["cargo", "test", "--workspace", "--quiet"];

fn tail(text: &str) -> String {
    let start = text.len().saturating_sub(DIAGNOSTIC_TAIL);
    let start = (start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

fn run(
    program: &str,
    args: &[String],
    cwd: Option<&PathBuf>,
    envs: &[(&str, String)],
    stdin: Option<&str>,
) -> Result<Output, CollaboratorError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (k, v) in envs {
        cmd.env(k, v);
    }
    debug!(program, ?args, "spawning");

    let spawn_err = |source| CollaboratorError::Spawn {
        program: program.to_string(),
        source,
    };
    let mut child = cmd.spawn().map_err(spawn_err)?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).map_err(spawn_err)?;
    }
    child.wait_with_output().map_err(spawn_err)
}

fn exit_error(program: &str, output: &Output) -> CollaboratorError {
    CollaboratorError::Exit {
        program: program.to_string(),
        status: output.status.to_string(),
        stderr: tail(String::from_utf8_lossy(&output.stderr).trim()),
    }
}

/// Runs an external command that prints a unified diff on stdout.
///
/// The task text arrives on stdin; attempt metadata in `QUANTLOOP_TASK_ID`,
/// `QUANTLOOP_ATTEMPT`, `QUANTLOOP_MAX_ATTEMPTS` and, on retries,
/// `QUANTLOOP_PREVIOUS_FAILURE`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl ChangeGenerator for CommandGenerator {
    fn propose(&mut self, task: &Task, context: &RepoContext) -> Result<String, CollaboratorError> {
        let mut envs = vec![
            ("QUANTLOOP_TASK_ID", task.id.to_string()),
            ("QUANTLOOP_ATTEMPT", context.attempt.to_string()),
            ("QUANTLOOP_MAX_ATTEMPTS", context.max_attempts.to_string()),
        ];
        if let Some(prev) = &context.previous_failure {
            envs.push(("QUANTLOOP_PREVIOUS_FAILURE", prev.clone()));
        }
        let output = run(&self.program, &self.args, self.cwd.as_ref(), &envs, Some(&task.text))?;
        if !output.status.success() {
            return Err(exit_error(&self.program, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Applies and reverts diffs with `git apply` inside a repository.
#[derive(Debug, Clone)]
pub struct GitWorkingTree {
    repo: PathBuf,
}

impl GitWorkingTree {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn git_apply(&self, extra: &[&str], diff: &str) -> Result<Output, CollaboratorError> {
        let mut args = vec!["apply".to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        args.push("-".into());
        run("git", &args, Some(&self.repo), &[], Some(diff))
    }
}

impl WorkingTree for GitWorkingTree {
    fn apply(&mut self, proposal: &ChangeProposal) -> Result<(), ApplyConflict> {
        let conflict = |reason: String| ApplyConflict { reason };
        let check = self
            .git_apply(&["--check"], proposal.diff())
            .map_err(|e| conflict(e.to_string()))?;
        if !check.status.success() {
            return Err(conflict(tail(String::from_utf8_lossy(&check.stderr).trim())));
        }
        let applied = self
            .git_apply(&[], proposal.diff())
            .map_err(|e| conflict(e.to_string()))?;
        if !applied.status.success() {
            return Err(conflict(tail(String::from_utf8_lossy(&applied.stderr).trim())));
        }
        Ok(())
    }

    fn revert(&mut self, proposal: &ChangeProposal) -> Result<(), CollaboratorError> {
        let output = self.git_apply(&["-R"], proposal.diff())?;
        if !output.status.success() {
            return Err(exit_error("git apply -R", &output));
        }
        Ok(())
    }
}

/// Passes when a command (a test suite, a linter) exits successfully.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandVerifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// [`DEFAULT_VERIFY`] inside `repo`.
    pub fn workspace_tests(repo: impl Into<PathBuf>) -> Self {
        let args = DEFAULT_VERIFY[1..].iter().map(|s| s.to_string()).collect();
        Self::new(DEFAULT_VERIFY[0], args).in_dir(repo)
    }
}

impl Verifier for CommandVerifier {
    fn verify(&mut self) -> Verification {
        match run(&self.program, &self.args, self.cwd.as_ref(), &[], None) {
            Ok(output) if output.status.success() => Verification::pass(),
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Verification::fail(format!("{} exited with {}: {}", self.program, output.status, tail(text.trim())))
            }
            Err(e) => Verification::fail(e.to_string()),
        }
    }
}

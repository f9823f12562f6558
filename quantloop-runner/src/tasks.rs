//! Markdown task checklist.
//!
//! Tasks are lines of the form `- [ ] text` (pending), `- [x] text` (done) or
//! `- [!] text` (given up by the orchestrator). Every other line is kept
//! verbatim so a rewritten file differs only in the markers that changed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::export::ResultRow;

#[derive(Debug, Error)]
pub enum TaskFileError {
    #[error("failed to read task list {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write task list {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no task with id {0}")]
    UnknownTask(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
}

impl TaskStatus {
    fn marker(self) -> char {
        match self {
            TaskStatus::Pending => ' ',
            TaskStatus::Done => 'x',
            TaskStatus::Failed => '!',
        }
    }

    fn from_marker(c: char) -> Option<Self> {
        match c {
            ' ' => Some(TaskStatus::Pending),
            'x' | 'X' => Some(TaskStatus::Done),
            '!' => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// One checklist entry. `id` is its position among the tasks of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: usize,
    pub status: TaskStatus,
    pub text: String,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Text(String),
    /// Index into `tasks` plus the indentation and bullet preceding the marker.
    Task { task: usize, prefix: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskList {
    lines: Vec<Line>,
    tasks: Vec<Task>,
}

/// Split `  - [x] text` into (`  - `, marker, `text`).
fn split_task_line(line: &str) -> Option<(&str, char, &str)> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let rest = body
        .strip_prefix("- [")
        .or_else(|| body.strip_prefix("* ["))?;
    let mut chars = rest.chars();
    let marker = chars.next()?;
    let after = chars.as_str().strip_prefix(']')?;
    let text = after.strip_prefix(' ').unwrap_or(after).trim_end();
    if text.is_empty() {
        return None;
    }
    TaskStatus::from_marker(marker)?;
    Some((&line[..indent.len() + 2], marker, text))
}

impl TaskList {
    pub fn parse(text: &str) -> Self {
        let mut list = Self::default();
        for raw in text.lines() {
            match split_task_line(raw) {
                Some((prefix, marker, body)) => {
                    let id = list.tasks.len();
                    let status = TaskStatus::from_marker(marker).unwrap_or(TaskStatus::Pending);
                    list.tasks.push(Task {
                        id,
                        status,
                        text: body.to_string(),
                    });
                    list.lines.push(Line::Task {
                        task: id,
                        prefix: prefix.to_string(),
                    });
                }
                None => list.lines.push(Line::Text(raw.to_string())),
            }
        }
        list
    }

    pub fn load(path: &Path) -> Result<Self, TaskFileError> {
        let text = fs::read_to_string(path).map_err(|source| TaskFileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn save(&self, path: &Path) -> Result<(), TaskFileError> {
        fs::write(path, self.render()).map_err(|source| TaskFileError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Text(t) => out.push_str(t),
                Line::Task { task, prefix } => {
                    if let Some(t) = self.tasks.get(*task) {
                        out.push_str(&format!("{prefix}[{}] {}", t.status.marker(), t.text));
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: usize) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// First pending task in file order.
    pub fn next_pending(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn mark(&mut self, id: usize, status: TaskStatus) -> Result<(), TaskFileError> {
        let task = self.tasks.get_mut(id).ok_or(TaskFileError::UnknownTask(id))?;
        task.status = status;
        Ok(())
    }

    /// Append a pending task unless one with the same text already exists.
    ///
    /// Returns true when a task was added.
    pub fn push_pending(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() || self.tasks.iter().any(|t| t.text == text) {
            return false;
        }
        let id = self.tasks.len();
        self.tasks.push(Task {
            id,
            status: TaskStatus::Pending,
            text: text.to_string(),
        });
        self.lines.push(Line::Task {
            task: id,
            prefix: "- ".into(),
        });
        true
    }
}

/// Follow-up tasks suggested by weak backtest rows.
///
/// A row raises an alert when its pf is positive but below 1.1, its win rate
/// is positive but below 45%, or its drawdown exceeds 30%.
pub fn backtest_alerts(rows: &[ResultRow]) -> Vec<String> {
    let mut alerts = Vec::new();
    for row in rows {
        let tag = format!(
            "{} bars={} fee={} threshold={} seed={}",
            row.mode, row.bars, row.fee, row.threshold, row.seed
        );
        if let Some(pf) = row.pf.filter(|&pf| pf > 0.0 && pf < 1.1) {
            alerts.push(format!("Improve profit factor ({pf:.2}) for {tag}"));
        }
        if let Some(wr) = row.win_rate.filter(|&wr| wr > 0.0 && wr < 0.45) {
            alerts.push(format!("Raise win rate ({:.1}%) for {tag}", wr * 100.0));
        }
        if row.max_dd > 0.3 {
            alerts.push(format!(
                "Reduce max drawdown ({:.1}%) for {tag}",
                row.max_dd * 100.0
            ));
        }
    }
    alerts
}

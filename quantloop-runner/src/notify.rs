//! End-of-run notifications.
//!
//! Delivery is best effort: a failing notifier is logged and never fails the
//! run that produced the summary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use quantloop_core::engine::ExecutionMode;

use crate::aggregate::Aggregate;
use crate::config::RunId;
use crate::orchestrator::{HaltReason, RunSummary};

/// Best record of one execution mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeBest {
    pub mode: ExecutionMode,
    pub run_id: RunId,
    pub final_equity: f64,
    pub max_dd: f64,
    pub trades: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSummary {
    /// Identifier of the sweep or orchestrator run being reported.
    pub run_id: String,
    pub succeeded: usize,
    pub failed: usize,
    pub best: Vec<ModeBest>,
    pub artifact: Option<PathBuf>,
    /// Set for orchestrator runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
}

impl NotificationSummary {
    pub fn from_aggregate(run_id: impl Into<String>, agg: &Aggregate, artifact: Option<PathBuf>) -> Self {
        let best = agg
            .best_per_mode()
            .into_iter()
            .filter_map(|rec| {
                rec.result().map(|r| ModeBest {
                    mode: rec.config.mode,
                    run_id: rec.config.run_id(),
                    final_equity: r.final_equity,
                    max_dd: r.max_dd,
                    trades: r.trades,
                })
            })
            .collect();
        Self {
            run_id: run_id.into(),
            succeeded: agg.succeeded,
            failed: agg.failed,
            best,
            artifact,
            halt_reason: None,
        }
    }

    /// Summary of an orchestrator run: tasks completed and given up on.
    pub fn from_run_summary(run_id: impl Into<String>, run: &RunSummary, artifact: Option<PathBuf>) -> Self {
        Self {
            run_id: run_id.into(),
            succeeded: run.completed as usize,
            failed: run.failed as usize,
            best: Vec::new(),
            artifact,
            halt_reason: Some(run.halt_reason),
        }
    }

    /// One-line rendering for logs and plain-text channels.
    pub fn headline(&self) -> String {
        let mut line = format!("{}: {} ok, {} failed", self.run_id, self.succeeded, self.failed);
        for b in &self.best {
            line.push_str(&format!(
                "; best {} equity={:.2} dd={:.2}% trades={}",
                b.mode,
                b.final_equity,
                b.max_dd * 100.0,
                b.trades
            ));
        }
        if let Some(reason) = self.halt_reason {
            line.push_str(&format!("; halted: {}", reason.as_str()));
        }
        line
    }
}

pub trait Notifier {
    fn notify(&self, summary: &NotificationSummary) -> anyhow::Result<()>;
}

/// Writes the summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &NotificationSummary) -> anyhow::Result<()> {
        info!(summary = %summary.headline(), "run summary");
        Ok(())
    }
}

/// Send `summary` to every notifier, logging and swallowing failures.
///
/// Returns how many notifiers accepted it.
pub fn deliver(notifiers: &[&dyn Notifier], summary: &NotificationSummary) -> usize {
    let mut delivered = 0;
    for n in notifiers {
        match n.notify(summary) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(error = %e, run_id = %summary.run_id, "notification failed"),
        }
    }
    delivered
}

//! Backlog sources besides backtest results: code markers and JUnit reports.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;
use walkdir::WalkDir;

use crate::tasks::TaskFileError;

/// File extensions searched for markers. Markdown is left out because the
/// backlog itself is Markdown.
pub const MARKER_EXTENSIONS: &[&str] = &["rs", "toml", "py", "sh", "yml", "yaml"];

const SKIP_DIRS: &[&str] = &["target", ".git", "node_modules"];

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(TODO|FIXME|NOTE):\s*(.+)").unwrap())
}

fn testcase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<testcase\b([^>]*?)(?:/>|>(.*?)</testcase>)").unwrap())
}

fn outcome_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(failure|error)\b([^>]*?)/?>").unwrap())
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

/// A `TODO:`, `FIXME:` or `NOTE:` comment found in the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMarker {
    /// Path relative to the scanned root, `/`-separated.
    pub path: String,
    /// 1-based.
    pub line: usize,
    /// Upper-cased marker word.
    pub tag: String,
    pub text: String,
}

impl CodeMarker {
    pub fn task_text(&self) -> String {
        format!("{}: {} ({}:{})", self.tag, self.text, self.path, self.line)
    }
}

/// Every marker under `root`, in path order then line order.
///
/// Unreadable entries are logged and skipped; invalid UTF-8 is replaced.
pub fn scan_code_markers(root: &Path) -> Vec<CodeMarker> {
    let mut markers = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || !(e.file_type().is_dir() && SKIP_DIRS.contains(&&*name))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let wanted = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MARKER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !wanted {
            continue;
        }
        let bytes = match fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        for (i, line) in String::from_utf8_lossy(&bytes).lines().enumerate() {
            if let Some(caps) = marker_re().captures(line) {
                let text = caps[2].trim();
                if text.is_empty() {
                    continue;
                }
                markers.push(CodeMarker {
                    path: rel.clone(),
                    line: i + 1,
                    tag: caps[1].to_ascii_uppercase(),
                    text: text.to_string(),
                });
            }
        }
    }
    markers
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Error,
    Failure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Error => "error",
            FailureKind::Failure => "failure",
        })
    }
}

/// A failing or erroring test case from a JUnit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub kind: FailureKind,
    /// `classname.name`
    pub test: String,
    pub message: String,
}

impl TestFailure {
    pub fn task_text(&self) -> String {
        format!("Fix test {} in {}: {}", self.kind, self.test, self.message)
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn attr(attrs: &str, name: &str) -> Option<String> {
    attr_re()
        .captures_iter(attrs)
        .find(|c| &c[1] == name)
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| unescape(m.as_str()))
}

/// Errors and failures of every `<testcase>` in a JUnit XML document.
///
/// A case with both an `<error>` and a `<failure>` yields both, error first.
pub fn junit_failures(xml: &str) -> Vec<TestFailure> {
    let mut failures = Vec::new();
    for case in testcase_re().captures_iter(xml) {
        let attrs = &case[1];
        let Some(body) = case.get(2) else {
            continue;
        };
        let test = format!(
            "{}.{}",
            attr(attrs, "classname").unwrap_or_else(|| "unknown".into()),
            attr(attrs, "name").unwrap_or_else(|| "unknown".into())
        );
        for kind in [FailureKind::Error, FailureKind::Failure] {
            let found = outcome_re()
                .captures_iter(body.as_str())
                .find(|c| &c[1] == kind.to_string().as_str());
            if let Some(outcome) = found {
                failures.push(TestFailure {
                    kind,
                    test: test.clone(),
                    message: attr(&outcome[2], "message").unwrap_or_else(|| kind.to_string()),
                });
            }
        }
    }
    failures
}

/// Read a JUnit report. A missing file has no failures.
pub fn load_junit(path: &Path) -> Result<Vec<TestFailure>, TaskFileError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let xml = fs::read_to_string(path).map_err(|source| TaskFileError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(junit_failures(&xml))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuites>
  <testsuite name="runner" tests="4">
    <testcase classname="sweep" name="covers_grid" time="0.01"/>
    <testcase classname="aggregate" name="ranks &amp; dedups" time="0.02">
      <failure message="left: 3, right: 4" type="assert">backtrace</failure>
    </testcase>
    <testcase classname='loader' name='falls_back'>
      <error message="panicked at &quot;io&quot;"/>
      <failure/>
    </testcase>
    <testcase classname="tasks" name="parses"></testcase>
  </testsuite>
</testsuites>
"#;

    #[test]
    fn junit_failures_in_document_order() {
        let failures = junit_failures(REPORT);
        assert_eq!(
            failures,
            vec![
                TestFailure {
                    kind: FailureKind::Failure,
                    test: "aggregate.ranks & dedups".into(),
                    message: "left: 3, right: 4".into(),
                },
                TestFailure {
                    kind: FailureKind::Error,
                    test: "loader.falls_back".into(),
                    message: "panicked at \"io\"".into(),
                },
                TestFailure {
                    kind: FailureKind::Failure,
                    test: "loader.falls_back".into(),
                    message: "failure".into(),
                },
            ]
        );
        assert_eq!(
            failures[0].task_text(),
            "Fix test failure in aggregate.ranks & dedups: left: 3, right: 4"
        );
    }

    #[test]
    fn missing_report_has_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_junit(&dir.path().join("junit.xml")).unwrap().is_empty());

        let path = dir.path().join("report.xml");
        fs::write(&path, REPORT).unwrap();
        assert_eq!(load_junit(&path).unwrap().len(), 3);
    }

    #[test]
    fn scan_finds_markers_and_skips_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(
            root.join("src/lib.rs"),
            "fn a() {}\n// TODO: cache the window sums\n// fixme: handle gaps\n// TODO:\n",
        )
        .unwrap();
        fs::write(root.join("Cargo.toml"), "# NOTE: pin rayon\n").unwrap();
        fs::write(root.join("README.md"), "TODO: ignored\n").unwrap();
        fs::write(root.join("target/debug/gen.rs"), "// TODO: build output\n").unwrap();

        let markers = scan_code_markers(root);
        let found: Vec<(String, usize, String)> = markers
            .iter()
            .map(|m| (m.path.clone(), m.line, m.tag.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("Cargo.toml".to_string(), 1, "NOTE".to_string()),
                ("src/lib.rs".to_string(), 2, "TODO".to_string()),
                ("src/lib.rs".to_string(), 3, "FIXME".to_string()),
            ]
        );
        assert_eq!(
            markers[1].task_text(),
            "TODO: cache the window sums (src/lib.rs:2)"
        );
    }
}

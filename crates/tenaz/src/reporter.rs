//! Reporter - Combined Report Sink
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  ReportSink (one per run)                                        │
//! │                                                                  │
//! │   ReportNode "register"   ReportNode "login"   ReportNode ...    │
//! │    ├─ INFO  ...            ├─ PASS ...                           │
//! │    ├─ FAIL  ... [png][txt] └─ ...                                │
//! │    └─ ...                                                        │
//! │                                                                  │
//! │   write() ──► TestReport.html  (+ optional JUnit XML)            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nodes are shared handles: the sink keeps one for rendering and the owning
//! test thread keeps one for appending. Each node guards its own event list,
//! so threads appending to different nodes never contend.

use crate::event::{ArtifactKind, EventKind, ReportEvent, TestStatus};
use crate::result::TenazResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Default combined report location
pub const DEFAULT_REPORT_PATH: &str = "reports/TestReport.html";

/// Default report heading
pub const DEFAULT_REPORT_TITLE: &str = "Functional Test Execution Report";

/// Shared handle to a report node
pub type NodeHandle = Arc<ReportNode>;

// ============================================================================
// ReportNode
// ============================================================================

/// Per-test event log
#[derive(Debug)]
pub struct ReportNode {
    id: Uuid,
    name: String,
    description: Option<String>,
    thread: String,
    started_at: DateTime<Utc>,
    events: Mutex<Vec<ReportEvent>>,
}

impl ReportNode {
    /// Create an empty node owned by the calling thread
    #[must_use]
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let current = std::thread::current();
        let thread = current
            .name()
            .map_or_else(|| format!("{:?}", current.id()), str::to_string);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.filter(|d| !d.is_empty()),
            thread,
            started_at: Utc::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Node id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Test name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Test description, if any
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Name of the thread that created the node
    #[must_use]
    pub fn thread(&self) -> &str {
        &self.thread
    }

    /// Creation time
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Append an event; order of appends is the order shown
    pub fn append(&self, event: ReportEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of the events so far
    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }

    /// Number of events so far
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Status derived from the events so far
    #[must_use]
    pub fn status(&self) -> TestStatus {
        TestStatus::from_events(&self.events.lock())
    }

    /// Time from creation to the last event
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.events
            .lock()
            .last()
            .map_or_else(chrono::Duration::zero, |e| e.timestamp - self.started_at)
    }
}

// ============================================================================
// ReportSettings
// ============================================================================

/// Where and how the combined report is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    /// Heading shown on the report
    pub title: String,
    /// Combined HTML report path
    pub path: PathBuf,
    /// Optional JUnit XML path
    pub junit_path: Option<PathBuf>,
    /// Environment rows shown in the header table
    pub system_info: BTreeMap<String, String>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title: DEFAULT_REPORT_TITLE.to_string(),
            path: PathBuf::from(DEFAULT_REPORT_PATH),
            junit_path: None,
            system_info: BTreeMap::new(),
        }
    }
}

impl ReportSettings {
    /// Settings writing to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set report heading
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Also write JUnit XML
    #[must_use]
    pub fn with_junit(mut self, path: impl Into<PathBuf>) -> Self {
        self.junit_path = Some(path.into());
        self
    }

    /// Add an environment row
    #[must_use]
    pub fn with_system_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_info.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// ReportSink
// ============================================================================

/// Collects report nodes and renders the combined report
#[derive(Debug)]
pub struct ReportSink {
    settings: ReportSettings,
    nodes: Vec<NodeHandle>,
    created_at: DateTime<Utc>,
}

impl ReportSink {
    /// Create an empty sink; nothing is written until [`ReportSink::write`]
    #[must_use]
    pub fn new(settings: ReportSettings) -> Self {
        Self {
            settings,
            nodes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Report settings
    #[must_use]
    pub const fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    /// Register a new node and hand back the shared handle
    pub fn create_node(&mut self, name: &str, description: Option<String>) -> NodeHandle {
        let node = Arc::new(ReportNode::new(name, description));
        self.nodes.push(Arc::clone(&node));
        node
    }

    /// Nodes in creation order
    #[must_use]
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    fn count(&self, status: TestStatus) -> usize {
        self.nodes.iter().filter(|n| n.status() == status).count()
    }

    /// Number of passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(TestStatus::Passed)
    }

    /// Number of failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(TestStatus::Failed)
    }

    /// Number of skipped tests
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skipped)
    }

    /// Get total test count
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.nodes.len()
    }

    /// Write the HTML report and, if configured, the JUnit file.
    ///
    /// Returns the HTML report path.
    pub fn write(&self) -> TenazResult<PathBuf> {
        write_creating_parent(&self.settings.path, &self.render_html())?;
        if let Some(junit) = &self.settings.junit_path {
            write_creating_parent(junit, &self.render_junit())?;
        }
        Ok(self.settings.path.clone())
    }

    /// Machine-readable run summary
    #[must_use]
    pub fn summary_json(&self) -> serde_json::Value {
        let tests: Vec<_> = self
            .nodes
            .iter()
            .map(|node| {
                serde_json::json!({
                    "name": node.name(),
                    "description": node.description(),
                    "status": node.status().as_str(),
                    "events": node.event_count(),
                    "started_at": node.started_at().to_rfc3339(),
                })
            })
            .collect();
        serde_json::json!({
            "title": self.settings.title,
            "generated_at": Utc::now().to_rfc3339(),
            "total": self.total_count(),
            "passed": self.passed_count(),
            "failed": self.failed_count(),
            "skipped": self.skipped_count(),
            "tests": tests,
        })
    }

    /// Render HTML report content
    #[must_use]
    pub fn render_html(&self) -> String {
        let title = escape_xml(&self.settings.title);
        let mut html = String::new();

        html.push_str(&format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; }}
        .summary {{ background: #f5f5f5; padding: 20px; border-radius: 8px; margin-bottom: 20px; }}
        .test {{ padding: 10px; margin: 10px 0; border-radius: 4px; }}
        .test.passed {{ background: #e8f5e9; border-left: 4px solid #4caf50; }}
        .test.failed {{ background: #ffebee; border-left: 4px solid #f44336; }}
        .test.skipped {{ background: #fff3e0; border-left: 4px solid #ff9800; }}
        .event {{ margin: 4px 0; }}
        .badge {{ display: inline-block; min-width: 3em; font-weight: bold; }}
        .badge.fail {{ color: #d32f2f; }}
        .badge.pass {{ color: #388e3c; }}
        .badge.warn, .badge.skip {{ color: #f57c00; }}
        pre {{ font-family: monospace; white-space: pre-wrap; margin: 4px 0 4px 3em; }}
        img.shot {{ max-width: 480px; border: 1px solid #ddd; display: block; margin: 4px 0 4px 3em; }}
    </style>
</head>
<body>
<div class="summary">
    <h1>{title}</h1>
    <h2>Results: {passed}/{total} passed, {failed} failed, {skipped} skipped</h2>
    <p>Started: {started}</p>
"#,
            passed = self.passed_count(),
            total = self.total_count(),
            failed = self.failed_count(),
            skipped = self.skipped_count(),
            started = self.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        ));

        if !self.settings.system_info.is_empty() {
            html.push_str("    <table>\n");
            for (key, value) in &self.settings.system_info {
                html.push_str(&format!(
                    "        <tr><th>{}</th><td>{}</td></tr>\n",
                    escape_xml(key),
                    escape_xml(value)
                ));
            }
            html.push_str("    </table>\n");
        }
        html.push_str("</div>\n");

        let report_dir = self.settings.path.parent().unwrap_or_else(|| Path::new(""));
        for node in &self.nodes {
            let status = node.status();
            html.push_str(&format!(
                "<div class=\"test {}\">\n    <h3>{} <small>({})</small></h3>\n",
                status.as_str(),
                escape_xml(node.name()),
                status.as_str()
            ));
            if let Some(description) = node.description() {
                html.push_str(&format!("    <p>{}</p>\n", escape_xml(description)));
            }
            for event in node.events() {
                render_event(&mut html, &event, report_dir);
            }
            html.push_str("</div>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    /// Render JUnit XML content
    #[must_use]
    pub fn render_junit(&self) -> String {
        let mut xml = String::new();

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<testsuite name="{}" tests="{}" failures="{}" skipped="{}">"#,
            escape_xml(&self.settings.title),
            self.total_count(),
            self.failed_count(),
            self.skipped_count()
        ));
        xml.push('\n');

        for node in &self.nodes {
            xml.push_str(&format!(
                r#"  <testcase name="{}" time="{:.3}">"#,
                escape_xml(node.name()),
                node.elapsed().num_milliseconds() as f64 / 1000.0
            ));
            xml.push('\n');

            let events = node.events();
            match node.status() {
                TestStatus::Failed => {
                    let body: Vec<&str> = events
                        .iter()
                        .filter(|e| e.kind == EventKind::Fail)
                        .map(|e| e.message.as_str())
                        .collect();
                    let first = body
                        .first()
                        .and_then(|m| m.lines().next())
                        .unwrap_or_default();
                    xml.push_str(&format!(
                        r#"    <failure message="{}">{}</failure>"#,
                        escape_xml(first),
                        escape_xml(&body.join("\n"))
                    ));
                    xml.push('\n');
                }
                TestStatus::Skipped => {
                    let reason = events
                        .iter()
                        .find(|e| e.kind == EventKind::Skip)
                        .map(|e| e.message.as_str())
                        .unwrap_or_default();
                    xml.push_str(&format!(
                        r#"    <skipped message="{}"/>"#,
                        escape_xml(reason)
                    ));
                    xml.push('\n');
                }
                TestStatus::Passed => {}
            }

            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }
}

fn render_event(html: &mut String, event: &ReportEvent, report_dir: &Path) {
    let mut lines = event.message.lines();
    let headline = lines.next().unwrap_or_default();
    html.push_str(&format!(
        "    <div class=\"event\"><span class=\"badge {}\">{}</span> {} <small>{}</small>\n",
        event.kind.css_class(),
        event.kind,
        escape_xml(headline),
        event.timestamp.format("%H:%M:%S%.3f")
    ));
    let rest: Vec<&str> = lines.collect();
    if !rest.is_empty() {
        html.push_str(&format!("    <pre>{}</pre>\n", escape_xml(&rest.join("\n"))));
    }
    for artifact in &event.artifacts {
        let href = escape_xml(&link_target(&artifact.path, report_dir));
        match artifact.kind {
            ArtifactKind::Image => html.push_str(&format!(
                "    <a href=\"{href}\"><img class=\"shot\" src=\"{href}\" alt=\"{}\"></a>\n",
                escape_xml(&artifact.file_name())
            )),
            ArtifactKind::Text => html.push_str(&format!(
                "    <pre><a href=\"{href}\">{}</a></pre>\n",
                escape_xml(&artifact.file_name())
            )),
        }
    }
    html.push_str("    </div>\n");
}

/// Artifact path relative to the report when it lives below it
fn link_target(path: &Path, report_dir: &Path) -> String {
    path.strip_prefix(report_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn write_creating_parent(path: &Path, contents: &str) -> TenazResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::Artifact;
    use tempfile::TempDir;

    mod node_tests {
        use super::*;

        #[test]
        fn test_events_keep_emission_order() {
            let node = ReportNode::new("register", Some("new account".into()));
            node.append(ReportEvent::new(EventKind::Info, "open page"));
            node.append(ReportEvent::new(EventKind::Pass, "submitted"));
            let kinds: Vec<_> = node.events().iter().map(|e| e.kind).collect();
            assert_eq!(kinds, vec![EventKind::Info, EventKind::Pass]);
            assert_eq!(node.status(), TestStatus::Passed);
        }

        #[test]
        fn test_empty_description_dropped() {
            let node = ReportNode::new("login", Some(String::new()));
            assert!(node.description().is_none());
        }
    }

    mod render_tests {
        use super::*;

        fn sink_with_results(dir: &Path) -> ReportSink {
            let settings = ReportSettings::new(dir.join("TestReport.html"))
                .with_title("Shop <QA>")
                .with_system_info("Browser", "chrome");
            let mut sink = ReportSink::new(settings);

            let ok = sink.create_node("login", None);
            ok.append(ReportEvent::new(EventKind::Pass, "Test passed"));

            let bad = sink.create_node("register", Some("fills the form".into()));
            bad.append(
                ReportEvent::new(EventKind::Fail, "Timed out <waiting>\nat step 3")
                    .with_artifact(Artifact::image(dir.join("screenshots/register_1.png"))),
            );

            let skipped = sink.create_node("guest checkout", None);
            skipped.append(ReportEvent::new(EventKind::Skip, "no test data"));
            sink
        }

        #[test]
        fn test_counts() {
            let tmp = TempDir::new().unwrap();
            let sink = sink_with_results(tmp.path());
            assert_eq!(sink.total_count(), 3);
            assert_eq!(sink.passed_count(), 1);
            assert_eq!(sink.failed_count(), 1);
            assert_eq!(sink.skipped_count(), 1);
        }

        #[test]
        fn test_html_escapes_and_links_relative() {
            let tmp = TempDir::new().unwrap();
            let html = sink_with_results(tmp.path()).render_html();
            assert!(html.contains("Shop &lt;QA&gt;"));
            assert!(html.contains("Timed out &lt;waiting&gt;"));
            assert!(html.contains("<pre>at step 3</pre>"));
            assert!(html.contains("src=\"screenshots/register_1.png\""));
            assert!(html.contains("<th>Browser</th><td>chrome</td>"));
            assert!(!html.contains("<waiting>"));
        }

        #[test]
        fn test_junit_marks_failures_and_skips() {
            let tmp = TempDir::new().unwrap();
            let xml = sink_with_results(tmp.path()).render_junit();
            assert!(xml.contains(r#"tests="3" failures="1" skipped="1""#));
            assert!(xml.contains(r#"<failure message="Timed out &lt;waiting&gt;">"#));
            assert!(xml.contains(r#"<skipped message="no test data"/>"#));
        }

        #[test]
        fn test_summary_json() {
            let tmp = TempDir::new().unwrap();
            let summary = sink_with_results(tmp.path()).summary_json();
            assert_eq!(summary["total"], 3);
            assert_eq!(summary["failed"], 1);
            assert_eq!(summary["tests"][1]["status"], "failed");
        }

        #[test]
        fn test_write_creates_directories() {
            let tmp = TempDir::new().unwrap();
            let settings = ReportSettings::new(tmp.path().join("out/run/TestReport.html"))
                .with_junit(tmp.path().join("out/junit.xml"));
            let mut sink = ReportSink::new(settings);
            sink.create_node("t", None);

            let path = sink.write().unwrap();
            assert!(path.exists());
            assert!(tmp.path().join("out/junit.xml").exists());
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }
}

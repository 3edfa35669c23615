//! Human-readable result stream.
//!
//! Every section is rendered to a string first and written with a single
//! `write_all`, so concurrent pod runs never interleave partial lines.

use crate::engine::{CheckOutcome, PlanOutcome, PodOutcome, TargetOutcome};
use crate::errors::RunnerError;
use crate::plan::{TestPlan, TestTarget};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Writes report sections to an output stream.
pub struct Reporter {
    out: Box<dyn Write + Send>,
}

impl Reporter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn plan_header(&mut self, plan: &TestPlan) {
        let mut block = format!("Test plan: {}\n", display_or(&plan.name, "(unnamed)"));
        if !plan.description.is_empty() {
            let _ = writeln!(block, "  {}", plan.description);
        }
        self.emit(&block);
    }

    pub fn target_header(&mut self, target: &TestTarget, ready_pods: usize, selected_pods: usize) {
        let mut block = target_preamble(target);
        let _ = writeln!(
            block,
            "  Ready pods: {ready_pods} (selected: {selected_pods})"
        );
        self.emit(&block);
    }

    pub fn target_error(&mut self, target: &TestTarget, error: &RunnerError) {
        let mut block = target_preamble(target);
        let _ = writeln!(block, "  Result: ERROR [{}] {error}", error.code());
        self.emit(&block);
    }

    pub fn pod(&mut self, outcome: &PodOutcome) {
        let mut block = format!("\n  Pod: {}\n", outcome.pod);
        for check in &outcome.checks {
            render_check(&mut block, check, "    ");
        }
        self.emit(&block);
    }

    /// A single check outside of a plan.
    pub fn check(&mut self, pod: &str, check: &CheckOutcome) {
        let mut block = format!("Pod: {pod}\n");
        render_check(&mut block, check, "");
        self.emit(&block);
    }

    pub fn summary(&mut self, outcome: &PlanOutcome) {
        let counts = outcome.counts();
        let block = format!(
            "\nSummary: {} passed, {} failed, {} errored\nOverall: {}\n",
            counts.passed,
            counts.failed,
            counts.errored,
            if outcome.passed() { "PASSED" } else { "FAILED" }
        );
        self.emit(&block);
    }

    fn emit(&mut self, block: &str) {
        let result = self
            .out
            .write_all(block.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(e) = result {
            warn!(target: "netcheck.runner.report", error = %e, "Failed to write report");
        }
    }
}

fn target_preamble(target: &TestTarget) -> String {
    format!(
        "\nTarget: {}\n  Namespace: {}\n  Selector: {}\n",
        display_or(&target.name, "(unnamed)"),
        display_or(&target.namespace, "(all namespaces)"),
        target.pod_selector
    )
}

fn render_check(block: &mut String, check: &CheckOutcome, indent: &str) {
    let test = &check.test;
    let _ = writeln!(block, "{indent}Check: {}", display_or(&test.name, "(unnamed)"));
    let _ = writeln!(block, "{indent}  Endpoint: {}", test.endpoint);
    let _ = writeln!(block, "{indent}  Type: {}", test.kind);
    let _ = writeln!(block, "{indent}  Expected status: {}", test.status_code);
    let _ = writeln!(block, "{indent}  Expect fail: {}", test.expect_fail);
    let _ = writeln!(
        block,
        "{indent}  Timeout: {}",
        humantime::format_duration(check.timeout)
    );
    let _ = writeln!(block, "{indent}  Probe image: {}", check.image);
    let _ = writeln!(block, "{indent}  Result: {}", check.verdict);
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

/// In-memory report sink that can be read back after the reporter is done.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

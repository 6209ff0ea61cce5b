use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{Instant, sleep};

use crate::config::DeployConfig;
use crate::models::{
    CoverageResult, CoverageWarning, DeployMessage, DeployOutcome, DeployStatus,
    FlowCoverageResult, FlowCoverageWarning, OutcomeKind, TestFailure, TestOutcome,
    TestRunSummary,
};

use super::{DeployClient, DeployRequest};

/// Guard that kills the child process (and its process group on Unix) on
/// drop, so an abandoned status check cannot leave a CLI invocation behind.
struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Process group ID saved at spawn time so the whole group can be killed.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }

    /// Wait for the child to exit normally. A reaped child is disarmed so
    /// the guard has nothing left to kill.
    async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        let child = self.child.as_mut().context("deploy CLI already reaped")?;
        let status = child.wait().await.context("failed to wait for deploy CLI")?;
        self.child = None;
        #[cfg(unix)]
        {
            self.pgid = None;
        }
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Kill the entire process group so node children the CLI forks don't
        // become orphans.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        // Fallback / non-Unix: kill just the direct child.
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Open a debug log file if `VERDICT_DEBUG` env var is set.
type LogFile = std::sync::Arc<std::sync::Mutex<std::fs::File>>;

fn open_log_file() -> Option<LogFile> {
    std::env::var("VERDICT_DEBUG").ok().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .ok()
            .map(|file| std::sync::Arc::new(std::sync::Mutex::new(file)))
    })
}

fn write_log(lf: &LogFile, msg: &str) {
    use std::io::Write;
    if let Ok(mut f) = lf.lock() {
        let _ = writeln!(f, "{}", msg);
    }
}

/// Split the configured CLI override; fall back to `sf` when unset or blank.
fn parse_command(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|raw| shell_words::split(raw).ok())
        .filter(|parts| !parts.is_empty())
        .unwrap_or_else(|| vec!["sf".to_string()])
}

/// Deploy client that shells out to the Salesforce `sf` CLI: one `deploy
/// start --async` submission, then `deploy report` polls until the job is
/// done, with `--json` output parsed into crate models.
pub struct SfCliClient {
    workspace: PathBuf,
    command: Vec<String>,
    poll_interval: Duration,
    wait: Duration,
    log_file: Option<LogFile>,
}

impl SfCliClient {
    pub fn new(workspace: PathBuf, config: &DeployConfig) -> Self {
        Self {
            workspace,
            command: parse_command(config.command.as_deref()),
            poll_interval: config.poll_interval(),
            wait: config.wait(),
            log_file: open_log_file(),
        }
    }

    fn log(&self, msg: &str) {
        if let Some(ref lf) = self.log_file {
            write_log(lf, msg);
        }
    }

    /// Run one CLI invocation to completion and return its raw stdout.
    async fn invoke(&self, args: &[String]) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .args(args)
            .current_dir(&self.workspace)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        self.log(&format!("[cmd] {:?}", cmd.as_std()));

        // Put the child in its own process group so killing it (via
        // ChildGuard) also takes out anything it forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.command[0]))?;
        let mut stdout = child.stdout.take().context("missing stdout")?;
        let mut stderr = child.stderr.take().context("missing stderr")?;
        let mut guard = ChildGuard::new(child);

        // Drain both pipes before waiting so a chatty CLI cannot deadlock on
        // a full pipe.
        let mut out = Vec::new();
        let mut err = Vec::new();
        tokio::try_join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err))
            .context("failed to read deploy CLI output")?;
        let status = guard.wait().await?;

        if !err.is_empty() {
            self.log(&format!("[stderr] {}", String::from_utf8_lossy(&err).trim()));
        }
        self.log(&format!("[stdout] {}", String::from_utf8_lossy(&out).trim()));

        // With --json the CLI reports failures inside the envelope and exits
        // non-zero, so only a silent failure is fatal here.
        if out.is_empty() && !status.success() {
            bail!(
                "{} exited with {} and produced no output: {}",
                self.command[0],
                status,
                String::from_utf8_lossy(&err).trim()
            );
        }
        Ok(out)
    }

    /// Submit the deployment and return the async job id.
    async fn start(&self, request: &DeployRequest) -> Result<String> {
        let mut args: Vec<String> = [
            "project", "deploy", "start", "--json", "--async", "--source-dir",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.push(request.source_dir.clone());
        if let Some(org) = &request.target_org {
            args.push("--target-org".into());
            args.push(org.clone());
        }
        if let Some(level) = &request.test_level {
            args.push("--test-level".into());
            args.push(level.clone());
        }
        for test in &request.run_tests {
            args.push("--tests".into());
            args.push(test.clone());
        }
        if request.dry_run {
            args.push("--dry-run".into());
        }

        let raw = self.invoke(&args).await?;
        let envelope: Envelope =
            serde_json::from_slice(&raw).context("failed to parse deploy submission response")?;
        let Some(result) = envelope.result else {
            bail!("deploy submission rejected: {}", envelope.error_detail());
        };
        let Some(id) = result.id else {
            bail!("deploy submission response carried no job id");
        };
        Ok(id)
    }

    /// Fetch the current deploy report for a job.
    async fn check(&self, id: &str, request: &DeployRequest) -> Result<DeployReportWire> {
        let mut args: Vec<String> = ["project", "deploy", "report", "--json", "--job-id"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(id.to_string());
        if let Some(org) = &request.target_org {
            args.push("--target-org".into());
            args.push(org.clone());
        }

        let raw = self.invoke(&args).await?;
        let envelope: Envelope =
            serde_json::from_slice(&raw).context("failed to parse deploy status response")?;
        match envelope.result {
            Some(result) => Ok(result),
            None => bail!("deploy status check failed: {}", envelope.error_detail()),
        }
    }

    fn log_outcome(&self, outcome: &DeployOutcome) {
        let Some(ref lf) = self.log_file else { return };
        let tests = &outcome.test_result;
        write_log(
            lf,
            &format!(
                "[deploy] {} {} ({} tests run, {} failed)",
                outcome.id, outcome.status, tests.num_tests_run, tests.num_failures
            ),
        );
        for message in outcome.messages.iter().filter(|message| !message.success) {
            write_log(
                lf,
                &format!(
                    "[component] {}{}: {}",
                    message.file_name,
                    message.location_qualifier().unwrap_or_default(),
                    message.problem.as_deref().unwrap_or("")
                ),
            );
        }
    }
}

#[async_trait]
impl DeployClient for SfCliClient {
    async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        let id = self.start(request).await?;
        self.log(&format!("[deploy] submitted job {}", id));

        let deadline = Instant::now() + self.wait;
        loop {
            let report = self.check(&id, request).await?;
            let status = parse_status(report.status.as_deref());
            if report.done || status.is_done() {
                let outcome = report.into_outcome(&id);
                self.log_outcome(&outcome);
                return Ok(outcome);
            }
            if Instant::now() >= deadline {
                bail!(
                    "deployment {} did not finish within {} seconds (last status: {})",
                    id,
                    self.wait.as_secs(),
                    status
                );
            }
            sleep(self.poll_interval).await;
        }
    }

    fn name(&self) -> &str {
        "sf CLI"
    }
}

// --- JSON deserialization types (camelCase, SOAP-shaped) ---

/// Top-level envelope every `--json` invocation prints.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: i32,
    #[serde(default)]
    result: Option<DeployReportWire>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl Envelope {
    /// Human detail for a rejected invocation.
    fn error_detail(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("status {}", self.status))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeployReportWire {
    id: Option<String>,
    status: Option<String>,
    success: bool,
    done: bool,
    details: DetailsWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DetailsWire {
    component_successes: Vec<DeployMessageWire>,
    component_failures: Vec<DeployMessageWire>,
    run_test_result: Option<RunTestResultWire>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeployMessageWire {
    file_name: String,
    full_name: String,
    success: bool,
    problem: Option<String>,
    line_number: Option<u32>,
    column_number: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunTestResultWire {
    successes: Vec<TestSuccessWire>,
    failures: Vec<TestFailureWire>,
    code_coverage: Vec<CoverageResultWire>,
    code_coverage_warnings: Vec<CoverageWarningWire>,
    flow_coverage: Vec<FlowCoverageResultWire>,
    flow_coverage_warnings: Vec<FlowCoverageWarningWire>,
    num_tests_run: u32,
    num_failures: u32,
    total_time: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TestSuccessWire {
    namespace: Option<String>,
    name: String,
    method_name: String,
    time: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TestFailureWire {
    namespace: Option<String>,
    name: String,
    method_name: String,
    time: f64,
    #[serde(rename = "type")]
    failure_type: String,
    message: String,
    stack_trace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CoverageResultWire {
    name: String,
    num_locations: u32,
    num_locations_not_covered: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CoverageWarningWire {
    namespace: Option<String>,
    name: Option<String>,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FlowCoverageResultWire {
    flow_name: String,
    flow_namespace: Option<String>,
    num_elements: u32,
    num_elements_not_covered: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FlowCoverageWarningWire {
    flow_namespace: Option<String>,
    flow_name: Option<String>,
    message: String,
}

/// The wire reports absent namespaces as empty strings.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn parse_status(raw: Option<&str>) -> DeployStatus {
    match raw {
        Some("Pending") | Some("Queued") => DeployStatus::Pending,
        Some("Succeeded") => DeployStatus::Succeeded,
        Some("SucceededPartial") => DeployStatus::SucceededPartial,
        Some("Failed") => DeployStatus::Failed,
        Some("Canceling") => DeployStatus::Canceling,
        Some("Canceled") => DeployStatus::Canceled,
        _ => DeployStatus::InProgress,
    }
}

impl DeployReportWire {
    fn into_outcome(self, fallback_id: &str) -> DeployOutcome {
        let status = parse_status(self.status.as_deref());
        let mut messages = Vec::new();
        messages.extend(self.details.component_successes.into_iter().map(DeployMessageWire::into_message));
        messages.extend(self.details.component_failures.into_iter().map(DeployMessageWire::into_message));
        DeployOutcome {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            status,
            success: self.success,
            messages,
            test_result: self
                .details
                .run_test_result
                .map(RunTestResultWire::into_summary)
                .unwrap_or_default(),
        }
    }
}

impl DeployMessageWire {
    fn into_message(self) -> DeployMessage {
        DeployMessage {
            file_name: self.file_name,
            full_name: self.full_name,
            success: self.success,
            problem: self.problem,
            line_number: self.line_number,
            column_number: self.column_number,
        }
    }
}

impl RunTestResultWire {
    fn into_summary(self) -> TestRunSummary {
        let mut outcomes = Vec::with_capacity(self.successes.len() + self.failures.len());
        outcomes.extend(self.successes.into_iter().map(TestSuccessWire::into_outcome));
        outcomes.extend(self.failures.into_iter().map(TestFailureWire::into_outcome));
        TestRunSummary {
            outcomes,
            coverage: self
                .code_coverage
                .into_iter()
                .map(|wire| CoverageResult {
                    name: wire.name,
                    num_locations: wire.num_locations,
                    num_locations_not_covered: wire.num_locations_not_covered,
                })
                .collect(),
            coverage_warnings: self
                .code_coverage_warnings
                .into_iter()
                .map(|wire| CoverageWarning {
                    namespace: non_empty(wire.namespace),
                    name: non_empty(wire.name),
                    message: wire.message,
                })
                .collect(),
            flow_coverage: self
                .flow_coverage
                .into_iter()
                .map(|wire| FlowCoverageResult {
                    flow_name: wire.flow_name,
                    flow_namespace: non_empty(wire.flow_namespace),
                    num_elements: wire.num_elements,
                    num_elements_not_covered: wire.num_elements_not_covered,
                })
                .collect(),
            flow_coverage_warnings: self
                .flow_coverage_warnings
                .into_iter()
                .map(|wire| FlowCoverageWarning {
                    flow_namespace: non_empty(wire.flow_namespace),
                    flow_name: non_empty(wire.flow_name),
                    message: wire.message,
                })
                .collect(),
            num_tests_run: self.num_tests_run,
            num_failures: self.num_failures,
            total_time_ms: self.total_time,
        }
    }
}

impl TestSuccessWire {
    fn into_outcome(self) -> TestOutcome {
        TestOutcome {
            namespace: non_empty(self.namespace),
            class_name: self.name,
            method_name: self.method_name,
            time_ms: self.time,
            kind: OutcomeKind::Passed,
        }
    }
}

impl TestFailureWire {
    fn into_outcome(self) -> TestOutcome {
        TestOutcome {
            namespace: non_empty(self.namespace),
            class_name: self.name,
            method_name: self.method_name,
            time_ms: self.time,
            kind: OutcomeKind::Failed(TestFailure {
                failure_type: self.failure_type,
                message: self.message,
                stack_trace: self.stack_trace.filter(|trace| !trace.is_empty()),
            }),
        }
    }
}

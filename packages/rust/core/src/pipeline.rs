//! End-to-end notification pipeline.
//!
//! Control flows strictly downward: each stage's output is the next stage's
//! input, and every "nothing to do" result short-circuits into a terminal
//! [`RunOutcome`] instead of an error. Stage failures are caught at the top
//! of the pipeline and folded into the outcome as well, so one run always
//! produces exactly one report and never panics across this boundary.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use buildwatch_ci::CiClient;
use buildwatch_logs::LogClient;
use buildwatch_notify::Mailer;
use buildwatch_shared::{
    AppConfig, AttachmentSpec, BodyMode, BuildId, BuildwatchError, Notification, Result,
};

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// Terminal outcome of one pipeline run.
///
/// Surfaced both as a machine-readable `outcome=` line and as the process
/// exit code, so a cron wrapper can tell "no failed build" from "the CI
/// service was unreachable".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A failure notification was delivered.
    Sent,
    /// Dry run: the report was written, the send stage was skipped.
    DryRun,
    /// The project has no builds, or the detail record was missing.
    NoBuild,
    /// The most recent build did not fail; nothing to report.
    NoFailure,
    /// The failed build had no log location, or the window came back empty.
    NoLogs,
    /// A CI-service or log-service call failed.
    FetchError,
    /// The report file could not be written.
    PersistError,
    /// Mail composition or SMTP delivery failed.
    SendError,
}

impl RunOutcome {
    /// Stable snake_case name for the status line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::DryRun => "dry_run",
            Self::NoBuild => "no_build",
            Self::NoFailure => "no_failure",
            Self::NoLogs => "no_logs",
            Self::FetchError => "fetch_error",
            Self::PersistError => "persist_error",
            Self::SendError => "send_error",
        }
    }

    /// Process exit code. Only genuine failures are non-zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Sent | Self::DryRun | Self::NoBuild | Self::NoFailure | Self::NoLogs => 0,
            Self::FetchError => 2,
            Self::PersistError => 3,
            Self::SendError => 4,
        }
    }

    /// Whether this outcome represents a stage failure.
    pub fn is_failure(&self) -> bool {
        self.exit_code() != 0
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Summary of one completed pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// The inspected build, once one was located.
    pub build_id: Option<BuildId>,
    /// Number of log lines in the selected window.
    pub line_count: usize,
    /// Where the report was written, once the persist stage ran.
    pub output_path: Option<PathBuf>,
    /// The stage error behind a failure outcome.
    pub error: Option<String>,
    /// Total duration of the run.
    pub elapsed: Duration,
}

impl RunReport {
    fn short_circuit(outcome: RunOutcome, build_id: Option<BuildId>, start: Instant) -> Self {
        Self {
            outcome,
            build_id,
            line_count: 0,
            output_path: None,
            error: None,
            elapsed: start.elapsed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new stage.
    fn phase(&self, name: &str);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the pipeline once.
///
/// Never returns an error: stage failures are logged and folded into the
/// report's outcome. `dry_run` stops after the persist stage.
#[instrument(skip_all, fields(project = %config.project.name, dry_run))]
pub async fn run<M: Mailer>(
    config: &AppConfig,
    ci: &CiClient,
    logs: &LogClient,
    mailer: &M,
    progress: &dyn ProgressReporter,
    dry_run: bool,
) -> RunReport {
    let start = Instant::now();

    let report = match execute(config, ci, logs, mailer, progress, dry_run, start).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "pipeline stage failed");
            RunReport {
                outcome: outcome_for(&e),
                build_id: None,
                line_count: 0,
                output_path: None,
                error: Some(e.to_string()),
                elapsed: start.elapsed(),
            }
        }
    };

    progress.done(&report);

    info!(
        outcome = %report.outcome,
        lines = report.line_count,
        elapsed_ms = report.elapsed.as_millis(),
        "run complete"
    );

    report
}

/// Map a stage error to its failure outcome.
fn outcome_for(error: &BuildwatchError) -> RunOutcome {
    match error {
        BuildwatchError::CiService(_) | BuildwatchError::LogService(_) => RunOutcome::FetchError,
        BuildwatchError::Report { .. } => RunOutcome::PersistError,
        // Validation inside the pipeline only arises composing the message.
        BuildwatchError::Smtp(_) | BuildwatchError::Validation { .. } => RunOutcome::SendError,
        BuildwatchError::Config { .. } => RunOutcome::FetchError,
    }
}

/// The staged pipeline body. Short-circuit outcomes return `Ok`; stage
/// failures propagate to [`run`] for folding.
async fn execute<M: Mailer>(
    config: &AppConfig,
    ci: &CiClient,
    logs: &LogClient,
    mailer: &M,
    progress: &dyn ProgressReporter,
    dry_run: bool,
    start: Instant,
) -> Result<RunReport> {
    // --- Stage 1: locate the most recent build ---
    progress.phase("Locating latest build");
    let Some(build_id) = ci.latest_build_id(&config.project.name).await? else {
        info!(project = %config.project.name, "no builds found");
        return Ok(RunReport::short_circuit(RunOutcome::NoBuild, None, start));
    };

    // --- Stage 2: inspect it ---
    progress.phase("Inspecting build");
    let Some(detail) = ci.build_detail(&build_id).await? else {
        warn!(%build_id, "build detail not returned");
        return Ok(RunReport::short_circuit(
            RunOutcome::NoBuild,
            Some(build_id),
            start,
        ));
    };

    if !detail.build_status.is_failed() {
        info!(%build_id, status = %detail.build_status, "latest build did not fail");
        return Ok(RunReport::short_circuit(
            RunOutcome::NoFailure,
            Some(build_id),
            start,
        ));
    }

    let Some(location) = detail.logs else {
        warn!(%build_id, "failed build carries no log location");
        return Ok(RunReport::short_circuit(
            RunOutcome::NoLogs,
            Some(build_id),
            start,
        ));
    };

    // --- Stage 3: fetch the log window ---
    progress.phase("Fetching log window");
    let lines = logs
        .fetch_window(&location.group_name, &location.stream_name, &config.window)
        .await?;

    if lines.is_empty() {
        warn!(%build_id, "no log lines selected");
        return Ok(RunReport::short_circuit(
            RunOutcome::NoLogs,
            Some(build_id),
            start,
        ));
    }

    // --- Stage 4: persist ---
    progress.phase("Writing report");
    let output_path = PathBuf::from(&config.output.path);
    buildwatch_report::persist(
        &lines,
        &output_path,
        config.output.format,
        &config.window.keyword,
    )?;

    if dry_run {
        info!(path = %output_path.display(), "dry run: skipping notification");
        return Ok(RunReport {
            outcome: RunOutcome::DryRun,
            build_id: Some(build_id),
            line_count: lines.len(),
            output_path: Some(output_path),
            error: None,
            elapsed: start.elapsed(),
        });
    }

    // --- Stage 5: notify ---
    progress.phase("Sending notification");
    let notification = compose(config, &lines, &output_path);
    mailer.send(&notification).await?;

    info!(%build_id, "logs saved and email sent");

    Ok(RunReport {
        outcome: RunOutcome::Sent,
        build_id: Some(build_id),
        line_count: lines.len(),
        output_path: Some(output_path),
        error: None,
        elapsed: start.elapsed(),
    })
}

/// Compose the notification for the persisted window.
fn compose(config: &AppConfig, lines: &[String], output_path: &Path) -> Notification {
    let subject = format!("Build Failure Logs for {}", config.project.name);

    match config.email.body {
        BodyMode::Inline => Notification {
            subject,
            sender: config.email.sender.clone(),
            recipient: config.email.recipient.clone(),
            body: lines.join("\n"),
            attachment: None,
        },
        BodyMode::Attach => {
            let filename = output_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "build_logs".to_string());

            Notification {
                subject,
                sender: config.email.sender.clone(),
                recipient: config.email.recipient.clone(),
                body: format!(
                    "Build failure logs for project {} are attached.",
                    config.project.name
                ),
                attachment: Some(AttachmentSpec {
                    path: output_path.to_path_buf(),
                    filename,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use buildwatch_shared::{ReportFormat, WindowPolicy};
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records sent notifications instead of delivering them.
    struct RecordingMailer {
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingMailer {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().expect("lock").clone()
        }
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().expect("lock").push(notification.clone());
            Ok(())
        }
    }

    /// Always fails, like a rejected SMTP login.
    struct FailingMailer;

    impl Mailer for FailingMailer {
        async fn send(&self, _notification: &Notification) -> Result<()> {
            Err(BuildwatchError::Smtp("535 authentication rejected".into()))
        }
    }

    fn test_config(ci: &MockServer, logs: &MockServer, output_path: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.project.name = "node_build_app".into();
        config.service.ci_endpoint = ci.uri();
        config.service.logs_endpoint = logs.uri();
        config.service.max_retries = 0;
        config.window.lines_before = 100;
        config.window.lines_after = 100;
        config.window.policy = WindowPolicy::BeforeAfter;
        config.output.path = output_path.to_string_lossy().into_owned();
        config.output.format = ReportFormat::Plain;
        config.email.sender = "ci-alerts@example.com".into();
        config.email.recipient = "ops@example.com".into();
        config
    }

    fn clients(config: &AppConfig) -> (CiClient, LogClient) {
        let ci = CiClient::new(&config.ci_endpoint(), 5).expect("ci client");
        let logs = LogClient::new(
            &config.logs_endpoint(),
            5,
            config.service.log_limit,
            config.service.max_retries,
        )
        .expect("log client");
        (ci, logs)
    }

    fn temp_output(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("buildwatch-core-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir.join(name)
    }

    async fn mount_list_builds(server: &MockServer, ids: &[&str]) {
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "CodeBuild_20161006.ListBuildsForProject"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ids": ids })),
            )
            .mount(server)
            .await;
    }

    async fn mount_build_detail(server: &MockServer, id: &str, status: &str) {
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "CodeBuild_20161006.BatchGetBuilds"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "builds": [{
                    "id": id,
                    "buildStatus": status,
                    "logs": {"groupName": "/ci/node_build_app", "streamName": id},
                }],
            })))
            .mount(server)
            .await;
    }

    async fn mount_log_events(server: &MockServer, messages: &[String]) {
        let events: Vec<serde_json::Value> = messages
            .iter()
            .enumerate()
            .map(|(i, m)| serde_json::json!({ "timestamp": 1_700_000_000_000i64 + i as i64, "message": m }))
            .collect();

        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "Logs_20140328.GetLogEvents"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "events": events })),
            )
            .mount(server)
            .await;
    }

    fn failing_build_log(len: usize, keyword_at: usize) -> Vec<String> {
        let mut lines: Vec<String> = (0..len).map(|i| format!("line {i}")).collect();
        lines[keyword_at] = "Reason: exit status 1".into();
        lines
    }

    #[tokio::test]
    async fn failed_build_sends_windowed_logs() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3", "b:2", "b:1"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        mount_log_events(&logs_server, &failing_build_log(250, 120)).await;

        let output = temp_output("sent.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::Sent);
        assert_eq!(report.outcome.exit_code(), 0);
        assert_eq!(report.build_id.as_ref().map(|b| b.as_str()), Some("b:3"));
        // Window [20, 220): 100 before, the keyword line, 99 after.
        assert_eq!(report.line_count, 200);

        let persisted = std::fs::read_to_string(&output).expect("persisted");
        let persisted_lines: Vec<&str> = persisted.lines().collect();
        assert_eq!(persisted_lines.len(), 200);
        assert_eq!(persisted_lines[0], "line 20");
        assert_eq!(persisted_lines[100], "Reason: exit status 1");
        assert_eq!(persisted_lines[199], "line 219");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Build Failure Logs for node_build_app");
        let attachment = sent[0].attachment.as_ref().expect("attachment");
        assert_eq!(attachment.filename, "sent.txt");

        let _ = std::fs::remove_file(&output);
    }

    #[tokio::test]
    async fn no_builds_short_circuits_before_log_service() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &[]).await;

        let output = temp_output("no-builds.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::NoBuild);
        assert!(mailer.sent().is_empty());
        assert!(!output.exists());
        // The log service was never contacted.
        assert!(logs_server.received_requests().await.expect("requests").is_empty());
    }

    #[tokio::test]
    async fn succeeded_build_fetches_no_logs_writes_nothing() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:9"]).await;
        mount_build_detail(&ci_server, "b:9", "SUCCEEDED").await;

        let output = temp_output("succeeded.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::NoFailure);
        assert!(mailer.sent().is_empty());
        assert!(!output.exists());
        assert!(logs_server.received_requests().await.expect("requests").is_empty());
    }

    #[tokio::test]
    async fn log_service_failure_is_fetch_error_without_email() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&logs_server)
            .await;

        let output = temp_output("fetch-error.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::FetchError);
        assert_eq!(report.outcome.exit_code(), 2);
        assert!(report.error.as_deref().expect("error").contains("503"));
        assert!(mailer.sent().is_empty());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn keyword_not_found_is_no_logs() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        mount_log_events(
            &logs_server,
            &["all good".to_string(), "still good".to_string()],
        )
        .await;

        let output = temp_output("no-keyword.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::NoLogs);
        assert!(mailer.sent().is_empty());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn dry_run_persists_but_does_not_send() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        mount_log_events(&logs_server, &failing_build_log(10, 5)).await;

        let output = temp_output("dry-run.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, true).await;

        assert_eq!(report.outcome, RunOutcome::DryRun);
        assert!(output.exists());
        assert!(mailer.sent().is_empty());

        let _ = std::fs::remove_file(&output);
    }

    #[tokio::test]
    async fn unwritable_report_path_is_persist_error_and_blocks_send() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        mount_log_events(&logs_server, &failing_build_log(10, 5)).await;

        let mut config = test_config(
            &ci_server,
            &logs_server,
            Path::new("/nonexistent-dir/build_logs.txt"),
        );
        config.output.path = "/nonexistent-dir/build_logs.txt".into();
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::PersistError);
        assert_eq!(report.outcome.exit_code(), 3);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn smtp_rejection_is_send_error() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        mount_log_events(&logs_server, &failing_build_log(10, 5)).await;

        let output = temp_output("send-error.txt");
        let config = test_config(&ci_server, &logs_server, &output);
        let (ci, logs) = clients(&config);

        let report = run(&config, &ci, &logs, &FailingMailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::SendError);
        assert_eq!(report.outcome.exit_code(), 4);
        assert!(report.error.as_deref().expect("error").contains("535"));

        let _ = std::fs::remove_file(&output);
    }

    #[tokio::test]
    async fn inline_body_mode_joins_lines_without_attachment() {
        let ci_server = MockServer::start().await;
        let logs_server = MockServer::start().await;

        mount_list_builds(&ci_server, &["b:3"]).await;
        mount_build_detail(&ci_server, "b:3", "FAILED").await;
        mount_log_events(&logs_server, &failing_build_log(10, 5)).await;

        let output = temp_output("inline.txt");
        let mut config = test_config(&ci_server, &logs_server, &output);
        config.email.body = BodyMode::Inline;
        let (ci, logs) = clients(&config);
        let mailer = RecordingMailer::new();

        let report = run(&config, &ci, &logs, &mailer, &SilentProgress, false).await;

        assert_eq!(report.outcome, RunOutcome::Sent);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].attachment.is_none());
        assert!(sent[0].body.contains("Reason: exit status 1"));
        assert!(sent[0].body.contains("line 4"));

        let _ = std::fs::remove_file(&output);
    }
}

//! Triage flow for one failing run
//!
//! resolve artifact → extract location → build bundle → one remote call →
//! report → (history, apply). Every resolution problem surfaces before the
//! remote call; nothing is retried.

use crate::history::{HistoryEntry, HistoryLog};
use crate::patcher::{replace_line, AppliedPatch};
use crate::render::{build_report, Fix, Report};
use crate::supervisor::ProcessSupervisor;
use deflake_client::{HealRequest, ReportClient};
use deflake_core::config::EvidenceLimits;
use deflake_core::fail_open::fail_open;
use deflake_core::{DeflakeConfig, DeflakeError, Result};
use deflake_triage::{build_bundle, ArtifactResolver, ExtractionContext, LocationExtractor, ResolverConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Raw evidence handed to the flow
#[derive(Debug, Clone, Default)]
pub struct TriageInput {
    pub log: String,
    /// Where the log was read from, if it came from disk
    pub log_path: Option<PathBuf>,
    /// Artifact named by the user; otherwise the resolver decides
    pub artifact: Option<PathBuf>,
}

impl TriageInput {
    /// Input built from a wrapped command's buffered output
    pub fn from_output(output: String) -> Self {
        Self {
            log: output,
            ..Default::default()
        }
    }
}

/// Result of a completed triage
#[derive(Debug, Clone)]
pub struct TriageOutcome {
    pub report: Report,
    pub applied: Option<AppliedPatch>,
    /// Why `--apply` did not modify anything
    pub patch_error: Option<String>,
}

/// Orchestrates resolution, extraction and the remote call
pub struct TriageFlow {
    client: Arc<dyn ReportClient>,
    resolver: ArtifactResolver,
    extractor: LocationExtractor,
    limits: EvidenceLimits,
    history: Option<HistoryLog>,
    apply: bool,
}

impl TriageFlow {
    pub fn new(
        client: Arc<dyn ReportClient>,
        working_dir: &Path,
        config: &DeflakeConfig,
        home_dir: Option<PathBuf>,
    ) -> Self {
        let context = ExtractionContext::new(working_dir)
            .with_home_dir(home_dir)
            .with_dependency_markers(config.dependency_markers.clone());
        let history = config
            .history
            .then(|| HistoryLog::new(DeflakeConfig::history_path(working_dir)));

        Self {
            client,
            resolver: ArtifactResolver::new(working_dir, ResolverConfig::from(&config.artifacts)),
            extractor: LocationExtractor::new(context),
            limits: config.limits.clone(),
            history,
            apply: false,
        }
    }

    /// Patch the source file when a structured fix arrives
    pub fn with_apply(mut self, apply: bool) -> Self {
        self.apply = apply;
        self
    }

    /// Run the whole flow once
    #[instrument(skip_all, fields(endpoint = %self.client.endpoint()))]
    pub async fn run(&self, input: TriageInput) -> Result<TriageOutcome> {
        let artifact = match &input.artifact {
            Some(path) => Some(self.resolver.explicit(path)?),
            None => self.resolver.resolve()?,
        };

        let location = self.extractor.extract(&input.log);
        match &location {
            Some(loc) => info!(
                "Failure located: spec={:?} root_cause={:?}:{:?}",
                loc.spec_file, loc.root_cause_file, loc.root_cause_line
            ),
            None => info!("No failure location found in the log"),
        }

        let bundle = build_bundle(input.log, artifact.as_ref(), location, &self.limits)?;
        let request = HealRequest::from(&bundle);

        info!("Requesting a fix from {}", self.client.endpoint());
        let response = self.client.heal(&request).await?;
        let report = build_report(&response, bundle.location.as_ref());

        let (applied, patch_error) = if self.apply && report.success {
            match apply_fix(&report) {
                Ok(patch) => (Some(patch), None),
                Err(e) => {
                    warn!("Could not apply fix: {}", e);
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        if let (true, Some(history)) = (report.success, &self.history) {
            let mut entry = HistoryEntry::new(response.fix().cloned().unwrap_or(Value::Null));
            entry.log_path = input.log_path;
            entry.artifact_path = bundle.artifact_path.clone();
            entry.spec_file = bundle.location.as_ref().and_then(|l| l.spec_file.clone());
            if applied.is_some() {
                entry.status = "Applied".to_string();
            }
            fail_open("history", || history.append(entry)).await;
        }

        Ok(TriageOutcome {
            report,
            applied,
            patch_error,
        })
    }
}

fn apply_fix(report: &Report) -> Result<AppliedPatch> {
    let (Some(Fix::Structured(fix)), Some(target)) = (&report.fix, &report.fix_target) else {
        return Err(DeflakeError::Patch(
            "the response has no structured fix with a target line".to_string(),
        ));
    };
    let path = target.path.as_ref().ok_or_else(|| {
        DeflakeError::Patch(format!("absolute path of {} is unknown", target.file))
    })?;
    replace_line(path, target.line, &fix.code)
}

/// Build standalone-mode input from `--log` / `--html`
///
/// Without `--log`, the configured fallback log is used if it exists. Log text
/// is the primary evidence: if none can be found the run is a usage error,
/// even when an artifact is available.
pub fn standalone_input(
    working_dir: &Path,
    config: &DeflakeConfig,
    log: Option<&Path>,
    html: Option<&Path>,
) -> Result<TriageInput> {
    let log_path = match log {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => working_dir.join(path),
        None => working_dir.join(&config.artifacts.fallback_log),
    };

    if !log_path.is_file() {
        if log.is_some() {
            return Err(DeflakeError::LogNotFound(log_path));
        }
        let resolver = ArtifactResolver::new(working_dir, ResolverConfig::from(&config.artifacts));
        // A lone trace still counts as evidence on disk
        let artifact_on_disk = html.is_some() || !matches!(resolver.resolve(), Ok(None));
        return Err(if artifact_on_disk {
            DeflakeError::LogNotFound(log_path)
        } else {
            DeflakeError::NoEvidence
        });
    }

    let log_text = std::fs::read_to_string(&log_path)?;
    info!("Read {} bytes of log from {}", log_text.len(), log_path.display());

    Ok(TriageInput {
        log: log_text,
        log_path: Some(log_path),
        artifact: html.map(Path::to_path_buf),
    })
}

/// Result of wrapper mode
#[derive(Debug)]
pub struct WrapOutcome {
    /// The child's exit code, to be propagated unchanged
    pub exit_code: i32,
    /// `None` when the command succeeded and no triage ran
    pub triage: Option<Result<TriageOutcome>>,
}

/// Run a command and triage it if it fails
///
/// `make_flow` is only called for a failing run, so a passing run never
/// needs credentials. Only a spawn failure is returned as an error; triage
/// errors are carried in [`WrapOutcome::triage`].
pub async fn run_wrapped<F>(
    supervisor: &ProcessSupervisor,
    program: &str,
    args: &[String],
    make_flow: F,
) -> Result<WrapOutcome>
where
    F: FnOnce() -> Result<TriageFlow>,
{
    let outcome = supervisor.run(program, args).await?;
    if outcome.success() {
        info!("Command passed; nothing to triage");
        return Ok(WrapOutcome {
            exit_code: 0,
            triage: None,
        });
    }

    warn!("Command failed with exit code {}; starting triage", outcome.exit_code);
    let triage = match make_flow() {
        Ok(flow) => flow.run(TriageInput::from_output(outcome.output)).await,
        Err(e) => Err(e),
    };

    Ok(WrapOutcome {
        exit_code: outcome.exit_code,
        triage: Some(triage),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deflake_client::{HealResponse, MockReportClient};
    use serde_json::json;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn failure_log(root: &Path) -> String {
        format!(
            "  1) [chromium] › tests/login.spec.ts:8:3 › login\n\n\
             Error: locator.click: Timeout 5000ms exceeded.\n\
                 at Page.click ({root}/node_modules/playwright-core/lib/client/page.js:2:2)\n\
                 at LoginPage.submit (pages/login.page.ts:2:16)\n\
                 at {root}/tests/login.spec.ts:14:7\n",
            root = root.display()
        )
    }

    fn flow(root: &Path, mock: &Arc<MockReportClient>) -> TriageFlow {
        let client: Arc<dyn ReportClient> = mock.clone();
        TriageFlow::new(client, root, &DeflakeConfig::default(), None)
    }

    #[tokio::test]
    async fn test_run_sends_one_bounded_request() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("pages/login.page.ts"), "class LoginPage {\n  submit() {}\n}\n");
        write(&root.join("test-results/login/page.html"), "<html>snapshot</html>");

        let mock = Arc::new(MockReportClient::new());
        let outcome = flow(root, &mock)
            .run(TriageInput::from_output(failure_log(root)))
            .await
            .unwrap();

        assert_eq!(mock.calls(), 1);
        let request = &mock.requests()[0];
        assert_eq!(request.html_snapshot, "<html>snapshot</html>");
        assert_eq!(request.failing_line.as_deref(), Some("Line 2"));
        assert!(request.source_code.as_deref().unwrap().contains("LoginPage"));

        assert!(outcome.report.success);
        let location = outcome.report.location.unwrap();
        assert_eq!(location.root_cause_file.as_deref(), Some("login.page.ts"));
        assert!(outcome.applied.is_none());
    }

    #[tokio::test]
    async fn test_binary_trace_only_makes_no_call() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(&root.join("test-results/login/trace.zip"), "PK");

        let mock = Arc::new(MockReportClient::new());
        let err = flow(root, &mock)
            .run(TriageInput::from_output(failure_log(root)))
            .await
            .unwrap_err();

        assert!(matches!(err, DeflakeError::UnsupportedArtifact { .. }));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_sends_empty_snapshot() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockReportClient::new());

        flow(temp.path(), &mock)
            .run(TriageInput::from_output("Error: boom".to_string()))
            .await
            .unwrap();

        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.requests()[0].html_snapshot, "");
        assert_eq!(mock.requests()[0].failing_line, None);
    }

    #[tokio::test]
    async fn test_success_is_recorded_in_history() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let mock = Arc::new(MockReportClient::new());

        flow(root, &mock)
            .run(TriageInput::from_output(failure_log(root)))
            .await
            .unwrap();

        let entries = HistoryLog::new(DeflakeConfig::history_path(root)).load().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, "Suggested");
        assert_eq!(entries[0].spec_file.as_deref(), Some("tests/login.spec.ts"));
        assert!(entries[0].fix.as_str().unwrap().contains("submit-btn"));
    }

    #[tokio::test]
    async fn test_failed_response_is_not_recorded() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockReportClient::with_response(HealResponse::new(
            json!({"status": "error", "detail": "quota"}),
        )));

        let outcome = flow(temp.path(), &mock)
            .run(TriageInput::from_output("Error".to_string()))
            .await
            .unwrap();

        assert!(!outcome.report.success);
        assert!(!DeflakeConfig::history_path(temp.path()).exists());
    }

    #[tokio::test]
    async fn test_apply_patches_root_cause_line() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let page = root.join("pages/login.page.ts");
        write(&page, "class LoginPage {\n  submit() { click('#old') }\n}\n");

        let mock = Arc::new(MockReportClient::with_response(HealResponse::new(json!({
            "status": "success",
            "fix": {"code": "submit() { click('#new') }", "line_number": 2, "reason": "id changed"}
        }))));
        let outcome = flow(root, &mock)
            .with_apply(true)
            .run(TriageInput::from_output(failure_log(root)))
            .await
            .unwrap();

        let applied = outcome.applied.unwrap();
        assert_eq!(applied.path, page);
        assert_eq!(
            std::fs::read_to_string(&page).unwrap(),
            "class LoginPage {\n  submit() { click('#new') }\n}\n"
        );

        let entries = HistoryLog::new(DeflakeConfig::history_path(root)).load().await;
        assert_eq!(entries[0].status, "Applied");
    }

    #[tokio::test]
    async fn test_apply_with_text_fix_reports_error() {
        let temp = TempDir::new().unwrap();
        let mock = Arc::new(MockReportClient::new());

        let outcome = flow(temp.path(), &mock)
            .with_apply(true)
            .run(TriageInput::from_output("Error".to_string()))
            .await
            .unwrap();

        assert!(outcome.applied.is_none());
        assert!(outcome.patch_error.unwrap().contains("no structured fix"));
    }

    #[test]
    fn test_standalone_requires_log() {
        let temp = TempDir::new().unwrap();
        let config = DeflakeConfig::default();

        let err = standalone_input(temp.path(), &config, None, None).unwrap_err();
        assert!(matches!(err, DeflakeError::NoEvidence));

        let err = standalone_input(temp.path(), &config, None, Some(Path::new("page.html"))).unwrap_err();
        assert!(matches!(err, DeflakeError::LogNotFound(_)));

        let err = standalone_input(temp.path(), &config, Some(Path::new("run.log")), None).unwrap_err();
        match err {
            DeflakeError::LogNotFound(path) => assert_eq!(path, temp.path().join("run.log")),
            other => panic!("expected LogNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_standalone_discovers_fallback_log() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("test-results/error.log");
        write(&log, "Error: boom");

        let input = standalone_input(temp.path(), &DeflakeConfig::default(), None, None).unwrap();
        assert_eq!(input.log, "Error: boom");
        assert_eq!(input.log_path, Some(log));
        assert_eq!(input.artifact, None);
    }
}

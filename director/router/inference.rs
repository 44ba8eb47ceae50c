use std::{
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{process::Command, time::timeout};
use tracing::{debug, warn};

use crate::command::DirectiveId;

/// Everything a backend needs to answer one directive.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest {
    /// Directive being planned.
    pub directive: DirectiveId,
    /// Prompt payload built from the retrieved candidates.
    pub payload: Value,
    /// Grammar file constraining the answer.
    pub grammar_path: PathBuf,
}

impl InferenceRequest {
    /// Compact JSON rendering of the payload.
    #[must_use]
    pub fn payload_text(&self) -> String {
        self.payload.to_string()
    }
}

/// Turns a prompt payload and grammar into planner text.
///
/// Backends own their timeout policy. Internal failures should be reported
/// as a JSON error object in the returned text; an `Err` is converted into
/// one by the router.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Produces the raw response for `request`.
    async fn infer(&self, request: &InferenceRequest) -> Result<String>;
}

/// JSON error object in the shape backends report failures with.
#[must_use]
pub fn error_object(error: &str, detail: impl Into<String>) -> String {
    json!({ "error": error, "detail": detail.into() }).to_string()
}

/// Backend answering every request with the same text.
#[derive(Debug, Clone)]
pub struct StaticInference {
    response: String,
}

impl StaticInference {
    /// Creates a backend returning `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl InferenceBackend for StaticInference {
    fn name(&self) -> &str {
        "static"
    }

    async fn infer(&self, _request: &InferenceRequest) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Backend running an external structured-output runner once per request.
///
/// The configured arguments are followed by `--grammar <path> --user
/// <payload>`. Stdout is the response. Launch failures, timeouts and
/// non-zero exits without output are reported as error objects.
#[derive(Debug, Clone)]
pub struct ProcessInference {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessInference {
    /// Runner invoked as `program` with a 60 second timeout.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Arguments placed before the request arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Working directory of the runner.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Upper bound on one runner invocation.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured program.
    #[must_use]
    pub const fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl InferenceBackend for ProcessInference {
    fn name(&self) -> &str {
        "process"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--grammar")
            .arg(&request.grammar_path)
            .arg("--user")
            .arg(request.payload_text())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = %self.program.display(), error = %err, "inference runner failed to launch");
                return Ok(error_object("launch_failed", err.to_string()));
            }
        };

        let start = Instant::now();
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Ok(error_object("runner_failed", err.to_string())),
            Err(_) => {
                warn!(directive = %request.directive, secs = self.timeout.as_secs(), "inference runner timed out");
                return Ok(error_object(
                    "timeout",
                    format!("no response within {}s", self.timeout.as_secs()),
                ));
            }
        };
        debug!(
            directive = %request.directive,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            status = ?output.status.code(),
            "inference runner finished"
        );

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            let detail = if stderr.is_empty() {
                format!("runner exited with {}", output.status)
            } else {
                stderr
            };
            return Ok(error_object("runner_failed", detail));
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_response, DecodeError};

    fn request() -> InferenceRequest {
        InferenceRequest {
            directive: DirectiveId::new(1),
            payload: json!({"user": "hello"}),
            grammar_path: PathBuf::from("/tmp/tool_chooser_1_0.ebnf"),
        }
    }

    #[tokio::test]
    async fn static_backend_echoes_response() {
        let backend = StaticInference::new("{\"commands\":[]}");
        assert_eq!(backend.infer(&request()).await.unwrap(), "{\"commands\":[]}");
    }

    #[tokio::test]
    async fn missing_program_reports_launch_failure() {
        let backend = ProcessInference::new("/definitely/not/a/runner");
        let response = backend.infer(&request()).await.unwrap();
        assert!(matches!(
            decode_response(&response),
            Err(DecodeError::Backend { error, .. }) if error == "launch_failed"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runner_receives_grammar_and_payload() {
        let backend = ProcessInference::new("sh").args(["-c", "printf '%s|%s|%s|%s' \"$1\" \"$2\" \"$3\" \"$4\"", "runner"]);
        let response = backend.infer(&request()).await.unwrap();
        assert_eq!(
            response,
            "--grammar|/tmp/tool_chooser_1_0.ebnf|--user|{\"user\":\"hello\"}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_runner_times_out() {
        let backend = ProcessInference::new("sh")
            .args(["-c", "sleep 5", "runner"])
            .timeout(Duration::from_millis(100));
        let response = backend.infer(&request()).await.unwrap();
        assert!(response.contains("\"error\":\"timeout\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_runner_reports_stderr() {
        let backend = ProcessInference::new("sh").args(["-c", "echo broken >&2; exit 3", "runner"]);
        let response = backend.infer(&request()).await.unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["error"], "runner_failed");
        assert_eq!(value["detail"], "broken");
    }
}

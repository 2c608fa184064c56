//! Agentic variant: a tool-using agent CLI run as a bounded subprocess.
//!
//! The child is spawned with `kill_on_drop`, and on every early exit
//! (timeout, pipe error) it is explicitly killed and waited on, so no agent
//! process outlives its item.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::prompt::agent_prompt;
use super::stream::{decode, AgentTranscript};
use super::{ClassificationOutcome, ClassificationRequest, ClassifierAdapter};
use crate::config::{AgentConfig, OutputProtocol};
use crate::domain::{FailureKind, ItemDiagnostics, Prediction, Variant};
use crate::extract::extract_prediction;

/// Longest stderr excerpt kept in diagnostics.
const STDERR_EXCERPT: usize = 2_000;

/// Classifier backed by an external agent session.
pub struct AgentClassifier {
    config: AgentConfig,
}

impl AgentClassifier {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Argument vector for one session (program excluded).
    pub fn command_args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            prompt.to_string(),
            "--allowedTools".to_string(),
            self.config.allowed_tools.join(","),
            "--output-format".to_string(),
            self.config.protocol.flag_value().to_string(),
            "--model".to_string(),
            self.config.model.clone(),
        ];
        if self.config.protocol == OutputProtocol::StreamJson {
            args.push("--verbose".to_string());
        }
        args
    }

    async fn run_session(&self, prompt: &str) -> Result<SessionOutput, ClassificationOutcome> {
        let start = Instant::now();
        let mut command = Command::new(&self.config.program);
        command
            .args(self.command_args(prompt))
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches only the harness, which
        // lets the item in flight finish before stopping.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| {
                warn!(program = %self.config.program.display(), error = %e, "Failed to spawn agent");
                ClassificationOutcome::failed(
                    FailureKind::TransportError,
                    format!("spawn {}: {e}", self.config.program.display()),
                    start.elapsed().as_millis() as u64,
                )
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let waited = tokio::time::timeout(self.config.timeout(), async {
            let (out, err, status) = tokio::join!(drain(stdout), drain(stderr), child.wait());
            Ok::<_, std::io::Error>((out?, err?, status?))
        })
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match waited {
            Ok(Ok((stdout, stderr, status))) => Ok(SessionOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                status,
                latency_ms,
            }),
            Ok(Err(e)) => {
                reap(&mut child).await;
                Err(ClassificationOutcome::failed(
                    FailureKind::TransportError,
                    format!("agent i/o: {e}"),
                    latency_ms,
                ))
            }
            Err(_) => {
                reap(&mut child).await;
                warn!(timeout_secs = self.config.timeout_secs, "Agent session timed out");
                Err(ClassificationOutcome::failed(
                    FailureKind::Timeout,
                    format!("agent exceeded {}s", self.config.timeout_secs),
                    latency_ms,
                ))
            }
        }
    }
}

struct SessionOutput {
    stdout: String,
    stderr: String,
    status: ExitStatus,
    latency_ms: u64,
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the child and wait for it to exit.
async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill agent process");
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn excerpt(text: &str) -> String {
    text.chars().take(STDERR_EXCERPT).collect()
}

/// Map a decoded session onto the uniform outcome shape.
fn outcome_from_transcript(transcript: AgentTranscript, measured_ms: u64) -> ClassificationOutcome {
    let AgentTranscript { result, trace } = transcript;
    let reasoning = result
        .get("result")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let structured = result
        .get("structured_output")
        .filter(|v| v.is_object())
        .cloned();

    let is_error = result
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let (prediction, error) = if is_error {
        (
            Prediction::Failure(FailureKind::TransportError),
            Some(format!(
                "agent reported an error result: {}",
                result.get("subtype").and_then(Value::as_str).unwrap_or("unknown")
            )),
        )
    } else {
        (extract_prediction(&reasoning, structured.as_ref()), None)
    };

    let diagnostics = ItemDiagnostics {
        latency_ms: Some(
            result
                .get("duration_ms")
                .and_then(Value::as_u64)
                .unwrap_or(measured_ms),
        ),
        cost_usd: result.get("total_cost_usd").and_then(Value::as_f64),
        num_turns: result
            .get("num_turns")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        session_id: result
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        reasoning: reasoning.clone(),
        trace,
        error,
        ..ItemDiagnostics::default()
    };

    ClassificationOutcome {
        prediction,
        raw_text: reasoning,
        structured,
        diagnostics,
    }
}

#[async_trait]
impl ClassifierAdapter for AgentClassifier {
    fn variant(&self) -> Variant {
        Variant::Agentic
    }

    async fn classify(&self, request: &ClassificationRequest<'_>) -> ClassificationOutcome {
        let image = absolute(request.image_path);
        let knowledge = request.knowledge_path.map(absolute);
        let prompt = agent_prompt(
            &image,
            knowledge.as_deref(),
            request.classes,
            request.description,
        );

        let session = match self.run_session(&prompt).await {
            Ok(session) => session,
            Err(outcome) => return outcome,
        };

        if !session.status.success() {
            warn!(status = %session.status, "Agent exited with failure status");
            let mut outcome = ClassificationOutcome::failed(
                FailureKind::TransportError,
                format!("agent exited with {}: {}", session.status, excerpt(&session.stderr)),
                session.latency_ms,
            );
            outcome.raw_text = session.stdout;
            return outcome;
        }

        match decode(self.config.protocol, &session.stdout) {
            Ok(transcript) => {
                let outcome = outcome_from_transcript(transcript, session.latency_ms);
                debug!(
                    prediction = %outcome.prediction,
                    steps = outcome.diagnostics.trace.len(),
                    "Agent classification finished"
                );
                outcome
            }
            Err(e) => {
                warn!(error = %e.0, "Agent output could not be decoded");
                let mut outcome = ClassificationOutcome::failed(
                    FailureKind::MalformedOutput,
                    e.0,
                    session.latency_ms,
                );
                outcome.raw_text = session.stdout;
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_args_restrict_tools() {
        let classifier = AgentClassifier::new(AgentConfig::default());
        let args = classifier.command_args("classify this");
        assert_eq!(
            args,
            vec![
                "-p",
                "classify this",
                "--allowedTools",
                "Read",
                "--output-format",
                "json",
                "--model",
                "haiku"
            ]
        );
    }

    #[test]
    fn stream_protocol_requests_verbose_events() {
        let classifier = AgentClassifier::new(AgentConfig {
            protocol: OutputProtocol::StreamJson,
            ..AgentConfig::default()
        });
        let args = classifier.command_args("p");
        assert!(args.contains(&"stream-json".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--verbose"));
    }

    #[test]
    fn transcript_maps_metadata() {
        let transcript = AgentTranscript {
            result: json!({
                "type": "result",
                "is_error": false,
                "result": "Lesions match. {\"prediction\": \"Anthracnose\"}",
                "session_id": "abc",
                "duration_ms": 4200,
                "num_turns": 4,
                "total_cost_usd": 0.021
            }),
            trace: Vec::new(),
        };
        let outcome = outcome_from_transcript(transcript, 9999);
        assert_eq!(outcome.prediction, Prediction::label("Anthracnose"));
        assert_eq!(outcome.diagnostics.latency_ms, Some(4200));
        assert_eq!(outcome.diagnostics.num_turns, Some(4));
        assert_eq!(outcome.diagnostics.session_id.as_deref(), Some("abc"));
        assert_eq!(outcome.diagnostics.cost_usd, Some(0.021));
    }

    #[test]
    fn transcript_falls_back_to_structured_output() {
        let transcript = AgentTranscript {
            result: json!({
                "result": "I could not decide in JSON.",
                "structured_output": {"prediction": "Sooty_Mould"}
            }),
            trace: Vec::new(),
        };
        let outcome = outcome_from_transcript(transcript, 10);
        assert_eq!(outcome.prediction, Prediction::label("Sooty_Mould"));
        assert_eq!(outcome.diagnostics.latency_ms, Some(10));
    }

    #[test]
    fn error_result_is_transport_error() {
        let transcript = AgentTranscript {
            result: json!({"is_error": true, "subtype": "error_max_turns", "result": ""}),
            trace: Vec::new(),
        };
        let outcome = outcome_from_transcript(transcript, 10);
        assert_eq!(
            outcome.prediction,
            Prediction::Failure(FailureKind::TransportError)
        );
        assert!(outcome.diagnostics.error.unwrap().contains("error_max_turns"));
    }

    #[test]
    fn oversized_turn_count_is_dropped() {
        let transcript = AgentTranscript {
            result: json!({"result": "{\"prediction\": \"A\"}", "num_turns": 5_000_000_000u64}),
            trace: Vec::new(),
        };
        let outcome = outcome_from_transcript(transcript, 10);
        assert_eq!(outcome.diagnostics.num_turns, None);
        assert_eq!(outcome.prediction, Prediction::label("A"));
    }
}

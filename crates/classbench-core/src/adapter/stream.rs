//! Decoding of the agent CLI's output protocols.
//!
//! Both protocols end in the same result object; the streaming protocol adds
//! the intermediate events, which become the ordered trace.

use serde_json::Value;
use tracing::debug;

use crate::config::OutputProtocol;
use crate::domain::TraceStep;

/// Decoded agent session: the final result object plus any trace.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AgentTranscript {
    pub result: Value,
    pub trace: Vec<TraceStep>,
}

/// Why stdout could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DecodeError(pub String);

pub(crate) fn decode(protocol: OutputProtocol, stdout: &str) -> Result<AgentTranscript, DecodeError> {
    match protocol {
        OutputProtocol::Json => decode_single(stdout),
        OutputProtocol::StreamJson => decode_stream(stdout),
    }
}

fn decode_single(stdout: &str) -> Result<AgentTranscript, DecodeError> {
    let result: Value =
        serde_json::from_str(stdout.trim()).map_err(|e| DecodeError(e.to_string()))?;
    if !result.is_object() {
        return Err(DecodeError("agent output is not a JSON object".to_string()));
    }
    Ok(AgentTranscript {
        result,
        trace: Vec::new(),
    })
}

fn decode_stream(stdout: &str) -> Result<AgentTranscript, DecodeError> {
    let mut trace = Vec::new();
    let mut result = None;

    for (lineno, line) in stdout.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(line = lineno + 1, error = %e, "Skipping undecodable stream line");
                continue;
            }
        };
        match event.get("type").and_then(Value::as_str) {
            Some("assistant") | Some("user") => trace.extend(message_steps(&event)),
            Some("result") => result = Some(event),
            _ => {}
        }
    }

    match result {
        Some(result) => Ok(AgentTranscript { result, trace }),
        None => Err(DecodeError("stream ended without a result event".to_string())),
    }
}

fn message_steps(event: &Value) -> Vec<TraceStep> {
    let Some(blocks) = event
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    blocks
        .iter()
        .filter_map(|block| match block.get("type").and_then(Value::as_str)? {
            "text" => Some(TraceStep::Text {
                text: block.get("text")?.as_str()?.to_string(),
            }),
            "tool_use" => Some(TraceStep::ToolUse {
                name: block.get("name")?.as_str()?.to_string(),
                input: block.get("input").cloned().unwrap_or(Value::Null),
            }),
            "tool_result" => Some(TraceStep::ToolResult {
                content: flatten_content(block.get("content")),
                is_error: block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }),
            _ => None,
        })
        .collect()
}

/// Tool results carry either a string or a list of typed blocks.
fn flatten_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = r##"{"type":"system","subtype":"init","session_id":"s-1"}
{"type":"assistant","message":{"content":[{"type":"text","text":"Reading the knowledge base."},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"/kb.md"}}]}}
{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":[{"type":"text","text":"# Symptoms"}]}]}}
not json at all
{"type":"result","is_error":false,"result":"{\"prediction\": \"MRMS\"}","session_id":"s-1","num_turns":2}
"##;

    #[test]
    fn stream_yields_ordered_trace_and_result() {
        let transcript = decode(OutputProtocol::StreamJson, STREAM).expect("decode");
        assert_eq!(transcript.trace.len(), 3);
        assert_eq!(
            transcript.trace[0],
            TraceStep::Text {
                text: "Reading the knowledge base.".to_string()
            }
        );
        assert!(matches!(
            &transcript.trace[1],
            TraceStep::ToolUse { name, .. } if name == "Read"
        ));
        assert_eq!(
            transcript.trace[2],
            TraceStep::ToolResult {
                content: "# Symptoms".to_string(),
                is_error: false
            }
        );
        assert_eq!(transcript.result["num_turns"], 2);
    }

    #[test]
    fn stream_without_result_is_an_error() {
        let stdout = r#"{"type":"assistant","message":{"content":[]}}"#;
        assert!(decode(OutputProtocol::StreamJson, stdout).is_err());
    }

    #[test]
    fn single_object_has_empty_trace() {
        let transcript =
            decode(OutputProtocol::Json, "  {\"type\":\"result\",\"result\":\"x\"}\n").expect("decode");
        assert!(transcript.trace.is_empty());
        assert_eq!(transcript.result["result"], "x");
    }

    #[test]
    fn single_protocol_rejects_non_objects() {
        assert!(decode(OutputProtocol::Json, "not json").is_err());
        assert!(decode(OutputProtocol::Json, "[1, 2]").is_err());
    }
}

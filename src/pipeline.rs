//! Client for the external adversarial generation pipeline.
//!
//! Two entry points: a blocking generate call and an SSE streaming variant
//! that surfaces intermediate step events while the pipeline works. Calls are
//! instrumented and log latencies and truncated previews, never full payloads.
//!
//! The pipeline's own internals (prompting, model orchestration) are opaque;
//! this module only speaks its HTTP contract and converts the final
//! `assessment` object into a domain `Question`.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineCfg;
use crate::domain::{Difficulty, ErrorSpec, Question};
use crate::util::trunc_for_log;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
  #[error("pipeline HTTP error: {0}")]
  Http(String),
  #[error("pipeline reported failure: {0}")]
  Failed(String),
  #[error("pipeline stream error: {0}")]
  Stream(String),
  #[error("invalid assessment format: {0}")]
  InvalidAssessmentFormat(String),
}

/// Progress event emitted by the streaming endpoint while a question is
/// being generated. Forwarded verbatim to connected clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineStep {
  #[serde(default)]
  pub step_number: Option<u32>,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub model: String,
  #[serde(default)]
  pub success: bool,
}

#[derive(Clone)]
pub struct PipelineClient {
  pub client: reqwest::Client,
  pub base_url: String,
  pub max_retries: u32,
}

impl PipelineClient {
  /// Construct the client if we find PIPELINE_BASE_URL; otherwise return None.
  /// `PIPELINE_TIMEOUT_SECS` (default 300: generation takes minutes) and
  /// `PIPELINE_MAX_RETRIES` (clamped to 1..=5) tune it; TOML config supplies
  /// the retry default when the env var is unset.
  pub fn from_env(cfg: Option<&PipelineCfg>) -> Option<Self> {
    let base_url = std::env::var("PIPELINE_BASE_URL").ok()?;
    let timeout_secs = std::env::var("PIPELINE_TIMEOUT_SECS")
      .ok()
      .and_then(|v| v.parse::<u64>().ok())
      .unwrap_or(300);
    let max_retries = std::env::var("PIPELINE_MAX_RETRIES")
      .ok()
      .and_then(|v| v.parse::<u32>().ok())
      .or(cfg.and_then(|c| c.max_retries))
      .unwrap_or(3)
      .clamp(1, 5);

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
      .ok()?;

    Some(Self { client, base_url, max_retries })
  }

  /// Blocking generation: waits for the pipeline's complete result.
  #[instrument(level = "info", skip(self), fields(topic = %topic, max_retries = self.max_retries))]
  pub async fn generate(
    &self,
    topic: &str,
    difficulty: Option<Difficulty>,
  ) -> Result<Question, PipelineError> {
    let url = format!("{}/api/generate", self.base_url);
    let req = GenerateRequest {
      topic: topic.to_string(),
      max_retries: self.max_retries,
      selected_difficulty: difficulty.map(|d| d.as_str().to_string()),
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "bughunt-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(ACCEPT, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| PipelineError::Http(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_detail(&body).unwrap_or(body);
      error!(%status, error = %trunc_for_log(&msg, 200), "Pipeline generate returned non-success status");
      return Err(PipelineError::Http(format!("HTTP {}: {}", status, msg)));
    }

    let body: GenerateResponse = res.json().await.map_err(|e| PipelineError::Http(e.to_string()))?;
    let elapsed = start.elapsed();
    if !body.success {
      let msg = body.error.unwrap_or_else(|| "pipeline failed without detail".into());
      error!(?elapsed, error = %trunc_for_log(&msg, 200), "Pipeline reported failure");
      return Err(PipelineError::Failed(msg));
    }
    let assessment = body
      .assessment
      .ok_or_else(|| PipelineError::Failed("pipeline succeeded without an assessment".into()))?;
    let question = question_from_assessment(&assessment)?;
    info!(?elapsed, title = %question.title, difficulty = %question.difficulty, "Pipeline question received");
    Ok(question)
  }

  /// Streaming generation: consumes the SSE endpoint, forwards progress steps
  /// into `steps`, and resolves to the final assessment's question.
  ///
  /// A dropped receiver stops forwarding but not consumption: the finished
  /// question is still worth caching even if the requester went away.
  #[instrument(level = "info", skip(self, steps), fields(topic = %topic, max_retries = self.max_retries))]
  pub async fn generate_streaming(
    &self,
    topic: &str,
    difficulty: Option<Difficulty>,
    steps: mpsc::Sender<PipelineStep>,
  ) -> Result<Question, PipelineError> {
    let url = format!("{}/api/generate-stream", self.base_url);
    let mut req = self
      .client
      .get(&url)
      .query(&[("topic", topic)])
      .query(&[("max_retries", self.max_retries)])
      .header(USER_AGENT, "bughunt-backend/0.1")
      .header(ACCEPT, "text/event-stream");
    if let Some(d) = difficulty {
      req = req.query(&[("selected_difficulty", d.as_str())]);
    }

    let res = req.send().await.map_err(|e| PipelineError::Http(e.to_string()))?;
    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_detail(&body).unwrap_or(body);
      error!(%status, error = %trunc_for_log(&msg, 200), "Pipeline stream returned non-success status");
      return Err(PipelineError::Http(format!("HTTP {}: {}", status, msg)));
    }

    let start = std::time::Instant::now();
    let mut stream = res.bytes_stream();
    let mut buf = String::new();
    let mut forwarding = true;
    let mut outcome: Option<Result<Question, PipelineError>> = None;

    'stream: while let Some(chunk) = stream.next().await {
      let bytes = chunk.map_err(|e| PipelineError::Stream(e.to_string()))?;
      // SSE is a text protocol; normalize CRLF so frame splitting stays simple.
      buf.push_str(&String::from_utf8_lossy(&bytes).replace('\r', ""));

      while let Some(frame) = take_frame(&mut buf) {
        let Some(ev) = parse_event(&frame) else { continue };
        match ev.name.as_str() {
          "start" => debug!(data = %trunc_for_log(&ev.data, 120), "Pipeline stream started"),
          "step" => {
            let v: Value = match serde_json::from_str(&ev.data) {
              Ok(v) => v,
              Err(e) => {
                warn!(error = %e, data = %trunc_for_log(&ev.data, 120), "Unparseable step event");
                continue;
              }
            };
            // The pipeline multiplexes onto "step" events: progress payloads,
            // the final result, and in-pipeline failures, discriminated by
            // their "type" field.
            match v.get("type").and_then(|t| t.as_str()) {
              Some("final") => {
                outcome = Some(final_from_value(&v));
                break 'stream;
              }
              Some("error") => {
                let msg = v
                  .get("error")
                  .and_then(|e| e.as_str())
                  .unwrap_or("pipeline step error")
                  .to_string();
                outcome = Some(Err(PipelineError::Failed(msg)));
                break 'stream;
              }
              _ => match serde_json::from_value::<PipelineStep>(v) {
                Ok(step) => {
                  debug!(step = ?step.step_number, model = %step.model, "Pipeline step");
                  if forwarding && steps.send(step).await.is_err() {
                    debug!("Step receiver dropped; continuing without forwarding");
                    forwarding = false;
                  }
                }
                Err(e) => warn!(error = %e, "Step payload did not match expected shape"),
              },
            }
          }
          "done" => {
            debug!(data = %trunc_for_log(&ev.data, 120), "Pipeline stream done");
            if outcome.is_some() {
              break 'stream;
            }
          }
          "error" => {
            let msg = serde_json::from_str::<Value>(&ev.data)
              .ok()
              .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
              .unwrap_or_else(|| "pipeline stream error".into());
            outcome = Some(Err(PipelineError::Failed(msg)));
            break 'stream;
          }
          _ => {}
        }
      }
    }

    let elapsed = start.elapsed();
    match outcome {
      Some(Ok(question)) => {
        info!(?elapsed, title = %question.title, difficulty = %question.difficulty, "Pipeline stream produced question");
        Ok(question)
      }
      Some(Err(e)) => {
        error!(?elapsed, error = %e, "Pipeline stream failed");
        Err(e)
      }
      None => {
        error!(?elapsed, "Pipeline stream ended without a final result");
        Err(PipelineError::Stream("stream ended without a final result".into()))
      }
    }
  }
}

/// Transformation boundary: the pipeline's final `assessment` object must
/// carry `code` and `errors` to become a playable `Question`; anything less
/// fails loudly instead of handing a partial object to the parser.
pub fn question_from_assessment(v: &Value) -> Result<Question, PipelineError> {
  let invalid = |msg: &str| PipelineError::InvalidAssessmentFormat(msg.to_string());

  let obj = v.as_object().ok_or_else(|| invalid("assessment is not an object"))?;
  let code_val = obj
    .get("code")
    .and_then(|c| c.as_array())
    .ok_or_else(|| invalid("assessment lacks code lines"))?;
  let errors_val = obj
    .get("errors")
    .and_then(|e| e.as_array())
    .ok_or_else(|| invalid("assessment lacks an errors list"))?;

  let code = code_val
    .iter()
    .map(|l| l.as_str().map(str::to_string).ok_or_else(|| invalid("non-string code line")))
    .collect::<Result<Vec<_>, _>>()?;
  let errors = errors_val
    .iter()
    .map(|e| {
      let id = e
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid("error entry without id"))?;
      let description = e.get("description").and_then(|v| v.as_str()).unwrap_or_default();
      Ok(ErrorSpec { id: id.to_string(), description: description.to_string() })
    })
    .collect::<Result<Vec<_>, _>>()?;

  let title = obj
    .get("title")
    .and_then(|t| t.as_str())
    .filter(|t| !t.is_empty())
    .unwrap_or("Generated Assessment")
    .to_string();
  let difficulty = obj
    .get("difficulty")
    .and_then(|d| d.as_str())
    .and_then(Difficulty::from_label)
    .unwrap_or_default();

  Ok(Question { title, difficulty, code, errors })
}

fn final_from_value(v: &Value) -> Result<Question, PipelineError> {
  let success = v.get("success").and_then(|s| s.as_bool()).unwrap_or(false);
  if !success {
    let msg = v
      .get("error")
      .and_then(|e| e.as_str())
      .unwrap_or("pipeline completed without an assessment")
      .to_string();
    return Err(PipelineError::Failed(msg));
  }
  match v.get("assessment") {
    Some(a) => question_from_assessment(a),
    None => Err(PipelineError::Failed("pipeline completed without an assessment".into())),
  }
}

/// Take the next complete SSE frame (blank-line terminated) off the buffer.
fn take_frame(buf: &mut String) -> Option<String> {
  let sep = buf.find("\n\n")?;
  let frame = buf[..sep].to_string();
  buf.drain(..sep + 2);
  Some(frame)
}

struct SseEvent {
  name: String,
  data: String,
}

/// Parse one SSE frame into its event name and joined data payload.
/// Comment lines and unknown fields are ignored; a frame with no data and no
/// explicit event name is noise (keep-alive) and yields None.
fn parse_event(frame: &str) -> Option<SseEvent> {
  let mut name = "message".to_string();
  let mut data_lines: Vec<&str> = Vec::new();
  for line in frame.lines() {
    if let Some(rest) = line.strip_prefix("event:") {
      name = rest.trim().to_string();
    } else if let Some(rest) = line.strip_prefix("data:") {
      data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
    }
  }
  if data_lines.is_empty() && name == "message" {
    return None;
  }
  Some(SseEvent { name, data: data_lines.join("\n") })
}

/// Try to extract a clean error message from a JSON error body.
fn extract_detail(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    detail: String,
  }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.detail),
    Err(_) => None,
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct GenerateRequest {
  topic: String,
  max_retries: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  selected_difficulty: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  success: bool,
  #[serde(default)]
  assessment: Option<Value>,
  #[serde(default)]
  error: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn frames_survive_chunk_boundaries() {
    let mut buf = String::new();
    buf.push_str("event: step\ndata: {\"a\"");
    assert!(take_frame(&mut buf).is_none(), "half a frame must not be taken");
    buf.push_str(":1}\n\nevent: done\nda");
    let first = take_frame(&mut buf).expect("first frame complete");
    assert_eq!(first, "event: step\ndata: {\"a\":1}");
    assert!(take_frame(&mut buf).is_none(), "second frame still open");
    buf.push_str("ta: {}\n\n");
    let second = take_frame(&mut buf).expect("second frame complete");
    assert_eq!(second, "event: done\ndata: {}");
    assert!(buf.is_empty());
  }

  #[test]
  fn event_parsing_handles_names_comments_and_multiline_data() {
    let ev = parse_event("event: step\ndata: {\"x\":1}").expect("event");
    assert_eq!(ev.name, "step");
    assert_eq!(ev.data, "{\"x\":1}");

    let ev = parse_event(": keep-alive\ndata: a\ndata: b").expect("data event");
    assert_eq!(ev.name, "message");
    assert_eq!(ev.data, "a\nb");

    assert!(parse_event(": keep-alive").is_none());
  }

  #[test]
  fn assessment_with_code_and_errors_becomes_question() {
    let q = question_from_assessment(&json!({
      "title": "Broken batching",
      "difficulty": "Advanced",
      "code": ["x = <<foo>>"],
      "errors": [{"id": "foo", "description": "bad"}],
      "metadata": {"elapsed": 12}
    }))
    .expect("valid assessment");
    assert_eq!(q.title, "Broken batching");
    assert_eq!(q.difficulty, Difficulty::Advanced);
    assert_eq!(q.code, vec!["x = <<foo>>".to_string()]);
    assert_eq!(q.errors[0].id, "foo");
  }

  #[test]
  fn assessment_defaults_title_and_difficulty() {
    let q = question_from_assessment(&json!({
      "title": "",
      "difficulty": "legendary",
      "code": [],
      "errors": []
    }))
    .expect("assessment with defaults");
    assert_eq!(q.title, "Generated Assessment");
    assert_eq!(q.difficulty, Difficulty::Intermediate);
  }

  #[test]
  fn assessment_missing_code_or_errors_is_rejected() {
    let no_code = question_from_assessment(&json!({"errors": []}));
    assert!(matches!(no_code, Err(PipelineError::InvalidAssessmentFormat(_))));
    let no_errors = question_from_assessment(&json!({"code": []}));
    assert!(matches!(no_errors, Err(PipelineError::InvalidAssessmentFormat(_))));
    let not_object = question_from_assessment(&json!("nope"));
    assert!(matches!(not_object, Err(PipelineError::InvalidAssessmentFormat(_))));
    let bad_line = question_from_assessment(&json!({"code": [42], "errors": []}));
    assert!(matches!(bad_line, Err(PipelineError::InvalidAssessmentFormat(_))));
  }

  #[test]
  fn final_event_failure_carries_pipeline_error() {
    let err = final_from_value(&json!({"type": "final", "success": false, "error": "model refused"}));
    match err {
      Err(PipelineError::Failed(msg)) => assert_eq!(msg, "model refused"),
      other => panic!("expected Failed, got {other:?}"),
    }
  }

  #[test]
  fn step_payload_tolerates_extra_fields() {
    let step: PipelineStep = serde_json::from_value(json!({
      "type": "step",
      "step_number": 3,
      "description": "Generating distractors",
      "model": "strong-model",
      "success": true,
      "timestamp": "2026-01-01T00:00:00Z"
    }))
    .expect("step");
    assert_eq!(step.step_number, Some(3));
    assert!(step.success);
  }
}

//! Game behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Serving a question to a session (selection + per-question reset)
//!   - Recording clicks against the click budget, with auto-scoring on the
//!     budget-exhausting click
//!   - Submitting (idempotent), summarizing, and resetting sessions
//!
//! Span ids arriving from clients are resolved to the literal error keys the
//! scoring engine understands; an unknown span id degrades to a miss.

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::domain::{Click, Difficulty, QuestionRecord, ScoreResult};
use crate::pipeline::PipelineStep;
use crate::scoring::score_clicks;
use crate::state::{AppState, GameSession, SessionResult, CLICK_BUDGET};

/// Ack for a recorded (or rejected) click. `result` carries the score when
/// the click exhausted the budget, or the cached result when the question was
/// already scored.
#[derive(Clone, Debug)]
pub struct ClickOutcome {
  pub accepted: bool,
  pub clicks_used: usize,
  pub click_budget: usize,
  pub result: Option<ScoreResult>,
}

#[derive(Clone, Debug)]
pub struct SubmitOutcome {
  pub result: ScoreResult,
  pub total_score: f32,
}

#[derive(Clone, Debug)]
pub struct SummaryData {
  pub total_score: f32,
  pub played: usize,
  pub average: f32,
  pub results: Vec<SessionResult>,
}

/// Pick a question (pipeline → pool → hard fallback) and, when a session is
/// given, make it the session's current question with a clean click slate.
#[instrument(level = "info", skip(state, steps), fields(%difficulty, session = ?session_id))]
pub async fn serve_question(
  state: &AppState,
  difficulty: Difficulty,
  topic: Option<&str>,
  session_id: Option<&str>,
  steps: Option<mpsc::Sender<PipelineStep>>,
) -> (QuestionRecord, &'static str) {
  let (rec, origin) = state.choose_question(difficulty, topic, steps).await;
  if let Some(sid) = session_id {
    let mut sessions = state.sessions.write().await;
    match sessions.get_mut(sid) {
      Some(s) => {
        s.current = Some(rec.id.clone());
        s.clicks.clear();
        s.scored = None;
      }
      None => {
        warn!(target: "question", session = %sid, "Serving question for unknown session id")
      }
    }
  }
  (rec, origin)
}

/// Record one click for the session's current question.
///
/// Clicks after scoring or past the budget are rejected (not an error: the
/// ack tells the client where it stands). The budget-exhausting click scores
/// the question immediately, without a no-errors override.
#[instrument(level = "info", skip(state), fields(session = %session_id, line, span = ?span_id))]
pub async fn record_click(
  state: &AppState,
  session_id: &str,
  line: usize,
  x: f32,
  y: f32,
  span_id: Option<&str>,
) -> Result<ClickOutcome, String> {
  let current_id = current_question_id(state, session_id).await?;
  let rec = state
    .get_question(&current_id)
    .await
    .ok_or_else(|| format!("Unknown questionId: {}", current_id))?;

  let error_id = match span_id {
    None => None,
    Some(sid) => match rec.parsed.spans.iter().find(|s| s.id == sid) {
      Some(span) => Some(span.text.clone()),
      None => {
        warn!(target: "question", span = %sid, question = %rec.id, "Click referenced unknown span id; counting as miss");
        None
      }
    },
  };
  let click = Click { x, y, line, error_id };

  let mut sessions = state.sessions.write().await;
  let s = sessions
    .get_mut(session_id)
    .ok_or_else(|| format!("Unknown sessionId: {}", session_id))?;

  if s.scored.is_some() || s.clicks.len() >= CLICK_BUDGET {
    return Ok(ClickOutcome {
      accepted: false,
      clicks_used: s.clicks.len(),
      click_budget: CLICK_BUDGET,
      result: s.scored.clone(),
    });
  }

  s.clicks.push(click);
  let mut result = None;
  if s.clicks.len() == CLICK_BUDGET {
    let r = score_clicks(&s.clicks, &rec.parsed.errors, false);
    info!(target: "question", session = %session_id, question = %rec.id, score = r.score, "Budget exhausted; question auto-scored");
    apply_result(s, &rec, r.clone());
    result = Some(r);
  }

  Ok(ClickOutcome {
    accepted: true,
    clicks_used: s.clicks.len(),
    click_budget: CLICK_BUDGET,
    result,
  })
}

/// Score the session's current question. Idempotent: once scored, later
/// submits return the cached result and the totals stay untouched.
/// `no_errors_override` is the player's "this code is clean" declaration.
#[instrument(level = "info", skip(state), fields(session = %session_id, no_errors_override))]
pub async fn submit_session(
  state: &AppState,
  session_id: &str,
  no_errors_override: bool,
) -> Result<SubmitOutcome, String> {
  let current_id = current_question_id(state, session_id).await?;
  let rec = state
    .get_question(&current_id)
    .await
    .ok_or_else(|| format!("Unknown questionId: {}", current_id))?;

  let mut sessions = state.sessions.write().await;
  let s = sessions
    .get_mut(session_id)
    .ok_or_else(|| format!("Unknown sessionId: {}", session_id))?;

  if let Some(r) = &s.scored {
    return Ok(SubmitOutcome { result: r.clone(), total_score: s.total_score });
  }

  let r = score_clicks(&s.clicks, &rec.parsed.errors, no_errors_override);
  info!(target: "question", session = %session_id, question = %rec.id, score = r.score, "Question scored");
  apply_result(s, &rec, r.clone());
  Ok(SubmitOutcome { result: r, total_score: s.total_score })
}

/// Totals for the session: accumulated score, questions played, average.
pub async fn session_summary(state: &AppState, session_id: &str) -> Result<SummaryData, String> {
  let sessions = state.sessions.read().await;
  let s = sessions
    .get(session_id)
    .ok_or_else(|| format!("Unknown sessionId: {}", session_id))?;
  let played = s.results.len();
  let average = if played == 0 { 0.0 } else { s.total_score / played as f32 };
  Ok(SummaryData { total_score: s.total_score, played, average, results: s.results.clone() })
}

/// Zero the session for a new run, keeping its id.
#[instrument(level = "info", skip(state), fields(session = %session_id))]
pub async fn reset_session(state: &AppState, session_id: &str) -> Result<(), String> {
  let mut sessions = state.sessions.write().await;
  let s = sessions
    .get_mut(session_id)
    .ok_or_else(|| format!("Unknown sessionId: {}", session_id))?;
  s.current = None;
  s.clicks.clear();
  s.scored = None;
  s.results.clear();
  s.total_score = 0.0;
  info!(target: "question", session = %session_id, "Session reset");
  Ok(())
}

async fn current_question_id(state: &AppState, session_id: &str) -> Result<String, String> {
  let sessions = state.sessions.read().await;
  let s = sessions
    .get(session_id)
    .ok_or_else(|| format!("Unknown sessionId: {}", session_id))?;
  s.current
    .clone()
    .ok_or_else(|| "Session has no active question".to_string())
}

fn apply_result(s: &mut GameSession, rec: &QuestionRecord, result: ScoreResult) {
  s.total_score += result.score;
  s.results.push(SessionResult {
    question_id: rec.id.clone(),
    title: rec.parsed.title.clone(),
    score: result.score,
  });
  s.scored = Some(result);
}

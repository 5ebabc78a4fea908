//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs include parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::{IntoResponse, Response}};
use tracing::{info, instrument};

use crate::annotate;
use crate::domain::{Difficulty, Question};
use crate::protocol::*;
use crate::scoring::score_clicks;
use crate::state::{AppState, CLICK_BUDGET};
use crate::logic::*;

fn bad_request(message: String) -> Response {
  (StatusCode::BAD_REQUEST, Json(ErrorOut { message })).into_response()
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, pipeline: state.pipeline.is_some() })
}

#[instrument(level = "info", skip(state), fields(difficulty = ?q.difficulty, topic = ?q.topic))]
pub async fn http_get_question(
  State(state): State<Arc<AppState>>,
  Query(q): Query<QuestionQuery>,
) -> impl IntoResponse {
  let difficulty = q.difficulty.as_deref().and_then(Difficulty::from_label).unwrap_or_default();
  let (rec, origin) =
    serve_question(&state, difficulty, q.topic.as_deref(), q.session_id.as_deref(), None).await;
  info!(target: "question", %difficulty, id = %rec.id, %origin, "HTTP question served");
  Json(ServedQuestionOut { question: to_out(&rec), origin: origin.to_string() })
}

#[instrument(level = "info", skip(body), fields(title = %body.title, lines = body.code.len()))]
pub async fn http_post_parse(Json(body): Json<Question>) -> Response {
  match annotate::parse(&body) {
    Ok(parsed) => {
      info!(target: "question", title = %body.title, spans = parsed.spans.len(), "HTTP parse ok");
      Json(parsed).into_response()
    }
    Err(e) => bad_request(e.to_string()),
  }
}

#[instrument(level = "info", skip(body), fields(clicks = body.clicks.len(), errors = body.errors.len(), no_errors_override = body.no_errors_override))]
pub async fn http_post_score(Json(body): Json<ScoreIn>) -> impl IntoResponse {
  let result = score_clicks(&body.clicks, &body.errors, body.no_errors_override);
  info!(target: "question", score = %format!("{:.1}", result.score), "HTTP clicks scored");
  Json(result)
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let s = state.new_session().await;
  Json(SessionOut { session_id: s.id, click_budget: CLICK_BUDGET })
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id, line = body.line, span = ?body.span_id))]
pub async fn http_post_click(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ClickIn>,
) -> Response {
  match record_click(&state, &body.session_id, body.line, body.x, body.y, body.span_id.as_deref())
    .await
  {
    Ok(o) => Json(ClickAckOut {
      accepted: o.accepted,
      clicks_used: o.clicks_used,
      click_budget: o.click_budget,
      result: o.result,
    })
    .into_response(),
    Err(message) => bad_request(message),
  }
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id, no_errors_override = body.no_errors_override))]
pub async fn http_post_submit(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SubmitIn>,
) -> Response {
  match submit_session(&state, &body.session_id, body.no_errors_override).await {
    Ok(o) => {
      info!(target: "question", session = %body.session_id, score = %format!("{:.1}", o.result.score), "HTTP submit scored");
      Json(SubmitOut { result: o.result, total_score: o.total_score }).into_response()
    }
    Err(message) => bad_request(message),
  }
}

#[instrument(level = "info", skip(state), fields(session = %q.session_id))]
pub async fn http_get_summary(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SummaryQuery>,
) -> Response {
  match session_summary(&state, &q.session_id).await {
    Ok(d) => Json(summary_out(&d)).into_response(),
    Err(message) => bad_request(message),
  }
}

#[instrument(level = "info", skip(state, body), fields(session = %body.session_id))]
pub async fn http_post_reset(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ResetIn>,
) -> Response {
  match reset_session(&state, &body.session_id).await {
    Ok(()) => Json(OkOut { ok: true }).into_response(),
    Err(message) => bad_request(message),
  }
}

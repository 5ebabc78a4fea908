//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. Most requests get a single JSON reply; new_question
//! additionally interleaves pipeline step events while generation is running.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::mpsc;
use tracing::{info, error, instrument, debug};

use crate::annotate;
use crate::domain::Difficulty;
use crate::pipeline::PipelineStep;
use crate::protocol::{summary_out, to_out, ClientWsMessage, ServerWsMessage};
use crate::scoring::score_clicks;
use crate::logic::*;
use crate::state::{AppState, CLICK_BUDGET};

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "bughunt_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send_msg(socket: &mut WebSocket, msg: &ServerWsMessage) -> Result<(), axum::Error> {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  socket.send(Message::Text(out)).await
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "bughunt_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        match serde_json::from_str::<ClientWsMessage>(&txt) {
          // new_question needs the socket: step events are forwarded while the
          // selection future runs, then the question lands as the final message.
          Ok(ClientWsMessage::NewQuestion { difficulty, topic, session_id }) => {
            if let Err(e) =
              handle_new_question(&mut socket, &state, difficulty, topic, session_id).await
            {
              error!(target: "bughunt_backend", error = %e, "WS send error");
              break;
            }
          }
          Ok(incoming) => {
            debug!(target: "bughunt_backend", "WS received: {:?}", &incoming);
            let reply = handle_client_ws(incoming, &state).await;
            if let Err(e) = send_msg(&mut socket, &reply).await {
              error!(target: "bughunt_backend", error = %e, "WS send error");
              break;
            }
          }
          Err(e) => {
            let reply = ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) };
            if send_msg(&mut socket, &reply).await.is_err() {
              break;
            }
          }
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "bughunt_backend", "WebSocket disconnected");
}

/// Serve a question over WS, interleaving pipeline step events.
///
/// The selection future runs on its own task while this function drains the
/// step channel into the socket. With the pipeline disabled the channel just
/// closes without yielding, so the client sees the question message alone.
#[instrument(level = "info", skip(socket, state), fields(difficulty = ?difficulty, topic = ?topic, session = ?session_id))]
async fn handle_new_question(
  socket: &mut WebSocket,
  state: &Arc<AppState>,
  difficulty: Option<String>,
  topic: Option<String>,
  session_id: Option<String>,
) -> Result<(), axum::Error> {
  let difficulty = difficulty.as_deref().and_then(Difficulty::from_label).unwrap_or_default();
  let (tx, mut rx) = mpsc::channel::<PipelineStep>(16);

  let st = state.clone();
  let task = tokio::spawn(async move {
    serve_question(&st, difficulty, topic.as_deref(), session_id.as_deref(), Some(tx)).await
  });

  while let Some(step) = rx.recv().await {
    send_msg(socket, &ServerWsMessage::PipelineStep { step }).await?;
  }

  match task.await {
    Ok((rec, origin)) => {
      info!(target: "question", %difficulty, id = %rec.id, %origin, "WS question served");
      send_msg(socket, &ServerWsMessage::Question {
        question: to_out(&rec),
        origin: origin.to_string(),
      })
      .await
    }
    Err(e) => {
      error!(target: "bughunt_backend", error = %e, "Question selection task failed");
      send_msg(socket, &ServerWsMessage::Error {
        message: "Internal error while selecting a question".into(),
      })
      .await
    }
  }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    // Intercepted in handle_ws (needs the socket to interleave step events).
    ClientWsMessage::NewQuestion { .. } => ServerWsMessage::Error {
      message: "new_question must be handled by the socket loop".into(),
    },

    ClientWsMessage::NewSession => {
      let s = state.new_session().await;
      ServerWsMessage::Session { session_id: s.id, click_budget: CLICK_BUDGET }
    }

    ClientWsMessage::ParseQuestion { question } => match annotate::parse(&question) {
      Ok(parsed) => {
        tracing::info!(target: "question", title = %question.title, spans = parsed.spans.len(), "WS parse ok");
        ServerWsMessage::Parsed { question: parsed }
      }
      Err(e) => ServerWsMessage::Error { message: e.to_string() },
    },

    ClientWsMessage::ScoreClicks { clicks, errors, no_errors_override } => {
      let result = score_clicks(&clicks, &errors, no_errors_override);
      tracing::info!(target: "question", score = %format!("{:.1}", result.score), "WS clicks scored");
      ServerWsMessage::Score { result }
    }

    ClientWsMessage::Click { session_id, line, x, y, span_id } => {
      match record_click(state, &session_id, line, x, y, span_id.as_deref()).await {
        Ok(o) => ServerWsMessage::ClickAck {
          accepted: o.accepted,
          clicks_used: o.clicks_used,
          click_budget: o.click_budget,
          result: o.result,
        },
        Err(message) => ServerWsMessage::Error { message },
      }
    }

    ClientWsMessage::Submit { session_id, no_errors_override } => {
      match submit_session(state, &session_id, no_errors_override).await {
        Ok(o) => {
          tracing::info!(target: "question", session = %session_id, score = %format!("{:.1}", o.result.score), "WS submit scored");
          ServerWsMessage::Submitted { result: o.result, total_score: o.total_score }
        }
        Err(message) => ServerWsMessage::Error { message },
      }
    }

    ClientWsMessage::Summary { session_id } => {
      match session_summary(state, &session_id).await {
        Ok(d) => ServerWsMessage::Summary { summary: summary_out(&d) },
        Err(message) => ServerWsMessage::Error { message },
      }
    }

    ClientWsMessage::Reset { session_id } => match reset_session(state, &session_id).await {
      Ok(()) => ServerWsMessage::ResetDone,
      Err(message) => ServerWsMessage::Error { message },
    },
  }
}

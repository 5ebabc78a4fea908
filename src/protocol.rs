//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{
    Click, Difficulty, ErrorSpan, ErrorSpec, ParsedQuestion, Question, QuestionRecord,
    QuestionSource, ScoreResult,
};
use crate::logic::SummaryData;
use crate::pipeline::PipelineStep;
use crate::state::CLICK_BUDGET;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    NewSession,
    NewQuestion {
        difficulty: Option<String>,
        topic: Option<String>,
        #[serde(rename = "sessionId")]
        session_id: Option<String>,
    },
    ParseQuestion {
        question: Question,
    },
    ScoreClicks {
        clicks: Vec<Click>,
        errors: Vec<ErrorSpec>,
        #[serde(default, rename = "noErrorsOverride")]
        no_errors_override: bool,
    },
    Click {
        #[serde(rename = "sessionId")]
        session_id: String,
        line: usize,
        #[serde(default)]
        x: f32,
        #[serde(default)]
        y: f32,
        #[serde(rename = "spanId")]
        span_id: Option<String>,
    },
    Submit {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(default, rename = "noErrorsOverride")]
        no_errors_override: bool,
    },
    Summary {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Reset {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "clickBudget")]
        click_budget: usize,
    },
    Question {
        question: QuestionOut,
        origin: String,
    },
    /// Interleaved progress while a pipeline question is being generated.
    PipelineStep {
        step: PipelineStep,
    },
    Parsed {
        question: ParsedQuestion,
    },
    Score {
        result: ScoreResult,
    },
    ClickAck {
        accepted: bool,
        #[serde(rename = "clicksUsed")]
        clicks_used: usize,
        #[serde(rename = "clickBudget")]
        click_budget: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ScoreResult>,
    },
    Submitted {
        result: ScoreResult,
        #[serde(rename = "totalScore")]
        total_score: f32,
    },
    Summary {
        summary: SummaryOut,
    },
    ResetDone,
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for question delivery: delimiter-stripped
/// lines plus span metadata. Clients map spans to view nodes; no markup
/// strings cross the wire.
#[derive(Debug, Serialize)]
pub struct QuestionOut {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub source: QuestionSource,
    pub lines: Vec<String>,
    pub spans: Vec<ErrorSpan>,
    #[serde(rename = "errorCount")]
    pub error_count: usize,
    #[serde(rename = "clickBudget")]
    pub click_budget: usize,
}

/// Convert a stored record (internal) to the public DTO.
pub fn to_out(rec: &QuestionRecord) -> QuestionOut {
    QuestionOut {
        id: rec.id.clone(),
        title: rec.parsed.title.clone(),
        difficulty: rec.parsed.difficulty,
        source: rec.source,
        lines: rec.parsed.parsed_lines.clone(),
        spans: rec.parsed.spans.clone(),
        error_count: rec.parsed.errors.len(),
        click_budget: CLICK_BUDGET,
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResultOut {
    #[serde(rename = "questionId")]
    pub question_id: String,
    pub title: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct SummaryOut {
    #[serde(rename = "totalScore")]
    pub total_score: f32,
    pub played: usize,
    pub average: f32,
    pub results: Vec<SessionResultOut>,
}

pub fn summary_out(d: &SummaryData) -> SummaryOut {
    SummaryOut {
        total_score: d.total_score,
        played: d.played,
        average: d.average,
        results: d
            .results
            .iter()
            .map(|r| SessionResultOut {
                question_id: r.question_id.clone(),
                title: r.title.clone(),
                score: r.score,
            })
            .collect(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct QuestionQuery {
    pub difficulty: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ServedQuestionOut {
    pub question: QuestionOut,
    pub origin: String,
}

#[derive(Deserialize)]
pub struct ScoreIn {
    pub clicks: Vec<Click>,
    pub errors: Vec<ErrorSpec>,
    #[serde(default, rename = "noErrorsOverride")]
    pub no_errors_override: bool,
}

#[derive(Serialize)]
pub struct SessionOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "clickBudget")]
    pub click_budget: usize,
}

#[derive(Deserialize)]
pub struct ClickIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub line: usize,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(rename = "spanId")]
    pub span_id: Option<String>,
}

#[derive(Serialize)]
pub struct ClickAckOut {
    pub accepted: bool,
    #[serde(rename = "clicksUsed")]
    pub clicks_used: usize,
    #[serde(rename = "clickBudget")]
    pub click_budget: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScoreResult>,
}

#[derive(Deserialize)]
pub struct SubmitIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default, rename = "noErrorsOverride")]
    pub no_errors_override: bool,
}

#[derive(Serialize)]
pub struct SubmitOut {
    pub result: ScoreResult,
    #[serde(rename = "totalScore")]
    pub total_score: f32,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Deserialize)]
pub struct ResetIn {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Serialize)]
pub struct OkOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub pipeline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParsedQuestion, QuestionSource};

    #[test]
    fn client_messages_deserialize_from_tagged_json() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type":"new_question","difficulty":"Expert","sessionId":"s1"}"#,
        )
        .expect("new_question");
        match msg {
            ClientWsMessage::NewQuestion { difficulty, topic, session_id } => {
                assert_eq!(difficulty.as_deref(), Some("Expert"));
                assert!(topic.is_none());
                assert_eq!(session_id.as_deref(), Some("s1"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type":"click","sessionId":"s1","line":2,"x":10.5,"y":3.0,"spanId":"2:8"}"#,
        )
        .expect("click");
        match msg {
            ClientWsMessage::Click { session_id, line, span_id, .. } => {
                assert_eq!(session_id, "s1");
                assert_eq!(line, 2);
                assert_eq!(span_id.as_deref(), Some("2:8"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn question_out_serializes_wire_names() {
        let rec = QuestionRecord {
            id: "q1".into(),
            source: QuestionSource::Seed,
            parsed: ParsedQuestion {
                title: "t".into(),
                difficulty: Difficulty::Beginner,
                code: vec!["x = <<1>>".into()],
                errors: vec![ErrorSpec { id: "1".into(), description: "d".into() }],
                parsed_lines: vec!["x = 1".into()],
                spans: vec![ErrorSpan {
                    id: "0:4".into(),
                    line: 0,
                    start_pos: 4,
                    end_pos: 5,
                    text: "1".into(),
                    description: Some("d".into()),
                }],
            },
        };
        let v = serde_json::to_value(to_out(&rec)).expect("serialize");
        assert_eq!(v["errorCount"], 1);
        assert_eq!(v["clickBudget"], 3);
        assert_eq!(v["source"], "seed");
        assert_eq!(v["difficulty"], "Beginner");
        assert_eq!(v["spans"][0]["startPos"], 4);
        assert_eq!(v["spans"][0]["endPos"], 5);
    }

    #[test]
    fn server_messages_carry_snake_case_tags() {
        let v = serde_json::to_value(ServerWsMessage::Pong).expect("pong");
        assert_eq!(v["type"], "pong");
        let v = serde_json::to_value(ServerWsMessage::ClickAck {
            accepted: true,
            clicks_used: 1,
            click_budget: 3,
            result: None,
        })
        .expect("ack");
        assert_eq!(v["type"], "click_ack");
        assert_eq!(v["clicksUsed"], 1);
        assert!(v.get("result").is_none());
    }
}

//! Domain models used by the backend: questions, parsed spans, clicks, and score results.

use serde::{Deserialize, Serialize};

/// Difficulty tiers the pipeline and the bank agree on.
/// Serialized capitalized ("Beginner", …) to match the assessment wire format.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
  Expert,
}
impl Default for Difficulty {
  fn default() -> Self { Difficulty::Intermediate }
}

impl Difficulty {
  /// Lenient parse for upstream-provided labels ("expert", "Expert", …).
  /// Returns None for anything outside the four tiers.
  pub fn from_label(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "beginner" => Some(Difficulty::Beginner),
      "intermediate" => Some(Difficulty::Intermediate),
      "advanced" => Some(Difficulty::Advanced),
      "expert" => Some(Difficulty::Expert),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Beginner => "Beginner",
      Difficulty::Intermediate => "Intermediate",
      Difficulty::Advanced => "Advanced",
      Difficulty::Expert => "Expert",
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where did we get the question from?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
  LocalBank, // from user-provided TOML bank
  Pipeline,  // generated via the external pipeline and cached in memory
  Seed,      // built-in seeds (last resort)
}

/// Authoritative error description supplied by the question author.
/// `id` is the exact delimited substring text (literal-text-as-id).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorSpec {
  pub id: String,
  #[serde(default)]
  pub description: String,
}

/// Raw question as authored or as delivered by the pipeline:
/// `code` lines may carry `<<…>>` annotation markers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub title: String,
  #[serde(default)]
  pub difficulty: Difficulty,
  pub code: Vec<String>,
  #[serde(default)]
  pub errors: Vec<ErrorSpec>,
}

/// A parsed error location inside the delimiter-stripped code.
///
/// `id` is a synthetic `"{line}:{start_pos}"` key assigned at parse time;
/// `text` is the captured substring (which is also the author's literal error
/// key); offsets are character offsets into `parsed_lines[line]`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorSpan {
  pub id: String,
  pub line: usize,
  #[serde(rename = "startPos")]
  pub start_pos: usize,
  #[serde(rename = "endPos")]
  pub end_pos: usize,
  pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Question after annotation parsing: clean display lines plus span metadata.
/// Immutable once built; rebuildable from the same `Question` at any time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParsedQuestion {
  pub title: String,
  pub difficulty: Difficulty,
  pub code: Vec<String>,
  pub errors: Vec<ErrorSpec>,
  #[serde(rename = "parsedLines")]
  pub parsed_lines: Vec<String>,
  pub spans: Vec<ErrorSpan>,
}

/// A single user interaction against the rendered code.
/// `error_id` carries the literal error key when the click landed on a span,
/// None for a miss anywhere else in the code block. Misses still cost a guess.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Click {
  #[serde(default)]
  pub x: f32,
  #[serde(default)]
  pub y: f32,
  #[serde(default)]
  pub line: usize,
  #[serde(default, rename = "errorId")]
  pub error_id: Option<String>,
}

/// Penalty slot of the score breakdown: numeric on no-error questions,
/// descriptive text otherwise.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Penalty {
  Points(f32),
  Note(String),
}

/// Human-readable breakdown accompanying a score.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
  #[serde(rename = "baseScore")]
  pub base_score: String,
  pub penalty: Penalty,
  #[serde(rename = "final")]
  pub final_score: String,
}

/// Evaluation of one question attempt. Created fresh per attempt, immutable,
/// discarded when the session advances or resets.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
  pub score: f32,
  #[serde(rename = "correctClicks")]
  pub correct_clicks: usize,
  #[serde(rename = "falsePositives")]
  pub false_positives: usize,
  #[serde(rename = "missedErrors")]
  pub missed_errors: usize,
  pub breakdown: ScoreBreakdown,
}

/// Store entry wrapping a parsed question with identity and provenance.
/// Kept separate from `ParsedQuestion` so parsing stays deterministic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionRecord {
  pub id: String,
  pub source: QuestionSource,
  pub parsed: ParsedQuestion,
}

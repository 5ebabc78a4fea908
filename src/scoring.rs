//! Click scoring: evaluates a click list against the authoritative error list
//! and produces a precision/recall/F1 result with a display breakdown.
//!
//! Pure and deterministic. The 3-click budget is session policy and lives in
//! `state`; this engine accepts any non-negative number of clicks.

use std::collections::HashSet;

use crate::domain::{Click, ErrorSpec, Penalty, ScoreBreakdown, ScoreResult};

/// Evaluate `clicks` against `errors`.
///
/// A click is credited when its `error_id` names an entry of `errors` that no
/// earlier click already credited; a repeated click on an already-credited key
/// earns nothing and lands in `false_positives`. That keeps `missed_errors`
/// non-negative and the score within 0..=100 even on adversarial click lists.
///
/// `no_errors_override` forces the no-error branch regardless of `errors`:
/// the player declared the code clean, so the question is graded as if the
/// answer key were empty. In that branch every surviving false positive costs
/// 25 points and the correct/missed counts are reported as zero.
pub fn score_clicks(clicks: &[Click], errors: &[ErrorSpec], no_errors_override: bool) -> ScoreResult {
  let known: HashSet<&str> = errors.iter().map(|e| e.id.as_str()).collect();
  let mut credited: HashSet<&str> = HashSet::new();
  for click in clicks {
    if let Some(id) = click.error_id.as_deref() {
      if known.contains(id) {
        credited.insert(id);
      }
    }
  }
  let correct_clicks = credited.len();
  let false_positives = clicks.len() - correct_clicks;
  let missed_errors = errors.len() - correct_clicks;

  if no_errors_override || errors.is_empty() {
    let penalty = 25.0 * false_positives as f32;
    let score = if false_positives == 0 { 100.0 } else { (100.0 - penalty).max(0.0) };
    return ScoreResult {
      score,
      correct_clicks: 0,
      false_positives,
      missed_errors: 0,
      breakdown: ScoreBreakdown {
        base_score: if false_positives == 0 { "100.0" } else { "0.0" }.to_string(),
        penalty: Penalty::Points(penalty),
        final_score: format!("{score:.1}"),
      },
    };
  }

  let precision =
    if clicks.is_empty() { 1.0 } else { correct_clicks as f32 / clicks.len() as f32 };
  let recall =
    if errors.is_empty() { 1.0 } else { correct_clicks as f32 / errors.len() as f32 };
  let f1 =
    if precision + recall > 0.0 { 2.0 * precision * recall / (precision + recall) } else { 0.0 };
  let score = f1 * 100.0;

  let penalty = if false_positives > 0 {
    Penalty::Note(format!("Precision: {:.1}%", precision * 100.0))
  } else {
    Penalty::Note("No false positives".to_string())
  };

  ScoreResult {
    score,
    correct_clicks,
    false_positives,
    missed_errors,
    breakdown: ScoreBreakdown {
      base_score: format!("{:.1}", recall * 100.0),
      penalty,
      final_score: format!("{score:.1}"),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn err(id: &str) -> ErrorSpec {
    ErrorSpec { id: id.into(), description: String::new() }
  }
  fn hit(id: &str) -> Click {
    Click { x: 0.0, y: 0.0, line: 0, error_id: Some(id.into()) }
  }
  fn miss() -> Click {
    Click { x: 0.0, y: 0.0, line: 0, error_id: None }
  }

  #[test]
  fn perfect_play_scores_one_hundred() {
    let r = score_clicks(&[hit("a"), hit("b")], &[err("a"), err("b")], false);
    assert_eq!(r.score, 100.0);
    assert_eq!(r.correct_clicks, 2);
    assert_eq!(r.false_positives, 0);
    assert_eq!(r.missed_errors, 0);
    assert_eq!(r.breakdown.base_score, "100.0");
    assert_eq!(r.breakdown.penalty, Penalty::Note("No false positives".into()));
    assert_eq!(r.breakdown.final_score, "100.0");
  }

  #[test]
  fn all_misses_score_zero() {
    let r = score_clicks(&[miss(), miss(), miss()], &[err("a"), err("b")], false);
    assert_eq!(r.score, 0.0);
    assert_eq!(r.correct_clicks, 0);
    assert_eq!(r.false_positives, 3);
    assert_eq!(r.missed_errors, 2);
    assert_eq!(r.breakdown.base_score, "0.0");
    assert_eq!(r.breakdown.penalty, Penalty::Note("Precision: 0.0%".into()));
  }

  #[test]
  fn clean_question_untouched_scores_one_hundred() {
    let r = score_clicks(&[], &[], false);
    assert_eq!(r.score, 100.0);
    assert_eq!((r.correct_clicks, r.false_positives, r.missed_errors), (0, 0, 0));
    assert_eq!(r.breakdown.base_score, "100.0");
    assert_eq!(r.breakdown.penalty, Penalty::Points(0.0));
    assert_eq!(r.breakdown.final_score, "100.0");
  }

  #[test]
  fn clean_question_charges_25_per_false_positive() {
    let r = score_clicks(&[miss()], &[], false);
    assert_eq!(r.score, 75.0);
    assert_eq!(r.false_positives, 1);
    assert_eq!(r.missed_errors, 0);
    assert_eq!(r.breakdown.base_score, "0.0");
    assert_eq!(r.breakdown.penalty, Penalty::Points(25.0));
    assert_eq!(r.breakdown.final_score, "75.0");
  }

  #[test]
  fn clean_question_score_floors_at_zero() {
    let clicks = vec![miss(), miss(), miss(), miss(), miss()];
    let r = score_clicks(&clicks, &[], false);
    assert_eq!(r.score, 0.0);
    assert_eq!(r.breakdown.penalty, Penalty::Points(125.0));
    assert_eq!(r.breakdown.final_score, "0.0");
  }

  #[test]
  fn mixed_precision_recall_case() {
    let errors = [err("x"), err("y"), err("z")];
    let r = score_clicks(&[hit("x"), miss()], &errors, false);
    assert_eq!(r.correct_clicks, 1);
    assert_eq!(r.false_positives, 1);
    assert_eq!(r.missed_errors, 2);
    assert!((r.score - 40.0).abs() < 1e-3, "score was {}", r.score);
    assert_eq!(r.breakdown.base_score, "33.3");
    assert_eq!(r.breakdown.penalty, Penalty::Note("Precision: 50.0%".into()));
    assert_eq!(r.breakdown.final_score, "40.0");
  }

  #[test]
  fn repeated_clicks_on_one_error_count_once() {
    let r = score_clicks(&[hit("a"), hit("a"), hit("a")], &[err("a"), err("b")], false);
    assert_eq!(r.correct_clicks, 1);
    assert_eq!(r.false_positives, 2);
    assert_eq!(r.missed_errors, 1);
    assert!(r.score <= 100.0);
    assert!((r.score - 40.0).abs() < 1e-3, "score was {}", r.score);
  }

  #[test]
  fn unknown_error_id_is_a_false_positive() {
    let r = score_clicks(&[hit("zzz")], &[err("a")], false);
    assert_eq!(r.correct_clicks, 0);
    assert_eq!(r.false_positives, 1);
    assert_eq!(r.missed_errors, 1);
    assert_eq!(r.score, 0.0);
  }

  #[test]
  fn no_clicks_with_errors_scores_zero_without_penalty_note() {
    let r = score_clicks(&[], &[err("a"), err("b")], false);
    assert_eq!(r.score, 0.0);
    assert_eq!((r.correct_clicks, r.false_positives, r.missed_errors), (0, 0, 2));
    assert_eq!(r.breakdown.base_score, "0.0");
    assert_eq!(r.breakdown.penalty, Penalty::Note("No false positives".into()));
  }

  #[test]
  fn override_grades_against_an_empty_key() {
    // Player declared "no errors" after clicking the real one: the matched
    // click is not a false positive, so no penalty applies.
    let r = score_clicks(&[hit("a")], &[err("a")], true);
    assert_eq!(r.score, 100.0);
    assert_eq!((r.correct_clicks, r.false_positives, r.missed_errors), (0, 0, 0));
    assert_eq!(r.breakdown.penalty, Penalty::Points(0.0));

    let r = score_clicks(&[miss()], &[err("a")], true);
    assert_eq!(r.score, 75.0);
    assert_eq!((r.correct_clicks, r.false_positives, r.missed_errors), (0, 1, 0));
  }

  #[test]
  fn scoring_is_deterministic() {
    let errors = [err("x"), err("y")];
    let clicks = [hit("x"), miss()];
    let a = score_clicks(&clicks, &errors, false);
    let b = score_clicks(&clicks, &errors, false);
    assert_eq!(a, b);
  }
}

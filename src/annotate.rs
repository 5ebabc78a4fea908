//! Annotation parsing: turns `<<…>>`-marked source lines into clean display
//! lines plus character-offset error spans.
//!
//! Pure and deterministic: same input, same output, no I/O and no clock.
//! Offsets are measured in characters, not bytes, so multi-byte lines and
//! browser-side column math agree.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{ErrorSpan, ParsedQuestion, Question};

/// One complete annotation: `<<` + capture (no `>` inside) + `>>`.
static ANNOTATION_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"<<([^>]*)>>").expect("annotation regex"));

/// Number of delimiter characters removed per annotation (`<<` plus `>>`).
const DELIM_CHARS: usize = 4;

/// Why a question body was rejected by the parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedAnnotation {
  #[error("empty annotation marker on line {line}")]
  Empty { line: usize },
  #[error("unterminated annotation marker on line {line}")]
  Unterminated { line: usize },
}

/// Parse a raw question into its playable form.
///
/// Each code line is scanned for `<<…>>` markers. For every marker we record
/// an [`ErrorSpan`] whose offsets point into the delimiter-stripped line:
/// the start is the marker's character position minus four characters per
/// marker already consumed on that line, and the end is start plus the
/// captured text length. Span ids are `"{line}:{start}"`, unique because two
/// spans on one line cannot share a start offset.
///
/// Rejected inputs:
/// - `<<>>` (nothing to find) is [`MalformedAnnotation::Empty`];
/// - any `<<` left over after stripping (unclosed or nested markers) is
///   [`MalformedAnnotation::Unterminated`].
///
/// A lone `>>` or single `<` is ordinary code and passes through untouched.
pub fn parse(raw: &Question) -> Result<ParsedQuestion, MalformedAnnotation> {
  let descriptions: HashMap<&str, &str> = raw
    .errors
    .iter()
    .map(|e| (e.id.as_str(), e.description.as_str()))
    .collect();

  let mut parsed_lines = Vec::with_capacity(raw.code.len());
  let mut spans = Vec::new();

  for (line_index, line) in raw.code.iter().enumerate() {
    let mut prior_matches = 0usize;
    for caps in ANNOTATION_RE.captures_iter(line) {
      let whole = caps.get(0).expect("group 0 always present");
      let text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
      if text.is_empty() {
        return Err(MalformedAnnotation::Empty { line: line_index });
      }
      let match_char_start = char_offset(line, whole.start());
      let start_pos = match_char_start - prior_matches * DELIM_CHARS;
      let end_pos = start_pos + text.chars().count();
      let description = descriptions
        .get(text)
        .filter(|d| !d.is_empty())
        .map(|d| d.to_string());
      spans.push(ErrorSpan {
        id: format!("{line_index}:{start_pos}"),
        line: line_index,
        start_pos,
        end_pos,
        text: text.to_string(),
        description,
      });
      prior_matches += 1;
    }

    let clean = ANNOTATION_RE.replace_all(line, "$1").into_owned();
    // Anything the regex did not consume is an opening with no close,
    // or a nested marker whose inner close was eaten by the outer capture.
    if clean.contains("<<") {
      return Err(MalformedAnnotation::Unterminated { line: line_index });
    }
    parsed_lines.push(clean);
  }

  Ok(ParsedQuestion {
    title: raw.title.clone(),
    difficulty: raw.difficulty,
    code: raw.code.clone(),
    errors: raw.errors.clone(),
    parsed_lines,
    spans,
  })
}

/// Character offset of byte position `byte_idx` within `s`.
fn char_offset(s: &str, byte_idx: usize) -> usize {
  s[..byte_idx].chars().count()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Difficulty, ErrorSpec};

  fn question(code: &[&str], errors: &[(&str, &str)]) -> Question {
    Question {
      title: "t".into(),
      difficulty: Difficulty::Intermediate,
      code: code.iter().map(|s| s.to_string()).collect(),
      errors: errors
        .iter()
        .map(|(id, d)| ErrorSpec { id: id.to_string(), description: d.to_string() })
        .collect(),
    }
  }

  fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end - start).collect()
  }

  #[test]
  fn single_span_offsets() {
    let q = question(&["total = <<sum(rewards)>>"], &[("sum(rewards)", "should sum scores")]);
    let p = parse(&q).expect("parse");
    assert_eq!(p.parsed_lines, vec!["total = sum(rewards)".to_string()]);
    assert_eq!(p.spans.len(), 1);
    let s = &p.spans[0];
    assert_eq!(s.line, 0);
    assert_eq!(s.start_pos, 8);
    assert_eq!(s.end_pos, 20);
    assert_eq!(s.text, "sum(rewards)");
    assert_eq!(s.id, "0:8");
    assert_eq!(s.description.as_deref(), Some("should sum scores"));
  }

  #[test]
  fn multiple_spans_one_line_account_for_removed_delimiters() {
    let q = question(&["a<<b>>c<<d>>e"], &[]);
    let p = parse(&q).expect("parse");
    assert_eq!(p.parsed_lines[0], "abcde");
    assert_eq!(p.spans.len(), 2);
    assert_eq!((p.spans[0].start_pos, p.spans[0].end_pos), (1, 2));
    assert_eq!((p.spans[1].start_pos, p.spans[1].end_pos), (3, 4));
    assert_eq!(p.spans[0].id, "0:1");
    assert_eq!(p.spans[1].id, "0:3");
  }

  #[test]
  fn spans_are_line_major_and_slices_match_text() {
    let q = question(
      &["def f():", "  x = <<1>> + <<2>>", "  return <<x * 0>>"],
      &[],
    );
    let p = parse(&q).expect("parse");
    let lines: Vec<usize> = p.spans.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![1, 1, 2]);
    for s in &p.spans {
      assert_eq!(char_slice(&p.parsed_lines[s.line], s.start_pos, s.end_pos), s.text);
    }
  }

  #[test]
  fn offsets_are_character_based_not_byte_based() {
    // "π" is 2 bytes; character math must not see that.
    let q = question(&["π = <<3.15>>"], &[]);
    let p = parse(&q).expect("parse");
    assert_eq!(p.parsed_lines[0], "π = 3.15");
    assert_eq!(p.spans[0].start_pos, 4);
    assert_eq!(p.spans[0].end_pos, 8);
    assert_eq!(char_slice(&p.parsed_lines[0], 4, 8), "3.15");
  }

  #[test]
  fn marker_free_lines_pass_through() {
    let q = question(&["let x = 1;", "x >> 2"], &[]);
    let p = parse(&q).expect("parse");
    assert_eq!(p.parsed_lines, q.code);
    assert!(p.spans.is_empty());
  }

  #[test]
  fn empty_marker_is_rejected() {
    let q = question(&["fine line", "x <<>> y"], &[]);
    assert_eq!(parse(&q), Err(MalformedAnnotation::Empty { line: 1 }));
  }

  #[test]
  fn unclosed_marker_is_rejected() {
    let q = question(&["foo(<<bar"], &[]);
    assert_eq!(parse(&q), Err(MalformedAnnotation::Unterminated { line: 0 }));
  }

  #[test]
  fn nested_markers_are_rejected() {
    let q = question(&["a <<b <<c>> d>> e"], &[]);
    assert_eq!(parse(&q), Err(MalformedAnnotation::Unterminated { line: 0 }));
  }

  #[test]
  fn lone_close_and_single_angle_are_ordinary_code() {
    let q = question(&["v = <<a>> >> 2", "if a < b >> 1:"], &[]);
    let p = parse(&q).expect("parse");
    assert_eq!(p.parsed_lines[0], "v = a >> 2");
    assert_eq!(p.parsed_lines[1], "if a < b >> 1:");
    assert_eq!(p.spans.len(), 1);
    assert_eq!((p.spans[0].start_pos, p.spans[0].end_pos), (4, 5));
  }

  #[test]
  fn description_lookup_is_by_literal_text() {
    let q = question(
      &["x = <<foo>>", "y = <<bar>>"],
      &[("bar", "bar is wrong"), ("unrelated", "ignored")],
    );
    let p = parse(&q).expect("parse");
    assert_eq!(p.spans[0].description, None);
    assert_eq!(p.spans[1].description.as_deref(), Some("bar is wrong"));
  }

  #[test]
  fn parse_is_deterministic() {
    let q = question(&["a <<b>> c", "d <<e>>"], &[("b", "x")]);
    let first = parse(&q).expect("parse");
    let second = parse(&q).expect("parse");
    assert_eq!(first.parsed_lines, second.parsed_lines);
    assert_eq!(first.spans, second.spans);
  }

  #[test]
  fn reparsing_clean_lines_yields_no_spans() {
    let q = question(&["x = <<1>> + <<2>>", "y >> 3"], &[]);
    let p = parse(&q).expect("parse");
    let again = question(
      &p.parsed_lines.iter().map(String::as_str).collect::<Vec<_>>(),
      &[],
    );
    let p2 = parse(&again).expect("clean lines reparse");
    assert!(p2.spans.is_empty());
    assert_eq!(p2.parsed_lines, p.parsed_lines);
  }
}

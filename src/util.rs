//! Small utility helpers used across modules.

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads. The cut point
/// backs up to a char boundary so multibyte payloads stay sliceable.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trunc_keeps_short_strings_and_cuts_long_ones() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let cut = trunc_for_log("0123456789abcdef", 8);
    assert!(cut.starts_with("01234567"));
    assert!(cut.contains("16 bytes total"));
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    // "é" is two bytes; a max landing mid-char must back up, not panic.
    let s = "ééééé";
    let cut = trunc_for_log(s, 3);
    assert!(cut.starts_with("é"));
    assert!(cut.contains("10 bytes total"));
  }
}

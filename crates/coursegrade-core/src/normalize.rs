//! Output normalization and comparison.
//!
//! Task authors type expected output by hand (often with literal `\n`
//! escapes) while execution services return real newlines, sometimes with
//! `\r\n` endings and trailing whitespace. Both sides go through
//! [`normalize`] before an exact comparison.

/// Canonicalize text for comparison.
///
/// - literal `\r\n` and `\n` escape sequences become newlines
/// - `\r\n` and lone `\r` become `\n`
/// - each line is trimmed
/// - leading and trailing blank lines are dropped
///
/// `normalize(&normalize(x)) == normalize(x)` for every input.
pub fn normalize(text: &str) -> String {
    let unescaped = text.replace("\\r\\n", "\n").replace("\\n", "\n");
    let unified = unescaped.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<&str> = unified.lines().map(str::trim).collect();
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());

    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Compare actual output against an expected string after normalizing both.
pub fn compare(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}

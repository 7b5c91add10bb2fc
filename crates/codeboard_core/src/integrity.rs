//! JSON integrity guard.
//!
//! The remote store has been observed to persist truncated document bodies
//! (a partial write that drops the tail of the JSON text). Before any remote
//! document is trusted, its body goes through [`check`]: well-formed text is
//! used as-is, text that is merely missing trailing closers is repaired by
//! appending them, and anything else is reported as corrupt.
//!
//! Repair never removes or reorders characters and never invents content;
//! it only closes structure that was opened. A body that ends in the middle
//! of a string literal is unrepairable, because finishing the string would
//! fabricate data.

use log::warn;

/// Outcome of running a document body through the integrity guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckedJson {
    /// The body parsed as-is; use the original text.
    Valid,
    /// The body was truncated but could be completed; use the repaired text.
    Repaired(String),
    /// The body is malformed beyond structural completion.
    Corrupt,
}

/// How a delimiter scan of the text ended.
#[derive(Debug, PartialEq, Eq)]
enum ScanOutcome {
    /// Every opened `{`/`[` was closed by the matching delimiter.
    Balanced,
    /// The text ended with open structures; contains the closers to append,
    /// innermost first.
    Unclosed(String),
    /// Mismatched or surplus closers, or the text ended inside a string.
    Broken,
}

/// Walk the text tracking delimiter nesting, skipping string literals.
///
/// String awareness matters: snippet bodies are code, and code is full of
/// unbalanced braces inside JSON string values. A naive character count
/// would misjudge perfectly valid documents.
fn scan_delimiters(text: &str) -> ScanOutcome {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return ScanOutcome::Broken;
                }
            }
            _ => {}
        }
    }

    if in_string {
        return ScanOutcome::Broken;
    }
    if stack.is_empty() {
        ScanOutcome::Balanced
    } else {
        ScanOutcome::Unclosed(stack.into_iter().rev().collect())
    }
}

/// Returns true if `text` is a complete, well-formed JSON document.
///
/// A document is valid only if its delimiters balance *and* standard JSON
/// parsing succeeds; the scan alone would accept e.g. `{"a":}`.
pub fn validate(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    scan_delimiters(trimmed) == ScanOutcome::Balanced
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

/// Attempt a structural repair of truncated JSON text.
///
/// Already-valid text is returned unchanged (trimmed). Text missing only
/// trailing `}`/`]` closers gets them appended and is re-validated. Returns
/// `None` when the text cannot be completed without inventing content.
pub fn repair(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if validate(trimmed) {
        return Some(trimmed.to_string());
    }

    match scan_delimiters(trimmed) {
        ScanOutcome::Unclosed(closers) => {
            let fixed = format!("{trimmed}{closers}");
            if validate(&fixed) { Some(fixed) } else { None }
        }
        // Balanced-but-unparseable or structurally broken text cannot be
        // fixed by appending closers.
        ScanOutcome::Balanced | ScanOutcome::Broken => None,
    }
}

/// Run a document body through validation and, if needed, repair.
///
/// Callers are always told whether repair happened: a repaired body must be
/// persisted back and reported, never silently substituted.
pub fn check(text: &str) -> CheckedJson {
    if validate(text) {
        return CheckedJson::Valid;
    }
    match repair(text) {
        Some(fixed) => {
            warn!("document body was truncated; repaired by appending closers");
            CheckedJson::Repaired(fixed)
        }
        None => CheckedJson::Corrupt,
    }
}

//! Sentinel framing for the entrypoint output contract.
//!
//! The workload prints arbitrary text (agent logs, tool chatter) around
//! exactly one structured payload, delimited by two literal marker lines.
//! Extraction is line-exact: a marker only counts when it is the entire
//! line, so the same text appearing inside a JSON string never opens or
//! closes a frame. The first start marker and the first end marker after
//! it win; anything after that pair is ignored.

use crate::errors::{HarnessError, Result};
use crate::models::response::InvocationResult;

/// Line that opens the structured output frame.
pub const OUTPUT_START: &str = "---NANOCLAW_OUTPUT_START---";

/// Line that closes the structured output frame.
pub const OUTPUT_END: &str = "---NANOCLAW_OUTPUT_END---";

/// Lines of context carried in a malformed-output diagnostic tail.
pub const TAIL_LINES: usize = 20;

/// Whether `line` is exactly `marker`, tolerating one trailing `\r`.
#[must_use]
pub fn is_marker_line(line: &str, marker: &str) -> bool {
    line.strip_suffix('\r').unwrap_or(line) == marker
}

/// Locate the winning `(start, end)` marker pair.
///
/// Returns indices into `lines`; `start < end` always holds. `None` when
/// no start marker exists or no end marker follows the first start.
#[must_use]
pub fn find_frame(lines: &[String]) -> Option<(usize, usize)> {
    let start = lines
        .iter()
        .position(|line| is_marker_line(line, OUTPUT_START))?;
    let end_offset = lines[start + 1..]
        .iter()
        .position(|line| is_marker_line(line, OUTPUT_END))?;
    Some((start, start + 1 + end_offset))
}

/// Extract the raw payload text between the winning marker pair.
///
/// # Errors
///
/// Returns [`HarnessError::MalformedOutput`] when either marker is
/// missing, with a bounded tail of the captured output for diagnosis.
pub fn extract_payload(lines: &[String]) -> Result<String> {
    let has_start = lines.iter().any(|line| is_marker_line(line, OUTPUT_START));
    match find_frame(lines) {
        Some((start, end)) => Ok(lines[start + 1..end].join("\n")),
        None if has_start => Err(malformed("no end marker after start marker", lines)),
        None => Err(malformed("no start marker in output", lines)),
    }
}

/// Decode the structured result out of a captured stdout transcript.
///
/// Always worth attempting regardless of the process exit code: the
/// entrypoint reports turn-level failures through the payload itself, so
/// a non-zero exit with a well-formed frame still decodes.
///
/// # Errors
///
/// Returns [`HarnessError::MalformedOutput`] when the frame is missing,
/// the enclosed region is empty, or the payload is not the expected JSON
/// shape (including an unrecognized `status` value).
pub fn decode_result(lines: &[String]) -> Result<InvocationResult> {
    let payload = extract_payload(lines)?;
    if payload.trim().is_empty() {
        return Err(malformed("empty payload between markers", lines));
    }
    serde_json::from_str(&payload).map_err(|err| HarnessError::MalformedOutput {
        reason: format!("payload is not a valid result document: {err}"),
        tail: clip_lines(&payload),
    })
}

fn malformed(reason: &str, lines: &[String]) -> HarnessError {
    let start = lines.len().saturating_sub(TAIL_LINES);
    HarnessError::MalformedOutput {
        reason: reason.to_owned(),
        tail: lines[start..].join("\n"),
    }
}

fn clip_lines(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}

//! Carries the exact JavaScript an action ran inside the transcript message
//! that reports its outcome.
//!
//! The code is appended after the outcome text between two fixed markers.
//! Display strips the block; saving a favorite decodes it. Every outcome
//! branch (success, failure, unexpected error) is encoded the same way, so
//! failing code can be recovered just like working code.

/// Opening marker, including the separator from the outcome text.
pub const CODE_BLOCK_START: &str = "\n\n<!-- executed-code:begin -->\n";
/// Closing marker.
pub const CODE_BLOCK_END: &str = "\n<!-- executed-code:end -->";

/// Canonical outcome phrasings used by the code-execution action.
pub const SUCCESS_PHRASE: &str = "Code executed successfully";
pub const FAILURE_PHRASE: &str = "Code execution failed";
pub const ERROR_PHRASE: &str = "Error executing code";

/// Appends `code` verbatim to `outcome_text` inside a delimited block.
pub fn encode(outcome_text: &str, code: &str) -> String {
    let mut out =
        String::with_capacity(outcome_text.len() + code.len() + CODE_BLOCK_START.len() + CODE_BLOCK_END.len());
    out.push_str(outcome_text);
    out.push_str(CODE_BLOCK_START);
    out.push_str(code);
    out.push_str(CODE_BLOCK_END);
    out
}

/// Returns `content` with every complete code block removed. Text outside the
/// blocks is left untouched, and an unterminated start marker stays as is.
pub fn strip_for_display(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some((start, end)) = block_bounds(rest) {
        out.push_str(&rest[..start]);
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Extracts the code from the block, if it is complete.
pub fn decode(content: &str) -> Option<String> {
    let (start, end) = block_bounds(content)?;
    let inner = &content[start + CODE_BLOCK_START.len()..end - CODE_BLOCK_END.len()];
    Some(inner.to_string())
}

/// True when the display text reads like a code-execution outcome of any
/// kind. Used to offer "save this code" for messages whose block is missing.
pub fn is_code_outcome(content: &str) -> bool {
    let display = strip_for_display(content);
    [SUCCESS_PHRASE, FAILURE_PHRASE, ERROR_PHRASE]
        .iter()
        .any(|phrase| display.contains(phrase))
}

/// Byte range of the block, markers included. The block runs from the first
/// start marker to the last end marker, since `encode` always puts it last and
/// the code itself may contain either marker.
fn block_bounds(content: &str) -> Option<(usize, usize)> {
    let start = content.find(CODE_BLOCK_START)?;
    let body_start = start + CODE_BLOCK_START.len();
    let end_offset = content[body_start..].rfind(CODE_BLOCK_END)?;
    Some((start, body_start + end_offset + CODE_BLOCK_END.len()))
}

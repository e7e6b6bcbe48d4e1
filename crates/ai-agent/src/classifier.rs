//! Lexical detection of self-contained, in-page JavaScript tasks.
//!
//! A false positive skips planning for a task that may need decomposition, so
//! every rule here errs towards answering `false`. Any sign of multi-step
//! browsing or research work in the prose vetoes the fast path outright.

use once_cell::sync::Lazy;
use regex::Regex;

/// Fenced markdown code blocks, removed before the prose checks run.
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?(```|$)").expect("valid fenced block regex"));

/// Explicit requests to run JavaScript in the page: "use JS to ...",
/// "run some javascript", "inject javascript". Mentions that only name the
/// language ("with JavaScript", "using JavaScript examples") do not count.
static JS_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(use|using)\s+(javascript|js)\s+to\b|\b(run|running|execute|executing|inject|injecting)\s+(a\s+|some\s+|the\s+|this\s+)?(javascript|js)\b",
    )
    .expect("valid js intent regex")
});

/// Questions and learning requests are answered by the model, not run.
static EXPLANATORY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(explain|explains|teach|tutorial|learn|learning|help\s+me\s+(with|understand)|what\s+(is|are|does)|how\s+(do|does|can|to)|why)\b",
    )
    .expect("valid explanatory regex")
});

/// Requests to execute code or a script against the current page.
static CODE_EXECUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(run|execute|inject|evaluate)\s+(a\s+|some\s+|this\s+|the\s+following\s+|the\s+)?(code|script|snippet)\b",
    )
    .expect("valid code execution regex")
});

/// DOM API tokens that only show up when someone is talking code: selectors,
/// style and visibility manipulation on `document`/elements.
static DOM_API: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(document\.(body|queryselector|queryselectorall|getelementbyid|getelementsbyclassname|getelementsbytagname)\b|\.style\.[a-z]+|\.classlist\.|\.(innerhtml|innertext|textcontent)\b)",
    )
    .expect("valid dom api regex")
});

/// Function declaration followed by an open parenthesis, named or anonymous.
static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bfunction\s*[A-Za-z_$]?[\w$]*\s*\(").expect("valid function regex")
});

/// Arrow function: a parameter list or identifier followed by `=>`.
static ARROW_FN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\)|[\w$])\s*=>").expect("valid arrow function regex"));

/// Vocabulary of tasks that need navigation, research or several steps.
static MULTI_STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(search|research|compare|find|look\s+up|browse|navigate|go\s+to|visit|open|summari[sz]e|book|buy|purchase|order|sign\s+in|log\s+in|login|download|then|afterwards|after\s+that|each\s+page|every\s+page|other\s+sites?|websites)\b",
    )
    .expect("valid multi-step regex")
});

/// Returns true when `task` reads as a single, self-contained client-side
/// JavaScript task that can run without a planning pass.
///
/// Pure and deterministic; never calls out to a model.
pub fn is_client_side_js_task(task: &str) -> bool {
    let trimmed = task.trim();
    if trimmed.is_empty() {
        return false;
    }

    let prose = FENCED_BLOCK.replace_all(trimmed, " ").to_lowercase();
    if MULTI_STEP.is_match(&prose) || EXPLANATORY.is_match(&prose) {
        return false;
    }

    contains_inline_code(trimmed)
        || JS_INTENT.is_match(&prose)
        || CODE_EXECUTION.is_match(&prose)
        || DOM_API.is_match(&prose)
}

/// True when the task text itself carries code: a fence, a function
/// declaration or an arrow function.
fn contains_inline_code(task: &str) -> bool {
    task.contains("```") || FUNCTION_DECL.is_match(task) || ARROW_FN.is_match(task)
}

//! LLM-driven triple extraction.
//!
//! Prompts the model for a JSON array of `{subject, predicate, object}`
//! objects, then parses the response defensively: models routinely prepend
//! prose they were told not to produce, break strings with `+`
//! concatenation, or wrap lines mid-value. Parsing tolerates all of that;
//! whole-response failures are retried with linear backoff and degrade to
//! an empty list — extraction never raises past its own boundary.

use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{backoff_sleep, LlmClient, LlmError};
use crate::models::Triple;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("no JSON array found in model output")]
    NoArray,
    #[error("invalid JSON in model output: {0}")]
    Json(String),
    #[error("model output is not a JSON array")]
    NotAnArray,
}

const EXTRACTION_PROMPT: &str = r#"Extract semantic knowledge triples (subject, predicate, object) from the following text.

Text:
"""{TEXT}"""

At the end, return only a JSON array like this:
[
  { "subject": "NASA", "predicate": "launched", "object": "Artemis I" },
  ...
]

Strictly return only the JSON array. No explanations or extra text.
Ensure the output is valid JSON. Do not use '+' for string concatenation."#;

/// Extracts triples from chunk text via the language model.
pub struct TripleExtractor<'a> {
    llm: &'a LlmClient,
    model: String,
    max_retries: u32,
    backoff_ms: u64,
}

impl<'a> TripleExtractor<'a> {
    pub fn new(llm: &'a LlmClient, model: &str, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            llm,
            model: model.to_string(),
            max_retries,
            backoff_ms,
        }
    }

    /// Best-effort extraction: retries the full call-and-parse cycle, then
    /// gives up with an empty list. "No triples found" and "extraction
    /// failed" are deliberately indistinguishable to callers.
    pub async fn extract(&self, text: &str, scope: &str) -> Vec<Triple> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let prompt = EXTRACTION_PROMPT.replace("{TEXT}", trimmed);

        for attempt in 1..=self.max_retries {
            let result = match self.llm.generate(&prompt, None, Some(&self.model)).await {
                Ok(raw) => parse_triples(&raw, scope),
                Err(e) => Err(ExtractError::Llm(e)),
            };

            match result {
                Ok(triples) => {
                    debug!(scope, count = triples.len(), "extracted triples");
                    return triples;
                }
                Err(e) => {
                    warn!(
                        scope,
                        attempt,
                        max = self.max_retries,
                        error = %e,
                        "triple extraction attempt failed"
                    );
                    if attempt < self.max_retries {
                        backoff_sleep(attempt, self.backoff_ms).await;
                    }
                }
            }
        }

        warn!(scope, "triple extraction gave up, treating chunk as empty");
        Vec::new()
    }
}

/// Parse the model's raw output into normalized triples.
///
/// Locates the first `[...]` substring (leading prose is tolerated), strips
/// `+` concatenation artifacts and newline runs, parses JSON, and drops
/// elements missing any of the three string fields. Structural failures
/// (no array, bad JSON, non-array root) are errors so the caller can
/// retry; element-level defects are not.
pub fn parse_triples(raw: &str, scope: &str) -> Result<Vec<Triple>, ExtractError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExtractError::NoArray);
    }

    let start = raw.find('[').ok_or(ExtractError::NoArray)?;
    let end = find_array_end(&raw[start..]).ok_or(ExtractError::NoArray)? + start;
    let array = &raw[start..=end];

    let cleaned = cleanup_artifacts(array);

    let value: serde_json::Value =
        serde_json::from_str(&cleaned).map_err(|e| ExtractError::Json(e.to_string()))?;
    let items = value.as_array().ok_or(ExtractError::NotAnArray)?;

    let mut triples = Vec::new();
    for item in items {
        let subject = item.get("subject").and_then(|v| v.as_str());
        let predicate = item.get("predicate").and_then(|v| v.as_str());
        let object = item.get("object").and_then(|v| v.as_str());

        match (subject, predicate, object) {
            (Some(s), Some(p), Some(o)) if !s.trim().is_empty() && !p.trim().is_empty() && !o.trim().is_empty() => {
                triples.push(Triple::normalized(s, p, o, scope));
            }
            _ => {
                warn!(scope, element = %item, "dropping malformed triple element");
            }
        }
    }

    Ok(triples)
}

/// Byte index of the `]` that closes the array starting at `s[0] == '['`.
///
/// The first `]` is not necessarily it: string values may contain brackets
/// (`"object": "Apollo [11]"`). The array only ends at a `]` whose last
/// non-whitespace predecessor is a closing `}` (or the opening `[` itself,
/// for an empty array).
fn find_array_end(s: &str) -> Option<usize> {
    let mut prev = '[';
    for (i, c) in s.char_indices().skip(1) {
        if c == ']' && matches!(prev, '}' | '[') {
            return Some(i);
        }
        if !c.is_whitespace() {
            prev = c;
        }
    }
    None
}

/// Remove common LLM JSON artifacts: `+` string concatenation and newline
/// runs (with their indentation) collapsed to single spaces.
fn cleanup_artifacts(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '+' => {}
            '\n' | '\r' => {
                while matches!(chars.peek(), Some(' ' | '\t' | '\n' | '\r')) {
                    chars.next();
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

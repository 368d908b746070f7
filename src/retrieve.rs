//! Hybrid question answering.
//!
//! Pipeline per question: rewrite → vector search → keyword extraction →
//! graph query → synthesis. The rewrite degrades to the original question,
//! a missing vector index fails the whole answer, and synthesis with no
//! supporting data short-circuits to a fixed message without touching the
//! model. Conversation history is a value passed in and returned; the
//! caller owns its persistence and resets it on scope changes.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::Config;
use crate::graph::GraphStore;
use crate::keywords::extract_keywords;
use crate::llm::{backoff_sleep, LlmClient};
use crate::models::{ChatMessage, ConversationState, Triple};
use crate::vector;

/// Fixed response when neither vector search nor the graph produced
/// anything to ground an answer on. Returned without a model call.
pub const NO_INFORMATION_MESSAGE: &str = "Sorry, I couldn't find any relevant information.";

const REWRITE_SYSTEM_PROMPT: &str = "You are an AI assistant that rewrites vague or informal user \
    questions into clearer, more specific ones suitable for knowledge base search. Do not add any \
    comments, explanations, or labels. Return only the improved question.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a helpful assistant called Cairn.\n\n\
    Your role is to answer the user's questions based on:\n\
    - A list of structured triples from a knowledge graph\n\
    - A list of retrieved text chunks\n\n\
    If the user's message is only a greeting, greet them back.\n\n\
    Otherwise, answer strictly and only from the provided data. Never guess or hallucinate. \
    If the provided data is insufficient to answer, say so.";

/// Answer a question against a scope.
///
/// Returns the answer text and the updated conversation history. The
/// history comes back unchanged when the answer did not involve the model
/// (fixed no-information message) or when synthesis failed after retries
/// (the answer is then an explicit `Error:`-prefixed string, never a
/// silent empty one).
pub async fn answer_question(
    config: &Config,
    pool: &SqlitePool,
    llm: &LlmClient,
    scope: &str,
    question: &str,
    history: ConversationState,
) -> Result<(String, ConversationState)> {
    let rewritten = rewrite_question(config, llm, question).await;
    debug!(scope, rewritten = %rewritten, "rewrote question");

    // A scope without a knowledge base is a hard error, not an empty result.
    let chunks = vector::search(
        pool,
        &config.embedding,
        scope,
        &rewritten,
        config.retrieval.top_k,
    )
    .await?;

    let keywords = extract_keywords(&chunks, config.retrieval.keyword_top_k);
    debug!(scope, ?keywords, "extracted keywords");

    let graph = GraphStore::new(pool.clone());
    let triples = graph
        .find_by_keywords(scope, &keywords, config.retrieval.graph_limit)
        .await?;

    synthesize(config, llm, &rewritten, &chunks, &triples, history).await
}

/// Rewrite the question for clarity; fall back to the original text if the
/// model cannot be reached. Never blocks the pipeline.
async fn rewrite_question(config: &Config, llm: &LlmClient, question: &str) -> String {
    let prompt = format!(
        "Original Question:\n{}\n\nImproved Question (return only the question, no other text):",
        question
    );

    for attempt in 1..=config.llm.max_retries {
        match llm
            .generate(&prompt, Some(REWRITE_SYSTEM_PROMPT), None)
            .await
        {
            Ok(rewritten) => return rewritten,
            Err(e) => {
                warn!(attempt, max = config.llm.max_retries, error = %e, "rewrite attempt failed");
                if attempt < config.llm.max_retries {
                    backoff_sleep(attempt, config.llm.backoff_ms).await;
                }
            }
        }
    }

    question.to_string()
}

/// Combine chunks and triples into the synthesis prompt and run one chat
/// turn over the accumulated history.
///
/// Short-circuits with [`NO_INFORMATION_MESSAGE`] when there is nothing to
/// ground an answer on. On model failure after retries, returns an
/// `Error:`-prefixed string and the history untouched — no partial
/// assistant turn is ever appended.
pub async fn synthesize(
    config: &Config,
    llm: &LlmClient,
    question: &str,
    chunks: &[String],
    triples: &[Triple],
    history: ConversationState,
) -> Result<(String, ConversationState)> {
    if chunks.is_empty() && triples.is_empty() {
        return Ok((NO_INFORMATION_MESSAGE.to_string(), history));
    }

    let cleaned_chunks: Vec<String> = chunks.iter().map(|c| sanitize_chunk(c)).collect();
    let triple_lines: Vec<String> = triples
        .iter()
        .map(|t| format!("({}, {}, {})", t.subject, t.predicate, t.object))
        .collect();

    let user_prompt = format!(
        "Question:\n{}\n\nGraph Triples:\n{}\n\nText Chunks:\n{}\n\nAnswer:",
        question,
        triple_lines.join("\n"),
        cleaned_chunks.join("\n---\n")
    );

    let mut messages = history.messages.clone();
    if !history.has_system_message() {
        messages.insert(0, ChatMessage::system(SYNTHESIS_SYSTEM_PROMPT));
    }
    messages.push(ChatMessage::user(&user_prompt));

    let mut last_err = None;
    for attempt in 1..=config.llm.max_retries {
        match llm.chat(&messages, None).await {
            Ok(reply) => {
                messages.push(ChatMessage::assistant(&reply));
                return Ok((reply, ConversationState { messages }));
            }
            Err(e) => {
                warn!(attempt, max = config.llm.max_retries, error = %e, "synthesis attempt failed");
                last_err = Some(e);
                if attempt < config.llm.max_retries {
                    backoff_sleep(attempt, config.llm.backoff_ms).await;
                }
            }
        }
    }

    let reason = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown failure".to_string());
    Ok((
        format!(
            "Error: the language model did not respond after {} attempts ({})",
            config.llm.max_retries, reason
        ),
        history,
    ))
}

/// Clean a retrieved chunk for prompt inclusion: decode escape sequences,
/// strip non-linguistic symbols, collapse repeated whitespace.
fn sanitize_chunk(text: &str) -> String {
    let decoded = decode_escapes(text);

    let filtered: String = decoded
        .chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(c, '.' | ',' | ':' | ';' | '(' | ')' | '-' | '\'' | '"' | '%')
        })
        .collect();

    collapse_whitespace(&filtered)
}

/// Decode literal backslash escapes (`\n`, `\t`, `\r`, `\"`, `\'`, `\\`,
/// `\uXXXX`) that survive from JSON-serialized chunk text.
fn decode_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Collapse newline runs to one newline, then any remaining run of two or
/// more whitespace characters to a single space.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();

    for c in text.chars() {
        if c.is_whitespace() {
            run.push(c);
            continue;
        }
        flush_whitespace_run(&mut out, &run);
        run.clear();
        out.push(c);
    }
    flush_whitespace_run(&mut out, &run);

    out.trim().to_string()
}

fn flush_whitespace_run(out: &mut String, run: &str) {
    let newlines = run.chars().filter(|&c| c == '\n').count();
    match run.chars().count() {
        0 => {}
        1 => out.push_str(run),
        _ => {
            if newlines > 0 && run.chars().all(|c| c == '\n') {
                out.push('\n');
            } else {
                out.push(' ');
            }
        }
    }
}

//! Auto-Recall Pipeline
//!
//! Pure stages of the recall flow: query extraction from the user prompt
//! and rendering of the injection envelope. The engine wires these to the
//! searcher, allocator, and store.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::allocation::AllocatedMemory;
use crate::memory::CurrentContext;

// ============================================================================
// QUERY EXTRACTION
// ============================================================================

/// Maximum number of extracted terms
const MAX_QUERY_TERMS: usize = 20;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "could", "did",
        "do", "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is",
        "it", "its", "just", "me", "my", "no", "not", "of", "on", "or", "our", "please", "shall",
        "should", "so", "some", "than", "that", "the", "their", "them", "then", "there", "these",
        "they", "this", "to", "was", "we", "were", "what", "when", "where", "which", "who", "why",
        "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Extract a lexical query from a user prompt.
///
/// Lowercases, tokenizes on non-word characters, drops stop-words and pure
/// numerics, deduplicates preserving order, caps at 20 terms, and joins
/// with `" OR "`. Falls back to the raw prompt when nothing survives.
pub fn extract_query(prompt: &str) -> String {
    let lowered = prompt.to_lowercase();
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for token in lowered.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.is_empty() || STOP_WORDS.contains(token) {
            continue;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if seen.insert(token.to_string()) {
            terms.push(token.to_string());
            if terms.len() == MAX_QUERY_TERMS {
                break;
            }
        }
    }

    if terms.is_empty() {
        prompt.to_string()
    } else {
        terms.join(" OR ")
    }
}

// ============================================================================
// INJECTION ENVELOPE
// ============================================================================

/// Escape text for the XML envelope.
pub fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the injection envelope the host prepends to the agent's context.
///
/// ```text
/// <relevant-memories>
///   <current-context>
///     {escaped text}
///   </current-context>
///   <memory id="..." tier="HOT" type="factual" pinned="true">
///     {escaped text}
///   </memory>
/// </relevant-memories>
/// ```
///
/// The current-context block is omitted when no context is active.
pub fn render_envelope(context: Option<&CurrentContext>, selected: &[AllocatedMemory]) -> String {
    let mut out = String::from("<relevant-memories>\n");

    if let Some(ctx) = context {
        out.push_str("  <current-context>\n");
        out.push_str("    ");
        out.push_str(&xml_escape(&ctx.text));
        out.push('\n');
        out.push_str("  </current-context>\n");
    }

    for item in selected {
        let pinned_attr = if item.memory.pinned { " pinned=\"true\"" } else { "" };
        out.push_str(&format!(
            "  <memory id=\"{}\" tier=\"{}\" type=\"{}\"{}>\n",
            xml_escape(&item.memory.id),
            item.memory.tier.as_str(),
            item.memory.memory_type.as_str(),
            pinned_attr,
        ));
        out.push_str("    ");
        out.push_str(&xml_escape(&item.memory.text));
        out.push('\n');
        out.push_str("  </memory>\n");
    }

    out.push_str("</relevant-memories>");
    out
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One injected memory, as reported in recall diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectedMemory {
    pub id: String,
    pub tier: String,
    pub memory_type: String,
    pub pinned: bool,
    pub score: f64,
}

/// Outcome of one recall invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    /// The envelope to prepend, or `None` when nothing was selected
    pub prepended_context: Option<String>,
    pub injected: Vec<InjectedMemory>,
    /// Candidates inspected by the allocator
    pub considered: usize,
    pub excluded: usize,
    /// The lexical query actually issued
    pub query: String,
}

impl RecallResult {
    pub fn empty() -> Self {
        Self {
            prepended_context: None,
            injected: Vec::new(),
            considered: 0,
            excluded: 0,
            query: String::new(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Keyword Search Helpers
//!
//! FTS5 MATCH treats many characters as syntax (`-`, `"`, `*`, parens,
//! column filters). User prompts and extracted queries are sanitized before
//! the first attempt; callers fall back to a quoted literal phrase when the
//! sanitized form still fails to parse.

/// Sanitize a free-text query for FTS5 MATCH.
///
/// Keeps alphanumeric/underscore runs as bare terms and preserves the OR
/// operator (the recall query extractor joins terms with `" OR "`).
/// Everything else is dropped.
pub fn sanitize_fts5_query(query: &str) -> String {
    let mut terms: Vec<String> = Vec::new();

    for token in query.split_whitespace() {
        if token == "OR" && !terms.is_empty() {
            // keep the operator only between terms
            if terms.last().map(|t| t != "OR").unwrap_or(false) {
                terms.push("OR".to_string());
            }
            continue;
        }

        let cleaned: String = token
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if !cleaned.is_empty() {
            terms.push(cleaned);
        }
    }

    // a trailing operator is a syntax error
    while terms.last().map(|t| t == "OR").unwrap_or(false) {
        terms.pop();
    }

    terms.join(" ")
}

/// Quote the whole query as one literal phrase, doubling embedded quotes.
/// Used as the retry form when the sanitized query still fails to parse.
pub fn quote_as_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

//! Auto-Capture Filter
//!
//! Decides which agent outputs are worth persisting. The pipeline gates on
//! whole-body noise, segments the output, filters by length and per-segment
//! noise, classifies each candidate into a memory type, ranks by salience,
//! and hands the survivors to the engine for dedup and persistence.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryType;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Capture knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    /// Segments shorter than this are dropped
    pub min_length: usize,
    /// Segments longer than this are re-split, then dropped if still long
    pub max_length: usize,
    /// Accepted memories per turn
    pub max_captures: usize,
    /// Cosine similarity at or above which a candidate is a duplicate
    pub dedup_threshold: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 500,
            max_captures: 3,
            dedup_threshold: 0.95,
        }
    }
}

// ============================================================================
// REPORT TYPES
// ============================================================================

/// Why the whole turn was skipped without segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureGate {
    /// Capture disabled globally or for this session type
    Disabled,
    /// The turn was reported unsuccessful
    TurnFailed,
    /// The whole output matched a noise pattern
    NoiseBody,
}

/// Outcome of one capture invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    /// Ids of the memories persisted this turn, in acceptance order
    pub captured: Vec<String>,
    /// Segments produced by segmentation
    pub considered: usize,
    pub skipped_noise: usize,
    pub skipped_length: usize,
    pub skipped_duplicates: usize,
    /// Set when the pipeline stopped before segmentation
    pub gate: Option<CaptureGate>,
}

impl CaptureReport {
    pub fn gated(gate: CaptureGate) -> Self {
        Self {
            captured: Vec::new(),
            considered: 0,
            skipped_noise: 0,
            skipped_length: 0,
            skipped_duplicates: 0,
            gate: Some(gate),
        }
    }
}

/// A salient segment awaiting dedup and persistence.
#[derive(Debug, Clone)]
pub struct CaptureCandidate {
    pub text: String,
    pub memory_type: MemoryType,
    pub salience: f64,
}

// ============================================================================
// PATTERN SETS
// ============================================================================

static NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // channel-metadata markers: [channel id: ...], [Telegram message id: 42]
        r"(?i)^\s*\[[^\]]*\b(?:channel|message|msg)[ _-]?id\b[^\]]*\]",
        // leading timestamps
        r"^\s*\[?\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}",
        r"^\s*\[\d{1,2}:\d{2}(?::\d{2})?\]",
        // tool-call payload markers
        r"(?i)^\s*(?:<tool_(?:call|use|result)\b|\[tool[ _-]?(?:call|use|result))",
        // whole XML-tag bodies
        r"(?s)^\s*<[a-zA-Z][\w-]*[^>]*>.*</[a-zA-Z][\w-]*>\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern compiles"))
    .collect()
});

static PROCEDURAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bhow to\b",
        r"(?i)\bstep \d",
        r"(?i)\b(?:first|then|next|finally)\b",
        r"(?i)\b(?:run|install|configure|execute|invoke)\b",
        r"(?i)\bcommand\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("classifier pattern compiles"))
    .collect()
});

static PROJECT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:project|repo|repository)\b",
        r"(?i)\b(?:module|crate|package)\b",
        r"(?i)\b(?:branch|release|milestone|deadline)\b",
        r"(?i)\b(?:ticket|issue|deploy)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("classifier pattern compiles"))
    .collect()
});

static EPISODIC_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:today|yesterday|this morning|tonight)\b",
        r"(?i)\bwe (?:discussed|decided|agreed|tried)\b",
        r"(?i)\b(?:meeting|session|conversation)\b",
        r"(?i)\b(?:earlier|last (?:week|night|time))\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("classifier pattern compiles"))
    .collect()
});

static FACTUAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:is|are|was|were)\b",
        r"(?i)\b(?:means|defined as|refers to)\b",
        r"(?i)\b(?:consists of|contains|equals)\b",
        r"(?i)\b(?:always|never)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("classifier pattern compiles"))
    .collect()
});

static SALIENCE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:note|important|remember|key|critical|essential)\b")
        .expect("keyword pattern compiles")
});

static CODE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```|`[^`\n]+`").expect("code pattern compiles"));

static LIST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+").expect("list pattern compiles"));

// ============================================================================
// FILTER
// ============================================================================

/// Stateless segmentation, classification, and salience scoring.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFilter {
    config: CaptureConfig,
}

impl Default for CaptureFilter {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}

impl CaptureFilter {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> CaptureConfig {
        self.config
    }

    /// Whether a body of text matches any noise pattern.
    pub fn is_noise(&self, text: &str) -> bool {
        NOISE_PATTERNS.iter().any(|p| p.is_match(text))
    }

    /// Split an output into candidate segments: blank lines first, then
    /// sentences for over-long segments, then words as a last resort.
    pub fn segment(&self, text: &str) -> Vec<String> {
        let mut segments = Vec::new();

        for block in split_blank_lines(text) {
            if block.chars().count() < self.config.max_length {
                segments.push(block);
                continue;
            }
            for sentence in split_sentences(&block) {
                if sentence.chars().count() < self.config.max_length {
                    segments.push(sentence);
                } else {
                    segments.extend(split_words(&sentence, self.config.max_length));
                }
            }
        }

        segments
    }

    /// Classify a segment against the four pattern sets. Returns the best
    /// type and the fraction of its patterns that matched.
    pub fn classify(&self, text: &str) -> (MemoryType, f64) {
        let sets: [(MemoryType, &Lazy<Vec<Regex>>); 4] = [
            (MemoryType::Procedural, &PROCEDURAL_PATTERNS),
            (MemoryType::Project, &PROJECT_PATTERNS),
            (MemoryType::Episodic, &EPISODIC_PATTERNS),
            (MemoryType::Factual, &FACTUAL_PATTERNS),
        ];

        let mut best = (MemoryType::Factual, 0.0_f64);
        for (memory_type, patterns) in sets {
            let matched = patterns.iter().filter(|p| p.is_match(text)).count();
            let fraction = matched as f64 / patterns.len() as f64;
            if fraction > best.1 {
                best = (memory_type, fraction);
            }
        }
        best
    }

    /// Salience estimate in [0, 1].
    pub fn salience(&self, text: &str, pattern_fraction: f64) -> f64 {
        let length_ratio =
            (text.chars().count() as f64 / self.config.max_length as f64).min(1.0);

        let mut salience = pattern_fraction.max(0.1) + length_ratio * 0.2;
        if CODE_SPAN.is_match(text) {
            salience += 0.3;
        }
        if SALIENCE_KEYWORDS.is_match(text) {
            salience += 0.2;
        }
        if LIST_LINE.is_match(text) {
            salience += 0.15;
        }
        salience.min(1.0)
    }

    /// Run segmentation, filtering, classification, and ranking. Returns
    /// the ranked candidates (at most `2 * max_captures`) plus the skip
    /// counts for the report.
    pub fn candidates(&self, output: &str) -> (Vec<CaptureCandidate>, CaptureReport) {
        let mut report = CaptureReport {
            captured: Vec::new(),
            considered: 0,
            skipped_noise: 0,
            skipped_length: 0,
            skipped_duplicates: 0,
            gate: None,
        };

        let mut candidates = Vec::new();
        for segment in self.segment(output) {
            report.considered += 1;

            let len = segment.chars().count();
            if len < self.config.min_length || len > self.config.max_length {
                report.skipped_length += 1;
                continue;
            }
            if self.is_noise(&segment) {
                report.skipped_noise += 1;
                continue;
            }

            let (memory_type, fraction) = self.classify(&segment);
            let salience = self.salience(&segment, fraction);
            candidates.push(CaptureCandidate {
                text: segment,
                memory_type,
                salience,
            });
        }

        candidates.sort_by(|a, b| {
            b.salience
                .partial_cmp(&a.salience)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(2 * self.config.max_captures);

        (candidates, report)
    }
}

// ============================================================================
// SEGMENTATION HELPERS
// ============================================================================

fn split_blank_lines(text: &str) -> Vec<String> {
    static BLANK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("blank pattern"));
    BLANK
        .split(text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split on sentence boundaries: `.`, `!`, or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = i + c.len_utf8();
                    let sentence = text[start..end].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence.to_string());
                    }
                    start = end;
                }
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Last resort: accumulate words into chunks under `max_length` chars.
fn split_words(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len >= max_length {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ============================================================================
// TESTS
// ============================================================================

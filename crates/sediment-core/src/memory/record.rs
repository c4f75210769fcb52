//! Memory Record - The fundamental unit of storage
//!
//! Each record is a persisted text fragment with:
//! - Lifecycle placement (tier) and type-dependent decay behavior
//! - Access statistics driving promotion and frequency scoring
//! - Pin and soft-forget flags
//! - Provenance metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Types of memories. Controls the recency half-life and decay TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// How-to knowledge: commands, procedures, workflows
    Procedural,
    /// Discrete facts and definitions
    #[default]
    Factual,
    /// Project-scoped knowledge: repos, milestones, decisions
    Project,
    /// Session events and experiences; decays fastest
    Episodic,
}

impl MemoryType {
    /// All variants, in declaration order
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Procedural,
        MemoryType::Factual,
        MemoryType::Project,
        MemoryType::Episodic,
    ];

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Procedural => "procedural",
            MemoryType::Factual => "factual",
            MemoryType::Project => "project",
            MemoryType::Episodic => "episodic",
        }
    }

    /// Strict parse. Unknown names are a schema error on load, so this
    /// returns `None` instead of defaulting.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "procedural" => Some(MemoryType::Procedural),
            "factual" => Some(MemoryType::Factual),
            "project" => Some(MemoryType::Project),
            "episodic" => Some(MemoryType::Episodic),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TIERS
// ============================================================================

/// Placement class. Controls decay rate and injection priority:
/// HOT > WARM > COLD > ARCHIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[default]
    Hot,
    Warm,
    Cold,
    Archive,
}

impl Tier {
    /// Convert to the canonical uppercase name used in storage and in the
    /// injection envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "HOT",
            Tier::Warm => "WARM",
            Tier::Cold => "COLD",
            Tier::Archive => "ARCHIVE",
        }
    }

    /// Strict parse (case-insensitive). Unknown names are a schema error.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "HOT" => Some(Tier::Hot),
            "WARM" => Some(Tier::Warm),
            "COLD" => Some(Tier::Cold),
            "ARCHIVE" => Some(Tier::Archive),
            _ => None,
        }
    }

    /// The tier one demotion step down, if any.
    pub fn demoted(&self) -> Option<Tier> {
        match self {
            Tier::Hot => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Cold),
            Tier::Cold => Some(Tier::Archive),
            Tier::Archive => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A persisted memory fragment with lifecycle metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4, string form)
    pub id: String,
    /// Raw content
    pub text: String,
    /// Type of memory; controls the decay half-life
    pub memory_type: MemoryType,
    /// Placement class
    pub tier: Tier,
    /// Static weighting hint in [0, 1]
    pub importance: f64,
    /// Exempt from decay; gets a priority allocation slot
    pub pinned: bool,
    /// Soft-forgotten: excluded from automatic injection
    pub do_not_inject: bool,
    /// Lifetime access counter
    pub use_count: i64,
    /// Timestamp of last read
    pub last_accessed_at: DateTime<Utc>,
    /// Distinct calendar dates (YYYY-MM-DD, UTC) on which the memory was
    /// read. Deduplicated and sorted.
    pub use_days: Vec<String>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// Provenance: where the text came from (e.g. "auto-capture", "user")
    pub source: Option<String>,
    /// Free-form category label
    pub category: Option<String>,
    /// Parent memory, when this fragment was derived from another
    pub parent_id: Option<String>,
}

impl MemoryRecord {
    /// Create a record with fresh timestamps and a new id.
    pub fn new(text: impl Into<String>, memory_type: MemoryType, tier: Tier) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            memory_type,
            tier,
            importance: 0.5,
            pinned: false,
            do_not_inject: false,
            use_count: 0,
            last_accessed_at: now,
            use_days: Vec::new(),
            created_at: now,
            source: None,
            category: None,
            parent_id: None,
        }
    }

    /// Number of distinct calendar dates this memory was read on.
    pub fn distinct_use_days(&self) -> usize {
        self.use_days.len()
    }
}

// ============================================================================
// CURRENT CONTEXT
// ============================================================================

/// Single-slot short-lived task description. Expires by wall-clock
/// comparison; no background sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentContext {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: i64,
}

impl CurrentContext {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > chrono::Duration::seconds(self.ttl_seconds)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for explicitly storing a memory via the tool surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreInput {
    /// The content to persist
    pub text: String,
    /// Type of memory
    #[serde(default)]
    pub memory_type: MemoryType,
    /// Placement; `None` uses the session default tier
    pub tier: Option<Tier>,
    /// Static weighting hint in [0, 1]
    pub importance: Option<f64>,
    /// Pin on creation
    #[serde(default)]
    pub pinned: bool,
    pub source: Option<String>,
    pub category: Option<String>,
    pub parent_id: Option<String>,
}

impl Default for StoreInput {
    fn default() -> Self {
        Self {
            text: String::new(),
            memory_type: MemoryType::Factual,
            tier: None,
            importance: None,
            pinned: false,
            source: None,
            category: None,
            parent_id: None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Audit trail, injection feedback, and tuning-log rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// AUDIT
// ============================================================================

/// State-machine transitions that produce audit rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Demote,
    Promote,
    Forget,
    Restore,
    Pin,
    Unpin,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Demote => "demote",
            AuditAction::Promote => "promote",
            AuditAction::Forget => "forget",
            AuditAction::Restore => "restore",
            AuditAction::Pin => "pin",
            AuditAction::Unpin => "unpin",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "demote" => Some(AuditAction::Demote),
            "promote" => Some(AuditAction::Promote),
            "forget" => Some(AuditAction::Forget),
            "restore" => Some(AuditAction::Restore),
            "pin" => Some(AuditAction::Pin),
            "unpin" => Some(AuditAction::Unpin),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit row. Exactly one per tier or flag transition; the
/// before/after snapshots always include `tier` and `memory_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRow {
    pub id: i64,
    pub memory_id: String,
    pub action: AuditAction,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// INJECTION FEEDBACK
// ============================================================================

/// One row per memory per injection event. Written off the recall critical
/// path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionFeedback {
    pub memory_id: String,
    pub session_key: Option<String>,
    pub injected_at: DateTime<Utc>,
    /// The memory's use_count at injection time
    pub access_frequency: i64,
    /// |selected| / |candidates| for the injection that carried this memory
    pub injection_density: f64,
    pub session_outcome: Option<String>,
    pub proxy_score: Option<f64>,
    pub agent_score: Option<f64>,
}

// ============================================================================
// TUNING LOG
// ============================================================================

/// Who adjusted a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TuningSource {
    #[default]
    Auto,
    Agent,
    User,
}

impl TuningSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningSource::Auto => "auto",
            TuningSource::Agent => "agent",
            TuningSource::User => "user",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s {
            "agent" => TuningSource::Agent,
            "user" => TuningSource::User,
            _ => TuningSource::Auto,
        }
    }
}

/// Append-only record of a parameter adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningEntry {
    pub id: i64,
    pub parameter: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub reason: Option<String>,
    pub source: TuningSource,
    pub user_override_until: Option<DateTime<Utc>>,
    pub reverted: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_round_trip() {
        for action in [
            AuditAction::Demote,
            AuditAction::Promote,
            AuditAction::Forget,
            AuditAction::Restore,
            AuditAction::Pin,
            AuditAction::Unpin,
        ] {
            assert_eq!(AuditAction::parse_name(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse_name("merge"), None);
    }

    #[test]
    fn test_tuning_source_defaults_to_auto() {
        assert_eq!(TuningSource::parse_name("cron"), TuningSource::Auto);
        assert_eq!(TuningSource::parse_name("user"), TuningSource::User);
    }
}

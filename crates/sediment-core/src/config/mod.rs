//! Configuration
//!
//! Serde-backed config with all defaults applied at construction. The
//! `autoRecall` key accepts both the legacy boolean and the object form;
//! both normalize into one resolved struct. Session categories carry their
//! own capture/inject/tier switches that override the globals per call.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::allocation::InjectionBudgets;
use crate::lifecycle::decay::{DecayProfile, Ttl, TtlOverrides};
use crate::lifecycle::promotion::PromotionRules;
use crate::memory::{MemoryType, Tier};
use crate::scoring::ScoringWeights;

// ============================================================================
// SESSION CONTEXT
// ============================================================================

/// Coarse agent-invocation category. Unknown values map to `main`, so
/// deserialization goes through the lenient string parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SessionType {
    #[default]
    Main,
    Cron,
    Spawned,
}

impl From<String> for SessionType {
    fn from(s: String) -> Self {
        SessionType::parse_name(&s)
    }
}

impl SessionType {
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cron" => SessionType::Cron,
            "spawned" => SessionType::Spawned,
            _ => SessionType::Main,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Main => "main",
            SessionType::Cron => "cron",
            SessionType::Spawned => "spawned",
        }
    }
}

/// Per-call session description supplied by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionContext {
    pub agent_id: Option<String>,
    pub session_key: Option<String>,
    pub workspace_dir: Option<String>,
    pub session_type: SessionType,
    /// Runtime decay-profile override, highest precedence in resolution
    pub decay_profile: Option<String>,
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Selects and parameterizes the external embedding collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    /// 0 means "whatever the provider reports"
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: String::new(),
            dimensions: 0,
        }
    }
}

/// Per-session-type switches overriding the globals.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOverrides {
    pub auto_capture: Option<bool>,
    pub auto_inject: Option<bool>,
    pub default_tier: Option<Tier>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionsConfig {
    pub main: SessionOverrides,
    pub cron: SessionOverrides,
    pub spawned: SessionOverrides,
}

impl SessionsConfig {
    pub fn for_type(&self, session_type: SessionType) -> SessionOverrides {
        match session_type {
            SessionType::Main => self.main,
            SessionType::Cron => self.cron,
            SessionType::Spawned => self.spawned,
        }
    }
}

/// Effective per-call switches after applying session overrides.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub auto_capture: bool,
    pub auto_inject: bool,
    pub default_tier: Tier,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotTierConfig {
    pub ttl_hours: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WarmTierConfig {
    pub demotion_days: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColdTierConfig {
    pub promotion_uses: Option<i64>,
    pub promotion_days: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TiersConfig {
    pub hot: HotTierConfig,
    pub warm: WarmTierConfig,
    pub cold: ColdTierConfig,
}

/// `null` and "absent" mean different things for TTLs: absent inherits the
/// default, an explicit `null` disables that demotion edge.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// TTL triple in hours; see `double_option` for the null-vs-absent rule.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlSpec {
    #[serde(
        rename = "hotTTL",
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub hot_ttl: Option<Option<f64>>,
    #[serde(
        rename = "warmTTL",
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub warm_ttl: Option<Option<f64>>,
    #[serde(
        rename = "coldTTL",
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cold_ttl: Option<Option<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecaySection {
    pub interval_hours: f64,
    /// Config-default profile name in the resolution chain
    pub profile: Option<String>,
    pub default: TtlSpec,
    /// Per-type overrides, keyed by memory type name
    pub overrides: HashMap<String, TtlSpec>,
}

impl Default for DecaySection {
    fn default() -> Self {
        Self {
            interval_hours: 24.0,
            profile: None,
            default: TtlSpec::default(),
            overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InjectionSection {
    pub max_items: usize,
    pub min_score: Option<f64>,
    pub budgets: InjectionBudgets,
}

impl Default for InjectionSection {
    fn default() -> Self {
        Self {
            max_items: 10,
            min_score: None,
            budgets: InjectionBudgets::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSection {
    pub ttl_hours: f64,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self { ttl_hours: 2.0 }
    }
}

// ============================================================================
// AUTO-RECALL COMPAT
// ============================================================================

/// `autoRecall` accepts `true|false` or an object; missing object fields
/// inherit from the `injection` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutoRecallSetting {
    Enabled(bool),
    Overrides(AutoRecallOverrides),
}

impl Default for AutoRecallSetting {
    fn default() -> Self {
        AutoRecallSetting::Enabled(true)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoRecallOverrides {
    pub enabled: Option<bool>,
    pub min_score: Option<f64>,
    pub max_items: Option<usize>,
    pub budgets: Option<InjectionBudgets>,
}

/// The normalized recall settings both shapes resolve into.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRecall {
    pub enabled: bool,
    pub min_score: Option<f64>,
    pub max_items: usize,
    pub budgets: InjectionBudgets,
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

/// The engine configuration. Every field has a default; hosts typically
/// deserialize this from their own config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    pub embedding: EmbeddingConfig,
    pub auto_capture: bool,
    pub auto_recall: AutoRecallSetting,
    pub sessions: SessionsConfig,
    pub tiers: TiersConfig,
    pub decay: DecaySection,
    pub scoring: ScoringWeights,
    pub injection: InjectionSection,
    pub context: ContextSection,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            auto_capture: true,
            auto_recall: AutoRecallSetting::default(),
            sessions: SessionsConfig::default(),
            tiers: TiersConfig::default(),
            decay: DecaySection::default(),
            scoring: ScoringWeights::default(),
            injection: InjectionSection::default(),
            context: ContextSection::default(),
        }
    }
}

impl MemoryConfig {
    /// Normalize `autoRecall` over the `injection` section.
    pub fn resolved_recall(&self) -> ResolvedRecall {
        let base = ResolvedRecall {
            enabled: true,
            min_score: self.injection.min_score,
            max_items: self.injection.max_items,
            budgets: self.injection.budgets,
        };

        match &self.auto_recall {
            AutoRecallSetting::Enabled(enabled) => ResolvedRecall {
                enabled: *enabled,
                ..base
            },
            AutoRecallSetting::Overrides(o) => ResolvedRecall {
                enabled: o.enabled.unwrap_or(true),
                min_score: o.min_score.or(base.min_score),
                max_items: o.max_items.unwrap_or(base.max_items),
                budgets: o.budgets.unwrap_or(base.budgets),
            },
        }
    }

    /// Effective capture/inject/tier switches for one session type.
    pub fn session_settings(&self, session_type: SessionType) -> SessionSettings {
        let overrides = self.sessions.for_type(session_type);
        SessionSettings {
            auto_capture: overrides.auto_capture.unwrap_or(self.auto_capture),
            auto_inject: overrides
                .auto_inject
                .unwrap_or_else(|| self.resolved_recall().enabled),
            default_tier: overrides.default_tier.unwrap_or(Tier::Hot),
        }
    }

    /// Promotion thresholds from the cold-tier section.
    pub fn promotion_rules(&self) -> PromotionRules {
        let defaults = PromotionRules::default();
        PromotionRules {
            promotion_uses: self
                .tiers
                .cold
                .promotion_uses
                .unwrap_or(defaults.promotion_uses),
            promotion_days: self
                .tiers
                .cold
                .promotion_days
                .unwrap_or(defaults.promotion_days),
        }
    }

    /// Build the profile described by the `decay` section, falling back to
    /// the built-in defaults edge by edge. Unknown override keys are
    /// ignored with a warning.
    pub fn decay_profile(&self) -> DecayProfile {
        let builtin = crate::lifecycle::builtin_thorough();

        let resolve = |spec: Option<Option<f64>>, legacy: Option<f64>, fallback: Ttl| match spec {
            Some(Some(hours)) => Ttl::Hours(hours),
            Some(None) => Ttl::Never,
            None => match legacy {
                Some(hours) => Ttl::Hours(hours),
                None => fallback,
            },
        };

        let hot = resolve(self.decay.default.hot_ttl, self.tiers.hot.ttl_hours, builtin.hot);
        let warm = resolve(
            self.decay.default.warm_ttl,
            self.tiers.warm.demotion_days.map(|d| d * 24.0),
            builtin.warm,
        );
        let cold = resolve(self.decay.default.cold_ttl, None, builtin.cold);

        let mut overrides = HashMap::new();
        for (key, spec) in &self.decay.overrides {
            let Some(memory_type) = MemoryType::parse_name(key) else {
                tracing::warn!("ignoring decay override for unknown type '{}'", key);
                continue;
            };
            let to_ttl = |o: Option<Option<f64>>| {
                o.map(|inner| inner.map_or(Ttl::Never, Ttl::Hours))
            };
            overrides.insert(
                memory_type,
                TtlOverrides {
                    hot: to_ttl(spec.hot_ttl),
                    warm: to_ttl(spec.warm_ttl),
                    cold: to_ttl(spec.cold_ttl),
                },
            );
        }

        DecayProfile {
            name: "config".to_string(),
            hot,
            warm,
            cold,
            overrides,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Decay Profiles
//!
//! Named TTL bundles, selectable per call with precedence:
//! session-runtime override > persisted per-agent > persisted global >
//! config default > built-in `thorough`. Persisted selections live in the
//! store's meta table.

use std::collections::HashMap;

use crate::lifecycle::decay::{DecayProfile, Ttl, TtlOverrides};
use crate::memory::MemoryType;

/// Meta key for the persisted global profile selection.
pub const META_PROFILE_GLOBAL: &str = "decay_profile:global";

/// Meta key for a persisted per-agent profile selection.
pub fn meta_profile_agent_key(agent_id: &str) -> String {
    format!("decay_profile:agent:{}", agent_id)
}

/// The built-in default profile: 3 days in HOT, 3 weeks in WARM, 90 days
/// in COLD, with episodic memories cycling out faster.
pub fn builtin_thorough() -> DecayProfile {
    let mut overrides = HashMap::new();
    overrides.insert(
        MemoryType::Episodic,
        TtlOverrides {
            hot: Some(Ttl::Hours(24.0)),
            warm: Some(Ttl::Hours(240.0)),
            cold: Some(Ttl::Hours(720.0)),
        },
    );

    DecayProfile {
        name: "thorough".to_string(),
        hot: Ttl::Hours(72.0),
        warm: Ttl::Hours(504.0),
        cold: Ttl::Hours(2160.0),
        overrides,
    }
}

/// Registry of selectable profiles.
pub struct ProfileRegistry {
    profiles: HashMap<String, DecayProfile>,
    fallback: DecayProfile,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry {
    pub fn new() -> Self {
        let mut profiles = HashMap::new();
        let thorough = builtin_thorough();
        profiles.insert(thorough.name.clone(), thorough.clone());
        Self {
            profiles,
            fallback: thorough,
        }
    }

    /// Register or replace a named profile.
    pub fn register(&mut self, profile: DecayProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&DecayProfile> {
        self.profiles.get(name)
    }

    /// Resolve a selection chain, highest precedence first. The first name
    /// that resolves to a registered profile wins; unknown names are
    /// skipped. Falls back to built-in `thorough`.
    pub fn resolve(&self, chain: &[Option<&str>]) -> &DecayProfile {
        for name in chain.iter().flatten() {
            if let Some(profile) = self.profiles.get(*name) {
                return profile;
            }
        }
        &self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_thorough_registered() {
        let registry = ProfileRegistry::new();
        assert!(registry.get("thorough").is_some());
    }

    #[test]
    fn test_resolution_precedence() {
        let mut registry = ProfileRegistry::new();
        let mut fast = builtin_thorough();
        fast.name = "fast".to_string();
        fast.hot = Ttl::Hours(1.0);
        registry.register(fast);

        // highest precedence entry wins
        let resolved = registry.resolve(&[Some("fast"), Some("thorough")]);
        assert_eq!(resolved.name, "fast");

        // unknown names are skipped, not errors
        let resolved = registry.resolve(&[Some("missing"), Some("fast")]);
        assert_eq!(resolved.name, "fast");

        // empty chain falls back to thorough
        let resolved = registry.resolve(&[None, None]);
        assert_eq!(resolved.name, "thorough");
    }
}

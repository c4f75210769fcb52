//! Lifecycle Module
//!
//! Background tier migration: the decay engine demotes stale memories, the
//! promotion engine lifts re-used COLD memories back to WARM, and profiles
//! bundle the TTLs that drive both. The host schedules invocations; the
//! `should_run` check backed by the meta table replaces in-process timers.

pub mod decay;
pub mod profiles;
pub mod promotion;

pub use decay::{should_run, DecayProfile, DecayReport, Ttl, TtlOverrides};
pub use profiles::{
    builtin_thorough, meta_profile_agent_key, ProfileRegistry, META_PROFILE_GLOBAL,
};
pub use promotion::{PromotionReport, PromotionRules};

//! Test Harness
//!
//! Isolated engine instances over temporary databases, plus deterministic
//! embedding providers so no test ever loads a model or touches the
//! network.

mod embedder;
mod engine;

pub use embedder::{FixedEmbedder, HashEmbedder, UnavailableEmbedder, EMBED_DIM};
pub use engine::TestEngine;

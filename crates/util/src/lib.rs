//! state-tree-util - helpers shared by the state-tree crates.
//!
//! - [`canonical`]: sorted-key JSON serialization
//! - [`content_key`]: content-derived keys for constant payloads
//! - [`fuzzer`]: seeded random generator for reproducible mutation runs

pub mod canonical;
pub mod content_key;
pub mod fuzzer;

pub use canonical::{to_canonical_string, write_value};
pub use content_key::{content_key, content_key_of_canonical, KEY_BYTES};
pub use fuzzer::Fuzzer;

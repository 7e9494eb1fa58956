//! Test doubles for the provider seam and the result store.
//!
//! These are real implementations of the public traits, usable from
//! integration tests and downstream crates alike, so they live in the
//! library rather than behind `#[cfg(test)]`.

pub mod mocks;

pub use mocks::{MemoryResultStore, ScriptedProvider};

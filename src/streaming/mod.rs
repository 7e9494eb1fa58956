//! Streaming sessions: long-lived, cancellable wrappers turning a
//! provider's incremental token stream into a consumable chunk
//! sequence, plus the per-process registry and service facade.

mod registry;
mod service;
mod session;

pub use registry::SessionRegistry;
pub use service::{StreamResultStore, StreamingService};
pub use session::{SessionStatus, StreamChunk, StreamSession};

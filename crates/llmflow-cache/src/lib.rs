//! Content-addressed, file-based cache for provider responses.
//!
//! Grounded on the teacher's two existing TTL file-caches
//! (`querymt::pricing::pricing` and `querymt::providers::registry`), both
//! of which treat "now - mtime < TTL" as freshness for a single
//! well-known file under `~/.qmt/`. This generalizes that pattern to one
//! file per request fingerprint, and adds the size-bounded eviction and
//! corrupted-entry handling `SPEC_FULL.md` §4.A requires (see OQ-3 in
//! `DESIGN.md` for the concurrency model this assumes).

mod fingerprint;
mod store;

pub use fingerprint::fingerprint_request;
pub use store::{CacheStats, ResponseCache};

//! Offline-capable request cache
//!
//! Sits between a host process and a remote origin. Every outbound request is
//! classified into a network-first or cache-first strategy, served from a
//! versioned entry store when the origin is unreachable, and kept fresh with a
//! fixed TTL. Store namespaces are tagged with a build version so that a new
//! deploy can purge everything written by older builds.

pub mod clock;
pub mod control;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod freshness;
pub mod generation;
pub mod routes;
pub mod store;
mod strategy;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{run_control_loop, ControlHandle, ControlMessage};
pub use engine::{CacheConfig, OfflineCache};
pub use error::{CacheError, ErrorKind, Result};
pub use fetch::{from_fn, Fetcher, FnFetcher};
pub use freshness::{default_ttl, is_fresh, Freshness, DEFAULT_TTL_SECS};
pub use generation::{ActivationReport, GenerationManager, InstallReport, Phase};
pub use routes::{RoutePattern, RouteRule, RouteTable, Strategy};
pub use store::{EntryStore, FileStore, MemoryStore};
pub use types::{CacheStats, CachedResponse, RequestIdentity, ResponseSource, Served, StoredEntry};

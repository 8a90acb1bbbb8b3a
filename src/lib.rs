//! Cachet: HTTP response caching for axum.
//!
//! Intercepts outbound responses, stores the cacheable ones under a
//! deterministic key, and serves them back on subsequent requests. The
//! cache is bounded by a byte budget enforced with oldest-first eviction,
//! and entries can be invalidated individually or in bulk through tags.
//!
//! ## Usage
//!
//! ```ignore
//! let context = CacheContext::new(CacheConfig::default());
//! let app = Router::new()
//!     .route("/reports", get(report_handler))
//!     .layer(middleware::from_fn_with_state(
//!         context.clone(),
//!         response_cache_layer,
//!     ));
//! ```
//!
//! Callers opt in per request via query parameters (`useCache=true`), and
//! origin handlers attach invalidation tags through a response header.
//! All parameter and header names are configurable, see [`CacheConfig`].

mod codec;
mod config;
mod context;
mod entry;
mod error;
mod evict;
mod key;
mod lock;
mod metrics;
mod middleware;
mod store;
mod tags;
mod telemetry;
mod tracker;

pub use codec::Codec;
pub use config::CacheConfig;
pub use context::CacheContext;
pub use entry::{CacheEntry, EvictionCause};
pub use error::CacheError;
pub use key::{build_key, hash_body};
pub use metrics::{CacheMetrics, CacheReport};
pub use middleware::{cache_report_handler, response_cache_layer};
pub use store::{EntryStore, MemoryStore, RemovalCause, RemovalListener};
pub use tags::TagIndex;
pub use telemetry::{LogFormat, TelemetrySettings, init as init_telemetry};
pub use tracker::{SizeTracker, TrackedMetadata};

//! # multicache
//!
//! Category-aware cache routing across multiple Redis instances.
//!
//! Callers tag each operation with a data category (auth, orders, user,
//! ...); the service routes it to the instance owning that category,
//! applies the category's TTL default, and tracks per-instance usage and
//! hit/miss counters. When no multi-instance configuration is present the
//! service degrades to a plain single-instance cache with the same
//! contract.
//!
//! The cache is an advisory layer: backend failures are reported through
//! result values and counters, never raised to the caller.
//!
//! ## Module Organization
//!
//! - `category`: data categories and per-category TTL defaults
//! - `config`: instance descriptors, env parsing, validation, routing map
//! - `balancer`: instance selection strategies and usage tallies
//! - `backend`: the `CacheBackend` seam with Redis and in-memory implementations
//! - `service`: the `CacheService` facade
//! - `health`: health-check report types
//! - `error`: error taxonomy
//!
//! ## Example
//!
//! ```no_run
//! use multicache::{CacheService, DataCategory, RedisConnector};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Configuration comes from REDIS_* environment variables.
//! let cache = CacheService::from_env(Arc::new(RedisConnector))?;
//!
//! cache
//!     .set_cache("order:991", &json!({"status": "confirmed"}), None, Some(DataCategory::Orders))
//!     .await;
//!
//! let report = cache.health_check().await;
//! println!("cache layer is {}", report.overall_status);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod balancer;
pub mod category;
pub mod config;
pub mod error;
pub mod health;
pub mod service;

// Re-export common types for convenience
pub use backend::{
    BackendConnector, BackendError, CacheBackend, MemoryBackend, MemoryConnector, RedisBackend,
    RedisConnector, ServerInfo,
};
pub use balancer::{LoadBalancer, LoadBalancingStrategy};
pub use category::{DataCategory, TtlConfig};
pub use config::{ConfigReport, InstanceConfig, MulticacheConfig};
pub use error::CacheError;
pub use health::{HealthReport, HealthStatus, InstanceHealth};
pub use service::{CacheResult, CacheService, PerformanceStats};

/// Current version of the multicache library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

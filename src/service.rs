/// Cache facade with category-aware routing across instances
///
/// `CacheService` is the single entry point for every caller. It resolves
/// a category to an instance through the load balancer, lazily creates
/// one connection handle per instance, serializes values to JSON text,
/// and tracks hit/miss/error counters.
///
/// The cache is an advisory layer: no operation ever raises a backend
/// fault to the caller. Failures come back as
/// `CacheResult { success: false, error: Some(..) }` and show up in the
/// error counter; callers treat them exactly like a miss.
///
/// When no multi-instance configuration is present the facade runs in
/// legacy mode: one instance, no category routing, same contract.
///
/// # Example
///
/// ```no_run
/// use multicache::{CacheService, DataCategory, RedisConnector};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let cache = CacheService::from_env(Arc::new(RedisConnector))?;
///
/// let result = cache
///     .set_cache("user:42:profile", &json!({"name": "Asha"}), None, Some(DataCategory::User))
///     .await;
/// assert!(result.success);
///
/// let fetched = cache.get_cache("user:42:profile", Some(DataCategory::User)).await;
/// println!("served by {} in {:.1}ms", fetched.instance_used, fetched.response_time_ms);
/// # Ok(())
/// # }
/// ```

use crate::backend::{BackendConnector, CacheBackend};
use crate::balancer::{LoadBalancer, LoadBalancingStrategy};
use crate::category::{DataCategory, TtlConfig};
use crate::config::{InstanceConfig, MulticacheConfig};
use crate::error::CacheError;
use crate::health::{HealthReport, HealthStatus, InstanceHealth};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of one cache operation
///
/// Misses are successful results with no data; only backend faults and
/// serialization failures set `success = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheResult {
    /// Whether the operation completed against the backend
    pub success: bool,

    /// Operation payload: the fetched value, or a boolean for
    /// set/delete/exists, or a counter value for increment
    pub data: Option<Value>,

    /// Failure detail when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Id of the instance that served the operation
    pub instance_used: String,

    /// Elapsed time in milliseconds
    pub response_time_ms: f64,
}

impl CacheResult {
    fn completed(data: Option<Value>, instance: &str, started: Instant) -> Self {
        CacheResult {
            success: true,
            data,
            error: None,
            instance_used: instance.to_string(),
            response_time_ms: elapsed_ms(started),
        }
    }
}

/// Snapshot of the facade's performance counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Operations that completed against a backend
    pub total_requests: u64,

    /// Reads that found a value
    pub cache_hits: u64,

    /// Reads that found nothing
    pub cache_misses: u64,

    /// Hit rate as a percentage, 0 when nothing was requested yet
    pub hit_rate_percentage: f64,

    /// Operations that failed at the backend
    pub errors: u64,

    /// Operations routed per instance
    pub instance_usage: HashMap<String, u64>,

    /// Whether multi-instance routing is active
    pub multi_instance: bool,

    /// Number of configured instances
    pub total_instances: usize,

    /// Declared capacity across all instances in MB
    pub total_capacity_mb: u64,
}

#[derive(Default)]
struct StatsCounters {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: AtomicU64,
}

enum Topology {
    Multi {
        config: Arc<MulticacheConfig>,
        balancer: LoadBalancer,
    },
    Single {
        instance: Arc<InstanceConfig>,
        ttl: TtlConfig,
    },
}

/// The cache facade
///
/// Construct one per process at the composition root and share it behind
/// an `Arc`; all methods take `&self` and are safe under concurrent use.
pub struct CacheService {
    topology: Topology,
    connector: Arc<dyn BackendConnector>,
    handles: Mutex<HashMap<String, Arc<dyn CacheBackend>>>,
    stats: StatsCounters,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService").finish_non_exhaustive()
    }
}

impl CacheService {
    /// Creates a multi-instance service from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` when `config.validate()`
    /// reports issues; warnings are logged and do not block startup.
    pub fn new(
        config: MulticacheConfig,
        connector: Arc<dyn BackendConnector>,
    ) -> Result<Self, CacheError> {
        let report = config.validate();
        for warning in &report.warnings {
            tracing::warn!(warning = %warning, "Cache configuration warning");
        }
        if !report.valid {
            for issue in &report.issues {
                tracing::error!(issue = %issue, "Cache configuration issue");
            }
            return Err(CacheError::Configuration(report.issues.join("; ")));
        }

        tracing::info!(
            instances = report.total_instances,
            capacity_mb = report.total_capacity_mb,
            "Cache service starting in multi-instance mode"
        );

        let config = Arc::new(config);
        let balancer = LoadBalancer::new(config.clone());

        Ok(CacheService {
            topology: Topology::Multi { config, balancer },
            connector,
            handles: Mutex::new(HashMap::new()),
            stats: StatsCounters::default(),
        })
    }

    /// Creates a single-instance service (legacy mode)
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` when the instance carries no
    /// connection details.
    pub fn single(
        instance: InstanceConfig,
        ttl: TtlConfig,
        connector: Arc<dyn BackendConnector>,
    ) -> Result<Self, CacheError> {
        if !instance.has_connection_details() {
            return Err(CacheError::Configuration(format!(
                "Instance '{}' missing connection details",
                instance.id
            )));
        }

        tracing::info!(instance = %instance.id, "Cache service starting in single-instance mode");

        Ok(CacheService {
            topology: Topology::Single {
                instance: Arc::new(instance),
                ttl,
            },
            connector,
            handles: Mutex::new(HashMap::new()),
            stats: StatsCounters::default(),
        })
    }

    /// Creates a service from the environment
    ///
    /// Multi-instance mode when `REDIS_INSTANCES` or any `REDIS_<NAME>_*`
    /// variable is present; otherwise legacy mode from `REDIS_URL` /
    /// `REDIS_HOST`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Configuration` when neither configuration
    /// style is present or the present one is invalid.
    pub fn from_env(connector: Arc<dyn BackendConnector>) -> Result<Self, CacheError> {
        dotenvy::dotenv().ok();

        if let Some(config) = MulticacheConfig::from_env()? {
            return CacheService::new(config, connector);
        }

        match InstanceConfig::legacy_from_env()? {
            Some(instance) => CacheService::single(instance, TtlConfig::from_env(), connector),
            None => Err(CacheError::Configuration(
                "No cache configuration found in environment (expected REDIS_INSTANCES, REDIS_<NAME>_* or REDIS_URL)"
                    .to_string(),
            )),
        }
    }

    /// Writes a value with an expiry
    ///
    /// TTL resolution order: the explicit argument, then the category's
    /// default, then the global default. Non-string values are stored as
    /// compact JSON text; strings are stored raw.
    pub async fn set_cache<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        category: Option<DataCategory>,
    ) -> CacheResult
    where
        T: Serialize + ?Sized,
    {
        let started = Instant::now();

        let instance = match self.select(category) {
            Ok(instance) => instance,
            Err(e) => return self.failure(started, "none", e),
        };
        let backend = match self.backend_for(&instance).await {
            Ok(backend) => backend,
            Err(e) => return self.failure(started, &instance.id, e),
        };

        let payload = match encode_value(value) {
            Ok(payload) => payload,
            Err(e) => return self.failure(started, &instance.id, e),
        };
        let ttl = self.resolve_ttl(ttl, category);

        match backend.set(key, &payload, Duration::from_secs(ttl)).await {
            Ok(()) => {
                self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, instance = %instance.id, ttl, "Cache set");
                CacheResult::completed(Some(Value::Bool(true)), &instance.id, started)
            }
            Err(e) => self.failure(started, &instance.id, e),
        }
    }

    /// Reads a value
    ///
    /// A miss is a successful result with `data = None`. Stored text that
    /// parses as JSON comes back structured; anything else comes back as
    /// the raw string.
    pub async fn get_cache(&self, key: &str, category: Option<DataCategory>) -> CacheResult {
        let started = Instant::now();

        let instance = match self.select(category) {
            Ok(instance) => instance,
            Err(e) => return self.failure(started, "none", e),
        };
        let backend = match self.backend_for(&instance).await {
            Ok(backend) => backend,
            Err(e) => return self.failure(started, &instance.id, e),
        };

        match backend.get(key).await {
            Ok(Some(raw)) => {
                self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                CacheResult::completed(Some(decode_value(raw)), &instance.id, started)
            }
            Ok(None) => {
                self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                CacheResult::completed(None, &instance.id, started)
            }
            Err(e) => self.failure(started, &instance.id, e),
        }
    }

    /// Removes a key; `data` is `true` iff something was removed
    pub async fn delete_cache(&self, key: &str, category: Option<DataCategory>) -> CacheResult {
        let started = Instant::now();

        let instance = match self.select(category) {
            Ok(instance) => instance,
            Err(e) => return self.failure(started, "none", e),
        };
        let backend = match self.backend_for(&instance).await {
            Ok(backend) => backend,
            Err(e) => return self.failure(started, &instance.id, e),
        };

        match backend.delete(key).await {
            Ok(removed) => {
                self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, instance = %instance.id, removed, "Cache delete");
                CacheResult::completed(Some(Value::Bool(removed)), &instance.id, started)
            }
            Err(e) => self.failure(started, &instance.id, e),
        }
    }

    /// Checks key existence without fetching the value
    pub async fn exists_cache(&self, key: &str, category: Option<DataCategory>) -> CacheResult {
        let started = Instant::now();

        let instance = match self.select(category) {
            Ok(instance) => instance,
            Err(e) => return self.failure(started, "none", e),
        };
        let backend = match self.backend_for(&instance).await {
            Ok(backend) => backend,
            Err(e) => return self.failure(started, &instance.id, e),
        };

        match backend.exists(key).await {
            Ok(found) => {
                self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
                CacheResult::completed(Some(Value::Bool(found)), &instance.id, started)
            }
            Err(e) => self.failure(started, &instance.id, e),
        }
    }

    /// Increments an integer counter and refreshes its expiry
    ///
    /// The key is created at zero when absent. `data` carries the
    /// post-increment value.
    pub async fn increment(
        &self,
        key: &str,
        amount: i64,
        ttl: Option<u64>,
        category: Option<DataCategory>,
    ) -> CacheResult {
        let started = Instant::now();

        let instance = match self.select(category) {
            Ok(instance) => instance,
            Err(e) => return self.failure(started, "none", e),
        };
        let backend = match self.backend_for(&instance).await {
            Ok(backend) => backend,
            Err(e) => return self.failure(started, &instance.id, e),
        };

        let next = match backend.incr_by(key, amount).await {
            Ok(next) => next,
            Err(e) => return self.failure(started, &instance.id, e),
        };

        let ttl = self.resolve_ttl(ttl, category);
        if let Err(e) = backend.expire(key, Duration::from_secs(ttl)).await {
            return self.failure(started, &instance.id, e);
        }

        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        CacheResult::completed(Some(Value::from(next)), &instance.id, started)
    }

    /// Legacy surface: write, reporting only success
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<u64>) -> bool
    where
        T: Serialize + ?Sized,
    {
        self.set_cache(key, value, ttl, None).await.success
    }

    /// Legacy surface: read, returning the bare value
    ///
    /// Misses and failures both come back as `None`; legacy callers
    /// treat them identically.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let result = self.get_cache(key, None).await;
        if result.success {
            result.data
        } else {
            None
        }
    }

    /// Legacy surface: delete, reporting whether a key was removed
    pub async fn delete(&self, key: &str) -> bool {
        let result = self.delete_cache(key, None).await;
        result.success && result.data == Some(Value::Bool(true))
    }

    /// Legacy surface: existence check
    pub async fn exists(&self, key: &str) -> bool {
        let result = self.exists_cache(key, None).await;
        result.success && result.data == Some(Value::Bool(true))
    }

    /// Probes every instance and reports per-instance plus aggregate health
    ///
    /// Instances are checked concurrently and independently; one
    /// instance's failure is recorded in its own entry and cannot abort
    /// or blank out the others.
    pub async fn health_check(&self) -> HealthReport {
        let instances: Vec<Arc<InstanceConfig>> = match &self.topology {
            Topology::Multi { config, .. } => config.instances().to_vec(),
            Topology::Single { instance, .. } => vec![instance.clone()],
        };

        let probes = instances.iter().map(|instance| self.probe_instance(instance));
        let results = futures::future::join_all(probes).await;

        let mut entries = HashMap::new();
        let mut healthy = 0;
        for (id, health) in results {
            if health.status == HealthStatus::Healthy {
                healthy += 1;
            }
            entries.insert(id, health);
        }

        let total = instances.len();
        let overall = HealthStatus::aggregate(healthy, total);
        if overall != HealthStatus::Healthy {
            tracing::warn!(status = %overall, healthy, total, "Cache health degraded");
        }

        HealthReport {
            overall_status: overall,
            healthy_instances: healthy,
            total_instances: total,
            instances: entries,
            performance: self.get_performance_stats(),
            multi_instance: self.is_multi_instance(),
            checked_at: chrono::Utc::now(),
        }
    }

    /// Snapshot of the performance counters
    pub fn get_performance_stats(&self) -> PerformanceStats {
        let total = self.stats.total_requests.load(Ordering::Relaxed);
        let hits = self.stats.cache_hits.load(Ordering::Relaxed);

        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let (instance_usage, total_instances, total_capacity_mb) = match &self.topology {
            Topology::Multi { config, balancer } => (
                balancer.request_counts(),
                config.instance_count(),
                config.total_capacity_mb(),
            ),
            Topology::Single { instance, .. } => {
                (HashMap::new(), 1, instance.max_memory_mb)
            }
        };

        PerformanceStats {
            total_requests: total,
            cache_hits: hits,
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            hit_rate_percentage: (hit_rate * 100.0).round() / 100.0,
            errors: self.stats.errors.load(Ordering::Relaxed),
            instance_usage,
            multi_instance: self.is_multi_instance(),
            total_instances,
            total_capacity_mb,
        }
    }

    /// Current load balancing strategy; `None` in single-instance mode
    pub fn strategy(&self) -> Option<LoadBalancingStrategy> {
        match &self.topology {
            Topology::Multi { balancer, .. } => Some(balancer.strategy()),
            Topology::Single { .. } => None,
        }
    }

    /// Switches the load balancing strategy at runtime
    ///
    /// Ignored in single-instance mode.
    pub fn set_strategy(&self, strategy: LoadBalancingStrategy) {
        match &self.topology {
            Topology::Multi { balancer, .. } => balancer.set_strategy(strategy),
            Topology::Single { .. } => {
                tracing::debug!("Strategy change ignored in single-instance mode");
            }
        }
    }

    /// Whether multi-instance routing is active
    pub fn is_multi_instance(&self) -> bool {
        matches!(self.topology, Topology::Multi { .. })
    }

    /// Releases all cached connection handles
    pub async fn close(&self) {
        let mut handles = self.handles.lock().await;
        let released = handles.len();
        handles.clear();
        tracing::info!(connections = released, "Cache connections released");
    }

    fn select(&self, category: Option<DataCategory>) -> Result<Arc<InstanceConfig>, CacheError> {
        match &self.topology {
            Topology::Multi { balancer, .. } => balancer.select_instance(category),
            Topology::Single { instance, .. } => Ok(instance.clone()),
        }
    }

    fn resolve_ttl(&self, explicit: Option<u64>, category: Option<DataCategory>) -> u64 {
        if let Some(ttl) = explicit {
            return ttl;
        }
        let ttl_config = match &self.topology {
            Topology::Multi { config, .. } => config.ttl(),
            Topology::Single { ttl, .. } => ttl,
        };
        ttl_config.ttl_for(category.unwrap_or(DataCategory::Default))
    }

    // The lock is held across connect so concurrent first use of an
    // instance creates exactly one handle.
    async fn backend_for(
        &self,
        instance: &InstanceConfig,
    ) -> Result<Arc<dyn CacheBackend>, CacheError> {
        let mut handles = self.handles.lock().await;
        if let Some(backend) = handles.get(&instance.id) {
            return Ok(backend.clone());
        }

        let backend = self.connector.connect(instance).await?;
        handles.insert(instance.id.clone(), backend.clone());
        Ok(backend)
    }

    async fn probe_instance(&self, instance: &InstanceConfig) -> (String, InstanceHealth) {
        let started = Instant::now();

        let backend = match self.backend_for(instance).await {
            Ok(backend) => backend,
            Err(e) => {
                return (
                    instance.id.clone(),
                    InstanceHealth {
                        status: HealthStatus::Unhealthy,
                        connected: false,
                        test_passed: false,
                        error: Some(e.to_string()),
                        server: None,
                        instance_name: instance.name.clone(),
                        max_memory_mb: instance.max_memory_mb,
                        response_time_ms: elapsed_ms(started),
                    },
                )
            }
        };

        let probe_key = format!("multicache:health:{}:{}", instance.id, Uuid::new_v4());
        let round_trip = async {
            backend.set(&probe_key, "ok", Duration::from_secs(10)).await?;
            let read = backend.get(&probe_key).await?;
            backend.delete(&probe_key).await?;
            Ok::<bool, crate::backend::BackendError>(read.as_deref() == Some("ok"))
        }
        .await;

        let health = match round_trip {
            Ok(test_passed) => {
                let server = backend.server_info().await.ok();
                InstanceHealth {
                    status: if test_passed {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Unhealthy
                    },
                    connected: true,
                    test_passed,
                    error: (!test_passed).then(|| "Probe value mismatch".to_string()),
                    server,
                    instance_name: instance.name.clone(),
                    max_memory_mb: instance.max_memory_mb,
                    response_time_ms: elapsed_ms(started),
                }
            }
            Err(e) => InstanceHealth {
                status: HealthStatus::Unhealthy,
                connected: false,
                test_passed: false,
                error: Some(e.to_string()),
                server: None,
                instance_name: instance.name.clone(),
                max_memory_mb: instance.max_memory_mb,
                response_time_ms: elapsed_ms(started),
            },
        };

        (instance.id.clone(), health)
    }

    fn failure(
        &self,
        started: Instant,
        instance: &str,
        error: impl std::fmt::Display,
    ) -> CacheResult {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(instance = %instance, error = %error, "Cache operation failed");
        CacheResult {
            success: false,
            data: None,
            error: Some(error.to_string()),
            instance_used: instance.to_string(),
            response_time_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn encode_value<T>(value: &T) -> Result<String, CacheError>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn decode_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryConnector};

    fn memory_service() -> (CacheService, Arc<MemoryConnector>) {
        let connector = Arc::new(MemoryConnector::new());
        let config = MulticacheConfig::new(
            vec![
                InstanceConfig::new("primary", "localhost", 6379).with_categories(vec![
                    DataCategory::Auth,
                    DataCategory::Orders,
                ]),
                InstanceConfig::new("secondary", "localhost", 6380)
                    .with_categories(vec![DataCategory::User, DataCategory::Menu]),
            ],
            LoadBalancingStrategy::Smart,
            TtlConfig::default(),
        );
        let service = CacheService::new(config, connector.clone()).unwrap();
        (service, connector)
    }

    #[test]
    fn test_encode_keeps_strings_raw() {
        assert_eq!(encode_value("plain text").unwrap(), "plain text");
        assert_eq!(encode_value(&serde_json::json!({"a": 1})).unwrap(), "{\"a\":1}");
        assert_eq!(encode_value(&42).unwrap(), "42");
    }

    #[test]
    fn test_decode_falls_back_to_raw_string() {
        assert_eq!(decode_value("{\"a\":1}".to_string()), serde_json::json!({"a": 1}));
        assert_eq!(decode_value("not json".to_string()), Value::String("not json".to_string()));
    }

    #[tokio::test]
    async fn test_category_ttl_applied_on_write() {
        let (service, connector) = memory_service();

        service.set_cache("menu:1", "v", None, Some(DataCategory::Menu)).await;
        let backend = connector.backend("secondary").unwrap();
        let ttl = backend.remaining_ttl("menu:1").unwrap();
        assert!(ttl > Duration::from_secs(7100) && ttl <= Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_explicit_ttl_beats_category_default() {
        let (service, connector) = memory_service();

        service.set_cache("menu:1", "v", Some(60), Some(DataCategory::Menu)).await;
        let backend = connector.backend("secondary").unwrap();
        let ttl = backend.remaining_ttl("menu:1").unwrap();
        assert!(ttl <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_backend_failure_is_contained() {
        let connector = Arc::new(MemoryConnector::new());
        connector.register("primary", Arc::new(MemoryBackend::unreachable()));

        let config = MulticacheConfig::new(
            vec![InstanceConfig::new("primary", "localhost", 6379)],
            LoadBalancingStrategy::Smart,
            TtlConfig::default(),
        );
        let service = CacheService::new(config, connector).unwrap();

        let result = service.set_cache("k", "v", None, None).await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert_eq!(service.get_performance_stats().errors, 1);
    }

    #[tokio::test]
    async fn test_duplicate_ownership_is_rejected_at_startup() {
        let connector = Arc::new(MemoryConnector::new());
        let config = MulticacheConfig::new(
            vec![
                InstanceConfig::new("a", "localhost", 6379)
                    .with_categories(vec![DataCategory::Auth]),
                InstanceConfig::new("b", "localhost", 6380)
                    .with_categories(vec![DataCategory::Auth]),
            ],
            LoadBalancingStrategy::Smart,
            TtlConfig::default(),
        );

        let err = CacheService::new(config, connector).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }
}

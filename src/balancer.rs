/// Instance selection strategies and the load balancer
///
/// The balancer picks one instance per operation. Selection and usage
/// recording are coupled: every successful selection increments the chosen
/// instance's tally before returning, so stats always agree with routing
/// decisions. Tallies are monotonic for the process lifetime.
///
/// # Strategies
///
/// - `smart` / `data_type`: category routing via the registry map, falling
///   through to least-used when no category is given
/// - `round_robin`: fixed-order cycling, one position per call
/// - `least_used`: lowest cumulative tally, ties broken by registration order

use crate::category::DataCategory;
use crate::config::{InstanceConfig, MulticacheConfig};
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// A string did not name a known strategy
#[derive(Debug, thiserror::Error)]
#[error("Unknown load balancing strategy: {0}")]
pub struct UnknownStrategy(pub String);

/// Policy for picking an instance per operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Fixed-order cycling through the instance list
    RoundRobin,

    /// Lowest cumulative request tally wins
    LeastUsed,

    /// Category routing with least-used fall-through
    Smart,

    /// Category routing with least-used fall-through (alias kept for
    /// configuration compatibility)
    DataType,
}

impl LoadBalancingStrategy {
    /// Reads `REDIS_LOAD_BALANCE_STRATEGY`, defaulting to `smart`
    ///
    /// An unknown value is logged and replaced by the default rather than
    /// failing startup.
    pub fn from_env() -> Self {
        match env::var("REDIS_LOAD_BALANCE_STRATEGY") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %raw,
                    "Unknown REDIS_LOAD_BALANCE_STRATEGY, using smart"
                );
                LoadBalancingStrategy::Smart
            }),
            Err(_) => LoadBalancingStrategy::Smart,
        }
    }

    /// Returns the configuration representation of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::LeastUsed => "least_used",
            LoadBalancingStrategy::Smart => "smart",
            LoadBalancingStrategy::DataType => "data_type",
        }
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "round_robin" => Ok(LoadBalancingStrategy::RoundRobin),
            "least_used" => Ok(LoadBalancingStrategy::LeastUsed),
            "smart" => Ok(LoadBalancingStrategy::Smart),
            "data_type" => Ok(LoadBalancingStrategy::DataType),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Picks an instance for each operation and tracks per-instance usage
///
/// Tallies are plain atomic counters (relaxed ordering; they carry no
/// synchronization dependencies), so selection is lock-free apart from
/// the strategy read.
pub struct LoadBalancer {
    config: Arc<MulticacheConfig>,
    strategy: RwLock<LoadBalancingStrategy>,
    tallies: Vec<AtomicU64>,
    cursor: AtomicUsize,
}

impl LoadBalancer {
    /// Creates a balancer over the registry's instances
    ///
    /// The initial strategy comes from the registry configuration.
    pub fn new(config: Arc<MulticacheConfig>) -> Self {
        let tallies = (0..config.instance_count()).map(|_| AtomicU64::new(0)).collect();

        LoadBalancer {
            strategy: RwLock::new(config.strategy()),
            tallies,
            cursor: AtomicUsize::new(0),
            config,
        }
    }

    /// Selects the instance that should serve an operation
    ///
    /// Records the selection in the chosen instance's tally before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NoInstancesAvailable` when the registry holds
    /// no instances. This is a hard error, distinct from a cache miss.
    pub fn select_instance(
        &self,
        category: Option<DataCategory>,
    ) -> Result<Arc<InstanceConfig>, CacheError> {
        let instances = self.config.instances();
        if instances.is_empty() {
            return Err(CacheError::NoInstancesAvailable);
        }

        let idx = match self.strategy() {
            LoadBalancingStrategy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len()
            }
            LoadBalancingStrategy::LeastUsed => self.least_used_index(),
            LoadBalancingStrategy::Smart | LoadBalancingStrategy::DataType => match category {
                Some(category) => self
                    .config
                    .instance_index_for(category)
                    .unwrap_or_else(|| self.least_used_index()),
                None => self.least_used_index(),
            },
        };

        self.tallies[idx].fetch_add(1, Ordering::Relaxed);

        let instance = &instances[idx];
        tracing::trace!(
            instance = %instance.id,
            category = category.map(|c| c.as_str()).unwrap_or("none"),
            "Selected cache instance"
        );

        Ok(instance.clone())
    }

    /// Current strategy
    pub fn strategy(&self) -> LoadBalancingStrategy {
        *self.strategy.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Switches the strategy at runtime
    pub fn set_strategy(&self, strategy: LoadBalancingStrategy) {
        *self.strategy.write().unwrap_or_else(|e| e.into_inner()) = strategy;
        tracing::info!(strategy = %strategy, "Load balancing strategy changed");
    }

    /// Cumulative per-instance request counts
    pub fn request_counts(&self) -> HashMap<String, u64> {
        self.config
            .instances()
            .iter()
            .zip(&self.tallies)
            .map(|(instance, tally)| (instance.id.clone(), tally.load(Ordering::Relaxed)))
            .collect()
    }

    // Ties resolve to the lowest index, i.e. registration order.
    fn least_used_index(&self) -> usize {
        let mut best = 0;
        let mut best_count = u64::MAX;
        for (idx, tally) in self.tallies.iter().enumerate() {
            let count = tally.load(Ordering::Relaxed);
            if count < best_count {
                best = idx;
                best_count = count;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::TtlConfig;

    fn balancer(strategy: LoadBalancingStrategy) -> LoadBalancer {
        let instances = vec![
            InstanceConfig::new("a", "localhost", 6379)
                .with_categories(vec![DataCategory::Auth]),
            InstanceConfig::new("b", "localhost", 6380)
                .with_categories(vec![DataCategory::User]),
            InstanceConfig::new("c", "localhost", 6381),
        ];
        LoadBalancer::new(Arc::new(MulticacheConfig::new(
            instances,
            strategy,
            TtlConfig::default(),
        )))
    }

    #[test]
    fn test_round_robin_cycles_in_registration_order() {
        let balancer = balancer(LoadBalancingStrategy::RoundRobin);

        let picks: Vec<String> = (0..6)
            .map(|_| balancer.select_instance(None).unwrap().id.clone())
            .collect();
        assert_eq!(picks, ["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_round_robin_ignores_category() {
        let balancer = balancer(LoadBalancingStrategy::RoundRobin);

        let first = balancer.select_instance(Some(DataCategory::User)).unwrap();
        assert_eq!(first.id, "a");
    }

    #[test]
    fn test_least_used_distributes_evenly() {
        let balancer = balancer(LoadBalancingStrategy::LeastUsed);

        for _ in 0..9 {
            balancer.select_instance(None).unwrap();
        }

        let counts = balancer.request_counts();
        assert_eq!(counts["a"], 3);
        assert_eq!(counts["b"], 3);
        assert_eq!(counts["c"], 3);
    }

    #[test]
    fn test_smart_routes_by_category_and_falls_through() {
        let balancer = balancer(LoadBalancingStrategy::Smart);

        assert_eq!(balancer.select_instance(Some(DataCategory::Auth)).unwrap().id, "a");
        assert_eq!(balancer.select_instance(Some(DataCategory::User)).unwrap().id, "b");
        // Unowned category resolves through the registry's default mapping.
        assert_eq!(balancer.select_instance(Some(DataCategory::Menu)).unwrap().id, "a");

        // No category: least-used fall-through picks the untouched instance.
        assert_eq!(balancer.select_instance(None).unwrap().id, "c");
    }

    #[test]
    fn test_selection_records_usage() {
        let balancer = balancer(LoadBalancingStrategy::Smart);

        for _ in 0..5 {
            balancer.select_instance(Some(DataCategory::Auth)).unwrap();
        }

        let counts = balancer.request_counts();
        assert_eq!(counts["a"], 5);
        assert_eq!(counts["b"], 0);
    }

    #[test]
    fn test_empty_instance_set_is_an_error() {
        let config = MulticacheConfig::new(
            Vec::new(),
            LoadBalancingStrategy::Smart,
            TtlConfig::default(),
        );
        let balancer = LoadBalancer::new(Arc::new(config));

        let err = balancer.select_instance(None).unwrap_err();
        assert!(matches!(err, CacheError::NoInstancesAvailable));
    }

    #[test]
    fn test_strategy_switch_takes_effect() {
        let balancer = balancer(LoadBalancingStrategy::Smart);
        assert_eq!(balancer.strategy(), LoadBalancingStrategy::Smart);

        balancer.set_strategy(LoadBalancingStrategy::RoundRobin);
        assert_eq!(balancer.strategy(), LoadBalancingStrategy::RoundRobin);

        let picks: Vec<String> = (0..3)
            .map(|_| balancer.select_instance(Some(DataCategory::Auth)).unwrap().id.clone())
            .collect();
        assert_eq!(picks, ["a", "b", "c"]);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "round_robin".parse::<LoadBalancingStrategy>().unwrap(),
            LoadBalancingStrategy::RoundRobin
        );
        assert_eq!(
            "data_type".parse::<LoadBalancingStrategy>().unwrap(),
            LoadBalancingStrategy::DataType
        );
        assert!("weighted".parse::<LoadBalancingStrategy>().is_err());
    }
}

/// Data categories and per-category TTL defaults
///
/// Every cached value belongs to a category (auth, orders, user, ...).
/// Categories drive two decisions: which instance owns the value and how
/// long it lives. Both lookups are total functions over the closed enum,
/// so resolution can never fail or fall through a string comparison.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// A string did not name a known data category
#[derive(Debug, thiserror::Error)]
#[error("Unknown data category: {0}")]
pub struct UnknownCategory(pub String);

/// Logical class of cached data, used for routing and TTL selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCategory {
    /// Tokens, sessions, login state
    Auth,

    /// Order snapshots and order-derived counters
    Orders,

    /// Pending notification payloads
    Notifications,

    /// Aggregated analytics windows
    Analytics,

    /// User profiles and preferences
    User,

    /// Menus and menu items
    Menu,

    /// Model predictions and feature vectors
    Ml,

    /// General-purpose cached responses
    Cache,

    /// Anything without a more specific category
    Default,
}

impl DataCategory {
    /// All categories, in a stable order
    pub const ALL: [DataCategory; 9] = [
        DataCategory::Auth,
        DataCategory::Orders,
        DataCategory::Notifications,
        DataCategory::Analytics,
        DataCategory::User,
        DataCategory::Menu,
        DataCategory::Ml,
        DataCategory::Cache,
        DataCategory::Default,
    ];

    /// Returns the wire/env representation of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Auth => "auth",
            DataCategory::Orders => "orders",
            DataCategory::Notifications => "notifications",
            DataCategory::Analytics => "analytics",
            DataCategory::User => "user",
            DataCategory::Menu => "menu",
            DataCategory::Ml => "ml",
            DataCategory::Cache => "cache",
            DataCategory::Default => "default",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auth" => Ok(DataCategory::Auth),
            "orders" => Ok(DataCategory::Orders),
            "notifications" => Ok(DataCategory::Notifications),
            "analytics" => Ok(DataCategory::Analytics),
            "user" => Ok(DataCategory::User),
            "menu" => Ok(DataCategory::Menu),
            "ml" => Ok(DataCategory::Ml),
            "cache" => Ok(DataCategory::Cache),
            "default" => Ok(DataCategory::Default),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// TTL defaults per data category, in seconds
///
/// Values mirror the lifetime of the underlying data: auth state is short,
/// menus change rarely, model output is effectively static for a day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Fallback TTL for uncategorized values
    pub default: u64,

    /// Tokens and sessions
    pub auth: u64,

    /// Order data
    pub orders: u64,

    /// User profiles
    pub user: u64,

    /// Menus
    pub menu: u64,

    /// Analytics windows
    pub analytics: u64,

    /// Notification payloads
    pub notifications: u64,

    /// Model predictions
    pub ml: u64,

    /// General cached responses
    pub cache: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        TtlConfig {
            default: 300,
            auth: 900,
            orders: 1800,
            user: 3600,
            menu: 7200,
            analytics: 600,
            notifications: 300,
            ml: 86400,
            cache: 1800,
        }
    }
}

impl TtlConfig {
    /// Creates a TTL configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `CACHE_TTL_DEFAULT`: fallback TTL in seconds (default: 300)
    /// - `CACHE_TTL_AUTH`: auth TTL in seconds (default: 900)
    /// - `CACHE_TTL_ML`: ML TTL in seconds (default: 86400)
    /// - `CACHE_TTL_ANALYTICS`: analytics TTL in seconds (default: 600)
    ///
    /// Unset or unparseable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = TtlConfig::default();

        if let Some(ttl) = read_ttl_var("CACHE_TTL_DEFAULT") {
            config.default = ttl;
        }
        if let Some(ttl) = read_ttl_var("CACHE_TTL_AUTH") {
            config.auth = ttl;
        }
        if let Some(ttl) = read_ttl_var("CACHE_TTL_ML") {
            config.ml = ttl;
        }
        if let Some(ttl) = read_ttl_var("CACHE_TTL_ANALYTICS") {
            config.analytics = ttl;
        }

        config
    }

    /// Returns the TTL for a category, in seconds
    ///
    /// Total over the enum; there is no failure case.
    pub fn ttl_for(&self, category: DataCategory) -> u64 {
        match category {
            DataCategory::Auth => self.auth,
            DataCategory::Orders => self.orders,
            DataCategory::Notifications => self.notifications,
            DataCategory::Analytics => self.analytics,
            DataCategory::User => self.user,
            DataCategory::Menu => self.menu,
            DataCategory::Ml => self.ml,
            DataCategory::Cache => self.cache,
            DataCategory::Default => self.default,
        }
    }
}

fn read_ttl_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Built once at process start (defaults -> optional TOML file -> env
// overrides), validated, then shared read-only through `Arc<AppConfig>`.
//
// ============================================================================

pub const CONFIG_PATH_ENV: &str = "PCBUILD_CONFIG";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub metrics: MetricsConfig,
    pub database: DatabaseConfig,
    pub inventory: InventoryConfig,
    pub pagination: PaginationConfig,
    pub analytics: AnalyticsConfig,
    pub retry: ReadRetryConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Store backend selection. Without a URL the in-memory store is used.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationPolicy {
    /// Orders are requests for goods; stock is untouched at creation.
    None,
    /// Order creation decrements stock in the same transaction.
    Reserve,
}

impl std::str::FromStr for ReservationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ReservationPolicy::None),
            "reserve" => Ok(ReservationPolicy::Reserve),
            other => Err(format!("unknown reservation policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InventoryConfig {
    pub reservation: ReservationPolicy,
    pub low_stock_threshold: i32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub recent_orders: u32,
    pub top_products: u32,
    pub dashboard_days: u32,
}

/// Backoff for idempotent reads at the HTTP boundary. Writes are never retried.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadRetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig::default(),
            inventory: InventoryConfig::default(),
            pagination: PaginationConfig::default(),
            analytics: AnalyticsConfig::default(),
            retry: ReadRetryConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            reservation: ReservationPolicy::None,
            low_stock_threshold: 10,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            recent_orders: 5,
            top_products: 10,
            dashboard_days: 30,
        }
    }
}

impl Default for ReadRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 1_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from the file named by `PCBUILD_CONFIG` (if any),
    /// then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(port) = lookup("PCBUILD_HTTP_PORT") {
            self.http.port = port.parse()?;
        }
        if let Some(port) = lookup("PCBUILD_METRICS_PORT") {
            self.metrics.port = port.parse()?;
        }
        if let Some(policy) = lookup("PCBUILD_RESERVATION_POLICY") {
            self.inventory.reservation = policy.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(threshold) = lookup("PCBUILD_LOW_STOCK_THRESHOLD") {
            self.inventory.low_stock_threshold = threshold.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pagination.default_per_page == 0 || self.pagination.max_per_page == 0 {
            anyhow::bail!("pagination sizes must be positive");
        }
        if self.pagination.default_per_page > self.pagination.max_per_page {
            anyhow::bail!("default_per_page cannot exceed max_per_page");
        }
        if self.inventory.low_stock_threshold < 0 {
            anyhow::bail!("low_stock_threshold cannot be negative");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.analytics.dashboard_days == 0 {
            anyhow::bail!("dashboard_days must be positive");
        }
        Ok(())
    }
}

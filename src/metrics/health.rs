use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::store::StoreHealth;

// ============================================================================
// Health Check Abstractions
// ============================================================================

/// A ping slower than this reports the store as degraded.
const SLOW_PING: Duration = Duration::from_millis(500);

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Unhealthy(_) => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Healthy => 2,
        }
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Ping the store and classify the answer.
pub async fn check_store(store: &dyn StoreHealth) -> ComponentHealth {
    let started = Instant::now();
    let result = store.ping().await;
    let elapsed = started.elapsed();
    let name = format!("store:{}", store.backend_name());

    match result {
        Ok(()) if elapsed > SLOW_PING => ComponentHealth::new(
            name,
            HealthStatus::Degraded(format!("ping took {}ms", elapsed.as_millis())),
        ),
        Ok(()) => ComponentHealth::new(name, HealthStatus::Healthy)
            .with_details(format!("ping {}ms", elapsed.as_millis())),
        Err(err) => {
            tracing::warn!(backend = store.backend_name(), error = %err, "❌ Store health check failed");
            ComponentHealth::new(name, HealthStatus::Unhealthy(err.public_message()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_check_store_reports_outage() {
        let store = InMemoryStore::new();
        let health = check_store(&store).await;
        assert!(health.status.is_healthy());
        assert_eq!(health.name, "store:memory");

        store.set_unavailable(true);
        let health = check_store(&store).await;
        assert!(health.status.is_unhealthy());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(HealthStatus::Degraded("slow".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "degraded", "reason": "slow"}));
    }
}

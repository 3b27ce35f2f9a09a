/// Engine configuration
///
/// # Environment variables
///
/// All settings can be overridden through the environment:
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | WORK_DIR | /var/lib/depot | Working directory (session database lives here) |
/// | ORDER_API_URL | http://localhost:3001 | Invoice gateway base URL |
/// | SKU_API_URL | http://localhost:3001 | SKU resolver base URL |
/// | GATEWAY_TIMEOUT_MS | 5000 | Budget for external gateway calls |
/// | POOL_TIMEOUT_MS | 3000 | Budget for inventory pool store calls |
/// | NOTIFY_QUEUE_CAPACITY | 1024 | Outbound notification queue size |
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for the session database and logs
    pub work_dir: String,
    /// Invoice gateway base URL
    pub order_api_url: String,
    /// SKU resolver base URL
    pub sku_api_url: String,
    /// Timeout budget for invoice/SKU gateway calls (milliseconds)
    pub gateway_timeout_ms: u64,
    /// Timeout budget for inventory pool store calls (milliseconds)
    pub pool_timeout_ms: u64,
    /// Outbound notification queue capacity
    pub notify_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/depot".into()),
            order_api_url: std::env::var("ORDER_API_URL")
                .unwrap_or_else(|_| "http://localhost:3001".into()),
            sku_api_url: std::env::var("SKU_API_URL")
                .unwrap_or_else(|_| "http://localhost:3001".into()),
            gateway_timeout_ms: std::env::var("GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            pool_timeout_ms: std::env::var("POOL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            notify_queue_capacity: std::env::var("NOTIFY_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
        }
    }

    /// Override the working directory; used by tests.
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// Path of the session database file under the working directory.
    pub fn session_db_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.work_dir).join("sessions.redb")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::with_work_dir("/tmp/depot-test");
        assert_eq!(config.work_dir, "/tmp/depot-test");
        assert!(config.gateway_timeout_ms > 0);
        assert!(config.notify_queue_capacity > 0);
        assert!(
            config
                .session_db_path()
                .to_string_lossy()
                .ends_with("sessions.redb")
        );
    }
}

use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Registry front page the crawl starts from.
    pub registry_base_url: String,
    pub headless: bool,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Timeout for UI waits (element visibility, overlay dismissal).
    pub ui_wait_secs: u64,
    /// Timeout for one detail-page HTTP fetch.
    pub detail_timeout_secs: u64,
    pub detail_user_agent: String,
    /// Attempts for retryable failures (stale element, fetch timeout).
    pub retry_max_attempts: u32,
    pub retry_delay_secs: u64,
    /// Worker-pool size for the image backfill.
    pub image_pool_size: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("registry_base_url", &self.registry_base_url)
            .field("headless", &self.headless)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("ui_wait_secs", &self.ui_wait_secs)
            .field("detail_timeout_secs", &self.detail_timeout_secs)
            .field("detail_user_agent", &self.detail_user_agent)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("image_pool_size", &self.image_pool_size)
            .finish()
    }
}

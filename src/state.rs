//! Application state management

use crate::cache::RateCache;
use crate::config::AppConfig;
use crate::db::sqlite::SqliteDb;
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::sources::SourceRegistry;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of the most recent successful rate refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub source: String,
    pub refreshed_at: DateTime<Utc>,
    pub rate_count: usize,
    pub static_fallback: bool,
}

/// Application state shared across handlers and background tasks
pub struct AppState {
    pub config: AppConfig,

    /// SQLite store for rate history and making-charge rules
    pub sqlite: Arc<SqliteDb>,

    /// Rate sources in fallback order
    pub sources: Arc<SourceRegistry>,

    /// Current rates (symbol -> rate)
    pub rate_cache: RateCache,

    /// Retry policy applied to every source
    pub retry_policy: RetryPolicy,

    /// Last successful refresh
    pub last_refresh: RwLock<Option<RefreshStatus>>,
}

impl AppState {
    /// Create application state from configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        tracing::info!("Database path: {:?}", config.database_path);

        let sqlite = Arc::new(SqliteDb::new(
            &config.database_path,
            config.refresh.store_timeout,
        )?);
        let sources = Arc::new(SourceRegistry::from_config(
            &config.sources,
            config.refresh.attempt_timeout,
        )?);

        Ok(Self::with_components(config, sqlite, sources))
    }

    /// Assemble state from pre-built components
    pub fn with_components(
        config: AppConfig,
        sqlite: Arc<SqliteDb>,
        sources: Arc<SourceRegistry>,
    ) -> Self {
        let rate_cache = RateCache::new(config.refresh.cache_ttl);
        let retry_policy = RetryPolicy::linear(config.refresh.attempts, config.refresh.backoff_step);

        tracing::info!(
            "Rate sources: {}",
            sources
                .list()
                .iter()
                .map(|s| s.id())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Self {
            config,
            sqlite,
            sources,
            rate_cache,
            retry_policy,
            last_refresh: RwLock::new(None),
        }
    }

    pub fn get_last_refresh(&self) -> Option<RefreshStatus> {
        self.last_refresh.read().clone()
    }

    pub fn set_last_refresh(&self, status: RefreshStatus) {
        *self.last_refresh.write() = Some(status);
    }
}

//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::services::{EmailNotifier, LifecycleService, ReminderEngine};
use crate::store::PgVisitStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    engine: ReminderEngine,
    lifecycle: LifecycleService,
}

impl AppState {
    /// Build the application state: wire the Postgres-backed visit store
    /// and SMTP notifier into the reminder engine and lifecycle service.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(
        config: ServerConfig,
        pool: PgPool,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        let store = Arc::new(PgVisitStore::new(pool.clone()));
        let notifier = Arc::new(EmailNotifier::new(&config.email)?);

        let engine = ReminderEngine::new(store.clone(), notifier, &config.reminders);
        let lifecycle = LifecycleService::new(store, config.reminders.grace);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                engine,
                lifecycle,
            }),
        })
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The reminder engine.
    #[must_use]
    pub fn engine(&self) -> &ReminderEngine {
        &self.inner.engine
    }

    /// The manual lifecycle service.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleService {
        &self.inner.lifecycle
    }
}

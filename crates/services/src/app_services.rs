use std::sync::Arc;

use tracing::info;

use duo_core::model::User;
use storage::repository::Storage;

use crate::Clock;
use crate::config::{EngineConfig, SyncConfig};
use crate::error::{AppServicesError, SyncError};
use crate::progress_engine::ProgressEngine;
use crate::sync::{HttpProgressSync, ProgressSync};

/// Assembles the progress engine with its storage and optional backend.
pub struct AppServices {
    engine: ProgressEngine,
    sync: Option<Arc<HttpProgressSync>>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// Backend sync is enabled when `DUO_API_BASE_URL` is set.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// backend configuration is invalid.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let sync_config = SyncConfig::from_env()?;
        Self::from_storage(storage, clock, EngineConfig::default(), sync_config)
    }

    /// Build services over an already opened storage aggregate.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Sync` if the HTTP client cannot be built.
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        config: EngineConfig,
        sync_config: Option<SyncConfig>,
    ) -> Result<Self, AppServicesError> {
        let sync = match sync_config {
            Some(config) => {
                info!(base_url = %config.base_url, "backend sync enabled");
                Some(Arc::new(HttpProgressSync::new(config)?))
            }
            None => None,
        };

        let mut engine = ProgressEngine::new(Arc::clone(&storage.kv), clock).with_config(config);
        if let Some(sync) = &sync {
            let sync: Arc<dyn ProgressSync> = sync.clone();
            engine = engine.with_sync(sync);
        }

        Ok(Self { engine, sync })
    }

    #[must_use]
    pub fn engine(&self) -> &ProgressEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ProgressEngine {
        &mut self.engine
    }

    #[must_use]
    pub fn into_engine(self) -> ProgressEngine {
        self.engine
    }

    #[must_use]
    pub fn sync_enabled(&self) -> bool {
        self.sync.is_some()
    }

    /// Log in against the backend and sign the engine in with the result.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Disabled` when no backend is configured, or the
    /// login failure otherwise. The engine is left untouched on error.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<User, SyncError> {
        let sync = self.sync.as_ref().ok_or(SyncError::Disabled)?;
        let (user, token) = sync.login(email, password).await?;
        self.engine.sign_in(user.clone(), Some(token));
        Ok(user)
    }
}

//! Shared wiring for CLI commands.

use crate::error::{CliError, CliResult};
use crate::remote::{Reachability, ReqwestClient};
use finsync_engine::{
    ConnectivityMonitor, EngineConfig, HttpGateway, Reconciler, StaticToken, TransactionService,
};
use finsync_store::{MonotonicClock, SqliteStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Gateway type used by the CLI.
pub type CliGateway = HttpGateway<ReqwestClient, ConnectivityMonitor>;

/// Reconciler type used by the CLI.
pub type CliReconciler = Reconciler<SqliteStore, CliGateway, SqliteStore>;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opened database plus engine configuration.
pub struct AppContext {
    store: Arc<SqliteStore>,
    clock: Arc<MonotonicClock>,
    config: EngineConfig,
    token: Option<String>,
}

impl AppContext {
    /// Opens (or creates) the database at `db`.
    pub fn open(db: &Path, config: EngineConfig, token: Option<String>) -> CliResult<Self> {
        let store = Arc::new(SqliteStore::open(db)?);
        let clock = Arc::new(MonotonicClock::starting_after(store.max_last_updated()?));
        tracing::debug!(db = %db.display(), server = %config.server_url, "opened local database");
        Ok(Self {
            store,
            clock,
            config,
            token,
        })
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the local write path.
    pub fn service(&self) -> TransactionService<SqliteStore> {
        TransactionService::new(Arc::clone(&self.store), Arc::clone(&self.clock))
    }

    /// Returns a probe targeting the configured server.
    pub fn reachability(&self) -> CliResult<Reachability> {
        Reachability::for_server(&self.config.server_url, PROBE_TIMEOUT)
    }

    /// Builds a reconciler whose gateway consults `monitor` before each call.
    pub fn reconciler(&self, monitor: Arc<ConnectivityMonitor>) -> CliResult<CliReconciler> {
        let token = self.token.clone().ok_or(CliError::MissingToken)?;
        let client = ReqwestClient::new(&self.config.server_url, self.config.request_timeout)?;
        let gateway = HttpGateway::new(
            client,
            monitor,
            StaticToken::new(token),
            self.config.retry.clone(),
        );
        Ok(Reconciler::new(
            Arc::clone(&self.store),
            Arc::new(gateway),
            Arc::clone(&self.store),
        )
        .with_lease_ttl(self.config.lease_ttl))
    }
}

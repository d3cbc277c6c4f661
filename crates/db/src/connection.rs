use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::mysql::MySqlPoolOptions;

use askdb_core::config::DatabaseConfig;

pub type DbPool = sqlx::MySqlPool;

/// Opens the shared MySQL pool. Connections are health-checked before reuse
/// and recycled after `recycle_secs` to survive server-side idle timeouts.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs.max(1)))
        .max_lifetime(Duration::from_secs(config.recycle_secs.max(1)))
        .test_before_acquire(true)
        .connect(&connection_url(config))
        .await
}

// The assembled URL carries the password and must never appear in logs or
// error payloads; it exists only for the duration of this call.
fn connection_url(config: &DatabaseConfig) -> String {
    format!(
        "mysql://{}:{}@{}:{}/{}",
        config.user,
        config.password.expose_secret(),
        config.host,
        config.port,
        config.database
    )
}

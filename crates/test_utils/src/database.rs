//! Database Test Utilities
//!
//! Starts PostgreSQL in a testcontainer, applies the ledger migrations and
//! hands out a [`PostgresLedgerStore`] on it. Tests using this module need a
//! Docker daemon and are marked `#[ignore]`.

use std::sync::Arc;

use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use domain_ledger::LedgerEngine;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};

use crate::builders::EngineHarness;
use crate::fixtures::TEST_ENGINE_CONFIG;

const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "ledger_test";

/// Connection settings of a test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    /// Creates the database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A migrated PostgreSQL running in a container
pub struct TestDatabase {
    _container: ContainerAsync<Postgres>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new container and applies the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or a migration fails
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let container = Postgres::default()
            .with_user(POSTGRES_USER)
            .with_password(POSTGRES_PASSWORD)
            .with_db_name(POSTGRES_DB)
            .start()
            .await?;

        let config = TestDatabaseConfig {
            host: container.get_host().await?.to_string(),
            port: container.get_host_port_ipv4(5432).await?,
            ..TestDatabaseConfig::default()
        };

        let pool = create_pool(DatabaseConfig::new(config.connection_url()).max_connections(20).min_connections(1))
            .await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn store(&self) -> PostgresLedgerStore {
        PostgresLedgerStore::new(self.pool.clone())
    }

    /// An engine on this database with the in-memory remote and event doubles
    pub fn engine(&self, harness: &EngineHarness) -> Arc<LedgerEngine> {
        let engine = LedgerEngine::new(
            Arc::new(self.store()),
            harness.remote.clone(),
            harness.events.clone(),
            TEST_ENGINE_CONFIG.clone(),
        )
        .expect("test engine config is valid");
        Arc::new(engine)
    }

    /// Removes all rows while preserving the schema
    pub async fn clear_data(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        sqlx::query("TRUNCATE TABLE ledger_entries, transfers, payments, accounts CASCADE")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a database shared by the tests of one binary
///
/// # Panics
///
/// Panics if the database fails to initialize
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

//! Storage interfaces consumed by the routing engine, plus the `SQLite` database
//! that backs the bundled repositories.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::Result;
use crate::account::{Account, AccountId, AccountRepository};
use crate::provider::{Provider, ProviderId, ProviderRepository, ProviderStatus};

/// Read access to accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Loads an account, attaching its provider when `with_provider` is set
    /// and the provider exists.
    async fn find_by_id(&self, id: AccountId, with_provider: bool) -> Result<Option<Account>>;

    /// Loads up to `limit` accounts that have a provider, ordered by provider
    /// status (active first) and then by account creation time, oldest first.
    async fn find_candidates(&self, limit: usize) -> Result<Vec<Account>>;
}

/// Provider lookups and status updates.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Loads a provider by identifier.
    async fn find_by_id(&self, id: ProviderId) -> Result<Option<Provider>>;

    /// Persists a status change.
    async fn update_status(&self, id: ProviderId, status: ProviderStatus) -> Result<()>;
}

/// `SQLite` database holding the `providers` and `accounts` tables.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn open(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Initialize database schema.
    ///
    /// `accounts.provider_id` carries no foreign key: an account whose
    /// provider was removed stays loadable and is reported as misconfigured.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS providers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                mode TEXT NOT NULL,
                smtp TEXT,
                secret TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                provider_id INTEGER NOT NULL,
                auth_override TEXT,
                created_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Account repository sharing this database's pool.
    #[must_use]
    pub fn accounts(&self) -> AccountRepository {
        AccountRepository::new(self.pool.clone())
    }

    /// Provider repository sharing this database's pool.
    #[must_use]
    pub fn providers(&self) -> ProviderRepository {
        ProviderRepository::new(self.pool.clone())
    }
}

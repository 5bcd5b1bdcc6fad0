//! Account storage repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::{debug, warn};

use super::model::{Account, AccountId};
use crate::Result;
use crate::provider::{ProviderId, ProviderStatus, row_to_provider};
use crate::store::AccountStore;

const SELECT_WITH_PROVIDER: &str = r"
    SELECT a.id, a.email, a.provider_id, a.auth_override, a.created_at,
           p.id AS p_id, p.name AS p_name, p.mode AS p_mode, p.smtp AS p_smtp,
           p.secret AS p_secret, p.status AS p_status
    FROM accounts a
";

/// Repository for account storage and retrieval.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all accounts with their providers, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let sql = format!(
            "{SELECT_WITH_PROVIDER} LEFT JOIN providers p ON p.id = a.provider_id
             ORDER BY a.created_at ASC, a.id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| row_to_account(row, true)).collect())
    }

    /// Save an account (insert or update).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save(&self, account: &mut Account) -> Result<()> {
        let auth_override = account
            .auth_override
            .as_ref()
            .map(|s| s.expose_secret().clone());

        if let Some(id) = account.id {
            sqlx::query(
                r"
                UPDATE accounts SET email = ?, provider_id = ?, auth_override = ?
                WHERE id = ?
                ",
            )
            .bind(&account.email)
            .bind(account.provider_id.0)
            .bind(auth_override)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO accounts (email, provider_id, auth_override, created_at)
                VALUES (?, ?, ?, ?)
                ",
            )
            .bind(&account.email)
            .bind(account.provider_id.0)
            .bind(auth_override)
            .bind(account.created_at.timestamp_millis())
            .execute(&self.pool)
            .await?;

            account.id = Some(AccountId::new(result.last_insert_rowid()));
        }

        debug!("Saved account {}", account.label());
        Ok(())
    }

    /// Delete an account. Returns false if no row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: AccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn find_by_id(&self, id: AccountId, with_provider: bool) -> Result<Option<Account>> {
        let sql = format!(
            "{SELECT_WITH_PROVIDER} LEFT JOIN providers p ON p.id = a.provider_id
             WHERE a.id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(|row| row_to_account(row, with_provider)))
    }

    async fn find_candidates(&self, limit: usize) -> Result<Vec<Account>> {
        // Inner join: accounts whose provider is gone never become candidates.
        let sql = format!(
            "{SELECT_WITH_PROVIDER} JOIN providers p ON p.id = a.provider_id
             ORDER BY CASE p.status WHEN ? THEN ? ELSE ? END ASC,
                      a.created_at ASC, a.id ASC
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(ProviderStatus::Active.as_str())
            .bind(ProviderStatus::Active.rank())
            .bind(ProviderStatus::Inactive.rank())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row_to_account(row, true)).collect())
    }
}

/// Convert a joined database row to an Account.
fn row_to_account(row: &SqliteRow, with_provider: bool) -> Account {
    let id = AccountId::new(row.get("id"));
    let millis: i64 = row.get("created_at");
    let created_at = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(|| {
        warn!("Account {id} has an out-of-range creation time: {millis}");
        DateTime::<Utc>::UNIX_EPOCH
    });

    Account {
        id: Some(id),
        email: row.get("email"),
        provider_id: ProviderId::new(row.get("provider_id")),
        provider: if with_provider {
            row_to_provider(row)
        } else {
            None
        },
        auth_override: row
            .get::<Option<String>, _>("auth_override")
            .map(SecretString::new),
        created_at,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::unreadable_literal,
    clippy::similar_names
)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::provider::{ConnectionMode, Provider, ProviderRepository, Security, SmtpDescriptor};
    use crate::store::{Database, ProviderStore};

    async fn provider(repo: &ProviderRepository, name: &str) -> ProviderId {
        let mut provider = Provider::new(
            name,
            ConnectionMode::Password,
            SmtpDescriptor::new("smtp.example.com", Security::Tls),
        );
        repo.save(&mut provider).await.unwrap();
        provider.id.unwrap()
    }

    fn account_at(email: &str, provider_id: ProviderId, age_minutes: i64) -> Account {
        let mut account = Account::new(email, provider_id);
        account.created_at = Utc::now() - Duration::minutes(age_minutes);
        account
    }

    #[tokio::test]
    async fn test_create_and_retrieve_account() {
        let db = Database::in_memory().await.unwrap();
        let provider_id = provider(&db.providers(), "Relay").await;
        let repo = db.accounts();

        let mut account = Account::new("ops@example.com", provider_id).with_auth_override("pw");
        repo.save(&mut account).await.unwrap();
        let id = account.id.unwrap();

        let loaded = repo.find_by_id(id, true).await.unwrap().unwrap();
        assert_eq!(loaded.email, "ops@example.com");
        assert_eq!(loaded.provider_id, provider_id);
        assert_eq!(loaded.provider.unwrap().name, "Relay");
        assert_eq!(loaded.auth_override.unwrap().expose_secret(), "pw");
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            account.created_at.timestamp_millis()
        );

        let bare = repo.find_by_id(id, false).await.unwrap().unwrap();
        assert!(bare.provider.is_none());
    }

    #[tokio::test]
    async fn test_missing_provider_is_not_attached() {
        let db = Database::in_memory().await.unwrap();
        let repo = db.accounts();

        let mut account = Account::new("orphan@example.com", ProviderId::new(404));
        repo.save(&mut account).await.unwrap();

        let loaded = repo.find_by_id(account.id.unwrap(), true).await.unwrap().unwrap();
        assert!(loaded.provider.is_none());
        assert!(repo.find_candidates(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_candidates_order_active_first_then_oldest() {
        let db = Database::in_memory().await.unwrap();
        let providers = db.providers();
        let repo = db.accounts();

        let healthy = provider(&providers, "Healthy").await;
        let broken = provider(&providers, "Broken").await;
        providers
            .update_status(broken, ProviderStatus::Inactive)
            .await
            .unwrap();

        let mut inactive_oldest = account_at("a@example.com", broken, 300);
        let mut active_new = account_at("b@example.com", healthy, 10);
        let mut active_old = account_at("c@example.com", healthy, 100);
        for account in [&mut inactive_oldest, &mut active_new, &mut active_old] {
            repo.save(account).await.unwrap();
        }

        let emails: Vec<String> = repo
            .find_candidates(5)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.email)
            .collect();
        assert_eq!(emails, ["c@example.com", "b@example.com", "a@example.com"]);
    }

    #[tokio::test]
    async fn test_candidates_respect_limit() {
        let db = Database::in_memory().await.unwrap();
        let provider_id = provider(&db.providers(), "Relay").await;
        let repo = db.accounts();

        for n in 0..7 {
            let mut account = account_at(&format!("user{n}@example.com"), provider_id, 100 - n);
            repo.save(&mut account).await.unwrap();
        }

        let candidates = repo.find_candidates(5).await.unwrap();
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[0].email, "user0@example.com");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = Database::in_memory().await.unwrap();
        let provider_id = provider(&db.providers(), "Relay").await;
        let repo = db.accounts();

        let mut account = Account::new("old@example.com", provider_id);
        repo.save(&mut account).await.unwrap();
        account.email = "new@example.com".to_string();
        repo.save(&mut account).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].email, "new@example.com");

        assert!(repo.delete(account.id.unwrap()).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }
}

//! Provider storage repository.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::{debug, warn};

use super::model::{ConnectionMode, Provider, ProviderId, ProviderStatus, SmtpDescriptor};
use crate::Result;
use crate::store::ProviderStore;

/// Repository for provider storage and retrieval.
#[derive(Debug, Clone)]
pub struct ProviderRepository {
    pool: SqlitePool,
}

impl ProviderRepository {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get all providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query(
            r"
            SELECT id AS p_id, name AS p_name, mode AS p_mode, smtp AS p_smtp,
                   secret AS p_secret, status AS p_status
            FROM providers
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_provider).collect())
    }

    /// Save a provider (insert or update).
    ///
    /// Status is written on insert only; afterwards it changes through
    /// [`ProviderStore::update_status`].
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be serialized or the query fails.
    pub async fn save(&self, provider: &mut Provider) -> Result<()> {
        let smtp = provider
            .smtp
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let secret = provider
            .secret
            .as_ref()
            .map(|s| s.expose_secret().clone());

        if let Some(id) = provider.id {
            sqlx::query(
                r"
                UPDATE providers SET
                    name = ?, mode = ?, smtp = ?, secret = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(&provider.name)
            .bind(provider.mode.as_str())
            .bind(smtp)
            .bind(secret)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO providers (name, mode, smtp, secret, status)
                VALUES (?, ?, ?, ?, ?)
                ",
            )
            .bind(&provider.name)
            .bind(provider.mode.as_str())
            .bind(smtp)
            .bind(secret)
            .bind(provider.status.as_str())
            .execute(&self.pool)
            .await?;

            provider.id = Some(ProviderId::new(result.last_insert_rowid()));
        }

        debug!("Saved provider {}", provider.label());
        Ok(())
    }

    /// Delete a provider. Returns false if no row matched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: ProviderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProviderStore for ProviderRepository {
    async fn find_by_id(&self, id: ProviderId) -> Result<Option<Provider>> {
        let row = sqlx::query(
            r"
            SELECT id AS p_id, name AS p_name, mode AS p_mode, smtp AS p_smtp,
                   secret AS p_secret, status AS p_status
            FROM providers
            WHERE id = ?
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(row_to_provider))
    }

    async fn update_status(&self, id: ProviderId, status: ProviderStatus) -> Result<()> {
        sqlx::query(
            "UPDATE providers SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Convert a row with `p_`-prefixed provider columns to a Provider.
///
/// Returns None when the provider columns are null (outer join with no match).
/// An unreadable SMTP descriptor is logged and dropped, which later surfaces
/// as missing configuration.
pub(crate) fn row_to_provider(row: &SqliteRow) -> Option<Provider> {
    let id: Option<i64> = row.get("p_id");
    let id = ProviderId::new(id?);

    let smtp = row
        .get::<Option<String>, _>("p_smtp")
        .and_then(|json| match serde_json::from_str::<SmtpDescriptor>(&json) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("Ignoring unreadable SMTP descriptor on provider {id}: {e}");
                None
            }
        });

    Some(Provider {
        id: Some(id),
        name: row.get("p_name"),
        mode: ConnectionMode::parse(row.get("p_mode")),
        smtp,
        secret: row
            .get::<Option<String>, _>("p_secret")
            .map(SecretString::new),
        status: ProviderStatus::parse(row.get("p_status")),
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::provider::Security;
    use crate::store::Database;

    fn relay() -> Provider {
        Provider::new(
            "Relay",
            ConnectionMode::Password,
            SmtpDescriptor::new("smtp.example.com", Security::StartTls),
        )
        .with_secret("relay-pass")
    }

    #[tokio::test]
    async fn test_create_and_retrieve_provider() {
        let repo = Database::in_memory().await.unwrap().providers();

        let mut provider = relay();
        repo.save(&mut provider).await.unwrap();
        let id = provider.id.unwrap();

        let loaded = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Relay");
        assert_eq!(loaded.mode, ConnectionMode::Password);
        assert_eq!(loaded.status, ProviderStatus::Active);
        assert_eq!(loaded.smtp.unwrap().port, 587);
        assert_eq!(loaded.secret.unwrap().expose_secret(), "relay-pass");
    }

    #[tokio::test]
    async fn test_update_status() {
        let repo = Database::in_memory().await.unwrap().providers();
        let mut provider = relay();
        repo.save(&mut provider).await.unwrap();
        let id = provider.id.unwrap();

        repo.update_status(id, ProviderStatus::Inactive).await.unwrap();

        let loaded = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProviderStatus::Inactive);
    }

    #[tokio::test]
    async fn test_save_does_not_touch_status() {
        let repo = Database::in_memory().await.unwrap().providers();
        let mut provider = relay();
        repo.save(&mut provider).await.unwrap();
        let id = provider.id.unwrap();
        repo.update_status(id, ProviderStatus::Inactive).await.unwrap();

        provider.name = "Renamed".to_string();
        provider.status = ProviderStatus::Active;
        repo.save(&mut provider).await.unwrap();

        let loaded = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.status, ProviderStatus::Inactive);
    }

    #[tokio::test]
    async fn test_provider_without_descriptor() {
        let repo = Database::in_memory().await.unwrap().providers();
        let mut provider = Provider {
            name: "Bare".to_string(),
            ..Default::default()
        };
        repo.save(&mut provider).await.unwrap();

        let loaded = repo.find_by_id(provider.id.unwrap()).await.unwrap().unwrap();
        assert!(loaded.smtp.is_none());
        assert!(loaded.secret.is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let repo = Database::in_memory().await.unwrap().providers();
        let mut first = relay();
        let mut second = relay();
        repo.save(&mut first).await.unwrap();
        repo.save(&mut second).await.unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 2);
        assert!(repo.delete(first.id.unwrap()).await.unwrap());
        assert!(!repo.delete(first.id.unwrap()).await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.find_by_id(first.id.unwrap()).await.unwrap().is_none());
    }
}

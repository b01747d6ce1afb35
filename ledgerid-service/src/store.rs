//! Persistent credential storage with SQLite.
//!
//! The credential store is the authoritative side of the dual ledger: every
//! authentication decision reads from here and only here. Uniqueness
//! invariants (handle, wallet when present, credential id globally) are
//! enforced by UNIQUE constraints at the storage boundary, and single-winner
//! state transitions (the authenticator counter) use atomic conditional
//! UPDATEs rather than read-modify-write.

use std::path::Path;

use chrono::{DateTime, Utc};
use ledgerid_core::{
    Address, BoundAuthenticator, CredentialId, Handle, Identity, IdentityId, IdentityPatch,
    NewIdentity, Role,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Errors that can occur during credential store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The identity (or authenticator) does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness invariant was violated; no partial write is retained.
    #[error("conflict on {0}")]
    Conflict(&'static str),

    /// The proposed counter value does not strictly increase.
    #[error("authenticator counter not increasing")]
    CounterNotIncreasing,

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Map a unique-constraint violation to the field that caused it.
fn conflict_field(err: &sqlx::Error) -> Option<&'static str> {
    let db = err.as_database_error()?;
    if !db.is_unique_violation() {
        return None;
    }
    let message = db.message();
    if message.contains("identities.handle") {
        Some("handle")
    } else if message.contains("identities.wallet") {
        Some("wallet")
    } else if message.contains("authenticators.credential_id") {
        Some("credential id")
    } else {
        Some("unique constraint")
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    match conflict_field(&err) {
        Some(field) => StoreError::Conflict(field),
        None => StoreError::Database(err),
    }
}

/// Durable mapping from identity to profile, secret hash, and bound
/// authenticators.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    /// Open or create a store at the given path.
    ///
    /// WAL mode for concurrent reads; a single writer connection, which is
    /// where SQLite performs best.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(sqlx::Error::Configuration(
                    format!("failed to create store directory: {e}").into(),
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create a store backed by an in-memory database (tests, ephemeral use).
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                id TEXT PRIMARY KEY,
                handle TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL,
                wallet TEXT UNIQUE,
                secret_hash TEXT,
                chain_pending INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_login TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS authenticators (
                credential_id TEXT PRIMARY KEY,
                identity_id TEXT NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
                public_key BLOB NOT NULL,
                counter INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_used_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Identity operations
    // =========================================================================

    /// Insert a new identity.
    ///
    /// # Errors
    ///
    /// `Conflict` when the handle or wallet is already taken; no partial
    /// write is retained.
    pub async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let now = Utc::now();
        let identity = Identity {
            id: IdentityId::generate(),
            handle: new.handle,
            username: new.username,
            display_name: new.display_name,
            role: new.role,
            wallet: new.wallet,
            secret_hash: new.secret_hash,
            chain_pending: false,
            created_at: now,
            updated_at: now,
            last_login: None,
        };

        sqlx::query(
            r#"
            INSERT INTO identities (
                id, handle, username, display_name, role, wallet,
                secret_hash, chain_pending, created_at, updated_at, last_login
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(identity.id.to_string())
        .bind(identity.handle.as_str())
        .bind(&identity.username)
        .bind(&identity.display_name)
        .bind(identity.role.as_str())
        .bind(identity.wallet.as_ref().map(|w| w.as_str().to_string()))
        .bind(&identity.secret_hash)
        .bind(identity.chain_pending)
        .bind(identity.created_at.to_rfc3339())
        .bind(identity.updated_at.to_rfc3339())
        .bind(identity.last_login.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(identity)
    }

    /// Apply a partial profile update.
    ///
    /// # Errors
    ///
    /// `NotFound` if the identity does not exist, `Conflict` if the patch
    /// collides with another identity's wallet.
    pub async fn update(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
    ) -> Result<Identity, StoreError> {
        let current = self.find_by_id(id).await?.ok_or(StoreError::NotFound)?;

        let updated = Identity {
            username: patch.username.unwrap_or(current.username),
            display_name: patch.display_name.unwrap_or(current.display_name),
            role: patch.role.unwrap_or(current.role),
            wallet: patch.wallet.or(current.wallet),
            updated_at: Utc::now(),
            ..current
        };

        let result = sqlx::query(
            r#"
            UPDATE identities
            SET username = ?2, display_name = ?3, role = ?4, wallet = ?5, updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(updated.id.to_string())
        .bind(&updated.username)
        .bind(&updated.display_name)
        .bind(updated.role.as_str())
        .bind(updated.wallet.as_ref().map(|w| w.as_str().to_string()))
        .bind(updated.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(updated)
    }

    pub async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query("SELECT * FROM identities WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_identity_row(&r)).transpose().map_err(Into::into)
    }

    pub async fn find_by_handle(&self, handle: &Handle) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query("SELECT * FROM identities WHERE handle = ?")
            .bind(handle.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_identity_row(&r)).transpose().map_err(Into::into)
    }

    pub async fn find_by_wallet(&self, wallet: &Address) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query("SELECT * FROM identities WHERE wallet = ?")
            .bind(wallet.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_identity_row(&r)).transpose().map_err(Into::into)
    }

    /// List all identities, oldest first.
    pub async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let rows = sqlx::query("SELECT * FROM identities ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        let mut identities = Vec::with_capacity(rows.len());
        for row in rows {
            identities.push(parse_identity_row(&row)?);
        }
        Ok(identities)
    }

    /// Record a successful login time.
    pub async fn touch_last_login(&self, id: IdentityId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE identities SET last_login = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Flag (or clear) chain divergence for an identity.
    pub async fn set_chain_pending(&self, id: IdentityId, pending: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE identities SET chain_pending = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(pending)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete an identity locally.
    ///
    /// Local-only: any on-chain record referencing this identity is NOT
    /// retracted (the registry interface has no delete operation).
    ///
    /// Returns whether a row was removed.
    pub async fn delete(&self, id: IdentityId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM identities WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Authenticator operations
    // =========================================================================

    /// Bind a new authenticator to an identity.
    ///
    /// # Errors
    ///
    /// `Conflict("credential id")` when the credential id exists anywhere in
    /// the store; uniqueness is global, not per-identity.
    pub async fn add_authenticator(
        &self,
        identity_id: IdentityId,
        credential_id: &CredentialId,
        public_key: &[u8],
    ) -> Result<BoundAuthenticator, StoreError> {
        let authenticator = BoundAuthenticator {
            credential_id: credential_id.clone(),
            identity_id,
            public_key: public_key.to_vec(),
            counter: 0,
            created_at: Utc::now(),
            last_used_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO authenticators (credential_id, identity_id, public_key, counter, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(authenticator.credential_id.as_str())
        .bind(authenticator.identity_id.to_string())
        .bind(&authenticator.public_key)
        .bind(authenticator.counter as i64)
        .bind(authenticator.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(authenticator)
    }

    pub async fn find_authenticator(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Option<BoundAuthenticator>, StoreError> {
        let row = sqlx::query("SELECT * FROM authenticators WHERE credential_id = ?")
            .bind(credential_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_authenticator_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    /// All authenticators bound to an identity.
    pub async fn authenticators_for(
        &self,
        identity_id: IdentityId,
    ) -> Result<Vec<BoundAuthenticator>, StoreError> {
        let rows = sqlx::query("SELECT * FROM authenticators WHERE identity_id = ? ORDER BY created_at")
            .bind(identity_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut authenticators = Vec::with_capacity(rows.len());
        for row in rows {
            authenticators.push(parse_authenticator_row(&row)?);
        }
        Ok(authenticators)
    }

    /// Advance an authenticator's signature counter.
    ///
    /// Single conditional UPDATE: the WHERE clause only matches while the
    /// stored counter is strictly below the proposed value, so under races
    /// at most one write per value is accepted and the stored value ends at
    /// the maximum accepted value.
    ///
    /// # Errors
    ///
    /// `CounterNotIncreasing` when the proposed value is not strictly
    /// greater than the stored one: a repeat or decrease signals a cloned
    /// authenticator and the caller must reject the assertion.
    pub async fn bump_counter(
        &self,
        identity_id: IdentityId,
        credential_id: &CredentialId,
        new_counter: u32,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE authenticators
            SET counter = ?3, last_used_at = ?4
            WHERE credential_id = ?1 AND identity_id = ?2 AND counter < ?3
            "#,
        )
        .bind(credential_id.as_str())
        .bind(identity_id.to_string())
        .bind(new_counter as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CounterNotIncreasing);
        }
        Ok(())
    }
}

fn decode_err(context: &str, err: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("{context}: {err}").into())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| decode_err("invalid timestamp", e))
}

fn parse_identity_row(row: &SqliteRow) -> Result<Identity, sqlx::Error> {
    let id_str: String = row.try_get("id")?;
    let id = IdentityId(
        Uuid::parse_str(&id_str).map_err(|e| decode_err("invalid identity id", e))?,
    );

    let handle_str: String = row.try_get("handle")?;
    let handle = Handle::parse(&handle_str).map_err(|e| decode_err("invalid handle", e))?;

    let role_str: String = row.try_get("role")?;
    let role: Role = role_str
        .parse()
        .map_err(|e| decode_err("invalid role", e))?;

    let wallet = row
        .try_get::<Option<String>, _>("wallet")?
        .map(|w| Address::parse(&w).map_err(|e| decode_err("invalid wallet", e)))
        .transpose()?;

    let created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?)?;
    let updated_at = parse_timestamp(&row.try_get::<String, _>("updated_at")?)?;
    let last_login = row
        .try_get::<Option<String>, _>("last_login")?
        .map(|t| parse_timestamp(&t))
        .transpose()?;

    Ok(Identity {
        id,
        handle,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        role,
        wallet,
        secret_hash: row.try_get("secret_hash")?,
        chain_pending: row.try_get("chain_pending")?,
        created_at,
        updated_at,
        last_login,
    })
}

fn parse_authenticator_row(row: &SqliteRow) -> Result<BoundAuthenticator, sqlx::Error> {
    let identity_str: String = row.try_get("identity_id")?;
    let identity_id = IdentityId(
        Uuid::parse_str(&identity_str).map_err(|e| decode_err("invalid identity id", e))?,
    );

    let counter: i64 = row.try_get("counter")?;
    let created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?)?;
    let last_used_at = row
        .try_get::<Option<String>, _>("last_used_at")?
        .map(|t| parse_timestamp(&t))
        .transpose()?;

    Ok(BoundAuthenticator {
        credential_id: CredentialId::new(row.try_get::<String, _>("credential_id")?),
        identity_id,
        public_key: row.try_get("public_key")?,
        counter: counter as u32,
        created_at,
        last_used_at,
    })
}

//! PostgreSQL implementation of the account and post storage traits.

use async_trait::async_trait;
use quillpost_core::{Account, AccountId, NewAccount, NewPost, Page, PageRequest, Post, PostId};
use quillpost_storage::{AccountStorage, PostStorage, StorageError, StorageResult};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, PgTransaction, Postgres};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::PostgresConfig;
use crate::error::{self, query_error};
use crate::migrations;

type AccountTuple = (i64, String, String);
type PostTuple = (i64, i64, String, String, OffsetDateTime);

fn account_from_tuple(row: AccountTuple) -> Account {
    Account {
        id: AccountId::new(row.0),
        username: row.1,
        secret_hash: row.2,
    }
}

fn post_from_tuple(row: PostTuple) -> Post {
    Post {
        id: PostId::new(row.0),
        owner_id: AccountId::new(row.1),
        title: row.2,
        body: row.3,
        created_at: row.4,
    }
}

fn internal(err: sqlx_core::Error) -> StorageError {
    query_error(err, String::new)
}

/// Account and post storage backed by a PostgreSQL pool.
///
/// Every write runs inside its own transaction and is either committed as a
/// whole or rolled back before the error is returned.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new storage over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool, checks the database answers, and applies migrations
    /// when `run_migrations` is set.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config, an unreachable database, or a
    /// failed migration.
    pub async fn connect(config: &PostgresConfig) -> error::Result<Self> {
        config.validate()?;
        info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PoolOptions::<Postgres>::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;
        query("SELECT 1").execute(&pool).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> StorageResult<PgTransaction<'static>> {
        self.pool.begin().await.map_err(|e| {
            StorageError::transaction_error(format!("Failed to begin transaction: {e}"))
        })
    }
}

/// Commits `tx` when `result` is `Ok`, otherwise rolls it back and returns
/// the original error.
async fn finish<T>(tx: PgTransaction<'static>, result: StorageResult<T>) -> StorageResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to commit transaction: {e}"))
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back transaction");
            } else {
                debug!("Transaction rolled back");
            }
            Err(err)
        }
    }
}

#[async_trait]
impl AccountStorage for PostgresStorage {
    async fn create(&self, account: NewAccount) -> StorageResult<Account> {
        let mut tx = self.begin().await?;
        let username = account.username.clone();

        let result = query_as::<_, AccountTuple>(
            r#"
            INSERT INTO account (username, secret_hash)
            VALUES ($1, $2)
            RETURNING id, username, secret_hash
            "#,
        )
        .bind(&account.username)
        .bind(&account.secret_hash)
        .fetch_one(&mut *tx)
        .await
        .map(account_from_tuple)
        .map_err(|e| query_error(e, || format!("username '{username}' already exists")));

        finish(tx, result).await
    }

    async fn find_by_username(&self, username: &str) -> StorageResult<Option<Account>> {
        let row: Option<AccountTuple> = query_as(
            r#"
            SELECT id, username, secret_hash
            FROM account
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        Ok(row.map(account_from_tuple))
    }
}

#[async_trait]
impl PostStorage for PostgresStorage {
    async fn create(&self, post: NewPost) -> StorageResult<Post> {
        let mut tx = self.begin().await?;

        let result = query_as::<_, PostTuple>(
            r#"
            INSERT INTO post (owner_id, title, body, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, owner_id, title, body, created_at
            "#,
        )
        .bind(post.owner_id.get())
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.created_at)
        .fetch_one(&mut *tx)
        .await
        .map(post_from_tuple)
        .map_err(internal);

        finish(tx, result).await
    }

    async fn find_owned(&self, id: PostId, owner: AccountId) -> StorageResult<Option<Post>> {
        let row: Option<PostTuple> = query_as(
            r#"
            SELECT id, owner_id, title, body, created_at
            FROM post
            WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id.get())
        .bind(owner.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        Ok(row.map(post_from_tuple))
    }

    async fn update_owned(
        &self,
        id: PostId,
        owner: AccountId,
        title: &str,
        body: &str,
    ) -> StorageResult<Option<Post>> {
        let mut tx = self.begin().await?;

        let result = query_as::<_, PostTuple>(
            r#"
            UPDATE post
            SET title = $3, body = $4
            WHERE id = $1 AND owner_id = $2
            RETURNING id, owner_id, title, body, created_at
            "#,
        )
        .bind(id.get())
        .bind(owner.get())
        .bind(title)
        .bind(body)
        .fetch_optional(&mut *tx)
        .await
        .map(|row| row.map(post_from_tuple))
        .map_err(internal);

        finish(tx, result).await
    }

    async fn delete_owned(&self, id: PostId, owner: AccountId) -> StorageResult<bool> {
        let mut tx = self.begin().await?;

        let result = query("DELETE FROM post WHERE id = $1 AND owner_id = $2")
            .bind(id.get())
            .bind(owner.get())
            .execute(&mut *tx)
            .await
            .map(|done| done.rows_affected() > 0)
            .map_err(internal);

        finish(tx, result).await
    }

    async fn list_owned(&self, owner: AccountId, page: PageRequest) -> StorageResult<Page<Post>> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM post WHERE owner_id = $1")
            .bind(owner.get())
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;

        let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

        let rows: Vec<PostTuple> = query_as(
            r#"
            SELECT id, owner_id, title, body, created_at
            FROM post
            WHERE owner_id = $1
            ORDER BY id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner.get())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let items = rows.into_iter().map(post_from_tuple).collect();
        Ok(Page::new(items, u64::try_from(total).unwrap_or(0), page))
    }
}

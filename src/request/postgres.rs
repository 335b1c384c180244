//! Postgres queries
use super::identity::{Identity, Scope};
use crate::config;
use crate::event::Id;

use ::postgres;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use r2d2_postgres::PostgresConnectionManager;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Result<T> = std::result::Result<T, PgErr>;
type Conn = r2d2::PooledConnection<PostgresConnectionManager<postgres::NoTls>>;

/// The queries the streaming server makes against the primary datastore.
///
/// Every method blocks; call them from [`query`] (or another blocking context).
pub trait Store: Send + Sync + 'static {
    /// The grant behind an access token, if the token exists and is not revoked
    fn select_identity(&self, token: &str) -> Result<Option<Identity>>;
    fn user_owns_list(&self, account: Id, list_id: i64) -> Result<bool>;
    /// True when `viewer` blocks or mutes any of `targets`, when `author` blocks `viewer`, or
    /// when `viewer` has blocked `author_domain`.
    fn select_blocked(
        &self,
        viewer: Id,
        author: Id,
        targets: &[Id],
        author_domain: Option<&str>,
    ) -> Result<bool>;
    /// One row per keyword of every unexpired filter the account owns
    fn select_filter_rows(&self, account: Id) -> Result<Vec<FilterRow>>;
    fn ping(&self) -> Result<()>;
    fn pool_status(&self) -> PoolStatus;
}

/// A single keyword of a user-defined filter, joined with its filter's metadata
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRow {
    pub filter_id: Id,
    pub title: String,
    pub context: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub action: i32,
    pub keyword: String,
    pub whole_word: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStatus {
    pub total: usize,
    pub idle: usize,
    pub waiting: usize,
}

/// Run a blocking store query off the async executor
pub async fn query<T, F>(store: &Arc<dyn Store>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Store) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&*store)).await?
}

pub struct PgPool {
    conn: r2d2::Pool<PostgresConnectionManager<postgres::NoTls>>,
    waiting: AtomicUsize,
}

impl PgPool {
    /// Connect to Postgres.  Must be called outside of an async context.
    pub fn new(pg_cfg: &config::Postgres) -> Result<Self> {
        let mut cfg = postgres::Config::new();
        cfg.user(&*pg_cfg.user)
            .host(&*pg_cfg.host)
            .port(*pg_cfg.port)
            .dbname(&*pg_cfg.database)
            .application_name("fanout");
        if let Some(password) = &*pg_cfg.password {
            cfg.password(password);
        };

        cfg.connect(postgres::NoTls)?; // Test connection, letting us immediately exit with an error
                                       // when Postgres isn't running instead of timing out below
        let manager = PostgresConnectionManager::new(cfg, postgres::NoTls);
        let pool = r2d2::Pool::builder()
            .max_size(*pg_cfg.pool_size)
            .connection_timeout(Duration::from_secs(15))
            .build(manager)?;

        Ok(Self {
            conn: pool,
            waiting: AtomicUsize::new(0),
        })
    }

    fn get(&self) -> Result<Conn> {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let conn = self.conn.get();
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        Ok(conn?)
    }
}

impl Store for PgPool {
    fn select_identity(&self, token: &str) -> Result<Option<Identity>> {
        let mut conn = self.get()?;
        let query_rows = conn.query(
            "
SELECT oauth_access_tokens.id, users.account_id, users.chosen_languages,
       oauth_access_tokens.scopes, devices.device_id
  FROM oauth_access_tokens
INNER JOIN users ON oauth_access_tokens.resource_owner_id = users.id
LEFT OUTER JOIN devices ON oauth_access_tokens.id = devices.access_token_id
  WHERE oauth_access_tokens.token = $1 AND oauth_access_tokens.revoked_at IS NULL
LIMIT 1",
            &[&token],
        )?;

        Ok(query_rows.first().map(|row| Identity {
            access_token_id: Some(Id(row.get(0))),
            account_id: Some(Id(row.get(1))),
            chosen_languages: row
                .try_get::<_, Option<Vec<String>>>(2)
                .ok()
                .flatten()
                .unwrap_or_default(),
            scopes: Scope::parse_all(&row.get::<_, String>(3)),
            device_id: row.get(4),
        }))
    }

    fn user_owns_list(&self, account: Id, list_id: i64) -> Result<bool> {
        let mut conn = self.get()?;
        // For the Postgres query, `id` = list number; `account_id` = user.id
        let rows = conn.query(
            "SELECT id, account_id FROM lists WHERE id = $1 LIMIT 1",
            &[&list_id],
        )?;
        Ok(rows.first().map_or(false, |row| Id(row.get(1)) == account))
    }

    fn select_blocked(
        &self,
        viewer: Id,
        author: Id,
        targets: &[Id],
        author_domain: Option<&str>,
    ) -> Result<bool> {
        let mut conn = self.get()?;
        let targets: Vec<i64> = targets.iter().map(|id| id.0).collect();
        let rows = conn.query(
            "SELECT 1 FROM blocks
               WHERE (account_id = $1 AND target_account_id = ANY($2))
                  OR (account_id = $3 AND target_account_id = $1)
             UNION
             SELECT 1 FROM mutes
               WHERE account_id = $1 AND target_account_id = ANY($2)",
            &[&viewer.0, &targets, &author.0],
        )?;
        if !rows.is_empty() {
            return Ok(true);
        }

        match author_domain {
            Some(domain) => Ok(!conn
                .query(
                    "SELECT 1 FROM account_domain_blocks WHERE account_id = $1 AND domain = $2",
                    &[&viewer.0, &domain],
                )?
                .is_empty()),
            None => Ok(false),
        }
    }

    fn select_filter_rows(&self, account: Id) -> Result<Vec<FilterRow>> {
        let mut conn = self.get()?;
        let rows = conn.query(
            "
SELECT filter.id, filter.phrase, filter.context, filter.expires_at, filter.action,
       keyword.keyword, keyword.whole_word
  FROM custom_filter_keywords keyword
  JOIN custom_filters filter ON keyword.custom_filter_id = filter.id
  WHERE filter.account_id = $1
    AND (filter.expires_at IS NULL OR filter.expires_at > NOW())",
            &[&account.0],
        )?;

        Ok(rows
            .iter()
            .map(|row| FilterRow {
                filter_id: Id(row.get(0)),
                title: row.get(1),
                context: row.get(2),
                expires_at: row
                    .get::<_, Option<NaiveDateTime>>(3)
                    .map(|naive| Utc.from_utc_datetime(&naive)),
                action: row.get(4),
                keyword: row.get(5),
                whole_word: row.get(6),
            })
            .collect())
    }

    fn ping(&self) -> Result<()> {
        self.get()?.simple_query("SELECT 1")?;
        Ok(())
    }

    fn pool_status(&self) -> PoolStatus {
        let state = self.conn.state();
        PoolStatus {
            total: state.connections as usize,
            idle: state.idle_connections as usize,
            waiting: self.waiting.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub enum PgErr {
    PgPool(r2d2::Error),
    Pg(postgres::Error),
    Blocking(tokio::task::JoinError),
    Unavailable(String),
}

impl std::error::Error for PgErr {}

impl fmt::Display for PgErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use PgErr::*;
        match self {
            PgPool(e) => write!(f, "Could not get a Postgres connection from the pool: {}", e),
            Pg(e) => write!(f, "Postgres query failed: {}", e),
            Blocking(e) => write!(f, "Postgres query task did not complete: {}", e),
            Unavailable(e) => write!(f, "Postgres is unavailable: {}", e),
        }
    }
}

impl From<r2d2::Error> for PgErr {
    fn from(e: r2d2::Error) -> Self {
        Self::PgPool(e)
    }
}
impl From<postgres::Error> for PgErr {
    fn from(e: postgres::Error) -> Self {
        Self::Pg(e)
    }
}
impl From<tokio::task::JoinError> for PgErr {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Blocking(e)
    }
}

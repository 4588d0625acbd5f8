//! A SQLite-backed soup that evaluates compiled queries.

use std::collections::HashSet;

use async_trait::async_trait;
use gql2soup::{
    soup_indices, sql, transform, ParserInput, PredicateError, SqlEvaluatingStore,
    SqlMappingInput,
};
use graphql_parser::query::parse_query;
use serde::Deserialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Key prefix of the rows holding record representations.
pub const RECORD_KEY_PREFIX: &str = "UiApi%3A%3ARecordRepresentation%3A";

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Parse(#[from] graphql_parser::query::ParseError),
    #[error(transparent)]
    Config(#[from] envy::Error),
    #[error("query failed to compile: {}", messages(.0))]
    Compile(Vec<PredicateError>),
}

fn messages(errors: &[PredicateError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}

impl StoreConfig {
    /// Reads `DATABASE_URL`, loading a `.env` file first when one exists.
    pub fn from_env() -> Result<Self, EvalError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }
}

/// The key a record with `id` is stored under.
pub fn record_key(id: &str) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, id)
}

pub struct SqliteStore {
    pool: SqlitePool,
    mapping: SqlMappingInput,
    applied: Mutex<HashSet<String>>,
}

impl SqliteStore {
    /// Opens the database and creates the soup table if needed.
    ///
    /// The pool holds a single connection that never expires, so an
    /// in-memory database lives as long as the store.
    pub async fn connect(database_url: &str, mapping: SqlMappingInput) -> Result<Self, EvalError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await?;
        let store = SqliteStore {
            pool,
            mapping,
            applied: Mutex::new(HashSet::new()),
        };
        store.create_soup().await?;
        info!(database_url, table = %store.mapping.soup_table, "opened soup");
        Ok(store)
    }

    pub async fn from_env() -> Result<Self, EvalError> {
        let config = StoreConfig::from_env()?;
        let mapping = SqlMappingInput::from_env()?;
        SqliteStore::connect(&config.database_url, mapping).await
    }

    pub fn mapping(&self) -> &SqlMappingInput {
        &self.mapping
    }

    async fn create_soup(&self) -> Result<(), EvalError> {
        let SqlMappingInput {
            soup_table,
            soup_column,
            key_column,
        } = &self.mapping;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {soup_table} ({key_column} TEXT PRIMARY KEY, {soup_column} TEXT NOT NULL)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stores `record` under `key`, replacing any previous value.
    pub async fn put_record(&self, key: &str, record: &serde_json::Value) -> Result<(), EvalError> {
        let SqlMappingInput {
            soup_table,
            soup_column,
            key_column,
        } = &self.mapping;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {soup_table} ({key_column}, {soup_column}) VALUES (?, ?)"
        ))
        .bind(key)
        .bind(record.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Compiles `source`, runs it and returns the `{"data": ...}` document.
    pub async fn execute(
        &self,
        source: &str,
        input: &ParserInput<'_>,
    ) -> Result<serde_json::Value, EvalError> {
        let document = parse_query::<&str>(source)?;
        let root = transform(&document, input).map_err(EvalError::Compile)?;
        self.update_indices(&soup_indices(&self.mapping)).await?;
        let statement = sql(&root, &self.mapping);
        let json = self.evaluate_sql(&statement, &[]).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[async_trait]
impl SqlEvaluatingStore for SqliteStore {
    type Error = EvalError;

    fn is_eval_supported(&self) -> bool {
        true
    }

    async fn update_indices(&self, statements: &[String]) -> Result<(), EvalError> {
        let mut applied = self.applied.lock().await;
        for statement in statements {
            if applied.contains(statement) {
                continue;
            }
            debug!(%statement, "applying index");
            sqlx::query(statement).execute(&self.pool).await?;
            applied.insert(statement.clone());
        }
        Ok(())
    }

    async fn evaluate_sql(&self, sql: &str, params: &[String]) -> Result<String, EvalError> {
        debug!(sql, params = params.len(), "evaluating sql");
        let mut query = sqlx::query_scalar::<_, String>(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        Ok(query.fetch_one(&self.pool).await?)
    }
}

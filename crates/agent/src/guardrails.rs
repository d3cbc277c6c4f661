use serde_json::{Map, Value};
use thiserror::Error;

use askdb_db::{rows_to_json, DbPool};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("only read-only select/with statements are allowed, got `{statement}`")]
    DisallowedStatement { statement: String },
    #[error("query execution failed: {message}")]
    ExecutionError { message: String },
    #[error("database connection pool is exhausted")]
    PoolExhausted,
}

/// A statement that passed validation. Only `validate` constructs one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedQuery {
    sql: String,
    row_limit: u32,
}

impl ValidatedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }
}

/// Validation pipeline for model-generated SQL: trim surrounding whitespace
/// and one trailing `;`, accept only statements whose leading keyword is
/// `select` or `with` (allow-list, so mutating and DDL statements are blocked
/// by construction), and append ` LIMIT {row_limit}` when no row-limiting
/// clause is present.
pub fn validate(raw: &str, row_limit: u32) -> Result<ValidatedQuery, QueryError> {
    let mut statement = raw.trim();
    if let Some(stripped) = statement.strip_suffix(';') {
        statement = stripped.trim_end();
    }
    if statement.is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let keyword = statement
        .chars()
        .take_while(|ch| ch.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    if keyword != "select" && keyword != "with" {
        return Err(QueryError::DisallowedStatement { statement: keyword });
    }

    let sql = if statement.to_ascii_lowercase().contains("limit") {
        statement.to_string()
    } else {
        format!("{statement} LIMIT {row_limit}")
    };

    Ok(ValidatedQuery { sql, row_limit })
}

/// Validates and executes one statement against the shared pool.
#[derive(Clone)]
pub struct SqlGuardrail {
    pool: DbPool,
    row_limit: u32,
}

impl SqlGuardrail {
    pub fn new(pool: DbPool, row_limit: u32) -> Self {
        Self { pool, row_limit }
    }

    /// Runs a raw model-generated statement through validation and, only if
    /// it passes, against the database. Rows come back as ordered
    /// column-name → value mappings in query column order.
    pub async fn execute(&self, raw: &str) -> Result<Vec<Map<String, Value>>, QueryError> {
        let validated = validate(raw, self.row_limit)?;

        tracing::debug!(
            event_name = "guardrail.query_executing",
            sql = validated.sql(),
            "executing validated query"
        );

        let rows = sqlx::query(validated.sql())
            .fetch_all(&self.pool)
            .await
            .map_err(map_database_error)?;

        rows_to_json(&rows).map_err(map_database_error)
    }
}

fn map_database_error(error: sqlx::Error) -> QueryError {
    match error {
        sqlx::Error::PoolTimedOut => QueryError::PoolExhausted,
        // sqlx error displays never carry the connection URL or credentials.
        other => QueryError::ExecutionError { message: other.to_string() },
    }
}

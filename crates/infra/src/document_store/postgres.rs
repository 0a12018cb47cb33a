//! Postgres-backed document store (JSONB).
//!
//! Documents live in one table, scoped by collection:
//!
//! ```sql
//! CREATE TABLE documents (
//!     id         BIGSERIAL PRIMARY KEY,
//!     collection TEXT  NOT NULL,
//!     body       JSONB NOT NULL
//! );
//! CREATE INDEX documents_collection_idx ON documents (collection, id);
//! ```
//!
//! Filters are compiled to SQL with bound parameters:
//!
//! | Filter | SQL |
//! |--------|-----|
//! | `Eq` | `body #> $path = $value` |
//! | `Range` | `(body #>> $path)::timestamptz >= $gte AND ... < $lt` |
//! | `And` | clauses joined with `AND`, `TRUE` when empty |
//!
//! Timestamps stored as `{"$date": "..."}` are read through the nested key.
//! Updates become nested `jsonb_set` calls. Natural order is `id`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `PoolClosed`, `PoolTimedOut`, `Io`, `Tls` | `Unavailable` |
//! | `Database` and anything else | `Query` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, instrument};

use reprocessor_core::{FieldPath, Filter, Projection, Update};

use super::{DocumentStore, StoreError, UpdateAck};

/// Bound parameter of a compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Path(Vec<String>),
    Json(JsonValue),
    Timestamp(DateTime<Utc>),
    Limit(i64),
}

/// SQL text plus its parameters, numbered in push order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlStatement {
    /// Register `param` and return its placeholder (`$n`).
    fn push(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn bind_all<'q>(&'q self) -> Query<'q, Postgres, PgArguments> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, param| match param {
                SqlParam::Text(v) => query.bind(v.as_str()),
                SqlParam::Path(v) => query.bind(v.clone()),
                SqlParam::Json(v) => query.bind(v.clone()),
                SqlParam::Timestamp(v) => query.bind(*v),
                SqlParam::Limit(v) => query.bind(*v),
            })
    }
}

fn path_param(field: &FieldPath) -> SqlParam {
    SqlParam::Path(field.segments().map(str::to_string).collect())
}

/// Compile `filter` into a boolean SQL expression over `body`.
pub fn compile_filter(filter: &Filter, stmt: &mut SqlStatement) -> String {
    match filter {
        Filter::Eq { field, value } => {
            let path = stmt.push(path_param(field));
            let value = stmt.push(SqlParam::Json(value.clone()));
            format!("body #> {path} = {value}")
        }
        Filter::Range { field, range } => {
            let path = stmt.push(path_param(field));
            let ts = format!(
                "(COALESCE(body #>> array_append({path}, '$date'), body #>> {path}))::timestamptz"
            );
            let mut bounds = Vec::new();
            if let Some(gte) = range.gte {
                bounds.push(format!("{ts} >= {}", stmt.push(SqlParam::Timestamp(gte))));
            }
            if let Some(lt) = range.lt {
                bounds.push(format!("{ts} < {}", stmt.push(SqlParam::Timestamp(lt))));
            }
            if bounds.is_empty() {
                "TRUE".to_string()
            } else {
                format!("({})", bounds.join(" AND "))
            }
        }
        Filter::And(clauses) if clauses.is_empty() => "TRUE".to_string(),
        Filter::And(clauses) => {
            let parts: Vec<String> = clauses.iter().map(|c| compile_filter(c, stmt)).collect();
            format!("({})", parts.join(" AND "))
        }
    }
}

/// Compile `update` into a JSONB expression rewriting `source`.
pub fn compile_update(update: &Update, source: &str, stmt: &mut SqlStatement) -> String {
    update.fields().iter().fold(source.to_string(), |expr, (field, value)| {
        let path = stmt.push(path_param(field));
        let value = stmt.push(SqlParam::Json(value.clone()));
        format!("jsonb_set({expr}, {path}, {value}, true)")
    })
}

fn select_statement(
    columns: &str,
    collection: &str,
    filter: &Filter,
    limit: Option<usize>,
) -> SqlStatement {
    let mut stmt = SqlStatement::default();
    let coll = stmt.push(SqlParam::Text(collection.to_string()));
    let predicate = compile_filter(filter, &mut stmt);
    let mut sql = format!("SELECT {columns} FROM documents WHERE collection = {coll} AND {predicate}");
    if columns != "COUNT(*)" {
        sql.push_str(" ORDER BY id");
    }
    if let Some(limit) = limit {
        let n = i64::try_from(limit).unwrap_or(i64::MAX);
        sql.push_str(&format!(" LIMIT {}", stmt.push(SqlParam::Limit(n))));
    }
    stmt.sql = sql;
    stmt
}

fn update_statement(collection: &str, filter: &Filter, update: &Update) -> SqlStatement {
    let mut stmt = SqlStatement::default();
    let coll = stmt.push(SqlParam::Text(collection.to_string()));
    let predicate = compile_filter(filter, &mut stmt);
    let new_body = compile_update(update, "target.body", &mut stmt);
    stmt.sql = format!(
        "WITH target AS (\
            SELECT id, body FROM documents \
            WHERE collection = {coll} AND {predicate} \
            ORDER BY id LIMIT 1 FOR UPDATE\
        ) \
        UPDATE documents d SET body = {new_body} \
        FROM target WHERE d.id = target.id \
        RETURNING (target.body IS DISTINCT FROM d.body) AS modified"
    );
    stmt
}

/// Postgres-backed document store.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the `documents` table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id         BIGSERIAL PRIMARY KEY,
                collection TEXT  NOT NULL,
                body       JSONB NOT NULL
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection, id)")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    pub async fn insert(&self, collection: &str, body: &JsonValue) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO documents (collection, body) VALUES ($1, $2)")
            .bind(collection)
            .bind(body)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    async fn fetch_bodies(&self, stmt: &SqlStatement) -> Result<Vec<JsonValue>, StoreError> {
        let rows = stmt
            .bind_all()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<JsonValue, _>("body")
                    .map_err(|e| StoreError::Decode(e.to_string()))
            })
            .collect()
    }
}

fn project(doc: JsonValue, projection: Option<&Projection>) -> JsonValue {
    match projection {
        Some(p) => p.apply(&doc),
        None => doc,
    }
}

#[async_trait::async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self, filter, projection), fields(collection = %collection), err)]
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
    ) -> Result<Option<JsonValue>, StoreError> {
        let stmt = select_statement("body", collection, filter, Some(1));
        debug!(sql = %stmt.sql, "find_one");
        let doc = self.fetch_bodies(&stmt).await?.into_iter().next();
        Ok(doc.map(|d| project(d, projection)))
    }

    #[instrument(skip(self, filter, projection), fields(collection = %collection, limit = ?limit), err)]
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&Projection>,
        limit: Option<usize>,
    ) -> Result<Vec<JsonValue>, StoreError> {
        let stmt = select_statement("body", collection, filter, limit);
        debug!(sql = %stmt.sql, "find_many");
        let docs = self.fetch_bodies(&stmt).await?;
        Ok(docs.into_iter().map(|d| project(d, projection)).collect())
    }

    #[instrument(skip(self, filter), fields(collection = %collection), err)]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let stmt = select_statement("COUNT(*)", collection, filter, None);
        let row = stmt
            .bind_all()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        let n: i64 = row.try_get(0).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    #[instrument(skip(self, filter, update), fields(collection = %collection), err)]
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateAck, StoreError> {
        if update.is_empty() {
            return Ok(UpdateAck::default());
        }
        let stmt = update_statement(collection, filter, update);
        debug!(sql = %stmt.sql, "update_one");
        let row = stmt
            .bind_all()
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_one", e))?;

        match row {
            None => Ok(UpdateAck::default()),
            Some(row) => {
                let modified: bool = row
                    .try_get("modified")
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(UpdateAck {
                    matched: 1,
                    modified: u64::from(modified),
                })
            }
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            StoreError::Query(format!("database error in {operation}: {}", db_err.message()))
        }
        other => StoreError::Query(format!("sqlx error in {operation}: {other}")),
    }
}

//! PostgreSQL relational target.
//!
//! Uses deadpool-postgres for connection pooling. Each batch is inserted with
//! a single `INSERT ... SELECT FROM jsonb_populate_recordset(...)` statement,
//! so PostgreSQL accepts or rejects the batch as a whole.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use serde_json::Value;
use tokio_postgres::types::{Json, ToSql};
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::{RelationalTarget, StoreResult, TableObjects, TransformedRecord};
use crate::error::{MigrateError, Result, StoreError};
use crate::schema::{ddl, RowPolicy};

use super::tls::{self, SslMode};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLSTATE classes worth retrying: connection exception, insufficient
/// resources, operator intervention, transaction rollback.
const TRANSIENT_SQLSTATE_CLASSES: &[&str] = &["08", "53", "57", "40"];

/// PostgreSQL implementation of [`RelationalTarget`].
pub struct PostgresTarget {
    pool: Pool,
    schema: String,
}

impl PostgresTarget {
    /// Build the pool and check that a connection can be made.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let max_size = config.get_max_connections();
        let pool = match tls::connector(SslMode::parse(&config.ssl_mode)?)? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_size)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?
            }
            Some(connector) => {
                let mgr = Manager::from_config(pg_config, connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_size)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?
            }
        };

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    async fn client(&self) -> StoreResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::transient(format!("getting PostgreSQL connection: {}", e)))
    }
}

/// `INSERT` statement taking the batch as one JSONB array parameter.
///
/// Columns absent from a row are NULL; listing only the union of keys
/// present in the batch keeps column defaults for everything else.
pub fn insert_statement(schema: &str, table: &str, columns: &[&str]) -> Result<String> {
    let quoted = columns
        .iter()
        .map(|c| quote_pg(c))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let qualified = qualify_pg(schema, table)?;
    Ok(format!(
        "INSERT INTO {qualified} ({quoted}) SELECT {quoted} FROM jsonb_populate_recordset(NULL::{qualified}, $1::jsonb)"
    ))
}

/// Every column name used by at least one row, sorted.
pub fn batch_columns(rows: &[TransformedRecord]) -> Vec<&str> {
    let names: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.columns.keys().map(String::as_str))
        .collect();
    names.into_iter().collect()
}

/// Map a driver error to transient or permanent.
fn classify(e: tokio_postgres::Error) -> StoreError {
    if let Some(db) = e.as_db_error() {
        let code = db.code().code();
        let message = match db.detail() {
            Some(detail) => format!("{} ({}): {}", db.message(), code, detail),
            None => format!("{} ({})", db.message(), code),
        };
        let class = code.get(..2).unwrap_or_default();
        return if TRANSIENT_SQLSTATE_CLASSES.contains(&class) {
            StoreError::transient(message)
        } else {
            StoreError::permanent(message)
        };
    }
    // No SQLSTATE: connection closed, I/O, timeout.
    StoreError::transient(e.to_string())
}

fn render_error(e: MigrateError) -> StoreError {
    StoreError::permanent(e.to_string())
}

#[async_trait]
impl RelationalTarget for PostgresTarget {
    async fn execute_ddl(&self, statement: &str) -> StoreResult<()> {
        let client = self.client().await?;
        client.batch_execute(statement).await.map_err(classify)?;
        debug!("Executed DDL: {}", statement.lines().next().unwrap_or_default());
        Ok(())
    }

    async fn bulk_insert(&self, table: &str, rows: &[TransformedRecord]) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let columns = batch_columns(rows);
        let sql = insert_statement(&self.schema, table, &columns).map_err(render_error)?;
        let payload = Value::Array(rows.iter().map(TransformedRecord::to_json).collect());

        let client = self.client().await?;
        let inserted = client
            .execute(&sql, &[&Json(&payload)])
            .await
            .map_err(classify)?;
        Ok(inserted)
    }

    async fn enable_row_policy(&self, table: &str, policy: &RowPolicy) -> StoreResult<()> {
        let statement = ddl::create_policy(table, policy, &self.schema).map_err(render_error)?;
        let client = self.client().await?;
        client.batch_execute(&statement).await.map_err(classify)?;
        debug!("Installed policy \"{}\" on {}", policy.name, table);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        let client = self.client().await?;
        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;
        let row = client
            .query_one(sql, &[&self.schema, &table])
            .await
            .map_err(classify)?;
        Ok(row.get::<_, bool>(0))
    }

    async fn table_objects(&self, table: &str) -> StoreResult<TableObjects> {
        let client = self.client().await?;
        let params: [&(dyn ToSql + Sync); 2] = [&self.schema, &table];
        let mut objects = TableObjects::default();

        let sql = r#"
            SELECT kcu.column_name::text, ccu.table_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_schema = tc.constraint_schema
             AND kcu.constraint_name = tc.constraint_name
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_schema = tc.constraint_schema
             AND ccu.constraint_name = tc.constraint_name
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_schema = $1 AND tc.table_name = $2
        "#;
        for row in client.query(sql, &params).await.map_err(classify)? {
            objects.foreign_keys.insert((row.get(0), row.get(1)));
        }

        let sql = "SELECT indexname::text FROM pg_indexes WHERE schemaname = $1 AND tablename = $2";
        for row in client.query(sql, &params).await.map_err(classify)? {
            objects.indexes.insert(row.get(0));
        }

        let sql = r#"
            SELECT t.tgname::text
            FROM pg_trigger t
            JOIN pg_class c ON c.oid = t.tgrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND NOT t.tgisinternal
        "#;
        for row in client.query(sql, &params).await.map_err(classify)? {
            objects.triggers.insert(row.get(0));
        }

        Ok(objects)
    }

    async fn ping(&self) -> StoreResult<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await.map_err(classify)?;
        Ok(())
    }
}

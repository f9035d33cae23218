// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! # Redshift Adapter
//!
//! Implements the `WarehousePort` on top of a pooled `postgres::Client`.
//!
//! Catalog questions are answered from `information_schema`. Every other
//! statement is rendered from a typed `Statement` and sent with the simple
//! query protocol, so DDL and COPY behave as they do in `psql`.

use crate::domain::entities::{CatalogColumn, ForeignKeyConstraint};
use crate::domain::errors::{Result, SyncError};
use crate::domain::statements::{Statement, TableRef};
use crate::infrastructure::redshift::connection_manager::RedshiftConnectionManager;
use crate::ports::warehouse_port::{WarehousePort, WarehouseSession};
use log::{debug, warn};
use postgres::SimpleQueryMessage;
use r2d2::{Pool, PooledConnection};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// --- CATALOG QUERIES ---
// Identifier columns are domains in information_schema; parameters are cast
// to varchar so the driver binds them as plain strings.

const SQL_SCHEMA_EXISTS: &str = "
    SELECT EXISTS (
        SELECT 1 FROM information_schema.schemata
        WHERE schema_name = $1::varchar
    )
";

const SQL_TABLE_EXISTS: &str = "
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_catalog = $1::varchar
          AND table_schema = $2::varchar
          AND table_name = $3::varchar
    )
";

/// Column name, type and character capacity, in table order.
const SQL_TABLE_COLUMNS: &str = "
    SELECT column_name::varchar, data_type::varchar, character_maximum_length::int
    FROM information_schema.columns
    WHERE table_catalog = $1::varchar
      AND table_schema = $2::varchar
      AND table_name = $3::varchar
    ORDER BY ordinal_position
";

const SQL_CONSTRAINT_EXISTS: &str = "
    SELECT EXISTS (
        SELECT 1 FROM information_schema.table_constraints
        WHERE table_schema = $1::varchar
          AND table_name = $2::varchar
          AND constraint_name = $3::varchar
    )
";

/// Constraint name, referencing table and column of every foreign key whose
/// unique side lives on the given table.
const SQL_INBOUND_FOREIGN_KEYS: &str = "
    SELECT rc.constraint_name::varchar, kcu.table_name::varchar, kcu.column_name::varchar
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_schema = rc.constraint_schema
     AND kcu.constraint_name = rc.constraint_name
    JOIN information_schema.table_constraints uc
      ON uc.constraint_schema = rc.unique_constraint_schema
     AND uc.constraint_name = rc.unique_constraint_name
    WHERE rc.constraint_schema = $1::varchar
      AND uc.table_schema = $1::varchar
      AND uc.table_name = $2::varchar
    ORDER BY rc.constraint_name
";

/// `RedshiftAdapter` implements the `WarehousePort`.
pub struct RedshiftAdapter {
    pool: Arc<Pool<RedshiftConnectionManager>>,
    database: String,
    connect_retries: u32,
    retry_backoff: Duration,
}

impl RedshiftAdapter {
    pub fn new(
        pool: Arc<Pool<RedshiftConnectionManager>>,
        database: &str,
        connect_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            pool,
            database: database.to_string(),
            connect_retries,
            retry_backoff,
        }
    }

    /// Checks a connection out, retrying with linear backoff.
    fn get_conn(&self) -> Result<PooledConnection<RedshiftConnectionManager>> {
        let mut attempt: u32 = 0;
        loop {
            match self.pool.get() {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < self.connect_retries => {
                    attempt += 1;
                    let wait = self.retry_backoff * attempt;
                    warn!(
                        "Warehouse connection attempt {} failed: {}. Retrying in {:?}",
                        attempt, e, wait
                    );
                    thread::sleep(wait);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl WarehousePort for RedshiftAdapter {
    fn session(&self) -> Result<Box<dyn WarehouseSession + '_>> {
        let conn = self.get_conn()?;
        Ok(Box::new(RedshiftSession {
            conn,
            database: self.database.clone(),
        }))
    }
}

struct RedshiftSession {
    conn: PooledConnection<RedshiftConnectionManager>,
    database: String,
}

impl RedshiftSession {
    fn query_bool(&mut self, sql: &str, params: &[&(dyn postgres::types::ToSql + Sync)]) -> Result<bool> {
        let row = self.conn.query_one(sql, params)?;
        Ok(row.try_get::<_, bool>(0)?)
    }
}

impl WarehouseSession for RedshiftSession {
    fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        self.query_bool(SQL_SCHEMA_EXISTS, &[&schema])
    }

    fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        let database = self.database.clone();
        self.query_bool(SQL_TABLE_EXISTS, &[&database, &schema, &table])
    }

    fn table_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        let rows = self
            .conn
            .query(SQL_TABLE_COLUMNS, &[&self.database, &schema, &table])?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            let char_length: Option<i32> = row.try_get(2)?;
            columns.push(CatalogColumn {
                name,
                data_type,
                char_length: char_length.and_then(|l| u32::try_from(l).ok()),
            });
        }
        Ok(columns)
    }

    fn constraint_exists(&mut self, schema: &str, table: &str, constraint: &str) -> Result<bool> {
        self.query_bool(SQL_CONSTRAINT_EXISTS, &[&schema, &table, &constraint])
    }

    fn inbound_foreign_keys(&mut self, schema: &str, table: &str) -> Result<Vec<ForeignKeyConstraint>> {
        let rows = self.conn.query(SQL_INBOUND_FOREIGN_KEYS, &[&schema, &table])?;
        let mut constraints = Vec::with_capacity(rows.len());
        for row in rows {
            constraints.push(ForeignKeyConstraint {
                name: row.try_get(0)?,
                table: row.try_get(1)?,
                column: row.try_get(2)?,
                referenced_table: table.to_string(),
            });
        }
        Ok(constraints)
    }

    fn count_rows(&mut self, table: &TableRef) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.to_sql()?);
        debug!("{}", sql);
        let row = self.conn.query_one(sql.as_str(), &[])?;
        let count: i64 = row.try_get(0)?;
        u64::try_from(count)
            .map_err(|_| SyncError::WarehouseError(format!("Negative row count for {}", table.display())))
    }

    fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let sql = statement.to_sql()?;
        debug!("{}", sql);
        let messages = self.conn.simple_query(&sql)?;
        Ok(messages
            .iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => Some(*n),
                _ => None,
            })
            .sum())
    }

    fn execute_batch(&mut self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        let sql = statements
            .iter()
            .map(|s| s.to_sql())
            .collect::<Result<Vec<_>>>()?
            .join(";\n");
        debug!("{}", sql);
        self.conn.batch_execute(&sql)?;
        Ok(())
    }
}

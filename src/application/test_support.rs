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


//! In-memory warehouse for tests.
//!
//! `FakeWarehouse` interprets `Statement` values against tables held in
//! memory: schemas, typed columns, rows and constraints. Temporary tables
//! live in the session that created them and vanish with it. COPY reads the
//! CSV named by its URI from an `ObjectStorePort`, honours the varchar width
//! of the target column and is all-or-nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::entities::{CatalogColumn, ForeignKeyConstraint, ObjectLocation, SqlType};
use crate::domain::errors::{Result, SyncError};
use crate::domain::statements::{CopyMode, Statement, TableRef};
use crate::ports::object_store_port::ObjectStorePort;
use crate::ports::warehouse_port::{WarehousePort, WarehouseSession};

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub columns: Vec<(String, SqlType)>,
    pub rows: Vec<Row>,
}

impl FakeTable {
    fn index_of(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|(c, _)| c.eq_ignore_ascii_case(column))
            .ok_or_else(|| SyncError::WarehouseError(format!("column \"{}\" does not exist", column)))
    }

    fn check_width(&self, idx: usize, value: &Option<String>) -> Result<()> {
        if let (SqlType::Varchar(width), Some(v)) = (&self.columns[idx].1, value) {
            if v.chars().count() > *width as usize {
                return Err(SyncError::WarehouseError(format!(
                    "value too long for type character varying({})",
                    width
                )));
            }
        }
        Ok(())
    }
}

struct FakeConstraint {
    column: String,
    /// (schema, table)
    referenced: (String, String),
}

#[derive(Default)]
struct State {
    schemas: BTreeSet<String>,
    tables: BTreeMap<(String, String), FakeTable>,
    /// keyed by (schema, table, constraint)
    constraints: BTreeMap<(String, String, String), FakeConstraint>,
}

pub struct FakeWarehouse {
    store: Arc<dyn ObjectStorePort>,
    state: Mutex<State>,
    log: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
    fail_sessions: Mutex<bool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl FakeWarehouse {
    pub fn new(store: Arc<dyn ObjectStorePort>) -> Self {
        Self {
            store,
            state: Mutex::new(State::default()),
            log: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            fail_sessions: Mutex::new(false),
        }
    }

    pub fn with_schema(self, schema: &str) -> Self {
        lock(&self.state).schemas.insert(schema.to_string());
        self
    }

    pub fn with_table(self, schema: &str, table: &str, columns: &[(&str, SqlType)]) -> Self {
        {
            let mut state = lock(&self.state);
            state.schemas.insert(schema.to_string());
            state.tables.insert(
                (schema.to_string(), table.to_string()),
                FakeTable {
                    columns: columns.iter().map(|(n, t)| (n.to_string(), t.clone())).collect(),
                    rows: Vec::new(),
                },
            );
        }
        self
    }

    pub fn insert_rows(&self, schema: &str, table: &str, rows: &[&[Option<&str>]]) {
        let mut state = lock(&self.state);
        if let Some(t) = state.tables.get_mut(&(schema.to_string(), table.to_string())) {
            for row in rows {
                t.rows.push(row.iter().map(|v| v.map(String::from)).collect());
            }
        }
    }

    /// Any statement whose SQL contains `fragment` fails.
    pub fn fail_when(&self, fragment: &str) {
        lock(&self.failures).push(fragment.to_string());
    }

    pub fn fail_sessions(&self, fail: bool) {
        *lock(&self.fail_sessions) = fail;
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<FakeTable> {
        lock(&self.state)
            .tables
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
    }

    /// Rows of `table` as column -> value maps.
    pub fn rows(&self, schema: &str, table: &str) -> Vec<BTreeMap<String, Option<String>>> {
        match self.table(schema, table) {
            Some(t) => t
                .rows
                .iter()
                .map(|r| {
                    t.columns
                        .iter()
                        .map(|(c, _)| c.clone())
                        .zip(r.iter().cloned())
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        lock(&self.state).schemas.contains(schema)
    }

    pub fn has_constraint(&self, schema: &str, table: &str, constraint: &str) -> bool {
        lock(&self.state).constraints.contains_key(&(
            schema.to_string(),
            table.to_string(),
            constraint.to_string(),
        ))
    }

    /// Rendered SQL of every statement executed so far.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    pub fn clear_log(&self) {
        lock(&self.log).clear();
    }
}

impl WarehousePort for FakeWarehouse {
    fn session(&self) -> Result<Box<dyn WarehouseSession + '_>> {
        if *lock(&self.fail_sessions) {
            return Err(SyncError::ConnectivityError("connection refused".to_string()));
        }
        Ok(Box::new(FakeSession {
            warehouse: self,
            temps: BTreeMap::new(),
        }))
    }
}

struct FakeSession<'a> {
    warehouse: &'a FakeWarehouse,
    temps: BTreeMap<String, FakeTable>,
}

fn key(schema: &str, table: &str) -> (String, String) {
    (schema.to_string(), table.to_string())
}

fn catalog_type(t: &SqlType) -> (String, Option<u32>) {
    match t {
        SqlType::Varchar(w) => ("character varying".to_string(), Some(*w)),
        SqlType::TimestampTz => ("timestamp with time zone".to_string(), None),
        SqlType::Boolean => ("boolean".to_string(), None),
        SqlType::Numeric => ("numeric".to_string(), None),
        SqlType::Date => ("date".to_string(), None),
        SqlType::Other(token) => (token.to_lowercase(), None),
    }
}

fn parse_uri(uri: &str) -> Result<ObjectLocation> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| SyncError::WarehouseError(format!("invalid source uri {}", uri)))?;
    let (bucket, object) = rest
        .split_once('/')
        .ok_or_else(|| SyncError::WarehouseError(format!("invalid source uri {}", uri)))?;
    Ok(ObjectLocation::new(bucket, object))
}

impl<'a> FakeSession<'a> {
    fn table_mut<'s>(&'s mut self, state: &'s mut State, table: &TableRef) -> Result<&'s mut FakeTable> {
        let missing = || SyncError::WarehouseError(format!("relation \"{}\" does not exist", table.display()));
        match &table.schema {
            None => self.temps.get_mut(&table.name).ok_or_else(missing),
            Some(schema) => state.tables.get_mut(&key(schema, &table.name)).ok_or_else(missing),
        }
    }

    fn table_ref(&self, state: &State, table: &TableRef) -> Result<FakeTable> {
        let found = match &table.schema {
            None => self.temps.get(&table.name).cloned(),
            Some(schema) => state.tables.get(&key(schema, &table.name)).cloned(),
        };
        found.ok_or_else(|| SyncError::WarehouseError(format!("relation \"{}\" does not exist", table.display())))
    }

    fn create(&mut self, state: &mut State, table: &TableRef, columns: Vec<(String, SqlType)>) -> Result<()> {
        let new = FakeTable {
            columns,
            rows: Vec::new(),
        };
        match &table.schema {
            None => {
                if self.temps.contains_key(&table.name) {
                    return Err(SyncError::WarehouseError(format!("relation \"{}\" already exists", table.name)));
                }
                self.temps.insert(table.name.clone(), new);
            }
            Some(schema) => {
                if !state.schemas.contains(schema) {
                    return Err(SyncError::WarehouseError(format!("schema \"{}\" does not exist", schema)));
                }
                let k = key(schema, &table.name);
                if state.tables.contains_key(&k) {
                    return Err(SyncError::WarehouseError(format!("relation \"{}\" already exists", table.name)));
                }
                state.tables.insert(k, new);
            }
        }
        Ok(())
    }

    fn copy(&mut self, state: &mut State, table: &TableRef, columns: &Option<Vec<String>>, uri: &str, mode: CopyMode) -> Result<u64> {
        let location = parse_uri(uri)?;
        let source = self.warehouse.store.open(&location)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(mode == CopyMode::Data)
            .from_reader(source);

        let target = self.table_mut(state, table)?;
        let indexes: Vec<usize> = match columns {
            Some(cols) => cols.iter().map(|c| target.index_of(c)).collect::<Result<_>>()?,
            None => (0..target.columns.len()).collect(),
        };

        let mut staged: Vec<Row> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SyncError::WarehouseError(format!("Load error: {}", e)))?;
            if mode == CopyMode::Deletes && record.len() != indexes.len() {
                return Err(SyncError::WarehouseError(format!(
                    "Load error: expected {} fields, found {}",
                    indexes.len(),
                    record.len()
                )));
            }
            if record.len() > indexes.len() {
                return Err(SyncError::WarehouseError("Load error: extra column(s) found".to_string()));
            }
            let mut row: Row = vec![None; target.columns.len()];
            for (pos, idx) in indexes.iter().enumerate() {
                let value = record.get(pos).filter(|v| !v.is_empty()).map(String::from);
                target.check_width(*idx, &value)?;
                row[*idx] = value;
            }
            staged.push(row);
        }
        let n = staged.len() as u64;
        target.rows.extend(staged);
        Ok(n)
    }

    fn apply(&mut self, statement: &Statement) -> Result<u64> {
        let warehouse = self.warehouse;
        let mut state = lock(&warehouse.state);
        match statement {
            Statement::CreateSchema { schema } => {
                state.schemas.insert(schema.clone());
                Ok(0)
            }
            Statement::CreateTable { table, columns, .. } => {
                let cols = columns.iter().map(|c| (c.name.clone(), c.sql_type.clone())).collect();
                self.create(&mut state, table, cols)?;
                Ok(0)
            }
            Statement::CreateTempTable { table, columns } => {
                let cols = columns.iter().map(|c| (c.name.clone(), c.sql_type.clone())).collect();
                self.create(&mut state, &TableRef::temp(&table.name), cols)?;
                Ok(0)
            }
            Statement::CreateTempTableLike { table, like } => {
                let cols = self.table_ref(&state, like)?.columns;
                self.create(&mut state, &TableRef::temp(&table.name), cols)?;
                Ok(0)
            }
            Statement::AddColumn { table, column } => {
                let t = self.table_mut(&mut state, table)?;
                if t.index_of(&column.name).is_ok() {
                    return Err(SyncError::WarehouseError(format!("column \"{}\" already exists", column.name)));
                }
                t.columns.push((column.name.clone(), column.sql_type.clone()));
                for row in t.rows.iter_mut() {
                    row.push(None);
                }
                Ok(0)
            }
            Statement::DropColumn { table, column } => {
                let t = self.table_mut(&mut state, table)?;
                let idx = t.index_of(column)?;
                t.columns.remove(idx);
                for row in t.rows.iter_mut() {
                    row.remove(idx);
                }
                Ok(0)
            }
            Statement::DropTable { table, if_exists, cascade } => {
                match &table.schema {
                    None => {
                        if self.temps.remove(&table.name).is_none() && !*if_exists {
                            return Err(SyncError::WarehouseError(format!("table \"{}\" does not exist", table.name)));
                        }
                    }
                    Some(schema) => {
                        let k = key(schema, &table.name);
                        if !state.tables.contains_key(&k) {
                            if *if_exists {
                                return Ok(0);
                            }
                            return Err(SyncError::WarehouseError(format!("table \"{}\" does not exist", table.name)));
                        }
                        let inbound = state
                            .constraints
                            .iter()
                            .any(|((s, t, _), c)| c.referenced == k && !(s == &k.0 && t == &k.1));
                        if inbound && !*cascade {
                            return Err(SyncError::WarehouseError(format!(
                                "cannot drop table {} because other objects depend on it",
                                table.name
                            )));
                        }
                        state
                            .constraints
                            .retain(|(s, t, _), c| c.referenced != k && !(s == &k.0 && t == &k.1));
                        state.tables.remove(&k);
                    }
                }
                Ok(0)
            }
            Statement::RenameTable { table, new_name } => {
                let schema = table
                    .schema
                    .clone()
                    .ok_or_else(|| SyncError::WarehouseError("rename of temp table".to_string()))?;
                let new_key = key(&schema, new_name);
                if state.tables.contains_key(&new_key) {
                    return Err(SyncError::WarehouseError(format!("relation \"{}\" already exists", new_name)));
                }
                let t = state
                    .tables
                    .remove(&key(&schema, &table.name))
                    .ok_or_else(|| SyncError::WarehouseError(format!("relation \"{}\" does not exist", table.name)))?;
                state.tables.insert(new_key, t);
                Ok(0)
            }
            Statement::AddForeignKey { table, constraint, column, referenced } => {
                let schema = table.schema.clone().unwrap_or_default();
                let referenced_table = self.table_ref(&state, referenced)?;
                referenced_table.index_of("id")?;
                self.table_ref(&state, table)?.index_of(column)?;
                let k = (schema.clone(), table.name.clone(), constraint.clone());
                if state.constraints.contains_key(&k) {
                    return Err(SyncError::WarehouseError(format!("constraint \"{}\" already exists", constraint)));
                }
                let constraint = FakeConstraint {
                    column: column.clone(),
                    referenced: (referenced.schema.clone().unwrap_or_default(), referenced.name.clone()),
                };
                state.constraints.insert(k, constraint);
                Ok(0)
            }
            Statement::Copy { table, columns, source_uri, mode, .. } => {
                self.copy(&mut state, table, columns, source_uri, *mode)
            }
            Statement::InsertSelect { target, source, columns, distinct } => {
                let src = self.table_ref(&state, source)?;
                let src_idx: Vec<usize> = columns.iter().map(|c| src.index_of(c)).collect::<Result<_>>()?;
                let mut projected: Vec<Row> = src
                    .rows
                    .iter()
                    .map(|r| src_idx.iter().map(|i| r[*i].clone()).collect())
                    .collect();
                if *distinct {
                    let mut seen = BTreeSet::new();
                    projected.retain(|r| seen.insert(r.clone()));
                }
                let dst = self.table_mut(&mut state, target)?;
                let dst_idx: Vec<usize> = columns.iter().map(|c| dst.index_of(c)).collect::<Result<_>>()?;
                let mut rows = Vec::with_capacity(projected.len());
                for values in projected {
                    let mut row: Row = vec![None; dst.columns.len()];
                    for (value, idx) in values.into_iter().zip(dst_idx.iter()) {
                        dst.check_width(*idx, &value)?;
                        row[*idx] = value;
                    }
                    rows.push(row);
                }
                let n = rows.len() as u64;
                dst.rows.extend(rows);
                Ok(n)
            }
            Statement::DeleteMatching { target, source, keys } => {
                let src = self.table_ref(&state, source)?;
                let src_idx: Vec<usize> = keys.iter().map(|k| src.index_of(k)).collect::<Result<_>>()?;
                let doomed: BTreeSet<Vec<String>> = src
                    .rows
                    .iter()
                    .filter_map(|r| src_idx.iter().map(|i| r[*i].clone()).collect::<Option<Vec<_>>>())
                    .collect();
                let dst = self.table_mut(&mut state, target)?;
                let dst_idx: Vec<usize> = keys.iter().map(|k| dst.index_of(k)).collect::<Result<_>>()?;
                let before = dst.rows.len();
                dst.rows.retain(|r| {
                    match dst_idx.iter().map(|i| r[*i].clone()).collect::<Option<Vec<_>>>() {
                        Some(k) => !doomed.contains(&k),
                        None => true,
                    }
                });
                Ok((before - dst.rows.len()) as u64)
            }
            Statement::Truncate { table } => {
                self.table_mut(&mut state, table)?.rows.clear();
                Ok(0)
            }
        }
    }
}

impl<'a> WarehouseSession for FakeSession<'a> {
    fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        Ok(lock(&self.warehouse.state).schemas.contains(schema))
    }

    fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        Ok(lock(&self.warehouse.state).tables.contains_key(&key(schema, table)))
    }

    fn table_columns(&mut self, schema: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        let state = lock(&self.warehouse.state);
        Ok(state
            .tables
            .get(&key(schema, table))
            .map(|t| {
                t.columns
                    .iter()
                    .map(|(name, ty)| {
                        let (data_type, char_length) = catalog_type(ty);
                        CatalogColumn {
                            name: name.clone(),
                            data_type,
                            char_length,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn constraint_exists(&mut self, schema: &str, table: &str, constraint: &str) -> Result<bool> {
        Ok(self.warehouse.has_constraint(schema, table, constraint))
    }

    fn inbound_foreign_keys(&mut self, schema: &str, table: &str) -> Result<Vec<ForeignKeyConstraint>> {
        let target = key(schema, table);
        Ok(lock(&self.warehouse.state)
            .constraints
            .iter()
            .filter(|((s, _, _), c)| s == schema && c.referenced == target)
            .map(|((_, t, name), c)| ForeignKeyConstraint {
                name: name.clone(),
                table: t.clone(),
                column: c.column.clone(),
                referenced_table: table.to_string(),
            })
            .collect())
    }

    fn count_rows(&mut self, table: &TableRef) -> Result<u64> {
        let warehouse = self.warehouse;
        let state = lock(&warehouse.state);
        Ok(self.table_ref(&state, table)?.rows.len() as u64)
    }

    fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let sql = statement.to_sql()?;
        lock(&self.warehouse.log).push(sql.clone());
        if lock(&self.warehouse.failures).iter().any(|f| sql.contains(f.as_str())) {
            return Err(SyncError::WarehouseError(format!("injected failure: {}", sql)));
        }
        self.apply(statement)
    }

    fn execute_batch(&mut self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }
}

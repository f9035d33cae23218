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


//! # Load/Delete Executor
//!
//! Moves staged artifact data into the warehouse. Each call runs on the
//! caller's session from start to end, since the stage tables it creates are
//! temporary and only visible to that session.
//!
//! - Full load: COPY every artifact into a temp stage, then replace the
//!   target's rows with the stage once all copies have succeeded.
//! - Incremental merge: COPY into a temp stage, delete target rows whose
//!   natural key appears in the stage, insert the distinct staged rows.
//! - Delete: COPY the delete keys into a temp table, delete matching rows.

use log::{debug, info};

use crate::domain::entities::{
    join_key, ColumnDefinition, LoadStrategy, ManifestRecord, ObjectLocation, PlanAction, SqlType,
    TableSyncPlan,
};
use crate::domain::errors::{Result, SyncError};
use crate::domain::naming;
use crate::domain::statements::{CopyMode, Statement, TableRef};
use crate::ports::descriptor_port::DescriptorPort;
use crate::ports::warehouse_port::WarehouseSession;

/// Width of the key columns of a delete stage.
pub const DELETE_KEY_WIDTH: u32 = 255;
pub const DELETED_DATE_COLUMN: &str = "deleted_date";

pub struct LoadExecutor<'a> {
    schema: &'a str,
    bucket: &'a str,
    source_directory: &'a str,
    iam_role: &'a str,
    descriptors: &'a dyn DescriptorPort,
}

impl<'a> LoadExecutor<'a> {
    pub fn new(
        schema: &'a str,
        bucket: &'a str,
        source_directory: &'a str,
        iam_role: &'a str,
        descriptors: &'a dyn DescriptorPort,
    ) -> Self {
        Self {
            schema,
            bucket,
            source_directory,
            iam_role,
            descriptors,
        }
    }

    fn artifact(&self, record: &ManifestRecord) -> ObjectLocation {
        ObjectLocation::new(self.bucket, join_key(self.source_directory, &record.file))
    }

    fn copy(&self, table: TableRef, columns: Option<Vec<String>>, source: &ObjectLocation, mode: CopyMode) -> Statement {
        Statement::Copy {
            table,
            columns,
            source_uri: source.uri(),
            iam_role: self.iam_role.to_string(),
            mode,
        }
    }

    /// Loads every `updates` artifact of the plan. Freshly created tables
    /// always take the full path. Returns the rows written.
    pub fn load(&self, session: &mut dyn WarehouseSession, plan: &TableSyncPlan, strategy: LoadStrategy) -> Result<u64> {
        let strategy = if plan.action == PlanAction::Create {
            LoadStrategy::FullLoad
        } else {
            strategy
        };
        let target = TableRef::new(self.schema, &plan.table);

        match strategy {
            LoadStrategy::FullLoad => self.full_load(session, &target, plan),
            LoadStrategy::IncrementalMergeLoad => {
                let mut written = 0;
                for record in &plan.loads {
                    written += self
                        .merge_load(session, &target, record)
                        .map_err(|e| SyncError::data(&plan.table, &record.file, e))?;
                }
                Ok(written)
            }
        }
    }

    fn full_load(&self, session: &mut dyn WarehouseSession, target: &TableRef, plan: &TableSyncPlan) -> Result<u64> {
        let stage = TableRef::temp(&format!("temp_{}_full", target.name));
        let staging = |e: SyncError| SyncError::data(&plan.table, "stage", e);
        session
            .execute(&Statement::DropTable {
                table: stage.clone(),
                if_exists: true,
                cascade: false,
            })
            .map_err(staging)?;
        session
            .execute(&Statement::CreateTempTableLike {
                table: stage.clone(),
                like: target.clone(),
            })
            .map_err(staging)?;

        for record in &plan.loads {
            let source = self.artifact(record);
            let header = self
                .descriptors
                .read_header(&source)
                .map_err(|e| SyncError::data(&plan.table, &record.file, e))?;
            info!("Copying {} into {}", source.uri(), stage.display());
            session
                .execute(&self.copy(stage.clone(), Some(header), &source, CopyMode::Data))
                .map_err(|e| SyncError::data(&plan.table, &record.file, e))?;
        }

        // Every artifact is staged; only now is the target touched.
        let replace = |e: SyncError| SyncError::data(&plan.table, "replace", e);
        let columns: Vec<String> = session
            .table_columns(self.schema, &target.name)
            .map_err(replace)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        session
            .execute(&Statement::Truncate { table: target.clone() })
            .map_err(replace)?;
        let inserted = session
            .execute(&Statement::InsertSelect {
                target: target.clone(),
                source: stage.clone(),
                columns,
                distinct: false,
            })
            .map_err(replace)?;
        session
            .execute(&Statement::DropTable {
                table: stage,
                if_exists: true,
                cascade: false,
            })
            .map_err(replace)?;
        debug!("{}: replaced contents with {} rows", target.display(), inserted);
        Ok(inserted)
    }

    fn merge_load(&self, session: &mut dyn WarehouseSession, target: &TableRef, record: &ManifestRecord) -> Result<u64> {
        let source = self.artifact(record);
        let header = self.descriptors.read_header(&source)?;
        let keys = key_columns(&target.name);
        if let Some(missing) = keys.iter().find(|k| !header.contains(k)) {
            return Err(SyncError::WarehouseError(format!(
                "natural key column {} is absent from {}",
                missing,
                source.uri()
            )));
        }

        let stage = TableRef::temp(&format!("temp_{}_stage", target.name));
        info!("Merging {} into {}", source.uri(), target.display());
        session.execute(&Statement::DropTable {
            table: stage.clone(),
            if_exists: true,
            cascade: false,
        })?;
        session.execute(&Statement::CreateTempTableLike {
            table: stage.clone(),
            like: target.clone(),
        })?;
        session.execute(&self.copy(stage.clone(), Some(header.clone()), &source, CopyMode::Data))?;
        let replaced = session.execute(&Statement::DeleteMatching {
            target: target.clone(),
            source: stage.clone(),
            keys,
        })?;
        let inserted = session.execute(&Statement::InsertSelect {
            target: target.clone(),
            source: stage.clone(),
            columns: header,
            distinct: true,
        })?;
        session.execute(&Statement::DropTable {
            table: stage,
            if_exists: true,
            cascade: false,
        })?;
        debug!("{}: replaced {} rows, inserted {}", target.display(), replaced, inserted);
        Ok(inserted)
    }

    /// Applies every `deletes` artifact of the plan. A table that does not
    /// exist is left alone. Returns the rows removed.
    pub fn delete(&self, session: &mut dyn WarehouseSession, plan: &TableSyncPlan) -> Result<u64> {
        let exists = session
            .table_exists(self.schema, &plan.table)
            .map_err(|e| SyncError::data(&plan.table, "exists", e))?;
        if !exists {
            info!("{} does not exist, skipping deletes", plan.table);
            return Ok(0);
        }
        let target = TableRef::new(self.schema, &plan.table);
        let mut removed = 0;
        for record in &plan.deletes {
            removed += self
                .apply_deletes(session, &target, record)
                .map_err(|e| SyncError::data(&plan.table, &record.file, e))?;
        }
        Ok(removed)
    }

    fn apply_deletes(&self, session: &mut dyn WarehouseSession, target: &TableRef, record: &ManifestRecord) -> Result<u64> {
        let source = self.artifact(record);
        let keys = key_columns(&target.name);
        let stage = TableRef::temp(&format!("temp_{}_deletes", target.name));

        let mut columns: Vec<ColumnDefinition> = keys
            .iter()
            .map(|k| ColumnDefinition::new(k.as_str(), SqlType::Varchar(DELETE_KEY_WIDTH)))
            .collect();
        columns.push(ColumnDefinition::new(DELETED_DATE_COLUMN, SqlType::TimestampTz));

        info!("Deleting rows listed in {} from {}", source.uri(), target.display());
        session.execute(&Statement::DropTable {
            table: stage.clone(),
            if_exists: true,
            cascade: false,
        })?;
        session.execute(&Statement::CreateTempTable {
            table: stage.clone(),
            columns,
        })?;
        session.execute(&self.copy(stage.clone(), None, &source, CopyMode::Deletes))?;
        let removed = session.execute(&Statement::DeleteMatching {
            target: target.clone(),
            source: stage.clone(),
            keys,
        })?;
        session.execute(&Statement::DropTable {
            table: stage,
            if_exists: true,
            cascade: false,
        })?;
        Ok(removed)
    }
}

fn key_columns(table: &str) -> Vec<String> {
    naming::natural_key(table).iter().map(|k| k.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::FakeWarehouse;
    use crate::domain::entities::OperationKind;
    use crate::infrastructure::descriptors::csv_descriptor_reader::CsvDescriptorReader;
    use crate::infrastructure::storage::local_object_store::LocalObjectStore;
    use crate::ports::object_store_port::ObjectStorePort;
    use crate::ports::warehouse_port::WarehousePort;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn stage_file(root: &Path, key: &str, contents: &str) {
        let path = root.join("bucket").join("extract").join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn record(file: &str, operation: OperationKind) -> ManifestRecord {
        ManifestRecord {
            extract: "Object.account__v".into(),
            operation,
            records: 1,
            file: file.into(),
        }
    }

    fn fixture(root: &Path) -> (FakeWarehouse, CsvDescriptorReader) {
        let store: Arc<dyn ObjectStorePort> = Arc::new(LocalObjectStore::new(root));
        let wh = FakeWarehouse::new(store.clone()).with_table(
            "s",
            "account__v",
            &[("id", SqlType::Varchar(64000)), ("name", SqlType::Varchar(160))],
        );
        (wh, CsvDescriptorReader::new(store))
    }

    fn row(id: &str, name: &str) -> (String, Option<String>) {
        (id.to_string(), Some(name.to_string()))
    }

    fn names(wh: &FakeWarehouse) -> Vec<(String, Option<String>)> {
        let mut rows: Vec<_> = wh
            .rows("s", "account__v")
            .into_iter()
            .map(|r| (r["id"].clone().unwrap_or_default(), r["name"].clone()))
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn test_full_load_follows_header_order() {
        let dir = tempfile::tempdir().unwrap();
        stage_file(dir.path(), "Object/account__v.csv", "name,id\nAcme,1\nGlobex,2\n");
        let (wh, reader) = fixture(dir.path());
        wh.insert_rows("s", "account__v", &[&[Some("9"), Some("stale")]]);

        let mut plan = TableSyncPlan::new("Object.account__v", "account__v", PlanAction::Verify);
        plan.loads = vec![record("Object/account__v.csv", OperationKind::Updates)];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        let rows = executor.load(session.as_mut(), &plan, LoadStrategy::FullLoad).unwrap();

        assert_eq!(rows, 2);
        assert_eq!(
            names(&wh),
            vec![row("1", "Acme"), row("2", "Globex")]
        );
        assert!(wh
            .statements()
            .iter()
            .any(|s| s.starts_with("COPY \"temp_account__v_full\" (\"name\", \"id\") FROM 's3://bucket/extract/Object/account__v.csv'")));
    }

    #[test]
    fn test_failed_full_load_keeps_prior_rows() {
        let dir = tempfile::tempdir().unwrap();
        stage_file(dir.path(), "Object/account__v.csv", "id,name\n1,Acme\n");
        stage_file(dir.path(), "Object/account__v_2.csv", "id,name\n2,Globex,extra\n");
        let (wh, reader) = fixture(dir.path());
        wh.insert_rows("s", "account__v", &[&[Some("9"), Some("Initech")]]);

        let mut plan = TableSyncPlan::new("Object.account__v", "account__v", PlanAction::Verify);
        plan.loads = vec![
            record("Object/account__v.csv", OperationKind::Updates),
            record("Object/account__v_2.csv", OperationKind::Updates),
        ];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        let err = executor
            .load(session.as_mut(), &plan, LoadStrategy::FullLoad)
            .unwrap_err();

        match err {
            SyncError::DataError { artifact, .. } => assert_eq!(artifact, "Object/account__v_2.csv"),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(names(&wh), vec![row("9", "Initech")]);
        assert!(!wh.statements().iter().any(|s| s.starts_with("TRUNCATE")));
    }

    #[test]
    fn test_merge_keeps_one_row_per_key() {
        let dir = tempfile::tempdir().unwrap();
        stage_file(dir.path(), "Object/account__v.csv", "id,name\n1,Acme Corp\n3,Initech\n3,Initech\n");
        let (wh, reader) = fixture(dir.path());
        wh.insert_rows("s", "account__v", &[&[Some("1"), Some("Acme")], &[Some("2"), Some("Globex")]]);

        let mut plan = TableSyncPlan::new("Object.account__v", "account__v", PlanAction::Verify);
        plan.loads = vec![record("Object/account__v.csv", OperationKind::Updates)];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        let written = executor
            .load(session.as_mut(), &plan, LoadStrategy::IncrementalMergeLoad)
            .unwrap();
        drop(session);

        assert_eq!(written, 2);
        assert_eq!(
            names(&wh),
            vec![
                row("1", "Acme Corp"),
                row("2", "Globex"),
                row("3", "Initech"),
            ]
        );
        assert!(wh.statements().iter().any(|s| s.starts_with("DELETE FROM")));
    }

    #[test]
    fn test_created_table_always_full_loads() {
        let dir = tempfile::tempdir().unwrap();
        stage_file(dir.path(), "Object/account__v.csv", "id,name\n1,Acme\n");
        let (wh, reader) = fixture(dir.path());

        let mut plan = TableSyncPlan::new("Object.account__v", "account__v", PlanAction::Create);
        plan.loads = vec![record("Object/account__v.csv", OperationKind::Updates)];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        executor
            .load(session.as_mut(), &plan, LoadStrategy::IncrementalMergeLoad)
            .unwrap();
        assert!(!wh.statements().iter().any(|s| s.starts_with("DELETE FROM")));
        assert_eq!(names(&wh), vec![row("1", "Acme")]);
    }

    #[test]
    fn test_delete_removes_only_listed_keys() {
        let dir = tempfile::tempdir().unwrap();
        stage_file(
            dir.path(),
            "Object/account__v_deletes.csv",
            "id,deleted_date__sys\n1,2026-01-01T00:00:00Z\n42,2026-01-01T00:00:00Z\n",
        );
        let (wh, reader) = fixture(dir.path());
        wh.insert_rows("s", "account__v", &[&[Some("1"), Some("Acme")], &[Some("2"), Some("Globex")]]);

        let mut plan = TableSyncPlan::new("Object.account__v", "account__v", PlanAction::Verify);
        plan.deletes = vec![record("Object/account__v_deletes.csv", OperationKind::Deletes)];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        let removed = executor.delete(session.as_mut(), &plan).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(names(&wh), vec![row("2", "Globex")]);
    }

    #[test]
    fn test_delete_on_absent_table_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (wh, reader) = fixture(dir.path());
        let mut plan = TableSyncPlan::new("Object.product__v", "product__v", PlanAction::Skip);
        plan.deletes = vec![record("Object/product__v_deletes.csv", OperationKind::Deletes)];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        assert_eq!(executor.delete(session.as_mut(), &plan).unwrap(), 0);
        assert!(wh.statements().is_empty());
    }

    #[test]
    fn test_bad_artifact_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        stage_file(dir.path(), "Object/account__v.csv", "id,name\n1,Acme\n");
        let (wh, reader) = fixture(dir.path());
        wh.fail_when("COPY");

        let mut plan = TableSyncPlan::new("Object.account__v", "account__v", PlanAction::Verify);
        plan.loads = vec![record("Object/account__v.csv", OperationKind::Updates)];
        let executor = LoadExecutor::new("s", "bucket", "extract", "role", &reader);
        let mut session = wh.session().unwrap();
        let err = executor
            .load(session.as_mut(), &plan, LoadStrategy::IncrementalMergeLoad)
            .unwrap_err();
        match err {
            SyncError::DataError { table, artifact, .. } => {
                assert_eq!(table, "account__v");
                assert_eq!(artifact, "Object/account__v.csv");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

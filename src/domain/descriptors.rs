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

//! Indexed views over the metadata and delete-metadata catalogs.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::entities::ColumnDescriptor;
use crate::domain::naming;

/// Column descriptors grouped by extract name, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct DescriptorCatalog {
    by_extract: BTreeMap<String, Vec<ColumnDescriptor>>,
    /// Header row of the catalog file; the columns of the metadata table.
    pub header: Vec<String>,
}

impl DescriptorCatalog {
    pub fn new(descriptors: Vec<ColumnDescriptor>, header: Vec<String>) -> Self {
        let mut by_extract: BTreeMap<String, Vec<ColumnDescriptor>> = BTreeMap::new();
        for d in descriptors {
            by_extract.entry(d.extract.clone()).or_default().push(d);
        }
        Self { by_extract, header }
    }

    pub fn columns_for(&self, extract: &str) -> &[ColumnDescriptor] {
        self.by_extract
            .get(extract)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, extract: &str) -> bool {
        self.by_extract.contains_key(extract)
    }

    pub fn len(&self) -> usize {
        self.by_extract.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_extract.is_empty()
    }
}

/// Rows of `metadata_deletes.csv`: columns removed from the source since the
/// previous extract. A row naming the `id` column retires the whole table.
#[derive(Debug, Clone, Default)]
pub struct DeleteCatalog {
    by_extract: BTreeMap<String, Vec<String>>,
}

impl DeleteCatalog {
    pub fn new(rows: Vec<(String, String)>) -> Self {
        let mut by_extract: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (extract, column) in rows {
            let cols = by_extract.entry(extract).or_default();
            let column = naming::column_name(&column);
            if !cols.contains(&column) {
                cols.push(column);
            }
        }
        Self { by_extract }
    }

    /// Normalized column names dropped from `extract`.
    pub fn dropped_columns(&self, extract: &str) -> &[String] {
        self.by_extract
            .get(extract)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Warehouse names of every retired table.
    pub fn retired_tables(&self) -> BTreeSet<String> {
        self.by_extract
            .iter()
            .filter(|(_, cols)| cols.iter().any(|c| c == "id"))
            .map(|(extract, _)| naming::table_name_from_extract(extract))
            .collect()
    }
}

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


//! # CSV Descriptor Reader
//!
//! Reads the manifest, the metadata catalog and the delete-metadata catalog
//! of a Direct Data extract from object storage with the `csv` crate.
//!
//! Rows are deserialized by header name, so extra columns are ignored and a
//! missing required column fails the read.

use crate::domain::corrections::{apply_corrections, METADATA_CORRECTIONS};
use crate::domain::descriptors::{DeleteCatalog, DescriptorCatalog};
use crate::domain::entities::{
    ColumnDescriptor, DescriptorLocations, ManifestRecord, ObjectLocation, OperationKind,
};
use crate::domain::errors::{Result, SyncError};
use crate::domain::mapping::parse_declared_length;
use crate::domain::naming;
use crate::ports::descriptor_port::DescriptorPort;
use crate::ports::object_store_port::ObjectStorePort;
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::Arc;

const MANIFEST_PREFIX: &str = "manifest";
const METADATA_FILE: &str = "metadata.csv";
const METADATA_FULL_FILE: &str = "metadata_full.csv";
const METADATA_DELETES_FILE: &str = "metadata_deletes.csv";

#[derive(Debug, Deserialize)]
struct RawManifestRow {
    extract: String,
    #[serde(rename = "type")]
    operation: String,
    records: String,
    file: String,
}

#[derive(Debug, Deserialize)]
struct RawMetadataRow {
    extract: String,
    column_name: String,
    #[serde(rename = "type")]
    declared_type: String,
    #[serde(default)]
    length: Option<String>,
    #[serde(default)]
    related_extract: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDeleteRow {
    extract: String,
    column_name: String,
}

/// `CsvDescriptorReader` implements the `DescriptorPort`.
pub struct CsvDescriptorReader {
    store: Arc<dyn ObjectStorePort>,
}

impl CsvDescriptorReader {
    pub fn new(store: Arc<dyn ObjectStorePort>) -> Self {
        Self { store }
    }

    fn reader(&self, location: &ObjectLocation) -> Result<csv::Reader<Box<dyn std::io::Read + Send>>> {
        let source = self.store.open(location)?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(source))
    }
}

fn malformed(location: &ObjectLocation, row: usize, reason: impl std::fmt::Display) -> SyncError {
    SyncError::DescriptorError(format!("{} row {}: {}", location.uri(), row, reason))
}

fn required(location: &ObjectLocation, row: usize, field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(malformed(location, row, format!("'{}' is blank", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Record counts are integers, occasionally written as "3.0".
fn parse_record_count(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    trimmed.parse::<u64>().ok().or_else(|| match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Some(f as u64),
        _ => None,
    })
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Shallowest key whose file name satisfies `matches`.
fn pick(keys: &[String], matches: impl Fn(&str) -> bool) -> Option<String> {
    keys.iter()
        .filter(|k| matches(file_name(k)))
        .min_by_key(|k| (k.matches('/').count(), k.len()))
        .cloned()
}

impl DescriptorPort for CsvDescriptorReader {
    fn locate(&self, bucket: &str, source_directory: &str) -> Result<DescriptorLocations> {
        let trimmed = source_directory.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        let keys = self.store.list(bucket, &prefix)?;
        debug!("Found {} objects under {}", keys.len(), prefix);

        let manifest = pick(&keys, |f| f.starts_with(MANIFEST_PREFIX) && f.ends_with(".csv"))
            .ok_or_else(|| {
                SyncError::DescriptorError(format!("No manifest found under s3://{}/{}", bucket, prefix))
            })?;
        let metadata = pick(&keys, |f| f == METADATA_FILE)
            .or_else(|| pick(&keys, |f| f == METADATA_FULL_FILE))
            .ok_or_else(|| {
                SyncError::DescriptorError(format!(
                    "No {} or {} found under s3://{}/{}",
                    METADATA_FILE, METADATA_FULL_FILE, bucket, prefix
                ))
            })?;
        let deletes = pick(&keys, |f| f == METADATA_DELETES_FILE);
        if deletes.is_none() {
            debug!("No {} in this extract", METADATA_DELETES_FILE);
        }

        Ok(DescriptorLocations {
            manifest: ObjectLocation::new(bucket, manifest),
            metadata: ObjectLocation::new(bucket, metadata),
            metadata_deletes: deletes.map(|k| ObjectLocation::new(bucket, k)),
        })
    }

    fn read_manifest(&self, location: &ObjectLocation, chunk_size: usize) -> Result<Vec<ManifestRecord>> {
        let mut reader = self.reader(location)?;
        let chunk_size = chunk_size.max(1);
        let mut records = Vec::new();
        let mut chunk: Vec<ManifestRecord> = Vec::with_capacity(chunk_size);
        let mut chunks = 0;

        for (idx, row) in reader.deserialize::<RawManifestRow>().enumerate() {
            let line = idx + 2;
            let raw = row.map_err(|e| malformed(location, line, e))?;
            let extract = required(location, line, "extract", &raw.extract)?;
            let operation = raw
                .operation
                .parse::<OperationKind>()
                .map_err(|e| malformed(location, line, e))?;
            let records_count = parse_record_count(&raw.records).ok_or_else(|| {
                malformed(location, line, format!("'records' is not a count: {:?}", raw.records))
            })?;
            let file = required(location, line, "file", &raw.file)?;
            chunk.push(ManifestRecord {
                extract,
                operation,
                records: records_count,
                file,
            });
            if chunk.len() == chunk_size {
                chunks += 1;
                debug!("Manifest chunk {} read ({} rows)", chunks, chunk.len());
                records.append(&mut chunk);
            }
        }
        if !chunk.is_empty() {
            chunks += 1;
            records.append(&mut chunk);
        }

        info!(
            "Read {} manifest rows in {} chunks from {}",
            records.len(),
            chunks,
            location.uri()
        );
        Ok(records)
    }

    fn read_catalog(&self, location: &ObjectLocation) -> Result<DescriptorCatalog> {
        let mut reader = self.reader(location)?;
        let header: Vec<String> = reader
            .headers()
            .map_err(|e| malformed(location, 1, e))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut descriptors = Vec::new();
        for (idx, row) in reader.deserialize::<RawMetadataRow>().enumerate() {
            let line = idx + 2;
            let raw = row.map_err(|e| malformed(location, line, e))?;
            let length = non_blank(raw.length);
            let declared_length = length.as_deref().and_then(parse_declared_length);
            if length.is_some() && declared_length.is_none() {
                warn!(
                    "{} row {}: length {:?} is not numeric, using maximum width",
                    location.uri(),
                    line,
                    length
                );
            }
            descriptors.push(ColumnDescriptor {
                extract: required(location, line, "extract", &raw.extract)?,
                column_name: required(location, line, "column_name", &raw.column_name)?,
                declared_type: required(location, line, "type", &raw.declared_type)?,
                declared_length,
                related_extract: non_blank(raw.related_extract),
            });
        }

        let corrected = apply_corrections(&mut descriptors, METADATA_CORRECTIONS);
        info!(
            "Read {} column descriptors from {} ({} corrected)",
            descriptors.len(),
            location.uri(),
            corrected
        );
        Ok(DescriptorCatalog::new(descriptors, header))
    }

    fn read_delete_catalog(&self, location: &ObjectLocation) -> Result<DeleteCatalog> {
        let mut reader = self.reader(location)?;
        let mut rows = Vec::new();
        for (idx, row) in reader.deserialize::<RawDeleteRow>().enumerate() {
            let line = idx + 2;
            let raw = row.map_err(|e| malformed(location, line, e))?;
            rows.push((
                required(location, line, "extract", &raw.extract)?,
                required(location, line, "column_name", &raw.column_name)?,
            ));
        }
        info!("Read {} delete descriptors from {}", rows.len(), location.uri());
        Ok(DeleteCatalog::new(rows))
    }

    fn read_header(&self, location: &ObjectLocation) -> Result<Vec<String>> {
        let mut reader = self.reader(location)?;
        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(naming::column_name)
            .collect();
        if header.iter().all(|h| h.is_empty()) {
            return Err(SyncError::StorageError(format!(
                "{} has no header row",
                location.uri()
            )));
        }
        Ok(header)
    }
}

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


//! # Configuration
//!
//! `AppConfig` is read from a YAML or JSON file (picked by extension) and
//! then overridden by command-line flags. `validate` runs before any I/O.

use crate::application::orchestrator::SyncRequest;
use crate::domain::entities::ExtractKind;
use crate::domain::errors::{Result, SyncError};
use clap::Parser;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;

pub const DEFAULT_PORT: u16 = 5439;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WarehouseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Falls back to `REDSHIFT_PASSWORD`.
    pub password: Option<String>,
    /// Role Redshift assumes to read staged files.
    pub iam_role: String,
    pub pool_size: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub connect_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// A local directory whose subdirectories act as buckets.
    Local,
    #[default]
    S3,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub bucket: String,
    /// Root directory for the `local` backend.
    pub local_root: Option<String>,
    /// Path of the `aws` executable for the `s3` backend.
    pub aws_cli: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    pub source_directory: String,
    pub manifest_key: Option<String>,
    pub metadata_key: Option<String>,
    pub metadata_deletes_key: Option<String>,
    pub schema: Option<String>,
    #[serde(default)]
    pub extract_kind: ExtractKind,
    pub chunk_size: Option<usize>,
    pub parallel: Option<usize>,
    pub cpu_percent: Option<u8>,
    pub report_dir: Option<String>,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    // Overrides for ad-hoc runs
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub database: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub iam_role: Option<String>,
    #[arg(long)]
    pub bucket: Option<String>,
    /// `local` or `s3`
    #[arg(long)]
    pub backend: Option<String>,
    #[arg(long)]
    pub local_root: Option<String>,
    #[arg(long)]
    pub source_directory: Option<String>,
    #[arg(long)]
    pub schema: Option<String>,
    /// `full` or `incremental`
    #[arg(long)]
    pub extract_kind: Option<String>,
    #[arg(long)]
    pub chunk_size: Option<usize>,
    #[arg(long)]
    pub parallel: Option<usize>,
    #[arg(long)]
    pub cpu_percent: Option<u8>,
    #[arg(short, long)]
    pub report_dir: Option<String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| SyncError::ConfigError(format!("Cannot open {}: {}", path, e)))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: AppConfig = if path.ends_with(".json") {
            serde_json::from_str(&contents).map_err(|e| SyncError::ConfigError(e.to_string()))?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| SyncError::ConfigError(e.to_string()))?
        };

        Ok(config)
    }

    /// Builds a config from flags alone when no file is given.
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = Self {
            warehouse: WarehouseConfig {
                port: DEFAULT_PORT,
                ..Default::default()
            },
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
        };
        config.merge_cli(args)?;
        Ok(config)
    }

    pub fn merge_cli(&mut self, args: &CliArgs) -> Result<()> {
        if let Some(h) = &args.host { self.warehouse.host = h.clone(); }
        if let Some(p) = args.port { self.warehouse.port = p; }
        if let Some(d) = &args.database { self.warehouse.database = d.clone(); }
        if let Some(u) = &args.user { self.warehouse.user = u.clone(); }
        if let Some(p) = &args.password { self.warehouse.password = Some(p.clone()); }
        if let Some(r) = &args.iam_role { self.warehouse.iam_role = r.clone(); }
        if let Some(b) = &args.bucket { self.storage.bucket = b.clone(); }
        if let Some(b) = &args.backend {
            self.storage.backend = match b.trim().to_lowercase().as_str() {
                "local" => StorageBackend::Local,
                "s3" => StorageBackend::S3,
                other => {
                    return Err(SyncError::ConfigError(format!(
                        "backend must be 'local' or 's3', got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(r) = &args.local_root { self.storage.local_root = Some(r.clone()); }
        if let Some(s) = &args.source_directory { self.sync.source_directory = s.clone(); }
        if let Some(s) = &args.schema { self.sync.schema = Some(s.clone()); }
        if let Some(k) = &args.extract_kind { self.sync.extract_kind = k.parse()?; }
        if let Some(c) = args.chunk_size { self.sync.chunk_size = Some(c); }
        if let Some(p) = args.parallel { self.sync.parallel = Some(p); }
        if let Some(c) = args.cpu_percent { self.sync.cpu_percent = Some(c); }
        if let Some(r) = &args.report_dir { self.sync.report_dir = Some(r.clone()); }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("warehouse.host", &self.warehouse.host),
            ("warehouse.database", &self.warehouse.database),
            ("warehouse.user", &self.warehouse.user),
            ("warehouse.iam_role", &self.warehouse.iam_role),
            ("storage.bucket", &self.storage.bucket),
            ("sync.source_directory", &self.sync.source_directory),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::ConfigError(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.storage.backend == StorageBackend::Local && self.storage.local_root.is_none() {
            return Err(SyncError::ConfigError(
                "storage.local_root is required for the local backend".to_string(),
            ));
        }
        if self.sync.chunk_size == Some(0) {
            return Err(SyncError::ConfigError("sync.chunk_size must be positive".to_string()));
        }
        if let Some(p) = self.sync.cpu_percent {
            if p == 0 || p > 100 {
                return Err(SyncError::ConfigError(format!(
                    "sync.cpu_percent must be between 1 and 100, got {}",
                    p
                )));
            }
        }
        Ok(())
    }

    pub fn report_dir(&self) -> &str {
        self.sync.report_dir.as_deref().unwrap_or(".")
    }

    pub fn to_request(&self) -> SyncRequest {
        SyncRequest {
            bucket: self.storage.bucket.clone(),
            source_directory: self.sync.source_directory.clone(),
            manifest_key: self.sync.manifest_key.clone(),
            metadata_key: self.sync.metadata_key.clone(),
            metadata_deletes_key: self.sync.metadata_deletes_key.clone(),
            schema: self.sync.schema.clone(),
            extract_kind: self.sync.extract_kind,
            chunk_size: self.sync.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            iam_role: self.warehouse.iam_role.clone(),
        }
    }
}

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

//! Core error definitions for the Direct Data synchronizer.
//!
//! This module provides a centralized `SyncError` enum and a `Result` type
//! used throughout the application. The variants follow the failure classes
//! the orchestrator cares about: descriptor and configuration errors abort a
//! run, structural errors block one table, data errors are only reported.

use thiserror::Error;

/// Error types encountered during a synchronization run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed manifest or metadata catalog. Always fatal.
    #[error("Descriptor error: {0}")]
    DescriptorError(String),

    #[error("Warehouse connectivity error: {0}")]
    ConnectivityError(String),

    /// Create, verify, drop or foreign-key failure for one table.
    #[error("Schema change failed for {table}: {reason}")]
    StructuralError { table: String, reason: String },

    /// Load or delete failure for one table artifact.
    #[error("Data operation failed for {table} ({artifact}): {reason}")]
    DataError {
        table: String,
        artifact: String,
        reason: String,
    },

    #[error("Object storage error: {0}")]
    StorageError(String),

    #[error("Invalid identifier or literal: {0}")]
    InvalidIdentifier(String),

    #[error("Warehouse error: {0}")]
    WarehouseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl SyncError {
    /// Fatal errors end the run before any warehouse mutation is attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::ConfigError(_) | SyncError::DescriptorError(_)
        )
    }

    /// Wraps any error as a structural failure of `table`, keeping the message.
    pub fn structural(table: &str, cause: impl std::fmt::Display) -> Self {
        SyncError::StructuralError {
            table: table.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Wraps any error as a data failure of `table` while handling `artifact`.
    pub fn data(table: &str, artifact: &str, cause: impl std::fmt::Display) -> Self {
        SyncError::DataError {
            table: table.to_string(),
            artifact: artifact.to_string(),
            reason: cause.to_string(),
        }
    }
}

impl From<postgres::Error> for SyncError {
    fn from(e: postgres::Error) -> Self {
        if e.is_closed() {
            return SyncError::ConnectivityError(e.to_string());
        }
        match e.as_db_error() {
            Some(db) => SyncError::WarehouseError(format!(
                "{} (sqlstate={})",
                db.message(),
                db.code().code()
            )),
            None => SyncError::WarehouseError(e.to_string()),
        }
    }
}

impl From<r2d2::Error> for SyncError {
    fn from(e: r2d2::Error) -> Self {
        SyncError::ConnectivityError(format!("Failed to get connection from pool: {}", e))
    }
}

/// A specialized Result type for the synchronizer.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SyncError::DescriptorError("missing column".into()).is_fatal());
        assert!(SyncError::ConfigError("no host".into()).is_fatal());
        assert!(!SyncError::structural("account__v", "boom").is_fatal());
        assert!(!SyncError::data("account__v", "a.csv", "bad row").is_fatal());
    }

    #[test]
    fn test_messages_carry_table_identity() {
        let e = SyncError::data("account__v", "Object/account__v.csv", "bad row");
        let msg = e.to_string();
        assert!(msg.contains("account__v"));
        assert!(msg.contains("Object/account__v.csv"));
    }
}

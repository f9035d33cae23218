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


//! S3 access through the `aws s3` CLI.
//!
//! Credentials, region and endpoint come from the CLI's own configuration.
//! Downloads stream from `aws s3 cp <uri> -` so large staged files are never
//! held in memory.

use crate::domain::entities::ObjectLocation;
use crate::domain::errors::{Result, SyncError};
use crate::ports::object_store_port::ObjectStorePort;
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

pub struct S3CliObjectStore {
    program: String,
}

impl S3CliObjectStore {
    pub fn new() -> Self {
        Self {
            program: "aws".to_string(),
        }
    }

    /// Uses a different executable, e.g. a wrapper script.
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl Default for S3CliObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the key from one `aws s3 ls --recursive` line:
/// `2024-01-01 10:00:00       1234 path/to/key.csv`.
fn parse_ls_line(line: &str) -> Option<String> {
    let mut rest = line.trim_start();
    for _ in 0..3 {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

impl ObjectStorePort for S3CliObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let uri = ObjectLocation::new(bucket, prefix).uri();
        debug!("Listing {}", uri);
        let output = Command::new(&self.program)
            .args(["s3", "ls", uri.as_str(), "--recursive"])
            .output()?;

        // `ls` exits 1 when nothing matches.
        if !output.status.success() && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::StorageError(format!(
                "Listing failed for {}: {}",
                uri,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut keys: Vec<String> = stdout.lines().filter_map(parse_ls_line).collect();
        keys.sort();
        Ok(keys)
    }

    fn open(&self, location: &ObjectLocation) -> Result<Box<dyn Read + Send>> {
        let uri = location.uri();
        debug!("Streaming {}", uri);
        let mut child = Command::new(&self.program)
            .args(["s3", "cp", uri.as_str(), "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SyncError::StorageError(format!("No stdout for download of {}", uri)))?;
        Ok(Box::new(ChildReader {
            child,
            stdout,
            uri,
            finished: false,
        }))
    }
}

/// Reads a child's stdout and surfaces a non-zero exit as an I/O error.
struct ChildReader {
    child: Child,
    stdout: ChildStdout,
    uri: String,
    finished: bool,
}

impl Read for ChildReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() && !self.finished {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("download of {} exited with {}", self.uri, status),
                ));
            }
        }
        Ok(n)
    }
}

impl Drop for ChildReader {
    fn drop(&mut self) {
        if !self.finished {
            // Reader abandoned early, e.g. after the header row.
            if let Err(e) = self.child.kill() {
                warn!("Could not stop download of {}: {}", self.uri, e);
            }
            let _ = self.child.wait();
        }
    }
}

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

//! # Runtime Context
//!
//! This module acts as the "Engine Room" of the application. It sets up the
//! underlying resources that the application needs to run efficiently:
//! 1. **Thread Pool**: Using the `rayon` crate for the per-phase table fan-out.
//! 2. **Connection Pool**: Using `r2d2` to manage Redshift connections, one per worker.
//! 3. **CPU Scaling**: Automatically adjusting the workload based on available CPU cores.

use crate::config::{
    AppConfig, DEFAULT_CONNECT_RETRIES, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_RETRY_BACKOFF_MS,
};
use crate::domain::errors::Result;
use crate::infrastructure::redshift::connection_manager::RedshiftConnectionManager;
use crate::infrastructure::redshift::redshift_adapter::RedshiftAdapter;
use log::info;
use r2d2::Pool;
use std::sync::Arc;
use std::time::Duration;

/// `RuntimeContext` holds shared resources that exist for the entire life of the app.
pub struct RuntimeContext {
    /// Shared by every worker; each unit of work checks one connection out.
    pub pool: Arc<Pool<RedshiftConnectionManager>>,
    /// The number of parallel tasks we can run at once.
    pub num_threads: usize,
}

/// Worker count from `parallel`, else `cpu_percent` of the cores (default 50%).
pub fn worker_count(parallel: Option<usize>, cpu_percent: Option<u8>, total_cpus: usize) -> usize {
    let cpu_percent = cpu_percent.unwrap_or(50);
    let num_threads = parallel
        .unwrap_or_else(|| (total_cpus as f64 * (cpu_percent as f64 / 100.0)).ceil() as usize);
    std::cmp::max(1, num_threads)
}

impl RuntimeContext {
    /// Initializes the global thread pool and the Redshift connection pool.
    ///
    /// No connection is opened here; the pool fills on first use.
    pub fn init(config: &AppConfig) -> Result<Self> {
        // --- STEP 1: PARALLELISM CALCULATION ---
        let num_threads = worker_count(config.sync.parallel, config.sync.cpu_percent, num_cpus::get());

        info!(
            "Initializing worker pool with {} threads (Target CPU: {}%)",
            num_threads,
            config.sync.cpu_percent.unwrap_or(50)
        );

        // Rayon's global thread pool is used by `.par_iter()` in every phase.
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .unwrap_or_else(|e| {
                info!(
                    "Global thread pool already initialized (likely in a test): {}",
                    e
                );
            });

        // --- STEP 2: CONNECTION POOL SETUP ---
        let wh = &config.warehouse;

        // Password from the config file, then the environment.
        let password = wh
            .password
            .clone()
            .or_else(|| std::env::var("REDSHIFT_PASSWORD").ok())
            .unwrap_or_default();

        info!(
            "Initializing connection pool for {}:{}/{}...",
            wh.host, wh.port, wh.database
        );

        let manager = RedshiftConnectionManager::new(
            &wh.host,
            wh.port,
            &wh.database,
            &wh.user,
            &password,
            Duration::from_secs(wh.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS)),
        );

        // One spare connection beyond the workers for the run's own catalog checks.
        let pool_size = wh.pool_size.unwrap_or((num_threads + 2) as u32);

        let pool = Pool::builder()
            .max_size(pool_size)
            .min_idle(Some(0))
            .build_unchecked(manager);

        Ok(Self {
            pool: Arc::new(pool),
            num_threads,
        })
    }

    pub fn warehouse(&self, config: &AppConfig) -> RedshiftAdapter {
        let wh = &config.warehouse;
        RedshiftAdapter::new(
            self.pool.clone(),
            &wh.database,
            wh.connect_retries.unwrap_or(DEFAULT_CONNECT_RETRIES),
            Duration::from_millis(wh.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS)),
        )
    }
}

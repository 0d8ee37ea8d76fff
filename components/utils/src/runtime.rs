// Copyright 2024 kisekifs
//
// JuiceFS, Copyright 2020 Juicedata, Inc.
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

use std::future::Future;

use once_cell::sync::Lazy;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const WORKER_THREADS_ENV: &str = "ZFORGE_WORKER_THREADS";

static GLOBAL_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    let worker_threads = match crate::env::var_parsed::<usize>(WORKER_THREADS_ENV) {
        Ok(Some(n)) if n > 0 => n,
        Ok(_) => crate::num_cpus::get(),
        Err(e) => {
            warn!("ignore {WORKER_THREADS_ENV}: {e}");
            crate::num_cpus::get()
        }
    };
    debug!("start tokio runtime with {worker_threads} worker threads");
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name("zforge-worker")
        .enable_all()
        .build()
        .expect("failed to build the global tokio runtime")
});

pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    GLOBAL_RUNTIME.spawn(future)
}

pub fn block_on<F: Future>(future: F) -> F::Output { GLOBAL_RUNTIME.block_on(future) }

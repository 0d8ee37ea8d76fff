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

use snafu::{ResultExt, Whatever};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use zforge_common::ZFORGE_LOG_ENV;

/// Install a pretty stdout logger, for tests and debugging.
///
/// Safe to call more than once; only the first call takes effect.
pub fn install_fmt_log() {
    let _ = tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(create_env_filter("debug"))
        .with_test_writer()
        .try_init();
}

/// Initialize logging to stderr.
///
/// The filter comes from the `ZFORGE_LOG` environment variable when set,
/// otherwise from `default_directive` (for example `info` or
/// `zforge_recipe=debug`).
pub fn init_logging(default_directive: &str) -> Result<(), Whatever> {
    let env_filter = create_env_filter(default_directive);
    // Don't build the layer if we'll never emit any logs.
    if env_filter.max_level_hint() == Some(LevelFilter::OFF) {
        return Ok(());
    }
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .whatever_context("failed to install the tracing subscriber")?;
    tracing::debug!("logging started");
    Ok(())
}

fn create_env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(ZFORGE_LOG_ENV).unwrap_or_else(|_| EnvFilter::new(directive))
}

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

mod cmd;

use clap::{Parser, Subcommand};
use snafu::Whatever;
use zforge_common::DEFAULT_LOG_DIRECTIVE;

use crate::cmd::{
    lifecycle::{CacheArgs, RunArgs, StoreArgs},
    plan::PlanArgs,
    RecipeArgs,
};

#[derive(Debug, Parser)]
#[clap(
    name = "zforge",
    about = "Build chunked zarr datasets out of file sequences",
    version
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the chunk plans of a recipe as JSON.
    Plan(PlanArgs),
    /// Initialize the target store, a no-op when it is already initialized.
    Prepare(RecipeArgs),
    /// Copy inputs into the input cache.
    Cache(CacheArgs),
    /// Write chunks into the target store.
    Store(StoreArgs),
    /// Check that every chunk was written and seal the target.
    Finalize(RecipeArgs),
    /// Run the whole recipe in this process.
    Run(RunArgs),
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    zforge_utils::logger::init_logging(DEFAULT_LOG_DIRECTIVE)?;
    match cli.commands {
        Commands::Plan(args) => args.run(),
        Commands::Prepare(args) => cmd::lifecycle::prepare(&args),
        Commands::Cache(args) => args.run(),
        Commands::Store(args) => args.run(),
        Commands::Finalize(args) => cmd::lifecycle::finalize(&args),
        Commands::Run(args) => args.run(),
    }
}

// Neutron Probe: API and Scenario Tests for OpenStack Networking
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.


use neutron_runtime::cases::catalog;
use neutron_runtime::config::Config;
use neutron_runtime::context::Environment;
use neutron_runtime::runner::{list, run, RunOptions};

use clap::{Parser, Subcommand};
use log::*;
use std::error::Error;
use std::sync::Arc;

/// Environment variable holding the path to the configuration, if `--config` is not given
const CONFIG_VAR: &str = "NEUTRON_TEST_CONFIG";

fn main() -> Result<(), Box<dyn Error>> {
    // run clap
    let args = CommandLineArguments::parse();

    // initialize the env logger
    pretty_env_logger::init();

    match args.cmd {
        MainCommand::List { filter } => {
            for case in list(&catalog(), filter.as_deref())? {
                println!("{} [{}]", case.id, case.idempotent_id);
            }
        }
        MainCommand::Run { config, filter, threads, json, progress } => {
            let path = match config.or_else(|| std::env::var(CONFIG_VAR).ok()) {
                Some(path) => path,
                None => return Err(format!("Use --config or set {}", CONFIG_VAR).into()),
            };
            let config = Config::from_file(&path)?;

            info!("Connecting to {}", config.identity.uri);
            let env = Arc::new(Environment::connect(config)?);

            // zero threads means one per core
            let threads = if threads == 0 { num_cpus::get() } else { threads };
            let options = RunOptions { filter, threads, progress };
            let report = run(env, Arc::new(catalog()), &options)?;

            println!("{}", report);
            if let Some(filename) = json {
                std::fs::write(&filename, report.to_json()?)?;
                info!("Report written to {}", filename);
            }
            if !report.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// # Neutron Probe
///
/// Runs the API and scenario tests against an OpenStack Networking deployment. The deployment and
/// the credentials are read from a TOML configuration file.
#[derive(Parser, Debug)]
#[clap(name = "Neutron Probe", author = "Tibor Schneider")]
struct CommandLineArguments {
    /// Action to perform
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Subcommand, Debug)]
enum MainCommand {
    /// List the test cases, together with their idempotent ids
    #[clap(name = "list")]
    List {
        /// Only list cases whose id or idempotent id contains this string
        #[clap(short = 'f', long)]
        filter: Option<String>,
    },
    /// Run the test cases
    #[clap(name = "run")]
    Run {
        /// Configuration file. Defaults to the file named in NEUTRON_TEST_CONFIG
        #[clap(short = 'c', long)]
        config: Option<String>,
        /// Only run cases whose id or idempotent id contains this string
        #[clap(short = 'f', long)]
        filter: Option<String>,
        /// Number of parallel workers. 0 uses one worker per core
        #[clap(short = 't', long, default_value = "1")]
        threads: usize,
        /// Store the report in a json file
        #[clap(long)]
        json: Option<String>,
        /// Show a progress bar
        #[clap(short = 'p', long)]
        progress: bool,
    },
}

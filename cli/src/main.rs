// This file is part of fpga_window, a library for driving FPGA accelerators through memory-mapped windows.
//
// Copyright 2025 The fpga_window Developers
//
// SPDX-License-Identifier: GPL-3.0-only
//
// fpga_window is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// fpga_window is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! fpga-window - operator front end for accelerators driven through `fpga_window`.
//!
//! Every subcommand reads the deployment configuration (`--config`, or
//! `/etc/fpga_window/config.toml` when present) and talks to the hardware directly: sysfs for
//! the FPGA manager and fabric clocks, `/dev/mem` for the window. Most subcommands therefore
//! need root.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`

mod access;
mod load;
mod run;
mod status;

use crate::access::{WordType, parse_number, read_handler, write_handler};
use crate::load::load_handler;
use crate::run::{RunOptions, run_handler};
use crate::status::status_handler;
use clap::{Parser, Subcommand, arg, command};
use env_logger::Env;
use fpga_window::config::DeploymentConfig;
use log::debug;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fpga-window")]
#[command(bin_name = "fpga-window")]
struct Cli {
    #[arg(
        long = "config",
        help = r#"deployment configuration file.
Defaults to /etc/fpga_window/config.toml, or built-in ZedBoard values when that file
does not exist."#
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Program the bitstream and set the fabric clocks
    Load {
        /// Bitstream to program instead of the configured one
        bitstream: Option<PathBuf>,
    },
    /// Show FPGA manager state, clock rates and the control word
    Status,
    /// Read words out of the window
    Read {
        /// Word address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_number)]
        address: u64,
        #[arg(default_value_t = 1)]
        count: usize,
        #[arg(long = "type", value_enum, default_value_t = WordType::U32)]
        word_type: WordType,
    },
    /// Write words into the window
    Write {
        /// Word address, decimal or 0x-prefixed hex
        #[arg(value_parser = parse_number)]
        address: u64,
        #[arg(required = true)]
        values: Vec<String>,
        #[arg(long = "type", value_enum, default_value_t = WordType::U32)]
        word_type: WordType,
    },
    /// Launch the accelerator and wait for it to finish
    Run {
        #[command(flatten)]
        options: RunOptions,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let config = DeploymentConfig::load(cli.config.as_deref())?;
    let result = match cli.command {
        Commands::Load { bitstream } => load_handler(&config, bitstream.as_deref())?,
        Commands::Status => status_handler(&config)?,
        Commands::Read {
            address,
            count,
            word_type,
        } => read_handler(config, address, count, word_type)?,
        Commands::Write {
            address,
            values,
            word_type,
        } => write_handler(config, address, &values, word_type)?,
        Commands::Run { options } => run_handler(config, &options)?,
    };
    println!("{result}");
    Ok(())
}

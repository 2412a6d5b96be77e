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

//! Read and write commands: raw typed access to the window.

use clap::ValueEnum;
use fpga_window::WindowError;
use fpga_window::config::DeploymentConfig;
use fpga_window::page::Page;
use fpga_window::session::HardwareSession;
use fpga_window::transfer::Element;
use fpga_window::window::PagedWindow;
use std::fmt::Display;
use std::str::FromStr;

/// Element type the window is accessed as. Word addresses are in units of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WordType {
    U8,
    U16,
    U32,
    U64,
    I32,
    F32,
    F64,
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(raw: &str) -> Result<u64, String> {
    let parsed = match raw.strip_prefix("0x").or(raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => raw.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("'{raw}' is not a number: {e}"))
}

fn parse_unsigned<T: TryFrom<u64>>(raw: &str) -> Result<T, String> {
    let value = parse_number(raw)?;
    T::try_from(value).map_err(|_| format!("'{raw}' does not fit the word type"))
}

fn parse_plain<T: FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| format!("'{raw}' is not a valid value: {e}"))
}

fn parse_values<T>(
    raw: &[String],
    parse: fn(&str) -> Result<T, String>,
) -> Result<Vec<T>, WindowError> {
    raw.iter()
        .map(|r| parse(r).map_err(WindowError::Argument))
        .collect()
}

fn word_address(address: u64) -> Result<usize, WindowError> {
    usize::try_from(address)
        .map_err(|_| WindowError::Argument(format!("Address {address:#x} is out of range")))
}

fn read_as<T: Element + Display, P: Page>(
    window: &PagedWindow<P>,
    address: usize,
    count: usize,
) -> Result<Vec<String>, WindowError> {
    let mut values = vec![T::default(); count];
    window.read(address, &mut values)?;
    Ok(values.iter().map(T::to_string).collect())
}

fn format_words(address: usize, words: &[String]) -> String {
    words
        .iter()
        .enumerate()
        .map(|(i, word)| format!("{:#x}: {word}", address + i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads `count` words starting at word `address` and lists them one per line.
pub fn read_handler(
    config: DeploymentConfig,
    address: u64,
    count: usize,
    word_type: WordType,
) -> Result<String, WindowError> {
    let address = word_address(address)?;
    let mut session = HardwareSession::attach(config)?;
    let window = session.window();
    let words = match word_type {
        WordType::U8 => read_as::<u8, _>(window, address, count)?,
        WordType::U16 => read_as::<u16, _>(window, address, count)?,
        WordType::U32 => read_as::<u32, _>(window, address, count)?,
        WordType::U64 => read_as::<u64, _>(window, address, count)?,
        WordType::I32 => read_as::<i32, _>(window, address, count)?,
        WordType::F32 => read_as::<f32, _>(window, address, count)?,
        WordType::F64 => read_as::<f64, _>(window, address, count)?,
    };
    session.close()?;
    Ok(format_words(address, &words))
}

/// Writes `values`, parsed as `word_type`, starting at word `address`.
///
/// Every value is parsed before the window is opened, so a typo writes nothing.
pub fn write_handler(
    config: DeploymentConfig,
    address: u64,
    values: &[String],
    word_type: WordType,
) -> Result<String, WindowError> {
    let address = word_address(address)?;
    let mut session = HardwareSession::attach(config)?;
    let window = session.window();
    match word_type {
        WordType::U8 => window.write(address, &parse_values::<u8>(values, parse_unsigned)?)?,
        WordType::U16 => window.write(address, &parse_values::<u16>(values, parse_unsigned)?)?,
        WordType::U32 => window.write(address, &parse_values::<u32>(values, parse_unsigned)?)?,
        WordType::U64 => window.write(address, &parse_values::<u64>(values, parse_unsigned)?)?,
        WordType::I32 => window.write(address, &parse_values::<i32>(values, parse_plain)?)?,
        WordType::F32 => window.write(address, &parse_values::<f32>(values, parse_plain)?)?,
        WordType::F64 => window.write(address, &parse_values::<f64>(values, parse_plain)?)?,
    }
    session.close()?;
    Ok(format!("{} words written at {address:#x}", values.len()))
}

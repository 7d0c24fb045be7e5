/*
 * This file is a part of Skytable
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # kilnsh
//!
//! The interactive shell binary: parses a host/port (and optional one-shot
//! query) from the command line, then either runs that query once or opens a
//! `rustyline`-backed REPL against it.

macro_rules! fatal {
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
        std::process::exit(0x01);
    }}
}

mod args;
mod client;
mod error;
mod repl;

use args::Task;
use client::Connection;

fn main() {
    match run() {
        Ok(()) => {}
        Err(e) => fatal!("cli error: {e}"),
    }
}

fn run() -> error::CliResult<()> {
    match args::parse()? {
        Task::HelpMessage(msg) => println!("{msg}"),
        Task::OpenShell(cfg) => repl::start(cfg)?,
        Task::ExecOnce(cfg, query) => {
            let mut con = Connection::connect(&cfg.host, cfg.port)?;
            println!("{}", con.execute(&query)?);
        }
    }
    Ok(())
}

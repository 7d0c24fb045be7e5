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

//! Command-line argument parsing: just an optional host/port to connect to and
//! an optional one-shot query to run instead of opening the REPL. There is no
//! username/password/TLS surface here; the wire protocol this shell speaks has
//! no authentication layer.

use crate::error::CliResult;
use clap::{App, Arg};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 2003,
        }
    }
}

#[derive(Debug)]
pub enum Task {
    HelpMessage(String),
    OpenShell(ClientConfig),
    ExecOnce(ClientConfig, String),
}

pub fn parse() -> CliResult<Task> {
    let matches = App::new("kilnsh")
        .version(kilncore::VERSION)
        .about("The kiln interactive shell")
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .takes_value(true)
                .help("The server host to connect to"),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .takes_value(true)
                .help("The server port to connect to"),
        )
        .arg(
            Arg::with_name("eval")
                .short("e")
                .long("eval")
                .takes_value(true)
                .help("Run a single query and exit instead of opening the shell"),
        )
        .get_matches();

    let mut cfg = ClientConfig::default();
    if let Some(host) = matches.value_of("host") {
        cfg.host = host.to_owned();
    }
    if let Some(port) = matches.value_of("port") {
        cfg.port = port
            .parse()
            .map_err(|e| crate::error::CliError::ArgsErr(format!("invalid port '{port}': {e}")))?;
    }

    match matches.value_of("eval") {
        Some(query) => Ok(Task::ExecOnce(cfg, query.to_owned())),
        None => Ok(Task::OpenShell(cfg)),
    }
}

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

//! A flat whitespace-directive config file parser, one directive per line, the
//! same shape as a minimal Redis config: `timeout`, `port`, `bind`, `save`,
//! `dir`, `loglevel`, `logfile`, `databases`, `slaveof`, `glueoutputbuf`,
//! `daemonize`. Comments (`#`) and blank lines are skipped.

use crate::db::SaveParam;
use crate::error::{Error, SkyResult};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "info",
            LogLevel::Notice => "warn",
            LogLevel::Warning => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub timeout: u64,
    pub databases: usize,
    pub save_params: Vec<SaveParam>,
    pub dir: String,
    pub dbfilename: String,
    pub loglevel: LogLevel,
    pub logfile: Option<String>,
    pub slaveof: Option<(String, u16)>,
    pub glue_output_buf: bool,
    pub daemonize: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 6379,
            bind: "127.0.0.1".to_string(),
            timeout: 300,
            databases: 16,
            save_params: vec![
                SaveParam { seconds: 3600, changes: 1 },
                SaveParam { seconds: 300, changes: 100 },
                SaveParam { seconds: 60, changes: 10000 },
            ],
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
            loglevel: LogLevel::Notice,
            logfile: None,
            slaveof: None,
            glue_output_buf: true,
            daemonize: false,
        }
    }
}

fn yes_no(s: &str) -> SkyResult<bool> {
    match s.to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(Error::config(format!("expected 'yes' or 'no', got '{other}'"))),
    }
}

impl Config {
    pub fn load(path: &Path) -> SkyResult<Self> {
        let mut cfg = Self::default();
        cfg.apply_file(path)?;
        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> SkyResult<()> {
        let text = fs::read_to_string(path).map_err(|e| Error::io_extra(e, path.display().to_string()))?;
        for (line_num, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.apply_directive(trimmed).map_err(|e| {
                Error::config(format!("line {}: {e}", line_num + 1))
            })?;
        }
        Ok(())
    }

    fn apply_directive(&mut self, line: &str) -> SkyResult<()> {
        let argv: Vec<&str> = line.split_whitespace().collect();
        let argc = argv.len();
        match argv[0].to_ascii_lowercase().as_str() {
            "timeout" if argc == 2 => {
                self.timeout = argv[1].parse().map_err(|_| Error::config("invalid timeout value"))?;
            }
            "port" if argc == 2 => {
                self.port = argv[1].parse().map_err(|_| Error::config("invalid port"))?;
            }
            "bind" if argc == 2 => self.bind = argv[1].to_string(),
            "save" if argc == 3 => {
                let seconds: u64 = argv[1].parse().map_err(|_| Error::config("invalid save seconds"))?;
                let changes: u64 = argv[2].parse().map_err(|_| Error::config("invalid save changes"))?;
                self.save_params.push(SaveParam { seconds, changes });
            }
            "dir" if argc == 2 => self.dir = argv[1].to_string(),
            "dbfilename" if argc == 2 => self.dbfilename = argv[1].to_string(),
            "loglevel" if argc == 2 => {
                self.loglevel = match argv[1].to_ascii_lowercase().as_str() {
                    "debug" => LogLevel::Debug,
                    "verbose" => LogLevel::Verbose,
                    "notice" => LogLevel::Notice,
                    "warning" => LogLevel::Warning,
                    _ => return Err(Error::config("loglevel must be debug, verbose, notice or warning")),
                };
            }
            "logfile" if argc == 2 => {
                self.logfile = if argv[1].eq_ignore_ascii_case("stdout") {
                    None
                } else {
                    Some(argv[1].to_string())
                };
            }
            "databases" if argc == 2 => {
                let n: usize = argv[1].parse().map_err(|_| Error::config("invalid number of databases"))?;
                if n == 0 {
                    return Err(Error::config("databases must be at least 1"));
                }
                self.databases = n;
            }
            "slaveof" if argc == 3 => {
                let port: u16 = argv[2].parse().map_err(|_| Error::config("invalid master port"))?;
                self.slaveof = Some((argv[1].to_string(), port));
            }
            "glueoutputbuf" if argc == 2 => self.glue_output_buf = yes_no(argv[1])?,
            "daemonize" if argc == 2 => self.daemonize = yes_no(argv[1])?,
            other => return Err(Error::config(format!("unknown or malformed directive '{other}'"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("kiln-cfg-test-{}-{}", std::process::id(), contents.len()));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_when_no_directives() {
        let path = write_temp("# just a comment\n\n");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.port, 6379);
        assert_eq!(cfg.databases, 16);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_parses_core_directives() {
        let path = write_temp("port 9999\nbind 0.0.0.0\ntimeout 60\ndatabases 4\nsave 60 1\nslaveof 10.0.0.1 9999\n");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.bind, "0.0.0.0");
        assert_eq!(cfg.timeout, 60);
        assert_eq!(cfg.databases, 4);
        assert_eq!(cfg.slaveof, Some(("10.0.0.1".to_string(), 9999)));
        assert!(cfg.save_params.iter().any(|p| p.seconds == 60 && p.changes == 1));
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_rejects_bad_directive() {
        let path = write_temp("port notanumber\n");
        assert!(Config::load(&path).is_err());
        fs::remove_file(path).ok();
    }
}

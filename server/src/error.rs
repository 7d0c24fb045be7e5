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

//! Crate-wide error type

use std::fmt;
use std::io::Error as IoError;

pub type SkyResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(IoError),
    IoExtra(IoError, String),
    Config(String),
    Storage(String),
    Protocol(String),
    Replication(String),
}

impl Error {
    pub fn io_extra(ioe: IoError, extra: impl ToString) -> Self {
        Self::IoExtra(ioe, extra.to_string())
    }
    pub fn config(msg: impl ToString) -> Self {
        Self::Config(msg.to_string())
    }
    pub fn storage(msg: impl ToString) -> Self {
        Self::Storage(msg.to_string())
    }
    pub fn protocol(msg: impl ToString) -> Self {
        Self::Protocol(msg.to_string())
    }
    pub fn replication(msg: impl ToString) -> Self {
        Self::Replication(msg.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::IoExtra(e, extra) => write!(f, "i/o error: {e} ({extra})"),
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Replication(e) => write!(f, "replication error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

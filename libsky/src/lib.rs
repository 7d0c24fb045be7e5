/*
 * Created on Mon Jul 20 2020
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2020, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The core library
//!
//! This contains small pieces shared by both the `cli` and the `server` crates: the
//! generic result alias, the shared read-buffer size, version/URL constants and the
//! inline-argument tokenizer used by the REPL client to turn a typed line into a raw
//! wire request.

pub mod util;

use std::error::Error;
use std::str::FromStr;

/// A generic result
pub type TResult<T> = Result<T, Box<dyn Error>>;

/// The size of the read buffer in bytes
pub const BUF_CAP: usize = 8 * 1024; // 8 KB per-connection

/// The current crate version, as declared in `Cargo.toml`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The project homepage, printed in startup banners and `--help` text
pub const URL: &str = "https://github.com/kilndb/kiln";

lazy_static::lazy_static! {
    static ref RE: regex::Regex = regex::Regex::from_str(r#"("[^"]*"|'[^']*'|[\S]+)+"#).unwrap();
}

/// Split a line typed at the REPL into whitespace-separated tokens, honoring single
/// and double quoted spans as a single token.
pub fn split_into_args(q: &str) -> Vec<String> {
    RE.find_iter(q)
        .map(|val| val.as_str().replace('\'', "").replace('"', ""))
        .collect()
}

/// Turn a typed line into the raw bytes of an inline wire request: the tokens
/// joined by single spaces and terminated with a CRLF.
pub fn into_raw_query(q: &str) -> Vec<u8> {
    let args = split_into_args(q);
    let mut buf = args.join(" ").into_bytes();
    buf.extend_from_slice(b"\r\n");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_args() {
        assert_eq!(
            split_into_args("SET foo 'bar baz'"),
            vec!["SET", "foo", "bar baz"]
        );
    }

    #[test]
    fn test_into_raw_query() {
        assert_eq!(into_raw_query("PING"), b"PING\r\n".to_vec());
    }
}

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

//! A thin synchronous client for the line-oriented inline/bulk wire protocol:
//! write a raw request, then read back whatever bytes the server sends until
//! it falls quiet for a short grace period. The protocol has no self-describing
//! multi-bulk framing, so a general-purpose shell can't know in advance how
//! many lines a given reply spans; reading "until quiet" is the simplest thing
//! that reads correctly for every reply shape this server produces.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

const READ_GRACE: Duration = Duration::from_millis(80);
const READ_DEADLINE: Duration = Duration::from_secs(10);
const READ_CHUNK: usize = 4 * 1024;

pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Sends one typed REPL line as a raw wire request and returns the reply
    /// bytes read back, decoded lossily as UTF-8.
    pub fn execute(&mut self, line: &str) -> std::io::Result<String> {
        let request = kilncore::into_raw_query(line);
        self.stream.write_all(&request)?;
        let raw = self.read_reply()?;
        Ok(String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_reply(&mut self) -> std::io::Result<Vec<u8>> {
        self.stream.set_read_timeout(Some(READ_GRACE))?;
        let mut out = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        let deadline = Instant::now() + READ_DEADLINE;
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    if out.is_empty() && Instant::now() < deadline {
                        continue;
                    }
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

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

//! Socket helpers, grounded on `anet.c`: non-blocking listen/accept/connect for
//! the reactor, plus a handful of bounded-timeout blocking helpers used only by
//! replication — the one sanctioned place a single fd is allowed to stall the
//! calling code, never the reactor thread as a whole.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use crate::error::{Error, SkyResult};

pub fn tcp_listen(bind: &str, port: u16) -> SkyResult<TcpListener> {
    let listener = TcpListener::bind((bind, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub fn set_nonblocking(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)
}

pub fn set_tcp_nodelay(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)
}

/// Connects to `host:port`, blocking until the connection completes or
/// `timeout` elapses.
pub fn connect_timeout(host: &str, port: u16, timeout: Duration) -> SkyResult<TcpStream> {
    use std::net::ToSocketAddrs;
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::replication(format!("could not resolve {host}:{port}")))?;
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| Error::io_extra(e, format!("connecting to {host}:{port}")))?;
    set_tcp_nodelay(&stream).ok();
    Ok(stream)
}

/// Writes the entire buffer, blocking, aborting with a timeout error once
/// `deadline` passes. Used only by `SYNC` (master side) and master-connect
/// (slave side).
pub fn sync_write(stream: &mut TcpStream, mut buf: &[u8], deadline: Instant) -> SkyResult<()> {
    stream.set_nonblocking(true)?;
    while !buf.is_empty() {
        if Instant::now() >= deadline {
            return Err(Error::replication("sync_write timed out"));
        }
        match stream.write(buf) {
            Ok(0) => return Err(Error::replication("connection closed during sync_write")),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                poll_remaining(stream, deadline, false)?;
            }
            Err(e) => return Err(Error::io_extra(e, "sync_write")),
        }
    }
    Ok(())
}

/// Reads exactly `out.len()` bytes, blocking up to `deadline`.
pub fn sync_read(stream: &mut TcpStream, out: &mut [u8], deadline: Instant) -> SkyResult<()> {
    stream.set_nonblocking(true)?;
    let mut filled = 0;
    while filled < out.len() {
        if Instant::now() >= deadline {
            return Err(Error::replication("sync_read timed out"));
        }
        match stream.read(&mut out[filled..]) {
            Ok(0) => return Err(Error::replication("connection closed during sync_read")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                poll_remaining(stream, deadline, true)?;
            }
            Err(e) => return Err(Error::io_extra(e, "sync_read")),
        }
    }
    Ok(())
}

/// Reads a single CRLF-terminated line, blocking up to `deadline`. Used to read
/// the `<size>\r\n` preamble of a SYNC stream.
pub fn sync_read_line(stream: &mut TcpStream, deadline: Instant) -> SkyResult<String> {
    stream.set_nonblocking(true)?;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if Instant::now() >= deadline {
            return Err(Error::replication("sync_read_line timed out"));
        }
        match stream.read(&mut byte) {
            Ok(0) => return Err(Error::replication("connection closed during sync_read_line")),
            Ok(_) => {
                if byte[0] == b'\n' {
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    break;
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                poll_remaining(stream, deadline, true)?;
            }
            Err(e) => return Err(Error::io_extra(e, "sync_read_line")),
        }
    }
    String::from_utf8(line).map_err(|_| Error::protocol("non-utf8 sync line"))
}

/// Polls in ~1-second quanta so the overall deadline is never undercounted by a
/// single long poll.
fn poll_remaining(stream: &TcpStream, deadline: Instant, readable: bool) -> SkyResult<()> {
    let slice = Duration::from_secs(1).min(deadline.saturating_duration_since(Instant::now()));
    let mut pfd = libc::pollfd {
        fd: stream.as_raw_fd(),
        events: if readable { libc::POLLIN } else { libc::POLLOUT },
        revents: 0,
    };
    let ms = slice.as_millis().min(i32::MAX as u128) as i32;
    let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(Error::io_extra(err, "poll_remaining"));
        }
    }
    Ok(())
}

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

//! Per-client request/reply state machine, wired into the reactor's file
//! events. Request parsing (inline vs. bulk), the reply queue with bounded
//! per-event writes, and idle-timeout bookkeeping all live here; the reactor
//! only ever calls `on_readable`/`on_writable` through the callback this
//! module builds for a client's fd.

use crate::commands::{self, Outcome};
use crate::db::{ReplState, Server};
use crate::reactor::{EventLoop, FileCallback, READABLE, WRITABLE};
use crate::replication;
use log::{info, warn};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;

/// A single read or write callback never moves more than this many bytes,
/// so one very chatty client (e.g. `KEYS *` over loopback) can't starve the
/// other connections the reactor also has to serve this tick.
const MAX_WRITE_PER_EVENT: usize = 64 * 1024;
const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientFlags {
    pub close_pending: bool,
    pub is_slave: bool,
    pub is_master: bool,
}

enum ParseState {
    Line,
    Bulk { argv: Vec<Vec<u8>>, remaining: usize },
}

pub struct Client {
    stream: TcpStream,
    fd: RawFd,
    pub db_index: usize,
    buf: Vec<u8>,
    state: ParseState,
    reply_queue: VecDeque<Vec<u8>>,
    sent_len: usize,
    pub last_interaction: u64,
    pub flags: ClientFlags,
    pub pending_shutdown: bool,
}

impl Client {
    fn new(stream: TcpStream) -> Self {
        let fd = stream.as_raw_fd();
        Self {
            stream,
            fd,
            db_index: 0,
            buf: Vec::new(),
            state: ParseState::Line,
            reply_queue: VecDeque::new(),
            sent_len: 0,
            last_interaction: crate::db::now_unix(),
            flags: ClientFlags::default(),
            pending_shutdown: false,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    fn touch(&mut self) {
        self.last_interaction = crate::db::now_unix();
    }

    fn enqueue(&mut self, bytes: Vec<u8>) {
        self.reply_queue.push_back(bytes);
    }

    pub fn has_reply(&self) -> bool {
        !self.reply_queue.is_empty()
    }

    /// Reads one chunk from the socket and runs it through the request FSM.
    /// Returns `false` when the connection should be torn down.
    pub fn on_readable(&mut self, server: &mut Server) -> bool {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) => return false,
            Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return true,
            Err(_) => return false,
        }
        self.touch();
        self.drain_requests(server);
        true
    }

    /// Drains as many complete requests as the buffer currently holds
    /// before returning, so pipelined commands don't each cost a reactor
    /// round-trip.
    fn drain_requests(&mut self, server: &mut Server) {
        loop {
            let state = std::mem::replace(&mut self.state, ParseState::Line);
            match state {
                ParseState::Line => {
                    let (line, consumed) = match find_line(&self.buf) {
                        Some(v) => v,
                        None => {
                            self.state = ParseState::Line;
                            break;
                        }
                    };
                    let tokens = split_tokens(&self.buf[..line]);
                    self.buf.drain(..consumed);
                    if tokens.is_empty() {
                        continue;
                    }
                    let name = String::from_utf8_lossy(&tokens[0]).to_ascii_uppercase();
                    match commands::lookup(&name) {
                        Some(spec) if spec.bulk => match parse_bulk_len(tokens.last()) {
                            Some(len) => {
                                let argv = tokens[..tokens.len() - 1].to_vec();
                                self.state = ParseState::Bulk {
                                    argv,
                                    remaining: len + 2,
                                };
                            }
                            None => {
                                self.enqueue(crate::reply::error("malformed bulk length"));
                            }
                        },
                        _ => self.dispatch(server, tokens),
                    }
                }
                ParseState::Bulk { argv, remaining } => {
                    if self.buf.len() < remaining {
                        self.state = ParseState::Bulk { argv, remaining };
                        break;
                    }
                    let payload: Vec<u8> = self.buf.drain(..remaining).collect();
                    let mut full = argv;
                    full.push(payload[..remaining - 2].to_vec());
                    self.dispatch(server, full);
                }
            }
        }
    }

    fn dispatch(&mut self, server: &mut Server, argv: Vec<Vec<u8>>) {
        match commands::dispatch(server, &mut self.db_index, &argv) {
            Outcome::Reply(bytes) => self.enqueue(bytes),
            Outcome::SelectDb(idx, bytes) => {
                self.db_index = idx;
                self.enqueue(bytes);
            }
            Outcome::Shutdown(bytes) => {
                self.enqueue(bytes);
                self.pending_shutdown = true;
            }
            Outcome::Sync => match replication::serve_sync(server, &mut self.stream) {
                Ok(()) => {
                    self.flags.is_slave = true;
                    info!("client on fd {} promoted to slave", self.fd);
                }
                Err(e) => {
                    warn!("SYNC failed: {e}");
                    self.flags.close_pending = true;
                }
            },
        }
    }

    /// Writes as much of the queued replies as the socket accepts, up to
    /// `MAX_WRITE_PER_EVENT` bytes. Returns `false` when the connection
    /// should be torn down.
    pub fn on_writable(&mut self) -> bool {
        let mut total_written = 0usize;
        while let Some(front) = self.reply_queue.front() {
            if self.flags.is_master {
                // never talk back to a master connection from the reply path
                self.reply_queue.pop_front();
                self.sent_len = 0;
                continue;
            }
            match self.stream.write(&front[self.sent_len..]) {
                Ok(0) => return false,
                Ok(n) => {
                    self.sent_len += n;
                    total_written += n;
                    if self.sent_len == front.len() {
                        self.reply_queue.pop_front();
                        self.sent_len = 0;
                    }
                    if total_written > MAX_WRITE_PER_EVENT {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return false,
            }
        }
        if total_written > 0 {
            self.touch();
        }
        true
    }

    fn is_idle(&self, now: u64, maxidletime: u64) -> bool {
        !self.flags.is_slave && !self.flags.is_master && now.saturating_sub(self.last_interaction) > maxidletime
    }
}

/// Finds the next line terminator starting at the buffer head. Returns
/// `(line_len, consumed)` where `line_len` excludes any trailing CR and
/// `consumed` includes the LF (and the CR, if present).
fn find_line(buf: &[u8]) -> Option<(usize, usize)> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    if pos > 0 && buf[pos - 1] == b'\r' {
        Some((pos - 1, pos + 1))
    } else {
        Some((pos, pos + 1))
    }
}

fn split_tokens(line: &[u8]) -> Vec<Vec<u8>> {
    line.split(|&b| b == b' ')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_vec())
        .collect()
}

fn parse_bulk_len(last: Option<&Vec<u8>>) -> Option<usize> {
    let token = last?;
    std::str::from_utf8(token).ok()?.parse().ok()
}

/// The live set of connected clients, keyed by file descriptor.
pub struct ClientTable {
    clients: HashMap<RawFd, Client>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn slave_count(&self) -> usize {
        self.clients.values().filter(|c| c.flags.is_slave).count()
    }

    fn close_client(&mut self, event_loop: &mut EventLoop, fd: RawFd) {
        event_loop.delete_file_event(fd, READABLE | WRITABLE);
        self.clients.remove(&fd);
    }

    /// Closes every non-slave client whose last activity is older than
    /// `maxidletime` seconds. Run once every ten cron ticks per the cron
    /// schedule.
    pub fn sweep_idle(&mut self, event_loop: &mut EventLoop, maxidletime: u64) {
        let now = crate::db::now_unix();
        let stale: Vec<RawFd> = self
            .clients
            .iter()
            .filter(|(_, c)| c.is_idle(now, maxidletime))
            .map(|(&fd, _)| fd)
            .collect();
        for fd in stale {
            self.close_client(event_loop, fd);
        }
    }
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the one combined read/write callback installed for a client's fd.
/// The reactor stores a single callback per fd (the mask argument at
/// invocation time says which readiness fired, possibly both at once), so
/// read and write handling live in the same closure rather than as two
/// independently-registered callbacks.
fn make_client_callback(server: Rc<RefCell<Server>>, table: Rc<RefCell<ClientTable>>) -> FileCallback {
    Box::new(move |el, fd, mask| {
        if mask & WRITABLE != 0 {
            let keep_open = match table.borrow_mut().clients.get_mut(&fd) {
                Some(c) => c.on_writable(),
                None => return,
            };
            if !keep_open {
                close_and_maybe_unlink_master(el, &server, &table, fd);
                return;
            }
            let still_has_reply = table.borrow().clients.get(&fd).map(|c| c.has_reply()).unwrap_or(false);
            if !still_has_reply {
                el.delete_file_event(fd, WRITABLE);
            }
            let shutdown = table.borrow().clients.get(&fd).map(|c| c.pending_shutdown).unwrap_or(false);
            if shutdown && !still_has_reply {
                el.stop = true;
                return;
            }
        }
        if mask & READABLE != 0 {
            let keep_open = {
                let mut t = table.borrow_mut();
                let mut s = server.borrow_mut();
                match t.clients.get_mut(&fd) {
                    Some(c) => c.on_readable(&mut s),
                    None => return,
                }
            };
            let (has_reply, close_requested) = match table.borrow().clients.get(&fd) {
                Some(c) => (c.has_reply(), c.flags.close_pending),
                None => (false, false),
            };
            if has_reply {
                let _ = el.create_file_event(fd, WRITABLE, make_client_callback(server.clone(), table.clone()));
            }
            if !keep_open || close_requested {
                close_and_maybe_unlink_master(el, &server, &table, fd);
            }
        }
    })
}

/// Tears `fd` down, and if it was our tracked link to a replication master,
/// flips replication state back to `MustConnect` so cron's next tick retries.
fn close_and_maybe_unlink_master(el: &mut EventLoop, server: &Rc<RefCell<Server>>, table: &Rc<RefCell<ClientTable>>, fd: RawFd) {
    let was_master = table.borrow().clients.get(&fd).map(|c| c.flags.is_master).unwrap_or(false);
    table.borrow_mut().close_client(el, fd);
    if was_master {
        server.borrow_mut().replication.state = ReplState::MustConnect;
        warn!("master link closed, will reconnect");
    }
}

/// Installs the listening socket's accept handler. Each accepted connection
/// gets its own entry in `table` and a read-interest callback built by
/// [`make_client_callback`].
pub fn install_listener(
    event_loop: &mut EventLoop,
    listener: std::net::TcpListener,
    server: Rc<RefCell<Server>>,
    table: Rc<RefCell<ClientTable>>,
) -> io::Result<()> {
    let listener_fd = listener.as_raw_fd();
    event_loop.create_file_event(
        listener_fd,
        READABLE,
        Box::new(move |el, _fd, _mask| loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        warn!("failed to set accepted socket non-blocking: {e}");
                        continue;
                    }
                    crate::netio::set_tcp_nodelay(&stream).ok();
                    let client = Client::new(stream);
                    let fd = client.fd();
                    table.borrow_mut().clients.insert(fd, client);
                    server.borrow_mut().stats.total_connections += 1;
                    if let Err(e) = el.create_file_event(fd, READABLE, make_client_callback(server.clone(), table.clone())) {
                        warn!("failed to register client fd {fd}: {e}");
                        table.borrow_mut().clients.remove(&fd);
                    } else {
                        info!("accepted connection from {addr}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept() failed: {e}");
                    break;
                }
            }
        }),
    )
}

/// Registers a just-synced connection to our replication master as a
/// long-lived client flagged `is_master`, so its eventual closure (master
/// restart, network drop) is observed the same way any other client's
/// disconnect is, and drives replication back to `MustConnect` via
/// [`close_and_maybe_unlink_master`].
pub fn register_master_client(
    event_loop: &mut EventLoop,
    server: Rc<RefCell<Server>>,
    table: Rc<RefCell<ClientTable>>,
    stream: TcpStream,
) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    let mut client = Client::new(stream);
    client.flags.is_master = true;
    let fd = client.fd();
    table.borrow_mut().clients.insert(fd, client);
    event_loop.create_file_event(fd, READABLE, make_client_callback(server, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn connected_pair() -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || listener.accept().unwrap().0);
        let client_side = TcpStream::connect(addr).unwrap();
        let server_side = handle.join().unwrap();
        server_side.set_nonblocking(true).unwrap();
        (Client::new(server_side), client_side)
    }

    fn read_available(stream: &mut TcpStream) -> Vec<u8> {
        thread::sleep(Duration::from_millis(50));
        stream.set_nonblocking(true).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("read failed: {e}"),
            }
        }
        out
    }

    #[test]
    fn test_inline_ping_roundtrip() {
        let (mut server_client, mut client_side) = connected_pair();
        let mut server = Server::new(1, "dump.rdb".into(), std::env::temp_dir().to_string_lossy().to_string());
        client_side.write_all(b"PING\r\n").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(server_client.on_readable(&mut server));
        assert!(server_client.has_reply());
        assert!(server_client.on_writable());
        assert_eq!(read_available(&mut client_side), b"+PONG\r\n".to_vec());
    }

    #[test]
    fn test_pipelined_bulk_and_inline_drain_in_one_read() {
        let (mut server_client, mut client_side) = connected_pair();
        let mut server = Server::new(1, "dump.rdb".into(), std::env::temp_dir().to_string_lossy().to_string());
        client_side.write_all(b"SET k 3\r\nabc\r\nGET k\r\n").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(server_client.on_readable(&mut server));
        assert_eq!(server_client.reply_queue.len(), 2);
        assert!(server_client.on_writable());
        assert_eq!(read_available(&mut client_side), b"+OK\r\n3\r\nabc\r\n".to_vec());
    }

    #[test]
    fn test_malformed_bulk_length_reports_protocol_error() {
        let (mut server_client, _client_side) = connected_pair();
        let mut server = Server::new(1, "dump.rdb".into(), std::env::temp_dir().to_string_lossy().to_string());
        server_client.buf.extend_from_slice(b"SET k notanumber\r\n");
        server_client.drain_requests(&mut server);
        assert_eq!(server_client.reply_queue.len(), 1);
        assert!(server_client.reply_queue.front().unwrap().starts_with(b"-ERR"));
    }

    #[test]
    fn test_idle_detection() {
        let (mut c, _s) = connected_pair();
        c.last_interaction = crate::db::now_unix().saturating_sub(3600);
        assert!(c.is_idle(crate::db::now_unix(), 300));
        c.flags.is_slave = true;
        assert!(!c.is_idle(crate::db::now_unix(), 300));
    }
}

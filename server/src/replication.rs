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

//! Full-snapshot master/slave replication: one shot, no incremental command
//! stream. A slave issuing `SYNC` gets the master's whole dataset as
//! `<size>\r\n` followed by that many raw snapshot bytes; this mirrors
//! `syncCommand`/`syncWithMaster` in the original, minus the original's
//! incremental-vs-full-resync negotiation (out of scope here).

use crate::client::{self, ClientTable};
use crate::db::{ReplState, Server};
use crate::error::{Error, SkyResult};
use crate::netio;
use crate::reactor::EventLoop;
use crate::snapshot;
use log::{info, warn};
use std::cell::RefCell;
use std::io::Write;
use std::net::TcpStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

const SYNC_TIMEOUT: Duration = Duration::from_secs(60);

/// Master side of `SYNC`: streams the whole dataset to `stream` and bumps the
/// slave count for the duration of the call. The caller is responsible for
/// treating the connection as a long-lived slave link afterwards.
pub fn serve_sync(server: &mut Server, stream: &mut TcpStream) -> SkyResult<()> {
    let mut buf = Vec::new();
    snapshot::encode_to_writer(server, &mut buf).map_err(Error::from)?;
    let deadline = Instant::now() + SYNC_TIMEOUT;
    let header = format!("{}\r\n", buf.len());
    netio::sync_write(stream, header.as_bytes(), deadline)?;
    netio::sync_write(stream, &buf, deadline)?;
    netio::sync_write(stream, b"\r\n", deadline)?;
    server.replication.slave_count += 1;
    info!("Synchronization with replica succeeded");
    Ok(())
}

/// Slave side: connects to the configured master, issues `SYNC`, streams the
/// reply to a temp file, renames it over the local dump file, and reloads.
/// Returns the still-open socket so the caller can keep it as a tracked
/// master-link client rather than dropping it at the end of this call.
pub fn sync_with_master(server: &mut Server, host: &str, port: u16) -> SkyResult<TcpStream> {
    let mut stream = netio::connect_timeout(host, port, SYNC_TIMEOUT)?;
    let deadline = Instant::now() + SYNC_TIMEOUT;
    netio::sync_write(&mut stream, b"SYNC\r\n", deadline)?;
    let size_line = netio::sync_read_line(&mut stream, deadline)?;
    let size: usize = size_line
        .trim()
        .parse()
        .map_err(|_| Error::replication(format!("bad SYNC size header '{size_line}'")))?;
    let mut payload = vec![0u8; size];
    netio::sync_read(&mut stream, &mut payload, deadline)?;
    let mut trailer = [0u8; 2];
    netio::sync_read(&mut stream, &mut trailer, deadline)?;

    let tmp_path = server.dump_path().with_extension("sync-tmp");
    {
        let mut f = std::fs::File::create(&tmp_path).map_err(|e| Error::io_extra(e, tmp_path.display().to_string()))?;
        f.write_all(&payload).map_err(Error::from)?;
        f.sync_all().map_err(Error::from)?;
    }
    let dump_path = server.dump_path();
    std::fs::rename(&tmp_path, &dump_path).map_err(|e| Error::io_extra(e, dump_path.display().to_string()))?;
    snapshot::load(server, &dump_path)?;

    server.replication.state = ReplState::Connected;
    server.replication.master_host = Some(host.to_string());
    server.replication.master_port = port;
    info!("MASTER <-> SLAVE sync: Finished with success");
    Ok(stream)
}

/// Attempts the initial/reconnect sync for a slave whose state is
/// `MustConnect`, logging and leaving the state untouched on failure so cron
/// retries on its next tick. On success, registers the synced socket as a
/// tracked master-link client (see [`client::register_master_client`]) so its
/// closure is observed and drives the state back to `MustConnect`.
pub fn try_connect_to_master(el: &mut EventLoop, server: &Rc<RefCell<Server>>, table: &Rc<RefCell<ClientTable>>) {
    let (host, port) = {
        let s = server.borrow();
        if s.replication.state != ReplState::MustConnect {
            return;
        }
        match s.replication.master_host.clone() {
            Some(h) => (h, s.replication.master_port),
            None => return,
        }
    };
    let stream = {
        let mut s = server.borrow_mut();
        match sync_with_master(&mut s, &host, port) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("MASTER <-> SLAVE sync failed: {e}");
                return;
            }
        }
    };
    if let Err(e) = client::register_master_client(el, server.clone(), table.clone(), stream) {
        warn!("failed to register master link as a client: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::create_string;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_sync_roundtrip_over_loopback() {
        let dir = std::env::temp_dir().join(format!("kiln-repl-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut master = Server::new(1, "dump.rdb".into(), dir.to_string_lossy().to_string());
        master.databases[0].set(b"greeting", create_string(b"hello"));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_nonblocking(false).unwrap();
            let mut discard = [0u8; 64];
            let _ = std::io::Read::read(&mut stream, &mut discard);
            stream.set_nonblocking(true).unwrap();
            serve_sync(&mut master, &mut stream).unwrap();
        });

        let mut slave = Server::new(1, "dump.rdb".into(), dir.to_string_lossy().to_string());
        sync_with_master(&mut slave, &addr.ip().to_string(), addr.port()).unwrap();
        handle.join().unwrap();

        assert_eq!(
            slave.databases[0].get(b"greeting").unwrap().as_str().unwrap().as_bytes(),
            b"hello"
        );
        assert_eq!(slave.replication.role(), "slave");

        std::fs::remove_dir_all(&dir).ok();
    }
}

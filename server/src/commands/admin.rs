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

use crate::db::Server;
use crate::reply;
use crate::snapshot;

pub fn save(server: &mut Server) -> Vec<u8> {
    match snapshot::save(server) {
        Ok(()) => reply::ok(),
        Err(e) => reply::error(&e.to_string()),
    }
}

pub fn bgsave(server: &mut Server) -> Vec<u8> {
    match snapshot::bgsave(server) {
        Ok(()) => reply::status("Background saving started"),
        Err(e) => reply::error(&e.to_string()),
    }
}

pub fn lastsave(server: &Server) -> Vec<u8> {
    reply::integer(server.lastsave as i64)
}

pub fn shutdown(server: &mut Server) -> Vec<u8> {
    let _ = snapshot::save(server);
    reply::ok()
}

pub fn info(server: &Server) -> Vec<u8> {
    let uptime = crate::db::now_unix().saturating_sub(server.stats.start_time);
    let mut out = String::new();
    out.push_str(&format!("kiln_version:{}\r\n", kilncore::VERSION));
    out.push_str(&format!("role:{}\r\n", server.replication.role()));
    out.push_str(&format!("connected_slaves:{}\r\n", server.replication.slave_count));
    out.push_str(&format!("uptime_in_seconds:{uptime}\r\n"));
    out.push_str(&format!("total_connections_received:{}\r\n", server.stats.total_connections));
    out.push_str(&format!("total_commands_processed:{}\r\n", server.stats.total_commands));
    out.push_str(&format!("used_memory:{}\r\n", crate::alloc::live_bytes()));
    out.push_str(&format!("changes_since_last_save:{}\r\n", server.dirty));
    out.push_str(&format!("bgsave_in_progress:{}\r\n", server.bgsave_in_progress as u8));
    out.push_str(&format!("last_save_time:{}\r\n", server.lastsave));
    out.push_str(&format!("db_count:{}\r\n", server.databases.len()));
    for (i, db) in server.databases.iter().enumerate() {
        if !db.is_empty() {
            out.push_str(&format!("db{i}:keys={}\r\n", db.len()));
        }
    }
    reply::bulk(out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lastsave_reflects_save_time() {
        let mut s = Server::new(1, "dump.rdb".into(), std::env::temp_dir().to_string_lossy().to_string());
        let before = s.lastsave;
        std::thread::sleep(std::time::Duration::from_millis(1100));
        save(&mut s);
        assert!(s.lastsave >= before);
    }

    #[test]
    fn test_info_contains_role() {
        let s = Server::new(1, "dump.rdb".into(), ".".into());
        let r = info(&s);
        let text = String::from_utf8_lossy(&r);
        assert!(text.contains("role:master"));
    }
}

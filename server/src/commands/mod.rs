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

//! Command dispatch table, following the `queryengine/mod.rs` `tags` module +
//! `gen_match!` macro idiom (adapted here to synchronous handlers — no
//! `.await`, since the whole core runs on one reactor thread).

mod admin;
mod generic;
mod lists;
mod sets;
mod strings;

use crate::db::Server;

/// What a command handler produced, beyond the reply bytes that always go on
/// the client's queue.
pub enum Outcome {
    Reply(Vec<u8>),
    SelectDb(usize, Vec<u8>),
    Shutdown(Vec<u8>),
    /// SYNC is handled specially by the caller: it needs the raw client stream,
    /// not just a reply buffer.
    Sync,
}

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Positive: exact argc (including the command name). Negative: at least
    /// `|arity|`.
    pub arity: i32,
    /// Whether the final argument is a bulk (length-prefixed) payload.
    pub bulk: bool,
}

macro_rules! spec {
    ($name:expr, $arity:expr, $bulk:expr) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            bulk: $bulk,
        }
    };
}

pub const COMMAND_TABLE: &[CommandSpec] = &[
    spec!("PING", 1, false),
    spec!("ECHO", 2, true),
    spec!("SET", 3, true),
    spec!("SETNX", 3, true),
    spec!("APPEND", 3, true),
    spec!("STRLEN", 2, false),
    spec!("GET", 2, false),
    spec!("DEL", 2, false),
    spec!("EXISTS", 2, false),
    spec!("INCR", 2, false),
    spec!("DECR", 2, false),
    spec!("INCRBY", 3, false),
    spec!("DECRBY", 3, false),
    spec!("KEYS", 2, false),
    spec!("RANDOMKEY", 1, false),
    spec!("DBSIZE", 1, false),
    spec!("TYPE", 2, false),
    spec!("SELECT", 2, false),
    spec!("MOVE", 3, false),
    spec!("RENAME", 3, false),
    spec!("RENAMENX", 3, false),
    spec!("LPUSH", 3, true),
    spec!("RPUSH", 3, true),
    spec!("LPOP", 2, false),
    spec!("RPOP", 2, false),
    spec!("LLEN", 2, false),
    spec!("LINDEX", 3, false),
    spec!("LSET", 4, true),
    spec!("LRANGE", 4, false),
    spec!("LTRIM", 4, false),
    spec!("LREM", 4, true),
    spec!("SADD", 3, true),
    spec!("SREM", 3, true),
    spec!("SISMEMBER", 3, true),
    spec!("SCARD", 2, false),
    spec!("SINTER", -2, false),
    spec!("SINTERSTORE", -3, false),
    spec!("SAVE", 1, false),
    spec!("BGSAVE", 1, false),
    spec!("LASTSAVE", 1, false),
    spec!("SHUTDOWN", 1, false),
    spec!("FLUSHDB", 1, false),
    spec!("FLUSHALL", 1, false),
    spec!("SORT", -2, false),
    spec!("INFO", 1, false),
    spec!("SYNC", 1, false),
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    let upper = name.to_ascii_uppercase();
    COMMAND_TABLE.iter().find(|c| c.name == upper)
}

fn arity_ok(spec: &CommandSpec, argc: usize) -> bool {
    if spec.arity >= 0 {
        argc == spec.arity as usize
    } else {
        argc >= (-spec.arity) as usize
    }
}

/// Executes one already-fully-parsed request. `db_index` is the client's
/// currently selected database, passed by reference since SELECT/MOVE mutate
/// it.
pub fn dispatch(server: &mut Server, db_index: &mut usize, argv: &[Vec<u8>]) -> Outcome {
    if argv.is_empty() {
        return Outcome::Reply(crate::reply::error("empty request"));
    }
    let name = String::from_utf8_lossy(&argv[0]).to_ascii_uppercase();
    let spec = match lookup(&name) {
        Some(s) => s,
        None => return Outcome::Reply(crate::reply::error("unknown command")),
    };
    if !arity_ok(spec, argv.len()) {
        return Outcome::Reply(crate::reply::error("wrong number of arguments"));
    }
    server.stats.total_commands += 1;
    match spec.name {
        "PING" => Outcome::Reply(crate::reply::pong()),
        "ECHO" => Outcome::Reply(crate::reply::bulk(&argv[1])),
        "SET" => Outcome::Reply(strings::set(server, *db_index, &argv[1], &argv[2])),
        "SETNX" => Outcome::Reply(strings::setnx(server, *db_index, &argv[1], &argv[2])),
        "APPEND" => Outcome::Reply(strings::append(server, *db_index, &argv[1], &argv[2])),
        "STRLEN" => Outcome::Reply(strings::strlen(server, *db_index, &argv[1])),
        "GET" => Outcome::Reply(strings::get(server, *db_index, &argv[1])),
        "DEL" => Outcome::Reply(generic::del(server, *db_index, &argv[1])),
        "EXISTS" => Outcome::Reply(generic::exists(server, *db_index, &argv[1])),
        "INCR" => Outcome::Reply(strings::incrby(server, *db_index, &argv[1], 1)),
        "DECR" => Outcome::Reply(strings::incrby(server, *db_index, &argv[1], -1)),
        "INCRBY" => Outcome::Reply(strings::incrby_arg(server, *db_index, &argv[1], &argv[2], 1)),
        "DECRBY" => Outcome::Reply(strings::incrby_arg(server, *db_index, &argv[1], &argv[2], -1)),
        "KEYS" => Outcome::Reply(generic::keys(server, *db_index, &argv[1])),
        "RANDOMKEY" => Outcome::Reply(generic::randomkey(server, *db_index)),
        "DBSIZE" => Outcome::Reply(generic::dbsize(server, *db_index)),
        "TYPE" => Outcome::Reply(generic::type_of(server, *db_index, &argv[1])),
        "SELECT" => generic::select(server, &argv[1]),
        "MOVE" => Outcome::Reply(generic::mv(server, db_index, &argv[1], &argv[2])),
        "RENAME" => Outcome::Reply(generic::rename(server, *db_index, &argv[1], &argv[2], false)),
        "RENAMENX" => Outcome::Reply(generic::rename(server, *db_index, &argv[1], &argv[2], true)),
        "LPUSH" => Outcome::Reply(lists::push(server, *db_index, &argv[1], &argv[2], true)),
        "RPUSH" => Outcome::Reply(lists::push(server, *db_index, &argv[1], &argv[2], false)),
        "LPOP" => Outcome::Reply(lists::pop(server, *db_index, &argv[1], true)),
        "RPOP" => Outcome::Reply(lists::pop(server, *db_index, &argv[1], false)),
        "LLEN" => Outcome::Reply(lists::llen(server, *db_index, &argv[1])),
        "LINDEX" => Outcome::Reply(lists::lindex(server, *db_index, &argv[1], &argv[2])),
        "LSET" => Outcome::Reply(lists::lset(server, *db_index, &argv[1], &argv[2], &argv[3])),
        "LRANGE" => Outcome::Reply(lists::lrange(server, *db_index, &argv[1], &argv[2], &argv[3])),
        "LTRIM" => Outcome::Reply(lists::ltrim(server, *db_index, &argv[1], &argv[2], &argv[3])),
        "LREM" => Outcome::Reply(lists::lrem(server, *db_index, &argv[1], &argv[2], &argv[3])),
        "SADD" => Outcome::Reply(sets::sadd(server, *db_index, &argv[1], &argv[2])),
        "SREM" => Outcome::Reply(sets::srem(server, *db_index, &argv[1], &argv[2])),
        "SISMEMBER" => Outcome::Reply(sets::sismember(server, *db_index, &argv[1], &argv[2])),
        "SCARD" => Outcome::Reply(sets::scard(server, *db_index, &argv[1])),
        "SINTER" => Outcome::Reply(sets::sinter(server, *db_index, &argv[1..])),
        "SINTERSTORE" => Outcome::Reply(sets::sinterstore(server, *db_index, &argv[1], &argv[2..])),
        "SAVE" => Outcome::Reply(admin::save(server)),
        "BGSAVE" => Outcome::Reply(admin::bgsave(server)),
        "LASTSAVE" => Outcome::Reply(admin::lastsave(server)),
        "SHUTDOWN" => Outcome::Shutdown(admin::shutdown(server)),
        "FLUSHDB" => Outcome::Reply(generic::flushdb(server, *db_index)),
        "FLUSHALL" => Outcome::Reply(generic::flushall(server)),
        "SORT" => Outcome::Reply(generic::sort(server, *db_index, &argv[1..])),
        "INFO" => Outcome::Reply(admin::info(server)),
        "SYNC" => Outcome::Sync,
        _ => Outcome::Reply(crate::reply::error("unknown command")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert!(lookup("get").is_some());
        assert!(lookup("GET").is_some());
        assert!(lookup("nonexistent").is_none());
    }

    #[test]
    fn test_arity_checks() {
        let mut server = Server::new(1, "dump.rdb".into(), ".".into());
        let mut dbidx = 0usize;
        let out = dispatch(&mut server, &mut dbidx, &[b"GET".to_vec()]);
        match out {
            Outcome::Reply(r) => assert!(r.starts_with(b"-ERR")),
            _ => panic!("expected error reply"),
        }
    }

    #[test]
    fn test_ping() {
        let mut server = Server::new(1, "dump.rdb".into(), ".".into());
        let mut dbidx = 0usize;
        let out = dispatch(&mut server, &mut dbidx, &[b"PING".to_vec()]);
        match out {
            Outcome::Reply(r) => assert_eq!(r, b"+PONG\r\n"),
            _ => panic!("expected reply"),
        }
    }
}

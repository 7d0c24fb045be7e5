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
use crate::object::{create_string, ObjType};
use crate::reply;

pub fn get(server: &Server, db: usize, key: &[u8]) -> Vec<u8> {
    match server.databases[db].get(key) {
        None => reply::nil(),
        Some(obj) => match obj.as_str() {
            Some(s) => reply::bulk(s.as_bytes()),
            None => reply::wrong_type(),
        },
    }
}

pub fn set(server: &mut Server, db: usize, key: &[u8], value: &[u8]) -> Vec<u8> {
    server.databases[db].set(key, create_string(value));
    server.mark_dirty();
    reply::ok()
}

pub fn setnx(server: &mut Server, db: usize, key: &[u8], value: &[u8]) -> Vec<u8> {
    if server.databases[db].exists(key) {
        return reply::integer(0);
    }
    server.databases[db].set(key, create_string(value));
    server.mark_dirty();
    reply::integer(1)
}

pub fn append(server: &mut Server, db: usize, key: &[u8], value: &[u8]) -> Vec<u8> {
    let existing = server.databases[db].get(key).cloned();
    match existing {
        None => {
            server.databases[db].set(key, create_string(value));
            server.mark_dirty();
            reply::integer(value.len() as i64)
        }
        Some(obj) => match obj.obj_type() {
            ObjType::Str => {
                let mut buf = obj.as_str().unwrap().as_bytes().to_vec();
                buf.extend_from_slice(value);
                let new_len = buf.len();
                obj.set_str(buf);
                server.mark_dirty();
                reply::integer(new_len as i64)
            }
            _ => reply::wrong_type(),
        },
    }
}

pub fn strlen(server: &Server, db: usize, key: &[u8]) -> Vec<u8> {
    match server.databases[db].get(key) {
        None => reply::integer(0),
        Some(obj) => match obj.as_str() {
            Some(s) => reply::integer(s.len() as i64),
            None => reply::wrong_type(),
        },
    }
}

/// INCR/DECR/INCRBY/DECRBY share this core. A non-STRING key is treated as
/// absent (parses as 0) rather than erroring — an intentionally-followed quirk
/// of the system this behavior is modeled on.
pub fn incrby(server: &mut Server, db: usize, key: &[u8], delta: i64) -> Vec<u8> {
    let current = server.databases[db]
        .get(key)
        .and_then(|o| o.as_str().and_then(|s| s.parse_i64()))
        .unwrap_or(0);
    let next = match current.checked_add(delta) {
        Some(n) => n,
        None => return reply::error("increment or decrement would overflow"),
    };
    server.databases[db].set(key, create_string(next.to_string().as_bytes()));
    server.mark_dirty();
    reply::integer(next)
}

pub fn incrby_arg(server: &mut Server, db: usize, key: &[u8], arg: &[u8], sign: i64) -> Vec<u8> {
    match std::str::from_utf8(arg).ok().and_then(|s| s.parse::<i64>().ok()) {
        Some(n) => incrby(server, db, key, n * sign),
        None => reply::error("value is not an integer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        set(&mut s, 0, b"k", b"v");
        assert_eq!(get(&s, 0, b"k"), reply::bulk(b"v"));
    }

    #[test]
    fn test_setnx() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        assert_eq!(setnx(&mut s, 0, b"k", b"v1"), reply::integer(1));
        assert_eq!(setnx(&mut s, 0, b"k", b"v2"), reply::integer(0));
        assert_eq!(get(&s, 0, b"k"), reply::bulk(b"v1"));
    }

    #[test]
    fn test_append_creates_then_appends() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        assert_eq!(append(&mut s, 0, b"k", b"foo"), reply::integer(3));
        assert_eq!(append(&mut s, 0, b"k", b"bar"), reply::integer(6));
        assert_eq!(get(&s, 0, b"k"), reply::bulk(b"foobar"));
    }

    #[test]
    fn test_incr_on_absent_key_starts_at_zero() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        assert_eq!(incrby(&mut s, 0, b"counter", 1), reply::integer(1));
        assert_eq!(incrby(&mut s, 0, b"counter", 1), reply::integer(2));
    }

    #[test]
    fn test_incr_on_non_string_resets_to_zero_then_increments() {
        // a non-STRING key is treated as absent, matching incrby's documented quirk
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        s.databases[0].set(b"l", crate::object::create_list());
        assert_eq!(incrby(&mut s, 0, b"l", 1), reply::integer(1));
    }

    #[test]
    fn test_incrby_arg_rejects_non_integer() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        let r = incrby_arg(&mut s, 0, b"k", b"nope", 1);
        assert!(r.starts_with(b"-ERR"));
    }
}

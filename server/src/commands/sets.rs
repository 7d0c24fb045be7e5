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
use crate::dstring::DStr;
use crate::object::{create_set, ObjType};
use crate::reply;

pub fn sadd(server: &mut Server, db: usize, key: &[u8], member: &[u8]) -> Vec<u8> {
    let obj = match server.databases[db].get(key).cloned() {
        Some(o) => o,
        None => {
            let s = create_set();
            server.databases[db].set(key, s.clone());
            s
        }
    };
    if obj.obj_type() != ObjType::Set {
        return reply::wrong_type();
    }
    let added = obj
        .with_set_mut(|set| set.replace(DStr::from_slice(member), ()).is_none())
        .unwrap();
    if added {
        server.mark_dirty();
        reply::integer(1)
    } else {
        reply::integer(0)
    }
}

pub fn srem(server: &mut Server, db: usize, key: &[u8], member: &[u8]) -> Vec<u8> {
    let obj = match server.databases[db].get(key).cloned() {
        Some(o) => o,
        None => return reply::integer(0),
    };
    if obj.obj_type() != ObjType::Set {
        return reply::wrong_type();
    }
    let removed = obj
        .with_set_mut(|set| set.remove(&DStr::from_slice(member)).is_some())
        .unwrap();
    if removed {
        server.mark_dirty();
        let now_empty = obj.with_set(|s| s.is_empty()).unwrap_or(true);
        if now_empty {
            server.databases[db].remove(key);
        }
        reply::integer(1)
    } else {
        reply::integer(0)
    }
}

pub fn sismember(server: &Server, db: usize, key: &[u8], member: &[u8]) -> Vec<u8> {
    match server.databases[db].get(key) {
        None => reply::integer(0),
        Some(obj) => match obj.with_set(|set| set.contains(&DStr::from_slice(member))) {
            Some(true) => reply::integer(1),
            Some(false) => reply::integer(0),
            None => reply::wrong_type(),
        },
    }
}

pub fn scard(server: &Server, db: usize, key: &[u8]) -> Vec<u8> {
    match server.databases[db].get(key) {
        None => reply::integer(0),
        Some(obj) => match obj.with_set(|s| s.len()) {
            Some(n) => reply::integer(n as i64),
            None => reply::wrong_type(),
        },
    }
}

/// Collects the member set for a SET-typed key, erroring out on a different type
/// and returning an empty set for an absent key.
fn members_of(server: &Server, db: usize, key: &[u8]) -> Result<Vec<DStr>, Vec<u8>> {
    match server.databases[db].get(key) {
        None => Ok(Vec::new()),
        Some(obj) => match obj.obj_type() {
            ObjType::Set => Ok(obj.with_set(|s| s.keys().cloned().collect()).unwrap()),
            _ => Err(reply::wrong_type()),
        },
    }
}

/// Intersects all given keys' sets. Sorts by set size ascending and iterates the
/// smallest one first, checking membership in the rest, to minimize comparisons.
fn intersect(server: &Server, db: usize, keys: &[Vec<u8>]) -> Result<Vec<DStr>, Vec<u8>> {
    let mut sets = Vec::with_capacity(keys.len());
    for k in keys {
        sets.push(members_of(server, db, k)?);
    }
    if sets.iter().any(|s| s.is_empty()) {
        return Ok(Vec::new());
    }
    let mut order: Vec<usize> = (0..sets.len()).collect();
    order.sort_by_key(|&i| sets[i].len());
    let (smallest, rest) = order.split_first().unwrap();
    let candidates = &sets[*smallest];
    let mut out = Vec::new();
    'outer: for member in candidates {
        for &idx in rest {
            if !sets[idx].contains(member) {
                continue 'outer;
            }
        }
        out.push(member.clone());
    }
    Ok(out)
}

pub fn sinter(server: &Server, db: usize, keys: &[Vec<u8>]) -> Vec<u8> {
    match intersect(server, db, keys) {
        Ok(members) => reply::multi(&members.into_iter().map(|m| m.into_vec()).collect::<Vec<_>>()),
        Err(e) => e,
    }
}

pub fn sinterstore(server: &mut Server, db: usize, dest: &[u8], keys: &[Vec<u8>]) -> Vec<u8> {
    let members = match intersect(server, db, keys) {
        Ok(m) => m,
        Err(e) => return e,
    };
    let new_set = create_set();
    let count = members.len();
    new_set.with_set_mut(|s| {
        for m in members {
            s.replace(m, ());
        }
    });
    if count == 0 {
        server.databases[db].remove(dest);
    } else {
        server.databases[db].set(dest, new_set);
    }
    server.mark_dirty();
    reply::integer(count as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sadd_is_idempotent() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        assert_eq!(sadd(&mut s, 0, b"s", b"a"), reply::integer(1));
        assert_eq!(sadd(&mut s, 0, b"s", b"a"), reply::integer(0));
        assert_eq!(scard(&s, 0, b"s"), reply::integer(1));
    }

    #[test]
    fn test_srem_empties_key() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        sadd(&mut s, 0, b"s", b"a");
        assert_eq!(srem(&mut s, 0, b"s", b"a"), reply::integer(1));
        assert_eq!(scard(&s, 0, b"s"), reply::integer(0));
    }

    #[test]
    fn test_sismember() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        sadd(&mut s, 0, b"s", b"a");
        assert_eq!(sismember(&s, 0, b"s", b"a"), reply::integer(1));
        assert_eq!(sismember(&s, 0, b"s", b"b"), reply::integer(0));
    }

    #[test]
    fn test_sinter_and_sinterstore() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        for m in [b"a".as_slice(), b"b", b"c"] {
            sadd(&mut s, 0, b"x", m);
        }
        for m in [b"b".as_slice(), b"c", b"d"] {
            sadd(&mut s, 0, b"y", m);
        }
        let mut r = match intersect(&s, 0, &[b"x".to_vec(), b"y".to_vec()]) {
            Ok(v) => v.into_iter().map(|d| d.into_vec()).collect::<Vec<_>>(),
            Err(_) => panic!("unexpected wrong type"),
        };
        r.sort();
        assert_eq!(r, vec![b"b".to_vec(), b"c".to_vec()]);

        assert_eq!(sinterstore(&mut s, 0, b"z", &[b"x".to_vec(), b"y".to_vec()]), reply::integer(2));
        assert_eq!(scard(&s, 0, b"z"), reply::integer(2));
    }

    #[test]
    fn test_sinter_with_empty_set_is_empty() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        sadd(&mut s, 0, b"x", b"a");
        assert_eq!(sinter(&s, 0, &[b"x".to_vec(), b"missing".to_vec()]), reply::multi(&[]));
    }
}

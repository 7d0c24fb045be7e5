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
use crate::object::{create_list, create_string, ObjType};
use crate::reply;

fn parse_index(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

pub fn push(server: &mut Server, db: usize, key: &[u8], value: &[u8], front: bool) -> Vec<u8> {
    let obj = match server.databases[db].get(key).cloned() {
        Some(o) => o,
        None => {
            let l = create_list();
            server.databases[db].set(key, l.clone());
            l
        }
    };
    if obj.obj_type() != ObjType::List {
        return reply::wrong_type();
    }
    let new_len = obj
        .with_list_mut(|l| {
            if front {
                l.push_front(create_string(value));
            } else {
                l.push_back(create_string(value));
            }
            l.len()
        })
        .unwrap();
    server.mark_dirty();
    reply::integer(new_len as i64)
}

pub fn pop(server: &mut Server, db: usize, key: &[u8], front: bool) -> Vec<u8> {
    let obj = match server.databases[db].get(key).cloned() {
        Some(o) => o,
        None => return reply::nil(),
    };
    if obj.obj_type() != ObjType::List {
        return reply::wrong_type();
    }
    let popped = obj
        .with_list_mut(|l| if front { l.pop_front() } else { l.pop_back() })
        .unwrap();
    match popped {
        Some(item) => {
            let bytes = item.as_str().map(|s| s.as_bytes().to_vec()).unwrap_or_default();
            let now_empty = obj.with_list(|l| l.is_empty()).unwrap_or(true);
            if now_empty {
                server.databases[db].remove(key);
            }
            server.mark_dirty();
            reply::bulk(&bytes)
        }
        None => reply::nil(),
    }
}

pub fn llen(server: &Server, db: usize, key: &[u8]) -> Vec<u8> {
    match server.databases[db].get(key) {
        None => reply::integer(0),
        Some(obj) => match obj.with_list(|l| l.len()) {
            Some(n) => reply::integer(n as i64),
            None => reply::wrong_type(),
        },
    }
}

pub fn lindex(server: &Server, db: usize, key: &[u8], idx_arg: &[u8]) -> Vec<u8> {
    let idx = match parse_index(idx_arg) {
        Some(i) => i,
        None => return reply::error("value is not an integer"),
    };
    match server.databases[db].get(key) {
        None => reply::nil(),
        Some(obj) => match obj.with_list(|l| l.get(idx).cloned()) {
            None => reply::wrong_type(),
            Some(None) => reply::nil(),
            Some(Some(item)) => reply::bulk(item.as_str().map(|s| s.as_bytes().to_vec()).unwrap_or_default().as_slice()),
        },
    }
}

pub fn lset(server: &mut Server, db: usize, key: &[u8], idx_arg: &[u8], value: &[u8]) -> Vec<u8> {
    let idx = match parse_index(idx_arg) {
        Some(i) => i,
        None => return reply::error("value is not an integer"),
    };
    match server.databases[db].get(key).cloned() {
        None => reply::error("no such key"),
        Some(obj) => match obj.with_list_mut(|l| l.set(idx, create_string(value))) {
            None => reply::wrong_type(),
            Some(Ok(())) => {
                server.mark_dirty();
                reply::ok()
            }
            Some(Err(())) => reply::error("index out of range"),
        },
    }
}

pub fn lrange(server: &Server, db: usize, key: &[u8], start_arg: &[u8], end_arg: &[u8]) -> Vec<u8> {
    let (start, end) = match (parse_index(start_arg), parse_index(end_arg)) {
        (Some(s), Some(e)) => (s, e),
        _ => return reply::error("value is not an integer"),
    };
    match server.databases[db].get(key) {
        None => reply::multi(&[]),
        Some(obj) => match obj.with_list(|l| {
            l.range(start, end)
                .into_iter()
                .map(|o| o.as_str().map(|s| s.as_bytes().to_vec()).unwrap_or_default())
                .collect::<Vec<_>>()
        }) {
            None => reply::wrong_type(),
            Some(items) => reply::multi(&items),
        },
    }
}

pub fn ltrim(server: &mut Server, db: usize, key: &[u8], start_arg: &[u8], end_arg: &[u8]) -> Vec<u8> {
    let (start, end) = match (parse_index(start_arg), parse_index(end_arg)) {
        (Some(s), Some(e)) => (s, e),
        _ => return reply::error("value is not an integer"),
    };
    match server.databases[db].get(key).cloned() {
        None => reply::ok(),
        Some(obj) => {
            if obj.obj_type() != ObjType::List {
                return reply::wrong_type();
            }
            obj.with_list_mut(|l| l.trim(start, end));
            let now_empty = obj.with_list(|l| l.is_empty()).unwrap_or(true);
            if now_empty {
                server.databases[db].remove(key);
            }
            server.mark_dirty();
            reply::ok()
        }
    }
}

pub fn lrem(server: &mut Server, db: usize, key: &[u8], count_arg: &[u8], value: &[u8]) -> Vec<u8> {
    let count = match parse_index(count_arg) {
        Some(c) => c,
        None => return reply::error("value is not an integer"),
    };
    match server.databases[db].get(key).cloned() {
        None => reply::integer(0),
        Some(obj) => {
            if obj.obj_type() != ObjType::List {
                return reply::wrong_type();
            }
            // DList::remove_matching requires T: PartialEq, which Obj (an Rc over
            // interior-mutable payloads) doesn't implement; compare by content here.
            let removed = obj
                .with_list_mut(|l| {
                    let items: Vec<_> = l.iter().cloned().collect();
                    let mut kept = crate::dlist::DList::new();
                    let mut removed = 0usize;
                    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
                    if count >= 0 {
                        for item in items {
                            let matches = item.as_str().map(|s| s.as_bytes() == value).unwrap_or(false);
                            if matches && removed < limit {
                                removed += 1;
                            } else {
                                kept.push_back(item);
                            }
                        }
                    } else {
                        for item in items.into_iter().rev() {
                            let matches = item.as_str().map(|s| s.as_bytes() == value).unwrap_or(false);
                            if matches && removed < limit {
                                removed += 1;
                            } else {
                                kept.push_front(item);
                            }
                        }
                    }
                    *l = kept;
                    removed
                })
                .unwrap_or(0);
            if removed > 0 {
                server.mark_dirty();
            }
            let now_empty = obj.with_list(|l| l.is_empty()).unwrap_or(true);
            if now_empty {
                server.databases[db].remove(key);
            }
            reply::integer(removed as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_rotation() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        push(&mut s, 0, b"l", b"a", false);
        push(&mut s, 0, b"l", b"b", false);
        push(&mut s, 0, b"l", b"c", false);
        assert_eq!(lrange(&s, 0, b"l", b"0", b"-1"), reply::multi(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]));
        assert_eq!(pop(&mut s, 0, b"l", true), reply::bulk(b"a"));
        assert_eq!(llen(&s, 0, b"l"), reply::integer(2));
    }

    #[test]
    fn test_lrem_from_head() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        for v in [b"1".as_slice(), b"2", b"1", b"3", b"1"] {
            push(&mut s, 0, b"l", v, false);
        }
        assert_eq!(lrem(&mut s, 0, b"l", b"2", b"1"), reply::integer(2));
        assert_eq!(lrange(&s, 0, b"l", b"0", b"-1"), reply::multi(&[b"2".to_vec(), b"3".to_vec(), b"1".to_vec()]));
    }

    #[test]
    fn test_popping_last_element_removes_key() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        push(&mut s, 0, b"l", b"only", false);
        pop(&mut s, 0, b"l", true);
        assert_eq!(llen(&s, 0, b"l"), reply::integer(0));
    }
}

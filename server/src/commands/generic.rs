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

use super::Outcome;
use crate::db::Server;
use crate::object::ObjType;
use crate::reply;
use crate::snapshot;
use log::warn;

pub fn del(server: &mut Server, db: usize, key: &[u8]) -> Vec<u8> {
    if server.databases[db].remove(key).is_some() {
        server.mark_dirty();
        reply::integer(1)
    } else {
        reply::integer(0)
    }
}

pub fn exists(server: &Server, db: usize, key: &[u8]) -> Vec<u8> {
    reply::integer(server.databases[db].exists(key) as i64)
}

pub fn keys(server: &Server, db: usize, pattern: &[u8]) -> Vec<u8> {
    let pattern = String::from_utf8_lossy(pattern).to_string();
    let matches: Vec<Vec<u8>> = server.databases[db]
        .keys_matching(&pattern)
        .into_iter()
        .map(|k| k.into_vec())
        .collect();
    reply::multi(&matches)
}

pub fn randomkey(server: &mut Server, db: usize) -> Vec<u8> {
    match server.databases[db].random_key() {
        Some(k) => reply::bulk(k.as_bytes()),
        None => reply::bulk(b""),
    }
}

pub fn dbsize(server: &Server, db: usize) -> Vec<u8> {
    reply::integer(server.databases[db].len() as i64)
}

pub fn type_of(server: &Server, db: usize, key: &[u8]) -> Vec<u8> {
    let ty = server.databases[db]
        .get(key)
        .map(|o| o.obj_type())
        .map(ObjType::name)
        .unwrap_or("none");
    reply::status(ty)
}

pub fn select(server: &mut Server, index_arg: &[u8]) -> Outcome {
    match std::str::from_utf8(index_arg).ok().and_then(|s| s.parse::<usize>().ok()) {
        Some(i) if i < server.databases.len() => Outcome::SelectDb(i, reply::ok()),
        _ => Outcome::Reply(reply::error("invalid DB index")),
    }
}

pub fn mv(server: &mut Server, db: &mut usize, key: &[u8], dest_arg: &[u8]) -> Vec<u8> {
    let dest = match std::str::from_utf8(dest_arg).ok().and_then(|s| s.parse::<usize>().ok()) {
        Some(d) if d < server.databases.len() => d,
        _ => return reply::error("invalid DB index"),
    };
    if dest == *db {
        return reply::error("source and destination objects are the same");
    }
    if server.databases[dest].exists(key) {
        return reply::integer(0);
    }
    match server.databases[*db].remove(key) {
        Some(obj) => {
            server.databases[dest].set(key, obj);
            server.mark_dirty();
            reply::integer(1)
        }
        None => reply::integer(0),
    }
}

pub fn rename(server: &mut Server, db: usize, src: &[u8], dest: &[u8], not_exists_only: bool) -> Vec<u8> {
    if not_exists_only && server.databases[db].exists(dest) {
        return reply::integer(0);
    }
    match server.databases[db].remove(src) {
        Some(obj) => {
            server.databases[db].set(dest, obj);
            server.mark_dirty();
            if not_exists_only {
                reply::integer(1)
            } else {
                reply::ok()
            }
        }
        None => reply::error("no such key"),
    }
}

pub fn flushdb(server: &mut Server, db: usize) -> Vec<u8> {
    server.databases[db].clear();
    server.mark_dirty();
    if let Err(e) = snapshot::save(server) {
        warn!("synchronous save after FLUSHDB failed: {e}");
        return reply::error("FLUSHDB succeeded but the synchronous save failed");
    }
    reply::ok()
}

pub fn flushall(server: &mut Server) -> Vec<u8> {
    server.flush_all();
    if let Err(e) = snapshot::save(server) {
        warn!("synchronous save after FLUSHALL failed: {e}");
        return reply::error("FLUSHALL succeeded but the synchronous save failed");
    }
    reply::ok()
}

#[derive(Default)]
struct SortOptions {
    desc: bool,
    alpha: bool,
    limit: Option<(i64, i64)>,
    by: Option<Vec<u8>>,
    get: Vec<Vec<u8>>,
}

fn parse_sort_options(args: &[Vec<u8>]) -> Result<SortOptions, &'static str> {
    let mut opt = SortOptions::default();
    let mut i = 0;
    while i < args.len() {
        let token = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match token.as_str() {
            "ASC" => opt.desc = false,
            "DESC" => opt.desc = true,
            "ALPHA" => opt.alpha = true,
            "LIMIT" => {
                let start = args.get(i + 1).and_then(|a| std::str::from_utf8(a).ok()).and_then(|s| s.parse().ok());
                let count = args.get(i + 2).and_then(|a| std::str::from_utf8(a).ok()).and_then(|s| s.parse().ok());
                match (start, count) {
                    (Some(s), Some(c)) => opt.limit = Some((s, c)),
                    _ => return Err("syntax error in LIMIT"),
                }
                i += 2;
            }
            "BY" => {
                opt.by = args.get(i + 1).cloned();
                i += 1;
            }
            "GET" => {
                match args.get(i + 1) {
                    Some(p) => opt.get.push(p.clone()),
                    None => return Err("syntax error in GET"),
                }
                i += 1;
            }
            _ => return Err("syntax error"),
        }
        i += 1;
    }
    Ok(opt)
}

fn substitute_pattern(pattern: &[u8], element: &[u8]) -> Vec<u8> {
    if let Some(pos) = pattern.iter().position(|&b| b == b'*') {
        let mut out = pattern[..pos].to_vec();
        out.extend_from_slice(element);
        out.extend_from_slice(&pattern[pos + 1..]);
        out
    } else {
        pattern.to_vec()
    }
}

pub fn sort(server: &Server, db: usize, args: &[Vec<u8>]) -> Vec<u8> {
    if args.is_empty() {
        return reply::error("wrong number of arguments");
    }
    let key = &args[0];
    let opt = match parse_sort_options(&args[1..]) {
        Ok(o) => o,
        Err(e) => return reply::error(e),
    };
    let obj = match server.databases[db].get(key) {
        None => return reply::multi(&[]),
        Some(o) => o,
    };
    let mut elements: Vec<Vec<u8>> = match obj.obj_type() {
        ObjType::List => obj.with_list(|l| l.iter().filter_map(|o| o.as_str().map(|s| s.as_bytes().to_vec())).collect()).unwrap_or_default(),
        ObjType::Set => obj.with_set(|s| s.keys().map(|k| k.as_bytes().to_vec()).collect()).unwrap_or_default(),
        ObjType::Str => return reply::wrong_type(),
    };

    let weight_of = |el: &[u8]| -> Vec<u8> {
        match &opt.by {
            Some(pat) => {
                let lookup_key = substitute_pattern(pat, el);
                server.databases[db]
                    .get(&lookup_key)
                    .and_then(|o| o.as_str().map(|s| s.as_bytes().to_vec()))
                    .unwrap_or_default()
            }
            None => el.to_vec(),
        }
    };

    if opt.alpha || opt.by.is_some() {
        elements.sort_by(|a, b| weight_of(a).cmp(&weight_of(b)));
    } else {
        elements.sort_by(|a, b| {
            let wa: f64 = std::str::from_utf8(&weight_of(a)).ok().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let wb: f64 = std::str::from_utf8(&weight_of(b)).ok().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    if opt.desc {
        elements.reverse();
    }
    if let Some((start, count)) = opt.limit {
        let start = start.max(0) as usize;
        let end = if count < 0 { elements.len() } else { (start + count as usize).min(elements.len()) };
        elements = if start < elements.len() { elements[start..end].to_vec() } else { Vec::new() };
    }

    if opt.get.is_empty() {
        reply::multi(&elements)
    } else {
        let mut out = Vec::new();
        for el in &elements {
            for pat in &opt.get {
                if pat.as_slice() == b"#" {
                    out.push(el.clone());
                } else {
                    let k = substitute_pattern(pat, el);
                    match server.databases[db].get(&k).and_then(|o| o.as_str().map(|s| s.as_bytes().to_vec())) {
                        Some(v) => out.push(v),
                        None => out.push(b"-1".to_vec()),
                    }
                }
            }
        }
        reply::multi(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::create_string;

    #[test]
    fn test_del_exists() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        s.databases[0].set(b"k", create_string(b"v"));
        assert_eq!(exists(&s, 0, b"k"), reply::integer(1));
        assert_eq!(del(&mut s, 0, b"k"), reply::integer(1));
        assert_eq!(del(&mut s, 0, b"k"), reply::integer(0));
    }

    #[test]
    fn test_rename_and_renamenx() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        s.databases[0].set(b"a", create_string(b"1"));
        assert_eq!(rename(&mut s, 0, b"a", b"b", false), reply::ok());
        assert_eq!(exists(&s, 0, b"a"), reply::integer(0));
        assert_eq!(exists(&s, 0, b"b"), reply::integer(1));
        s.databases[0].set(b"c", create_string(b"2"));
        assert_eq!(rename(&mut s, 0, b"c", b"b", true), reply::integer(0));
    }

    #[test]
    fn test_move_between_dbs() {
        let mut s = Server::new(2, "dump.rdb".into(), ".".into());
        s.databases[0].set(b"k", create_string(b"v"));
        let mut db0 = 0usize;
        assert_eq!(mv(&mut s, &mut db0, b"k", b"1"), reply::integer(1));
        assert_eq!(exists(&s, 0, b"k"), reply::integer(0));
        assert_eq!(exists(&s, 1, b"k"), reply::integer(1));
    }

    #[test]
    fn test_sort_numeric_and_alpha() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        let list = crate::object::create_list();
        for v in [b"3".to_vec(), b"1".to_vec(), b"2".to_vec()] {
            list.with_list_mut(|l| l.push_back(create_string(&v)));
        }
        s.databases[0].set(b"l", list);
        let r = sort(&s, 0, &[b"l".to_vec()]);
        assert_eq!(r, reply::multi(&[b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]));
    }
}

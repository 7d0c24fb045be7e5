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

//! The database layer and the server's global state, following the shape of a
//! `RedisServer`/`RedisDB`/`SaveParam`/`ReplState` split seen in other minimal
//! Redis-alike implementations.

use crate::dstring::DStr;
use crate::htable::HTable;
use crate::object::Obj;
use std::time::{SystemTime, UNIX_EPOCH};

/// One logical database: a key -> value-object mapping. Keys are plain byte
/// buffers (not wrapped in a shared `Obj`) since nothing in this system shares
/// or aliases a *key*; only values are reference-counted.
pub struct Database {
    table: HTable<DStr, Obj>,
}

impl Database {
    pub fn new() -> Self {
        Self {
            table: HTable::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Obj> {
        self.table.find(&DStr::from(key))
    }

    pub fn set(&mut self, key: &[u8], value: Obj) {
        self.table.replace(DStr::from(key), value);
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Obj> {
        self.table.remove(&DStr::from(key))
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.table.contains(&DStr::from(key))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn random_key(&mut self) -> Option<DStr> {
        self.table.random_entry().map(|(k, _)| k.clone())
    }

    pub fn keys_matching(&self, pattern: &str) -> Vec<DStr> {
        self.table
            .keys()
            .filter(|k| glob_match(pattern.as_bytes(), k))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DStr, &Obj)> {
        self.table.iter()
    }

    pub fn maybe_shrink(&mut self) {
        if self.table.capacity() > 16384 && self.table.fill_ratio_percent() < 10 {
            self.table.shrink_to_fit();
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple glob matcher (`*`, `?`, `[...]`, `\x` escape) for KEYS/SORT BY patterns.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    glob_match_inner(pattern, text)
}

fn glob_match_inner(mut p: &[u8], mut t: &[u8]) -> bool {
    // backtracking matcher; star_p/star_t remember the last '*' for retry
    let (mut star_p, mut star_t): (Option<&[u8]>, Option<&[u8]>) = (None, None);
    loop {
        if !p.is_empty() {
            match p[0] {
                b'*' => {
                    star_p = Some(&p[1..]);
                    star_t = Some(t);
                    p = &p[1..];
                    continue;
                }
                b'?' if !t.is_empty() => {
                    p = &p[1..];
                    t = &t[1..];
                    continue;
                }
                b'[' => {
                    if let Some((matched, rest_p, rest_t)) = match_class(p, t) {
                        if matched {
                            p = rest_p;
                            t = rest_t;
                            continue;
                        }
                    }
                }
                b'\\' if p.len() > 1 && !t.is_empty() && p[1] == t[0] => {
                    p = &p[2..];
                    t = &t[1..];
                    continue;
                }
                c if !t.is_empty() && c == t[0] => {
                    p = &p[1..];
                    t = &t[1..];
                    continue;
                }
                _ => {}
            }
        } else if t.is_empty() {
            return true;
        }
        if let (Some(sp), Some(st)) = (star_p, star_t) {
            if !st.is_empty() {
                star_t = Some(&st[1..]);
                p = sp;
                t = &st[1..];
                continue;
            }
        }
        return false;
    }
}

fn match_class<'a>(p: &'a [u8], t: &'a [u8]) -> Option<(bool, &'a [u8], &'a [u8])> {
    if t.is_empty() {
        return None;
    }
    let close = p.iter().position(|&b| b == b']')?;
    let class = &p[1..close];
    let rest_p = &p[close + 1..];
    let ch = t[0];
    let matched = class_matches(class, ch);
    Some((matched, rest_p, &t[1..]))
}

fn class_matches(class: &[u8], ch: u8) -> bool {
    let (negate, class) = if class.first() == Some(&b'^') {
        (true, &class[1..])
    } else {
        (false, class)
    };
    let mut i = 0;
    let mut found = false;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == b'-' {
            if class[i] <= ch && ch <= class[i + 2] {
                found = true;
            }
            i += 3;
        } else {
            if class[i] == ch {
                found = true;
            }
            i += 1;
        }
    }
    found != negate
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveParam {
    pub seconds: u64,
    pub changes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplState {
    None,
    MustConnect,
    Connected,
}

pub struct ReplicationInfo {
    pub state: ReplState,
    pub master_host: Option<String>,
    pub master_port: u16,
    pub slave_count: usize,
}

impl ReplicationInfo {
    pub fn standalone() -> Self {
        Self {
            state: ReplState::None,
            master_host: None,
            master_port: 0,
            slave_count: 0,
        }
    }

    pub fn role(&self) -> &'static str {
        match self.master_host {
            Some(_) => "slave",
            None => "master",
        }
    }
}

pub struct Stats {
    pub start_time: u64,
    pub total_connections: u64,
    pub total_commands: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            start_time: now_unix(),
            total_connections: 0,
            total_commands: 0,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The server's global state: the database array plus everything cron,
/// persistence and replication act on. Passed explicitly to every component
/// rather than kept in a process-wide static.
pub struct Server {
    pub databases: Vec<Database>,
    pub save_params: Vec<SaveParam>,
    pub dirty: u64,
    pub lastsave: u64,
    pub bgsave_in_progress: bool,
    pub replication: ReplicationInfo,
    pub stats: Stats,
    pub dbfilename: String,
    pub dir: String,
    pub maxidletime: u64,
    /// Raw fd of the listening socket, so a forked `BGSAVE` child can close its
    /// inherited copy instead of leaving it open to race-accept connections it
    /// will never service.
    pub listen_fd: Option<std::os::unix::io::RawFd>,
}

impl Server {
    pub fn new(num_databases: usize, dbfilename: String, dir: String) -> Self {
        Self {
            databases: (0..num_databases.max(1)).map(|_| Database::new()).collect(),
            save_params: vec![
                SaveParam { seconds: 3600, changes: 1 },
                SaveParam { seconds: 300, changes: 100 },
                SaveParam { seconds: 60, changes: 10000 },
            ],
            dirty: 0,
            lastsave: now_unix(),
            bgsave_in_progress: false,
            replication: ReplicationInfo::standalone(),
            stats: Stats::new(),
            dbfilename,
            dir,
            maxidletime: 300,
            listen_fd: None,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty += 1;
    }

    pub fn dump_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.dir).join(&self.dbfilename)
    }

    pub fn flush_all(&mut self) {
        for db in &mut self.databases {
            db.clear();
        }
        self.dirty += 1;
    }

    pub fn should_bgsave(&self) -> bool {
        if self.bgsave_in_progress {
            return false;
        }
        let since_save = now_unix().saturating_sub(self.lastsave);
        self.save_params
            .iter()
            .any(|p| self.dirty >= p.changes && since_save > p.seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::create_string;

    #[test]
    fn test_set_get_del() {
        let mut db = Database::new();
        db.set(b"foo", create_string(b"bar"));
        assert!(db.exists(b"foo"));
        assert_eq!(db.get(b"foo").unwrap().as_str().unwrap().as_bytes(), b"bar");
        assert!(db.remove(b"foo").is_some());
        assert!(!db.exists(b"foo"));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"foo*", b"foobar"));
        assert!(glob_match(b"f?o", b"foo"));
        assert!(!glob_match(b"f?o", b"fooo"));
        assert!(glob_match(b"[a-c]at", b"bat"));
        assert!(!glob_match(b"[a-c]at", b"dat"));
        assert!(glob_match(b"*", b"anything"));
    }

    #[test]
    fn test_should_bgsave_policy() {
        let mut s = Server::new(1, "dump.rdb".into(), ".".into());
        assert!(!s.should_bgsave());
        s.dirty = 1;
        s.lastsave = now_unix().saturating_sub(3601);
        assert!(s.should_bgsave());
    }
}

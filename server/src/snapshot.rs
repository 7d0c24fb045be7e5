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

//! Binary snapshot codec and SAVE/BGSAVE/load plumbing, following the same
//! save-to-temp-then-rename idiom as the storage engine's flush/unflush paths,
//! with a flat non-versioned record format closer to `rdb.c`.
//!
//! Layout: `"REDIS0000"` magic, then for each non-empty database a `0xFE` marker
//! followed by a big-endian `u32` database index and its key/value records, then
//! a final `0xFF` EOF marker. Each record is a one-byte type tag (0 = STRING,
//! 1 = LIST, 2 = SET), a `u32`-length-prefixed key, and a type-specific payload.

use crate::db::Server;
use crate::dstring::DStr;
use crate::error::{Error, SkyResult};
use crate::object::{create_list, create_set, create_string, Obj};
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8] = b"REDIS0000";
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;
const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;

fn write_u32<W: Write>(w: &mut W, n: u32) -> io::Result<()> {
    w.write_all(&n.to_be_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn write_bytes<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    write_u32(w, data.len() as u32)?;
    w.write_all(data)
}

fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_object<W: Write>(w: &mut W, key: &DStr, obj: &Obj) -> io::Result<()> {
    match obj.obj_type() {
        crate::object::ObjType::Str => {
            w.write_all(&[TYPE_STRING])?;
            write_bytes(w, key.as_bytes())?;
            write_bytes(w, obj.as_str().unwrap().as_bytes())
        }
        crate::object::ObjType::List => {
            w.write_all(&[TYPE_LIST])?;
            write_bytes(w, key.as_bytes())?;
            let items: Vec<Vec<u8>> = obj
                .with_list(|l| {
                    l.iter()
                        .map(|o| o.as_str().map(|s| s.as_bytes().to_vec()).unwrap_or_default())
                        .collect()
                })
                .unwrap_or_default();
            write_u32(w, items.len() as u32)?;
            for item in items {
                write_bytes(w, &item)?;
            }
            Ok(())
        }
        crate::object::ObjType::Set => {
            w.write_all(&[TYPE_SET])?;
            write_bytes(w, key.as_bytes())?;
            let members: Vec<DStr> = obj.with_set(|s| s.keys().cloned().collect()).unwrap_or_default();
            write_u32(w, members.len() as u32)?;
            for m in members {
                write_bytes(w, m.as_bytes())?;
            }
            Ok(())
        }
    }
}

fn read_object<R: Read>(r: &mut R, tag: u8) -> io::Result<(DStr, Obj)> {
    let key = DStr::from(read_bytes(r)?);
    let obj = match tag {
        TYPE_STRING => create_string(&read_bytes(r)?),
        TYPE_LIST => {
            let count = read_u32(r)?;
            let list = create_list();
            for _ in 0..count {
                let item = read_bytes(r)?;
                list.with_list_mut(|l| l.push_back(create_string(&item)));
            }
            list
        }
        TYPE_SET => {
            let count = read_u32(r)?;
            let set = create_set();
            for _ in 0..count {
                let member = read_bytes(r)?;
                set.with_set_mut(|s| s.replace(DStr::from(member), ()));
            }
            set
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown record type tag {other}"),
            ))
        }
    };
    Ok((key, obj))
}

/// Encodes the whole server's data into `w`, used both for on-disk snapshots
/// and for streaming a full sync to a replicating slave.
pub fn encode_to_writer<W: Write>(server: &Server, w: &mut W) -> io::Result<()> {
    w.write_all(MAGIC)?;
    for (idx, db) in server.databases.iter().enumerate() {
        if db.is_empty() {
            continue;
        }
        w.write_all(&[OP_SELECTDB])?;
        write_u32(w, idx as u32)?;
        for (key, obj) in db.iter() {
            write_object(w, key, obj)?;
        }
    }
    w.write_all(&[OP_EOF])
}

/// Serializes the whole server into `path`, atomically: writes to a sibling
/// `.tmp` file, `fsync`s it, then renames over the destination.
pub fn save_to(server: &Server, path: &Path) -> SkyResult<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path).map_err(|e| Error::io_extra(e, tmp_path.display().to_string()))?;
        let mut w = BufWriter::new(&file);
        encode_to_writer(server, &mut w).map_err(Error::from)?;
        w.flush().map_err(Error::from)?;
        w.get_ref().sync_all().map_err(Error::from)?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| Error::io_extra(e, path.display().to_string()))?;
    Ok(())
}

pub fn save(server: &mut Server) -> SkyResult<()> {
    let path = server.dump_path();
    save_to(server, &path)?;
    server.lastsave = crate::db::now_unix();
    server.dirty = 0;
    info!("DB saved on disk");
    Ok(())
}

/// Forks a child process to perform the save in the background, the way the
/// original relies on copy-on-write pages instead of snapshotting data structures
/// itself. The parent only flips `bgsave_in_progress`; cron reaps the child.
#[cfg(unix)]
pub fn bgsave(server: &mut Server) -> SkyResult<()> {
    if server.bgsave_in_progress {
        return Err(Error::storage("background save already in progress"));
    }
    let path = server.dump_path();
    match unsafe { libc::fork() } {
        -1 => Err(Error::storage("fork failed")),
        0 => {
            if let Some(fd) = server.listen_fd {
                unsafe {
                    libc::close(fd);
                }
            }
            let status = match save_to(server, &path) {
                Ok(()) => 0,
                Err(e) => {
                    warn!("background save failed: {e}");
                    1
                }
            };
            std::process::exit(status);
        }
        _pid => {
            server.bgsave_in_progress = true;
            info!("Background saving started");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
pub fn bgsave(server: &mut Server) -> SkyResult<()> {
    save(server)
}

/// Loads a snapshot file into `server`, replacing all existing data.
pub fn load(server: &mut Server, path: &Path) -> SkyResult<()> {
    if !path.exists() {
        return Ok(());
    }
    let file = File::open(path).map_err(|e| Error::io_extra(e, path.display().to_string()))?;
    let mut r = BufReader::new(file);
    let mut magic = vec![0u8; MAGIC.len()];
    r.read_exact(&mut magic).map_err(Error::from)?;
    if magic != MAGIC {
        return Err(Error::storage("bad snapshot magic"));
    }
    for db in &mut server.databases {
        db.clear();
    }
    let mut current_db = 0usize;
    loop {
        let mut tag = [0u8; 1];
        match r.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::from(e)),
        }
        match tag[0] {
            OP_EOF => break,
            OP_SELECTDB => {
                current_db = read_u32(&mut r).map_err(Error::from)? as usize;
            }
            other => {
                let (key, obj) = read_object(&mut r, other).map_err(Error::from)?;
                if let Some(db) = server.databases.get_mut(current_db) {
                    if db.exists(key.as_bytes()) {
                        return Err(Error::storage(format!(
                            "duplicate key '{}' in db {current_db}",
                            String::from_utf8_lossy(key.as_bytes())
                        )));
                    }
                    db.set(key.as_bytes(), obj);
                }
            }
        }
    }
    info!("DB loaded from disk");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::create_string;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("kiln-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut server = Server::new(2, "dump.rdb".into(), dir.to_string_lossy().to_string());
        server.databases[0].set(b"k", create_string(b"v"));
        let list = create_list();
        list.with_list_mut(|l| l.push_back(create_string(b"x")));
        server.databases[0].set(b"l", list);
        let set = create_set();
        set.with_set_mut(|s| s.replace(DStr::from("m"), ()));
        server.databases[1].set(b"s", set);

        let path = server.dump_path();
        save_to(&server, &path).unwrap();

        let mut restored = Server::new(2, "dump.rdb".into(), dir.to_string_lossy().to_string());
        load(&mut restored, &path).unwrap();
        assert_eq!(restored.databases[0].get(b"k").unwrap().as_str().unwrap().as_bytes(), b"v");
        assert!(restored.databases[0].get(b"l").unwrap().with_list(|l| l.len() == 1).unwrap());
        assert!(restored.databases[1].get(b"s").unwrap().with_set(|s| s.len() == 1).unwrap());

        std::fs::remove_dir_all(&dir).ok();
    }
}

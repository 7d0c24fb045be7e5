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

//! Black-box, socket-level tests against the compiled server binary: spawn a
//! real process, talk to it over a real TCP socket, kill it on drop.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

struct TestServer {
    child: Child,
    port: u16,
    dir: PathBuf,
}

static NEXT_PORT: std::sync::atomic::AtomicU16 = std::sync::atomic::AtomicU16::new(17800);

impl TestServer {
    fn start(extra_directives: &[&str]) -> Self {
        let port = NEXT_PORT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("kiln-it-{}-{}", std::process::id(), port));
        fs::create_dir_all(&dir).unwrap();

        let mut contents = format!("port {port}\nbind 127.0.0.1\ndir {}\ndbfilename dump.rdb\n", dir.display());
        for d in extra_directives {
            contents.push_str(d);
            contents.push('\n');
        }
        let cfg_path = dir.join("kiln.conf");
        fs::write(&cfg_path, contents).unwrap();

        let child = Command::new(env!("CARGO_BIN_EXE_kilnd"))
            .arg(&cfg_path)
            .current_dir(&dir)
            .spawn()
            .expect("failed to spawn kilnd");

        let server = TestServer { child, port, dir };
        server.wait_for_accept();
        server
    }

    fn wait_for_accept(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if TcpStream::connect(("127.0.0.1", self.port)).is_ok() {
                return;
            }
            if Instant::now() > deadline {
                panic!("server on port {} never started accepting", self.port);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        TestClient { stream }
    }

    fn dump_path(&self) -> PathBuf {
        self.dir.join("dump.rdb")
    }

    fn kill_ungracefully(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        fs::remove_dir_all(&self.dir).ok();
    }
}

struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).unwrap();
        self.stream.write_all(b"\r\n").unwrap();
    }

    /// Reads exactly `n` bytes, used when the expected reply shape is known up front.
    fn read_exact_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).unwrap();
        buf
    }

    fn read_line(&mut self) -> String {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.stream.read_exact(&mut byte).unwrap();
            if byte[0] == b'\n' {
                break;
            }
            if byte[0] != b'\r' {
                out.push(byte[0]);
            }
        }
        String::from_utf8(out).unwrap()
    }

    fn read_bulk(&mut self) -> Vec<u8> {
        let len: usize = self.read_line().parse().expect("expected bulk length line");
        let mut payload = self.read_exact_bytes(len + 2);
        payload.truncate(len);
        payload
    }
}

#[test]
fn test_string_basics() {
    let server = TestServer::start(&[]);
    let mut c = server.connect();

    c.send("SET foo bar");
    assert_eq!(c.read_line(), "+OK");

    c.send("GET foo");
    assert_eq!(c.read_bulk(), b"bar");

    c.send("SETNX foo baz");
    assert_eq!(c.read_line(), "0");

    c.send("GET foo");
    assert_eq!(c.read_bulk(), b"bar");

    c.send("DEL foo");
    assert_eq!(c.read_line(), "1");

    c.send("GET foo");
    assert_eq!(c.read_line(), "nil");
}

#[test]
fn test_list_rotation() {
    let server = TestServer::start(&[]);
    let mut c = server.connect();

    for v in ["a", "b", "c"] {
        c.send(&format!("RPUSH list {v}"));
        assert_eq!(c.read_line(), "+OK");
    }

    c.send("LRANGE list 0 -1");
    assert_eq!(c.read_line(), "a b c");

    c.send("LPOP list");
    assert_eq!(c.read_bulk(), b"a");

    c.send("LLEN list");
    assert_eq!(c.read_line(), "2");
}

#[test]
fn test_set_intersection() {
    let server = TestServer::start(&[]);
    let mut c = server.connect();

    for (key, member) in [("s1", "x"), ("s1", "y"), ("s2", "y"), ("s2", "z")] {
        c.send(&format!("SADD {key} {member}"));
        assert_eq!(c.read_line(), "1");
    }

    c.send("SINTER s1 s2");
    assert_eq!(c.read_line(), "y");
}

#[test]
fn test_idle_client_is_closed_by_cron() {
    let server = TestServer::start(&["timeout 1"]);
    let mut c = server.connect();

    c.send("PING");
    assert_eq!(c.read_line(), "+PONG");

    // The idle sweep runs every ten one-second cron ticks; wait past a full
    // cycle so the sweep is guaranteed to have observed this connection idle
    // past its one-second timeout.
    std::thread::sleep(Duration::from_secs(11));

    c.send("PING");
    let mut buf = [0u8; 16];
    let result = c.stream.read(&mut buf);
    match result {
        Ok(0) => {} // connection closed, as expected
        Ok(n) => panic!("expected closed connection, got {} bytes", n),
        Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::WouldBlock),
    }
}

#[test]
fn test_save_and_restart_roundtrip() {
    let mut server = TestServer::start(&[]);
    {
        let mut c = server.connect();
        c.send("SET a 1");
        assert_eq!(c.read_line(), "+OK");
        c.send("RPUSH l x");
        assert_eq!(c.read_line(), "+OK");
        c.send("RPUSH l y");
        assert_eq!(c.read_line(), "+OK");
        c.send("SADD s p");
        assert_eq!(c.read_line(), "1");
        c.send("SADD s q");
        assert_eq!(c.read_line(), "1");
        c.send("SAVE");
        assert_eq!(c.read_line(), "+OK");
    }
    assert!(server.dump_path().exists());
    server.kill_ungracefully();

    let port = server.port;
    let dir = server.dir.clone();
    let cfg_path = dir.join("kiln.conf");
    let child = Command::new(env!("CARGO_BIN_EXE_kilnd"))
        .arg(&cfg_path)
        .current_dir(&dir)
        .spawn()
        .expect("failed to restart kilnd");
    server.child = child;
    server.wait_for_accept();

    let mut c = server.connect();
    c.send("GET a");
    assert_eq!(c.read_bulk(), b"1");
    c.send("LRANGE l 0 -1");
    assert_eq!(c.read_line(), "x y");
    c.send("SCARD s");
    assert_eq!(c.read_line(), "2");
}

#[test]
fn test_bgsave_under_concurrent_writes() {
    let server = TestServer::start(&[]);
    let mut c = server.connect();

    c.send("SET a 1");
    assert_eq!(c.read_line(), "+OK");

    c.send("BGSAVE");
    assert_eq!(c.read_line(), "+Background saving started");

    c.send("SET a 9");
    assert_eq!(c.read_line(), "+OK");

    // Give the forked child time to finish writing the snapshot.
    std::thread::sleep(Duration::from_millis(500));
    assert!(server.dump_path().exists());

    c.send("GET a");
    assert_eq!(c.read_bulk(), b"9");
}

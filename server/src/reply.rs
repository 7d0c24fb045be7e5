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

//! Reply-building helpers for the inline/bulk wire protocol. Each function
//! returns the raw bytes to enqueue on a client's reply queue.
//!
//! `OK`/`PONG`/`nil` are the fixed-content replies, so their bytes are drawn
//! from a single preallocated `Obj` per process rather than a fresh `Vec<u8>`
//! each call: `shared_ok`/`shared_pong`/`shared_nil` hand out an `Rc::clone` of
//! that object, matching the original's `shared.ok`/`shared.pong` constants and
//! their `incref`-on-reply convention. Every other reply here (bulk, integer,
//! multi, status, error) is built fresh per call from command-specific data
//! and has nothing to share, so it stays a plain untracked `Vec<u8>`.

use crate::object::{create_string, Obj};
use std::rc::Rc;

thread_local! {
    static SHARED_OK: Obj = create_string(b"OK");
    static SHARED_PONG: Obj = create_string(b"PONG");
    static SHARED_NIL: Obj = create_string(b"nil");
}

pub fn shared_ok() -> Obj {
    SHARED_OK.with(Rc::clone)
}

pub fn shared_pong() -> Obj {
    SHARED_PONG.with(Rc::clone)
}

pub fn shared_nil() -> Obj {
    SHARED_NIL.with(Rc::clone)
}

fn status_line(obj: &Obj) -> Vec<u8> {
    let mut out = Vec::with_capacity(obj.as_str().unwrap().len() + 3);
    out.push(b'+');
    out.extend_from_slice(obj.as_str().unwrap().as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

pub fn ok() -> Vec<u8> {
    status_line(&shared_ok())
}

pub fn pong() -> Vec<u8> {
    status_line(&shared_pong())
}

pub fn error(msg: &str) -> Vec<u8> {
    format!("-ERR {msg}\r\n").into_bytes()
}

pub fn wrong_type() -> Vec<u8> {
    b"-ERR wrong kind of value\r\n".to_vec()
}

pub fn nil() -> Vec<u8> {
    let obj = shared_nil();
    let mut out = obj.as_str().unwrap().as_bytes().to_vec();
    out.extend_from_slice(b"\r\n");
    out
}

pub fn integer(n: i64) -> Vec<u8> {
    format!("{n}\r\n").into_bytes()
}

pub fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("{}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn status(msg: &str) -> Vec<u8> {
    format!("+{msg}\r\n").into_bytes()
}

/// A space-joined sequence of bare tokens terminated by CRLF — used for KEYS and
/// for inline multi-value replies in this line-oriented protocol (there is no
/// nested multi-bulk framing in this protocol).
pub fn multi(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(item);
    }
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk() {
        assert_eq!(bulk(b"abc"), b"3\r\nabc\r\n".to_vec());
    }

    #[test]
    fn test_multi() {
        assert_eq!(multi(&[b"a".to_vec(), b"b".to_vec()]), b"a b\r\n".to_vec());
    }

    #[test]
    fn test_ok_pong_nil_bytes() {
        assert_eq!(ok(), b"+OK\r\n".to_vec());
        assert_eq!(pong(), b"+PONG\r\n".to_vec());
        assert_eq!(nil(), b"nil\r\n".to_vec());
    }

    #[test]
    fn test_shared_constant_refcount_roundtrips() {
        let baseline = Rc::strong_count(&shared_ok());
        let live_before = crate::alloc::live_bytes();
        for _ in 0..100 {
            ok();
            pong();
            nil();
        }
        assert_eq!(Rc::strong_count(&shared_ok()), baseline);
        assert_eq!(crate::alloc::live_bytes(), live_before);
    }
}

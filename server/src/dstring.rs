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

//! A binary-safe growable byte buffer, standing in for the original's dynamic
//! string. This is a boundary-contract wrapper only: `Vec<u8>` already gives O(1)
//! length and amortized-O(1) append, which is all callers in this crate need.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DStr(Vec<u8>);

impl DStr {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn append(&mut self, data: &[u8]) {
        self.0.extend_from_slice(data);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Parses the buffer as a signed 64-bit decimal integer, the representation
    /// used by INCR/DECR and friends.
    pub fn parse_i64(&self) -> Option<i64> {
        std::str::from_utf8(&self.0).ok()?.trim().parse().ok()
    }
}

impl From<Vec<u8>> for DStr {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for DStr {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl From<String> for DStr {
    fn from(v: String) -> Self {
        Self(v.into_bytes())
    }
}

impl From<&str> for DStr {
    fn from(v: &str) -> Self {
        Self(v.as_bytes().to_vec())
    }
}

impl Deref for DStr {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for DStr {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "DStr({s:?})"),
            Err(_) => write!(f, "DStr({:?})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append() {
        let mut s = DStr::from("hello");
        s.append(b" world");
        assert_eq!(s.as_bytes(), b"hello world");
    }

    #[test]
    fn test_parse_i64() {
        assert_eq!(DStr::from("42").parse_i64(), Some(42));
        assert_eq!(DStr::from("-7").parse_i64(), Some(-7));
        assert_eq!(DStr::from("nope").parse_i64(), None);
    }
}

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

//! A generic deque standing in for the original's doubly-linked list. Redis's
//! `adlist.c` hand-rolls a linked list with head/tail pointers and a value
//! disposer because C has no deque in its standard library; `VecDeque` already
//! gives O(1) push/pop at both ends, so the list is just that plus the disposer
//! hook LREM/LTRIM rely on.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DList<T> {
    inner: VecDeque<T>,
}

impl<T> DList<T> {
    pub fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn push_front(&mut self, v: T) {
        self.inner.push_front(v)
    }

    pub fn push_back(&mut self, v: T) {
        self.inner.push_back(v)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    pub fn pop_back(&mut self) -> Option<T> {
        self.inner.pop_back()
    }

    /// Resolves a possibly-negative Redis-style list index into a 0-based offset.
    pub fn normalize_index(&self, idx: i64) -> Option<usize> {
        let len = self.inner.len() as i64;
        let real = if idx < 0 { len + idx } else { idx };
        if real < 0 || real >= len {
            None
        } else {
            Some(real as usize)
        }
    }

    pub fn get(&self, idx: i64) -> Option<&T> {
        let i = self.normalize_index(idx)?;
        self.inner.get(i)
    }

    pub fn set(&mut self, idx: i64, v: T) -> Result<(), ()> {
        let i = self.normalize_index(idx).ok_or(())?;
        self.inner[i] = v;
        Ok(())
    }

    /// Keeps only the inclusive range [start, end], both resolved Redis-style.
    pub fn trim(&mut self, start: i64, end: i64) {
        let len = self.inner.len() as i64;
        let mut s = if start < 0 { (len + start).max(0) } else { start };
        let mut e = if end < 0 { len + end } else { end };
        if e >= len {
            e = len - 1;
        }
        if s > e || s >= len || len == 0 {
            self.inner.clear();
            return;
        }
        if s < 0 {
            s = 0;
        }
        let tail_drop = len - 1 - e;
        for _ in 0..tail_drop {
            self.inner.pop_back();
        }
        for _ in 0..s {
            self.inner.pop_front();
        }
    }

    pub fn range(&self, start: i64, end: i64) -> Vec<&T> {
        let len = self.inner.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let mut s = if start < 0 { (len + start).max(0) } else { start };
        let mut e = if end < 0 { len + end } else { end };
        if e >= len {
            e = len - 1;
        }
        if s < 0 {
            s = 0;
        }
        if s > e || s >= len {
            return Vec::new();
        }
        self.inner
            .iter()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter()
    }
}

impl<T: PartialEq> DList<T> {
    /// Removes up to `count.abs()` occurrences of `value`. `count > 0` scans
    /// head-to-tail, `count < 0` scans tail-to-head, `count == 0` removes all.
    /// Returns the number of elements removed.
    pub fn remove_matching(&mut self, count: i64, value: &T) -> usize {
        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };
        let mut removed = 0;
        if count >= 0 {
            let mut i = 0;
            while i < self.inner.len() && removed < limit {
                if self.inner[i] == *value {
                    self.inner.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = self.inner.len();
            while i > 0 && removed < limit {
                i -= 1;
                if self.inner[i] == *value {
                    self.inner.remove(i);
                    removed += 1;
                }
            }
        }
        removed
    }
}

impl<T> Default for DList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_negative_indices() {
        let mut l = DList::new();
        for v in 0..5 {
            l.push_back(v);
        }
        assert_eq!(l.range(0, -1), vec![&0, &1, &2, &3, &4]);
        assert_eq!(l.range(-2, -1), vec![&3, &4]);
        assert_eq!(l.range(2, 1), Vec::<&i32>::new());
    }

    #[test]
    fn test_trim() {
        let mut l: DList<i32> = (0..5).fold(DList::new(), |mut l, v| {
            l.push_back(v);
            l
        });
        l.trim(1, -2);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_matching() {
        let mut l = DList::new();
        for v in [1, 2, 1, 3, 1] {
            l.push_back(v);
        }
        assert_eq!(l.remove_matching(2, &1), 2);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![2, 3, 1]);
    }

    #[test]
    fn test_remove_matching_from_tail() {
        let mut l = DList::new();
        for v in [1, 2, 1, 3, 1] {
            l.push_back(v);
        }
        assert_eq!(l.remove_matching(-1, &1), 1);
        assert_eq!(l.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}

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

//! An open-chained hash table with power-of-two sizing, modeled on `dict.h`/
//! `dict.c`. `dict.c` carries a per-instance vtable of `(hash, keyDup, valDup,
//! keyCompare, keyDestructor, valDestructor)` function pointers because C has no
//! trait system; here the same per-instance customization is expressed with the
//! standard `Hash`/`Eq`/`Clone` bounds plus an explicit `rehashidx`-free single-pass
//! grow, since this table is never accessed while a resize is outstanding (single
//! reactor thread owns it end to end).

use std::mem;

const INITIAL_SIZE: usize = 16;

struct Entry<K, V> {
    key: K,
    value: V,
}

pub struct HTable<K, V> {
    buckets: Vec<Vec<Entry<K, V>>>,
    used: usize,
    rng_state: u64,
}

/// A small xorshift PRNG, enough for uniform chain/slot sampling without
/// depending on an external `rand` crate in non-test code.
fn xorshift64(state: &mut u64) -> u64 {
    if *state == 0 {
        *state = 0x9E3779B97F4A7C15;
    }
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

impl<K, V> HTable<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_SIZE)
    }

    pub fn with_capacity(cap: usize) -> Self {
        let size = cap.max(1).next_power_of_two();
        Self {
            buckets: (0..size).map(|_| Vec::new()).collect(),
            used: 0,
            rng_state: 0x2545F4914F6CDD1D,
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    fn slot_for(&self, key: &K) -> usize {
        Self::hash_key(key) as usize & (self.buckets.len() - 1)
    }

    fn hash_key(key: &K) -> u64 {
        use std::hash::Hasher;
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    pub fn find(&self, key: &K) -> Option<&V> {
        let slot = self.slot_for(key);
        self.buckets[slot]
            .iter()
            .find(|e| &e.key == key)
            .map(|e| &e.value)
    }

    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let slot = self.slot_for(key);
        self.buckets[slot]
            .iter_mut()
            .find(|e| &e.key == key)
            .map(|e| &mut e.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Fails (returns `false`, leaves the table untouched) if `key` is already
    /// present; use [`replace`](Self::replace) for upsert semantics.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.contains(&key) {
            return false;
        }
        if self.used >= self.buckets.len() {
            self.grow();
        }
        let slot = self.slot_for(&key);
        self.buckets[slot].push(Entry { key, value });
        self.used += 1;
        true
    }

    /// Upsert: replaces the value if `key` exists, returning the old value.
    pub fn replace(&mut self, key: K, value: V) -> Option<V> {
        let slot = self.slot_for(&key);
        if let Some(e) = self.buckets[slot].iter_mut().find(|e| e.key == key) {
            return Some(mem::replace(&mut e.value, value));
        }
        if self.used >= self.buckets.len() {
            self.grow();
        }
        let slot = self.slot_for(&key);
        self.buckets[slot].push(Entry { key, value });
        self.used += 1;
        None
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.slot_for(key);
        let bucket = &mut self.buckets[slot];
        let pos = bucket.iter().position(|e| &e.key == key)?;
        let entry = bucket.swap_remove(pos);
        self.used -= 1;
        Some(entry.value)
    }

    /// Single-pass O(n) rehash into a table of the given power-of-two size.
    fn rehash_to(&mut self, new_size: usize) {
        let old = mem::replace(
            &mut self.buckets,
            (0..new_size).map(|_| Vec::new()).collect(),
        );
        for bucket in old {
            for entry in bucket {
                let slot = Self::hash_key(&entry.key) as usize & (new_size - 1);
                self.buckets[slot].push(entry);
            }
        }
    }

    fn grow(&mut self) {
        let new_size = (self.buckets.len() * 2).max(INITIAL_SIZE);
        self.rehash_to(new_size);
    }

    /// Shrinks to the smallest power of two that is >= `used`, floored at
    /// `INITIAL_SIZE`. No-op if that's not smaller than the current size.
    pub fn shrink_to_fit(&mut self) {
        let target = self.used.max(INITIAL_SIZE).next_power_of_two();
        if target < self.buckets.len() {
            self.rehash_to(target);
        }
    }

    /// Fraction of slots that are non-empty chain heads, in percent — the figure
    /// cron uses to decide whether a shrink is warranted.
    pub fn fill_ratio_percent(&self) -> u32 {
        if self.buckets.is_empty() {
            return 100;
        }
        let occupied = self.buckets.iter().filter(|b| !b.is_empty()).count();
        ((occupied as u64 * 100) / self.buckets.len() as u64) as u32
    }

    /// Uniformly samples a random occupied slot by rejection, then a uniformly
    /// random position along that slot's chain. Undefined (returns `None`) only
    /// when the table is empty.
    pub fn random_entry(&mut self) -> Option<(&K, &V)> {
        if self.used == 0 {
            return None;
        }
        loop {
            let slot = (xorshift64(&mut self.rng_state) as usize) & (self.buckets.len() - 1);
            let bucket = &self.buckets[slot];
            if bucket.is_empty() {
                continue;
            }
            let idx = (xorshift64(&mut self.rng_state) as usize) % bucket.len();
            let entry = &bucket[idx];
            return Some((&entry.key, &entry.value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets
            .iter()
            .flat_map(|b| b.iter().map(|e| (&e.key, &e.value)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn clear(&mut self) {
        for b in &mut self.buckets {
            b.clear();
        }
        self.used = 0;
    }
}

impl<K, V> Default for HTable<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let mut t: HTable<String, i32> = HTable::new();
        assert!(t.insert("a".to_string(), 1));
        assert!(!t.insert("a".to_string(), 2));
        assert_eq!(t.find(&"a".to_string()), Some(&1));
        assert_eq!(t.remove(&"a".to_string()), Some(1));
        assert_eq!(t.find(&"a".to_string()), None);
    }

    #[test]
    fn test_replace_upserts() {
        let mut t: HTable<String, i32> = HTable::new();
        assert_eq!(t.replace("a".to_string(), 1), None);
        assert_eq!(t.replace("a".to_string(), 2), Some(1));
        assert_eq!(t.find(&"a".to_string()), Some(&2));
    }

    #[test]
    fn test_grows_and_keeps_all_entries() {
        let mut t: HTable<i32, i32> = HTable::with_capacity(4);
        for i in 0..500 {
            assert!(t.insert(i, i * 2));
        }
        assert_eq!(t.len(), 500);
        assert!(t.capacity().is_power_of_two());
        assert!(t.capacity() >= 500);
        for i in 0..500 {
            assert_eq!(t.find(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn test_shrink_to_fit() {
        let mut t: HTable<i32, i32> = HTable::with_capacity(4);
        for i in 0..500 {
            t.insert(i, i);
        }
        for i in 0..490 {
            t.remove(&i);
        }
        t.shrink_to_fit();
        assert!(t.capacity() < 512);
        for i in 490..500 {
            assert_eq!(t.find(&i), Some(&i));
        }
    }

    #[test]
    fn test_random_entry_on_empty() {
        let mut t: HTable<i32, i32> = HTable::new();
        assert!(t.random_entry().is_none());
    }

    #[test]
    fn test_random_entry_returns_member() {
        let mut t: HTable<i32, i32> = HTable::new();
        t.insert(1, 10);
        let (k, v) = t.random_entry().unwrap();
        assert_eq!(*k, 1);
        assert_eq!(*v, 10);
    }
}

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

//! Allocator accounting: a counting wrapper around the process global allocator,
//! consulted by `INFO`'s `used_memory` field and by cron's stat refresh.
//!
//! This does not replace the global allocator the rest of the binary uses
//! (jemalloc on non-msvc/non-miri targets, set up in `main.rs`); it only tracks
//! live bytes, the same bookkeeping role `zmalloc.c`'s `used_memory` counter plays
//! in the original.

use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_BYTES: AtomicUsize = AtomicUsize::new(0);

pub fn track_alloc(bytes: usize) {
    LIVE_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

pub fn track_free(bytes: usize) {
    LIVE_BYTES.fetch_sub(bytes, Ordering::Relaxed);
}

pub fn live_bytes() -> usize {
    LIVE_BYTES.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_roundtrip() {
        let base = live_bytes();
        track_alloc(128);
        assert_eq!(live_bytes(), base + 128);
        track_free(128);
        assert_eq!(live_bytes(), base);
    }
}

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

//! # The event reactor
//!
//! A single-threaded file/time event multiplexer, modeled directly on `ae.h`/
//! `ae.c`. File event callbacks are owned `FnMut` closures rather than C function
//! pointers plus a `void *clientData`; capturing state in the closure is the
//! idiomatic replacement for `clientData`.

mod epoll;

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

pub const READABLE: u8 = 1;
pub const WRITABLE: u8 = 2;

pub const ALL_EVENTS: u8 = 1;
pub const DONT_WAIT: u8 = 4;

/// Returned by a time event callback: reschedule this many milliseconds from now,
/// or [`NO_MORE`] to delete the event.
pub type TimeEventResult = i64;
pub const NO_MORE: TimeEventResult = -1;

pub type FileCallback = Box<dyn FnMut(&mut EventLoop, RawFd, u8)>;
pub type TimeCallback = Box<dyn FnMut(&mut EventLoop) -> TimeEventResult>;

struct FileEvent {
    mask: u8,
    cb: FileCallback,
}

struct TimeEvent {
    id: u64,
    deadline: Instant,
    cb: TimeCallback,
}

pub struct EventLoop {
    backend: epoll::Backend,
    file_events: HashMap<RawFd, FileEvent>,
    time_events: Vec<TimeEvent>,
    next_time_id: u64,
    pub stop: bool,
}

impl EventLoop {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            backend: epoll::Backend::new()?,
            file_events: HashMap::new(),
            time_events: Vec::new(),
            next_time_id: 0,
            stop: false,
        })
    }

    pub fn create_file_event(&mut self, fd: RawFd, mask: u8, cb: FileCallback) -> std::io::Result<()> {
        let existing_mask = self.file_events.get(&fd).map(|e| e.mask).unwrap_or(0);
        let combined = existing_mask | mask;
        self.backend.set_interest(fd, combined)?;
        self.file_events.insert(fd, FileEvent { mask: combined, cb });
        Ok(())
    }

    pub fn delete_file_event(&mut self, fd: RawFd, mask: u8) {
        if let Some(ev) = self.file_events.get_mut(&fd) {
            ev.mask &= !mask;
            if ev.mask == 0 {
                self.file_events.remove(&fd);
                let _ = self.backend.remove(fd);
            } else {
                let _ = self.backend.set_interest(fd, ev.mask);
            }
        }
    }

    pub fn has_file_event(&self, fd: RawFd) -> bool {
        self.file_events.contains_key(&fd)
    }

    /// Registers a one-shot/recurring time event; the callback's return value
    /// reschedules it (see [`TimeEventResult`]).
    pub fn create_time_event(&mut self, after: Duration, cb: TimeCallback) -> u64 {
        let id = self.next_time_id;
        self.next_time_id += 1;
        self.time_events.push(TimeEvent {
            id,
            deadline: Instant::now() + after,
            cb,
        });
        id
    }

    pub fn delete_time_event(&mut self, id: u64) -> bool {
        if let Some(pos) = self.time_events.iter().position(|e| e.id == id) {
            self.time_events.remove(pos);
            true
        } else {
            false
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.time_events.iter().map(|e| e.deadline).min()
    }

    /// One pass: wait for readiness (bounded by the earliest time-event deadline,
    /// or zero when `DONT_WAIT` is set), dispatch ready file events, then fire any
    /// elapsed time events.
    pub fn process_events(&mut self, flags: u8) -> std::io::Result<usize> {
        let timeout = if flags & DONT_WAIT != 0 {
            Some(Duration::ZERO)
        } else {
            self.next_deadline()
                .map(|d| d.saturating_duration_since(Instant::now()))
        };
        let ready = self.backend.wait(timeout)?;
        let mut processed = ready.len();
        for (fd, mask) in ready {
            if let Some(mut ev) = self.file_events.remove(&fd) {
                (ev.cb)(self, fd, mask);
                // the callback may have deleted the fd's event entirely (close);
                // only reinsert if nothing else has claimed the slot.
                if !self.file_events.contains_key(&fd) {
                    self.file_events.insert(fd, ev);
                }
            }
        }
        processed += self.fire_time_events();
        Ok(processed)
    }

    fn fire_time_events(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0;
        // deadline-sorted scan avoids the starvation risk of a naive
        // restart-from-head scan under high event churn.
        self.time_events.sort_by_key(|e| e.deadline);
        let due: Vec<u64> = self
            .time_events
            .iter()
            .take_while(|e| e.deadline <= now)
            .map(|e| e.id)
            .collect();
        for id in due {
            let pos = match self.time_events.iter().position(|e| e.id == id) {
                Some(p) => p,
                None => continue,
            };
            let mut ev = self.time_events.remove(pos);
            let result = (ev.cb)(self);
            fired += 1;
            if result != NO_MORE {
                ev.deadline = Instant::now() + Duration::from_millis(result.max(0) as u64);
                self.time_events.push(ev);
            }
        }
        fired
    }

    pub fn run(&mut self) -> std::io::Result<()> {
        while !self.stop {
            self.process_events(ALL_EVENTS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_event_fires_and_reschedules() {
        let mut el = EventLoop::new().unwrap();
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let c2 = count.clone();
        el.create_time_event(Duration::ZERO, Box::new(move |_| {
            c2.set(c2.get() + 1);
            if c2.get() < 3 {
                0
            } else {
                NO_MORE
            }
        }));
        for _ in 0..10 {
            el.process_events(DONT_WAIT).unwrap();
            if count.get() >= 3 {
                break;
            }
        }
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_delete_time_event() {
        let mut el = EventLoop::new().unwrap();
        let id = el.create_time_event(Duration::from_secs(10), Box::new(|_| NO_MORE));
        assert!(el.delete_time_event(id));
        assert!(!el.delete_time_event(id));
    }
}

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

//! Linux `epoll` backend for the reactor. Level-triggered: a still-readable (or
//! still-writable) fd keeps reporting ready every call, matching the semantics
//! `ae.c`'s `select`/`kqueue` backends give it.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{READABLE, WRITABLE};

pub struct Backend {
    epfd: RawFd,
    registered: HashMap<RawFd, u8>,
}

fn mask_to_events(mask: u8) -> u32 {
    let mut ev = 0u32;
    if mask & READABLE != 0 {
        ev |= libc::EPOLLIN as u32;
    }
    if mask & WRITABLE != 0 {
        ev |= libc::EPOLLOUT as u32;
    }
    ev
}

fn events_to_mask(ev: u32) -> u8 {
    let mut mask = 0u8;
    if ev & (libc::EPOLLIN as u32) != 0 {
        mask |= READABLE;
    }
    if ev & (libc::EPOLLOUT as u32) != 0 {
        mask |= WRITABLE;
    }
    if ev & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0 {
        // surface errors/hangup as both readable and writable so whichever
        // handler is registered gets a chance to notice and close the fd
        mask |= READABLE | WRITABLE;
    }
    mask
}

impl Backend {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { libc::epoll_create1(0) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epfd,
            registered: HashMap::new(),
        })
    }

    pub fn set_interest(&mut self, fd: RawFd, mask: u8) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: mask_to_events(mask),
            u64: fd as u64,
        };
        let op = if self.registered.contains_key(&fd) {
            libc::EPOLL_CTL_MOD
        } else {
            libc::EPOLL_CTL_ADD
        };
        let rc = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        self.registered.insert(fd, mask);
        Ok(())
    }

    pub fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        if self.registered.remove(&fd).is_some() {
            let rc = unsafe {
                libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                // ENOENT just means it was already gone (e.g. fd closed first)
                if err.raw_os_error() != Some(libc::ENOENT) {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(RawFd, u8)>> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
        };
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; 256.max(self.registered.len())];
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                events.as_mut_ptr(),
                events.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }
        let mut out = Vec::with_capacity(n as usize);
        for event in events.iter().take(n as usize) {
            out.push((event.u64 as RawFd, events_to_mask(event.events)));
        }
        Ok(out)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}

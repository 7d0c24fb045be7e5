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

//! The value-object layer: a reference-counted tagged union over STRING, LIST
//! and SET, matching `redis.c`'s `robj`. Since the whole core runs on one thread,
//! `Rc<RObject>` is both the pointer *and* the refcount: `Clone`/`Drop` on the
//! `Rc` are exactly `incref`/`decref`, and the contained `Payload`'s own `Drop`
//! performs the recursive disposal the original does by hand in `decrRefCount`.

use crate::dlist::DList;
use crate::dstring::DStr;
use crate::htable::HTable;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjType {
    Str,
    List,
    Set,
}

impl ObjType {
    pub fn name(self) -> &'static str {
        match self {
            ObjType::Str => "string",
            ObjType::List => "list",
            ObjType::Set => "set",
        }
    }
}

#[derive(Debug)]
pub enum Payload {
    Str(DStr),
    List(DList<Obj>),
    Set(HTable<DStr, ()>),
}

impl Payload {
    pub fn obj_type(&self) -> ObjType {
        match self {
            Payload::Str(_) => ObjType::Str,
            Payload::List(_) => ObjType::List,
            Payload::Set(_) => ObjType::Set,
        }
    }

    /// Rough heap footprint, used by the allocator-accounting counters.
    pub fn approx_size(&self) -> usize {
        match self {
            Payload::Str(s) => s.len(),
            Payload::List(l) => l.len() * std::mem::size_of::<Obj>(),
            Payload::Set(s) => s.len() * std::mem::size_of::<DStr>(),
        }
    }
}

#[derive(Debug)]
pub struct RObject {
    payload: RefCell<Payload>,
}

/// A value object: `Rc`'s strong count is the reference count.
pub type Obj = Rc<RObject>;

thread_local! {
    static STR_FREELIST: RefCell<Vec<Vec<u8>>> = RefCell::new(Vec::new());
    static FREELIST_CAP: Cell<usize> = Cell::new(256);
}

/// Recycles a disposed STRING payload's backing allocation instead of letting it
/// be freed outright, bounded by a fixed freelist capacity (see DESIGN.md).
fn recycle_str_buffer(mut buf: Vec<u8>) {
    STR_FREELIST.with(|fl| {
        let cap = FREELIST_CAP.with(|c| c.get());
        let mut fl = fl.borrow_mut();
        if fl.len() < cap {
            buf.clear();
            fl.push(buf);
        }
    });
}

fn take_str_buffer() -> Vec<u8> {
    STR_FREELIST.with(|fl| fl.borrow_mut().pop().unwrap_or_default())
}

pub fn create_string(bytes: &[u8]) -> Obj {
    let mut buf = take_str_buffer();
    buf.extend_from_slice(bytes);
    crate::alloc::track_alloc(buf.len());
    Rc::new(RObject {
        payload: RefCell::new(Payload::Str(DStr::from(buf))),
    })
}

pub fn create_list() -> Obj {
    Rc::new(RObject {
        payload: RefCell::new(Payload::List(DList::new())),
    })
}

pub fn create_set() -> Obj {
    Rc::new(RObject {
        payload: RefCell::new(Payload::Set(HTable::new())),
    })
}

impl RObject {
    pub fn obj_type(&self) -> ObjType {
        self.payload.borrow().obj_type()
    }

    pub fn as_str(&self) -> Option<std::cell::Ref<'_, DStr>> {
        let b = self.payload.borrow();
        match &*b {
            Payload::Str(_) => Some(std::cell::Ref::map(b, |p| match p {
                Payload::Str(s) => s,
                _ => unreachable!(),
            })),
            _ => None,
        }
    }

    pub fn with_list<R>(&self, f: impl FnOnce(&DList<Obj>) -> R) -> Option<R> {
        match &*self.payload.borrow() {
            Payload::List(l) => Some(f(l)),
            _ => None,
        }
    }

    pub fn with_list_mut<R>(&self, f: impl FnOnce(&mut DList<Obj>) -> R) -> Option<R> {
        match &mut *self.payload.borrow_mut() {
            Payload::List(l) => Some(f(l)),
            _ => None,
        }
    }

    pub fn with_set<R>(&self, f: impl FnOnce(&HTable<DStr, ()>) -> R) -> Option<R> {
        match &*self.payload.borrow() {
            Payload::Set(s) => Some(f(s)),
            _ => None,
        }
    }

    pub fn with_set_mut<R>(&self, f: impl FnOnce(&mut HTable<DStr, ()>) -> R) -> Option<R> {
        match &mut *self.payload.borrow_mut() {
            Payload::Set(s) => Some(f(s)),
            _ => None,
        }
    }

    /// Replaces this object's payload with a new STRING value, as INCR/APPEND do
    /// in place rather than allocating a brand new `Obj` (which would require the
    /// caller to also update the owning container's reference).
    pub fn set_str(&self, bytes: Vec<u8>) {
        crate::alloc::track_free(self.payload.borrow().approx_size());
        crate::alloc::track_alloc(bytes.len());
        *self.payload.borrow_mut() = Payload::Str(DStr::from(bytes));
    }

    pub fn approx_size(&self) -> usize {
        self.payload.borrow().approx_size()
    }
}

impl Drop for RObject {
    fn drop(&mut self) {
        crate::alloc::track_free(self.approx_size());
        if let Payload::Str(s) = &mut *self.payload.borrow_mut() {
            let buf = std::mem::take(s);
            recycle_str_buffer(buf.into_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read_string() {
        let o = create_string(b"hello");
        assert_eq!(o.obj_type(), ObjType::Str);
        assert_eq!(o.as_str().unwrap().as_bytes(), b"hello");
    }

    #[test]
    fn test_refcount_via_rc_clone() {
        let o = create_string(b"x");
        assert_eq!(Rc::strong_count(&o), 1);
        let o2 = Rc::clone(&o);
        assert_eq!(Rc::strong_count(&o), 2);
        drop(o2);
        assert_eq!(Rc::strong_count(&o), 1);
    }

    #[test]
    fn test_list_push_and_len() {
        let l = create_list();
        l.with_list_mut(|list| list.push_back(create_string(b"a")));
        assert_eq!(l.with_list(|list| list.len()), Some(1));
    }

    #[test]
    fn test_set_str_replaces_payload() {
        let o = create_string(b"1");
        o.set_str(b"2".to_vec());
        assert_eq!(o.as_str().unwrap().as_bytes(), b"2");
    }
}

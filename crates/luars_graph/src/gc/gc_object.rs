use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Mark of an object no traversal has visited yet.
///
/// Every traversal runs under a fresh mark generation, never this one, so a
/// freshly allocated object always looks unvisited.
pub const UNMARKED: u32 = 0;

/// Per-object header shared by every collectable kind.
#[derive(Debug)]
pub struct GcHeader {
    marked: Cell<u32>,
}

impl GcHeader {
    pub fn new() -> Self {
        GcHeader {
            marked: Cell::new(UNMARKED),
        }
    }

    /// Stamp the header with `mark`. Returns `false` if it already carried it.
    #[inline]
    pub fn mark_object(&self, mark: u32) -> bool {
        if self.marked.get() == mark {
            false
        } else {
            self.marked.set(mark);
            true
        }
    }

    #[inline]
    pub fn is_marked(&self, mark: u32) -> bool {
        self.marked.get() == mark
    }
}

impl Default for GcHeader {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GcObject<T> {
    header: GcHeader,
    data: RefCell<T>,
}

/// Shared handle to a collectable object.
///
/// Equality and hashing are by identity. An object is collected when its
/// last `Gc` handle is dropped; `GcWeak` handles observe that as clearing.
pub struct Gc<T>(Rc<GcObject<T>>);

impl<T> Gc<T> {
    pub fn new(data: T) -> Self {
        Gc(Rc::new(GcObject {
            header: GcHeader::new(),
            data: RefCell::new(data),
        }))
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.data.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.data.borrow_mut()
    }

    #[inline]
    pub fn header(&self) -> &GcHeader {
        &self.0.header
    }

    /// Address of the body, usable without borrowing it.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.0.data.as_ptr()
    }

    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Gc<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> GcWeak<T> {
        GcWeak(Rc::downgrade(&self.0))
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Take the body out if this is the last strong handle.
    pub(crate) fn try_unwrap(self) -> Result<T, Self> {
        Rc::try_unwrap(self.0)
            .map(|object| object.data.into_inner())
            .map_err(Gc)
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        Gc(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Gc<T> {}

impl<T> Hash for Gc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T> fmt::Debug for Gc<T> {
    // Bodies may be cyclic; print identity only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gc({:#x})", self.addr())
    }
}

pub struct GcWeak<T>(Weak<GcObject<T>>);

impl<T> GcWeak<T> {
    pub fn upgrade(&self) -> Option<Gc<T>> {
        self.0.upgrade().map(Gc)
    }

    /// True once the referent has been collected.
    pub fn is_cleared(&self) -> bool {
        self.0.strong_count() == 0
    }

    pub fn addr(&self) -> usize {
        self.0.as_ptr() as *const () as usize
    }
}

impl<T> Clone for GcWeak<T> {
    fn clone(&self) -> Self {
        GcWeak(Weak::clone(&self.0))
    }
}

impl<T> fmt::Debug for GcWeak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cleared() {
            write!(f, "GcWeak(<cleared>)")
        } else {
            write!(f, "GcWeak({:#x})", self.addr())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_generations() {
        let object = Gc::new(1u32);
        assert!(object.header().mark_object(1));
        assert!(!object.header().mark_object(1));
        assert!(object.header().mark_object(2));
        assert!(object.header().is_marked(2));
    }

    #[test]
    fn weak_clears_on_last_drop() {
        let object = Gc::new(String::from("x"));
        let weak = object.downgrade();
        assert!(weak.upgrade().is_some());
        drop(object);
        assert!(weak.is_cleared());
        assert!(weak.upgrade().is_none());
    }
}

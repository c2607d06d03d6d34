//! Owned wrapper over the engine's singly linked string list.

use std::ffi::{CStr, CString};
use std::fmt;
use std::ptr;

use tracing::trace;

use crate::engine::{Engine, default_engine};
use crate::error::{EasyError, EasyResult};
use crate::ffi::curl_slist;

/// Native string list (request headers, cookie lines).
///
/// The list owns its chain and always tracks the latest head returned by the
/// engine; the chain is freed with a single native call on [`StringList::dispose`]
/// or drop.
pub struct StringList {
    engine: &'static dyn Engine,
    head: *mut curl_slist,
    len: usize,
}

impl StringList {
    /// Empty list allocated by the default engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_engine(default_engine())
    }

    /// Empty list allocated by `engine`.
    #[must_use]
    pub fn with_engine(engine: &'static dyn Engine) -> Self {
        Self {
            engine,
            head: ptr::null_mut(),
            len: 0,
        }
    }

    /// Take ownership of a chain returned by `engine`.
    ///
    /// # Safety
    ///
    /// `head` must be null or a chain allocated by `engine` that nothing else
    /// frees.
    pub(crate) unsafe fn from_raw(engine: &'static dyn Engine, head: *mut curl_slist) -> Self {
        let mut list = Self::with_engine(engine);
        list.head = head;
        let mut node = head;
        while !node.is_null() {
            list.len += 1;
            // SAFETY: the caller hands over a valid chain.
            node = unsafe { (*node).next };
        }
        list
    }

    /// Append a copy of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::InvalidString`] when `value` contains a NUL byte
    /// and [`EasyError::ListAppend`] when the engine fails to allocate.
    pub fn append(&mut self, value: &str) -> EasyResult<()> {
        let value = CString::new(value).map_err(|err| EasyError::InvalidString {
            field: "string list element",
            position: err.nul_position(),
        })?;
        // SAFETY: `head` is null or a chain this list owns from the same engine.
        let head = unsafe { self.engine.slist_append(self.head, value.as_ptr()) };
        if head.is_null() {
            return Err(EasyError::ListAppend { len: self.len });
        }
        self.head = head;
        self.len += 1;
        Ok(())
    }

    /// Deep copy of every element in order.
    #[must_use]
    pub fn elements(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len);
        let mut node = self.head;
        while !node.is_null() {
            // SAFETY: the chain is owned by this list and not mutated while read.
            let current = unsafe { &*node };
            if !current.data.is_null() {
                // SAFETY: list data are NUL-terminated copies made by the engine.
                let text = unsafe { CStr::from_ptr(current.data) };
                out.push(text.to_string_lossy().into_owned());
            }
            node = current.next;
        }
        out
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the list holds no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Free the chain; the list reads empty afterwards.
    pub fn dispose(&mut self) {
        if self.head.is_null() {
            return;
        }
        trace!(len = self.len, "freeing string list");
        // SAFETY: the chain is owned by this list and freed exactly once.
        unsafe { self.engine.slist_free_all(self.head) };
        self.head = ptr::null_mut();
        self.len = 0;
    }

    pub(crate) fn as_ptr(&self) -> *const curl_slist {
        self.head
    }

    pub(crate) fn engine_name(&self) -> &'static str {
        self.engine.name()
    }
}

impl Default for StringList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StringList {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for StringList {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StringList")
            .field("engine", &self.engine.name())
            .field("elements", &self.elements())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loopback::LOOPBACK;

    #[test]
    fn append_keeps_order() -> anyhow::Result<()> {
        let mut list = StringList::with_engine(&LOOPBACK);
        list.append("A")?;
        list.append("B")?;
        assert_eq!(list.elements(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(list.len(), 2);
        Ok(())
    }

    #[test]
    fn dispose_empties_and_is_idempotent() -> anyhow::Result<()> {
        let mut list = StringList::with_engine(&LOOPBACK);
        list.append("Accept: */*")?;
        list.dispose();
        assert!(list.is_empty());
        assert!(list.elements().is_empty());
        list.dispose();
        assert_eq!(list.len(), 0);
        Ok(())
    }

    #[test]
    fn interior_nul_is_rejected_without_touching_the_chain() {
        let mut list = StringList::with_engine(&LOOPBACK);
        let err = list.append("bad\0value").expect_err("nul");
        assert!(matches!(
            err,
            EasyError::InvalidString { position: 3, .. }
        ));
        assert!(list.is_empty());
    }

    #[test]
    fn from_raw_adopts_an_engine_chain() {
        let first = CString::new("one").expect("first");
        let second = CString::new("two").expect("second");
        let list = unsafe {
            let head = LOOPBACK.slist_append(ptr::null_mut(), first.as_ptr());
            let head = LOOPBACK.slist_append(head, second.as_ptr());
            StringList::from_raw(&LOOPBACK, head)
        };
        assert_eq!(list.len(), 2);
        assert_eq!(list.elements(), vec!["one".to_string(), "two".to_string()]);
    }
}

//! Copies between engine-owned memory and owned byte buffers.
//!
//! Buffers handed over by the engine are raw, unterminated spans; nothing in
//! here ever looks for a terminator.

use std::ptr;

/// Copy `len` bytes starting at `src` into a freshly allocated vector.
///
/// A null `src` or a zero `len` yields an empty vector.
///
/// # Safety
///
/// When `src` is non-null it must be valid for reads of `len` bytes for the
/// duration of the call.
#[must_use]
pub unsafe fn copy_in(src: *const u8, len: usize) -> Vec<u8> {
    if src.is_null() || len == 0 {
        return Vec::new();
    }
    let mut owned = Vec::with_capacity(len);
    // SAFETY: the caller guarantees `src` is readable for `len` bytes and the
    // vector was allocated with capacity `len`.
    unsafe {
        ptr::copy_nonoverlapping(src, owned.as_mut_ptr(), len);
        owned.set_len(len);
    }
    owned
}

/// Copy at most `max` bytes of `bytes` into `dst`, returning the copied count.
///
/// # Safety
///
/// When `dst` is non-null it must be valid for writes of `max` bytes and must
/// not overlap `bytes`.
pub unsafe fn copy_out(bytes: &[u8], dst: *mut u8, max: usize) -> usize {
    if dst.is_null() {
        return 0;
    }
    let count = bytes.len().min(max);
    // SAFETY: `count <= max` and the caller guarantees `dst` is writable for
    // `max` bytes without overlapping the source slice.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), dst, count);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_in_takes_exactly_the_delivered_length() {
        let source = *b"header: value\r\nnext";
        let owned = unsafe { copy_in(source.as_ptr(), 13) };
        assert_eq!(owned.len(), 13);
        assert_eq!(owned, b"header: value");
    }

    #[test]
    fn copy_in_does_not_depend_on_a_terminator() {
        let source = [0_u8, 1, 0, 255, 0];
        let owned = unsafe { copy_in(source.as_ptr(), source.len()) };
        assert_eq!(owned, source);
    }

    #[test]
    fn copy_in_handles_null_and_empty_spans() {
        assert!(unsafe { copy_in(ptr::null(), 16) }.is_empty());
        let source = [1_u8];
        assert!(unsafe { copy_in(source.as_ptr(), 0) }.is_empty());
    }

    #[test]
    fn copy_out_truncates_to_capacity() {
        let mut native = [0_u8; 4];
        let copied = unsafe { copy_out(b"abcdef", native.as_mut_ptr(), native.len()) };
        assert_eq!(copied, 4);
        assert_eq!(&native, b"abcd");
    }

    #[test]
    fn copy_out_reports_short_payloads() {
        let mut native = [0_u8; 8];
        let copied = unsafe { copy_out(b"xy", native.as_mut_ptr(), native.len()) };
        assert_eq!(copied, 2);
        assert_eq!(&native[..2], b"xy");
        assert_eq!(unsafe { copy_out(b"xy", ptr::null_mut(), 8) }, 0);
    }
}

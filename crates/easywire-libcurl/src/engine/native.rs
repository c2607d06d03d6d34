//! Bindings to the system libcurl, linked by `build.rs`.

use std::ffi::CStr;

use libc::{c_char, c_double, c_long, c_void};

use super::{Engine, NativeCallback};
use crate::ffi::{CURL, CURLINFO, CURLcode, CURLoption, curl_slist};

unsafe extern "C" {
    fn curl_global_init(flags: c_long) -> CURLcode;
    fn curl_global_cleanup();
    fn curl_version() -> *const c_char;
    fn curl_easy_init() -> *mut CURL;
    fn curl_easy_cleanup(handle: *mut CURL);
    fn curl_easy_duphandle(handle: *mut CURL) -> *mut CURL;
    fn curl_easy_reset(handle: *mut CURL);
    fn curl_easy_perform(handle: *mut CURL) -> CURLcode;
    fn curl_easy_setopt(handle: *mut CURL, option: CURLoption, ...) -> CURLcode;
    fn curl_easy_getinfo(handle: *mut CURL, info: CURLINFO, ...) -> CURLcode;
    fn curl_easy_strerror(code: CURLcode) -> *const c_char;
    fn curl_slist_append(list: *mut curl_slist, data: *const c_char) -> *mut curl_slist;
    fn curl_slist_free_all(list: *mut curl_slist);
}

/// The system libcurl.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibCurl;

/// Shared instance returned by [`super::default_engine`].
pub static LIBCURL: LibCurl = LibCurl;

fn owned_c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: libcurl returns pointers to static NUL-terminated strings.
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

// SAFETY: every method forwards to the matching libcurl entry point.
unsafe impl Engine for LibCurl {
    fn name(&self) -> &'static str {
        "libcurl"
    }

    fn global_init(&self, flags: c_long) -> CURLcode {
        // SAFETY: serialised by the global reference count.
        unsafe { curl_global_init(flags) }
    }

    fn global_cleanup(&self) {
        // SAFETY: serialised by the global reference count; no handles remain.
        unsafe { curl_global_cleanup() }
    }

    fn version(&self) -> String {
        // SAFETY: no preconditions.
        owned_c_string(unsafe { curl_version() })
    }

    fn strerror(&self, code: CURLcode) -> String {
        // SAFETY: accepts any code and returns a static string.
        owned_c_string(unsafe { curl_easy_strerror(code) })
    }

    unsafe fn easy_init(&self) -> *mut CURL {
        unsafe { curl_easy_init() }
    }

    unsafe fn easy_cleanup(&self, handle: *mut CURL) {
        unsafe { curl_easy_cleanup(handle) }
    }

    unsafe fn easy_duphandle(&self, handle: *mut CURL) -> *mut CURL {
        unsafe { curl_easy_duphandle(handle) }
    }

    unsafe fn easy_reset(&self, handle: *mut CURL) {
        unsafe { curl_easy_reset(handle) }
    }

    unsafe fn easy_perform(&self, handle: *mut CURL) -> CURLcode {
        unsafe { curl_easy_perform(handle) }
    }

    unsafe fn setopt_long(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        value: c_long,
    ) -> CURLcode {
        unsafe { curl_easy_setopt(handle, option, value) }
    }

    unsafe fn setopt_ptr(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        value: *const c_void,
    ) -> CURLcode {
        unsafe { curl_easy_setopt(handle, option, value) }
    }

    unsafe fn setopt_callback(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        callback: NativeCallback,
    ) -> CURLcode {
        unsafe { curl_easy_setopt(handle, option, callback.as_ptr()) }
    }

    unsafe fn getinfo_long(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut c_long,
    ) -> CURLcode {
        unsafe { curl_easy_getinfo(handle, info, std::ptr::from_mut(out)) }
    }

    unsafe fn getinfo_double(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut c_double,
    ) -> CURLcode {
        unsafe { curl_easy_getinfo(handle, info, std::ptr::from_mut(out)) }
    }

    unsafe fn getinfo_ptr(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut *mut c_void,
    ) -> CURLcode {
        unsafe { curl_easy_getinfo(handle, info, std::ptr::from_mut(out)) }
    }

    unsafe fn slist_append(&self, list: *mut curl_slist, data: *const c_char) -> *mut curl_slist {
        unsafe { curl_slist_append(list, data) }
    }

    unsafe fn slist_free_all(&self, list: *mut curl_slist) {
        unsafe { curl_slist_free_all(list) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi;

    #[test]
    fn strerror_describes_known_codes() {
        assert!(!LIBCURL.strerror(ffi::CURLE_WRITE_ERROR).is_empty());
    }

    #[test]
    fn version_mentions_libcurl() {
        assert!(LIBCURL.version().contains("libcurl"));
    }
}

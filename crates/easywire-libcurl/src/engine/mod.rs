//! Seam between the safety layer and the native transfer engine.
//!
//! # Design
//! - `Engine` mirrors the C entry points one-to-one; callers stay responsible
//!   for the pointer contracts, so every handle-taking method is `unsafe`.
//! - `LibCurl` binds the system library behind the `libcurl` feature.
//! - `LoopbackEngine` honours the same ABI in-process and echoes request
//!   bodies; it is the default when the native library is not compiled in.

use libc::{c_char, c_double, c_long, c_void};

use crate::ffi::{
    CURL, CURLINFO, CURLcode, CURLoption, curl_data_callback, curl_debug_callback,
    curl_progress_callback, curl_slist,
};

pub mod loopback;
#[cfg(feature = "libcurl")]
pub mod native;

pub use loopback::LoopbackEngine;
#[cfg(feature = "libcurl")]
pub use native::LibCurl;

/// Function pointer installed through a function-pointer option.
#[derive(Debug, Clone, Copy)]
pub enum NativeCallback {
    /// Write, read or header callback.
    Data(curl_data_callback),
    /// Legacy progress callback.
    Progress(curl_progress_callback),
    /// Debug trace callback.
    Debug(curl_debug_callback),
}

impl NativeCallback {
    /// Untyped pointer form handed to the variadic option setter.
    #[must_use]
    pub fn as_ptr(self) -> *const c_void {
        match self {
            Self::Data(callback) => callback as *const c_void,
            Self::Progress(callback) => callback as *const c_void,
            Self::Debug(callback) => callback as *const c_void,
        }
    }
}

/// Entry points of a C-ABI easy-interface transfer engine.
///
/// Handle-taking methods are `unsafe`: the handle must come from
/// [`Engine::easy_init`] or [`Engine::easy_duphandle`] of the same engine and
/// must not have been cleaned up.
///
/// # Safety
///
/// The safety layer dereferences what an implementation hands back, so an
/// implementation must behave like libcurl:
/// - `easy_init` and `easy_duphandle` return null or a handle that stays valid
///   until `easy_cleanup`.
/// - `slist_append` returns null or the head of a well-formed chain whose
///   nodes hold NUL-terminated copies; `slist_free_all` frees exactly such a
///   chain.
/// - `getinfo_ptr` stores null, a NUL-terminated string, or (for slist infos)
///   a chain the caller owns.
/// - Installed callbacks are only ever invoked during `easy_perform` on the
///   calling thread, with the data pointer installed for their category and a
///   buffer valid for the reported length.
/// - `name` is unique per implementation.
pub unsafe trait Engine: Sync + 'static {
    /// Stable identifier used for process-wide bookkeeping.
    fn name(&self) -> &'static str;

    /// Process-wide initialisation (`curl_global_init`).
    fn global_init(&self, flags: c_long) -> CURLcode;

    /// Process-wide teardown (`curl_global_cleanup`).
    fn global_cleanup(&self);

    /// Engine version banner.
    fn version(&self) -> String;

    /// Human readable description of a status code.
    fn strerror(&self, code: CURLcode) -> String;

    /// Allocate a new easy handle; null on failure.
    ///
    /// # Safety
    ///
    /// The engine must be globally initialised.
    unsafe fn easy_init(&self) -> *mut CURL;

    /// Destroy an easy handle.
    ///
    /// # Safety
    ///
    /// `handle` must be live and is invalid afterwards.
    unsafe fn easy_cleanup(&self, handle: *mut CURL);

    /// Clone an easy handle including its option values.
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn easy_duphandle(&self, handle: *mut CURL) -> *mut CURL;

    /// Restore every option of `handle` to its default.
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn easy_reset(&self, handle: *mut CURL);

    /// Run the configured transfer, invoking callbacks on this thread.
    ///
    /// # Safety
    ///
    /// `handle` must be live and every pointer installed on it must still be
    /// valid.
    unsafe fn easy_perform(&self, handle: *mut CURL) -> CURLcode;

    /// Set a `long` option.
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn setopt_long(&self, handle: *mut CURL, option: CURLoption, value: c_long)
    -> CURLcode;

    /// Set an object pointer option (string or opaque data).
    ///
    /// # Safety
    ///
    /// `handle` must be live; `value` must stay valid for as long as the
    /// engine may read it.
    unsafe fn setopt_ptr(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        value: *const c_void,
    ) -> CURLcode;

    /// Install a function pointer option.
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn setopt_callback(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        callback: NativeCallback,
    ) -> CURLcode;

    /// Read a `long` info value.
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn getinfo_long(&self, handle: *mut CURL, info: CURLINFO, out: &mut c_long)
    -> CURLcode;

    /// Read a `double` info value.
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn getinfo_double(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut c_double,
    ) -> CURLcode;

    /// Read a pointer info value (string or string list).
    ///
    /// # Safety
    ///
    /// `handle` must be live.
    unsafe fn getinfo_ptr(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut *mut c_void,
    ) -> CURLcode;

    /// Append a copy of `data` to `list`, returning the new head (null on
    /// allocation failure).
    ///
    /// # Safety
    ///
    /// `list` must be null or a chain produced by this engine; `data` must be
    /// a valid NUL-terminated string.
    unsafe fn slist_append(&self, list: *mut curl_slist, data: *const c_char) -> *mut curl_slist;

    /// Free a whole chain.
    ///
    /// # Safety
    ///
    /// `list` must be null or a chain produced by this engine; it is invalid
    /// afterwards.
    unsafe fn slist_free_all(&self, list: *mut curl_slist);
}

/// Engine used when callers do not pick one explicitly.
#[must_use]
pub fn default_engine() -> &'static dyn Engine {
    #[cfg(feature = "libcurl")]
    {
        &native::LIBCURL
    }

    #[cfg(not(feature = "libcurl"))]
    {
        &loopback::LOOPBACK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::CURL;
    use libc::size_t;

    unsafe extern "C" fn noop_data(
        _buffer: *mut c_char,
        _size: size_t,
        _nmemb: size_t,
        _userdata: *mut c_void,
    ) -> size_t {
        0
    }

    unsafe extern "C" fn noop_debug(
        _handle: *mut CURL,
        _kind: crate::ffi::curl_infotype,
        _data: *mut c_char,
        _size: size_t,
        _userptr: *mut c_void,
    ) -> libc::c_int {
        0
    }

    #[test]
    fn callback_pointers_are_distinct_and_non_null() {
        let data = NativeCallback::Data(noop_data).as_ptr();
        let debug = NativeCallback::Debug(noop_debug).as_ptr();
        assert!(!data.is_null());
        assert!(!debug.is_null());
        assert_ne!(data, debug);
    }

    #[test]
    fn default_engine_reports_a_name_and_version() {
        let engine = default_engine();
        assert!(!engine.name().is_empty());
        assert!(!engine.version().is_empty());
    }
}

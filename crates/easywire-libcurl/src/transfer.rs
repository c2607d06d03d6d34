//! Owned easy handle with typed option setters and callback registration.
//!
//! # Design
//! - A `Transfer` owns exactly one native handle and destroys it at most once.
//! - All five trampolines are installed when the handle is created (and again
//!   after a reset or duplicate); every category's data pointer is the address
//!   of the handle's [`Bindings`]. The engine's `FILE*` defaults never see it.
//! - User objects are pinned behind tokens and never handed to the engine as
//!   raw references; only `CURLOPT_PRIVATE` and the category data options
//!   accept them.
//! - Strings, post fields and header lists given to the engine are retained by
//!   the handle until they are replaced or the handle is cleaned up.
//! - Engine failures are returned as [`CurlCode`] values; using a cleaned-up
//!   handle is a defect and panics.

use std::any::Any;
use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::mem;
use std::ops::ControlFlow;
use std::panic;
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::time::Duration;

use libc::{c_char, c_double, c_long, c_void};
use tracing::{debug, warn};

use crate::code::{CurlCode, InfoType};
use crate::engine::{Engine, default_engine};
use crate::error::{EasyError, EasyResult};
use crate::ffi::{self, CURL, CURLINFO, CURLoption};
use crate::global::GlobalGuard;
use crate::registry::{Context, Token};
use crate::slist::StringList;
use crate::trampoline::{
    Bindings, Category, DebugCallback, Progress, ProgressCallback, ReadCallback, WriteCallback,
};

/// Value category of an option identifier, derived from its numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    Long,
    Object,
    Function,
    OffT,
}

impl OptionKind {
    const fn of(option: CURLoption) -> Option<Self> {
        match option {
            ffi::CURLOPTTYPE_LONG..ffi::CURLOPTTYPE_OBJECTPOINT => Some(Self::Long),
            ffi::CURLOPTTYPE_OBJECTPOINT..ffi::CURLOPTTYPE_FUNCTIONPOINT => Some(Self::Object),
            ffi::CURLOPTTYPE_FUNCTIONPOINT..ffi::CURLOPTTYPE_OFF_T => Some(Self::Function),
            ffi::CURLOPTTYPE_OFF_T..40_000 => Some(Self::OffT),
            _ => None,
        }
    }
}

/// Object options that take a NUL-terminated string.
fn is_string_option(option: CURLoption) -> bool {
    OptionKind::of(option) == Some(OptionKind::Object)
        && !ffi::NON_STRING_OBJECT_OPTIONS.contains(&option)
}

/// One configured transfer over a native easy handle.
pub struct Transfer {
    engine: &'static dyn Engine,
    raw: Option<NonNull<CURL>>,
    bindings: Rc<Bindings>,
    strings: HashMap<CURLoption, CString>,
    post_fields: Option<Box<[u8]>>,
    headers: Option<StringList>,
    private: Token,
    _global: GlobalGuard,
}

impl Transfer {
    /// Create a handle on the default engine.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot be initialised or refuses to
    /// allocate a handle.
    pub fn new() -> EasyResult<Self> {
        Self::with_engine(default_engine())
    }

    /// Create a handle on `engine`.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot be initialised or refuses to
    /// allocate a handle.
    pub fn with_engine(engine: &'static dyn Engine) -> EasyResult<Self> {
        let global = GlobalGuard::acquire(engine)?;
        // SAFETY: the engine is globally initialised by `global`.
        let raw = NonNull::new(unsafe { engine.easy_init() }).ok_or(EasyError::HandleInit {
            engine: engine.name(),
        })?;
        let mut transfer = Self::from_parts(engine, raw, global);
        transfer.bind_native()?;
        debug!(engine = engine.name(), "transfer handle created");
        Ok(transfer)
    }

    fn from_parts(engine: &'static dyn Engine, raw: NonNull<CURL>, global: GlobalGuard) -> Self {
        Self {
            engine,
            raw: Some(raw),
            bindings: Bindings::new(),
            strings: HashMap::new(),
            post_fields: None,
            headers: None,
            private: Token::NONE,
            _global: global,
        }
    }

    /// Install every category's trampoline and point its data option at this
    /// handle's bindings.
    fn bind_native(&mut self) -> EasyResult<()> {
        let userdata = self.bindings.userdata();
        for category in Category::ALL {
            // SAFETY: the handle is live; trampolines are plain functions that
            // only dereference the bindings installed next to them.
            CurlCode::from_raw(unsafe {
                self.engine.setopt_callback(
                    self.handle(),
                    category.function_option(),
                    category.trampoline(),
                )
            })
            .into_result("install callback trampoline")?;
            self.setopt_ptr(category.data_option(), userdata)
                .into_result("bind callback data")?;
        }
        Ok(())
    }

    fn handle(&self) -> *mut CURL {
        match self.raw {
            Some(raw) => raw.as_ptr(),
            None => panic!("transfer handle used after cleanup"),
        }
    }

    fn setopt_long(&self, option: CURLoption, value: c_long) -> CurlCode {
        // SAFETY: `handle` panics unless the native handle is live.
        CurlCode::from_raw(unsafe { self.engine.setopt_long(self.handle(), option, value) })
    }

    fn setopt_ptr(&self, option: CURLoption, value: *const c_void) -> CurlCode {
        // SAFETY: the handle is live; callers keep `value` alive while installed.
        CurlCode::from_raw(unsafe { self.engine.setopt_ptr(self.handle(), option, value) })
    }

    /// Engine this handle was created on.
    #[must_use]
    pub fn engine(&self) -> &'static dyn Engine {
        self.engine
    }

    /// Whether the native handle is still owned.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.raw.is_some()
    }

    /// Live pins held by this handle (callables and associated data).
    #[must_use]
    pub fn pin_count(&self) -> usize {
        self.bindings.pin_count()
    }

    /// Set a string option. The handle keeps its own copy alive.
    ///
    /// Returns `CURLE_BAD_FUNCTION_ARGUMENT` without calling the engine when
    /// `option` is not a string option (buffers, lists, native structures and
    /// data pointers included) or `value` contains a NUL byte.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_str(&mut self, option: CURLoption, value: &str) -> CurlCode {
        self.handle();
        if !is_string_option(option) {
            return CurlCode::BAD_FUNCTION_ARGUMENT;
        }
        if option == ffi::CURLOPT_POSTFIELDS {
            return self.post_fields(value.as_bytes());
        }
        let value = match CString::new(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(option, position = err.nul_position(), "string option contains a NUL byte");
                return CurlCode::BAD_FUNCTION_ARGUMENT;
            }
        };
        let code = self.setopt_ptr(option, value.as_ptr().cast::<c_void>());
        if code.is_ok() {
            self.strings.insert(option, value);
        }
        code
    }

    /// Set an integer option.
    ///
    /// Returns `CURLE_BAD_FUNCTION_ARGUMENT` without calling the engine when
    /// `option` is not a `long` option.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_long(&mut self, option: CURLoption, value: c_long) -> CurlCode {
        self.handle();
        if OptionKind::of(option) != Some(OptionKind::Long) {
            return CurlCode::BAD_FUNCTION_ARGUMENT;
        }
        self.setopt_long(option, value)
    }

    /// Set a boolean option (a `long` option holding 0 or 1).
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_bool(&mut self, option: CURLoption, value: bool) -> CurlCode {
        self.set_long(option, c_long::from(value))
    }

    /// Attach an object to an opaque data option.
    ///
    /// Callback data options route to the matching category;
    /// `CURLOPT_PRIVATE` receives the object's registry token. Every other
    /// option returns `CURLE_BAD_FUNCTION_ARGUMENT` without calling the engine.
    /// The previous object for the option is released.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_data(&mut self, option: CURLoption, data: Option<Context>) -> CurlCode {
        self.handle();
        if let Some(category) = Category::from_data_option(option) {
            self.bindings.set_data(category, data);
            return CurlCode::OK;
        }
        if option != ffi::CURLOPT_PRIVATE {
            return CurlCode::BAD_FUNCTION_ARGUMENT;
        }
        let token = self.bindings.pin_extra(data);
        let code = self.setopt_ptr(option, ptr::without_provenance(token.into_raw()));
        if !code.is_ok() {
            self.bindings.release_extra(token);
            return code;
        }
        let previous = mem::replace(&mut self.private, token);
        self.bindings.release_extra(previous);
        code
    }

    /// Register or clear the response body callback.
    ///
    /// The callable receives each delivered chunk and returns the number of
    /// bytes it consumed; any other count aborts the transfer with
    /// `CURLE_WRITE_ERROR`. Without a callable, delivered bytes are discarded.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_write_callback<F>(&mut self, callback: Option<F>) -> CurlCode
    where
        F: FnMut(Vec<u8>, Option<&dyn Any>) -> usize + 'static,
    {
        self.handle();
        self.bindings
            .set_write(callback.map(|callable| Box::new(callable) as Box<WriteCallback>));
        CurlCode::OK
    }

    /// Register or clear the request body callback.
    ///
    /// The callable receives the buffer capacity and returns the next chunk;
    /// `None` or an empty chunk ends the input. Chunks longer than the capacity
    /// are truncated.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_read_callback<F>(&mut self, callback: Option<F>) -> CurlCode
    where
        F: FnMut(usize, Option<&dyn Any>) -> Option<Vec<u8>> + 'static,
    {
        self.handle();
        self.bindings
            .set_read(callback.map(|callable| Box::new(callable) as Box<ReadCallback>));
        CurlCode::OK
    }

    /// Register or clear the progress callback; registering enables progress
    /// reporting on the engine and clearing disables it again.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_progress_callback<F>(&mut self, callback: Option<F>) -> CurlCode
    where
        F: FnMut(Progress, Option<&dyn Any>) -> ControlFlow<()> + 'static,
    {
        self.handle();
        let registering = callback.is_some();
        self.bindings
            .set_progress(callback.map(|callable| Box::new(callable) as Box<ProgressCallback>));
        self.setopt_long(ffi::CURLOPT_NOPROGRESS, c_long::from(!registering))
    }

    /// Register or clear the response header callback; same contract as the
    /// write callback, one header line per call.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_header_callback<F>(&mut self, callback: Option<F>) -> CurlCode
    where
        F: FnMut(Vec<u8>, Option<&dyn Any>) -> usize + 'static,
    {
        self.handle();
        self.bindings
            .set_header(callback.map(|callable| Box::new(callable) as Box<WriteCallback>));
        CurlCode::OK
    }

    /// Register or clear the debug trace callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_debug_callback<F>(&mut self, callback: Option<F>) -> CurlCode
    where
        F: FnMut(InfoType, &str, Option<&dyn Any>) + 'static,
    {
        self.handle();
        self.bindings
            .set_debug(callback.map(|callable| Box::new(callable) as Box<DebugCallback>));
        CurlCode::OK
    }

    fn set_category_data(&mut self, category: Category, data: Option<Context>) {
        self.handle();
        self.bindings.set_data(category, data);
    }

    /// Object handed to the write callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_write_data(&mut self, data: Option<Context>) {
        self.set_category_data(Category::Write, data);
    }

    /// Object handed to the read callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_read_data(&mut self, data: Option<Context>) {
        self.set_category_data(Category::Read, data);
    }

    /// Object handed to the progress callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_progress_data(&mut self, data: Option<Context>) {
        self.set_category_data(Category::Progress, data);
    }

    /// Object handed to the header callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_header_data(&mut self, data: Option<Context>) {
        self.set_category_data(Category::Header, data);
    }

    /// Object handed to the debug callback.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn set_debug_data(&mut self, data: Option<Context>) {
        self.set_category_data(Category::Debug, data);
    }

    /// Target URL.
    pub fn url(&mut self, url: &str) -> CurlCode {
        self.set_str(ffi::CURLOPT_URL, url)
    }

    /// `User-Agent` header value.
    pub fn user_agent(&mut self, agent: &str) -> CurlCode {
        self.set_str(ffi::CURLOPT_USERAGENT, agent)
    }

    /// Follow redirects.
    pub fn follow_location(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_FOLLOWLOCATION, enable)
    }

    /// Issue a POST.
    pub fn post(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_POST, enable)
    }

    /// Upload the read callback's data.
    pub fn upload(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_UPLOAD, enable)
    }

    /// Issue a PUT.
    pub fn put(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_PUT, enable)
    }

    /// Replace the request method.
    pub fn custom_request(&mut self, method: &str) -> CurlCode {
        self.set_str(ffi::CURLOPT_CUSTOMREQUEST, method)
    }

    /// Size of the upload, when known.
    pub fn upload_size(&mut self, size: u64) -> CurlCode {
        match c_long::try_from(size) {
            Ok(size) => self.set_long(ffi::CURLOPT_INFILESIZE, size),
            Err(_) => CurlCode::BAD_FUNCTION_ARGUMENT,
        }
    }

    /// Request body sent as-is; the handle keeps its own copy.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn post_fields(&mut self, body: &[u8]) -> CurlCode {
        let Ok(len) = c_long::try_from(body.len()) else {
            return CurlCode::BAD_FUNCTION_ARGUMENT;
        };
        let code = self.setopt_long(ffi::CURLOPT_POSTFIELDSIZE, len);
        if !code.is_ok() {
            return code;
        }
        let owned: Box<[u8]> = body.into();
        let code = self.setopt_ptr(ffi::CURLOPT_POSTFIELDS, owned.as_ptr().cast::<c_void>());
        if code.is_ok() {
            self.post_fields = Some(owned);
        }
        code
    }

    /// Declared request body size; `-1` lets the engine measure the body.
    pub fn post_field_size(&mut self, size: c_long) -> CurlCode {
        self.set_long(ffi::CURLOPT_POSTFIELDSIZE, size)
    }

    /// Request headers; the handle takes ownership of the list.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn http_headers(&mut self, list: StringList) -> CurlCode {
        self.handle();
        if list.engine_name() != self.engine.name() {
            return CurlCode::BAD_FUNCTION_ARGUMENT;
        }
        let code = self.setopt_ptr(ffi::CURLOPT_HTTPHEADER, list.as_ptr().cast::<c_void>());
        if code.is_ok() {
            self.headers = Some(list);
        }
        code
    }

    /// File cookies are read from.
    pub fn cookie_file(&mut self, path: &str) -> CurlCode {
        self.set_str(ffi::CURLOPT_COOKIEFILE, path)
    }

    /// File cookies are written to on cleanup.
    pub fn cookie_jar(&mut self, path: &str) -> CurlCode {
        self.set_str(ffi::CURLOPT_COOKIEJAR, path)
    }

    /// Feed one cookie line or command (`ALL`, `SESS`, `FLUSH`, `RELOAD`).
    pub fn cookie_list(&mut self, line: &str) -> CurlCode {
        self.set_str(ffi::CURLOPT_COOKIELIST, line)
    }

    /// Emit debug trace messages.
    pub fn verbose(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_VERBOSE, enable)
    }

    /// Limit the whole transfer, in whole seconds.
    pub fn timeout(&mut self, timeout: Duration) -> CurlCode {
        self.set_long(ffi::CURLOPT_TIMEOUT, seconds(timeout))
    }

    /// Limit the connection phase, in whole seconds.
    pub fn connect_timeout(&mut self, timeout: Duration) -> CurlCode {
        self.set_long(ffi::CURLOPT_CONNECTTIMEOUT, seconds(timeout))
    }

    /// Keep the engine away from signal handlers.
    pub fn no_signal(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_NOSIGNAL, enable)
    }

    /// Verify the server certificate; `false` accepts any certificate.
    pub fn ssl_verify_peer(&mut self, enable: bool) -> CurlCode {
        self.set_bool(ffi::CURLOPT_SSL_VERIFYPEER, enable)
    }

    /// Limit the wait for each FTP server response, in whole seconds.
    pub fn ftp_response_timeout(&mut self, timeout: Duration) -> CurlCode {
        self.set_long(ffi::CURLOPT_FTP_RESPONSE_TIMEOUT, seconds(timeout))
    }

    /// Run the transfer, blocking until it completes.
    ///
    /// Callbacks run synchronously on this thread. A panic raised inside a
    /// callback aborts the transfer and is resumed here once the engine has
    /// returned.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up or a callback panicked.
    pub fn perform(&mut self) -> CurlCode {
        let handle = self.handle();
        debug!(engine = self.engine.name(), "performing transfer");
        // SAFETY: the handle is live and every installed pointer is retained
        // by `self` for the duration of the call.
        let code = CurlCode::from_raw(unsafe { self.engine.easy_perform(handle) });
        if let Some(payload) = self.bindings.take_panic() {
            panic::resume_unwind(payload);
        }
        debug!(code = code.raw(), "transfer finished");
        code
    }

    fn info_long(&self, info: CURLINFO, operation: &'static str) -> EasyResult<c_long> {
        let mut value: c_long = 0;
        // SAFETY: the handle is live.
        CurlCode::from_raw(unsafe { self.engine.getinfo_long(self.handle(), info, &mut value) })
            .into_result(operation)?;
        Ok(value)
    }

    fn info_double(&self, info: CURLINFO, operation: &'static str) -> EasyResult<c_double> {
        let mut value: c_double = 0.0;
        // SAFETY: the handle is live.
        CurlCode::from_raw(unsafe { self.engine.getinfo_double(self.handle(), info, &mut value) })
            .into_result(operation)?;
        Ok(value)
    }

    fn info_ptr(&self, info: CURLINFO, operation: &'static str) -> EasyResult<*mut c_void> {
        let mut value: *mut c_void = ptr::null_mut();
        // SAFETY: the handle is live.
        CurlCode::from_raw(unsafe { self.engine.getinfo_ptr(self.handle(), info, &mut value) })
            .into_result(operation)?;
        Ok(value)
    }

    /// Last response status code, 0 before any response.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the engine rejects the query.
    pub fn response_code(&self) -> EasyResult<i64> {
        self.info_long(ffi::CURLINFO_RESPONSE_CODE, "response code")
            .map(i64::from)
    }

    /// Duration of the last transfer.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the engine rejects the query.
    pub fn total_time(&self) -> EasyResult<Duration> {
        let seconds = self.info_double(ffi::CURLINFO_TOTAL_TIME, "total time")?;
        Ok(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO))
    }

    /// URL of the last request, after redirects.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the engine rejects the query.
    pub fn effective_url(&self) -> EasyResult<Option<String>> {
        let value = self.info_ptr(ffi::CURLINFO_EFFECTIVE_URL, "effective url")?;
        if value.is_null() {
            return Ok(None);
        }
        // SAFETY: the engine returns a NUL-terminated string it owns until the
        // next call on this handle; it is copied immediately.
        let text = unsafe { std::ffi::CStr::from_ptr(value.cast::<c_char>()) };
        Ok(Some(text.to_string_lossy().into_owned()))
    }

    /// Bytes downloaded by the last transfer.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the engine rejects the query.
    pub fn size_download(&self) -> EasyResult<f64> {
        self.info_double(ffi::CURLINFO_SIZE_DOWNLOAD, "size download")
    }

    /// Bytes uploaded by the last transfer.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the engine rejects the query.
    pub fn size_upload(&self) -> EasyResult<f64> {
        self.info_double(ffi::CURLINFO_SIZE_UPLOAD, "size upload")
    }

    /// Cookies currently known to the handle.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the engine rejects the query.
    pub fn cookies(&self) -> EasyResult<StringList> {
        let head = self.info_ptr(ffi::CURLINFO_COOKIELIST, "cookie list")?;
        // SAFETY: the engine hands over a fresh chain the caller must free.
        Ok(unsafe { StringList::from_raw(self.engine, head.cast::<ffi::curl_slist>()) })
    }

    /// Engine version banner.
    #[must_use]
    pub fn version(&self) -> String {
        self.engine.version()
    }

    /// Restore every option to its default and drop every registration.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects re-binding the callback data.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn reset(&mut self) -> EasyResult<()> {
        let handle = self.handle();
        // SAFETY: the handle is live.
        unsafe { self.engine.easy_reset(handle) };
        self.release_retained();
        self.bind_native()?;
        debug!("transfer handle reset");
        Ok(())
    }

    /// Clone the handle's engine-side options into a new, independent handle.
    ///
    /// The copy starts without registered callables or associated data; its
    /// header list and private pointer are cleared, progress reporting is off
    /// when it relied on a registered callback, and post fields are copied.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot duplicate the handle.
    ///
    /// # Panics
    ///
    /// Panics when the handle has been cleaned up.
    pub fn duplicate(&self) -> EasyResult<Self> {
        let handle = self.handle();
        let global = GlobalGuard::acquire(self.engine)?;
        // SAFETY: the handle is live.
        let raw = NonNull::new(unsafe { self.engine.easy_duphandle(handle) }).ok_or(
            EasyError::HandleInit {
                engine: self.engine.name(),
            },
        )?;
        let mut copy = Self::from_parts(self.engine, raw, global);
        copy.bind_native()?;
        if self.headers.is_some() {
            copy.setopt_ptr(ffi::CURLOPT_HTTPHEADER, ptr::null())
                .into_result("clear inherited header list")?;
        }
        if !self.private.is_none() {
            copy.setopt_ptr(ffi::CURLOPT_PRIVATE, ptr::null())
                .into_result("clear inherited private pointer")?;
        }
        if self.bindings.is_registered(Category::Progress) {
            copy.setopt_long(ffi::CURLOPT_NOPROGRESS, 1)
                .into_result("disable inherited progress")?;
        }
        if let Some(fields) = &self.post_fields {
            copy.post_fields(fields).into_result("copy post fields")?;
        }
        debug!(engine = self.engine.name(), "transfer handle duplicated");
        Ok(copy)
    }

    /// Destroy the native handle and release every pin. Idempotent.
    pub fn cleanup(&mut self) {
        let Some(raw) = self.raw.take() else {
            return;
        };
        // SAFETY: `raw` was live and is destroyed exactly once.
        unsafe { self.engine.easy_cleanup(raw.as_ptr()) };
        self.release_retained();
        debug!(engine = self.engine.name(), "transfer handle cleaned up");
    }

    fn release_retained(&mut self) {
        self.bindings.release_all();
        let private = mem::replace(&mut self.private, Token::NONE);
        self.bindings.release_extra(private);
        self.headers = None;
        self.post_fields = None;
        self.strings.clear();
    }
}

fn seconds(duration: Duration) -> c_long {
    c_long::try_from(duration.as_secs()).unwrap_or(c_long::MAX)
}

impl Drop for Transfer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Transfer")
            .field("engine", &self.engine.name())
            .field("live", &self.is_live())
            .field("bindings", &self.bindings)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loopback::{self, LOOPBACK};
    use std::cell::{Cell, RefCell};

    fn transfer() -> Transfer {
        Transfer::with_engine(&LOOPBACK).expect("loopback handle")
    }

    fn collect_body(transfer: &mut Transfer) -> Rc<RefCell<Vec<u8>>> {
        let body = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&body);
        assert!(
            transfer
                .set_write_callback(Some(move |data: Vec<u8>, _: Option<&dyn Any>| {
                    sink.borrow_mut().extend_from_slice(&data);
                    data.len()
                }))
                .is_ok()
        );
        body
    }

    #[test]
    fn new_handle_holds_no_pins() {
        let transfer = transfer();
        assert!(transfer.is_live());
        assert_eq!(transfer.pin_count(), 0);
    }

    #[test]
    fn replacing_a_callback_keeps_one_pin_and_none_releases_it() {
        let mut transfer = transfer();
        assert!(
            transfer
                .set_write_callback(Some(|data: Vec<u8>, _: Option<&dyn Any>| data.len()))
                .is_ok()
        );
        assert!(
            transfer
                .set_write_callback(Some(|_: Vec<u8>, _: Option<&dyn Any>| 0_usize))
                .is_ok()
        );
        assert_eq!(transfer.pin_count(), 1);

        assert!(transfer.set_write_callback(None::<Box<WriteCallback>>).is_ok());
        assert_eq!(transfer.pin_count(), 0);
    }

    #[test]
    fn cleared_write_callback_discards_the_body() {
        let mut transfer = transfer();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _ = transfer.set_write_callback(Some(move |data: Vec<u8>, _: Option<&dyn Any>| {
            counter.set(counter.get() + 1);
            data.len()
        }));
        let _ = transfer.set_write_callback(None::<Box<WriteCallback>>);
        let _ = transfer.url("loopback://discard");

        assert_eq!(transfer.perform(), CurlCode::OK);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn data_setters_release_the_previous_pin() {
        let mut transfer = transfer();
        transfer.set_write_data(Some(Rc::new(1_u8) as Context));
        transfer.set_write_data(Some(Rc::new(2_u8) as Context));
        transfer.set_read_data(Some(Rc::new(3_u8) as Context));
        assert_eq!(transfer.pin_count(), 2);

        transfer.set_write_data(None);
        assert_eq!(transfer.pin_count(), 1);
    }

    #[test]
    fn cleanup_twice_releases_everything_once() {
        let mut transfer = transfer();
        let _ = transfer.set_progress_callback(Some(|_: Progress, _: Option<&dyn Any>| {
            ControlFlow::Continue(())
        }));
        transfer.set_progress_data(Some(Rc::new("ctx") as Context));
        assert_eq!(transfer.pin_count(), 2);

        transfer.cleanup();
        assert_eq!(transfer.pin_count(), 0);
        assert!(!transfer.is_live());
        transfer.cleanup();
        assert_eq!(transfer.pin_count(), 0);
    }

    #[test]
    #[should_panic(expected = "transfer handle used after cleanup")]
    fn using_a_cleaned_up_handle_panics() {
        let mut transfer = transfer();
        transfer.cleanup();
        let _ = transfer.perform();
    }

    #[test]
    fn category_mismatches_never_reach_the_engine() {
        let mut transfer = transfer();
        assert_eq!(
            transfer.set_long(ffi::CURLOPT_URL, 1),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(
            transfer.set_str(ffi::CURLOPT_VERBOSE, "1"),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(
            transfer.set_str(ffi::CURLOPT_WRITEDATA, "x"),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(
            transfer.set_data(ffi::CURLOPT_TIMEOUT, None),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(
            transfer.url("loopback://bad\0url"),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
    }

    #[test]
    fn pointer_options_reject_foreign_arguments() {
        let mut transfer = transfer();
        assert_eq!(
            transfer.set_data(ffi::CURLOPT_URL, Some(Rc::new(1_u8) as Context)),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(
            transfer.set_data(ffi::CURLOPT_ERRORBUFFER, Some(Rc::new(2_u8) as Context)),
            CurlCode::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(transfer.pin_count(), 0);

        for option in [
            ffi::CURLOPT_ERRORBUFFER,
            ffi::CURLOPT_STDERR,
            ffi::CURLOPT_SHARE,
            ffi::CURLOPT_QUOTE,
            ffi::CURLOPT_HTTPPOST,
            ffi::CURLOPT_PRIVATE,
        ] {
            assert_eq!(
                transfer.set_str(option, "x"),
                CurlCode::BAD_FUNCTION_ARGUMENT,
                "option {option}"
            );
        }
        assert!(transfer.set_str(ffi::CURLOPT_USERAGENT, "easywire").is_ok());
    }

    #[test]
    fn every_trampoline_is_installed_up_front() -> anyhow::Result<()> {
        let mut transfer = transfer();
        let installed = |transfer: &Transfer| {
            Category::ALL.iter().all(|category| {
                // SAFETY: the handle is a live loopback handle.
                unsafe { loopback::has_function(transfer.handle(), category.function_option()) }
            })
        };
        assert!(installed(&transfer));

        transfer.reset()?;
        assert!(installed(&transfer));

        let copy = transfer.duplicate()?;
        assert!(installed(&copy));
        Ok(())
    }

    #[test]
    fn fresh_handle_performs_without_callbacks() {
        let mut transfer = transfer();
        let _ = transfer.url("loopback://quiet");
        assert_eq!(transfer.perform(), CurlCode::OK);
    }

    #[test]
    fn headers_never_reach_the_write_callback() {
        let mut transfer = transfer();
        let body = collect_body(&mut transfer);
        transfer.set_header_data(Some(Rc::new("headers") as Context));
        let _ = transfer.url("loopback://split");

        assert_eq!(transfer.perform(), CurlCode::OK);
        assert_eq!(body.borrow().as_slice(), b"loopback://split");
    }

    #[test]
    fn clearing_progress_turns_reporting_off() {
        let mut transfer = transfer();
        let noprogress = |transfer: &Transfer| {
            // SAFETY: the handle is a live loopback handle.
            unsafe { loopback::long_option(transfer.handle(), ffi::CURLOPT_NOPROGRESS) }
        };
        assert!(
            transfer
                .set_progress_callback(Some(|_: Progress, _: Option<&dyn Any>| {
                    ControlFlow::Continue(())
                }))
                .is_ok()
        );
        assert_eq!(noprogress(&transfer), Some(0));

        assert!(
            transfer
                .set_progress_callback(None::<Box<ProgressCallback>>)
                .is_ok()
        );
        assert_eq!(noprogress(&transfer), Some(1));
    }

    #[test]
    fn tls_and_ftp_setters_store_their_values() {
        let mut transfer = transfer();
        assert!(transfer.ssl_verify_peer(false).is_ok());
        assert!(transfer.ftp_response_timeout(Duration::from_secs(30)).is_ok());
        // SAFETY: the handle is a live loopback handle.
        let (verify, ftp) = unsafe {
            (
                loopback::long_option(transfer.handle(), ffi::CURLOPT_SSL_VERIFYPEER),
                loopback::long_option(transfer.handle(), ffi::CURLOPT_FTP_RESPONSE_TIMEOUT),
            )
        };
        assert_eq!(verify, Some(0));
        assert_eq!(ftp, Some(30));
    }

    #[test]
    fn echo_returns_the_url_without_a_body() -> anyhow::Result<()> {
        let mut transfer = transfer();
        let body = collect_body(&mut transfer);
        assert!(transfer.url("loopback://hello").is_ok());

        assert_eq!(transfer.perform(), CurlCode::OK);
        assert_eq!(body.borrow().as_slice(), b"loopback://hello");
        assert_eq!(transfer.response_code()?, 200);
        assert_eq!(
            transfer.effective_url()?.as_deref(),
            Some("loopback://hello")
        );
        assert!((transfer.size_download()? - 16.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn post_fields_are_retained_and_echoed() -> anyhow::Result<()> {
        let mut transfer = transfer();
        let body = collect_body(&mut transfer);
        let _ = transfer.url("loopback://post");
        {
            let payload = b"name=value\0binary".to_vec();
            assert!(transfer.post_fields(&payload).is_ok());
        }

        assert_eq!(transfer.perform(), CurlCode::OK);
        assert_eq!(body.borrow().as_slice(), b"name=value\0binary");
        assert!((transfer.size_upload()? - 17.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn header_list_is_owned_and_echoed() -> anyhow::Result<()> {
        let mut transfer = transfer();
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lines);
        let _ = transfer.set_header_callback(Some(move |data: Vec<u8>, _: Option<&dyn Any>| {
            sink.borrow_mut()
                .push(String::from_utf8_lossy(&data).into_owned());
            data.len()
        }));
        let mut headers = StringList::with_engine(&LOOPBACK);
        headers.append("X-Trace: 7")?;
        assert!(transfer.http_headers(headers).is_ok());
        let _ = transfer.url("loopback://headers");

        assert_eq!(transfer.perform(), CurlCode::OK);
        let lines = lines.borrow();
        assert_eq!(lines.first().map(String::as_str), Some("HTTP/1.1 200 OK\r\n"));
        assert!(lines.iter().any(|line| line == "X-Echo: X-Trace: 7\r\n"));
        assert_eq!(lines.last().map(String::as_str), Some("\r\n"));
        Ok(())
    }

    #[test]
    fn write_callback_receives_its_context() {
        let mut transfer = transfer();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _ = transfer.set_write_callback(Some(move |data: Vec<u8>, context: Option<&dyn Any>| {
            let label = context
                .and_then(|value| value.downcast_ref::<String>())
                .cloned();
            sink.borrow_mut().push(label);
            data.len()
        }));
        transfer.set_write_data(Some(Rc::new("download".to_string()) as Context));
        let _ = transfer.url("loopback://ctx");

        assert_eq!(transfer.perform(), CurlCode::OK);
        assert_eq!(seen.borrow().as_slice(), &[Some("download".to_string())]);
    }

    #[test]
    fn debug_callback_sees_verbose_text() {
        let mut transfer = transfer();
        let texts = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&texts);
        let _ = transfer.set_debug_callback(Some(
            move |kind: InfoType, text: &str, _: Option<&dyn Any>| {
                if kind == InfoType::Text {
                    sink.borrow_mut().push(text.to_string());
                }
            },
        ));
        let _ = transfer.verbose(true);
        let _ = transfer.url("loopback://debug");

        assert_eq!(transfer.perform(), CurlCode::OK);
        assert!(!texts.borrow().is_empty());
    }

    #[test]
    fn cookie_lines_are_reported_as_a_string_list() -> anyhow::Result<()> {
        let mut transfer = transfer();
        assert!(transfer.cookie_list("Set-Cookie: session=1").is_ok());
        let cookies = transfer.cookies()?;
        assert_eq!(cookies.elements(), vec!["Set-Cookie: session=1".to_string()]);
        Ok(())
    }

    #[test]
    fn extra_data_options_pin_one_object_each() {
        let mut transfer = transfer();
        assert!(
            transfer
                .set_data(ffi::CURLOPT_PRIVATE, Some(Rc::new(1_u8) as Context))
                .is_ok()
        );
        assert!(
            transfer
                .set_data(ffi::CURLOPT_PRIVATE, Some(Rc::new(2_u8) as Context))
                .is_ok()
        );
        assert_eq!(transfer.pin_count(), 1);
        assert!(transfer.set_data(ffi::CURLOPT_PRIVATE, None).is_ok());
        assert_eq!(transfer.pin_count(), 0);
    }

    #[test]
    fn reset_drops_registrations_and_options() -> anyhow::Result<()> {
        let mut transfer = transfer();
        let body = collect_body(&mut transfer);
        transfer.set_write_data(Some(Rc::new(()) as Context));
        let _ = transfer.url("loopback://reset");

        transfer.reset()?;
        assert_eq!(transfer.pin_count(), 0);
        assert_eq!(transfer.perform(), CurlCode::URL_MALFORMAT);

        let _ = transfer.url("loopback://again");
        assert_eq!(transfer.perform(), CurlCode::OK);
        assert!(body.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_starts_without_registrations() -> anyhow::Result<()> {
        let mut source = transfer();
        let body = collect_body(&mut source);
        source.set_write_data(Some(Rc::new(()) as Context));
        let _ = source.url("loopback://dup");
        let _ = source.post_fields(b"payload");

        let mut copy = source.duplicate()?;
        assert_eq!(copy.pin_count(), 0);
        drop(source);

        assert_eq!(copy.perform(), CurlCode::OK);
        assert!(body.borrow().is_empty());

        let copied = collect_body(&mut copy);
        assert_eq!(copy.perform(), CurlCode::OK);
        assert_eq!(copied.borrow().as_slice(), b"payload");
        Ok(())
    }

    #[test]
    #[should_panic(expected = "callback exploded")]
    fn callback_panics_resume_after_perform() {
        let mut transfer = transfer();
        let _ = transfer.set_write_callback(Some(|_: Vec<u8>, _: Option<&dyn Any>| -> usize {
            panic!("callback exploded")
        }));
        let _ = transfer.url("loopback://panic");
        let _ = transfer.perform();
    }

    #[test]
    fn option_kinds_follow_numeric_ranges() {
        assert_eq!(OptionKind::of(ffi::CURLOPT_VERBOSE), Some(OptionKind::Long));
        assert_eq!(OptionKind::of(ffi::CURLOPT_URL), Some(OptionKind::Object));
        assert_eq!(
            OptionKind::of(ffi::CURLOPT_WRITEFUNCTION),
            Some(OptionKind::Function)
        );
        assert_eq!(OptionKind::of(30_001), Some(OptionKind::OffT));
        assert_eq!(OptionKind::of(-1), None);
    }
}

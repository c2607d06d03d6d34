//! In-process engine that honours the easy-interface ABI and echoes requests.
//!
//! Every transfer is answered locally: the request body (post fields or data
//! pulled through the read callback) comes back as the response body, each
//! request header comes back as an `X-Echo` response header, and a request
//! without a body is answered with the URL itself. Callbacks are driven in the
//! same order and with the same return-value contracts as libcurl, which keeps
//! the safety layer testable without a network or the system library.
//!
//! Missing functions fall back the way libcurl's do: without a write function
//! the data pointer is a `FILE*` (stdout when null), without a read function it
//! is the `FILE*` read from (stdin when null), and without a header function
//! headers go through the write path only when header data is set.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::io::{Read, Write};
use std::ptr;
use std::time::Instant;

use libc::{c_char, c_double, c_long, c_void};

use super::{Engine, NativeCallback};
use crate::code::builtin_description;
use crate::ffi::{self, CURL, CURLINFO, CURLcode, CURLoption, curl_infotype, curl_slist};

/// Largest chunk handed to the write callback in one call.
const MAX_WRITE_SIZE: usize = 16 * 1024;
/// Buffer offered to the read callback.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Options whose string argument the engine copies on `setopt`.
const COPIED_STRING_OPTIONS: [CURLoption; 5] = [
    ffi::CURLOPT_URL,
    ffi::CURLOPT_USERAGENT,
    ffi::CURLOPT_COOKIEFILE,
    ffi::CURLOPT_COOKIEJAR,
    ffi::CURLOPT_CUSTOMREQUEST,
];

/// The in-process echo engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackEngine;

/// Shared instance.
pub static LOOPBACK: LoopbackEngine = LoopbackEngine;

#[derive(Clone, Default)]
struct Info {
    response_code: c_long,
    total_time: c_double,
    size_upload: c_double,
    size_download: c_double,
    effective_url: Option<CString>,
}

#[derive(Clone, Default)]
struct LoopbackHandle {
    longs: HashMap<CURLoption, c_long>,
    strings: HashMap<CURLoption, CString>,
    pointers: HashMap<CURLoption, *const c_void>,
    callbacks: HashMap<CURLoption, NativeCallback>,
    cookies: Vec<String>,
    info: Info,
}

impl LoopbackHandle {
    fn long(&self, option: CURLoption) -> Option<c_long> {
        self.longs.get(&option).copied()
    }

    fn flag(&self, option: CURLoption) -> bool {
        self.long(option).is_some_and(|value| value != 0)
    }

    fn pointer(&self, option: CURLoption) -> *mut c_void {
        self.pointers
            .get(&option)
            .map_or(ptr::null_mut(), |value| value.cast_mut())
    }

    fn data_callback(&self, option: CURLoption) -> Option<ffi::curl_data_callback> {
        match self.callbacks.get(&option) {
            Some(NativeCallback::Data(callback)) => Some(*callback),
            _ => None,
        }
    }

    fn apply_cookie_command(&mut self, command: &str) {
        match command {
            "ALL" | "SESS" => self.cookies.clear(),
            "FLUSH" | "RELOAD" => {}
            line => self.cookies.push(line.to_string()),
        }
    }
}

/// Destination of response bytes.
#[derive(Debug, Clone, Copy)]
enum Sink {
    Callback(ffi::curl_data_callback, *mut c_void),
    File(*mut libc::FILE),
    Stdout,
    Discard,
}

impl Sink {
    fn new(function: Option<ffi::curl_data_callback>, data: *mut c_void) -> Self {
        match function {
            Some(callback) => Self::Callback(callback, data),
            None if data.is_null() => Self::Stdout,
            None => Self::File(data.cast::<libc::FILE>()),
        }
    }

    fn deliver(self, chunk: &[u8]) -> Result<(), CURLcode> {
        let accepted = match self {
            Self::Discard => return Ok(()),
            Self::Callback(callback, userdata) => {
                let mut owned = chunk.to_vec();
                // SAFETY: `owned` is valid for its length for the whole call.
                unsafe { callback(owned.as_mut_ptr().cast::<c_char>(), 1, owned.len(), userdata) }
            }
            // SAFETY: without a write function the data pointer is a `FILE*`.
            Self::File(file) => unsafe {
                libc::fwrite(chunk.as_ptr().cast::<c_void>(), 1, chunk.len(), file)
            },
            Self::Stdout => match std::io::stdout().write_all(chunk) {
                Ok(()) => chunk.len(),
                Err(_) => 0,
            },
        };
        if accepted == chunk.len() {
            Ok(())
        } else {
            Err(ffi::CURLE_WRITE_ERROR)
        }
    }
}

/// Origin of request body bytes.
#[derive(Debug, Clone, Copy)]
enum Source {
    Callback(ffi::curl_data_callback, *mut c_void),
    File(*mut libc::FILE),
    Stdin,
}

impl Source {
    fn new(function: Option<ffi::curl_data_callback>, data: *mut c_void) -> Self {
        match function {
            Some(callback) => Self::Callback(callback, data),
            None if data.is_null() => Self::Stdin,
            None => Self::File(data.cast::<libc::FILE>()),
        }
    }

    fn fill(self, buffer: &mut [u8]) -> usize {
        match self {
            // SAFETY: `buffer` is writable for its length for the whole call.
            Self::Callback(callback, userdata) => unsafe {
                callback(buffer.as_mut_ptr().cast::<c_char>(), 1, buffer.len(), userdata)
            },
            // SAFETY: without a read function the data pointer is a `FILE*`.
            Self::File(file) => unsafe {
                libc::fread(buffer.as_mut_ptr().cast::<c_void>(), 1, buffer.len(), file)
            },
            Self::Stdin => std::io::stdin().read(buffer).unwrap_or(0),
        }
    }
}

/// Snapshot of everything one transfer needs, taken before callbacks run.
struct Exchange {
    handle: *mut CURL,
    url: String,
    request_headers: Vec<String>,
    post_fields: Option<Vec<u8>>,
    wants_body: bool,
    upload_size: Option<usize>,
    verbose: bool,
    progress: Option<(ffi::curl_progress_callback, *mut c_void)>,
    debug: Option<(ffi::curl_debug_callback, *mut c_void)>,
    read: Source,
    header: Sink,
    write: Sink,
}

#[derive(Default)]
struct Totals {
    dl_total: f64,
    dl_now: f64,
    ul_total: f64,
    ul_now: f64,
}

impl Exchange {
    fn debug(&self, kind: curl_infotype, payload: &[u8]) {
        if !self.verbose {
            return;
        }
        if let Some((callback, userptr)) = self.debug {
            let mut owned = payload.to_vec();
            // SAFETY: `owned` is valid for its length for the whole call.
            let _ = unsafe {
                callback(
                    self.handle,
                    kind,
                    owned.as_mut_ptr().cast::<c_char>(),
                    owned.len(),
                    userptr,
                )
            };
        }
    }

    fn progress(&self, totals: &Totals) -> Result<(), CURLcode> {
        let Some((callback, clientp)) = self.progress else {
            return Ok(());
        };
        // SAFETY: the callback was installed with this data pointer.
        let verdict = unsafe {
            callback(
                clientp,
                totals.dl_total,
                totals.dl_now,
                totals.ul_total,
                totals.ul_now,
            )
        };
        if verdict == 0 {
            Ok(())
        } else {
            Err(ffi::CURLE_ABORTED_BY_CALLBACK)
        }
    }

    fn read_body(&self, totals: &mut Totals) -> Result<Vec<u8>, CURLcode> {
        let mut body = Vec::new();
        let mut buffer = vec![0_u8; READ_BUFFER_SIZE];
        loop {
            if self.upload_size.is_some_and(|size| body.len() >= size) {
                break;
            }
            let returned = self.read.fill(&mut buffer);
            if returned == ffi::CURL_READFUNC_ABORT {
                return Err(ffi::CURLE_ABORTED_BY_CALLBACK);
            }
            if returned > buffer.len() {
                return Err(ffi::CURLE_READ_ERROR);
            }
            if returned == 0 {
                break;
            }
            let chunk = &buffer[..returned];
            self.debug(ffi::CURLINFO_DATA_OUT, chunk);
            body.extend_from_slice(chunk);
            totals.ul_now = body.len() as f64;
            self.progress(totals)?;
        }
        Ok(body)
    }

    fn run(&self, info: &mut Info) -> Result<(), CURLcode> {
        let started = Instant::now();
        let mut totals = Totals {
            ul_total: self.upload_size.map_or(0.0, |size| size as f64),
            ..Totals::default()
        };

        self.debug(ffi::CURLINFO_TEXT, b"Connected to loopback\n");
        self.progress(&totals)?;

        let request_body = if let Some(fields) = &self.post_fields {
            totals.ul_total = fields.len() as f64;
            totals.ul_now = totals.ul_total;
            fields.clone()
        } else if self.wants_body {
            self.read_body(&mut totals)?
        } else {
            Vec::new()
        };
        info.size_upload = request_body.len() as f64;

        let body = if request_body.is_empty() {
            self.url.clone().into_bytes()
        } else {
            request_body
        };

        let mut headers = vec![
            "HTTP/1.1 200 OK\r\n".to_string(),
            format!("Content-Length: {}\r\n", body.len()),
        ];
        headers.extend(
            self.request_headers
                .iter()
                .map(|header| format!("X-Echo: {header}\r\n")),
        );
        headers.push("\r\n".to_string());
        for header in &headers {
            self.debug(ffi::CURLINFO_HEADER_IN, header.as_bytes());
            self.header.deliver(header.as_bytes())?;
        }
        info.response_code = 200;

        totals.dl_total = body.len() as f64;
        for chunk in body.chunks(MAX_WRITE_SIZE) {
            self.debug(ffi::CURLINFO_DATA_IN, chunk);
            self.write.deliver(chunk)?;
            totals.dl_now += chunk.len() as f64;
            info.size_download = totals.dl_now;
            self.progress(&totals)?;
        }

        self.debug(ffi::CURLINFO_TEXT, b"Connection closed\n");
        info.total_time = started.elapsed().as_secs_f64();
        Ok(())
    }
}

/// Walk a chain into owned strings without taking ownership.
///
/// # Safety
///
/// `list` must be null or a valid chain.
unsafe fn read_chain(mut list: *const curl_slist) -> Vec<String> {
    let mut out = Vec::new();
    while !list.is_null() {
        // SAFETY: the caller guarantees every node in the chain is valid.
        let node = unsafe { &*list };
        if !node.data.is_null() {
            // SAFETY: node data is a NUL-terminated string owned by the chain.
            out.push(
                unsafe { CStr::from_ptr(node.data) }
                    .to_string_lossy()
                    .into_owned(),
            );
        }
        list = node.next;
    }
    out
}

/// Borrow the engine-side state behind an easy handle.
///
/// # Safety
///
/// `handle` must come from [`LoopbackEngine::easy_init`] or
/// [`LoopbackEngine::easy_duphandle`] and must still be live.
unsafe fn state<'a>(handle: *mut CURL) -> &'a mut LoopbackHandle {
    // SAFETY: upheld by the caller.
    unsafe { &mut *handle.cast::<LoopbackHandle>() }
}

// SAFETY: handles, chains and callback invocations follow the libcurl
// contracts documented on `Engine`.
unsafe impl Engine for LoopbackEngine {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn global_init(&self, _flags: c_long) -> CURLcode {
        ffi::CURLE_OK
    }

    fn global_cleanup(&self) {}

    fn version(&self) -> String {
        concat!("easywire-loopback/", env!("CARGO_PKG_VERSION")).to_string()
    }

    fn strerror(&self, code: CURLcode) -> String {
        builtin_description(code).to_string()
    }

    unsafe fn easy_init(&self) -> *mut CURL {
        Box::into_raw(Box::new(LoopbackHandle::default())).cast::<CURL>()
    }

    unsafe fn easy_cleanup(&self, handle: *mut CURL) {
        if handle.is_null() {
            return;
        }
        // SAFETY: the handle was produced by `Box::into_raw` in `easy_init` or
        // `easy_duphandle` and is destroyed exactly once.
        drop(unsafe { Box::from_raw(handle.cast::<LoopbackHandle>()) });
    }

    unsafe fn easy_duphandle(&self, handle: *mut CURL) -> *mut CURL {
        // SAFETY: upheld by the caller.
        let source = unsafe { state(handle) };
        let mut copy = source.clone();
        copy.info = Info::default();
        Box::into_raw(Box::new(copy)).cast::<CURL>()
    }

    unsafe fn easy_reset(&self, handle: *mut CURL) {
        // SAFETY: upheld by the caller.
        let current = unsafe { state(handle) };
        let cookies = std::mem::take(&mut current.cookies);
        *current = LoopbackHandle {
            cookies,
            ..LoopbackHandle::default()
        };
    }

    unsafe fn easy_perform(&self, handle: *mut CURL) -> CURLcode {
        let exchange = {
            // SAFETY: upheld by the caller; the borrow ends before any callback runs.
            let current = unsafe { state(handle) };
            let Some(url) = current
                .strings
                .get(&ffi::CURLOPT_URL)
                .map(|url| url.to_string_lossy().into_owned())
                .filter(|url| url.contains("://"))
            else {
                return ffi::CURLE_URL_MALFORMAT;
            };

            let fields_ptr = current.pointer(ffi::CURLOPT_POSTFIELDS);
            let post_fields = (!fields_ptr.is_null()).then(|| {
                let declared = current
                    .long(ffi::CURLOPT_POSTFIELDSIZE)
                    .and_then(|size| usize::try_from(size).ok());
                // SAFETY: libcurl does not copy post fields; the caller keeps
                // them alive, either sized explicitly or NUL-terminated.
                unsafe {
                    match declared {
                        Some(len) => {
                            std::slice::from_raw_parts(fields_ptr.cast::<u8>(), len).to_vec()
                        }
                        None => CStr::from_ptr(fields_ptr.cast::<c_char>())
                            .to_bytes()
                            .to_vec(),
                    }
                }
            });

            // SAFETY: the header list pointer is kept alive by its owner for as
            // long as it is installed.
            let request_headers = unsafe {
                read_chain(current.pointer(ffi::CURLOPT_HTTPHEADER).cast::<curl_slist>())
            };

            let progress = match current.callbacks.get(&ffi::CURLOPT_PROGRESSFUNCTION) {
                Some(NativeCallback::Progress(callback))
                    if current.long(ffi::CURLOPT_NOPROGRESS) == Some(0) =>
                {
                    Some((*callback, current.pointer(ffi::CURLOPT_PROGRESSDATA)))
                }
                _ => None,
            };
            let debug = match current.callbacks.get(&ffi::CURLOPT_DEBUGFUNCTION) {
                Some(NativeCallback::Debug(callback)) => {
                    Some((*callback, current.pointer(ffi::CURLOPT_DEBUGDATA)))
                }
                _ => None,
            };

            let write_function = current.data_callback(ffi::CURLOPT_WRITEFUNCTION);
            let write = Sink::new(write_function, current.pointer(ffi::CURLOPT_WRITEDATA));
            let header_data = current.pointer(ffi::CURLOPT_HEADERDATA);
            let header = match current.data_callback(ffi::CURLOPT_HEADERFUNCTION) {
                Some(callback) => Sink::Callback(callback, header_data),
                None if header_data.is_null() => Sink::Discard,
                None => Sink::new(write_function, header_data),
            };

            Exchange {
                handle,
                url,
                request_headers,
                post_fields,
                wants_body: current.flag(ffi::CURLOPT_UPLOAD)
                    || current.flag(ffi::CURLOPT_PUT)
                    || current.flag(ffi::CURLOPT_POST),
                upload_size: current
                    .long(ffi::CURLOPT_INFILESIZE)
                    .and_then(|size| usize::try_from(size).ok()),
                verbose: current.flag(ffi::CURLOPT_VERBOSE),
                progress,
                debug,
                read: Source::new(
                    current.data_callback(ffi::CURLOPT_READFUNCTION),
                    current.pointer(ffi::CURLOPT_READDATA),
                ),
                header,
                write,
            }
        };

        let mut info = Info {
            effective_url: CString::new(exchange.url.clone()).ok(),
            ..Info::default()
        };
        let outcome = exchange.run(&mut info);

        // SAFETY: upheld by the caller; callbacks have returned.
        unsafe { state(handle) }.info = info;
        match outcome {
            Ok(()) => ffi::CURLE_OK,
            Err(code) => code,
        }
    }

    unsafe fn setopt_long(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        value: c_long,
    ) -> CURLcode {
        if option >= ffi::CURLOPTTYPE_OBJECTPOINT && option < ffi::CURLOPTTYPE_OFF_T {
            return ffi::CURLE_BAD_FUNCTION_ARGUMENT;
        }
        // SAFETY: upheld by the caller.
        unsafe { state(handle) }.longs.insert(option, value);
        ffi::CURLE_OK
    }

    unsafe fn setopt_ptr(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        value: *const c_void,
    ) -> CURLcode {
        // SAFETY: upheld by the caller.
        let current = unsafe { state(handle) };
        if (ffi::CURLOPTTYPE_FUNCTIONPOINT..ffi::CURLOPTTYPE_OFF_T).contains(&option) {
            if value.is_null() {
                current.callbacks.remove(&option);
                return ffi::CURLE_OK;
            }
            return ffi::CURLE_BAD_FUNCTION_ARGUMENT;
        }
        if !(ffi::CURLOPTTYPE_OBJECTPOINT..ffi::CURLOPTTYPE_FUNCTIONPOINT).contains(&option) {
            return ffi::CURLE_BAD_FUNCTION_ARGUMENT;
        }

        if option == ffi::CURLOPT_COOKIELIST {
            if !value.is_null() {
                // SAFETY: string options point at NUL-terminated text.
                let command = unsafe { CStr::from_ptr(value.cast::<c_char>()) }
                    .to_string_lossy()
                    .into_owned();
                current.apply_cookie_command(&command);
            }
            return ffi::CURLE_OK;
        }

        if COPIED_STRING_OPTIONS.contains(&option) {
            if value.is_null() {
                current.strings.remove(&option);
            } else {
                // SAFETY: string options point at NUL-terminated text that is
                // copied before returning.
                let copied = unsafe { CStr::from_ptr(value.cast::<c_char>()) }.to_owned();
                current.strings.insert(option, copied);
            }
            return ffi::CURLE_OK;
        }

        current.pointers.insert(option, value);
        ffi::CURLE_OK
    }

    unsafe fn setopt_callback(
        &self,
        handle: *mut CURL,
        option: CURLoption,
        callback: NativeCallback,
    ) -> CURLcode {
        let matches = matches!(
            (option, callback),
            (
                ffi::CURLOPT_WRITEFUNCTION
                    | ffi::CURLOPT_READFUNCTION
                    | ffi::CURLOPT_HEADERFUNCTION,
                NativeCallback::Data(_)
            ) | (ffi::CURLOPT_PROGRESSFUNCTION, NativeCallback::Progress(_))
                | (ffi::CURLOPT_DEBUGFUNCTION, NativeCallback::Debug(_))
        );
        if !matches {
            return ffi::CURLE_BAD_FUNCTION_ARGUMENT;
        }
        // SAFETY: upheld by the caller.
        unsafe { state(handle) }.callbacks.insert(option, callback);
        ffi::CURLE_OK
    }

    unsafe fn getinfo_long(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut c_long,
    ) -> CURLcode {
        // SAFETY: upheld by the caller.
        let current = unsafe { state(handle) };
        match info {
            ffi::CURLINFO_RESPONSE_CODE => {
                *out = current.info.response_code;
                ffi::CURLE_OK
            }
            _ => unknown_info(info, ffi::CURLINFO_LONG),
        }
    }

    unsafe fn getinfo_double(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut c_double,
    ) -> CURLcode {
        // SAFETY: upheld by the caller.
        let current = unsafe { state(handle) };
        let value = match info {
            ffi::CURLINFO_TOTAL_TIME => current.info.total_time,
            ffi::CURLINFO_SIZE_UPLOAD => current.info.size_upload,
            ffi::CURLINFO_SIZE_DOWNLOAD => current.info.size_download,
            _ => return unknown_info(info, ffi::CURLINFO_DOUBLE),
        };
        *out = value;
        ffi::CURLE_OK
    }

    unsafe fn getinfo_ptr(
        &self,
        handle: *mut CURL,
        info: CURLINFO,
        out: &mut *mut c_void,
    ) -> CURLcode {
        // SAFETY: upheld by the caller.
        let current = unsafe { state(handle) };
        match info {
            ffi::CURLINFO_EFFECTIVE_URL => {
                *out = current
                    .info
                    .effective_url
                    .as_ref()
                    .map_or(ptr::null_mut(), |url| url.as_ptr().cast_mut().cast::<c_void>());
                ffi::CURLE_OK
            }
            ffi::CURLINFO_COOKIELIST => {
                let mut head: *mut curl_slist = ptr::null_mut();
                for cookie in &current.cookies {
                    let Ok(line) = CString::new(cookie.as_str()) else {
                        continue;
                    };
                    // SAFETY: `head` is null or a chain built by this loop.
                    let next = unsafe { self.slist_append(head, line.as_ptr()) };
                    if next.is_null() {
                        // SAFETY: `head` is a chain built by this loop.
                        unsafe { self.slist_free_all(head) };
                        return ffi::CURLE_OUT_OF_MEMORY;
                    }
                    head = next;
                }
                *out = head.cast::<c_void>();
                ffi::CURLE_OK
            }
            _ => {
                let kind = info & ffi::CURLINFO_TYPEMASK;
                if kind == ffi::CURLINFO_STRING || kind == ffi::CURLINFO_SLIST {
                    ffi::CURLE_UNKNOWN_OPTION
                } else {
                    ffi::CURLE_BAD_FUNCTION_ARGUMENT
                }
            }
        }
    }

    unsafe fn slist_append(&self, list: *mut curl_slist, data: *const c_char) -> *mut curl_slist {
        if data.is_null() {
            return ptr::null_mut();
        }
        // SAFETY: the caller passes a NUL-terminated string.
        let copied = unsafe { CStr::from_ptr(data) }.to_owned();
        let node = Box::into_raw(Box::new(curl_slist {
            data: copied.into_raw(),
            next: ptr::null_mut(),
        }));
        if list.is_null() {
            return node;
        }
        let mut tail = list;
        // SAFETY: `list` is a valid chain built by this engine.
        unsafe {
            while !(*tail).next.is_null() {
                tail = (*tail).next;
            }
            (*tail).next = node;
        }
        list
    }

    unsafe fn slist_free_all(&self, list: *mut curl_slist) {
        let mut current = list;
        while !current.is_null() {
            // SAFETY: every node and its data were allocated by `slist_append`
            // and are released exactly once here.
            let node = unsafe { Box::from_raw(current) };
            if !node.data.is_null() {
                drop(unsafe { CString::from_raw(node.data) });
            }
            current = node.next;
        }
    }
}

/// Value stored for a `long` option on a loopback handle.
///
/// # Safety
///
/// `handle` must be a live loopback handle.
#[cfg(test)]
pub(crate) unsafe fn long_option(handle: *mut CURL, option: CURLoption) -> Option<c_long> {
    // SAFETY: upheld by the caller.
    unsafe { state(handle) }.long(option)
}

/// Whether a function option is installed on a loopback handle.
///
/// # Safety
///
/// `handle` must be a live loopback handle.
#[cfg(test)]
pub(crate) unsafe fn has_function(handle: *mut CURL, option: CURLoption) -> bool {
    // SAFETY: upheld by the caller.
    unsafe { state(handle) }.callbacks.contains_key(&option)
}

const fn unknown_info(info: CURLINFO, expected: CURLINFO) -> CURLcode {
    if info & ffi::CURLINFO_TYPEMASK == expected {
        ffi::CURLE_UNKNOWN_OPTION
    } else {
        ffi::CURLE_BAD_FUNCTION_ARGUMENT
    }
}

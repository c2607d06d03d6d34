//! Fixed-signature native entry points that forward into user callables.
//!
//! # Design
//! - Every handle owns one [`Bindings`] value; its address is the userdata the
//!   engine hands back to each trampoline, for every callback category.
//! - Registered callables and associated data objects are pinned in the
//!   handle's registry; the trampolines only ever reach them through tokens.
//! - Panics raised by user code are caught at the boundary, turned into the
//!   category's abort value and re-raised once the engine call has returned.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use libc::{c_char, c_double, c_int, c_void, size_t};
use tracing::{error, trace, warn};

use crate::code::InfoType;
use crate::engine::NativeCallback;
use crate::error::RegistryError;
use crate::ffi::{self, CURL, CURLoption, curl_infotype};
use crate::marshal::{copy_in, copy_out};
use crate::registry::{Context, HandleRegistry, Token};

/// Callable receiving response body or header bytes; returns the consumed count.
pub type WriteCallback = dyn FnMut(Vec<u8>, Option<&dyn Any>) -> usize;
/// Callable supplying request body bytes for a buffer of the given capacity.
pub type ReadCallback = dyn FnMut(usize, Option<&dyn Any>) -> Option<Vec<u8>>;
/// Callable observing transfer totals; `Break` aborts the transfer.
pub type ProgressCallback = dyn FnMut(Progress, Option<&dyn Any>) -> ControlFlow<()>;
/// Callable receiving debug trace messages.
pub type DebugCallback = dyn FnMut(InfoType, &str, Option<&dyn Any>);

/// Transfer totals reported to a progress callback.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    /// Bytes expected to be downloaded, zero when unknown.
    pub dl_total: f64,
    /// Bytes downloaded so far.
    pub dl_now: f64,
    /// Bytes expected to be uploaded, zero when unknown.
    pub ul_total: f64,
    /// Bytes uploaded so far.
    pub ul_now: f64,
}

/// Callback categories understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Category {
    Write,
    Read,
    Progress,
    Header,
    Debug,
}

pub(crate) const CATEGORY_COUNT: usize = 5;

impl Category {
    pub(crate) const ALL: [Self; CATEGORY_COUNT] = [
        Self::Write,
        Self::Read,
        Self::Progress,
        Self::Header,
        Self::Debug,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
            Self::Progress => "progress",
            Self::Header => "header",
            Self::Debug => "debug",
        }
    }

    pub(crate) const fn function_option(self) -> CURLoption {
        match self {
            Self::Write => ffi::CURLOPT_WRITEFUNCTION,
            Self::Read => ffi::CURLOPT_READFUNCTION,
            Self::Progress => ffi::CURLOPT_PROGRESSFUNCTION,
            Self::Header => ffi::CURLOPT_HEADERFUNCTION,
            Self::Debug => ffi::CURLOPT_DEBUGFUNCTION,
        }
    }

    pub(crate) const fn data_option(self) -> CURLoption {
        match self {
            Self::Write => ffi::CURLOPT_WRITEDATA,
            Self::Read => ffi::CURLOPT_READDATA,
            Self::Progress => ffi::CURLOPT_PROGRESSDATA,
            Self::Header => ffi::CURLOPT_HEADERDATA,
            Self::Debug => ffi::CURLOPT_DEBUGDATA,
        }
    }

    pub(crate) fn from_data_option(option: CURLoption) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.data_option() == option)
    }

    /// Trampoline installed for this category.
    pub(crate) fn trampoline(self) -> NativeCallback {
        match self {
            Self::Write => NativeCallback::Data(write_trampoline),
            Self::Read => NativeCallback::Data(read_trampoline),
            Self::Progress => NativeCallback::Progress(progress_trampoline),
            Self::Header => NativeCallback::Data(header_trampoline),
            Self::Debug => NativeCallback::Debug(debug_trampoline),
        }
    }
}

/// Registration state of one callback category.
pub(crate) enum CallbackSlot<F: ?Sized> {
    Unregistered,
    Registered {
        callable: Rc<RefCell<Box<F>>>,
        token: Token,
    },
}

impl<F: ?Sized> CallbackSlot<F> {
    fn callable(&self) -> Option<Rc<RefCell<Box<F>>>> {
        match self {
            Self::Unregistered => None,
            Self::Registered { callable, .. } => Some(Rc::clone(callable)),
        }
    }

    const fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

/// Per-handle state reachable from the trampolines.
pub(crate) struct Bindings {
    registry: RefCell<HandleRegistry>,
    write: RefCell<CallbackSlot<WriteCallback>>,
    read: RefCell<CallbackSlot<ReadCallback>>,
    progress: RefCell<CallbackSlot<ProgressCallback>>,
    header: RefCell<CallbackSlot<WriteCallback>>,
    debug: RefCell<CallbackSlot<DebugCallback>>,
    data: [Cell<Token>; CATEGORY_COUNT],
    panic: RefCell<Option<Box<dyn Any + Send>>>,
}

impl Bindings {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            registry: RefCell::new(HandleRegistry::new()),
            write: RefCell::new(CallbackSlot::Unregistered),
            read: RefCell::new(CallbackSlot::Unregistered),
            progress: RefCell::new(CallbackSlot::Unregistered),
            header: RefCell::new(CallbackSlot::Unregistered),
            debug: RefCell::new(CallbackSlot::Unregistered),
            data: std::array::from_fn(|_| Cell::new(Token::NONE)),
            panic: RefCell::new(None),
        })
    }

    /// Address handed to the engine as every category's userdata.
    pub(crate) fn userdata(self: &Rc<Self>) -> *const c_void {
        Rc::as_ptr(self).cast::<c_void>()
    }

    pub(crate) fn set_write(&self, callable: Option<Box<WriteCallback>>) {
        self.replace(&self.write, callable, Category::Write);
    }

    pub(crate) fn set_read(&self, callable: Option<Box<ReadCallback>>) {
        self.replace(&self.read, callable, Category::Read);
    }

    pub(crate) fn set_progress(&self, callable: Option<Box<ProgressCallback>>) {
        self.replace(&self.progress, callable, Category::Progress);
    }

    pub(crate) fn set_header(&self, callable: Option<Box<WriteCallback>>) {
        self.replace(&self.header, callable, Category::Header);
    }

    pub(crate) fn set_debug(&self, callable: Option<Box<DebugCallback>>) {
        self.replace(&self.debug, callable, Category::Debug);
    }

    /// Unregister the callable of `category`.
    pub(crate) fn clear(&self, category: Category) {
        match category {
            Category::Write => self.set_write(None),
            Category::Read => self.set_read(None),
            Category::Progress => self.set_progress(None),
            Category::Header => self.set_header(None),
            Category::Debug => self.set_debug(None),
        }
    }

    /// Whether a callable is currently registered for `category`.
    pub(crate) fn is_registered(&self, category: Category) -> bool {
        match category {
            Category::Write => self.write.borrow().is_registered(),
            Category::Read => self.read.borrow().is_registered(),
            Category::Progress => self.progress.borrow().is_registered(),
            Category::Header => self.header.borrow().is_registered(),
            Category::Debug => self.debug.borrow().is_registered(),
        }
    }

    /// Replace the associated data object of `category`, releasing the old pin.
    pub(crate) fn set_data(&self, category: Category, context: Option<Context>) {
        let mut registry = self.registry.borrow_mut();
        let previous = self.data[category.index()].replace(Token::NONE);
        release_logged(&mut registry, previous, category.name());
        let token = registry.pin(context);
        self.data[category.index()].set(token);
    }

    /// Resolve the associated data object of `category`.
    pub(crate) fn context(&self, category: Category) -> Result<Option<Context>, RegistryError> {
        self.registry
            .borrow()
            .resolve(self.data[category.index()].get())
    }

    /// Pin an object that is not tied to a callback category.
    pub(crate) fn pin_extra(&self, context: Option<Context>) -> Token {
        self.registry.borrow_mut().pin(context)
    }

    pub(crate) fn release_extra(&self, token: Token) {
        release_logged(&mut self.registry.borrow_mut(), token, "data");
    }

    /// Drop every registration and data pin.
    pub(crate) fn release_all(&self) {
        for category in Category::ALL {
            self.clear(category);
            self.set_data(category, None);
        }
    }

    /// Live pins held for this handle.
    pub(crate) fn pin_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Panic payload caught inside a trampoline during the last engine call.
    pub(crate) fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.panic.borrow_mut().take()
    }

    fn replace<F: ?Sized + 'static>(
        &self,
        slot: &RefCell<CallbackSlot<F>>,
        callable: Option<Box<F>>,
        category: Category,
    ) {
        let mut registry = self.registry.borrow_mut();
        let previous = slot.replace(CallbackSlot::Unregistered);
        if let CallbackSlot::Registered { token, .. } = previous {
            release_logged(&mut registry, token, category.name());
        }
        if let Some(callable) = callable {
            let callable = Rc::new(RefCell::new(callable));
            let token = registry.pin(Some(Rc::clone(&callable) as Context));
            trace!(category = category.name(), %token, "registered callback");
            *slot.borrow_mut() = CallbackSlot::Registered { callable, token };
        }
    }

    fn stash_panic(&self, payload: Box<dyn Any + Send>) {
        let mut stored = self.panic.borrow_mut();
        if stored.is_none() {
            *stored = Some(payload);
        }
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = Category::ALL
            .into_iter()
            .filter(|category| self.is_registered(*category))
            .map(Category::name)
            .collect();
        formatter
            .debug_struct("Bindings")
            .field("registered", &registered)
            .field("pins", &self.pin_count())
            .finish()
    }
}

fn release_logged(registry: &mut HandleRegistry, token: Token, what: &'static str) {
    if let Err(err) = registry.release(token) {
        error!(error = %err, %token, what, "failed to release pinned object");
    }
}

/// Recover the bindings behind an engine userdata pointer.
///
/// # Safety
///
/// `userdata` must be null or the address produced by [`Bindings::userdata`]
/// for a handle that is still alive.
unsafe fn bindings<'a>(userdata: *mut c_void) -> Option<&'a Bindings> {
    // SAFETY: upheld by the caller; the owning handle keeps the `Rc` alive
    // across every engine call that can reach a trampoline.
    unsafe { userdata.cast::<Bindings>().cast_const().as_ref() }
}

/// Run `body` with the resolved context, mapping defects to `abort`.
fn dispatch<R>(
    bindings: &Bindings,
    category: Category,
    abort: R,
    body: impl FnOnce(Option<&dyn Any>) -> R,
) -> R {
    let context = match bindings.context(category) {
        Ok(context) => context,
        Err(err) => {
            error!(category = category.name(), error = %err, "associated data token is no longer valid");
            return abort;
        }
    };
    match panic::catch_unwind(AssertUnwindSafe(|| body(context.as_deref()))) {
        Ok(value) => value,
        Err(payload) => {
            error!(category = category.name(), "callback panicked; aborting transfer");
            bindings.stash_panic(payload);
            abort
        }
    }
}

fn delivered_len(category: Category, size: size_t, nmemb: size_t) -> Option<usize> {
    let len = size.checked_mul(nmemb);
    if len.is_none() {
        error!(category = category.name(), size, nmemb, "callback buffer size overflows");
    }
    len
}

fn write_like(
    category: Category,
    slot: &RefCell<CallbackSlot<WriteCallback>>,
    bindings: &Bindings,
    buffer: *mut c_char,
    len: usize,
) -> size_t {
    let Some(callable) = slot.borrow().callable() else {
        return len;
    };
    dispatch(bindings, category, 0, |context| {
        // SAFETY: the engine guarantees `buffer` is readable for `len` bytes.
        let data = unsafe { copy_in(buffer.cast::<u8>().cast_const(), len) };
        let Ok(mut callable) = callable.try_borrow_mut() else {
            error!(category = category.name(), "callback re-entered while running");
            return 0;
        };
        let consumed = (*callable)(data, context);
        trace!(category = category.name(), delivered = len, consumed, "callback returned");
        consumed
    })
}

/// # Safety
///
/// `userdata` must be null or the address of live [`Bindings`], and `buffer`
/// must be valid for `size * nmemb` bytes.
pub(crate) unsafe extern "C" fn write_trampoline(
    buffer: *mut c_char,
    size: size_t,
    nmemb: size_t,
    userdata: *mut c_void,
) -> size_t {
    let Some(len) = delivered_len(Category::Write, size, nmemb) else {
        return 0;
    };
    // SAFETY: upheld by the caller; the handle points WRITEDATA at its bindings.
    let Some(bindings) = (unsafe { bindings(userdata) }) else {
        error!("write callback invoked without bindings");
        return 0;
    };
    write_like(Category::Write, &bindings.write, bindings, buffer, len)
}

/// # Safety
///
/// `userdata` must be null or the address of live [`Bindings`], and `buffer`
/// must be valid for `size * nmemb` bytes.
pub(crate) unsafe extern "C" fn header_trampoline(
    buffer: *mut c_char,
    size: size_t,
    nmemb: size_t,
    userdata: *mut c_void,
) -> size_t {
    let Some(len) = delivered_len(Category::Header, size, nmemb) else {
        return 0;
    };
    // SAFETY: upheld by the caller; the handle points HEADERDATA at its bindings.
    let Some(bindings) = (unsafe { bindings(userdata) }) else {
        error!("header callback invoked without bindings");
        return 0;
    };
    write_like(Category::Header, &bindings.header, bindings, buffer, len)
}

/// # Safety
///
/// `userdata` must be null or the address of live [`Bindings`], and `buffer`
/// must be valid for `size * nmemb` bytes.
pub(crate) unsafe extern "C" fn read_trampoline(
    buffer: *mut c_char,
    size: size_t,
    nmemb: size_t,
    userdata: *mut c_void,
) -> size_t {
    let Some(max) = delivered_len(Category::Read, size, nmemb) else {
        return ffi::CURL_READFUNC_ABORT;
    };
    // SAFETY: upheld by the caller; the handle points READDATA at its bindings.
    let Some(bindings) = (unsafe { bindings(userdata) }) else {
        error!("read callback invoked without bindings");
        return ffi::CURL_READFUNC_ABORT;
    };
    let Some(callable) = bindings.read.borrow().callable() else {
        return 0;
    };
    dispatch(bindings, Category::Read, ffi::CURL_READFUNC_ABORT, |context| {
        let Ok(mut callable) = callable.try_borrow_mut() else {
            error!("read callback re-entered while running");
            return ffi::CURL_READFUNC_ABORT;
        };
        let Some(bytes) = (*callable)(max, context) else {
            trace!("read callback signalled end of input");
            return 0;
        };
        if bytes.len() > max {
            warn!(
                supplied = bytes.len(),
                capacity = max,
                "read callback supplied more bytes than the buffer holds; truncating"
            );
        }
        // SAFETY: the engine guarantees `buffer` is writable for `max` bytes.
        let copied = unsafe { copy_out(&bytes, buffer.cast::<u8>(), max) };
        trace!(copied, capacity = max, "read callback returned");
        copied
    })
}

/// # Safety
///
/// `clientp` must be null or the address of live [`Bindings`].
pub(crate) unsafe extern "C" fn progress_trampoline(
    clientp: *mut c_void,
    dltotal: c_double,
    dlnow: c_double,
    ultotal: c_double,
    ulnow: c_double,
) -> c_int {
    // SAFETY: upheld by the caller; the handle points PROGRESSDATA at its bindings.
    let Some(bindings) = (unsafe { bindings(clientp) }) else {
        error!("progress callback invoked without bindings");
        return 1;
    };
    let Some(callable) = bindings.progress.borrow().callable() else {
        return 0;
    };
    let progress = Progress {
        dl_total: dltotal,
        dl_now: dlnow,
        ul_total: ultotal,
        ul_now: ulnow,
    };
    dispatch(bindings, Category::Progress, 1, |context| {
        let Ok(mut callable) = callable.try_borrow_mut() else {
            error!("progress callback re-entered while running");
            return 1;
        };
        match (*callable)(progress, context) {
            ControlFlow::Continue(()) => 0,
            ControlFlow::Break(()) => {
                trace!(?progress, "progress callback requested abort");
                1
            }
        }
    })
}

/// # Safety
///
/// `userptr` must be null or the address of live [`Bindings`], and `data` must
/// be valid for `size` bytes.
pub(crate) unsafe extern "C" fn debug_trampoline(
    _handle: *mut CURL,
    kind: curl_infotype,
    data: *mut c_char,
    size: size_t,
    userptr: *mut c_void,
) -> c_int {
    // SAFETY: upheld by the caller; the handle points DEBUGDATA at its bindings.
    let Some(bindings) = (unsafe { bindings(userptr) }) else {
        return 0;
    };
    // SAFETY: the engine guarantees `data` is readable for `size` bytes.
    let bytes = unsafe { copy_in(data.cast::<u8>().cast_const(), size) };
    let message = String::from_utf8_lossy(&bytes);
    let Some(callable) = bindings.debug.borrow().callable() else {
        trace!(kind, message = %message.trim_end(), "engine trace");
        return 0;
    };
    dispatch(bindings, Category::Debug, 0, |context| {
        if let Ok(mut callable) = callable.try_borrow_mut() {
            (*callable)(InfoType::from_raw(kind), &*message, context);
        }
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn userdata(bindings: &Rc<Bindings>) -> *mut c_void {
        bindings.userdata().cast_mut()
    }

    // The helpers below are only handed stack buffers and bindings that
    // outlive the call.

    fn call_write(buffer: *mut c_char, size: size_t, nmemb: size_t, data: *mut c_void) -> size_t {
        unsafe { write_trampoline(buffer, size, nmemb, data) }
    }

    fn call_header(buffer: *mut c_char, size: size_t, nmemb: size_t, data: *mut c_void) -> size_t {
        unsafe { header_trampoline(buffer, size, nmemb, data) }
    }

    fn call_read(buffer: *mut c_char, size: size_t, nmemb: size_t, data: *mut c_void) -> size_t {
        unsafe { read_trampoline(buffer, size, nmemb, data) }
    }

    fn call_progress(data: *mut c_void, dl_total: f64, dl_now: f64, ul_total: f64, ul_now: f64) -> c_int {
        unsafe { progress_trampoline(data, dl_total, dl_now, ul_total, ul_now) }
    }

    fn call_debug(
        handle: *mut CURL,
        kind: curl_infotype,
        text: *mut c_char,
        size: size_t,
        data: *mut c_void,
    ) -> c_int {
        unsafe { debug_trampoline(handle, kind, text, size, data) }
    }

    #[test]
    fn unregistered_categories_return_no_op_values() {
        let bindings = Bindings::new();
        let mut payload = *b"abc";
        let buffer = payload.as_mut_ptr().cast::<c_char>();

        assert_eq!(call_write(buffer, 1, 3, userdata(&bindings)), 3);
        assert_eq!(call_header(buffer, 3, 1, userdata(&bindings)), 3);
        assert_eq!(call_read(buffer, 1, 3, userdata(&bindings)), 0);
        assert_eq!(
            call_progress(userdata(&bindings), 1.0, 0.0, 0.0, 0.0),
            0
        );
        assert_eq!(
            call_debug(ptr::null_mut(), 0, buffer, 3, userdata(&bindings)),
            0
        );
    }

    #[test]
    fn write_callable_sees_bytes_and_context() {
        let bindings = Bindings::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bindings.set_write(Some(Box::new(move |data: Vec<u8>, context: Option<&dyn Any>| {
            let tag = context
                .and_then(|value| value.downcast_ref::<&str>())
                .copied()
                .unwrap_or("none");
            sink.borrow_mut().push((data.clone(), tag));
            data.len()
        })));
        bindings.set_data(Category::Write, Some(Rc::new("body") as Context));

        let mut payload = *b"hello";
        let consumed = call_write(
            payload.as_mut_ptr().cast(),
            1,
            payload.len(),
            userdata(&bindings),
        );
        assert_eq!(consumed, 5);
        assert_eq!(seen.borrow().as_slice(), &[(b"hello".to_vec(), "body")]);
    }

    #[test]
    fn clearing_a_category_releases_one_pin() {
        let bindings = Bindings::new();
        bindings.set_write(Some(Box::new(|_: Vec<u8>, _: Option<&dyn Any>| 0_usize)));
        bindings.set_header(Some(Box::new(|_: Vec<u8>, _: Option<&dyn Any>| 0_usize)));
        assert_eq!(bindings.pin_count(), 2);

        bindings.set_write(None);
        assert_eq!(bindings.pin_count(), 1);
        let mut payload = *b"xy";
        assert_eq!(
            call_write(payload.as_mut_ptr().cast(), 1, 2, userdata(&bindings)),
            2
        );
    }

    #[test]
    fn read_copies_at_most_the_buffer_capacity() {
        let bindings = Bindings::new();
        bindings.set_read(Some(Box::new(|max: usize, _: Option<&dyn Any>| {
            Some(vec![b'z'; max + 4])
        })));
        let mut buffer = [0_u8; 8];
        let copied = call_read(buffer.as_mut_ptr().cast(), 1, 8, userdata(&bindings));
        assert_eq!(copied, 8);
        assert_eq!(buffer, [b'z'; 8]);
    }

    #[test]
    fn read_end_of_input_for_none_and_empty() {
        let bindings = Bindings::new();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        bindings.set_read(Some(Box::new(move |_: usize, _: Option<&dyn Any>| {
            counter.set(counter.get() + 1);
            (counter.get() == 1).then(Vec::<u8>::new)
        })));
        let mut buffer = [0_u8; 4];
        for _ in 0..2 {
            assert_eq!(
                call_read(buffer.as_mut_ptr().cast(), 1, 4, userdata(&bindings)),
                0
            );
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn progress_break_requests_abort() {
        let bindings = Bindings::new();
        bindings.set_progress(Some(Box::new(|progress: Progress, _: Option<&dyn Any>| {
            if progress.dl_now > 0.0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })));
        assert_eq!(call_progress(userdata(&bindings), 0.0, 0.0, 0.0, 0.0), 0);
        assert_eq!(call_progress(userdata(&bindings), 9.0, 1.0, 0.0, 0.0), 1);
    }

    #[test]
    fn debug_receives_kind_and_text() {
        let bindings = Bindings::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bindings.set_debug(Some(Box::new(
            move |kind: InfoType, text: &str, _: Option<&dyn Any>| {
                sink.borrow_mut().push((kind, text.to_string()));
            },
        )));
        let mut message = *b"Connected\n";
        call_debug(
            ptr::null_mut(),
            ffi::CURLINFO_TEXT,
            message.as_mut_ptr().cast(),
            message.len(),
            userdata(&bindings),
        );
        assert_eq!(
            seen.borrow().as_slice(),
            &[(InfoType::Text, "Connected\n".to_string())]
        );
    }

    #[test]
    fn overflowing_sizes_abort() {
        let bindings = Bindings::new();
        let mut payload = [0_u8; 1];
        assert_eq!(
            call_write(payload.as_mut_ptr().cast(), usize::MAX, 2, userdata(&bindings)),
            0
        );
        assert_eq!(
            call_read(payload.as_mut_ptr().cast(), usize::MAX, 2, userdata(&bindings)),
            ffi::CURL_READFUNC_ABORT
        );
    }

    #[test]
    fn panics_abort_and_are_kept_for_the_caller() {
        let bindings = Bindings::new();
        bindings.set_write(Some(Box::new(|_: Vec<u8>, _: Option<&dyn Any>| -> usize {
            panic!("boom")
        })));
        let mut payload = *b"a";
        assert_eq!(
            call_write(payload.as_mut_ptr().cast(), 1, 1, userdata(&bindings)),
            0
        );
        let payload = bindings.take_panic().expect("panic captured");
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
        assert!(bindings.take_panic().is_none());
    }

    #[test]
    fn release_all_leaves_no_pins() {
        let bindings = Bindings::new();
        bindings.set_write(Some(Box::new(|data: Vec<u8>, _: Option<&dyn Any>| data.len())));
        bindings.set_debug(Some(Box::new(|_: InfoType, _: &str, _: Option<&dyn Any>| {})));
        bindings.set_data(Category::Read, Some(Rc::new(5_u32) as Context));
        let extra = bindings.pin_extra(Some(Rc::new(()) as Context));
        assert_eq!(bindings.pin_count(), 4);

        bindings.release_extra(extra);
        bindings.release_all();
        assert_eq!(bindings.pin_count(), 0);
        assert!(!bindings.is_registered(Category::Write));
    }

    #[test]
    fn category_options_map_back() {
        for category in Category::ALL {
            assert_eq!(
                Category::from_data_option(category.data_option()),
                Some(category)
            );
            assert!(category.function_option() >= ffi::CURLOPTTYPE_FUNCTIONPOINT);
        }
        assert_eq!(Category::from_data_option(ffi::CURLOPT_URL), None);
    }
}

//! Process-wide engine initialisation shared by every live handle.
//!
//! The first handle created for an engine runs `global_init`; the last one
//! dropped runs `global_cleanup`. Counts are kept per engine name.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::code::CurlCode;
use crate::engine::Engine;
use crate::error::{EasyError, EasyResult};
use crate::ffi::{self, CURLcode};

static USERS: Lazy<Mutex<HashMap<&'static str, usize>>> = Lazy::new(Mutex::default);

fn users() -> MutexGuard<'static, HashMap<&'static str, usize>> {
    USERS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the engine globally initialised while alive.
pub(crate) struct GlobalGuard {
    engine: &'static dyn Engine,
}

impl GlobalGuard {
    /// Register one more user of `engine`, initialising it on first use.
    pub(crate) fn acquire(engine: &'static dyn Engine) -> EasyResult<Self> {
        let mut users = users();
        let count = users.entry(engine.name()).or_insert(0);
        enter(count, || engine.global_init(ffi::CURL_GLOBAL_ALL)).map_err(|code| {
            EasyError::GlobalInit {
                engine: engine.name(),
                code,
            }
        })?;
        if *count == 1 {
            debug!(engine = engine.name(), "engine globally initialised");
        }
        drop(users);
        Ok(Self { engine })
    }
}

impl Drop for GlobalGuard {
    fn drop(&mut self) {
        let mut users = users();
        let count = users.entry(self.engine.name()).or_insert(0);
        if leave(count, || self.engine.global_cleanup()) {
            debug!(engine = self.engine.name(), "engine globally cleaned up");
        }
    }
}

fn enter(count: &mut usize, init: impl FnOnce() -> CURLcode) -> Result<(), CurlCode> {
    if *count == 0 {
        let code = CurlCode::from_raw(init());
        if !code.is_ok() {
            return Err(code);
        }
    }
    *count += 1;
    Ok(())
}

/// Returns `true` when the cleanup ran.
fn leave(count: &mut usize, cleanup: impl FnOnce()) -> bool {
    match *count {
        0 => {
            warn!("global cleanup requested without a matching initialisation");
            false
        }
        1 => {
            *count = 0;
            cleanup();
            true
        }
        _ => {
            *count -= 1;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_user_initialises_and_last_user_cleans_up() {
        let inits = Cell::new(0);
        let cleanups = Cell::new(0);
        let mut count = 0;

        for _ in 0..3 {
            enter(&mut count, || {
                inits.set(inits.get() + 1);
                ffi::CURLE_OK
            })
            .expect("init");
        }
        assert_eq!(inits.get(), 1);
        assert_eq!(count, 3);

        for _ in 0..3 {
            leave(&mut count, || cleanups.set(cleanups.get() + 1));
        }
        assert_eq!(cleanups.get(), 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn failed_initialisation_is_not_counted() {
        let mut count = 0;
        let err = enter(&mut count, || ffi::CURLE_FAILED_INIT).expect_err("failure");
        assert_eq!(err, CurlCode::FAILED_INIT);
        assert_eq!(count, 0);
    }

    #[test]
    fn unbalanced_leave_does_not_clean_up() {
        let mut count = 0;
        assert!(!leave(&mut count, || panic!("cleanup must not run")));
        assert_eq!(count, 0);
    }

    #[test]
    fn guard_acquires_the_loopback_engine() {
        let guard = GlobalGuard::acquire(&crate::engine::loopback::LOOPBACK).expect("guard");
        assert!(users().get("loopback").copied().unwrap_or(0) >= 1);
        drop(guard);
    }
}

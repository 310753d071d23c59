//! Hands out trampoline indices to registered foreign members.
//!
//! Indices are process-wide and never reused: every VM in the process
//! draws from the same [`MAX_REGISTRATIONS`] entry points.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use vm::{ForeignMethodFn, Vm};

use crate::dispatch::{self, HostFunction};
use crate::error::{Error, Result};
use crate::foreign;
use crate::trampoline::{self, Callback, MAX_REGISTRATIONS};

static NEXT_INDEX: OnceLock<Mutex<usize>> = OnceLock::new();

fn next_index() -> &'static Mutex<usize> {
    NEXT_INDEX.get_or_init(|| Mutex::new(0))
}

/// Take the next free entry point and route it to `callback`.
pub fn register(name: &str, callback: Callback) -> Result<ForeignMethodFn> {
    let mut next = next_index().lock();
    let index = *next;
    let Some(entry) = trampoline::entry_point(index) else {
        log::warn!("cannot register '{name}': all {MAX_REGISTRATIONS} entry points in use");
        return Err(Error::CapacityExceeded {
            capacity: MAX_REGISTRATIONS,
        });
    };
    trampoline::install(index, callback);
    *next += 1;
    log::debug!("registered '{name}' at entry point {index}");
    Ok(entry)
}

/// How many entry points have been handed out.
pub fn registered() -> usize {
    *next_index().lock()
}

pub fn register_method(name: &str, function: HostFunction) -> Result<ForeignMethodFn> {
    register(
        name,
        Arc::new(move |vm: &mut Vm| dispatch::run(vm, &function)),
    )
}

pub fn register_class<T, F>(name: &str, constructor: F) -> Result<ForeignMethodFn>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    register(
        name,
        Arc::new(move |vm: &mut Vm| foreign::allocate::<T>(vm, &constructor)),
    )
}

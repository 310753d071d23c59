//! Foreign objects: host values whose bytes live inside VM storage.
//!
//! A foreign class constructor builds a `T` on the host, then the value is
//! moved into a block the VM allocates with `Layout::new::<T>()`. From then
//! on the VM owns it; when the object dies the VM runs [`finalize::<T>`]
//! on the payload and frees the block. `T` must not point into itself,
//! since only its bytes are moved.
//!
//! Each object carries the `TypeId` its class was bound with, and a
//! [`Foreign<T>`] can only be obtained by checking it.

use std::alloc::Layout;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use vm::{ForeignObject, Vm};

use crate::dispatch;
use crate::error::{Error, Result};

/// A foreign object on the host side of the bridge, of unknown type.
///
/// Holding one keeps the object alive, even past the call it arrived in.
#[derive(Clone)]
pub struct ForeignRef(Rc<ForeignObject>);

impl ForeignRef {
    pub(crate) fn new(object: Rc<ForeignObject>) -> Self {
        Self(object)
    }

    pub fn class_name(&self) -> &str {
        &self.0.class.name
    }

    /// The host type the object was allocated with.
    pub fn type_id(&self) -> Option<TypeId> {
        self.0.type_id()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    /// View the payload as a `T`, if that is what it holds.
    pub fn downcast<T: 'static>(self) -> Option<Foreign<T>> {
        if !self.is::<T>() {
            return None;
        }
        Some(Foreign {
            object: self.0,
            _marker: PhantomData,
        })
    }
}

impl PartialEq for ForeignRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ForeignRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ForeignRef").field(&self.class_name()).finish()
    }
}

/// A foreign object whose payload is known to be a `T`.
///
/// Like [`ForeignRef`] it keeps the object alive, so it may outlive the
/// call it was passed to. It is not `Send`.
pub struct Foreign<T> {
    object: Rc<ForeignObject>,
    _marker: PhantomData<*mut T>,
}

impl<T> Foreign<T> {
    pub fn as_ptr(&self) -> *mut T {
        self.object.data().cast::<T>().as_ptr()
    }

    /// Mutable access to the payload.
    ///
    /// # Safety
    /// The same object may arrive in several arguments of one call, or be
    /// held elsewhere by the host; the caller must make sure no other
    /// reference to the payload is alive.
    pub unsafe fn get_mut(&mut self) -> &mut T {
        // SAFETY: exclusivity is the caller's obligation.
        unsafe { &mut *self.as_ptr() }
    }

    pub fn into_ref(self) -> ForeignRef {
        ForeignRef(self.object)
    }
}

impl<T> Deref for Foreign<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `downcast` checked the payload's type, `allocate`
        // initialized it, and the `Rc` keeps the storage alive.
        unsafe { &*self.as_ptr() }
    }
}

/// Drops the `T` stored in a foreign object's payload.
///
/// # Safety
/// `data` must point to an initialized `T` that is not used afterwards.
pub unsafe fn finalize<T>(data: *mut u8) {
    // SAFETY: upheld by the caller.
    unsafe { ptr::drop_in_place(data.cast::<T>()) }
}

/// Allocator entry for a foreign class: construct on the host, then move
/// into VM storage in slot 0. Failures abort the fiber.
pub(crate) fn allocate<T: 'static>(vm: &mut Vm, constructor: &(dyn Fn() -> T + Send + Sync)) {
    if let Err(err) = construct(vm, constructor) {
        dispatch::fail(vm, err);
    }
}

fn construct<T: 'static>(vm: &mut Vm, constructor: &(dyn Fn() -> T + Send + Sync)) -> Result<()> {
    let value = panic::catch_unwind(AssertUnwindSafe(constructor))
        .map_err(|payload| Error::Host(dispatch::panic_message(payload)))?;
    let Some(data) = vm.set_slot_new_foreign(0, 0, Layout::new::<T>()) else {
        return Err(Error::Inaccessible { slot: 0 });
    };
    // SAFETY: the block is sized and aligned for `T` and holds no value
    // yet, so nothing is overwritten without being dropped.
    unsafe { ptr::write(data.cast::<T>().as_ptr(), value) };
    log::trace!("allocated foreign {}", std::any::type_name::<T>());
    Ok(())
}

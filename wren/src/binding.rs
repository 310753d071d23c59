//! Per-VM registrations and the bind callbacks that resolve them.

use std::any::TypeId;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use vm::{FinalizerFn, ForeignClassMethods, ForeignMethodFn, Vm};

use crate::error::Error;
use crate::foreign;

/// The only module allowed to bind foreign members.
pub const ENTRY_MODULE: &str = "main";

pub(crate) struct ForeignClass {
    pub allocate: ForeignMethodFn,
    pub finalize: FinalizerFn,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ForeignClass {
    pub fn new<T: 'static>(allocate: ForeignMethodFn) -> Self {
        Self {
            allocate,
            finalize: foreign::finalize::<T>,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// Everything one VM knows about its host: registered foreign members,
/// where output goes and what went wrong in the last foreign call.
///
/// Stored as the VM's user data, so it lives and dies with the VM.
#[derive(Default)]
pub struct BoundVm {
    pub(crate) classes: HashMap<String, ForeignClass>,
    pub(crate) methods: HashMap<String, ForeignMethodFn>,
    pub(crate) out: Option<Box<dyn Write>>,
    pub(crate) err: Option<Box<dyn Write>>,
    pub(crate) modules_dir: Option<PathBuf>,
    pub(crate) pending: Option<Error>,
}

impl BoundVm {
    pub fn new(modules_dir: Option<PathBuf>) -> Self {
        Self {
            modules_dir,
            ..Default::default()
        }
    }
}

/// `["static "]<class>.<signature>`, the key foreign methods are
/// registered under.
pub fn canonical_signature(class: &str, is_static: bool, signature: &str) -> String {
    let prefix = if is_static { "static " } else { "" };
    format!("{prefix}{class}.{signature}")
}

pub(crate) fn record(vm: &Vm) -> Option<&BoundVm> {
    vm.user_data::<BoundVm>()
}

pub(crate) fn record_mut(vm: &mut Vm) -> Option<&mut BoundVm> {
    vm.user_data_mut::<BoundVm>()
}

pub(crate) fn set_pending(vm: &mut Vm, err: Error) {
    if let Some(record) = record_mut(vm) {
        record.pending = Some(err);
    }
}

pub(crate) fn take_pending(vm: &mut Vm) -> Option<Error> {
    record_mut(vm)?.pending.take()
}

pub(crate) fn bind_foreign_method(
    vm: &mut Vm,
    module: &str,
    class: &str,
    is_static: bool,
    signature: &str,
) -> Option<ForeignMethodFn> {
    let name = canonical_signature(class, is_static, signature);
    if module != ENTRY_MODULE {
        log::warn!("refusing to bind '{name}' from module '{module}'");
        set_pending(
            vm,
            Error::TrustViolation {
                module: module.to_string(),
                member: name,
            },
        );
        return None;
    }
    let found = record(vm).and_then(|r| r.methods.get(&name).copied());
    match found {
        Some(method) => {
            log::debug!("bound foreign method '{name}'");
            Some(method)
        }
        None => {
            log::warn!("no foreign method registered for '{name}'");
            set_pending(vm, Error::UnresolvedForeignMember { signature: name });
            None
        }
    }
}

/// Resolve a foreign class declaration.
///
/// # Panics
/// If `module` is not the entry module or no class named `class` was
/// registered. Both are host integration bugs, not script errors.
pub(crate) fn bind_foreign_class(vm: &mut Vm, module: &str, class: &str) -> ForeignClassMethods {
    if module != ENTRY_MODULE {
        panic!(
            "{}",
            Error::TrustViolation {
                module: module.to_string(),
                member: class.to_string(),
            }
        );
    }
    match record(vm).and_then(|r| r.classes.get(class)) {
        Some(foreign) => {
            log::debug!("bound foreign class '{class}' to {}", foreign.type_name);
            ForeignClassMethods {
                allocate: Some(foreign.allocate),
                finalize: Some(foreign.finalize),
                type_id: Some(foreign.type_id),
            }
        }
        None => panic!("foreign class {class} not found"),
    }
}

//! Fixed table of VM entry points.
//!
//! The VM calls foreign methods through plain `fn(&mut Vm)` pointers, which
//! cannot capture anything. Each entry point here is a monomorphized shim
//! that forwards to whatever callback is installed at its index, so a
//! closure can be handed to the VM by handing out the shim for a free
//! index.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use vm::{ForeignMethodFn, Vm};

/// Number of entry points, and so of foreign methods and classes the
/// process can register.
pub const MAX_REGISTRATIONS: usize = 128;

pub type Callback = Arc<dyn Fn(&mut Vm) + Send + Sync>;

static INSTALLED: OnceLock<RwLock<Vec<Option<Callback>>>> = OnceLock::new();

fn installed() -> &'static RwLock<Vec<Option<Callback>>> {
    INSTALLED.get_or_init(|| RwLock::new(vec![None; MAX_REGISTRATIONS]))
}

/// Install `callback` at `index`, replacing whatever was there.
pub fn install(index: usize, callback: Callback) {
    if let Some(slot) = installed().write().get_mut(index) {
        *slot = Some(callback);
    }
}

pub fn entry_point(index: usize) -> Option<ForeignMethodFn> {
    ENTRY_POINTS.get(index).copied()
}

fn forward(index: usize, vm: &mut Vm) {
    // Clone out so the lock is not held while the callback runs.
    let callback = installed().read().get(index).cloned().flatten();
    match callback {
        Some(callback) => callback(vm),
        None => vm.abort_fiber(format!("function {index} not registered")),
    }
}

fn entry<const I: usize>(vm: &mut Vm) {
    forward(I, vm)
}

static ENTRY_POINTS: [ForeignMethodFn; MAX_REGISTRATIONS] = [
    entry::<0>, entry::<1>, entry::<2>, entry::<3>, entry::<4>, entry::<5>,
    entry::<6>, entry::<7>, entry::<8>, entry::<9>, entry::<10>, entry::<11>,
    entry::<12>, entry::<13>, entry::<14>, entry::<15>, entry::<16>, entry::<17>,
    entry::<18>, entry::<19>, entry::<20>, entry::<21>, entry::<22>, entry::<23>,
    entry::<24>, entry::<25>, entry::<26>, entry::<27>, entry::<28>, entry::<29>,
    entry::<30>, entry::<31>, entry::<32>, entry::<33>, entry::<34>, entry::<35>,
    entry::<36>, entry::<37>, entry::<38>, entry::<39>, entry::<40>, entry::<41>,
    entry::<42>, entry::<43>, entry::<44>, entry::<45>, entry::<46>, entry::<47>,
    entry::<48>, entry::<49>, entry::<50>, entry::<51>, entry::<52>, entry::<53>,
    entry::<54>, entry::<55>, entry::<56>, entry::<57>, entry::<58>, entry::<59>,
    entry::<60>, entry::<61>, entry::<62>, entry::<63>, entry::<64>, entry::<65>,
    entry::<66>, entry::<67>, entry::<68>, entry::<69>, entry::<70>, entry::<71>,
    entry::<72>, entry::<73>, entry::<74>, entry::<75>, entry::<76>, entry::<77>,
    entry::<78>, entry::<79>, entry::<80>, entry::<81>, entry::<82>, entry::<83>,
    entry::<84>, entry::<85>, entry::<86>, entry::<87>, entry::<88>, entry::<89>,
    entry::<90>, entry::<91>, entry::<92>, entry::<93>, entry::<94>, entry::<95>,
    entry::<96>, entry::<97>, entry::<98>, entry::<99>, entry::<100>, entry::<101>,
    entry::<102>, entry::<103>, entry::<104>, entry::<105>, entry::<106>, entry::<107>,
    entry::<108>, entry::<109>, entry::<110>, entry::<111>, entry::<112>, entry::<113>,
    entry::<114>, entry::<115>, entry::<116>, entry::<117>, entry::<118>, entry::<119>,
    entry::<120>, entry::<121>, entry::<122>, entry::<123>, entry::<124>, entry::<125>,
    entry::<126>, entry::<127>,
];

#[cfg(test)]
mod tests {
    use super::*;
    use vm::{Configuration, InterpretError};

    #[test]
    fn entry_points_are_distinct() {
        let first = entry_point(0).unwrap();
        let last = entry_point(MAX_REGISTRATIONS - 1).unwrap();
        assert_ne!(first as usize, last as usize);
        assert!(entry_point(MAX_REGISTRATIONS).is_none());
    }

    fn bind_last(_: &mut Vm, _: &str, _: &str, _: bool, _: &str) -> Option<ForeignMethodFn> {
        entry_point(MAX_REGISTRATIONS - 1)
    }

    #[test]
    fn uninstalled_entry_aborts_instead_of_panicking() {
        // Registrations fill from index 0; unit tests never reach the last.
        let mut vm = Vm::new(Configuration {
            bind_foreign_method_fn: Some(bind_last),
            ..Default::default()
        });
        let source = "class Probe {\n  foreign static poke()\n}\nProbe.poke()";
        let err = vm.interpret("main", source).unwrap_err();
        assert!(
            matches!(&err, InterpretError::Runtime(e) if e.message == "function 127 not registered"),
            "{err:?}"
        );
    }
}

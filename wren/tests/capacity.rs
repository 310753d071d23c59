//! Entry points are process-wide, so this lives in its own test binary.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use wren::{Error, MAX_REGISTRATIONS, VM};

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn registrations_are_capped() {
    let mut vm = VM::new();
    let out = Shared::default();
    vm.set_output_writer(out.clone());
    for i in 0..MAX_REGISTRATIONS {
        let name = format!("static Many.m{i}()");
        vm.register_foreign_method(&name, move || i)
            .unwrap_or_else(|err| panic!("registration {i} failed: {err}"));
    }
    assert_eq!(wren::registry::registered(), MAX_REGISTRATIONS);

    let err = vm
        .register_foreign_method("static Many.last()", || 0)
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { capacity: 128 }));
    assert_eq!(err.to_string(), "maximum function registration reached (128)");

    let err = vm.register_foreign_class("Late", || 0u8).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { .. }));

    // Everything registered before the cap still works.
    vm.interpret("class Many {\n  foreign static m0()\n  foreign static m127()\n}\nSystem.print(Many.m0())\nSystem.print(Many.m127())")
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(out.0.lock().unwrap().as_slice(), b"0\n127\n");
}

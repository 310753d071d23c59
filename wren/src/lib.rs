//! # Wren
//!
//! Host bindings for the embedded script VM: expose Rust closures as
//! `foreign` methods, Rust types as `foreign class`es, and call script
//! methods from Rust.
//!
//! ```text
//!  register_foreign_method("static GoMath.add(_,_)", |a: i64, b: i64| a + b)
//!      │
//!      ▼
//!  registry ── next free index ──▶ trampoline table ── fn(&mut Vm) ──▶ BoundVm
//!                                                                       │
//!  class GoMath { foreign static add(x, y) }  ── bind ─────────────────┘
//!  GoMath.add(2, 3) ── entry point ──▶ dispatch ── slots ⇄ host values
//! ```
//!
//! ```rust
//! use wren::VM;
//!
//! let mut vm = VM::new();
//! vm.register_foreign_method("static GoMath.add(_,_)", |a: i64, b: i64| a + b)
//!     .unwrap();
//! vm.interpret("class GoMath {\n  foreign static add(x, y)\n}\nSystem.print(GoMath.add(2, 3))")
//!     .unwrap();
//! ```
//!
//! Entry points are a process-wide resource: at most
//! [`MAX_REGISTRATIONS`] foreign methods and classes can be registered
//! across all VMs, after which registration fails with
//! [`Error::CapacityExceeded`].

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub mod binding;
pub mod dispatch;
pub mod error;
pub mod foreign;
mod io;
pub mod registry;
pub mod slot;
pub mod trampoline;

use binding::{BoundVm, ENTRY_MODULE, ForeignClass};
use vm::{CallHandle, Configuration, Handle, InterpretError, Vm};

pub use dispatch::{HostFunction, IntoHostFunction};
pub use error::{Error, Result};
pub use foreign::{Foreign, ForeignRef};
pub use slot::{FromSlot, HostReturn, HostValue, IntoSlot, NumKind, SlotKind};
pub use trampoline::MAX_REGISTRATIONS;

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Where `import "name"` looks for `name.wren`.
    pub modules_dir: Option<PathBuf>,
}

/// A script VM bound to this host.
pub struct VM {
    vm: Vm,
}

impl VM {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        let mut vm = Vm::new(Configuration {
            write_fn: Some(io::write_output),
            error_fn: Some(io::write_error),
            bind_foreign_method_fn: Some(binding::bind_foreign_method),
            bind_foreign_class_fn: Some(binding::bind_foreign_class),
            load_module_fn: Some(io::load_module),
        });
        vm.set_user_data(BoundVm::new(options.modules_dir));
        Self { vm }
    }

    fn with_record(&mut self, f: impl FnOnce(&mut BoundVm)) {
        if let Some(record) = binding::record_mut(&mut self.vm) {
            f(record);
        }
    }

    /// Register `f` as the foreign method `name`, written
    /// `["static "]<Class>.<signature>`, e.g. `"static GoMath.add(_,_)"` or
    /// `"God.getMessage(_)"`. Instance methods of foreign classes take
    /// the receiver as a leading `Foreign<T>` parameter.
    ///
    /// Registering the same name again replaces the binding for this VM
    /// but still uses up an entry point.
    pub fn register_foreign_method<Marker>(
        &mut self,
        name: &str,
        f: impl IntoHostFunction<Marker>,
    ) -> Result<()> {
        let entry = registry::register_method(name, f.into_host_function())?;
        self.with_record(|record| {
            record.methods.insert(name.to_string(), entry);
        });
        Ok(())
    }

    /// Register `constructor` as the allocator of foreign class `name`.
    /// Each `construct` of the class stores a fresh `T` in the VM; it is
    /// dropped when the script object is released.
    pub fn register_foreign_class<T, F>(&mut self, name: &str, constructor: F) -> Result<()>
    where
        T: 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let entry = registry::register_class::<T, F>(name, constructor)?;
        self.with_record(|record| {
            record
                .classes
                .insert(name.to_string(), ForeignClass::new::<T>(entry));
        });
        Ok(())
    }

    /// Send script output to `w` instead of stdout.
    pub fn set_output_writer(&mut self, w: impl Write + 'static) {
        self.with_record(|record| record.out = Some(Box::new(w)));
    }

    /// Send error reports to `w` instead of stderr.
    pub fn set_error_writer(&mut self, w: impl Write + 'static) {
        self.with_record(|record| record.err = Some(Box::new(w)));
    }

    pub fn set_modules_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        self.with_record(|record| record.modules_dir = Some(dir));
    }

    /// Run `source` as the entry module.
    pub fn interpret(&mut self, source: &str) -> Result<()> {
        binding::take_pending(&mut self.vm);
        let result = self.vm.interpret(ENTRY_MODULE, source);
        self.finish(result)
    }

    pub fn interpret_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let source = fs::read_to_string(path)?;
        self.interpret(&source)
    }

    /// Reads `reader` to the end before interpreting.
    pub fn interpret_reader(&mut self, mut reader: impl Read) -> Result<()> {
        let mut source = String::new();
        reader.read_to_string(&mut source)?;
        self.interpret(&source)
    }

    /// Prefer the error a foreign call parked over the VM's generic one.
    fn finish(&mut self, result: std::result::Result<(), InterpretError>) -> Result<()> {
        let pending = binding::take_pending(&mut self.vm);
        match result {
            Ok(()) => Ok(()),
            Err(InterpretError::Compile(_)) => Err(Error::Compile),
            Err(InterpretError::Runtime(err)) => Err(pending.unwrap_or(Error::Runtime(err.message))),
        }
    }

    /// Look up a top-level variable of the entry module.
    pub fn variable(&mut self, name: &str) -> Option<Value> {
        self.vm.ensure_slots(1);
        if !self.vm.get_variable(ENTRY_MODULE, name, 0) {
            return None;
        }
        let handle = self.vm.get_slot_handle(0)?;
        Some(Value {
            handle,
            methods: HashMap::new(),
        })
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

/// A script value the host holds on to.
pub struct Value {
    handle: Handle,
    methods: HashMap<String, CallHandle>,
}

impl Value {
    /// Call method `signature` on this value: a class for static methods,
    /// an instance otherwise. Returns the script's result, or `None` for
    /// null.
    ///
    /// ```rust
    /// let mut vm = wren::VM::new();
    /// vm.interpret("class Bird {\n  static fly(where) {\n    return \"Flying to %(where)!\"\n  }\n}")
    ///     .unwrap();
    /// let mut bird = vm.variable("Bird").unwrap();
    /// let response = bird.call(&mut vm, "fly(_)", &["Chicago".into()]).unwrap();
    /// assert_eq!(response, Some(wren::HostValue::Str("Flying to Chicago!".into())));
    /// ```
    pub fn call(
        &mut self,
        vm: &mut VM,
        signature: &str,
        params: &[HostValue],
    ) -> Result<Option<HostValue>> {
        let call = self
            .methods
            .entry(signature.to_string())
            .or_insert_with(|| vm.vm.make_call_handle(signature))
            .clone();
        if params.len() < call.arity() {
            return Err(Error::MissingArgument {
                slot: params.len() + 1,
            });
        }
        vm.vm.ensure_slots(params.len() + 1);
        vm.vm.set_slot_handle(0, &self.handle);
        for (i, param) in params.iter().enumerate() {
            slot::encode(&mut vm.vm, i + 1, param)?;
        }

        binding::take_pending(&mut vm.vm);
        let result = vm.vm.call(&call);
        vm.finish(result)?;
        match slot::decode(&vm.vm, 0, &SlotKind::Any)? {
            HostValue::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }
}

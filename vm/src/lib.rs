//! # Vm
//!
//! A small embeddable interpreter for the class-based scripting dialect
//! parsed by the `parser` crate.
//!
//! The host talks to a running [`Vm`] the way native extensions of such
//! languages usually do: through a numbered *slot* window. A foreign method
//! finds its receiver in slot 0 and its arguments in slots `1..=n`, and
//! leaves its result in slot 0. Host callbacks are plain function pointers
//! registered in a [`Configuration`]; per-VM host state travels as typed
//! user data.
//!
//! ```rust
//! use vm::{Configuration, Vm};
//!
//! fn write(vm: &mut Vm, text: &str) {
//!     if let Some(out) = vm.user_data_mut::<String>() {
//!         out.push_str(text);
//!     }
//! }
//!
//! let mut vm = Vm::new(Configuration {
//!     write_fn: Some(write),
//!     ..Default::default()
//! });
//! vm.set_user_data(String::new());
//! vm.interpret("main", "System.print(\"Hello, %(1 + 2)!\")").unwrap();
//! assert_eq!(vm.user_data::<String>().unwrap(), "Hello, 3!\n");
//! ```

use std::alloc::Layout;
use std::any::Any;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::rc::Rc;

pub mod builtins;
pub mod error;
pub mod interpreter;
pub mod value;

use builtins::CoreClasses;
use interpreter::Module;

pub use error::{ErrorType, InterpretError, RuntimeError, TraceEntry};
pub use value::{
    Class, FinalizerFn, ForeignClassMethods, ForeignMethodFn, ForeignObject,
    Method, Value, format_num,
};

/// Receives text written by `System.print` and friends.
pub type WriteFn = fn(&mut Vm, &str);

/// Receives compile errors, runtime errors and stack trace lines:
/// `(vm, kind, module, line, message)`.
pub type ErrorFn = fn(&mut Vm, ErrorType, &str, usize, &str);

/// Resolves `foreign` methods: `(vm, module, class, is_static, signature)`.
pub type BindForeignMethodFn =
    fn(&mut Vm, &str, &str, bool, &str) -> Option<ForeignMethodFn>;

/// Resolves `foreign class` declarations: `(vm, module, class)`.
pub type BindForeignClassFn = fn(&mut Vm, &str, &str) -> ForeignClassMethods;

/// Returns the source of an imported module, or `None` if there is none.
pub type LoadModuleFn = fn(&mut Vm, &str) -> Option<String>;

#[derive(Default, Clone, Copy)]
pub struct Configuration {
    pub write_fn: Option<WriteFn>,
    pub error_fn: Option<ErrorFn>,
    pub bind_foreign_method_fn: Option<BindForeignMethodFn>,
    pub bind_foreign_class_fn: Option<BindForeignClassFn>,
    pub load_module_fn: Option<LoadModuleFn>,
}

/// What a slot holds, as far as the host API is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    Bool,
    Num,
    Foreign,
    List,
    Null,
    String,
    /// Script objects and classes, and slots past the window.
    Unknown,
}

/// Keeps a script value alive outside the slot window.
#[derive(Clone, Debug)]
pub struct Handle {
    value: Value,
}

impl Handle {
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A prepared method signature for [`Vm::call`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallHandle {
    signature: String,
    arity: usize,
}

impl CallHandle {
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn arity(&self) -> usize {
        self.arity
    }
}

pub struct Vm {
    pub(crate) config: Configuration,
    pub(crate) core: CoreClasses,
    pub(crate) modules: HashMap<String, Rc<Module>>,
    pub(crate) slots: Vec<Value>,
    /// Set once slot 0 is written during a foreign call.
    pub(crate) return_written: bool,
    pub(crate) abort: Option<String>,
    pub(crate) depth: usize,
    user_data: Option<Box<dyn Any>>,
}

impl Vm {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            core: CoreClasses::new(),
            modules: HashMap::new(),
            slots: Vec::new(),
            return_written: false,
            abort: None,
            depth: 0,
            user_data: None,
        }
    }

    /// Compile and run `source` in `module`, creating the module if this is
    /// its first use. Errors are reported through the error callback
    /// before being returned.
    pub fn interpret(&mut self, module: &str, source: &str) -> Result<(), InterpretError> {
        let stmts = match parser::parse_module(source) {
            Ok(stmts) => stmts,
            Err(errors) => {
                for err in &errors {
                    self.report(ErrorType::Compile, module, err.line(), &err.message);
                }
                return Err(InterpretError::Compile(errors));
            }
        };
        let module = self.module_or_new(module);
        self.depth = 0;
        self.run_module(&module, &stmts).map_err(|err| {
            self.report_runtime(&err);
            InterpretError::Runtime(err)
        })
    }

    pub(crate) fn report(&mut self, kind: ErrorType, module: &str, line: usize, message: &str) {
        if let Some(error_fn) = self.config.error_fn {
            error_fn(self, kind, module, line, message);
        }
    }

    fn report_runtime(&mut self, err: &RuntimeError) {
        self.report(ErrorType::Runtime, "", 0, &err.message);
        for entry in &err.trace {
            self.report(ErrorType::StackTrace, &entry.module, entry.line, &entry.function);
        }
    }

    pub(crate) fn write(&mut self, text: &str) {
        if let Some(write_fn) = self.config.write_fn {
            write_fn(self, text);
        }
    }

    /// Abort the running fiber with `message` once the current foreign
    /// call returns.
    pub fn abort_fiber(&mut self, message: impl Into<String>) {
        self.abort = Some(message.into());
    }

    pub fn set_user_data<T: Any>(&mut self, data: T) {
        self.user_data = Some(Box::new(data));
    }

    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_ref()?.downcast_ref()
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut()?.downcast_mut()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn ensure_slots(&mut self, count: usize) {
        if self.slots.len() < count {
            self.slots.resize(count, Value::Null);
        }
    }

    fn slot(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot)
    }

    fn set_slot(&mut self, slot: usize, value: Value) {
        self.ensure_slots(slot + 1);
        self.slots[slot] = value;
        if slot == 0 {
            self.return_written = true;
        }
    }

    pub fn slot_type(&self, slot: usize) -> SlotType {
        match self.slot(slot) {
            Some(Value::Bool(_)) => SlotType::Bool,
            Some(Value::Num(_)) => SlotType::Num,
            Some(Value::Foreign(_)) => SlotType::Foreign,
            Some(Value::List(_)) => SlotType::List,
            Some(Value::Null) => SlotType::Null,
            Some(Value::Str(_)) => SlotType::String,
            Some(Value::Class(_) | Value::Instance(_)) | None => SlotType::Unknown,
        }
    }

    pub fn get_slot_bool(&self, slot: usize) -> Option<bool> {
        match self.slot(slot)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_slot_double(&self, slot: usize) -> Option<f64> {
        match self.slot(slot)? {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_slot_string(&self, slot: usize) -> Option<&str> {
        match self.slot(slot)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The payload of the foreign object in `slot`. The pointer stays valid
    /// while the object is reachable from the slot.
    pub fn get_slot_foreign(&self, slot: usize) -> Option<NonNull<u8>> {
        match self.slot(slot)? {
            Value::Foreign(object) => Some(object.data()),
            _ => None,
        }
    }

    /// The foreign object in `slot` itself; holding it keeps the object
    /// alive.
    pub fn get_slot_foreign_object(&self, slot: usize) -> Option<Rc<ForeignObject>> {
        match self.slot(slot)? {
            Value::Foreign(object) => Some(object.clone()),
            _ => None,
        }
    }

    /// Name of the class of the foreign object in `slot`.
    pub fn slot_foreign_class(&self, slot: usize) -> Option<&str> {
        match self.slot(slot)? {
            Value::Foreign(object) => Some(&object.class.name),
            _ => None,
        }
    }

    pub fn set_slot_null(&mut self, slot: usize) {
        self.set_slot(slot, Value::Null);
    }

    pub fn set_slot_bool(&mut self, slot: usize, value: bool) {
        self.set_slot(slot, Value::Bool(value));
    }

    pub fn set_slot_double(&mut self, slot: usize, value: f64) {
        self.set_slot(slot, Value::Num(value));
    }

    pub fn set_slot_string(&mut self, slot: usize, value: &str) {
        self.set_slot(slot, Value::str(value));
    }

    /// Create an instance of the foreign class in `class_slot` with zeroed
    /// storage for `layout`, store it in `slot` and return its payload.
    /// Returns `None` if `class_slot` does not hold a foreign class.
    pub fn set_slot_new_foreign(
        &mut self,
        slot: usize,
        class_slot: usize,
        layout: Layout,
    ) -> Option<NonNull<u8>> {
        let class = match self.slot(class_slot)? {
            Value::Class(class) if class.is_foreign => class.clone(),
            _ => return None,
        };
        let object = Rc::new(ForeignObject::new(class, layout)?);
        let data = object.data();
        self.set_slot(slot, Value::Foreign(object));
        Some(data)
    }

    pub fn get_slot_handle(&self, slot: usize) -> Option<Handle> {
        self.slot(slot).map(|value| Handle {
            value: value.clone(),
        })
    }

    pub fn set_slot_handle(&mut self, slot: usize, handle: &Handle) {
        self.set_slot(slot, handle.value.clone());
    }

    /// Load the top-level variable `name` of `module` into `slot`. Returns
    /// `false` if either does not exist.
    pub fn get_variable(&mut self, module: &str, name: &str, slot: usize) -> bool {
        let value = match self.modules.get(module).and_then(|m| m.get(name)) {
            Some(value) => value,
            None => return false,
        };
        self.set_slot(slot, value);
        true
    }

    /// Prepare `signature` (e.g. `add(_,_)`, `count`, `[_]`) for
    /// [`Vm::call`].
    pub fn make_call_handle(&self, signature: &str) -> CallHandle {
        let params = match signature.find(['(', '[']) {
            Some(open) => &signature[open..],
            None => "",
        };
        CallHandle {
            signature: signature.to_string(),
            arity: params.matches('_').count(),
        }
    }

    /// Invoke `handle` with the receiver in slot 0 and arguments in slots
    /// `1..=arity`. On success the result is in slot 0.
    pub fn call(&mut self, handle: &CallHandle) -> Result<(), InterpretError> {
        if self.slots.len() <= handle.arity {
            let err = RuntimeError::new(format!(
                "Calling '{}' needs {} slots.",
                handle.signature,
                handle.arity + 1
            ));
            self.report_runtime(&err);
            return Err(InterpretError::Runtime(err));
        }
        let receiver = self.slots[0].clone();
        let args = self.slots[1..=handle.arity].to_vec();
        match self.invoke(receiver, &handle.signature, args) {
            Ok(value) => {
                self.set_slot(0, value);
                Ok(())
            }
            Err(err) => {
                self.report_runtime(&err);
                Err(InterpretError::Runtime(err))
            }
        }
    }
}

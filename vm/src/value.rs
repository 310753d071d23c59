use std::alloc::{self, Layout};
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use parser::MethodDecl;

use crate::Vm;
use crate::error::RuntimeError;

/// A host function bound to a foreign method. It reads its receiver and
/// arguments from the slot window and writes its result to slot 0.
pub type ForeignMethodFn = fn(&mut Vm);

/// Disposes of a foreign object's payload in place before its storage is
/// released.
///
/// # Safety
/// Called exactly once with the payload pointer of an object whose class
/// the finalizer was bound to.
pub type FinalizerFn = unsafe fn(*mut u8);

/// A built-in method implemented by the VM itself.
pub type PrimitiveFn =
    fn(&mut Vm, &Value, &[Value]) -> Result<Value, RuntimeError>;

/// Host callbacks for a foreign class, resolved once when the class
/// declaration executes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForeignClassMethods {
    pub allocate: Option<ForeignMethodFn>,
    pub finalize: Option<FinalizerFn>,
    /// Host type the allocator stores, if the binder declares one.
    pub type_id: Option<TypeId>,
}

#[derive(Clone)]
pub enum Method {
    Primitive(PrimitiveFn),
    Foreign(ForeignMethodFn),
    Script(Rc<MethodDecl>),
    Constructor(Rc<MethodDecl>),
}

pub struct Class {
    pub name: Rc<str>,
    /// Name of the module the class was declared in.
    pub module: Rc<str>,
    pub is_foreign: bool,
    methods: RefCell<HashMap<String, Method>>,
    static_methods: RefCell<HashMap<String, Method>>,
    foreign: Cell<ForeignClassMethods>,
}

impl Class {
    pub fn new(name: &str, module: &str, is_foreign: bool) -> Self {
        Self {
            name: Rc::from(name),
            module: Rc::from(module),
            is_foreign,
            methods: RefCell::new(HashMap::new()),
            static_methods: RefCell::new(HashMap::new()),
            foreign: Cell::new(ForeignClassMethods::default()),
        }
    }

    pub fn define(&self, signature: impl Into<String>, method: Method) {
        self.methods.borrow_mut().insert(signature.into(), method);
    }

    pub fn define_static(&self, signature: impl Into<String>, method: Method) {
        self.static_methods
            .borrow_mut()
            .insert(signature.into(), method);
    }

    pub fn find(&self, signature: &str) -> Option<Method> {
        self.methods.borrow().get(signature).cloned()
    }

    pub fn find_static(&self, signature: &str) -> Option<Method> {
        self.static_methods.borrow().get(signature).cloned()
    }

    pub fn foreign_methods(&self) -> ForeignClassMethods {
        self.foreign.get()
    }

    pub(crate) fn set_foreign_methods(&self, methods: ForeignClassMethods) {
        self.foreign.set(methods);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("is_foreign", &self.is_foreign)
            .finish_non_exhaustive()
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    /// Unset fields read as null.
    pub fn field(&self, name: &str) -> Value {
        self.fields.borrow().get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_string(), value);
    }
}

/// An instance of a foreign class: an opaque, host-owned block of bytes.
///
/// The block is zeroed on allocation. When the last reference goes away
/// the class finalizer runs on the payload, then the storage is freed.
pub struct ForeignObject {
    pub class: Rc<Class>,
    data: NonNull<u8>,
    layout: Layout,
}

impl ForeignObject {
    pub(crate) fn new(class: Rc<Class>, layout: Layout) -> Option<Self> {
        // Zero-sized payloads still get a unique address.
        let layout =
            Layout::from_size_align(layout.size().max(1), layout.align())
                .ok()?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let data = match NonNull::new(raw) {
            Some(data) => data,
            None => alloc::handle_alloc_error(layout),
        };
        Some(Self {
            class,
            data,
            layout,
        })
    }

    pub fn data(&self) -> NonNull<u8> {
        self.data
    }

    /// Host type of the payload. Fixed when the class declaration was
    /// bound, so later host registrations never change it.
    pub fn type_id(&self) -> Option<TypeId> {
        self.class.foreign_methods().type_id
    }
}

impl Drop for ForeignObject {
    fn drop(&mut self) {
        if let Some(finalize) = self.class.foreign_methods().finalize {
            // SAFETY: the finalizer was bound to this object's class and
            // runs once, before the storage is released.
            unsafe { finalize(self.data.as_ptr()) };
        }
        // SAFETY: allocated in `new` with the same layout.
        unsafe { alloc::dealloc(self.data.as_ptr(), self.layout) };
    }
}

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Foreign(Rc<ForeignObject>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Only `false` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    /// Value equality for primitives and strings, identity for everything
    /// else.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => write!(f, "{}", format_num(*n)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Class(class) => write!(f, "{}", class.name),
            Value::Instance(instance) => {
                write!(f, "instance of {}", instance.class.name)
            }
            Value::Foreign(object) => {
                write!(f, "foreign instance of {}", object.class.name)
            }
        }
    }
}

/// Integral numbers print without a fractional part.
pub fn format_num(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "infinity" } else { "-infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        if n == 0.0 && n.is_sign_negative() {
            return "-0".to_string();
        }
        return format!("{}", n as i64);
    }
    format!("{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_have_no_fraction() {
        assert_eq!(format_num(5.0), "5");
        assert_eq!(format_num(-12.0), "-12");
        assert_eq!(format_num(2.5), "2.5");
        assert_eq!(format_num(f64::NAN), "nan");
        assert_eq!(format_num(f64::INFINITY), "infinity");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Num(0.0).is_truthy());
        assert!(Value::str("").is_truthy());
    }

    #[test]
    fn strings_compare_by_content_lists_by_identity() {
        assert!(Value::str("a").equals(&Value::str("a")));
        let list = Value::list(vec![]);
        assert!(list.equals(&list.clone()));
        assert!(!list.equals(&Value::list(vec![])));
    }

    #[test]
    fn foreign_storage_is_zeroed_and_finalized() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static FINALIZED: AtomicUsize = AtomicUsize::new(0);
        unsafe fn finalize(data: *mut u8) {
            // SAFETY: the payload is a u64 in these tests.
            let value = unsafe { *(data as *const u64) };
            FINALIZED.fetch_add(value as usize + 1, Ordering::SeqCst);
        }

        let class = Rc::new(Class::new("Thing", "main", true));
        class.set_foreign_methods(ForeignClassMethods {
            allocate: None,
            finalize: Some(finalize),
            type_id: Some(TypeId::of::<u64>()),
        });
        let object = ForeignObject::new(class, Layout::new::<u64>()).unwrap();
        assert_eq!(unsafe { *(object.data().as_ptr() as *const u64) }, 0);
        assert_eq!(object.type_id(), Some(TypeId::of::<u64>()));
        drop(object);
        assert_eq!(FINALIZED.load(Ordering::SeqCst), 1);
    }
}

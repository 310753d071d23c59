//! Built-in classes and their primitive methods.

use std::rc::Rc;

use crate::Vm;
use crate::error::RuntimeError;
use crate::value::{Class, Method, PrimitiveFn, Value, format_num};

/// Name of the pseudo-module the core classes are declared in.
pub const CORE_MODULE: &str = "core";

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub signature: &'static str,
    pub func: PrimitiveFn,
}

impl PrimitiveDesc {
    pub const fn new(signature: &'static str, func: PrimitiveFn) -> Self {
        Self { signature, func }
    }
}

const BOOL_PRIMITIVES: &[PrimitiveDesc] = &[
    PrimitiveDesc::new("!", bool_not),
    PrimitiveDesc::new("toString", bool_to_string),
];

const NULL_PRIMITIVES: &[PrimitiveDesc] = &[
    PrimitiveDesc::new("!", null_not),
    PrimitiveDesc::new("toString", null_to_string),
];

const NUM_PRIMITIVES: &[PrimitiveDesc] = &[
    PrimitiveDesc::new("+(_)", num_add),
    PrimitiveDesc::new("-(_)", num_sub),
    PrimitiveDesc::new("*(_)", num_mul),
    PrimitiveDesc::new("/(_)", num_div),
    PrimitiveDesc::new("%(_)", num_mod),
    PrimitiveDesc::new("<(_)", num_lt),
    PrimitiveDesc::new(">(_)", num_gt),
    PrimitiveDesc::new("<=(_)", num_le),
    PrimitiveDesc::new(">=(_)", num_ge),
    PrimitiveDesc::new("-", num_neg),
    PrimitiveDesc::new("abs", num_abs),
    PrimitiveDesc::new("floor", num_floor),
    PrimitiveDesc::new("ceil", num_ceil),
    PrimitiveDesc::new("sqrt", num_sqrt),
    PrimitiveDesc::new("isInteger", num_is_integer),
    PrimitiveDesc::new("toString", num_to_string),
];

const STRING_PRIMITIVES: &[PrimitiveDesc] = &[
    PrimitiveDesc::new("+(_)", string_concat),
    PrimitiveDesc::new("count", string_count),
    PrimitiveDesc::new("contains(_)", string_contains),
    PrimitiveDesc::new("toString", string_to_string),
];

const LIST_PRIMITIVES: &[PrimitiveDesc] = &[
    PrimitiveDesc::new("add(_)", list_add),
    PrimitiveDesc::new("count", list_count),
    PrimitiveDesc::new("[_]", list_subscript),
    PrimitiveDesc::new("toString", list_to_string),
];

const SYSTEM_STATICS: &[PrimitiveDesc] = &[
    PrimitiveDesc::new("print()", system_print_newline),
    PrimitiveDesc::new("print(_)", system_print),
    PrimitiveDesc::new("write(_)", system_write),
];

/// The classes every module can see without importing anything.
pub struct CoreClasses {
    pub bool_class: Rc<Class>,
    pub null_class: Rc<Class>,
    pub num_class: Rc<Class>,
    pub string_class: Rc<Class>,
    pub list_class: Rc<Class>,
    pub system: Rc<Class>,
}

impl CoreClasses {
    pub fn new() -> Self {
        Self {
            bool_class: core_class("Bool", BOOL_PRIMITIVES, &[]),
            null_class: core_class("Null", NULL_PRIMITIVES, &[]),
            num_class: core_class("Num", NUM_PRIMITIVES, &[]),
            string_class: core_class("String", STRING_PRIMITIVES, &[]),
            list_class: core_class("List", LIST_PRIMITIVES, &[]),
            system: core_class("System", &[], SYSTEM_STATICS),
        }
    }

    pub fn all(&self) -> [&Rc<Class>; 6] {
        [
            &self.bool_class,
            &self.null_class,
            &self.num_class,
            &self.string_class,
            &self.list_class,
            &self.system,
        ]
    }
}

impl Default for CoreClasses {
    fn default() -> Self {
        Self::new()
    }
}

fn core_class(
    name: &str,
    methods: &[PrimitiveDesc],
    statics: &[PrimitiveDesc],
) -> Rc<Class> {
    let class = Class::new(name, CORE_MODULE, false);
    for desc in methods {
        class.define(desc.signature, Method::Primitive(desc.func));
    }
    for desc in statics {
        class.define_static(desc.signature, Method::Primitive(desc.func));
    }
    Rc::new(class)
}

fn expect_num(value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Num(n) => Ok(*n),
        _ => Err(RuntimeError::new("Right operand must be a number.")),
    }
}

fn receiver_num(receiver: &Value) -> f64 {
    match receiver {
        Value::Num(n) => *n,
        _ => f64::NAN,
    }
}

fn arg(args: &[Value], index: usize) -> Result<&Value, RuntimeError> {
    args.get(index)
        .ok_or_else(|| RuntimeError::new("Missing argument."))
}

fn bool_not(_: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(!receiver.is_truthy()))
}

fn bool_to_string(_: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    let text = if receiver.is_truthy() { "true" } else { "false" };
    Ok(Value::str(text))
}

fn null_not(_: &mut Vm, _: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(true))
}

fn null_to_string(_: &mut Vm, _: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::str("null"))
}

macro_rules! num_binary {
    ($name:ident, $result:ident, |$a:ident, $b:ident| $body:expr) => {
        fn $name(
            _: &mut Vm,
            receiver: &Value,
            args: &[Value],
        ) -> Result<Value, RuntimeError> {
            let $a = receiver_num(receiver);
            let $b = expect_num(arg(args, 0)?)?;
            Ok(Value::$result($body))
        }
    };
}

num_binary!(num_add, Num, |a, b| a + b);
num_binary!(num_sub, Num, |a, b| a - b);
num_binary!(num_mul, Num, |a, b| a * b);
num_binary!(num_div, Num, |a, b| a / b);
num_binary!(num_mod, Num, |a, b| a % b);
num_binary!(num_lt, Bool, |a, b| a < b);
num_binary!(num_gt, Bool, |a, b| a > b);
num_binary!(num_le, Bool, |a, b| a <= b);
num_binary!(num_ge, Bool, |a, b| a >= b);

macro_rules! num_unary {
    ($name:ident, $result:ident, |$a:ident| $body:expr) => {
        fn $name(
            _: &mut Vm,
            receiver: &Value,
            _: &[Value],
        ) -> Result<Value, RuntimeError> {
            let $a = receiver_num(receiver);
            Ok(Value::$result($body))
        }
    };
}

num_unary!(num_neg, Num, |a| -a);
num_unary!(num_abs, Num, |a| a.abs());
num_unary!(num_floor, Num, |a| a.floor());
num_unary!(num_ceil, Num, |a| a.ceil());
num_unary!(num_sqrt, Num, |a| a.sqrt());
num_unary!(num_is_integer, Bool, |a| a.is_finite() && a.fract() == 0.0);

fn num_to_string(_: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Str(Rc::from(format_num(receiver_num(receiver)))))
}

fn string_concat(_: &mut Vm, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match (receiver, arg(args, 0)?) {
        (Value::Str(a), Value::Str(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::Str(Rc::from(joined)))
        }
        _ => Err(RuntimeError::new("Right operand must be a string.")),
    }
}

fn string_count(_: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    match receiver {
        Value::Str(s) => Ok(Value::Num(s.chars().count() as f64)),
        _ => Ok(Value::Num(0.0)),
    }
}

fn string_contains(_: &mut Vm, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match (receiver, arg(args, 0)?) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a.contains(&**b))),
        _ => Err(RuntimeError::new("Argument must be a string.")),
    }
}

fn string_to_string(_: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    Ok(receiver.clone())
}

fn list_add(_: &mut Vm, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let item = arg(args, 0)?.clone();
    if let Value::List(items) = receiver {
        items.borrow_mut().push(item.clone());
    }
    Ok(item)
}

fn list_count(_: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    match receiver {
        Value::List(items) => Ok(Value::Num(items.borrow().len() as f64)),
        _ => Ok(Value::Num(0.0)),
    }
}

fn list_subscript(_: &mut Vm, receiver: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let Value::List(items) = receiver else {
        return Ok(Value::Null);
    };
    let Value::Num(index) = arg(args, 0)? else {
        return Err(RuntimeError::new("Subscript must be a number."));
    };
    if index.fract() != 0.0 {
        return Err(RuntimeError::new("Subscript must be an integer."));
    }
    let items = items.borrow();
    let len = items.len() as i64;
    let mut index = *index as i64;
    // Negative subscripts count back from the end.
    if index < 0 {
        index += len;
    }
    if index < 0 || index >= len {
        return Err(RuntimeError::new("Subscript out of bounds."));
    }
    Ok(items[index as usize].clone())
}

fn list_to_string(vm: &mut Vm, receiver: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    let Value::List(items) = receiver else {
        return Ok(Value::str("[]"));
    };
    let snapshot = items.borrow().clone();
    let mut parts = Vec::with_capacity(snapshot.len());
    for item in snapshot {
        parts.push(vm.stringify(item)?);
    }
    Ok(Value::Str(Rc::from(format!("[{}]", parts.join(", ")))))
}

fn system_print_newline(vm: &mut Vm, _: &Value, _: &[Value]) -> Result<Value, RuntimeError> {
    vm.write("\n");
    Ok(Value::Null)
}

fn system_print(vm: &mut Vm, _: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let value = arg(args, 0)?.clone();
    let mut text = vm.stringify(value.clone())?;
    text.push('\n');
    vm.write(&text);
    Ok(value)
}

fn system_write(vm: &mut Vm, _: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let value = arg(args, 0)?.clone();
    let text = vm.stringify(value.clone())?;
    vm.write(&text);
    Ok(value)
}

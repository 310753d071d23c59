//! Conversions between VM slots and host values.
//!
//! The VM only knows a handful of value tags. [`decode`] reads one slot
//! against the [`SlotKind`] a host function declared for that position
//! and [`encode`] writes a host value back. Every number crosses as an
//! IEEE double; host integer types are produced with `as`, so fractions
//! truncate and out-of-range values saturate.

use std::any::{TypeId, type_name};
use std::fmt;

use vm::{SlotType, Vm};

use crate::error::{Error, Result};
use crate::foreign::{Foreign, ForeignRef};

/// Host numeric type a parameter or return value narrows to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
}

impl NumKind {
    pub fn name(self) -> &'static str {
        match self {
            NumKind::F32 => "f32",
            NumKind::F64 => "f64",
            NumKind::I8 => "i8",
            NumKind::I16 => "i16",
            NumKind::I32 => "i32",
            NumKind::I64 => "i64",
            NumKind::Isize => "isize",
            NumKind::U8 => "u8",
            NumKind::U16 => "u16",
            NumKind::U32 => "u32",
            NumKind::U64 => "u64",
            NumKind::Usize => "usize",
        }
    }
}

/// What a host function expects in, or produces for, one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Bool,
    Num(NumKind),
    String,
    /// A foreign object whose payload is a `T` with this `TypeId`.
    Foreign {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// Accepts null as well as the inner kind.
    Optional(Box<SlotKind>),
    /// Whatever plain value the slot holds.
    Any,
}

impl SlotKind {
    pub fn foreign<T: 'static>() -> Self {
        SlotKind::Foreign {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub fn optional(inner: SlotKind) -> Self {
        SlotKind::Optional(Box::new(inner))
    }

    /// Whether `value` has the shape this kind describes.
    pub fn accepts(&self, value: &HostValue) -> bool {
        match (self, value) {
            (SlotKind::Any, _) => true,
            (SlotKind::Optional(_), HostValue::Null) => true,
            (SlotKind::Optional(inner), value) => inner.accepts(value),
            (SlotKind::Bool, HostValue::Bool(_)) => true,
            (SlotKind::Num(_), HostValue::Num(_)) => true,
            (SlotKind::String, HostValue::Str(_)) => true,
            (SlotKind::Foreign { type_id, .. }, HostValue::Foreign(object)) => {
                object.type_id() == Some(*type_id)
            }
            _ => false,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Bool => f.write_str("bool"),
            SlotKind::Num(kind) => write!(f, "num ({})", kind.name()),
            SlotKind::String => f.write_str("string"),
            SlotKind::Foreign { type_name, .. } => write!(f, "foreign {type_name}"),
            SlotKind::Optional(inner) => write!(f, "{inner} or null"),
            SlotKind::Any => f.write_str("any value"),
        }
    }
}

/// A value on the host side of the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Foreign(ForeignRef),
}

impl HostValue {
    pub fn type_name(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Bool(_) => "bool".to_string(),
            HostValue::Num(_) => "num".to_string(),
            HostValue::Str(_) => "string".to_string(),
            HostValue::Foreign(object) => format!("foreign {}", object.class_name()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Str(value)
    }
}

macro_rules! host_value_from_num {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for HostValue {
                fn from(value: $ty) -> Self {
                    HostValue::Num(value as f64)
                }
            }
        )*
    };
}

host_value_from_num!(f32, f64, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

fn tag_name(ty: SlotType) -> &'static str {
    match ty {
        SlotType::Bool => "bool",
        SlotType::Num => "num",
        SlotType::Foreign => "foreign",
        SlotType::List => "list",
        SlotType::Null => "null",
        SlotType::String => "string",
        SlotType::Unknown => "unknown",
    }
}

/// Read `slot` as `expected`. Tags never coerce into each other.
pub fn decode(vm: &Vm, slot: usize, expected: &SlotKind) -> Result<HostValue> {
    if slot >= vm.slot_count() {
        return Err(Error::MissingArgument { slot });
    }
    let ty = vm.slot_type(slot);
    let inaccessible = || Error::Inaccessible { slot };
    match (ty, expected) {
        (SlotType::List, _) => Err(Error::UnsupportedType { slot, what: "list" }),
        (SlotType::Unknown, _) => Err(inaccessible()),
        (SlotType::Null, SlotKind::Optional(_) | SlotKind::Any) => Ok(HostValue::Null),
        (_, SlotKind::Optional(inner)) => decode(vm, slot, inner),
        (SlotType::Bool, SlotKind::Bool | SlotKind::Any) => {
            vm.get_slot_bool(slot).map(HostValue::Bool).ok_or_else(inaccessible)
        }
        (SlotType::Num, SlotKind::Num(_) | SlotKind::Any) => {
            vm.get_slot_double(slot).map(HostValue::Num).ok_or_else(inaccessible)
        }
        (SlotType::String, SlotKind::String | SlotKind::Any) => vm
            .get_slot_string(slot)
            .map(|s| HostValue::Str(s.to_string()))
            .ok_or_else(inaccessible),
        // Checked against the type the object was allocated with, not
        // whatever is registered under its class name now.
        (SlotType::Foreign, SlotKind::Foreign { type_id, .. }) => {
            let object = vm
                .get_slot_foreign_object(slot)
                .map(ForeignRef::new)
                .ok_or_else(inaccessible)?;
            if object.type_id() != Some(*type_id) {
                return Err(Error::TypeMismatch {
                    slot,
                    expected: expected.to_string(),
                    found: format!("foreign {}", object.class_name()),
                });
            }
            Ok(HostValue::Foreign(object))
        }
        // Without a declared host type there is nothing to read the
        // payload as.
        (SlotType::Foreign, SlotKind::Any) => Err(Error::UnsupportedType {
            slot,
            what: "untyped foreign",
        }),
        (found, expected) => Err(Error::TypeMismatch {
            slot,
            expected: expected.to_string(),
            found: tag_name(found).to_string(),
        }),
    }
}

/// Write `value` into `slot`.
pub fn encode(vm: &mut Vm, slot: usize, value: &HostValue) -> Result<()> {
    match value {
        HostValue::Null => vm.set_slot_null(slot),
        HostValue::Bool(b) => vm.set_slot_bool(slot, *b),
        HostValue::Num(n) => vm.set_slot_double(slot, *n),
        HostValue::Str(s) => vm.set_slot_string(slot, s),
        HostValue::Foreign(_) => {
            return Err(Error::UnsupportedType {
                slot,
                what: "foreign",
            });
        }
    }
    Ok(())
}

/// A host type that can be read out of a slot.
pub trait FromSlot: Sized {
    fn kind() -> SlotKind;

    /// Convert an already decoded value. `None` if its shape doesn't fit.
    fn from_host(value: HostValue) -> Option<Self>;
}

/// A host type that can be written into a slot.
pub trait IntoSlot {
    fn kind() -> SlotKind;

    fn into_host(self) -> HostValue;
}

/// What a host function may return: nothing, one value, or a `Result`
/// whose `Err` fails the call.
pub trait HostReturn {
    fn returns() -> Option<SlotKind>;

    fn into_result(self) -> Result<Option<HostValue>>;
}

impl HostReturn for () {
    fn returns() -> Option<SlotKind> {
        None
    }

    fn into_result(self) -> Result<Option<HostValue>> {
        Ok(None)
    }
}

impl<T: HostReturn, E: fmt::Display> HostReturn for std::result::Result<T, E> {
    fn returns() -> Option<SlotKind> {
        T::returns()
    }

    fn into_result(self) -> Result<Option<HostValue>> {
        match self {
            Ok(value) => value.into_result(),
            Err(err) => Err(Error::Host(err.to_string())),
        }
    }
}

/// Implements `HostReturn` for types that return as one slot value.
macro_rules! single_return {
    ($($ty:ty),*) => {
        $(
            impl HostReturn for $ty {
                fn returns() -> Option<SlotKind> {
                    Some(<$ty as IntoSlot>::kind())
                }

                fn into_result(self) -> Result<Option<HostValue>> {
                    Ok(Some(self.into_host()))
                }
            }
        )*
    };
}

impl FromSlot for bool {
    fn kind() -> SlotKind {
        SlotKind::Bool
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl IntoSlot for bool {
    fn kind() -> SlotKind {
        SlotKind::Bool
    }

    fn into_host(self) -> HostValue {
        HostValue::Bool(self)
    }
}

macro_rules! num_slot {
    ($($ty:ident => $kind:ident),*) => {
        $(
            impl FromSlot for $ty {
                fn kind() -> SlotKind {
                    SlotKind::Num(NumKind::$kind)
                }

                fn from_host(value: HostValue) -> Option<Self> {
                    match value {
                        HostValue::Num(n) => Some(n as $ty),
                        _ => None,
                    }
                }
            }

            impl IntoSlot for $ty {
                fn kind() -> SlotKind {
                    SlotKind::Num(NumKind::$kind)
                }

                fn into_host(self) -> HostValue {
                    HostValue::Num(self as f64)
                }
            }

            single_return!($ty);
        )*
    };
}

num_slot!(
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize
);

impl FromSlot for String {
    fn kind() -> SlotKind {
        SlotKind::String
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl IntoSlot for String {
    fn kind() -> SlotKind {
        SlotKind::String
    }

    fn into_host(self) -> HostValue {
        HostValue::Str(self)
    }
}

impl IntoSlot for &str {
    fn kind() -> SlotKind {
        SlotKind::String
    }

    fn into_host(self) -> HostValue {
        HostValue::Str(self.to_string())
    }
}

impl FromSlot for HostValue {
    fn kind() -> SlotKind {
        SlotKind::Any
    }

    fn from_host(value: HostValue) -> Option<Self> {
        Some(value)
    }
}

impl IntoSlot for HostValue {
    fn kind() -> SlotKind {
        SlotKind::Any
    }

    fn into_host(self) -> HostValue {
        self
    }
}

single_return!(bool, String, &str, HostValue);

impl<T: FromSlot> FromSlot for Option<T> {
    fn kind() -> SlotKind {
        SlotKind::optional(T::kind())
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Null => Some(None),
            other => T::from_host(other).map(Some),
        }
    }
}

impl<T: IntoSlot> IntoSlot for Option<T> {
    fn kind() -> SlotKind {
        SlotKind::optional(T::kind())
    }

    fn into_host(self) -> HostValue {
        match self {
            Some(value) => value.into_host(),
            None => HostValue::Null,
        }
    }
}

impl<T: IntoSlot> HostReturn for Option<T> {
    fn returns() -> Option<SlotKind> {
        Some(<Self as IntoSlot>::kind())
    }

    fn into_result(self) -> Result<Option<HostValue>> {
        Ok(Some(self.into_host()))
    }
}

impl<T: 'static> FromSlot for Foreign<T> {
    fn kind() -> SlotKind {
        SlotKind::foreign::<T>()
    }

    fn from_host(value: HostValue) -> Option<Self> {
        match value {
            HostValue::Foreign(object) => object.downcast(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm::Configuration;

    fn vm_with_slots(values: &[HostValue]) -> Vm {
        let mut vm = Vm::new(Configuration::default());
        vm.ensure_slots(values.len());
        for (slot, value) in values.iter().enumerate() {
            encode(&mut vm, slot, value).unwrap();
        }
        vm
    }

    #[test]
    fn numbers_narrow_through_double() {
        let vm = vm_with_slots(&[HostValue::Num(3.9), HostValue::Num(-1.0)]);
        let value = decode(&vm, 0, &<i32 as FromSlot>::kind()).unwrap();
        assert_eq!(i32::from_host(value), Some(3));
        let value = decode(&vm, 1, &<u8 as FromSlot>::kind()).unwrap();
        assert_eq!(u8::from_host(value), Some(0));
    }

    #[test]
    fn strings_are_never_parsed_as_numbers() {
        let vm = vm_with_slots(&["42".into()]);
        let err = decode(&vm, 0, &<f64 as FromSlot>::kind()).unwrap_err();
        assert!(
            matches!(err, Error::TypeMismatch { slot: 0, ref found, .. } if found == "string"),
            "{err:?}"
        );
    }

    #[test]
    fn null_only_fills_optional_parameters() {
        let vm = vm_with_slots(&[HostValue::Null]);
        assert_eq!(
            decode(&vm, 0, &<Option<String> as FromSlot>::kind()).unwrap(),
            HostValue::Null
        );
        assert!(matches!(
            decode(&vm, 0, &<String as FromSlot>::kind()),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn optional_decodes_inner_kind() {
        let vm = vm_with_slots(&["hi".into()]);
        let value = decode(&vm, 0, &<Option<String> as FromSlot>::kind()).unwrap();
        assert_eq!(
            Option::<String>::from_host(value),
            Some(Some("hi".to_string()))
        );
    }

    #[test]
    fn past_the_window_is_missing() {
        let vm = vm_with_slots(&[HostValue::Bool(true)]);
        assert!(matches!(
            decode(&vm, 1, &<bool as FromSlot>::kind()),
            Err(Error::MissingArgument { slot: 1 })
        ));
    }

    /// A bound VM holding a `u64` foreign object in slot 0.
    fn foreign_in_slot() -> crate::VM {
        let mut vm = crate::VM::new();
        vm.register_foreign_class("Cell", || 7u64).unwrap();
        vm.interpret("foreign class Cell {\n  construct new() {}\n}\nvar c = Cell.new()")
            .unwrap();
        vm.vm.ensure_slots(1);
        assert!(vm.vm.get_variable("main", "c", 0));
        vm
    }

    #[test]
    fn foreign_payloads_are_checked_by_type() {
        let vm = foreign_in_slot();
        let value = decode(&vm.vm, 0, &<Foreign<u64> as FromSlot>::kind()).unwrap();
        assert_eq!(value.type_name(), "foreign Cell");
        assert_eq!(Foreign::<u64>::from_host(value).map(|c| *c), Some(7));

        let err = decode(&vm.vm, 0, &<Foreign<i64> as FromSlot>::kind()).unwrap_err();
        assert!(
            matches!(err, Error::TypeMismatch { slot: 0, ref found, .. } if found == "foreign Cell"),
            "{err:?}"
        );
        assert!(matches!(
            decode(&vm.vm, 0, &SlotKind::Any),
            Err(Error::UnsupportedType { what: "untyped foreign", .. })
        ));
    }

    #[test]
    fn foreign_values_cannot_be_encoded() {
        let mut vm = foreign_in_slot();
        let value = decode(&vm.vm, 0, &<Foreign<u64> as FromSlot>::kind()).unwrap();
        let err = encode(&mut vm.vm, 0, &value).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { what: "foreign", .. }));
    }

    #[test]
    fn kinds_accept_matching_values() {
        assert!(SlotKind::Bool.accepts(&HostValue::Bool(true)));
        assert!(!<f64 as FromSlot>::kind().accepts(&"1".into()));
        assert!(<Option<String> as FromSlot>::kind().accepts(&HostValue::Null));
        assert!(<Option<String> as FromSlot>::kind().accepts(&"x".into()));
        assert!(!SlotKind::String.accepts(&HostValue::Null));
        assert!(SlotKind::Any.accepts(&HostValue::Num(1.0)));
    }

    #[test]
    fn result_errors_become_host_errors() {
        let ok: std::result::Result<i64, String> = Ok(5);
        assert_eq!(ok.into_result().unwrap(), Some(HostValue::Num(5.0)));
        let err: std::result::Result<i64, String> = Err("boom".into());
        assert!(matches!(err.into_result(), Err(Error::Host(msg)) if msg == "boom"));
        assert_eq!(<std::result::Result<(), String>>::returns(), None);
    }

    #[test]
    fn kinds_describe_themselves() {
        assert_eq!(<Option<i64> as FromSlot>::kind().to_string(), "num (i64) or null");
        assert_eq!(<Foreign<u32> as FromSlot>::kind().to_string(), "foreign u32");
    }
}

//! Calling host functions from foreign methods.
//!
//! A [`HostFunction`] carries an explicit descriptor: the [`SlotKind`] of
//! every parameter and of its return value. The dispatcher decodes one
//! slot per parameter, invokes the function and encodes the result into
//! slot 0 after checking it against the declared return kind.
//!
//! Receivers: a foreign instance in slot 0 is decoded like any other
//! argument, so an instance method's first parameter is `Foreign<T>`. A
//! receiver the host cannot see (a class, for static methods, or a script
//! instance) is skipped, and parameter 0 is read from slot 1.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use vm::{SlotType, Vm};

use crate::binding;
use crate::error::{Error, Result};
use crate::slot::{self, FromSlot, HostReturn, HostValue, SlotKind};

type HostCall = dyn Fn(Vec<HostValue>) -> Result<Option<HostValue>> + Send + Sync;

/// A host function together with the shape of its parameters and result.
pub struct HostFunction {
    params: Vec<SlotKind>,
    returns: Option<SlotKind>,
    call: Box<HostCall>,
}

impl HostFunction {
    /// Describe a function by hand. `f` receives one decoded value per
    /// entry of `params`.
    pub fn new<F>(params: Vec<SlotKind>, returns: Option<SlotKind>, f: F) -> Self
    where
        F: Fn(Vec<HostValue>) -> Result<Option<HostValue>> + Send + Sync + 'static,
    {
        Self {
            params,
            returns,
            call: Box::new(f),
        }
    }

    pub fn params(&self) -> &[SlotKind] {
        &self.params
    }

    pub fn returns(&self) -> Option<&SlotKind> {
        self.returns.as_ref()
    }

    pub fn invoke(&self, args: Vec<HostValue>) -> Result<Option<HostValue>> {
        (self.call)(args)
    }
}

impl std::fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Marker for [`HostFunction`]s passed where a closure could go.
pub struct Described;

/// Anything that can be registered as a foreign method. Implemented for
/// closures of up to eight [`FromSlot`] parameters returning a
/// [`HostReturn`], and for ready-made [`HostFunction`]s.
pub trait IntoHostFunction<Marker> {
    fn into_host_function(self) -> HostFunction;
}

impl IntoHostFunction<Described> for HostFunction {
    fn into_host_function(self) -> HostFunction {
        self
    }
}

fn take<A: FromSlot>(args: &mut impl Iterator<Item = HostValue>, index: usize) -> Result<A> {
    args.next()
        .and_then(A::from_host)
        .ok_or_else(|| Error::Host(format!("argument {index} does not fit {}", A::kind())))
}

macro_rules! impl_into_host_function {
    ($($arg:ident: $index:tt),*) => {
        impl<F, R, $($arg),*> IntoHostFunction<fn($($arg),*) -> R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: HostReturn,
            $($arg: FromSlot,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_host_function(self) -> HostFunction {
                let params = vec![$($arg::kind()),*];
                HostFunction::new(params, R::returns(), move |args| {
                    let mut args = args.into_iter();
                    $(let $arg = take::<$arg>(&mut args, $index)?;)*
                    (self)($($arg),*).into_result()
                })
            }
        }
    };
}

impl_into_host_function!();
impl_into_host_function!(A0: 0);
impl_into_host_function!(A0: 0, A1: 1);
impl_into_host_function!(A0: 0, A1: 1, A2: 2);
impl_into_host_function!(A0: 0, A1: 1, A2: 2, A3: 3);
impl_into_host_function!(A0: 0, A1: 1, A2: 2, A3: 3, A4: 4);
impl_into_host_function!(A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5);
impl_into_host_function!(A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6);
impl_into_host_function!(A0: 0, A1: 1, A2: 2, A3: 3, A4: 4, A5: 5, A6: 6, A7: 7);

/// Decode one argument per entry of `params` from the current slot window.
pub fn decode_args(vm: &Vm, params: &[SlotKind]) -> Result<Vec<HostValue>> {
    let mut offset = 0;
    let mut args = Vec::with_capacity(params.len());
    for (i, kind) in params.iter().enumerate() {
        if i == 0 && vm.slot_count() > 0 && vm.slot_type(0) == SlotType::Unknown {
            offset = 1;
        }
        args.push(slot::decode(vm, i + offset, kind)?);
    }
    Ok(args)
}

/// Run `function` against the current foreign call.
pub fn dispatch(vm: &mut Vm, function: &HostFunction) -> Result<()> {
    let args = decode_args(vm, function.params())?;
    log::trace!("dispatching {} argument(s)", args.len());
    let result = panic::catch_unwind(AssertUnwindSafe(|| function.invoke(args)))
        .map_err(|payload| Error::Host(panic_message(payload)))??;
    let Some(value) = result else {
        return Ok(());
    };
    match function.returns() {
        Some(kind) if kind.accepts(&value) => slot::encode(vm, 0, &value),
        Some(kind) => Err(Error::TypeMismatch {
            slot: 0,
            expected: kind.to_string(),
            found: value.type_name(),
        }),
        // Declared to return nothing; slot 0 stays untouched.
        None => Err(Error::TypeMismatch {
            slot: 0,
            expected: "no value".to_string(),
            found: value.type_name(),
        }),
    }
}

/// Trampoline body for a foreign method.
pub(crate) fn run(vm: &mut Vm, function: &HostFunction) {
    if let Err(err) = dispatch(vm, function) {
        fail(vm, err);
    }
}

/// Park `err` for the caller of `interpret` and abort the fiber.
pub(crate) fn fail(vm: &mut Vm, err: Error) {
    let message = err.to_string();
    log::debug!("foreign call failed: {message}");
    binding::set_pending(vm, err);
    vm.abort_fiber(message);
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "host function panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::Foreign;
    use vm::Configuration;

    /// A call window whose receiver is a class, as for a static method.
    fn window(args: &[HostValue]) -> Vm {
        let mut vm = Vm::new(Configuration::default());
        vm.interpret("main", "class Receiver {}").unwrap();
        vm.ensure_slots(args.len() + 1);
        assert!(vm.get_variable("main", "Receiver", 0));
        for (i, value) in args.iter().enumerate() {
            slot::encode(&mut vm, i + 1, value).unwrap();
        }
        vm
    }

    #[test]
    fn closures_describe_their_shape() {
        let f = (|a: i64, b: i64| a + b).into_host_function();
        assert_eq!(
            f.params(),
            &[<i64 as FromSlot>::kind(), <i64 as FromSlot>::kind()]
        );
        assert_eq!(f.returns(), Some(&<i64 as FromSlot>::kind()));

        let g = (|_: Foreign<u32>, _: Option<String>| {}).into_host_function();
        assert_eq!(g.params().len(), 2);
        assert_eq!(g.returns(), None);
    }

    #[test]
    fn result_is_written_to_slot_zero() {
        let mut vm = window(&[2.into(), 3.into()]);
        let add = (|a: i64, b: i64| a + b).into_host_function();
        dispatch(&mut vm, &add).unwrap();
        assert_eq!(vm.get_slot_double(0), Some(5.0));
    }

    #[test]
    fn unit_return_leaves_slot_zero() {
        let mut vm = window(&[]);
        let noop = (|| {}).into_host_function();
        dispatch(&mut vm, &noop).unwrap();
        assert_eq!(vm.slot_type(0), SlotType::Unknown);
    }

    #[test]
    fn panics_become_host_errors() {
        let mut vm = window(&[]);
        let boom = (|| -> i64 { panic!("boom") }).into_host_function();
        let err = dispatch(&mut vm, &boom).unwrap_err();
        assert!(matches!(err, Error::Host(msg) if msg == "boom"));
    }

    #[test]
    fn described_functions_get_raw_values() {
        let mut vm = window(&["x".into()]);
        let echo = HostFunction::new(vec![SlotKind::Any], Some(SlotKind::Any), |mut args| {
            Ok(args.pop())
        });
        dispatch(&mut vm, &echo).unwrap();
        assert_eq!(vm.get_slot_string(0), Some("x"));
    }

    #[test]
    fn results_must_match_the_declared_kind() {
        let mut vm = window(&[]);
        let liar = HostFunction::new(vec![], Some(<f64 as FromSlot>::kind()), |_| {
            Ok(Some(HostValue::Str("five".into())))
        });
        let err = dispatch(&mut vm, &liar).unwrap_err();
        assert!(
            matches!(err, Error::TypeMismatch { slot: 0, ref found, .. } if found == "string"),
            "{err:?}"
        );
        assert_eq!(vm.slot_type(0), SlotType::Unknown);
    }

    #[test]
    fn no_declared_result_writes_nothing() {
        let mut vm = window(&[]);
        let silent = HostFunction::new(vec![], None, |_| Ok(None));
        dispatch(&mut vm, &silent).unwrap();
        assert_eq!(vm.slot_type(0), SlotType::Unknown);

        let chatty = HostFunction::new(vec![], None, |_| Ok(Some(HostValue::Num(1.0))));
        assert!(matches!(
            dispatch(&mut vm, &chatty),
            Err(Error::TypeMismatch { slot: 0, .. })
        ));
        assert_eq!(vm.slot_type(0), SlotType::Unknown);
    }

    #[test]
    fn optional_results_may_be_null() {
        let mut vm = window(&[]);
        let nothing = (|| -> Option<String> { None }).into_host_function();
        dispatch(&mut vm, &nothing).unwrap();
        assert_eq!(vm.slot_type(0), SlotType::Null);
    }

    #[test]
    fn missing_parameters_are_reported() {
        let mut vm = window(&[1.into()]);
        let add = (|a: f64, b: f64| a + b).into_host_function();
        assert!(matches!(
            dispatch(&mut vm, &add),
            Err(Error::MissingArgument { slot: 2 })
        ));
    }
}

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use wren::{Error, Foreign, HostFunction, HostValue, NumKind, Options, SlotKind, VM};

#[derive(Clone, Default)]
struct Buffer(Rc<RefCell<Vec<u8>>>);

impl Buffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A VM whose output and errors land in buffers.
fn captured(options: Options) -> (VM, Buffer, Buffer) {
    let mut vm = VM::with_options(options);
    let out = Buffer::default();
    let err = Buffer::default();
    vm.set_output_writer(out.clone());
    vm.set_error_writer(err.clone());
    (vm, out, err)
}

fn modules_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/modules")
}

const GO_MATH: &str = "class GoMath {
  foreign static add(x, y)
}
";

#[test]
fn static_foreign_method() {
    let (mut vm, out, _) = captured(Options::default());
    vm.register_foreign_method("static GoMath.add(_,_)", |a: i64, b: i64| a + b)
        .unwrap();
    vm.interpret(&format!("{GO_MATH}System.print(GoMath.add(2, 3))"))
        .unwrap();
    assert_eq!(out.contents(), "5\n");
}

#[test]
fn strings_do_not_coerce_to_numbers() {
    let (mut vm, out, err) = captured(Options::default());
    vm.register_foreign_method("static GoMath.add(_,_)", |a: i64, b: i64| a + b)
        .unwrap();
    let result = vm.interpret(&format!("{GO_MATH}System.print(GoMath.add(\"2\", 3))"));
    match result {
        Err(Error::TypeMismatch { slot, found, .. }) => {
            assert_eq!(slot, 1);
            assert_eq!(found, "string");
        }
        other => panic!("expected a type mismatch, got {other:?}"),
    }
    assert_eq!(out.contents(), "");
    assert!(
        err.contents().starts_with("runtime error: slot 1: expected num (i64)"),
        "{}",
        err.contents()
    );
}

struct God {
    greeting: String,
}

#[test]
fn foreign_class_instance_method() {
    let (mut vm, out, _) = captured(Options::default());
    vm.register_foreign_class("God", || God {
        greeting: "Do my bidding".to_string(),
    })
    .unwrap();
    vm.register_foreign_method("God.getMessage(_)", |god: Foreign<God>, name: String| {
        format!("{}, {}!", god.greeting, name)
    })
    .unwrap();
    vm.interpret(
        "foreign class God {
  construct new() {}
  foreign getMessage(name)
}
var god = God.new()
System.print(god.getMessage(\"Damien\"))",
    )
    .unwrap();
    assert_eq!(out.contents(), "Do my bidding, Damien!\n");
}

#[test]
fn unregistered_foreign_method() {
    let (mut vm, _, err) = captured(Options::default());
    let result = vm.interpret("class GoMath {\n  foreign static sub(x, y)\n}");
    assert!(
        matches!(
            &result,
            Err(Error::UnresolvedForeignMember { signature }) if signature == "static GoMath.sub(_,_)"
        ),
        "{result:?}"
    );
    assert!(err.contents().contains("Could not find foreign method 'sub(_,_)'"));
}

#[test]
fn static_flag_must_match() {
    let (mut vm, _, _) = captured(Options::default());
    vm.register_foreign_method("GoMath.add(_,_)", |a: f64, b: f64| a + b)
        .unwrap();
    assert!(matches!(
        vm.interpret(GO_MATH),
        Err(Error::UnresolvedForeignMember { .. })
    ));
}

#[test]
fn imported_modules_cannot_bind_methods() {
    let (mut vm, _, _) = captured(Options {
        modules_dir: Some(modules_dir()),
    });
    vm.register_foreign_method("static Sneaky.peek()", || 1.0).unwrap();
    let result = vm.interpret("import \"untrusted\" for Sneaky");
    assert!(
        matches!(
            &result,
            Err(Error::TrustViolation { module, member })
                if module == "untrusted" && member == "static Sneaky.peek()"
        ),
        "{result:?}"
    );
}

#[test]
#[should_panic(expected = "module 'shady' may not bind foreign member 'Shady'")]
fn imported_modules_cannot_bind_classes() {
    let (mut vm, _, _) = captured(Options {
        modules_dir: Some(modules_dir()),
    });
    vm.register_foreign_class("Shady", || 0u8).unwrap();
    let _ = vm.interpret("import \"shady\" for Shady");
}

#[test]
#[should_panic(expected = "foreign class Devil not found")]
fn unregistered_foreign_class() {
    let (mut vm, _, _) = captured(Options::default());
    let _ = vm.interpret("foreign class Devil {\n  construct new() {}\n}");
}

#[test]
fn compile_errors() {
    let (mut vm, out, err) = captured(Options::default());
    assert!(matches!(
        vm.interpret("System.print(\"ok\")\nSystem.print("),
        Err(Error::Compile)
    ));
    assert_eq!(out.contents(), "");
    assert!(
        err.contents().starts_with("compilation error: main:2: "),
        "{}",
        err.contents()
    );
}

#[test]
fn runtime_errors_carry_the_message() {
    let (mut vm, _, err) = captured(Options::default());
    let result = vm.interpret("class A {}\nA.missing()");
    assert!(matches!(result, Err(Error::Runtime(_))), "{result:?}");
    assert!(err.contents().starts_with("runtime error: "));
    assert!(err.contents().contains("\tmain:2: (script)\n"), "{}", err.contents());
}

#[test]
fn calling_script_methods() {
    let (mut vm, _, _) = captured(Options::default());
    vm.interpret(
        "class WrenMath {
  static do_add(a, b) {
    return a + b
  }
}",
    )
    .unwrap();
    let mut math = vm.variable("WrenMath").unwrap();
    let sum = math
        .call(&mut vm, "do_add(_,_)", &[2.into(), 3.into()])
        .unwrap();
    assert_eq!(sum, Some(HostValue::Num(5.0)));

    // The cached handle is reused for the second call.
    let sum = math
        .call(&mut vm, "do_add(_,_)", &[10.into(), (-4).into()])
        .unwrap();
    assert_eq!(sum, Some(HostValue::Num(6.0)));

    assert!(matches!(
        math.call(&mut vm, "do_add(_,_)", &[1.into()]),
        Err(Error::MissingArgument { slot: 2 })
    ));
}

#[test]
fn calling_instance_methods() {
    let (mut vm, _, _) = captured(Options::default());
    vm.interpret(
        "class Bird {
  construct new(name) {
    _name = name
  }
  fly(where) {
    return \"%(_name) is flying to %(where)!\"
  }
  land() {}
}
var bird = Bird.new(\"Tweety\")",
    )
    .unwrap();
    let mut bird = vm.variable("bird").unwrap();
    let response = bird.call(&mut vm, "fly(_)", &["Chicago".into()]).unwrap();
    assert_eq!(
        response,
        Some(HostValue::Str("Tweety is flying to Chicago!".to_string()))
    );
    assert_eq!(bird.call(&mut vm, "land()", &[]).unwrap(), None);
    assert!(vm.variable("Plane").is_none());
}

#[test]
fn lists_cannot_cross() {
    let (mut vm, _, _) = captured(Options::default());
    vm.register_foreign_method("static Lists.first(_)", |v: HostValue| v)
        .unwrap();
    let result = vm.interpret("class Lists {\n  foreign static first(xs)\n}\nLists.first([1, 2])");
    assert!(
        matches!(result, Err(Error::UnsupportedType { slot: 1, what: "list" })),
        "{result:?}"
    );
}

#[test]
fn host_errors_fail_the_call() {
    let (mut vm, out, _) = captured(Options::default());
    vm.register_foreign_method("static Roots.sqrt(_)", |x: f64| {
        if x < 0.0 {
            Err(format!("cannot take the root of {x}"))
        } else {
            Ok(x.sqrt())
        }
    })
    .unwrap();
    let script = "class Roots {\n  foreign static sqrt(x)\n}\nSystem.print(Roots.sqrt(9))\nSystem.print(Roots.sqrt(-1))";
    let result = vm.interpret(script);
    assert!(
        matches!(&result, Err(Error::Host(msg)) if msg == "cannot take the root of -1"),
        "{result:?}"
    );
    assert_eq!(out.contents(), "3\n");
}

#[test]
fn host_panics_fail_the_call() {
    let (mut vm, _, _) = captured(Options::default());
    vm.register_foreign_method("static Oops.now()", || -> bool { panic!("oops") })
        .unwrap();
    let result = vm.interpret("class Oops {\n  foreign static now()\n}\nOops.now()");
    assert!(matches!(&result, Err(Error::Host(msg)) if msg == "oops"), "{result:?}");
}

#[test]
fn optional_parameters_accept_null() {
    let (mut vm, out, _) = captured(Options::default());
    vm.register_foreign_method("static Greet.hello(_)", |name: Option<String>| {
        format!("Hello, {}!", name.unwrap_or_else(|| "nobody".to_string()))
    })
    .unwrap();
    vm.interpret(
        "class Greet {\n  foreign static hello(name)\n}\nSystem.print(Greet.hello(null))\nSystem.print(Greet.hello(\"Ada\"))",
    )
    .unwrap();
    assert_eq!(out.contents(), "Hello, nobody!\nHello, Ada!\n");
}

static TRACKED_DROPS: AtomicUsize = AtomicUsize::new(0);

struct Tracked;

impl Drop for Tracked {
    fn drop(&mut self) {
        TRACKED_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn foreign_objects_are_finalized() {
    let (mut vm, _, _) = captured(Options::default());
    vm.register_foreign_class("Tracked", || Tracked).unwrap();
    vm.interpret(
        "foreign class Tracked {\n  construct new() {}\n}\nvar a = Tracked.new()\nvar b = Tracked.new()",
    )
    .unwrap();
    assert_eq!(TRACKED_DROPS.load(Ordering::SeqCst), 0);
    drop(vm);
    assert_eq!(TRACKED_DROPS.load(Ordering::SeqCst), 2);
}

#[test]
fn importing_modules() {
    let (mut vm, out, _) = captured(Options {
        modules_dir: Some(modules_dir()),
    });
    vm.interpret(
        "import \"hello\" for Hello
import \"greeter\" for Greeter
System.print(Hello.world())
System.print(Greeter.greet(\"Bob\"))",
    )
    .unwrap();
    assert_eq!(out.contents(), "Hello, world!\nHi, Bob!\n");
}

#[test]
fn missing_modules() {
    let (mut vm, _, err) = captured(Options::default());
    vm.set_modules_dir(modules_dir());
    assert!(matches!(
        vm.interpret("import \"nowhere\" for Nothing"),
        Err(Error::Runtime(msg)) if msg == "Could not load module 'nowhere'."
    ));
    assert!(err.contents().starts_with("runtime error: Could not load module"));
}

#[test]
fn interpreting_readers_and_files() {
    let (mut vm, out, _) = captured(Options::default());
    vm.interpret_reader("System.print(40 + 2)".as_bytes()).unwrap();
    vm.interpret_file(modules_dir().join("hello.wren")).unwrap();
    assert!(vm.variable("Hello").is_some());
    assert!(matches!(
        vm.interpret_file(modules_dir().join("absent.wren")),
        Err(Error::Io(_))
    ));
    assert_eq!(out.contents(), "42\n");
}

#[test]
fn vms_keep_their_own_bindings() {
    let (mut first, first_out, _) = captured(Options::default());
    let (mut second, second_out, _) = captured(Options::default());
    first
        .register_foreign_method("static Which.vm()", || "first")
        .unwrap();
    second
        .register_foreign_method("static Which.vm()", || "second")
        .unwrap();
    let script = "class Which {\n  foreign static vm()\n}\nSystem.print(Which.vm())";
    first.interpret(script).unwrap();
    second.interpret(script).unwrap();
    assert_eq!(first_out.contents(), "first\n");
    assert_eq!(second_out.contents(), "second\n");
}

const CELL: &str = "foreign class Cell {
  construct new() {}
  foreign read()
}
var c = Cell.new()";

#[test]
fn objects_keep_the_type_they_were_built_with() {
    let (mut vm, _, _) = captured(Options::default());
    vm.register_foreign_class("Cell", || -1i64).unwrap();
    vm.register_foreign_method("Cell.read()", |c: Foreign<u64>| *c)
        .unwrap();
    vm.interpret(CELL).unwrap();
    let mut cell = vm.variable("c").unwrap();
    assert!(matches!(
        cell.call(&mut vm, "read()", &[]),
        Err(Error::TypeMismatch { slot: 0, .. })
    ));

    // Registering the name again only affects classes declared later.
    vm.register_foreign_class("Cell", || 0u64).unwrap();
    let result = cell.call(&mut vm, "read()", &[]);
    assert!(
        matches!(&result, Err(Error::TypeMismatch { slot: 0, expected, found })
            if expected == "foreign u64" && found == "foreign Cell"),
        "{result:?}"
    );
}

#[test]
fn objects_called_through_another_vm_keep_their_type() {
    let (mut first, _, _) = captured(Options::default());
    first.register_foreign_class("Cell", || -1i64).unwrap();
    first
        .register_foreign_method("Cell.read()", |c: Foreign<i64>| *c)
        .unwrap();
    first.interpret(CELL).unwrap();

    let (mut second, _, _) = captured(Options::default());
    second.register_foreign_class("Cell", || 2u64).unwrap();
    second
        .register_foreign_method("Cell.read()", |c: Foreign<u64>| *c)
        .unwrap();
    second.interpret(CELL).unwrap();

    let mut cell = first.variable("c").unwrap();
    assert_eq!(
        cell.call(&mut second, "read()", &[]).unwrap(),
        Some(HostValue::Num(-1.0))
    );
}

#[test]
fn script_instance_receivers_are_skipped() {
    let (mut vm, out, _) = captured(Options::default());
    vm.register_foreign_method("Pet.speak(_)", |word: String| format!("says {word}"))
        .unwrap();
    vm.interpret(
        "class Pet {
  construct new() {}
  foreign speak(word)
}
var pet = Pet.new()
System.print(pet.speak(\"hi\"))",
    )
    .unwrap();
    assert_eq!(out.contents(), "says hi\n");
}

#[test]
fn declared_results_are_enforced() {
    let (mut vm, _, _) = captured(Options::default());
    let liar = HostFunction::new(vec![], Some(SlotKind::Num(NumKind::F64)), |_| {
        Ok(Some(HostValue::Str("five".to_string())))
    });
    vm.register_foreign_method("static Liar.count()", liar).unwrap();
    let result = vm.interpret("class Liar {\n  foreign static count()\n}\nSystem.print(Liar.count())");
    assert!(
        matches!(&result, Err(Error::TypeMismatch { slot: 0, found, .. }) if found == "string"),
        "{result:?}"
    );
}

thread_local! {
    static KEPT: RefCell<Option<Foreign<String>>> = const { RefCell::new(None) };
}

#[test]
fn kept_foreign_objects_outlive_the_vm() {
    let (mut vm, _, _) = captured(Options::default());
    vm.register_foreign_class("Note", || String::from("remember me"))
        .unwrap();
    vm.register_foreign_method("Note.keep()", |note: Foreign<String>| {
        KEPT.with(|kept| *kept.borrow_mut() = Some(note));
    })
    .unwrap();
    vm.interpret("foreign class Note {\n  construct new() {}\n  foreign keep()\n}\nNote.new().keep()")
        .unwrap();
    drop(vm);
    KEPT.with(|kept| {
        let kept = kept.borrow();
        assert_eq!(kept.as_ref().map(|note| note.as_str()), Some("remember me"));
    });
}
